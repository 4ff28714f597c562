//! Mock provider for testing.
//!
//! This provider keeps vaults, policies and protected items in memory,
//! serves them in pages, and supports error injection to simulate failure
//! conditions. It honours the protected item filter the way the real service
//! does, unless told otherwise.

use crate::auth::{AuthorizationProvider, Capability};
use crate::client::{
    BackupPoliciesClient, ClientFactory, PageCursor, ProtectedItemsClient, VaultsClient, VecCursor,
};
use crate::filter::ProtectedItemFilter;
use crate::resolver::IdentifierResolver;
use crate::*;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Token handed out by the mock authorizer.
pub const MOCK_TOKEN: &str = "mock-token";

type VaultKey = (String, String, String);

fn key(subscription_id: &str, resource_group: &str, vault_name: &str) -> VaultKey {
    (
        subscription_id.to_string(),
        resource_group.to_string(),
        vault_name.to_string(),
    )
}

/// A request observed by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    /// Client operation ("get_vault", "list_policies", "list_protected_items")
    pub operation: &'static str,
    /// Subscription the client was scoped to
    pub subscription_id: String,
    /// Resource group passed to the call
    pub resource_group: String,
    /// Vault name passed to the call
    pub vault_name: String,
    /// Rendered filter, for protected item listings
    pub filter: Option<String>,
    /// Token the client was built with
    pub token: String,
}

struct MockState {
    vaults: HashMap<VaultKey, Vault>,
    policies: HashMap<VaultKey, Vec<ProtectionPolicyResource>>,
    items: HashMap<VaultKey, Vec<ProtectedItemResource>>,
    page_size: usize,
    enforce_filter: bool,
    latency: Option<Duration>,
    auth_error: Option<String>,
    get_error: Option<String>,
    list_error: Option<String>,
    advance_error: Option<(usize, String)>,
    authorizations: usize,
    calls: Vec<MockCall>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            vaults: HashMap::new(),
            policies: HashMap::new(),
            items: HashMap::new(),
            page_size: 2,
            enforce_filter: true,
            latency: None,
            auth_error: None,
            get_error: None,
            list_error: None,
            advance_error: None,
            authorizations: 0,
            calls: Vec::new(),
        }
    }
}

/// In-memory authorization provider and client factory.
///
/// Clones share the same state, so a test can keep a handle for seeding and
/// inspection while the facade owns another.
///
/// # Example
///
/// ```
/// use recoveryvault::backends::mock::MockProvider;
/// use recoveryvault::resolver::IdentifierResolver;
/// use recoveryvault::ProtectionPolicyResource;
///
/// #[tokio::main]
/// async fn main() -> recoveryvault::Result<()> {
///     let mock = MockProvider::new();
///     mock.add_vault("sub-1", "rg-1", "vault-A").await;
///     mock.add_policies("sub-1", "rg-1", "vault-A", vec![
///         ProtectionPolicyResource::new("DefaultPolicy"),
///     ]).await;
///
///     let services = mock.services(IdentifierResolver::default());
///     let policies = services.list_backup_policies("vault-A", "rg-1", "sub-1").await?;
///     assert!(policies.contains_key("DefaultPolicy"));
///     Ok(())
/// }
/// ```
#[derive(Clone, Default)]
pub struct MockProvider {
    state: Arc<RwLock<MockState>>,
}

impl MockProvider {
    /// Creates a new mock provider with empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a facade backed by this mock.
    pub fn services(&self, resolver: IdentifierResolver) -> RecoveryServices {
        RecoveryServices::new(resolver, Arc::new(self.clone()), Arc::new(self.clone()))
    }

    /// Adds a vault.
    pub async fn add_vault(&self, subscription_id: &str, resource_group: &str, vault_name: &str) {
        let vault = Vault::new(vault_name, resource_group, subscription_id);
        self.put_vault(subscription_id, resource_group, vault_name, vault)
            .await;
    }

    /// Stores `vault` as the answer for a lookup of `vault_name`.
    ///
    /// The record's own name is not checked against `vault_name`.
    pub async fn put_vault(
        &self,
        subscription_id: &str,
        resource_group: &str,
        vault_name: &str,
        vault: Vault,
    ) {
        let mut state = self.state.write().await;
        state
            .vaults
            .insert(key(subscription_id, resource_group, vault_name), vault);
    }

    /// Appends policies to a vault's listing, duplicates included.
    pub async fn add_policies(
        &self,
        subscription_id: &str,
        resource_group: &str,
        vault_name: &str,
        policies: Vec<ProtectionPolicyResource>,
    ) {
        let mut state = self.state.write().await;
        state
            .policies
            .entry(key(subscription_id, resource_group, vault_name))
            .or_default()
            .extend(policies);
    }

    /// Appends protected items to a vault's listing.
    pub async fn add_protected_items(
        &self,
        subscription_id: &str,
        resource_group: &str,
        vault_name: &str,
        items: Vec<ProtectedItemResource>,
    ) {
        let mut state = self.state.write().await;
        state
            .items
            .entry(key(subscription_id, resource_group, vault_name))
            .or_default()
            .extend(items);
    }

    /// Sets how many records each page holds (minimum 1, default 2).
    pub async fn set_page_size(&self, page_size: usize) {
        self.state.write().await.page_size = page_size.max(1);
    }

    /// Controls whether protected item filters are applied (default true).
    ///
    /// Disabling it simulates a service that ignores the filter.
    pub async fn set_filter_enforced(&self, enforced: bool) {
        self.state.write().await.enforce_filter = enforced;
    }

    /// Delays every client call by `latency`.
    pub async fn set_latency(&self, latency: Duration) {
        self.state.write().await.latency = Some(latency);
    }

    /// Makes the authorizer fail.
    pub async fn fail_authorization(&self, message: impl Into<String>) {
        self.state.write().await.auth_error = Some(message.into());
    }

    /// Makes vault lookups fail with a server error.
    pub async fn fail_get(&self, message: impl Into<String>) {
        self.state.write().await.get_error = Some(message.into());
    }

    /// Makes the initial request of listings fail with a server error.
    pub async fn fail_list(&self, message: impl Into<String>) {
        self.state.write().await.list_error = Some(message.into());
    }

    /// Makes fetching page `page` (1-based) of listings fail.
    ///
    /// Page 1 arrives with the initial request, so `page` is raised to at
    /// least 2. Use [`fail_list`](Self::fail_list) to fail the first page.
    pub async fn fail_advance_at(&self, page: usize, message: impl Into<String>) {
        self.state.write().await.advance_error = Some((page.max(2), message.into()));
    }

    /// Clears all injected errors.
    pub async fn clear_errors(&self) {
        let mut state = self.state.write().await;
        state.auth_error = None;
        state.get_error = None;
        state.list_error = None;
        state.advance_error = None;
    }

    /// Requests observed so far, in order.
    pub async fn calls(&self) -> Vec<MockCall> {
        self.state.read().await.calls.clone()
    }

    /// Number of capabilities handed out so far.
    pub async fn authorizations(&self) -> usize {
        self.state.read().await.authorizations
    }
}

fn server_error(message: &str) -> RecoveryError {
    RecoveryError::Http {
        status: 500,
        code: "InternalServerError".to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl AuthorizationProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn new_authorizer(&self) -> Result<Capability> {
        let mut state = self.state.write().await;
        if let Some(ref err) = state.auth_error {
            return Err(RecoveryError::Authorization(err.clone()));
        }
        state.authorizations += 1;
        Ok(Capability::new(MOCK_TOKEN))
    }
}

impl ClientFactory for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn vaults(&self, subscription_id: &str, capability: Capability) -> Box<dyn VaultsClient> {
        Box::new(self.client(subscription_id, capability))
    }

    fn backup_policies(
        &self,
        subscription_id: &str,
        capability: Capability,
    ) -> Box<dyn BackupPoliciesClient> {
        Box::new(self.client(subscription_id, capability))
    }

    fn protected_items(
        &self,
        subscription_id: &str,
        capability: Capability,
    ) -> Box<dyn ProtectedItemsClient> {
        Box::new(self.client(subscription_id, capability))
    }
}

impl MockProvider {
    fn client(&self, subscription_id: &str, capability: Capability) -> MockClient {
        MockClient {
            state: Arc::clone(&self.state),
            subscription_id: subscription_id.to_string(),
            capability,
        }
    }
}

/// Subscription-scoped client over the shared mock state.
struct MockClient {
    state: Arc<RwLock<MockState>>,
    subscription_id: String,
    capability: Capability,
}

impl MockClient {
    /// Records the call, waits out any latency, and hands back the state.
    async fn begin(
        &self,
        operation: &'static str,
        resource_group: &str,
        vault_name: &str,
        filter: Option<String>,
    ) -> tokio::sync::RwLockReadGuard<'_, MockState> {
        let latency = {
            let mut state = self.state.write().await;
            state.calls.push(MockCall {
                operation,
                subscription_id: self.subscription_id.clone(),
                resource_group: resource_group.to_string(),
                vault_name: vault_name.to_string(),
                filter,
                token: self.capability.token().to_string(),
            });
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.state.read().await
    }

    fn paginate<T: Clone + Send + Sync + 'static>(
        state: &MockState,
        records: Vec<T>,
    ) -> Box<dyn PageCursor<T>> {
        let pages: Vec<Vec<T>> = if records.is_empty() {
            vec![Vec::new()]
        } else {
            records.chunks(state.page_size).map(<[T]>::to_vec).collect()
        };
        Box::new(MockCursor {
            inner: VecCursor::new(pages),
            page: 1,
            fail_at: state.advance_error.clone(),
        })
    }
}

fn item_matches(item: &ProtectedItemResource, filter: &ProtectedItemFilter) -> bool {
    match &item.properties {
        ProtectedItem::ComputeVm(vm) => filter.matches(
            vm.backup_management_type.as_deref(),
            vm.workload_type.as_deref(),
            vm.governing_policy(),
        ),
        ProtectedItem::Other { properties, .. } | ProtectedItem::Malformed { properties, .. } => {
            let field = |name: &str| properties.get(name).and_then(serde_json::Value::as_str);
            filter.matches(
                field("backupManagementType"),
                field("workloadType"),
                field("policyName"),
            )
        }
    }
}

#[async_trait]
impl VaultsClient for MockClient {
    async fn get(&self, resource_group: &str, vault_name: &str) -> Result<Vault> {
        let state = self.begin("get_vault", resource_group, vault_name, None).await;
        if let Some(ref err) = state.get_error {
            return Err(server_error(err));
        }
        state
            .vaults
            .get(&key(&self.subscription_id, resource_group, vault_name))
            .cloned()
            .ok_or_else(|| RecoveryError::NotFound(vault_name.to_string()))
    }
}

#[async_trait]
impl BackupPoliciesClient for MockClient {
    async fn list(
        &self,
        vault_name: &str,
        resource_group: &str,
    ) -> Result<Box<dyn PageCursor<ProtectionPolicyResource>>> {
        let state = self.begin("list_policies", resource_group, vault_name, None).await;
        if let Some(ref err) = state.list_error {
            return Err(server_error(err));
        }
        let vault_key = key(&self.subscription_id, resource_group, vault_name);
        if !state.vaults.contains_key(&vault_key) {
            return Err(RecoveryError::NotFound(vault_name.to_string()));
        }
        let policies = state.policies.get(&vault_key).cloned().unwrap_or_default();
        Ok(MockClient::paginate(&state, policies))
    }
}

#[async_trait]
impl ProtectedItemsClient for MockClient {
    async fn list(
        &self,
        vault_name: &str,
        resource_group: &str,
        filter: &ProtectedItemFilter,
    ) -> Result<Box<dyn PageCursor<ProtectedItemResource>>> {
        let state = self
            .begin(
                "list_protected_items",
                resource_group,
                vault_name,
                Some(filter.to_odata()),
            )
            .await;
        if let Some(ref err) = state.list_error {
            return Err(server_error(err));
        }
        let vault_key = key(&self.subscription_id, resource_group, vault_name);
        if !state.vaults.contains_key(&vault_key) {
            return Err(RecoveryError::NotFound(vault_name.to_string()));
        }
        let items: Vec<ProtectedItemResource> = state
            .items
            .get(&vault_key)
            .map(|items| {
                items
                    .iter()
                    .filter(|item| !state.enforce_filter || item_matches(item, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(MockClient::paginate(&state, items))
    }
}

/// Page cursor that can fail when fetching a given page.
struct MockCursor<T> {
    inner: VecCursor<T>,
    page: usize,
    fail_at: Option<(usize, String)>,
}

#[async_trait]
impl<T: Send + Sync> PageCursor<T> for MockCursor<T> {
    fn has_more(&self) -> bool {
        self.inner.has_more()
    }

    fn current(&self) -> &[T] {
        self.inner.current()
    }

    async fn advance(&mut self) -> Result<()> {
        self.inner.advance().await?;
        if !self.inner.has_more() {
            return Ok(());
        }
        self.page += 1;
        match self.fail_at {
            Some((page, ref message)) if page == self.page => Err(RecoveryError::Transport(
                format!("fetching page {}: {}", page, message),
            )),
            _ => Ok(()),
        }
    }
}

/// Registers the mock provider with the factory.
pub fn register() {
    crate::factory::register_provider("mock", |_cfg| {
        let mock = MockProvider::new();
        Ok(crate::factory::Provider {
            authorizer: Arc::new(mock.clone()),
            clients: Arc::new(mock),
        })
    });
}
