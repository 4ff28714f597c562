//! The Recovery Services query facade.
//!
//! Every operation follows the same path: resolve identifiers, acquire a
//! capability, build a subscription-scoped client, call, and flatten the
//! result. Nothing is cached between calls.

use crate::auth::AuthorizationProvider;
use crate::client::ClientFactory;
use crate::context::OperationGuard;
use crate::filter::{validate_name, ProtectedItemFilter};
use crate::pager::drain_into_map;
use crate::resolver::{IdentifierResolver, ResolvedIdentifiers};
use crate::{
    AzureIaasComputeVmProtectedItem, CallContext, Capability, ProtectedItem, ProtectedItemResource,
    ProtectionPolicyResource, RecoveryError, Result, Vault,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Queries vaults, backup policies and protected VMs.
///
/// Identifier arguments may be empty strings, in which case the resolver's
/// defaults are used.
///
/// # Example
///
/// ```
/// use recoveryvault::backends::mock::MockProvider;
/// use recoveryvault::resolver::IdentifierResolver;
///
/// #[tokio::main]
/// async fn main() -> recoveryvault::Result<()> {
///     let mock = MockProvider::new();
///     mock.add_vault("sub-1", "rg-1", "vault-A").await;
///
///     let services = mock.services(IdentifierResolver::new(Some("sub-1".into()), None));
///
///     let vault = services.get_vault("vault-A", "rg-1", "").await?;
///     assert_eq!(vault.name.as_deref(), Some("vault-A"));
///     assert!(!services.vault_exists("vault-B", "rg-1", "").await);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct RecoveryServices {
    resolver: IdentifierResolver,
    authorizer: Arc<dyn AuthorizationProvider>,
    clients: Arc<dyn ClientFactory>,
    context: CallContext,
}

impl std::fmt::Debug for RecoveryServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryServices")
            .field("resolver", &self.resolver)
            .field("authorizer", &self.authorizer.name())
            .field("clients", &self.clients.name())
            .field("context", &self.context)
            .finish()
    }
}

/// Keeps interruptions visible at the top level, wraps everything else.
fn wrap(operation: &str, resource: &str, err: RecoveryError) -> RecoveryError {
    if err.is_interrupted() {
        err
    } else {
        RecoveryError::provider_op(operation, resource, err)
    }
}

impl RecoveryServices {
    /// Creates a facade over an authorization provider and client factory.
    pub fn new(
        resolver: IdentifierResolver,
        authorizer: Arc<dyn AuthorizationProvider>,
        clients: Arc<dyn ClientFactory>,
    ) -> Self {
        Self {
            resolver,
            authorizer,
            clients,
            context: CallContext::default(),
        }
    }

    /// Returns a copy whose operations run under `context`.
    pub fn with_context(&self, context: CallContext) -> Self {
        Self {
            context,
            ..self.clone()
        }
    }

    /// The identifier resolver.
    pub fn resolver(&self) -> &IdentifierResolver {
        &self.resolver
    }

    /// The context operations run under.
    pub fn context(&self) -> &CallContext {
        &self.context
    }

    async fn prepare(
        &self,
        guard: &OperationGuard,
        resource_group: &str,
        subscription_id: &str,
    ) -> Result<(ResolvedIdentifiers, Capability)> {
        let ids = self.resolver.resolve(subscription_id, resource_group)?;

        let capability = guard
            .run(self.authorizer.new_authorizer())
            .await
            .map_err(|e| match e {
                RecoveryError::Authorization(_)
                | RecoveryError::Cancelled
                | RecoveryError::TimedOut(_) => e,
                other => RecoveryError::Authorization(other.to_string()),
            })?;

        Ok((ids, capability))
    }

    /// Fetches a vault.
    ///
    /// # Errors
    ///
    /// - [`RecoveryError::InvalidName`]: `vault_name` fails validation
    /// - [`RecoveryError::MissingConfiguration`]: an identifier has no value or default
    /// - [`RecoveryError::Authorization`]: no capability could be acquired
    /// - [`RecoveryError::Provider`]: the call failed, including "not found"
    /// - [`RecoveryError::Cancelled`] / [`RecoveryError::TimedOut`]
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_vault(
        &self,
        vault_name: &str,
        resource_group: &str,
        subscription_id: &str,
    ) -> Result<Vault> {
        validate_name(vault_name)?;
        let guard = self.context.start();
        let (ids, capability) = self.prepare(&guard, resource_group, subscription_id).await?;
        let resource = format!("{}/{}", ids.resource_group, vault_name);

        let client = self.clients.vaults(&ids.subscription_id, capability);
        let vault = guard
            .run(client.get(&ids.resource_group, vault_name))
            .await
            .map_err(|e| wrap("get_vault", &resource, e))?;

        debug!(vault = vault_name, "fetched vault");
        Ok(vault)
    }

    /// Checks whether a vault exists under exactly the requested name.
    ///
    /// Caller beware: every failure, including missing configuration,
    /// authorization problems and transport errors, yields `false`. Use
    /// [`get_vault`](Self::get_vault) to tell those apart.
    pub async fn vault_exists(
        &self,
        vault_name: &str,
        resource_group: &str,
        subscription_id: &str,
    ) -> bool {
        match self.get_vault(vault_name, resource_group, subscription_id).await {
            Ok(vault) => vault.name.as_deref() == Some(vault_name),
            Err(e) => {
                debug!(vault = vault_name, error = %e, "vault existence check failed");
                false
            }
        }
    }

    /// Lists every backup policy of a vault, keyed by policy name.
    ///
    /// Duplicate names keep the last record seen. Policies without a name
    /// are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Same as [`get_vault`](Self::get_vault). A failure on any page fails
    /// the whole listing; no partial map is returned.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn list_backup_policies(
        &self,
        vault_name: &str,
        resource_group: &str,
        subscription_id: &str,
    ) -> Result<HashMap<String, ProtectionPolicyResource>> {
        validate_name(vault_name)?;
        let guard = self.context.start();
        let (ids, capability) = self.prepare(&guard, resource_group, subscription_id).await?;
        let resource = format!("{}/{}", ids.resource_group, vault_name);

        let client = self.clients.backup_policies(&ids.subscription_id, capability);
        let cursor = guard
            .run(client.list(vault_name, &ids.resource_group))
            .await
            .map_err(|e| wrap("list_backup_policies", &resource, e))?;

        let policies = drain_into_map(cursor, guard, |policy: ProtectionPolicyResource| {
            match policy.name.clone().filter(|n| !n.is_empty()) {
                Some(name) => Some((name, policy)),
                None => {
                    warn!(id = ?policy.id, "skipping backup policy without a name");
                    None
                }
            }
        })
        .await
        .map_err(|e| wrap("list_backup_policies", &resource, e))?;

        debug!(vault = vault_name, count = policies.len(), "listed backup policies");
        Ok(policies)
    }

    /// Like [`list_backup_policies`](Self::list_backup_policies), but returns
    /// an empty map on any error.
    ///
    /// Caller beware: an empty map may mean "no policies" or "query failed".
    pub async fn backup_policies_or_empty(
        &self,
        vault_name: &str,
        resource_group: &str,
        subscription_id: &str,
    ) -> HashMap<String, ProtectionPolicyResource> {
        self.list_backup_policies(vault_name, resource_group, subscription_id)
            .await
            .unwrap_or_else(|e| {
                debug!(vault = vault_name, error = %e, "backup policy listing failed");
                HashMap::new()
            })
    }

    /// Lists the Azure IaaS VMs protected under `policy_name`, keyed by
    /// friendly name.
    ///
    /// The service filters on backup management type, item type and policy.
    /// Items that are not compute VMs, that report a different policy, or
    /// that have no friendly name are skipped with a warning. Duplicate
    /// friendly names keep the last record seen.
    ///
    /// # Errors
    ///
    /// Same as [`list_backup_policies`](Self::list_backup_policies), plus
    /// [`RecoveryError::InvalidName`] if `policy_name` fails validation.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn list_protected_vms(
        &self,
        policy_name: &str,
        vault_name: &str,
        resource_group: &str,
        subscription_id: &str,
    ) -> Result<HashMap<String, AzureIaasComputeVmProtectedItem>> {
        validate_name(vault_name)?;
        let filter = ProtectedItemFilter::vms_for_policy(policy_name)?;
        let guard = self.context.start();
        let (ids, capability) = self.prepare(&guard, resource_group, subscription_id).await?;
        let resource = format!("{}/{}", ids.resource_group, vault_name);

        let client = self.clients.protected_items(&ids.subscription_id, capability);
        let cursor = guard
            .run(client.list(vault_name, &ids.resource_group, &filter))
            .await
            .map_err(|e| wrap("list_protected_vms", &resource, e))?;

        let vms = drain_into_map(cursor, guard, |item: ProtectedItemResource| {
            narrow_vm(item, policy_name)
        })
        .await
        .map_err(|e| wrap("list_protected_vms", &resource, e))?;

        debug!(
            vault = vault_name,
            policy = policy_name,
            count = vms.len(),
            "listed protected VMs"
        );
        Ok(vms)
    }

    /// Like [`list_protected_vms`](Self::list_protected_vms), but returns an
    /// empty map on any error.
    ///
    /// Caller beware: an empty map may mean "no protected VMs" or "query
    /// failed".
    pub async fn protected_vms_or_empty(
        &self,
        policy_name: &str,
        vault_name: &str,
        resource_group: &str,
        subscription_id: &str,
    ) -> HashMap<String, AzureIaasComputeVmProtectedItem> {
        self.list_protected_vms(policy_name, vault_name, resource_group, subscription_id)
            .await
            .unwrap_or_else(|e| {
                debug!(
                    vault = vault_name,
                    policy = policy_name,
                    error = %e,
                    "protected VM listing failed"
                );
                HashMap::new()
            })
    }
}

/// Narrows a listed item to a VM entry keyed by friendly name.
fn narrow_vm(
    item: ProtectedItemResource,
    policy_name: &str,
) -> Option<(String, AzureIaasComputeVmProtectedItem)> {
    let item_name = item.name;
    let vm = match item.properties.into_compute_vm() {
        Ok(vm) => vm,
        Err(ProtectedItem::Malformed { error, .. }) => {
            warn!(
                item = ?item_name,
                error = %error,
                "skipping protected VM that does not match the VM model"
            );
            return None;
        }
        Err(other) => {
            warn!(
                item = ?item_name,
                item_type = other.item_type(),
                "skipping protected item that is not an Azure IaaS compute VM"
            );
            return None;
        }
    };

    if let Some(governing) = vm.governing_policy() {
        if !governing.eq_ignore_ascii_case(policy_name) {
            warn!(
                item = ?item_name,
                expected = policy_name,
                actual = governing,
                "skipping protected VM governed by another policy"
            );
            return None;
        }
    }

    match vm.friendly_name.clone().filter(|n| !n.is_empty()) {
        Some(name) => Some((name, vm)),
        None => {
            warn!(item = ?item_name, "skipping protected VM without a friendly name");
            None
        }
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::backends::mock::MockProvider;
    use serde_json::Map;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn resolver() -> IdentifierResolver {
        IdentifierResolver::new(Some("sub-1".into()), Some("rg-1".into()))
    }

    async fn seeded() -> MockProvider {
        let mock = MockProvider::new();
        mock.add_vault("sub-1", "rg-1", "vault-A").await;
        mock
    }

    #[tokio::test]
    async fn test_get_vault_and_exists() {
        let mock = seeded().await;
        let services = mock.services(resolver());

        let vault = services.get_vault("vault-A", "rg-1", "sub-1").await.unwrap();
        assert_eq!(vault.name.as_deref(), Some("vault-A"));
        assert!(services.vault_exists("vault-A", "rg-1", "sub-1").await);
        assert!(!services.vault_exists("vault-B", "rg-1", "sub-1").await);
    }

    #[tokio::test]
    async fn test_get_vault_not_found_is_provider_error() {
        let mock = seeded().await;
        let err = mock
            .services(resolver())
            .get_vault("vault-B", "rg-1", "sub-1")
            .await
            .unwrap_err();

        assert!(matches!(err, RecoveryError::Provider { .. }));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_defaults_are_used_for_empty_identifiers() {
        let mock = seeded().await;
        let services = mock.services(resolver());

        assert!(services.vault_exists("vault-A", "", "").await);
        let calls = mock.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].subscription_id, "sub-1");
        assert_eq!(calls[0].resource_group, "rg-1");
    }

    #[tokio::test]
    async fn test_missing_configuration_short_circuits() {
        let mock = seeded().await;
        let services = mock.services(IdentifierResolver::default());

        let err = services.get_vault("vault-A", "rg-1", "").await.unwrap_err();
        assert!(matches!(err, RecoveryError::MissingConfiguration(_)));
        assert!(mock.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_authorization_failure() {
        let mock = seeded().await;
        mock.fail_authorization("no credentials").await;

        let services = mock.services(resolver());
        let err = services.get_vault("vault-A", "", "").await.unwrap_err();
        assert!(matches!(err, RecoveryError::Authorization(_)));
        assert!(!services.vault_exists("vault-A", "", "").await);
        assert!(services.backup_policies_or_empty("vault-A", "", "").await.is_empty());
    }

    #[tokio::test]
    async fn test_each_call_authorizes_again() {
        let mock = seeded().await;
        let services = mock.services(resolver());

        services.get_vault("vault-A", "", "").await.unwrap();
        services.get_vault("vault-A", "", "").await.unwrap();
        assert_eq!(mock.authorizations().await, 2);
    }

    #[tokio::test]
    async fn test_policies_empty_vault() {
        let mock = seeded().await;
        let policies = mock
            .services(resolver())
            .list_backup_policies("vault-A", "", "")
            .await
            .unwrap();
        assert!(policies.is_empty());
    }

    #[tokio::test]
    async fn test_unnamed_policy_skipped() {
        let mock = seeded().await;
        mock.add_policies(
            "sub-1",
            "rg-1",
            "vault-A",
            vec![ProtectionPolicyResource::default(), ProtectionPolicyResource::new("p1")],
        )
        .await;

        let policies = mock
            .services(resolver())
            .list_backup_policies("vault-A", "", "")
            .await
            .unwrap();
        assert_eq!(policies.len(), 1);
        assert!(policies.contains_key("p1"));
    }

    #[tokio::test]
    async fn test_invalid_policy_name_rejected_before_any_call() {
        let mock = seeded().await;
        let services = mock.services(resolver());

        let err = services
            .list_protected_vms("x' or policyName ne '", "vault-A", "", "")
            .await
            .unwrap_err();
        assert!(matches!(err, RecoveryError::InvalidName(_)));
        assert_eq!(mock.authorizations().await, 0);
    }

    #[tokio::test]
    async fn test_non_vm_items_are_skipped() {
        let mock = seeded().await;
        mock.set_filter_enforced(false).await;

        let mut share = Map::new();
        share.insert("friendlyName".into(), "share-1".into());
        share.insert("policyName".into(), "policyA".into());
        mock.add_protected_items(
            "sub-1",
            "rg-1",
            "vault-A",
            vec![
                ProtectedItemResource::other("AzureFileShareProtectedItem", share),
                ProtectedItemResource::compute_vm(AzureIaasComputeVmProtectedItem::new(
                    "vm-1", "policyA",
                )),
            ],
        )
        .await;

        let vms = mock
            .services(resolver())
            .list_protected_vms("policyA", "vault-A", "", "")
            .await
            .unwrap();
        assert_eq!(vms.len(), 1);
        assert!(vms.contains_key("vm-1"));
    }

    #[tokio::test]
    async fn test_vm_without_friendly_name_skipped() {
        let mut vm = AzureIaasComputeVmProtectedItem::new("x", "policyA");
        vm.friendly_name = None;
        let item = ProtectedItemResource {
            id: None,
            name: Some("VM;anonymous".into()),
            resource_type: None,
            properties: ProtectedItem::ComputeVm(vm),
        };
        assert!(narrow_vm(item, "policyA").is_none());
    }

    #[test]
    fn test_malformed_vm_skipped() {
        let mut properties = Map::new();
        properties.insert("friendlyName".into(), "vm-bad".into());
        let item = ProtectedItemResource {
            id: None,
            name: Some("VM;bad".into()),
            resource_type: None,
            properties: ProtectedItem::Malformed {
                properties,
                error: "premature end of input".into(),
            },
        };
        assert!(narrow_vm(item, "policyA").is_none());
    }

    #[tokio::test]
    async fn test_cancelled_context() {
        let mock = seeded().await;
        let token = CancellationToken::new();
        token.cancel();

        let services = mock
            .services(resolver())
            .with_context(CallContext::new().with_cancellation(token));
        let err = services.get_vault("vault-A", "", "").await.unwrap_err();
        assert!(matches!(err, RecoveryError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out() {
        let mock = seeded().await;
        mock.set_latency(Duration::from_secs(5)).await;

        let services = mock
            .services(resolver())
            .with_context(CallContext::new().with_timeout(Duration::from_secs(1)));
        let err = services.get_vault("vault-A", "", "").await.unwrap_err();
        assert!(matches!(err, RecoveryError::TimedOut(_)));
    }
}
