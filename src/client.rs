//! Management client traits.
//!
//! This module defines the seams between the [`RecoveryServices`](crate::RecoveryServices)
//! facade and a concrete management API: three subscription-scoped clients,
//! the [`PageCursor`] their list calls return, and the [`ClientFactory`] that
//! builds them.

use crate::filter::ProtectedItemFilter;
use crate::{Capability, ProtectedItemResource, ProtectionPolicyResource, Result, Vault};
use async_trait::async_trait;

/// Sequential handle over a paginated result set.
///
/// A freshly returned cursor is positioned on the first page. The walk is:
///
/// ```text
/// while cursor.has_more() {
///     consume(cursor.current());
///     cursor.advance().await?;
/// }
/// ```
#[async_trait]
pub trait PageCursor<T>: Send {
    /// Whether a page is available to read.
    fn has_more(&self) -> bool;

    /// Values of the current page. Empty once the cursor is exhausted.
    fn current(&self) -> &[T];

    /// Moves to the next page, or past the end if there is none.
    ///
    /// # Errors
    ///
    /// Fails if the next page cannot be fetched. The cursor must not be
    /// used after a failed advance.
    async fn advance(&mut self) -> Result<()>;
}

/// Cursor over pages that are already in memory.
///
/// # Example
///
/// ```
/// use recoveryvault::client::{PageCursor, VecCursor};
///
/// #[tokio::main]
/// async fn main() -> recoveryvault::Result<()> {
///     let mut cursor = VecCursor::new(vec![vec![1, 2], vec![3]]);
///     let mut seen = Vec::new();
///     while cursor.has_more() {
///         seen.extend_from_slice(cursor.current());
///         cursor.advance().await?;
///     }
///     assert_eq!(seen, vec![1, 2, 3]);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct VecCursor<T> {
    pages: std::collections::VecDeque<Vec<T>>,
}

impl<T> VecCursor<T> {
    /// Creates a cursor positioned on the first of `pages`.
    pub fn new(pages: Vec<Vec<T>>) -> Self {
        Self {
            pages: pages.into(),
        }
    }
}

#[async_trait]
impl<T: Send + Sync> PageCursor<T> for VecCursor<T> {
    fn has_more(&self) -> bool {
        !self.pages.is_empty()
    }

    fn current(&self) -> &[T] {
        self.pages.front().map(Vec::as_slice).unwrap_or(&[])
    }

    async fn advance(&mut self) -> Result<()> {
        self.pages.pop_front();
        Ok(())
    }
}

/// Reads Recovery Services vaults.
#[async_trait]
pub trait VaultsClient: Send + Sync {
    /// Fetches one vault by name.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::NotFound`](crate::RecoveryError::NotFound) if
    /// the vault does not exist, or another error if the call fails.
    async fn get(&self, resource_group: &str, vault_name: &str) -> Result<Vault>;
}

/// Lists the backup policies of a vault.
#[async_trait]
pub trait BackupPoliciesClient: Send + Sync {
    /// Starts listing every policy of `vault_name`.
    async fn list(
        &self,
        vault_name: &str,
        resource_group: &str,
    ) -> Result<Box<dyn PageCursor<ProtectionPolicyResource>>>;
}

/// Lists the protected items of a vault.
#[async_trait]
pub trait ProtectedItemsClient: Send + Sync {
    /// Starts listing the items of `vault_name` selected by `filter`.
    ///
    /// The filter is applied by the service.
    async fn list(
        &self,
        vault_name: &str,
        resource_group: &str,
        filter: &ProtectedItemFilter,
    ) -> Result<Box<dyn PageCursor<ProtectedItemResource>>>;
}

/// Builds subscription-scoped clients carrying a capability.
///
/// Clients are constructed per operation and never reused across calls.
pub trait ClientFactory: Send + Sync {
    /// Returns the factory name (e.g., "mock", "arm").
    fn name(&self) -> &str;

    /// Creates a vaults client.
    fn vaults(&self, subscription_id: &str, capability: Capability) -> Box<dyn VaultsClient>;

    /// Creates a backup policies client.
    fn backup_policies(
        &self,
        subscription_id: &str,
        capability: Capability,
    ) -> Box<dyn BackupPoliciesClient>;

    /// Creates a protected items client.
    fn protected_items(
        &self,
        subscription_id: &str,
        capability: Capability,
    ) -> Box<dyn ProtectedItemsClient>;
}
