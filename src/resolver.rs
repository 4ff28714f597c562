//! Resolution of subscription and resource-group identifiers.

use crate::{Config, RecoveryError, Result};

/// A subscription / resource-group pair ready to address a vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentifiers {
    /// Subscription ID
    pub subscription_id: String,
    /// Resource group name
    pub resource_group: String,
}

/// Fills empty identifiers from configured defaults.
///
/// The defaults are captured at construction and never change afterwards.
///
/// # Example
///
/// ```
/// use recoveryvault::resolver::IdentifierResolver;
///
/// let resolver = IdentifierResolver::new(Some("sub-default".into()), None);
///
/// let ids = resolver.resolve("", "rg-1").unwrap();
/// assert_eq!(ids.subscription_id, "sub-default");
/// assert_eq!(ids.resource_group, "rg-1");
///
/// assert!(resolver.resolve("sub-1", "").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct IdentifierResolver {
    default_subscription_id: Option<String>,
    default_resource_group: Option<String>,
}

impl IdentifierResolver {
    /// Creates a resolver with explicit defaults.
    pub fn new(
        default_subscription_id: Option<String>,
        default_resource_group: Option<String>,
    ) -> Self {
        Self {
            default_subscription_id: default_subscription_id.filter(|s| !s.is_empty()),
            default_resource_group: default_resource_group.filter(|s| !s.is_empty()),
        }
    }

    /// Creates a resolver from the defaults in `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.default_subscription_id.clone(),
            config.default_resource_group.clone(),
        )
    }

    /// Returns `subscription_id`, or the default when it is empty.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::MissingConfiguration`] when both are empty.
    pub fn resolve_subscription(&self, subscription_id: &str) -> Result<String> {
        pick(subscription_id, self.default_subscription_id.as_deref()).ok_or_else(|| {
            RecoveryError::MissingConfiguration(
                "subscription ID is empty and no default subscription is configured".to_string(),
            )
        })
    }

    /// Returns `resource_group`, or the default when it is empty.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::MissingConfiguration`] when both are empty.
    pub fn resolve_resource_group(&self, resource_group: &str) -> Result<String> {
        pick(resource_group, self.default_resource_group.as_deref()).ok_or_else(|| {
            RecoveryError::MissingConfiguration(
                "resource group name is empty and no default resource group is configured"
                    .to_string(),
            )
        })
    }

    /// Resolves both identifiers, checking each one on its own.
    pub fn resolve(&self, subscription_id: &str, resource_group: &str) -> Result<ResolvedIdentifiers> {
        let subscription_id = self.resolve_subscription(subscription_id)?;
        let resource_group = self.resolve_resource_group(resource_group)?;
        Ok(ResolvedIdentifiers {
            subscription_id,
            resource_group,
        })
    }
}

fn pick(value: &str, default: Option<&str>) -> Option<String> {
    if !value.is_empty() {
        Some(value.to_string())
    } else {
        default.map(str::to_string)
    }
}
