//! Name validation and server-side filter construction.
//!
//! Policy names end up inside an OData `$filter` expression, so they are
//! treated as untrusted input: checked against an allow-list before any
//! request is built, and quoted when rendered.

use crate::{RecoveryError, Result};

/// Maximum allowed length for vault and policy names.
const MAX_NAME_LENGTH: usize = 150;

/// Backup management type of Azure IaaS VM items.
pub const AZURE_IAAS_VM: &str = "AzureIaasVM";

/// Item type of virtual machines.
pub const ITEM_TYPE_VM: &str = "VM";

/// Validates a vault or policy name.
///
/// Accepted names are 1 to 150 characters of ASCII letters, digits, `-`,
/// `_` and `.`, starting with a letter or digit.
///
/// # Errors
///
/// Returns [`RecoveryError::InvalidName`] if validation fails.
///
/// # Example
///
/// ```
/// use recoveryvault::filter::validate_name;
///
/// assert!(validate_name("DefaultPolicy").is_ok());
/// assert!(validate_name("daily-vm_policy.v2").is_ok());
///
/// assert!(validate_name("").is_err());
/// assert!(validate_name("x' or policyName ne '").is_err());
/// ```
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RecoveryError::InvalidName(
            "name cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(RecoveryError::InvalidName(format!(
            "name exceeds maximum length of {} characters",
            MAX_NAME_LENGTH
        )));
    }

    if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(RecoveryError::InvalidName(format!(
            "{:?} must start with a letter or digit",
            name
        )));
    }

    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(RecoveryError::InvalidName(format!(
            "{:?} contains disallowed character {:?}",
            name, bad
        )));
    }

    Ok(())
}

/// Renders `value` as an OData string literal.
///
/// Embedded single quotes are doubled.
pub fn odata_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Filter restricting a protected item listing.
///
/// Built from typed parts rather than a raw string; providers either render
/// it with [`to_odata`](Self::to_odata) or evaluate it with
/// [`matches`](Self::matches).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedItemFilter {
    backup_management_type: String,
    item_type: String,
    policy_name: String,
}

impl ProtectedItemFilter {
    /// Selects Azure IaaS VM items governed by `policy_name`.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::InvalidName`] if `policy_name` fails
    /// [`validate_name`].
    ///
    /// # Example
    ///
    /// ```
    /// use recoveryvault::filter::ProtectedItemFilter;
    ///
    /// let filter = ProtectedItemFilter::vms_for_policy("policyA").unwrap();
    /// assert_eq!(
    ///     filter.to_odata(),
    ///     "backupManagementType eq 'AzureIaasVM' and itemType eq 'VM' and policyName eq 'policyA'"
    /// );
    /// ```
    pub fn vms_for_policy(policy_name: &str) -> Result<Self> {
        validate_name(policy_name)?;
        Ok(Self {
            backup_management_type: AZURE_IAAS_VM.to_string(),
            item_type: ITEM_TYPE_VM.to_string(),
            policy_name: policy_name.to_string(),
        })
    }

    /// Required backup management type.
    pub fn backup_management_type(&self) -> &str {
        &self.backup_management_type
    }

    /// Required item type.
    pub fn item_type(&self) -> &str {
        &self.item_type
    }

    /// Required policy name.
    pub fn policy_name(&self) -> &str {
        &self.policy_name
    }

    /// Renders the filter as an OData `$filter` expression.
    pub fn to_odata(&self) -> String {
        format!(
            "backupManagementType eq {} and itemType eq {} and policyName eq {}",
            odata_literal(&self.backup_management_type),
            odata_literal(&self.item_type),
            odata_literal(&self.policy_name)
        )
    }

    /// Evaluates the filter against item attributes.
    ///
    /// Absent attributes never match.
    pub fn matches(
        &self,
        backup_management_type: Option<&str>,
        item_type: Option<&str>,
        policy_name: Option<&str>,
    ) -> bool {
        backup_management_type == Some(self.backup_management_type.as_str())
            && item_type == Some(self.item_type.as_str())
            && policy_name == Some(self.policy_name.as_str())
    }
}

impl std::fmt::Display for ProtectedItemFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_odata())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(validate_name("DefaultPolicy").is_ok());
        assert!(validate_name("vault-A").is_ok());
        assert!(validate_name("policy_1.daily").is_ok());
        assert!(validate_name("9lives").is_ok());
    }

    #[test]
    fn test_empty_name() {
        let result = validate_name("");
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_too_long() {
        let long_name = "a".repeat(151);
        let result = validate_name(&long_name);
        assert!(result.unwrap_err().to_string().contains("maximum length"));
        assert!(validate_name(&"a".repeat(150)).is_ok());
    }

    #[test]
    fn test_must_start_alphanumeric() {
        assert!(validate_name("-policy").is_err());
        assert!(validate_name(".policy").is_err());
    }

    #[test]
    fn test_filter_injection_attempts() {
        let hostile = vec![
            "policyA' or policyName ne '",
            "policyA'",
            "policy A",
            "policy;drop",
            "policy\0null",
            "policy\nline",
            "polícy",
            "policy/../x",
        ];

        for name in hostile {
            let result = ProtectedItemFilter::vms_for_policy(name);
            assert!(
                matches!(result, Err(RecoveryError::InvalidName(_))),
                "Expected {:?} to fail validation",
                name
            );
        }
    }

    #[test]
    fn test_odata_literal_doubles_quotes() {
        assert_eq!(odata_literal("plain"), "'plain'");
        assert_eq!(odata_literal("it's"), "'it''s'");
    }

    #[test]
    fn test_filter_matches() {
        let filter = ProtectedItemFilter::vms_for_policy("policyA").unwrap();
        assert!(filter.matches(Some("AzureIaasVM"), Some("VM"), Some("policyA")));
        assert!(!filter.matches(Some("AzureIaasVM"), Some("VM"), Some("policyB")));
        assert!(!filter.matches(Some("AzureStorage"), Some("VM"), Some("policyA")));
        assert!(!filter.matches(Some("AzureIaasVM"), None, Some("policyA")));
    }

    #[test]
    fn test_filter_display() {
        let filter = ProtectedItemFilter::vms_for_policy("p1").unwrap();
        assert_eq!(filter.to_string(), filter.to_odata());
        assert_eq!(filter.policy_name(), "p1");
    }
}
