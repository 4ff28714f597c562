//! Resource records returned by the Recovery Services management API.
//!
//! Only identity fields are typed. Everything else the service sends is kept
//! as JSON so callers can assert on it without this crate modelling it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// ARM discriminator for Azure IaaS compute VM protected items.
pub const COMPUTE_VM_ITEM_TYPE: &str = "Microsoft.Compute/virtualMachines";

/// Name of the discriminator field on protected item properties.
const ITEM_TYPE_FIELD: &str = "protectedItemType";

/// Vault SKU.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Sku {
    /// SKU name (e.g., "Standard", "RS0")
    pub name: String,

    /// SKU tier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
}

/// A Recovery Services vault.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Vault {
    /// Fully qualified resource ID
    #[serde(default)]
    pub id: Option<String>,

    /// Vault name
    #[serde(default)]
    pub name: Option<String>,

    /// Resource type
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,

    /// Azure region
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Resource tags
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,

    /// Entity tag
    #[serde(rename = "etag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    /// SKU
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<Sku>,

    /// Service-defined properties
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub properties: Value,

    /// Fields not modelled above (e.g., `identity`, `systemData`)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Vault {
    /// Creates a vault record with a well-formed resource ID.
    ///
    /// # Example
    ///
    /// ```
    /// use recoveryvault::Vault;
    ///
    /// let vault = Vault::new("vault-A", "rg-1", "sub-1");
    /// assert_eq!(vault.name.as_deref(), Some("vault-A"));
    /// assert_eq!(
    ///     vault.id.as_deref(),
    ///     Some("/subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.RecoveryServices/vaults/vault-A")
    /// );
    /// ```
    pub fn new(
        name: impl Into<String>,
        resource_group: impl AsRef<str>,
        subscription_id: impl AsRef<str>,
    ) -> Self {
        let name = name.into();
        Self {
            id: Some(format!(
                "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.RecoveryServices/vaults/{}",
                subscription_id.as_ref(),
                resource_group.as_ref(),
                name
            )),
            name: Some(name),
            resource_type: Some("Microsoft.RecoveryServices/vaults".to_string()),
            ..Default::default()
        }
    }
}

/// A backup policy attached to a vault.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProtectionPolicyResource {
    /// Fully qualified resource ID
    #[serde(default)]
    pub id: Option<String>,

    /// Policy name, unique within the vault
    #[serde(default)]
    pub name: Option<String>,

    /// Resource type
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,

    /// Azure region
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Resource tags
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,

    /// Entity tag
    #[serde(rename = "eTag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    /// Policy definition (schedule, retention, ...)
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub properties: Value,
}

impl ProtectionPolicyResource {
    /// Creates a policy record with just a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            resource_type: Some(
                "Microsoft.RecoveryServices/vaults/backupPolicies".to_string(),
            ),
            ..Default::default()
        }
    }

    /// Sets the policy properties.
    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = properties;
        self
    }
}

/// Properties of an Azure IaaS compute VM enrolled in backup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AzureIaasComputeVmProtectedItem {
    /// Display name of the VM
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,

    /// Resource ID of the VM
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_machine_id: Option<String>,

    /// Resource ID of the backed-up resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_resource_id: Option<String>,

    /// Resource ID of the governing backup policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,

    /// Name of the governing backup policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_name: Option<String>,

    /// Backup management type (e.g., "AzureIaasVM")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_management_type: Option<String>,

    /// Workload type (e.g., "VM")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_type: Option<String>,

    /// Protection container name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,

    /// Protection status (e.g., "Healthy")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protection_status: Option<String>,

    /// Protection state (e.g., "Protected", "ProtectionStopped")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protection_state: Option<String>,

    /// Health status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_status: Option<String>,

    /// Status of the last backup job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_backup_status: Option<String>,

    /// When the last backup ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_backup_time: Option<DateTime<Utc>>,

    /// Fields not modelled above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AzureIaasComputeVmProtectedItem {
    /// Creates a VM item governed by `policy_name`.
    pub fn new(friendly_name: impl Into<String>, policy_name: impl Into<String>) -> Self {
        Self {
            friendly_name: Some(friendly_name.into()),
            policy_name: Some(policy_name.into()),
            backup_management_type: Some("AzureIaasVM".to_string()),
            workload_type: Some("VM".to_string()),
            ..Default::default()
        }
    }

    /// Name of the governing policy.
    ///
    /// Uses `policyName` when the service sends it, otherwise the last
    /// segment of `policyId`.
    pub fn governing_policy(&self) -> Option<&str> {
        self.policy_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or_else(|| {
                self.policy_id
                    .as_deref()
                    .and_then(|id| id.trim_end_matches('/').rsplit('/').next())
                    .filter(|n| !n.is_empty())
            })
    }
}

/// Protected item properties, discriminated by `protectedItemType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum ProtectedItem {
    /// An Azure IaaS compute VM
    ComputeVm(AzureIaasComputeVmProtectedItem),

    /// Any other kind of protected item, kept verbatim
    Other {
        /// Discriminator value (empty if the service sent none)
        item_type: String,
        /// Raw properties, discriminator included
        properties: Map<String, Value>,
    },

    /// A VM-tagged item whose fields do not fit the VM model
    Malformed {
        /// Raw properties, discriminator included
        properties: Map<String, Value>,
        /// Why the VM model rejected them
        error: String,
    },
}

impl ProtectedItem {
    /// The `protectedItemType` discriminator.
    pub fn item_type(&self) -> &str {
        match self {
            Self::ComputeVm(_) | Self::Malformed { .. } => COMPUTE_VM_ITEM_TYPE,
            Self::Other { item_type, .. } => item_type,
        }
    }

    /// Borrows the VM variant, if this is one.
    pub fn as_compute_vm(&self) -> Option<&AzureIaasComputeVmProtectedItem> {
        match self {
            Self::ComputeVm(vm) => Some(vm),
            Self::Other { .. } | Self::Malformed { .. } => None,
        }
    }

    /// Raw properties of items that are not a well-formed VM.
    pub fn raw_properties(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::ComputeVm(_) => None,
            Self::Other { properties, .. } | Self::Malformed { properties, .. } => {
                Some(properties)
            }
        }
    }

    /// Narrows to the VM variant, handing the item back unchanged otherwise.
    pub fn into_compute_vm(self) -> std::result::Result<AzureIaasComputeVmProtectedItem, Self> {
        match self {
            Self::ComputeVm(vm) => Ok(vm),
            other => Err(other),
        }
    }
}

impl TryFrom<Value> for ProtectedItem {
    type Error = serde_json::Error;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        let properties = match value {
            Value::Object(map) => map,
            other => {
                return Err(serde::de::Error::custom(format!(
                    "protected item properties must be an object, got {}",
                    other
                )))
            }
        };

        let item_type = properties
            .get(ITEM_TYPE_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if item_type == COMPUTE_VM_ITEM_TYPE {
            let mut fields = properties.clone();
            fields.remove(ITEM_TYPE_FIELD);
            // A bad record must not fail the page it arrived on
            Ok(match serde_json::from_value(Value::Object(fields)) {
                Ok(vm) => Self::ComputeVm(vm),
                Err(e) => Self::Malformed {
                    properties,
                    error: e.to_string(),
                },
            })
        } else {
            Ok(Self::Other {
                item_type,
                properties,
            })
        }
    }
}

impl From<ProtectedItem> for Value {
    fn from(item: ProtectedItem) -> Self {
        match item {
            ProtectedItem::ComputeVm(vm) => {
                let mut value = serde_json::to_value(vm).unwrap_or_else(|_| Value::Object(Map::new()));
                if let Value::Object(ref mut map) = value {
                    map.insert(
                        ITEM_TYPE_FIELD.to_string(),
                        Value::String(COMPUTE_VM_ITEM_TYPE.to_string()),
                    );
                }
                value
            }
            ProtectedItem::Other { properties, .. }
            | ProtectedItem::Malformed { properties, .. } => Value::Object(properties),
        }
    }
}

/// A protected item as listed under a vault.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProtectedItemResource {
    /// Fully qualified resource ID
    #[serde(default)]
    pub id: Option<String>,

    /// Item name (e.g., "VM;iaasvmcontainerv2;rg-1;vm-1")
    #[serde(default)]
    pub name: Option<String>,

    /// Resource type
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,

    /// Item properties
    pub properties: ProtectedItem,
}

impl ProtectedItemResource {
    /// Wraps a VM item.
    pub fn compute_vm(vm: AzureIaasComputeVmProtectedItem) -> Self {
        Self {
            id: None,
            name: vm.friendly_name.as_ref().map(|n| format!("VM;iaasvmcontainerv2;{}", n)),
            resource_type: Some(
                "Microsoft.RecoveryServices/vaults/backupFabrics/protectionContainers/protectedItems"
                    .to_string(),
            ),
            properties: ProtectedItem::ComputeVm(vm),
        }
    }

    /// Wraps a non-VM item with raw properties.
    pub fn other(item_type: impl Into<String>, properties: Map<String, Value>) -> Self {
        let item_type = item_type.into();
        let mut properties = properties;
        properties.insert(ITEM_TYPE_FIELD.to_string(), Value::String(item_type.clone()));
        Self {
            id: None,
            name: None,
            resource_type: None,
            properties: ProtectedItem::Other {
                item_type,
                properties,
            },
        }
    }
}
