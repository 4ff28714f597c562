//! Recoveryvault - Azure Recovery Services queries for infrastructure tests.
//!
//! Recoveryvault answers the questions an infrastructure test suite asks about
//! Azure Backup: does this Recovery Services vault exist, which backup
//! policies does it hold, and which virtual machines are protected under a
//! given policy. Results come back as plain maps keyed by name, ready for
//! assertions.
//!
//! # Features
//!
//! - **Async/Await**: Built on tokio, with cancellation and time budgets per call
//! - **Defaults**: Subscription and resource group fall back to configured values
//! - **Pagination**: Listings are drained completely or fail as a whole
//! - **Safe Filters**: Policy names are validated before they reach a query
//! - **Error Context**: Rich error types with full context and chaining
//! - **Feature Flags**: Optional provider compilation to minimize dependencies
//!
//! # Quick Start
//!
//! ```no_run
//! use recoveryvault::{factory, Config};
//!
//! #[tokio::main]
//! async fn main() -> recoveryvault::Result<()> {
//!     // Reads ARM_SUBSCRIPTION_ID, AZURE_RES_GROUP_NAME, ...
//!     let services = factory::new_recovery_services(Config::from_env()?)?;
//!
//!     // Empty identifiers use the configured defaults
//!     assert!(services.vault_exists("vault-A", "", "").await);
//!
//!     let policies = services.list_backup_policies("vault-A", "", "").await?;
//!     for name in policies.keys() {
//!         let vms = services.list_protected_vms(name, "vault-A", "", "").await?;
//!         println!("{}: {} protected VMs", name, vms.len());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Supported Providers
//!
//! | Provider | Feature Flag | Notes |
//! |----------|-------------|-------|
//! | Mock | `mock` (default) | In-memory testing provider |
//! | Resource Manager | `arm` (default) | REST over `reqwest`, `DefaultAzureCredential` or Azure CLI |
//!
//! # Logging
//!
//! The crate emits `tracing` events (`debug` per request, `warn` for skipped
//! records) and installs no subscriber.

pub mod auth;
pub mod backends;
pub mod cli;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod factory;
pub mod filter;
pub mod models;
mod pager;
pub mod recovery;
pub mod resolver;

pub use auth::{AuthorizationProvider, Capability};
pub use config::{AuthMethod, CloudEnvironment, Config, ProviderType};
pub use context::CallContext;
pub use error::{RecoveryError, Result};
pub use models::{
    AzureIaasComputeVmProtectedItem, ProtectedItem, ProtectedItemResource,
    ProtectionPolicyResource, Vault,
};
pub use recovery::RecoveryServices;

use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes the recoveryvault library.
///
/// This registers all compiled providers with the factory. It's called
/// automatically by [`factory::new_recovery_services`], but can be called
/// explicitly if needed (it's idempotent).
pub fn init() {
    INIT.call_once(backends::register_all);
}
