//! Azure Resource Manager provider.
//!
//! This provider calls the Recovery Services REST API directly with
//! `reqwest`, following `nextLink` for paginated listings.
//!
//! # Authentication
//!
//! Selected by [`Config::auth`](crate::Config):
//! - [`AuthMethod::DefaultCredential`]: `DefaultAzureCredential` (environment
//!   variables, managed identity, Azure CLI)
//! - [`AuthMethod::AzureCli`]: `az account get-access-token`
//!
//! A `token` option bypasses both and sends a fixed bearer token, which is
//! mostly useful against a local test server.
//!
//! # Configuration
//!
//! - `endpoint`: management endpoint override
//! - `user_agent`: custom `User-Agent` header
//! - `token`: fixed bearer token
//!
//! # Example
//!
//! ```
//! use recoveryvault::{AuthMethod, Config, ProviderType};
//!
//! let config = Config::new(ProviderType::ResourceManager)
//!     .with_auth(AuthMethod::AzureCli)
//!     .with_default_subscription("00000000-0000-0000-0000-000000000000");
//! ```

mod auth;
mod client;

pub use auth::DefaultCredentialAuthorizer;
pub use client::{ArmClientFactory, BACKUP_API_VERSION, VAULTS_API_VERSION};

use crate::auth::{AuthorizationProvider, AzureCliAuthorizer, StaticTokenAuthorizer};
use crate::factory::{self, Provider};
use crate::{AuthMethod, Config, Result};
use std::sync::Arc;

/// Picks the authorization provider `config` asks for.
pub fn authorizer_for(config: &Config) -> Result<Arc<dyn AuthorizationProvider>> {
    if let Some(token) = config.get_option("token") {
        return Ok(Arc::new(StaticTokenAuthorizer::new(token.clone())));
    }

    Ok(match config.auth {
        AuthMethod::DefaultCredential => {
            Arc::new(DefaultCredentialAuthorizer::new(config.environment)?)
        }
        AuthMethod::AzureCli => {
            let cli = AzureCliAuthorizer::new(config.environment);
            match config.get_option("tenant_id") {
                Some(tenant) => Arc::new(cli.with_tenant(tenant.clone())),
                None => Arc::new(cli),
            }
        }
    })
}

/// Registers the Resource Manager provider with the factory.
pub fn register() {
    factory::register_provider("arm", |config| {
        Ok(Provider {
            authorizer: authorizer_for(config)?,
            clients: Arc::new(ArmClientFactory::new(config)?),
        })
    });
}
