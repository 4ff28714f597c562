//! Provider factory and registration system.

use crate::auth::AuthorizationProvider;
use crate::client::ClientFactory;
use crate::resolver::IdentifierResolver;
use crate::{CallContext, Config, RecoveryError, RecoveryServices, Result};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// The two halves a facade is built from.
pub struct Provider {
    /// Source of capabilities
    pub authorizer: Arc<dyn AuthorizationProvider>,
    /// Builder of management clients
    pub clients: Arc<dyn ClientFactory>,
}

/// Factory function type for creating providers.
pub type ProviderFactory = fn(&Config) -> Result<Provider>;

static PROVIDER_REGISTRY: OnceLock<RwLock<HashMap<String, ProviderFactory>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<String, ProviderFactory>> {
    PROVIDER_REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Registers a provider factory function.
///
/// This is typically called from provider modules' `register()` functions
/// during library initialization. Registering a name twice replaces the
/// earlier factory.
///
/// # Example
///
/// ```
/// use recoveryvault::auth::StaticTokenAuthorizer;
/// use recoveryvault::backends::mock::MockProvider;
/// use recoveryvault::factory::{register_provider, Provider};
/// use recoveryvault::{Config, Result};
/// use std::sync::Arc;
///
/// fn fixed_token(_config: &Config) -> Result<Provider> {
///     Ok(Provider {
///         authorizer: Arc::new(StaticTokenAuthorizer::new("t0ken")),
///         clients: Arc::new(MockProvider::new()),
///     })
/// }
///
/// register_provider("fixed-token", fixed_token);
/// ```
pub fn register_provider(name: &str, factory: ProviderFactory) {
    let mut reg = registry().write().unwrap_or_else(PoisonError::into_inner);
    reg.insert(name.to_string(), factory);
}

/// Creates a new facade from configuration.
///
/// The provider is looked up by `config.provider`. Identifier defaults come
/// from the configuration, and `config.request_timeout` bounds every
/// operation of the returned facade.
///
/// # Errors
///
/// Returns an error if:
/// - The provider is not registered (missing feature flag)
/// - The provider factory fails, e.g. no credential source could be set up
///
/// # Example
///
/// ```no_run
/// use recoveryvault::{factory, Config};
///
/// #[tokio::main]
/// async fn main() -> recoveryvault::Result<()> {
///     let services = factory::new_recovery_services(Config::from_env()?)?;
///     let policies = services.list_backup_policies("vault-A", "", "").await?;
///     println!("{} policies", policies.len());
///     Ok(())
/// }
/// ```
pub fn new_recovery_services(config: Config) -> Result<RecoveryServices> {
    crate::init();

    let provider_name = config.provider.to_string();
    let factory = {
        let reg = registry().read().unwrap_or_else(PoisonError::into_inner);
        *reg.get(&provider_name).ok_or_else(|| {
            RecoveryError::Other(anyhow::anyhow!(
                "unknown provider: {} (did you enable the '{}' feature flag?)",
                provider_name,
                provider_name
            ))
        })?
    };

    let provider = factory(&config)?;
    let mut context = CallContext::new();
    if let Some(timeout) = config.request_timeout {
        context = context.with_timeout(timeout);
    }

    Ok(RecoveryServices::new(
        IdentifierResolver::from_config(&config),
        provider.authorizer,
        provider.clients,
    )
    .with_context(context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProviderType;
    use std::time::Duration;

    fn failing_factory(_cfg: &Config) -> Result<Provider> {
        Err(RecoveryError::Other(anyhow::anyhow!("failing factory")))
    }

    #[test]
    fn test_provider_registration() {
        register_provider("test-provider", failing_factory);

        let reg = registry().read().unwrap();
        assert!(reg.contains_key("test-provider"));
    }

    #[test]
    #[cfg(not(feature = "arm"))]
    fn test_unknown_provider_error() {
        let result = new_recovery_services(Config::new(ProviderType::ResourceManager));

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("unknown provider"));
        assert!(err_msg.contains("feature flag"));
    }

    #[test]
    #[cfg(feature = "mock")]
    fn test_mock_provider_from_config() {
        let config = Config::new(ProviderType::Mock)
            .with_default_subscription("sub-1")
            .with_request_timeout(Duration::from_secs(5));

        let services = new_recovery_services(config).unwrap();
        assert_eq!(services.context().timeout(), Some(Duration::from_secs(5)));
        assert_eq!(
            services.resolver().resolve("", "rg-1").unwrap().subscription_id,
            "sub-1"
        );
    }
}
