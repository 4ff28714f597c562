//! Configuration types for building a [`RecoveryServices`](crate::RecoveryServices) facade.

use crate::{RecoveryError, Result};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable holding the default subscription ID.
pub const SUBSCRIPTION_ID_ENV: &str = "ARM_SUBSCRIPTION_ID";
/// Environment variable holding the default resource group name.
pub const RESOURCE_GROUP_ENV: &str = "AZURE_RES_GROUP_NAME";
/// Environment variable selecting the Azure cloud.
pub const ENVIRONMENT_ENV: &str = "AZURE_ENVIRONMENT";
/// Environment variable selecting the credential source (`cli` or `default`).
pub const AUTH_METHOD_ENV: &str = "AZURE_AUTH_METHOD";

/// Management provider identifier.
///
/// Each variant corresponds to a provider registered with the
/// [`factory`](crate::factory). Providers must be enabled via Cargo feature flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderType {
    /// In-memory provider for tests
    Mock,
    /// Azure Resource Manager REST API
    ResourceManager,
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mock => write!(f, "mock"),
            Self::ResourceManager => write!(f, "arm"),
        }
    }
}

/// Where bearer tokens come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AuthMethod {
    /// `azure_identity`'s `DefaultAzureCredential` chain
    #[default]
    DefaultCredential,
    /// `az account get-access-token`
    AzureCli,
}

impl FromStr for AuthMethod {
    type Err = RecoveryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "" | "default" => Ok(Self::DefaultCredential),
            "cli" | "azurecli" => Ok(Self::AzureCli),
            other => Err(RecoveryError::Other(anyhow::anyhow!(
                "unknown auth method: {} (expected 'default' or 'cli')",
                other
            ))),
        }
    }
}

/// Azure cloud the management endpoint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CloudEnvironment {
    /// Azure public cloud
    #[default]
    AzurePublicCloud,
    /// Azure US Government
    AzureUSGovernmentCloud,
    /// Azure China (21Vianet)
    AzureChinaCloud,
    /// Azure Germany
    AzureGermanCloud,
}

impl CloudEnvironment {
    /// Resource Manager endpoint for this cloud, without a trailing slash.
    pub fn management_endpoint(&self) -> &'static str {
        match self {
            Self::AzurePublicCloud => "https://management.azure.com",
            Self::AzureUSGovernmentCloud => "https://management.usgovcloudapi.net",
            Self::AzureChinaCloud => "https://management.chinacloudapi.cn",
            Self::AzureGermanCloud => "https://management.microsoftazure.de",
        }
    }

    /// OAuth scope requested for management tokens.
    pub fn token_scope(&self) -> String {
        format!("{}/.default", self.management_endpoint())
    }
}

impl std::fmt::Display for CloudEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AzurePublicCloud => write!(f, "AzurePublicCloud"),
            Self::AzureUSGovernmentCloud => write!(f, "AzureUSGovernmentCloud"),
            Self::AzureChinaCloud => write!(f, "AzureChinaCloud"),
            Self::AzureGermanCloud => write!(f, "AzureGermanCloud"),
        }
    }
}

impl FromStr for CloudEnvironment {
    type Err = RecoveryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "" | "azurepubliccloud" | "azurecloud" => Ok(Self::AzurePublicCloud),
            "azureusgovernmentcloud" | "azureusgovernment" => Ok(Self::AzureUSGovernmentCloud),
            "azurechinacloud" => Ok(Self::AzureChinaCloud),
            "azuregermancloud" => Ok(Self::AzureGermanCloud),
            other => Err(RecoveryError::Other(anyhow::anyhow!(
                "unknown Azure environment: {}",
                other
            ))),
        }
    }
}

/// Configuration for creating a [`RecoveryServices`](crate::RecoveryServices) facade.
///
/// Use the builder pattern for ergonomic configuration:
///
/// ```
/// use recoveryvault::{Config, ProviderType};
/// use std::time::Duration;
///
/// let config = Config::new(ProviderType::ResourceManager)
///     .with_default_subscription("00000000-0000-0000-0000-000000000000")
///     .with_default_resource_group("rg-backup")
///     .with_request_timeout(Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Provider type
    pub provider: ProviderType,

    /// Credential source
    pub auth: AuthMethod,

    /// Subscription used when a call passes an empty subscription ID
    pub default_subscription_id: Option<String>,

    /// Resource group used when a call passes an empty group name
    pub default_resource_group: Option<String>,

    /// Target Azure cloud
    pub environment: CloudEnvironment,

    /// Time budget for one whole operation (None = unbounded)
    pub request_timeout: Option<Duration>,

    /// Provider-specific options
    pub options: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderType::ResourceManager,
            auth: AuthMethod::default(),
            default_subscription_id: None,
            default_resource_group: None,
            environment: CloudEnvironment::default(),
            request_timeout: None,
            options: HashMap::new(),
        }
    }
}

impl Config {
    /// Creates a new configuration for the specified provider.
    ///
    /// # Example
    ///
    /// ```
    /// use recoveryvault::{Config, ProviderType};
    ///
    /// let config = Config::new(ProviderType::Mock);
    /// assert_eq!(config.provider, ProviderType::Mock);
    /// ```
    pub fn new(provider: ProviderType) -> Self {
        Self {
            provider,
            ..Default::default()
        }
    }

    /// Builds a Resource Manager configuration from the process environment.
    ///
    /// Reads `ARM_SUBSCRIPTION_ID`, `AZURE_RES_GROUP_NAME`,
    /// `AZURE_ENVIRONMENT` and `AZURE_AUTH_METHOD`. Unset or empty variables
    /// leave the corresponding field at its default.
    ///
    /// # Errors
    ///
    /// Fails if `AZURE_ENVIRONMENT` or `AZURE_AUTH_METHOD` hold unknown values.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut config = Self::new(ProviderType::ResourceManager);
        config.default_subscription_id = non_empty(SUBSCRIPTION_ID_ENV);
        config.default_resource_group = non_empty(RESOURCE_GROUP_ENV);
        if let Some(env) = non_empty(ENVIRONMENT_ENV) {
            config.environment = env.parse()?;
        }
        if let Some(method) = non_empty(AUTH_METHOD_ENV) {
            config.auth = method.parse()?;
        }
        Ok(config)
    }

    /// Sets the subscription used when a call leaves it empty.
    pub fn with_default_subscription(mut self, subscription_id: impl Into<String>) -> Self {
        self.default_subscription_id = Some(subscription_id.into());
        self
    }

    /// Sets the resource group used when a call leaves it empty.
    pub fn with_default_resource_group(mut self, resource_group: impl Into<String>) -> Self {
        self.default_resource_group = Some(resource_group.into());
        self
    }

    /// Sets the credential source.
    pub fn with_auth(mut self, auth: AuthMethod) -> Self {
        self.auth = auth;
        self
    }

    /// Sets the target Azure cloud.
    pub fn with_environment(mut self, environment: CloudEnvironment) -> Self {
        self.environment = environment;
        self
    }

    /// Bounds every operation (authorization, request and all page
    /// advances together) by `timeout`.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Adds a provider-specific option.
    ///
    /// Common options:
    ///
    /// **Resource Manager:**
    /// - `endpoint`: Override the management endpoint (e.g., a local test server)
    /// - `user_agent`: Custom `User-Agent` header
    /// - `token`: Fixed bearer token, bypassing the credential source
    /// - `tenant_id`: Tenant passed to `az account get-access-token`
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Gets a provider-specific option value.
    pub fn get_option(&self, key: &str) -> Option<&String> {
        self.options.get(key)
    }

    /// Management endpoint, honoring the `endpoint` option.
    pub fn management_endpoint(&self) -> String {
        self.get_option("endpoint")
            .map(|e| e.trim_end_matches('/').to_string())
            .unwrap_or_else(|| self.environment.management_endpoint().to_string())
    }
}
