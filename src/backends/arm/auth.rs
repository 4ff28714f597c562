//! Credentials from the Azure identity chain.

use crate::auth::{AuthorizationProvider, Capability};
use crate::{CloudEnvironment, RecoveryError, Result};
use async_trait::async_trait;
use azure_core::auth::TokenCredential;
use azure_identity::DefaultAzureCredential;
use chrono::DateTime;
use std::sync::Arc;

/// Obtains management tokens through `DefaultAzureCredential`.
///
/// The credential tries, in order: environment variables
/// (`AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET`), managed
/// identity, and the Azure CLI.
#[derive(Clone)]
pub struct DefaultCredentialAuthorizer {
    credential: Arc<DefaultAzureCredential>,
    scope: String,
}

impl DefaultCredentialAuthorizer {
    /// Creates a provider requesting tokens for `environment`.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::Authorization`] if the credential chain
    /// cannot be set up.
    pub fn new(environment: CloudEnvironment) -> Result<Self> {
        let credential = DefaultAzureCredential::create(Default::default()).map_err(|e| {
            RecoveryError::Authorization(format!("failed to create Azure credentials: {}", e))
        })?;

        Ok(Self {
            credential: Arc::new(credential),
            scope: environment.token_scope(),
        })
    }

    /// OAuth scope requested.
    pub fn scope(&self) -> &str {
        &self.scope
    }
}

impl std::fmt::Debug for DefaultCredentialAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultCredentialAuthorizer")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AuthorizationProvider for DefaultCredentialAuthorizer {
    fn name(&self) -> &str {
        "default"
    }

    async fn new_authorizer(&self) -> Result<Capability> {
        let token = self
            .credential
            .get_token(&[self.scope.as_str()])
            .await
            .map_err(|e| RecoveryError::Authorization(format!("Azure credential error: {}", e)))?;

        let capability = Capability::new(token.token.secret());
        Ok(
            match DateTime::from_timestamp(token.expires_on.unix_timestamp(), 0) {
                Some(expires_at) => capability.with_expiry(expires_at),
                None => capability,
            },
        )
    }
}
