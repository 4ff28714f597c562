//! Authorization capabilities for management API calls.
//!
//! This module provides the [`AuthorizationProvider`] trait and the
//! [`Capability`] it hands out. A capability is a bearer token, optionally
//! with an expiry; clients attach it to every request they make.

use crate::cli::{self, AZ_PROGRAM};
use crate::{CloudEnvironment, RecoveryError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// A credential usable by the management clients.
///
/// The token is never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Capability {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Capability {
    /// Creates a capability from a bearer token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    /// Sets when the token stops being accepted.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Returns the bearer token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns when the token expires, if known.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Checks whether the token is past its expiry.
    ///
    /// Tokens without a known expiry never report as expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Utc::now() >= exp)
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Produces capabilities for the management clients.
///
/// Implementations must be `Send + Sync`; the facade calls
/// [`new_authorizer`](Self::new_authorizer) once per operation and never
/// caches the result.
#[async_trait]
pub trait AuthorizationProvider: Send + Sync {
    /// Returns the provider name (e.g., "azurecli", "static").
    fn name(&self) -> &str;

    /// Acquires a fresh capability.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::Authorization`] if no credential is available.
    async fn new_authorizer(&self) -> Result<Capability>;
}

/// Hands out a fixed token.
///
/// Useful against local test servers and mock providers.
#[derive(Debug, Clone)]
pub struct StaticTokenAuthorizer {
    capability: Capability,
}

impl StaticTokenAuthorizer {
    /// Creates a provider that always returns `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            capability: Capability::new(token),
        }
    }
}

#[async_trait]
impl AuthorizationProvider for StaticTokenAuthorizer {
    fn name(&self) -> &str {
        "static"
    }

    async fn new_authorizer(&self) -> Result<Capability> {
        if self.capability.token().is_empty() {
            return Err(RecoveryError::Authorization("static token is empty".to_string()));
        }
        Ok(self.capability.clone())
    }
}

/// Obtains tokens from a logged-in Azure CLI (`az login`).
#[derive(Debug, Clone)]
pub struct AzureCliAuthorizer {
    scope: String,
    tenant_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliAccessToken {
    access_token: String,
    #[serde(rename = "expires_on")]
    expires_on_unix: Option<i64>,
}

impl AzureCliAuthorizer {
    /// Creates a provider requesting management tokens for `environment`.
    pub fn new(environment: CloudEnvironment) -> Self {
        Self {
            scope: environment.token_scope(),
            tenant_id: None,
        }
    }

    /// Requests tokens for a specific tenant.
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    fn args(&self) -> Vec<&str> {
        let mut args = vec![
            "account",
            "get-access-token",
            "--scope",
            &self.scope,
            "--output",
            "json",
        ];
        if let Some(ref tenant) = self.tenant_id {
            args.push("--tenant");
            args.push(tenant);
        }
        args
    }
}

fn capability_from_cli(token: CliAccessToken) -> Result<Capability> {
    if token.access_token.is_empty() {
        return Err(RecoveryError::Authorization(
            "az CLI returned an empty access token".to_string(),
        ));
    }
    let capability = Capability::new(token.access_token);
    Ok(
        match token
            .expires_on_unix
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
        {
            Some(exp) => capability.with_expiry(exp),
            None => capability,
        },
    )
}

#[async_trait]
impl AuthorizationProvider for AzureCliAuthorizer {
    fn name(&self) -> &str {
        "azurecli"
    }

    async fn new_authorizer(&self) -> Result<Capability> {
        let token: CliAccessToken = cli::run_json(AZ_PROGRAM, &self.args())
            .await
            .map_err(|e| {
                RecoveryError::Authorization(format!(
                    "az account get-access-token failed (run 'az login' first): {}",
                    e
                ))
            })?;
        capability_from_cli(token)
    }
}
