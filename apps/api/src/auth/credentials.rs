//! Password checks, pluggable behind `CredentialValidator`.
//!
//! Users always come from our own `users` table; only the password check is
//! delegated. `SharedPasswordValidator` accepts one configured password for
//! every account and exists for test deployments. `AzureAdValidator` asks the
//! organisation's Azure AD tenant through the resource-owner password grant.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::errors::AppError;

#[async_trait]
pub trait CredentialValidator: Send + Sync {
    async fn validate(&self, username: &str, password: &str) -> Result<bool, AppError>;

    fn backend(&self) -> &'static str;
}

pub struct SharedPasswordValidator {
    password: String,
}

impl SharedPasswordValidator {
    pub fn new(password: String) -> Self {
        SharedPasswordValidator { password }
    }
}

#[async_trait]
impl CredentialValidator for SharedPasswordValidator {
    async fn validate(&self, _username: &str, password: &str) -> Result<bool, AppError> {
        Ok(!self.password.is_empty() && password == self.password)
    }

    fn backend(&self) -> &'static str {
        "shared-password"
    }
}

const AZURE_SCOPE: &str = "openid";

pub struct AzureAdValidator {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
}

#[derive(Debug, Deserialize)]
struct AzureErrorBody {
    error: String,
    #[serde(default)]
    error_description: String,
}

impl AzureAdValidator {
    pub fn new(tenant_id: &str, client_id: String) -> Self {
        AzureAdValidator {
            http: reqwest::Client::new(),
            token_url: format!("https://login.microsoftonline.com/{tenant_id}/oauth2/v2.0/token"),
            client_id,
        }
    }
}

#[async_trait]
impl CredentialValidator for AzureAdValidator {
    async fn validate(&self, username: &str, password: &str) -> Result<bool, AppError> {
        if password.is_empty() {
            return Ok(false);
        }
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "password"),
                ("client_id", self.client_id.as_str()),
                ("scope", AZURE_SCOPE),
                ("username", username),
                ("password", password),
            ])
            .send()
            .await
            .map_err(|e| AppError::Identity(format!("token request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            info!("Azure AD accepted credentials for {username}");
            return Ok(true);
        }
        if status.is_client_error() {
            // invalid_grant is a wrong password; anything else is misconfiguration.
            let body: AzureErrorBody = response
                .json()
                .await
                .map_err(|e| AppError::Identity(format!("unreadable error body: {e}")))?;
            if body.error == "invalid_grant" {
                warn!("Azure AD rejected credentials for {username}");
                return Ok(false);
            }
            return Err(AppError::Identity(format!(
                "{}: {}",
                body.error, body.error_description
            )));
        }
        Err(AppError::Identity(format!("unexpected status {status}")))
    }

    fn backend(&self) -> &'static str {
        "azure-ad"
    }
}
