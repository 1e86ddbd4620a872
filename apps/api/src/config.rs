use anyhow::{bail, Context, Result};

use crate::i18n::Locale;

/// How login passwords are checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthBackend {
    /// One password for every account. Test deployments only.
    SharedPassword { password: String },
    AzureAd { tenant_id: String, client_id: String },
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub port: u16,
    pub rust_log: String,
    pub locale: Locale,
    pub session_ttl_secs: u64,
    pub upload_max_bytes: usize,
    /// Group that skills typed without a "Group: " prefix are created in.
    pub default_skill_group: String,
    pub auth: AuthBackend,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let require = |key: &str| {
            get(key).with_context(|| format!("Required environment variable '{key}' is not set"))
        };
        let or_default = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let auth = match or_default("AUTH_BACKEND", "shared-password").as_str() {
            "shared-password" => AuthBackend::SharedPassword {
                password: require("DASHBOARD_PASSWORD")?,
            },
            "azure-ad" => AuthBackend::AzureAd {
                tenant_id: require("AZURE_TENANT_ID")?,
                client_id: require("AZURE_CLIENT_ID")?,
            },
            other => bail!("AUTH_BACKEND must be 'shared-password' or 'azure-ad', got '{other}'"),
        };

        Ok(Config {
            database_url: require("DATABASE_URL")?,
            redis_url: require("REDIS_URL")?,
            s3_bucket: require("S3_BUCKET")?,
            s3_endpoint: require("S3_ENDPOINT")?,
            aws_access_key_id: require("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require("AWS_SECRET_ACCESS_KEY")?,
            port: or_default("PORT", "8080")
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: or_default("RUST_LOG", "info"),
            locale: or_default("APP_LOCALE", "en")
                .parse::<Locale>()
                .map_err(anyhow::Error::msg)?,
            session_ttl_secs: or_default("SESSION_TTL_SECS", "7200")
                .parse::<u64>()
                .context("SESSION_TTL_SECS must be a number of seconds")?,
            upload_max_bytes: or_default("UPLOAD_MAX_BYTES", "10485760")
                .parse::<usize>()
                .context("UPLOAD_MAX_BYTES must be a number of bytes")?,
            default_skill_group: or_default("DEFAULT_SKILL_GROUP", "Other"),
            auth,
        })
    }
}
