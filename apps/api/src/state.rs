use std::sync::Arc;

use redis::Client as RedisClient;

use crate::attachments::storage::AttachmentStorage;
use crate::auth::credentials::CredentialValidator;
use crate::config::Config;
use crate::i18n;
use crate::store::JobStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// `PgStore` in production.
    pub store: Arc<dyn JobStore>,
    pub redis: RedisClient,
    pub storage: AttachmentStorage,
    /// Password check behind the login form. Selected by AUTH_BACKEND.
    pub credentials: Arc<dyn CredentialValidator>,
    pub config: Config,
}

impl AppState {
    pub fn translate(&self, key: &str, params: &[(&str, &str)]) -> String {
        i18n::translate(self.config.locale, key, params)
    }
}

#[cfg(test)]
impl AppState {
    /// State over an in-memory store. Redis and S3 clients are built but never
    /// contacted unless a handler needs them.
    pub fn for_tests(store: Arc<crate::store::memory::MemoryStore>) -> Self {
        use aws_sdk_s3::config::{BehaviorVersion, Region};

        use crate::auth::credentials::SharedPasswordValidator;
        use crate::config::AuthBackend;
        use crate::i18n::Locale;

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .build();
        let config = Config {
            database_url: "postgres://localhost/jobboard_test".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            s3_bucket: "attachments".to_string(),
            s3_endpoint: "http://127.0.0.1:9000".to_string(),
            aws_access_key_id: "test".to_string(),
            aws_secret_access_key: "test".to_string(),
            port: 0,
            rust_log: "info".to_string(),
            locale: Locale::En,
            session_ttl_secs: 60,
            upload_max_bytes: 1024,
            default_skill_group: "Other".to_string(),
            auth: AuthBackend::SharedPassword {
                password: "pentest".to_string(),
            },
        };

        AppState {
            store,
            redis: RedisClient::open(config.redis_url.as_str()).expect("valid redis url"),
            storage: AttachmentStorage::new(
                aws_sdk_s3::Client::from_conf(s3_config),
                config.s3_bucket.clone(),
            ),
            credentials: Arc::new(SharedPasswordValidator::new("pentest".to_string())),
            config,
        }
    }
}
