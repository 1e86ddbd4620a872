//! Redis-backed sessions.
//!
//! The session document is JSON stored under `session:<uuid>`; the uuid
//! travels in an http-only cookie. Old form input, field errors and the flash
//! message are one-shot: reading them removes them from the session.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use redis::Client as RedisClient;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, FieldError};
use crate::jobs::payload::JobDefinitionForm;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "jobboard_session";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    /// `success` or `error`, used as a CSS class.
    pub level: String,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Flash {
            level: "success".to_string(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Flash {
            level: "error".to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub user_id: Option<i64>,
    /// Where to send the user after a successful save.
    pub start_url: Option<String>,
    pub old_input: Option<JobDefinitionForm>,
    #[serde(default)]
    pub errors: Vec<FieldError>,
    pub flash: Option<Flash>,
    /// Username typed on a rejected login.
    pub old_username: Option<String>,
}

#[derive(Debug)]
pub struct Session {
    id: Uuid,
    pub data: SessionData,
}

fn redis_key(id: Uuid) -> String {
    format!("session:{id}")
}

impl Session {
    pub fn new() -> Self {
        Session {
            id: Uuid::new_v4(),
            data: SessionData::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Session id carried by the cookie, if it is a well-formed one.
    pub fn id_from_cookies(jar: &CookieJar) -> Option<Uuid> {
        jar.get(SESSION_COOKIE)
            .and_then(|c| Uuid::parse_str(c.value()).ok())
    }

    /// Loads the cookie's session, or starts an empty one when the cookie is
    /// missing or the session expired.
    pub async fn load(redis: &RedisClient, jar: &CookieJar) -> Result<Self, AppError> {
        let Some(id) = Self::id_from_cookies(jar) else {
            return Ok(Self::new());
        };
        let mut conn = redis.get_multiplexed_async_connection().await?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(redis_key(id))
            .query_async(&mut conn)
            .await?;
        let data = match raw {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!("Discarding unreadable session {id}: {e}");
                SessionData::default()
            }),
            None => SessionData::default(),
        };
        Ok(Session { id, data })
    }

    pub async fn save(&self, redis: &RedisClient, ttl_secs: u64) -> Result<(), AppError> {
        let raw = serde_json::to_string(&self.data)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to encode session: {e}")))?;
        let mut conn = redis.get_multiplexed_async_connection().await?;
        redis::cmd("SET")
            .arg(redis_key(self.id))
            .arg(raw)
            .arg("EX")
            .arg(ttl_secs)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, redis: &RedisClient) -> Result<(), AppError> {
        let mut conn = redis.get_multiplexed_async_connection().await?;
        redis::cmd("DEL")
            .arg(redis_key(self.id))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    /// Moves the data to a fresh id, e.g. after login.
    pub fn rotate(&mut self) {
        self.id = Uuid::new_v4();
    }

    pub fn cookie(&self) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, self.id.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build()
    }

    pub fn removal_cookie() -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, "")).path("/").build()
    }

    pub fn take_flash(&mut self) -> Option<Flash> {
        self.data.flash.take()
    }

    pub fn set_flash(&mut self, flash: Flash) {
        self.data.flash = Some(flash);
    }

    pub fn take_old_input(&mut self) -> Option<JobDefinitionForm> {
        self.data.old_input.take()
    }

    pub fn take_errors(&mut self) -> Vec<FieldError> {
        std::mem::take(&mut self.data.errors)
    }

    /// Keeps a rejected submission for the next form display.
    pub fn flash_input(&mut self, form: JobDefinitionForm, errors: Vec<FieldError>) {
        self.data.old_input = Some(form);
        self.data.errors = errors;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Reduces a `Referer` header to a local path so redirects never leave the
/// site. Paths that a browser would read as protocol-relative are refused.
pub fn local_path(referer: &str) -> Option<String> {
    let path = if referer.starts_with('/') {
        referer.to_string()
    } else {
        let url = reqwest::Url::parse(referer).ok()?;
        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }
        path
    };
    let local = match path.as_bytes() {
        [b'/', b'/' | b'\\', ..] => false,
        [b'/', ..] => true,
        _ => false,
    };
    local.then_some(path)
}

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        Session::load(&state.redis, &jar).await
    }
}
