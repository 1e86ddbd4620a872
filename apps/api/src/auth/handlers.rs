use askama::Template;
use axum::{
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use tracing::{info, warn};

use crate::auth::session::{Flash, Session};
use crate::errors::AppError;
use crate::state::AppState;
use crate::views::LoginPage;

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// GET /login
pub async fn handle_login_page(
    State(state): State<AppState>,
    mut session: Session,
) -> Result<Html<String>, AppError> {
    let flash = session.take_flash();
    let username = session.data.old_username.take().unwrap_or_default();
    if flash.is_some() {
        session.save(&state.redis, state.config.session_ttl_secs).await?;
    }
    Ok(Html(LoginPage { flash, username }.render()?))
}

/// POST /login
pub async fn handle_login(
    State(state): State<AppState>,
    jar: CookieJar,
    mut session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let username = form.username.trim();
    let user = state.store.find_user_by_email(username).await?;

    let accepted = match &user {
        Some(_) => state.credentials.validate(username, &form.password).await?,
        None => false,
    };

    let ttl = state.config.session_ttl_secs;
    match user {
        Some(user) if accepted => {
            session.delete(&state.redis).await?;
            session.rotate();
            session.data.user_id = Some(user.id);
            session.save(&state.redis, ttl).await?;
            info!(
                "User {} logged in ({})",
                user.id,
                state.credentials.backend()
            );
            Ok((jar.add(session.cookie()), Redirect::to("/marketplace")).into_response())
        }
        _ => {
            warn!("Rejected login for '{username}'");
            session.data.old_username = Some(username.to_string());
            session.set_flash(Flash::error(
                state.translate("These credentials do not match our records.", &[]),
            ));
            session.save(&state.redis, ttl).await?;
            Ok((jar.add(session.cookie()), Redirect::to("/login")).into_response())
        }
    }
}

/// POST /logout
pub async fn handle_logout(
    State(state): State<AppState>,
    jar: CookieJar,
    session: Session,
) -> Result<Response, AppError> {
    if let Some(user_id) = session.data.user_id {
        info!("User {user_id} logged out");
    }
    session.delete(&state.redis).await?;
    Ok((jar.remove(Session::removal_cookie()), Redirect::to("/login")).into_response())
}
