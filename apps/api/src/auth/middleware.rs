use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;

use crate::auth::session::Session;
use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::state::AppState;

/// Lets the request through with a `CurrentUser` extension, or redirects to
/// the login page.
pub async fn require_login(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let jar = CookieJar::from_headers(request.headers());
    if Session::id_from_cookies(&jar).is_none() {
        return Ok(Redirect::to("/login").into_response());
    }

    let session = Session::load(&state.redis, &jar).await?;
    let Some(user_id) = session.data.user_id else {
        return Ok(Redirect::to("/login").into_response());
    };
    let Some(user) = state.store.find_user(user_id).await? else {
        tracing::warn!("Session refers to unknown user {user_id}, authentication denied");
        return Ok(Redirect::to("/login").into_response());
    };
    let roles = state.store.roles_of(user.id).await?;

    request
        .extensions_mut()
        .insert(Arc::new(CurrentUser { user, roles }));
    Ok(next.run(request).await)
}
