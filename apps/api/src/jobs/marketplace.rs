use std::cmp::Ordering;
use std::sync::Arc;

use askama::Template;
use axum::{extract::State, response::Html, Extension};
use chrono::{NaiveDate, Utc};

use crate::auth::session::Session;
use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::job_definition::JobDefinition;
use crate::state::AppState;
use crate::views::{JobCard, MarketplacePage};

/// Marketplace order: least experience first, one-shot jobs before
/// recurring ones, then lowest priority value. Ties fall back to id so the
/// listing is stable.
pub fn marketplace_order(a: &JobDefinition, b: &JobDefinition) -> Ordering {
    a.required_xp_years
        .cmp(&b.required_xp_years)
        .then_with(|| b.one_shot.cmp(&a.one_shot))
        .then_with(|| a.priority.cmp(&b.priority))
        .then_with(|| a.id.cmp(&b.id))
}

/// Calendar day, in UTC, against which publication dates are compared.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// GET /marketplace
pub async fn handle_marketplace(
    State(state): State<AppState>,
    Extension(user): Extension<Arc<CurrentUser>>,
    mut session: Session,
) -> Result<Html<String>, AppError> {
    let definitions = state.store.marketplace(user.user.id, today()).await?;
    let flash = session.take_flash();
    if flash.is_some() {
        session.save(&state.redis, state.config.session_ttl_secs).await?;
    }

    let can_manage = user.can_manage_jobs();
    let can_apply = user.can_apply();
    let cards: Vec<JobCard> = definitions
        .iter()
        .map(|details| JobCard::from_details(details, can_apply))
        .collect();

    let page = MarketplacePage {
        user_name: user.display_name(),
        flash,
        can_create: can_manage,
        empty_label: state.translate("No jobs", &[]),
        cards,
    };
    Ok(Html(page.render()?))
}
