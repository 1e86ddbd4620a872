use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::{Html, IntoResponse, Redirect, Response},
    Extension, Json,
};
use axum_extra::extract::Form;
use tracing::{info, warn};

use crate::auth::session::{local_path, Flash, Session};
use crate::auth::CurrentUser;
use crate::errors::{AppError, FieldError};
use crate::i18n::{self, Locale};
use crate::jobs::marketplace::today;
use crate::jobs::payload::{parse_skill_tokens, JobDefinitionForm, SkillToken};
use crate::jobs::prefill::{form_values, pending_attachments};
use crate::jobs::save::{delete_job_definition, save_job_definition, SaveMode};
use crate::models::job_definition::{JobDefinition, JobDetails};
use crate::models::skill::SkillWithGroup;
use crate::models::user::Role;
use crate::state::AppState;
use crate::views::{DocumentLink, JobCard, JobFormPage, JobShowPage, ProviderOption, SkillOption};

/// GET /jobs
pub async fn handle_index(
    State(state): State<AppState>,
) -> Result<Json<Vec<JobDefinition>>, AppError> {
    Ok(Json(state.store.list_jobs().await?))
}

/// GET /jobs/:id
pub async fn handle_show(
    State(state): State<AppState>,
    Extension(user): Extension<Arc<CurrentUser>>,
    Path(id): Path<i64>,
    mut session: Session,
) -> Result<Html<String>, AppError> {
    let details = find_job(&state, id).await?;
    let flash = session.take_flash();
    if flash.is_some() {
        session.save(&state.redis, state.config.session_ttl_secs).await?;
    }

    let page = JobShowPage {
        user_name: user.display_name(),
        flash,
        card: JobCard::from_details(&details, user.can_apply()),
        published: details
            .job
            .published_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "not yet".to_string()),
        archived: details.job.archived,
        can_edit: user.can_edit(&details),
    };
    Ok(Html(page.render()?))
}

/// GET /jobs/create
pub async fn handle_create_form(
    State(state): State<AppState>,
    Extension(user): Extension<Arc<CurrentUser>>,
    headers: HeaderMap,
    mut session: Session,
) -> Result<Html<String>, AppError> {
    if !user.can_manage_jobs() {
        return Err(AppError::Forbidden);
    }
    let heading = state.translate("New job", &[]);
    render_form(&state, &user, &headers, &mut session, None, heading).await
}

/// GET /jobs/:id/edit
pub async fn handle_edit_form(
    State(state): State<AppState>,
    Extension(user): Extension<Arc<CurrentUser>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    mut session: Session,
) -> Result<Html<String>, AppError> {
    let details = find_job(&state, id).await?;
    if !user.can_edit(&details) {
        return Err(AppError::Forbidden);
    }
    let heading = state.translate("Edit job \":job\"", &[("job", &details.job.title)]);
    render_form(&state, &user, &headers, &mut session, Some(&details), heading).await
}

/// POST /jobs
pub async fn handle_store(
    State(state): State<AppState>,
    Extension(user): Extension<Arc<CurrentUser>>,
    mut session: Session,
    Form(form): Form<JobDefinitionForm>,
) -> Result<Response, AppError> {
    if !user.can_manage_jobs() {
        return Err(AppError::Forbidden);
    }
    save(&state, &mut session, None, form, "/jobs/create".to_string()).await
}

/// POST|PUT /jobs/:id
pub async fn handle_update(
    State(state): State<AppState>,
    Extension(user): Extension<Arc<CurrentUser>>,
    Path(id): Path<i64>,
    mut session: Session,
    Form(form): Form<JobDefinitionForm>,
) -> Result<Response, AppError> {
    let details = find_job(&state, id).await?;
    if !user.can_edit(&details) {
        return Err(AppError::Forbidden);
    }
    save(&state, &mut session, Some(id), form, format!("/jobs/{id}/edit")).await
}

/// POST /jobs/:id/delete, DELETE /jobs/:id
pub async fn handle_destroy(
    State(state): State<AppState>,
    Extension(user): Extension<Arc<CurrentUser>>,
    Path(id): Path<i64>,
    mut session: Session,
) -> Result<Response, AppError> {
    let details = find_job(&state, id).await?;
    if !user.can_edit(&details) {
        return Err(AppError::Forbidden);
    }

    let outcome = delete_job_definition(state.store.as_ref(), id).await?;
    state.storage.purge(&outcome.deleted).await;
    info!("User {} deleted job definition {id}", user.user.id);

    session.set_flash(Flash::success(
        state.translate("Job \":job\" deleted", &[("job", &details.job.title)]),
    ));
    session.save(&state.redis, state.config.session_ttl_secs).await?;
    Ok(Redirect::to("/marketplace").into_response())
}

/// POST /jobs/:id/apply
pub async fn handle_apply(
    State(state): State<AppState>,
    Extension(user): Extension<Arc<CurrentUser>>,
    Path(id): Path<i64>,
    mut session: Session,
) -> Result<Response, AppError> {
    if !user.can_apply() {
        return Err(AppError::Forbidden);
    }
    let details = find_job(&state, id).await?;
    let job = &details.job;
    if !job.is_published(today()) || !job.is_available() {
        return Err(AppError::NotFound(format!("Job definition {id} is not open")));
    }

    let contract = state.store.create_contract(id, user.user.id).await?;
    info!(
        "User {} holds contract {} for job definition {id}",
        user.user.id, contract.id
    );

    session.set_flash(Flash::success(
        state.translate("Applied to job \":job\"", &[("job", &job.title)]),
    ));
    session.save(&state.redis, state.config.session_ttl_secs).await?;
    Ok(Redirect::to("/marketplace").into_response())
}

async fn find_job(state: &AppState, id: i64) -> Result<JobDetails, AppError> {
    state
        .store
        .job_details(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job definition {id} not found")))
}

/// Validates and saves, or sends the submission back to the form through
/// the session.
async fn save(
    state: &AppState,
    session: &mut Session,
    existing: Option<i64>,
    form: JobDefinitionForm,
    back: String,
) -> Result<Response, AppError> {
    let ttl = state.config.session_ttl_secs;
    let payload = match form.validate() {
        Ok(payload) => payload,
        Err(AppError::Validation(errors)) => {
            warn!("Rejected job definition form: {} invalid fields", errors.len());
            let message = state.translate("Please correct the highlighted fields.", &[]);
            keep_rejected(session, form, errors, message);
            session.save(&state.redis, ttl).await?;
            return Ok(Redirect::to(&back).into_response());
        }
        Err(e) => return Err(e),
    };

    let outcome = save_job_definition(
        state.store.as_ref(),
        existing,
        &payload,
        &state.config.default_skill_group,
    )
    .await?;
    state.storage.purge(&outcome.deleted).await;

    let flash = saved_flash(state.config.locale, outcome.mode, &outcome.job.title);
    let target = finish_save(session, flash);
    session.save(&state.redis, ttl).await?;
    Ok(Redirect::to(&target).into_response())
}

/// Stores a rejected submission for the next form display. The captured
/// start URL stays so the eventual successful save still returns there.
fn keep_rejected(
    session: &mut Session,
    form: JobDefinitionForm,
    errors: Vec<FieldError>,
    message: String,
) {
    session.flash_input(form, errors);
    session.set_flash(Flash::error(message));
}

fn saved_flash(locale: Locale, mode: SaveMode, title: &str) -> Flash {
    let key = match mode {
        SaveMode::Created => "Job \":job\" created",
        SaveMode::Updated => "Job \":job\" updated",
    };
    Flash::success(i18n::translate(locale, key, &[("job", title)]))
}

/// Sets the success flash and returns where to go next: the page the form
/// was opened from, or the marketplace.
fn finish_save(session: &mut Session, flash: Flash) -> String {
    session.set_flash(flash);
    session
        .data
        .start_url
        .take()
        .unwrap_or_else(|| "/marketplace".to_string())
}

/// Remembers the referring page when the form is opened fresh. A redisplay
/// after a rejected submission keeps the URL captured the first time.
fn capture_start_url(session: &mut Session, redisplay: bool, headers: &HeaderMap) {
    if redisplay {
        return;
    }
    session.data.start_url = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .and_then(local_path);
}

async fn render_form(
    state: &AppState,
    user: &CurrentUser,
    headers: &HeaderMap,
    session: &mut Session,
    persisted: Option<&JobDetails>,
    heading: String,
) -> Result<Html<String>, AppError> {
    let old = session.take_old_input();
    let errors = session.take_errors();
    let flash = session.take_flash();
    capture_start_url(session, old.is_some(), headers);
    session.save(&state.redis, state.config.session_ttl_secs).await?;

    let pending = pending_attachments(state.store.as_ref(), persisted, old.as_ref()).await?;
    let form = form_values(persisted, old);

    let others = state
        .store
        .users_with_role(Role::Teacher, Some(user.user.id))
        .await?;
    let checked: Vec<i64> = if persisted.is_none() && form.providers.is_empty() {
        vec![user.user.id]
    } else {
        form.providers
            .iter()
            .filter_map(|raw| raw.trim().parse().ok())
            .collect()
    };
    let mut providers = Vec::with_capacity(others.len() + 1);
    if user.has_role(Role::Teacher) {
        providers.push(ProviderOption {
            id: user.user.id,
            name: user.display_name(),
            checked: checked.contains(&user.user.id),
        });
    }
    providers.extend(others.iter().map(|p| ProviderOption {
        id: p.id,
        name: p.full_name(),
        checked: checked.contains(&p.id),
    }));

    let attached: Vec<SkillWithGroup> = persisted.map(|d| d.skills.clone()).unwrap_or_default();
    let attached_ids: Vec<i64> = attached.iter().map(|s| s.id).collect();
    let choices = state.store.skills_excluding(&attached_ids).await?;
    let known: Vec<SkillWithGroup> = attached.into_iter().chain(choices.iter().cloned()).collect();

    let page = JobFormPage {
        user_name: user.display_name(),
        flash,
        heading,
        action: match persisted {
            Some(details) => format!("/jobs/{}", details.job.id),
            None => "/jobs".to_string(),
        },
        selected_skills: selected_skill_labels(&form.skills, &known),
        form,
        errors,
        providers,
        image: pending.image.as_ref().map(DocumentLink::from),
        documents: pending.documents.iter().map(DocumentLink::from).collect(),
        skill_choices: choices.iter().map(SkillOption::from).collect(),
    };
    Ok(Html(page.render()?))
}

/// Labels for the skills in a form's `skills` field. Unknown ids are left
/// out; names are shown as typed.
fn selected_skill_labels(raw: &str, known: &[SkillWithGroup]) -> Vec<String> {
    let mut errors = Vec::new();
    parse_skill_tokens(raw, &mut errors)
        .into_iter()
        .filter_map(|token| match token {
            SkillToken::Id(id) => known.iter().find(|s| s.id == id).map(SkillWithGroup::label),
            SkillToken::Name {
                group: Some(group),
                name,
            } => Some(format!("{group}: {name}")),
            SkillToken::Name { group: None, name } => Some(name),
        })
        .collect()
}
