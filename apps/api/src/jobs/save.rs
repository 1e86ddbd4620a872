//! Job definition save and delete workflows.
//!
//! Each workflow runs inside a single `JobTx`. Any error returns before
//! `commit`, dropping the transaction and discarding every change made so
//! far. Deleted attachments are returned to the caller so their stored files
//! can be purged once the transaction is committed.

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::errors::AppError;
use crate::jobs::payload::{SavePayload, SkillToken};
use crate::jobs::sync::sync;
use crate::models::attachment::{Attachment, AttachmentKind};
use crate::models::job_definition::JobDefinition;
use crate::models::skill::Skill;
use crate::models::user::Role;
use crate::store::{Association, JobStore, JobTx};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    Created,
    Updated,
}

#[derive(Debug)]
pub struct SaveOutcome {
    pub job: JobDefinition,
    pub mode: SaveMode,
    /// Attachments soft-deleted by this save, in deletion order.
    pub deleted: Vec<Attachment>,
    pub created_skills: Vec<Skill>,
}

#[derive(Debug)]
pub struct DeleteOutcome {
    pub job_id: i64,
    pub deleted: Vec<Attachment>,
}

/// Creates (`existing == None`) or updates a job definition and reconciles
/// its image, documents, providers and skills with the payload.
pub async fn save_job_definition(
    store: &dyn JobStore,
    existing: Option<i64>,
    payload: &SavePayload,
    default_skill_group: &str,
) -> Result<SaveOutcome, AppError> {
    let mut tx = store.begin().await?;
    let outcome = apply_payload(tx.as_mut(), existing, payload, default_skill_group).await?;
    tx.commit().await?;

    info!(
        "Job definition {} {:?}: {} attachments deleted, {} skills created",
        outcome.job.id,
        outcome.mode,
        outcome.deleted.len(),
        outcome.created_skills.len()
    );
    Ok(outcome)
}

async fn apply_payload(
    tx: &mut dyn JobTx,
    existing: Option<i64>,
    payload: &SavePayload,
    default_skill_group: &str,
) -> Result<SaveOutcome, AppError> {
    let (job, mode) = match existing {
        None => (tx.insert_job(&payload.fields).await?, SaveMode::Created),
        Some(id) => (tx.update_job(id, &payload.fields).await?, SaveMode::Updated),
    };

    // One row at a time so every deletion is recorded for its file purge.
    let mut deleted = Vec::new();
    for id in &payload.to_delete {
        if let Some(attachment) = tx.delete_attachment(*id).await? {
            deleted.push(attachment);
        }
    }

    if let Some(replaced) = link_image(tx, job.id, payload.image).await? {
        deleted.push(replaced);
    }

    let providers = tx.filter_by_role(Role::Teacher, &payload.providers).await?;
    sync(tx, job.id, Association::Providers, &providers).await?;

    let to_delete: BTreeSet<i64> = payload.to_delete.iter().copied().collect();
    for id in payload.documents.iter().filter(|id| !to_delete.contains(id)) {
        link_document(tx, job.id, *id).await?;
    }

    let mut created_skills = Vec::new();
    let mut skill_ids = Vec::with_capacity(payload.skills.len());
    for token in &payload.skills {
        let (id, created) = resolve_skill(tx, token, default_skill_group).await?;
        if !skill_ids.contains(&id) {
            skill_ids.push(id);
        }
        created_skills.extend(created);
    }
    sync(tx, job.id, Association::Skills, &skill_ids).await?;

    Ok(SaveOutcome {
        job,
        mode,
        deleted,
        created_skills,
    })
}

/// Links the submitted image when it differs from the current one. A
/// previously linked image that is still live is deleted and returned, so a
/// job never owns two images.
async fn link_image(
    tx: &mut dyn JobTx,
    job_id: i64,
    image_id: i64,
) -> Result<Option<Attachment>, AppError> {
    let current = tx.linked_image(job_id).await?;
    if current.as_ref().map(|a| a.id) == Some(image_id) {
        return Ok(None);
    }

    let image = tx
        .find_attachment(image_id)
        .await?
        .filter(|a| a.kind == AttachmentKind::MainImage)
        .ok_or_else(|| AppError::NotFound(format!("Image {image_id} not found")))?;
    if let Some(owner) = image.attachable_id {
        warn!("Image {image_id} is already linked to job definition {owner}");
        return Err(AppError::DataIntegrity(
            "Image already linked to another job".to_string(),
        ));
    }
    tx.link_attachment(image.id, job_id).await?;

    match current {
        Some(previous) => tx.delete_attachment(previous.id).await,
        None => Ok(None),
    }
}

async fn link_document(tx: &mut dyn JobTx, job_id: i64, id: i64) -> Result<(), AppError> {
    let document = tx
        .find_attachment(id)
        .await?
        .filter(|a| a.kind == AttachmentKind::Document)
        .ok_or_else(|| AppError::NotFound(format!("Attachment {id} not found")))?;
    match document.attachable_id {
        Some(owner) if owner == job_id => Ok(()),
        Some(owner) => {
            warn!("Attachment {id} is already linked to job definition {owner}");
            Err(AppError::DataIntegrity(
                "Attachment already linked to another job".to_string(),
            ))
        }
        None => tx.link_attachment(id, job_id).await,
    }
}

/// Returns the skill id for a token and the skill row if one was created.
async fn resolve_skill(
    tx: &mut dyn JobTx,
    token: &SkillToken,
    default_group: &str,
) -> Result<(i64, Option<Skill>), AppError> {
    match token {
        SkillToken::Id(id) => {
            let skill = tx
                .find_skill(*id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Skill {id} not found")))?;
            Ok((skill.id, None))
        }
        SkillToken::Name { group, name } => {
            if let Some(skill) = tx.find_skill_by_name(name).await? {
                return Ok((skill.id, None));
            }
            let group = group.as_deref().unwrap_or(default_group);
            let skill = tx.create_skill(name, group).await?;
            info!("Created skill '{}' in group '{}'", skill.name, group);
            Ok((skill.id, Some(skill)))
        }
    }
}

/// Deletes a job definition after soft-deleting each of its attachments.
pub async fn delete_job_definition(
    store: &dyn JobStore,
    job_id: i64,
) -> Result<DeleteOutcome, AppError> {
    let mut tx = store.begin().await?;

    let mut deleted = Vec::new();
    for id in tx.attachment_ids_of(job_id).await? {
        if let Some(attachment) = tx.delete_attachment(id).await? {
            deleted.push(attachment);
        }
    }
    tx.delete_job(job_id).await?;
    tx.commit().await?;

    info!(
        "Deleted job definition {job_id} and {} attachments",
        deleted.len()
    );
    Ok(DeleteOutcome { job_id, deleted })
}
