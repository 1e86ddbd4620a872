use crate::errors::AppError;
use crate::jobs::payload::{parse_id_list, JobDefinitionForm};
use crate::models::attachment::{Attachment, AttachmentKind};
use crate::models::job_definition::JobDetails;
use crate::store::JobStore;

/// Image and documents to show on the form: what the user last submitted,
/// or what is stored when there is no earlier submission.
#[derive(Debug, Default)]
pub struct PendingAttachments {
    pub image: Option<Attachment>,
    pub documents: Vec<Attachment>,
}

/// Ids the form should show, preferring rejected input over stored state.
/// Unparseable old input is treated as absent.
pub fn pending_ids(
    persisted: Option<&JobDetails>,
    old: Option<&JobDefinitionForm>,
) -> (Option<i64>, Vec<i64>) {
    let persisted_image = persisted.and_then(|d| d.image.as_ref()).map(|a| a.id);
    let persisted_docs = || -> Vec<i64> {
        persisted
            .map(|d| d.documents.iter().map(|a| a.id).collect())
            .unwrap_or_default()
    };

    let Some(old) = old else {
        return (persisted_image, persisted_docs());
    };

    let image = match old.image.trim() {
        "" => persisted_image,
        raw => raw.parse::<i64>().ok(),
    };

    let documents = if old.other_attachments.trim().is_empty() {
        persisted_docs()
    } else {
        let mut errors = Vec::new();
        let ids = parse_id_list("other_attachments", &old.other_attachments, &mut errors);
        if errors.is_empty() {
            ids
        } else {
            persisted_docs()
        }
    };

    (image, documents)
}

pub async fn pending_attachments(
    store: &dyn JobStore,
    persisted: Option<&JobDetails>,
    old: Option<&JobDefinitionForm>,
) -> Result<PendingAttachments, AppError> {
    let (image_id, document_ids) = pending_ids(persisted, old);

    let image = match image_id {
        Some(id) => store
            .attachments_by_ids(AttachmentKind::MainImage, &[id])
            .await?
            .pop(),
        None => None,
    };
    let documents = if document_ids.is_empty() {
        Vec::new()
    } else {
        store
            .attachments_by_ids(AttachmentKind::Document, &document_ids)
            .await?
    };

    Ok(PendingAttachments { image, documents })
}

/// Values for the form inputs: the rejected submission as typed, else the
/// stored job, else a blank form.
pub fn form_values(
    persisted: Option<&JobDetails>,
    old: Option<JobDefinitionForm>,
) -> JobDefinitionForm {
    if let Some(old) = old {
        return old;
    }
    let Some(details) = persisted else {
        return JobDefinitionForm {
            required_xp_years: "0".to_string(),
            priority: "0".to_string(),
            ..Default::default()
        };
    };

    let job = &details.job;
    let ids_json = |ids: Vec<i64>| serde_json::Value::from(ids).to_string();
    JobDefinitionForm {
        title: job.title.clone(),
        description: job.description.clone(),
        required_xp_years: job.required_xp_years.to_string(),
        priority: job.priority.to_string(),
        one_shot: job.one_shot.then(|| "on".to_string()),
        allocated_time: job.allocated_time.to_string(),
        published_date: job
            .published_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        archived: job.archived.then(|| "on".to_string()),
        image: details
            .image
            .as_ref()
            .map(|a| a.id.to_string())
            .unwrap_or_default(),
        providers: details.providers.iter().map(|p| p.id.to_string()).collect(),
        other_attachments: ids_json(details.documents.iter().map(|a| a.id).collect()),
        any_attachment_to_delete: String::new(),
        skills: ids_json(details.skills.iter().map(|s| s.id).collect()),
    }
}
