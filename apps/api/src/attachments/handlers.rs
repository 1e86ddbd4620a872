use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, HeaderValue},
    response::IntoResponse,
    Extension, Json,
};
use bytes::Bytes;
use tracing::info;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::attachment::{Attachment, AttachmentKind, NewAttachment};
use crate::state::AppState;

const CONTENT_SECURITY_POLICY: &str =
    "default-src 'none'; img-src 'self'; style-src 'unsafe-inline'";

/// POST /attachments
/// Multipart fields: `kind` (`main_image` | `document`) and `file`.
pub async fn handle_upload(
    State(state): State<AppState>,
    Extension(user): Extension<Arc<CurrentUser>>,
    mut multipart: Multipart,
) -> Result<Json<Attachment>, AppError> {
    if !user.can_manage_jobs() {
        return Err(AppError::Forbidden);
    }

    let mut kind: Option<String> = None;
    let mut file: Option<(String, String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation("file", format!("unreadable upload: {e}")))?
    {
        match field.name().unwrap_or("") {
            "kind" => {
                kind = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::validation("kind", e.to_string()))?,
                );
            }
            "file" => {
                let original_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::validation("file", e.to_string()))?;
                file = Some((original_name, content_type, bytes));
            }
            _ => {}
        }
    }

    let kind = kind
        .as_deref()
        .and_then(AttachmentKind::parse)
        .ok_or_else(|| AppError::validation("kind", "must be main_image or document"))?;
    let (original_name, content_type, bytes) =
        file.ok_or_else(|| AppError::validation("file", "is required"))?;
    check_upload(kind, &content_type, bytes.len(), state.config.upload_max_bytes)?;

    let storage_name = storage_name_for(&original_name);
    state.storage.put(&storage_name, &content_type, bytes.clone()).await?;
    let attachment = state
        .store
        .create_attachment(NewAttachment {
            kind,
            storage_name,
            original_name,
            content_type,
            size_bytes: bytes.len() as i64,
        })
        .await?;

    info!(
        "User {} uploaded attachment {} ({:?}, {} bytes)",
        user.user.id, attachment.id, attachment.kind, attachment.size_bytes
    );
    Ok(Json(attachment))
}

/// GET /dmz-assets/:file
pub async fn handle_serve(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let attachment = state
        .store
        .attachment_by_storage_name(&file)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("File '{file}' not found")))?;
    let stored = state.storage.get(&attachment.storage_name).await?;
    Ok((serve_headers(&attachment), stored.bytes))
}

fn check_upload(
    kind: AttachmentKind,
    content_type: &str,
    size: usize,
    max_bytes: usize,
) -> Result<(), AppError> {
    if size == 0 {
        return Err(AppError::validation("file", "is empty"));
    }
    if size > max_bytes {
        return Err(AppError::validation(
            "file",
            format!("is larger than {max_bytes} bytes"),
        ));
    }
    if kind == AttachmentKind::MainImage && !content_type.starts_with("image/") {
        return Err(AppError::validation("file", "must be an image"));
    }
    Ok(())
}

/// A fresh object name that keeps the upload's extension when it is plain
/// alphanumeric.
fn storage_name_for(original_name: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    let extension = original_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric())
        });
    match extension {
        Some(ext) => format!("{id}.{ext}"),
        None => id,
    }
}

fn serve_headers(attachment: &Attachment) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let content_type = HeaderValue::from_str(&attachment.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(CONTENT_SECURITY_POLICY),
    );

    let disposition = match attachment.kind {
        AttachmentKind::MainImage => "inline".to_string(),
        AttachmentKind::Document => {
            let name: String = attachment
                .original_name
                .chars()
                .filter(|c| c.is_ascii() && !c.is_ascii_control() && *c != '"' && *c != '\\')
                .collect();
            format!("attachment; filename=\"{name}\"")
        }
    };
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn attachment(kind: AttachmentKind, original_name: &str) -> Attachment {
        Attachment {
            id: 1,
            kind,
            attachable_id: None,
            storage_name: "abc.pdf".to_string(),
            original_name: original_name.to_string(),
            content_type: "application/pdf".to_string(),
            size_bytes: 10,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn test_rejects_empty_and_oversized_files() {
        assert!(check_upload(AttachmentKind::Document, "application/pdf", 0, 100).is_err());
        assert!(check_upload(AttachmentKind::Document, "application/pdf", 101, 100).is_err());
        assert!(check_upload(AttachmentKind::Document, "application/pdf", 100, 100).is_ok());
    }

    #[test]
    fn test_main_image_must_be_an_image() {
        assert!(check_upload(AttachmentKind::MainImage, "application/pdf", 10, 100).is_err());
        assert!(check_upload(AttachmentKind::MainImage, "image/png", 10, 100).is_ok());
    }

    #[test]
    fn test_storage_name_keeps_safe_extension() {
        assert!(storage_name_for("Plan.PDF").ends_with(".pdf"));
        assert!(!storage_name_for("evil.p/hp").contains('/'));
        assert!(!storage_name_for("noext").contains('.'));
        assert_ne!(storage_name_for("a.png"), storage_name_for("a.png"));
    }

    #[test]
    fn test_documents_download_as_attachment() {
        let headers = serve_headers(&attachment(AttachmentKind::Document, "Rapport \"final\".pdf"));
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"Rapport final.pdf\""
        );
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert!(headers[header::CONTENT_SECURITY_POLICY]
            .to_str()
            .unwrap()
            .starts_with("default-src 'none'"));
    }

    #[test]
    fn test_images_served_inline() {
        let headers = serve_headers(&attachment(AttachmentKind::MainImage, "cover.png"));
        assert_eq!(headers[header::CONTENT_DISPOSITION], "inline");
    }
}
