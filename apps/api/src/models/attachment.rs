use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Which slot of a job definition an attachment fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "attachment_kind", rename_all = "snake_case")]
pub enum AttachmentKind {
    MainImage,
    Document,
}

impl AttachmentKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "main_image" => Some(AttachmentKind::MainImage),
            "document" => Some(AttachmentKind::Document),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Attachment {
    pub id: i64,
    pub kind: AttachmentKind,
    /// Owning job definition; `None` until the save workflow links it.
    pub attachable_id: Option<i64>,
    pub storage_name: String,
    pub original_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Attachment {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn url(&self) -> String {
        format!("/dmz-assets/{}", self.storage_name)
    }
}

#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub kind: AttachmentKind,
    pub storage_name: String,
    pub original_name: String,
    pub content_type: String,
    pub size_bytes: i64,
}
