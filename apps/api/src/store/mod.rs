//! Persistence seam.
//!
//! `JobStore` covers the reads behind the views plus `begin()`, which opens a
//! `JobTx`. Everything the save workflow touches goes through the `JobTx` it
//! was handed, so dropping the transaction without `commit()` discards every
//! change made through it.
//!
//! `AppState` holds an `Arc<dyn JobStore>`: `PgStore` in production, the
//! in-memory store in tests.

pub mod postgres;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::errors::AppError;
use crate::models::attachment::{Attachment, AttachmentKind, NewAttachment};
use crate::models::contract::Contract;
use crate::models::job_definition::{JobDefinition, JobDetails, JobFields};
use crate::models::skill::{Skill, SkillWithGroup};
use crate::models::user::{Role, User, UserSummary};

/// Many-to-many associations of a job definition that are synced as sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Association {
    Providers,
    Skills,
}

impl Association {
    pub fn table(self) -> &'static str {
        match self {
            Association::Providers => "job_definition_providers",
            Association::Skills => "job_definition_skills",
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Association::Providers => "user_id",
            Association::Skills => "skill_id",
        }
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn JobTx>, AppError>;

    async fn list_jobs(&self) -> Result<Vec<JobDefinition>, AppError>;

    async fn job_details(&self, id: i64) -> Result<Option<JobDetails>, AppError>;

    /// Jobs published on or before `today` and still available that the
    /// worker holds no contract for, in marketplace order, with associations
    /// loaded in batch.
    async fn marketplace(&self, worker_id: i64, today: NaiveDate)
        -> Result<Vec<JobDetails>, AppError>;

    /// Non-deleted attachments of one kind among `ids`. Unknown ids are skipped.
    async fn attachments_by_ids(
        &self,
        kind: AttachmentKind,
        ids: &[i64],
    ) -> Result<Vec<Attachment>, AppError>;

    async fn attachment_by_storage_name(&self, name: &str)
        -> Result<Option<Attachment>, AppError>;

    async fn create_attachment(&self, new: NewAttachment) -> Result<Attachment, AppError>;

    /// Users holding `role`, ordered by first name then last name.
    async fn users_with_role(
        &self,
        role: Role,
        except: Option<i64>,
    ) -> Result<Vec<UserSummary>, AppError>;

    /// Skills with their group, skipping `exclude`.
    async fn skills_excluding(&self, exclude: &[i64]) -> Result<Vec<SkillWithGroup>, AppError>;

    async fn find_user(&self, id: i64) -> Result<Option<User>, AppError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn roles_of(&self, user_id: i64) -> Result<Vec<Role>, AppError>;

    /// Creates the worker's contract for a job; returns the existing one if any.
    async fn create_contract(&self, job_id: i64, worker_id: i64) -> Result<Contract, AppError>;
}

/// One open transaction. Dropping it without `commit` rolls everything back.
#[async_trait]
pub trait JobTx: Send {
    async fn insert_job(&mut self, fields: &JobFields) -> Result<JobDefinition, AppError>;

    /// Errors with `NotFound` when `id` does not exist.
    async fn update_job(&mut self, id: i64, fields: &JobFields)
        -> Result<JobDefinition, AppError>;

    async fn delete_job(&mut self, id: i64) -> Result<(), AppError>;

    /// Non-deleted attachment by id, any kind.
    async fn find_attachment(&mut self, id: i64) -> Result<Option<Attachment>, AppError>;

    /// Ids of the non-deleted attachments linked to a job.
    async fn attachment_ids_of(&mut self, job_id: i64) -> Result<Vec<i64>, AppError>;

    /// Soft-deletes exactly one attachment. Returns the row if it was live.
    async fn delete_attachment(&mut self, id: i64) -> Result<Option<Attachment>, AppError>;

    async fn linked_image(&mut self, job_id: i64) -> Result<Option<Attachment>, AppError>;

    /// Links an unowned attachment to the job. An attachment owned by
    /// another job is a `DataIntegrity` error.
    async fn link_attachment(&mut self, attachment_id: i64, job_id: i64)
        -> Result<(), AppError>;

    /// The subset of `candidates` holding `role`.
    async fn filter_by_role(&mut self, role: Role, candidates: &[i64])
        -> Result<Vec<i64>, AppError>;

    async fn associated_ids(&mut self, job_id: i64, assoc: Association)
        -> Result<Vec<i64>, AppError>;

    /// Idempotent: pairs that already exist are left alone.
    async fn attach(&mut self, job_id: i64, assoc: Association, ids: &[i64])
        -> Result<(), AppError>;

    /// Idempotent: pairs that do not exist are ignored.
    async fn detach(&mut self, job_id: i64, assoc: Association, ids: &[i64])
        -> Result<(), AppError>;

    async fn find_skill(&mut self, id: i64) -> Result<Option<Skill>, AppError>;

    /// Case-insensitive name lookup.
    async fn find_skill_by_name(&mut self, name: &str) -> Result<Option<Skill>, AppError>;

    /// Creates a skill, creating its group by name when needed.
    async fn create_skill(&mut self, name: &str, group: &str) -> Result<Skill, AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;
}
