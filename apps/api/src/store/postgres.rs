use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use crate::errors::AppError;
use crate::jobs::marketplace::marketplace_order;
use crate::models::attachment::{Attachment, AttachmentKind, NewAttachment};
use crate::models::contract::Contract;
use crate::models::job_definition::{JobDefinition, JobDetails, JobFields};
use crate::models::skill::{Skill, SkillGroup, SkillWithGroup};
use crate::models::user::{Role, User, UserSummary};
use crate::store::{Association, JobStore, JobTx};

const JOB_COLUMNS: &str = "id, title, description, required_xp_years, priority, one_shot, \
     allocated_time, published_date, archived, created_at, updated_at";

const ATTACHMENT_COLUMNS: &str = "id, kind, attachable_id, storage_name, original_name, \
     content_type, size_bytes, created_at, deleted_at";

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    /// Loads providers, attachments and skills for every job in three
    /// queries, whatever the number of jobs.
    async fn with_associations(
        &self,
        jobs: Vec<JobDefinition>,
    ) -> Result<Vec<JobDetails>, AppError> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = jobs.iter().map(|j| j.id).collect();

        let providers: Vec<(i64, i64, String, String)> = sqlx::query_as(
            r#"
            SELECT p.job_definition_id, u.id, u.firstname, u.lastname
            FROM job_definition_providers p
            JOIN users u ON u.id = p.user_id
            WHERE p.job_definition_id = ANY($1)
            ORDER BY u.firstname, u.lastname
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let attachments: Vec<Attachment> = sqlx::query_as(&format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachments \
             WHERE attachable_id = ANY($1) AND deleted_at IS NULL ORDER BY id"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let skills: Vec<(i64, i64, String, i64, String)> = sqlx::query_as(
            r#"
            SELECT js.job_definition_id, s.id, s.name, g.id, g.name
            FROM job_definition_skills js
            JOIN skills s ON s.id = js.skill_id
            JOIN skill_groups g ON g.id = s.skill_group_id
            WHERE js.job_definition_id = ANY($1)
            ORDER BY g.name, s.name
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        debug!(
            "Loaded associations for {} jobs: {} providers, {} attachments, {} skills",
            ids.len(),
            providers.len(),
            attachments.len(),
            skills.len()
        );

        let mut details: Vec<JobDetails> = jobs.into_iter().map(JobDetails::bare).collect();
        let index: HashMap<i64, usize> = details
            .iter()
            .enumerate()
            .map(|(i, d)| (d.job.id, i))
            .collect();

        for (job_id, id, firstname, lastname) in providers {
            if let Some(&i) = index.get(&job_id) {
                details[i].providers.push(UserSummary {
                    id,
                    firstname,
                    lastname,
                });
            }
        }
        for attachment in attachments {
            let Some(&i) = attachment.attachable_id.and_then(|id| index.get(&id)) else {
                continue;
            };
            match attachment.kind {
                AttachmentKind::MainImage => details[i].image = Some(attachment),
                AttachmentKind::Document => details[i].documents.push(attachment),
            }
        }
        for (job_id, id, name, group_id, group_name) in skills {
            if let Some(&i) = index.get(&job_id) {
                details[i].skills.push(SkillWithGroup {
                    id,
                    name,
                    group_id,
                    group_name,
                });
            }
        }

        Ok(details)
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn JobTx>, AppError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn list_jobs(&self) -> Result<Vec<JobDefinition>, AppError> {
        Ok(
            sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM job_definitions ORDER BY id"))
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn job_details(&self, id: i64) -> Result<Option<JobDetails>, AppError> {
        let job: Option<JobDefinition> =
            sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM job_definitions WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        match job {
            Some(job) => Ok(self.with_associations(vec![job]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn marketplace(
        &self,
        worker_id: i64,
        today: NaiveDate,
    ) -> Result<Vec<JobDetails>, AppError> {
        let mut jobs: Vec<JobDefinition> = sqlx::query_as(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM job_definitions
            WHERE published_date IS NOT NULL
              AND published_date <= $2
              AND archived = FALSE
              AND id NOT IN (SELECT job_definition_id FROM contracts WHERE worker_id = $1)
            "#
        ))
        .bind(worker_id)
        .bind(today)
        .fetch_all(&self.pool)
        .await?;
        jobs.sort_by(marketplace_order);

        self.with_associations(jobs).await
    }

    async fn attachments_by_ids(
        &self,
        kind: AttachmentKind,
        ids: &[i64],
    ) -> Result<Vec<Attachment>, AppError> {
        Ok(sqlx::query_as(&format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachments \
             WHERE id = ANY($1) AND kind = $2 AND deleted_at IS NULL ORDER BY id"
        ))
        .bind(ids)
        .bind(kind)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn attachment_by_storage_name(
        &self,
        name: &str,
    ) -> Result<Option<Attachment>, AppError> {
        Ok(sqlx::query_as(&format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachments \
             WHERE storage_name = $1 AND deleted_at IS NULL"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn create_attachment(&self, new: NewAttachment) -> Result<Attachment, AppError> {
        Ok(sqlx::query_as(&format!(
            r#"
            INSERT INTO attachments (kind, storage_name, original_name, content_type, size_bytes)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {ATTACHMENT_COLUMNS}
            "#
        ))
        .bind(new.kind)
        .bind(&new.storage_name)
        .bind(&new.original_name)
        .bind(&new.content_type)
        .bind(new.size_bytes)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn users_with_role(
        &self,
        role: Role,
        except: Option<i64>,
    ) -> Result<Vec<UserSummary>, AppError> {
        Ok(sqlx::query_as(
            r#"
            SELECT u.id, u.firstname, u.lastname
            FROM users u
            JOIN user_roles r ON r.user_id = u.id
            WHERE r.role = $1 AND ($2::BIGINT IS NULL OR u.id <> $2)
            ORDER BY u.firstname, u.lastname
            "#,
        )
        .bind(role)
        .bind(except)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn skills_excluding(&self, exclude: &[i64]) -> Result<Vec<SkillWithGroup>, AppError> {
        Ok(sqlx::query_as(
            r#"
            SELECT s.id, s.name, g.id AS group_id, g.name AS group_name
            FROM skills s
            JOIN skill_groups g ON g.id = s.skill_group_id
            WHERE NOT (s.id = ANY($1))
            ORDER BY g.name, s.name
            "#,
        )
        .bind(exclude)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(sqlx::query_as(
            "SELECT id, email, firstname, lastname, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(sqlx::query_as(
            "SELECT id, email, firstname, lastname, created_at FROM users \
             WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn roles_of(&self, user_id: i64) -> Result<Vec<Role>, AppError> {
        Ok(
            sqlx::query_scalar("SELECT role FROM user_roles WHERE user_id = $1 ORDER BY role")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn create_contract(&self, job_id: i64, worker_id: i64) -> Result<Contract, AppError> {
        sqlx::query(
            "INSERT INTO contracts (job_definition_id, worker_id) VALUES ($1, $2) \
             ON CONFLICT (job_definition_id, worker_id) DO NOTHING",
        )
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(sqlx::query_as(
            "SELECT id, job_definition_id, worker_id, created_at FROM contracts \
             WHERE job_definition_id = $1 AND worker_id = $2",
        )
        .bind(job_id)
        .bind(worker_id)
        .fetch_one(&self.pool)
        .await?)
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl JobTx for PgTx {
    async fn insert_job(&mut self, fields: &JobFields) -> Result<JobDefinition, AppError> {
        Ok(sqlx::query_as(&format!(
            r#"
            INSERT INTO job_definitions
                (title, description, required_xp_years, priority, one_shot,
                 allocated_time, published_date, archived)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(fields.required_xp_years)
        .bind(fields.priority)
        .bind(fields.one_shot)
        .bind(fields.allocated_time)
        .bind(fields.published_date)
        .bind(fields.archived)
        .fetch_one(&mut *self.tx)
        .await?)
    }

    async fn update_job(
        &mut self,
        id: i64,
        fields: &JobFields,
    ) -> Result<JobDefinition, AppError> {
        let updated: Option<JobDefinition> = sqlx::query_as(&format!(
            r#"
            UPDATE job_definitions
            SET title = $1, description = $2, required_xp_years = $3, priority = $4,
                one_shot = $5, allocated_time = $6, published_date = $7, archived = $8,
                updated_at = NOW()
            WHERE id = $9
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(fields.required_xp_years)
        .bind(fields.priority)
        .bind(fields.one_shot)
        .bind(fields.allocated_time)
        .bind(fields.published_date)
        .bind(fields.archived)
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        updated.ok_or_else(|| AppError::NotFound(format!("Job definition {id} not found")))
    }

    async fn delete_job(&mut self, id: i64) -> Result<(), AppError> {
        sqlx::query("DELETE FROM job_definitions WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn find_attachment(&mut self, id: i64) -> Result<Option<Attachment>, AppError> {
        Ok(sqlx::query_as(&format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?)
    }

    async fn attachment_ids_of(&mut self, job_id: i64) -> Result<Vec<i64>, AppError> {
        Ok(sqlx::query_scalar(
            "SELECT id FROM attachments \
             WHERE attachable_id = $1 AND deleted_at IS NULL ORDER BY id",
        )
        .bind(job_id)
        .fetch_all(&mut *self.tx)
        .await?)
    }

    async fn delete_attachment(&mut self, id: i64) -> Result<Option<Attachment>, AppError> {
        Ok(sqlx::query_as(&format!(
            "UPDATE attachments SET deleted_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {ATTACHMENT_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?)
    }

    async fn linked_image(&mut self, job_id: i64) -> Result<Option<Attachment>, AppError> {
        Ok(sqlx::query_as(&format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachments \
             WHERE attachable_id = $1 AND kind = $2 AND deleted_at IS NULL \
             ORDER BY id DESC LIMIT 1"
        ))
        .bind(job_id)
        .bind(AttachmentKind::MainImage)
        .fetch_optional(&mut *self.tx)
        .await?)
    }

    async fn link_attachment(&mut self, attachment_id: i64, job_id: i64) -> Result<(), AppError> {
        let linked = sqlx::query(
            "UPDATE attachments SET attachable_id = $2 \
             WHERE id = $1 AND (attachable_id IS NULL OR attachable_id = $2)",
        )
        .bind(attachment_id)
        .bind(job_id)
        .execute(&mut *self.tx)
        .await?;
        if linked.rows_affected() == 0 {
            return Err(AppError::DataIntegrity(format!(
                "Attachment {attachment_id} is linked to another job"
            )));
        }
        Ok(())
    }

    async fn filter_by_role(
        &mut self,
        role: Role,
        candidates: &[i64],
    ) -> Result<Vec<i64>, AppError> {
        Ok(sqlx::query_scalar(
            "SELECT user_id FROM user_roles WHERE role = $1 AND user_id = ANY($2) ORDER BY user_id",
        )
        .bind(role)
        .bind(candidates)
        .fetch_all(&mut *self.tx)
        .await?)
    }

    async fn associated_ids(
        &mut self,
        job_id: i64,
        assoc: Association,
    ) -> Result<Vec<i64>, AppError> {
        Ok(sqlx::query_scalar(&format!(
            "SELECT {} FROM {} WHERE job_definition_id = $1",
            assoc.column(),
            assoc.table()
        ))
        .bind(job_id)
        .fetch_all(&mut *self.tx)
        .await?)
    }

    async fn attach(
        &mut self,
        job_id: i64,
        assoc: Association,
        ids: &[i64],
    ) -> Result<(), AppError> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query(&format!(
            "INSERT INTO {} (job_definition_id, {}) SELECT $1, UNNEST($2::BIGINT[]) \
             ON CONFLICT DO NOTHING",
            assoc.table(),
            assoc.column()
        ))
        .bind(job_id)
        .bind(ids)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn detach(
        &mut self,
        job_id: i64,
        assoc: Association,
        ids: &[i64],
    ) -> Result<(), AppError> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query(&format!(
            "DELETE FROM {} WHERE job_definition_id = $1 AND {} = ANY($2)",
            assoc.table(),
            assoc.column()
        ))
        .bind(job_id)
        .bind(ids)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn find_skill(&mut self, id: i64) -> Result<Option<Skill>, AppError> {
        Ok(
            sqlx::query_as("SELECT id, name, skill_group_id FROM skills WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await?,
        )
    }

    async fn find_skill_by_name(&mut self, name: &str) -> Result<Option<Skill>, AppError> {
        Ok(sqlx::query_as(
            "SELECT id, name, skill_group_id FROM skills WHERE LOWER(name) = LOWER($1)",
        )
        .bind(name)
        .fetch_optional(&mut *self.tx)
        .await?)
    }

    async fn create_skill(&mut self, name: &str, group: &str) -> Result<Skill, AppError> {
        let group: SkillGroup = sqlx::query_as(
            "INSERT INTO skill_groups (name) VALUES ($1) \
             ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name RETURNING id, name",
        )
        .bind(group)
        .fetch_one(&mut *self.tx)
        .await?;
        debug!("Creating skill {name:?} in group {} ({})", group.name, group.id);

        Ok(sqlx::query_as(
            "INSERT INTO skills (name, skill_group_id) VALUES ($1, $2) \
             RETURNING id, name, skill_group_id",
        )
        .bind(name)
        .bind(group.id)
        .fetch_one(&mut *self.tx)
        .await?)
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let PgTx { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}
