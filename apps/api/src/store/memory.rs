use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use crate::errors::AppError;
use crate::jobs::marketplace::marketplace_order;
use crate::models::attachment::{Attachment, AttachmentKind, NewAttachment};
use crate::models::contract::Contract;
use crate::models::job_definition::{JobDefinition, JobDetails, JobFields};
use crate::models::skill::{Skill, SkillGroup, SkillWithGroup};
use crate::models::user::{Role, User, UserSummary};
use crate::store::{Association, JobStore, JobTx};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tables {
    pub jobs: BTreeMap<i64, JobDefinition>,
    pub users: BTreeMap<i64, User>,
    pub roles: BTreeSet<(i64, String)>,
    pub attachments: BTreeMap<i64, Attachment>,
    pub providers: BTreeSet<(i64, i64)>,
    pub skills: BTreeMap<i64, Skill>,
    pub groups: BTreeMap<i64, SkillGroup>,
    pub job_skills: BTreeSet<(i64, i64)>,
    pub contracts: BTreeMap<i64, Contract>,
    next_id: i64,
}

fn role_key(role: Role) -> String {
    format!("{role:?}")
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn has_role(&self, user_id: i64, role: Role) -> bool {
        self.roles.contains(&(user_id, role_key(role)))
    }

    fn live_attachment(&self, id: i64) -> Option<&Attachment> {
        self.attachments.get(&id).filter(|a| !a.is_deleted())
    }

    fn pairs(&self, assoc: Association) -> &BTreeSet<(i64, i64)> {
        match assoc {
            Association::Providers => &self.providers,
            Association::Skills => &self.job_skills,
        }
    }

    fn pairs_mut(&mut self, assoc: Association) -> &mut BTreeSet<(i64, i64)> {
        match assoc {
            Association::Providers => &mut self.providers,
            Association::Skills => &mut self.job_skills,
        }
    }

    fn skill_with_group(&self, skill: &Skill) -> SkillWithGroup {
        let group_name = self
            .groups
            .get(&skill.skill_group_id)
            .map(|g| g.name.clone())
            .unwrap_or_default();
        SkillWithGroup {
            id: skill.id,
            name: skill.name.clone(),
            group_id: skill.skill_group_id,
            group_name,
        }
    }

    fn details(&self, job: &JobDefinition) -> JobDetails {
        let mut details = JobDetails::bare(job.clone());
        let mut providers: Vec<UserSummary> = self
            .providers
            .iter()
            .filter(|(job_id, _)| *job_id == job.id)
            .filter_map(|(_, user_id)| self.users.get(user_id))
            .map(UserSummary::from)
            .collect();
        providers.sort_by(|a, b| (&a.firstname, &a.lastname).cmp(&(&b.firstname, &b.lastname)));
        details.providers = providers;

        for attachment in self.attachments.values() {
            if attachment.attachable_id != Some(job.id) || attachment.is_deleted() {
                continue;
            }
            match attachment.kind {
                AttachmentKind::MainImage => details.image = Some(attachment.clone()),
                AttachmentKind::Document => details.documents.push(attachment.clone()),
            }
        }

        details.skills = self
            .job_skills
            .iter()
            .filter(|(job_id, _)| *job_id == job.id)
            .filter_map(|(_, skill_id)| self.skills.get(skill_id))
            .map(|s| self.skill_with_group(s))
            .collect();
        details
    }

    fn write_job(&mut self, id: i64, fields: &JobFields) -> JobDefinition {
        let now = Utc::now();
        let created_at = self.jobs.get(&id).map(|j| j.created_at).unwrap_or(now);
        let job = JobDefinition {
            id,
            title: fields.title.clone(),
            description: fields.description.clone(),
            required_xp_years: fields.required_xp_years,
            priority: fields.priority,
            one_shot: fields.one_shot,
            allocated_time: fields.allocated_time,
            published_date: fields.published_date,
            archived: fields.archived,
            created_at,
            updated_at: now,
        };
        self.jobs.insert(id, job.clone());
        job
    }
}

/// In-memory `JobStore` for tests. Transactions work on a copy of the
/// tables that replaces the shared state on commit.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> Tables {
        self.lock().clone()
    }

    pub fn seed_user(&self, email: &str, firstname: &str, lastname: &str, roles: &[Role]) -> i64 {
        let mut t = self.lock();
        let id = t.next_id();
        t.users.insert(
            id,
            User {
                id,
                email: email.to_string(),
                firstname: firstname.to_string(),
                lastname: lastname.to_string(),
                created_at: Utc::now(),
            },
        );
        for role in roles {
            t.roles.insert((id, role_key(*role)));
        }
        id
    }

    pub fn seed_job(&self, fields: &JobFields) -> i64 {
        let mut t = self.lock();
        let id = t.next_id();
        t.write_job(id, fields);
        id
    }

    pub fn seed_attachment(&self, kind: AttachmentKind, owner: Option<i64>) -> i64 {
        let mut t = self.lock();
        let id = t.next_id();
        t.attachments.insert(
            id,
            Attachment {
                id,
                kind,
                attachable_id: owner,
                storage_name: format!("file-{id}.bin"),
                original_name: format!("upload-{id}.bin"),
                content_type: "application/octet-stream".to_string(),
                size_bytes: 128,
                created_at: Utc::now(),
                deleted_at: None,
            },
        );
        id
    }

    pub fn seed_skill(&self, name: &str, group: &str) -> i64 {
        let mut t = self.lock();
        create_skill_in(&mut t, name, group).id
    }

    pub fn seed_link(&self, job_id: i64, assoc: Association, id: i64) {
        self.lock().pairs_mut(assoc).insert((job_id, id));
    }

    pub fn seed_contract(&self, job_id: i64, worker_id: i64) {
        let mut t = self.lock();
        let id = t.next_id();
        t.contracts.insert(
            id,
            Contract {
                id,
                job_definition_id: job_id,
                worker_id,
                created_at: Utc::now(),
            },
        );
    }
}

fn create_skill_in(t: &mut Tables, name: &str, group: &str) -> Skill {
    let group_id = match t.groups.values().find(|g| g.name == group) {
        Some(g) => g.id,
        None => {
            let id = t.next_id();
            t.groups.insert(
                id,
                SkillGroup {
                    id,
                    name: group.to_string(),
                },
            );
            id
        }
    };
    let id = t.next_id();
    let skill = Skill {
        id,
        name: name.to_string(),
        skill_group_id: group_id,
    };
    t.skills.insert(id, skill.clone());
    skill
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn JobTx>, AppError> {
        let working = self.snapshot();
        Ok(Box::new(MemoryTx {
            shared: self.tables.clone(),
            working,
        }))
    }

    async fn list_jobs(&self) -> Result<Vec<JobDefinition>, AppError> {
        Ok(self.lock().jobs.values().cloned().collect())
    }

    async fn job_details(&self, id: i64) -> Result<Option<JobDetails>, AppError> {
        let t = self.lock();
        Ok(t.jobs.get(&id).map(|job| t.details(job)))
    }

    async fn marketplace(
        &self,
        worker_id: i64,
        today: NaiveDate,
    ) -> Result<Vec<JobDetails>, AppError> {
        let t = self.lock();
        let contracted: BTreeSet<i64> = t
            .contracts
            .values()
            .filter(|c| c.worker_id == worker_id)
            .map(|c| c.job_definition_id)
            .collect();
        let mut jobs: Vec<&JobDefinition> = t
            .jobs
            .values()
            .filter(|j| j.is_published(today) && j.is_available())
            .filter(|j| !contracted.contains(&j.id))
            .collect();
        jobs.sort_by(|a, b| marketplace_order(a, b));
        Ok(jobs.into_iter().map(|j| t.details(j)).collect())
    }

    async fn attachments_by_ids(
        &self,
        kind: AttachmentKind,
        ids: &[i64],
    ) -> Result<Vec<Attachment>, AppError> {
        let t = self.lock();
        Ok(t.attachments
            .values()
            .filter(|a| ids.contains(&a.id) && a.kind == kind && !a.is_deleted())
            .cloned()
            .collect())
    }

    async fn attachment_by_storage_name(
        &self,
        name: &str,
    ) -> Result<Option<Attachment>, AppError> {
        let t = self.lock();
        Ok(t.attachments
            .values()
            .find(|a| a.storage_name == name && !a.is_deleted())
            .cloned())
    }

    async fn create_attachment(&self, new: NewAttachment) -> Result<Attachment, AppError> {
        let mut t = self.lock();
        let id = t.next_id();
        let attachment = Attachment {
            id,
            kind: new.kind,
            attachable_id: None,
            storage_name: new.storage_name,
            original_name: new.original_name,
            content_type: new.content_type,
            size_bytes: new.size_bytes,
            created_at: Utc::now(),
            deleted_at: None,
        };
        t.attachments.insert(id, attachment.clone());
        Ok(attachment)
    }

    async fn users_with_role(
        &self,
        role: Role,
        except: Option<i64>,
    ) -> Result<Vec<UserSummary>, AppError> {
        let t = self.lock();
        let mut users: Vec<UserSummary> = t
            .users
            .values()
            .filter(|u| t.has_role(u.id, role) && Some(u.id) != except)
            .map(UserSummary::from)
            .collect();
        users.sort_by(|a, b| (&a.firstname, &a.lastname).cmp(&(&b.firstname, &b.lastname)));
        Ok(users)
    }

    async fn skills_excluding(&self, exclude: &[i64]) -> Result<Vec<SkillWithGroup>, AppError> {
        let t = self.lock();
        let mut skills: Vec<SkillWithGroup> = t
            .skills
            .values()
            .filter(|s| !exclude.contains(&s.id))
            .map(|s| t.skill_with_group(s))
            .collect();
        skills.sort_by(|a, b| (&a.group_name, &a.name).cmp(&(&b.group_name, &b.name)));
        Ok(skills)
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.lock().users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn roles_of(&self, user_id: i64) -> Result<Vec<Role>, AppError> {
        let t = self.lock();
        Ok([Role::Teacher, Role::Student, Role::Admin]
            .into_iter()
            .filter(|r| t.has_role(user_id, *r))
            .collect())
    }

    async fn create_contract(&self, job_id: i64, worker_id: i64) -> Result<Contract, AppError> {
        let mut t = self.lock();
        if let Some(existing) = t
            .contracts
            .values()
            .find(|c| c.job_definition_id == job_id && c.worker_id == worker_id)
        {
            return Ok(existing.clone());
        }
        if !t.jobs.contains_key(&job_id) {
            return Err(AppError::NotFound(format!("Job definition {job_id} not found")));
        }
        let id = t.next_id();
        let contract = Contract {
            id,
            job_definition_id: job_id,
            worker_id,
            created_at: Utc::now(),
        };
        t.contracts.insert(id, contract.clone());
        Ok(contract)
    }
}

pub struct MemoryTx {
    shared: Arc<Mutex<Tables>>,
    working: Tables,
}

#[async_trait]
impl JobTx for MemoryTx {
    async fn insert_job(&mut self, fields: &JobFields) -> Result<JobDefinition, AppError> {
        let id = self.working.next_id();
        Ok(self.working.write_job(id, fields))
    }

    async fn update_job(
        &mut self,
        id: i64,
        fields: &JobFields,
    ) -> Result<JobDefinition, AppError> {
        if !self.working.jobs.contains_key(&id) {
            return Err(AppError::NotFound(format!("Job definition {id} not found")));
        }
        Ok(self.working.write_job(id, fields))
    }

    async fn delete_job(&mut self, id: i64) -> Result<(), AppError> {
        let t = &mut self.working;
        t.jobs.remove(&id);
        t.providers.retain(|(job_id, _)| *job_id != id);
        t.job_skills.retain(|(job_id, _)| *job_id != id);
        t.contracts.retain(|_, c| c.job_definition_id != id);
        for attachment in t.attachments.values_mut() {
            if attachment.attachable_id == Some(id) {
                attachment.attachable_id = None;
            }
        }
        Ok(())
    }

    async fn find_attachment(&mut self, id: i64) -> Result<Option<Attachment>, AppError> {
        Ok(self.working.live_attachment(id).cloned())
    }

    async fn attachment_ids_of(&mut self, job_id: i64) -> Result<Vec<i64>, AppError> {
        Ok(self
            .working
            .attachments
            .values()
            .filter(|a| a.attachable_id == Some(job_id) && !a.is_deleted())
            .map(|a| a.id)
            .collect())
    }

    async fn delete_attachment(&mut self, id: i64) -> Result<Option<Attachment>, AppError> {
        match self.working.attachments.get_mut(&id) {
            Some(attachment) if !attachment.is_deleted() => {
                attachment.deleted_at = Some(Utc::now());
                Ok(Some(attachment.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn linked_image(&mut self, job_id: i64) -> Result<Option<Attachment>, AppError> {
        Ok(self
            .working
            .attachments
            .values()
            .rev()
            .find(|a| {
                a.attachable_id == Some(job_id)
                    && a.kind == AttachmentKind::MainImage
                    && !a.is_deleted()
            })
            .cloned())
    }

    async fn link_attachment(&mut self, attachment_id: i64, job_id: i64) -> Result<(), AppError> {
        if let Some(attachment) = self.working.attachments.get_mut(&attachment_id) {
            if attachment.attachable_id.is_some_and(|owner| owner != job_id) {
                return Err(AppError::DataIntegrity(format!(
                    "Attachment {attachment_id} is linked to another job"
                )));
            }
            attachment.attachable_id = Some(job_id);
        }
        Ok(())
    }

    async fn filter_by_role(
        &mut self,
        role: Role,
        candidates: &[i64],
    ) -> Result<Vec<i64>, AppError> {
        let mut ids: Vec<i64> = candidates
            .iter()
            .copied()
            .filter(|id| self.working.has_role(*id, role))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn associated_ids(
        &mut self,
        job_id: i64,
        assoc: Association,
    ) -> Result<Vec<i64>, AppError> {
        Ok(self
            .working
            .pairs(assoc)
            .iter()
            .filter(|(j, _)| *j == job_id)
            .map(|(_, id)| *id)
            .collect())
    }

    async fn attach(
        &mut self,
        job_id: i64,
        assoc: Association,
        ids: &[i64],
    ) -> Result<(), AppError> {
        let pairs = self.working.pairs_mut(assoc);
        for id in ids {
            pairs.insert((job_id, *id));
        }
        Ok(())
    }

    async fn detach(
        &mut self,
        job_id: i64,
        assoc: Association,
        ids: &[i64],
    ) -> Result<(), AppError> {
        let pairs = self.working.pairs_mut(assoc);
        for id in ids {
            pairs.remove(&(job_id, *id));
        }
        Ok(())
    }

    async fn find_skill(&mut self, id: i64) -> Result<Option<Skill>, AppError> {
        Ok(self.working.skills.get(&id).cloned())
    }

    async fn find_skill_by_name(&mut self, name: &str) -> Result<Option<Skill>, AppError> {
        Ok(self
            .working
            .skills
            .values()
            .find(|s| s.name.to_lowercase() == name.to_lowercase())
            .cloned())
    }

    async fn create_skill(&mut self, name: &str, group: &str) -> Result<Skill, AppError> {
        Ok(create_skill_in(&mut self.working, name, group))
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryTx { shared, working } = *self;
        let mut tables = shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *tables = working;
        Ok(())
    }
}
