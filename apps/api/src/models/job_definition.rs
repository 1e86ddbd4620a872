use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::attachment::Attachment;
use crate::models::skill::SkillWithGroup;
use crate::models::user::UserSummary;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct JobDefinition {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub required_xp_years: i32,
    pub priority: i32,
    pub one_shot: bool,
    /// Hours allocated to the job.
    pub allocated_time: i32,
    pub published_date: Option<NaiveDate>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobDefinition {
    pub fn is_published(&self, today: NaiveDate) -> bool {
        self.published_date.is_some_and(|date| date <= today)
    }

    pub fn is_available(&self) -> bool {
        !self.archived
    }
}

/// The only columns a submitted form may write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFields {
    pub title: String,
    pub description: String,
    pub required_xp_years: i32,
    pub priority: i32,
    pub one_shot: bool,
    pub allocated_time: i32,
    pub published_date: Option<NaiveDate>,
    pub archived: bool,
}

/// A job definition together with everything the views render next to it.
#[derive(Debug, Clone, Serialize)]
pub struct JobDetails {
    pub job: JobDefinition,
    pub providers: Vec<UserSummary>,
    pub image: Option<Attachment>,
    pub documents: Vec<Attachment>,
    pub skills: Vec<SkillWithGroup>,
}

impl JobDetails {
    pub fn bare(job: JobDefinition) -> Self {
        JobDetails {
            job,
            providers: Vec::new(),
            image: None,
            documents: Vec::new(),
            skills: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(published_date: Option<NaiveDate>, archived: bool) -> JobDefinition {
        JobDefinition {
            id: 1,
            title: "Garden".to_string(),
            description: String::new(),
            required_xp_years: 0,
            priority: 0,
            one_shot: false,
            allocated_time: 10,
            published_date,
            archived,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_unpublished_without_date() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert!(!job(None, false).is_published(today));
    }

    #[test]
    fn test_future_publication_is_not_published_yet() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let tomorrow = NaiveDate::from_ymd_opt(2024, 5, 2);
        assert!(!job(tomorrow, false).is_published(today));
        assert!(job(Some(today), false).is_published(today));
    }

    #[test]
    fn test_archived_job_is_unavailable() {
        assert!(!job(None, true).is_available());
        assert!(job(None, false).is_available());
    }
}
