use askama::Template;

use crate::auth::session::Flash;
use crate::errors::FieldError;
use crate::jobs::payload::JobDefinitionForm;
use crate::models::attachment::Attachment;
use crate::models::job_definition::JobDetails;
use crate::models::skill::SkillWithGroup;
use crate::models::user::UserSummary;

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorPage<'a> {
    pub status: u16,
    pub code: &'a str,
    pub message: &'a str,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginPage {
    pub flash: Option<Flash>,
    pub username: String,
}

#[derive(Debug, Clone)]
pub struct DocumentLink {
    pub id: i64,
    pub url: String,
    pub name: String,
}

impl From<&Attachment> for DocumentLink {
    fn from(attachment: &Attachment) -> Self {
        DocumentLink {
            id: attachment.id,
            url: attachment.url(),
            name: attachment.original_name.clone(),
        }
    }
}

/// One job as shown in the marketplace and on its own page.
#[derive(Debug, Clone)]
pub struct JobCard {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub providers: String,
    pub skills: Vec<String>,
    pub documents: Vec<DocumentLink>,
    pub required_xp_years: i32,
    pub priority: i32,
    pub one_shot: bool,
    pub allocated_time: i32,
    pub can_apply: bool,
}

impl JobCard {
    pub fn from_details(details: &JobDetails, can_apply: bool) -> Self {
        let job = &details.job;
        JobCard {
            id: job.id,
            title: job.title.clone(),
            description: job.description.clone(),
            image_url: details.image.as_ref().map(Attachment::url),
            providers: details
                .providers
                .iter()
                .map(UserSummary::full_name)
                .collect::<Vec<_>>()
                .join(", "),
            skills: details.skills.iter().map(SkillWithGroup::label).collect(),
            documents: details.documents.iter().map(DocumentLink::from).collect(),
            required_xp_years: job.required_xp_years,
            priority: job.priority,
            one_shot: job.one_shot,
            allocated_time: job.allocated_time,
            can_apply,
        }
    }
}

#[derive(Template)]
#[template(path = "marketplace.html")]
pub struct MarketplacePage {
    pub user_name: String,
    pub flash: Option<Flash>,
    pub can_create: bool,
    pub empty_label: String,
    pub cards: Vec<JobCard>,
}

#[derive(Template)]
#[template(path = "job_show.html")]
pub struct JobShowPage {
    pub user_name: String,
    pub flash: Option<Flash>,
    pub card: JobCard,
    pub published: String,
    pub archived: bool,
    pub can_edit: bool,
}

#[derive(Debug, Clone)]
pub struct ProviderOption {
    pub id: i64,
    pub name: String,
    pub checked: bool,
}

#[derive(Debug, Clone)]
pub struct SkillOption {
    pub id: i64,
    pub label: String,
}

impl From<&SkillWithGroup> for SkillOption {
    fn from(skill: &SkillWithGroup) -> Self {
        SkillOption {
            id: skill.id,
            label: skill.label(),
        }
    }
}

#[derive(Template)]
#[template(path = "job_form.html")]
pub struct JobFormPage {
    pub user_name: String,
    pub flash: Option<Flash>,
    pub heading: String,
    /// `/jobs` when creating, `/jobs/<id>` when editing.
    pub action: String,
    pub form: JobDefinitionForm,
    pub errors: Vec<FieldError>,
    pub providers: Vec<ProviderOption>,
    pub image: Option<DocumentLink>,
    pub documents: Vec<DocumentLink>,
    /// Labels of the skills in the form's `skills` field.
    pub selected_skills: Vec<String>,
    /// Skills that can still be added.
    pub skill_choices: Vec<SkillOption>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::attachment::AttachmentKind;
    use crate::models::job_definition::JobDefinition;
    use chrono::Utc;

    fn details() -> JobDetails {
        let mut details = JobDetails::bare(JobDefinition {
            id: 3,
            title: "Garden <b>work</b>".to_string(),
            description: "Rake leaves".to_string(),
            required_xp_years: 1,
            priority: 2,
            one_shot: true,
            allocated_time: 5,
            published_date: None,
            archived: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
        details.providers = vec![
            UserSummary {
                id: 1,
                firstname: "Ada".to_string(),
                lastname: "Lovelace".to_string(),
            },
            UserSummary {
                id: 2,
                firstname: "Alan".to_string(),
                lastname: "Turing".to_string(),
            },
        ];
        details.skills = vec![SkillWithGroup {
            id: 4,
            name: "Pruning".to_string(),
            group_id: 1,
            group_name: "Garden".to_string(),
        }];
        details.image = Some(Attachment {
            id: 9,
            kind: AttachmentKind::MainImage,
            attachable_id: Some(3),
            storage_name: "cover.png".to_string(),
            original_name: "cover.png".to_string(),
            content_type: "image/png".to_string(),
            size_bytes: 42,
            created_at: Utc::now(),
            deleted_at: None,
        });
        details
    }

    #[test]
    fn test_card_from_details() {
        let card = JobCard::from_details(&details(), true);
        assert_eq!(card.providers, "Ada Lovelace, Alan Turing");
        assert_eq!(card.skills, vec!["Garden: Pruning".to_string()]);
        assert_eq!(card.image_url.as_deref(), Some("/dmz-assets/cover.png"));
    }

    #[test]
    fn test_marketplace_escapes_titles() {
        let page = MarketplacePage {
            user_name: "Ada Lovelace".to_string(),
            flash: Some(Flash::success("Job \"Garden\" created")),
            can_create: true,
            empty_label: "No jobs".to_string(),
            cards: vec![JobCard::from_details(&details(), true)],
        };
        let html = page.render().unwrap();
        assert!(html.contains("Garden &lt;b&gt;work"));
        assert!(!html.contains("<b>work"));
        assert!(html.contains("/jobs/3/apply"));
        assert!(!html.contains("No jobs"));
    }

    #[test]
    fn test_empty_marketplace_shows_label() {
        let page = MarketplacePage {
            user_name: "Ada Lovelace".to_string(),
            flash: None,
            can_create: false,
            empty_label: "Aucun job".to_string(),
            cards: Vec::new(),
        };
        let html = page.render().unwrap();
        assert!(html.contains("Aucun job"));
        assert!(!html.contains("/jobs/create"));
    }

    #[test]
    fn test_form_lists_field_errors() {
        let page = JobFormPage {
            user_name: "Ada Lovelace".to_string(),
            flash: None,
            heading: "New job".to_string(),
            action: "/jobs".to_string(),
            form: JobDefinitionForm::default(),
            errors: vec![FieldError::new("title", "is required")],
            providers: vec![ProviderOption {
                id: 1,
                name: "Ada Lovelace".to_string(),
                checked: true,
            }],
            image: None,
            documents: Vec::new(),
            selected_skills: Vec::new(),
            skill_choices: Vec::new(),
        };
        let html = page.render().unwrap();
        assert!(html.contains("title: is required"));
        assert!(html.contains("value=\"1\" checked"));
    }
}
