//! Create/edit form as submitted, and its validation into a `SavePayload`.
//!
//! Every field of the raw form is kept as text so that a rejected submission
//! can be stored in the session unchanged and shown again.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::{Validate, ValidationErrors};

use crate::errors::{AppError, FieldError};
use crate::models::job_definition::JobFields;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobDefinitionForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required_xp_years: String,
    #[serde(default)]
    pub priority: String,
    /// Checkbox: present when ticked.
    #[serde(default)]
    pub one_shot: Option<String>,
    #[serde(default)]
    pub allocated_time: String,
    #[serde(default)]
    pub published_date: String,
    #[serde(default)]
    pub archived: Option<String>,
    #[serde(default)]
    pub image: String,
    /// Repeated `providers` key.
    #[serde(default)]
    pub providers: Vec<String>,
    /// JSON array of document attachment ids to keep.
    #[serde(default)]
    pub other_attachments: String,
    /// JSON array of attachment ids to delete.
    #[serde(default)]
    pub any_attachment_to_delete: String,
    /// JSON array of skill ids and free-text names.
    #[serde(default)]
    pub skills: String,
}

/// A submitted skill: an existing id or a name to find or create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkillToken {
    Id(i64),
    Name { group: Option<String>, name: String },
}

impl SkillToken {
    /// `"12"` is an id, `"Cooking: Baking"` names a skill inside a group,
    /// anything else is a bare skill name.
    pub fn parse(raw: &str) -> Option<SkillToken> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(id) = raw.parse::<i64>() {
            return Some(SkillToken::Id(id));
        }
        match raw.split_once(':') {
            Some((group, name)) if !group.trim().is_empty() && !name.trim().is_empty() => {
                Some(SkillToken::Name {
                    group: Some(group.trim().to_string()),
                    name: name.trim().to_string(),
                })
            }
            Some(_) => None,
            None => Some(SkillToken::Name {
                group: None,
                name: raw.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SavePayload {
    pub fields: JobFields,
    pub image: i64,
    pub documents: Vec<i64>,
    pub to_delete: Vec<i64>,
    pub providers: Vec<i64>,
    pub skills: Vec<SkillToken>,
}

/// Scalar fields after parsing, checked against their bounds. A number that
/// did not parse is `None` and already reported.
#[derive(Debug, Validate)]
struct ScalarFields {
    #[validate(
        required(message = "is required"),
        length(max = 255, message = "must be at most 255 characters")
    )]
    title: Option<String>,
    #[validate(length(max = 10000, message = "must be at most 10000 characters"))]
    description: String,
    #[validate(range(min = 0, max = 50, message = "must be between 0 and 50"))]
    required_xp_years: Option<i32>,
    #[validate(range(min = 0, max = 3, message = "must be between 0 and 3"))]
    priority: Option<i32>,
    #[validate(range(min = 1, max = 1000, message = "must be between 1 and 1000"))]
    allocated_time: Option<i32>,
}

impl JobDefinitionForm {
    /// Validates every field and reports all rejected ones at once.
    pub fn validate(&self) -> Result<SavePayload, AppError> {
        let mut errors = Vec::new();

        let title = self.title.trim();
        let scalars = ScalarFields {
            title: (!title.is_empty()).then(|| title.to_string()),
            description: self.description.trim().to_string(),
            required_xp_years: parse_number(
                "required_xp_years",
                &self.required_xp_years,
                &mut errors,
            ),
            priority: parse_number("priority", &self.priority, &mut errors),
            allocated_time: parse_number("allocated_time", &self.allocated_time, &mut errors),
        };
        if let Err(rejected) = scalars.validate() {
            errors.extend(field_errors(&rejected));
        }

        let published_date = match self.published_date.trim() {
            "" => None,
            raw => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => {
                    errors.push(FieldError::new("published_date", "must be a date (YYYY-MM-DD)"));
                    None
                }
            },
        };

        let image = match self.image.trim() {
            "" => {
                errors.push(FieldError::new("image", "is required"));
                None
            }
            raw => match raw.parse::<i64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    errors.push(FieldError::new("image", "must be an attachment id"));
                    None
                }
            },
        };

        let mut providers = Vec::with_capacity(self.providers.len());
        for raw in &self.providers {
            match raw.trim().parse::<i64>() {
                Ok(id) => providers.push(id),
                Err(_) => {
                    errors.push(FieldError::new("providers", format!("'{raw}' is not a user id")));
                }
            }
        }

        let documents = parse_id_list("other_attachments", &self.other_attachments, &mut errors);
        let to_delete =
            parse_id_list("any_attachment_to_delete", &self.any_attachment_to_delete, &mut errors);
        let skills = parse_skill_tokens(&self.skills, &mut errors);

        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        Ok(SavePayload {
            fields: JobFields {
                title: scalars.title.unwrap_or_default(),
                description: scalars.description,
                required_xp_years: scalars.required_xp_years.unwrap_or_default(),
                priority: scalars.priority.unwrap_or_default(),
                one_shot: self.one_shot.is_some(),
                allocated_time: scalars.allocated_time.unwrap_or_default(),
                published_date,
                archived: self.archived.is_some(),
            },
            image: image.unwrap_or_default(),
            documents,
            to_delete,
            providers,
            skills,
        })
    }
}

fn parse_number(field: &str, raw: &str, errors: &mut Vec<FieldError>) -> Option<i32> {
    match raw.trim().parse::<i32>() {
        Ok(n) => Some(n),
        Err(_) => {
            errors.push(FieldError::new(field, "must be a whole number"));
            None
        }
    }
}

/// Flattens `validator` errors into form field errors, ordered by field name.
fn field_errors(rejected: &ValidationErrors) -> Vec<FieldError> {
    let mut fields: Vec<_> = rejected.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    fields
        .into_iter()
        .flat_map(|(field, list)| {
            list.iter().map(move |e| {
                let message = match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("is invalid ({})", e.code),
                };
                FieldError::new(&field, message)
            })
        })
        .collect()
}

fn json_array(field: &str, raw: &str, errors: &mut Vec<FieldError>) -> Vec<Value> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items,
        Ok(Value::Null) => Vec::new(),
        _ => {
            errors.push(FieldError::new(field, "must be a JSON array"));
            Vec::new()
        }
    }
}

/// Parses a JSON array of ids given as numbers or numeric strings.
pub fn parse_id_list(field: &str, raw: &str, errors: &mut Vec<FieldError>) -> Vec<i64> {
    let mut ids = Vec::new();
    for item in json_array(field, raw, errors) {
        let id = match &item {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        match id {
            Some(id) => ids.push(id),
            None => errors.push(FieldError::new(field, format!("{item} is not an id"))),
        }
    }
    ids
}

pub fn parse_skill_tokens(raw: &str, errors: &mut Vec<FieldError>) -> Vec<SkillToken> {
    let mut tokens = Vec::new();
    for item in json_array("skills", raw, errors) {
        let token = match &item {
            Value::Number(n) => n.as_i64().map(SkillToken::Id),
            Value::String(s) => SkillToken::parse(s),
            _ => None,
        };
        match token {
            Some(token) => tokens.push(token),
            None => errors.push(FieldError::new("skills", format!("{item} is not a skill"))),
        }
    }
    tokens
}
