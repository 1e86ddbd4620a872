use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Skill {
    pub id: i64,
    pub name: String,
    pub skill_group_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SkillGroup {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SkillWithGroup {
    pub id: i64,
    pub name: String,
    pub group_id: i64,
    pub group_name: String,
}

impl SkillWithGroup {
    /// Label used by the form, and accepted back as a `Group: Name` token.
    pub fn label(&self) -> String {
        format!("{}: {}", self.group_name, self.name)
    }
}
