use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Contract {
    pub id: i64,
    pub job_definition_id: i64,
    pub worker_id: i64,
    pub created_at: DateTime<Utc>,
}
