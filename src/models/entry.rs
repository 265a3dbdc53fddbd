use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Entry {
    pub id: String,
    pub title: String,
    pub slug: String,
    /// Calendar date of the journal entry, ISO `YYYY-MM-DD`.
    pub date: String,
    /// Minutes spent on whatever was learned.
    pub time_spent: i64,
    pub learned: String,
    pub resources: String,
    pub created_at: String,
    pub updated_at: String,
}
