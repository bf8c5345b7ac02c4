use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A raw job posting. Immutable once ingested; `id` is the stable external id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: String,
    pub title: String,
    #[serde(alias = "text")]
    pub raw_text: String,
}

impl Document {
    pub fn new(id: impl Into<String>, title: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            raw_text: raw_text.into(),
        }
    }
}
