use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MediaAsset {
    pub id: Uuid,
    pub site_id: Uuid,
    pub storage_key: String,
    pub url: String,
    pub content_type: String,
    pub size_bytes: Option<i64>,
    pub folder: String,
    pub uploaded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
