use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Staff membership of a user in the organizer that owns events.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrganizerMember {
    pub organizer_id: Uuid,
    pub user_id: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
