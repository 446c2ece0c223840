use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::routine::RoutineResponse;
use crate::models::user_profile::UserProfile;

pub const RELATIONSHIP_COLUMNS: &str = "id, instructor_id, client_id, created_at";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct ClientInstructorRelationship {
    pub id: Uuid,
    pub instructor_id: Uuid,
    pub client_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Relationship with both parties and the assigned routines
#[derive(Debug, Clone, Serialize)]
pub struct RelationshipDetail {
    pub id: Uuid,
    pub client: UserProfile,
    pub instructor: UserProfile,
    pub routines: Vec<RoutineResponse>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RelationshipRequest {
    pub client_id: Option<Uuid>,
}

impl RelationshipRequest {
    pub fn require_client_id(&self) -> Result<Uuid, AppError> {
        self.client_id
            .ok_or_else(|| AppError::invalid_field("client_id", "client_id is required"))
    }
}

#[derive(Debug, Deserialize)]
pub struct RoutineAssignmentRequest {
    pub routine_id: Option<Uuid>,
}

impl RoutineAssignmentRequest {
    pub fn require_routine_id(&self) -> Result<Uuid, AppError> {
        self.routine_id
            .ok_or_else(|| AppError::invalid_field("routine_id", "routine_id is required"))
    }
}
