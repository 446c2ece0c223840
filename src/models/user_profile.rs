use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use uuid::Uuid;

use crate::auth::UserRole;
use crate::error::AppError;
use crate::models::validation::FieldErrors;

pub const PROFILE_COLUMNS: &str =
    "id, supabase_id, email, role, full_name, created_at, updated_at";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: Uuid,
    pub supabase_id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub full_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for UserProfile {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let role: String = row.try_get("role")?;
        let role = UserRole::from_str(&role)
            .ok_or_else(|| sqlx::Error::Decode(format!("unknown role '{}'", role).into()))?;

        Ok(Self {
            id: row.try_get("id")?,
            supabase_id: row.try_get("supabase_id")?,
            email: row.try_get("email")?,
            role,
            full_name: row.try_get("full_name")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
}

impl UpdateProfileRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        if let Some(full_name) = &self.full_name {
            if full_name.chars().count() > crate::models::validation::MAX_NAME_LENGTH {
                errors.add("full_name", "full_name cannot be longer than 128 characters");
            }
        }
        errors.into_result()
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: Option<String>,
}

impl UpdateRoleRequest {
    /// Only the two known roles are accepted
    pub fn parse_role(&self) -> Result<UserRole, AppError> {
        self.role
            .as_deref()
            .and_then(|role| match role {
                "client" => Some(UserRole::Client),
                "instructor" => Some(UserRole::Instructor),
                _ => None,
            })
            .ok_or_else(|| {
                AppError::invalid_field(
                    "role",
                    "Invalid role. Must be either \"client\" or \"instructor\"",
                )
            })
    }
}
