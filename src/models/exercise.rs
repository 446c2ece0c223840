use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::validation::FieldErrors;

pub const EXERCISE_COLUMNS: &str = "id, name, instructions, created_by, created_at, updated_at";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Exercise {
    pub id: Uuid,
    pub name: String,
    pub instructions: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateExerciseRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub instructions: String,
}

impl CreateExerciseRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        errors.check_name("name", &self.name);
        errors.into_result()
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateExerciseRequest {
    pub name: Option<String>,
    pub instructions: Option<String>,
}

impl UpdateExerciseRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        errors.check_optional_name("name", self.name.as_deref());
        errors.into_result()
    }
}
