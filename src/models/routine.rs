use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::exercise::Exercise;
use crate::models::validation::FieldErrors;

pub const ROUTINE_COLUMNS: &str =
    "id, name, description, instructor_id, is_active, created_at, updated_at";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Routine {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub instructor_id: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One slot in a routine's ordered exercise collection
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RoutineExercise {
    pub position: i32,
    #[serde(flatten)]
    pub exercise: Exercise,
}

#[derive(Debug, FromRow)]
pub struct RoutineExerciseRow {
    pub routine_id: Uuid,
    pub position: i32,
    #[sqlx(flatten)]
    pub exercise: Exercise,
}

/// Routine with its exercises in order
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RoutineResponse {
    #[serde(flatten)]
    pub routine: Routine,
    pub exercises: Vec<RoutineExercise>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateRoutineRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub exercise_ids: Vec<Uuid>,
}

impl CreateRoutineRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        errors.check_name("name", &self.name);
        errors.into_result()
    }
}

/// Present fields replace stored ones; `exercise_ids` replaces the whole ordered collection.
#[derive(Debug, Deserialize)]
pub struct UpdateRoutineRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub exercise_ids: Option<Vec<Uuid>>,
}

impl UpdateRoutineRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        errors.check_optional_name("name", self.name.as_deref());
        errors.into_result()
    }
}

/// Distinct ids from an ordered exercise list, for existence checks
pub fn distinct_exercise_ids(exercise_ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    exercise_ids
        .iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .collect()
}
