use chrono::Utc;
use sqlx::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    CreateExerciseRequest, Exercise, ListQuery, UpdateExerciseRequest, EXERCISE_COLUMNS,
};

#[derive(Clone, Debug)]
pub struct ExerciseService {
    db: PgPool,
}

impl ExerciseService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request))]
    pub async fn create(
        &self,
        created_by: Uuid,
        request: CreateExerciseRequest,
    ) -> AppResult<Exercise> {
        request.validate()?;

        let exercise = sqlx::query_as::<_, Exercise>(&format!(
            "INSERT INTO exercises (id, name, instructions, created_by, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5)
             RETURNING {}",
            EXERCISE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(request.name.trim())
        .bind(&request.instructions)
        .bind(created_by)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        info!("Created exercise {} ({})", exercise.id, exercise.name);
        Ok(exercise)
    }

    pub async fn get(&self, exercise_id: Uuid) -> AppResult<Option<Exercise>> {
        let exercise = sqlx::query_as::<_, Exercise>(&format!(
            "SELECT {} FROM exercises WHERE id = $1",
            EXERCISE_COLUMNS
        ))
        .bind(exercise_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(exercise)
    }

    pub async fn list(&self, page: ListQuery) -> AppResult<Vec<Exercise>> {
        let exercises = sqlx::query_as::<_, Exercise>(&format!(
            "SELECT {} FROM exercises ORDER BY name ASC, id LIMIT $1 OFFSET $2",
            EXERCISE_COLUMNS
        ))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(exercises)
    }

    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        exercise_id: Uuid,
        request: UpdateExerciseRequest,
    ) -> AppResult<Exercise> {
        request.validate()?;

        let exercise = sqlx::query_as::<_, Exercise>(&format!(
            "UPDATE exercises
             SET name = COALESCE($2, name),
                 instructions = COALESCE($3, instructions),
                 updated_at = $4
             WHERE id = $1
             RETURNING {}",
            EXERCISE_COLUMNS
        ))
        .bind(exercise_id)
        .bind(request.name.as_deref().map(str::trim))
        .bind(request.instructions)
        .bind(Utc::now())
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("Exercise not found"))?;

        Ok(exercise)
    }

    /// Deleting an exercise also removes it from every routine that lists it
    #[instrument(skip(self))]
    pub async fn delete(&self, exercise_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM exercises WHERE id = $1")
            .bind(exercise_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
