use std::collections::HashMap;

use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::policy::RowFilter;
use crate::error::{AppError, AppResult};
use crate::models::{
    distinct_exercise_ids, CreateRoutineRequest, ListQuery, Routine, RoutineExercise,
    RoutineExerciseRow, RoutineResponse, UpdateRoutineRequest, ROUTINE_COLUMNS,
};

#[derive(Clone, Debug)]
pub struct RoutineService {
    db: PgPool,
}

impl RoutineService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request))]
    pub async fn create(
        &self,
        instructor_id: Uuid,
        request: CreateRoutineRequest,
    ) -> AppResult<RoutineResponse> {
        request.validate()?;

        let mut tx = self.db.begin().await?;
        ensure_exercises_exist(&mut tx, &request.exercise_ids).await?;

        let routine = sqlx::query_as::<_, Routine>(&format!(
            "INSERT INTO routines
                 (id, name, description, instructor_id, is_active, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $6)
             RETURNING {}",
            ROUTINE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(request.name.trim())
        .bind(&request.description)
        .bind(instructor_id)
        .bind(request.is_active)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        replace_exercises(&mut tx, routine.id, &request.exercise_ids).await?;
        tx.commit().await?;

        info!("Instructor {} created routine {} ({})", instructor_id, routine.id, routine.name);
        self.with_exercises(routine).await
    }

    pub async fn get(&self, routine_id: Uuid) -> AppResult<Option<Routine>> {
        let routine = sqlx::query_as::<_, Routine>(&format!(
            "SELECT {} FROM routines WHERE id = $1",
            ROUTINE_COLUMNS
        ))
        .bind(routine_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(routine)
    }

    /// Whether the routine is assigned to the client through any relationship
    pub async fn is_assigned_to_client(
        &self,
        routine_id: Uuid,
        client_id: Uuid,
    ) -> AppResult<bool> {
        let assigned: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT 1 FROM relationship_routines rr
                JOIN client_instructor_relationships cir ON cir.id = rr.relationship_id
                WHERE rr.routine_id = $1 AND cir.client_id = $2
             )",
        )
        .bind(routine_id)
        .bind(client_id)
        .fetch_one(&self.db)
        .await?;

        Ok(assigned)
    }

    pub async fn list(
        &self,
        filter: RowFilter,
        page: ListQuery,
    ) -> AppResult<Vec<RoutineResponse>> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM routines WHERE ",
            ROUTINE_COLUMNS
        ));
        push_routine_scope(&mut query, filter);
        query.push(" ORDER BY created_at DESC, id LIMIT ");
        query.push_bind(page.limit());
        query.push(" OFFSET ");
        query.push_bind(page.offset());

        let routines = query.build_query_as::<Routine>().fetch_all(&self.db).await?;
        self.load_exercises(routines).await
    }

    /// Routines assigned to a relationship, in assignment order
    pub async fn list_for_relationship(
        &self,
        relationship_id: Uuid,
    ) -> AppResult<Vec<RoutineResponse>> {
        let routines = sqlx::query_as::<_, Routine>(
            "SELECT r.id, r.name, r.description, r.instructor_id, r.is_active,
                    r.created_at, r.updated_at
             FROM routines r
             JOIN relationship_routines rr ON rr.routine_id = r.id
             WHERE rr.relationship_id = $1
             ORDER BY rr.assigned_at ASC, r.id",
        )
        .bind(relationship_id)
        .fetch_all(&self.db)
        .await?;

        self.load_exercises(routines).await
    }

    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        routine_id: Uuid,
        request: UpdateRoutineRequest,
    ) -> AppResult<RoutineResponse> {
        request.validate()?;

        let mut tx = self.db.begin().await?;
        if let Some(exercise_ids) = &request.exercise_ids {
            ensure_exercises_exist(&mut tx, exercise_ids).await?;
        }

        let routine = sqlx::query_as::<_, Routine>(&format!(
            "UPDATE routines
             SET name = COALESCE($2, name),
                 description = COALESCE($3, description),
                 is_active = COALESCE($4, is_active),
                 updated_at = $5
             WHERE id = $1
             RETURNING {}",
            ROUTINE_COLUMNS
        ))
        .bind(routine_id)
        .bind(request.name.as_deref().map(str::trim))
        .bind(request.description.as_deref())
        .bind(request.is_active)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Routine not found"))?;

        if let Some(exercise_ids) = &request.exercise_ids {
            sqlx::query("DELETE FROM routine_exercises WHERE routine_id = $1")
                .bind(routine.id)
                .execute(&mut *tx)
                .await?;
            replace_exercises(&mut tx, routine.id, exercise_ids).await?;
        }

        tx.commit().await?;
        self.with_exercises(routine).await
    }

    /// Deleting a routine also drops its exercise slots and assignments
    #[instrument(skip(self))]
    pub async fn delete(&self, routine_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM routines WHERE id = $1")
            .bind(routine_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn with_exercises(&self, routine: Routine) -> AppResult<RoutineResponse> {
        let mut responses = self.load_exercises(vec![routine]).await?;
        responses.pop().ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("routine vanished while loading exercises"))
        })
    }

    /// Attach ordered exercises to each routine with a single query
    async fn load_exercises(&self, routines: Vec<Routine>) -> AppResult<Vec<RoutineResponse>> {
        if routines.is_empty() {
            return Ok(Vec::new());
        }

        let routine_ids: Vec<Uuid> = routines.iter().map(|r| r.id).collect();
        let rows = sqlx::query_as::<_, RoutineExerciseRow>(
            "SELECT re.routine_id, re.position,
                    e.id, e.name, e.instructions, e.created_by, e.created_at, e.updated_at
             FROM routine_exercises re
             JOIN exercises e ON e.id = re.exercise_id
             WHERE re.routine_id = ANY($1)
             ORDER BY re.routine_id, re.position",
        )
        .bind(routine_ids)
        .fetch_all(&self.db)
        .await?;

        let mut by_routine: HashMap<Uuid, Vec<RoutineExercise>> = HashMap::new();
        for row in rows {
            by_routine.entry(row.routine_id).or_default().push(RoutineExercise {
                position: row.position,
                exercise: row.exercise,
            });
        }

        Ok(routines
            .into_iter()
            .map(|routine| {
                let exercises = by_routine.remove(&routine.id).unwrap_or_default();
                RoutineResponse { routine, exercises }
            })
            .collect())
    }
}

async fn ensure_exercises_exist(
    tx: &mut Transaction<'_, Postgres>,
    exercise_ids: &[Uuid],
) -> AppResult<()> {
    let wanted = distinct_exercise_ids(exercise_ids);
    if wanted.is_empty() {
        return Ok(());
    }

    let found: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM exercises WHERE id = ANY($1)")
        .bind(wanted.clone())
        .fetch_all(&mut **tx)
        .await?;

    let missing: Vec<String> = wanted
        .iter()
        .filter(|id| !found.contains(id))
        .map(Uuid::to_string)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::invalid_field(
            "exercise_ids",
            format!("Unknown exercise ids: {}", missing.join(", ")),
        ))
    }
}

/// Write the ordered collection; positions follow list order starting at 0
async fn replace_exercises(
    tx: &mut Transaction<'_, Postgres>,
    routine_id: Uuid,
    exercise_ids: &[Uuid],
) -> AppResult<()> {
    if exercise_ids.is_empty() {
        return Ok(());
    }

    sqlx::query(
        "INSERT INTO routine_exercises (routine_id, position, exercise_id)
         SELECT $1, (t.ord - 1)::int, t.exercise_id
         FROM UNNEST($2::uuid[]) WITH ORDINALITY AS t(exercise_id, ord)",
    )
    .bind(routine_id)
    .bind(exercise_ids.to_vec())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn push_routine_scope(query: &mut QueryBuilder<'_, Postgres>, filter: RowFilter) {
    match filter {
        RowFilter::All => {
            query.push("TRUE");
        }
        RowFilter::OwnedBy(instructor_id) => {
            query.push("instructor_id = ");
            query.push_bind(instructor_id);
        }
        RowFilter::AssignedToClient(client_id) => {
            query.push(
                "is_active AND id IN (
                    SELECT rr.routine_id FROM relationship_routines rr
                    JOIN client_instructor_relationships cir ON cir.id = rr.relationship_id
                    WHERE cir.client_id = ",
            );
            query.push_bind(client_id);
            query.push(")");
        }
        _ => {
            query.push("FALSE");
        }
    }
}
