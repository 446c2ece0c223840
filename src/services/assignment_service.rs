use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::policy::{evaluate, Action, Target};
use crate::auth::UserSession;
use crate::error::{AppError, AppResult};
use crate::models::{ClientInstructorRelationship, RelationshipDetail, RELATIONSHIP_COLUMNS};
use crate::services::RelationshipService;

/// Adds and removes routines on a client-instructor relationship.
///
/// Each operation runs in one transaction that locks the relationship row first, so
/// concurrent changes to the same relationship are applied one after another.
#[derive(Clone, Debug)]
pub struct AssignmentService {
    db: PgPool,
    relationships: RelationshipService,
}

impl AssignmentService {
    pub fn new(db: PgPool) -> Self {
        Self {
            relationships: RelationshipService::new(db.clone()),
            db,
        }
    }

    /// Assign a routine. Assigning one that is already assigned succeeds without change.
    #[instrument(skip(self, session), fields(caller = %session.profile_id))]
    pub async fn assign_routine(
        &self,
        relationship_id: Uuid,
        routine_id: Uuid,
        session: &UserSession,
    ) -> AppResult<RelationshipDetail> {
        let mut tx = self.db.begin().await?;
        let relationship =
            lock_relationship(&mut tx, relationship_id, session, Action::AssignRoutine).await?;

        let owner: Option<Uuid> =
            sqlx::query_scalar("SELECT instructor_id FROM routines WHERE id = $1")
                .bind(routine_id)
                .fetch_optional(&mut *tx)
                .await?;
        let owner = owner.ok_or_else(|| AppError::not_found("Routine not found"))?;

        if owner != relationship.instructor_id {
            warn!(
                "Routine {} owned by {} cannot be assigned through relationship {}",
                routine_id, owner, relationship.id
            );
            return Err(AppError::conflict("Routine does not belong to the instructor"));
        }

        let inserted = sqlx::query(
            "INSERT INTO relationship_routines
                 (relationship_id, routine_id, instructor_id, assigned_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (relationship_id, routine_id) DO NOTHING",
        )
        .bind(relationship.id)
        .bind(routine_id)
        .bind(relationship.instructor_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if inserted.rows_affected() > 0 {
            info!("Assigned routine {} to relationship {}", routine_id, relationship.id);
        }
        self.relationships.detail(relationship).await
    }

    /// Remove an assigned routine. A routine that is not assigned is `NotFound`.
    #[instrument(skip(self, session), fields(caller = %session.profile_id))]
    pub async fn remove_routine(
        &self,
        relationship_id: Uuid,
        routine_id: Uuid,
        session: &UserSession,
    ) -> AppResult<RelationshipDetail> {
        let mut tx = self.db.begin().await?;
        let relationship =
            lock_relationship(&mut tx, relationship_id, session, Action::RemoveRoutine).await?;

        let removed = sqlx::query(
            "DELETE FROM relationship_routines WHERE relationship_id = $1 AND routine_id = $2",
        )
        .bind(relationship.id)
        .bind(routine_id)
        .execute(&mut *tx)
        .await?;

        if removed.rows_affected() == 0 {
            return Err(AppError::not_found("Routine is not assigned to this relationship"));
        }

        tx.commit().await?;

        info!("Removed routine {} from relationship {}", routine_id, relationship.id);
        self.relationships.detail(relationship).await
    }
}

/// Lock the relationship row and check the caller may perform `action` on it.
///
/// Non-parties get `NotFound`; the client party gets `Forbidden`.
async fn lock_relationship(
    tx: &mut Transaction<'_, Postgres>,
    relationship_id: Uuid,
    session: &UserSession,
    action: Action,
) -> AppResult<ClientInstructorRelationship> {
    let relationship = sqlx::query_as::<_, ClientInstructorRelationship>(&format!(
        "SELECT {} FROM client_instructor_relationships WHERE id = $1 FOR UPDATE",
        RELATIONSHIP_COLUMNS
    ))
    .bind(relationship_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| AppError::not_found("Relationship not found"))?;

    let target = Target::Relationship {
        instructor_id: relationship.instructor_id,
        client_id: relationship.client_id,
    };

    if !evaluate(session, Action::Read, &target).is_allowed() {
        return Err(AppError::not_found("Relationship not found"));
    }
    evaluate(session, action, &target).require()?;

    Ok(relationship)
}
