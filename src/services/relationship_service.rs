use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::policy::RowFilter;
use crate::auth::UserRole;
use crate::error::{AppError, AppResult};
use crate::models::{
    ClientInstructorRelationship, ListQuery, RelationshipDetail, RELATIONSHIP_COLUMNS,
};
use crate::services::{ProfileService, RoutineService};

#[derive(Clone, Debug)]
pub struct RelationshipService {
    db: PgPool,
    profiles: ProfileService,
    routines: RoutineService,
}

impl RelationshipService {
    pub fn new(db: PgPool) -> Self {
        Self {
            profiles: ProfileService::new(db.clone()),
            routines: RoutineService::new(db.clone()),
            db,
        }
    }

    #[instrument(skip(self))]
    pub async fn create(
        &self,
        instructor_id: Uuid,
        client_id: Uuid,
    ) -> AppResult<RelationshipDetail> {
        let mut tx = self.db.begin().await?;
        ensure_valid_parties(&mut tx, instructor_id, client_id).await?;

        let relationship = sqlx::query_as::<_, ClientInstructorRelationship>(&format!(
            "INSERT INTO client_instructor_relationships (id, instructor_id, client_id, created_at)
             VALUES ($1, $2, $3, $4)
             RETURNING {}",
            RELATIONSHIP_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(instructor_id)
        .bind(client_id)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(duplicate_pair)?;

        tx.commit().await?;

        info!(
            "Relationship {} created between instructor {} and client {}",
            relationship.id, instructor_id, client_id
        );
        self.detail(relationship).await
    }

    pub async fn get(
        &self,
        relationship_id: Uuid,
    ) -> AppResult<Option<ClientInstructorRelationship>> {
        let relationship = sqlx::query_as::<_, ClientInstructorRelationship>(&format!(
            "SELECT {} FROM client_instructor_relationships WHERE id = $1",
            RELATIONSHIP_COLUMNS
        ))
        .bind(relationship_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(relationship)
    }

    pub async fn list(
        &self,
        filter: RowFilter,
        page: ListQuery,
    ) -> AppResult<Vec<RelationshipDetail>> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM client_instructor_relationships WHERE ",
            RELATIONSHIP_COLUMNS
        ));
        match filter {
            RowFilter::All => {
                query.push("TRUE");
            }
            RowFilter::PartyTo(me) => {
                query.push("(instructor_id = ");
                query.push_bind(me);
                query.push(" OR client_id = ");
                query.push_bind(me);
                query.push(")");
            }
            _ => {
                query.push("FALSE");
            }
        }
        query.push(" ORDER BY created_at DESC, id LIMIT ");
        query.push_bind(page.limit());
        query.push(" OFFSET ");
        query.push_bind(page.offset());

        let relationships = query
            .build_query_as::<ClientInstructorRelationship>()
            .fetch_all(&self.db)
            .await?;

        let mut details = Vec::with_capacity(relationships.len());
        for relationship in relationships {
            details.push(self.detail(relationship).await?);
        }
        Ok(details)
    }

    /// Point the relationship at a different client.
    ///
    /// Routines were assigned to the previous client, so a client change clears them.
    #[instrument(skip(self))]
    pub async fn update_client(
        &self,
        relationship_id: Uuid,
        client_id: Uuid,
    ) -> AppResult<RelationshipDetail> {
        let mut tx = self.db.begin().await?;

        let current = sqlx::query_as::<_, ClientInstructorRelationship>(&format!(
            "SELECT {} FROM client_instructor_relationships WHERE id = $1 FOR UPDATE",
            RELATIONSHIP_COLUMNS
        ))
        .bind(relationship_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Relationship not found"))?;

        if client_id == current.client_id {
            tx.commit().await?;
            return self.detail(current).await;
        }

        ensure_valid_parties(&mut tx, current.instructor_id, client_id).await?;

        let updated = sqlx::query_as::<_, ClientInstructorRelationship>(&format!(
            "UPDATE client_instructor_relationships SET client_id = $2
             WHERE id = $1
             RETURNING {}",
            RELATIONSHIP_COLUMNS
        ))
        .bind(current.id)
        .bind(client_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(duplicate_pair)?;

        let cleared = sqlx::query("DELETE FROM relationship_routines WHERE relationship_id = $1")
            .bind(current.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            "Relationship {} moved from client {} to {}, {} assignments cleared",
            current.id,
            current.client_id,
            client_id,
            cleared.rows_affected()
        );
        self.detail(updated).await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, relationship_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM client_instructor_relationships WHERE id = $1")
            .bind(relationship_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Expand a relationship with both party profiles and its assigned routines
    pub async fn detail(
        &self,
        relationship: ClientInstructorRelationship,
    ) -> AppResult<RelationshipDetail> {
        let client = self
            .profiles
            .get_by_id(relationship.client_id)
            .await?
            .ok_or_else(|| AppError::not_found("Client profile not found"))?;
        let instructor = self
            .profiles
            .get_by_id(relationship.instructor_id)
            .await?
            .ok_or_else(|| AppError::not_found("Instructor profile not found"))?;
        let routines = self.routines.list_for_relationship(relationship.id).await?;

        Ok(RelationshipDetail {
            id: relationship.id,
            client,
            instructor,
            routines,
            created_at: relationship.created_at,
        })
    }
}

/// Both parties must exist with their roles: the instructor an instructor, the client a
/// distinct client.
///
/// Both profile rows are share-locked so a concurrent role change waits for this transaction.
async fn ensure_valid_parties(
    tx: &mut Transaction<'_, Postgres>,
    instructor_id: Uuid,
    client_id: Uuid,
) -> AppResult<()> {
    if client_id == instructor_id {
        return Err(AppError::invalid_field(
            "client_id",
            "An instructor cannot be their own client",
        ));
    }

    let instructor_role = locked_role(tx, instructor_id).await?;
    if instructor_role != Some(UserRole::Instructor) {
        return Err(AppError::forbidden("Only instructors can hold client relationships"));
    }

    match locked_role(tx, client_id).await? {
        None => Err(AppError::invalid_field("client_id", "Client profile does not exist")),
        Some(UserRole::Client) => Ok(()),
        Some(_) => Err(AppError::invalid_field("client_id", "Profile is not a client")),
    }
}

async fn locked_role(
    tx: &mut Transaction<'_, Postgres>,
    profile_id: Uuid,
) -> AppResult<Option<UserRole>> {
    let role: Option<String> =
        sqlx::query_scalar("SELECT role FROM user_profiles WHERE id = $1 FOR SHARE")
            .bind(profile_id)
            .fetch_optional(&mut **tx)
            .await?;

    role.map(|role| {
        UserRole::from_str(&role).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "unknown role {:?} on profile {}",
                role,
                profile_id
            ))
        })
    })
    .transpose()
}

fn duplicate_pair(err: sqlx::Error) -> AppError {
    match AppError::from(err) {
        AppError::Conflict(_) => {
            AppError::conflict("A relationship between this instructor and client already exists")
        }
        other => other,
    }
}
