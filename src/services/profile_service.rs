use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::policy::RowFilter;
use crate::auth::{UserRole, UserSession};
use crate::error::{AppError, AppResult};
use crate::models::{ListQuery, UpdateProfileRequest, UserProfile, PROFILE_COLUMNS};

#[derive(Clone, Debug)]
pub struct ProfileService {
    db: PgPool,
}

impl ProfileService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn get_by_supabase_id(
        &self,
        supabase_id: Uuid,
    ) -> Result<Option<UserProfile>, sqlx::Error> {
        sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {} FROM user_profiles WHERE supabase_id = $1",
            PROFILE_COLUMNS
        ))
        .bind(supabase_id)
        .fetch_optional(&self.db)
        .await
    }

    /// Fetch the profile for a Supabase identity, creating it as a client on first sight
    #[instrument(skip(self))]
    pub async fn get_or_provision(
        &self,
        supabase_id: Uuid,
        email: &str,
    ) -> Result<UserProfile, sqlx::Error> {
        if let Some(profile) = self.get_by_supabase_id(supabase_id).await? {
            return Ok(profile);
        }

        // A concurrent first request may insert the same identity.
        // The no-op update returns that row.
        let profile = sqlx::query_as::<_, UserProfile>(&format!(
            "INSERT INTO user_profiles
                 (id, supabase_id, email, role, full_name, created_at, updated_at)
             VALUES ($1, $2, $3, $4, '', $5, $5)
             ON CONFLICT (supabase_id) DO UPDATE SET supabase_id = EXCLUDED.supabase_id
             RETURNING {}",
            PROFILE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(supabase_id)
        .bind(email)
        .bind(UserRole::default().as_str())
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        info!("Provisioned profile {} for {}", profile.id, profile.email);
        Ok(profile)
    }

    pub async fn get_by_id(&self, profile_id: Uuid) -> AppResult<Option<UserProfile>> {
        let profile = sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {} FROM user_profiles WHERE id = $1",
            PROFILE_COLUMNS
        ))
        .bind(profile_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(profile)
    }

    /// Whether `profile_id` is a counterpart of the caller: a client of an instructor
    /// caller, or an instructor of a client caller.
    pub async fn is_counterpart(
        &self,
        session: &UserSession,
        profile_id: Uuid,
    ) -> AppResult<bool> {
        let sql = match session.role {
            UserRole::Instructor => {
                "SELECT EXISTS (SELECT 1 FROM client_instructor_relationships
                 WHERE instructor_id = $1 AND client_id = $2)"
            }
            UserRole::Client => {
                "SELECT EXISTS (SELECT 1 FROM client_instructor_relationships
                 WHERE client_id = $1 AND instructor_id = $2)"
            }
        };

        let linked: bool = sqlx::query_scalar(sql)
            .bind(session.profile_id)
            .bind(profile_id)
            .fetch_one(&self.db)
            .await?;

        Ok(linked)
    }

    pub async fn list(&self, filter: RowFilter, page: ListQuery) -> AppResult<Vec<UserProfile>> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM user_profiles WHERE ",
            PROFILE_COLUMNS
        ));
        push_profile_scope(&mut query, filter);
        query.push(" ORDER BY created_at ASC, id LIMIT ");
        query.push_bind(page.limit());
        query.push(" OFFSET ");
        query.push_bind(page.offset());

        let profiles = query
            .build_query_as::<UserProfile>()
            .fetch_all(&self.db)
            .await?;

        Ok(profiles)
    }

    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        profile_id: Uuid,
        request: UpdateProfileRequest,
    ) -> AppResult<UserProfile> {
        request.validate()?;

        let profile = sqlx::query_as::<_, UserProfile>(&format!(
            "UPDATE user_profiles
             SET full_name = COALESCE($2, full_name),
                 updated_at = $3
             WHERE id = $1
             RETURNING {}",
            PROFILE_COLUMNS
        ))
        .bind(profile_id)
        .bind(request.full_name)
        .bind(Utc::now())
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("Profile not found"))?;

        Ok(profile)
    }

    /// Change a profile's role.
    ///
    /// Refused while the profile sits on the other side of a relationship, since the
    /// relationship would then pair two profiles of the same role.
    #[instrument(skip(self))]
    pub async fn update_role(&self, profile_id: Uuid, role: UserRole) -> AppResult<UserProfile> {
        let mut tx = self.db.begin().await?;

        let current = sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {} FROM user_profiles WHERE id = $1 FOR UPDATE",
            PROFILE_COLUMNS
        ))
        .bind(profile_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Profile not found"))?;

        if current.role == role {
            tx.commit().await?;
            return Ok(current);
        }

        let (sql, message) = match role {
            UserRole::Instructor => (
                "SELECT EXISTS (SELECT 1 FROM client_instructor_relationships
                 WHERE client_id = $1)",
                "Profile is a client in existing relationships; remove them before changing role",
            ),
            UserRole::Client => (
                "SELECT EXISTS (SELECT 1 FROM client_instructor_relationships
                 WHERE instructor_id = $1)",
                "Profile has client relationships; remove them before changing role",
            ),
        };
        let linked: bool = sqlx::query_scalar(sql)
            .bind(profile_id)
            .fetch_one(&mut *tx)
            .await?;
        if linked {
            return Err(AppError::conflict(message));
        }

        let profile = sqlx::query_as::<_, UserProfile>(&format!(
            "UPDATE user_profiles SET role = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            PROFILE_COLUMNS
        ))
        .bind(profile_id)
        .bind(role.as_str())
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!("Profile {} role changed from {} to {}", profile.id, current.role, role);
        Ok(profile)
    }
}

fn push_profile_scope(query: &mut QueryBuilder<'_, Postgres>, filter: RowFilter) {
    match filter {
        RowFilter::All => {
            query.push("TRUE");
        }
        RowFilter::SelfAndClients(me) => {
            query.push("(id = ");
            query.push_bind(me);
            query.push(" OR id IN (SELECT client_id FROM client_instructor_relationships");
            query.push(" WHERE instructor_id = ");
            query.push_bind(me);
            query.push("))");
        }
        RowFilter::SelfAndInstructors(me) => {
            query.push("(id = ");
            query.push_bind(me);
            query.push(" OR id IN (SELECT instructor_id FROM client_instructor_relationships");
            query.push(" WHERE client_id = ");
            query.push_bind(me);
            query.push("))");
        }
        _ => {
            query.push("FALSE");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_scope_sql() {
        let me = Uuid::new_v4();

        let mut query = QueryBuilder::<Postgres>::new("SELECT id FROM user_profiles WHERE ");
        push_profile_scope(&mut query, RowFilter::SelfAndClients(me));
        assert_eq!(
            query.sql(),
            concat!(
                "SELECT id FROM user_profiles WHERE (id = $1 OR id IN ",
                "(SELECT client_id FROM client_instructor_relationships WHERE instructor_id = $2))"
            )
        );

        let mut query = QueryBuilder::<Postgres>::new("SELECT id FROM user_profiles WHERE ");
        push_profile_scope(&mut query, RowFilter::OwnedBy(me));
        assert_eq!(query.sql(), "SELECT id FROM user_profiles WHERE FALSE");
    }
}
