use sqlx::PgPool;
use tracing::warn;

use crate::auth::{AuthError, JwtService, UserSession};
use crate::models::is_valid_email;
use crate::services::ProfileService;

// Postgres unique_violation
const UNIQUE_VIOLATION: &str = "23505";

/// Resolves bearer tokens into sessions backed by stored profiles
#[derive(Clone, Debug)]
pub struct AuthService {
    jwt_service: JwtService,
    profiles: ProfileService,
}

impl AuthService {
    pub fn new(db: PgPool, jwt_secret: &str) -> Self {
        Self {
            jwt_service: JwtService::new(jwt_secret),
            profiles: ProfileService::new(db),
        }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt_service
    }

    /// Validate user session from token, provisioning the profile on first access
    pub async fn validate_session(&self, token: &str) -> Result<UserSession, AuthError> {
        let identity = self.jwt_service.extract_identity(token)?;

        if !is_valid_email(&identity.email) {
            warn!("Token for {} carries a malformed email", identity.supabase_id);
            return Err(AuthError::InvalidTokenPayload);
        }

        let profile = self
            .profiles
            .get_or_provision(identity.supabase_id, &identity.email)
            .await
            .map_err(|err| {
                let is_unique = err
                    .as_database_error()
                    .and_then(|db_err| db_err.code())
                    .is_some_and(|code| code == UNIQUE_VIOLATION);
                if is_unique {
                    AuthError::ProfileConflict(format!(
                        "Email {} is already linked to another identity",
                        identity.email
                    ))
                } else {
                    AuthError::Database(err)
                }
            })?;

        Ok(UserSession {
            profile_id: profile.id,
            supabase_id: profile.supabase_id,
            email: profile.email,
            role: profile.role,
        })
    }
}
