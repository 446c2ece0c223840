use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User roles for role-based access control
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Instructor,
    Client,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Instructor => "instructor",
            UserRole::Client => "client",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "instructor" => Some(UserRole::Instructor),
            "client" => Some(UserRole::Client),
            _ => None,
        }
    }

    pub fn is_instructor(&self) -> bool {
        matches!(self, UserRole::Instructor)
    }
}

impl Default for UserRole {
    fn default() -> Self {
        UserRole::Client
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claims carried by a Supabase access token.
///
/// Only `sub` and `email` are used to resolve the caller; Supabase's own `role` claim
/// (usually `authenticated`) says nothing about instructor/client and is ignored.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,              // Supabase user UUID
    #[serde(default)]
    pub email: Option<String>,
    pub exp: usize,
    #[serde(default)]
    pub iat: Option<usize>,
    #[serde(default)]
    pub aud: Option<String>,
}

/// Verified identity taken from a token, before the profile lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenIdentity {
    pub supabase_id: Uuid,
    pub email: String,
}

impl TokenIdentity {
    pub fn from_claims(claims: &Claims) -> Option<Self> {
        let supabase_id = Uuid::parse_str(&claims.sub).ok()?;
        let email = claims.email.as_deref().filter(|e| !e.is_empty())?;

        Some(Self {
            supabase_id,
            email: email.to_string(),
        })
    }
}

/// The authenticated caller, resolved against the stored profile.
///
/// Inserted into request extensions by the JWT middleware and passed explicitly
/// from handlers into services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSession {
    pub profile_id: Uuid,
    pub supabase_id: Uuid,
    pub email: String,
    pub role: UserRole,
}

impl UserSession {
    pub fn is_instructor(&self) -> bool {
        self.role.is_instructor()
    }
}
