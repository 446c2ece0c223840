use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::auth::{extract_bearer_token, AuthError, AuthService, UserSession};

/// JWT authentication middleware
///
/// Resolves the bearer token into a `UserSession` and stores it in the request
/// extensions for handlers to extract.
pub async fn jwt_auth_middleware(
    State(auth_service): State<AuthService>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let session = match authenticate(&auth_service, request.headers()).await {
        Ok(session) => session,
        Err(err) => {
            warn!("Rejected {} {}: {}", request.method(), request.uri().path(), err);
            return Err(err);
        }
    };

    request.extensions_mut().insert(session);

    Ok(next.run(request).await)
}

async fn authenticate(
    auth_service: &AuthService,
    headers: &HeaderMap,
) -> Result<UserSession, AuthError> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .ok_or(AuthError::MissingAuthHeader)?;

    let token = extract_bearer_token(auth_header)?;
    auth_service.validate_session(token).await
}
