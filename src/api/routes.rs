use axum::{routing::get, Router};
use sqlx::PgPool;

use super::auth_test::auth_test_routes;
use super::exercises::exercise_routes;
use super::health::health_check;
use super::profiles::profile_routes;
use super::relationships::relationship_routes;
use super::routines::routine_routes;
use crate::auth::AuthService;

pub fn create_routes(db: PgPool, jwt_secret: &str) -> Router {
    let auth_service = AuthService::new(db.clone(), jwt_secret);

    Router::new()
        .route("/health", get(health_check))
        .merge(auth_test_routes(auth_service.clone()))
        .merge(profile_routes(db.clone(), auth_service.clone()))
        .merge(routine_routes(db.clone(), auth_service.clone()))
        .merge(exercise_routes(db.clone(), auth_service.clone()))
        .merge(relationship_routes(db, auth_service))
}
