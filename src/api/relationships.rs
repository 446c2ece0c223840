use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post},
    Extension, Router,
};
use axum_extra::extract::WithRejection;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::auth::policy::{evaluate, filter_predicate, Action, Resource, Target};
use crate::auth::{jwt_auth_middleware, AuthService, UserSession};
use crate::error::{AppError, AppResult};
use crate::models::{
    ClientInstructorRelationship, ListQuery, RelationshipDetail, RelationshipRequest,
    RoutineAssignmentRequest,
};
use crate::services::{AssignmentService, RelationshipService};

#[derive(Clone)]
pub struct RelationshipsAppState {
    pub relationship_service: RelationshipService,
    pub assignment_service: AssignmentService,
}

pub fn relationship_routes(db: PgPool, auth_service: AuthService) -> Router {
    let state = RelationshipsAppState {
        relationship_service: RelationshipService::new(db.clone()),
        assignment_service: AssignmentService::new(db),
    };

    Router::new()
        .route(
            "/api/routines/relationships/",
            get(list_relationships).post(create_relationship),
        )
        .route(
            "/api/routines/relationships/:id/",
            get(get_relationship)
                .put(update_relationship)
                .delete(delete_relationship),
        )
        .route("/api/routines/relationships/:id/assign_routine/", post(assign_routine))
        .route("/api/routines/relationships/:id/remove_routine/", post(remove_routine))
        .route_layer(middleware::from_fn_with_state(auth_service, jwt_auth_middleware))
        .with_state(state)
}

pub async fn list_relationships(
    State(state): State<RelationshipsAppState>,
    Extension(session): Extension<UserSession>,
    WithRejection(Query(page), _): WithRejection<Query<ListQuery>, AppError>,
) -> AppResult<Json<Vec<RelationshipDetail>>> {
    let filter = filter_predicate(&session, Resource::Relationship);
    let relationships = state.relationship_service.list(filter, page).await?;
    Ok(Json(relationships))
}

pub async fn get_relationship(
    State(state): State<RelationshipsAppState>,
    Extension(session): Extension<UserSession>,
    WithRejection(Path(relationship_id), _): WithRejection<Path<Uuid>, AppError>,
) -> AppResult<Json<RelationshipDetail>> {
    let relationship = authorize(&state, &session, relationship_id, Action::Read).await?;
    let detail = state.relationship_service.detail(relationship).await?;
    Ok(Json(detail))
}

/// The caller becomes the instructor party
#[tracing::instrument(skip(state, session, request), fields(caller = %session.profile_id))]
pub async fn create_relationship(
    State(state): State<RelationshipsAppState>,
    Extension(session): Extension<UserSession>,
    WithRejection(Json(request), _): WithRejection<Json<RelationshipRequest>, AppError>,
) -> AppResult<(StatusCode, Json<RelationshipDetail>)> {
    evaluate(&session, Action::Create, &Target::Collection(Resource::Relationship)).require()?;

    let client_id = request.require_client_id()?;
    let detail = state
        .relationship_service
        .create(session.profile_id, client_id)
        .await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

#[tracing::instrument(skip(state, session, request), fields(caller = %session.profile_id))]
pub async fn update_relationship(
    State(state): State<RelationshipsAppState>,
    Extension(session): Extension<UserSession>,
    WithRejection(Path(relationship_id), _): WithRejection<Path<Uuid>, AppError>,
    WithRejection(Json(request), _): WithRejection<Json<RelationshipRequest>, AppError>,
) -> AppResult<Json<RelationshipDetail>> {
    let relationship = authorize(&state, &session, relationship_id, Action::Update).await?;
    let client_id = request.require_client_id()?;

    let detail = state
        .relationship_service
        .update_client(relationship.id, client_id)
        .await?;
    Ok(Json(detail))
}

#[tracing::instrument(skip(state, session), fields(caller = %session.profile_id))]
pub async fn delete_relationship(
    State(state): State<RelationshipsAppState>,
    Extension(session): Extension<UserSession>,
    WithRejection(Path(relationship_id), _): WithRejection<Path<Uuid>, AppError>,
) -> AppResult<StatusCode> {
    let relationship = authorize(&state, &session, relationship_id, Action::Delete).await?;

    if !state.relationship_service.delete(relationship.id).await? {
        return Err(AppError::not_found("Relationship not found"));
    }

    info!("Relationship {} deleted by {}", relationship.id, session.profile_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn assign_routine(
    State(state): State<RelationshipsAppState>,
    Extension(session): Extension<UserSession>,
    WithRejection(Path(relationship_id), _): WithRejection<Path<Uuid>, AppError>,
    WithRejection(Json(request), _): WithRejection<Json<RoutineAssignmentRequest>, AppError>,
) -> AppResult<Json<RelationshipDetail>> {
    let routine_id = request.require_routine_id()?;
    let detail = state
        .assignment_service
        .assign_routine(relationship_id, routine_id, &session)
        .await?;
    Ok(Json(detail))
}

pub async fn remove_routine(
    State(state): State<RelationshipsAppState>,
    Extension(session): Extension<UserSession>,
    WithRejection(Path(relationship_id), _): WithRejection<Path<Uuid>, AppError>,
    WithRejection(Json(request), _): WithRejection<Json<RoutineAssignmentRequest>, AppError>,
) -> AppResult<Json<RelationshipDetail>> {
    let routine_id = request.require_routine_id()?;
    let detail = state
        .assignment_service
        .remove_routine(relationship_id, routine_id, &session)
        .await?;
    Ok(Json(detail))
}

/// Non-parties get `NotFound`; a party without the right gets `Forbidden`
async fn authorize(
    state: &RelationshipsAppState,
    session: &UserSession,
    relationship_id: Uuid,
    action: Action,
) -> AppResult<ClientInstructorRelationship> {
    let relationship = state
        .relationship_service
        .get(relationship_id)
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
