use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::Json,
    routing::get,
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
    CreateRoutineRequest, ListQuery, Routine, RoutineResponse, UpdateRoutineRequest,
};
use crate::services::RoutineService;

#[derive(Clone)]
pub struct RoutinesAppState {
    pub routine_service: RoutineService,
}

pub fn routine_routes(db: PgPool, auth_service: AuthService) -> Router {
    let state = RoutinesAppState {
        routine_service: RoutineService::new(db),
    };

    Router::new()
        .route("/api/routines/routines/", get(list_routines).post(create_routine))
        .route(
            "/api/routines/routines/:id/",
            get(get_routine).put(update_routine).delete(delete_routine),
        )
        .route_layer(middleware::from_fn_with_state(auth_service, jwt_auth_middleware))
        .with_state(state)
}

/// Instructors see the routines they own; clients see active routines assigned to them
pub async fn list_routines(
    State(state): State<RoutinesAppState>,
    Extension(session): Extension<UserSession>,
    WithRejection(Query(page), _): WithRejection<Query<ListQuery>, AppError>,
) -> AppResult<Json<Vec<RoutineResponse>>> {
    let filter = filter_predicate(&session, Resource::Routine);
    let routines = state.routine_service.list(filter, page).await?;
    Ok(Json(routines))
}

pub async fn get_routine(
    State(state): State<RoutinesAppState>,
    Extension(session): Extension<UserSession>,
    WithRejection(Path(routine_id), _): WithRejection<Path<Uuid>, AppError>,
) -> AppResult<Json<RoutineResponse>> {
    let routine = load_visible_routine(&state, &session, routine_id).await?;
    let response = state.routine_service.with_exercises(routine).await?;
    Ok(Json(response))
}

#[tracing::instrument(skip(state, session, request), fields(caller = %session.profile_id))]
pub async fn create_routine(
    State(state): State<RoutinesAppState>,
    Extension(session): Extension<UserSession>,
    WithRejection(Json(request), _): WithRejection<Json<CreateRoutineRequest>, AppError>,
) -> AppResult<(StatusCode, Json<RoutineResponse>)> {
    evaluate(&session, Action::Create, &Target::Collection(Resource::Routine)).require()?;

    let routine = state.routine_service.create(session.profile_id, request).await?;
    Ok((StatusCode::CREATED, Json(routine)))
}

#[tracing::instrument(skip(state, session, request), fields(caller = %session.profile_id))]
pub async fn update_routine(
    State(state): State<RoutinesAppState>,
    Extension(session): Extension<UserSession>,
    WithRejection(Path(routine_id), _): WithRejection<Path<Uuid>, AppError>,
    WithRejection(Json(request), _): WithRejection<Json<UpdateRoutineRequest>, AppError>,
) -> AppResult<Json<RoutineResponse>> {
    let routine = load_visible_routine(&state, &session, routine_id).await?;
    evaluate(&session, Action::Update, &routine_target(&routine, true)).require()?;

    let updated = state.routine_service.update(routine.id, request).await?;
    Ok(Json(updated))
}

#[tracing::instrument(skip(state, session), fields(caller = %session.profile_id))]
pub async fn delete_routine(
    State(state): State<RoutinesAppState>,
    Extension(session): Extension<UserSession>,
    WithRejection(Path(routine_id), _): WithRejection<Path<Uuid>, AppError>,
) -> AppResult<StatusCode> {
    let routine = load_visible_routine(&state, &session, routine_id).await?;
    evaluate(&session, Action::Delete, &routine_target(&routine, true)).require()?;

    if !state.routine_service.delete(routine.id).await? {
        return Err(AppError::not_found("Routine not found"));
    }

    info!("Routine {} deleted by {}", routine.id, session.profile_id);
    Ok(StatusCode::NO_CONTENT)
}

fn routine_target(routine: &Routine, assigned_to_caller: bool) -> Target {
    Target::Routine {
        instructor_id: routine.instructor_id,
        assigned_to_caller,
        is_active: routine.is_active,
    }
}

/// Load a routine the caller may read; anything else reads as missing
async fn load_visible_routine(
    state: &RoutinesAppState,
    session: &UserSession,
    routine_id: Uuid,
) -> AppResult<Routine> {
    let routine = state
        .routine_service
        .get(routine_id)
        .await?
        .ok_or_else(|| AppError::not_found("Routine not found"))?;

    let assigned = !session.is_instructor()
        && state
            .routine_service
            .is_assigned_to_client(routine.id, session.profile_id)
            .await?;

    if !evaluate(session, Action::Read, &routine_target(&routine, assigned)).is_allowed() {
        return Err(AppError::not_found("Routine not found"));
    }

    Ok(routine)
}
