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

use crate::auth::policy::{evaluate, Action, Resource, Target};
use crate::auth::{jwt_auth_middleware, AuthService, UserSession};
use crate::error::{AppError, AppResult};
use crate::models::{CreateExerciseRequest, Exercise, ListQuery, UpdateExerciseRequest};
use crate::services::ExerciseService;

#[derive(Clone)]
pub struct ExercisesAppState {
    pub exercise_service: ExerciseService,
}

pub fn exercise_routes(db: PgPool, auth_service: AuthService) -> Router {
    let state = ExercisesAppState {
        exercise_service: ExerciseService::new(db),
    };

    Router::new()
        .route("/api/routines/exercises/", get(list_exercises).post(create_exercise))
        .route(
            "/api/routines/exercises/:id/",
            get(get_exercise).put(update_exercise).delete(delete_exercise),
        )
        .route_layer(middleware::from_fn_with_state(auth_service, jwt_auth_middleware))
        .with_state(state)
}

pub async fn list_exercises(
    State(state): State<ExercisesAppState>,
    WithRejection(Query(page), _): WithRejection<Query<ListQuery>, AppError>,
) -> AppResult<Json<Vec<Exercise>>> {
    let exercises = state.exercise_service.list(page).await?;
    Ok(Json(exercises))
}

pub async fn get_exercise(
    State(state): State<ExercisesAppState>,
    WithRejection(Path(exercise_id), _): WithRejection<Path<Uuid>, AppError>,
) -> AppResult<Json<Exercise>> {
    let exercise = state
        .exercise_service
        .get(exercise_id)
        .await?
        .ok_or_else(|| AppError::not_found("Exercise not found"))?;
    Ok(Json(exercise))
}

#[tracing::instrument(skip(state, session, request), fields(caller = %session.profile_id))]
pub async fn create_exercise(
    State(state): State<ExercisesAppState>,
    Extension(session): Extension<UserSession>,
    WithRejection(Json(request), _): WithRejection<Json<CreateExerciseRequest>, AppError>,
) -> AppResult<(StatusCode, Json<Exercise>)> {
    evaluate(&session, Action::Create, &Target::Collection(Resource::Exercise)).require()?;

    let exercise = state.exercise_service.create(session.profile_id, request).await?;
    Ok((StatusCode::CREATED, Json(exercise)))
}

#[tracing::instrument(skip(state, session, request), fields(caller = %session.profile_id))]
pub async fn update_exercise(
    State(state): State<ExercisesAppState>,
    Extension(session): Extension<UserSession>,
    WithRejection(Path(exercise_id), _): WithRejection<Path<Uuid>, AppError>,
    WithRejection(Json(request), _): WithRejection<Json<UpdateExerciseRequest>, AppError>,
) -> AppResult<Json<Exercise>> {
    let exercise = authorize(&state, &session, exercise_id, Action::Update).await?;
    let updated = state.exercise_service.update(exercise.id, request).await?;
    Ok(Json(updated))
}

#[tracing::instrument(skip(state, session), fields(caller = %session.profile_id))]
pub async fn delete_exercise(
    State(state): State<ExercisesAppState>,
    Extension(session): Extension<UserSession>,
    WithRejection(Path(exercise_id), _): WithRejection<Path<Uuid>, AppError>,
) -> AppResult<StatusCode> {
    let exercise = authorize(&state, &session, exercise_id, Action::Delete).await?;

    if !state.exercise_service.delete(exercise.id).await? {
        return Err(AppError::not_found("Exercise not found"));
    }

    info!("Exercise {} deleted by {}", exercise.id, session.profile_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn authorize(
    state: &ExercisesAppState,
    session: &UserSession,
    exercise_id: Uuid,
    action: Action,
) -> AppResult<Exercise> {
    let exercise = state
        .exercise_service
        .get(exercise_id)
        .await?
        .ok_or_else(|| AppError::not_found("Exercise not found"))?;

    let target = Target::Exercise { created_by: exercise.created_by };
    evaluate(session, action, &target).require()?;

    Ok(exercise)
}
