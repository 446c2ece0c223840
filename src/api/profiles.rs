use axum::{
    extract::{Path, Query, State},
    middleware,
    response::Json,
    routing::{get, post},
    Extension, Router,
};
use axum_extra::extract::WithRejection;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::policy::{evaluate, filter_predicate, Action, Resource, Target};
use crate::auth::{jwt_auth_middleware, AuthService, UserSession};
use crate::error::{AppError, AppResult};
use crate::models::{ListQuery, UpdateProfileRequest, UpdateRoleRequest, UserProfile};
use crate::services::ProfileService;

#[derive(Clone)]
pub struct ProfilesAppState {
    pub profile_service: ProfileService,
}

pub fn profile_routes(db: PgPool, auth_service: AuthService) -> Router {
    let state = ProfilesAppState {
        profile_service: ProfileService::new(db),
    };

    Router::new()
        .route("/api/users/profiles/", get(list_profiles))
        .route("/api/users/profiles/me/", get(get_my_profile))
        .route("/api/users/profiles/:id/", get(get_profile).put(update_profile))
        .route("/api/users/profiles/:id/update_role/", post(update_role))
        .route_layer(middleware::from_fn_with_state(auth_service, jwt_auth_middleware))
        .with_state(state)
}

/// Profiles visible to the caller: self plus relationship counterparts
pub async fn list_profiles(
    State(state): State<ProfilesAppState>,
    Extension(session): Extension<UserSession>,
    WithRejection(Query(page), _): WithRejection<Query<ListQuery>, AppError>,
) -> AppResult<Json<Vec<UserProfile>>> {
    let filter = filter_predicate(&session, Resource::UserProfile);
    let profiles = state.profile_service.list(filter, page).await?;
    Ok(Json(profiles))
}

pub async fn get_profile(
    State(state): State<ProfilesAppState>,
    Extension(session): Extension<UserSession>,
    WithRejection(Path(profile_id), _): WithRejection<Path<Uuid>, AppError>,
) -> AppResult<Json<UserProfile>> {
    let profile = load_visible_profile(&state, &session, profile_id).await?;
    Ok(Json(profile))
}

pub async fn get_my_profile(
    State(state): State<ProfilesAppState>,
    Extension(session): Extension<UserSession>,
) -> AppResult<Json<UserProfile>> {
    let profile = state
        .profile_service
        .get_by_id(session.profile_id)
        .await?
        .ok_or_else(|| AppError::not_found("Profile not found"))?;
    Ok(Json(profile))
}

#[tracing::instrument(skip(state, session, request), fields(caller = %session.profile_id))]
pub async fn update_profile(
    State(state): State<ProfilesAppState>,
    Extension(session): Extension<UserSession>,
    WithRejection(Path(profile_id), _): WithRejection<Path<Uuid>, AppError>,
    WithRejection(Json(request), _): WithRejection<Json<UpdateProfileRequest>, AppError>,
) -> AppResult<Json<UserProfile>> {
    let profile = load_visible_profile(&state, &session, profile_id).await?;

    let target = Target::Profile { id: profile.id, linked: true };
    evaluate(&session, Action::Update, &target).require()?;

    let updated = state.profile_service.update(profile.id, request).await?;
    Ok(Json(updated))
}

/// Change a profile's role. Only instructors may do this, whatever the target.
#[tracing::instrument(skip(state, session, request), fields(caller = %session.profile_id))]
pub async fn update_role(
    State(state): State<ProfilesAppState>,
    Extension(session): Extension<UserSession>,
    WithRejection(Path(profile_id), _): WithRejection<Path<Uuid>, AppError>,
    WithRejection(Json(request), _): WithRejection<Json<UpdateRoleRequest>, AppError>,
) -> AppResult<Json<UserProfile>> {
    let target = Target::Profile { id: profile_id, linked: false };
    evaluate(&session, Action::UpdateRole, &target).require()?;

    let profile = load_visible_profile(&state, &session, profile_id).await?;
    let role = request.parse_role()?;

    let updated = state.profile_service.update_role(profile.id, role).await?;
    Ok(Json(updated))
}

async fn load_visible_profile(
    state: &ProfilesAppState,
    session: &UserSession,
    profile_id: Uuid,
) -> AppResult<UserProfile> {
    let profile = state
        .profile_service
        .get_by_id(profile_id)
        .await?
        .ok_or_else(|| AppError::not_found("Profile not found"))?;

    let linked = profile.id != session.profile_id
        && state.profile_service.is_counterpart(session, profile.id).await?;

    let target = Target::Profile { id: profile.id, linked };
    if !evaluate(session, Action::Read, &target).is_allowed() {
        return Err(AppError::not_found("Profile not found"));
    }

    Ok(profile)
}
