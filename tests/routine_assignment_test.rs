//! Database-backed scenarios. Each test skips when `TEST_DATABASE_URL` is unreachable.

mod common;

use std::collections::HashSet;

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

use yoga_routines::auth::UserRole;
use yoga_routines::error::AppError;
use yoga_routines::services::AssignmentService;

use common::*;

async fn create_exercise(app: &axum::Router, instructor: &TestUser, name: &str) -> String {
    let (status, body) = post(
        app,
        "/api/routines/exercises/",
        instructor,
        json!({ "name": name, "instructions": "Breathe" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["id"].as_str().unwrap().to_string()
}

async fn create_routine(
    app: &axum::Router,
    instructor: &TestUser,
    name: &str,
    exercise_ids: &[String],
) -> String {
    let (status, body) = post(
        app,
        "/api/routines/routines/",
        instructor,
        json!({ "name": name, "description": "", "exercise_ids": exercise_ids }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["id"].as_str().unwrap().to_string()
}

async fn create_relationship(
    app: &axum::Router,
    instructor: &TestUser,
    client: &TestUser,
) -> String {
    let (status, body) = post(
        app,
        "/api/routines/relationships/",
        instructor,
        json!({ "client_id": client.id() }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["id"].as_str().unwrap().to_string()
}

fn assign_uri(relationship_id: &str) -> String {
    format!("/api/routines/relationships/{}/assign_routine/", relationship_id)
}

fn remove_uri(relationship_id: &str) -> String {
    format!("/api/routines/relationships/{}/remove_routine/", relationship_id)
}

#[tokio::test]
async fn test_sun_salutation_assign_and_remove() {
    let Some(pool) = test_pool().await else { return };
    let app = test_app(pool.clone());

    let instructor = create_user(&pool, UserRole::Instructor).await;
    let client = create_user(&pool, UserRole::Client).await;

    let mountain = create_exercise(&app, &instructor, "Mountain Pose").await;
    let fold = create_exercise(&app, &instructor, "Forward Fold").await;
    let routine_id = create_routine(
        &app,
        &instructor,
        "Sun Salutation",
        &[mountain.clone(), fold.clone(), mountain.clone()],
    )
    .await;

    let routine_uri = format!("/api/routines/routines/{}/", routine_id);
    let (_, routine) = get(&app, &routine_uri, &instructor).await;
    let positions: Vec<(i64, String)> = routine["exercises"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| (e["position"].as_i64().unwrap(), e["id"].as_str().unwrap().to_string()))
        .collect();
    assert_eq!(positions, vec![(0, mountain.clone()), (1, fold), (2, mountain)]);

    let relationship_id = create_relationship(&app, &instructor, &client).await;

    let (status, _) = get(&app, "/api/routines/routines/", &client).await;
    assert_eq!(status, StatusCode::OK);

    let assign = json!({ "routine_id": routine_id });
    let (status, detail) = post(&app, &assign_uri(&relationship_id), &instructor, assign).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids_of(&detail["routines"]), vec![routine_id.clone()]);

    let (_, visible) = get(&app, "/api/routines/routines/", &client).await;
    assert_eq!(ids_of(&visible), vec![routine_id.clone()]);

    let remove = json!({ "routine_id": routine_id });
    let (status, detail) =
        post(&app, &remove_uri(&relationship_id), &instructor, remove.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["routines"], json!([]));

    let (_, visible) = get(&app, "/api/routines/routines/", &client).await;
    assert_eq!(visible, json!([]));

    let (status, body) = post(&app, &remove_uri(&relationship_id), &instructor, remove).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_assign_is_idempotent() {
    let Some(pool) = test_pool().await else { return };
    let app = test_app(pool.clone());

    let instructor = create_user(&pool, UserRole::Instructor).await;
    let client = create_user(&pool, UserRole::Client).await;
    let routine_id = create_routine(&app, &instructor, "Evening Wind Down", &[]).await;
    let relationship_id = create_relationship(&app, &instructor, &client).await;

    let assign = json!({ "routine_id": routine_id });
    for _ in 0..2 {
        let (status, detail) =
            post(&app, &assign_uri(&relationship_id), &instructor, assign.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ids_of(&detail["routines"]), vec![routine_id.clone()]);
    }
}

#[tokio::test]
async fn test_assign_rules() {
    let Some(pool) = test_pool().await else { return };
    let app = test_app(pool.clone());

    let instructor = create_user(&pool, UserRole::Instructor).await;
    let other_instructor = create_user(&pool, UserRole::Instructor).await;
    let client = create_user(&pool, UserRole::Client).await;

    let own_routine = create_routine(&app, &instructor, "Hip Openers", &[]).await;
    let foreign_routine = create_routine(&app, &other_instructor, "Balance Flow", &[]).await;
    let relationship_id = create_relationship(&app, &instructor, &client).await;
    let uri = assign_uri(&relationship_id);

    let (status, body) =
        post(&app, &uri, &instructor, json!({ "routine_id": foreign_routine })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, _) = post(&app, &uri, &instructor, json!({ "routine_id": Uuid::new_v4() })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = post(&app, &uri, &instructor, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field_errors"]["routine_id"], "routine_id is required");

    let (status, _) = post(&app, &uri, &client, json!({ "routine_id": own_routine })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) =
        post(&app, &uri, &other_instructor, json!({ "routine_id": foreign_routine })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_concurrent_assign_and_remove() {
    let Some(pool) = test_pool().await else { return };
    let app = test_app(pool.clone());

    let instructor = create_user(&pool, UserRole::Instructor).await;
    let client = create_user(&pool, UserRole::Client).await;
    let first = create_routine(&app, &instructor, "Morning Flow", &[]).await;
    let second = create_routine(&app, &instructor, "Core Strength", &[]).await;
    let relationship_id = create_relationship(&app, &instructor, &client).await;

    let assign = json!({ "routine_id": first });
    let (status, _) = post(&app, &assign_uri(&relationship_id), &instructor, assign).await;
    assert_eq!(status, StatusCode::OK);

    let assignments = AssignmentService::new(pool.clone());
    let relationship = Uuid::parse_str(&relationship_id).unwrap();
    let first = Uuid::parse_str(&first).unwrap();
    let second = Uuid::parse_str(&second).unwrap();

    let (assigned, removed) = futures::join!(
        assignments.assign_routine(relationship, second, &instructor.session),
        assignments.remove_routine(relationship, first, &instructor.session),
    );
    assert_ok!(assigned);
    assert_ok!(removed);

    let relationship_uri = format!("/api/routines/relationships/{}/", relationship_id);
    let (_, detail) = get(&app, &relationship_uri, &instructor).await;
    assert_eq!(ids_of(&detail["routines"]), vec![second.to_string()]);
}

#[tokio::test]
async fn test_client_sees_only_assigned_active_routines() {
    let Some(pool) = test_pool().await else { return };
    let app = test_app(pool.clone());

    let instructor = create_user(&pool, UserRole::Instructor).await;
    let client = create_user(&pool, UserRole::Client).await;
    let assigned = create_routine(&app, &instructor, "Assigned", &[]).await;
    let unassigned = create_routine(&app, &instructor, "Unassigned", &[]).await;
    let relationship_id = create_relationship(&app, &instructor, &client).await;
    let assign = json!({ "routine_id": assigned });
    post(&app, &assign_uri(&relationship_id), &instructor, assign).await;

    let (_, visible) = get(&app, "/api/routines/routines/", &client).await;
    assert_eq!(ids_of(&visible), vec![assigned.clone()]);

    let (status, _) = get(&app, &format!("/api/routines/routines/{}/", unassigned), &client).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = put(
        &app,
        &format!("/api/routines/routines/{}/", assigned),
        &instructor,
        json!({ "is_active": false }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, visible) = get(&app, "/api/routines/routines/", &client).await;
    assert_eq!(visible, json!([]));
}

#[tokio::test]
async fn test_only_owner_mutates_routine() {
    let Some(pool) = test_pool().await else { return };
    let app = test_app(pool.clone());

    let owner = create_user(&pool, UserRole::Instructor).await;
    let stranger = create_user(&pool, UserRole::Instructor).await;
    let client = create_user(&pool, UserRole::Client).await;
    let routine_id = create_routine(&app, &owner, "Yin Session", &[]).await;
    let relationship_id = create_relationship(&app, &owner, &client).await;
    post(&app, &assign_uri(&relationship_id), &owner, json!({ "routine_id": routine_id })).await;

    let uri = format!("/api/routines/routines/{}/", routine_id);
    let rename = json!({ "name": "Renamed" });

    let (status, _) = put(&app, &uri, &stranger, rename.clone()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = put(&app, &uri, &client, rename.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = delete(&app, &uri, &client).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = put(&app, &uri, &owner, rename).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Renamed");

    let (status, body) = delete(&app, &uri, &owner).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let relationship_uri = format!("/api/routines/relationships/{}/", relationship_id);
    let (_, detail) = get(&app, &relationship_uri, &owner).await;
    assert_eq!(detail["routines"], json!([]));
}

#[tokio::test]
async fn test_routine_rejects_unknown_exercise() {
    let Some(pool) = test_pool().await else { return };
    let app = test_app(pool.clone());

    let instructor = create_user(&pool, UserRole::Instructor).await;
    let client = create_user(&pool, UserRole::Client).await;

    let (status, body) = post(
        &app,
        "/api/routines/routines/",
        &instructor,
        json!({ "name": "Ghost Flow", "exercise_ids": [Uuid::new_v4()] }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["field_errors"]["exercise_ids"].is_string());

    let (status, _) =
        post(&app, "/api/routines/routines/", &client, json!({ "name": "Mine" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_deleting_exercise_drops_it_from_routines() {
    let Some(pool) = test_pool().await else { return };
    let app = test_app(pool.clone());

    let instructor = create_user(&pool, UserRole::Instructor).await;
    let other = create_user(&pool, UserRole::Instructor).await;
    let twist = create_exercise(&app, &instructor, "Seated Twist").await;
    let routine_id = create_routine(&app, &instructor, "Spine Care", &[twist.clone()]).await;

    let exercise_uri = format!("/api/routines/exercises/{}/", twist);
    let (status, _) = delete(&app, &exercise_uri, &other).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = delete(&app, &exercise_uri, &instructor).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let routine_uri = format!("/api/routines/routines/{}/", routine_id);
    let (_, routine) = get(&app, &routine_uri, &instructor).await;
    assert_eq!(routine["exercises"], json!([]));
}

#[tokio::test]
async fn test_relationship_rules() {
    let Some(pool) = test_pool().await else { return };
    let app = test_app(pool.clone());

    let instructor = create_user(&pool, UserRole::Instructor).await;
    let client = create_user(&pool, UserRole::Client).await;
    let second_client = create_user(&pool, UserRole::Client).await;
    let outsider = create_user(&pool, UserRole::Client).await;

    let relationship_id = create_relationship(&app, &instructor, &client).await;
    let uri = format!("/api/routines/relationships/{}/", relationship_id);

    let collection = "/api/routines/relationships/";
    let (status, _) =
        post(&app, collection, &instructor, json!({ "client_id": client.id() })).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) =
        post(&app, collection, &instructor, json!({ "client_id": instructor.id() })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["field_errors"]["client_id"].is_string());

    let (status, _) = post(&app, collection, &client, json!({ "client_id": outsider.id() })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, detail) = get(&app, &uri, &client).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["instructor"]["id"], json!(instructor.id()));

    let (status, _) = get(&app, &uri, &outsider).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = delete(&app, &uri, &client).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let paired_client = create_user(&pool, UserRole::Client).await;
    create_relationship(&app, &instructor, &paired_client).await;
    let (status, body) =
        put(&app, &uri, &instructor, json!({ "client_id": paired_client.id() })).await;
    assert_eq!(status, StatusCode::CONFLICT, "{}", body);

    let (status, body) = put(&app, &uri, &instructor, json!({ "client_id": Uuid::new_v4() })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["field_errors"]["client_id"].is_string());

    let (status, detail) =
        put(&app, &uri, &instructor, json!({ "client_id": second_client.id() })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["client"]["id"], json!(second_client.id()));

    let (status, _) = delete(&app, &uri, &instructor).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = get(&app, "/api/routines/relationships/not-a-uuid/", &instructor).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_profile_visibility_and_roles() {
    let Some(pool) = test_pool().await else { return };
    let app = test_app(pool.clone());

    let instructor = create_user(&pool, UserRole::Instructor).await;
    let client = create_user(&pool, UserRole::Client).await;
    let stranger = create_user(&pool, UserRole::Client).await;
    let relationship_id = create_relationship(&app, &instructor, &client).await;

    let (status, me) = get(&app, "/api/users/profiles/me/", &client).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["role"], "client");

    let (_, listed) = get(&app, "/api/users/profiles/", &client).await;
    let ids: HashSet<String> = ids_of(&listed).into_iter().collect();
    let expected: HashSet<String> = [client.id().to_string(), instructor.id().to_string()]
        .into_iter()
        .collect();
    assert_eq!(ids, expected);

    let (status, _) = get(&app, &format!("/api/users/profiles/{}/", stranger.id()), &client).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let instructor_uri = format!("/api/users/profiles/{}/", instructor.id());
    let (status, _) = put(&app, &instructor_uri, &client, json!({ "full_name": "Nope" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let client_uri = format!("/api/users/profiles/{}/", client.id());
    let (status, body) = put(&app, &client_uri, &client, json!({ "full_name": "Asha" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["full_name"], "Asha");

    for target in [client.id(), instructor.id(), stranger.id()] {
        let uri = format!("/api/users/profiles/{}/update_role/", target);
        let (status, _) = post(&app, &uri, &client, json!({ "role": "instructor" })).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    let role_uri = format!("/api/users/profiles/{}/update_role/", client.id());
    let (status, body) = post(&app, &role_uri, &instructor, json!({ "role": "admin" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["field_errors"]["role"].is_string());

    let promote = json!({ "role": "instructor" });
    let (status, body) = post(&app, &role_uri, &instructor, promote.clone()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let relationship_uri = format!("/api/routines/relationships/{}/", relationship_id);
    let (status, _) = delete(&app, &relationship_uri, &instructor).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = post(&app, &role_uri, &instructor, promote).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "instructor");
}

#[tokio::test]
async fn test_instructor_with_clients_keeps_role() {
    let Some(pool) = test_pool().await else { return };
    let app = test_app(pool.clone());

    let instructor = create_user(&pool, UserRole::Instructor).await;
    let colleague = create_user(&pool, UserRole::Instructor).await;
    let client = create_user(&pool, UserRole::Client).await;
    create_relationship(&app, &instructor, &client).await;

    let role_uri = format!("/api/users/profiles/{}/update_role/", instructor.id());
    let (status, _) = post(&app, &role_uri, &colleague, json!({ "role": "client" })).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, me) = get(&app, "/api/users/profiles/me/", &instructor).await;
    assert_eq!(me["role"], "instructor");

    let role_uri = format!("/api/users/profiles/{}/update_role/", colleague.id());
    let (status, body) = post(&app, &role_uri, &instructor, json!({ "role": "client" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "client");
}

#[tokio::test]
async fn test_retargeting_relationship_clears_assignments() {
    let Some(pool) = test_pool().await else { return };
    let app = test_app(pool.clone());

    let instructor = create_user(&pool, UserRole::Instructor).await;
    let first_client = create_user(&pool, UserRole::Client).await;
    let second_client = create_user(&pool, UserRole::Client).await;
    let routine_id = create_routine(&app, &instructor, "Private Rehab Plan", &[]).await;
    let relationship_id = create_relationship(&app, &instructor, &first_client).await;

    let assign = json!({ "routine_id": routine_id });
    let (status, _) = post(&app, &assign_uri(&relationship_id), &instructor, assign).await;
    assert_eq!(status, StatusCode::OK);

    let (_, visible) = get(&app, "/api/routines/routines/", &first_client).await;
    assert_eq!(ids_of(&visible), vec![routine_id.clone()]);

    let uri = format!("/api/routines/relationships/{}/", relationship_id);
    let (status, detail) =
        put(&app, &uri, &instructor, json!({ "client_id": second_client.id() })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["client"]["id"], json!(second_client.id()));
    assert_eq!(detail["routines"], json!([]));

    let (_, visible) = get(&app, "/api/routines/routines/", &second_client).await;
    assert_eq!(visible, json!([]));

    let routine_uri = format!("/api/routines/routines/{}/", routine_id);
    let (status, _) = get(&app, &routine_uri, &second_client).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, visible) = get(&app, "/api/routines/routines/", &first_client).await;
    assert_eq!(visible, json!([]));

    // Re-sending the current client leaves assignments alone.
    let assign = json!({ "routine_id": routine_id });
    post(&app, &assign_uri(&relationship_id), &instructor, assign).await;
    let (status, detail) =
        put(&app, &uri, &instructor, json!({ "client_id": second_client.id() })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids_of(&detail["routines"]), vec![routine_id]);
}

#[tokio::test]
async fn test_retarget_to_instructor_is_rejected() {
    let Some(pool) = test_pool().await else { return };
    let app = test_app(pool.clone());

    let instructor = create_user(&pool, UserRole::Instructor).await;
    let colleague = create_user(&pool, UserRole::Instructor).await;
    let client = create_user(&pool, UserRole::Client).await;
    let routine_id = create_routine(&app, &instructor, "Shoulder Mobility", &[]).await;
    let relationship_id = create_relationship(&app, &instructor, &client).await;
    let assign = json!({ "routine_id": routine_id });
    post(&app, &assign_uri(&relationship_id), &instructor, assign).await;

    let uri = format!("/api/routines/relationships/{}/", relationship_id);
    let (status, body) = put(&app, &uri, &instructor, json!({ "client_id": colleague.id() })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["field_errors"]["client_id"].is_string());

    let (_, detail) = get(&app, &uri, &instructor).await;
    assert_eq!(detail["client"]["id"], json!(client.id()));
    assert_eq!(ids_of(&detail["routines"]), vec![routine_id]);
}

#[tokio::test]
async fn test_auth_test_echoes_identity() {
    let Some(pool) = test_pool().await else { return };
    let app = test_app(pool.clone());
    let client = create_user(&pool, UserRole::Client).await;

    let (status, body) = get(&app, "/api/auth-test/", &client).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Authenticated!");
    assert_eq!(body["user"]["email"], json!(client.session.email));
    assert_eq!(body["user"]["role"], "client");
}

#[tokio::test]
async fn test_remove_by_client_is_rejected() {
    let Some(pool) = test_pool().await else { return };

    let instructor = create_user(&pool, UserRole::Instructor).await;
    let client = create_user(&pool, UserRole::Client).await;
    let app = test_app(pool.clone());
    let routine_id = create_routine(&app, &instructor, "Restorative", &[]).await;
    let relationship_id = create_relationship(&app, &instructor, &client).await;

    let assignments = AssignmentService::new(pool.clone());
    let relationship = Uuid::parse_str(&relationship_id).unwrap();
    let routine = Uuid::parse_str(&routine_id).unwrap();

    assert_ok!(assignments.assign_routine(relationship, routine, &instructor.session).await);
    let denied = assignments.remove_routine(relationship, routine, &client.session).await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));
    assert_err!(
        assignments
            .remove_routine(relationship, Uuid::new_v4(), &instructor.session)
            .await
    );
}
