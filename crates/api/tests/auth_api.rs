//! Signup and login.
//!
//! The `#[sqlx::test]` cases need a live Postgres: run them with
//! `DATABASE_URL` set and `-- --ignored`.

mod common;

use atelier_pipeline::testing::FakeEngine;
use axum::http::StatusCode;
use common::{body_json, build_test_app, build_test_app_with_pool, get_auth, post_json};
use serde_json::json;
use sqlx::PgPool;

async fn signup(pool: &PgPool, email: &str, password: &str) -> serde_json::Value {
    let test = build_test_app_with_pool(pool.clone(), FakeEngine::new());
    let response = post_json(
        test.app,
        "/api/v1/auth/signup",
        json!({ "email": email, "password": password, "display_name": "Tester" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

// ---------------------------------------------------------------------------
// Validation (no database needed)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn short_password_is_rejected_before_touching_the_database() {
    let test = build_test_app(FakeEngine::new());

    let response = post_json(
        test.app,
        "/api/v1/auth/signup",
        json!({ "email": "a@b.com", "password": "short" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "password must be at least 8 characters long");
}

#[tokio::test]
async fn malformed_email_is_rejected() {
    let test = build_test_app(FakeEngine::new());

    let response = post_json(
        test.app,
        "/api/v1/auth/signup",
        json!({ "email": "not-an-email", "password": "long-enough" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "email must be a valid address");
}

// ---------------------------------------------------------------------------
// Database-backed flows
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore]
async fn test_signup_returns_token_for_new_user(pool: PgPool) {
    let json = signup(&pool, "New@Example.com", "correct-horse").await;

    assert!(json["data"]["access_token"].is_string());
    assert_eq!(json["data"]["expires_in"], 3600);
    assert_eq!(json["data"]["user"]["email"], "new@example.com");
    assert_eq!(json["data"]["user"]["role"], "user");
    assert!(json["data"]["user"].get("password_hash").is_none());

    let token = json["data"]["access_token"].as_str().unwrap();
    let test = build_test_app_with_pool(pool, FakeEngine::new());
    let response = get_auth(test.app, "/api/v1/profile", token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let profile = body_json(response).await;
    assert_eq!(profile["data"]["display_name"], "Tester");
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore]
async fn test_duplicate_signup_conflicts(pool: PgPool) {
    signup(&pool, "dup@example.com", "correct-horse").await;

    let test = build_test_app_with_pool(pool, FakeEngine::new());
    let response = post_json(
        test.app,
        "/api/v1/auth/signup",
        json!({ "email": "DUP@example.com", "password": "another-one" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore]
async fn test_login_checks_the_password(pool: PgPool) {
    signup(&pool, "login@example.com", "correct-horse").await;
    let test = build_test_app_with_pool(pool, FakeEngine::new());

    let response = post_json(
        test.app.clone(),
        "/api/v1/auth/login",
        json!({ "email": "login@example.com", "password": "wrong-horse" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Invalid email or password");

    let response = post_json(
        test.app,
        "/api/v1/auth/login",
        json!({ "email": "login@example.com", "password": "correct-horse" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["data"]["access_token"].is_string());
}
