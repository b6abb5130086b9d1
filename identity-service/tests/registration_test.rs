mod common;

use axum::http::{Method, StatusCode};
use common::{TestApp, PASSWORD, USERNAME};
use serde_json::json;

fn signup(username: &str, password: &str, confirmation: &str) -> serde_json::Value {
    json!({
        "username": username,
        "password": password,
        "password_confirmation": confirmation,
    })
}

#[tokio::test]
async fn test_registration_creates_user_and_signs_in() {
    let app = TestApp::new();

    let (status, body) = app
        .post_tenant(&app.tenant, "/registration", signup(" bob ", "s3cret", "s3cret"))
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["issued_token_type"], "password");
    assert_eq!(body["scope"], json!(["openid"]));
    assert!(body["refresh_token"].is_string());
    assert!(body["id_token"].is_string());

    let (status, user) = app
        .with_bearer(Method::GET, "/user", body["access_token"].as_str().unwrap(), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["name"], "bob");

    let (status, _) = app
        .post_tenant(
            &app.tenant,
            "/token",
            json!({"grant_type": "password", "username": "bob", "password": "s3cret"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_registration_rejects_taken_username() {
    let app = TestApp::new();

    let (status, body) = app
        .post_tenant(&app.tenant, "/registration", signup(USERNAME, "other", "other"))
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "username already taken");
    assert_eq!(app.password_grant("").await.0, StatusCode::OK);
}

#[tokio::test]
async fn test_registration_rejects_mismatched_passwords() {
    let app = TestApp::new();

    let (status, body) = app
        .post_tenant(&app.tenant, "/registration", signup("bob", "s3cret", "s3cre7"))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "password confirmation does not match");
}

#[tokio::test]
async fn test_registration_requires_username() {
    let app = TestApp::new();

    let (status, body) = app
        .post_tenant(&app.tenant, "/registration", signup("   ", PASSWORD, PASSWORD))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "username is required");
}

#[tokio::test]
async fn test_registration_forbidden_without_password_signup() {
    let app = TestApp::new();
    let mut application = app.application.clone();
    application.id = app.store.next_id();
    application.signup_password_enabled = false;
    app.store.insert_application(application.clone());
    let mut tenant = app.tenant.clone();
    tenant.id = app.store.next_id();
    tenant.client_id = uuid::Uuid::new_v4();
    tenant.application_id = application.id;
    app.store.insert_tenant(tenant.clone());

    let (status, _) = app
        .post_tenant(&tenant, "/registration", signup("bob", "s3cret", "s3cret"))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_registration_requires_tenant() {
    let app = TestApp::new();

    let (status, body) = app
        .request(
            Method::POST,
            "/registration",
            &[],
            Some(signup("bob", "s3cret", "s3cret")),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Tenent-Id header missing or invalid");
}
