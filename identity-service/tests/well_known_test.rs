mod common;

use axum::http::{Method, StatusCode};
use common::{TestApp, ISSUER};
use identity_service::services::{Settings, SettingsService};
use serde_json::json;

#[tokio::test]
async fn test_openid_configuration() {
    let app = TestApp::new();

    let (status, body) = app
        .get_tenant(&app.tenant, "/.well-known/openid-configuration")
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["issuer"], ISSUER);
    assert_eq!(body["jwks_uri"], format!("{}/.well-known/jwks.json", ISSUER));
    assert_eq!(body["token_endpoint"], format!("{}/token", ISSUER));
    assert_eq!(body["userinfo_endpoint"], format!("{}/userinfo", ISSUER));
    assert_eq!(body["registration_endpoint"], format!("{}/registration", ISSUER));
    assert_eq!(body["grant_types_supported"], json!(["refresh_token", "password"]));
    assert_eq!(body["subject_types_supported"], json!(["user", "service-account"]));
    assert_eq!(body["id_token_signing_alg_values_supported"], json!(["HS256"]));
    assert_eq!(body["code_challenge_methods_supported"], json!(["plain", "S256"]));
    assert!(body["claims_supported"]
        .as_array()
        .unwrap()
        .contains(&json!("email_verified")));
}

#[tokio::test]
async fn test_openid_configuration_without_signup() {
    let app = TestApp::new();
    let mut application = app.application.clone();
    application.id = app.store.next_id();
    application.signup_enabled = false;
    app.store.insert_application(application.clone());
    let mut tenant = app.rsa_tenant.clone();
    tenant.id = app.store.next_id();
    tenant.client_id = uuid::Uuid::new_v4();
    tenant.application_id = application.id;
    app.store.insert_tenant(tenant.clone());

    let (status, body) = app
        .get_tenant(&tenant, "/.well-known/openid-configuration")
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.get("registration_endpoint").is_none());
    assert_eq!(body["grant_types_supported"], json!(["refresh_token"]));
    assert_eq!(body["id_token_signing_alg_values_supported"], json!(["RS256"]));
}

#[tokio::test]
async fn test_issuer_follows_settings() {
    let app = TestApp::new();
    app.settings.apply_notification(
        r#"{"table": "configs", "key": "url", "value": "https://login.example.test/", "action_type": "update"}"#,
    );

    let (_, body) = app
        .get_tenant(&app.tenant, "/.well-known/openid-configuration")
        .await;
    assert_eq!(body["issuer"], "https://login.example.test");

    let (_, token) = app.password_grant("").await;
    let claims: identity_service::services::Claims = identity_service::services::jwt::validate(
        token["access_token"].as_str().unwrap(),
        &app.tenant,
    )
    .unwrap();
    assert_eq!(claims.iss, "https://login.example.test");
}

#[tokio::test]
async fn test_jwks_for_rsa_tenant() {
    let app = TestApp::new();

    let client_id = app.rsa_tenant.client_id.to_string();
    let (status, body) = app
        .request(
            Method::GET,
            "/.well-known/jwks.json",
            &[("Tenent-Id", client_id.as_str())],
            None,
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let keys = body["keys"].as_array().unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0]["kty"], "RSA");
    assert_eq!(keys[0]["use"], "sig");
    assert_eq!(keys[0]["alg"], "RS256");
    assert_eq!(keys[0]["kid"], client_id);
    assert_eq!(keys[0]["e"], "AQAB");
}

#[tokio::test]
async fn test_jwks_for_hmac_tenant_is_empty() {
    let app = TestApp::new();

    let (status, body) = app.get_tenant(&app.tenant, "/.well-known/jwks.json").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"keys": []}));
}

#[tokio::test]
async fn test_openapi_document_follows_setting() {
    let app = TestApp::new();

    let (status, body) = app
        .request(Method::GET, "/.well-known/openapi.json", &[], None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"].get("/token").is_some());
    assert!(body["paths"].get("/registration").is_some());

    app.settings.apply_notification(
        r#"{"table": "configs", "key": "openapi.enabled", "value": false, "action_type": "update"}"#,
    );
    let (status, _) = app
        .request(Method::GET, "/.well-known/openapi.json", &[], None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();

    let (status, body) = app.request(Method::GET, "/health", &[], None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "identity-service");
}

#[test]
fn test_fixed_settings_default_to_openapi_enabled() {
    let settings = SettingsService::fixed(Settings::new(ISSUER));
    assert!(settings.current().openapi_enabled);
}
