mod common;

use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use bytes::Bytes;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use b2b_api::auth::{generate_jwt, Claims};

fn router() -> Router {
    let (state, _) = common::test_state(common::test_config());
    b2b_api::app(state)
}

async fn json_body(response: axum::response::Response) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).expect("request")
}

#[tokio::test]
async fn root_lists_endpoint_groups() -> Result<()> {
    let response = router().oneshot(get("/")).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await?;
    assert_eq!(body["success"], true);
    assert!(body["data"]["endpoints"]["store"].is_string());
    Ok(())
}

#[tokio::test]
async fn protected_route_without_token_is_unauthorized() -> Result<()> {
    let response = router().oneshot(get("/api/products")).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = json_body(response).await?;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNAUTHORIZED");
    Ok(())
}

#[tokio::test]
async fn malformed_bearer_token_is_unauthorized() -> Result<()> {
    let request = Request::builder()
        .uri("/api/inquiries")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())?;
    let response = router().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn token_signed_with_other_secret_is_unauthorized() -> Result<()> {
    let claims = Claims::new(Uuid::new_v4(), Uuid::new_v4(), "rep@acme.example.com", 1);
    let token = generate_jwt(&claims, "some-other-secret")?;
    let request = Request::builder()
        .uri("/api/auth/whoami")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())?;
    let response = router().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn missing_jwt_secret_disables_protected_routes() -> Result<()> {
    let mut config = common::test_config();
    config.security.jwt_secret = String::new();
    let (state, _) = common::test_state(config);

    let request = Request::builder()
        .uri("/api/inquiries")
        .header(header::AUTHORIZATION, "Bearer anything")
        .body(Body::empty())?;
    let response = b2b_api::app(state).oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}

#[tokio::test]
async fn elevated_routes_sit_behind_authentication() -> Result<()> {
    let response = router().oneshot(get("/api/root/sites")).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn valid_token_with_database_down_is_unavailable() -> Result<()> {
    let config = common::test_config();
    let claims = Claims::new(Uuid::new_v4(), Uuid::new_v4(), "rep@acme.example.com", 1);
    let token = generate_jwt(&claims, &config.security.jwt_secret)?;
    let (state, _) = common::test_state(config);

    let request = Request::builder()
        .uri("/api/auth/whoami")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())?;
    let response = b2b_api::app(state).oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}

#[tokio::test]
async fn store_request_without_host_is_rejected() -> Result<()> {
    let response = router().oneshot(get("/store/products")).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await?;
    assert_eq!(body["code"], "BAD_REQUEST");
    Ok(())
}

#[tokio::test]
async fn media_outside_site_prefix_is_not_found() -> Result<()> {
    let response = router().oneshot(get("/media/etc/passwd")).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router().oneshot(get("/media/sites/../secret.png")).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn media_serves_stored_objects() -> Result<()> {
    let (state, storage) = common::test_state(common::test_config());
    let key = format!("sites/{}/images/logo.png", Uuid::new_v4());
    storage
        .upload(&key, Bytes::from_static(b"\x89PNG fake"), "image/png")
        .await?;

    let response = b2b_api::app(state).oneshot(get(&format!("/media/{}", key))).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");

    let body = to_bytes(response.into_body(), usize::MAX).await?;
    assert_eq!(&body[..], b"\x89PNG fake");
    Ok(())
}

#[tokio::test]
async fn missing_media_object_is_not_found() -> Result<()> {
    let key = format!("/media/sites/{}/images/missing.png", Uuid::new_v4());
    let response = router().oneshot(get(&key)).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn cors_preflight_allows_configured_origin() -> Result<()> {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/inquiries")
        .header(header::ORIGIN, "http://localhost:5173")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .body(Body::empty())?;
    let response = router().oneshot(request).await?;
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:5173"
    );
    Ok(())
}
