//! Health check endpoint tests.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use tripwire_testing::TestEnv;

#[tokio::test]
async fn health_check_reports_healthy() {
    let env = TestEnv::new().await.expect("failed to create test environment");

    let request = Request::builder().method("GET").uri("/health").body(Body::empty()).unwrap();
    let response = env.send(request).await.expect("failed to make request");

    assert_eq!(response.status, StatusCode::OK);
    insta::assert_json_snapshot!(response.json().unwrap(), @r#"
    {
      "status": "healthy"
    }
    "#);
}

#[tokio::test]
async fn responses_carry_request_id() {
    let env = TestEnv::new().await.expect("failed to create test environment");

    let request = Request::builder().method("GET").uri("/health").body(Body::empty()).unwrap();
    let response = env.send(request).await.unwrap();

    let request_id = response.headers.get("x-request-id").expect("request id header");
    assert_eq!(request_id.to_str().unwrap().len(), 36);
}

#[tokio::test]
async fn health_check_touches_nothing_external() {
    let env = TestEnv::new().await.unwrap();

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    env.send(request).await.unwrap();

    assert_eq!(env.platform_request_count().await, 0);
    assert!(env.scanner().invocations().is_empty());
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let env = TestEnv::new().await.unwrap();

    let request = Request::builder().uri("/ingest").body(Body::empty()).unwrap();
    let response = env.send(request).await.unwrap();

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}
