//! Run-task request flow through the router.
//!
//! Each test drives `POST /` against a mock platform and a scripted scanner
//! and checks the response, the callback the platform received and the
//! scratch directory left behind.

use std::time::Duration;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;
use tripwire_core::Stage;
use tripwire_testing::{
    sample_configuration, sample_plan, ReportBuilder, ScannerBehavior, TaskRequestBuilder,
    TestEnv,
};

#[tokio::test]
async fn registration_probe_is_acknowledged_without_work() -> Result<()> {
    let env = TestEnv::new().await?;

    let response = env.run_task(TaskRequestBuilder::probe().to_bytes()).await?;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.is_empty());
    assert_eq!(env.platform_request_count().await, 0);
    assert!(env.scanner().invocations().is_empty());
    Ok(())
}

#[tokio::test]
async fn probe_with_placeholder_stage_is_acknowledged() -> Result<()> {
    let env = TestEnv::new().await?;
    let body = TaskRequestBuilder::probe().set("stage", "pre_apply").without("run_id").to_bytes();

    let response = env.run_task(body).await?;

    assert_eq!(response.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn clean_pre_plan_run_passes() -> Result<()> {
    let env = TestEnv::new().await?;
    env.mount_configuration(sample_configuration()?).await;
    env.mount_callback(200).await;

    let response = env.run_task(TaskRequestBuilder::pre_plan(&env.platform_url()).to_bytes()).await?;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), "pre plan run task passed");

    let invocations = env.scanner().invocations();
    assert_eq!(invocations.len(), 1);
    assert!(invocations[0].starts_with("scan folder --outfile "));
    assert_eq!(env.scanner().seen(), "./main.tf\n./modules/vpc/variables.tf\n");

    let callbacks = env.callbacks().await?;
    assert_eq!(callbacks.len(), 1);
    insta::assert_json_snapshot!(callbacks[0], @r#"
    {
      "data": {
        "attributes": {
          "message": "HashiCorp Vault Radar scan complete, no secrets found!",
          "status": "passed",
          "url": "https://vault-radar-portal.cloud.hashicorp.com"
        },
        "relationships": {
          "outcomes": {
            "data": []
          }
        },
        "type": "task-results"
      }
    }
    "#);

    assert_eq!(env.remaining_workspaces(Stage::PrePlan), 0);
    Ok(())
}

#[tokio::test]
async fn post_plan_findings_fail_the_run() -> Result<()> {
    let report = ReportBuilder::new()
        .finding("high", "plan.json", "aws production")
        .finding("low", "plan.json", "");
    let env = TestEnv::builder().report(&report)?.build().await?;
    env.mount_plan(&sample_plan()).await;
    env.mount_callback(200).await;

    let response =
        env.run_task(TaskRequestBuilder::post_plan(&env.platform_url()).to_bytes()).await?;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), "post plan run task passed");

    let invocations = env.scanner().invocations();
    assert!(invocations[0].starts_with("scan file --outfile "));
    assert!(invocations[0].ends_with("plan.json"));
    assert_eq!(env.scanner().seen(), serde_json::to_string_pretty(&sample_plan())?);

    let callbacks = env.callbacks().await?;
    let attributes = &callbacks[0]["data"]["attributes"];
    assert_eq!(attributes["status"], "failed");
    assert_eq!(attributes["message"], "HashiCorp Vault Radar scan complete, 2 secrets found!");

    let outcomes = callbacks[0]["data"]["relationships"]["outcomes"]["data"]
        .as_array()
        .expect("outcomes array");
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0]["type"], "task-result-outcomes");

    assert_eq!(env.remaining_workspaces(Stage::PostPlan), 0);
    Ok(())
}

#[tokio::test]
async fn unsupported_stage_rejected() -> Result<()> {
    let env = TestEnv::new().await?;
    let body = TaskRequestBuilder::pre_plan(&env.platform_url()).set("stage", "post_apply");

    let response = env.run_task(body.to_bytes()).await?;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json()?["error"]["code"], "E1004");
    assert_eq!(env.platform_request_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn missing_download_url_rejected() -> Result<()> {
    let env = TestEnv::new().await?;
    let body =
        TaskRequestBuilder::pre_plan(&env.platform_url()).without("configuration_version_download_url");

    let response = env.run_task(body.to_bytes()).await?;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json()?["error"]["code"], "E1003");
    Ok(())
}

#[tokio::test]
async fn malformed_json_rejected() -> Result<()> {
    let env = TestEnv::new().await?;

    let response = env.run_task(r#"{"stage": "pre_plan""#).await?;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json()?["error"]["code"], "E1003");
    Ok(())
}

#[tokio::test]
async fn oversized_body_rejected() -> Result<()> {
    let env = TestEnv::builder().max_payload_bytes(512).build().await?;
    let body = TaskRequestBuilder::probe().set("run_message", "x".repeat(2048)).to_bytes();

    let response = env.run_task(body).await?;

    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.json()?["error"]["code"], "E1002");
    Ok(())
}

#[tokio::test]
async fn missing_artifact_reports_fetch_failure() -> Result<()> {
    let env = TestEnv::new().await?;
    env.mount_callback(200).await;

    let response = env.run_task(TaskRequestBuilder::pre_plan(&env.platform_url()).to_bytes()).await?;

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert_eq!(response.json()?["error"]["code"], "E2001");
    assert!(env.scanner().invocations().is_empty());

    let callbacks = env.callbacks().await?;
    assert_eq!(callbacks.len(), 1);
    assert_eq!(callbacks[0]["data"]["attributes"]["status"], "failed");
    assert_eq!(env.remaining_workspaces(Stage::PrePlan), 0);
    Ok(())
}

#[tokio::test]
async fn scanner_failure_reports_failed_result() -> Result<()> {
    let env = TestEnv::builder()
        .scanner(ScannerBehavior::Fail { code: 2, stderr: "missing HCP_PROJECT_ID".into() })
        .build()
        .await?;
    env.mount_plan(&sample_plan()).await;
    env.mount_callback(200).await;

    let response =
        env.run_task(TaskRequestBuilder::post_plan(&env.platform_url()).to_bytes()).await?;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    let error = response.json()?;
    assert_eq!(error["error"]["code"], "E2002");
    assert!(error["error"]["message"].as_str().unwrap_or_default().contains("HCP_PROJECT_ID"));

    let callbacks = env.callbacks().await?;
    let attributes = &callbacks[0]["data"]["attributes"];
    assert_eq!(attributes["status"], "failed");
    assert!(attributes["message"].as_str().unwrap_or_default().starts_with("HashiCorp Vault Radar scan failed"));
    assert_eq!(env.remaining_workspaces(Stage::PostPlan), 0);
    Ok(())
}

#[tokio::test]
async fn scanner_without_report_is_a_failure() -> Result<()> {
    let env = TestEnv::builder().scanner(ScannerBehavior::NoReport).build().await?;
    env.mount_plan(&sample_plan()).await;
    env.mount_callback(200).await;

    let response =
        env.run_task(TaskRequestBuilder::post_plan(&env.platform_url()).to_bytes()).await?;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json()?["error"]["code"], "E2002");
    Ok(())
}

#[tokio::test]
async fn hung_scanner_times_out() -> Result<()> {
    let env = TestEnv::builder()
        .scanner(ScannerBehavior::Hang)
        .scanner_timeout(Duration::from_secs(1))
        .build()
        .await?;
    env.mount_configuration(sample_configuration()?).await;
    env.mount_callback(200).await;

    let response = env.run_task(TaskRequestBuilder::pre_plan(&env.platform_url()).to_bytes()).await?;

    assert_eq!(response.status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(response.json()?["error"]["code"], "E2003");
    assert_eq!(env.callbacks().await?.len(), 1);
    assert_eq!(env.remaining_workspaces(Stage::PrePlan), 0);
    Ok(())
}

#[tokio::test]
async fn callback_failure_does_not_change_response() -> Result<()> {
    let env = TestEnv::builder().callback_max_attempts(2).build().await?;
    env.mount_configuration(sample_configuration()?).await;
    env.mount_callback(503).await;

    let response = env.run_task(TaskRequestBuilder::pre_plan(&env.platform_url()).to_bytes()).await?;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), "pre plan run task passed");
    assert_eq!(env.callbacks().await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn callback_rejection_is_not_retried() -> Result<()> {
    let env = TestEnv::new().await?;
    env.mount_configuration(sample_configuration()?).await;
    env.mount_callback(404).await;

    let response = env.run_task(TaskRequestBuilder::pre_plan(&env.platform_url()).to_bytes()).await?;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(env.callbacks().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn workspace_extras_are_ignored() -> Result<()> {
    let env = TestEnv::new().await?;
    env.mount_configuration(sample_configuration()?).await;
    env.mount_callback(200).await;
    let body = TaskRequestBuilder::pre_plan(&env.platform_url())
        .set("workspace_name", json!(null))
        .set("unexpected_field", json!({ "nested": [1, 2, 3] }));

    let response = env.run_task(body.to_bytes()).await?;

    assert_eq!(response.status, StatusCode::OK);
    Ok(())
}
