//! End-to-end run-task scenarios.
//!
//! Drives the full service router against a mock platform API and a scripted
//! scanner: signature check, stage dispatch, artifact download, scan, report
//! transformation and callback delivery.

use std::{collections::HashSet, sync::Arc};

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;
use tripwire_api::{AppEnv, Config};
use tripwire_core::Stage;
use tripwire_testing::{
    sample_configuration, sample_plan, ReportBuilder, TaskRequestBuilder, TestEnv,
};

/// Clean configuration: the run passes with no outcomes.
#[tokio::test]
async fn pre_plan_clean_configuration_passes() -> Result<()> {
    let env = TestEnv::builder().report(&ReportBuilder::new())?.build().await?;
    env.mount_configuration(sample_configuration()?).await;
    env.mount_callback(200).await;

    let response = env.run_task(TaskRequestBuilder::pre_plan(&env.platform_url()).to_bytes()).await?;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), "pre plan run task passed");

    let callbacks = env.callbacks().await?;
    assert_eq!(callbacks.len(), 1);
    assert_eq!(callbacks[0]["data"]["attributes"]["status"], "passed");
    assert_eq!(callbacks[0]["data"]["relationships"]["outcomes"]["data"], json!([]));
    Ok(())
}

/// One high-severity finding in the plan: the run fails with one outcome.
#[tokio::test]
async fn post_plan_high_severity_secret_fails() -> Result<()> {
    let report = ReportBuilder::new().finding("high", "plan.json", "api-key credential");
    let env = TestEnv::builder().report(&report)?.build().await?;
    env.mount_plan(&sample_plan()).await;
    env.mount_callback(200).await;

    let response =
        env.run_task(TaskRequestBuilder::post_plan(&env.platform_url()).to_bytes()).await?;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), "post plan run task passed");

    let callbacks = env.callbacks().await?;
    let data = &callbacks[0]["data"];
    assert_eq!(data["attributes"]["status"], "failed");
    assert_eq!(
        data["attributes"]["message"],
        "HashiCorp Vault Radar scan complete, 1 secrets found!"
    );

    let outcomes = data["relationships"]["outcomes"]["data"].as_array().expect("outcomes");
    assert_eq!(outcomes.len(), 1);

    let tags = &outcomes[0]["attributes"]["tags"];
    assert_eq!(tags["severity"], json!([{ "label": "High", "level": "error" }]));
    assert_eq!(tags["status"], json!([{ "label": "active", "level": "error" }]));
    assert_eq!(tags["tags"], json!([{ "label": "api-key" }, { "label": "credential" }]));
    assert_eq!(outcomes[0]["attributes"]["outcome-id"], "vault-radar-8a2f1c0d9e7b");
    assert!(outcomes[0]["attributes"]["body"]
        .as_str()
        .unwrap_or_default()
        .starts_with("AWS access key type secret found in `plan.json` with severity **high**"));
    Ok(())
}

/// A `low` finding is reported but does not fail the run.
#[tokio::test]
async fn low_severity_finding_is_reported_but_passes() -> Result<()> {
    let report = ReportBuilder::new().finding("low", "main.tf", "");
    let env = TestEnv::builder().report(&report)?.build().await?;
    env.mount_configuration(sample_configuration()?).await;
    env.mount_callback(200).await;

    env.run_task(TaskRequestBuilder::pre_plan(&env.platform_url()).to_bytes()).await?;

    let callbacks = env.callbacks().await?;
    let data = &callbacks[0]["data"];
    assert_eq!(data["attributes"]["status"], "passed");
    assert_eq!(data["relationships"]["outcomes"]["data"].as_array().map(Vec::len), Some(1));
    Ok(())
}

/// Production refuses to start without a signing secret; development falls
/// back to the well-known one.
#[test]
fn missing_secret_rejected_in_production() {
    let production = Config { hmac_key: None, ..Config::default() };
    assert!(production.validate().is_err());

    let development = Config { app_env: AppEnv::Development, ..Config::default() };
    assert!(development.validate().is_ok());
    assert!(development.uses_development_secret());
}

/// Concurrent runs of the same stage never share a workspace.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_runs_use_separate_workspaces() -> Result<()> {
    let env = Arc::new(TestEnv::new().await?);
    env.mount_configuration(sample_configuration()?).await;
    env.mount_callback(200).await;

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let env = Arc::clone(&env);
            tokio::spawn(async move {
                let body = TaskRequestBuilder::pre_plan(&env.platform_url())
                    .run_id(&format!("run-concurrent-{i}"))
                    .to_bytes();
                env.run_task(body).await
            })
        })
        .collect();

    for handle in handles {
        let response = handle.await??;
        assert_eq!(response.status, StatusCode::OK);
    }

    // Every scan saw exactly the extracted archive, nothing from a neighbour.
    let seen = env.scanner().seen();
    assert_eq!(seen.matches("./main.tf").count(), 4);
    assert_eq!(seen.lines().count(), 8);

    let targets: HashSet<String> = env
        .scanner()
        .invocations()
        .iter()
        .filter_map(|line| line.split_whitespace().last().map(str::to_string))
        .collect();
    assert_eq!(targets.len(), 4);

    assert_eq!(env.callbacks().await?.len(), 4);
    assert_eq!(env.remaining_workspaces(Stage::PrePlan), 0);
    Ok(())
}
