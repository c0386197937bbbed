//! Performance benchmarks for the request hot path.
//!
//! Covers the CPU-bound work done per run: verifying the request signature
//! and turning a scanner report into a task result and its callback body.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tripwire_api::crypto::{generate_hmac_hex, validate_signature};
use tripwire_core::ReportTransformer;
use tripwire_testing::{ReportBuilder, TaskRequestBuilder};

/// Builds a report with `rows` findings cycling through severities.
fn report_with_rows(rows: usize) -> String {
    let severities = ["low", "medium", "high", "critical", "info"];
    let report = (0..rows).fold(ReportBuilder::new(), |report, i| {
        report.finding(severities[i % severities.len()], &format!("modules/m{i}/main.tf"), "aws prod")
    });
    report.build().unwrap()
}

/// Benchmarks CSV report transformation.
fn bench_report_transformation(c: &mut Criterion) {
    let mut group = c.benchmark_group("report");
    let transformer = ReportTransformer::default();

    for rows in [0, 10, 100, 1000] {
        let csv = report_with_rows(rows);
        group.throughput(Throughput::Bytes(csv.len() as u64));

        group.bench_with_input(BenchmarkId::new("transform", rows), &csv, |b, csv| {
            b.iter(|| {
                let result = transformer.transform_reader(black_box(csv.as_bytes())).unwrap();
                black_box(result);
            });
        });

        let result = transformer.transform_reader(csv.as_bytes()).unwrap();
        group.bench_with_input(BenchmarkId::new("encode_callback", rows), &result, |b, result| {
            b.iter(|| {
                let body = serde_json::to_vec(&black_box(result).to_payload()).unwrap();
                black_box(body);
            });
        });
    }

    group.finish();
}

/// Benchmarks HMAC-SHA512 signature verification.
fn bench_signature_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("signatures");
    let secret = "run-task-hmac-secret-for-benchmarks";

    for padding in [0, 1_000, 100_000] {
        let body = TaskRequestBuilder::pre_plan("https://app.terraform.io")
            .set("run_message", "x".repeat(padding))
            .to_bytes();
        let signature = generate_hmac_hex(&body, secret).unwrap();

        group.throughput(Throughput::Bytes(body.len() as u64));
        group.bench_with_input(BenchmarkId::new("verify_hmac_sha512", body.len()), &body, |b, body| {
            b.iter(|| {
                let result = validate_signature(black_box(body), black_box(&signature), secret);
                black_box(result);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_report_transformation, bench_signature_validation);
criterion_main!(benches);
