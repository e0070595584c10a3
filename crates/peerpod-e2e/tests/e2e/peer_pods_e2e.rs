//! Peer-pod scenarios against a live cluster
//!
//! Each test runs in its own random namespace. `test_peer_pods_suite` runs
//! every scenario and prints a summary instead of stopping at the first
//! failure.

#![cfg(feature = "cluster-e2e")]

use tracing::info;

use peerpod_e2e::report::TestHarness;
use peerpod_e2e::suite;
use peerpod_e2e::Outcome;

use super::context::connect;

fn check(name: &str, result: peerpod_e2e::Result<Outcome>) {
    match result {
        Ok(Outcome::Passed) => info!("TEST PASSED: {}", name),
        Ok(Outcome::Skipped(reason)) => info!("TEST SKIPPED: {}: {}", name, reason),
        Err(e) => panic!("{} failed: {}", name, e),
    }
}

#[tokio::test]
#[ignore]
async fn test_create_simple_pod() {
    let ctx = connect().await;
    let ns = ctx.env.random_namespace();
    check(
        "simple pod",
        suite::create_simple_pod(ctx.client.as_ref(), &ctx.assert, &ns).await,
    );
}

#[tokio::test]
#[ignore]
async fn test_create_pod_with_config_map() {
    let ctx = connect().await;
    let ns = ctx.env.random_namespace();
    check(
        "config map",
        suite::create_pod_with_config_map(ctx.client.as_ref(), &ctx.assert, &ns).await,
    );
}

#[tokio::test]
#[ignore]
async fn test_create_pod_with_secret() {
    let ctx = connect().await;
    let ns = ctx.env.random_namespace();
    check(
        "secret",
        suite::create_pod_with_secret(ctx.client.as_ref(), &ctx.assert, &ns).await,
    );
}

#[tokio::test]
#[ignore]
async fn test_create_peer_pod_with_external_ip_access() {
    let ctx = connect().await;
    let ns = ctx.env.random_namespace();
    check(
        "external ip access",
        suite::create_peer_pod_with_external_ip_access(ctx.client.as_ref(), &ctx.assert, &ns)
            .await,
    );
}

#[tokio::test]
#[ignore]
async fn test_create_pod_with_job() {
    let ctx = connect().await;
    let ns = ctx.env.random_namespace();
    check(
        "job",
        suite::create_pod_with_job(ctx.client.as_ref(), &ctx.assert, &ns).await,
    );
}

/// Needs a `registry-service` with endpoints in `TEST_E2E_NAMESPACE_PREFIX`
#[tokio::test]
#[ignore]
async fn test_create_pod_with_user() {
    let ctx = connect().await;
    let ns = ctx.env.namespace_prefix.clone();
    check(
        "user",
        suite::create_pod_with_user_default(ctx.client.as_ref(), &ns).await,
    );
}

#[tokio::test]
#[ignore]
async fn test_peer_pods_suite() {
    let ctx = connect().await;
    let client = ctx.client.as_ref();
    let assert = &ctx.assert;
    let harness = TestHarness::new("peer pods");

    let ns = ctx.env.random_namespace();
    harness
        .run("simple pod", || suite::create_simple_pod(client, assert, &ns))
        .await;
    let ns = ctx.env.random_namespace();
    harness
        .run("config map", || suite::create_pod_with_config_map(client, assert, &ns))
        .await;
    let ns = ctx.env.random_namespace();
    harness
        .run("secret", || suite::create_pod_with_secret(client, assert, &ns))
        .await;
    let ns = ctx.env.random_namespace();
    harness
        .run("external ip access", || {
            suite::create_peer_pod_with_external_ip_access(client, assert, &ns)
        })
        .await;
    let ns = ctx.env.random_namespace();
    harness
        .run("job", || suite::create_pod_with_job(client, assert, &ns))
        .await;

    if let Err(e) = harness.finish() {
        panic!("{}", e);
    }
}
