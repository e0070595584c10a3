//! Kubernetes client helpers shared by the harness and the provisioner

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DeleteParams, ObjectMeta, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::{debug, info, trace};

use crate::Error;

/// Default interval between readiness polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
///
/// Log streams and exec sessions ride on the same client, so this is more
/// generous than a plain API call needs.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Whether a kube error is an API 404
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 404)
}

/// Whether a kube error is an API 409 AlreadyExists
pub fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 409)
}

/// Poll until a condition is met or timeout is reached
///
/// `check_fn` returns `Ok(true)` when done and `Ok(false)` to keep polling.
/// Errors from `check_fn` are treated as "not yet" since API hiccups are
/// expected while objects come up.
pub async fn poll_until<F, Fut>(
    timeout: Duration,
    poll_interval: Duration,
    what: impl Into<String>,
    mut check_fn: F,
) -> Result<(), Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, Error>>,
{
    let start = tokio::time::Instant::now();
    let what = what.into();

    loop {
        match check_fn().await {
            Ok(true) => return Ok(()),
            Ok(false) => trace!("Still waiting for {}", what),
            Err(e) => trace!("Polling {} returned error (retrying): {}", what, e),
        }

        if start.elapsed() >= timeout {
            return Err(Error::timeout(what, timeout));
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// Create a kube client from optional kubeconfig path with default timeouts
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    create_client_with_timeout(kubeconfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT).await
}

/// Create a kube client from optional kubeconfig path with custom timeouts
///
/// Without a path the config is inferred (`KUBECONFIG`, `~/.kube/config`,
/// then in-cluster).
pub async fn create_client_with_timeout(
    kubeconfig: Option<&Path>,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::internal_with_context(
                    "create_client",
                    format!("failed to read kubeconfig {}: {}", path.display(), e),
                )
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::internal_with_context(
                        "create_client",
                        format!("failed to load kubeconfig: {}", e),
                    )
                })?
        }
        None => Config::infer().await.map_err(|e| {
            Error::internal_with_context("create_client", format!("failed to infer config: {}", e))
        })?,
    };

    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);
    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {}", e))
    })
}

/// Make sure a namespace exists
///
/// Returns `true` when this call created it, so callers can clean up only
/// what they own.
pub async fn ensure_namespace(client: &Client, name: &str) -> Result<bool, Error> {
    let api: Api<Namespace> = Api::all(client.clone());
    if api.get_opt(name).await?.is_some() {
        debug!(namespace = %name, "Namespace already exists");
        return Ok(false);
    }

    let ns = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    match api.create(&PostParams::default(), &ns).await {
        Ok(_) => {
            info!(namespace = %name, "Created namespace");
            Ok(true)
        }
        // Lost a race with another writer; it exists now and isn't ours
        Err(e) if is_already_exists(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Delete a namespace, treating "already gone" as success
pub async fn delete_namespace(client: &Client, name: &str) -> Result<(), Error> {
    let api: Api<Namespace> = Api::all(client.clone());
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(e) if is_not_found(&e) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Whether every scheduled daemon set pod is ready and up to date
pub fn daemon_set_is_ready(ds: &DaemonSet) -> bool {
    let Some(status) = ds.status.as_ref() else {
        return false;
    };
    let generation_seen = match (ds.metadata.generation, status.observed_generation) {
        (Some(generation), Some(observed)) => observed >= generation,
        (None, _) => true,
        (Some(_), None) => false,
    };
    generation_seen
        && status.desired_number_scheduled > 0
        && status.number_ready == status.desired_number_scheduled
        && status.updated_number_scheduled.unwrap_or(0) == status.desired_number_scheduled
}

/// Wait for a daemon set to roll out on every eligible node
pub async fn wait_for_daemon_set_ready(
    client: &Client,
    name: &str,
    namespace: &str,
    timeout: Duration,
) -> Result<(), Error> {
    let api: Api<DaemonSet> = Api::namespaced(client.clone(), namespace);
    let name_owned = name.to_string();

    poll_until(
        timeout,
        DEFAULT_POLL_INTERVAL,
        format!("daemonset {}/{} to be ready", namespace, name),
        || {
            let api = api.clone();
            let name = name_owned.clone();
            async move {
                match api.get_opt(&name).await? {
                    Some(ds) => Ok(daemon_set_is_ready(&ds)),
                    None => Ok(false),
                }
            }
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use k8s_openapi::api::apps::v1::DaemonSetStatus;

    fn daemon_set(generation: i64, observed: i64, desired: i32, ready: i32) -> DaemonSet {
        DaemonSet {
            metadata: ObjectMeta {
                name: Some("cloud-api-adaptor-daemonset".to_string()),
                generation: Some(generation),
                ..Default::default()
            },
            status: Some(DaemonSetStatus {
                observed_generation: Some(observed),
                desired_number_scheduled: desired,
                number_ready: ready,
                updated_number_scheduled: Some(desired),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn daemon_set_ready_when_all_pods_ready() {
        assert!(daemon_set_is_ready(&daemon_set(2, 2, 3, 3)));
    }

    #[test]
    fn daemon_set_not_ready_while_rolling() {
        assert!(!daemon_set_is_ready(&daemon_set(2, 2, 3, 2)));
        assert!(!daemon_set_is_ready(&daemon_set(3, 2, 3, 3)));
    }

    #[test]
    fn daemon_set_with_no_nodes_is_not_ready() {
        assert!(!daemon_set_is_ready(&daemon_set(1, 1, 0, 0)));
        assert!(!daemon_set_is_ready(&DaemonSet::default()));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_until_returns_once_condition_holds() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        poll_until(
            Duration::from_secs(60),
            Duration::from_secs(1),
            "third attempt",
            move || {
                let counter = counter.clone();
                async move { Ok(counter.fetch_add(1, Ordering::SeqCst) >= 2) }
            },
        )
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_until_times_out() {
        let err = poll_until(
            Duration::from_secs(5),
            Duration::from_secs(1),
            "never",
            || async { Ok(false) },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Timeout { timeout_secs: 5, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_until_keeps_going_through_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        poll_until(
            Duration::from_secs(60),
            Duration::from_secs(1),
            "flaky",
            move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(Error::internal_with_context("test", "transient"))
                    } else {
                        Ok(true)
                    }
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
