//! Peer-pod scenarios
//!
//! Each scenario builds its fixtures in `namespace` and runs them through the
//! [`TestCase`] runner, except [`create_pod_with_user`] which drives a
//! multi-object flow of its own.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::info;

use crate::assert::CloudAssert;
use crate::case::{settle, Deletions, Outcome, TestCase, WAIT_POD_RUNNING_TIMEOUT};
use crate::client::ClusterClient;
use crate::command::TestCommand;
use crate::fixtures::{
    new_builder_pod, new_busybox_pod, new_config_map, new_daemon_set, new_job, new_nginx_pod,
    new_nginx_pod_with_config_map, new_nginx_pod_with_secret, new_secret, new_user_pod,
    random_name, REGISTRY_PORT,
};
use crate::{HarnessError, Result};

/// Service fronting the in-cluster registry the user image is pushed to
pub const REGISTRY_SERVICE: &str = "registry-service";
/// Expected output of the user image
pub const EXPECTED_USER: &str = "otheruser";

const USER_DOCKERFILE: &str = "FROM --platform=\"linux/amd64\" alpine:latest AS user-image\n\
RUN addgroup -S othergroup && adduser -S otheruser -G othergroup\n\
USER otheruser\n\
ENTRYPOINT [ \"/bin/sh\", \"-c\", \"whoami\" ]";

const CONTAINERD_CERTS_DIR: &str = "host/etc/containerd/certs.d";
const CONTAINERD_HOSTS_FILE: &str = "hosts.toml";

/// A peer pod comes up with a PodVM behind it
pub async fn create_simple_pod(
    client: &dyn ClusterClient,
    assert: &dyn CloudAssert,
    namespace: &str,
) -> Result<Outcome> {
    TestCase::new("PodVM is created", new_nginx_pod(namespace))
        .run(client, assert)
        .await
}

/// Config map data is visible inside the peer pod
pub async fn create_pod_with_config_map(
    client: &dyn ClusterClient,
    assert: &dyn CloudAssert,
    namespace: &str,
) -> Result<Outcome> {
    let config_map_name = "nginx-config";
    let file_name = "example.txt";
    let contents = "Hello, world";

    let pod = new_nginx_pod_with_config_map(namespace, config_map_name);
    let config_map = new_config_map(
        namespace,
        config_map_name,
        BTreeMap::from([(file_name.to_string(), contents.to_string())]),
    );
    let path = format!("/etc/config/{}", file_name);
    let commands = vec![TestCommand::stdout_equals(
        first_container(&pod)?,
        &["cat", path.as_str()],
        "Data inside configmap",
        contents,
    )];

    TestCase::new("Configmap is created and contains data", pod)
        .with_config_map(config_map)
        .with_test_commands(commands)
        .run(client, assert)
        .await
}

/// Secret data is visible inside the peer pod
pub async fn create_pod_with_secret(
    client: &dyn ClusterClient,
    assert: &dyn CloudAssert,
    namespace: &str,
) -> Result<Outcome> {
    let secret_name = "nginx-secret";
    let (username, password) = ("admin", "password");

    let pod = new_nginx_pod_with_secret(namespace, secret_name);
    let secret = new_secret(
        namespace,
        secret_name,
        BTreeMap::from([
            ("username".to_string(), username.as_bytes().to_vec()),
            ("password".to_string(), password.as_bytes().to_vec()),
        ]),
    );
    let container = first_container(&pod)?;
    let commands = vec![
        TestCommand::stdout_equals(
            container.clone(),
            &["cat", "/etc/secret/username"],
            "Username from secret",
            username,
        ),
        TestCommand::stdout_equals(
            container,
            &["cat", "/etc/secret/password"],
            "Password from secret",
            password,
        ),
    ];

    TestCase::new("Secret has been created and contains data", pod)
        .with_secret(secret)
        .with_test_commands(commands)
        .run(client, assert)
        .await
}

/// A container in a peer pod can reach the internet
pub async fn create_peer_pod_with_external_ip_access(
    client: &dyn ClusterClient,
    assert: &dyn CloudAssert,
    namespace: &str,
) -> Result<Outcome> {
    let pod = new_busybox_pod(namespace);
    let commands = vec![TestCommand::stdout_not_empty(
        first_container(&pod)?,
        &["ping", "-c", "1", "www.google.com"],
        "ping command in busybox",
    )];

    TestCase::new("Peer Pod Container Connected to External IP", pod)
        .with_test_commands(commands)
        .run(client, assert)
        .await
}

/// A batch job runs to completion in a peer pod
pub async fn create_pod_with_job(
    client: &dyn ClusterClient,
    assert: &dyn CloudAssert,
    namespace: &str,
) -> Result<Outcome> {
    TestCase::new_job("Job has been created", new_job(namespace, "job-pi"), "3.14")
        .run(client, assert)
        .await
}

fn first_container(pod: &k8s_openapi::api::core::v1::Pod) -> Result<String> {
    pod.spec
        .as_ref()
        .and_then(|s| s.containers.first())
        .map(|c| c.name.clone())
        .ok_or_else(|| HarnessError::internal("first_container", "pod has no containers"))
}

/// containerd `hosts.toml` letting nodes pull from the plain-HTTP registry
pub fn registry_hosts_toml(registry_ip: &str) -> String {
    format!(
        "server = \"http://{ip}:{port}\"\n[host.\"http://{ip}:{port}\"]\n\tskip_verify = true\n",
        ip = registry_ip,
        port = REGISTRY_PORT
    )
}

#[derive(Default)]
struct UserPodObjects {
    namespace: bool,
    config_map: bool,
    daemon_set: bool,
    builder_pod: bool,
    user_pod: bool,
}

const BUILDER_POD: &str = "builder-pod";
const BUILD_CONTEXT: &str = "build-context";
const NODE_DEBUGGER: &str = "node-debugger";

/// An image built in-cluster with a non-root `USER` runs as that user in a
/// peer pod
///
/// Builds the image with kaniko from a config map build context, pushes it
/// to the registry behind [`REGISTRY_SERVICE`], points every node's
/// containerd at that registry through a daemon set, then runs the image and
/// checks its `whoami` output.
pub async fn create_pod_with_user(
    client: &dyn ClusterClient,
    namespace: &str,
    timeout: Duration,
) -> Result<Outcome> {
    let user_pod = random_name("user-pod", 3);

    info!(pod = %user_pod, "Setup");
    let mut created = UserPodObjects::default();
    let result = run_user_pod(client, namespace, &user_pod, timeout, &mut created).await;

    info!(pod = %user_pod, "Teardown");
    let mut deletions = Deletions::default();
    if created.user_pod {
        deletions.record(client.delete_pod(namespace, &user_pod).await, "pod", &user_pod);
    }
    if created.builder_pod {
        deletions.record(client.delete_pod(namespace, BUILDER_POD).await, "pod", BUILDER_POD);
    }
    if created.config_map {
        deletions.record(
            client.delete_config_map(namespace, BUILD_CONTEXT).await,
            "Configmap",
            BUILD_CONTEXT,
        );
    }
    if created.daemon_set {
        deletions.record(
            client.delete_daemon_set(namespace, NODE_DEBUGGER).await,
            "daemonset",
            NODE_DEBUGGER,
        );
    }
    if created.namespace {
        deletions.record(client.delete_namespace(namespace).await, "namespace", namespace);
    }

    settle("User Peer Pod", result, deletions.finish())
}

async fn run_user_pod(
    client: &dyn ClusterClient,
    namespace: &str,
    user_pod: &str,
    timeout: Duration,
    created: &mut UserPodObjects,
) -> Result<Outcome> {
    created.namespace = client.ensure_namespace(namespace).await?;

    client
        .create_config_map(&new_config_map(
            namespace,
            BUILD_CONTEXT,
            BTreeMap::from([("Dockerfile".to_string(), USER_DOCKERFILE.to_string())]),
        ))
        .await?;
    created.config_map = true;

    let registry_ip = client
        .endpoint_addresses(namespace, REGISTRY_SERVICE)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| {
            HarnessError::Setup(format!("service {} has no endpoints", REGISTRY_SERVICE))
        })?;
    info!(registry = %registry_ip, "Using in-cluster registry");

    client
        .create_daemon_set(&new_daemon_set(
            namespace,
            NODE_DEBUGGER,
            CONTAINERD_CERTS_DIR,
            &format!("{}:{}", registry_ip, REGISTRY_PORT),
            CONTAINERD_HOSTS_FILE,
            &registry_hosts_toml(&registry_ip),
        ))
        .await?;
    created.daemon_set = true;

    client
        .create_pod(&new_builder_pod(namespace, BUILDER_POD, BUILD_CONTEXT, &registry_ip))
        .await?;
    created.builder_pod = true;

    client
        .create_pod(&new_user_pod(namespace, user_pod, user_pod, &registry_ip))
        .await?;
    created.user_pod = true;

    client
        .wait_for_pod_phase(namespace, user_pod, "Succeeded", timeout)
        .await?;

    info!(pod = %user_pod, "Assess: Peer Pod Contains User");
    let logs = client.pod_logs(namespace, user_pod).await?;
    let user = logs.trim();
    if user != EXPECTED_USER {
        return Err(HarnessError::LogMismatch {
            pod: user_pod.to_string(),
            expected: EXPECTED_USER.to_string(),
            actual: user.to_string(),
        });
    }
    info!("Current User: {}", user);
    Ok(Outcome::Passed)
}

/// [`create_pod_with_user`] with the default pod timeout
pub async fn create_pod_with_user_default(
    client: &dyn ClusterClient,
    namespace: &str,
) -> Result<Outcome> {
    create_pod_with_user(client, namespace, WAIT_POD_RUNNING_TIMEOUT).await
}
