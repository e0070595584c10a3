//! Kubernetes object fixtures for the peer-pod scenarios
//!
//! Pure constructors; nothing here talks to a cluster. Every workload pod
//! carries the [`PEER_POD_RUNTIME_CLASS`] runtime class so it lands in its
//! own PodVM.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec};
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, EnvVar, HostPathVolumeSource, Pod, PodSpec,
    PodTemplateSpec, Secret, SecretVolumeSource, SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use rand::distributions::Alphanumeric;
use rand::Rng;

pub use peerpod_common::PEER_POD_RUNTIME_CLASS;

/// Image used for the long-running busybox pods
pub const BUSYBOX_IMAGE: &str = "quay.io/prometheus/busybox:latest";
/// Image used for the nginx pods
pub const NGINX_IMAGE: &str = "nginx";
/// Kaniko executor used to build the user image in-cluster
pub const KANIKO_IMAGE: &str = "gcr.io/kaniko-project/executor:latest";
/// Port of the in-cluster registry the builder pushes to
pub const REGISTRY_PORT: u16 = 5000;

/// Volume name used for config map bindings
pub const CONFIG_VOLUME: &str = "config-volume";
/// Volume name used for secret bindings
pub const SECRET_VOLUME: &str = "secret-volume";

/// Restart policy `Never`
pub const RESTART_NEVER: &str = "Never";

fn meta(namespace: &str, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

/// Generate `<prefix>-<suffix>` with a random lowercase alphanumeric suffix
///
/// Suitable for namespaces and other DNS-1123 names.
pub fn random_name(prefix: &str, len: usize) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("{}-{}", prefix, suffix)
}

/// Builder for single-container peer pods
#[derive(Clone, Debug)]
pub struct PeerPodBuilder {
    pod: Pod,
}

impl PeerPodBuilder {
    /// Start a pod with one container and the peer-pod runtime class
    pub fn new(namespace: &str, name: &str, container: &str, image: &str) -> Self {
        let pod = Pod {
            metadata: meta(namespace, name),
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: container.to_string(),
                    image: Some(image.to_string()),
                    ..Default::default()
                }],
                runtime_class_name: Some(PEER_POD_RUNTIME_CLASS.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        Self { pod }
    }

    fn spec(&mut self) -> &mut PodSpec {
        self.pod.spec.get_or_insert_with(Default::default)
    }

    fn container(&mut self) -> &mut Container {
        let spec = self.spec();
        if spec.containers.is_empty() {
            spec.containers.push(Container::default());
        }
        &mut spec.containers[0]
    }

    /// Set the pod restart policy
    pub fn restart_policy(mut self, policy: &str) -> Self {
        self.spec().restart_policy = Some(policy.to_string());
        self
    }

    /// Override the container entrypoint
    pub fn command<S: AsRef<str>>(mut self, command: &[S]) -> Self {
        self.container().command = Some(command.iter().map(|s| s.as_ref().to_string()).collect());
        self
    }

    /// Mount a config map at `mount_path`
    pub fn config_map_binding(self, mount_path: &str, config_map: &str) -> Self {
        self.mount(
            CONFIG_VOLUME,
            mount_path,
            Volume {
                name: CONFIG_VOLUME.to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: config_map.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
    }

    /// Mount a secret at `mount_path`
    pub fn secret_binding(self, mount_path: &str, secret: &str) -> Self {
        self.mount(
            SECRET_VOLUME,
            mount_path,
            Volume {
                name: SECRET_VOLUME.to_string(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(secret.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
    }

    fn mount(mut self, volume_name: &str, mount_path: &str, volume: Volume) -> Self {
        self.container()
            .volume_mounts
            .get_or_insert_with(Vec::new)
            .push(VolumeMount {
                name: volume_name.to_string(),
                mount_path: mount_path.to_string(),
                ..Default::default()
            });
        self.spec().volumes.get_or_insert_with(Vec::new).push(volume);
        self
    }

    /// Finish the pod
    pub fn build(self) -> Pod {
        self.pod
    }
}

/// nginx pod that never restarts
pub fn new_nginx_pod(namespace: &str) -> Pod {
    PeerPodBuilder::new(namespace, "nginx", "nginx", NGINX_IMAGE)
        .restart_policy(RESTART_NEVER)
        .build()
}

/// busybox pod that sleeps for an hour so commands can be exec'd into it
pub fn new_busybox_pod(namespace: &str) -> Pod {
    PeerPodBuilder::new(namespace, "busybox-pod", "busybox", BUSYBOX_IMAGE)
        .command(&["/bin/sh", "-c", "sleep 3600"])
        .build()
}

/// nginx pod with `config_map` mounted at `/etc/config`
pub fn new_nginx_pod_with_config_map(namespace: &str, config_map: &str) -> Pod {
    PeerPodBuilder::new(namespace, "nginx-configmap-pod", "nginx-configmap", NGINX_IMAGE)
        .restart_policy(RESTART_NEVER)
        .config_map_binding("/etc/config", config_map)
        .build()
}

/// nginx pod with `secret` mounted at `/etc/secret`
pub fn new_nginx_pod_with_secret(namespace: &str, secret: &str) -> Pod {
    PeerPodBuilder::new(namespace, "nginx-secret-pod", "nginx-secret", NGINX_IMAGE)
        .restart_policy(RESTART_NEVER)
        .secret_binding("/etc/secret", secret)
        .build()
}

/// Config map with string data
pub fn new_config_map(namespace: &str, name: &str, data: BTreeMap<String, String>) -> ConfigMap {
    ConfigMap {
        metadata: meta(namespace, name),
        data: Some(data),
        ..Default::default()
    }
}

/// Opaque secret with raw byte data
pub fn new_secret(namespace: &str, name: &str, data: BTreeMap<String, Vec<u8>>) -> Secret {
    Secret {
        metadata: meta(namespace, name),
        data: Some(
            data.into_iter()
                .map(|(k, v)| (k, ByteString(v)))
                .collect(),
        ),
        ..Default::default()
    }
}

/// Batch job that computes pi with `bc` inside a peer pod
///
/// Backoff limit 8: PodVM start-up can fail transiently, and the job case
/// tolerates a retry that eventually completes.
pub fn new_job(namespace: &str, name: &str) -> Job {
    Job {
        metadata: meta(namespace, name),
        spec: Some(JobSpec {
            backoff_limit: Some(8),
            template: PodTemplateSpec {
                metadata: None,
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: name.to_string(),
                        image: Some(BUSYBOX_IMAGE.to_string()),
                        command: Some(vec![
                            "/bin/sh".to_string(),
                            "-c".to_string(),
                            "echo 'scale=5; 4*a(1)' | bc -l".to_string(),
                        ]),
                        ..Default::default()
                    }],
                    restart_policy: Some(RESTART_NEVER.to_string()),
                    runtime_class_name: Some(PEER_POD_RUNTIME_CLASS.to_string()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Registry reference the builder pushes the user image to
pub fn user_image_ref(registry_ip: &str) -> String {
    format!("{}:{}/user-image:latest", registry_ip, REGISTRY_PORT)
}

/// Kaniko pod that builds the Dockerfile in `config_map` and pushes it to the registry
///
/// Runs with the default runtime class: only the resulting image is run as a
/// peer pod.
pub fn new_builder_pod(namespace: &str, name: &str, config_map: &str, registry_ip: &str) -> Pod {
    let mount_path = format!("/{}", config_map);
    Pod {
        metadata: meta(namespace, name),
        spec: Some(PodSpec {
            containers: vec![Container {
                name: name.to_string(),
                image: Some(KANIKO_IMAGE.to_string()),
                args: Some(vec![
                    "--custom-platform=linux/amd64".to_string(),
                    format!("--dockerfile={}/Dockerfile", mount_path),
                    format!("--context=dir://{}", mount_path),
                    format!("--destination={}", user_image_ref(registry_ip)),
                ]),
                volume_mounts: Some(vec![VolumeMount {
                    name: config_map.to_string(),
                    mount_path,
                    ..Default::default()
                }]),
                env: Some(vec![
                    EnvVar {
                        name: "DOCKER_CONFIG".to_string(),
                        value: Some("/kaniko/.docker/".to_string()),
                        ..Default::default()
                    },
                    EnvVar {
                        name: "DOCKER_CONTENT_TRUST".to_string(),
                        value: Some("1".to_string()),
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            }],
            volumes: Some(vec![Volume {
                name: config_map.to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: config_map.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            restart_policy: Some(RESTART_NEVER.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Peer pod running the image the builder pushed
pub fn new_user_pod(namespace: &str, name: &str, container: &str, registry_ip: &str) -> Pod {
    let mut pod = PeerPodBuilder::new(namespace, name, container, &user_image_ref(registry_ip))
        .restart_policy(RESTART_NEVER)
        .build();
    if let Some(spec) = pod.spec.as_mut() {
        spec.dns_policy = Some("ClusterFirst".to_string());
    }
    pod
}

/// Privileged daemon set that writes `content` to `<mount_path>/<folder>/<file>`
/// on every node's root filesystem, then idles
///
/// Used to drop a containerd `hosts.toml` so nodes trust the plain-HTTP
/// in-cluster registry.
pub fn new_daemon_set(
    namespace: &str,
    name: &str,
    mount_path: &str,
    folder: &str,
    file: &str,
    content: &str,
) -> DaemonSet {
    let labels = BTreeMap::from([("app".to_string(), name.to_string())]);
    let script = format!(
        "rm -rf {mp}/172* && mkdir -p {mp}/{folder} && echo '{content}' > {mp}/{folder}/{file} && sleep 3600",
        mp = mount_path,
        folder = folder,
        content = content,
        file = file,
    );

    DaemonSet {
        metadata: meta(namespace, name),
        spec: Some(DaemonSetSpec {
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    name: Some(name.to_string()),
                    namespace: Some(namespace.to_string()),
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: name.to_string(),
                        image: Some("busybox".to_string()),
                        command: Some(vec!["/bin/sh".to_string(), "-c".to_string(), script]),
                        security_context: Some(SecurityContext {
                            privileged: Some(true),
                            ..Default::default()
                        }),
                        volume_mounts: Some(vec![VolumeMount {
                            name: "host-root".to_string(),
                            mount_path: "/host".to_string(),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    volumes: Some(vec![Volume {
                        name: "host-root".to_string(),
                        host_path: Some(HostPathVolumeSource {
                            path: "/".to_string(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_container(pod: &Pod) -> &Container {
        &pod.spec.as_ref().unwrap().containers[0]
    }

    #[test]
    fn peer_pods_use_kata_remote() {
        for pod in [
            new_nginx_pod("ns"),
            new_busybox_pod("ns"),
            new_nginx_pod_with_config_map("ns", "cm"),
            new_nginx_pod_with_secret("ns", "s"),
            new_user_pod("ns", "user-pod-1", "user-pod-1", "10.0.0.7"),
        ] {
            assert_eq!(
                pod.spec.as_ref().unwrap().runtime_class_name.as_deref(),
                Some("kata-remote")
            );
            assert_eq!(pod.metadata.namespace.as_deref(), Some("ns"));
        }
    }

    #[test]
    fn config_map_binding_mounts_volume() {
        let pod = new_nginx_pod_with_config_map("ns", "nginx-config");
        let spec = pod.spec.as_ref().unwrap();
        let mounts = first_container(&pod).volume_mounts.as_ref().unwrap();
        assert_eq!(mounts[0].name, CONFIG_VOLUME);
        assert_eq!(mounts[0].mount_path, "/etc/config");

        let volume = &spec.volumes.as_ref().unwrap()[0];
        assert_eq!(volume.name, CONFIG_VOLUME);
        assert_eq!(volume.config_map.as_ref().unwrap().name, "nginx-config");
        assert_eq!(spec.restart_policy.as_deref(), Some("Never"));
    }

    #[test]
    fn secret_binding_mounts_volume() {
        let pod = new_nginx_pod_with_secret("ns", "nginx-secret");
        let spec = pod.spec.as_ref().unwrap();
        let volume = &spec.volumes.as_ref().unwrap()[0];
        assert_eq!(volume.name, SECRET_VOLUME);
        assert_eq!(
            volume.secret.as_ref().unwrap().secret_name.as_deref(),
            Some("nginx-secret")
        );
        let mounts = first_container(&pod).volume_mounts.as_ref().unwrap();
        assert_eq!(mounts[0].mount_path, "/etc/secret");
    }

    #[test]
    fn busybox_pod_sleeps() {
        let pod = new_busybox_pod("ns");
        assert_eq!(
            first_container(&pod).command.as_deref(),
            Some(&["/bin/sh".to_string(), "-c".to_string(), "sleep 3600".to_string()][..])
        );
        assert!(pod.spec.as_ref().unwrap().restart_policy.is_none());
    }

    #[test]
    fn secret_data_is_wrapped_in_byte_strings() {
        let secret = new_secret(
            "ns",
            "nginx-secret",
            BTreeMap::from([("username".to_string(), b"admin".to_vec())]),
        );
        let data = secret.data.unwrap();
        assert_eq!(data["username"].0, b"admin".to_vec());
    }

    #[test]
    fn job_runs_in_peer_pod_and_never_restarts() {
        let job = new_job("ns", "job-pi");
        let spec = job.spec.unwrap();
        assert_eq!(spec.backoff_limit, Some(8));
        let pod_spec = spec.template.spec.unwrap();
        assert_eq!(pod_spec.restart_policy.as_deref(), Some("Never"));
        assert_eq!(pod_spec.runtime_class_name.as_deref(), Some("kata-remote"));
        assert_eq!(pod_spec.containers[0].name, "job-pi");
    }

    #[test]
    fn builder_pushes_to_registry() {
        let pod = new_builder_pod("ns", "builder-pod", "build-context", "10.0.0.7");
        let args = first_container(&pod).args.clone().unwrap();
        assert!(args.contains(&"--destination=10.0.0.7:5000/user-image:latest".to_string()));
        assert!(args.contains(&"--dockerfile=/build-context/Dockerfile".to_string()));
        assert!(pod.spec.as_ref().unwrap().runtime_class_name.is_none());
    }

    #[test]
    fn daemon_set_writes_hosts_file() {
        let ds = new_daemon_set(
            "ns",
            "node-debugger",
            "host/etc/containerd/certs.d",
            "10.0.0.7:5000",
            "hosts.toml",
            "server = \"http://10.0.0.7:5000\"",
        );
        let spec = ds.spec.unwrap();
        let container = &spec.template.spec.as_ref().unwrap().containers[0];
        let script = &container.command.as_ref().unwrap()[2];
        assert!(script.contains("mkdir -p host/etc/containerd/certs.d/10.0.0.7:5000"));
        assert!(script.ends_with("sleep 3600"));
        assert_eq!(
            container.security_context.as_ref().unwrap().privileged,
            Some(true)
        );
        assert_eq!(
            spec.selector.match_labels.unwrap().get("app").map(String::as_str),
            Some("node-debugger")
        );
    }

    #[test]
    fn random_names_are_dns_safe() {
        let name = random_name("default", 7);
        assert!(name.starts_with("default-"));
        assert_eq!(name.len(), "default-".len() + 7);
        assert!(name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
    }
}
