//! Shared setup for the live suite
#![cfg(feature = "cluster-e2e")]

use std::sync::{Arc, Once};

use peerpod_common::telemetry::{init_logging, LogConfig};
use peerpod_e2e::assert::RuntimeClassAssert;
use peerpod_e2e::client::ClusterClient;
use peerpod_e2e::env::E2eEnv;
use peerpod_e2e::kube_client::KubeClusterClient;

static LOGGING: Once = Once::new();

pub fn init_e2e_test() {
    LOGGING.call_once(|| {
        let _ = init_logging(LogConfig::default());
    });
}

pub struct E2eContext {
    pub env: E2eEnv,
    pub client: Arc<dyn ClusterClient>,
    pub assert: RuntimeClassAssert,
}

pub async fn connect() -> E2eContext {
    init_e2e_test();
    let env = E2eEnv::from_env();
    let client: Arc<dyn ClusterClient> = Arc::new(
        KubeClusterClient::connect(env.kubeconfig.as_deref())
            .await
            .expect("failed to connect to the cluster under test"),
    );
    let assert = RuntimeClassAssert::new(client.clone());
    E2eContext {
        env,
        client,
        assert,
    }
}
