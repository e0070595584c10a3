//! cluster-provisioner
//!
//! ```bash
//! export CLOUD_PROVIDER=kind
//! export TEST_E2E_PROVISION_FILE=/root/provision_kind.properties
//! export TEST_E2E_PODVM_IMAGE=/root/podvm.qcow2
//! cluster-provisioner -action=provision | deprovision | uploadimage
//! ```

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use peerpod_common::telemetry::{init_logging, LogConfig};
use peerpod_provisioner::{normalize_args, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_from(normalize_args(std::env::args()));

    let log_config = LogConfig {
        json: cli.log_json,
        ..LogConfig::default()
    };
    if let Err(e) = init_logging(log_config) {
        eprintln!("failed to initialize logging: {}", e);
    }

    match cli.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(1)
        }
    }
}
