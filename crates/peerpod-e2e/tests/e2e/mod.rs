//! Live-cluster suite for peer pods
//!
//! Needs a cluster with the cloud API adaptor deployed and the `kata-remote`
//! runtime class installed (see `cluster-provisioner --action provision`).
//!
//! ```bash
//! KUBECONFIG=/path/to/kubeconfig \
//! cargo test -p peerpod-e2e --features cluster-e2e --test e2e -- --ignored --nocapture
//! ```

mod context;
mod peer_pods_e2e;
