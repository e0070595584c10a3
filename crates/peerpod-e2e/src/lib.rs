//! End-to-end harness for peer pods
//!
//! Peer pods are Kubernetes pods whose containers run inside a dedicated VM
//! (the PodVM) provisioned by a cloud adaptor, selected through the
//! `kata-remote` runtime class. This crate builds the workloads, runs them
//! through create, wait, assert and delete phases against a live cluster,
//! and reports the outcome of each scenario.
//!
//! - [`fixtures`]: Kubernetes object builders
//! - [`case`]: the [`TestCase`] runner
//! - [`suite`]: the peer-pod scenarios
//! - [`client`]/[`kube_client`]: the cluster seam and its kube-rs implementation
//! - [`assert`]: PodVM assertions
//! - [`report`]: run-all-and-report summary

pub mod assert;
pub mod case;
pub mod client;
pub mod command;
pub mod env;
pub mod error;
pub mod fixtures;
pub mod job;
pub mod kube_client;
pub mod report;
pub mod suite;

pub use case::{HarnessConfig, Outcome, TestCase, Workload};
pub use error::{HarnessError, Result};
