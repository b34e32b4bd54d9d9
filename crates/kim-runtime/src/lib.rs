//! Runtime reconciliation for the Kyma infrastructure manager
//!
//! A Runtime on the KCP describes a Kyma runtime cluster. [`reconcile`]
//! provisions the matching Gardener Shoot, requests its kubeconfig through a
//! GardenerCluster, configures the new cluster and tears everything down
//! again when the Runtime is deleted.

pub mod auth_config;
pub mod bootstrapper;
pub mod config;
pub mod controller;
pub mod crb;
pub mod garden;
pub mod kcp;
pub mod metrics;
pub mod provisioning_info;
pub mod registry_cache;
pub mod skr;

mod fsm;

#[cfg(test)]
mod test_fixtures;

pub use config::FsmConfig;
pub use controller::{error_policy, reconcile, Context};
