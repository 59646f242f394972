//! Provisioning of per-customer S4 storage grids.
//!
//! A signup for a subscription flows through the following stages:
//!
//! - the [`subscription_manager`] reserves ports and node key material,
//! - the [`resources`] module synthesizes the ConfigMap, Deployment and
//!   Service for the subscription,
//! - the [`orchestration`] layer applies them to the cluster, and
//! - a [`signup`] channel delivers the introducer furl to the customer.
//!
//! The [`rewrite`] module contains the bulk manifest edits used during
//! release rollout.
//!
//! ## Crate Features
//!
//! - `clap` enables [`config::DeploymentOptions`] to be used as CLI arguments.

pub mod config;
pub mod furl;
pub mod kvp;
pub mod marshal;
pub mod model;
pub mod naming;
pub mod orchestration;
pub mod resources;
pub mod rewrite;
pub mod signup;
pub mod subscription_manager;

// External re-exports
pub use k8s_openapi;
pub use kube;
pub use s4_transform as transform;
