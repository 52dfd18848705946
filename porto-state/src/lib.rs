//! porto-state: container operations and desired-state reconciliation
//! for the Porto container supervisor.
//!
//! The [`clients`] layer exposes the supervisor's primitives (one socket
//! round trip each); the [`reconciler`] layer converges a named container
//! to a desired configuration on top of them. Container lifecycle itself
//! belongs to the supervisor daemon.

pub mod clients;
pub mod error;
pub mod manifest;
pub mod proto;
pub mod reconciler;
pub mod test_util;
pub mod wire;

pub use clients::{ClientConfig, ContainerState, PortoClient, Properties, Supervisor};
pub use error::SupervisorError;
pub use reconciler::{ContainerReconciler, DesiredContainer, ReconcileResult, Reconciler};
