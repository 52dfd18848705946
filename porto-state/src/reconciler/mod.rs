//! Reconcilers for containers.
//!
//! A reconciler compares the desired configuration with the actual state
//! read from the supervisor and issues the primitive calls to converge.

pub mod container;
pub mod plan;

use async_trait::async_trait;
use serde::Serialize;

pub use container::ContainerReconciler;
pub use plan::{Action, DesiredContainer};

/// Trait for resource reconcilers.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// The desired configuration.
    type Spec: Send + Sync;
    /// The outcome to report back.
    type Status: Send;

    /// Reconcile the resource - compare desired vs actual state and take action.
    async fn reconcile(&self, name: &str, spec: &Self::Spec) -> Self::Status;

    /// Ensure the resource is gone.
    async fn finalize(&self, name: &str) -> Self::Status;
}

/// Outcome of one reconciliation.
///
/// `actions` are the mutating calls that completed, or in a dry run the
/// ones that would have been issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileResult {
    pub name: String,
    pub changed: bool,
    pub failed: bool,
    pub comment: String,
    pub actions: Vec<Action>,
    pub dry_run: bool,
}

impl ReconcileResult {
    pub fn success(name: &str, actions: Vec<Action>, comment: String, dry_run: bool) -> Self {
        Self {
            name: name.to_string(),
            changed: !actions.is_empty(),
            failed: false,
            comment,
            actions,
            dry_run,
        }
    }

    pub fn failure(name: &str, actions: Vec<Action>, comment: String, dry_run: bool) -> Self {
        Self {
            name: name.to_string(),
            changed: !actions.is_empty(),
            failed: true,
            comment,
            actions,
            dry_run,
        }
    }
}
