//! Container reconciler - converges Porto containers to a desired configuration.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::plan::{self, Action, DesiredContainer, Observed, Plan};
use super::{ReconcileResult, Reconciler};
use crate::clients::{ContainerState, Properties, Supervisor};
use crate::error::Result;

/// Reconciler that drives a [`Supervisor`].
///
/// Holds no container state: every call re-reads the supervisor before
/// planning. Calls for the same container name must not run concurrently.
pub struct ContainerReconciler<S> {
    supervisor: S,
    dry_run: bool,
}

impl<S: Supervisor> ContainerReconciler<S> {
    pub fn new(supervisor: S) -> Self {
        Self {
            supervisor,
            dry_run: false,
        }
    }

    /// Only read and report the plan, never mutate.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn supervisor(&self) -> &S {
        &self.supervisor
    }

    pub async fn container_exists(&self, name: &str) -> Result<bool> {
        self.supervisor.exists(name).await
    }

    pub async fn container_state(&self, name: &str) -> Result<ContainerState> {
        self.supervisor.get_state(name).await
    }

    /// Properties of `name`, empty if it does not exist.
    pub async fn inspect(&self, name: &str) -> Result<Properties> {
        self.supervisor.inspect(name).await
    }

    /// Ensure `name` exists with `desired` properties, running if requested.
    pub async fn ensure_running(&self, name: &str, desired: &DesiredContainer) -> ReconcileResult {
        info!(container = %name, dry_run = self.dry_run, "Reconciling container");

        let observed = match self.observe(name).await {
            Ok(observed) => observed,
            Err(comment) => {
                warn!(container = %name, "{}", comment);
                return ReconcileResult::failure(name, vec![], comment, self.dry_run);
            }
        };

        let plan = plan::plan_running(observed.as_ref(), desired);
        debug!(container = %name, kind = ?plan.kind, actions = plan.actions.len(), "Planned");

        if self.dry_run {
            let comment = plan.kind.comment(name, true);
            return ReconcileResult::success(name, plan.actions, comment, true);
        }

        self.execute(name, plan).await
    }

    /// Ensure `name` does not exist.
    pub async fn ensure_absent(&self, name: &str) -> ReconcileResult {
        info!(container = %name, dry_run = self.dry_run, "Ensuring container is absent");

        match self.supervisor.exists(name).await {
            Ok(true) => {}
            Ok(false) => {
                return ReconcileResult::success(
                    name,
                    vec![],
                    format!("Container '{}' does not exist", name),
                    self.dry_run,
                );
            }
            Err(e) => {
                return ReconcileResult::failure(
                    name,
                    vec![],
                    existence_comment(name, &e),
                    self.dry_run,
                );
            }
        }

        if self.dry_run {
            return ReconcileResult::success(
                name,
                vec![Action::Destroy],
                format!("Container '{}' will be removed", name),
                true,
            );
        }

        let mut actions = Vec::new();
        match self.supervisor.destroy(name).await {
            Ok(()) => actions.push(Action::Destroy),
            // Gone already; the re-check below decides
            Err(e) if e.is_not_found() => {
                info!(container = %name, "Container vanished before destroy");
            }
            Err(e) => {
                warn!(container = %name, error = %e, "Destroy failed");
                let comment = Action::Destroy.failure_comment(name, &e);
                return ReconcileResult::failure(name, actions, comment, false);
            }
        }

        match self.supervisor.exists(name).await {
            Ok(false) if actions.is_empty() => ReconcileResult::success(
                name,
                actions,
                format!("Container '{}' was already removed", name),
                false,
            ),
            Ok(false) => ReconcileResult::success(
                name,
                actions,
                format!("Removed container '{}'", name),
                false,
            ),
            Ok(true) => ReconcileResult::failure(
                name,
                actions,
                format!("Failed to remove container '{}'", name),
                false,
            ),
            Err(e) => ReconcileResult::failure(
                name,
                actions,
                format!("Can't verify removal of container '{}': {}", name, e),
                false,
            ),
        }
    }

    /// Read existence, properties and state. Errors come back as comments.
    async fn observe(&self, name: &str) -> std::result::Result<Option<Observed>, String> {
        let exists = self
            .supervisor
            .exists(name)
            .await
            .map_err(|e| existence_comment(name, &e))?;
        if !exists {
            return Ok(None);
        }

        let properties = self
            .supervisor
            .get_properties(name)
            .await
            .map_err(|e| format!("Can't inspect container '{}': {}", name, e))?;
        let state = self
            .supervisor
            .get_state(name)
            .await
            .map_err(|e| format!("Can't get state of container '{}': {}", name, e))?;

        debug!(container = %name, state = %state, properties = properties.len(), "Observed");
        Ok(Some(Observed { state, properties }))
    }

    /// Issue the plan's calls in order, stopping at the first failure.
    ///
    /// Completed calls are not undone.
    async fn execute(&self, name: &str, plan: Plan) -> ReconcileResult {
        let mut done = Vec::with_capacity(plan.actions.len());

        for action in plan.actions {
            if let Err(e) = self.apply(name, &action).await {
                warn!(container = %name, action = %action, error = %e, "Reconciliation step failed");
                let comment = action.failure_comment(name, &e);
                return ReconcileResult::failure(name, done, comment, false);
            }
            debug!(container = %name, action = %action, "Applied");
            done.push(action);
        }

        ReconcileResult::success(name, done, plan.kind.comment(name, false), false)
    }

    async fn apply(&self, name: &str, action: &Action) -> Result<()> {
        match action {
            Action::Create => self.supervisor.create(name).await,
            Action::SetProperty { key, value } => {
                self.supervisor.set_property(name, key, value).await
            }
            Action::Start => self.supervisor.start(name).await,
            Action::Stop => self.supervisor.stop(name).await,
            Action::Destroy => self.supervisor.destroy(name).await,
        }
    }
}

fn existence_comment(name: &str, e: &crate::error::SupervisorError) -> String {
    format!(
        "Error occurred checking for existence of container '{}': {}",
        name, e
    )
}

#[async_trait]
impl<S: Supervisor> Reconciler for ContainerReconciler<S> {
    type Spec = DesiredContainer;
    type Status = ReconcileResult;

    async fn reconcile(&self, name: &str, spec: &Self::Spec) -> Self::Status {
        self.ensure_running(name, spec).await
    }

    async fn finalize(&self, name: &str) -> Self::Status {
        self.ensure_absent(name).await
    }
}
