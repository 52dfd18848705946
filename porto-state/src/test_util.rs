//! In-memory supervisor for tests.
//!
//! Models the Porto state rules the reconciler depends on: names are
//! unique, start/stop refuse no-op transitions, a dead container can only
//! be stopped, and properties can only be written while stopped. Every
//! call is recorded so tests can assert on the exact call sequence.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::clients::{ContainerState, Properties, Supervisor};
use crate::error::{Result, SupervisorError};

/// Calls that only read.
const READ_CALLS: &[&str] = &["list", "get_state", "get_properties"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeContainer {
    pub state: ContainerState,
    pub properties: Properties,
}

struct Failure {
    call: String,
    error: fn(&str) -> SupervisorError,
    /// Remove the container before failing (simulates a concurrent destroy).
    remove: bool,
}

#[derive(Default)]
struct Inner {
    containers: BTreeMap<String, FakeContainer>,
    calls: Vec<String>,
    failures: Vec<Failure>,
}

/// Supervisor backed by a map, with call recording and failure injection.
#[derive(Default)]
pub struct MemorySupervisor {
    inner: Mutex<Inner>,
}

impl MemorySupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Builder-style [`MemorySupervisor::insert`].
    pub fn with_container(
        self,
        name: &str,
        state: ContainerState,
        pairs: &[(&str, &str)],
    ) -> Self {
        let properties = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.insert(name, state, properties);
        self
    }

    pub fn insert(&self, name: &str, state: ContainerState, properties: Properties) {
        self.lock()
            .containers
            .insert(name.to_string(), FakeContainer { state, properties });
    }

    pub fn container(&self, name: &str) -> Option<FakeContainer> {
        self.lock().containers.get(name).cloned()
    }

    /// Make the next `call` (e.g. `"start"`, `"set_property"`) fail.
    pub fn fail(&self, call: &str, error: fn(&str) -> SupervisorError) {
        self.lock().failures.push(Failure {
            call: call.to_string(),
            error,
            remove: false,
        });
    }

    /// Like [`MemorySupervisor::fail`], but the container vanishes first.
    pub fn fail_and_remove(&self, call: &str, error: fn(&str) -> SupervisorError) {
        self.lock().failures.push(Failure {
            call: call.to_string(),
            error,
            remove: true,
        });
    }

    /// Every recorded call, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Recorded calls that mutate state.
    pub fn mutations(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|c| !READ_CALLS.iter().any(|r| c.as_str() == *r))
            .cloned()
            .collect()
    }

    /// Record `call` and apply any pending injected failure for it.
    fn enter(&self, call: &str, record: String, name: &str) -> Result<MutexGuard<'_, Inner>> {
        let mut inner = self.lock();
        inner.calls.push(record);

        if let Some(pos) = inner.failures.iter().position(|f| f.call == call) {
            let failure = inner.failures.remove(pos);
            if failure.remove {
                inner.containers.remove(name);
            }
            return Err((failure.error)(name));
        }
        Ok(inner)
    }
}

fn not_found(name: &str) -> SupervisorError {
    SupervisorError::NotFound(name.to_string())
}

fn existing<'a>(inner: &'a mut Inner, name: &str) -> Result<&'a mut FakeContainer> {
    inner.containers.get_mut(name).ok_or_else(|| not_found(name))
}

#[async_trait]
impl Supervisor for MemorySupervisor {
    async fn list(&self) -> Result<Vec<String>> {
        let inner = self.enter("list", "list".to_string(), "")?;
        Ok(inner.containers.keys().cloned().collect())
    }

    async fn get_state(&self, name: &str) -> Result<ContainerState> {
        let mut inner = self.enter("get_state", "get_state".to_string(), name)?;
        Ok(existing(&mut inner, name)?.state)
    }

    async fn create(&self, name: &str) -> Result<()> {
        let mut inner = self.enter("create", "create".to_string(), name)?;
        if inner.containers.contains_key(name) {
            return Err(SupervisorError::AlreadyExists(name.to_string()));
        }
        inner.containers.insert(
            name.to_string(),
            FakeContainer {
                state: ContainerState::Stopped,
                properties: Properties::new(),
            },
        );
        Ok(())
    }

    async fn destroy(&self, name: &str) -> Result<()> {
        let mut inner = self.enter("destroy", "destroy".to_string(), name)?;
        inner
            .containers
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found(name))
    }

    async fn start(&self, name: &str) -> Result<()> {
        let mut inner = self.enter("start", "start".to_string(), name)?;
        let container = existing(&mut inner, name)?;
        if container.state != ContainerState::Stopped {
            return Err(SupervisorError::InvalidState(format!(
                "{} is {}",
                name, container.state
            )));
        }
        container.state = ContainerState::Running;
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<()> {
        let mut inner = self.enter("stop", "stop".to_string(), name)?;
        let container = existing(&mut inner, name)?;
        if container.state == ContainerState::Stopped {
            return Err(SupervisorError::InvalidState(format!("{} is stopped", name)));
        }
        container.state = ContainerState::Stopped;
        Ok(())
    }

    async fn set_property(&self, name: &str, key: &str, value: &str) -> Result<()> {
        let record = format!("set_property({}={})", key, value);
        let mut inner = self.enter("set_property", record, name)?;
        let container = existing(&mut inner, name)?;
        if container.state != ContainerState::Stopped {
            return Err(SupervisorError::PropertyRejected {
                property: key.to_string(),
                message: format!("{} is {}", name, container.state),
            });
        }
        container
            .properties
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_properties(&self, name: &str) -> Result<Properties> {
        let mut inner = self.enter("get_properties", "get_properties".to_string(), name)?;
        Ok(existing(&mut inner, name)?.properties.clone())
    }
}
