//! Client for the Porto container supervisor.
//!
//! The [`Supervisor`] trait is the primitive set the reconciler is written
//! against; [`PortoClient`] implements it over the supervisor's unix socket.
//! Each primitive is one round trip with no local caching.

pub mod porto;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

pub use porto::{ClientConfig, PortoClient};

/// Container properties, ordered by key.
pub type Properties = BTreeMap<String, String>;

/// Container state as reported by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Stopped,
    Running,
    Paused,
    Dead,
    Unknown,
}

impl ContainerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerState::Stopped => "stopped",
            ContainerState::Running => "running",
            ContainerState::Paused => "paused",
            ContainerState::Dead => "dead",
            ContainerState::Unknown => "unknown",
        }
    }

    /// Properties can only be changed once the container is stopped.
    pub fn blocks_reconfigure(&self) -> bool {
        matches!(
            self,
            ContainerState::Running | ContainerState::Paused | ContainerState::Dead
        )
    }
}

impl From<&str> for ContainerState {
    fn from(s: &str) -> Self {
        match s {
            "stopped" => ContainerState::Stopped,
            "running" => ContainerState::Running,
            "paused" => ContainerState::Paused,
            "dead" => ContainerState::Dead,
            _ => ContainerState::Unknown,
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primitive operations of the container supervisor.
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// Names of all containers.
    async fn list(&self) -> Result<Vec<String>>;

    async fn get_state(&self, name: &str) -> Result<ContainerState>;

    async fn create(&self, name: &str) -> Result<()>;

    async fn destroy(&self, name: &str) -> Result<()>;

    async fn start(&self, name: &str) -> Result<()>;

    async fn stop(&self, name: &str) -> Result<()>;

    async fn set_property(&self, name: &str, key: &str, value: &str) -> Result<()>;

    async fn get_properties(&self, name: &str) -> Result<Properties>;

    /// Membership test over [`Supervisor::list`].
    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.list().await?.iter().any(|n| n == name))
    }

    /// Apply properties in key order, stopping at the first failure.
    async fn set_properties(&self, name: &str, properties: &Properties) -> Result<()> {
        for (key, value) in properties {
            debug!(container = %name, key = %key, value = %value, "Setting property");
            self.set_property(name, key, value).await?;
        }
        Ok(())
    }

    /// Create a container and apply its initial properties.
    async fn create_with(&self, name: &str, properties: &Properties) -> Result<()> {
        self.create(name).await?;
        self.set_properties(name, properties).await
    }

    async fn restart(&self, name: &str) -> Result<()> {
        self.stop(name).await?;
        self.start(name).await
    }

    /// Create a container running `command` and start it.
    async fn run(&self, name: &str, command: &str) -> Result<()> {
        self.create(name).await?;
        self.set_property(name, "command", command).await?;
        self.start(name).await
    }

    /// Properties of a container, or an empty map if it does not exist.
    async fn inspect(&self, name: &str) -> Result<Properties> {
        if !self.exists(name).await? {
            return Ok(Properties::new());
        }
        self.get_properties(name).await
    }
}
