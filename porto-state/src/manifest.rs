//! Declarative manifest of desired container states.
//!
//! ```json
//! {
//!   "containers": [
//!     { "ensure": "running", "name": "web", "properties": { "command": "sleep 300" } },
//!     { "ensure": "absent", "names": ["old-a", "old-b"] }
//!   ]
//! }
//! ```
//!
//! Entries are applied in order. Each container yields its own result, so a
//! failing entry does not stop the ones after it.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{error, info};

use crate::clients::Properties;
use crate::reconciler::{DesiredContainer, ReconcileResult, Reconciler};

/// Parsed manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub containers: Vec<Entry>,
}

/// One manifest entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "ensure", rename_all = "lowercase")]
pub enum Entry {
    Running(RunningEntry),
    Absent(AbsentEntry),
}

/// `"ensure": "running"`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunningEntry {
    pub name: String,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default = "default_start")]
    pub start: bool,
}

/// `"ensure": "absent"`, with `name`, `names` or both.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AbsentEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub names: Vec<String>,
}

fn default_start() -> bool {
    true
}

impl Entry {
    /// Container names this entry covers.
    pub fn names(&self) -> Vec<&str> {
        match self {
            Entry::Running(entry) => vec![entry.name.as_str()],
            Entry::Absent(entry) => entry
                .name
                .iter()
                .chain(entry.names.iter())
                .map(String::as_str)
                .collect(),
        }
    }
}

impl Manifest {
    /// Parse and validate a manifest document.
    pub fn parse(json: &str) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(json).context("Invalid manifest")?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        Self::parse(&json).with_context(|| format!("Failed to load manifest {}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        for (i, entry) in self.containers.iter().enumerate() {
            let names = entry.names();
            if names.is_empty() {
                bail!("entry {}: no container name given", i);
            }
            if let Some(empty) = names.iter().position(|n| n.is_empty()) {
                bail!("entry {}: container name {} is empty", i, empty);
            }
        }
        Ok(())
    }

    /// Apply every entry in order.
    pub async fn apply<R>(&self, reconciler: &R) -> Vec<ReconcileResult>
    where
        R: Reconciler<Spec = DesiredContainer, Status = ReconcileResult>,
    {
        info!(entries = self.containers.len(), "Applying manifest");

        let mut results = Vec::new();
        for entry in &self.containers {
            match entry {
                Entry::Running(running) => {
                    let desired =
                        DesiredContainer::new(running.properties.clone(), running.start);
                    results.push(reconciler.reconcile(&running.name, &desired).await);
                }
                Entry::Absent(_) => {
                    for name in entry.names() {
                        results.push(reconciler.finalize(name).await);
                    }
                }
            }
        }

        for failed in results.iter().filter(|r| r.failed) {
            error!(container = %failed.name, "{}", failed.comment);
        }

        results
    }
}
