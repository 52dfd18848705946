//! Reconciliation planning.
//!
//! Pure functions from the observed container and the desired
//! configuration to the ordered list of primitive calls that converge one
//! to the other. No I/O happens here.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clients::{ContainerState, Properties};

/// Property key that `cmd` is an alias of.
pub const COMMAND_PROPERTY: &str = "command";

/// Desired configuration of a single container.
///
/// Every constructor, deserialization included, folds the `cmd` alias
/// into `command`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawDesired")]
pub struct DesiredContainer {
    properties: Properties,
    #[serde(rename = "start")]
    should_run: bool,
}

/// Wire form of [`DesiredContainer`] before alias folding.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDesired {
    #[serde(default)]
    properties: Properties,
    #[serde(default = "default_should_run")]
    start: bool,
}

fn default_should_run() -> bool {
    true
}

impl From<RawDesired> for DesiredContainer {
    fn from(raw: RawDesired) -> Self {
        Self::new(raw.properties, raw.start)
    }
}

impl DesiredContainer {
    /// Build a desired configuration, folding the `cmd` alias into `command`.
    pub fn new(mut properties: Properties, should_run: bool) -> Self {
        if let Some(cmd) = properties.remove("cmd") {
            properties.insert(COMMAND_PROPERTY.to_string(), cmd);
        }
        Self {
            properties,
            should_run,
        }
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn should_run(&self) -> bool {
        self.should_run
    }
}

impl Default for DesiredContainer {
    fn default() -> Self {
        Self::new(Properties::new(), true)
    }
}

/// Container as read back from the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observed {
    pub state: ContainerState,
    pub properties: Properties,
}

/// One mutating primitive call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Create,
    SetProperty { key: String, value: String },
    Start,
    Stop,
    Destroy,
}

impl Action {
    /// Comment for a failure of this call on container `name`.
    pub fn failure_comment(&self, name: &str, error: impl fmt::Display) -> String {
        match self {
            Action::Create => format!("Can't create container '{}': {}", name, error),
            Action::SetProperty { key, value } => format!(
                "Can't set property {}={} for container '{}': {}",
                key, value, name, error
            ),
            Action::Start => format!("Can't start container '{}': {}", name, error),
            Action::Stop => format!("Can't stop container '{}': {}", name, error),
            Action::Destroy => format!("Failed to remove container '{}': {}", name, error),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Create => f.write_str("create"),
            Action::SetProperty { key, value } => write!(f, "set_property({}={})", key, value),
            Action::Start => f.write_str("start"),
            Action::Stop => f.write_str("stop"),
            Action::Destroy => f.write_str("destroy"),
        }
    }
}

/// What a plan does, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    /// Container is missing and gets created.
    Create,
    /// Properties differ and get rewritten.
    Reconfigure,
    /// Dead container gets stopped and started again.
    RecoverDead,
    /// Configuration matches, container only needs starting.
    Start,
    AlreadyRunning,
    /// Configuration matches and the container is not meant to run.
    UpToDate,
}

impl PlanKind {
    pub fn comment(&self, name: &str, dry_run: bool) -> String {
        match (self, dry_run) {
            (PlanKind::Create, false) => format!("Container '{}' created", name),
            (PlanKind::Create, true) => format!("Container '{}' will be created", name),
            (PlanKind::Reconfigure, false) => format!("Container '{}' reconfigured", name),
            (PlanKind::Reconfigure, true) => format!("Container '{}' will be reconfigured", name),
            (PlanKind::RecoverDead, false) => {
                format!("Container '{}' was dead and has been restarted", name)
            }
            (PlanKind::RecoverDead, true) => {
                format!("Container '{}' is dead and will be restarted", name)
            }
            (PlanKind::Start, false) => format!("Container '{}' started", name),
            (PlanKind::Start, true) => format!("Container '{}' will be started", name),
            (PlanKind::AlreadyRunning, _) => format!("Container '{}' is already running", name),
            (PlanKind::UpToDate, _) => {
                format!("Container '{}' is already configured as specified", name)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub kind: PlanKind,
    pub actions: Vec<Action>,
}

/// Desired properties whose current value differs or is missing.
///
/// Comparison is exact string equality; `"100"` and `"100 "` differ.
pub fn diff(current: &Properties, desired: &Properties) -> Properties {
    desired
        .iter()
        .filter(|(key, value)| current.get(key.as_str()) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn set_all(properties: &Properties) -> impl Iterator<Item = Action> + '_ {
    properties.iter().map(|(key, value)| Action::SetProperty {
        key: key.clone(),
        value: value.clone(),
    })
}

/// Plan converging a container to `desired`.
///
/// An existing container that reports no properties at all is planned as
/// if it were missing, so the resulting `Create` fails with
/// `AlreadyExists`. Nothing created along the way is rolled back on
/// failure.
pub fn plan_running(observed: Option<&Observed>, desired: &DesiredContainer) -> Plan {
    let observed = match observed {
        Some(o) if !o.properties.is_empty() => o,
        _ => {
            let mut actions = vec![Action::Create];
            actions.extend(set_all(&desired.properties));
            if desired.should_run {
                actions.push(Action::Start);
            }
            return Plan {
                kind: PlanKind::Create,
                actions,
            };
        }
    };

    let changes = diff(&observed.properties, &desired.properties);

    if !changes.is_empty() {
        let mut actions = Vec::new();
        if observed.state.blocks_reconfigure() {
            actions.push(Action::Stop);
        }
        actions.extend(set_all(&changes));
        if desired.should_run {
            actions.push(Action::Start);
        }
        return Plan {
            kind: PlanKind::Reconfigure,
            actions,
        };
    }

    match observed.state {
        ContainerState::Running => Plan {
            kind: PlanKind::AlreadyRunning,
            actions: vec![],
        },
        // A dead container can't be started directly
        ContainerState::Dead if desired.should_run => Plan {
            kind: PlanKind::RecoverDead,
            actions: vec![Action::Stop, Action::Start],
        },
        _ if desired.should_run => Plan {
            kind: PlanKind::Start,
            actions: vec![Action::Start],
        },
        _ => Plan {
            kind: PlanKind::UpToDate,
            actions: vec![],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn observed(state: ContainerState, pairs: &[(&str, &str)]) -> Observed {
        Observed {
            state,
            properties: props(pairs),
        }
    }

    fn set(key: &str, value: &str) -> Action {
        Action::SetProperty {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_diff_reports_missing_and_changed_keys() {
        let current = props(&[("command", "sleep 100"), ("hostname", "a")]);

        assert!(diff(&current, &props(&[("command", "sleep 100")])).is_empty());
        assert!(diff(&current, &Properties::new()).is_empty());

        let d = diff(&current, &props(&[("hostname", "b"), ("memory_limit", "1G")]));
        assert_eq!(d, props(&[("hostname", "b"), ("memory_limit", "1G")]));
    }

    #[test]
    fn test_diff_is_exact_string_comparison() {
        let current = props(&[("memory_limit", "1073741824")]);
        let d = diff(&current, &props(&[("memory_limit", "1G")]));
        assert_eq!(d.len(), 1);

        let current = props(&[("cpu_limit", "1")]);
        assert_eq!(diff(&current, &props(&[("cpu_limit", "1.0")])).len(), 1);
    }

    #[test]
    fn test_diff_matches_key_rule() {
        // (current, desired, changes needed)
        let cases: &[(&[(&str, &str)], &[(&str, &str)], bool)] = &[
            (&[], &[], false),
            (&[("a", "1")], &[], false),
            (&[], &[("a", "1")], true),
            (&[("a", "1")], &[("a", "1")], false),
            (&[("a", "1")], &[("a", "2")], true),
            (&[("a", "1")], &[("b", "1")], true),
            (&[("a", "1"), ("b", "2")], &[("b", "2")], false),
            (&[("a", "")], &[("a", "")], false),
            (&[], &[("a", "")], true),
        ];

        for (current, desired, expected) in cases {
            let (current, desired) = (props(current), props(desired));
            let needed = desired.iter().any(|(k, v)| current.get(k) != Some(v));
            assert_eq!(needed, *expected, "{:?} -> {:?}", current, desired);
            assert_eq!(
                !diff(&current, &desired).is_empty(),
                *expected,
                "{:?} -> {:?}",
                current,
                desired
            );
        }
    }

    #[test]
    fn test_cmd_alias_folds_into_command() {
        let desired = DesiredContainer::new(props(&[("cmd", "sleep 1")]), true);
        assert_eq!(desired.properties, props(&[("command", "sleep 1")]));

        let desired = DesiredContainer::new(props(&[("cmd", "new"), ("command", "old")]), true);
        assert_eq!(desired.properties, props(&[("command", "new")]));
    }

    #[test]
    fn test_plan_create_when_missing() {
        let desired = DesiredContainer::new(props(&[("command", "sleep 100")]), true);
        let plan = plan_running(None, &desired);

        assert_eq!(plan.kind, PlanKind::Create);
        assert_eq!(
            plan.actions,
            vec![Action::Create, set("command", "sleep 100"), Action::Start]
        );
    }

    #[test]
    fn test_plan_create_without_start() {
        let desired = DesiredContainer::new(props(&[("b", "2"), ("a", "1")]), false);
        let plan = plan_running(None, &desired);

        // Properties are applied in key order
        assert_eq!(plan.actions, vec![Action::Create, set("a", "1"), set("b", "2")]);
    }

    #[test]
    fn test_plan_empty_properties_treated_as_missing() {
        let desired = DesiredContainer::new(props(&[("command", "sleep 100")]), true);
        let plan = plan_running(Some(&observed(ContainerState::Stopped, &[])), &desired);

        assert_eq!(plan.kind, PlanKind::Create);
        assert_eq!(plan.actions[0], Action::Create);
    }

    #[test]
    fn test_plan_converged_running_is_noop() {
        let desired = DesiredContainer::new(props(&[("command", "sleep 100")]), true);
        let o = observed(ContainerState::Running, &[("command", "sleep 100"), ("x", "y")]);
        let plan = plan_running(Some(&o), &desired);

        assert_eq!(plan.kind, PlanKind::AlreadyRunning);
        assert!(plan.actions.is_empty());
    }

    #[test]
    fn test_plan_reconfigure_running_stops_first() {
        let desired = DesiredContainer::new(
            props(&[("command", "sleep 200"), ("hostname", "web")]),
            true,
        );
        let o = observed(
            ContainerState::Running,
            &[("command", "sleep 100"), ("hostname", "web")],
        );
        let plan = plan_running(Some(&o), &desired);

        assert_eq!(plan.kind, PlanKind::Reconfigure);
        // Only the mismatched key is written
        assert_eq!(
            plan.actions,
            vec![Action::Stop, set("command", "sleep 200"), Action::Start]
        );
    }

    #[test]
    fn test_plan_reconfigure_stopped_skips_stop() {
        let desired = DesiredContainer::new(props(&[("command", "sleep 200")]), false);
        let o = observed(ContainerState::Stopped, &[("command", "sleep 100")]);
        let plan = plan_running(Some(&o), &desired);

        assert_eq!(plan.actions, vec![set("command", "sleep 200")]);
    }

    #[test]
    fn test_plan_dead_recovers_with_stop_then_start() {
        let desired = DesiredContainer::new(props(&[("command", "sleep 100")]), true);
        let o = observed(ContainerState::Dead, &[("command", "sleep 100")]);
        let plan = plan_running(Some(&o), &desired);

        assert_eq!(plan.kind, PlanKind::RecoverDead);
        assert_eq!(plan.actions, vec![Action::Stop, Action::Start]);
    }

    #[test]
    fn test_plan_dead_without_start_is_left_alone() {
        let desired = DesiredContainer::new(props(&[("command", "sleep 100")]), false);
        let o = observed(ContainerState::Dead, &[("command", "sleep 100")]);
        let plan = plan_running(Some(&o), &desired);

        assert_eq!(plan.kind, PlanKind::UpToDate);
        assert!(plan.actions.is_empty());
    }

    #[test]
    fn test_plan_stopped_gets_started() {
        let desired = DesiredContainer::default();
        let o = observed(ContainerState::Stopped, &[("command", "sleep 100")]);
        let plan = plan_running(Some(&o), &desired);

        assert_eq!(plan.kind, PlanKind::Start);
        assert_eq!(plan.actions, vec![Action::Start]);
    }

    #[test]
    fn test_desired_from_json_defaults() {
        let desired: DesiredContainer =
            serde_json::from_str(r#"{"properties": {"cmd": "sleep 5"}}"#).unwrap();
        assert!(desired.should_run);
        assert_eq!(desired.properties, props(&[("command", "sleep 5")]));

        let desired: DesiredContainer = serde_json::from_str(r#"{"start": false}"#).unwrap();
        assert!(!desired.should_run);
        assert!(desired.properties.is_empty());

        let desired: DesiredContainer =
            serde_json::from_str(r#"{"properties": {"cmd": "new", "command": "old"}}"#).unwrap();
        assert_eq!(desired.properties(), &props(&[("command", "new")]));
    }

    #[test]
    fn test_desired_from_json_rejects_unknown_fields() {
        let result = serde_json::from_str::<DesiredContainer>(r#"{"propertis": {}}"#);
        assert!(result.is_err());
    }
}
