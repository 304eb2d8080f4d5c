//! Task data model.
//!
//! A task is a schedulable unit of work with explicit dependencies, a
//! priority, and a bounded retry budget.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use pilot_policy::ActionSpec;

use crate::action::ActionKind;

/// Default retry budget for submitted tasks.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Execution state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Whether no further state change is possible.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Status name for display and logging.
    pub fn status_name(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

/// Priority levels for tasks. Higher dispatches first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl TaskPriority {
    /// Map a plan priority label ("high", "medium", ...) to a priority.
    /// Unknown labels map to Medium.
    pub fn from_label(label: &str) -> Self {
        match label.to_lowercase().as_str() {
            "critical" => TaskPriority::Critical,
            "high" => TaskPriority::High,
            "low" => TaskPriority::Low,
            _ => TaskPriority::Medium,
        }
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Medium
    }
}

/// A task held by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: String,
    /// Human-readable description
    pub description: String,
    /// Typed action kind dispatched to its registered handler
    pub action: ActionKind,
    /// Free-form parameters handed to the handler
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Earliest time the task may run
    pub scheduled_time: DateTime<Utc>,
    /// Dispatch priority
    pub priority: TaskPriority,
    /// Current state
    pub status: TaskStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Start of the most recent attempt
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal state
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Handler result on success
    #[serde(default)]
    pub result: Option<Value>,
    /// Error detail on failure
    #[serde(default)]
    pub error: Option<String>,
    /// Attempts that have failed so far
    #[serde(default)]
    pub retry_count: u32,
    /// Retry budget
    pub max_retries: u32,
    /// Ids of tasks that must complete before this one may run.
    /// Unknown ids block, never silently skip.
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    /// Decision that produced this task, if any
    #[serde(default)]
    pub decision_id: Option<String>,
    /// Arrival order, used to keep priority ties stable
    #[serde(default)]
    pub seq: u64,
}

/// Specification for a task to submit to the registry.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub description: String,
    pub action: ActionKind,
    pub params: Map<String, Value>,
    /// None means "run as soon as dependencies allow"
    pub scheduled_time: Option<DateTime<Utc>>,
    pub priority: TaskPriority,
    pub max_retries: u32,
    pub dependencies: Vec<String>,
    pub decision_id: Option<String>,
}

impl NewTask {
    /// Create a spec for an immediate, medium-priority task.
    pub fn new(action: ActionKind, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            action,
            params: Map::new(),
            scheduled_time: None,
            priority: TaskPriority::Medium,
            max_retries: DEFAULT_MAX_RETRIES,
            dependencies: Vec::new(),
            decision_id: None,
        }
    }

    /// Build a spec from a proposed action, resolving its action type.
    ///
    /// Returns None when the action type is unknown; callers log and skip
    /// such actions (a configuration error, not a fault).
    pub fn from_action_spec(
        spec: &ActionSpec,
        priority: TaskPriority,
        decision_id: Option<&str>,
    ) -> Option<Self> {
        let action = ActionKind::parse(&spec.action_type)?;
        Some(Self {
            description: format!("{} ({})", action.name(), spec.action_type),
            action,
            params: spec.params.clone(),
            scheduled_time: None,
            priority,
            max_retries: DEFAULT_MAX_RETRIES,
            dependencies: Vec::new(),
            decision_id: decision_id.map(String::from),
        })
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_scheduled_time(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_time = Some(at);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_decision_id(mut self, decision_id: impl Into<String>) -> Self {
        self.decision_id = Some(decision_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Low < TaskPriority::Medium);
        assert!(TaskPriority::Medium < TaskPriority::High);
        assert!(TaskPriority::High < TaskPriority::Critical);
    }

    #[test]
    fn test_priority_from_label() {
        assert_eq!(TaskPriority::from_label("high"), TaskPriority::High);
        assert_eq!(TaskPriority::from_label("CRITICAL"), TaskPriority::Critical);
        assert_eq!(TaskPriority::from_label("low"), TaskPriority::Low);
        assert_eq!(TaskPriority::from_label("whenever"), TaskPriority::Medium);
    }

    #[test]
    fn test_status_terminal() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_from_action_spec() {
        let spec = ActionSpec::new("send_alert").with_param("message", json!("hello"));
        let new_task =
            NewTask::from_action_spec(&spec, TaskPriority::High, Some("d-1")).unwrap();
        assert_eq!(new_task.action, ActionKind::SendAlert);
        assert_eq!(new_task.priority, TaskPriority::High);
        assert_eq!(new_task.decision_id.as_deref(), Some("d-1"));
        assert_eq!(new_task.params.get("message"), Some(&json!("hello")));
    }

    #[test]
    fn test_from_action_spec_unknown_kind() {
        let spec = ActionSpec::new("launch_rocket");
        assert!(NewTask::from_action_spec(&spec, TaskPriority::High, None).is_none());
    }
}
