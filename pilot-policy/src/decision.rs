//! Decision data model.
//!
//! A Decision is a proposed behavior change generated by the policy engine,
//! subject to approval before its actions become executable tasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Kinds of decisions the planning layer can make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    /// Adjust what content is produced and when
    ContentSchedule,
    /// Invest in or divest from a channel
    ChannelInvestment,
    /// React to a trending topic
    TrendResponse,
    /// Swap an external tool for another
    ToolSwitch,
    /// Expand into a new niche
    NicheExpansion,
    /// Re-allocate budget across channels
    BudgetAllocation,
    /// Reduce exposure to an identified risk
    RiskMitigation,
}

impl DecisionType {
    /// Returns the type name as a string for display and logging.
    pub fn type_name(self) -> &'static str {
        match self {
            DecisionType::ContentSchedule => "content_schedule",
            DecisionType::ChannelInvestment => "channel_investment",
            DecisionType::TrendResponse => "trend_response",
            DecisionType::ToolSwitch => "tool_switch",
            DecisionType::NicheExpansion => "niche_expansion",
            DecisionType::BudgetAllocation => "budget_allocation",
            DecisionType::RiskMitigation => "risk_mitigation",
        }
    }
}

impl FromStr for DecisionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content_schedule" => Ok(DecisionType::ContentSchedule),
            "channel_investment" => Ok(DecisionType::ChannelInvestment),
            "trend_response" => Ok(DecisionType::TrendResponse),
            "tool_switch" => Ok(DecisionType::ToolSwitch),
            "niche_expansion" => Ok(DecisionType::NicheExpansion),
            "budget_allocation" => Ok(DecisionType::BudgetAllocation),
            "risk_mitigation" => Ok(DecisionType::RiskMitigation),
            other => Err(format!("unknown decision type: {other}")),
        }
    }
}

/// Approval state of a decision.
///
/// `AutoApproved` is terminal from the start: decisions produced by an
/// auto-approving rule never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    AutoApproved,
}

impl ApprovalStatus {
    /// Returns true if no further state change is possible.
    pub fn is_terminal(self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }

    /// Returns the status name as a string for display and logging.
    pub fn status_name(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
            ApprovalStatus::AutoApproved => "auto_approved",
        }
    }
}

impl FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            "auto_approved" => Ok(ApprovalStatus::AutoApproved),
            other => Err(format!("unknown approval status: {other}")),
        }
    }
}

/// An action proposed by a rule or a plan.
///
/// The `action_type` string and parameter map are opaque here; they are
/// resolved into a typed action kind when converted into a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    /// Action type identifier (e.g. "create_content", "send_alert")
    #[serde(alias = "type")]
    pub action_type: String,

    /// Free-form parameters handed to the action handler
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl ActionSpec {
    /// Create an action spec with no parameters.
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            params: Map::new(),
        }
    }

    /// Attach a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// A decision produced by the policy engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// Unique identifier
    pub id: String,
    /// Kind of decision
    pub decision_type: DecisionType,
    /// Human-readable description
    pub description: String,
    /// Why this decision was proposed
    pub rationale: String,
    /// Ordered actions to execute once approved
    pub proposed_actions: Vec<ActionSpec>,
    /// What the decision is expected to achieve
    pub expected_outcome: String,
    /// Risk assessment text
    pub risk_assessment: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Whether a human must approve before execution
    pub requires_approval: bool,
    /// Current approval state
    pub approval_status: ApprovalStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// When the decision was approved or rejected
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
    /// Operator who approved or rejected the decision
    #[serde(default)]
    pub approved_by: Option<String>,
    /// When the resulting tasks finished executing
    #[serde(default)]
    pub executed_at: Option<DateTime<Utc>>,
    /// Outcome metrics recorded after execution
    #[serde(default)]
    pub outcome: Option<Value>,
}

/// A flat snapshot of named context fields consumed by rule predicates.
///
/// Fields are supplied by the upstream scoring collaborator (e.g. a
/// performance metric, a trend score, a composite score).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextSnapshot(BTreeMap<String, Value>);

impl ContextSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    /// Read a field as f64, accepting any JSON number.
    ///
    /// Non-numeric values read as absent so a malformed context can never
    /// make a predicate raise.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    /// Read a raw field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Merge another map of fields into the snapshot.
    pub fn extend(&mut self, fields: &Map<String, Value>) {
        for (key, value) in fields {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Number of fields present.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the snapshot has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decision_type_roundtrip() {
        for ty in [
            DecisionType::ContentSchedule,
            DecisionType::ChannelInvestment,
            DecisionType::TrendResponse,
            DecisionType::ToolSwitch,
            DecisionType::NicheExpansion,
            DecisionType::BudgetAllocation,
            DecisionType::RiskMitigation,
        ] {
            let parsed: DecisionType = ty.type_name().parse().unwrap();
            assert_eq!(parsed, ty);
        }
        assert!("unknown".parse::<DecisionType>().is_err());
    }

    #[test]
    fn test_approval_status_terminal() {
        assert!(!ApprovalStatus::Pending.is_terminal());
        assert!(ApprovalStatus::Approved.is_terminal());
        assert!(ApprovalStatus::Rejected.is_terminal());
        assert!(ApprovalStatus::AutoApproved.is_terminal());
    }

    #[test]
    fn test_approval_status_serde_names() {
        let json = serde_json::to_string(&ApprovalStatus::AutoApproved).unwrap();
        assert_eq!(json, "\"auto_approved\"");
        let status: ApprovalStatus = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(status, ApprovalStatus::Pending);
    }

    #[test]
    fn test_action_spec_type_alias() {
        // Rule files written against the original schema use "type"
        let spec: ActionSpec =
            serde_json::from_str(r#"{"type": "send_alert", "params": {"message": "hi"}}"#).unwrap();
        assert_eq!(spec.action_type, "send_alert");
        assert_eq!(spec.params.get("message"), Some(&json!("hi")));
    }

    #[test]
    fn test_context_snapshot_numeric_reads() {
        let ctx = ContextSnapshot::new()
            .with("metric", json!(3.5))
            .with("score", json!(42))
            .with("label", json!("not a number"));

        assert_eq!(ctx.get_f64("metric"), Some(3.5));
        assert_eq!(ctx.get_f64("score"), Some(42.0));
        assert_eq!(ctx.get_f64("label"), None);
        assert_eq!(ctx.get_f64("absent"), None);
    }
}
