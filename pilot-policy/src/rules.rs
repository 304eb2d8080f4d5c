//! Policy rules and rules-file persistence.
//!
//! Rules are declarative condition/action pairings evaluated against a
//! context snapshot. They are loaded from a JSON file at startup (built-in
//! defaults when the file is absent), disabled rather than deleted, and
//! carry mutable trigger statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::path::Path;

use crate::decision::ActionSpec;

/// Trigger conditions for a rule.
///
/// Conditions combine with OR semantics: any present condition matching the
/// context is sufficient. A rule with no conditions never matches, which is
/// also how malformed rule entries degrade.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConditions {
    /// Matches when the context `metric` falls below this threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_threshold: Option<f64>,

    /// Matches when the context `trend_score` reaches this threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend_threshold: Option<f64>,

    /// Matches when the context `score` falls below this threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_threshold: Option<f64>,
}

impl RuleConditions {
    /// Whether no condition is present.
    pub fn is_empty(&self) -> bool {
        self.metric_threshold.is_none()
            && self.trend_threshold.is_none()
            && self.score_threshold.is_none()
    }
}

/// A rule in the policy engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Stable rule identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// What the rule watches for
    #[serde(default)]
    pub description: String,
    /// Trigger conditions (OR semantics)
    #[serde(default)]
    pub conditions: RuleConditions,
    /// Ordered action templates emitted when the rule fires
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
    /// Rule priority; used to break confidence ties between decisions
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Disabled rules are kept but never evaluated
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Whether matching decisions bypass manual review
    #[serde(default)]
    pub auto_approve: bool,
    /// Creation timestamp
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Last time the rule fired
    #[serde(default)]
    pub last_triggered: Option<DateTime<Utc>>,
    /// How many times the rule has fired
    #[serde(default)]
    pub trigger_count: u64,
}

fn default_priority() -> i32 {
    1
}

fn default_enabled() -> bool {
    true
}

/// Built-in rule set used when no rules file exists yet.
pub fn default_rules() -> Vec<PolicyRule> {
    let now = Utc::now();
    vec![
        PolicyRule {
            id: "performance_drop_alert".into(),
            name: "Performance Drop Alert".into(),
            description: "Alert when the performance metric drops below threshold".into(),
            conditions: RuleConditions {
                metric_threshold: Some(5.0),
                ..RuleConditions::default()
            },
            actions: vec![
                ActionSpec::new("send_alert")
                    .with_param("message", json!("Performance metric has dropped significantly")),
                ActionSpec::new("schedule_analysis")
                    .with_param("target", json!("performance_causes")),
            ],
            priority: 1,
            enabled: true,
            auto_approve: true,
            created_at: now,
            last_triggered: None,
            trigger_count: 0,
        },
        PolicyRule {
            id: "trend_response".into(),
            name: "Trend Response".into(),
            description: "Respond to strongly trending topics".into(),
            conditions: RuleConditions {
                trend_threshold: Some(0.8),
                ..RuleConditions::default()
            },
            actions: vec![
                ActionSpec::new("create_content")
                    .with_param("format", json!("video"))
                    .with_param("timeline", json!("4h")),
                ActionSpec::new("schedule_post")
                    .with_param("platforms", json!(["youtube", "tiktok"])),
            ],
            priority: 2,
            enabled: true,
            auto_approve: true,
            created_at: now,
            last_triggered: None,
            trigger_count: 0,
        },
        PolicyRule {
            id: "entity_retirement".into(),
            name: "Entity Retirement".into(),
            description: "Flag underperforming entities for retirement".into(),
            conditions: RuleConditions {
                score_threshold: Some(25.0),
                ..RuleConditions::default()
            },
            actions: vec![
                ActionSpec::new("flag_entity").with_param("flag", json!("retire")),
                ActionSpec::new("send_alert")
                    .with_param("message", json!("Entity recommended for retirement")),
            ],
            priority: 3,
            enabled: true,
            auto_approve: false,
            created_at: now,
            last_triggered: None,
            trigger_count: 0,
        },
    ]
}

/// Load rules from a JSON file.
///
/// A missing file yields the built-in defaults. A malformed file is a
/// configuration error: it is logged and the defaults are used, the process
/// continues.
pub fn load_rules(path: &Path) -> Vec<PolicyRule> {
    if !path.exists() {
        return default_rules();
    }
    match fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str::<Vec<PolicyRule>>(&raw) {
            Ok(rules) => rules,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to parse rules file, using defaults");
                default_rules()
            }
        },
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to read rules file, using defaults");
            default_rules()
        }
    }
}

/// Persist rules to a JSON file.
///
/// Writes to a temporary file first, then renames, so an interrupted write
/// cannot corrupt the rules file.
pub fn save_rules(path: &Path, rules: &[PolicyRule]) -> anyhow::Result<()> {
    use anyhow::Context;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create rules directory {}", parent.display()))?;
    }
    let raw = serde_json::to_string_pretty(rules)?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, raw)
        .with_context(|| format!("Failed to write rules file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to replace rules file {}", path.display()))?;
    Ok(())
}
