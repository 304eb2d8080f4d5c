//! Rule-based policy engine.
//!
//! Evaluates declarative rules against a context snapshot and emits
//! decisions, each marked auto-approved or pending per rule configuration.
//! Evaluation mutates trigger bookkeeping in memory only; persisting the
//! rule set is an explicit, separate operation.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Mutex;
use uuid::Uuid;

use crate::decision::{ActionSpec, ApprovalStatus, ContextSnapshot, Decision, DecisionType};
use crate::rules::{self, PolicyRule};

/// Confidence assigned to decisions from auto-approving rules.
const AUTO_APPROVE_CONFIDENCE: f64 = 0.8;
/// Confidence assigned to decisions requiring manual review.
const MANUAL_CONFIDENCE: f64 = 0.6;

/// Rule-based policy engine for automated decision making.
pub struct PolicyEngine {
    rules: Mutex<Vec<PolicyRule>>,
    rules_path: Option<PathBuf>,
}

impl PolicyEngine {
    /// Create an engine over an explicit rule set (no file backing).
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self {
            rules: Mutex::new(rules),
            rules_path: None,
        }
    }

    /// Create an engine loading rules from a file, falling back to the
    /// built-in defaults when the file is absent or malformed.
    pub fn from_file(path: PathBuf) -> Self {
        let rules = rules::load_rules(&path);
        tracing::info!(path = %path.display(), count = rules.len(), "Loaded policy rules");
        Self {
            rules: Mutex::new(rules),
            rules_path: Some(path),
        }
    }

    /// Evaluate all enabled rules against the context.
    ///
    /// Returns decisions ordered by confidence descending; equal-confidence
    /// decisions order by rule priority descending, then rule id. Trigger
    /// statistics are advanced on every match. Nothing here touches disk.
    pub fn evaluate(&self, context: &ContextSnapshot) -> Vec<Decision> {
        let mut rules = self.rules.lock().expect("policy rules lock poisoned");
        let mut matched: Vec<(i32, String, Decision)> = Vec::new();

        for rule in rules.iter_mut() {
            if !rule.enabled {
                continue;
            }
            if !rule_matches(rule, context) {
                continue;
            }

            rule.last_triggered = Some(Utc::now());
            rule.trigger_count += 1;

            let decision = decision_from_rule(rule);
            tracing::debug!(
                rule_id = %rule.id,
                decision_id = %decision.id,
                auto_approve = rule.auto_approve,
                "Rule triggered"
            );
            matched.push((rule.priority, rule.id.clone(), decision));
        }

        // Confidence descending, then rule priority descending, then rule id
        matched.sort_by(|(pa, ia, da), (pb, ib, db)| {
            db.confidence
                .partial_cmp(&da.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| pb.cmp(pa))
                .then_with(|| ia.cmp(ib))
        });

        matched.into_iter().map(|(_, _, d)| d).collect()
    }

    /// Disable a rule without deleting it. Returns false if unknown.
    pub fn disable(&self, rule_id: &str) -> bool {
        let mut rules = self.rules.lock().expect("policy rules lock poisoned");
        match rules.iter_mut().find(|r| r.id == rule_id) {
            Some(rule) => {
                rule.enabled = false;
                tracing::info!(rule_id = %rule_id, "Disabled policy rule");
                true
            }
            None => false,
        }
    }

    /// Snapshot of the current rule set, trigger statistics included.
    pub fn rules(&self) -> Vec<PolicyRule> {
        self.rules.lock().expect("policy rules lock poisoned").clone()
    }

    /// Persist the current rule set (including trigger statistics) to the
    /// backing file, if one was configured.
    pub fn save(&self) -> anyhow::Result<()> {
        let Some(path) = &self.rules_path else {
            return Ok(());
        };
        let rules = self.rules.lock().expect("policy rules lock poisoned");
        rules::save_rules(path, &rules)
    }
}

/// Check whether a rule's conditions match the context.
///
/// OR semantics across the conditions present on the rule; a missing
/// context field makes that condition non-matching; a rule with no
/// conditions never matches.
fn rule_matches(rule: &PolicyRule, context: &ContextSnapshot) -> bool {
    let conditions = &rule.conditions;

    if let (Some(threshold), Some(metric)) = (conditions.metric_threshold, context.get_f64("metric"))
    {
        if metric < threshold {
            return true;
        }
    }

    if let (Some(threshold), Some(trend)) =
        (conditions.trend_threshold, context.get_f64("trend_score"))
    {
        if trend >= threshold {
            return true;
        }
    }

    if let (Some(threshold), Some(score)) = (conditions.score_threshold, context.get_f64("score")) {
        if score < threshold {
            return true;
        }
    }

    false
}

/// Build a decision from a triggered rule.
fn decision_from_rule(rule: &PolicyRule) -> Decision {
    let suffix = Uuid::new_v4().simple().to_string();
    Decision {
        id: format!("{}-{}", rule.id, &suffix[..8]),
        decision_type: decision_type_for_rule(rule),
        description: rule.description.clone(),
        rationale: format!("Rule '{}' triggered based on current context", rule.name),
        proposed_actions: rule.actions.clone(),
        expected_outcome: format!("Execute actions defined in rule '{}'", rule.name),
        risk_assessment: "Standard risk assessment for automated rule".into(),
        confidence: if rule.auto_approve {
            AUTO_APPROVE_CONFIDENCE
        } else {
            MANUAL_CONFIDENCE
        },
        requires_approval: !rule.auto_approve,
        approval_status: if rule.auto_approve {
            ApprovalStatus::AutoApproved
        } else {
            ApprovalStatus::Pending
        },
        created_at: Utc::now(),
        approved_at: None,
        approved_by: None,
        executed_at: None,
        outcome: None,
    }
}

/// Map a rule to the decision type it produces, by rule id keywords.
fn decision_type_for_rule(rule: &PolicyRule) -> DecisionType {
    let id = rule.id.to_lowercase();
    if id.contains("performance") || id.contains("metric") {
        DecisionType::ChannelInvestment
    } else if id.contains("trend") {
        DecisionType::TrendResponse
    } else if id.contains("retire") || id.contains("retirement") {
        DecisionType::ChannelInvestment
    } else if id.contains("budget") {
        DecisionType::BudgetAllocation
    } else if id.contains("tool") {
        DecisionType::ToolSwitch
    } else if id.contains("risk") {
        DecisionType::RiskMitigation
    } else {
        DecisionType::ContentSchedule
    }
}
