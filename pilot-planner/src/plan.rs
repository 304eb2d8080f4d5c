//! Plan data model.
//!
//! A plan is the structured recommendation produced by the reasoning
//! collaborator: analysis, candidate strategies, concrete recommended
//! actions, risks with mitigations, and success metrics, plus an overall
//! confidence. Degraded plans exist for every collaborator failure mode so
//! planning never raises past its boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use pilot_policy::ContextSnapshot;

/// A concrete action recommended by a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedAction {
    /// What to do
    pub action: String,
    /// When to do it (free-form: "immediate", "within 24h", ...)
    #[serde(default)]
    pub timeline: String,
    /// Priority label: "critical", "high", "medium", or "low"
    #[serde(default)]
    pub priority: String,
    /// Expected impact of the action
    #[serde(default)]
    pub expected_impact: String,
}

/// A risk identified by a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskItem {
    /// Risk description
    pub risk: String,
    /// Probability label: "high", "medium", or "low"
    #[serde(default)]
    pub probability: String,
    /// How to address the risk
    #[serde(default)]
    pub mitigation: String,
}

/// A structured recommendation from the reasoning collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Step-by-step analysis of the situation
    #[serde(default)]
    pub analysis: String,
    /// Candidate strategies considered
    #[serde(default)]
    pub strategies: Vec<String>,
    /// Concrete actions with timelines and priorities
    #[serde(default)]
    pub recommended_actions: Vec<RecommendedAction>,
    /// Identified risks and mitigations
    #[serde(default)]
    pub risks: Vec<RiskItem>,
    /// Metrics that define success
    #[serde(default)]
    pub success_metrics: Vec<String>,
    /// Overall confidence in [0, 1]
    #[serde(default)]
    pub confidence: f64,
    /// When the plan was generated
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
}

impl Plan {
    /// Deterministic fallback used when no reasoning collaborator is
    /// configured or reachable.
    pub fn fallback() -> Self {
        Self {
            analysis: "Using rule-based planning; reasoning collaborator unavailable".into(),
            strategies: vec!["Standard optimization".into(), "Performance monitoring".into()],
            recommended_actions: vec![RecommendedAction {
                action: "Monitor key metrics for 24 hours".into(),
                timeline: "immediate".into(),
                priority: "medium".into(),
                expected_impact: "Gather baseline data".into(),
            }],
            risks: vec![RiskItem {
                risk: "Limited optimization potential".into(),
                probability: "low".into(),
                mitigation: "Manual review required".into(),
            }],
            success_metrics: vec!["Metric stability".into(), "Performance baseline".into()],
            confidence: 0.6,
            generated_at: Some(Utc::now()),
        }
    }

    /// Degraded empty plan used when the collaborator reply could not be
    /// parsed.
    pub fn degraded() -> Self {
        Self {
            analysis: "Failed to parse planning response".into(),
            strategies: Vec::new(),
            recommended_actions: Vec::new(),
            risks: Vec::new(),
            success_metrics: Vec::new(),
            confidence: 0.0,
            generated_at: Some(Utc::now()),
        }
    }

    /// Minimal fallback used for any other planning failure.
    pub fn minimal() -> Self {
        Self {
            analysis: "Fallback plan generated due to planning failure".into(),
            strategies: vec!["Monitor and wait".into()],
            recommended_actions: vec![RecommendedAction {
                action: "Continue monitoring current performance".into(),
                timeline: "ongoing".into(),
                priority: "medium".into(),
                expected_impact: "Maintain current operations".into(),
            }],
            risks: vec![RiskItem {
                risk: "Missed optimization opportunities".into(),
                probability: "high".into(),
                mitigation: "Manual intervention required".into(),
            }],
            success_metrics: vec!["System stability".into()],
            confidence: 0.3,
            generated_at: Some(Utc::now()),
        }
    }

    /// Parse a collaborator reply into a plan.
    ///
    /// Replies are JSON, possibly wrapped in a markdown code fence.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let mut plan: Plan = serde_json::from_str(strip_code_fences(raw))?;
        if plan.generated_at.is_none() {
            plan.generated_at = Some(Utc::now());
        }
        Ok(plan)
    }
}

/// Strip a surrounding markdown code fence, if present.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the fence line
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches(['\r', '\n']);
    rest.strip_suffix("```").map_or(rest, str::trim).trim()
}

/// Context for planning decisions.
///
/// The maps are free-form; the upstream scoring collaborator supplies the
/// fields rule predicates consume (`metric`, `trend_score`, `score`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanningContext {
    /// Current metric values
    #[serde(default)]
    pub current_metrics: Map<String, Value>,
    /// Historical performance data
    #[serde(default)]
    pub historical_data: Map<String, Value>,
    /// External factors (trends, seasonality, competition)
    #[serde(default)]
    pub external_factors: Map<String, Value>,
    /// Operating constraints (budget caps, rate limits)
    #[serde(default)]
    pub constraints: Map<String, Value>,
    /// Goals the plan should advance
    #[serde(default)]
    pub goals: Map<String, Value>,
}

impl PlanningContext {
    /// Flatten the context into the snapshot rule predicates consume.
    ///
    /// Metric fields and external factors are merged; external factors win
    /// on key collisions, matching how the scoring collaborator layers
    /// them.
    pub fn snapshot(&self) -> ContextSnapshot {
        let mut snapshot = ContextSnapshot::new();
        snapshot.extend(&self.current_metrics);
        snapshot.extend(&self.external_factors);
        snapshot
    }
}
