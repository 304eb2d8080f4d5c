//! Plan generator.
//!
//! Builds a chain-of-thought planning prompt, consults the reasoning
//! provider, and parses the structured reply. Every failure degrades into
//! a plan with a documented confidence level; this component never raises
//! past its boundary:
//!
//! - no provider configured or reachable → deterministic fallback (0.6)
//! - reply unparseable → degraded empty plan (0.0), logged as warning
//! - any other provider error → minimal fallback (0.3)

use std::sync::Arc;

use crate::plan::{Plan, PlanningContext};
use crate::provider::ReasoningProvider;

const SYSTEM_PROMPT: &str =
    "You are the strategic planning engine of an autonomous content-operations controller. \
     Respond with a single JSON object only.";

/// Generates structured plans by consulting a reasoning provider.
pub struct PlanGenerator {
    provider: Option<Arc<dyn ReasoningProvider>>,
}

impl PlanGenerator {
    /// Create a generator. With no provider, every plan is the
    /// deterministic fallback.
    pub fn new(provider: Option<Arc<dyn ReasoningProvider>>) -> Self {
        Self { provider }
    }

    /// Generate a plan for the goal in the given context.
    pub async fn generate_plan(&self, context: &PlanningContext, goal: &str) -> Plan {
        let Some(provider) = &self.provider else {
            tracing::debug!("No reasoning provider configured, using fallback plan");
            return Plan::fallback();
        };

        let prompt = build_prompt(context, goal);

        let response = match provider.complete(Some(SYSTEM_PROMPT), &prompt).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(provider = provider.name(), error = %e, "Planning call failed");
                return Plan::minimal();
            }
        };

        match Plan::parse(&response) {
            Ok(plan) => {
                tracing::info!(
                    confidence = plan.confidence,
                    actions = plan.recommended_actions.len(),
                    "Generated plan"
                );
                plan
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse planning response as JSON");
                Plan::degraded()
            }
        }
    }
}

/// Build the chain-of-thought planning prompt.
fn build_prompt(context: &PlanningContext, goal: &str) -> String {
    format!(
        r#"Your goal is to create a detailed plan to achieve: {goal}

Current Context:
- Metrics: {metrics}
- Historical Performance: {historical}
- External Factors: {external}
- Constraints: {constraints}
- Goals: {goals}

Please think through this step by step:

1. ANALYZE the current situation and identify key challenges/opportunities
2. IDENTIFY potential strategies and their trade-offs
3. RECOMMEND specific actions with timelines
4. ASSESS risks and mitigation strategies
5. DEFINE success metrics

Respond in JSON format:
{{
    "analysis": "Step-by-step analysis of the situation",
    "strategies": ["strategy1", "strategy2"],
    "recommended_actions": [
        {{
            "action": "description",
            "timeline": "when to execute",
            "priority": "high/medium/low",
            "expected_impact": "description"
        }}
    ],
    "risks": [
        {{
            "risk": "description",
            "probability": "high/medium/low",
            "mitigation": "how to address"
        }}
    ],
    "success_metrics": ["metric1", "metric2"],
    "confidence": 0.85
}}"#,
        goal = goal,
        metrics = serde_json::to_string_pretty(&context.current_metrics).unwrap_or_default(),
        historical = serde_json::to_string_pretty(&context.historical_data).unwrap_or_default(),
        external = serde_json::to_string_pretty(&context.external_factors).unwrap_or_default(),
        constraints = serde_json::to_string_pretty(&context.constraints).unwrap_or_default(),
        goals = serde_json::to_string_pretty(&context.goals).unwrap_or_default(),
    )
}
