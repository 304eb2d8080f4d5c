//! Planning orchestrator.
//!
//! Merges the generated plan with policy-engine decisions into one
//! strategic plan. Every decision is appended to the decision log before
//! the combined plan is returned — this is the sole automated write path
//! into the log. Auto-approved decisions additionally have their actions
//! submitted to the task registry.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use pilot_policy::{ActionSpec, ApprovalStatus, Decision, DecisionLog, PolicyEngine};
use pilot_scheduler::{ActionKind, NewTask, TaskPriority, TaskRegistry};

use crate::generator::PlanGenerator;
use crate::plan::{Plan, PlanningContext};

/// A generated plan merged with the decisions rules produced for the same
/// context.
#[derive(Debug, Clone, Serialize)]
pub struct CombinedPlan {
    /// The collaborator-generated (or fallback) plan
    pub plan: Plan,
    /// Every decision the policy engine produced, highest confidence first
    pub rule_decisions: Vec<Decision>,
    /// The plan's recommended actions, for operator review
    pub recommended_actions: Vec<crate::plan::RecommendedAction>,
    /// Action lists of auto-approved decisions (already submitted as tasks)
    pub automated_actions: Vec<Vec<ActionSpec>>,
    /// Decisions awaiting operator approval
    pub pending_approvals: Vec<Decision>,
    /// When the combined plan was assembled
    pub generated_at: DateTime<Utc>,
}

/// Coordinates the plan generator, the policy engine, the decision log,
/// and the task registry.
pub struct PlanningOrchestrator {
    generator: PlanGenerator,
    policy: Arc<PolicyEngine>,
    log: Arc<DecisionLog>,
    registry: Arc<TaskRegistry>,
}

impl PlanningOrchestrator {
    /// Create an orchestrator over explicit store handles.
    pub fn new(
        generator: PlanGenerator,
        policy: Arc<PolicyEngine>,
        log: Arc<DecisionLog>,
        registry: Arc<TaskRegistry>,
    ) -> Self {
        Self {
            generator,
            policy,
            log,
            registry,
        }
    }

    /// Generate a comprehensive strategic plan for the goal.
    pub async fn generate_strategic_plan(
        &self,
        context: &PlanningContext,
        goal: &str,
    ) -> CombinedPlan {
        let plan = self.generator.generate_plan(context, goal).await;

        let rule_decisions = self.policy.evaluate(&context.snapshot());

        // Log every decision before returning the combined plan
        for decision in &rule_decisions {
            self.log.log_decision(decision.clone());
        }

        // Auto-approved decisions skip the gateway: their actions become
        // high-priority tasks right away
        let mut automated_actions = Vec::new();
        for decision in rule_decisions
            .iter()
            .filter(|d| d.approval_status == ApprovalStatus::AutoApproved)
        {
            let task_ids = self.submit_decision_actions(decision);
            tracing::info!(
                decision_id = %decision.id,
                tasks = task_ids.len(),
                "Submitted tasks for auto-approved decision"
            );
            automated_actions.push(decision.proposed_actions.clone());
        }

        let pending_approvals: Vec<Decision> = rule_decisions
            .iter()
            .filter(|d| d.approval_status == ApprovalStatus::Pending)
            .cloned()
            .collect();

        CombinedPlan {
            recommended_actions: plan.recommended_actions.clone(),
            plan,
            rule_decisions,
            automated_actions,
            pending_approvals,
            generated_at: Utc::now(),
        }
    }

    /// Submit a plan's recommended actions as tasks, inferring an action
    /// kind from each action's text and mapping its priority label.
    /// Returns the submitted task ids.
    pub fn schedule_recommendations(&self, plan: &Plan) -> Vec<String> {
        let mut task_ids = Vec::new();
        for action in &plan.recommended_actions {
            let kind = ActionKind::infer(&action.action);
            let new_task = NewTask::new(kind, action.action.clone())
                .with_priority(TaskPriority::from_label(&action.priority))
                .with_param("action", json!(action.action))
                .with_param("timeline", json!(action.timeline))
                .with_param("expected_impact", json!(action.expected_impact));
            task_ids.push(self.registry.submit(new_task));
        }
        tracing::info!(count = task_ids.len(), "Scheduled tasks from plan recommendations");
        task_ids
    }

    /// Convert a decision's proposed actions into high-priority tasks.
    /// Unknown action types are logged and skipped.
    fn submit_decision_actions(&self, decision: &Decision) -> Vec<String> {
        let mut task_ids = Vec::new();
        for spec in &decision.proposed_actions {
            match NewTask::from_action_spec(spec, TaskPriority::High, Some(&decision.id)) {
                Some(new_task) => task_ids.push(self.registry.submit(new_task)),
                None => {
                    tracing::warn!(
                        decision_id = %decision.id,
                        action_type = %spec.action_type,
                        "Skipping action with unknown type"
                    );
                }
            }
        }
        task_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::RecommendedAction;
    use pilot_policy::rules::default_rules;
    use pilot_scheduler::TaskStatus;
    use serde_json::json;

    fn orchestrator() -> (PlanningOrchestrator, Arc<DecisionLog>, Arc<TaskRegistry>) {
        let policy = Arc::new(PolicyEngine::new(default_rules()));
        let log = Arc::new(DecisionLog::in_memory());
        let registry = Arc::new(TaskRegistry::new());
        let orchestrator = PlanningOrchestrator::new(
            PlanGenerator::new(None),
            policy,
            log.clone(),
            registry.clone(),
        );
        (orchestrator, log, registry)
    }

    fn low_metric_context() -> PlanningContext {
        let mut context = PlanningContext::default();
        context.current_metrics.insert("metric".into(), json!(3.0));
        context
    }

    #[tokio::test]
    async fn test_every_decision_is_logged() {
        let (orchestrator, log, _registry) = orchestrator();

        let combined = orchestrator
            .generate_strategic_plan(&low_metric_context(), "recover the metric")
            .await;

        assert_eq!(combined.rule_decisions.len(), 1);
        assert_eq!(log.len(), 1);
        assert_eq!(log.get(&combined.rule_decisions[0].id).unwrap().id, combined.rule_decisions[0].id);
    }

    #[tokio::test]
    async fn test_auto_approved_decisions_become_high_priority_tasks() {
        let (orchestrator, _log, registry) = orchestrator();

        let combined = orchestrator
            .generate_strategic_plan(&low_metric_context(), "recover the metric")
            .await;

        // The performance-drop rule is auto-approving with two actions
        assert_eq!(combined.automated_actions.len(), 1);
        assert!(combined.pending_approvals.is_empty());

        let pending = registry.pending();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|t| t.priority == TaskPriority::High));
        assert!(pending.iter().all(|t| t.status == TaskStatus::Pending));
        assert!(pending
            .iter()
            .all(|t| t.decision_id.as_deref() == Some(combined.rule_decisions[0].id.as_str())));
    }

    #[tokio::test]
    async fn test_pending_decisions_create_no_tasks() {
        let (orchestrator, log, registry) = orchestrator();

        // Low composite score fires the manual retirement rule only
        let mut context = PlanningContext::default();
        context.current_metrics.insert("score".into(), json!(10.0));

        let combined = orchestrator
            .generate_strategic_plan(&context, "prune weak entities")
            .await;

        assert_eq!(combined.pending_approvals.len(), 1);
        assert!(combined.automated_actions.is_empty());
        assert!(registry.pending().is_empty());
        assert_eq!(
            log.get_by_status(ApprovalStatus::Pending, 10).len(),
            1
        );
    }

    #[tokio::test]
    async fn test_fallback_plan_carried_into_combined_plan() {
        let (orchestrator, _log, _registry) = orchestrator();
        let combined = orchestrator
            .generate_strategic_plan(&PlanningContext::default(), "steady state")
            .await;

        // No provider configured: deterministic fallback
        assert!((combined.plan.confidence - 0.6).abs() < f64::EPSILON);
        assert_eq!(
            combined.recommended_actions.len(),
            combined.plan.recommended_actions.len()
        );
        assert!(combined.rule_decisions.is_empty());
    }

    #[tokio::test]
    async fn test_schedule_recommendations_maps_priority_and_kind() {
        let (orchestrator, _log, registry) = orchestrator();

        let mut plan = Plan::degraded();
        plan.recommended_actions = vec![
            RecommendedAction {
                action: "Create a video about the trending topic".into(),
                timeline: "4h".into(),
                priority: "high".into(),
                expected_impact: "Capture trend traffic".into(),
            },
            RecommendedAction {
                action: "Review the weekly budget split".into(),
                timeline: "this week".into(),
                priority: "low".into(),
                expected_impact: "Better allocation".into(),
            },
        ];

        let ids = orchestrator.schedule_recommendations(&plan);
        assert_eq!(ids.len(), 2);

        let first = registry.get(&ids[0]).unwrap();
        assert_eq!(first.action, ActionKind::CreateContent);
        assert_eq!(first.priority, TaskPriority::High);

        let second = registry.get(&ids[1]).unwrap();
        assert_eq!(second.action, ActionKind::BudgetAllocation);
        assert_eq!(second.priority, TaskPriority::Low);
    }
}
