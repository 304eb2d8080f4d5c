//! Approval gateway.
//!
//! Exposes pending decisions for operator accept/reject. On approval, the
//! decision's proposed actions are converted into high-priority tasks and
//! submitted to the registry — atomically with the state transition from
//! the caller's perspective: tasks are only created when the
//! pending→approved transition succeeded, and a failed transition creates
//! nothing.
//!
//! Races (unknown id, already-decided) are ordinary outcomes expressed as
//! variants, not errors.

use std::sync::Arc;

use pilot_policy::{ApprovalStatus, Decision, DecisionLog, DecisionUpdate};
use pilot_scheduler::{DecisionResolution, NewTask, NotificationSink, TaskPriority, TaskRegistry};

/// Result of an approve or reject call.
#[derive(Debug, Clone)]
pub enum ApprovalOutcome {
    /// The decision was approved; its actions were submitted as tasks.
    Approved { task_ids: Vec<String> },
    /// The decision was rejected; no tasks were created.
    Rejected,
    /// No decision with that id exists.
    NotFound,
    /// The decision exists but is not pending.
    WrongState(ApprovalStatus),
}

impl ApprovalOutcome {
    /// Whether the call changed the decision.
    pub fn is_applied(&self) -> bool {
        matches!(
            self,
            ApprovalOutcome::Approved { .. } | ApprovalOutcome::Rejected
        )
    }
}

/// Human approval workflow over the decision log and task registry.
pub struct ApprovalGateway {
    log: Arc<DecisionLog>,
    registry: Arc<TaskRegistry>,
    notifier: Arc<dyn NotificationSink>,
}

impl ApprovalGateway {
    /// Create a gateway over explicit store handles.
    pub fn new(
        log: Arc<DecisionLog>,
        registry: Arc<TaskRegistry>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            log,
            registry,
            notifier,
        }
    }

    /// Decisions awaiting operator review, newest first.
    pub fn list_pending(&self) -> Vec<Decision> {
        self.log.get_by_status(ApprovalStatus::Pending, usize::MAX)
    }

    /// Approve a pending decision and submit its actions as tasks.
    pub async fn approve(&self, decision_id: &str, approver: &str) -> ApprovalOutcome {
        match self.log.approve_pending(decision_id, approver) {
            DecisionUpdate::Updated(decision) => {
                let task_ids = self.submit_actions(&decision);
                tracing::info!(
                    decision_id = %decision_id,
                    approver = %approver,
                    tasks = task_ids.len(),
                    "Decision approved"
                );
                self.notifier
                    .decision_resolved(&DecisionResolution {
                        decision_id: decision_id.to_string(),
                        status: "approved".into(),
                    })
                    .await;
                ApprovalOutcome::Approved { task_ids }
            }
            DecisionUpdate::NotFound => ApprovalOutcome::NotFound,
            DecisionUpdate::WrongState(status) => {
                tracing::debug!(
                    decision_id = %decision_id,
                    status = status.status_name(),
                    "Approve on non-pending decision"
                );
                ApprovalOutcome::WrongState(status)
            }
        }
    }

    /// Reject a pending decision, storing the reason. No tasks are created.
    pub async fn reject(
        &self,
        decision_id: &str,
        approver: &str,
        reason: &str,
    ) -> ApprovalOutcome {
        match self.log.reject_pending(decision_id, approver, reason) {
            DecisionUpdate::Updated(_) => {
                tracing::info!(
                    decision_id = %decision_id,
                    approver = %approver,
                    reason = %reason,
                    "Decision rejected"
                );
                self.notifier
                    .decision_resolved(&DecisionResolution {
                        decision_id: decision_id.to_string(),
                        status: "rejected".into(),
                    })
                    .await;
                ApprovalOutcome::Rejected
            }
            DecisionUpdate::NotFound => ApprovalOutcome::NotFound,
            DecisionUpdate::WrongState(status) => ApprovalOutcome::WrongState(status),
        }
    }

    /// Convert an approved decision's actions into high-priority tasks.
    /// Actions with unknown types are logged and skipped.
    fn submit_actions(&self, decision: &Decision) -> Vec<String> {
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
