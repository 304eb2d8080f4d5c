//! Task executor.
//!
//! Drives the scheduling pass: claims every runnable task from the
//! registry, dispatches each to its registered handler concurrently, and
//! records outcomes. Retry is not recursive — a failed attempt under
//! budget is rescheduled with exponential backoff and re-selected by a
//! later pass.
//!
//! Each handler invocation is wrapped in a per-action-kind timeout; a
//! timeout counts against the retry budget exactly like a handler error.

use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use pilot_policy::DecisionLog;

use crate::action::ActionKind;
use crate::handler::HandlerRegistry;
use crate::notify::{NotificationSink, TaskFailure};
use crate::registry::{FailureDisposition, TaskRegistry};
use crate::task::Task;

/// Executor tuning knobs.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Delay between periodic scheduling passes.
    pub interval: Duration,
    /// Base delay for exponential retry backoff.
    pub backoff_base: Duration,
    /// Timeout applied to handler invocations without a per-kind override.
    pub default_timeout: Duration,
    /// Per-action-kind timeout overrides.
    pub timeouts: HashMap<ActionKind, Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            backoff_base: Duration::from_secs(30),
            default_timeout: Duration::from_secs(120),
            timeouts: HashMap::new(),
        }
    }
}

#[derive(Clone)]
struct ExecutorCore {
    registry: Arc<TaskRegistry>,
    handlers: Arc<HandlerRegistry>,
    notifier: Arc<dyn NotificationSink>,
    decisions: Option<Arc<DecisionLog>>,
    config: Arc<ExecutorConfig>,
}

/// Executes tasks held by the registry.
pub struct TaskExecutor {
    core: ExecutorCore,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl TaskExecutor {
    /// Create an executor over a registry, handler set, and notifier.
    pub fn new(
        registry: Arc<TaskRegistry>,
        handlers: Arc<HandlerRegistry>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            core: ExecutorCore {
                registry,
                handlers,
                notifier,
                decisions: None,
                config: Arc::new(ExecutorConfig::default()),
            },
            shutdown_tx: None,
        }
    }

    /// Report task outcomes back to the decision log (for tasks that carry
    /// a decision id).
    pub fn with_decision_log(mut self, decisions: Arc<DecisionLog>) -> Self {
        self.core.decisions = Some(decisions);
        self
    }

    /// Override the executor configuration.
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.core.config = Arc::new(config);
        self
    }

    /// Run one scheduling pass: claim every runnable task, dispatch all of
    /// them concurrently, and wait for their outcomes. Returns the number
    /// of tasks dispatched.
    pub async fn run_pass(&self) -> usize {
        self.core.run_pass().await
    }

    /// Start the periodic scheduling loop.
    pub fn start(&mut self) {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        let core = self.core.clone();
        let interval = core.config.interval;
        tokio::spawn(async move {
            tracing::info!(interval_secs = interval.as_secs(), "Task executor loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Task executor shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        let dispatched = core.run_pass().await;
                        if dispatched > 0 {
                            tracing::debug!(dispatched, "Scheduling pass complete");
                        }
                    }
                }
            }
        });
    }

    /// Stop the periodic scheduling loop.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
    }
}

impl ExecutorCore {
    async fn run_pass(&self) -> usize {
        let claimed = self.registry.claim_ready(Utc::now());
        if claimed.is_empty() {
            return 0;
        }
        let count = claimed.len();

        // Dispatch is concurrent; a slow handler never delays the dispatch
        // of the next ready task. Only the claim above and the outcome
        // recording inside each execution are serialized.
        let mut handles = Vec::with_capacity(count);
        for task in claimed {
            let core = self.clone();
            handles.push(tokio::spawn(async move {
                core.execute_claimed(task).await;
            }));
        }
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Task execution panicked");
            }
        }

        self.registry.save_snapshot();
        count
    }

    async fn execute_claimed(&self, task: Task) {
        let Some(handler) = self.handlers.get(task.action) else {
            // Unregistered kind: fatal, never retried
            let error = format!("no handler registered for action '{}'", task.action);
            self.finish_failure(&task, &error, false).await;
            return;
        };

        let timeout = self.timeout_for(task.action);
        tracing::debug!(task_id = %task.id, action = %task.action, timeout_secs = timeout.as_secs(), "Executing task");

        match tokio::time::timeout(timeout, handler.execute(&task.params)).await {
            Ok(Ok(result)) => {
                self.registry.record_success(&task.id, result.clone());
                self.report_decision_outcome(&task, "completed", Some(result), None);
            }
            Ok(Err(e)) => {
                self.finish_failure(&task, &format!("{e:#}"), true).await;
            }
            Err(_) => {
                let error = format!("handler timed out after {}s", timeout.as_secs());
                self.finish_failure(&task, &error, true).await;
            }
        }
    }

    async fn finish_failure(&self, task: &Task, error: &str, retryable: bool) {
        let disposition =
            self.registry
                .record_failure(&task.id, error, retryable, self.config.backoff_base);
        if disposition == FailureDisposition::Terminal {
            self.notifier
                .task_failed(&TaskFailure {
                    task_id: task.id.clone(),
                    action_type: task.action.name().to_string(),
                    error: error.to_string(),
                })
                .await;
            self.report_decision_outcome(task, "failed", None, Some(error));
        }
    }

    fn report_decision_outcome(
        &self,
        task: &Task,
        status: &str,
        result: Option<Value>,
        error: Option<&str>,
    ) {
        let (Some(log), Some(decision_id)) = (&self.decisions, &task.decision_id) else {
            return;
        };
        let mut metrics = json!({
            "task_id": task.id,
            "status": status,
        });
        if let Some(result) = result {
            metrics["result"] = result;
        }
        if let Some(error) = error {
            metrics["error"] = json!(error);
        }
        if !log.update_outcome(decision_id, metrics) {
            tracing::warn!(
                task_id = %task.id,
                decision_id = %decision_id,
                "Task references an unknown decision"
            );
        }
    }

    fn timeout_for(&self, kind: ActionKind) -> Duration {
        self.config
            .timeouts
            .get(&kind)
            .copied()
            .unwrap_or(self.config.default_timeout)
    }
}
