//! Task registry.
//!
//! Holds all tasks behind a single mutex. Selection (dependency gating,
//! time gating, priority ordering) and the PENDING→RUNNING transition
//! happen inside one critical section, so two concurrent scheduling passes
//! can never dispatch the same task twice.
//!
//! Persistence is a simple JSON snapshot written atomically (temporary
//! file, then rename). The in-memory registry is authoritative; a failed
//! snapshot write is logged and the process continues.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use crate::task::{NewTask, Task, TaskStatus};

/// What happened to a task after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Returned to PENDING; will be re-selected once the backoff elapses.
    Requeued { next_attempt_at: DateTime<Utc> },
    /// Retry budget exhausted (or the failure was fatal); the task is FAILED.
    Terminal,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    tasks: Vec<Task>,
    next_seq: u64,
}

struct RegistryInner {
    tasks: HashMap<String, Task>,
    next_seq: u64,
}

/// Registry of all tasks, shared by the scheduler, the approval gateway,
/// and monitoring readers.
pub struct TaskRegistry {
    inner: Mutex<RegistryInner>,
    snapshot_path: Option<PathBuf>,
}

impl TaskRegistry {
    /// Create an in-memory registry with no snapshot backing.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                tasks: HashMap::new(),
                next_seq: 0,
            }),
            snapshot_path: None,
        }
    }

    /// Create a registry backed by a JSON snapshot file, loading any
    /// previous snapshot. Tasks left RUNNING by a crashed process are
    /// reset to PENDING for re-selection.
    pub fn with_snapshot(path: PathBuf) -> Self {
        let mut tasks = HashMap::new();
        let mut next_seq = 0;

        if path.exists() {
            match fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|raw| serde_json::from_str::<Snapshot>(&raw).map_err(Into::into))
            {
                Ok(snapshot) => {
                    next_seq = snapshot.next_seq;
                    for mut task in snapshot.tasks {
                        if task.status == TaskStatus::Running {
                            tracing::warn!(task_id = %task.id, "Resetting interrupted task to pending");
                            task.status = TaskStatus::Pending;
                            task.started_at = None;
                        }
                        tasks.insert(task.id.clone(), task);
                    }
                    tracing::info!(path = %path.display(), count = tasks.len(), "Loaded task snapshot");
                }
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Failed to load task snapshot, starting empty");
                }
            }
        }

        Self {
            inner: Mutex::new(RegistryInner { tasks, next_seq }),
            snapshot_path: Some(path),
        }
    }

    /// Submit a new task; returns its id.
    pub fn submit(&self, new: NewTask) -> String {
        let now = Utc::now();
        let suffix = Uuid::new_v4().simple().to_string();
        let id = format!("task-{}", &suffix[..8]);

        let mut inner = self.inner.lock().expect("task registry lock poisoned");
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let task = Task {
            id: id.clone(),
            description: new.description,
            action: new.action,
            params: new.params,
            scheduled_time: new.scheduled_time.unwrap_or(now),
            priority: new.priority,
            status: TaskStatus::Pending,
            created_at: now,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            retry_count: 0,
            max_retries: new.max_retries,
            dependencies: new.dependencies.into_iter().collect(),
            decision_id: new.decision_id,
            seq,
        };

        tracing::info!(
            task_id = %id,
            action = %task.action,
            priority = ?task.priority,
            dependencies = task.dependencies.len(),
            "Scheduled task"
        );
        inner.tasks.insert(id.clone(), task);
        self.persist(&inner);
        id
    }

    /// Cancel a task. Only PENDING tasks can be cancelled; anything else is
    /// a no-op returning false.
    pub fn cancel(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().expect("task registry lock poisoned");
        let cancelled = match inner.tasks.get_mut(id) {
            Some(task) if task.status == TaskStatus::Pending => {
                task.status = TaskStatus::Cancelled;
                task.completed_at = Some(Utc::now());
                tracing::info!(task_id = %id, "Cancelled task");
                true
            }
            _ => false,
        };
        if cancelled {
            self.persist(&inner);
        }
        cancelled
    }

    /// Mark a task COMPLETED from outside the executor (operator fiat or an
    /// externally satisfied step). Terminal tasks are left untouched.
    pub fn complete(&self, id: &str, result: Value) -> bool {
        let mut inner = self.inner.lock().expect("task registry lock poisoned");
        let completed = match inner.tasks.get_mut(id) {
            Some(task) if !task.status.is_terminal() => {
                task.status = TaskStatus::Completed;
                task.result = Some(result);
                task.completed_at = Some(Utc::now());
                true
            }
            _ => false,
        };
        if completed {
            self.persist(&inner);
        }
        completed
    }

    /// Fetch a task by id.
    pub fn get(&self, id: &str) -> Option<Task> {
        let inner = self.inner.lock().expect("task registry lock poisoned");
        inner.tasks.get(id).cloned()
    }

    /// All PENDING tasks, arrival order.
    pub fn pending(&self) -> Vec<Task> {
        self.filtered(|t| t.status == TaskStatus::Pending)
    }

    /// All RUNNING tasks, arrival order.
    pub fn running(&self) -> Vec<Task> {
        self.filtered(|t| t.status == TaskStatus::Running)
    }

    /// Recently completed tasks, newest first.
    pub fn completed(&self, limit: usize) -> Vec<Task> {
        let inner = self.inner.lock().expect("task registry lock poisoned");
        let mut tasks: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Completed)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        tasks.truncate(limit);
        tasks
    }

    /// All tasks, arrival order.
    pub fn all(&self) -> Vec<Task> {
        self.filtered(|_| true)
    }

    fn filtered(&self, keep: impl Fn(&Task) -> bool) -> Vec<Task> {
        let inner = self.inner.lock().expect("task registry lock poisoned");
        let mut tasks: Vec<Task> = inner.tasks.values().filter(|t| keep(t)).cloned().collect();
        tasks.sort_by_key(|t| t.seq);
        tasks
    }

    /// Select every runnable task and mark it RUNNING, in dispatch order.
    ///
    /// A task is runnable iff it is PENDING, its scheduled time has been
    /// reached, and every dependency id names a COMPLETED task — unknown
    /// ids block, never silently skip. The ready set is stable-sorted by
    /// priority descending with arrival order breaking ties.
    pub fn claim_ready(&self, now: DateTime<Utc>) -> Vec<Task> {
        let mut inner = self.inner.lock().expect("task registry lock poisoned");

        let mut ready: Vec<(Reverse<crate::task::TaskPriority>, u64, String)> = inner
            .tasks
            .values()
            .filter(|task| {
                task.status == TaskStatus::Pending
                    && task.scheduled_time <= now
                    && dependencies_met(task, &inner.tasks)
            })
            .map(|task| (Reverse(task.priority), task.seq, task.id.clone()))
            .collect();
        ready.sort();

        let mut claimed = Vec::with_capacity(ready.len());
        for (_, _, id) in ready {
            let task = inner.tasks.get_mut(&id).expect("ready task must exist");
            task.status = TaskStatus::Running;
            task.started_at = Some(now);
            claimed.push(task.clone());
        }
        claimed
    }

    /// Record a successful attempt.
    pub fn record_success(&self, id: &str, result: Value) {
        let mut inner = self.inner.lock().expect("task registry lock poisoned");
        if let Some(task) = inner.tasks.get_mut(id) {
            task.status = TaskStatus::Completed;
            task.result = Some(result);
            task.completed_at = Some(Utc::now());
            tracing::info!(task_id = %id, retry_count = task.retry_count, "Task completed");
        }
    }

    /// Record a failed attempt.
    ///
    /// Retryable failures under budget return the task to PENDING with an
    /// exponential backoff (`backoff_base * 2^(retry_count-1)`), letting
    /// the ordinary scheduling pass re-select it. Anything else is
    /// terminal FAILED.
    pub fn record_failure(
        &self,
        id: &str,
        error: &str,
        retryable: bool,
        backoff_base: Duration,
    ) -> FailureDisposition {
        let mut inner = self.inner.lock().expect("task registry lock poisoned");
        let Some(task) = inner.tasks.get_mut(id) else {
            tracing::warn!(task_id = %id, "Recording failure for unknown task");
            return FailureDisposition::Terminal;
        };

        if retryable && task.retry_count < task.max_retries {
            task.retry_count += 1;
            let delay = backoff_base.saturating_mul(1u32 << (task.retry_count - 1).min(16));
            let next_attempt_at = Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::hours(1));
            task.status = TaskStatus::Pending;
            task.started_at = None;
            task.scheduled_time = next_attempt_at;
            task.error = Some(error.to_string());
            tracing::warn!(
                task_id = %id,
                retry_count = task.retry_count,
                max_retries = task.max_retries,
                next_attempt_at = %next_attempt_at.to_rfc3339(),
                error = %error,
                "Task attempt failed, requeued with backoff"
            );
            FailureDisposition::Requeued { next_attempt_at }
        } else {
            task.status = TaskStatus::Failed;
            task.error = Some(error.to_string());
            task.completed_at = Some(Utc::now());
            tracing::error!(
                task_id = %id,
                retry_count = task.retry_count,
                error = %error,
                "Task failed terminally"
            );
            FailureDisposition::Terminal
        }
    }

    /// Write the snapshot now. Failures are logged; memory stays
    /// authoritative until the next successful write.
    pub fn save_snapshot(&self) {
        let inner = self.inner.lock().expect("task registry lock poisoned");
        self.persist(&inner);
    }

    fn persist(&self, inner: &RegistryInner) {
        let Some(path) = &self.snapshot_path else {
            return;
        };
        let mut tasks: Vec<Task> = inner.tasks.values().cloned().collect();
        tasks.sort_by_key(|t| t.seq);
        let snapshot = Snapshot {
            tasks,
            next_seq: inner.next_seq,
        };

        let result = (|| -> anyhow::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let raw = serde_json::to_string_pretty(&snapshot)?;
            let tmp_path = path.with_extension("tmp");
            fs::write(&tmp_path, raw)?;
            fs::rename(&tmp_path, path)?;
            Ok(())
        })();

        if let Err(e) = result {
            tracing::error!(path = %path.display(), error = %e, "Failed to write task snapshot");
        }
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Every dependency id must name a COMPLETED task; unknown ids block.
fn dependencies_met(task: &Task, tasks: &HashMap<String, Task>) -> bool {
    task.dependencies.iter().all(|dep_id| {
        tasks
            .get(dep_id)
            .is_some_and(|dep| dep.status == TaskStatus::Completed)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;
    use crate::task::TaskPriority;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;
    use tempfile::TempDir;

    fn immediate(action: ActionKind, priority: TaskPriority) -> NewTask {
        NewTask::new(action, "test task").with_priority(priority)
    }

    #[test]
    fn test_submit_and_get() {
        let registry = TaskRegistry::new();
        let id = registry.submit(immediate(ActionKind::SendAlert, TaskPriority::Medium));

        let task = registry.get(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.action, ActionKind::SendAlert);
        assert_eq!(task.retry_count, 0);
        assert_eq!(task.max_retries, 3);
    }

    #[test]
    fn test_future_task_not_claimed() {
        let registry = TaskRegistry::new();
        registry.submit(
            immediate(ActionKind::SendAlert, TaskPriority::Medium)
                .with_scheduled_time(Utc::now() + ChronoDuration::hours(1)),
        );
        assert!(registry.claim_ready(Utc::now()).is_empty());
    }

    #[test]
    fn test_dependency_blocks_until_completed() {
        let registry = TaskRegistry::new();
        // t1 is scheduled in the future so it stays pending
        let t1 = registry.submit(
            immediate(ActionKind::AnalyzeMetrics, TaskPriority::Medium)
                .with_scheduled_time(Utc::now() + ChronoDuration::hours(1)),
        );
        let t2 = registry.submit(
            immediate(ActionKind::CreateContent, TaskPriority::Medium)
                .with_dependencies(vec![t1.clone()]),
        );

        // t1 pending: a pass must not select t2
        let claimed = registry.claim_ready(Utc::now());
        assert!(claimed.iter().all(|t| t.id != t2));

        // After t1 is externally marked completed, the next pass selects t2
        assert!(registry.complete(&t1, json!({"done": true})));
        let claimed: Vec<String> = registry
            .claim_ready(Utc::now())
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(claimed, vec![t2]);
    }

    #[test]
    fn test_unknown_dependency_blocks() {
        let registry = TaskRegistry::new();
        let id = registry.submit(
            immediate(ActionKind::SendAlert, TaskPriority::High)
                .with_dependencies(vec!["task-nonexistent".into()]),
        );
        assert!(registry.claim_ready(Utc::now()).is_empty());
        assert_eq!(registry.get(&id).unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn test_priority_ordering_with_stable_ties() {
        let registry = TaskRegistry::new();
        let low = registry.submit(immediate(ActionKind::SendAlert, TaskPriority::Low));
        let high_first = registry.submit(immediate(ActionKind::SendAlert, TaskPriority::High));
        let high_second = registry.submit(immediate(ActionKind::SendAlert, TaskPriority::High));
        let critical = registry.submit(immediate(ActionKind::SendAlert, TaskPriority::Critical));

        let order: Vec<String> = registry
            .claim_ready(Utc::now())
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(order, vec![critical, high_first, high_second, low]);
    }

    #[test]
    fn test_no_double_claim() {
        let registry = TaskRegistry::new();
        registry.submit(immediate(ActionKind::SendAlert, TaskPriority::Medium));

        let first = registry.claim_ready(Utc::now());
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].status, TaskStatus::Running);

        // A second concurrent pass finds nothing to claim
        assert!(registry.claim_ready(Utc::now()).is_empty());
    }

    #[test]
    fn test_cancel_only_pending() {
        let registry = TaskRegistry::new();
        let id = registry.submit(immediate(ActionKind::SendAlert, TaskPriority::Medium));
        registry.claim_ready(Utc::now());

        // Running tasks cannot be cancelled
        assert!(!registry.cancel(&id));

        let pending = registry.submit(immediate(ActionKind::SendAlert, TaskPriority::Medium));
        assert!(registry.cancel(&pending));
        assert_eq!(registry.get(&pending).unwrap().status, TaskStatus::Cancelled);
        // A second cancel is a no-op
        assert!(!registry.cancel(&pending));
    }

    #[test]
    fn test_failure_requeues_with_backoff() {
        let registry = TaskRegistry::new();
        let id = registry.submit(immediate(ActionKind::CreateContent, TaskPriority::Medium));
        registry.claim_ready(Utc::now());

        let disposition =
            registry.record_failure(&id, "connection reset", true, Duration::from_secs(30));
        let FailureDisposition::Requeued { next_attempt_at } = disposition else {
            panic!("expected requeue");
        };

        let task = registry.get(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 1);
        assert_eq!(task.scheduled_time, next_attempt_at);
        assert!(task.scheduled_time > Utc::now() + ChronoDuration::seconds(20));

        // Not ready again until the backoff elapses
        assert!(registry.claim_ready(Utc::now()).is_empty());
    }

    #[test]
    fn test_retry_budget_bounds_attempts() {
        let registry = TaskRegistry::new();
        let id = registry.submit(
            immediate(ActionKind::CreateContent, TaskPriority::Medium).with_max_retries(2),
        );

        let mut attempts = 0;
        loop {
            let claimed = registry.claim_ready(Utc::now());
            if claimed.is_empty() {
                break;
            }
            attempts += 1;
            registry.record_failure(&id, "still broken", true, Duration::ZERO);
        }

        // max_retries + 1 total attempts, then terminal
        assert_eq!(attempts, 3);
        let task = registry.get(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.retry_count, 2);
        assert!(task.completed_at.is_some());
        assert_eq!(task.error.as_deref(), Some("still broken"));
    }

    #[test]
    fn test_fatal_failure_skips_retry_budget() {
        let registry = TaskRegistry::new();
        let id = registry.submit(immediate(ActionKind::ToolSwitch, TaskPriority::Medium));
        registry.claim_ready(Utc::now());

        let disposition =
            registry.record_failure(&id, "no handler registered", false, Duration::from_secs(30));
        assert_eq!(disposition, FailureDisposition::Terminal);

        let task = registry.get(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.retry_count, 0);
    }

    #[test]
    fn test_snapshot_roundtrip_resets_running() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tasks.json");

        let interrupted;
        let done;
        {
            let registry = TaskRegistry::with_snapshot(path.clone());
            interrupted = registry.submit(immediate(ActionKind::SendAlert, TaskPriority::High));
            done = registry.submit(immediate(ActionKind::AnalyzeMetrics, TaskPriority::Low));
            registry.claim_ready(Utc::now());
            registry.record_success(&done, json!({"ok": true}));
            // Simulate a crash mid-execution of `interrupted`
            registry.save_snapshot();
        }

        let reloaded = TaskRegistry::with_snapshot(path);
        let recovered = reloaded.get(&interrupted).unwrap();
        assert_eq!(recovered.status, TaskStatus::Pending);
        assert!(recovered.started_at.is_none());
        assert_eq!(reloaded.get(&done).unwrap().status, TaskStatus::Completed);

        // New submissions keep allocating fresh sequence numbers
        let next = reloaded.submit(immediate(ActionKind::SendAlert, TaskPriority::Low));
        assert!(reloaded.get(&next).unwrap().seq >= 2);
    }

    #[test]
    fn test_completed_view_newest_first() {
        let registry = TaskRegistry::new();
        let first = registry.submit(immediate(ActionKind::SendAlert, TaskPriority::Medium));
        let second = registry.submit(immediate(ActionKind::SendAlert, TaskPriority::Medium));
        registry.claim_ready(Utc::now());
        registry.record_success(&first, json!({}));
        std::thread::sleep(std::time::Duration::from_millis(5));
        registry.record_success(&second, json!({}));

        let completed = registry.completed(10);
        assert_eq!(completed.len(), 2);
        assert_eq!(completed[0].id, second);
        assert_eq!(completed[1].id, first);
    }
}
