//! Append-only decision log.
//!
//! The in-memory record is authoritative; every mutation is mirrored to a
//! sqlite table so the log survives restarts. A failed write is logged and
//! the in-memory state stands until the next successful write — a crash
//! immediately after can lose the latest increment, which is a documented
//! limitation rather than a masked one.
//!
//! All access goes through a single mutex: the orchestrator, the approval
//! gateway, the executor, and monitoring readers share this log
//! concurrently.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Mutex;

use crate::decision::{ApprovalStatus, Decision, DecisionType};

/// Result of a pending-decision state transition.
///
/// Concurrent operator races (decision already decided, unknown id) are
/// ordinary outcomes here, not errors.
#[derive(Debug, Clone)]
pub enum DecisionUpdate {
    /// The transition was applied; carries the updated decision.
    Updated(Decision),
    /// No decision with that id exists.
    NotFound,
    /// The decision exists but is not pending.
    WrongState(ApprovalStatus),
}

impl DecisionUpdate {
    /// Whether the transition was applied.
    pub fn is_applied(&self) -> bool {
        matches!(self, DecisionUpdate::Updated(_))
    }
}

struct LogInner {
    decisions: Vec<Decision>,
    conn: Option<Connection>,
}

/// Append-only record of decisions, queryable by type and status.
pub struct DecisionLog {
    inner: Mutex<LogInner>,
}

impl DecisionLog {
    /// Open a decision log backed by a sqlite database, loading any
    /// previously recorded decisions into memory.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create decision log directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open decision log {}", db_path.display()))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS decisions (
                id            TEXT PRIMARY KEY,
                decision_type TEXT NOT NULL,
                status        TEXT NOT NULL,
                created_at    TEXT NOT NULL,
                payload       TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_decisions_status ON decisions(status);
            CREATE INDEX IF NOT EXISTS idx_decisions_type ON decisions(decision_type);",
        )
        .context("Failed to initialize decision log schema")?;

        let mut decisions = Vec::new();
        {
            let mut stmt = conn.prepare("SELECT payload FROM decisions ORDER BY created_at ASC")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            for row in rows {
                let payload = row?;
                match serde_json::from_str::<Decision>(&payload) {
                    Ok(decision) => decisions.push(decision),
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping unreadable decision row");
                    }
                }
            }
        }

        tracing::info!(
            path = %db_path.display(),
            count = decisions.len(),
            "Opened decision log"
        );

        Ok(Self {
            inner: Mutex::new(LogInner {
                decisions,
                conn: Some(conn),
            }),
        })
    }

    /// Create a purely in-memory log (used in tests and embedded setups).
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(LogInner {
                decisions: Vec::new(),
                conn: None,
            }),
        }
    }

    /// Append a decision to the log.
    pub fn log_decision(&self, decision: Decision) {
        let mut inner = self.inner.lock().expect("decision log lock poisoned");
        persist(&inner.conn, &decision);
        tracing::info!(decision_id = %decision.id, status = decision.approval_status.status_name(), "Logged decision");
        inner.decisions.push(decision);
    }

    /// Fetch a decision by id.
    pub fn get(&self, id: &str) -> Option<Decision> {
        let inner = self.inner.lock().expect("decision log lock poisoned");
        inner.decisions.iter().find(|d| d.id == id).cloned()
    }

    /// Decisions of a given type, newest first.
    pub fn get_by_type(&self, decision_type: DecisionType, limit: usize) -> Vec<Decision> {
        let inner = self.inner.lock().expect("decision log lock poisoned");
        newest_first(
            inner
                .decisions
                .iter()
                .filter(|d| d.decision_type == decision_type),
            limit,
        )
    }

    /// Decisions with a given approval status, newest first.
    pub fn get_by_status(&self, status: ApprovalStatus, limit: usize) -> Vec<Decision> {
        let inner = self.inner.lock().expect("decision log lock poisoned");
        newest_first(
            inner
                .decisions
                .iter()
                .filter(|d| d.approval_status == status),
            limit,
        )
    }

    /// Most recent decisions regardless of type or status.
    pub fn recent(&self, limit: usize) -> Vec<Decision> {
        let inner = self.inner.lock().expect("decision log lock poisoned");
        newest_first(inner.decisions.iter(), limit)
    }

    /// Number of logged decisions.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("decision log lock poisoned")
            .decisions
            .len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record outcome metrics for an executed decision, stamping
    /// `executed_at`. Returns false if the decision is unknown.
    pub fn update_outcome(&self, id: &str, metrics: Value) -> bool {
        let mut inner = self.inner.lock().expect("decision log lock poisoned");
        let Some(position) = inner.decisions.iter().position(|d| d.id == id) else {
            return false;
        };
        {
            let decision = &mut inner.decisions[position];
            decision.outcome = Some(metrics);
            decision.executed_at = Some(Utc::now());
        }
        let decision = inner.decisions[position].clone();
        persist(&inner.conn, &decision);
        true
    }

    /// Transition a pending decision to approved.
    ///
    /// The state check and the transition happen inside the log's critical
    /// section, so two racing approvals resolve to one `Updated` and one
    /// `WrongState`.
    pub fn approve_pending(&self, id: &str, approver: &str) -> DecisionUpdate {
        self.transition_pending(id, |decision| {
            decision.approval_status = ApprovalStatus::Approved;
            decision.approved_at = Some(Utc::now());
            decision.approved_by = Some(approver.to_string());
        })
    }

    /// Transition a pending decision to rejected, storing the reason in the
    /// decision outcome.
    pub fn reject_pending(&self, id: &str, approver: &str, reason: &str) -> DecisionUpdate {
        self.transition_pending(id, |decision| {
            decision.approval_status = ApprovalStatus::Rejected;
            decision.approved_at = Some(Utc::now());
            decision.approved_by = Some(approver.to_string());
            decision.outcome = Some(json!({ "rejection_reason": reason }));
        })
    }

    fn transition_pending(
        &self,
        id: &str,
        apply: impl FnOnce(&mut Decision),
    ) -> DecisionUpdate {
        let mut inner = self.inner.lock().expect("decision log lock poisoned");
        let Some(position) = inner.decisions.iter().position(|d| d.id == id) else {
            return DecisionUpdate::NotFound;
        };
        let status = inner.decisions[position].approval_status;
        if status != ApprovalStatus::Pending {
            return DecisionUpdate::WrongState(status);
        }
        apply(&mut inner.decisions[position]);
        let decision = inner.decisions[position].clone();
        persist(&inner.conn, &decision);
        DecisionUpdate::Updated(decision)
    }
}

fn newest_first<'a>(decisions: impl Iterator<Item = &'a Decision>, limit: usize) -> Vec<Decision> {
    let mut filtered: Vec<Decision> = decisions.cloned().collect();
    filtered.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    filtered.truncate(limit);
    filtered
}

/// Mirror a decision to sqlite. Failures are logged; the in-memory record
/// stays authoritative.
fn persist(conn: &Option<Connection>, decision: &Decision) {
    let Some(conn) = conn else {
        return;
    };
    let payload = match serde_json::to_string(decision) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(decision_id = %decision.id, error = %e, "Failed to serialize decision");
            return;
        }
    };
    let result = conn.execute(
        "INSERT OR REPLACE INTO decisions (id, decision_type, status, created_at, payload)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            decision.id,
            decision.decision_type.type_name(),
            decision.approval_status.status_name(),
            decision.created_at.to_rfc3339(),
            payload,
        ],
    );
    if let Err(e) = result {
        tracing::error!(decision_id = %decision.id, error = %e, "Failed to persist decision");
    }
}
