//! Task scheduling and execution for the Pilot controller.
//!
//! This crate provides:
//! - A typed action-kind registry mapping each kind to a pluggable handler
//! - The task registry: dependency gating, priority ordering, retry budget
//! - The executor: concurrent dispatch with per-kind timeouts and
//!   backoff-based retry through the ordinary scheduling pass
//! - The notification sink receiving failure and decision events
//!
//! ## Scheduling model
//!
//! ```text
//! submit → PENDING ──claim (deps met, time reached)──▶ RUNNING
//!              ▲                                         │
//!              └──── backoff reschedule (retry budget) ──┤
//!                                                        ├──▶ COMPLETED
//!          PENDING ──cancel──▶ CANCELLED                 └──▶ FAILED
//! ```
//!
//! Selection and the PENDING→RUNNING transition happen inside one critical
//! section, so concurrent scheduling passes never dispatch the same task
//! twice. Handler execution itself is concurrent; only the completion
//! bookkeeping re-enters the registry lock.

#![warn(clippy::all)]

pub mod action;
pub mod executor;
pub mod handler;
pub mod notify;
pub mod registry;
pub mod task;

pub use action::ActionKind;
pub use executor::{ExecutorConfig, TaskExecutor};
pub use handler::{ActionHandler, HandlerRegistry};
pub use notify::{DecisionResolution, NotificationSink, NullNotifier, TaskFailure, WebhookNotifier};
pub use registry::TaskRegistry;
pub use task::{NewTask, Task, TaskPriority, TaskStatus, DEFAULT_MAX_RETRIES};
