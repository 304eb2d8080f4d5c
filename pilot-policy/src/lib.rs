//! Policy layer for the Pilot controller.
//!
//! This crate provides:
//! - The Decision data model shared across the controller
//! - A rule-based policy engine producing Decisions from a context snapshot
//! - An append-only, queryable decision log with sqlite persistence
//! - Operator override directives for forcing or suppressing automated flags

#![warn(clippy::all)]

pub mod decision;
pub mod engine;
pub mod log;
pub mod overrides;
pub mod rules;

pub use decision::{ActionSpec, ApprovalStatus, ContextSnapshot, Decision, DecisionType};
pub use engine::PolicyEngine;
pub use log::{DecisionLog, DecisionUpdate};
pub use overrides::{EntityFlag, OverrideDirective, OverrideStore};
pub use rules::{PolicyRule, RuleConditions};
