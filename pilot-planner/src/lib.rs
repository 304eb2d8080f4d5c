//! Strategic planning for the Pilot controller.
//!
//! This crate provides:
//! - The reasoning-provider interface and its HTTP implementation
//! - The plan data model and its degraded fallbacks
//! - The plan generator, which never lets a collaborator failure escape
//! - The planning orchestrator, which merges generated plans with policy
//!   decisions, writes every decision to the decision log, and submits
//!   auto-approved actions to the task registry

#![warn(clippy::all)]

pub mod generator;
pub mod orchestrator;
pub mod plan;
pub mod provider;

pub use generator::PlanGenerator;
pub use orchestrator::{CombinedPlan, PlanningOrchestrator};
pub use plan::{Plan, PlanningContext, RecommendedAction, RiskItem};
pub use provider::{HttpProvider, ReasoningProvider};
