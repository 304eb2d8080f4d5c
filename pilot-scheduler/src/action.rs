//! Typed action kinds.
//!
//! The scheduler dispatches by a closed set of action kinds rather than
//! free-form strings. Free-form action types coming from rules and plans
//! are resolved here once, at conversion time; a kind with no registered
//! handler is an explicit fatal failure at dispatch, never a silent lookup
//! miss.

use serde::{Deserialize, Serialize};

/// The closed set of actions the controller can schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Produce a piece of content
    CreateContent,
    /// Schedule a post on one or more platforms
    SchedulePost,
    /// Run a metrics analysis
    AnalyzeMetrics,
    /// Send an operator alert
    SendAlert,
    /// Optimize a channel's settings
    OptimizeChannel,
    /// React to a trending topic
    TrendResponse,
    /// Swap an external tool
    ToolSwitch,
    /// Re-allocate budget
    BudgetAllocation,
    /// Set a retire/promote flag on an entity
    FlagEntity,
}

impl ActionKind {
    /// Canonical snake_case name.
    pub fn name(self) -> &'static str {
        match self {
            ActionKind::CreateContent => "create_content",
            ActionKind::SchedulePost => "schedule_post",
            ActionKind::AnalyzeMetrics => "analyze_metrics",
            ActionKind::SendAlert => "send_alert",
            ActionKind::OptimizeChannel => "optimize_channel",
            ActionKind::TrendResponse => "trend_response",
            ActionKind::ToolSwitch => "tool_switch",
            ActionKind::BudgetAllocation => "budget_allocation",
            ActionKind::FlagEntity => "flag_entity",
        }
    }

    /// Resolve a free-form action type string, accepting the aliases used
    /// by older rule files. Unknown strings resolve to `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "create_content" => Some(ActionKind::CreateContent),
            "schedule_post" => Some(ActionKind::SchedulePost),
            "analyze_metrics" | "schedule_analysis" => Some(ActionKind::AnalyzeMetrics),
            "send_alert" | "alert" | "notify_admin" => Some(ActionKind::SendAlert),
            "optimize_channel" => Some(ActionKind::OptimizeChannel),
            "trend_response" => Some(ActionKind::TrendResponse),
            "tool_switch" => Some(ActionKind::ToolSwitch),
            "budget_allocation" => Some(ActionKind::BudgetAllocation),
            "flag_entity" | "flag_channel" => Some(ActionKind::FlagEntity),
            _ => None,
        }
    }

    /// Infer a kind from free plan text (e.g. an LLM-recommended action).
    /// Falls back to metrics analysis, the safest default.
    pub fn infer(text: &str) -> Self {
        let text = text.to_lowercase();
        if text.contains("content") || text.contains("create") {
            ActionKind::CreateContent
        } else if text.contains("post") || text.contains("schedule") {
            ActionKind::SchedulePost
        } else if text.contains("alert") || text.contains("notify") {
            ActionKind::SendAlert
        } else if text.contains("optimize") {
            ActionKind::OptimizeChannel
        } else if text.contains("trend") {
            ActionKind::TrendResponse
        } else if text.contains("budget") {
            ActionKind::BudgetAllocation
        } else if text.contains("tool") {
            ActionKind::ToolSwitch
        } else {
            ActionKind::AnalyzeMetrics
        }
    }

    /// All kinds, in declaration order.
    pub fn all() -> &'static [ActionKind] {
        &[
            ActionKind::CreateContent,
            ActionKind::SchedulePost,
            ActionKind::AnalyzeMetrics,
            ActionKind::SendAlert,
            ActionKind::OptimizeChannel,
            ActionKind::TrendResponse,
            ActionKind::ToolSwitch,
            ActionKind::BudgetAllocation,
            ActionKind::FlagEntity,
        ]
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
