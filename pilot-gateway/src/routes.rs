//! HTTP management API.
//!
//! A thin axum surface over the controller: approvals, decision history,
//! plan generation, ad-hoc task submission, and operator overrides. No
//! authentication — the API binds to localhost by default and is expected
//! to sit behind the platform's own gateway.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use pilot_common::Error;
use pilot_planner::{CombinedPlan, PlanningContext, PlanningOrchestrator};
use pilot_policy::{
    ApprovalStatus, Decision, DecisionLog, DecisionType, OverrideDirective, OverrideStore,
    PolicyEngine, PolicyRule,
};
use pilot_scheduler::{ActionKind, NewTask, Task, TaskPriority, TaskRegistry};

use crate::approval::{ApprovalGateway, ApprovalOutcome};

/// Shared state behind every route.
pub struct AppState {
    pub gateway: ApprovalGateway,
    pub log: Arc<DecisionLog>,
    pub registry: Arc<TaskRegistry>,
    pub orchestrator: PlanningOrchestrator,
    pub overrides: OverrideStore,
    pub policy: Arc<PolicyEngine>,
}

/// Error payload returned by every failing route.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ErrorReply = (StatusCode, Json<ErrorResponse>);

fn error_reply(error: Error) -> ErrorReply {
    let status = StatusCode::from_u16(error.status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

/// Build the management API router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/approvals", get(list_approvals))
        .route("/api/v1/approvals/:id/approve", post(approve_decision))
        .route("/api/v1/approvals/:id/reject", post(reject_decision))
        .route("/api/v1/decisions", get(list_decisions))
        .route("/api/v1/plan", post(generate_plan))
        .route("/api/v1/rules", get(list_rules))
        .route("/api/v1/tasks", post(submit_task))
        .route("/api/v1/tasks/:id", get(get_task))
        .route("/api/v1/tasks/:id/cancel", post(cancel_task))
        .route("/api/v1/overrides", get(list_overrides))
        .route(
            "/api/v1/overrides/:entity_id",
            get(get_override).put(set_override).delete(clear_override),
        )
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PendingApprovalsResponse {
    pub decisions: Vec<Decision>,
    pub total: usize,
}

/// GET /api/v1/approvals
async fn list_approvals(State(state): State<Arc<AppState>>) -> Json<PendingApprovalsResponse> {
    let decisions = state.gateway.list_pending();
    let total = decisions.len();
    Json(PendingApprovalsResponse { decisions, total })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApproveRequest {
    pub approver: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApproveResponse {
    pub approved: bool,
    #[serde(default)]
    pub task_ids: Vec<String>,
}

/// POST /api/v1/approvals/:id/approve
async fn approve_decision(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<ApproveRequest>,
) -> Result<Json<ApproveResponse>, ErrorReply> {
    match state.gateway.approve(&id, &request.approver).await {
        ApprovalOutcome::Approved { task_ids } => Ok(Json(ApproveResponse {
            approved: true,
            task_ids,
        })),
        ApprovalOutcome::NotFound => {
            Err(error_reply(Error::NotFound(format!("decision '{id}'"))))
        }
        ApprovalOutcome::WrongState(status) => Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: format!("decision '{}' is {}", id, status.status_name()),
            }),
        )),
        ApprovalOutcome::Rejected => unreachable!("approve cannot yield Rejected"),
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RejectRequest {
    pub approver: String,
    pub reason: String,
}

/// POST /api/v1/approvals/:id/reject
async fn reject_decision(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<RejectRequest>,
) -> Result<Json<Value>, ErrorReply> {
    match state
        .gateway
        .reject(&id, &request.approver, &request.reason)
        .await
    {
        ApprovalOutcome::Rejected => Ok(Json(serde_json::json!({ "rejected": true }))),
        ApprovalOutcome::NotFound => {
            Err(error_reply(Error::NotFound(format!("decision '{id}'"))))
        }
        ApprovalOutcome::WrongState(status) => Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: format!("decision '{}' is {}", id, status.status_name()),
            }),
        )),
        ApprovalOutcome::Approved { .. } => unreachable!("reject cannot yield Approved"),
    }
}

#[derive(Debug, Deserialize)]
pub struct DecisionQuery {
    #[serde(default)]
    pub decision_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// GET /api/v1/decisions
async fn list_decisions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DecisionQuery>,
) -> Result<Json<Vec<Decision>>, ErrorReply> {
    let limit = query.limit.unwrap_or(50);

    let decisions = match (&query.decision_type, &query.status) {
        (Some(raw), status) => {
            let decision_type: DecisionType =
                raw.parse().map_err(|e: String| error_reply(Error::InvalidInput(e)))?;
            let mut decisions = state.log.get_by_type(decision_type, limit);
            if let Some(raw_status) = status {
                let wanted: ApprovalStatus = raw_status
                    .parse()
                    .map_err(|e: String| error_reply(Error::InvalidInput(e)))?;
                decisions.retain(|d| d.approval_status == wanted);
            }
            decisions
        }
        (None, Some(raw_status)) => {
            let status: ApprovalStatus = raw_status
                .parse()
                .map_err(|e: String| error_reply(Error::InvalidInput(e)))?;
            state.log.get_by_status(status, limit)
        }
        (None, None) => state.log.recent(limit),
    };

    Ok(Json(decisions))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlanRequest {
    pub goal: String,
    #[serde(default)]
    pub context: PlanningContext,
}

/// POST /api/v1/plan
async fn generate_plan(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PlanRequest>,
) -> Json<CombinedPlan> {
    let combined = state
        .orchestrator
        .generate_strategic_plan(&request.context, &request.goal)
        .await;
    Json(combined)
}

/// GET /api/v1/rules
async fn list_rules(State(state): State<Arc<AppState>>) -> Json<Vec<PolicyRule>> {
    Json(state.policy.rules())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskSubmission {
    pub action_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub scheduled_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// POST /api/v1/tasks — ad-hoc task submission.
async fn submit_task(
    State(state): State<Arc<AppState>>,
    Json(submission): Json<TaskSubmission>,
) -> Result<(StatusCode, Json<Value>), ErrorReply> {
    let Some(kind) = ActionKind::parse(&submission.action_type) else {
        return Err(error_reply(Error::InvalidInput(format!(
            "unknown action type: {}",
            submission.action_type
        ))));
    };

    let mut new_task = NewTask::new(
        kind,
        submission
            .description
            .unwrap_or_else(|| kind.name().to_string()),
    )
    .with_params(submission.params)
    .with_dependencies(submission.dependencies);

    if let Some(at) = submission.scheduled_time {
        new_task = new_task.with_scheduled_time(at);
    }
    if let Some(label) = &submission.priority {
        new_task = new_task.with_priority(TaskPriority::from_label(label));
    }
    if let Some(max_retries) = submission.max_retries {
        new_task = new_task.with_max_retries(max_retries);
    }

    let task_id = state.registry.submit(new_task);
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "task_id": task_id })),
    ))
}

/// GET /api/v1/tasks/:id
async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ErrorReply> {
    state
        .registry
        .get(&id)
        .map(Json)
        .ok_or_else(|| error_reply(Error::NotFound(format!("task '{id}'"))))
}

/// POST /api/v1/tasks/:id/cancel
async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ErrorReply> {
    if state.registry.get(&id).is_none() {
        return Err(error_reply(Error::NotFound(format!("task '{id}'"))));
    }
    let cancelled = state.registry.cancel(&id);
    Ok(Json(serde_json::json!({ "cancelled": cancelled })))
}

/// GET /api/v1/overrides
async fn list_overrides(
    State(state): State<Arc<AppState>>,
) -> Json<BTreeMap<String, OverrideDirective>> {
    Json(state.overrides.load())
}

/// GET /api/v1/overrides/:entity_id
async fn get_override(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
) -> Result<Json<Value>, ErrorReply> {
    match state.overrides.get(&entity_id) {
        Some(directive) => Ok(Json(serde_json::json!({
            "entity_id": entity_id,
            "directive": directive.as_str(),
        }))),
        None => Err(error_reply(Error::NotFound(format!(
            "override for '{entity_id}'"
        )))),
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OverrideRequest {
    pub directive: String,
}

/// PUT /api/v1/overrides/:entity_id
async fn set_override(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
    Json(request): Json<OverrideRequest>,
) -> Result<StatusCode, ErrorReply> {
    state
        .overrides
        .set_str(&entity_id, &request.directive)
        .map_err(error_reply)?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/overrides/:entity_id
async fn clear_override(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
) -> Result<StatusCode, ErrorReply> {
    match state.overrides.clear(&entity_id) {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(error_reply(Error::NotFound(format!(
            "override for '{entity_id}'"
        )))),
        Err(e) => Err(error_reply(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use pilot_planner::PlanGenerator;
    use pilot_policy::{rules::default_rules, ActionSpec};
    use pilot_scheduler::NullNotifier;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_state(tmp: &TempDir) -> Arc<AppState> {
        let policy = Arc::new(PolicyEngine::new(default_rules()));
        let log = Arc::new(DecisionLog::in_memory());
        let registry = Arc::new(TaskRegistry::new());
        let notifier = Arc::new(NullNotifier);

        Arc::new(AppState {
            gateway: ApprovalGateway::new(log.clone(), registry.clone(), notifier),
            log: log.clone(),
            registry: registry.clone(),
            orchestrator: PlanningOrchestrator::new(
                PlanGenerator::new(None),
                policy.clone(),
                log,
                registry,
            ),
            overrides: OverrideStore::new(tmp.path().join("overrides.json")),
            policy,
        })
    }

    fn pending_decision(id: &str) -> Decision {
        Decision {
            id: id.into(),
            decision_type: DecisionType::ChannelInvestment,
            description: "retire weak channel".into(),
            rationale: "test".into(),
            proposed_actions: vec![ActionSpec::new("send_alert")],
            expected_outcome: "test".into(),
            risk_assessment: "low".into(),
            confidence: 0.6,
            requires_approval: true,
            approval_status: ApprovalStatus::Pending,
            created_at: Utc::now(),
            approved_at: None,
            approved_by: None,
            executed_at: None,
            outcome: None,
        }
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let tmp = TempDir::new().unwrap();
        let app = build_router(test_state(&tmp));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_approve_flow_over_http() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp);
        state.log.log_decision(pending_decision("d-1"));
        let app = build_router(state.clone());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/approvals/d-1/approve")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"approver": "alice"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["approved"], true);
        assert_eq!(body["task_ids"].as_array().unwrap().len(), 1);

        // Second approve races into a conflict
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/approvals/d-1/approve")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"approver": "bob"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_approve_unknown_is_404() {
        let tmp = TempDir::new().unwrap();
        let app = build_router(test_state(&tmp));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/approvals/missing/approve")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"approver": "alice"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reject_over_http() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp);
        state.log.log_decision(pending_decision("d-1"));
        let app = build_router(state.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/approvals/d-1/reject")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"approver": "alice", "reason": "budget"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let decision = state.log.get("d-1").unwrap();
        assert_eq!(decision.approval_status, ApprovalStatus::Rejected);
        assert!(state.registry.all().is_empty());
    }

    #[tokio::test]
    async fn test_list_pending_approvals() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp);
        state.log.log_decision(pending_decision("d-1"));
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/approvals")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["total"], 1);
    }

    #[tokio::test]
    async fn test_decisions_query_rejects_bad_filter() {
        let tmp = TempDir::new().unwrap();
        let app = build_router(test_state(&tmp));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/decisions?status=exploded")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_submit_task_and_fetch() {
        let tmp = TempDir::new().unwrap();
        let app = build_router(test_state(&tmp));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/tasks")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"action_type": "send_alert", "priority": "high", "params": {"message": "hi"}}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let task_id = body_json(response).await["task_id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/tasks/{task_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["action"], "send_alert");
        assert_eq!(body["priority"], "high");
    }

    #[tokio::test]
    async fn test_submit_task_unknown_action_type() {
        let tmp = TempDir::new().unwrap();
        let app = build_router(test_state(&tmp));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/tasks")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"action_type": "launch_rocket"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_override_roundtrip_over_http() {
        let tmp = TempDir::new().unwrap();
        let app = build_router(test_state(&tmp));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/v1/overrides/chan-1")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"directive": "force_retire"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/overrides")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_json(response).await["chan-1"], "force_retire");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/overrides/chan-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["directive"], "force_retire");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/v1/overrides/chan-2")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"directive": "explode"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/v1/overrides/chan-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_cancel_task_over_http() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp);
        let id = state
            .registry
            .submit(NewTask::new(ActionKind::SendAlert, "cancellable"));
        let app = build_router(state);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/v1/tasks/{id}/cancel"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["cancelled"], true);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/tasks/task-missing/cancel")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
