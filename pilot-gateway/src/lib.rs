//! Pilot gateway - approval workflow, management API, and service wiring.
//!
//! This crate ties the controller together:
//! - Approval gateway converting approved decisions into tasks
//! - HTTP management API (approvals, decisions, plans, tasks, overrides)
//! - The service entry point wiring config → stores → executor → server

#![warn(clippy::all)]

pub mod approval;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use pilot_common::Config;
use pilot_planner::{HttpProvider, PlanGenerator, PlanningOrchestrator, ReasoningProvider};
use pilot_policy::{DecisionLog, OverrideStore, PolicyEngine};
use pilot_scheduler::{
    ActionHandler, ActionKind, ExecutorConfig, HandlerRegistry, NotificationSink, NullNotifier,
    TaskExecutor, TaskRegistry, WebhookNotifier,
};

pub use approval::{ApprovalGateway, ApprovalOutcome};
pub use routes::{build_router, AppState};

/// Handler for `send_alert` that records the alert in the service log.
///
/// Channel integrations (chat, email) are external collaborators;
/// deployments embedding these crates register their own handlers for the
/// remaining action kinds.
pub struct LogAlertHandler;

#[async_trait]
impl ActionHandler for LogAlertHandler {
    async fn execute(&self, params: &Map<String, Value>) -> anyhow::Result<Value> {
        let message = params
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Alert triggered");
        tracing::warn!(alert = %message, "Operator alert");
        let suffix = Uuid::new_v4().simple().to_string();
        Ok(json!({
            "alert_id": format!("alert-{}", &suffix[..8]),
            "message": message,
            "status": "logged",
        }))
    }
}

/// The default handler set: alerts only. Everything else must be
/// registered by the embedding deployment.
pub fn default_handler_registry() -> HandlerRegistry {
    HandlerRegistry::new().with(ActionKind::SendAlert, Arc::new(LogAlertHandler))
}

/// The Pilot controller service: stores, scheduler loop, and HTTP API.
pub struct PilotService {
    config: Config,
    handlers: HandlerRegistry,
}

impl PilotService {
    /// Create a service with the default handler set.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            handlers: default_handler_registry(),
        }
    }

    /// Replace the handler set (used by deployments wiring real
    /// integrations).
    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    /// Start the controller: executor loop plus HTTP server. Runs until
    /// the process is stopped.
    pub async fn start(self) -> anyhow::Result<()> {
        let config = &self.config;
        std::fs::create_dir_all(&config.storage.data_dir)?;

        // Stores
        let policy = Arc::new(PolicyEngine::from_file(config.rules_path()));
        let log = Arc::new(DecisionLog::open(&config.decisions_db_path())?);
        let registry = Arc::new(TaskRegistry::with_snapshot(config.tasks_snapshot_path()));
        let overrides = OverrideStore::new(config.overrides_path());

        // Notification sink
        let notifier: Arc<dyn NotificationSink> = match (
            config.notifications.enabled,
            &config.notifications.endpoint,
        ) {
            (true, Some(endpoint)) => Arc::new(WebhookNotifier::new(endpoint.clone())),
            (true, None) => {
                tracing::warn!("Notifications enabled but no endpoint configured");
                Arc::new(NullNotifier)
            }
            _ => Arc::new(NullNotifier),
        };

        // Reasoning provider
        let provider: Option<Arc<dyn ReasoningProvider>> = match &config.planner.endpoint {
            Some(endpoint) => {
                let provider = HttpProvider::new(
                    endpoint.clone(),
                    config.planner.model.clone(),
                    Duration::from_secs(config.planner.timeout_secs),
                )?
                .with_temperature(config.planner.temperature);
                Some(Arc::new(provider))
            }
            None => {
                tracing::info!("No reasoning endpoint configured, plans degrade to fallback");
                None
            }
        };

        // Executor
        let mut executor = TaskExecutor::new(
            registry.clone(),
            Arc::new(self.handlers),
            notifier.clone(),
        )
        .with_decision_log(log.clone())
        .with_config(executor_config(config));
        executor.start();

        // Routes
        let state = Arc::new(AppState {
            gateway: ApprovalGateway::new(log.clone(), registry.clone(), notifier),
            log: log.clone(),
            registry: registry.clone(),
            orchestrator: PlanningOrchestrator::new(
                PlanGenerator::new(provider),
                policy.clone(),
                log,
                registry,
            ),
            overrides,
            policy,
        });

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        let router = build_router(state).layer(cors);

        let addr: SocketAddr = format!("{}:{}", config.network.bind, config.network.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid bind address: {e}"))?;

        tracing::info!("Starting Pilot management API on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}

/// Map the scheduler configuration section onto the executor knobs.
fn executor_config(config: &Config) -> ExecutorConfig {
    let scheduler = &config.scheduler;
    let mut executor_config = ExecutorConfig {
        interval: Duration::from_secs(scheduler.interval_secs),
        backoff_base: Duration::from_secs(scheduler.backoff_base_secs),
        default_timeout: Duration::from_secs(scheduler.action_timeout_secs),
        timeouts: Default::default(),
    };
    for (raw_kind, secs) in &scheduler.action_timeouts {
        match ActionKind::parse(raw_kind) {
            Some(kind) => {
                executor_config
                    .timeouts
                    .insert(kind, Duration::from_secs(*secs));
            }
            None => {
                tracing::warn!(action_type = %raw_kind, "Ignoring timeout for unknown action type");
            }
        }
    }
    executor_config
}
