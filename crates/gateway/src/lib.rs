//! HTTP gateway for Echelon.
//!
//! Exposes the message intake and session control surface: submitting
//! user text (fire-and-forget or synchronous), polling session logs,
//! pausing, resetting and removing contexts. Built on Axum.
//!
//! All routes except `/health` sit behind optional HTTP basic auth,
//! enforced only when credentials are configured.

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware::{self, Next},
    response::Json,
    routing::{get, post},
};
use base64::Engine as _;
use echelon_config::AppConfig;
use echelon_core::log::{LogItem, LogKind};
use echelon_engine::{
    AgentContext, ChatSettings, ContextRegistry, ExtensionRegistry, Runtime,
    SystemPromptExtension, phase,
};
use echelon_prompts::PromptStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: AppConfig,
    pub runtime: Arc<Runtime>,
    pub registry: ContextRegistry,
}

type SharedState = Arc<GatewayState>;

/// Default broadcast depth for interventions: the streaming agent only.
const DEFAULT_BROADCAST: i32 = 1;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/msg", post(msg_handler))
        .route("/msg_sync", post(msg_sync_handler))
        .route("/poll", post(poll_handler))
        .route("/pause", post(pause_handler))
        .route("/remove", post(remove_handler))
        .route("/reset", post(reset_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Assemble the engine runtime from configuration: chat model, rate
/// limiter, prompt store, and the baseline system-prompt extension.
pub fn build_runtime(config: &AppConfig) -> Result<Runtime, Box<dyn std::error::Error>> {
    let chat_model = echelon_providers::build_chat_model(&config.chat_model, &config.api_key)?;

    let limiter = Arc::new(echelon_core::limit::SlidingWindowLimiter::new(
        config.rate_limit.requests_per_window as usize,
        config.rate_limit.input_tokens_per_window as usize,
        Duration::from_secs(config.rate_limit.window_secs),
    ));

    let prompts = match &config.prompts_dir {
        Some(dir) => PromptStore::new(dir),
        None => PromptStore::builtin(),
    };

    let extensions = Arc::new(ExtensionRegistry::new());
    extensions.register(
        phase::MESSAGE_LOOP_PROMPTS,
        Arc::new(SystemPromptExtension::new(prompts.clone())),
    );

    let settings = ChatSettings {
        model: config.chat_model.model.clone(),
        temperature: config.chat_model.temperature,
        max_tokens: config.chat_model.max_tokens,
    };

    Ok(Runtime::new(chat_model)
        .with_settings(settings)
        .with_limiter(limiter)
        .with_prompts(prompts)
        .with_extensions(extensions))
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let runtime = Arc::new(build_runtime(&config)?);
    let state = Arc::new(GatewayState {
        config,
        runtime,
        registry: ContextRegistry::new(),
    });

    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Basic auth middleware. Enforced only when both credentials are
/// configured; `/health` is always open for monitoring.
async fn auth_middleware(
    State(state): State<SharedState>,
    req: axum::extract::Request,
    next: Next,
) -> Result<axum::response::Response, (StatusCode, [(&'static str, &'static str); 1])> {
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let (Some(username), Some(password)) = (
        state.config.gateway.auth_username.as_deref(),
        state.config.gateway.auth_password.as_deref(),
    ) else {
        return Ok(next.run(req).await);
    };

    let authorized = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|encoded| {
            base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .ok()
        })
        .and_then(|decoded| String::from_utf8(decoded).ok())
        .is_some_and(|credentials| credentials == format!("{username}:{password}"));

    if authorized {
        Ok(next.run(req).await)
    } else {
        warn!("Unauthorized request — missing or invalid basic auth");
        Err((
            StatusCode::UNAUTHORIZED,
            [("WWW-Authenticate", "Basic realm=\"echelon\"")],
        ))
    }
}

/// Resolve the context a request addresses: an explicit id is fetched or
/// created under that id; no id means the earliest live context, or a
/// fresh one when none exists.
fn get_or_create(
    state: &SharedState,
    id: Option<String>,
) -> Result<Arc<AgentContext>, StatusCode> {
    match id.filter(|id| !id.is_empty()) {
        Some(id) => match state.registry.get(&id) {
            Some(context) => Ok(context),
            None => state
                .registry
                .create(state.runtime.clone(), Some(id), None)
                .map_err(internal_error),
        },
        None => match state.registry.first() {
            Some(context) => Ok(context),
            None => state
                .registry
                .create(state.runtime.clone(), None, None)
                .map_err(internal_error),
        },
    }
}

fn internal_error(e: echelon_core::error::EngineError) -> StatusCode {
    error!(error = %e, "Gateway request failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Deserialize)]
struct MessageRequest {
    text: String,
    #[serde(default)]
    context: Option<String>,
    /// How many agents up the chain an intervention reaches when a task
    /// is already running; negative means the whole chain.
    #[serde(default)]
    broadcast: Option<i32>,
}

#[derive(Serialize)]
struct MessageResponse {
    ok: bool,
    message: String,
    context: String,
}

/// Fire-and-forget message intake: acknowledge immediately, let the
/// task run in the background (the UI follows it via `/poll`).
async fn msg_handler(
    State(state): State<SharedState>,
    Json(payload): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, StatusCode> {
    let context = get_or_create(&state, payload.context)?;
    context
        .log()
        .log(LogKind::User, "User message", &payload.text);

    context.communicate(
        payload.text,
        payload.broadcast.unwrap_or(DEFAULT_BROADCAST),
    );

    Ok(Json(MessageResponse {
        ok: true,
        message: "Message received.".into(),
        context: context.id().to_string(),
    }))
}

/// Synchronous message intake: wait for the task and return its result.
async fn msg_sync_handler(
    State(state): State<SharedState>,
    Json(payload): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, StatusCode> {
    let context = get_or_create(&state, payload.context)?;
    context
        .log()
        .log(LogKind::User, "User message", &payload.text);

    let task = context.communicate(
        payload.text,
        payload.broadcast.unwrap_or(DEFAULT_BROADCAST),
    );

    let (ok, message) = match task.result().await {
        Ok(response) => (true, response),
        Err(e) => (false, e.to_string()),
    };

    Ok(Json(MessageResponse {
        ok,
        message,
        context: context.id().to_string(),
    }))
}

#[derive(Deserialize)]
struct PollRequest {
    #[serde(default)]
    context: Option<String>,
    /// Log version the client has seen; only newer items are returned.
    #[serde(default)]
    log_from: usize,
}

#[derive(Serialize)]
struct ContextSummary {
    id: String,
    no: u64,
    name: Option<String>,
    log_guid: String,
    log_version: usize,
    log_length: usize,
    paused: bool,
}

#[derive(Serialize)]
struct PollResponse {
    ok: bool,
    context: String,
    contexts: Vec<ContextSummary>,
    logs: Vec<LogItem>,
    log_guid: String,
    log_version: usize,
    log_length: usize,
    log_progress: String,
    paused: bool,
}

async fn poll_handler(
    State(state): State<SharedState>,
    Json(payload): Json<PollRequest>,
) -> Result<Json<PollResponse>, StatusCode> {
    let context = get_or_create(&state, payload.context)?;
    let log = context.log();

    let contexts = state
        .registry
        .list()
        .iter()
        .map(|c| ContextSummary {
            id: c.id().to_string(),
            no: c.seq(),
            name: c.name().map(str::to_string),
            log_guid: c.log().guid().to_string(),
            log_version: c.log().version(),
            log_length: c.log().len(),
            paused: c.is_paused(),
        })
        .collect();

    Ok(Json(PollResponse {
        ok: true,
        context: context.id().to_string(),
        contexts,
        logs: log.output(payload.log_from),
        log_guid: log.guid().to_string(),
        log_version: log.version(),
        log_length: log.len(),
        log_progress: log.progress(),
        paused: context.is_paused(),
    }))
}

#[derive(Deserialize)]
struct PauseRequest {
    paused: bool,
    #[serde(default)]
    context: Option<String>,
}

#[derive(Serialize)]
struct PauseResponse {
    ok: bool,
    paused: bool,
}

async fn pause_handler(
    State(state): State<SharedState>,
    Json(payload): Json<PauseRequest>,
) -> Result<Json<PauseResponse>, StatusCode> {
    let context = get_or_create(&state, payload.context)?;
    context.set_paused(payload.paused);

    Ok(Json(PauseResponse {
        ok: true,
        paused: payload.paused,
    }))
}

#[derive(Deserialize)]
struct ContextRequest {
    #[serde(default)]
    context: Option<String>,
}

#[derive(Serialize)]
struct OkResponse {
    ok: bool,
    message: String,
}

/// Remove a context entirely, cancelling its work first.
async fn remove_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ContextRequest>,
) -> Json<OkResponse> {
    if let Some(id) = payload.context.filter(|id| !id.is_empty()) {
        if let Some(context) = state.registry.get(&id) {
            if let Some(task) = context.task() {
                task.cancel();
            }
            state.registry.remove(&id);
        }
    }

    Json(OkResponse {
        ok: true,
        message: "Context removed.".into(),
    })
}

/// Reset a context's agent chain, keeping its identity and log.
async fn reset_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ContextRequest>,
) -> Result<Json<OkResponse>, StatusCode> {
    let context = get_or_create(&state, payload.context)?;
    context.reset();

    Ok(Json(OkResponse {
        ok: true,
        message: "Context reset.".into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use base64::Engine;
    use axum::http::Request;
    use echelon_core::error::ModelError;
    use echelon_core::model::{ChatModel, ChatRequest, ChatResponse};
    use tower::ServiceExt;

    struct CannedModel {
        reply: &'static str,
    }

    #[async_trait]
    impl ChatModel for CannedModel {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, ModelError> {
            Ok(ChatResponse {
                content: self.reply.into(),
                usage: None,
                model: "canned".into(),
            })
        }
    }

    fn test_state(config: AppConfig) -> SharedState {
        Arc::new(GatewayState {
            config,
            runtime: Arc::new(Runtime::new(Arc::new(CannedModel { reply: "Hello!" }))),
            registry: ContextRegistry::new(),
        })
    }

    fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_state(AppConfig::default()));

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn msg_sync_returns_the_response() {
        let app = build_router(test_state(AppConfig::default()));

        let response = app
            .oneshot(json_post("/msg_sync", serde_json::json!({"text": "hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["ok"], serde_json::json!(true));
        assert_eq!(body["message"], serde_json::json!("Hello!"));
        assert!(body["context"].as_str().is_some());
    }

    #[tokio::test]
    async fn msg_acknowledges_without_waiting() {
        let state = test_state(AppConfig::default());
        let app = build_router(state.clone());

        let response = app
            .oneshot(json_post("/msg", serde_json::json!({"text": "hi"})))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["message"], serde_json::json!("Message received."));

        let id = body["context"].as_str().unwrap();
        let context = state.registry.get(id).unwrap();
        // User message was logged synchronously
        assert!(!context.log().is_empty());
    }

    #[tokio::test]
    async fn poll_reports_contexts_and_log_delta() {
        let state = test_state(AppConfig::default());

        let app = build_router(state.clone());
        let response = app
            .oneshot(json_post("/msg_sync", serde_json::json!({"text": "hi"})))
            .await
            .unwrap();
        let id = body_json(response).await["context"]
            .as_str()
            .unwrap()
            .to_string();

        let app = build_router(state);
        let response = app
            .oneshot(json_post(
                "/poll",
                serde_json::json!({"context": id, "log_from": 0}),
            ))
            .await
            .unwrap();
        let body = body_json(response).await;

        assert_eq!(body["ok"], serde_json::json!(true));
        assert_eq!(body["contexts"].as_array().unwrap().len(), 1);
        assert!(!body["logs"].as_array().unwrap().is_empty());
        assert_eq!(body["contexts"][0]["id"], serde_json::json!(id));
        assert_eq!(body["paused"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn poll_without_context_creates_one() {
        let state = test_state(AppConfig::default());
        let app = build_router(state.clone());

        let response = app
            .oneshot(json_post("/poll", serde_json::json!({})))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["ok"], serde_json::json!(true));
        assert_eq!(state.registry.len(), 1);
    }

    #[tokio::test]
    async fn pause_flag_round_trips() {
        let state = test_state(AppConfig::default());
        let app = build_router(state.clone());

        let response = app
            .oneshot(json_post(
                "/pause",
                serde_json::json!({"paused": true, "context": "c1"}),
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["paused"], serde_json::json!(true));
        assert!(state.registry.get("c1").unwrap().is_paused());
    }

    #[tokio::test]
    async fn remove_deletes_the_context() {
        let state = test_state(AppConfig::default());

        let app = build_router(state.clone());
        app.oneshot(json_post(
            "/msg_sync",
            serde_json::json!({"text": "hi", "context": "doomed"}),
        ))
        .await
        .unwrap();
        assert!(state.registry.get("doomed").is_some());

        let app = build_router(state.clone());
        let response = app
            .oneshot(json_post("/remove", serde_json::json!({"context": "doomed"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.registry.get("doomed").is_none());
    }

    #[tokio::test]
    async fn reset_clears_history_but_keeps_the_context() {
        let state = test_state(AppConfig::default());

        let app = build_router(state.clone());
        app.oneshot(json_post(
            "/msg_sync",
            serde_json::json!({"text": "hi", "context": "c1"}),
        ))
        .await
        .unwrap();
        assert_eq!(state.registry.get("c1").unwrap().root_agent().history_len(), 2);

        let app = build_router(state.clone());
        let response = app
            .oneshot(json_post("/reset", serde_json::json!({"context": "c1"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let context = state.registry.get("c1").unwrap();
        assert_eq!(context.root_agent().history_len(), 0);
    }

    #[tokio::test]
    async fn basic_auth_guards_routes_when_configured() {
        let mut config = AppConfig::default();
        config.gateway.auth_username = Some("admin".into());
        config.gateway.auth_password = Some("secret".into());
        let state = test_state(config);

        // No credentials: rejected
        let app = build_router(state.clone());
        let response = app
            .oneshot(json_post("/poll", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // Health stays open
        let app = build_router(state.clone());
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Correct credentials: accepted
        let credentials =
            base64::engine::general_purpose::STANDARD.encode("admin:secret");
        let app = build_router(state);
        let req = Request::builder()
            .method("POST")
            .uri("/poll")
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Basic {credentials}"))
            .body(Body::from("{}"))
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let mut config = AppConfig::default();
        config.gateway.auth_username = Some("admin".into());
        config.gateway.auth_password = Some("secret".into());
        let app = build_router(test_state(config));

        let credentials = base64::engine::general_purpose::STANDARD.encode("admin:wrong");
        let req = Request::builder()
            .method("POST")
            .uri("/poll")
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Basic {credentials}"))
            .body(Body::from("{}"))
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
