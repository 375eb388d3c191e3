use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bridge::{
    listener::serve_bridge, DeviceLink, DeviceMethodDispatcher, DispatchError,
    InMemoryDeviceModel,
};
use shared::{
    domain::Invocation,
    error::{ApiError, ErrorCode},
    protocol::{DeviceStatus, InvokeRequest, InvokeResponse},
};
use tokio::{net::TcpListener, sync::broadcast::error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use crate::config::load_settings;

#[derive(Clone)]
struct AppState {
    dispatcher: DeviceMethodDispatcher,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings()?;
    let model = Arc::new(InMemoryDeviceModel::with_skills(settings.skills.iter().cloned()));
    let link = DeviceLink::new(settings.device_name.clone(), model);
    let dispatcher =
        DeviceMethodDispatcher::new(Arc::clone(&link)).with_demo_delay(settings.demo_delay());

    let bridge_listener = TcpListener::bind(&settings.bridge_bind)
        .await
        .with_context(|| format!("failed to bind skill bridge on {}", settings.bridge_bind))?;
    let bridge = tokio::spawn(serve_bridge(
        bridge_listener,
        Arc::clone(&link),
        settings.call_timeout(),
    ));

    let app = build_router(Arc::new(AppState { dispatcher }));
    let addr: SocketAddr = settings
        .http_bind
        .parse()
        .with_context(|| format!("invalid http bind address '{}'", settings.http_bind))?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, device = %settings.device_name, skills = ?settings.skills, "device server listening");
    let http = tokio::spawn(async move { axum::serve(listener, app).await });

    tokio::select! {
        result = http => result.context("http server task failed")??,
        result = bridge => result.context("skill bridge task failed")??,
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            info!("shutting down");
        }
    }
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/skills", get(list_skills))
        .route("/skills/:skill/methods/:method", post(invoke_method))
        .route("/methods/:browse_name", post(invoke_by_browse_name))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_skills(State(state): State<Arc<AppState>>) -> Json<DeviceStatus> {
    Json(state.dispatcher.link().status().await)
}

async fn invoke_method(
    State(state): State<Arc<AppState>>,
    Path((skill, method)): Path<(String, String)>,
    Json(req): Json<InvokeRequest>,
) -> ApiResult<InvokeResponse> {
    invoke(&state, Invocation::new(skill, method, req.parameter)).await
}

/// Same as `invoke_method`, addressed by a `<Skill>_<Method>` browse name.
async fn invoke_by_browse_name(
    State(state): State<Arc<AppState>>,
    Path(browse_name): Path<String>,
    Json(req): Json<InvokeRequest>,
) -> ApiResult<InvokeResponse> {
    let invocation = Invocation::from_browse_name(&browse_name, req.parameter).ok_or_else(|| {
        api_error(
            StatusCode::BAD_REQUEST,
            ErrorCode::Validation,
            format!("`{browse_name}` is not a <Skill>_<Method> browse name"),
        )
    })?;
    invoke(&state, invocation).await
}

async fn invoke(state: &AppState, invocation: Invocation) -> ApiResult<InvokeResponse> {
    let skill = &invocation.skill;
    if state.dispatcher.link().model().skill_state(skill).is_none() {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            ErrorCode::NotFound,
            format!("unknown skill `{skill}`"),
        ));
    }
    match state.dispatcher.dispatch(&invocation).await {
        Ok(output) => Ok(Json(InvokeResponse { output })),
        Err(err @ DispatchError::UnknownMethod { .. }) => Err(api_error(
            StatusCode::NOT_FOUND,
            ErrorCode::NotFound,
            err.to_string(),
        )),
    }
}

fn api_error(status: StatusCode, code: ErrorCode, message: String) -> (StatusCode, Json<ApiError>) {
    (status, Json(ApiError::new(code, message)))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: axum::extract::ws::WebSocket) {
    use axum::extract::ws::Message;
    use futures::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    let link = Arc::clone(state.dispatcher.link());
    let mut events_rx = link.subscribe();

    let send_task = tokio::spawn(async move {
        loop {
            let event = match events_rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(device = %link.name(), skipped, "event subscriber lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
