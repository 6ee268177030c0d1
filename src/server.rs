// HTTP surface of a node: peers post messages and acks here, clients post
// payloads to multicast and read status.

use crate::{config::NodeConfig, delivery_log::DeliveryLog, http_transport::HttpTransport};
use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tom::{node, Ack, Error, Message, MessageId, NodeHandle, NodeStatus, SendRequest};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct AppState {
    pub node: NodeHandle,
    pub delivered: DeliveryLog,
}

/// `tom::Error` as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Malformed(_) | Error::InvalidMembership(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::NodeStopped | Error::ClockExhausted => StatusCode::SERVICE_UNAVAILABLE,
            Error::PeerUnreachable { .. } => StatusCode::BAD_GATEWAY,
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(%status, "request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/multicast/message", post(receive_message))
        .route("/multicast/ack", post(receive_ack))
        .route("/multicast/send", post(send))
        .route("/multicast/status", get(status))
        .route("/multicast/delivered", get(delivered))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn receive_message(State(state): State<AppState>, Json(msg): Json<Message>) -> Result<StatusCode, ApiError> {
    state.node.receive_message(msg)?;
    Ok(StatusCode::OK)
}

async fn receive_ack(State(state): State<AppState>, Json(ack): Json<Ack>) -> Result<StatusCode, ApiError> {
    state.node.receive_ack(ack)?;
    Ok(StatusCode::OK)
}

async fn send(State(state): State<AppState>, Json(request): Json<SendRequest>) -> Result<Json<MessageId>, ApiError> {
    let id = state.node.multicast(request.payload).await?;
    Ok(Json(id))
}

async fn status(State(state): State<AppState>) -> Result<Json<NodeStatus>, ApiError> {
    Ok(Json(state.node.status().await?))
}

async fn delivered(State(state): State<AppState>) -> Json<Vec<Message>> {
    Json(state.delivered.snapshot())
}

/// Spawn the multicast node described by `config` and start recording its
/// deliveries. Must be called from within a tokio runtime.
pub fn start_node(config: &NodeConfig) -> anyhow::Result<AppState> {
    let group = config.group().context("invalid group configuration")?;
    let transport = HttpTransport::new(config.request_timeout(), config.simulated_latency())?;

    let (node, deliveries) = node::spawn(group, Arc::new(transport), config.node_options());
    let delivered = DeliveryLog::new(config.delivered_log_capacity);
    delivered.follow(deliveries);

    Ok(AppState { node, delivered })
}

pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let addr = listener.local_addr().context("listener has no local address")?;
    info!(process = %state.node.process_id(), %addr, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")
}

/// Bind `config.bind` and run a node until ctrl-c
pub async fn run(config: NodeConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    let state = start_node(&config)?;
    serve(listener, state).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
