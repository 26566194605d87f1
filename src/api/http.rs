//! HTTP API Server
//!
//! Protocol endpoints between nodes plus the client write and status
//! endpoints. Every handler is a thin shim over the store, the election
//! coordinator or the replicator.

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use crate::error::{Error, Result};
use crate::replication::protocol::{
    CoordinatorMessage, ErrorResponse, EventRequest, EventResponse, PeerEntry, StatusResponse,
    COORDINATOR_PATH, ELECTION_PATH, EVENT_PATH, HEARTBEAT_PATH, STATE_PATH, STATE_UPDATE_PATH,
    STATUS_PATH,
};
use crate::replication::Replicator;
use crate::state::{ElectionCoordinator, NodeStore, ReplicatedState};

/// Shared application state
pub struct AppState {
    pub store: Arc<NodeStore>,
    pub election: Arc<ElectionCoordinator>,
    pub replicator: Arc<Replicator>,
    /// Fatal errors are handed to the node supervisor, which stops the node
    pub fatal_tx: mpsc::UnboundedSender<Error>,
    pub started_at: DateTime<Utc>,
}

/// HTTP API server
pub struct HttpServer {
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Create the router
    pub fn router(&self) -> Router {
        create_router(Arc::clone(&self.state))
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let address = listener.local_addr()?;
        tracing::info!(
            "Node {}: HTTP API listening on {}",
            self.state.store.id(),
            address
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        tracing::info!("Node {}: HTTP API stopped", self.state.store.id());
        Ok(())
    }
}

fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Election protocol
        .route(HEARTBEAT_PATH, get(handle_heartbeat))
        .route(ELECTION_PATH, post(handle_election))
        .route(COORDINATOR_PATH, post(handle_coordinator))
        // Replication
        .route(EVENT_PATH, post(handle_event))
        .route(STATE_UPDATE_PATH, post(handle_state_update))
        .route(STATE_PATH, get(handle_state))
        // Status
        .route(STATUS_PATH, get(handle_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============ Error Mapping ============

fn error_response(status: StatusCode, code: &str, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: code.to_string(),
        }),
    )
        .into_response()
}

fn bad_request(rejection: JsonRejection) -> Response {
    error_response(StatusCode::BAD_REQUEST, "INVALID_REQUEST", rejection.body_text())
}

/// Map a component error to a response. Fatal errors are also forwarded
/// to the supervisor.
fn handle_error(state: &AppState, e: Error) -> Response {
    match e {
        Error::NotPrimary(_) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "NOT_PRIMARY", e)
        }
        Error::InvalidRequest(_) => error_response(StatusCode::BAD_REQUEST, "INVALID_REQUEST", e),
        e if e.is_fatal() => {
            tracing::error!("Node {}: fatal error: {}", state.store.id(), e);
            let response =
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_FAILURE", &e);
            let _ = state.fatal_tx.send(e);
            response
        }
        e => error_response(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", e),
    }
}

async fn not_primary(state: &AppState) -> Response {
    let primary_id = state.store.primary_id().await;
    error_response(
        StatusCode::SERVICE_UNAVAILABLE,
        "NOT_PRIMARY",
        Error::NotPrimary(primary_id),
    )
}

// ============ Handlers ============

async fn handle_heartbeat() -> &'static str {
    "ACK"
}

/// Answering is the "alive" reply; our own campaign runs in the background
async fn handle_election(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.election.on_election_message();
    (StatusCode::OK, "OK")
}

async fn handle_coordinator(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<CoordinatorMessage>, JsonRejection>,
) -> Response {
    let Json(msg) = match payload {
        Ok(msg) => msg,
        Err(rejection) => return bad_request(rejection),
    };

    state.election.on_coordinator_message(msg.primary_id).await;
    (StatusCode::OK, "OK").into_response()
}

async fn handle_event(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<EventRequest>, JsonRejection>,
) -> Response {
    // Role first: a secondary answers 503 whatever the body looks like
    if !state.store.is_primary().await {
        return not_primary(&state).await;
    }

    let Json(req) = match payload {
        Ok(req) => req,
        Err(rejection) => return bad_request(rejection),
    };

    match state.replicator.submit_event(req.value).await {
        Ok((event, sequence_number)) => (
            StatusCode::CREATED,
            Json(EventResponse {
                success: true,
                event,
                sequence_number,
            }),
        )
            .into_response(),
        Err(e) => handle_error(&state, e),
    }
}

async fn handle_state_update(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<ReplicatedState>, JsonRejection>,
) -> Response {
    let Json(update) = match payload {
        Ok(update) => update,
        Err(rejection) => return bad_request(rejection),
    };

    match state.replicator.apply_state(update).await {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(e) => handle_error(&state, e),
    }
}

async fn handle_state(State(state): State<Arc<AppState>>) -> Response {
    if !state.store.is_primary().await {
        return not_primary(&state).await;
    }
    Json(state.store.snapshot().await).into_response()
}

async fn handle_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let role = state.store.role().await;
    let log = state.store.snapshot().await;

    Json(StatusResponse {
        node_id: state.store.id(),
        is_primary: role.is_primary,
        primary_id: role.primary_id,
        election_in_progress: state.store.election_in_progress(),
        sequence_number: log.sequence_number,
        event_count: log.event_log.len(),
        peers: state
            .store
            .peers()
            .iter()
            .map(|(id, address)| PeerEntry {
                id: *id,
                address: address.clone(),
            })
            .collect(),
        started_at: state.started_at,
    })
}
