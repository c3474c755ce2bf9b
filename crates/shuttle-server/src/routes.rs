//! HTTP handlers: entity management, listings, health, metrics, and the
//! WebSocket upgrade.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use metrics::counter;
use serde::Deserialize;
use shuttle_core::{Driver, Passenger, Snapshot};
use tracing::{debug, warn};

use crate::errors::ApiError;
use crate::health::{self, HealthResponse};
use crate::metrics::WS_CONNECTIONS_REFUSED_TOTAL;
use crate::server::AppState;
use crate::websocket::connection::ConnectionId;
use crate::websocket::session::run_ws_session;

/// Body of every management request.
#[derive(Debug, Deserialize)]
pub struct EntityRequest {
    /// Entity identifier.
    pub id: String,
}

type ApiResult<T> = Result<T, ApiError>;

fn entity_id(payload: Result<Json<EntityRequest>, JsonRejection>) -> ApiResult<String> {
    match payload {
        Ok(Json(req)) => Ok(req.id),
        Err(rejection) => {
            debug!(error = %rejection, "rejected request body");
            Err(ApiError::BadRequest("Invalid request body".into()))
        }
    }
}

/// POST /create_driver
pub async fn create_driver(
    State(state): State<AppState>,
    payload: Result<Json<EntityRequest>, JsonRejection>,
) -> ApiResult<Json<Driver>> {
    let id = entity_id(payload)?;
    Ok(Json(state.registry.create_driver(&id)?))
}

/// DELETE /delete_driver
pub async fn delete_driver(
    State(state): State<AppState>,
    payload: Result<Json<EntityRequest>, JsonRejection>,
) -> ApiResult<&'static str> {
    let id = entity_id(payload)?;
    state.registry.delete_driver(&id)?;
    Ok("Driver deleted successfully")
}

/// POST /create_passenger
pub async fn create_passenger(
    State(state): State<AppState>,
    payload: Result<Json<EntityRequest>, JsonRejection>,
) -> ApiResult<Json<Passenger>> {
    let id = entity_id(payload)?;
    Ok(Json(state.registry.create_passenger(&id)?))
}

/// DELETE /delete_passenger
pub async fn delete_passenger(
    State(state): State<AppState>,
    payload: Result<Json<EntityRequest>, JsonRejection>,
) -> ApiResult<&'static str> {
    let id = entity_id(payload)?;
    state.registry.delete_passenger(&id)?;
    Ok("Passenger deleted successfully")
}

/// GET /drivers
pub async fn list_drivers(State(state): State<AppState>) -> Json<Snapshot> {
    Json(state.registry.snapshot())
}

/// GET /passengers
pub async fn list_passengers(State(state): State<AppState>) -> Json<Vec<Passenger>> {
    Json(state.registry.passengers())
}

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.hub.connection_count(),
        state.registry.driver_count(),
        state.registry.passenger_count(),
    ))
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics)
}

/// GET /ws
///
/// Upgrades over the limit are answered with 503 here. Upgrades racing past
/// this check are refused by the hub on registration and closed with 1013.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    if state.shutdown.is_shutting_down() || state.hub.is_closed() {
        return (StatusCode::SERVICE_UNAVAILABLE, "server shutting down").into_response();
    }
    let open = state.hub.connection_count();
    if open >= state.hub.limit() {
        warn!(open, max = state.hub.limit(), "refusing websocket upgrade");
        counter!(WS_CONNECTIONS_REFUSED_TOTAL).increment(1);
        return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
    }

    let send_queue = state.config.send_queue_capacity;
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| {
            run_ws_session(
                socket,
                ConnectionId::new(),
                state.registry,
                state.hub,
                send_queue,
            )
        })
}
