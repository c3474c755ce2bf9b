//! Inbound location updates.
//!
//! Each connection runs one ingest loop. Text frames (and binary frames that
//! hold UTF-8) are decoded as `{"id", "latitude", "longitude"}` and applied
//! to the registry; a successful update enqueues a snapshot for broadcast.
//! A frame that does not decode ends the loop and the connection. A decoded
//! update the registry rejects (unknown driver, out-of-range position) is
//! logged and the connection stays open.

use axum::extract::ws::Message;
use futures::{Stream, StreamExt};
use metrics::counter;
use shuttle_core::{EntityRegistry, LocationUpdate};
use tracing::{debug, info, warn};

use super::connection::{ClientConnection, CloseReason};
use crate::errors::TransportError;
use crate::metrics::{LOCATION_UPDATES_REJECTED_TOTAL, LOCATION_UPDATES_TOTAL};

/// Decode one inbound message and apply it.
///
/// Returns `Err` only for undecodable input.
pub fn handle_publish(text: &str, registry: &EntityRegistry) -> Result<(), TransportError> {
    let update = LocationUpdate::decode(text)?;
    match registry.apply(&update) {
        Ok(driver) => {
            counter!(LOCATION_UPDATES_TOTAL).increment(1);
            let snapshot = registry.publish_snapshot();
            debug!(
                driver_id = %driver.id,
                latitude = driver.latitude,
                longitude = driver.longitude,
                version = snapshot.version(),
                "location update applied"
            );
        }
        Err(e) => {
            counter!(LOCATION_UPDATES_REJECTED_TOTAL, "code" => e.code()).increment(1);
            warn!(driver_id = %update.id, code = e.code(), error = %e, "location update rejected");
        }
    }
    Ok(())
}

/// Read frames until the client leaves, a frame is malformed, the socket
/// fails, or the connection is closed from elsewhere.
///
/// Returns the reason the loop ended.
pub async fn ingest_loop<S>(
    mut ws_rx: S,
    conn: &ClientConnection,
    registry: &EntityRegistry,
) -> CloseReason
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;
            () = conn.closed() => {
                return conn.close_reason().unwrap_or(CloseReason::Shutdown);
            }
            next = ws_rx.next() => next,
        };

        let msg = match next {
            None => return CloseReason::ClientClosed,
            Some(Err(e)) => {
                debug!(conn_id = %conn.id, error = %e, "websocket read failed");
                return CloseReason::ReadFailure;
            }
            Some(Ok(msg)) => msg,
        };
        conn.touch();

        let result = match msg {
            Message::Text(text) => handle_publish(text.as_str(), registry),
            Message::Binary(data) => std::str::from_utf8(&data)
                .map_err(|_| TransportError::NonUtf8)
                .and_then(|text| handle_publish(text, registry)),
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => {
                info!(conn_id = %conn.id, "client sent close frame");
                return CloseReason::ClientClosed;
            }
        };

        if let Err(e) = result {
            warn!(conn_id = %conn.id, error = %e, "closing connection on malformed message");
            return CloseReason::MalformedMessage;
        }
    }
}
