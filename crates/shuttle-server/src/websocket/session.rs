//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::counter;
use shuttle_core::EntityRegistry;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use super::connection::{ClientConnection, CloseReason, ConnectionId, Outbound};
use super::hub::ConnectionHub;
use super::ingest::ingest_loop;
use crate::metrics::{WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};

/// Time the writer gets to flush the close frame once the connection closes.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Time the session waits for its writer before aborting it.
const WRITER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Run a WebSocket session for a connected client.
#[instrument(skip_all, fields(conn_id = %id))]
pub async fn run_ws_session(
    ws: WebSocket,
    id: ConnectionId,
    registry: Arc<EntityRegistry>,
    hub: Arc<ConnectionHub>,
    send_queue: usize,
) {
    let (ws_tx, ws_rx) = ws.split();
    let (tx, rx) = mpsc::channel(send_queue.max(1));
    let conn = Arc::new(ClientConnection::new(id, tx));
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    drive_session(ws_tx, ws_rx, rx, conn, &registry, &hub).await;
}

/// Drive one connection over an already split transport.
///
/// 1. Registers the connection with the hub; a refusal sends the matching
///    close frame and returns
/// 2. Spawns the writer that drains the connection's send queue
/// 3. Runs the ingest loop on the read half
/// 4. Unregisters, joins the writer (aborting it if the socket is stuck),
///    marks `Closed`
///
/// Both transport halves are dropped by the time this returns.
pub async fn drive_session<W, R>(
    ws_tx: W,
    ws_rx: R,
    rx: mpsc::Receiver<Outbound>,
    conn: Arc<ClientConnection>,
    registry: &EntityRegistry,
    hub: &Arc<ConnectionHub>,
) where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display + Send,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    if let Err(reason) = hub.register(conn.clone()) {
        info!(reason = %reason, "connection refused");
        let _ = conn.begin_close(reason);
        drop(ws_rx);
        write_loop(ws_tx, rx, conn.clone(), hub.clone()).await;
        conn.mark_closed();
        counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
        return;
    }
    info!("client connected");

    let mut writer = tokio::spawn(write_loop(ws_tx, rx, conn.clone(), hub.clone()));

    let ended = ingest_loop(ws_rx, &conn, registry).await;
    let _ = hub.unregister(&conn.id, ended);
    match timeout(WRITER_JOIN_TIMEOUT, &mut writer).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "writer task failed"),
        Err(_) => {
            warn!("writer did not finish, aborting");
            writer.abort();
        }
    }
    conn.mark_closed();

    let reason = conn.close_reason().unwrap_or(ended);
    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
    info!(
        reason = %reason,
        duration = ?conn.age(),
        dropped = conn.drop_count(),
        "client disconnected"
    );
}

/// Forward queued frames to the socket until the connection starts closing,
/// then send a close frame carrying the close reason.
///
/// A write in progress is abandoned as soon as the connection starts
/// closing, and the close frame gets [`CLOSE_FLUSH_TIMEOUT`], so a client
/// that stopped reading cannot hold the transport. A failed write
/// unregisters the connection.
pub async fn write_loop<S>(
    mut ws_tx: S,
    mut rx: mpsc::Receiver<Outbound>,
    conn: Arc<ClientConnection>,
    hub: Arc<ConnectionHub>,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    loop {
        let frame = tokio::select! {
            biased;
            () = conn.closed() => break,
            frame = rx.recv() => frame,
        };
        let Some(frame) = frame else { break };
        let msg = match frame {
            Outbound::Snapshot(text) => Message::Text(text),
            Outbound::Ping => Message::Ping(Bytes::new()),
        };
        let sent = tokio::select! {
            biased;
            () = conn.closed() => break,
            sent = ws_tx.send(msg) => sent,
        };
        if let Err(e) = sent {
            warn!(conn_id = %conn.id, error = %e, "websocket write failed");
            let _ = hub.unregister(&conn.id, CloseReason::WriteFailure);
            return;
        }
    }

    let reason = conn.close_reason().unwrap_or(CloseReason::ClientClosed);
    let flush = async {
        if !matches!(reason, CloseReason::ClientClosed | CloseReason::ReadFailure) {
            let frame = CloseFrame {
                code: reason.close_code(),
                reason: Utf8Bytes::from_static(reason.as_str()),
            };
            let _ = ws_tx.send(Message::Close(Some(frame))).await;
        }
        let _ = ws_tx.close().await;
    };
    if timeout(CLOSE_FLUSH_TIMEOUT, flush).await.is_err() {
        debug!(conn_id = %conn.id, reason = %reason, "close frame not flushed, dropping transport");
    }
}
