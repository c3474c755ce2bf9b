//! End-to-end tests over real HTTP and WebSocket clients.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use shuttle_server::config::ServerConfig;
use shuttle_server::server::TrackerServer;
use shuttle_server::websocket::connection::CloseReason;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

struct TestServer {
    base: String,
    ws_url: String,
    server: Arc<TrackerServer>,
    handle: JoinHandle<()>,
    http: reqwest::Client,
}

/// Boot a server on an ephemeral port.
async fn boot_server_with(config: ServerConfig) -> TestServer {
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .build_recorder()
        .handle();
    let server = Arc::new(TrackerServer::new(config, metrics_handle));
    let (addr, handle) = server.listen().await.unwrap();
    TestServer {
        base: format!("http://{addr}"),
        ws_url: format!("ws://{addr}/ws"),
        server,
        handle,
        http: reqwest::Client::new(),
    }
}

async fn boot_server() -> TestServer {
    boot_server_with(ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        ..ServerConfig::default()
    })
    .await
}

impl TestServer {
    async fn connect(&self) -> WsStream {
        let (ws, _) = timeout(TIMEOUT, connect_async(&self.ws_url))
            .await
            .unwrap()
            .unwrap();
        ws
    }

    async fn wait_for_connections(&self, n: usize) {
        timeout(TIMEOUT, async {
            while self.server.hub().connection_count() != n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.http
            .post(format!("{}{path}", self.base))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn delete(&self, path: &str, body: Value) -> reqwest::Response {
        self.http
            .delete(format!("{}{path}", self.base))
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}

/// Next data or close frame, skipping control frames.
async fn next_frame(ws: &mut WsStream) -> Option<Message> {
    timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(msg)) => return Some(msg),
                Some(Err(_)) | None => return None,
            }
        }
    })
    .await
    .unwrap()
}

async fn next_snapshot(ws: &mut WsStream) -> Value {
    match next_frame(ws).await {
        Some(Message::Text(text)) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected snapshot, got {other:?}"),
    }
}

#[tokio::test]
async fn end_to_end_publish_and_delete() {
    let ts = boot_server().await;

    let resp = ts.post("/create_driver", json!({"id": "D1"})).await;
    assert_eq!(resp.status(), 200);

    let mut subscriber = ts.connect().await;
    let mut publisher = ts.connect().await;
    ts.wait_for_connections(2).await;

    publisher
        .send(Message::Text(
            json!({"id": "D1", "latitude": 40.0, "longitude": -73.0})
                .to_string()
                .into(),
        ))
        .await
        .unwrap();

    let snapshot = next_snapshot(&mut subscriber).await;
    assert_eq!(
        snapshot,
        json!([{"id": "D1", "latitude": 40.0, "longitude": -73.0}])
    );

    let resp = ts.delete("/delete_driver", json!({"id": "D1"})).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "Driver deleted successfully");

    assert_eq!(next_snapshot(&mut subscriber).await, json!([]));
}

#[tokio::test]
async fn malformed_payload_closes_connection() {
    let ts = boot_server().await;
    let mut ws = ts.connect().await;
    ts.wait_for_connections(1).await;

    ws.send(Message::Text("not a location".into())).await.unwrap();

    match next_frame(&mut ws).await {
        Some(Message::Close(Some(frame))) => assert_eq!(u16::from(frame.code), 1007),
        Some(Message::Close(None)) | None => {}
        other => panic!("expected close, got {other:?}"),
    }
    ts.wait_for_connections(0).await;
}

#[tokio::test]
async fn rejected_update_keeps_connection_open() {
    let ts = boot_server().await;
    let _ = ts.post("/create_driver", json!({"id": "D1"})).await;
    let mut ws = ts.connect().await;
    ts.wait_for_connections(1).await;

    ws.send(Message::Text(
        json!({"id": "D1", "latitude": 91.0, "longitude": 0.0})
            .to_string()
            .into(),
    ))
    .await
    .unwrap();
    ws.send(Message::Text(
        json!({"id": "D1", "latitude": 34.0522, "longitude": -118.2437})
            .to_string()
            .into(),
    ))
    .await
    .unwrap();

    assert_eq!(
        next_snapshot(&mut ws).await,
        json!([{"id": "D1", "latitude": 34.0522, "longitude": -118.2437}])
    );
    assert_eq!(ts.server.hub().connection_count(), 1);
}

#[tokio::test]
async fn three_subscribers_receive_identical_snapshot() {
    let ts = boot_server().await;
    let _ = ts.post("/create_driver", json!({"id": "D1"})).await;
    let _ = ts.post("/create_driver", json!({"id": "D2"})).await;

    let mut clients = vec![ts.connect().await, ts.connect().await, ts.connect().await];
    ts.wait_for_connections(3).await;

    let _ = ts.delete("/delete_driver", json!({"id": "D1"})).await;
    let mut received = Vec::new();
    for ws in &mut clients {
        received.push(next_snapshot(ws).await);
    }
    assert!(received.iter().all(|s| s == &received[0]));
    assert_eq!(
        received[0],
        json!([{"id": "D2", "latitude": 0.0, "longitude": 0.0}])
    );

    // Drop one from the hub; it gets a close frame, the others the next snapshot.
    let victim = ts.server.hub().active_connections()[0].id.clone();
    assert!(
        ts.server
            .hub()
            .unregister(&victim, CloseReason::HeartbeatTimeout)
    );
    let _ = ts.delete("/delete_driver", json!({"id": "D2"})).await;

    let mut snapshots = 0;
    let mut closed = 0;
    for ws in &mut clients {
        match next_frame(ws).await {
            Some(Message::Text(text)) => {
                assert_eq!(text.as_str(), "[]");
                snapshots += 1;
            }
            Some(Message::Close(_)) | None => closed += 1,
            other => panic!("unexpected frame {other:?}"),
        }
    }
    assert_eq!((snapshots, closed), (2, 1));
}

#[tokio::test]
async fn shutdown_closes_connections_with_going_away() {
    let ts = boot_server().await;
    let mut ws = ts.connect().await;
    ts.wait_for_connections(1).await;

    ts.server.shutdown().shutdown();

    match next_frame(&mut ws).await {
        Some(Message::Close(Some(frame))) => {
            assert_eq!(u16::from(frame.code), 1001);
            assert_eq!(frame.reason.as_str(), "server shutting down");
        }
        other => panic!("expected close frame, got {other:?}"),
    }
    timeout(TIMEOUT, ts.handle).await.unwrap().unwrap();
    assert_eq!(ts.server.hub().connection_count(), 0);
}

#[tokio::test]
async fn upgrade_refused_over_connection_limit() {
    let ts = boot_server_with(ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        max_connections: 1,
        ..ServerConfig::default()
    })
    .await;
    let _first = ts.connect().await;
    ts.wait_for_connections(1).await;

    match connect_async(&ts.ws_url).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(resp)) => {
            assert_eq!(resp.status(), 503);
        }
        other => panic!("expected 503, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn health_and_listings_over_http() {
    let ts = boot_server().await;
    let _ = ts.post("/create_driver", json!({"id": "D1"})).await;
    let _ = ts.post("/create_passenger", json!({"id": "P1"})).await;
    let _ws = ts.connect().await;
    ts.wait_for_connections(1).await;

    let health: Value = ts
        .http
        .get(format!("{}/health", ts.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["connections"], 1);
    assert_eq!(health["drivers"], 1);
    assert_eq!(health["passengers"], 1);

    let drivers: Value = ts
        .http
        .get(format!("{}/drivers", ts.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(drivers, json!([{"id": "D1", "latitude": 0.0, "longitude": 0.0}]));

    let resp = ts.post("/create_passenger", json!({"id": "P1"})).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(resp.text().await.unwrap(), "passenger already exists: P1");
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let ts = boot_server().await;
    let resp = ts
        .http
        .get(format!("{}/health", ts.base))
        .header("origin", "http://example.com")
        .send()
        .await
        .unwrap();
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}
