//! `TrackerServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::{delete, get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use shuttle_core::{EntityRegistry, Snapshot};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::routes;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::connection::CloseReason;
use crate::websocket::dispatcher::BroadcastDispatcher;
use crate::websocket::hub::ConnectionHub;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Driver and passenger registry.
    pub registry: Arc<EntityRegistry>,
    /// Open WebSocket connections.
    pub hub: Arc<ConnectionHub>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Prometheus handle for rendering `/metrics`.
    pub metrics: PrometheusHandle,
}

/// The shuttle tracker server.
///
/// Owns the registry, the hub, and the shutdown signal. [`listen`](Self::listen)
/// starts the dispatcher, the heartbeat monitor, and the HTTP listener.
pub struct TrackerServer {
    config: Arc<ServerConfig>,
    registry: Arc<EntityRegistry>,
    hub: Arc<ConnectionHub>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: PrometheusHandle,
    dispatcher_rx: Mutex<Option<broadcast::Receiver<Snapshot>>>,
}

impl TrackerServer {
    /// Create a new server with an empty registry.
    pub fn new(config: ServerConfig, metrics: PrometheusHandle) -> Self {
        let registry = Arc::new(EntityRegistry::with_capacity(
            config.broadcast_queue_capacity,
        ));
        // Subscribe now so snapshots published before `listen` are not lost.
        let dispatcher_rx = registry.subscribe();
        let hub = Arc::new(ConnectionHub::with_limit(config.max_connections));
        Self {
            config: Arc::new(config),
            registry,
            hub,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics,
            dispatcher_rx: Mutex::new(Some(dispatcher_rx)),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            hub: self.hub.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            config: self.config.clone(),
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/create_driver", post(routes::create_driver))
            .route("/delete_driver", delete(routes::delete_driver))
            .route("/create_passenger", post(routes::create_passenger))
            .route("/delete_passenger", delete(routes::delete_passenger))
            .route("/drivers", get(routes::list_drivers))
            .route("/passengers", get(routes::list_passengers))
            .route("/health", get(routes::health_handler))
            .route("/metrics", get(routes::metrics_handler))
            .route("/ws", get(routes::ws_handler))
            .with_state(state)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the listener and start serving.
    ///
    /// Spawns the broadcast dispatcher and the heartbeat monitor, then the
    /// HTTP server. Returns the bound address and a handle that completes
    /// after [`ShutdownCoordinator::shutdown`] once every connection has been
    /// closed and the background tasks have stopped. Can be called once.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let rx = self
            .dispatcher_rx
            .lock()
            .take()
            .ok_or(ServerError::AlreadyStarted)?;

        let token = self.shutdown.token();
        let mut tasks = vec![tokio::spawn(
            BroadcastDispatcher::new(rx, self.hub.clone()).run(token.clone()),
        )];
        if let Some(monitor) = self.hub.heartbeat_monitor(self.config.heartbeat_interval()) {
            info!(interval = ?monitor.interval(), "starting heartbeat monitor");
            tasks.push(tokio::spawn(monitor.run(token.clone())));
        }

        let router = self.router();
        let hub = self.hub.clone();
        let shutdown = self.shutdown.clone();
        let timeout = self.config.shutdown_timeout();
        let handle = tokio::spawn(async move {
            let signal = async move {
                token.cancelled().await;
                let _ = hub.close_all(CloseReason::Shutdown);
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(signal)
                .await
            {
                error!(error = %e, "http server failed");
            }
            shutdown.graceful_shutdown(tasks, Some(timeout)).await;
            info!("server stopped");
        });

        info!(
            %local_addr,
            queue_capacity = self.registry.queue().capacity(),
            max_connections = self.hub.limit(),
            "shuttle tracker listening"
        );
        Ok((local_addr, handle))
    }

    /// The entity registry.
    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    /// The connection hub.
    pub fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
