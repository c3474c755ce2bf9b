//! # shuttle-server
//!
//! Axum HTTP + WebSocket server for live shuttle positions.
//!
//! - [`websocket::hub::ConnectionHub`] owns the set of open subscriber connections
//! - [`websocket::dispatcher::BroadcastDispatcher`] fans registry snapshots out to every connection
//! - [`websocket::heartbeat::HeartbeatMonitor`] probes connections and prunes the dead ones
//! - [`websocket::ingest`] applies inbound location updates to the registry
//! - [`server::TrackerServer`] wires them together behind the HTTP routes

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod websocket;
