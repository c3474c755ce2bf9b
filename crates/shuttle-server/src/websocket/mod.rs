//! WebSocket transport: connections, hub, fan-out, liveness, and ingest.

pub mod connection;
pub mod dispatcher;
pub mod heartbeat;
pub mod hub;
pub mod ingest;
pub mod session;
