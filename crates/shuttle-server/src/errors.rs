//! Server error types and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shuttle_core::RegistryError;
use thiserror::Error;

/// Connection-level failures. Handled inside the hub: the connection is
/// unregistered and the failure is logged, never surfaced to registry callers.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The per-connection send queue is full; the client is not keeping up.
    #[error("send queue full")]
    QueueFull,
    /// The connection's writer has gone away.
    #[error("connection closed")]
    Closed,
    /// Reading from or writing to the socket failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] axum::Error),
    /// An inbound message was not a valid location update.
    #[error("malformed location update: {0}")]
    Decode(#[from] serde_json::Error),
    /// A binary frame did not contain UTF-8 text.
    #[error("binary frame is not valid UTF-8")]
    NonUtf8,
}

/// Server startup failures.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding the listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that could not be bound.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// `listen` was called more than once.
    #[error("server already started")]
    AlreadyStarted,
}

/// Error returned by management HTTP handlers. Rendered as a plain-text body.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A registry operation failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// The request body could not be decoded.
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Registry(RegistryError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Registry(
                RegistryError::InvalidId { .. }
                | RegistryError::DuplicateId { .. }
                | RegistryError::OutOfRange { .. },
            )
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shuttle_core::{Coordinate, EntityKind};

    #[test]
    fn registry_errors_map_to_status() {
        let cases = [
            (
                RegistryError::InvalidId {
                    kind: EntityKind::Driver,
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                RegistryError::DuplicateId {
                    kind: EntityKind::Driver,
                    id: "D1".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                RegistryError::OutOfRange {
                    coordinate: Coordinate::Latitude,
                    value: 91.0,
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                RegistryError::NotFound {
                    kind: EntityKind::Passenger,
                    id: "P1".into(),
                },
                StatusCode::NOT_FOUND,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn api_error_body_is_message() {
        let err = ApiError::from(RegistryError::InvalidId {
            kind: EntityKind::Driver,
        });
        assert_eq!(err.to_string(), "driver ID cannot be empty");
    }

    #[test]
    fn bad_request_status() {
        assert_eq!(
            ApiError::BadRequest("Invalid request body".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn transport_error_display() {
        assert_eq!(TransportError::QueueFull.to_string(), "send queue full");
        let decode = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(
            TransportError::from(decode)
                .to_string()
                .starts_with("malformed location update")
        );
    }

    #[test]
    fn bind_error_names_address() {
        let err = ServerError::Bind {
            addr: "0.0.0.0:80".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("0.0.0.0:80"));
    }
}
