// Error handling module
// Defines setup (fatal) and per-call (non-fatal) error types

use thiserror::Error;

/// Errors that abort a benchmark run before any timed request is issued
#[derive(Error, Debug)]
pub enum BenchError {
    /// Dial or channel setup failed
    #[error("Connection to {target} failed: {message}")]
    Connect { target: String, message: String },

    /// Certificate or key could not be loaded
    #[error("TLS credentials error: {0}")]
    Tls(String),

    /// Bearer token could not be obtained
    #[error("Token fetch failed: {0}")]
    Token(String),

    /// Profiler could not be started or its output written
    #[error("Profiler error: {0}")]
    Profile(String),

    /// Invalid run configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Anything else surfaced during setup
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl BenchError {
    /// Build a connect error from any displayable cause
    pub fn connect(target: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        BenchError::Connect {
            target: target.into(),
            message: cause.to_string(),
        }
    }
}

/// Errors from a single add call. The runner logs these and moves on.
#[derive(Error, Debug)]
pub enum CallError {
    /// Request could not be sent or the response could not be read
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success HTTP status
    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body did not contain a result
    #[error("Decode error: {0}")]
    Decode(String),

    /// RPC server returned an error string
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC connection is gone
    #[error("Connection closed")]
    Disconnected,

    /// gRPC call failed
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),
}

/// Result type alias for setup operations
pub type Result<T> = std::result::Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_error_messages() {
        let err = BenchError::connect("localhost:8081", "connection refused");
        assert_eq!(
            err.to_string(),
            "Connection to localhost:8081 failed: connection refused"
        );

        let err = BenchError::Tls("missing client.crt".to_string());
        assert_eq!(err.to_string(), "TLS credentials error: missing client.crt");

        let err = BenchError::Token("401 Unauthorized".to_string());
        assert_eq!(err.to_string(), "Token fetch failed: 401 Unauthorized");
    }

    #[test]
    fn test_internal_error_message() {
        let err = BenchError::Internal(anyhow::anyhow!("Something went wrong"));
        assert_eq!(err.to_string(), "Internal error: Something went wrong");
    }

    #[test]
    fn test_call_error_messages() {
        let err = CallError::Status {
            status: 503,
            body: "unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP status 503: unavailable");

        assert_eq!(CallError::Disconnected.to_string(), "Connection closed");

        let err = CallError::Rpc("rpc: can't find method AddService.Sub".to_string());
        assert_eq!(
            err.to_string(),
            "RPC error: rpc: can't find method AddService.Sub"
        );
    }

    #[test]
    fn test_grpc_status_conversion() {
        let err: CallError = tonic::Status::unauthenticated("invalid token").into();
        assert!(matches!(err, CallError::Grpc(_)));
        assert!(err.to_string().contains("invalid token"));
    }
}
