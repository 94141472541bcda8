//! Mock add servers for standalone runs and tests.
//!
//! `MockRestServer` answers `GET /add?a=..&b=..` with `{"result": a+b}`.
//! `MockRpcServer` answers `AddService.Add` in the JSON-RPC framing used by
//! the RPC transport, handling calls on one connection concurrently.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use rand::Rng;
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use super::config::MockServerConfig;
use crate::transport::rpc::{RpcRequest, RpcResponse, ADD_METHOD, MAX_FRAME_LEN};
use crate::transport::{AddArgs, AddReply};

/// What the mock decides to answer for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Sum(i32),
    Fail,
}

async fn answer(config: &MockServerConfig, args: AddArgs) -> Answer {
    if config.latency_ms > 0 {
        tokio::time::sleep(tokio::time::Duration::from_millis(config.latency_ms)).await;
    }

    let roll: f64 = rand::thread_rng().gen();
    if roll < config.error_rate {
        Answer::Fail
    } else if roll < config.error_rate + config.wrong_result_rate {
        Answer::Sum(args.expected().wrapping_add(1))
    } else {
        Answer::Sum(args.expected())
    }
}

/// Handle used to stop a running mock server
struct Running {
    shutdown_tx: Option<oneshot::Sender<()>>,
    port: u16,
}

impl Running {
    fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

// ==================================================================================================
// REST
// ==================================================================================================

#[derive(Debug, Deserialize)]
struct AddQuery {
    a: i32,
    b: i32,
}

/// Mock REST add server
pub struct MockRestServer {
    config: MockServerConfig,
    running: Running,
}

impl MockRestServer {
    /// Create a new mock server with the given configuration
    pub fn new(config: MockServerConfig) -> Self {
        Self {
            config,
            running: Running {
                shutdown_tx: None,
                port: 0,
            },
        }
    }

    /// Build the router without binding, for in-process tests
    pub fn router(config: MockServerConfig) -> Router {
        Router::new()
            .route("/add", get(handle_add))
            .with_state(Arc::new(config))
    }

    /// Start the mock server and return the actual port
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("127.0.0.1:{}", self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.running = Running {
            shutdown_tx: Some(shutdown_tx),
            port,
        };

        let app = Self::router(self.config.clone());
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        tracing::debug!("Mock REST server listening on 127.0.0.1:{}", port);
        Ok(port)
    }

    /// Get the server's URL
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.running.port)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        self.running.stop();
    }
}

impl Drop for MockRestServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_add(
    State(config): State<Arc<MockServerConfig>>,
    Query(query): Query<AddQuery>,
) -> Response {
    match answer(&config, AddArgs::new(query.a, query.b)).await {
        Answer::Sum(result) => Json(serde_json::json!({ "result": result })).into_response(),
        Answer::Fail => (StatusCode::INTERNAL_SERVER_ERROR, "Simulated error").into_response(),
    }
}

// ==================================================================================================
// JSON-RPC over TCP
// ==================================================================================================

/// Mock RPC add server
pub struct MockRpcServer {
    config: MockServerConfig,
    running: Running,
}

impl MockRpcServer {
    pub fn new(config: MockServerConfig) -> Self {
        Self {
            config,
            running: Running {
                shutdown_tx: None,
                port: 0,
            },
        }
    }

    /// Start accepting connections and return the actual port
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("127.0.0.1:{}", self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        self.running = Running {
            shutdown_tx: Some(shutdown_tx),
            port,
        };

        let config = Arc::new(self.config.clone());
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            tracing::debug!("Mock RPC connection from {}", peer);
                            tokio::spawn(serve_connection(stream, config.clone()));
                        }
                        Err(e) => {
                            tracing::warn!("Mock RPC accept failed: {}", e);
                            break;
                        }
                    },
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        tracing::debug!("Mock RPC server listening on 127.0.0.1:{}", port);
        Ok(port)
    }

    /// Get the server's address
    pub fn addr(&self) -> String {
        format!("127.0.0.1:{}", self.running.port)
    }

    pub fn stop(&mut self) {
        self.running.stop();
    }
}

impl Drop for MockRpcServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Read requests, answer each on its own task, funnel replies through one writer
async fn serve_connection(stream: TcpStream, config: Arc<MockServerConfig>) {
    let (read_half, write_half) = stream.into_split();
    let mut frames = FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_FRAME_LEN));
    let mut sink = FramedWrite::new(write_half, LinesCodec::new_with_max_length(MAX_FRAME_LEN));

    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        while let Some(frame) = reply_rx.recv().await {
            if sink.send(frame).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(line)) = frames.next().await {
        let request: RpcRequest<AddArgs> = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Mock RPC server got malformed request: {}", e);
                break;
            }
        };

        let config = config.clone();
        let reply_tx = reply_tx.clone();
        tokio::spawn(async move {
            let response = handle_rpc(&config, request).await;
            if let Ok(frame) = serde_json::to_string(&response) {
                let _ = reply_tx.send(frame);
            }
        });
    }

    drop(reply_tx);
    let _ = writer.await;
}

async fn handle_rpc(config: &MockServerConfig, request: RpcRequest<AddArgs>) -> RpcResponse<AddReply> {
    let failure = |message: String| RpcResponse {
        id: request.id,
        result: None,
        error: Some(message),
    };

    if request.method != ADD_METHOD {
        return failure(format!("rpc: can't find method {}", request.method));
    }
    let Some(args) = request.params.first().copied() else {
        return failure("rpc: missing params".to_string());
    };

    match answer(config, args).await {
        Answer::Sum(result) => RpcResponse {
            id: request.id,
            result: Some(AddReply { result }),
            error: None,
        },
        Answer::Fail => failure("simulated error".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_rest_router_adds() {
        let app = MockRestServer::router(MockServerConfig::default());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/add?a=20&b=22")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["result"], 42);
    }

    #[tokio::test]
    async fn test_rest_router_error_rate() {
        let app = MockRestServer::router(MockServerConfig {
            error_rate: 1.0,
            ..Default::default()
        });

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/add?a=1&b=2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_rest_server_starts() {
        let mut server = MockRestServer::new(MockServerConfig::default());
        let port = server.start().await.unwrap();
        assert!(port > 0);

        let resp = reqwest::get(format!("{}/add?a=1&b=2", server.url()))
            .await
            .unwrap();
        assert!(resp.status().is_success());
        server.stop();
    }

    #[tokio::test]
    async fn test_rpc_unknown_method() {
        let request = RpcRequest {
            method: "AddService.Sub".to_string(),
            params: vec![AddArgs::new(1, 2)],
            id: 9,
        };
        let response = handle_rpc(&MockServerConfig::default(), request).await;

        assert_eq!(response.id, 9);
        assert!(response.result.is_none());
        assert_eq!(
            response.error.as_deref(),
            Some("rpc: can't find method AddService.Sub")
        );
    }

    #[tokio::test]
    async fn test_rpc_wrong_result_rate() {
        let config = MockServerConfig {
            wrong_result_rate: 1.0,
            ..Default::default()
        };
        let request = RpcRequest {
            method: ADD_METHOD.to_string(),
            params: vec![AddArgs::new(1, 2)],
            id: 1,
        };
        let response = handle_rpc(&config, request).await;
        assert_eq!(response.result, Some(AddReply { result: 4 }));
    }
}
