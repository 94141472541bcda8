//! Request/reply RPC over one persistent TCP connection.
//!
//! Frames are newline-delimited JSON-RPC 1.0 objects, the encoding Go's
//! `net/rpc/jsonrpc` codec speaks:
//!
//! ```text
//! -> {"method":"AddService.Add","params":[{"A":1,"B":2}],"id":0}
//! <- {"id":0,"result":{"Result":3},"error":null}
//! ```
//!
//! Calls from many workers share the connection. Each call registers a
//! oneshot slot under its id; a background reader routes replies back.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use super::{AddArgs, AddReply, AddTransport};
use crate::error::{BenchError, CallError};

/// Method name the add server registers
pub const ADD_METHOD: &str = "AddService.Add";

/// Upper bound for a single frame
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// JSON-RPC request frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest<P> {
    pub method: String,
    pub params: Vec<P>,
    pub id: u64,
}

/// JSON-RPC response frame. Exactly one of `result` / `error` is non-null.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse<R> {
    pub id: u64,
    pub result: Option<R>,
    pub error: Option<String>,
}

type ReplySlot = oneshot::Sender<Result<serde_json::Value, CallError>>;

/// State shared between callers and the reader task
struct Inflight {
    pending: DashMap<u64, ReplySlot>,
    closed: AtomicBool,
}

impl Inflight {
    /// Fail every outstanding call once the connection is gone
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, slot)) = self.pending.remove(&id) {
                let _ = slot.send(Err(CallError::Disconnected));
            }
        }
    }
}

/// Binary-RPC adapter
pub struct RpcTransport {
    writer: Mutex<FramedWrite<OwnedWriteHalf, LinesCodec>>,
    inflight: Arc<Inflight>,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl RpcTransport {
    /// Dial the server and start the reply reader
    pub async fn connect(addr: &str, connect_timeout: Duration) -> crate::error::Result<Self> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| BenchError::connect(addr, "timed out"))?
            .map_err(|e| BenchError::connect(addr, e))?;
        stream
            .set_nodelay(true)
            .map_err(|e| BenchError::connect(addr, e))?;

        tracing::debug!(addr = %addr, "RPC connection established");

        let (read_half, write_half) = stream.into_split();
        let inflight = Arc::new(Inflight {
            pending: DashMap::new(),
            closed: AtomicBool::new(false),
        });

        let reader = tokio::spawn(read_replies(read_half, inflight.clone()));

        Ok(Self {
            writer: Mutex::new(FramedWrite::new(
                write_half,
                LinesCodec::new_with_max_length(MAX_FRAME_LEN),
            )),
            inflight,
            next_id: AtomicU64::new(0),
            reader,
        })
    }

    /// Issue one call and wait for its reply
    pub async fn call<P: Serialize>(
        &self,
        method: &str,
        params: P,
    ) -> Result<serde_json::Value, CallError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = serde_json::to_string(&RpcRequest {
            method: method.to_string(),
            params: vec![params],
            id,
        })
        .map_err(|e| CallError::Decode(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.inflight.pending.insert(id, tx);

        // The reader may have shut down between the insert and now
        if self.inflight.closed.load(Ordering::SeqCst)
            && self.inflight.pending.remove(&id).is_some()
        {
            return Err(CallError::Disconnected);
        }

        let sent = self.writer.lock().await.send(frame).await;
        if let Err(e) = sent {
            self.inflight.pending.remove(&id);
            return Err(CallError::Rpc(format!("write failed: {}", e)));
        }

        match rx.await {
            Ok(reply) => reply,
            Err(_) => Err(CallError::Disconnected),
        }
    }
}

impl AddTransport for RpcTransport {
    async fn add(&self, args: AddArgs) -> Result<Option<i32>, CallError> {
        let value = self.call(ADD_METHOD, args).await?;
        let reply: AddReply =
            serde_json::from_value(value).map_err(|e| CallError::Decode(e.to_string()))?;
        Ok(Some(reply.result))
    }
}

impl Drop for RpcTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Route each reply frame to the caller waiting on its id
async fn read_replies(read_half: OwnedReadHalf, inflight: Arc<Inflight>) {
    let mut frames = FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_FRAME_LEN));

    while let Some(frame) = frames.next().await {
        let line = match frame {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("RPC connection read failed: {}", e);
                break;
            }
        };

        let response: RpcResponse<serde_json::Value> = match serde_json::from_str(&line) {
            Ok(response) => response,
            Err(e) => {
                // Without an id the waiting caller cannot be told apart
                tracing::warn!("Malformed RPC frame, dropping connection: {}", e);
                break;
            }
        };

        let Some((_, slot)) = inflight.pending.remove(&response.id) else {
            tracing::debug!(id = response.id, "Reply for unknown call id");
            continue;
        };

        let outcome = match (response.error, response.result) {
            (Some(error), _) if !error.is_empty() => Err(CallError::Rpc(error)),
            (_, Some(result)) => Ok(result),
            _ => Err(CallError::Decode("reply has neither result nor error".to_string())),
        };
        let _ = slot.send(outcome);
    }

    tracing::debug!("RPC reader finished");
    inflight.close();
}
