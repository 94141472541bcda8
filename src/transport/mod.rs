// Transport adapters
// Each adapter issues one add call and returns the server's answer

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::CallError;

pub mod grpc;
pub mod rest;
pub mod rpc;

pub use grpc::GrpcTransport;
pub use rest::RestTransport;
pub use rpc::RpcTransport;

/// Operands for one add call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddArgs {
    #[serde(rename = "A")]
    pub a: i32,
    #[serde(rename = "B")]
    pub b: i32,
}

impl AddArgs {
    /// Fixed request issued before the timed region
    pub const WARMUP: AddArgs = AddArgs { a: 1, b: 2 };

    pub fn new(a: i32, b: i32) -> Self {
        Self { a, b }
    }

    /// The result a correct server returns
    pub fn expected(&self) -> i32 {
        self.a.wrapping_add(self.b)
    }
}

/// Reply body of an add call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddReply {
    #[serde(rename = "Result")]
    pub result: i32,
}

/// A transport that can issue add calls concurrently from many workers.
///
/// Returns `Ok(Some(result))` when the server's answer was decoded and
/// `Ok(None)` when the adapter was told not to read it.
pub trait AddTransport: Send + Sync + 'static {
    fn add(&self, args: AddArgs) -> impl Future<Output = Result<Option<i32>, CallError>> + Send;
}

/// Transport selector, also used to name the profile artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Rest,
    NetRpc,
    Grpc,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Rest => write!(f, "rest"),
            TransportKind::NetRpc => write!(f, "net_rpc"),
            TransportKind::Grpc => write!(f, "grpc"),
        }
    }
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rest" | "http" => Ok(TransportKind::Rest),
            "rpc" | "net_rpc" | "netrpc" => Ok(TransportKind::NetRpc),
            "grpc" => Ok(TransportKind::Grpc),
            _ => Err(format!("Unknown transport: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_args_wire_names() {
        let json = serde_json::to_value(AddArgs::new(3, 4)).unwrap();
        assert_eq!(json, serde_json::json!({"A": 3, "B": 4}));

        let reply: AddReply = serde_json::from_str(r#"{"Result": 7}"#).unwrap();
        assert_eq!(reply.result, 7);
    }

    #[test]
    fn test_expected_result() {
        assert_eq!(AddArgs::WARMUP.expected(), 3);
        assert_eq!(AddArgs::new(999, 999).expected(), 1998);
    }

    #[test]
    fn test_transport_kind_parsing() {
        assert_eq!("rest".parse::<TransportKind>().unwrap(), TransportKind::Rest);
        assert_eq!("RPC".parse::<TransportKind>().unwrap(), TransportKind::NetRpc);
        assert_eq!("grpc".parse::<TransportKind>().unwrap(), TransportKind::Grpc);
        assert!("soap".parse::<TransportKind>().is_err());
    }

    #[test]
    fn test_transport_kind_display() {
        assert_eq!(TransportKind::Rest.to_string(), "rest");
        assert_eq!(TransportKind::NetRpc.to_string(), "net_rpc");
        assert_eq!(TransportKind::Grpc.to_string(), "grpc");
    }
}
