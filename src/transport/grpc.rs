//! gRPC adapter for the `add.AddService` unary service.
//!
//! The message types and client stub mirror what `tonic-build` emits for
//!
//! ```proto
//! package add;
//! service AddService { rpc Add(AddRequest) returns (AddResponse); }
//! message AddRequest { int32 a = 1; int32 b = 2; }
//! message AddResponse { int32 result = 1; }
//! ```

use std::time::Duration;

use tonic::body::BoxBody;
use tonic::codegen::{Body, Bytes, InterceptedService, StdError};
use tonic::client::GrpcService;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::service::Interceptor;
use tonic::transport::{Channel, ClientTlsConfig};
use tonic::{Request, Status};

use super::{AddArgs, AddTransport};
use crate::error::{BenchError, CallError};

pub use add_service_client::AddServiceClient;

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct AddRequest {
    #[prost(int32, tag = "1")]
    pub a: i32,
    #[prost(int32, tag = "2")]
    pub b: i32,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct AddResponse {
    #[prost(int32, tag = "1")]
    pub result: i32,
}

pub mod add_service_client {
    use tonic::codegen::http;
    use tonic::codegen::{Body, Bytes, StdError};

    /// Full method path of `AddService.Add`
    pub const ADD_PATH: &str = "/add.AddService/Add";

    #[derive(Debug, Clone)]
    pub struct AddServiceClient<T> {
        inner: tonic::client::Grpc<T>,
    }

    impl<T> AddServiceClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            Self {
                inner: tonic::client::Grpc::new(inner),
            }
        }

        pub async fn add(
            &mut self,
            request: impl tonic::IntoRequest<super::AddRequest>,
        ) -> Result<tonic::Response<super::AddResponse>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(ADD_PATH);
            self.inner.unary(request.into_request(), path, codec).await
        }
    }
}

/// Attaches `authorization: Bearer <token>` to every call
#[derive(Clone)]
pub struct BearerAuth {
    header: MetadataValue<Ascii>,
}

impl BearerAuth {
    pub fn new(token: &str) -> crate::error::Result<Self> {
        let header = format!("Bearer {}", token)
            .parse::<MetadataValue<Ascii>>()
            .map_err(|e| BenchError::Token(format!("token is not a valid header value: {}", e)))?;
        Ok(Self { header })
    }
}

impl Interceptor for BearerAuth {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        request
            .metadata_mut()
            .insert("authorization", self.header.clone());
        Ok(request)
    }
}

/// TLS channel with bearer metadata on every request
pub type AuthedChannel = InterceptedService<Channel, BearerAuth>;

/// Channel timeouts
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// gRPC adapter. The client is cloned per call; clones share the channel.
pub struct GrpcTransport<T = AuthedChannel> {
    client: AddServiceClient<T>,
}

impl GrpcTransport<AuthedChannel> {
    /// Dial `url` over mTLS. The token is captured once and reused for every call.
    pub async fn connect(
        url: &str,
        tls: ClientTlsConfig,
        token: &str,
        options: &ChannelOptions,
    ) -> crate::error::Result<Self> {
        let auth = BearerAuth::new(token)?;

        let channel = Channel::from_shared(url.to_string())
            .map_err(|e| BenchError::Config(format!("invalid gRPC url {}: {}", url, e)))?
            .connect_timeout(options.connect_timeout)
            .timeout(options.request_timeout)
            .tls_config(tls)
            .map_err(|e| BenchError::Tls(e.to_string()))?
            .connect()
            .await
            .map_err(|e| BenchError::connect(url, format_transport_error(&e)))?;

        tracing::debug!(url = %url, "gRPC channel established");

        Ok(Self::from_service(InterceptedService::new(channel, auth)))
    }
}

impl<T> GrpcTransport<T>
where
    T: GrpcService<BoxBody>,
    T::Error: Into<StdError>,
    T::ResponseBody: Body<Data = Bytes> + Send + 'static,
    <T::ResponseBody as Body>::Error: Into<StdError> + Send,
{
    /// Wrap an already-built service stack
    pub fn from_service(service: T) -> Self {
        Self {
            client: AddServiceClient::new(service),
        }
    }
}

impl<T> AddTransport for GrpcTransport<T>
where
    T: GrpcService<BoxBody> + Clone + Send + Sync + 'static,
    T::Error: Into<StdError>,
    T::Future: Send,
    T::ResponseBody: Body<Data = Bytes> + Send + 'static,
    <T::ResponseBody as Body>::Error: Into<StdError> + Send,
{
    async fn add(&self, args: AddArgs) -> Result<Option<i32>, CallError> {
        let mut client = self.client.clone();
        let response = client
            .add(AddRequest {
                a: args.a,
                b: args.b,
            })
            .await?;
        Ok(Some(response.into_inner().result))
    }
}

/// tonic's transport error hides the cause behind `source()`
fn format_transport_error(err: &tonic::transport::Error) -> String {
    use std::error::Error as _;

    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
