use std::process::ExitCode;
use std::time::Duration;

use add_bench::auth::{fetch_token, load_tls_credentials};
use add_bench::bench::{BenchmarkReport, BenchmarkRunner, MockRestServer, MockRpcServer};
use add_bench::config::{Config, GrpcTarget, Target, TokenSource};
use add_bench::error::{BenchError, Result};
use add_bench::transport::{GrpcTransport, RestTransport, RpcTransport, TransportKind};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::load().and_then(|config| config.validate().map(|_| config)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging with the configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::debug!("Run configuration: {:?}", config.run);

    match run(&config).await {
        Ok(report) => {
            if config.json {
                println!("{}", report.to_json());
            } else {
                report.print_table();
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Benchmark aborted: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &Config) -> Result<BenchmarkReport> {
    let run = config.run.clone();

    match &config.target {
        Target::Rest {
            url,
            verify,
            timeout_secs,
        } => {
            BenchmarkRunner::execute(run, async {
                RestTransport::new(url, *timeout_secs, *verify)
            })
            .await
        }
        Target::Rpc {
            addr,
            connect_timeout_secs,
        } => {
            BenchmarkRunner::execute(
                run,
                RpcTransport::connect(addr, Duration::from_secs(*connect_timeout_secs)),
            )
            .await
        }
        Target::Grpc(grpc) => BenchmarkRunner::execute(run, connect_grpc(grpc)).await,
        Target::Standalone { transport, mock } => match transport {
            TransportKind::Rest => {
                let mut server = MockRestServer::new(mock.clone());
                server.start().await?;
                let url = server.url();
                tracing::info!("Mock REST server started at {}", url);

                let mut run = run;
                run.target = url.clone();
                let report =
                    BenchmarkRunner::execute(run, async { RestTransport::new(&url, 30, true) })
                        .await;
                server.stop();
                report
            }
            TransportKind::NetRpc => {
                let mut server = MockRpcServer::new(mock.clone());
                server.start().await?;
                let addr = server.addr();
                tracing::info!("Mock RPC server started at {}", addr);

                let mut run = run;
                run.target = addr.clone();
                let report = BenchmarkRunner::execute(
                    run,
                    RpcTransport::connect(&addr, Duration::from_secs(10)),
                )
                .await;
                server.stop();
                report
            }
            TransportKind::Grpc => Err(BenchError::Config(
                "Standalone mode supports rest and rpc only".to_string(),
            )),
        },
    }
}

/// Acquire the bearer token and TLS material, then dial
async fn connect_grpc(grpc: &GrpcTarget) -> Result<GrpcTransport> {
    let token = match &grpc.token {
        TokenSource::Static(token) => token.clone(),
        TokenSource::ClientCredentials(creds) => {
            let client = reqwest::Client::builder()
                .timeout(grpc.options.request_timeout)
                .build()
                .map_err(|e| BenchError::Token(e.to_string()))?;
            fetch_token(&client, creds).await?
        }
    };

    let tls = load_tls_credentials(&grpc.tls)?;
    GrpcTransport::connect(&grpc.url, tls, &token, &grpc.options).await
}
