// Configuration: command-line arguments with environment and .env fallbacks

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::{ClientCredentials, TlsPaths};
use crate::bench::{MockServerConfig, ProfileConfig, RunConfig};
use crate::transport::grpc::ChannelOptions;
use crate::transport::TransportKind;

/// Add service benchmark over REST, JSON-RPC and gRPC
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Total timed requests (default depends on transport)
    #[arg(short = 'n', long, env = "BENCH_REQUESTS", global = true)]
    pub requests: Option<u64>,

    /// Concurrent workers (default: available cores)
    #[arg(short = 'w', long, env = "BENCH_WORKERS", global = true)]
    pub workers: Option<usize>,

    /// Skip the warmup call
    #[arg(long, global = true)]
    pub no_warmup: bool,

    /// Directory for the CPU profile
    #[arg(long, env = "BENCH_PROFILE_DIR", default_value = ".", global = true)]
    pub profile_dir: String,

    /// CPU profile sampling frequency in Hz
    #[arg(long, default_value = "100", global = true)]
    pub profile_frequency: i32,

    /// Do not write a CPU profile
    #[arg(long, global = true)]
    pub no_profile: bool,

    /// Print the full report as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Benchmark the REST endpoint
    Rest {
        /// Base URL of the REST server
        #[arg(long, env = "REST_URL", default_value = "http://localhost:8080")]
        url: String,

        /// Do not parse the response body or check the sum
        #[arg(long)]
        no_verify: bool,

        /// HTTP request timeout in seconds
        #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
        timeout: u64,
    },

    /// Benchmark the JSON-RPC endpoint
    Rpc {
        /// host:port of the RPC server
        #[arg(long, env = "RPC_ADDR", default_value = "localhost:8081")]
        addr: String,

        /// Connect timeout in seconds
        #[arg(long, default_value = "10")]
        connect_timeout: u64,
    },

    /// Benchmark the gRPC endpoint over mTLS with a bearer token
    Grpc(GrpcArgs),

    /// Start a local mock server and benchmark it
    Standalone {
        /// Transport to exercise (rest or rpc)
        #[arg(short = 't', long, default_value = "rpc")]
        transport: TransportKind,

        /// Simulated server latency per call in milliseconds
        #[arg(long, default_value = "0")]
        latency_ms: u64,

        /// Fraction of calls the mock fails (0.0 to 1.0)
        #[arg(long, default_value = "0.0")]
        error_rate: f64,

        /// Fraction of calls the mock answers wrongly (0.0 to 1.0)
        #[arg(long, default_value = "0.0")]
        wrong_result_rate: f64,
    },
}

#[derive(Args, Debug, Clone)]
pub struct GrpcArgs {
    /// gRPC server URL
    #[arg(long, env = "GRPC_URL", default_value = "https://localhost:8082")]
    pub url: String,

    /// Client certificate (PEM)
    #[arg(long, env = "GRPC_CLIENT_CERT", default_value = "./client.crt")]
    pub client_cert: String,

    /// Client private key (PEM)
    #[arg(long, env = "GRPC_CLIENT_KEY", default_value = "./client.key")]
    pub client_key: String,

    /// Server or CA certificate to trust (PEM)
    #[arg(long, env = "GRPC_CA_CERT", default_value = "./server.crt")]
    pub ca_cert: String,

    /// Server name to verify instead of the URL host
    #[arg(long, env = "GRPC_TLS_DOMAIN")]
    pub tls_domain: Option<String>,

    /// Pre-issued bearer token (skips the OAuth2 fetch)
    #[arg(long, env = "GRPC_TOKEN")]
    pub token: Option<String>,

    /// OAuth2 token endpoint
    #[arg(long, env = "OAUTH_TOKEN_URL")]
    pub token_url: Option<String>,

    /// OAuth2 client id
    #[arg(long, env = "OAUTH_CLIENT_ID")]
    pub client_id: Option<String>,

    /// OAuth2 client secret
    #[arg(long, env = "OAUTH_CLIENT_SECRET")]
    pub client_secret: Option<String>,

    /// OAuth2 scope
    #[arg(long, env = "OAUTH_SCOPE")]
    pub scope: Option<String>,

    /// Connect timeout in seconds
    #[arg(long, default_value = "10")]
    pub connect_timeout: u64,

    /// Per-call timeout in seconds
    #[arg(long, default_value = "30")]
    pub timeout: u64,
}

/// Where the bearer token comes from
#[derive(Debug, Clone)]
pub enum TokenSource {
    Static(String),
    ClientCredentials(ClientCredentials),
}

/// gRPC connection settings
#[derive(Debug, Clone)]
pub struct GrpcTarget {
    pub url: String,
    pub tls: TlsPaths,
    pub token: TokenSource,
    pub options: ChannelOptions,
}

/// What the run talks to
#[derive(Debug, Clone)]
pub enum Target {
    Rest {
        url: String,
        verify: bool,
        timeout_secs: u64,
    },
    Rpc {
        addr: String,
        connect_timeout_secs: u64,
    },
    Grpc(GrpcTarget),
    Standalone {
        transport: TransportKind,
        mock: MockServerConfig,
    },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub run: RunConfig,
    pub target: Target,
    pub json: bool,
    pub log_level: String,
}

impl Config {
    /// Load configuration with priority: CLI > ENV (.env included) > defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_args(CliArgs::parse())
    }

    /// Resolve parsed arguments into a run configuration
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let target = match args.command {
            Command::Rest {
                url,
                no_verify,
                timeout,
            } => Target::Rest {
                url,
                verify: !no_verify,
                timeout_secs: timeout,
            },
            Command::Rpc {
                addr,
                connect_timeout,
            } => Target::Rpc {
                addr,
                connect_timeout_secs: connect_timeout,
            },
            Command::Grpc(grpc) => Target::Grpc(resolve_grpc(grpc)?),
            Command::Standalone {
                transport,
                latency_ms,
                error_rate,
                wrong_result_rate,
            } => Target::Standalone {
                transport,
                mock: MockServerConfig {
                    port: 0,
                    latency_ms,
                    error_rate,
                    wrong_result_rate,
                },
            },
        };

        let (transport, label) = match &target {
            Target::Rest { url, .. } => (TransportKind::Rest, url.clone()),
            Target::Rpc { addr, .. } => (TransportKind::NetRpc, addr.clone()),
            Target::Grpc(grpc) => (TransportKind::Grpc, grpc.url.clone()),
            Target::Standalone { transport, .. } => (*transport, "mock server".to_string()),
        };

        let mut run = RunConfig::new(transport, label);
        if let Some(requests) = args.requests {
            run.total_requests = requests;
        }
        if let Some(workers) = args.workers {
            run.workers = workers;
        }
        run.warmup = !args.no_warmup;
        run.profile = if args.no_profile {
            None
        } else {
            Some(ProfileConfig {
                dir: expand_tilde(&args.profile_dir),
                frequency: args.profile_frequency,
            })
        };

        Ok(Config {
            run,
            target,
            json: args.json,
            log_level: args.log_level,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.run.total_requests == 0 {
            anyhow::bail!("--requests must be at least 1");
        }
        if self.run.workers == 0 {
            anyhow::bail!("--workers must be at least 1");
        }

        if let Some(profile) = &self.run.profile {
            if profile.frequency <= 0 {
                anyhow::bail!("--profile-frequency must be positive");
            }
            if !profile.dir.is_dir() {
                anyhow::bail!(
                    "Profile directory does not exist: {}",
                    profile.dir.display()
                );
            }
        }

        if let Target::Standalone { transport, mock } = &self.target {
            if *transport == TransportKind::Grpc {
                anyhow::bail!("Standalone mode supports rest and rpc only");
            }
            for (flag, rate) in [
                ("--error-rate", mock.error_rate),
                ("--wrong-result-rate", mock.wrong_result_rate),
            ] {
                if !(0.0..=1.0).contains(&rate) {
                    anyhow::bail!("{} must be within 0.0..=1.0, got {}", flag, rate);
                }
            }
            if !(0.0..=1.0).contains(&(mock.error_rate + mock.wrong_result_rate)) {
                anyhow::bail!("error and wrong-result rates must sum to a value in 0.0..=1.0");
            }
        }

        Ok(())
    }
}

fn resolve_grpc(args: GrpcArgs) -> Result<GrpcTarget> {
    let token = match args.token {
        Some(token) => TokenSource::Static(token),
        None => TokenSource::ClientCredentials(ClientCredentials {
            token_url: args
                .token_url
                .context("OAUTH_TOKEN_URL is required unless --token is given")?,
            client_id: args
                .client_id
                .context("OAUTH_CLIENT_ID is required unless --token is given")?,
            client_secret: args
                .client_secret
                .context("OAUTH_CLIENT_SECRET is required unless --token is given")?,
            scope: args.scope,
        }),
    };

    Ok(GrpcTarget {
        url: args.url,
        tls: TlsPaths {
            client_cert: expand_tilde(&args.client_cert),
            client_key: expand_tilde(&args.client_key),
            ca_cert: expand_tilde(&args.ca_cert),
            domain: args.tls_domain,
        },
        token,
        options: ChannelOptions {
            connect_timeout: Duration::from_secs(args.connect_timeout),
            request_timeout: Duration::from_secs(args.timeout),
        },
    })
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
