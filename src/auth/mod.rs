// Authentication module
// One-shot credential acquisition for the gRPC path: OAuth2 bearer token and mTLS files

mod types;
pub mod tls;
pub mod token;

pub use tls::{load_tls_credentials, TlsPaths};
pub use token::{fetch_token, ClientCredentials};
pub use types::TokenResponse;
