// add-bench - Library root for the binary and tests

pub mod auth;
pub mod bench;
pub mod config;
pub mod error;
pub mod transport;
