//! REST adapter: one `GET /add?a=..&b=..` per call over a pooled HTTP client.

use std::time::Duration;

use reqwest::Client;

use super::{AddArgs, AddTransport};
use crate::error::{BenchError, CallError};

/// REST adapter: `GET {base_url}/add?a=..&b=..`
pub struct RestTransport {
    client: Client,
    add_url: String,
    verify: bool,
}

impl RestTransport {
    /// Build the HTTP client. Nothing is dialed until the first call.
    pub fn new(base_url: &str, timeout_secs: u64, verify: bool) -> crate::error::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_max_idle_per_host(500)
            .build()
            .map_err(|e| BenchError::connect(base_url, e))?;

        Ok(Self {
            client,
            add_url: format!("{}/add", base_url.trim_end_matches('/')),
            verify,
        })
    }

    pub fn add_url(&self) -> &str {
        &self.add_url
    }
}

impl AddTransport for RestTransport {
    async fn add(&self, args: AddArgs) -> Result<Option<i32>, CallError> {
        let response = self
            .client
            .get(&self.add_url)
            .query(&[("a", args.a), ("b", args.b)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallError::Status {
                status: status.as_u16(),
                body,
            });
        }

        if !self.verify {
            // Drain so the connection goes back to the pool
            let _ = response.bytes().await?;
            return Ok(None);
        }

        let body = response.text().await?;
        parse_result(&body).map(Some)
    }
}

/// Accepts `{"result": n}`, `{"Result": n}` or a bare integer
fn parse_result(body: &str) -> Result<i32, CallError> {
    let trimmed = body.trim();
    if let Ok(n) = trimmed.parse::<i32>() {
        return Ok(n);
    }

    let json: serde_json::Value = serde_json::from_str(trimmed)
        .map_err(|e| CallError::Decode(format!("{}: {}", e, truncate(trimmed))))?;

    json.get("result")
        .or_else(|| json.get("Result"))
        .and_then(|v| v.as_i64())
        .and_then(|n| i32::try_from(n).ok())
        .ok_or_else(|| CallError::Decode(format!("no result field: {}", truncate(trimmed))))
}

fn truncate(s: &str) -> &str {
    match s.char_indices().nth(64) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
