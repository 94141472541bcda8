// OAuth2 client-credentials token fetch

use chrono::{Duration, Utc};
use reqwest::Client;

use super::types::TokenResponse;
use crate::error::{BenchError, Result};

/// Client-credentials grant parameters
#[derive(Clone)]
pub struct ClientCredentials {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: Option<String>,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scope", &self.scope)
            .finish()
    }
}

/// Fetch an access token. Called once per run; no caching, no retry.
pub async fn fetch_token(client: &Client, creds: &ClientCredentials) -> Result<String> {
    tracing::info!("Fetching access token from {}", creds.token_url);

    let mut form = vec![
        ("grant_type", "client_credentials"),
        ("client_id", creds.client_id.as_str()),
        ("client_secret", creds.client_secret.as_str()),
    ];
    if let Some(scope) = creds.scope.as_deref() {
        form.push(("scope", scope));
    }

    let response = client
        .post(&creds.token_url)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .form(&form)
        .send()
        .await
        .map_err(|e| BenchError::Token(format!("failed to send token request: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        tracing::error!(
            "Token request failed: status={}, body={}",
            status,
            error_text
        );
        return Err(BenchError::Token(format!("{} - {}", status, error_text)));
    }

    let data: TokenResponse = response
        .json()
        .await
        .map_err(|e| BenchError::Token(format!("failed to parse token response: {}", e)))?;

    if data.access_token.is_empty() {
        return Err(BenchError::Token(
            "response does not contain access_token".to_string(),
        ));
    }

    match data.expires_in {
        Some(expires_in) => {
            let expires_at = Utc::now() + Duration::seconds(expires_in as i64);
            tracing::info!(
                "Access token obtained (type: {}), expires: {}",
                data.token_type.as_deref().unwrap_or("unknown"),
                expires_at.to_rfc3339()
            );
        }
        None => tracing::info!("Access token obtained"),
    }

    Ok(data.access_token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn creds(server: &mockito::Server) -> ClientCredentials {
        ClientCredentials {
            token_url: format!("{}/oauth2/token", server.url()),
            client_id: "bench-client".to_string(),
            client_secret: "s3cret".to_string(),
            scope: Some("add/read".to_string()),
        }
    }

    #[tokio::test]
    async fn test_fetch_token_sends_client_credentials_form() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/token")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "client_credentials".into()),
                Matcher::UrlEncoded("client_id".into(), "bench-client".into()),
                Matcher::UrlEncoded("client_secret".into(), "s3cret".into()),
                Matcher::UrlEncoded("scope".into(), "add/read".into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"eyJ.abc.def","expires_in":3600,"token_type":"Bearer"}"#)
            .create_async()
            .await;

        let token = fetch_token(&Client::new(), &creds(&server)).await.unwrap();

        assert_eq!(token, "eyJ.abc.def");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_token_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth2/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_client"}"#)
            .create_async()
            .await;

        let err = fetch_token(&Client::new(), &creds(&server))
            .await
            .unwrap_err();

        assert!(matches!(err, BenchError::Token(_)));
        assert!(err.to_string().contains("invalid_client"));
    }

    #[tokio::test]
    async fn test_fetch_token_rejects_empty_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth2/token")
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"","expires_in":3600,"token_type":"Bearer"}"#)
            .create_async()
            .await;

        let err = fetch_token(&Client::new(), &creds(&server))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("access_token"));
    }

    #[tokio::test]
    async fn test_fetch_token_rejects_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth2/token")
            .with_body("<html>gateway timeout</html>")
            .create_async()
            .await;

        let err = fetch_token(&Client::new(), &creds(&server))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to parse token response"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds = ClientCredentials {
            token_url: "https://auth.example.com/oauth2/token".to_string(),
            client_id: "id".to_string(),
            client_secret: "hunter2".to_string(),
            scope: None,
        };
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }
}
