//! Installed-app OAuth for a YouTube channel owner.

use axum::{extract::Query, routing::get, Router};
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info};
use url::Url;

use super::error::AuthError;
use super::token_store::StoredToken;

pub const UPLOAD_SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";

/// How long the loopback listener waits for the browser redirect.
const LOOPBACK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub auth_uri: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Accepts the Google console download (`{"installed": {...}}` or
    /// `{"web": {...}}`) as well as a bare object.
    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        if let Ok(file) = serde_json::from_str::<ClientSecretsFile>(json) {
            if let Some(secrets) = file.installed.or(file.web) {
                return Ok(secrets);
            }
        }
        serde_json::from_str::<ClientSecrets>(json)
            .map_err(|e| AuthError::Credentials(format!("invalid client secrets: {}", e)))
    }

    pub fn from_file(path: &Path) -> Result<Self, AuthError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            AuthError::Credentials(format!("read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, AuthError> {
        let bytes = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| AuthError::Credentials(format!("client secrets are not base64: {}", e)))?;
        let json = String::from_utf8(bytes)
            .map_err(|e| AuthError::Credentials(format!("client secrets are not UTF-8: {}", e)))?;
        Self::from_json(&json)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    secrets: ClientSecrets,
    auth_uri: String,
    token_uri: String,
}

impl OAuthClient {
    /// URIs embedded in the secrets file win over the configured ones.
    pub fn new(secrets: ClientSecrets, auth_uri: &str, token_uri: &str) -> Self {
        let auth_uri = secrets.auth_uri.clone().unwrap_or_else(|| auth_uri.to_string());
        let token_uri = secrets.token_uri.clone().unwrap_or_else(|| token_uri.to_string());
        Self {
            http: reqwest::Client::new(),
            secrets,
            auth_uri,
            token_uri,
        }
    }

    pub fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<String, AuthError> {
        let mut url = Url::parse(&self.auth_uri)
            .map_err(|e| AuthError::Credentials(format!("invalid auth_uri: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.secrets.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", UPLOAD_SCOPE)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state);
        Ok(url.into())
    }

    /// The token endpoint usually omits the refresh token on refresh; the
    /// one we already hold is carried over.
    pub async fn refresh(&self, refresh_token: &str) -> Result<StoredToken, AuthError> {
        let params = [
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        let mut token = self.token_request(&params).await?;
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }
        Ok(token)
    }

    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<StoredToken, AuthError> {
        let params = [
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ];
        self.token_request(&params).await
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<StoredToken, AuthError> {
        let resp = self
            .http
            .post(&self.token_uri)
            .form(params)
            .send()
            .await
            .map_err(|e| AuthError::TokenRequest(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| AuthError::TokenRequest(e.to_string()))?;

        if !status.is_success() {
            let detail = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(desc) => format!("{}: {}", err.error, desc),
                    None => err.error,
                },
                Err(_) => body,
            };
            return Err(AuthError::TokenRequest(format!("{} ({})", detail, status)));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::TokenRequest(format!("unexpected token response: {}", e)))?;

        Ok(StoredToken {
            access_token: parsed.access_token,
            refresh_token: parsed.refresh_token,
            expires_at: Utc::now() + ChronoDuration::seconds(parsed.expires_in.unwrap_or(3600)),
            scope: parsed.scope,
            token_type: parsed.token_type,
        })
    }

    /// Browser consent with a loopback redirect. Blocks until the redirect
    /// arrives or the wait times out.
    pub async fn run_loopback_flow(&self) -> Result<StoredToken, AuthError> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| AuthError::Interactive(format!("bind loopback listener: {}", e)))?;
        let port = listener
            .local_addr()
            .map_err(|e| AuthError::Interactive(e.to_string()))?
            .port();
        let redirect_uri = format!("http://127.0.0.1:{}/", port);
        let state = uuid::Uuid::new_v4().to_string();

        let auth_url = self.authorization_url(&redirect_uri, &state)?;
        info!("Waiting for YouTube authorization on {}", redirect_uri);
        eprintln!(
            "\nOpen this URL in a browser to authorize YouTube uploads:\n\n  {}\n",
            auth_url
        );

        let (params_tx, params_rx) = oneshot::channel::<HashMap<String, String>>();
        let params_tx = Arc::new(Mutex::new(Some(params_tx)));

        let app = Router::new().route(
            "/",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let params_tx = params_tx.clone();
                async move {
                    let sender = params_tx.lock().ok().and_then(|mut slot| slot.take());
                    if let Some(sender) = sender {
                        let _ = sender.send(params);
                    }
                    "Authorization received. You can close this window."
                }
            }),
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let received = tokio::time::timeout(LOOPBACK_TIMEOUT, params_rx).await;
        let _ = shutdown_tx.send(());
        let _ = server.await;

        let params = match received {
            Ok(Ok(params)) => params,
            Ok(Err(_)) => return Err(AuthError::Interactive("redirect listener closed".to_string())),
            Err(_) => {
                return Err(AuthError::Interactive(format!(
                    "no redirect within {}s",
                    LOOPBACK_TIMEOUT.as_secs()
                )))
            }
        };

        let code = extract_code(&params, &state)?;
        debug!("Received authorization code, exchanging for tokens");
        self.exchange_code(&code, &redirect_uri).await
    }
}

fn extract_code(params: &HashMap<String, String>, expected_state: &str) -> Result<String, AuthError> {
    if let Some(error) = params.get("error") {
        return Err(AuthError::Interactive(format!("consent denied: {}", error)));
    }
    if params.get("state").map(String::as_str) != Some(expected_state) {
        return Err(AuthError::Interactive("state mismatch in redirect".to_string()));
    }
    params
        .get("code")
        .cloned()
        .ok_or_else(|| AuthError::Interactive("redirect carried no code".to_string()))
}
