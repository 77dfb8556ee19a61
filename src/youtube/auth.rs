//! Access tokens for the YouTube Data API.
//!
//! Two providers sit behind [`AuthProvider`]:
//! - [`ServiceAccountAuth`] reads the key on every call and never writes it anywhere.
//! - [`UserTokenAuth`] keeps a refreshable user token in a [`TokenStore`].

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use gcp_auth::{CustomServiceAccount, TokenProvider};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::error::AuthError;
use super::oauth::{ClientSecrets, OAuthClient, UPLOAD_SCOPE};
use super::token_store::{StoredToken, TokenStore};
use crate::config::{AuthMode, Config};

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, AuthError>;

    fn name(&self) -> &'static str;
}

/// Where a service account key comes from.
#[derive(Debug, Clone)]
pub enum ServiceAccountSource {
    File(PathBuf),
    Base64Json(String),
}

pub struct ServiceAccountAuth {
    source: ServiceAccountSource,
}

impl ServiceAccountAuth {
    pub fn new(source: ServiceAccountSource) -> Self {
        Self { source }
    }

    fn load(&self) -> Result<CustomServiceAccount, AuthError> {
        match &self.source {
            ServiceAccountSource::File(path) => CustomServiceAccount::from_file(path).map_err(|e| {
                AuthError::Credentials(format!(
                    "service account key {}: {}",
                    path.display(),
                    e
                ))
            }),
            ServiceAccountSource::Base64Json(encoded) => {
                let bytes = general_purpose::STANDARD.decode(encoded.trim()).map_err(|e| {
                    AuthError::Credentials(format!("service account JSON is not base64: {}", e))
                })?;
                let json = String::from_utf8(bytes).map_err(|e| {
                    AuthError::Credentials(format!("service account JSON is not UTF-8: {}", e))
                })?;
                CustomServiceAccount::from_json(&json)
                    .map_err(|e| AuthError::Credentials(format!("service account JSON: {}", e)))
            }
        }
    }
}

#[async_trait]
impl AuthProvider for ServiceAccountAuth {
    async fn access_token(&self) -> Result<String, AuthError> {
        let account = self.load()?;
        let token = account
            .token(&[UPLOAD_SCOPE])
            .await
            .map_err(|e| AuthError::TokenRequest(e.to_string()))?;
        Ok(token.as_str().to_string())
    }

    fn name(&self) -> &'static str {
        "service_account"
    }
}

pub struct UserTokenAuth {
    oauth: OAuthClient,
    store: TokenStore,
    allow_interactive: bool,
    // Single flight: concurrent uploads wait for one refresh instead of racing on the store.
    gate: Mutex<()>,
}

impl UserTokenAuth {
    pub fn new(oauth: OAuthClient, store: TokenStore, allow_interactive: bool) -> Self {
        Self {
            oauth,
            store,
            allow_interactive,
            gate: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Run the browser flow regardless of what is stored and persist the result.
    pub async fn authorize_interactively(&self) -> Result<StoredToken, AuthError> {
        let _gate = self.gate.lock().await;
        self.interactive_and_persist().await
    }

    async fn interactive_and_persist(&self) -> Result<StoredToken, AuthError> {
        let token = self.oauth.run_loopback_flow().await?;
        self.store.save_async(&token).await?;
        info!("Stored new YouTube token at {}", self.store.path().display());
        Ok(token)
    }
}

#[async_trait]
impl AuthProvider for UserTokenAuth {
    async fn access_token(&self) -> Result<String, AuthError> {
        let _gate = self.gate.lock().await;

        let stored = self.store.load_async().await?;

        if let Some(token) = &stored {
            if token.is_valid() {
                return Ok(token.access_token.clone());
            }
        }

        if let Some(refresh_token) = stored.as_ref().and_then(|t| t.refresh_token.as_deref()) {
            if !refresh_token.is_empty() {
                match self.oauth.refresh(refresh_token).await {
                    Ok(token) => {
                        self.store.save_async(&token).await?;
                        info!("Refreshed YouTube access token");
                        return Ok(token.access_token);
                    }
                    Err(e) if self.allow_interactive => {
                        warn!("Token refresh failed, falling back to browser consent: {}", e);
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        if !self.allow_interactive {
            return Err(AuthError::InteractiveRequired);
        }

        let token = self.interactive_and_persist().await?;
        Ok(token.access_token)
    }

    fn name(&self) -> &'static str {
        "user_token"
    }
}

pub fn user_token_auth(config: &Config) -> anyhow::Result<UserTokenAuth> {
    let auth = &config.youtube.auth;
    let secrets = match (&auth.client_secrets_file, &auth.client_secrets_json_b64) {
        (Some(path), _) if !path.trim().is_empty() => {
            ClientSecrets::from_file(&PathBuf::from(shellexpand::tilde(path).to_string()))?
        }
        (_, Some(encoded)) if !encoded.trim().is_empty() => ClientSecrets::from_base64(encoded)?,
        _ => anyhow::bail!("No OAuth client secrets configured"),
    };
    let oauth = OAuthClient::new(secrets, &auth.auth_uri, &auth.token_uri);
    let store = TokenStore::new(config.token_file()?);
    Ok(UserTokenAuth::new(oauth, store, auth.allow_interactive))
}

/// Pick the provider named by `youtube.auth.mode`.
pub fn build_auth_provider(config: &Config) -> anyhow::Result<Arc<dyn AuthProvider>> {
    let auth = &config.youtube.auth;
    match auth.mode {
        AuthMode::ServiceAccount => {
            let source = match (&auth.service_account_file, &auth.service_account_json_b64) {
                (Some(path), _) if !path.trim().is_empty() => {
                    ServiceAccountSource::File(PathBuf::from(shellexpand::tilde(path).to_string()))
                }
                (_, Some(encoded)) if !encoded.trim().is_empty() => {
                    ServiceAccountSource::Base64Json(encoded.clone())
                }
                _ => anyhow::bail!("No service account credentials configured"),
            };
            Ok(Arc::new(ServiceAccountAuth::new(source)))
        }
        AuthMode::UserToken => Ok(Arc::new(user_token_auth(config)?)),
    }
}
