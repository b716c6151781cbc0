//! Google OAuth session.
//!
//! One [`GoogleAuth`] is built at startup and shared (behind `Arc`) by the
//! HTTP handlers and the sync loop. It tracks authorization flows that have
//! been started but not yet completed, keyed by their OAuth `state` value,
//! and the credential obtained from the last successful exchange.
//!
//! The credential is persisted to `google.token_file` and reloaded from it on
//! startup. Tokens are never refreshed; an expired credential simply stops
//! counting as authenticated.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::GoogleConfig;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Google client secret file not found: {0}")]
    MissingClientSecret(PathBuf),
    #[error("Google client secret file is invalid: {0}")]
    InvalidClientSecret(String),
    #[error("no authorization flow was started for this state")]
    FlowNotInitiated,
    #[error("token exchange failed: {0}")]
    Exchange(String),
    #[error("token file {path}: {source}")]
    TokenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("token file {path} is corrupt: {reason}")]
    CorruptToken { path: PathBuf, reason: String },
}

impl AuthError {
    /// Errors caused by the request or local setup rather than by Google or
    /// the filesystem.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AuthError::MissingClientSecret(_)
                | AuthError::InvalidClientSecret(_)
                | AuthError::FlowNotInitiated
        )
    }
}

/// The OAuth client as downloaded from the Google Cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
}

#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

impl ClientSecret {
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuthError::MissingClientSecret(path.to_path_buf()))
            }
            Err(e) => return Err(AuthError::InvalidClientSecret(e.to_string())),
        };

        let file: ClientSecretFile = serde_json::from_str(&raw)
            .map_err(|e| AuthError::InvalidClientSecret(e.to_string()))?;

        file.installed.or(file.web).ok_or_else(|| {
            AuthError::InvalidClientSecret("expected an \"installed\" or \"web\" client".into())
        })
    }
}

/// Authorized-user credential, in the layout Google client libraries write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Credential {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl Credential {
    /// A token is present and, if it carries an expiry, that is in the future.
    pub fn is_valid(&self) -> bool {
        !self.token.is_empty() && self.expiry.map_or(true, |at| at > Utc::now())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Default)]
struct SessionState {
    pending: HashMap<String, ClientSecret>,
    credential: Option<Credential>,
}

#[derive(Clone)]
pub struct GoogleAuth {
    config: GoogleConfig,
    client: reqwest::Client,
    state: Arc<RwLock<SessionState>>,
}

impl GoogleAuth {
    pub fn new(config: GoogleConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            state: Arc::new(RwLock::new(SessionState::default())),
        }
    }

    /// Start a flow and return the consent URL to send the user to.
    pub async fn authorization_url(&self) -> Result<String, AuthError> {
        let secret = ClientSecret::load(&self.config.client_secret)?;
        let state = uuid::Uuid::new_v4().to_string();

        let mut url = url::Url::parse(&secret.auth_uri)
            .map_err(|e| AuthError::InvalidClientSecret(format!("auth_uri: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &secret.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("include_granted_scopes", "true")
            .append_pair("state", &state);

        self.state.write().await.pending.insert(state, secret);
        tracing::info!("started Google authorization flow");
        Ok(url.into())
    }

    /// Complete the flow identified by `state` by trading `code` for a token.
    ///
    /// The flow is consumed whether or not the exchange succeeds.
    pub async fn exchange(&self, code: &str, state: &str) -> Result<Credential, AuthError> {
        let secret = self
            .state
            .write()
            .await
            .pending
            .remove(state)
            .ok_or(AuthError::FlowNotInitiated)?;

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", secret.client_id.as_str()),
            ("client_secret", secret.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        let resp = self
            .client
            .post(&secret.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Exchange(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Exchange(format!("HTTP {}: {}", status, body)));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::Exchange(e.to_string()))?;

        let scopes = match token.scope {
            Some(s) => s.split_whitespace().map(str::to_string).collect(),
            None => self.config.scopes.clone(),
        };

        let credential = Credential {
            token: token.access_token,
            refresh_token: token.refresh_token,
            token_uri: secret.token_uri,
            client_id: secret.client_id,
            client_secret: secret.client_secret,
            scopes,
            expiry: token.expires_in.map(|s| Utc::now() + Duration::seconds(s)),
        };

        self.save_token(&credential).await?;
        self.state.write().await.credential = Some(credential.clone());
        tracing::info!(file = %self.config.token_file.display(), "stored Google credential");

        Ok(credential)
    }

    /// Read the token file into the session.
    ///
    /// Returns `Ok(None)` when there is no token file yet.
    pub async fn load_from_disk(&self) -> Result<Option<Credential>, AuthError> {
        let path = &self.config.token_file;
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(AuthError::TokenFile {
                    path: path.clone(),
                    source,
                })
            }
        };

        let credential: Credential =
            serde_json::from_str(&raw).map_err(|e| AuthError::CorruptToken {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        self.state.write().await.credential = Some(credential.clone());
        Ok(Some(credential))
    }

    /// Whether the session holds a usable credential, picking up a token
    /// file written since the last check.
    pub async fn check(&self) -> Result<bool, AuthError> {
        if self.credential_valid().await {
            return Ok(true);
        }
        Ok(self
            .load_from_disk()
            .await?
            .is_some_and(|c| c.is_valid()))
    }

    pub async fn credential_valid(&self) -> bool {
        self.state
            .read()
            .await
            .credential
            .as_ref()
            .is_some_and(Credential::is_valid)
    }

    pub async fn credential(&self) -> Option<Credential> {
        self.state.read().await.credential.clone()
    }

    async fn save_token(&self, credential: &Credential) -> Result<(), AuthError> {
        let path = &self.config.token_file;
        let io_err = |source| AuthError::TokenFile {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(credential).map_err(|e| {
            AuthError::CorruptToken {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;
        tokio::fs::write(path, json).await.map_err(io_err)
    }
}
