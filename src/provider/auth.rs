//! Authentication schemes and the OAuth token-refresh contract.
//!
//! Interactive flows (device code, browser consent) live outside this crate;
//! the executor only needs a [`TokenSource`] that hands out access tokens and
//! can refresh or re-run its flow after a 401.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::RequestBuilder;
use tracing::{info, warn};

/// Editor identification headers the device-code provider expects on every request.
const COPILOT_HEADERS: &[(&str, &str)] = &[
    ("Editor-Version", "vscode/1.95.0"),
    ("Editor-Plugin-Version", "copilot-chat/0.22.0"),
    ("Copilot-Integration-Id", "vscode-chat"),
    ("User-Agent", "GitHubCopilotChat/0.22.0"),
];

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// How requests to a provider are authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// No credentials (local servers)
    None,
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `x-goog-api-key: <key>`
    GoogleApiKey,
    /// `x-api-key: <key>` plus `anthropic-version`
    AnthropicApiKey,
    /// Device-code OAuth token with editor headers; 401 → invalidate and re-authenticate once
    DeviceCodeOAuth,
    /// Refreshable OAuth token; 401 → refresh (or re-authenticate) once
    RefreshableOAuth,
}

impl AuthScheme {
    pub fn is_oauth(&self) -> bool {
        matches!(self, AuthScheme::DeviceCodeOAuth | AuthScheme::RefreshableOAuth)
    }

    /// Attach static-key credentials. A missing key leaves the request unauthenticated.
    pub(crate) fn apply_key(&self, request: RequestBuilder, key: Option<&str>) -> RequestBuilder {
        let Some(key) = key else {
            return request;
        };
        match self {
            AuthScheme::Bearer => request.bearer_auth(key),
            AuthScheme::GoogleApiKey => request.header("x-goog-api-key", key),
            AuthScheme::AnthropicApiKey => request
                .header("x-api-key", key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            AuthScheme::None | AuthScheme::DeviceCodeOAuth | AuthScheme::RefreshableOAuth => {
                request
            }
        }
    }

    /// Attach an OAuth access token plus any per-request headers of the scheme.
    pub(crate) fn apply_token(&self, request: RequestBuilder, token: &OAuthToken) -> RequestBuilder {
        let request = request.bearer_auth(&token.access_token);
        match self {
            AuthScheme::DeviceCodeOAuth => COPILOT_HEADERS
                .iter()
                .fold(request, |req, (name, value)| req.header(*name, *value)),
            _ => request,
        }
    }
}

/// An OAuth access token and the project it is bound to, if any.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthToken {
    pub access_token: String,
    pub project_id: Option<String>,
}

impl OAuthToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            project_id: None,
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}

impl std::fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthToken")
            .field("access_token", &"<redacted>")
            .field("project_id", &self.project_id)
            .finish()
    }
}

/// Supplier of OAuth access tokens for token-backed providers.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Current token, obtaining one if nothing is cached.
    async fn token(&self) -> Result<OAuthToken>;

    /// Forget the cached token.
    async fn invalidate(&self);

    /// Exchange the refresh token for a new access token.
    async fn refresh(&self) -> Result<OAuthToken> {
        self.reauthenticate().await
    }

    /// Run the full authentication flow again.
    async fn reauthenticate(&self) -> Result<OAuthToken>;
}

/// Recover from a 401 the way `scheme` prescribes. Called at most once per request.
pub(crate) async fn recover_unauthorized(
    scheme: AuthScheme,
    source: &dyn TokenSource,
) -> Result<OAuthToken> {
    match scheme {
        AuthScheme::DeviceCodeOAuth => {
            info!("Access token rejected, re-authenticating");
            source.invalidate().await;
            source.reauthenticate().await
        }
        AuthScheme::RefreshableOAuth => {
            info!("Access token rejected, refreshing");
            source.invalidate().await;
            match source.refresh().await {
                Ok(token) => Ok(token),
                Err(e) => {
                    warn!("Token refresh failed ({}), re-authenticating", e);
                    source.reauthenticate().await
                }
            }
        }
        other => anyhow::bail!("{:?} does not support re-authentication", other),
    }
}
