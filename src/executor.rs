//! Retrying request executor.
//!
//! Sends one prompt pair to the configured provider and returns the model's
//! text. Transient failures back off exponentially, 429s pause every worker
//! through the shared [`RateLimitCoordinator`], and OAuth providers get one
//! re-authentication after a 401.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Proxy, RequestBuilder, StatusCode};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ProviderConfig;
use crate::decode::extract_text_from_value;
use crate::error::{excerpt, DecodeError, TranslateError};
use crate::i18n::TranslationMetrics;
use crate::provider::{
    recover_unauthorized, unwrap_envelope, wrap_envelope, OAuthToken, ProviderRegistry, Route,
    TokenSource,
};
use crate::rate_limit::RateLimitCoordinator;
use crate::retry::{parse_retry_hint, sleep_or_cancel, RetryPolicy};

/// Something that can turn a (system, user) prompt pair into model text.
///
/// The scheduler only depends on this trait, so tests and embedders can
/// substitute their own backend for [`RequestExecutor`].
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        rate_limit: &RateLimitCoordinator,
        cancel: &CancellationToken,
    ) -> Result<String, TranslateError>;
}

/// HTTP executor for one configured provider.
pub struct RequestExecutor {
    client: Client,
    config: ProviderConfig,
    route: Route,
    policy: RetryPolicy,
    token_source: Option<Arc<dyn TokenSource>>,
    metrics: TranslationMetrics,
}

impl RequestExecutor {
    /// Resolve the provider's route and build the HTTP client.
    pub fn new(
        config: ProviderConfig,
        registry: &ProviderRegistry,
        policy: RetryPolicy,
    ) -> Result<Self, TranslateError> {
        let route = registry.route(&config)?;

        let mut builder = Client::builder();
        if let Some(proxy) = &config.proxy {
            let proxy = Proxy::all(proxy.as_str())
                .map_err(|e| TranslateError::Config(format!("invalid proxy '{}': {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| TranslateError::Config(format!("failed to build HTTP client: {}", e)))?;

        info!(
            "Using {} ({}) via {:?} at {}",
            config.display_name, config.model, route.format, route.url
        );

        Ok(Self {
            client,
            config,
            route,
            policy,
            token_source: None,
            metrics: TranslationMetrics::new(),
        })
    }

    /// Supply OAuth tokens for token-backed providers.
    pub fn with_token_source(mut self, source: Arc<dyn TokenSource>) -> Self {
        self.token_source = Some(source);
        self
    }

    pub fn metrics(&self) -> &TranslationMetrics {
        &self.metrics
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    fn timeout(&self) -> Duration {
        self.policy.request_timeout.unwrap_or(self.config.timeout)
    }

    /// Send a prompt pair, retrying per the policy, and return the model's text.
    pub async fn execute(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        rate_limit: &RateLimitCoordinator,
        cancel: &CancellationToken,
    ) -> Result<String, TranslateError> {
        let body = self
            .route
            .format
            .build_body(&self.config.model, system_prompt, user_prompt);

        let mut token = self.initial_token().await?;
        let mut attempt: u32 = 0;
        let mut reauthenticated = false;

        loop {
            rate_limit
                .wait_until_resumed(self.policy.poll_interval, cancel)
                .await?;
            if cancel.is_cancelled() {
                return Err(TranslateError::Cancelled);
            }

            let request = self.build_request(&body, token.as_ref());
            self.metrics.record_api_call();
            debug!(
                "Sending request to {} (attempt {}/{})",
                self.config.display_name,
                attempt + 1,
                self.policy.max_retries + 1
            );

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    self.backoff_or_fail(attempt, format!("network error: {}", e), cancel)
                        .await?;
                    attempt += 1;
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                let bytes = match response.bytes().await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        self.backoff_or_fail(attempt, format!("failed to read body: {}", e), cancel)
                            .await?;
                        attempt += 1;
                        continue;
                    }
                };
                return self.decode(&bytes).map_err(|e| {
                    self.metrics.record_failure();
                    error!("Malformed response from {}: {}", self.config.display_name, e);
                    TranslateError::MalformedResponse(e)
                });
            }

            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();

            if status == StatusCode::TOO_MANY_REQUESTS {
                self.metrics.record_rate_limited();
                let hint = parse_retry_hint(&headers, &text);
                let pause = self.policy.rate_limit_pause(hint);
                rate_limit.pause_for(pause);

                if attempt >= self.policy.max_retries {
                    self.metrics.record_failure();
                    error!(
                        "{} still rate limited after {} attempt(s)",
                        self.config.display_name,
                        attempt + 1
                    );
                    return Err(TranslateError::RateLimited {
                        message: excerpt(&text),
                    });
                }
                warn!(
                    "{} returned 429, retrying after {:?} (hint: {:?})",
                    self.config.display_name, pause, hint
                );
                attempt += 1;
                continue;
            }

            if status == StatusCode::UNAUTHORIZED && self.route.auth.is_oauth() {
                if reauthenticated {
                    self.metrics.record_failure();
                    return Err(TranslateError::AuthExpired(format!(
                        "{} rejected the renewed token: {}",
                        self.config.display_name,
                        excerpt(&text)
                    )));
                }
                token = Some(self.reauthenticate().await?);
                reauthenticated = true;
                continue;
            }

            if status.is_server_error() {
                self.backoff_or_fail(
                    attempt,
                    format!("status {}: {}", status.as_u16(), excerpt(&text)),
                    cancel,
                )
                .await?;
                attempt += 1;
                continue;
            }

            self.metrics.record_failure();
            error!(
                "{} rejected request with status {}",
                self.config.display_name, status
            );
            return Err(TranslateError::ClientRejected {
                status: status.as_u16(),
                body: excerpt(&text),
            });
        }
    }

    async fn initial_token(&self) -> Result<Option<OAuthToken>, TranslateError> {
        if !self.route.auth.is_oauth() {
            return Ok(None);
        }
        let source = self.token_source()?;
        source
            .token()
            .await
            .map(Some)
            .map_err(|e| TranslateError::AuthExpired(format!("failed to obtain token: {:#}", e)))
    }

    async fn reauthenticate(&self) -> Result<OAuthToken, TranslateError> {
        let source = self.token_source()?;
        self.metrics.record_reauthentication();
        recover_unauthorized(self.route.auth, source.as_ref())
            .await
            .map_err(|e| {
                self.metrics.record_failure();
                TranslateError::AuthExpired(format!("re-authentication failed: {:#}", e))
            })
    }

    fn token_source(&self) -> Result<&Arc<dyn TokenSource>, TranslateError> {
        self.token_source.as_ref().ok_or_else(|| {
            TranslateError::Config(format!(
                "{} requires an OAuth token source",
                self.config.display_name
            ))
        })
    }

    fn build_request(&self, body: &Value, token: Option<&OAuthToken>) -> RequestBuilder {
        let request = self.client.post(&self.route.url).timeout(self.timeout());

        let request = if self.route.envelope {
            let project = token
                .and_then(|t| t.project_id.as_deref())
                .unwrap_or_default();
            request.json(&wrap_envelope(&self.config.model, project, body.clone()))
        } else {
            request.json(body)
        };

        match token {
            Some(token) => self.route.auth.apply_token(request, token),
            None => self
                .route
                .auth
                .apply_key(request, self.config.api_key.as_deref()),
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError> {
        let raw = String::from_utf8_lossy(bytes);
        let value: Value = serde_json::from_slice(bytes).map_err(|_| DecodeError::UnknownEnvelope {
            excerpt: excerpt(&raw),
        })?;
        let value = if self.route.envelope {
            unwrap_envelope(value)
        } else {
            value
        };
        extract_text_from_value(value, &raw)
    }

    /// Sleep before the next attempt, or fail if the retry budget is spent.
    async fn backoff_or_fail(
        &self,
        attempt: u32,
        message: String,
        cancel: &CancellationToken,
    ) -> Result<(), TranslateError> {
        if attempt >= self.policy.max_retries {
            self.metrics.record_failure();
            error!(
                "{}: all {} attempt(s) failed: {}",
                self.config.display_name,
                attempt + 1,
                message
            );
            return Err(TranslateError::Transient {
                attempts: attempt + 1,
                message,
            });
        }

        let delay = self.policy.backoff_for_attempt(attempt);
        self.metrics.record_retry();
        warn!(
            "{}: attempt {} failed ({}), retrying in {:?}",
            self.config.display_name,
            attempt + 1,
            message,
            delay
        );
        sleep_or_cancel(delay, cancel).await
    }
}

#[async_trait]
impl CompletionBackend for RequestExecutor {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        rate_limit: &RateLimitCoordinator,
        cancel: &CancellationToken,
    ) -> Result<String, TranslateError> {
        self.execute(system_prompt, user_prompt, rate_limit, cancel)
            .await
    }
}
