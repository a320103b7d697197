//! Error taxonomy for the translation pipeline.
//!
//! Errors are split by the stage that produces them: decoding a provider
//! response, executing one outbound request, and running a whole batch of
//! languages.

use std::path::PathBuf;
use thiserror::Error;

/// Maximum number of characters of offending text kept in error messages.
pub const EXCERPT_LIMIT: usize = 200;

/// Failure to turn a provider response into translations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The provider answered 2xx but reported a structured error.
    #[error("provider error: {0}")]
    Provider(String),

    /// The body matched none of the known response envelopes.
    #[error("unrecognized response envelope: {excerpt}")]
    UnknownEnvelope { excerpt: String },

    /// The model output contained no `[...]` span.
    #[error("no JSON array found in model output: {excerpt}")]
    MissingArray { excerpt: String },

    /// The array span could not be parsed, even after escape repair.
    #[error("invalid translation array ({reason}): {excerpt}")]
    InvalidArray { reason: String, excerpt: String },

    #[error("got 0 translations, expected {expected}")]
    Empty { expected: usize },
}

/// Failure of a single outbound translation request.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// Network failure or 5xx that survived every retry.
    #[error("request failed after {attempts} attempt(s): {message}")]
    Transient { attempts: u32, message: String },

    /// 429 that survived every retry.
    #[error("rate limited by provider: {message}")]
    RateLimited { message: String },

    /// Repeated 401 from an OAuth-backed provider, or a failed re-authentication.
    #[error("authentication expired: {0}")]
    AuthExpired(String),

    /// Any other non-2xx status; never retried.
    #[error("request rejected with status {status}: {body}")]
    ClientRejected { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(#[from] DecodeError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),
}

impl TranslateError {
    /// Cancellation is an orderly shutdown, not a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TranslateError::Cancelled)
    }
}

/// One language that could not be fully translated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageFailure {
    pub code: String,
    pub name: String,
    pub reason: String,
}

impl std::fmt::Display for LanguageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.name, self.code, self.reason)
    }
}

/// Run-level failure returned by the scheduler.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("translation failed for {} language(s): {}", .0.len(), join_failures(.0))]
    LanguagesFailed(Vec<LanguageFailure>),

    #[error("more than one task writes to {0}")]
    DuplicateOutput(PathBuf),
}

impl RunError {
    /// Languages that failed, empty for non-language errors.
    pub fn failures(&self) -> &[LanguageFailure] {
        match self {
            RunError::LanguagesFailed(failures) => failures,
            RunError::DuplicateOutput(_) => &[],
        }
    }
}

fn join_failures(failures: &[LanguageFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Truncate `text` to at most [`EXCERPT_LIMIT`] characters for diagnostics.
pub fn excerpt(text: &str) -> String {
    excerpt_with_limit(text, EXCERPT_LIMIT)
}

pub(crate) fn excerpt_with_limit(text: &str, limit: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(limit) {
        Some((end, _)) => format!("{}...", &trimmed[..end]),
        None => trimmed.to_string(),
    }
}
