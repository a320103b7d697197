use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::error::TranslateError;
use crate::provider::ProviderRegistry;

/// Default system prompt; `{{targetLang}}` is replaced with the language's display name.
pub const DEFAULT_PROMPT_TEMPLATE: &str = r#"You are a professional software localization translator. Translate the user interface strings you are given into {{targetLang}}.

Rules:
- Keep placeholders exactly as written (%s, %d, %1$s, {name}, {{count}}).
- Keep HTML/XML tags, markup escape sequences and leading/trailing whitespace.
- Do not translate product names, code identifiers or URLs.
- Use the tone and terminology customary for {{targetLang}} software.
- Respond with a JSON array only, without commentary."#;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Resolved settings for one AI provider. Immutable for the duration of a run.
#[derive(Clone)]
pub struct ProviderConfig {
    pub id: String,
    pub display_name: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub proxy: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("proxy", &self.proxy)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Explicit values that take precedence over a provider's defaults.
#[derive(Debug, Clone, Default)]
pub struct ProviderOverrides {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub proxy: Option<String>,
    pub timeout: Option<Duration>,
}

impl ProviderConfig {
    /// Merge registry defaults, overrides and the provider's credential variable.
    pub fn resolve(
        provider_id: &str,
        overrides: ProviderOverrides,
        registry: &ProviderRegistry,
    ) -> Result<Self, TranslateError> {
        let spec = registry.get(provider_id).ok_or_else(|| {
            TranslateError::Config(format!("unknown provider '{}'", provider_id))
        })?;

        let api_key = overrides
            .api_key
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                spec.key_env
                    .as_deref()
                    .and_then(|var| std::env::var(var).ok())
                    .filter(|k| !k.trim().is_empty())
            });

        if spec.key_required && api_key.is_none() {
            let hint = spec
                .key_env
                .as_deref()
                .map(|var| format!(" (set {} or L10N_API_KEY)", var))
                .unwrap_or_default();
            return Err(TranslateError::Config(format!(
                "{} requires an API key{}",
                spec.display_name, hint
            )));
        }

        Ok(Self {
            id: spec.id.clone(),
            display_name: spec.display_name.clone(),
            base_url: overrides
                .base_url
                .unwrap_or_else(|| spec.base_url.clone())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: overrides.model.unwrap_or_else(|| spec.default_model.clone()),
            proxy: overrides.proxy.filter(|p| !p.trim().is_empty()),
            timeout: overrides.timeout.unwrap_or(DEFAULT_TIMEOUT),
        })
    }

    /// Resolve the provider named by `L10N_PROVIDER` with `L10N_*` overrides.
    pub fn from_env(registry: &ProviderRegistry) -> Result<Self> {
        let provider = std::env::var("L10N_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let overrides = ProviderOverrides {
            base_url: std::env::var("L10N_BASE_URL").ok(),
            api_key: std::env::var("L10N_API_KEY").ok(),
            model: std::env::var("L10N_MODEL").ok(),
            proxy: std::env::var("L10N_PROXY").ok(),
            timeout: std::env::var("L10N_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs),
        };

        Self::resolve(&provider, overrides, registry)
            .with_context(|| format!("Failed to configure provider '{}'", provider))
    }
}

/// How chunks are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcurrencyMode {
    /// One language, one chunk, one request at a time.
    #[default]
    Sequential,
    /// Every (language, chunk) pair through one bounded worker pool.
    FullParallel,
}

impl FromStr for ConcurrencyMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sequential" | "serial" => Ok(ConcurrencyMode::Sequential),
            "parallel" | "full-parallel" | "full_parallel" => Ok(ConcurrencyMode::FullParallel),
            other => anyhow::bail!(
                "Invalid concurrency mode '{}'. Expected 'sequential' or 'parallel'",
                other
            ),
        }
    }
}

/// Progress callback: (language code, units done, units total).
pub type ProgressCallback = Arc<dyn Fn(&str, usize, usize) + Send + Sync>;

/// Log or error message callback.
pub type MessageCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Settings for one `translate` invocation.
#[derive(Clone)]
pub struct RunOptions {
    /// Units per request; 0 sends everything in one chunk
    pub chunk_size: usize,
    pub concurrency: ConcurrencyMode,
    /// Worker pool size in parallel mode (values below 1 are treated as 1)
    pub max_concurrent: usize,
    /// Delay between chunks (sequential) or between task launches (parallel)
    pub launch_delay: Duration,
    /// Overrides the provider timeout when set
    pub request_timeout: Option<Duration>,
    pub max_retries: u32,
    pub retranslate_existing: bool,
    pub include_fuzzy: bool,
    /// System prompt with a `{{targetLang}}` placeholder
    pub prompt_template: String,
    pub on_progress: Option<ProgressCallback>,
    pub on_log: Option<MessageCallback>,
    pub on_error: Option<MessageCallback>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            chunk_size: 20,
            concurrency: ConcurrencyMode::Sequential,
            max_concurrent: 3,
            launch_delay: Duration::ZERO,
            request_timeout: None,
            max_retries: 3,
            retranslate_existing: false,
            include_fuzzy: false,
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            on_progress: None,
            on_log: None,
            on_error: None,
        }
    }
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("chunk_size", &self.chunk_size)
            .field("concurrency", &self.concurrency)
            .field("max_concurrent", &self.max_concurrent)
            .field("launch_delay", &self.launch_delay)
            .field("request_timeout", &self.request_timeout)
            .field("max_retries", &self.max_retries)
            .field("retranslate_existing", &self.retranslate_existing)
            .field("include_fuzzy", &self.include_fuzzy)
            .field("on_progress", &self.on_progress.is_some())
            .field("on_log", &self.on_log.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl RunOptions {
    /// Load run settings from `L10N_*` variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let concurrency = match std::env::var("L10N_CONCURRENCY") {
            Ok(value) => value.parse().context("L10N_CONCURRENCY is invalid")?,
            Err(_) => defaults.concurrency,
        };

        Ok(Self {
            chunk_size: env_parse("L10N_CHUNK_SIZE").unwrap_or(defaults.chunk_size),
            concurrency,
            max_concurrent: env_parse::<usize>("L10N_MAX_CONCURRENT")
                .unwrap_or(defaults.max_concurrent)
                .max(1),
            launch_delay: env_parse("L10N_LAUNCH_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.launch_delay),
            request_timeout: env_parse("L10N_REQUEST_TIMEOUT_SECS").map(Duration::from_secs),
            max_retries: env_parse("L10N_MAX_RETRIES").unwrap_or(defaults.max_retries),
            retranslate_existing: env_flag("L10N_RETRANSLATE"),
            include_fuzzy: env_flag("L10N_INCLUDE_FUZZY"),
            prompt_template: std::env::var("L10N_PROMPT_TEMPLATE")
                .ok()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(defaults.prompt_template),
            ..defaults
        })
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_concurrency(mut self, mode: ConcurrencyMode, max_concurrent: usize) -> Self {
        self.concurrency = mode;
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    pub fn with_progress(mut self, callback: impl Fn(&str, usize, usize) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn with_log(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_log = Some(Arc::new(callback));
        self
    }

    pub fn with_error(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Worker pool size, never below one.
    pub fn worker_count(&self) -> usize {
        self.max_concurrent.max(1)
    }

    /// System prompt for a language.
    pub fn system_prompt(&self, language_name: &str) -> String {
        self.prompt_template.replace("{{targetLang}}", language_name)
    }

    pub(crate) fn report_progress(&self, language: &str, done: usize, total: usize) {
        if let Some(callback) = &self.on_progress {
            callback(language, done, total);
        }
    }

    pub(crate) fn report_log(&self, message: &str) {
        if let Some(callback) = &self.on_log {
            callback(message);
        }
    }

    pub(crate) fn report_error(&self, message: &str) {
        if let Some(callback) = &self.on_error {
            callback(message);
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
