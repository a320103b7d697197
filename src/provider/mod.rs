//! Provider dispatch: which wire format, endpoint and auth scheme a provider uses.
//!
//! Providers are looked up by identifier in a [`ProviderRegistry`]. Most map to a
//! fixed [`WireFormat`]; a multi-format gateway picks the format from the model
//! name's prefix instead. New providers can be registered without touching the
//! request executor.

mod auth;
mod wire;

pub use auth::{AuthScheme, OAuthToken, TokenSource};
pub use wire::{unwrap_envelope, wrap_envelope, WireFormat};

pub(crate) use auth::recover_unauthorized;

use crate::config::ProviderConfig;
use crate::error::TranslateError;

/// Model-name prefix that routes a gateway request to a given format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixRoute {
    pub prefix: String,
    pub format: WireFormat,
}

/// How a provider's wire format is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatRule {
    /// Always the same format at the format's native endpoint.
    Fixed(WireFormat),
    /// First matching model prefix wins, else `fallback`; gateway endpoints.
    ModelPrefix {
        routes: Vec<PrefixRoute>,
        fallback: WireFormat,
    },
}

/// Static description of a provider.
#[derive(Debug, Clone)]
pub struct ProviderSpec {
    pub id: String,
    pub display_name: String,
    pub base_url: String,
    pub default_model: String,
    pub format: FormatRule,
    pub auth: AuthScheme,
    /// Wrap requests in the `{model, project, request}` envelope
    pub envelope: bool,
    /// Environment variable holding the provider's stored key
    pub key_env: Option<String>,
    pub key_required: bool,
}

impl ProviderSpec {
    /// Provider with a fixed format and bearer-key auth.
    pub fn new(
        id: &str,
        display_name: &str,
        base_url: &str,
        default_model: &str,
        format: WireFormat,
    ) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            base_url: base_url.to_string(),
            default_model: default_model.to_string(),
            format: FormatRule::Fixed(format),
            auth: AuthScheme::Bearer,
            envelope: false,
            key_env: None,
            key_required: true,
        }
    }

    pub fn with_auth(mut self, auth: AuthScheme) -> Self {
        self.key_required = !matches!(auth, AuthScheme::None) && !auth.is_oauth();
        self.auth = auth;
        self
    }

    pub fn with_key_env(mut self, var: &str) -> Self {
        self.key_env = Some(var.to_string());
        self
    }

    pub fn with_optional_key(mut self) -> Self {
        self.key_required = false;
        self
    }

    pub fn with_format_rule(mut self, rule: FormatRule) -> Self {
        self.format = rule;
        self
    }

    pub fn with_envelope(mut self) -> Self {
        self.envelope = true;
        self
    }
}

/// Everything the executor needs to send one request to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub format: WireFormat,
    pub url: String,
    pub auth: AuthScheme,
    pub envelope: bool,
}

/// Registry of known providers.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: Vec<ProviderSpec>,
}

impl ProviderRegistry {
    /// Registry with no providers.
    pub fn empty() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Registry pre-populated with the built-in providers.
    pub fn builtin() -> Self {
        Self {
            providers: builtin_providers(),
        }
    }

    /// Add a provider, replacing any existing one with the same id (ignoring case).
    pub fn register(&mut self, spec: ProviderSpec) {
        self.providers.retain(|p| !p.id.eq_ignore_ascii_case(&spec.id));
        self.providers.push(spec);
    }

    pub fn get(&self, id: &str) -> Option<&ProviderSpec> {
        self.providers.iter().find(|p| p.id.eq_ignore_ascii_case(id))
    }

    pub fn ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.id.as_str()).collect()
    }

    /// Resolve the format, endpoint and auth for a configured provider.
    pub fn route(&self, config: &ProviderConfig) -> Result<Route, TranslateError> {
        let spec = self.get(&config.id).ok_or_else(|| {
            TranslateError::Config(format!("unknown provider '{}'", config.id))
        })?;

        let (format, url) = match &spec.format {
            FormatRule::Fixed(format) if spec.envelope => {
                (*format, format!("{}:generateContent", config.base_url))
            }
            FormatRule::Fixed(format) => (*format, format.endpoint(&config.base_url, &config.model)),
            FormatRule::ModelPrefix { routes, fallback } => {
                let model = config.model.to_ascii_lowercase();
                let format = routes
                    .iter()
                    .find(|r| model.starts_with(&r.prefix))
                    .map(|r| r.format)
                    .unwrap_or(*fallback);
                (format, format.gateway_endpoint(&config.base_url, &config.model))
            }
        };

        Ok(Route {
            format,
            url,
            auth: spec.auth,
            envelope: spec.envelope,
        })
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn gateway_routes() -> FormatRule {
    FormatRule::ModelPrefix {
        routes: vec![
            PrefixRoute {
                prefix: "gemini-".to_string(),
                format: WireFormat::GenerateContent,
            },
            PrefixRoute {
                prefix: "claude-".to_string(),
                format: WireFormat::Messages,
            },
            PrefixRoute {
                prefix: "gpt-".to_string(),
                format: WireFormat::Responses,
            },
        ],
        fallback: WireFormat::ChatCompletions,
    }
}

fn builtin_providers() -> Vec<ProviderSpec> {
    vec![
        ProviderSpec::new(
            "openai",
            "OpenAI",
            "https://api.openai.com/v1",
            "gpt-4o-mini",
            WireFormat::ChatCompletions,
        )
        .with_key_env("OPENAI_API_KEY"),
        ProviderSpec::new(
            "openai-responses",
            "OpenAI Responses",
            "https://api.openai.com/v1",
            "gpt-4o-mini",
            WireFormat::Responses,
        )
        .with_key_env("OPENAI_API_KEY"),
        ProviderSpec::new(
            "deepseek",
            "DeepSeek",
            "https://api.deepseek.com/v1",
            "deepseek-chat",
            WireFormat::ChatCompletions,
        )
        .with_key_env("DEEPSEEK_API_KEY"),
        ProviderSpec::new(
            "openrouter",
            "OpenRouter",
            "https://openrouter.ai/api/v1",
            "openai/gpt-4o-mini",
            WireFormat::ChatCompletions,
        )
        .with_key_env("OPENROUTER_API_KEY"),
        ProviderSpec::new(
            "ollama",
            "Ollama",
            "http://localhost:11434/v1",
            "llama3.1",
            WireFormat::ChatCompletions,
        )
        .with_optional_key(),
        ProviderSpec::new(
            "gemini",
            "Google Gemini",
            "https://generativelanguage.googleapis.com/v1beta",
            "gemini-2.0-flash",
            WireFormat::GenerateContent,
        )
        .with_auth(AuthScheme::GoogleApiKey)
        .with_key_env("GEMINI_API_KEY"),
        ProviderSpec::new(
            "claude",
            "Anthropic Claude",
            "https://api.anthropic.com/v1",
            "claude-3-5-sonnet-latest",
            WireFormat::Messages,
        )
        .with_auth(AuthScheme::AnthropicApiKey)
        .with_key_env("ANTHROPIC_API_KEY"),
        ProviderSpec::new(
            "gateway",
            "Multi-format gateway",
            "http://localhost:3000",
            "gpt-4o-mini",
            WireFormat::ChatCompletions,
        )
        .with_format_rule(gateway_routes())
        .with_key_env("GATEWAY_API_KEY"),
        ProviderSpec::new(
            "copilot",
            "GitHub Copilot",
            "https://api.githubcopilot.com",
            "gpt-4o",
            WireFormat::ChatCompletions,
        )
        .with_auth(AuthScheme::DeviceCodeOAuth),
        ProviderSpec::new(
            "gemini-code-assist",
            "Gemini Code Assist",
            "https://cloudcode-pa.googleapis.com/v1internal",
            "gemini-2.5-flash",
            WireFormat::GenerateContent,
        )
        .with_auth(AuthScheme::RefreshableOAuth)
        .with_envelope(),
    ]
}
