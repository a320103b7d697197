//! AI translation orchestration.
//!
//! Takes untranslated units from translation documents, sends them in chunks
//! to an AI provider under concurrency and rate-limit constraints, and merges
//! the answers back without corrupting the documents.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ai_localizer::{
//!     translate_documents, JsonResourceDocument, Language, LanguageTask, ProviderConfig,
//!     ProviderRegistry, RequestExecutor, RetryPolicy, RunOptions,
//! };
//!
//! let registry = ProviderRegistry::builtin();
//! let options = RunOptions::from_env()?;
//! let executor = RequestExecutor::new(
//!     ProviderConfig::from_env(&registry)?,
//!     &registry,
//!     RetryPolicy::for_run(&options),
//! )?;
//!
//! let document = JsonResourceDocument::open("en.json".as_ref(), "de.json".as_ref())?;
//! let tasks = vec![LanguageTask::new(Language::from_code("de"), document, "de.json")];
//! let summary = translate_documents(tasks, Arc::new(executor), &options, Default::default()).await?;
//! ```

pub mod config;
pub mod decode;
pub mod document;
pub mod error;
pub mod executor;
pub mod i18n;
pub mod plural;
pub mod provider;
pub mod rate_limit;
pub mod retry;
pub mod scheduler;

pub use config::{ConcurrencyMode, ProviderConfig, ProviderOverrides, RunOptions};
pub use document::{JsonResourceDocument, MemoryCatalog, TranslatableUnit, TranslationDocument};
pub use error::{DecodeError, LanguageFailure, RunError, TranslateError};
pub use executor::{CompletionBackend, RequestExecutor};
pub use i18n::Language;
pub use provider::{OAuthToken, ProviderRegistry, TokenSource};
pub use rate_limit::RateLimitCoordinator;
pub use retry::RetryPolicy;
pub use scheduler::{translate_documents, LanguageTask, RunSummary};
