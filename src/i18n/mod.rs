//! Language metadata and translation quality support.
//!
//! - `registry`: built-in language table (display names, plural counts)
//! - `language`: the target language of a translation task
//! - `validator`: placeholder and markup checks on translated strings
//! - `metrics`: per-executor request counters
//!
//! # Example
//!
//! ```rust,ignore
//! use ai_localizer::i18n::{Language, LanguageRegistry};
//!
//! let polish = Language::from_code("pl");
//! assert_eq!(polish.default_nplurals(), 3);
//!
//! let all = LanguageRegistry::get().list_all();
//! ```

mod language;
mod metrics;
mod registry;
mod validator;

pub use language::Language;
pub use metrics::{MetricsReport, TranslationMetrics};
pub use registry::{LanguageConfig, LanguageRegistry};
pub use validator::{TranslationValidator, ValidationReport};
