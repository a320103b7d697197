//! Target language of a translation task.

use crate::i18n::LanguageRegistry;

/// Fallback plural count for languages missing from the registry.
const DEFAULT_NPLURALS: usize = 2;

/// A target language: its code as used by the catalog and a display name for prompts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Language {
    code: String,
    name: String,
}

impl Language {
    /// Create a language with an explicit display name.
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }

    /// Create a language from its code, taking the display name from the registry.
    ///
    /// Unknown codes are accepted; the code doubles as the display name.
    pub fn from_code(code: &str) -> Self {
        let name = LanguageRegistry::get()
            .get_by_code(code)
            .map(|config| config.name.to_string())
            .unwrap_or_else(|| code.to_string());
        Self::new(code, name)
    }

    /// The language code (e.g., "de", "pt_BR").
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The display name used in prompts (e.g., "German").
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Plural-form count from the built-in table.
    pub fn default_nplurals(&self) -> usize {
        LanguageRegistry::get()
            .get_by_code(&self.code)
            .map(|config| config.nplurals)
            .unwrap_or(DEFAULT_NPLURALS)
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.code)
    }
}
