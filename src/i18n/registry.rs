//! Language registry: display names and default plural-form counts.
//!
//! The registry is a process-wide singleton initialized once with `OnceLock`.
//! It is only consulted for defaults; catalogs that declare their own plural
//! rule take precedence (see [`crate::plural::plural_count`]).

use std::sync::OnceLock;

/// Metadata for a known target language.
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// Lowercase language code (e.g., "de", "pt-br")
    pub code: &'static str,

    /// English name of the language (e.g., "German")
    pub name: &'static str,

    /// Native name of the language (e.g., "Deutsch")
    pub native_name: &'static str,

    /// Number of gettext plural forms
    pub nplurals: usize,
}

/// Global language registry singleton.
pub struct LanguageRegistry {
    languages: Vec<LanguageConfig>,
}

/// Global registry instance (initialized lazily)
static REGISTRY: OnceLock<LanguageRegistry> = OnceLock::new();

impl LanguageRegistry {
    /// Get the global language registry instance.
    pub fn get() -> &'static LanguageRegistry {
        REGISTRY.get_or_init(|| LanguageRegistry {
            languages: default_languages(),
        })
    }

    /// Look up a language by code.
    ///
    /// Codes are matched case-insensitively with `_` and `-` treated alike;
    /// a regional code with no entry of its own (e.g. "de_AT") falls back to
    /// its base language ("de").
    pub fn get_by_code(&self, code: &str) -> Option<&LanguageConfig> {
        let normalized = code.trim().to_ascii_lowercase().replace('_', "-");
        if normalized.is_empty() {
            return None;
        }
        self.find(&normalized).or_else(|| {
            normalized
                .split('-')
                .next()
                .and_then(|base| self.find(base))
        })
    }

    /// All known languages.
    pub fn list_all(&self) -> Vec<&LanguageConfig> {
        self.languages.iter().collect()
    }

    fn find(&self, code: &str) -> Option<&LanguageConfig> {
        self.languages.iter().find(|lang| lang.code == code)
    }
}

macro_rules! lang {
    ($code:expr, $name:expr, $native:expr, $nplurals:expr) => {
        LanguageConfig {
            code: $code,
            name: $name,
            native_name: $native,
            nplurals: $nplurals,
        }
    };
}

/// Built-in language table.
///
/// Plural counts follow the conventional gettext `Plural-Forms` headers.
fn default_languages() -> Vec<LanguageConfig> {
    vec![
        // One form
        lang!("ja", "Japanese", "日本語", 1),
        lang!("zh", "Chinese", "中文", 1),
        lang!("zh-cn", "Simplified Chinese", "简体中文", 1),
        lang!("zh-tw", "Traditional Chinese", "繁體中文", 1),
        lang!("ko", "Korean", "한국어", 1),
        lang!("vi", "Vietnamese", "Tiếng Việt", 1),
        lang!("th", "Thai", "ไทย", 1),
        lang!("id", "Indonesian", "Bahasa Indonesia", 1),
        lang!("ms", "Malay", "Bahasa Melayu", 1),
        // Two forms
        lang!("en", "English", "English", 2),
        lang!("de", "German", "Deutsch", 2),
        lang!("es", "Spanish", "Español", 2),
        lang!("fr", "French", "Français", 2),
        lang!("it", "Italian", "Italiano", 2),
        lang!("pt", "Portuguese", "Português", 2),
        lang!("pt-br", "Brazilian Portuguese", "Português do Brasil", 2),
        lang!("nl", "Dutch", "Nederlands", 2),
        lang!("sv", "Swedish", "Svenska", 2),
        lang!("da", "Danish", "Dansk", 2),
        lang!("nb", "Norwegian Bokmål", "Norsk bokmål", 2),
        lang!("fi", "Finnish", "Suomi", 2),
        lang!("el", "Greek", "Ελληνικά", 2),
        lang!("hu", "Hungarian", "Magyar", 2),
        lang!("tr", "Turkish", "Türkçe", 2),
        lang!("he", "Hebrew", "עברית", 2),
        lang!("bg", "Bulgarian", "Български", 2),
        lang!("et", "Estonian", "Eesti", 2),
        lang!("ca", "Catalan", "Català", 2),
        lang!("hi", "Hindi", "हिन्दी", 2),
        lang!("bn", "Bengali", "বাংলা", 2),
        lang!("fa", "Persian", "فارسی", 2),
        // Three forms
        lang!("ru", "Russian", "Русский", 3),
        lang!("uk", "Ukrainian", "Українська", 3),
        lang!("pl", "Polish", "Polski", 3),
        lang!("cs", "Czech", "Čeština", 3),
        lang!("sk", "Slovak", "Slovenčina", 3),
        lang!("hr", "Croatian", "Hrvatski", 3),
        lang!("sr", "Serbian", "Српски", 3),
        lang!("bs", "Bosnian", "Bosanski", 3),
        lang!("lt", "Lithuanian", "Lietuvių", 3),
        lang!("lv", "Latvian", "Latviešu", 3),
        lang!("ro", "Romanian", "Română", 3),
        // Four or more forms
        lang!("sl", "Slovenian", "Slovenščina", 4),
        lang!("cy", "Welsh", "Cymraeg", 4),
        lang!("ga", "Irish", "Gaeilge", 5),
        lang!("ar", "Arabic", "العربية", 6),
    ]
}
