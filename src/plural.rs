//! Plural-aware translation protocol.
//!
//! Works out how many plural forms a target language needs, asks the model
//! for exactly that many per plural unit, and reconciles answers that come
//! back with too few or too many forms.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::document::TranslatableUnit;
use crate::i18n::Language;

/// One decoded element of a model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluralTranslation {
    /// A plain string, for a non-plural unit (or a model that ignored the plural request)
    Single(String),
    /// Plural forms in order, as returned by the model
    Forms(Vec<String>),
}

impl PluralTranslation {
    /// Reconcile to exactly `nplurals` forms.
    ///
    /// A single string is repeated across every form. A short list is padded
    /// by repeating its last form; a long one is truncated. An empty list
    /// stays empty so nothing gets written.
    pub fn into_forms(self, nplurals: usize) -> Vec<String> {
        match self {
            PluralTranslation::Single(text) => vec![text; nplurals],
            PluralTranslation::Forms(mut forms) => {
                let Some(last) = forms.last().cloned() else {
                    return forms;
                };
                if forms.len() < nplurals {
                    debug!(
                        "Padding {} plural form(s) to {} by repeating the last form",
                        forms.len(),
                        nplurals
                    );
                    forms.resize(nplurals, last);
                } else if forms.len() > nplurals {
                    debug!("Truncating {} plural forms to {}", forms.len(), nplurals);
                    forms.truncate(nplurals);
                }
                forms
            }
        }
    }

    /// The text for a non-plural unit: the string itself, or the first form.
    pub fn into_text(self) -> String {
        match self {
            PluralTranslation::Single(text) => text,
            PluralTranslation::Forms(forms) => forms.into_iter().next().unwrap_or_default(),
        }
    }
}

/// No language in use needs more plural forms than this.
pub const MAX_NPLURALS: usize = 6;

static NPLURALS_REGEX: OnceLock<Regex> = OnceLock::new();

/// Read `nplurals=N` from a gettext-style `Plural-Forms` header.
///
/// Values outside `1..=MAX_NPLURALS` are ignored.
pub fn parse_nplurals(header: &str) -> Option<usize> {
    let regex = NPLURALS_REGEX.get_or_init(|| Regex::new(r"nplurals\s*=\s*(\d+)").unwrap());
    regex
        .captures(header)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .filter(|n| (1..=MAX_NPLURALS).contains(n))
}

/// Plural-form count for a document: its own header wins over the built-in table.
pub fn plural_count(header: Option<&str>, language: &Language) -> usize {
    header
        .and_then(parse_nplurals)
        .unwrap_or_else(|| language.default_nplurals())
}

/// Whether any unit in the chunk carries a plural counterpart.
pub fn has_plurals(units: &[TranslatableUnit]) -> bool {
    units.iter().any(TranslatableUnit::is_plural)
}

/// Build the user prompt for one chunk.
///
/// Units are numbered in order and their source text is JSON-quoted so
/// embedded quotes and newlines are unambiguous. Plural units carry both
/// source forms and ask for exactly `nplurals` translations.
pub fn build_user_prompt(units: &[TranslatableUnit], nplurals: usize) -> String {
    let plural_mode = has_plurals(units);
    let mut prompt = format!(
        "Translate the following {} string(s). Respond with only a JSON array of exactly {} element(s), in the same order.\n",
        units.len(),
        units.len()
    );
    if plural_mode {
        prompt.push_str(&format!(
            "Entries marked PLURAL must be answered with an array of exactly {} string(s), one per plural form of the target language, in its standard plural order. All other entries are answered with a plain string.\n",
            nplurals
        ));
    }
    prompt.push('\n');

    for (index, unit) in units.iter().enumerate() {
        let number = index + 1;
        match &unit.plural_source {
            Some(plural) => prompt.push_str(&format!(
                "{}. PLURAL singular: {} plural: {} (return {} forms)\n",
                number,
                quote(&unit.source),
                quote(plural),
                nplurals
            )),
            None => prompt.push_str(&format!("{}. {}\n", number, quote(&unit.source))),
        }
        if !unit.references.is_empty() {
            prompt.push_str(&format!("   Context: {}\n", unit.references.join(", ")));
        }
    }

    prompt
}

fn quote(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forms(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    // ==================== Reconciliation Tests ====================

    #[test]
    fn test_into_forms_pads_by_repeating_last() {
        let result = PluralTranslation::Forms(forms(&["x"])).into_forms(3);
        assert_eq!(result, forms(&["x", "x", "x"]));

        let result = PluralTranslation::Forms(forms(&["a", "b"])).into_forms(4);
        assert_eq!(result, forms(&["a", "b", "b", "b"]));
    }

    #[test]
    fn test_into_forms_truncates() {
        let result = PluralTranslation::Forms(forms(&["x", "y", "z", "w"])).into_forms(3);
        assert_eq!(result, forms(&["x", "y", "z"]));
    }

    #[test]
    fn test_into_forms_single_is_repeated() {
        let result = PluralTranslation::Single("Datei".to_string()).into_forms(2);
        assert_eq!(result, forms(&["Datei", "Datei"]));
    }

    #[test]
    fn test_into_forms_empty_stays_empty() {
        assert!(PluralTranslation::Forms(Vec::new()).into_forms(3).is_empty());
    }

    #[test]
    fn test_into_text() {
        assert_eq!(PluralTranslation::Single("a".into()).into_text(), "a");
        assert_eq!(PluralTranslation::Forms(forms(&["b", "c"])).into_text(), "b");
        assert_eq!(PluralTranslation::Forms(Vec::new()).into_text(), "");
    }

    // ==================== Plural Count Tests ====================

    #[test]
    fn test_parse_nplurals() {
        assert_eq!(
            parse_nplurals("nplurals=3; plural=(n%10==1 && n%100!=11 ? 0 : 1);"),
            Some(3)
        );
        assert_eq!(parse_nplurals("nplurals = 1; plural=0;"), Some(1));
        assert_eq!(parse_nplurals("plural=0;"), None);
        assert_eq!(parse_nplurals("nplurals=0;"), None);
    }

    #[test]
    fn test_oversized_nplurals_header_falls_back() {
        assert_eq!(parse_nplurals("nplurals=6; plural=n;"), Some(6));
        assert_eq!(parse_nplurals("nplurals=4000000000; plural=n;"), None);
        assert_eq!(
            plural_count(Some("nplurals=4000000000; plural=n;"), &Language::from_code("pl")),
            3
        );
    }

    #[test]
    fn test_plural_count_prefers_header() {
        let german = Language::from_code("de");
        assert_eq!(plural_count(Some("nplurals=3; plural=0;"), &german), 3);
        assert_eq!(plural_count(None, &german), 2);
        assert_eq!(plural_count(Some("garbage"), &Language::from_code("ja")), 1);
    }

    // ==================== Prompt Tests ====================

    #[test]
    fn test_prompt_plain_units() {
        let units = vec![
            TranslatableUnit::new("greeting", "Hello \"world\""),
            TranslatableUnit::new("farewell", "Bye").with_references(vec!["src/app.rs:10".to_string()]),
        ];

        let prompt = build_user_prompt(&units, 2);
        assert!(prompt.contains("exactly 2 element(s)"));
        assert!(prompt.contains(r#"1. "Hello \"world\"""#));
        assert!(prompt.contains(r#"2. "Bye""#));
        assert!(prompt.contains("Context: src/app.rs:10"));
        assert!(!prompt.contains("PLURAL"));
    }

    #[test]
    fn test_prompt_plural_units() {
        let units = vec![
            TranslatableUnit::new("files", "%d file").with_plural("%d files"),
            TranslatableUnit::new("title", "Files"),
        ];
        assert!(has_plurals(&units));

        let prompt = build_user_prompt(&units, 3);
        assert!(prompt.contains("exactly 3 string(s), one per plural form"));
        assert!(prompt.contains(r#"1. PLURAL singular: "%d file" plural: "%d files" (return 3 forms)"#));
        assert!(prompt.contains(r#"2. "Files""#));
    }
}
