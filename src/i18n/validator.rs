//! Translation validation.
//!
//! Checks that placeholders and markup survive translation. Findings are
//! reported, never enforced: the scheduler logs them and applies the
//! translation anyway.

use regex::Regex;
use std::sync::OnceLock;

/// Validation report containing errors and warnings about a translation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationReport {
    /// Issues that almost certainly break the string at runtime
    pub errors: Vec<String>,

    /// Issues worth a human look
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// No errors and no warnings.
    pub fn is_clean(&self) -> bool {
        !self.has_errors() && !self.has_warnings()
    }
}

/// Validator for translated strings.
pub struct TranslationValidator;

static PRINTF_REGEX: OnceLock<Regex> = OnceLock::new();
static BRACE_REGEX: OnceLock<Regex> = OnceLock::new();
static TAG_REGEX: OnceLock<Regex> = OnceLock::new();

impl TranslationValidator {
    /// Compare a translation against its source.
    ///
    /// - printf-style placeholders (`%s`, `%1$d`, `%@`) must match as a multiset (error)
    /// - brace placeholders (`{name}`, `{{count}}`) must match as a multiset (error)
    /// - markup tags should keep the same count (warning)
    /// - leading/trailing whitespace should be preserved (warning)
    pub fn validate(original: &str, translated: &str) -> ValidationReport {
        let mut report = ValidationReport::new();

        let orig_printf = Self::extract_printf(original);
        let trans_printf = Self::extract_printf(translated);
        if orig_printf != trans_printf {
            report.errors.push(format!(
                "Placeholder mismatch: original has {:?}, translation has {:?}",
                orig_printf, trans_printf
            ));
        }

        let orig_braces = Self::extract_braces(original);
        let trans_braces = Self::extract_braces(translated);
        if orig_braces != trans_braces {
            report.errors.push(format!(
                "Named placeholder mismatch: original has {:?}, translation has {:?}",
                orig_braces, trans_braces
            ));
        }

        let orig_tags = Self::count_tags(original);
        let trans_tags = Self::count_tags(translated);
        if orig_tags != trans_tags {
            report.warnings.push(format!(
                "Markup tag count mismatch: original has {}, translation has {}",
                orig_tags, trans_tags
            ));
        }

        if leading_ws(original) != leading_ws(translated)
            || trailing_ws(original) != trailing_ws(translated)
        {
            report
                .warnings
                .push("Leading or trailing whitespace differs from original".to_string());
        }

        report
    }

    /// Printf-style placeholders, sorted. `%%` is a literal and not collected.
    fn extract_printf(text: &str) -> Vec<String> {
        let regex = PRINTF_REGEX.get_or_init(|| {
            Regex::new(r"%%|%(?:\d+\$)?[-+ 0#]*(?:\d+|\*)?(?:\.\d+)?(?:hh|h|ll|l|z|j|t|L)?[sdifuxXcoeEgGp@]")
                .unwrap()
        });

        let mut found: Vec<String> = regex
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .filter(|m| m != "%%")
            .collect();
        found.sort();
        found
    }

    /// Brace placeholders, sorted.
    fn extract_braces(text: &str) -> Vec<String> {
        let regex = BRACE_REGEX
            .get_or_init(|| Regex::new(r"\{\{\s*[A-Za-z0-9_.]+\s*\}\}|\{[A-Za-z0-9_]+\}").unwrap());

        let mut found: Vec<String> = regex
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect();
        found.sort();
        found
    }

    fn count_tags(text: &str) -> usize {
        let regex = TAG_REGEX.get_or_init(|| Regex::new(r"</?[A-Za-z][A-Za-z0-9]*[^<>]*>").unwrap());
        regex.find_iter(text).count()
    }
}

fn leading_ws(text: &str) -> &str {
    &text[..text.len() - text.trim_start().len()]
}

fn trailing_ws(text: &str) -> &str {
    &text[text.trim_end().len()..]
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Placeholder Tests ====================

    #[test]
    fn test_extract_printf_variants() {
        let found = TranslationValidator::extract_printf("%s of %1$d at %.2f, 100%% done %@");
        assert_eq!(found, vec!["%.2f", "%1$d", "%@", "%s"]);
    }

    #[test]
    fn test_printf_reordering_is_allowed() {
        let report = TranslationValidator::validate("%s has %d files", "%d Dateien hat %s");
        assert!(report.is_clean());
    }

    #[test]
    fn test_missing_printf_is_error() {
        let report = TranslationValidator::validate("Delete %d files?", "Dateien löschen?");
        assert!(report.has_errors());
        assert!(report.errors[0].contains("Placeholder mismatch"));
    }

    #[test]
    fn test_extract_braces() {
        let found = TranslationValidator::extract_braces("Hi {name}, {{ count }} new {{unread.total}}");
        assert_eq!(found, vec!["{name}", "{{ count }}", "{{unread.total}}"]);
    }

    #[test]
    fn test_renamed_brace_placeholder_is_error() {
        let report = TranslationValidator::validate("Hello {name}", "Hallo {nombre}");
        assert!(report.has_errors());
        assert!(report.errors[0].contains("Named placeholder"));
    }

    // ==================== Markup Tests ====================

    #[test]
    fn test_tag_count_mismatch_is_warning() {
        let report = TranslationValidator::validate("<b>Save</b> now", "Jetzt speichern");
        assert!(!report.has_errors());
        assert!(report.has_warnings());
        assert!(report.warnings[0].contains("Markup tag count"));
    }

    #[test]
    fn test_tags_preserved() {
        let report = TranslationValidator::validate(
            r#"Read the <a href="/docs">docs</a>"#,
            r#"Lies die <a href="/docs">Doku</a>"#,
        );
        assert!(report.is_clean());
    }

    #[test]
    fn test_comparison_operators_are_not_tags() {
        assert_eq!(TranslationValidator::count_tags("a < b and c > d"), 0);
    }

    // ==================== Whitespace Tests ====================

    #[test]
    fn test_whitespace_mismatch_is_warning() {
        let report = TranslationValidator::validate("Name: ", "Name:");
        assert!(report.has_warnings());
        assert!(!report.has_errors());
    }

    #[test]
    fn test_report_default_is_clean() {
        assert!(ValidationReport::default().is_clean());
    }
}
