//! The contract between the engine and an on-disk translation format.
//!
//! The scheduler never parses files itself. It asks a [`TranslationDocument`]
//! which units need work, reads their source text, writes translations back
//! and finally asks the document to persist itself.

mod json;
mod memory;

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use json::JsonResourceDocument;
pub use memory::{CatalogEntry, MemoryCatalog};

/// Stable identifier of a unit within its document.
pub type UnitId = String;

/// One piece of text to translate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatableUnit {
    pub id: UnitId,
    pub source: String,

    /// Plural source text, for entries with singular/plural forms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plural_source: Option<String>,

    /// Source references shown to the model as context
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,

    /// Fuzzy / needs-review marker
    #[serde(default)]
    pub needs_review: bool,
}

impl TranslatableUnit {
    pub fn new(id: impl Into<UnitId>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            plural_source: None,
            references: Vec::new(),
            needs_review: false,
        }
    }

    pub fn with_plural(mut self, plural_source: impl Into<String>) -> Self {
        self.plural_source = Some(plural_source.into());
        self
    }

    pub fn with_references(mut self, references: Vec<String>) -> Self {
        self.references = references;
        self
    }

    pub fn needing_review(mut self) -> Self {
        self.needs_review = true;
        self
    }

    pub fn is_plural(&self) -> bool {
        self.plural_source.is_some()
    }
}

/// Unit counts for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DocumentStats {
    pub total: usize,
    pub translated: usize,
    pub needs_review: usize,
}

/// A translation file the engine can fill in.
///
/// Implemented once per on-disk format. Unknown ids are ignored by the
/// mutating methods.
pub trait TranslationDocument: Send {
    /// Units to send for translation, in source order.
    ///
    /// `retranslate` selects every unit. Otherwise untranslated units are
    /// selected, plus units flagged for review when `include_fuzzy` is set.
    fn units_needing_translation(&self, retranslate: bool, include_fuzzy: bool) -> Vec<UnitId>;

    fn unit(&self, id: &str) -> Option<TranslatableUnit>;

    /// Current (first-form) translation.
    fn get(&self, id: &str) -> Option<String>;

    fn set(&mut self, id: &str, value: &str);

    /// Write one plural form. Formats without plurals only accept index 0.
    fn set_form(&mut self, id: &str, index: usize, value: &str) {
        if index == 0 {
            self.set(id, value);
        }
    }

    fn clear_needs_review(&mut self, id: &str);

    /// The document's own `Plural-Forms` rule, if it declares one.
    fn plural_forms_header(&self) -> Option<String> {
        None
    }

    fn stats(&self) -> DocumentStats;

    /// Write the document, preserving key order and untranslatable content.
    fn persist(&self, path: &Path) -> Result<()>;
}

/// Create the parent directory of `path` if needed.
pub(crate) fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_builders() {
        let unit = TranslatableUnit::new("files", "%d file")
            .with_plural("%d files")
            .with_references(vec!["src/list.rs:42".to_string()])
            .needing_review();

        assert!(unit.is_plural());
        assert!(unit.needs_review);
        assert_eq!(unit.references.len(), 1);
    }

    #[test]
    fn test_unit_serde_skips_empty_fields() {
        let json = serde_json::to_value(TranslatableUnit::new("a", "Apple")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": "a", "source": "Apple", "needs_review": false})
        );

        let parsed: TranslatableUnit =
            serde_json::from_str(r#"{"id":"b","source":"Pear"}"#).unwrap();
        assert!(!parsed.is_plural());
        assert!(!parsed.needs_review);
    }
}
