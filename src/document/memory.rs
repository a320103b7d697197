//! A catalog held in memory and persisted as a JSON snapshot.
//!
//! Supports plural entries, review flags and a `Plural-Forms` header, so it
//! exercises every path of the engine without a real catalog parser.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::{ensure_parent, DocumentStats, TranslatableUnit, TranslationDocument, UnitId};

/// A unit and its translated forms (one element for non-plural units).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(flatten)]
    pub unit: TranslatableUnit,
    #[serde(default)]
    pub translations: Vec<String>,
}

impl CatalogEntry {
    fn is_translated(&self) -> bool {
        self.translations.first().is_some_and(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryCatalog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plural_forms: Option<String>,
    #[serde(default)]
    pub entries: Vec<CatalogEntry>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an untranslated catalog from units.
    pub fn from_units(units: impl IntoIterator<Item = TranslatableUnit>) -> Self {
        let mut catalog = Self::new();
        for unit in units {
            catalog.push(unit);
        }
        catalog
    }

    pub fn with_plural_forms(mut self, header: impl Into<String>) -> Self {
        self.plural_forms = Some(header.into());
        self
    }

    /// Add an untranslated unit.
    pub fn push(&mut self, unit: TranslatableUnit) {
        self.entries.push(CatalogEntry {
            unit,
            translations: Vec::new(),
        });
    }

    /// Add a unit with existing translations.
    pub fn push_translated(&mut self, unit: TranslatableUnit, translations: Vec<String>) {
        self.entries.push(CatalogEntry { unit, translations });
    }

    /// All stored forms of a unit.
    pub fn translations(&self, id: &str) -> Option<&[String]> {
        self.entry(id).map(|e| e.translations.as_slice())
    }

    /// Load a snapshot written by [`TranslationDocument::persist`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse catalog {}", path.display()))
    }

    fn entry(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.unit.id == id)
    }

    fn entry_mut(&mut self, id: &str) -> Option<&mut CatalogEntry> {
        self.entries.iter_mut().find(|e| e.unit.id == id)
    }
}

impl TranslationDocument for MemoryCatalog {
    fn units_needing_translation(&self, retranslate: bool, include_fuzzy: bool) -> Vec<UnitId> {
        self.entries
            .iter()
            .filter(|e| {
                retranslate || !e.is_translated() || (include_fuzzy && e.unit.needs_review)
            })
            .map(|e| e.unit.id.clone())
            .collect()
    }

    fn unit(&self, id: &str) -> Option<TranslatableUnit> {
        self.entry(id).map(|e| e.unit.clone())
    }

    fn get(&self, id: &str) -> Option<String> {
        self.entry(id).and_then(|e| e.translations.first().cloned())
    }

    fn set(&mut self, id: &str, value: &str) {
        self.set_form(id, 0, value);
    }

    fn set_form(&mut self, id: &str, index: usize, value: &str) {
        if let Some(entry) = self.entry_mut(id) {
            if entry.translations.len() <= index {
                entry.translations.resize(index + 1, String::new());
            }
            entry.translations[index] = value.to_string();
        }
    }

    fn clear_needs_review(&mut self, id: &str) {
        if let Some(entry) = self.entry_mut(id) {
            entry.unit.needs_review = false;
        }
    }

    fn plural_forms_header(&self) -> Option<String> {
        self.plural_forms.clone()
    }

    fn stats(&self) -> DocumentStats {
        DocumentStats {
            total: self.entries.len(),
            translated: self.entries.iter().filter(|e| e.is_translated()).count(),
            needs_review: self.entries.iter().filter(|e| e.unit.needs_review).count(),
        }
    }

    fn persist(&self, path: &Path) -> Result<()> {
        ensure_parent(path)
            .with_context(|| format!("Failed to create directory for {}", path.display()))?;
        let json = serde_json::to_string_pretty(self).context("Failed to serialize catalog")?;
        std::fs::write(path, json + "\n")
            .with_context(|| format!("Failed to write catalog {}", path.display()))
    }
}
