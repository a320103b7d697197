//! Locale-resource JSON (`en.json` → `de.json`) as a translation document.
//!
//! Every string leaf of the source file is a unit, addressed by its dotted
//! key path (`"menu.file.open"`). Persisting walks the source file so the
//! target keeps the source's key order; non-string values are carried over
//! and keys that only exist in the target are kept at the end.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};

use super::{ensure_parent, DocumentStats, TranslatableUnit, TranslationDocument, UnitId};

#[derive(Debug, Clone)]
pub struct JsonResourceDocument {
    source: Map<String, Value>,
    target: Map<String, Value>,
    /// String leaves of `source`, in document order
    units: Vec<TranslatableUnit>,
    values: HashMap<UnitId, String>,
}

impl JsonResourceDocument {
    /// Parse a source file and an optional existing target file.
    pub fn parse(source: &str, target: Option<&str>) -> Result<Self> {
        let source = parse_object(source).context("Invalid source resource file")?;
        let target = match target {
            Some(text) if !text.trim().is_empty() => {
                parse_object(text).context("Invalid target resource file")?
            }
            _ => Map::new(),
        };

        let mut units = Vec::new();
        collect_units(&source, "", &mut units);

        let mut values = HashMap::new();
        for unit in &units {
            if let Some(Value::String(existing)) = lookup(&target, &unit.id) {
                values.insert(unit.id.clone(), existing.clone());
            }
        }

        Ok(Self {
            source,
            target,
            units,
            values,
        })
    }

    /// Read a source file and, if it exists, the target file.
    pub fn open(source_path: &Path, target_path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(source_path)
            .with_context(|| format!("Failed to read {}", source_path.display()))?;
        let target = if target_path.exists() {
            Some(
                std::fs::read_to_string(target_path)
                    .with_context(|| format!("Failed to read {}", target_path.display()))?,
            )
        } else {
            None
        };
        Self::parse(&source, target.as_deref())
            .with_context(|| format!("Failed to load {}", source_path.display()))
    }

    /// The target file as it would be persisted.
    pub fn to_value(&self) -> Value {
        Value::Object(self.render(&self.source, Some(&self.target), ""))
    }

    fn render(
        &self,
        source: &Map<String, Value>,
        target: Option<&Map<String, Value>>,
        prefix: &str,
    ) -> Map<String, Value> {
        let mut out = Map::new();
        for (key, value) in source {
            let id = join(prefix, key);
            let existing = target.and_then(|t| t.get(key));
            let rendered = match value {
                Value::String(_) => {
                    Value::String(self.values.get(&id).cloned().unwrap_or_default())
                }
                Value::Object(children) => {
                    let nested = existing.and_then(Value::as_object);
                    Value::Object(self.render(children, nested, &id))
                }
                other => existing.cloned().unwrap_or_else(|| other.clone()),
            };
            out.insert(key.clone(), rendered);
        }

        if let Some(target) = target {
            for (key, value) in target {
                if !source.contains_key(key) {
                    out.insert(key.clone(), value.clone());
                }
            }
        }
        out
    }
}

fn parse_object(text: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => Ok(map),
        other => bail!("expected a JSON object at the top level, found {}", kind(&other)),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn collect_units(map: &Map<String, Value>, prefix: &str, units: &mut Vec<TranslatableUnit>) {
    for (key, value) in map {
        let id = join(prefix, key);
        match value {
            Value::String(text) => units.push(TranslatableUnit::new(id, text.clone())),
            Value::Object(children) => collect_units(children, &id, units),
            _ => {}
        }
    }
}

/// Follow a dotted id through nested objects.
///
/// Keys that themselves contain dots are matched greedily against the
/// remaining path.
fn lookup<'a>(map: &'a Map<String, Value>, id: &str) -> Option<&'a Value> {
    if let Some(value) = map.get(id) {
        return Some(value);
    }
    for (index, _) in id.match_indices('.') {
        let (head, rest) = (&id[..index], &id[index + 1..]);
        if let Some(Value::Object(child)) = map.get(head) {
            if let Some(found) = lookup(child, rest) {
                return Some(found);
            }
        }
    }
    None
}

impl TranslationDocument for JsonResourceDocument {
    // Resource files carry no review flags, so `include_fuzzy` selects nothing extra.
    fn units_needing_translation(&self, retranslate: bool, _include_fuzzy: bool) -> Vec<UnitId> {
        self.units
            .iter()
            .filter(|u| retranslate || self.values.get(&u.id).map_or(true, |v| v.is_empty()))
            .map(|u| u.id.clone())
            .collect()
    }

    fn unit(&self, id: &str) -> Option<TranslatableUnit> {
        self.units.iter().find(|u| u.id == id).cloned()
    }

    fn get(&self, id: &str) -> Option<String> {
        self.values.get(id).cloned()
    }

    fn set(&mut self, id: &str, value: &str) {
        if self.units.iter().any(|u| u.id == id) {
            self.values.insert(id.to_string(), value.to_string());
        }
    }

    fn clear_needs_review(&mut self, _id: &str) {}

    fn stats(&self) -> DocumentStats {
        DocumentStats {
            total: self.units.len(),
            translated: self
                .units
                .iter()
                .filter(|u| self.values.get(&u.id).is_some_and(|v| !v.is_empty()))
                .count(),
            needs_review: 0,
        }
    }

    fn persist(&self, path: &Path) -> Result<()> {
        ensure_parent(path)
            .with_context(|| format!("Failed to create directory for {}", path.display()))?;
        let json = serde_json::to_string_pretty(&self.to_value())
            .context("Failed to serialize resource file")?;
        std::fs::write(path, json + "\n")
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}
