// ABOUTME: Label catalog for localized tool names and descriptions.
// ABOUTME: Flattens TOML tables into dotted keys; an embedded English catalog is always available.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

const EMBEDDED_EN: &str = include_str!("../../locales/en.toml");

/// Dotted-key label lookup, e.g. `tools.shell.name`
#[derive(Debug, Clone, Default)]
pub struct LabelCatalog {
    locale: String,
    labels: HashMap<String, String>,
}

impl LabelCatalog {
    /// The catalog compiled into the binary
    pub fn embedded() -> Self {
        match Self::from_toml_str("en", EMBEDDED_EN) {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::error!(error = %e, "Embedded label catalog is invalid");
                Self::default()
            }
        }
    }

    pub fn from_toml_str(locale: &str, content: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(content).context("Failed to parse label catalog")?;
        let mut labels = HashMap::new();
        flatten("", &table, &mut labels);
        Ok(Self {
            locale: locale.to_string(),
            labels,
        })
    }

    /// Load a catalog file layered over the embedded English labels
    pub fn load(locale: &str, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read label catalog {}", path.display()))?;
        let overlay = Self::from_toml_str(locale, &content)
            .with_context(|| format!("Invalid label catalog {}", path.display()))?;
        Ok(Self::embedded().overlay(overlay))
    }

    /// Labels from `other` win; the locale becomes `other`'s
    pub fn overlay(mut self, other: LabelCatalog) -> Self {
        self.locale = other.locale;
        self.labels.extend(other.labels);
        self
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

fn flatten(prefix: &str, table: &toml::Table, out: &mut HashMap<String, String>) {
    for (key, value) in table {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            toml::Value::Table(nested) => flatten(&full_key, nested, out),
            toml::Value::String(s) => {
                out.insert(full_key, s.clone());
            }
            other => {
                tracing::debug!(key = %full_key, value = %other, "Ignoring non-string label");
            }
        }
    }
}
