//! Raw detector label to canonical brand name mapping.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AliasError {
    #[error("failed to read alias map {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid alias map JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Static label -> brand table. Labels without an entry map to themselves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliasMap {
    entries: HashMap<String, String>,
}

/// Labels annotated separately in training (wordmark vs. logo, store formats).
const BUILTIN: &[(&str, &str)] = &[
    ("Adidas logo", "Adidas"),
    ("Adidas tekst", "Adidas"),
    ("Björklunds Kafferosteri tekst", "Björklunds Kafferosteri"),
    ("Craft tekst", "Craft"),
    ("Dahl logo", "Dahl"),
    ("Getinge logo", "Getinge"),
    ("Gjuterteknik tekst", "Gjuterteknik"),
    ("Högbergs Buss AB", "Högberg Buss AB"),
    ("Hogbergs Buss AB Uppsala", "Högberg Buss AB"),
    ("ICA Bomben", "ICA"),
    ("ICA City", "ICA"),
    ("ICA Kvantum", "ICA"),
    ("ICA Supermarket", "ICA"),
    ("Luthagens Livs ICA", "ICA"),
    ("Lundebergs Fastigheter logo", "Lundebergs Fastigheter"),
    ("Nike logo", "Nike"),
    ("Nike tekst", "Nike"),
    ("Puma tekst", "Puma"),
    ("Select logo", "Select"),
    ("Sparbanken tekst", "Sparbanken"),
    ("Sportway logo", "Sportway"),
    ("Vaksala Måleri logo", "Vaksala Måleri"),
];

impl AliasMap {
    pub fn new(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }

    /// The table shipped with the default detector model.
    pub fn builtin() -> Self {
        Self::new(
            BUILTIN
                .iter()
                .map(|(raw, brand)| (raw.to_string(), brand.to_string()))
                .collect(),
        )
    }

    /// Parse a JSON object of `{"raw label": "Brand"}`.
    pub fn from_json(json: &str) -> Result<Self, AliasError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, AliasError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| AliasError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Canonical brand for a raw label.
    pub fn canonical<'a>(&'a self, raw: &'a str) -> &'a str {
        self.entries.get(raw).map(String::as_str).unwrap_or(raw)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_groups_variants() {
        let map = AliasMap::builtin();
        assert_eq!(map.canonical("Adidas tekst"), "Adidas");
        assert_eq!(map.canonical("ICA Kvantum"), "ICA");
        assert_eq!(map.canonical("Hogbergs Buss AB Uppsala"), "Högberg Buss AB");
    }

    #[test]
    fn test_unmapped_label_is_identity() {
        let map = AliasMap::builtin();
        assert_eq!(map.canonical("Coca-Cola"), "Coca-Cola");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"Red Bull can": "Red Bull"}}"#).unwrap();

        let map = AliasMap::from_path(file.path()).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.canonical("Red Bull can"), "Red Bull");
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(AliasMap::from_json("[1, 2]"), Err(AliasError::Json(_))));
    }
}
