use std::fmt::Display;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::CatalogError;

/// Message severity written into the report. Serialized as the integer
/// codes consumed by the learning environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    Incorrect = 0,
    Correct = 1,
    Info = 2,
    Error = 3,
    Debug = 4,
    LintConvention = 10,
    LintRefactor = 11,
    LintWarning = 12,
    LintFatal = 13,
}

impl Serialize for Flag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for Flag {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        match code {
            0 => Ok(Flag::Incorrect),
            1 => Ok(Flag::Correct),
            2 => Ok(Flag::Info),
            3 => Ok(Flag::Error),
            4 => Ok(Flag::Debug),
            10 => Ok(Flag::LintConvention),
            11 => Ok(Flag::LintRefactor),
            12 => Ok(Flag::LintWarning),
            13 => Ok(Flag::LintFatal),
            other => Err(serde::de::Error::custom(format!(
                "unknown message flag {other}"
            ))),
        }
    }
}

/// Message categories, one catalog per (locale, category) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Import,
    Function,
    Program,
    Snippet,
    Static,
    Lint,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Import => "import",
            Category::Function => "function",
            Category::Program => "program",
            Category::Snippet => "snippet",
            Category::Static => "static",
            Category::Lint => "lint",
        }
    }
}

/// One feedback template: a body with `{$name}` placeholders plus the
/// trigger and hint labels passed through to the report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entry {
    pub content: String,
    pub triggers: Vec<String>,
    pub hints: Vec<String>,
}

impl Entry {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            triggers: Vec::new(),
            hints: Vec::new(),
        }
    }

    /// Fills `{$name}` placeholders in the body.
    pub fn format(&self, args: &[(&str, String)]) -> String {
        let mut text = self.content.clone();
        for (name, value) in args {
            text = text.replace(&format!("{{${name}}}"), value);
        }
        text
    }
}

/// A caller-supplied override for one catalog entry. A plain string
/// replaces only the body; a structured override replaces the fields it
/// names. Keys absent from the base catalog are inserted verbatim.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Override {
    Plain(String),
    Structured {
        content: Option<String>,
        triggers: Option<Vec<String>>,
        hints: Option<Vec<String>>,
    },
}

impl Override {
    fn apply(&self, entry: &mut Entry) {
        match self {
            Override::Plain(body) => entry.content = body.clone(),
            Override::Structured {
                content,
                triggers,
                hints,
            } => {
                if let Some(body) = content {
                    entry.content = body.clone();
                }
                if let Some(t) = triggers {
                    entry.triggers = t.clone();
                }
                if let Some(h) = hints {
                    entry.hints = h.clone();
                }
            }
        }
    }

    fn to_entry(&self) -> Entry {
        let mut entry = Entry::default();
        self.apply(&mut entry);
        entry
    }
}

/// One layer of overrides, applied on top of the built-in catalog in the
/// order the layers were pushed.
pub type OverrideLayer = IndexMap<String, Override>;

type RawCatalog = IndexMap<String, IndexMap<String, String>>;

fn builtin(locale: &str) -> Option<&'static str> {
    match locale {
        "en" => Some(include_str!("../locales/en.yaml")),
        "fi" => Some(include_str!("../locales/fi.yaml")),
        _ => None,
    }
}

/// Detects the locale from the environment, checking `LC_ALL`,
/// `LC_MESSAGES` and `LANG` in order. Falls back to English.
pub fn detect_locale() -> String {
    for var in ["LC_ALL", "LC_MESSAGES", "LANG"] {
        if let Ok(value) = std::env::var(var) {
            let bare = value.split('.').next().unwrap_or(&value);
            let code = bare
                .split('_')
                .next()
                .unwrap_or(bare)
                .split('-')
                .next()
                .unwrap_or(bare)
                .to_lowercase();
            match code.as_str() {
                "fi" | "fin" => return "fi".to_string(),
                "en" => return "en".to_string(),
                _ => continue,
            }
        }
    }
    "en".to_string()
}

/// Locale- and key-indexed store of feedback templates for one message
/// category: the built-in base plus ordered override layers. Resolution is
/// a pure fold over the layers; lookups never fall back across locales.
#[derive(Debug, Clone)]
pub struct Catalog {
    locale: String,
    base: IndexMap<String, Entry>,
    layers: Vec<OverrideLayer>,
}

impl Catalog {
    /// Loads the built-in catalog for a (locale, category) pair. A pair
    /// that does not exist is a fatal startup condition.
    pub fn load(locale: &str, category: Category) -> Result<Self, CatalogError> {
        let source = builtin(locale).ok_or_else(|| CatalogError::MissingCatalog {
            locale: locale.to_string(),
            category: category.as_str().to_string(),
        })?;
        let raw: RawCatalog =
            serde_yaml::from_str(source).map_err(|source| CatalogError::Malformed {
                locale: locale.to_string(),
                source,
            })?;
        let section = raw
            .get(category.as_str())
            .ok_or_else(|| CatalogError::MissingCatalog {
                locale: locale.to_string(),
                category: category.as_str().to_string(),
            })?;
        let base = section
            .iter()
            .map(|(key, body)| (key.clone(), Entry::text(body)))
            .collect();
        Ok(Self {
            locale: locale.to_string(),
            base,
            layers: Vec::new(),
        })
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Layers caller customizations over the built-in entries.
    pub fn push_layer(&mut self, layer: OverrideLayer) {
        self.layers.push(layer);
    }

    fn lookup(&self, key: &str) -> Option<Entry> {
        let mut entry = self.base.get(key).cloned();
        for layer in &self.layers {
            if let Some(patch) = layer.get(key) {
                match entry.as_mut() {
                    Some(e) => patch.apply(e),
                    None => entry = Some(patch.to_entry()),
                }
            }
        }
        entry
    }

    /// Resolves `key`; on a miss retries with `default` when given. A miss
    /// on both is a configuration bug in the grading definition.
    pub fn resolve(&self, key: &str, default: Option<&str>) -> Result<Entry, CatalogError> {
        self.lookup(key)
            .or_else(|| default.and_then(|d| self.lookup(d)))
            .ok_or_else(|| CatalogError::MissingKey {
                key: key.to_string(),
                locale: self.locale.clone(),
            })
    }
}

/// Convenience for building format argument slices from mixed Display
/// values.
pub fn arg<'a>(name: &'a str, value: &dyn Display) -> (&'a str, String) {
    (name, value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalogs_parse() {
        for locale in ["en", "fi"] {
            for category in [
                Category::Import,
                Category::Function,
                Category::Program,
                Category::Snippet,
                Category::Static,
                Category::Lint,
            ] {
                let catalog = Catalog::load(locale, category);
                assert!(catalog.is_ok(), "missing {locale}/{}", category.as_str());
            }
        }
    }

    #[test]
    fn unknown_locale_is_fatal() {
        let result = Catalog::load("xx", Category::Function);
        assert!(matches!(result, Err(CatalogError::MissingCatalog { .. })));
    }

    #[test]
    fn default_key_fallback() {
        let catalog = Catalog::load("en", Category::Function).unwrap();
        let entry = catalog.resolve("NoSuchKey", Some("IncorrectResult")).unwrap();
        let direct = catalog.resolve("IncorrectResult", None).unwrap();
        assert_eq!(entry.content, direct.content);
        assert!(matches!(
            catalog.resolve("NoSuchKey", None),
            Err(CatalogError::MissingKey { .. })
        ));
    }

    #[test]
    fn plain_override_replaces_body_only() {
        let mut catalog = Catalog::load("en", Category::Function).unwrap();
        let mut layer = OverrideLayer::new();
        layer.insert(
            "CorrectResult".to_string(),
            Override::Structured {
                content: None,
                triggers: Some(vec!["well-done".to_string()]),
                hints: None,
            },
        );
        catalog.push_layer(layer);

        let mut second = OverrideLayer::new();
        second.insert(
            "CorrectResult".to_string(),
            Override::Plain("custom body".to_string()),
        );
        catalog.push_layer(second);

        let entry = catalog.resolve("CorrectResult", None).unwrap();
        assert_eq!(entry.content, "custom body");
        assert_eq!(entry.triggers, vec!["well-done".to_string()]);
    }

    #[test]
    fn unknown_override_key_inserted_verbatim() {
        let mut catalog = Catalog::load("en", Category::Function).unwrap();
        let mut layer = OverrideLayer::new();
        layer.insert(
            "off_by_one".to_string(),
            Override::Plain("Your result looks off by one.".to_string()),
        );
        catalog.push_layer(layer);
        let entry = catalog.resolve("off_by_one", None).unwrap();
        assert_eq!(entry.content, "Your result looks off by one.");
    }

    #[test]
    fn placeholder_formatting() {
        let entry = Entry::text("The fault {$ename} was raised: {$emsg}");
        let text = entry.format(&[
            arg("ename", &"arithmetic"),
            arg("emsg", &"division by zero"),
        ]);
        assert_eq!(text, "The fault arithmetic was raised: division by zero");
    }
}
