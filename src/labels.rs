// Label catalogs used for human-readable messages
//
// The upload engine only sees the `LabelLookup` trait; catalogs are loaded by the embedder.

use regex::Regex;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

pub const DEFAULT_LANGUAGE: &str = "it";

const BUILTIN_EN: &str = include_str!("../locales/en.json");
const BUILTIN_IT: &str = include_str!("../locales/it.json");

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("placeholder pattern is valid"));

pub trait LabelLookup: Send + Sync {
    /// Resolve `key` and substitute `{param}` placeholders. Unknown keys resolve to the key.
    fn label(&self, key: &str, params: &[(&str, String)]) -> String;
}

#[derive(Debug, Clone)]
pub struct Labels {
    language: String,
    values: Value,
}

impl Labels {
    pub fn from_value(language: &str, values: Value) -> Self {
        Self {
            language: language.to_string(),
            values,
        }
    }

    /// Catalog shipped with the crate, if there is one for `language`.
    pub fn builtin(language: &str) -> Option<Self> {
        let source = match language {
            "en" => BUILTIN_EN,
            "it" => BUILTIN_IT,
            _ => return None,
        };

        match serde_json::from_str(source) {
            Ok(values) => Some(Self::from_value(language, values)),
            Err(e) => {
                log::error!("Built-in catalog for '{}' is malformed: {}", language, e);
                None
            }
        }
    }

    /// Load the catalog for `language`, falling back to the default language on failure.
    ///
    /// `<locales_dir>/<language>.json` wins over the built-in catalog when present.
    pub fn load(language: &str, locales_dir: Option<&Path>) -> Self {
        if let Some(dir) = locales_dir {
            let path = dir.join(format!("{}.json", language));
            match fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|s| serde_json::from_str::<Value>(&s).map_err(|e| e.to_string()))
            {
                Ok(values) => {
                    log::debug!("Loaded labels for '{}' from {}", language, path.display());
                    return Self::from_value(language, values);
                }
                Err(e) => {
                    log::debug!("No usable catalog at {}: {}", path.display(), e);
                }
            }
        }

        if let Some(labels) = Self::builtin(language) {
            return labels;
        }

        log::warn!(
            "Missing translation for \"{}\", falling back to \"{}\"",
            language,
            DEFAULT_LANGUAGE
        );
        Self::builtin(DEFAULT_LANGUAGE)
            .unwrap_or_else(|| Self::from_value(DEFAULT_LANGUAGE, Value::Null))
    }

    pub fn language(&self) -> &str {
        &self.language
    }
}

impl Default for Labels {
    fn default() -> Self {
        Self::load(DEFAULT_LANGUAGE, None)
    }
}

impl LabelLookup for Labels {
    fn label(&self, key: &str, params: &[(&str, String)]) -> String {
        get_label(key, &self.values, params)
    }
}

pub fn get_label(key: &str, values: &Value, params: &[(&str, String)]) -> String {
    let mut current = values;
    for part in key.split('.') {
        match current.get(part) {
            Some(next) => current = next,
            None => return key.to_string(),
        }
    }

    let Some(template) = current.as_str() else {
        return key.to_string();
    };

    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures| {
            let name = &caps[1];
            params
                .iter()
                .find(|(param, _)| *param == name)
                .map(|(_, value)| value.clone())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
