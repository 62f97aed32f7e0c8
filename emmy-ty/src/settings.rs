use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LuaSettings {
    /// Functions treated like `require` when resolving module types
    pub require_like_function_names: Vec<String>,
    /// Report doc comments that fail to parse
    pub strict_doc: bool,
    /// Share inferred types across requests; otherwise cache per request
    pub use_global_cache: bool,
    /// `nil` is only assignable to types that include it
    pub nil_strict: bool,
    /// Indexing `unknown` yields `unknown` instead of nothing
    pub unknown_indexable: bool,
    /// Calling `unknown` yields `unknown` instead of nothing
    pub unknown_callable: bool,
    /// Upper bound on declarations unioned when resolving a global name
    pub max_resolve_candidates: usize,
}

impl Default for LuaSettings {
    fn default() -> Self {
        Self {
            require_like_function_names: vec!["require".to_string()],
            strict_doc: false,
            use_global_cache: true,
            nil_strict: false,
            unknown_indexable: true,
            unknown_callable: true,
            max_resolve_candidates: 10,
        }
    }
}

impl LuaSettings {
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn is_require_like_function_name(&self, name: &str) -> bool {
        name == "require" || self.require_like_function_names.iter().any(|n| n == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = LuaSettings::default();
        assert!(settings.is_require_like_function_name("require"));
        assert!(!settings.is_require_like_function_name("import"));
        assert_eq!(settings.max_resolve_candidates, 10);
        assert!(settings.unknown_callable);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let settings = LuaSettings::from_json(r#"{ "require_like_function_names": ["import"], "strict_doc": true }"#)
            .unwrap();
        assert!(settings.strict_doc);
        assert!(settings.is_require_like_function_name("import"));
        assert!(settings.is_require_like_function_name("require"));
        assert!(settings.unknown_indexable);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "max_resolve_candidates": 3 }}"#).unwrap();
        let settings = LuaSettings::load(file.path()).unwrap();
        assert_eq!(settings.max_resolve_candidates, 3);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(matches!(
            LuaSettings::from_json("{ not json"),
            Err(SettingsError::Json(_))
        ));
        assert!(matches!(
            LuaSettings::load("/definitely/not/here.json"),
            Err(SettingsError::Io(_))
        ));
    }
}
