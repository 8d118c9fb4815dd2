//! Per-key schema declarations and validation for resolved configuration.

use std::str::FromStr;

use crate::config::value::{lookup, ConfigMap, ConfigValue};
use crate::config::ConfigError;
use crate::core::platform::Platform;

/// Expected shape of a configuration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Any string.
    String,
    /// A string interpreted as a filesystem path.
    Path,
    /// A string parsing as a semantic version.
    Semver,
    /// A string naming a known platform.
    PlatformName,
    /// An integer.
    Integer,
    /// A boolean.
    Bool,
    /// A sequence whose elements are all strings.
    StringSequence,
}

impl ValueKind {
    fn describe(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Path => "path string",
            ValueKind::Semver => "semantic version string",
            ValueKind::PlatformName => "platform name",
            ValueKind::Integer => "integer",
            ValueKind::Bool => "boolean",
            ValueKind::StringSequence => "sequence of strings",
        }
    }
}

/// Declaration for one configuration key.
#[derive(Debug, Clone)]
pub struct KeySchema {
    /// Dotted key path.
    pub key: &'static str,

    /// Expected value shape.
    pub kind: ValueKind,

    /// Whether resolution fails if the key is absent after merging.
    pub required: bool,
}

impl KeySchema {
    /// Declare a required key.
    pub const fn required(key: &'static str, kind: ValueKind) -> Self {
        KeySchema {
            key,
            kind,
            required: true,
        }
    }

    /// Declare an optional key.
    pub const fn optional(key: &'static str, kind: ValueKind) -> Self {
        KeySchema {
            key,
            kind,
            required: false,
        }
    }
}

/// Keys every resolved context must satisfy.
pub fn core_schema() -> Vec<KeySchema> {
    vec![
        KeySchema::required("name", ValueKind::String),
        KeySchema::required("bundle", ValueKind::String),
        KeySchema::required("version", ValueKind::Semver),
        KeySchema::optional("description", ValueKind::String),
        KeySchema::optional("author", ValueKind::String),
        KeySchema::optional("url", ValueKind::String),
        KeySchema::optional("icon", ValueKind::Path),
        KeySchema::optional("sources", ValueKind::StringSequence),
        KeySchema::optional("template.path", ValueKind::Path),
        KeySchema::optional("template.archive", ValueKind::String),
        KeySchema::optional("template.checksum", ValueKind::String),
        KeySchema::optional("template.version", ValueKind::String),
        KeySchema::optional("tool-timeout-secs", ValueKind::Integer),
    ]
}

/// Validate a merged layer against a schema.
pub fn validate(config: &ConfigMap, schema: &[KeySchema]) -> Result<(), ConfigError> {
    for decl in schema {
        match lookup(config, decl.key) {
            None => {
                if decl.required {
                    return Err(ConfigError::MissingKey {
                        key: decl.key.to_string(),
                    });
                }
            }
            Some(value) => check_kind(decl.key, value, decl.kind)?,
        }
    }
    Ok(())
}

fn check_kind(key: &str, value: &ConfigValue, kind: ValueKind) -> Result<(), ConfigError> {
    let mismatch = || ConfigError::TypeMismatch {
        key: key.to_string(),
        expected: kind.describe(),
        found: value.kind(),
    };

    match kind {
        ValueKind::String | ValueKind::Path => {
            value.as_str().ok_or_else(mismatch)?;
        }
        ValueKind::Integer => {
            value.as_integer().ok_or_else(mismatch)?;
        }
        ValueKind::Bool => {
            value.as_bool().ok_or_else(mismatch)?;
        }
        ValueKind::Semver => {
            let raw = value.as_str().ok_or_else(mismatch)?;
            semver::Version::parse(raw).map_err(|source| ConfigError::InvalidVersion {
                key: key.to_string(),
                value: raw.to_string(),
                source,
            })?;
        }
        ValueKind::PlatformName => {
            let raw = value.as_str().ok_or_else(mismatch)?;
            Platform::from_str(raw).map_err(ConfigError::UnknownPlatform)?;
        }
        ValueKind::StringSequence => {
            let items = value.as_sequence().ok_or_else(mismatch)?;
            if items.iter().any(|item| item.as_str().is_none()) {
                return Err(mismatch());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn s(v: &str) -> ConfigValue {
        ConfigValue::String(v.to_string())
    }

    fn valid_config() -> ConfigMap {
        let mut map = BTreeMap::new();
        map.insert("name".to_string(), s("Notes"));
        map.insert("bundle".to_string(), s("com.example.notes"));
        map.insert("version".to_string(), s("1.2.3"));
        map
    }

    #[test]
    fn test_valid_config_passes() {
        validate(&valid_config(), &core_schema()).unwrap();
    }

    #[test]
    fn test_missing_required_key() {
        let mut config = valid_config();
        config.remove("bundle");

        let err = validate(&config, &core_schema()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { key } if key == "bundle"));
    }

    #[test]
    fn test_bad_version() {
        let mut config = valid_config();
        config.insert("version".to_string(), s("one-dot-two"));

        let err = validate(&config, &core_schema()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVersion { .. }));
    }

    #[test]
    fn test_type_mismatch() {
        let mut config = valid_config();
        config.insert("name".to_string(), ConfigValue::Integer(7));

        let err = validate(&config, &core_schema()).unwrap_err();
        assert!(
            matches!(err, ConfigError::TypeMismatch { key, found, .. }
                if key == "name" && found == "integer")
        );
    }

    #[test]
    fn test_platform_kind() {
        let schema = [KeySchema::required("target", ValueKind::PlatformName)];

        let mut config = ConfigMap::new();
        config.insert("target".to_string(), s("macos"));
        validate(&config, &schema).unwrap();

        config.insert("target".to_string(), s("beos"));
        let err = validate(&config, &schema).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPlatform(_)));
    }

    #[test]
    fn test_string_sequence_kind() {
        let schema = [KeySchema::optional("sources", ValueKind::StringSequence)];

        let mut config = ConfigMap::new();
        config.insert(
            "sources".to_string(),
            ConfigValue::Sequence(vec![s("src"), ConfigValue::Integer(1)]),
        );

        let err = validate(&config, &schema).unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { .. }));
    }
}
