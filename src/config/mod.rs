//! Configuration resolution.
//!
//! Configuration arrives in ordered layers (global file < app manifest <
//! platform section < format section < command-line overrides). Layers are
//! merged with the rules in [`value`], validated against the schema in
//! [`schema`], and frozen into an immutable [`BuildContext`]. Resolution is
//! pure: the same layers always produce the same context.

pub mod loader;
pub mod schema;
pub mod value;

use std::path::PathBuf;

use thiserror::Error;

use crate::core::context::{AppIdentity, BuildContext, Roots};
use crate::core::platform::{OutputFormat, Platform, PlatformParseError, TargetPair};
use value::{lookup, merge_map, ConfigMap};

pub use loader::{load_global_layer, overrides_layer, Manifest};
pub use schema::{core_schema, validate, KeySchema, ValueKind};

/// Errors produced while loading, merging, or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("manifest {path} has no `[app]` section")]
    MissingAppSection { path: PathBuf },

    #[error("missing required configuration key `{key}`")]
    MissingKey { key: String },

    #[error("configuration key `{key}` expected {expected}, found {found}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("configuration key `{key}` is not a valid semantic version: `{value}`")]
    InvalidVersion {
        key: String,
        value: String,
        #[source]
        source: semver::Error,
    },

    #[error(transparent)]
    UnknownPlatform(#[from] PlatformParseError),

    #[error("invalid override `{raw}`: expected `key=value` with a non-empty key")]
    InvalidOverride { raw: String },

    #[error("invalid target `{raw}`: expected `platform:format`")]
    InvalidTarget { raw: String },
}

/// Merge ordered configuration layers for one target and freeze them into a
/// [`BuildContext`].
///
/// `layers` are given in increasing precedence. Fails when a required key is
/// absent after the merge or a value violates its schema declaration.
pub fn resolve(
    layers: Vec<ConfigMap>,
    platform: Platform,
    format: OutputFormat,
    roots: Roots,
) -> Result<BuildContext, ConfigError> {
    let mut merged = ConfigMap::new();
    for layer in layers {
        merge_map(&mut merged, layer);
    }

    validate(&merged, &core_schema())?;

    // Schema validation guarantees presence and shape of the identity keys.
    let name = lookup(&merged, "name")
        .and_then(|v| v.as_str())
        .expect("validated")
        .to_string();
    let bundle_id = lookup(&merged, "bundle")
        .and_then(|v| v.as_str())
        .expect("validated")
        .to_string();
    let version = lookup(&merged, "version")
        .and_then(|v| v.as_str())
        .map(semver::Version::parse)
        .expect("validated")
        .expect("validated");

    let identity = AppIdentity {
        name,
        bundle_id,
        version,
    };

    Ok(BuildContext::new(
        identity,
        TargetPair::new(platform, format),
        merged,
        roots,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::value::ConfigValue;
    use std::collections::BTreeMap;

    fn s(v: &str) -> ConfigValue {
        ConfigValue::String(v.to_string())
    }

    fn roots() -> Roots {
        Roots {
            source_root: PathBuf::from("/src"),
            output_root: PathBuf::from("/src/build"),
            cache_root: PathBuf::from("/cache"),
        }
    }

    fn base_layer() -> ConfigMap {
        let mut map = BTreeMap::new();
        map.insert("name".to_string(), s("App"));
        map.insert("bundle".to_string(), s("com.example.app"));
        map.insert("version".to_string(), s("1.0.0"));
        map
    }

    fn target() -> (Platform, OutputFormat) {
        (Platform::Macos, OutputFormat::new("dmg").unwrap())
    }

    #[test]
    fn test_platform_layer_wins() {
        // {global: {name: "App"}, platform: {name: "AppMac"}} for macos
        // resolves to "AppMac".
        let mut platform_layer = ConfigMap::new();
        platform_layer.insert("name".to_string(), s("AppMac"));

        let (platform, format) = target();
        let ctx = resolve(
            vec![base_layer(), platform_layer],
            platform,
            format,
            roots(),
        )
        .unwrap();

        assert_eq!(ctx.identity().name, "AppMac");
    }

    #[test]
    fn test_missing_required_key_fails() {
        let mut layer = base_layer();
        layer.remove("version");

        let (platform, format) = target();
        let err = resolve(vec![layer], platform, format, roots()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { key } if key == "version"));
    }

    #[test]
    fn test_resolution_is_pure() {
        let (platform, format) = target();
        let a = resolve(
            vec![base_layer()],
            platform,
            format.clone(),
            roots(),
        )
        .unwrap();
        let b = resolve(vec![base_layer()], platform, format, roots()).unwrap();

        assert_eq!(a.config(), b.config());
        assert_eq!(a.config_hash(), b.config_hash());
    }

    #[test]
    fn test_cli_override_nested_key() {
        // Overrides merge recursively and beat the format layer at every
        // nesting depth.
        let mut format_layer = ConfigMap::new();
        value::insert_at(&mut format_layer, "signing.identity", s("dev"));
        value::insert_at(&mut format_layer, "signing.team", s("T1"));

        let mut override_layer = ConfigMap::new();
        value::insert_at(&mut override_layer, "signing.identity", s("release"));

        let (platform, format) = target();
        let ctx = resolve(
            vec![base_layer(), format_layer, override_layer],
            platform,
            format,
            roots(),
        )
        .unwrap();

        assert_eq!(ctx.get_str("signing.identity"), Some("release"));
        assert_eq!(ctx.get_str("signing.team"), Some("T1"));
    }
}
