//! Loading configuration layers from disk and from the command line.
//!
//! The project manifest is `Freighter.toml`:
//!
//! ```toml
//! [app]
//! name = "Notes"
//! bundle = "com.example.notes"
//! version = "1.2.3"
//! targets = ["macos:dmg", "linux:appimage"]
//!
//! [platform.macos]
//! # keys overriding [app] when packaging for macOS
//!
//! [format.dmg]
//! # keys overriding the platform layer when producing a dmg
//! ```
//!
//! An optional global file (`config.toml` under the freighter cache root)
//! supplies the lowest-precedence layer; it is load-or-default, never fatal.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::value::{from_toml_table, insert_at, ConfigMap, ConfigValue};
use crate::config::ConfigError;
use crate::core::platform::{OutputFormat, Platform, TargetPair};

/// A parsed project manifest, split into its configuration layers.
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    app: ConfigMap,
    platforms: BTreeMap<Platform, ConfigMap>,
    formats: BTreeMap<OutputFormat, ConfigMap>,
}

impl Manifest {
    /// The manifest file name.
    pub const FILE_NAME: &'static str = "Freighter.toml";

    /// Load and split a manifest file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut table: toml::value::Table =
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let app = match table.remove("app") {
            Some(toml::Value::Table(app)) => from_toml_table(app),
            _ => {
                return Err(ConfigError::MissingAppSection {
                    path: path.to_path_buf(),
                })
            }
        };

        let mut platforms = BTreeMap::new();
        if let Some(toml::Value::Table(section)) = table.remove("platform") {
            for (name, value) in section {
                let platform = Platform::from_str(&name)?;
                if let toml::Value::Table(layer) = value {
                    platforms.insert(platform, from_toml_table(layer));
                }
            }
        }

        let mut formats = BTreeMap::new();
        if let Some(toml::Value::Table(section)) = table.remove("format") {
            for (name, value) in section {
                let format = OutputFormat::new(name.clone())
                    .map_err(|_| ConfigError::InvalidTarget { raw: name })?;
                if let toml::Value::Table(layer) = value {
                    formats.insert(format, from_toml_table(layer));
                }
            }
        }

        Ok(Manifest {
            path: path.to_path_buf(),
            app,
            platforms,
            formats,
        })
    }

    /// Find a manifest starting from `start` and walking upward.
    pub fn find(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();
        loop {
            let candidate = current.join(Self::FILE_NAME);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Path the manifest was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory containing the manifest (the application source root).
    pub fn source_root(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("."))
    }

    /// The manifest's layers for one target, in increasing precedence:
    /// `[app]`, then `[platform.<p>]`, then `[format.<f>]`.
    pub fn layers_for(&self, platform: Platform, format: &OutputFormat) -> Vec<ConfigMap> {
        let mut layers = vec![self.app.clone()];
        if let Some(layer) = self.platforms.get(&platform) {
            layers.push(layer.clone());
        }
        if let Some(layer) = self.formats.get(format) {
            layers.push(layer.clone());
        }
        layers
    }

    /// The (platform, format) targets the manifest declares.
    pub fn targets(&self) -> Result<Vec<TargetPair>, ConfigError> {
        let Some(value) = self.app.get("targets") else {
            return Ok(Vec::new());
        };

        let Some(items) = value.as_sequence() else {
            return Err(ConfigError::TypeMismatch {
                key: "targets".to_string(),
                expected: "sequence of strings",
                found: value.kind(),
            });
        };

        items
            .iter()
            .map(|item| {
                let raw = item.as_str().ok_or_else(|| ConfigError::TypeMismatch {
                    key: "targets".to_string(),
                    expected: "sequence of strings",
                    found: item.kind(),
                })?;
                parse_target(raw)
            })
            .collect()
    }
}

/// Parse a `platform:format` target descriptor.
pub fn parse_target(raw: &str) -> Result<TargetPair, ConfigError> {
    let (platform, format) = raw.split_once(':').ok_or_else(|| ConfigError::InvalidTarget {
        raw: raw.to_string(),
    })?;

    let platform = Platform::from_str(platform)?;
    let format = OutputFormat::new(format).map_err(|_| ConfigError::InvalidTarget {
        raw: raw.to_string(),
    })?;

    Ok(TargetPair::new(platform, format))
}

/// Load the optional global configuration layer.
///
/// Missing or malformed files produce an empty layer with a warning; global
/// defaults must never block a run.
pub fn load_global_layer(path: &Path) -> ConfigMap {
    if !path.is_file() {
        return ConfigMap::new();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::warn!("failed to read global config {}: {}", path.display(), e);
            return ConfigMap::new();
        }
    };

    match toml::from_str::<toml::value::Table>(&contents) {
        Ok(table) => from_toml_table(table),
        Err(e) => {
            tracing::warn!("failed to parse global config {}: {}", path.display(), e);
            ConfigMap::new()
        }
    }
}

/// Build the highest-precedence layer from `--config key=value` overrides.
///
/// Dotted keys create nested mappings. Values are parsed as TOML scalars
/// where possible and fall back to plain strings.
pub fn overrides_layer(raws: &[String]) -> Result<ConfigMap, ConfigError> {
    let mut layer = ConfigMap::new();

    for raw in raws {
        let (key, value) = raw.split_once('=').ok_or_else(|| ConfigError::InvalidOverride {
            raw: raw.clone(),
        })?;

        if key.is_empty() {
            return Err(ConfigError::InvalidOverride { raw: raw.clone() });
        }

        insert_at(&mut layer, key, parse_override_value(value));
    }

    Ok(layer)
}

fn parse_override_value(raw: &str) -> ConfigValue {
    // Reuse TOML's scalar syntax: `true`, `42`, `["a", "b"]` all work, and
    // anything that doesn't parse is taken as a plain string.
    match toml::from_str::<toml::Value>(&format!("v = {}", raw)) {
        Ok(toml::Value::Table(mut table)) => match table.remove("v") {
            Some(value) => ConfigValue::from(value),
            None => ConfigValue::String(raw.to_string()),
        },
        _ => ConfigValue::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::value::lookup;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
[app]
name = "Notes"
bundle = "com.example.notes"
version = "1.2.3"
targets = ["macos:dmg", "linux:appimage"]

[platform.macos]
name = "NotesMac"

[format.dmg]
volume-name = "Notes Installer"
"#;

    fn write_manifest(dir: &Path) -> PathBuf {
        let path = dir.join(Manifest::FILE_NAME);
        std::fs::write(&path, MANIFEST).unwrap();
        path
    }

    #[test]
    fn test_load_and_split() {
        let tmp = TempDir::new().unwrap();
        let path = write_manifest(tmp.path());

        let manifest = Manifest::load(&path).unwrap();
        let layers = manifest.layers_for(Platform::Macos, &OutputFormat::new("dmg").unwrap());

        assert_eq!(layers.len(), 3);
        assert_eq!(layers[1].get("name").unwrap().as_str(), Some("NotesMac"));
        assert_eq!(
            layers[2].get("volume-name").unwrap().as_str(),
            Some("Notes Installer")
        );
    }

    #[test]
    fn test_layers_skip_unrelated_sections() {
        let tmp = TempDir::new().unwrap();
        let path = write_manifest(tmp.path());

        let manifest = Manifest::load(&path).unwrap();
        let layers = manifest.layers_for(Platform::Linux, &OutputFormat::new("appimage").unwrap());

        // Only [app] applies: no linux platform section, no appimage format
        // section.
        assert_eq!(layers.len(), 1);
    }

    #[test]
    fn test_targets() {
        let tmp = TempDir::new().unwrap();
        let path = write_manifest(tmp.path());

        let manifest = Manifest::load(&path).unwrap();
        let targets = manifest.targets().unwrap();

        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].platform, Platform::Macos);
        assert_eq!(targets[0].format.as_str(), "dmg");
    }

    #[test]
    fn test_missing_app_section() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(Manifest::FILE_NAME);
        std::fs::write(&path, "[platform.macos]\nname = \"x\"\n").unwrap();

        let err = Manifest::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::MissingAppSection { .. }));
    }

    #[test]
    fn test_find_walks_upward() {
        let tmp = TempDir::new().unwrap();
        let path = write_manifest(tmp.path());
        let nested = tmp.path().join("src/deep");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(Manifest::find(&nested), Some(path));
        // TempDir parents hold no manifest; an unrelated dir finds nothing.
        let elsewhere = TempDir::new().unwrap();
        assert_eq!(Manifest::find(elsewhere.path()), None);
    }

    #[test]
    fn test_overrides_layer() {
        let layer = overrides_layer(&[
            "signing.identity=release".to_string(),
            "jobs=4".to_string(),
            "strict=true".to_string(),
        ])
        .unwrap();

        assert_eq!(
            lookup(&layer, "signing.identity").unwrap().as_str(),
            Some("release")
        );
        assert_eq!(lookup(&layer, "jobs").unwrap().as_integer(), Some(4));
        assert_eq!(lookup(&layer, "strict").unwrap().as_bool(), Some(true));
    }

    #[test]
    fn test_bad_override() {
        assert!(overrides_layer(&["no-equals".to_string()]).is_err());
        assert!(overrides_layer(&["=value".to_string()]).is_err());
    }

    #[test]
    fn test_global_layer_tolerates_garbage() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");

        assert!(load_global_layer(&path).is_empty());

        std::fs::write(&path, "not [ valid toml").unwrap();
        assert!(load_global_layer(&path).is_empty());
    }
}
