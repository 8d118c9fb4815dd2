//! Configuration values and layer-merge semantics.
//!
//! Values mirror what TOML can express. Merging follows one rule set
//! everywhere: mappings merge recursively, scalars and sequences are
//! replaced wholesale by the higher-precedence layer.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Sequence(Vec<ConfigValue>),
    Mapping(BTreeMap<String, ConfigValue>),
}

/// A string-keyed configuration mapping, as used for whole layers.
pub type ConfigMap = BTreeMap<String, ConfigValue>;

impl ConfigValue {
    /// Get the value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get the value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ConfigValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the value as a sequence, if it is one.
    pub fn as_sequence(&self) -> Option<&[ConfigValue]> {
        match self {
            ConfigValue::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Get the value as a mapping, if it is one.
    pub fn as_mapping(&self) -> Option<&ConfigMap> {
        match self {
            ConfigValue::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Short name of the value's kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigValue::String(_) => "string",
            ConfigValue::Integer(_) => "integer",
            ConfigValue::Float(_) => "float",
            ConfigValue::Bool(_) => "boolean",
            ConfigValue::Sequence(_) => "sequence",
            ConfigValue::Mapping(_) => "mapping",
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::String(s) => write!(f, "{}", s),
            ConfigValue::Integer(i) => write!(f, "{}", i),
            ConfigValue::Float(v) => write!(f, "{}", v),
            ConfigValue::Bool(b) => write!(f, "{}", b),
            ConfigValue::Sequence(items) => {
                let rendered: Vec<_> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            ConfigValue::Mapping(_) => write!(f, "{{...}}"),
        }
    }
}

impl From<toml::Value> for ConfigValue {
    fn from(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => ConfigValue::String(s),
            toml::Value::Integer(i) => ConfigValue::Integer(i),
            toml::Value::Float(v) => ConfigValue::Float(v),
            toml::Value::Boolean(b) => ConfigValue::Bool(b),
            toml::Value::Datetime(dt) => ConfigValue::String(dt.to_string()),
            toml::Value::Array(items) => {
                ConfigValue::Sequence(items.into_iter().map(ConfigValue::from).collect())
            }
            toml::Value::Table(table) => ConfigValue::Mapping(
                table
                    .into_iter()
                    .map(|(k, v)| (k, ConfigValue::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Convert a TOML table into a configuration layer.
pub fn from_toml_table(table: toml::value::Table) -> ConfigMap {
    table
        .into_iter()
        .map(|(k, v)| (k, ConfigValue::from(v)))
        .collect()
}

/// Merge `overlay` into `base`, with `overlay` taking precedence.
///
/// Mapping values merge key-by-key recursively; any other pairing replaces
/// the base value, including sequences (no element-wise merge).
pub fn merge_value(base: &mut ConfigValue, overlay: ConfigValue) {
    match (base, overlay) {
        (ConfigValue::Mapping(base_map), ConfigValue::Mapping(overlay_map)) => {
            merge_map(base_map, overlay_map);
        }
        (base, overlay) => *base = overlay,
    }
}

/// Merge an overlay layer into a base layer, overlay taking precedence.
pub fn merge_map(base: &mut ConfigMap, overlay: ConfigMap) {
    for (key, value) in overlay {
        match base.get_mut(&key) {
            Some(existing) => merge_value(existing, value),
            None => {
                base.insert(key, value);
            }
        }
    }
}

/// Look up a value by dotted path (`"signing.identity"`) in a layer.
pub fn lookup<'a>(map: &'a ConfigMap, path: &str) -> Option<&'a ConfigValue> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = map.get(first)?;

    for segment in segments {
        current = current.as_mapping()?.get(segment)?;
    }

    Some(current)
}

/// Insert a value at a dotted path, creating intermediate mappings.
pub fn insert_at(map: &mut ConfigMap, path: &str, value: ConfigValue) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let leaf = segments.pop().expect("path is never empty");

    let mut current = map;
    for segment in segments {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| ConfigValue::Mapping(BTreeMap::new()));

        // A scalar in the way is replaced; the deeper path wins.
        if !matches!(entry, ConfigValue::Mapping(_)) {
            *entry = ConfigValue::Mapping(BTreeMap::new());
        }
        current = match entry {
            ConfigValue::Mapping(m) => m,
            _ => unreachable!(),
        };
    }

    current.insert(leaf.to_string(), value);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, ConfigValue)]) -> ConfigMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn s(v: &str) -> ConfigValue {
        ConfigValue::String(v.to_string())
    }

    #[test]
    fn test_scalar_replacement() {
        let mut base = map(&[("name", s("App"))]);
        merge_map(&mut base, map(&[("name", s("AppMac"))]));

        assert_eq!(base["name"], s("AppMac"));
    }

    #[test]
    fn test_mapping_merges_recursively() {
        let mut base = map(&[(
            "signing",
            ConfigValue::Mapping(map(&[("identity", s("dev")), ("team", s("T1"))])),
        )]);
        merge_map(
            &mut base,
            map(&[(
                "signing",
                ConfigValue::Mapping(map(&[("identity", s("release"))])),
            )]),
        );

        let signing = base["signing"].as_mapping().unwrap();
        assert_eq!(signing["identity"], s("release"));
        assert_eq!(signing["team"], s("T1")); // untouched child survives
    }

    #[test]
    fn test_sequence_replaces_wholesale() {
        let mut base = map(&[(
            "sources",
            ConfigValue::Sequence(vec![s("a.py"), s("b.py")]),
        )]);
        merge_map(
            &mut base,
            map(&[("sources", ConfigValue::Sequence(vec![s("c.py")]))]),
        );

        assert_eq!(
            base["sources"],
            ConfigValue::Sequence(vec![s("c.py")])
        );
    }

    #[test]
    fn test_merge_associativity() {
        // Merging [A, B, C] in one pass equals merging A with (B merged C).
        let a = map(&[
            ("name", s("App")),
            (
                "nested",
                ConfigValue::Mapping(map(&[("x", s("1")), ("y", s("2"))])),
            ),
        ]);
        let b = map(&[(
            "nested",
            ConfigValue::Mapping(map(&[("x", s("10"))])),
        )]);
        let c = map(&[
            ("name", s("Final")),
            (
                "nested",
                ConfigValue::Mapping(map(&[("z", s("30"))])),
            ),
        ]);

        let mut sequential = a.clone();
        merge_map(&mut sequential, b.clone());
        merge_map(&mut sequential, c.clone());

        let mut bc = b;
        merge_map(&mut bc, c);
        let mut decomposed = a;
        merge_map(&mut decomposed, bc);

        assert_eq!(sequential, decomposed);
    }

    #[test]
    fn test_lookup_dotted() {
        let layer = map(&[(
            "signing",
            ConfigValue::Mapping(map(&[("identity", s("dev"))])),
        )]);

        assert_eq!(lookup(&layer, "signing.identity"), Some(&s("dev")));
        assert_eq!(lookup(&layer, "signing.missing"), None);
        assert_eq!(lookup(&layer, "missing"), None);
    }

    #[test]
    fn test_insert_at_creates_nesting() {
        let mut layer = ConfigMap::new();
        insert_at(&mut layer, "signing.identity", s("release"));

        assert_eq!(lookup(&layer, "signing.identity"), Some(&s("release")));
    }

    #[test]
    fn test_from_toml() {
        let parsed: toml::value::Table = toml::from_str(
            r#"
name = "App"
jobs = 4
strict = true
sources = ["src"]

[signing]
identity = "dev"
"#,
        )
        .unwrap();

        let layer = from_toml_table(parsed);
        assert_eq!(layer["name"], s("App"));
        assert_eq!(layer["jobs"], ConfigValue::Integer(4));
        assert_eq!(layer["strict"], ConfigValue::Bool(true));
        assert!(layer["sources"].as_sequence().is_some());
        assert_eq!(lookup(&layer, "signing.identity"), Some(&s("dev")));
    }
}
