//! The immutable per-run build context.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::value::{lookup, ConfigMap, ConfigValue};
use crate::core::platform::TargetPair;
use crate::core::stage::Stage;
use crate::util::hash::Fingerprint;

/// Application identity: who is being packaged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    /// Human-facing application name.
    pub name: String,

    /// Reverse-DNS bundle identifier (e.g. "com.example.notes").
    pub bundle_id: String,

    /// Application version.
    pub version: semver::Version,
}

/// Filesystem roots for one packaging run.
#[derive(Debug, Clone)]
pub struct Roots {
    /// Root of the application source checkout.
    pub source_root: PathBuf,

    /// Root under which skeletons, artifacts, and stage records land.
    pub output_root: PathBuf,

    /// Managed cache root shared across runs (tools, fetched archives).
    pub cache_root: PathBuf,
}

/// Immutable merged configuration and identity for one packaging run.
///
/// Built once by the config resolver and then only read: stage-specific
/// derived values live elsewhere. One context is bound to exactly one
/// backend for the duration of a run.
#[derive(Debug, Clone)]
pub struct BuildContext {
    identity: AppIdentity,
    target: TargetPair,
    config: ConfigMap,
    roots: Roots,
    config_hash: String,
}

impl BuildContext {
    /// Assemble a context from resolved parts. Only the config resolver
    /// should call this.
    pub(crate) fn new(
        identity: AppIdentity,
        target: TargetPair,
        config: ConfigMap,
        roots: Roots,
    ) -> Self {
        let config_hash = hash_config(&config);
        BuildContext {
            identity,
            target,
            config,
            roots,
            config_hash,
        }
    }

    /// Returns the application identity.
    pub fn identity(&self) -> &AppIdentity {
        &self.identity
    }

    /// Returns the (platform, format) pair this run targets.
    pub fn target(&self) -> &TargetPair {
        &self.target
    }

    /// Returns the resolved configuration mapping.
    pub fn config(&self) -> &ConfigMap {
        &self.config
    }

    /// Returns the filesystem roots.
    pub fn roots(&self) -> &Roots {
        &self.roots
    }

    /// Returns the digest of the resolved configuration.
    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    /// Look up a resolved value by dotted path.
    pub fn get(&self, path: &str) -> Option<&ConfigValue> {
        lookup(&self.config, path)
    }

    /// Look up a resolved string value by dotted path.
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|v| v.as_str())
    }

    /// Directory holding everything generated for this target.
    pub fn bundle_dir(&self) -> PathBuf {
        self.roots
            .output_root
            .join(self.target.platform.as_str())
            .join(self.target.format.as_str())
    }

    /// Directory a stage should place its outputs under.
    pub fn stage_dir(&self, stage: Stage) -> PathBuf {
        match stage {
            // Create and update both act on the materialized skeleton.
            Stage::Create | Stage::Update | Stage::Build => self.bundle_dir().join("skeleton"),
            Stage::Run => self.bundle_dir().join("skeleton"),
            Stage::Package => self.bundle_dir().join("dist"),
            Stage::Publish => self.bundle_dir().join("dist"),
        }
    }

    /// Path of the persisted stage-record file for this target.
    pub fn stage_record_path(&self) -> PathBuf {
        self.roots.output_root.join(".freighter").join(format!(
            "stages-{}-{}.json",
            self.target.platform, self.target.format
        ))
    }

    /// Variables exposed to template rendering and script interpolation:
    /// the identity and target under reserved names, plus every resolved
    /// configuration key.
    pub fn template_vars(&self) -> BTreeMap<String, serde_json::Value> {
        let mut vars: BTreeMap<String, serde_json::Value> = self
            .config
            .iter()
            .filter_map(|(k, v)| serde_json::to_value(v).ok().map(|v| (k.clone(), v)))
            .collect();

        vars.insert("app_name".into(), self.identity.name.clone().into());
        vars.insert("bundle_id".into(), self.identity.bundle_id.clone().into());
        vars.insert("version".into(), self.identity.version.to_string().into());
        vars.insert("platform".into(), self.target.platform.to_string().into());
        vars.insert("format".into(), self.target.format.to_string().into());

        vars
    }
}

fn hash_config(config: &ConfigMap) -> String {
    // BTreeMap ordering makes the JSON encoding canonical.
    let encoded = serde_json::to_string(config).unwrap_or_default();
    let mut fp = Fingerprint::new();
    fp.update_str(&encoded);
    fp.finish_short()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::platform::{OutputFormat, Platform};

    fn test_context() -> BuildContext {
        let identity = AppIdentity {
            name: "Notes".to_string(),
            bundle_id: "com.example.notes".to_string(),
            version: semver::Version::new(1, 2, 3),
        };
        let target = TargetPair::new(Platform::Macos, OutputFormat::new("dmg").unwrap());
        let mut config = ConfigMap::new();
        config.insert(
            "description".to_string(),
            ConfigValue::String("a notes app".to_string()),
        );
        let roots = Roots {
            source_root: PathBuf::from("/work/notes"),
            output_root: PathBuf::from("/work/notes/build"),
            cache_root: PathBuf::from("/home/user/.cache/freighter"),
        };
        BuildContext::new(identity, target, config, roots)
    }

    #[test]
    fn test_paths_are_target_scoped() {
        let ctx = test_context();
        assert_eq!(
            ctx.bundle_dir(),
            PathBuf::from("/work/notes/build/macos/dmg")
        );
        assert_eq!(
            ctx.stage_dir(Stage::Package),
            PathBuf::from("/work/notes/build/macos/dmg/dist")
        );
        assert!(ctx
            .stage_record_path()
            .ends_with(".freighter/stages-macos-dmg.json"));
    }

    #[test]
    fn test_config_hash_tracks_content() {
        let ctx = test_context();
        let mut other_config = ctx.config().clone();
        other_config.insert(
            "description".to_string(),
            ConfigValue::String("different".to_string()),
        );
        let other = BuildContext::new(
            ctx.identity().clone(),
            ctx.target().clone(),
            other_config,
            ctx.roots().clone(),
        );

        assert_ne!(ctx.config_hash(), other.config_hash());
    }

    #[test]
    fn test_template_vars_include_identity() {
        let ctx = test_context();
        let vars = ctx.template_vars();

        assert_eq!(vars["app_name"], serde_json::json!("Notes"));
        assert_eq!(vars["bundle_id"], serde_json::json!("com.example.notes"));
        assert_eq!(vars["version"], serde_json::json!("1.2.3"));
        assert_eq!(vars["platform"], serde_json::json!("macos"));
        assert_eq!(vars["description"], serde_json::json!("a notes app"));
    }
}
