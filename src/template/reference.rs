//! Template references and their resolution to a concrete on-disk template.
//!
//! A reference names *which* template to use (source locator plus an
//! optional version requirement); resolution produces the directory of an
//! unpacked, compatibility-checked template. Remote archives are fetched
//! through the tool cache so repeated runs hit the (locator, checksum) keyed
//! cache instead of the network.

use std::path::{Path, PathBuf};

use crate::core::context::BuildContext;
use crate::core::platform::TargetPair;
use crate::template::TemplateError;
use crate::tools::ToolCache;

/// Where a template comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    /// A template directory on the local filesystem.
    LocalDir(PathBuf),

    /// A remote tar.gz archive with a required content checksum.
    RemoteArchive { url: String, checksum: String },
}

/// A reference to a versioned template for one target.
#[derive(Debug, Clone)]
pub struct TemplateReference {
    /// The target the template scaffolds for.
    pub target: TargetPair,

    /// Acceptable template versions; `None` accepts any.
    pub version_req: Option<semver::VersionReq>,

    /// Source locator.
    pub source: TemplateSource,
}

impl TemplateReference {
    /// Build the reference declared by a context's `template.*` keys.
    ///
    /// `template.path` (relative to the source root) names a local template;
    /// `template.archive` + `template.checksum` name a remote one. A local
    /// path wins when both are present.
    pub fn from_context(ctx: &BuildContext) -> Result<Self, TemplateError> {
        let version_req = match ctx.get_str("template.version") {
            Some(raw) => Some(semver::VersionReq::parse(raw).map_err(|e| {
                TemplateError::Malformed {
                    path: PathBuf::from("template.version"),
                    message: e.to_string(),
                }
            })?),
            None => None,
        };

        let source = if let Some(path) = ctx.get_str("template.path") {
            TemplateSource::LocalDir(ctx.roots().source_root.join(path))
        } else if let Some(raw) = ctx.get_str("template.archive") {
            let url = url::Url::parse(raw).map_err(|e| TemplateError::Malformed {
                path: PathBuf::from("template.archive"),
                message: e.to_string(),
            })?;
            let checksum = ctx
                .get_str("template.checksum")
                .ok_or(TemplateError::NoSource)?
                .to_string();
            TemplateSource::RemoteArchive {
                url: url.to_string(),
                checksum,
            }
        } else {
            return Err(TemplateError::NoSource);
        };

        Ok(TemplateReference {
            target: ctx.target().clone(),
            version_req,
            source,
        })
    }
}

/// Metadata declared by a template's `template.toml`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct TemplateMeta {
    /// Template name.
    pub name: String,

    /// Template version.
    pub version: semver::Version,

    /// Orchestrator versions this template can be built by.
    pub compat: semver::VersionReq,
}

#[derive(serde::Deserialize)]
struct TemplateMetaFile {
    template: TemplateMeta,
}

/// A resolved, compatibility-checked template on disk.
#[derive(Debug, Clone)]
pub struct ResolvedTemplate {
    /// Directory containing `template.toml` and `content/`.
    pub root: PathBuf,

    /// Parsed metadata.
    pub meta: TemplateMeta,
}

impl ResolvedTemplate {
    /// The directory holding the renderable file tree.
    pub fn content_root(&self) -> PathBuf {
        self.root.join("content")
    }
}

/// Resolve a reference to a concrete template directory.
///
/// Verifies that the template satisfies the reference's version requirement
/// and that its declared compatibility range covers `orchestrator_version`,
/// so the rest of the pipeline is never pointed at a skeleton it cannot
/// build.
pub fn resolve(
    reference: &TemplateReference,
    tools: &ToolCache,
    orchestrator_version: &semver::Version,
) -> Result<ResolvedTemplate, TemplateError> {
    let root = match &reference.source {
        TemplateSource::LocalDir(path) => path.clone(),
        TemplateSource::RemoteArchive { url, checksum } => {
            let archive = tools.fetch(url, checksum)?;
            unpack_once(&archive)?
        }
    };

    let meta = load_meta(&root)?;

    if let Some(req) = &reference.version_req {
        if !req.matches(&meta.version) {
            return Err(TemplateError::VersionUnsatisfied {
                name: meta.name,
                found: meta.version,
                required: req.clone(),
            });
        }
    }

    if !meta.compat.matches(orchestrator_version) {
        return Err(TemplateError::Incompatible {
            name: meta.name,
            version: meta.version,
            compat: meta.compat,
            orchestrator: orchestrator_version.clone(),
        });
    }

    tracing::debug!(
        "resolved template `{}` {} at {}",
        meta.name,
        meta.version,
        root.display()
    );

    Ok(ResolvedTemplate { root, meta })
}

fn load_meta(root: &Path) -> Result<TemplateMeta, TemplateError> {
    let meta_path = root.join("template.toml");
    let contents =
        std::fs::read_to_string(&meta_path).map_err(|e| TemplateError::Malformed {
            path: meta_path.clone(),
            message: format!("cannot read template.toml: {}", e),
        })?;

    let parsed: TemplateMetaFile =
        toml::from_str(&contents).map_err(|e| TemplateError::Malformed {
            path: meta_path,
            message: e.to_string(),
        })?;

    if !root.join("content").is_dir() {
        return Err(TemplateError::Malformed {
            path: root.to_path_buf(),
            message: "template has no content/ directory".to_string(),
        });
    }

    Ok(parsed.template)
}

/// Unpack a fetched tar.gz archive next to itself, once per cache entry.
///
/// The unpacked directory sits beside the archive inside its
/// (locator, checksum) keyed cache directory, so the extraction inherits
/// the cache's idempotency.
fn unpack_once(archive: &Path) -> Result<PathBuf, TemplateError> {
    let cache_entry = archive.parent().expect("cached artifacts have parents");
    let unpacked = cache_entry.join("unpacked");

    if !unpacked.is_dir() {
        tracing::debug!("unpacking {}", archive.display());
        let file = std::fs::File::open(archive)?;
        let decoder = flate2::read::GzDecoder::new(file);
        let mut tar = tar::Archive::new(decoder);

        let staging = cache_entry.join(".unpacking");
        if staging.exists() {
            std::fs::remove_dir_all(&staging)?;
        }
        std::fs::create_dir_all(&staging)?;
        tar.unpack(&staging).map_err(|e| TemplateError::Malformed {
            path: archive.to_path_buf(),
            message: format!("cannot extract archive: {}", e),
        })?;
        std::fs::rename(&staging, &unpacked)?;
    }

    // Tarballs commonly wrap everything in a single top-level directory.
    if unpacked.join("template.toml").is_file() {
        return Ok(unpacked);
    }

    let mut entries: Vec<_> = std::fs::read_dir(&unpacked)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();

    if entries.len() == 1 && entries[0].is_dir() {
        return Ok(entries.remove(0));
    }

    Err(TemplateError::Malformed {
        path: unpacked,
        message: "archive does not contain a template.toml".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::platform::{OutputFormat, Platform};
    use tempfile::TempDir;

    pub(crate) fn write_template(dir: &Path, name: &str, version: &str, compat: &str) {
        std::fs::create_dir_all(dir.join("content")).unwrap();
        std::fs::write(
            dir.join("template.toml"),
            format!(
                "[template]\nname = \"{}\"\nversion = \"{}\"\ncompat = \"{}\"\n",
                name, version, compat
            ),
        )
        .unwrap();
    }

    fn local_reference(dir: &Path, version_req: Option<&str>) -> TemplateReference {
        TemplateReference {
            target: TargetPair::new(Platform::Macos, OutputFormat::new("app").unwrap()),
            version_req: version_req.map(|r| semver::VersionReq::parse(r).unwrap()),
            source: TemplateSource::LocalDir(dir.to_path_buf()),
        }
    }

    #[test]
    fn test_resolve_local() {
        let tmp = TempDir::new().unwrap();
        write_template(tmp.path(), "starter", "1.4.0", ">=0.1.0, <1.0.0");

        let tools = ToolCache::new(tmp.path().join("cache"));
        let resolved = resolve(
            &local_reference(tmp.path(), None),
            &tools,
            &semver::Version::new(0, 1, 0),
        )
        .unwrap();

        assert_eq!(resolved.meta.name, "starter");
        assert_eq!(resolved.meta.version, semver::Version::new(1, 4, 0));
        assert!(resolved.content_root().is_dir());
    }

    #[test]
    fn test_resolve_incompatible_orchestrator() {
        let tmp = TempDir::new().unwrap();
        write_template(tmp.path(), "starter", "1.4.0", ">=2.0.0");

        let tools = ToolCache::new(tmp.path().join("cache"));
        let err = resolve(
            &local_reference(tmp.path(), None),
            &tools,
            &semver::Version::new(0, 1, 0),
        )
        .unwrap_err();

        assert!(matches!(err, TemplateError::Incompatible { .. }));
    }

    #[test]
    fn test_resolve_version_req_unsatisfied() {
        let tmp = TempDir::new().unwrap();
        write_template(tmp.path(), "starter", "1.4.0", ">=0.1.0");

        let tools = ToolCache::new(tmp.path().join("cache"));
        let err = resolve(
            &local_reference(tmp.path(), Some(">=2.0")),
            &tools,
            &semver::Version::new(0, 1, 0),
        )
        .unwrap_err();

        assert!(matches!(err, TemplateError::VersionUnsatisfied { .. }));
    }

    #[test]
    fn test_resolve_missing_content_dir() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("template.toml"),
            "[template]\nname = \"x\"\nversion = \"1.0.0\"\ncompat = \"*\"\n",
        )
        .unwrap();

        let tools = ToolCache::new(tmp.path().join("cache"));
        let err = resolve(
            &local_reference(tmp.path(), None),
            &tools,
            &semver::Version::new(0, 1, 0),
        )
        .unwrap_err();

        assert!(matches!(err, TemplateError::Malformed { .. }));
    }
}
