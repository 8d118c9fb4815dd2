//! Rendering templates into project skeletons.
//!
//! The central correctness property lives in [`TemplateEngine::update`]:
//! regeneration never overwrites a file whose on-disk content differs from
//! the hash recorded at creation or last update, unless the caller forces
//! it. Conflicts are reported, not fatal.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use handlebars::Handlebars;
use regex::Regex;
use walkdir::WalkDir;

use crate::core::context::BuildContext;
use crate::template::manifest::{FileRecord, TemplateManifest};
use crate::template::reference::{self, ResolvedTemplate, TemplateReference};
use crate::template::TemplateError;
use crate::tools::ToolCache;
use crate::util::hash::{sha256_bytes, sha256_file};

/// Matches the leading identifier of a `{{ placeholder }}` expression.
/// Block syntax (`{{#if ...}}`, `{{/if}}`) is deliberately not matched.
static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_-]*)").expect("static regex"));

/// Handlebars control words that look like placeholders but are not
/// context variables.
const KEYWORDS: [&str; 7] = ["else", "this", "if", "unless", "each", "with", "lookup"];

/// The result of materializing or updating a skeleton.
#[derive(Debug)]
pub struct MaterializedTemplate {
    /// Directory the skeleton was written under.
    pub target_dir: PathBuf,

    /// The manifest persisted beside the skeleton.
    pub manifest: TemplateManifest,

    /// Skeleton-relative paths written in this pass.
    pub written: Vec<String>,

    /// Skeleton-relative paths skipped because the on-disk content no
    /// longer matches the recorded hash (update only).
    pub conflicts: Vec<String>,
}

/// Renders versioned templates into project skeletons.
pub struct TemplateEngine<'a> {
    tools: &'a ToolCache,
    orchestrator_version: semver::Version,
}

impl<'a> TemplateEngine<'a> {
    /// Create an engine using the running crate's version for template
    /// compatibility checks.
    pub fn new(tools: &'a ToolCache) -> Self {
        let orchestrator_version =
            semver::Version::parse(env!("CARGO_PKG_VERSION")).expect("crate version is semver");
        TemplateEngine {
            tools,
            orchestrator_version,
        }
    }

    /// Override the orchestrator version (tests).
    #[cfg(test)]
    pub fn with_orchestrator_version(mut self, version: semver::Version) -> Self {
        self.orchestrator_version = version;
        self
    }

    /// Resolve a reference without rendering anything.
    ///
    /// The orchestrator uses this to learn the template version for stage
    /// fingerprints.
    pub fn resolve(&self, reference: &TemplateReference) -> Result<ResolvedTemplate, TemplateError> {
        reference::resolve(reference, self.tools, &self.orchestrator_version)
    }

    /// Materialize a skeleton from scratch.
    ///
    /// Every template file is rendered (or copied verbatim) under
    /// `target_dir`, and the manifest recording substitutions and content
    /// hashes is persisted beside the output.
    pub fn materialize(
        &self,
        reference: &TemplateReference,
        ctx: &BuildContext,
        target_dir: &Path,
    ) -> Result<MaterializedTemplate, TemplateError> {
        let resolved = self.resolve(reference)?;
        let rendered = render_tree(&resolved, ctx)?;
        crate::util::fs::ensure_dir(target_dir).map_err(to_io)?;

        let mut manifest = TemplateManifest {
            template_name: resolved.meta.name.clone(),
            template_version: resolved.meta.version.to_string(),
            files: BTreeMap::new(),
        };
        let mut written = Vec::new();

        for file in rendered {
            let dest = target_dir.join(&file.rel);
            crate::util::fs::write_bytes(&dest, &file.content).map_err(to_io)?;
            manifest.files.insert(
                file.rel.clone(),
                FileRecord {
                    content_hash: sha256_bytes(&file.content),
                    variables: file.variables,
                },
            );
            written.push(file.rel);
        }

        manifest.save(target_dir).map_err(to_io)?;
        tracing::info!(
            "materialized template `{}` {} ({} files)",
            manifest.template_name,
            manifest.template_version,
            written.len()
        );

        Ok(MaterializedTemplate {
            target_dir: target_dir.to_path_buf(),
            manifest,
            written,
            conflicts: Vec::new(),
        })
    }

    /// Re-render a skeleton over an existing one, respecting user edits.
    ///
    /// Per file, the current on-disk hash is compared against the hash in
    /// `previous`:
    /// - on a match, the file is template-owned and may be rewritten;
    /// - on a mismatch (or with no record at all) the user touched it; it
    ///   is skipped and reported as a conflict unless `force` is set.
    ///
    /// Conflicting files keep their previous manifest record so a later
    /// forced update still knows the last-rendered hash.
    pub fn update(
        &self,
        reference: &TemplateReference,
        ctx: &BuildContext,
        target_dir: &Path,
        previous: &TemplateManifest,
        force: bool,
    ) -> Result<MaterializedTemplate, TemplateError> {
        let resolved = self.resolve(reference)?;
        let rendered = render_tree(&resolved, ctx)?;
        crate::util::fs::ensure_dir(target_dir).map_err(to_io)?;

        let mut manifest = TemplateManifest {
            template_name: resolved.meta.name.clone(),
            template_version: resolved.meta.version.to_string(),
            files: BTreeMap::new(),
        };
        let mut written = Vec::new();
        let mut conflicts = Vec::new();

        for file in rendered {
            let dest = target_dir.join(&file.rel);
            let new_record = FileRecord {
                content_hash: sha256_bytes(&file.content),
                variables: file.variables,
            };

            if !dest.exists() {
                crate::util::fs::write_bytes(&dest, &file.content).map_err(to_io)?;
                manifest.files.insert(file.rel.clone(), new_record);
                written.push(file.rel);
                continue;
            }

            let on_disk = sha256_file(&dest).map_err(to_io)?;
            let owned_by_template = previous
                .record(&file.rel)
                .map(|r| r.content_hash == on_disk)
                .unwrap_or(false);

            if owned_by_template || force {
                if on_disk != new_record.content_hash {
                    crate::util::fs::write_bytes(&dest, &file.content).map_err(to_io)?;
                    written.push(file.rel.clone());
                }
                manifest.files.insert(file.rel, new_record);
            } else {
                tracing::warn!("skipping locally modified file {}", file.rel);
                conflicts.push(file.rel.clone());
                // Keep what we knew about the file before the conflict.
                if let Some(old) = previous.record(&file.rel) {
                    manifest.files.insert(file.rel, old.clone());
                }
            }
        }

        manifest.save(target_dir).map_err(to_io)?;

        Ok(MaterializedTemplate {
            target_dir: target_dir.to_path_buf(),
            manifest,
            written,
            conflicts,
        })
    }
}

struct RenderedFile {
    /// Skeleton-relative path, forward slashes.
    rel: String,
    content: Vec<u8>,
    variables: BTreeMap<String, serde_json::Value>,
}

/// Render every file of a resolved template against the context.
fn render_tree(
    resolved: &ResolvedTemplate,
    ctx: &BuildContext,
) -> Result<Vec<RenderedFile>, TemplateError> {
    let content_root = resolved.content_root();
    let vars = ctx.template_vars();

    let mut registry = Handlebars::new();
    registry.register_escape_fn(handlebars::no_escape);
    registry.set_strict_mode(true);

    let mut files = Vec::new();

    let mut entries: Vec<_> = WalkDir::new(&content_root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .collect();
    entries.sort_by_key(|e| e.path().to_path_buf());

    for entry in entries {
        let raw_rel = entry
            .path()
            .strip_prefix(&content_root)
            .expect("walked entries live under the content root");
        let raw_rel = rel_to_string(raw_rel);

        // Directory and file names may carry placeholders too.
        let rel = if raw_rel.contains("{{") {
            render_text(&registry, &raw_rel, &vars, Path::new(&raw_rel))?
        } else {
            raw_rel.clone()
        };

        let bytes = std::fs::read(entry.path())?;

        match std::str::from_utf8(&bytes) {
            Ok(text) if text.contains("{{") => {
                let referenced = referenced_placeholders(text);
                let variables: BTreeMap<String, serde_json::Value> = referenced
                    .iter()
                    .filter_map(|name| vars.get(name).map(|v| (name.clone(), v.clone())))
                    .collect();

                let rendered = render_text(&registry, text, &vars, Path::new(&raw_rel))?;
                files.push(RenderedFile {
                    rel,
                    content: rendered.into_bytes(),
                    variables,
                });
            }
            _ => {
                // Binary or placeholder-free content copies verbatim.
                files.push(RenderedFile {
                    rel,
                    content: bytes,
                    variables: BTreeMap::new(),
                });
            }
        }
    }

    Ok(files)
}

/// Render one text body, converting missing placeholders into the typed
/// error naming the file and variable.
fn render_text(
    registry: &Handlebars,
    text: &str,
    vars: &BTreeMap<String, serde_json::Value>,
    file: &Path,
) -> Result<String, TemplateError> {
    for name in referenced_placeholders(text) {
        if !vars.contains_key(&name) {
            return Err(TemplateError::MissingVariable {
                variable: name,
                file: file.to_path_buf(),
            });
        }
    }

    registry
        .render_template(text, vars)
        .map_err(|e| TemplateError::RenderFailed {
            file: file.to_path_buf(),
            message: e.to_string(),
        })
}

/// Collect the context variables a template body references.
fn referenced_placeholders(text: &str) -> BTreeSet<String> {
    PLACEHOLDER_RE
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .filter(|name| !KEYWORDS.contains(&name.as_str()))
        .collect()
}

fn rel_to_string(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn to_io(e: anyhow::Error) -> TemplateError {
    TemplateError::Io(std::io::Error::other(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::value::ConfigMap;
    use crate::core::context::{AppIdentity, Roots};
    use crate::core::platform::{OutputFormat, Platform, TargetPair};
    use crate::template::reference::TemplateSource;
    use tempfile::TempDir;

    fn write_starter_template(dir: &Path) {
        std::fs::create_dir_all(dir.join("content/{{app_name}}")).unwrap();
        std::fs::write(
            dir.join("template.toml"),
            "[template]\nname = \"starter\"\nversion = \"1.4.0\"\ncompat = \">=0.1.0, <1.0.0\"\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("content/{{app_name}}/main.py"),
            "print(\"{{app_name}} {{version}}\")\n",
        )
        .unwrap();
        std::fs::write(dir.join("content/README"), "static readme\n").unwrap();
        // Not valid UTF-8: must copy verbatim.
        std::fs::write(dir.join("content/icon.bin"), [0u8, 159, 146, 150]).unwrap();
    }

    fn context(tmp: &TempDir) -> BuildContext {
        BuildContext::new(
            AppIdentity {
                name: "notes".to_string(),
                bundle_id: "com.example.notes".to_string(),
                version: semver::Version::new(1, 2, 3),
            },
            TargetPair::new(Platform::Macos, OutputFormat::new("app").unwrap()),
            ConfigMap::new(),
            Roots {
                source_root: tmp.path().to_path_buf(),
                output_root: tmp.path().join("build"),
                cache_root: tmp.path().join("cache"),
            },
        )
    }

    fn local_reference(dir: &Path) -> TemplateReference {
        TemplateReference {
            target: TargetPair::new(Platform::Macos, OutputFormat::new("app").unwrap()),
            version_req: None,
            source: TemplateSource::LocalDir(dir.to_path_buf()),
        }
    }

    fn engine(tools: &ToolCache) -> TemplateEngine<'_> {
        TemplateEngine::new(tools).with_orchestrator_version(semver::Version::new(0, 1, 0))
    }

    #[test]
    fn test_materialize_renders_and_records() {
        let tmp = TempDir::new().unwrap();
        let template_dir = tmp.path().join("template");
        write_starter_template(&template_dir);

        let tools = ToolCache::new(tmp.path().join("cache"));
        let ctx = context(&tmp);
        let target = tmp.path().join("skeleton");

        let result = engine(&tools)
            .materialize(&local_reference(&template_dir), &ctx, &target)
            .unwrap();

        // Path placeholder rendered.
        let main = target.join("notes/main.py");
        assert_eq!(
            std::fs::read_to_string(&main).unwrap(),
            "print(\"notes 1.2.3\")\n"
        );

        // Verbatim copies.
        assert_eq!(
            std::fs::read_to_string(target.join("README")).unwrap(),
            "static readme\n"
        );
        assert_eq!(
            std::fs::read(target.join("icon.bin")).unwrap(),
            [0u8, 159, 146, 150]
        );

        // Manifest records substitutions and hashes.
        let record = result.manifest.record("notes/main.py").unwrap();
        assert_eq!(record.variables["app_name"], serde_json::json!("notes"));
        assert_eq!(
            record.content_hash,
            sha256_file(&main).unwrap()
        );
        assert!(result.conflicts.is_empty());
        assert!(target.join(TemplateManifest::FILE_NAME).is_file());
    }

    #[test]
    fn test_materialize_missing_variable() {
        let tmp = TempDir::new().unwrap();
        let template_dir = tmp.path().join("template");
        write_starter_template(&template_dir);
        std::fs::write(
            template_dir.join("content/broken.txt"),
            "needs {{undeclared_thing}}\n",
        )
        .unwrap();

        let tools = ToolCache::new(tmp.path().join("cache"));
        let ctx = context(&tmp);

        let err = engine(&tools)
            .materialize(
                &local_reference(&template_dir),
                &ctx,
                &tmp.path().join("skeleton"),
            )
            .unwrap_err();

        match err {
            TemplateError::MissingVariable { variable, file } => {
                assert_eq!(variable, "undeclared_thing");
                assert_eq!(file, PathBuf::from("broken.txt"));
            }
            other => panic!("expected MissingVariable, got {:?}", other),
        }
    }

    #[test]
    fn test_update_preserves_local_edits() {
        let tmp = TempDir::new().unwrap();
        let template_dir = tmp.path().join("template");
        write_starter_template(&template_dir);

        let tools = ToolCache::new(tmp.path().join("cache"));
        let ctx = context(&tmp);
        let target = tmp.path().join("skeleton");
        let reference = local_reference(&template_dir);
        let engine = engine(&tools);

        let first = engine.materialize(&reference, &ctx, &target).unwrap();

        // User edits a generated file.
        let edited = target.join("notes/main.py");
        std::fs::write(&edited, "print(\"my own code\")\n").unwrap();

        let updated = engine
            .update(&reference, &ctx, &target, &first.manifest, false)
            .unwrap();

        assert_eq!(updated.conflicts, vec!["notes/main.py".to_string()]);
        assert_eq!(
            std::fs::read_to_string(&edited).unwrap(),
            "print(\"my own code\")\n"
        );

        // The conflicting file keeps its last-rendered record.
        assert_eq!(
            updated.manifest.record("notes/main.py"),
            first.manifest.record("notes/main.py")
        );
    }

    #[test]
    fn test_update_force_overwrites() {
        let tmp = TempDir::new().unwrap();
        let template_dir = tmp.path().join("template");
        write_starter_template(&template_dir);

        let tools = ToolCache::new(tmp.path().join("cache"));
        let ctx = context(&tmp);
        let target = tmp.path().join("skeleton");
        let reference = local_reference(&template_dir);
        let engine = engine(&tools);

        let first = engine.materialize(&reference, &ctx, &target).unwrap();

        let edited = target.join("notes/main.py");
        std::fs::write(&edited, "print(\"my own code\")\n").unwrap();

        let updated = engine
            .update(&reference, &ctx, &target, &first.manifest, true)
            .unwrap();

        assert!(updated.conflicts.is_empty());
        assert_eq!(
            std::fs::read_to_string(&edited).unwrap(),
            "print(\"notes 1.2.3\")\n"
        );
    }

    #[test]
    fn test_update_writes_new_and_changed_files() {
        let tmp = TempDir::new().unwrap();
        let template_dir = tmp.path().join("template");
        write_starter_template(&template_dir);

        let tools = ToolCache::new(tmp.path().join("cache"));
        let ctx = context(&tmp);
        let target = tmp.path().join("skeleton");
        let reference = local_reference(&template_dir);
        let engine = engine(&tools);

        let first = engine.materialize(&reference, &ctx, &target).unwrap();

        // The template gains a file and changes an existing one.
        std::fs::write(template_dir.join("content/NEWS"), "fresh\n").unwrap();
        std::fs::write(template_dir.join("content/README"), "static readme v2\n").unwrap();

        let updated = engine
            .update(&reference, &ctx, &target, &first.manifest, false)
            .unwrap();

        assert!(updated.written.contains(&"NEWS".to_string()));
        assert!(updated.written.contains(&"README".to_string()));
        assert!(updated.conflicts.is_empty());
        assert_eq!(
            std::fs::read_to_string(target.join("README")).unwrap(),
            "static readme v2\n"
        );
    }
}
