//! Shared workspace discovery and stage-running plumbing for the
//! lifecycle commands.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use freighter::backend::{Backend, BackendRegistry, RegistryError, ScriptBackend};
use freighter::config::value::ConfigMap;
use freighter::config::{self, Manifest};
use freighter::core::context::Roots;
use freighter::core::{BuildContext, Stage, TargetPair};
use freighter::lifecycle::{Orchestrator, RunReport, StageState};
use freighter::tools::ToolCache;
use freighter::util::diagnostic::{
    suggestions, ConflictingRegistrationDiagnostic, Diagnostic, UnknownTargetDiagnostic,
};

use crate::cli::StageArgs;

/// The discovered project plus the machinery shared by every target.
pub struct Workspace {
    pub manifest: Manifest,
    pub cache_root: PathBuf,
    global_layer: ConfigMap,
}

impl Workspace {
    /// Locate the manifest from the current directory upward.
    pub fn discover() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;

        let Some(manifest_path) = Manifest::find(&cwd) else {
            bail!(
                "could not find `{}` in `{}` or any parent directory\n{}",
                Manifest::FILE_NAME,
                cwd.display(),
                suggestions::NO_MANIFEST
            );
        };

        let manifest = Manifest::load(&manifest_path)?;
        let cache_root = default_cache_root();
        let global_layer = config::load_global_layer(&cache_root.join("config.toml"));

        Ok(Workspace {
            manifest,
            cache_root,
            global_layer,
        })
    }

    /// The targets a command should operate on: the explicit `--target`, or
    /// everything the manifest declares.
    pub fn targets(&self, requested: Option<&str>) -> Result<Vec<TargetPair>> {
        if let Some(raw) = requested {
            return Ok(vec![config::loader::parse_target(raw)?]);
        }

        let declared = self.manifest.targets()?;
        if declared.is_empty() {
            bail!(
                "the manifest declares no targets\n\
                 help: add `targets = [\"macos:app\"]` to the [app] section, \
                 or pass --target"
            );
        }
        Ok(declared)
    }

    /// Resolve the full layer stack for one target into a build context.
    pub fn context_for(&self, target: &TargetPair, overrides: &ConfigMap) -> Result<BuildContext> {
        let mut layers = vec![self.global_layer.clone()];
        layers.extend(self.manifest.layers_for(target.platform, &target.format));
        layers.push(overrides.clone());

        let source_root = self.manifest.source_root().to_path_buf();
        let roots = Roots {
            output_root: source_root.join("build"),
            cache_root: self.cache_root.clone(),
            source_root,
        };

        let ctx = config::resolve(layers, target.platform, target.format.clone(), roots)?;
        Ok(ctx)
    }

    /// Build the shared tool cache, honoring `tools.<name>` path overrides
    /// and `tool-timeout-secs` from the resolved contexts.
    pub fn tool_cache(&self, contexts: &[BuildContext]) -> ToolCache {
        let mut cache = ToolCache::new(&self.cache_root);

        for ctx in contexts {
            if let Some(tools) = ctx.get("tools").and_then(|v| v.as_mapping()) {
                for (name, path) in tools {
                    if let Some(path) = path.as_str() {
                        cache = cache.with_override(name.clone(), path);
                    }
                }
            }
            if let Some(secs) = ctx.get("tool-timeout-secs").and_then(|v| v.as_integer()) {
                cache = cache.with_invoke_timeout(Duration::from_secs(secs.max(1) as u64));
            }
        }

        cache
    }
}

/// Populate the registry with one script backend per declared target.
///
/// The registry is built once here, at startup, and read-only afterwards.
pub fn build_registry(
    jobs: &[(TargetPair, BuildContext)],
    tools: &Arc<ToolCache>,
) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();

    for (target, ctx) in jobs {
        let backend = Arc::new(ScriptBackend::from_context(ctx, tools.clone()));
        registry
            .register(target.clone(), backend)
            .map_err(describe_registry_error)?;
    }

    Ok(registry)
}

/// Turn a registry failure into its diagnostic form, with remediation help.
fn describe_registry_error(e: RegistryError) -> anyhow::Error {
    match e {
        RegistryError::UnknownTarget { target, registered } => {
            let known = if registered.is_empty() {
                "no backends are registered".to_string()
            } else {
                format!(
                    "registered targets: {}",
                    registered
                        .iter()
                        .map(|t| t.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            };
            anyhow::Error::new(UnknownTargetDiagnostic {
                platform: target.platform.to_string(),
                format: target.format.to_string(),
                known: Some(known),
            })
        }
        RegistryError::ConflictingRegistration {
            target,
            existing,
            incoming,
        } => anyhow::Error::new(ConflictingRegistrationDiagnostic {
            platform: target.platform.to_string(),
            format: target.format.to_string(),
            existing,
            incoming,
        }),
    }
}

/// Resolve contexts, build the registry, and drive the requested stages for
/// every selected target.
pub fn run_stages(
    args: &StageArgs,
    stages: &[Stage],
    extra_overrides: &[String],
    verbose: bool,
    color: bool,
) -> Result<()> {
    let ws = Workspace::discover()?;

    let mut override_raws = args.config.clone();
    override_raws.extend(extra_overrides.iter().cloned());
    let overrides = config::overrides_layer(&override_raws)?;

    let targets = ws.targets(args.target.as_deref())?;
    let jobs: Vec<(TargetPair, BuildContext)> = targets
        .iter()
        .map(|target| Ok((target.clone(), ws.context_for(target, &overrides)?)))
        .collect::<Result<_>>()?;

    let contexts: Vec<BuildContext> = jobs.iter().map(|(_, ctx)| ctx.clone()).collect();
    let tools = Arc::new(ws.tool_cache(&contexts));
    let registry = build_registry(&jobs, &tools)?;

    let orchestrator = Orchestrator::new(&tools);

    let reports: Vec<RunReport> = if jobs.len() == 1 {
        let (target, ctx) = &jobs[0];
        let backend = registry.lookup(target).map_err(describe_registry_error)?;
        vec![run_one(&orchestrator, ctx, backend.as_ref(), stages, verbose)]
    } else {
        // Independent targets own disjoint contexts and record sets; only
        // the tool cache is shared, and it locks per locator.
        let parallel_jobs: Vec<(BuildContext, Arc<dyn Backend>)> = jobs
            .iter()
            .map(|(target, ctx)| {
                let backend = registry.lookup(target).map_err(describe_registry_error)?;
                Ok((ctx.clone(), backend))
            })
            .collect::<Result<_>>()?;
        orchestrator.run_all(&parallel_jobs, stages)
    };

    let cwd = std::env::current_dir().unwrap_or_default();
    let mut failed = false;
    for report in &reports {
        eprintln!("{}", report.target);
        eprint!("{}", report.render());
        for artifact in report.artifacts() {
            eprintln!(
                "{:>10}  {}",
                "",
                freighter::util::fs::relative_path(&cwd, artifact).display()
            );
        }
        for warning in report.warnings() {
            freighter::util::diagnostic::emit(&Diagnostic::warning(warning), color);
        }
        failed |= !report.success();
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

fn run_one(
    orchestrator: &Orchestrator<'_>,
    ctx: &BuildContext,
    backend: &dyn Backend,
    stages: &[Stage],
    verbose: bool,
) -> RunReport {
    if verbose {
        return orchestrator.run(ctx, backend, stages);
    }

    let total = freighter::core::StageDag::standard().expand(stages).len();
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("static template")
            .progress_chars("#>-"),
    );

    let observer = |stage: Stage, state: StageState| match state {
        StageState::Running => bar.set_message(stage.to_string()),
        StageState::Succeeded | StageState::Skipped | StageState::Failed => bar.inc(1),
        _ => {}
    };

    let report = orchestrator.run_observed(ctx, backend, stages, &observer);
    bar.finish_and_clear();
    report
}

/// Default managed cache root (`~/.cache/freighter` or platform
/// equivalent).
pub fn default_cache_root() -> PathBuf {
    directories::ProjectDirs::from("com", "freighter", "freighter")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| {
            dirs_fallback().join(".freighter")
        })
}

fn dirs_fallback() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}
