//! The built-in script backend.
//!
//! Drives the lifecycle with user-configured command lines: `create` and
//! `update` materialize the configured template, while `build`, `run`,
//! `package`, and `publish` run the `<stage>-command` declared in the
//! resolved configuration through the tool cache. The capability set is
//! exactly what the configuration declares, so asking for an unconfigured
//! stage fails as unsupported rather than guessing.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::backend::{Backend, StageError, StageOutput};
use crate::core::context::BuildContext;
use crate::core::stage::Stage;
use crate::template::{TemplateEngine, TemplateManifest, TemplateReference};
use crate::tools::{ToolCache, ToolSpec};

/// Backend whose stage operations come from configuration.
pub struct ScriptBackend {
    tools: Arc<ToolCache>,
    capabilities: BTreeSet<Stage>,
}

impl ScriptBackend {
    /// Build a script backend from a resolved context, deriving the
    /// capability set from what the configuration declares.
    pub fn from_context(ctx: &BuildContext, tools: Arc<ToolCache>) -> Self {
        let mut capabilities = BTreeSet::new();

        let has_template =
            ctx.get_str("template.path").is_some() || ctx.get_str("template.archive").is_some();
        if has_template {
            capabilities.insert(Stage::Create);
            capabilities.insert(Stage::Update);
        }

        for stage in [Stage::Build, Stage::Run, Stage::Package, Stage::Publish] {
            if command_for(ctx, stage).is_some() {
                capabilities.insert(stage);
            }
        }

        ScriptBackend {
            tools,
            capabilities,
        }
    }

    fn run_command(&self, ctx: &BuildContext, stage: Stage) -> Result<StageOutput, StageError> {
        let Some(command) = command_for(ctx, stage) else {
            return Err(StageError::unsupported(self, stage));
        };

        let (program, args) = command
            .split_first()
            .ok_or_else(|| StageError::Failed {
                message: format!("`{}-command` is empty", stage),
            })?;

        let handle = self.tools.verify(&ToolSpec::new(program.as_str()))?;
        let result = self
            .tools
            .invoke(&handle, args, &ctx.roots().source_root)?;

        if !result.success() {
            return Err(StageError::Failed {
                message: format!(
                    "`{}` exited with {:?}\n{}",
                    program, result.exit_code, result.stderr
                ),
            });
        }

        Ok(StageOutput {
            artifacts: collect_artifacts(ctx, stage),
            warnings: Vec::new(),
        })
    }
}

impl Backend for ScriptBackend {
    fn name(&self) -> &str {
        "script"
    }

    fn capabilities(&self) -> BTreeSet<Stage> {
        self.capabilities.clone()
    }

    fn required_tools(&self, ctx: &BuildContext) -> Vec<ToolSpec> {
        let mut specs = Vec::new();

        // Explicit requirements: `require-tools = ["docker >=24", "zip"]`.
        if let Some(items) = ctx.get("require-tools").and_then(|v| v.as_sequence()) {
            for item in items {
                if let Some(raw) = item.as_str() {
                    specs.push(parse_tool_requirement(raw));
                }
            }
        }

        // Every configured command's program is also required.
        for stage in [Stage::Build, Stage::Run, Stage::Package, Stage::Publish] {
            if !self.capabilities.contains(&stage) {
                continue;
            }
            if let Some(command) = command_for(ctx, stage) {
                if let Some(program) = command.first() {
                    if !specs.iter().any(|s| s.name == *program) {
                        specs.push(ToolSpec::new(program.as_str()));
                    }
                }
            }
        }

        specs
    }

    fn create(&self, ctx: &BuildContext) -> Result<StageOutput, StageError> {
        if !self.supports(Stage::Create) {
            return Err(StageError::unsupported(self, Stage::Create));
        }

        let reference = TemplateReference::from_context(ctx)?;
        let engine = TemplateEngine::new(&self.tools);
        let outcome = engine.materialize(&reference, ctx, &ctx.stage_dir(Stage::Create))?;

        Ok(StageOutput {
            artifacts: vec![outcome.target_dir],
            warnings: Vec::new(),
        })
    }

    fn update(&self, ctx: &BuildContext) -> Result<StageOutput, StageError> {
        if !self.supports(Stage::Update) {
            return Err(StageError::unsupported(self, Stage::Update));
        }

        let skeleton = ctx.stage_dir(Stage::Update);
        let previous = TemplateManifest::load(&skeleton)
            .unwrap_or_else(|e| {
                tracing::warn!("ignoring unreadable template manifest: {:#}", e);
                None
            })
            .unwrap_or_default();

        let force = ctx
            .get("template.force")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let reference = TemplateReference::from_context(ctx)?;
        let engine = TemplateEngine::new(&self.tools);
        let outcome = engine.update(&reference, ctx, &skeleton, &previous, force)?;

        let warnings = outcome
            .conflicts
            .iter()
            .map(|path| format!("locally modified file left untouched: {}", path))
            .collect();

        Ok(StageOutput {
            artifacts: vec![outcome.target_dir],
            warnings,
        })
    }

    fn build(&self, ctx: &BuildContext) -> Result<StageOutput, StageError> {
        self.run_command(ctx, Stage::Build)
    }

    fn run(&self, ctx: &BuildContext) -> Result<StageOutput, StageError> {
        self.run_command(ctx, Stage::Run)
    }

    fn package(&self, ctx: &BuildContext) -> Result<StageOutput, StageError> {
        self.run_command(ctx, Stage::Package)
    }

    fn publish(&self, ctx: &BuildContext) -> Result<StageOutput, StageError> {
        self.run_command(ctx, Stage::Publish)
    }
}

/// The configured command line for a stage, if any.
fn command_for(ctx: &BuildContext, stage: Stage) -> Option<Vec<String>> {
    let items = ctx
        .get(&format!("{}-command", stage))
        .and_then(|v| v.as_sequence())?;

    let command: Vec<String> = items
        .iter()
        .filter_map(|item| item.as_str().map(str::to_string))
        .collect();

    (command.len() == items.len()).then_some(command)
}

/// Collect a stage's artifacts by the configured glob patterns, relative to
/// the source root.
fn collect_artifacts(ctx: &BuildContext, stage: Stage) -> Vec<PathBuf> {
    let Some(items) = ctx
        .get(&format!("{}-artifacts", stage))
        .and_then(|v| v.as_sequence())
    else {
        return Vec::new();
    };

    let mut artifacts = Vec::new();
    for item in items {
        let Some(pattern) = item.as_str() else {
            continue;
        };
        let full = ctx.roots().source_root.join(pattern);
        match glob::glob(&full.to_string_lossy()) {
            Ok(paths) => artifacts.extend(paths.filter_map(|p| p.ok())),
            Err(e) => tracing::warn!("invalid artifact pattern `{}`: {}", pattern, e),
        }
    }

    artifacts.sort();
    artifacts.dedup();
    artifacts
}

/// Parse `"name"` or `"name <version-req>"` into a tool spec.
fn parse_tool_requirement(raw: &str) -> ToolSpec {
    match raw.split_once(char::is_whitespace) {
        Some((name, req)) => match semver::VersionReq::parse(req.trim()) {
            Ok(req) => ToolSpec::new(name).with_version_req(req),
            Err(e) => {
                tracing::warn!("ignoring invalid version requirement in `{}`: {}", raw, e);
                ToolSpec::new(name)
            }
        },
        None => ToolSpec::new(raw),
    }
}
