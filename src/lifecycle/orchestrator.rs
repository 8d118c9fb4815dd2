//! The lifecycle state machine.
//!
//! Stages execute sequentially in dependency order within one run; each
//! stage either skips (its persisted record matches the run fingerprint),
//! executes, or is halted by an earlier failure. Independent targets may
//! run concurrently; the tool cache is the only shared resource.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use crate::backend::{dispatch, Backend};
use crate::core::context::BuildContext;
use crate::core::stage::{Stage, StageDag};
use crate::lifecycle::record::{StageRecord, StageRecordStore};
use crate::lifecycle::report::{RunReport, StageReport, StageState};
use crate::template::{TemplateEngine, TemplateReference};
use crate::tools::ToolCache;
use crate::util::hash::Fingerprint;

/// Notified as each stage changes state; lets the CLI drive progress
/// output without the orchestrator knowing about terminals.
pub type StageObserver<'o> = &'o (dyn Fn(Stage, StageState) + Sync);

fn no_observer(_: Stage, _: StageState) {}

/// Drives an application through its lifecycle stages.
pub struct Orchestrator<'a> {
    tools: &'a ToolCache,
    dag: StageDag,
}

impl<'a> Orchestrator<'a> {
    /// Create an orchestrator over the standard stage DAG.
    pub fn new(tools: &'a ToolCache) -> Self {
        Orchestrator {
            tools,
            dag: StageDag::standard(),
        }
    }

    /// Run the requested stages (plus their prerequisites) for one target.
    ///
    /// Always returns a complete report enumerating every stage's final
    /// state. A required stage failing halts everything left in the run; an
    /// optional stage failing halts only its own dependents, so independent
    /// branches still execute.
    pub fn run(
        &self,
        ctx: &BuildContext,
        backend: &dyn Backend,
        requested: &[Stage],
    ) -> RunReport {
        self.run_observed(ctx, backend, requested, &no_observer)
    }

    /// [`run`](Self::run) with a stage-state observer.
    pub fn run_observed(
        &self,
        ctx: &BuildContext,
        backend: &dyn Backend,
        requested: &[Stage],
        observer: StageObserver<'_>,
    ) -> RunReport {
        let stages = self.dag.expand(requested);
        let mut reports: Vec<StageReport> =
            stages.iter().map(|&s| StageReport::pending(s)).collect();

        tracing::info!(
            "running [{}] for {}",
            stages
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            ctx.target()
        );

        // Verify every required tool before any stage runs, so environment
        // problems surface with nothing half-done.
        let tool_versions = match self.verify_tools(ctx, backend) {
            Ok(versions) => versions,
            Err(message) => {
                if let Some(first) = reports.first_mut() {
                    first.state = StageState::Failed;
                    first.error = Some(message);
                }
                return RunReport {
                    target: ctx.target().clone(),
                    stages: reports,
                };
            }
        };

        let template_version = self.template_version(ctx);
        let fingerprint = self.run_fingerprint(ctx, template_version.as_deref(), &tool_versions);
        let record_path = ctx.stage_record_path();
        let mut store = StageRecordStore::load(&record_path);

        let mut halt_all = false;
        let mut halted: std::collections::BTreeSet<Stage> = Default::default();
        let mut create_executed = false;

        for report in reports.iter_mut() {
            let stage = report.stage;

            if halt_all || halted.contains(&stage) {
                continue;
            }

            // A create in this invocation just rendered the skeleton; an
            // immediate update would be a no-op.
            if stage == Stage::Update && create_executed {
                report.state = StageState::Skipped;
                observer(stage, StageState::Skipped);
                store.insert(StageRecord::new(stage, fingerprint.clone()));
                persist(&store, &record_path);
                continue;
            }

            if store.matches(stage, &fingerprint) {
                tracing::debug!("{} is up to date", stage);
                report.state = StageState::Skipped;
                observer(stage, StageState::Skipped);
                continue;
            }

            report.state = StageState::Running;
            observer(stage, StageState::Running);
            let started = Instant::now();
            let result = dispatch(backend, stage, ctx);
            report.duration = started.elapsed();

            match result {
                Ok(output) => {
                    tracing::info!("{} succeeded", stage);
                    report.state = StageState::Succeeded;
                    report.warnings = output.warnings;
                    report.artifacts = output.artifacts;
                    for warning in &report.warnings {
                        tracing::warn!("{}: {}", stage, warning);
                    }

                    // This stage's outputs changed, so downstream records
                    // no longer describe reality.
                    for dependent in self.dag.dependents(stage) {
                        store.remove(dependent);
                    }
                    store.insert(StageRecord::new(stage, fingerprint.clone()));
                    persist(&store, &record_path);
                    observer(stage, StageState::Succeeded);

                    if stage == Stage::Create {
                        create_executed = true;
                    }
                }
                Err(e) => {
                    tracing::error!("{} failed: {}", stage, e);
                    observer(stage, StageState::Failed);
                    report.state = StageState::Failed;
                    report.error = Some(format!("{:#}", anyhow::Error::new(e)));

                    if self.dag.is_optional(stage) {
                        halted.extend(self.dag.dependents(stage));
                    } else {
                        halt_all = true;
                    }
                }
            }
        }

        RunReport {
            target: ctx.target().clone(),
            stages: reports,
        }
    }

    /// Orchestrate several independent targets concurrently.
    ///
    /// Each job owns a disjoint context, output directory, and record set;
    /// the shared tool cache serializes same-locator fetches internally.
    pub fn run_all(
        &self,
        jobs: &[(BuildContext, Arc<dyn Backend>)],
        requested: &[Stage],
    ) -> Vec<RunReport> {
        jobs.par_iter()
            .map(|(ctx, backend)| self.run(ctx, backend.as_ref(), requested))
            .collect()
    }

    /// Verify the backend's required tools, collecting their versions for
    /// the run fingerprint.
    fn verify_tools(
        &self,
        ctx: &BuildContext,
        backend: &dyn Backend,
    ) -> Result<BTreeMap<String, String>, String> {
        let mut versions = BTreeMap::new();

        for spec in backend.required_tools(ctx) {
            match self.tools.verify(&spec) {
                Ok(handle) => {
                    versions.insert(handle.name.clone(), handle.version.to_string());
                }
                Err(e) => return Err(format!("{:#}", anyhow::Error::new(e))),
            }
        }

        Ok(versions)
    }

    /// The version of the template the context declares, when it resolves.
    ///
    /// Resolution failures are deliberately ignored here: they will surface
    /// properly when the create stage runs. This only feeds skip-vs-rerun.
    fn template_version(&self, ctx: &BuildContext) -> Option<String> {
        let reference = TemplateReference::from_context(ctx).ok()?;
        let engine = TemplateEngine::new(self.tools);
        engine
            .resolve(&reference)
            .ok()
            .map(|resolved| resolved.meta.version.to_string())
    }

    /// Digest of everything that determines stage outputs: resolved config,
    /// template version, and verified tool versions.
    fn run_fingerprint(
        &self,
        ctx: &BuildContext,
        template_version: Option<&str>,
        tool_versions: &BTreeMap<String, String>,
    ) -> String {
        let mut fp = Fingerprint::new();
        fp.update_str(ctx.config_hash());
        fp.update_opt(template_version);
        for (tool, version) in tool_versions {
            fp.update_entry(tool, version);
        }
        fp.finish_short()
    }
}

fn persist(store: &StageRecordStore, path: &std::path::Path) {
    if let Err(e) = store.save(path) {
        // Losing a record only costs a redundant re-run later.
        tracing::warn!("failed to persist stage records: {:#}", e);
    }
}
