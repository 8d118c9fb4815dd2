//! `freighter doctor` command.
//!
//! Reports the registered targets, each backend's capability set, and
//! (with `--tools`) whether the required external tools verify.

use std::sync::Arc;

use anyhow::Result;

use freighter::config;
use freighter::core::{BuildContext, Stage, TargetPair};
use freighter::tools::ToolError;

use crate::cli::DoctorArgs;
use crate::commands::support::{build_registry, Workspace};

pub fn execute(args: DoctorArgs, _verbose: bool) -> Result<()> {
    let ws = Workspace::discover()?;
    let overrides = config::value::ConfigMap::new();

    let targets = ws.targets(None)?;
    let jobs: Vec<(TargetPair, BuildContext)> = targets
        .iter()
        .map(|target| Ok((target.clone(), ws.context_for(target, &overrides)?)))
        .collect::<Result<_>>()?;

    let contexts: Vec<BuildContext> = jobs.iter().map(|(_, ctx)| ctx.clone()).collect();
    let tools = Arc::new(ws.tool_cache(&contexts));
    let registry = build_registry(&jobs, &tools)?;

    println!("manifest: {}", ws.manifest.path().display());
    println!("cache:    {}", ws.cache_root.display());
    println!();

    let mut all_ok = true;

    for (target, ctx) in &jobs {
        let backend = registry.lookup(target)?;

        let capabilities: Vec<&str> = Stage::ALL
            .iter()
            .filter(|s| backend.supports(**s))
            .map(|s| s.as_str())
            .collect();

        println!(
            "{} (backend `{}`): {}",
            target,
            backend.name(),
            if capabilities.is_empty() {
                "no operations configured".to_string()
            } else {
                capabilities.join(", ")
            }
        );

        if !args.tools {
            continue;
        }

        for spec in backend.required_tools(ctx) {
            match tools.verify(&spec) {
                Ok(handle) => {
                    println!(
                        "  ✓ {} {} ({})",
                        handle.name,
                        handle.version,
                        handle.path.display()
                    );
                }
                Err(e) => {
                    all_ok = false;
                    println!("  ✗ {}", e);
                    if let ToolError::NotFound {
                        install_hint: Some(hint),
                        ..
                    } = &e
                    {
                        println!("    help: {}", hint);
                    }
                }
            }
        }
    }

    if !all_ok {
        std::process::exit(1);
    }
    Ok(())
}
