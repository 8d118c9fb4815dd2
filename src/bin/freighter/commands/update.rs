//! `freighter update` command.

use anyhow::Result;

use freighter::core::Stage;

use crate::cli::UpdateArgs;
use crate::commands::support::run_stages;

pub fn execute(args: UpdateArgs, verbose: bool, color: bool) -> Result<()> {
    // Forced updates also have to re-execute even when fingerprints still
    // match, so the force flag travels as a config override: it changes the
    // resolved config, and with it the stage fingerprint.
    let extra = if args.force {
        vec!["template.force=true".to_string()]
    } else {
        Vec::new()
    };

    run_stages(&args.stage, &[Stage::Update], &extra, verbose, color)
}
