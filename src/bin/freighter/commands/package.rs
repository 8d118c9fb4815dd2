//! `freighter package` command.

use anyhow::Result;

use freighter::core::Stage;

use crate::cli::StageArgs;
use crate::commands::support::run_stages;

pub fn execute(args: StageArgs, verbose: bool, color: bool) -> Result<()> {
    run_stages(&args, &[Stage::Package], &[], verbose, color)
}
