//! `coldsnap plan` — assess without executing.

use std::path::PathBuf;

use clap::Args;

use crate::output::{self, OutputFormat};
use crate::session::Session;

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Path to the YAML config file.
    pub config: PathBuf,

    /// Force JSON output.
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: PlanArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let session = Session::open(&args.config)?;
    let (assessment, actions, tz) = session.assess()?;
    output::print_plan(format, &assessment, &actions, &tz)?;
    Ok(())
}
