//! CLI subcommand dispatch.

use clap::Subcommand;

pub mod plan;
pub mod update;

#[derive(Subcommand)]
pub enum Command {
    /// Assess snapshots and backups, execute whatever the plan calls for
    Update(update::UpdateArgs),
    /// Assess without executing (dry run)
    Plan(plan::PlanArgs),
}

pub fn run(cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Update(args) => update::run(args),
        Command::Plan(args) => plan::run(args),
    }
}
