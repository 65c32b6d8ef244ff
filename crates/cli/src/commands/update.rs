//! `coldsnap update` — assess, print the plan, confirm, then execute it.

use std::io::{IsTerminal, Write};
use std::path::PathBuf;

use clap::Args;

use coldsnap_planner::destroy_proposed;

use crate::output::{self, OutputFormat};
use crate::session::Session;

#[derive(Debug, Args)]
pub struct UpdateArgs {
    /// Path to the YAML config file.
    pub config: PathBuf,

    /// Perform actions without prompting. Required when stdin/stdout is not a TTY.
    #[arg(long)]
    pub force: bool,

    #[arg(short, long)]
    pub verbose: bool,

    /// Force JSON output.
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: UpdateArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let is_tty = std::io::stdin().is_terminal() && std::io::stdout().is_terminal();

    if !is_tty && !args.force {
        output::print_error(format, "refusing to run non-interactively without --force");
        anyhow::bail!("non-interactive invocation requires --force");
    }

    let session = Session::open(&args.config)?;
    let (assessment, actions, tz) = session.assess()?;
    output::print_plan(format, &assessment, &actions, &tz)?;

    if actions.is_empty() {
        return Ok(());
    }

    let proceed = args.force || confirm("Apply this plan?")?;
    if !proceed {
        if confirm("Undo proposed snapshots created during this pass?")? {
            let tuple = session_tuple_for_undo(&session)?;
            destroy_proposed(std::slice::from_ref(&tuple), &assessment)?;
        }
        return Ok(());
    }

    session.executor().execute(&actions)?;
    if args.verbose {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "done: {} renamed, {} uploaded, {} destroyed, {} deleted",
            actions.rename_snapshots.len(),
            actions.upload_backups.len(),
            actions.destroy_snapshots.len(),
            actions.delete_backups.len());
    }
    Ok(())
}

/// Rebuilds the `ConfigTuple` used only for the decline-path undo recovery; the original
/// tuple from `Session::assess` does not outlive that call.
fn session_tuple_for_undo(session: &Session) -> anyhow::Result<coldsnap_planner::ConfigTuple<'_>> {
    let (source_uuid, source_ctransid) = coldsnap_adapters::source_identity(&session.config.source_path)?;
    let policy = coldsnap_common::RetentionPolicy::new(
        session.config.preserve,
        std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs() as i64,
        session.config.timezone.clone(),
    );
    Ok(coldsnap_planner::ConfigTuple {
        source_name: crate::session::SOURCE_NAME.to_owned(),
        source_path: session.config.source_path.clone(),
        source_uuid,
        source_ctransid,
        store: &session.store,
        remote: &session.remote,
        remote_name: session.config.remote_id.clone(),
        policy,
    })
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    let mut out = std::io::stdout().lock();
    write!(out, "{prompt} [y/N] ")?;
    out.flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
