//! Output format auto-detection and plan rendering for the CLI.
//!
//! TTY: human-readable tables and a tree. Piped/redirected: structured JSON. `--json` forces JSON
//! regardless of terminal, detected the way `OutputFormat::detect` does it.

use std::io::{self, IsTerminal, Write};

use coldsnap_common::{describe, KeepReasons};
use coldsnap_planner::{Actions, Assessment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn detect(json_flag: bool) -> Self {
        if json_flag {
            return Self::Json;
        }
        Self::detect_from_terminal(io::stdout().is_terminal())
    }

    pub fn detect_from_terminal(is_tty: bool) -> Self {
        if is_tty {
            Self::Human
        } else {
            Self::Json
        }
    }
}

/// Prints the plan: a table of per-source snapshots and a tree of per-remote backups, each
/// annotated with its keep reasons and human-readable time span, grounded on the original's
/// `commands/run.py` `_print_assessment`/`_print_actions`.
pub fn print_plan(format: OutputFormat, assessment: &Assessment, actions: &Actions, tz: &jiff::tz::TimeZone) -> io::Result<()> {
    let mut out = io::stdout().lock();
    match format {
        OutputFormat::Human => write_plan_human(&mut out, assessment, actions, tz),
        OutputFormat::Json => write_plan_json(&mut out, assessment, actions),
    }
}

fn write_plan_human(out: &mut impl Write, assessment: &Assessment, actions: &Actions, tz: &jiff::tz::TimeZone) -> io::Result<()> {
    writeln!(out, "snapshots:")?;
    let mut snapshots: Vec<_> = assessment.snapshots.values().collect();
    snapshots.sort_by_key(|s| s.info.ctransid);
    for snapshot in snapshots {
        let status = if snapshot.meta.is_kept() { "keep" } else { "destroy" };
        let reasons = describe_reasons(snapshot.meta.reasons);
        let spans = snapshot
            .meta
            .time_buckets
            .iter()
            .map(|b| describe(b, tz))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(
            out,
            "  [{status:<7}] {} ({}, ctransid={}) reasons=[{reasons}] {spans}",
            snapshot.info.uuid, snapshot.source_name, snapshot.info.ctransid
        )?;
    }

    writeln!(out, "backups:")?;
    let mut backups: Vec<_> = assessment.backups.values().collect();
    backups.sort_by(|a, b| a.key.cmp(&b.key));
    for backup in backups {
        let status = if backup.meta.is_kept() { "keep" } else { "delete" };
        let reasons = describe_reasons(backup.meta.reasons);
        let parent = backup.info.send_parent_uuid.map(|p| p.to_string()).unwrap_or_else(|| "full".to_owned());
        writeln!(out, "  [{status:<7}] {} parent={parent} reasons=[{reasons}]", backup.key)?;
    }

    if !assessment.warnings.is_empty() {
        writeln!(out, "warnings:")?;
        for warning in &assessment.warnings {
            writeln!(out, "  {warning}")?;
        }
    }

    writeln!(out, "actions:")?;
    for rename in &actions.rename_snapshots {
        writeln!(out, "  rename snapshot {} -> {}", rename.snapshot_id, rename.target_name)?;
    }
    for upload in &actions.upload_backups {
        writeln!(out, "  upload {} to {}", upload.key, upload.remote_name)?;
    }
    for destroy in &actions.destroy_snapshots {
        writeln!(out, "  destroy snapshot {}", destroy.snapshot_id)?;
    }
    for delete in &actions.delete_backups {
        writeln!(out, "  delete {} from {}", delete.key, delete.remote_name)?;
    }
    if actions.is_empty() {
        writeln!(out, "  (nothing to do)")?;
    }
    Ok(())
}

fn describe_reasons(reasons: KeepReasons) -> String {
    let mut parts = Vec::new();
    if reasons.contains(KeepReasons::PRESERVED) {
        parts.push("preserved");
    }
    if reasons.contains(KeepReasons::MOST_RECENT) {
        parts.push("most-recent");
    }
    if reasons.contains(KeepReasons::SEND_ANCESTOR) {
        parts.push("send-ancestor");
    }
    parts.join(",")
}

fn write_plan_json(out: &mut impl Write, assessment: &Assessment, actions: &Actions) -> io::Result<()> {
    let snapshots: Vec<_> = assessment
        .snapshots
        .values()
        .map(|s| {
            serde_json::json!({
                "uuid": s.info.uuid.to_string(),
                "source": s.source_name,
                "ctransid": s.info.ctransid,
                "kept": s.meta.is_kept(),
                "reasons": describe_reasons(s.meta.reasons),
            })
        })
        .collect();
    let backups: Vec<_> = assessment
        .backups
        .values()
        .map(|b| {
            serde_json::json!({
                "key": b.key,
                "kept": b.meta.is_kept(),
                "reasons": describe_reasons(b.meta.reasons),
            })
        })
        .collect();
    let value = serde_json::json!({
        "snapshots": snapshots,
        "backups": backups,
        "warnings": assessment.warnings,
        "actions": {
            "rename": actions.rename_snapshots.len(),
            "upload": actions.upload_backups.len(),
            "destroy": actions.destroy_snapshots.len(),
            "delete": actions.delete_backups.len(),
        },
    });
    serde_json::to_writer_pretty(&mut *out, &value)?;
    writeln!(out)
}

pub fn print_error(format: OutputFormat, message: &str) {
    let mut err = io::stderr().lock();
    match format {
        OutputFormat::Human => {
            let _ = writeln!(err, "error: {message}");
        }
        OutputFormat::Json => {
            let obj = serde_json::json!({ "error": message });
            let _ = serde_json::to_writer(&mut err, &obj);
            let _ = writeln!(err);
        }
    }
}
