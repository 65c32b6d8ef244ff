//! The pure function at the heart of the planner.
//!
//! `resolve` consumes the current snapshots and backups plus a retention policy, and returns the
//! set of snapshots and backups to keep, each annotated with why. It runs in three passes:
//!
//! - **Pass A** preserves the nominal snapshot/backup of every currently-preserved bucket,
//!   synthesizing a new backup where one is missing or stale.
//! - **Pass B** preserves the single most-recent snapshot unconditionally.
//! - **Pass C** closes the kept-backup set under `send_parent_uuid` ancestry, so every kept
//!   incremental backup's chain back to a full backup is also kept (or the break is reported as
//!   a warning).
//!
//! The resolver never fails: malformed chains produce a warning, not an error.

use crate::bucket::TimeBucket;
use crate::index::Index;
use crate::model::{BackupInfo, KeepFlags, KeepMeta, KeepReasons, SnapshotInfo};
use crate::retention::RetentionPolicy;
use crate::uuid16::Uuid16;
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Constructs a `BackupInfo` for `snapshot`, incremental against `send_parent` (or full if
/// `None`). Supplied by the caller so the resolver stays free of any knowledge of how backups are
/// actually produced.
pub trait BackupConstructor {
    fn mk_backup(&self, snapshot: &SnapshotInfo, send_parent: Option<Uuid16>) -> BackupInfo;
}

impl<F> BackupConstructor for F
where
    F: Fn(&SnapshotInfo, Option<Uuid16>) -> BackupInfo,
{
    fn mk_backup(&self, snapshot: &SnapshotInfo, send_parent: Option<Uuid16>) -> BackupInfo {
        self(snapshot, send_parent)
    }
}

#[derive(Debug, Default)]
pub struct ResolveResult {
    pub keep_snapshots: HashMap<Uuid16, (SnapshotInfo, KeepMeta)>,
    pub keep_backups: HashMap<Uuid16, (BackupInfo, KeepMeta)>,
    /// One entry per broken chain encountered in Pass C.
    pub warnings: Vec<String>,
}

fn mark_snapshot(
    map: &mut HashMap<Uuid16, (SnapshotInfo, KeepMeta)>,
    info: &SnapshotInfo,
    meta: KeepMeta,
) {
    map.entry(info.uuid)
        .and_modify(|(_, existing)| existing.merge(&meta))
        .or_insert_with(|| (info.clone(), meta));
}

fn mark_backup(map: &mut HashMap<Uuid16, (BackupInfo, KeepMeta)>, info: &BackupInfo, meta: KeepMeta) {
    map.entry(info.uuid)
        .and_modify(|(_, existing)| existing.merge(&meta))
        .or_insert_with(|| (info.clone(), meta));
}

/// Backup-creation sub-procedure: finds `s`'s send-parent by walking
/// `policy.buckets_for(s.ctime)` in descending granularity and taking the first nominal snapshot
/// that isn't `s` itself. Reaching `s` without finding one means `s` is nominal for the coarsest
/// bucket it occupies, so the backup is full.
fn find_send_parent(s: &SnapshotInfo, snapshot_index: &Index<SnapshotInfo>, policy: &RetentionPolicy) -> Option<Uuid16> {
    for bucket in policy.buckets_for(s.ctime) {
        if let Some(nominal) = snapshot_index.nominal(&bucket) {
            if nominal.uuid != s.uuid {
                return Some(nominal.uuid);
            }
        }
    }
    None
}

/// Ensures a backup exists in `keep_backups` for snapshot `s`: reusing an already-kept mark, or
/// an already-existing backup for `s.uuid` in `backup_index`, before falling back to synthesizing
/// one via `mk_backup` (flagged `New`) the first time it's needed. "we do not already have a
/// backup for s.uuid" (spec's backup-creation sub-procedure) means checking the full backup set,
/// not just markers already applied earlier in this same resolve() call — otherwise re-running
/// the resolver over an unchanged, already-backed-up most-recent snapshot would synthesize and
/// re-flag a duplicate `New` backup every pass.
#[allow(clippy::too_many_arguments)]
fn ensure_backup(
    s: &SnapshotInfo,
    snapshot_index: &Index<SnapshotInfo>,
    backup_index: &Index<BackupInfo>,
    policy: &RetentionPolicy,
    mk_backup: &dyn BackupConstructor,
    keep_backups: &mut HashMap<Uuid16, (BackupInfo, KeepMeta)>,
    reason: KeepReasons,
    extra_flags: KeepFlags,
    bucket: Option<TimeBucket>,
) {
    let mut meta = KeepMeta::default().with_reason(reason);
    if let Some(b) = bucket {
        meta = meta.with_bucket(b);
    }
    if let Some((_, existing)) = keep_backups.get_mut(&s.uuid) {
        existing.merge(&meta);
        return;
    }
    if let Some(existing) = backup_index.get(s.uuid) {
        keep_backups.insert(s.uuid, (existing.clone(), meta));
        return;
    }
    let send_parent = find_send_parent(s, snapshot_index, policy);
    let info = mk_backup.mk_backup(s, send_parent);
    meta = meta.with_flag(KeepFlags::NEW).with_flag(extra_flags);
    keep_backups.insert(s.uuid, (info, meta));
}

/// Runs the three-pass resolver: preserve nominal items per bucket, preserve the most recent
/// item, then close over send-parent ancestry.
pub fn resolve(
    snapshots: &[SnapshotInfo],
    backups: &[BackupInfo],
    policy: &RetentionPolicy,
    mk_backup: &dyn BackupConstructor,
) -> ResolveResult {
    let snapshot_index = Index::build(snapshots.iter().cloned(), policy);
    let backup_index = Index::build(backups.iter().cloned(), policy);

    let mut keep_snapshots: HashMap<Uuid16, (SnapshotInfo, KeepMeta)> = HashMap::new();
    let mut keep_backups: HashMap<Uuid16, (BackupInfo, KeepMeta)> = HashMap::new();
    let mut warnings = Vec::new();

    // Pass A: preserve nominal items for preserved buckets. Buckets are visited in a fixed
    // (sorted) order so that merges happen deterministically regardless of input ordering.
    let universe: BTreeSet<TimeBucket> =
        snapshot_index.all_buckets().into_iter().chain(backup_index.all_buckets()).collect();
    for bucket in &universe {
        if !policy.should_preserve(bucket) {
            continue;
        }
        let sn = snapshot_index.nominal(bucket).cloned();
        let bk = backup_index.nominal(bucket).cloned();
        match (sn, bk) {
            (Some(sn), None) => {
                mark_snapshot(&mut keep_snapshots, &sn, KeepMeta::default().with_reason(KeepReasons::PRESERVED).with_bucket(*bucket));
                ensure_backup(&sn, &snapshot_index, &backup_index, policy, mk_backup, &mut keep_backups, KeepReasons::PRESERVED, KeepFlags::empty(), Some(*bucket));
            }
            (Some(sn), Some(bk)) if bk.ctransid == sn.ctransid => {
                mark_snapshot(&mut keep_snapshots, &sn, KeepMeta::default().with_reason(KeepReasons::PRESERVED).with_bucket(*bucket));
                mark_backup(&mut keep_backups, &bk, KeepMeta::default().with_reason(KeepReasons::PRESERVED).with_bucket(*bucket));
            }
            (Some(sn), Some(bk)) if bk.ctransid > sn.ctransid => {
                mark_snapshot(&mut keep_snapshots, &sn, KeepMeta::default().with_reason(KeepReasons::PRESERVED).with_bucket(*bucket));
                ensure_backup(
                    &sn,
                    &snapshot_index,
                    &backup_index,
                    policy,
                    mk_backup,
                    &mut keep_backups,
                    KeepReasons::PRESERVED,
                    KeepFlags::REPLACING_NEWER,
                    Some(*bucket),
                );
            }
            (Some(sn), Some(bk)) => {
                // bk.ctransid < sn.ctransid
                mark_snapshot(&mut keep_snapshots, &sn, KeepMeta::default().with_reason(KeepReasons::PRESERVED).with_bucket(*bucket));
                mark_backup(
                    &mut keep_backups,
                    &bk,
                    KeepMeta::default()
                        .with_reason(KeepReasons::PRESERVED)
                        .with_flag(KeepFlags::SNAPSHOT_IS_NEWER)
                        .with_bucket(*bucket),
                );
            }
            (None, Some(bk)) => {
                mark_backup(
                    &mut keep_backups,
                    &bk,
                    KeepMeta::default()
                        .with_reason(KeepReasons::PRESERVED)
                        .with_flag(KeepFlags::NO_SNAPSHOT)
                        .with_bucket(*bucket),
                );
            }
            (None, None) => {}
        }
    }

    // Pass B: preserve the most recent snapshot unconditionally.
    if let Some(most_recent) = snapshot_index.most_recent().cloned() {
        mark_snapshot(&mut keep_snapshots, &most_recent, KeepMeta::default().with_reason(KeepReasons::MOST_RECENT));
        ensure_backup(&most_recent, &snapshot_index, &backup_index, policy, mk_backup, &mut keep_backups, KeepReasons::MOST_RECENT, KeepFlags::empty(), None);
    }

    // Pass C: transitive closure under send-parent ancestry.
    let mut queue: VecDeque<Uuid16> = keep_backups.keys().copied().collect();
    let mut visited: std::collections::HashSet<Uuid16> = keep_backups.keys().copied().collect();
    while let Some(child_uuid) = queue.pop_front() {
        let Some(parent_uuid) = keep_backups.get(&child_uuid).and_then(|(info, _)| info.send_parent_uuid) else {
            continue;
        };
        if keep_backups.contains_key(&parent_uuid) {
            continue;
        }
        if visited.contains(&parent_uuid) {
            continue;
        }
        visited.insert(parent_uuid);

        if let Some(existing) = backup_index.get(parent_uuid) {
            mark_backup(
                &mut keep_backups,
                existing,
                KeepMeta::default().with_reason(KeepReasons::SEND_ANCESTOR).with_other_uuid(child_uuid),
            );
            queue.push_back(parent_uuid);
        } else if let Some(ancestor_snapshot) = snapshot_index.get(parent_uuid) {
            let send_parent = find_send_parent(ancestor_snapshot, &snapshot_index, policy);
            let info = mk_backup.mk_backup(ancestor_snapshot, send_parent);
            let meta = KeepMeta::default()
                .with_reason(KeepReasons::SEND_ANCESTOR)
                .with_flag(KeepFlags::NEW)
                .with_other_uuid(child_uuid);
            keep_backups.insert(parent_uuid, (info, meta));
            queue.push_back(parent_uuid);
        } else {
            warnings.push(format!(
                "backup chain is broken: uuid {child_uuid} has parent {parent_uuid} which is missing"
            ));
        }
    }

    debug_assert!(keep_snapshots.values().all(|(_, meta)| meta.is_kept()));
    debug_assert!(keep_backups.values().all(|(_, meta)| meta.is_kept()));

    ResolveResult { keep_snapshots, keep_backups, warnings }
}
