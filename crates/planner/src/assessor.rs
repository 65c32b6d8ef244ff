//! Coordinates the resolver across `(Source, SnapshotStore, Remote, RetentionPolicy)` tuples and
//! produces an [`Assessment`].

use crate::error::PlannerError;
use crate::naming::proposed_snapshot_name;
use crate::traits::{ObjectStore, SnapshotStore};
use coldsnap_common::{
    decode_backup_key, encode_backup_key, resolve, BackupInfo, KeepFlags, KeepMeta, RetentionPolicy, SnapshotInfo,
    Uuid16,
};
use std::collections::HashMap;
use std::path::PathBuf;

/// Binds one source subvolume to its local snapshot store, one remote, and the retention policy
/// governing backups uploaded from this source to that remote.
pub struct ConfigTuple<'a> {
    pub source_name: String,
    pub source_path: PathBuf,
    /// uuid of the live source subvolume (its `SnapshotInfo`-like identity).
    pub source_uuid: Uuid16,
    /// The source's current generation counter, used to decide whether a fresh snapshot is due.
    pub source_ctransid: u64,
    pub store: &'a dyn SnapshotStore,
    pub remote: &'a dyn ObjectStore,
    pub remote_name: String,
    pub policy: RetentionPolicy,
}

#[derive(Debug, Clone)]
pub struct AssessedSnapshot {
    pub source_name: String,
    /// Identifies which `SnapshotStore` this snapshot lives in, for dispatch at execution time.
    /// Equal to `source_name`: validation currently enforces one snapshot directory per source.
    pub store_id: String,
    pub info: SnapshotInfo,
    pub path: PathBuf,
    pub meta: KeepMeta,
}

#[derive(Debug, Clone)]
pub struct AssessedBackup {
    pub source_name: String,
    pub remote_name: String,
    /// The full object key (basename + suffixes) this backup is, or will be, stored at.
    pub key: String,
    pub info: BackupInfo,
    pub meta: KeepMeta,
}

/// Two maps describing the target state of a pass: every snapshot and backup seen, each
/// annotated with why (if at all) it should be kept.
#[derive(Debug, Clone, Default)]
pub struct Assessment {
    pub snapshots: HashMap<Uuid16, AssessedSnapshot>,
    pub backups: HashMap<(String, Uuid16), AssessedBackup>,
    /// Chain-broken warnings surfaced by the resolver.
    pub warnings: Vec<String>,
}

fn mk_backup(s: &SnapshotInfo, send_parent: Option<Uuid16>) -> BackupInfo {
    BackupInfo { uuid: s.uuid, parent_uuid: s.parent_uuid, send_parent_uuid: send_parent, ctransid: s.ctransid, ctime: s.ctime }
}

/// Runs one assessment pass over every tuple.
pub fn assess(tuples: &[ConfigTuple<'_>]) -> Result<Assessment, PlannerError> {
    let mut assessment = Assessment::default();

    for tuple in tuples {
        let mut snapshots: Vec<SnapshotInfo> = tuple
            .store
            .list()?
            .into_iter()
            .filter(|s| s.readonly && s.parent_uuid == tuple.source_uuid)
            .collect();

        let mut proposed_uuid = None;
        if !snapshots.iter().any(|s| s.ctransid >= tuple.source_ctransid) {
            let transient = proposed_snapshot_name(&tuple.source_name, std::process::id());
            tracing::info!(source = %tuple.source_name, name = %transient, "proposing new snapshot");
            let proposed = tuple.store.create_snapshot(&tuple.source_path, &transient)?;
            proposed_uuid = Some(proposed.uuid);
            snapshots.push(proposed);
        }

        for s in &snapshots {
            assessment.snapshots.entry(s.uuid).or_insert_with(|| AssessedSnapshot {
                source_name: tuple.source_name.clone(),
                store_id: tuple.source_name.clone(),
                info: s.clone(),
                path: tuple.store.path_of(s.id),
                meta: KeepMeta::default(),
            });
        }

        let backups: Vec<BackupInfo> = tuple
            .remote
            .list()?
            .into_iter()
            .filter_map(|key| match decode_backup_key(&key) {
                Ok(info) => Some((key, info)),
                Err(_) => None, // not a backup key: skipped silently
            })
            .filter(|(_, info)| info.parent_uuid == tuple.source_uuid)
            .map(|(key, info)| {
                assessment.backups.entry((tuple.remote_name.clone(), info.uuid)).or_insert_with(|| AssessedBackup {
                    source_name: tuple.source_name.clone(),
                    remote_name: tuple.remote_name.clone(),
                    key,
                    info: info.clone(),
                    meta: KeepMeta::default(),
                });
                info
            })
            .collect();

        let result = resolve(&snapshots, &backups, &tuple.policy, &mk_backup);

        for warning in result.warnings {
            tracing::warn!(source = %tuple.source_name, remote = %tuple.remote_name, "{warning}");
            assessment.warnings.push(warning);
        }

        for (uuid, (_, meta)) in result.keep_snapshots {
            if let Some(existing) = assessment.snapshots.get_mut(&uuid) {
                existing.meta.merge(&meta);
            }
        }

        // A snapshot created moments ago by this same pass is always flagged `New`, regardless
        // of whether the resolver ends up keeping it, so `destroy_proposed` can find it.
        if let Some(uuid) = proposed_uuid {
            if let Some(existing) = assessment.snapshots.get_mut(&uuid) {
                existing.meta.merge(&KeepMeta::default().with_flag(KeepFlags::NEW));
            }
        }

        for (uuid, (info, meta)) in result.keep_backups {
            let map_key = (tuple.remote_name.clone(), uuid);
            if let Some(existing) = assessment.backups.get_mut(&map_key) {
                existing.meta.merge(&meta);
            } else {
                let key = format!("{}{}", tuple.source_name, encode_backup_key(&info, tuple.policy.time_zone()));
                assessment.backups.insert(
                    map_key,
                    AssessedBackup { source_name: tuple.source_name.clone(), remote_name: tuple.remote_name.clone(), key, info, meta },
                );
            }
        }
    }

    Ok(assessment)
}

/// Destroys every snapshot proposed during this pass (`KeepFlags::NEW`), restoring the
/// filesystem to its pre-pass state. Used when a pass is aborted before actions are executed, or
/// interactively declined.
pub fn destroy_proposed(tuples: &[ConfigTuple<'_>], assessment: &Assessment) -> Result<(), PlannerError> {
    for tuple in tuples {
        for snapshot in assessment.snapshots.values() {
            if snapshot.source_name == tuple.source_name && snapshot.meta.flags.contains(KeepFlags::NEW) {
                tracing::info!(id = snapshot.info.id, "destroying proposed snapshot");
                tuple.store.destroy_snapshot(snapshot.info.id)?;
            }
        }
    }
    Ok(())
}
