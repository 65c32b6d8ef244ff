//! Translates an [`Assessment`] into an ordered [`Actions`] plan.

use crate::assessor::Assessment;
use crate::naming::canonical_snapshot_name;
use coldsnap_common::Uuid16;
use jiff::tz::TimeZone;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct RenameSnapshot {
    pub store_id: String,
    pub store_path: PathBuf,
    pub snapshot_id: u64,
    pub target_name: String,
}

#[derive(Debug, Clone)]
pub struct UploadBackup {
    pub store_id: String,
    pub store_path: PathBuf,
    pub remote_name: String,
    pub key: String,
    pub snapshot_id: u64,
    pub send_parent_id: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct DestroySnapshot {
    pub store_id: String,
    pub store_path: PathBuf,
    pub snapshot_id: u64,
}

#[derive(Debug, Clone)]
pub struct DeleteBackup {
    pub remote_name: String,
    pub key: String,
}

/// The four ordered action vectors. Execution order is fixed: rename, then upload, then destroy,
/// then delete.
#[derive(Debug, Clone, Default)]
pub struct Actions {
    pub rename_snapshots: Vec<RenameSnapshot>,
    pub upload_backups: Vec<UploadBackup>,
    pub destroy_snapshots: Vec<DestroySnapshot>,
    pub delete_backups: Vec<DeleteBackup>,
}

impl Actions {
    pub fn is_empty(&self) -> bool {
        self.rename_snapshots.is_empty()
            && self.upload_backups.is_empty()
            && self.destroy_snapshots.is_empty()
            && self.delete_backups.is_empty()
    }
}

fn snapshot_id_for(assessment: &Assessment, uuid: Uuid16) -> Option<u64> {
    assessment.snapshots.get(&uuid).map(|s| s.info.id)
}

/// Compiles an [`Actions`] plan from an [`Assessment`].
pub fn compile(assessment: &Assessment, tz: &TimeZone) -> Actions {
    let mut actions = Actions::default();

    for snapshot in assessment.snapshots.values() {
        if snapshot.meta.is_kept() {
            let canonical = canonical_snapshot_name(&snapshot.source_name, &snapshot.info, tz);
            let current_name = snapshot.path.file_name().and_then(|n| n.to_str());
            if current_name != Some(canonical.as_str()) {
                actions.rename_snapshots.push(RenameSnapshot {
                    store_id: snapshot.store_id.clone(),
                    store_path: snapshot.path.clone(),
                    snapshot_id: snapshot.info.id,
                    target_name: canonical,
                });
            }
        } else {
            actions.destroy_snapshots.push(DestroySnapshot {
                store_id: snapshot.store_id.clone(),
                store_path: snapshot.path.clone(),
                snapshot_id: snapshot.info.id,
            });
        }
    }

    for backup in assessment.backups.values() {
        if backup.meta.is_kept() {
            if backup.meta.flags.contains(coldsnap_common::KeepFlags::NEW) {
                let Some(snapshot_id) = snapshot_id_for(assessment, backup.info.uuid) else {
                    // Invariant violation: a newly-kept backup always has a live local snapshot
                    // (it was either just created or is the resolver's chosen send-parent).
                    // Skip it defensively rather than emit an action that will fail at execution.
                    tracing::error!(uuid = %backup.info.uuid, "no local snapshot for a new backup; skipping upload");
                    continue;
                };
                let send_parent_id = backup.info.send_parent_uuid.and_then(|p| snapshot_id_for(assessment, p));
                let owner = assessment.snapshots.get(&backup.info.uuid);
                let store_path = owner.map(|s| s.path.clone()).unwrap_or_default();
                let store_id = owner.map(|s| s.store_id.clone()).unwrap_or_default();
                actions.upload_backups.push(UploadBackup {
                    store_id,
                    store_path,
                    remote_name: backup.remote_name.clone(),
                    key: backup.key.clone(),
                    snapshot_id,
                    send_parent_id,
                });
            }
        } else {
            actions.delete_backups.push(DeleteBackup { remote_name: backup.remote_name.clone(), key: backup.key.clone() });
        }
    }

    actions.rename_snapshots.sort_by(|a, b| a.store_path.cmp(&b.store_path).then(a.snapshot_id.cmp(&b.snapshot_id)));
    actions.upload_backups.sort_by(|a, b| a.store_path.cmp(&b.store_path).then(a.snapshot_id.cmp(&b.snapshot_id)));
    actions.destroy_snapshots.sort_by(|a, b| a.store_path.cmp(&b.store_path).then(a.snapshot_id.cmp(&b.snapshot_id)));
    actions.delete_backups.sort_by(|a, b| a.remote_name.cmp(&b.remote_name).then(a.key.cmp(&b.key)));

    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessor::{AssessedBackup, AssessedSnapshot};
    use coldsnap_common::{BackupInfo, KeepFlags, KeepMeta, KeepReasons, SnapshotInfo};
    use std::path::PathBuf;

    fn snapshot(byte: u8, kept: bool, new: bool) -> AssessedSnapshot {
        let mut meta = KeepMeta::default();
        if kept {
            meta = meta.with_reason(KeepReasons::PRESERVED);
        }
        if new {
            meta = meta.with_flag(KeepFlags::NEW);
        }
        AssessedSnapshot {
            source_name: "myvol".into(),
            store_id: "myvol".into(),
            info: SnapshotInfo {
                id: u64::from(byte),
                uuid: Uuid16::from_bytes([byte; 16]),
                parent_uuid: Uuid16::from_bytes([0xaa; 16]),
                ctransid: u64::from(byte),
                ctime: 1_150_372_800,
                readonly: true,
            },
            path: PathBuf::from(format!("/snaps/{byte}")),
            meta,
        }
    }

    #[test]
    fn unkept_snapshot_is_destroyed_not_renamed() {
        let mut assessment = Assessment::default();
        let snap = snapshot(1, false, false);
        assessment.snapshots.insert(snap.info.uuid, snap);
        let actions = compile(&assessment, &TimeZone::UTC);
        assert_eq!(actions.destroy_snapshots.len(), 1);
        assert!(actions.rename_snapshots.is_empty());
    }

    #[test]
    fn kept_snapshot_is_renamed_to_canonical_name() {
        let mut assessment = Assessment::default();
        let snap = snapshot(2, true, false);
        assessment.snapshots.insert(snap.info.uuid, snap);
        let actions = compile(&assessment, &TimeZone::UTC);
        assert_eq!(actions.rename_snapshots.len(), 1);
        assert!(actions.rename_snapshots[0].target_name.starts_with("myvol."));
    }

    #[test]
    fn kept_snapshot_already_at_canonical_name_is_not_renamed_again() {
        let mut assessment = Assessment::default();
        let mut snap = snapshot(3, true, false);
        let canonical = canonical_snapshot_name(&snap.source_name, &snap.info, &TimeZone::UTC);
        snap.path = PathBuf::from(format!("/snaps/{canonical}"));
        assessment.snapshots.insert(snap.info.uuid, snap);
        let actions = compile(&assessment, &TimeZone::UTC);
        assert!(actions.rename_snapshots.is_empty(), "a settled pass must produce an empty plan");
    }

    #[test]
    fn new_backup_without_local_snapshot_produces_no_upload() {
        let mut assessment = Assessment::default();
        let info = BackupInfo {
            uuid: Uuid16::from_bytes([9; 16]),
            parent_uuid: Uuid16::from_bytes([0xaa; 16]),
            send_parent_uuid: None,
            ctransid: 9,
            ctime: 1_150_372_800,
        };
        let meta = KeepMeta::default().with_reason(KeepReasons::PRESERVED).with_flag(KeepFlags::NEW);
        assessment.backups.insert(
            ("r1".into(), info.uuid),
            AssessedBackup { source_name: "myvol".into(), remote_name: "r1".into(), key: "myvol.full".into(), info, meta },
        );
        let actions = compile(&assessment, &TimeZone::UTC);
        assert!(actions.upload_backups.is_empty());
    }

    #[test]
    fn unkept_backup_is_deleted() {
        let mut assessment = Assessment::default();
        let info = BackupInfo {
            uuid: Uuid16::from_bytes([5; 16]),
            parent_uuid: Uuid16::from_bytes([0xaa; 16]),
            send_parent_uuid: None,
            ctransid: 5,
            ctime: 1_150_372_800,
        };
        assessment.backups.insert(
            ("r1".into(), info.uuid),
            AssessedBackup { source_name: "myvol".into(), remote_name: "r1".into(), key: "myvol.orphan".into(), info, meta: KeepMeta::default() },
        );
        let actions = compile(&assessment, &TimeZone::UTC);
        assert_eq!(actions.delete_backups.len(), 1);
        assert_eq!(actions.delete_backups[0].key, "myvol.orphan");
    }
}
