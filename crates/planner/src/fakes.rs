//! In-memory fakes for the three capability traits, used by this crate's own tests and available
//! to downstream crates under the `fakes` feature.

use crate::error::PlannerError;
use crate::traits::{ByteFilterPipeline, ObjectStore, SnapshotStore};
use coldsnap_common::{SnapshotInfo, Uuid16};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

struct Inner {
    snapshots: Vec<SnapshotInfo>,
    names: HashMap<u64, String>,
    source_uuids: HashMap<PathBuf, Uuid16>,
}

/// An in-memory `SnapshotStore`. `send` writes a small, deterministic byte pattern identifying
/// the snapshot and its parent rather than real filesystem content.
pub struct FakeSnapshotStore {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

impl Default for FakeSnapshotStore {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner { snapshots: Vec::new(), names: HashMap::new(), source_uuids: HashMap::new() }),
            next_id: AtomicU64::new(1),
        }
    }
}

impl FakeSnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with a pre-existing snapshot (e.g. to set up a scenario).
    pub fn seed(&self, info: SnapshotInfo, name: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap();
        inner.names.insert(info.id, name.into());
        inner.snapshots.push(info);
        self.next_id.fetch_max(inner.snapshots.iter().map(|s| s.id).max().unwrap_or(0) + 1, Ordering::SeqCst);
    }

    pub fn name_of(&self, id: u64) -> Option<String> {
        self.inner.lock().unwrap().names.get(&id).cloned()
    }

    /// Registers the subvolume uuid that `create_snapshot(path, ..)` should stamp as
    /// `parent_uuid` on any snapshot it creates of `path`, standing in for the real ioctl reading
    /// the live subvolume's own uuid. Must be called before `create_snapshot` for `path`.
    pub fn register_source(&self, path: impl Into<PathBuf>, uuid: Uuid16) {
        self.inner.lock().unwrap().source_uuids.insert(path.into(), uuid);
    }
}

impl SnapshotStore for FakeSnapshotStore {
    fn list(&self) -> Result<Vec<SnapshotInfo>, PlannerError> {
        Ok(self.inner.lock().unwrap().snapshots.clone())
    }

    fn create_snapshot(&self, source_path: &Path, transient_name: &str) -> Result<SnapshotInfo, PlannerError> {
        let mut inner = self.inner.lock().unwrap();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let ctransid = inner.snapshots.iter().map(|s| s.ctransid).max().unwrap_or(0) + 1;
        let ctime = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64;
        let parent_uuid = inner.source_uuids.get(source_path).copied().unwrap_or_else(Uuid16::new_random);
        let info = SnapshotInfo {
            id,
            uuid: Uuid16::new_random(),
            parent_uuid,
            ctransid,
            ctime,
            readonly: true,
        };
        inner.names.insert(id, transient_name.to_owned());
        inner.snapshots.push(info.clone());
        Ok(info)
    }

    fn destroy_snapshot(&self, id: u64) -> Result<(), PlannerError> {
        let mut inner = self.inner.lock().unwrap();
        inner.snapshots.retain(|s| s.id != id);
        inner.names.remove(&id);
        Ok(())
    }

    fn rename_snapshot(&self, id: u64, target_name: &str) -> Result<(), PlannerError> {
        self.inner.lock().unwrap().names.insert(id, target_name.to_owned());
        Ok(())
    }

    fn send(&self, id: u64, parent_id: Option<u64>, writer: &mut dyn Write) -> Result<(), PlannerError> {
        let exists = self.inner.lock().unwrap().snapshots.iter().any(|s| s.id == id);
        if !exists {
            return Err(PlannerError::ConcurrentMutation { id });
        }
        writer.write_all(format!("snapshot-{id}-parent-{parent_id:?}").as_bytes())?;
        Ok(())
    }

    fn path_of(&self, id: u64) -> PathBuf {
        match self.inner.lock().unwrap().names.get(&id) {
            Some(name) => PathBuf::from(format!("/fake/store/{name}")),
            None => PathBuf::from(format!("/fake/store/<unknown-{id}>")),
        }
    }
}

/// An in-memory `ObjectStore`.
#[derive(Default)]
pub struct FakeObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.objects.lock().unwrap().insert(key.into(), bytes.into());
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }
}

impl ObjectStore for FakeObjectStore {
    fn list(&self) -> Result<Vec<String>, PlannerError> {
        Ok(self.objects.lock().unwrap().keys().cloned().collect())
    }

    fn put_stream(&self, key: &str, reader: &mut dyn Read) -> Result<(), PlannerError> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        self.objects.lock().unwrap().insert(key.to_owned(), buf);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), PlannerError> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Passes bytes straight through, the same as [`crate::executor::IdentityPipeline`] but defined
/// here so tests don't need to depend on the executor module.
#[derive(Default)]
pub struct FakeIdentityPipeline;

impl ByteFilterPipeline for FakeIdentityPipeline {
    fn spawn(&self) -> Result<(Box<dyn Write + Send>, Box<dyn Read + Send>), PlannerError> {
        let (reader, writer) = os_pipe::pipe()?;
        Ok((Box::new(writer), Box::new(reader)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::compile;
    use crate::assessor::{assess, ConfigTuple};
    use crate::executor::Executor;
    use coldsnap_common::{RetentionParams, RetentionPolicy};
    use jiff::tz::TimeZone;
    use std::path::PathBuf;

    // No snapshots, empty remote, single source. Expect one new snapshot, one rename,
    // one full upload; a second pass is then a no-op.
    #[test]
    fn scenario_no_snapshots_empty_remote_creates_and_uploads_full_backup() {
        let store = FakeSnapshotStore::new();
        let remote = FakeObjectStore::new();
        let source_uuid = Uuid16::new_random();
        let source_path = PathBuf::from("/src/myvol");
        let policy = RetentionPolicy::new(RetentionParams { years: 1, ..Default::default() }, 1_167_609_600, TimeZone::UTC);

        // `create_snapshot` has no real subvolume to read a parent uuid from; register the
        // mapping up front, the same way the real btrfs adapter gets it straight from the ioctl.
        store.register_source(source_path.clone(), source_uuid);

        let tuple = ConfigTuple {
            source_name: "myvol".into(),
            source_path,
            source_uuid,
            // The fake store assigns the first snapshot it ever creates ctransid 1; matching that
            // here means a settled second pass sees an up-to-date snapshot and proposes nothing.
            source_ctransid: 1,
            store: &store,
            remote: &remote,
            remote_name: "r1".into(),
            policy,
        };

        let assessment = assess(std::slice::from_ref(&tuple)).unwrap();
        assert_eq!(assessment.snapshots.len(), 1);

        let actions = compile(&assessment, &TimeZone::UTC);
        assert_eq!(actions.rename_snapshots.len(), 1);
        assert_eq!(actions.upload_backups.len(), 1);
        assert!(actions.destroy_snapshots.is_empty());
        assert!(actions.delete_backups.is_empty());

        let mut stores: HashMap<String, &dyn SnapshotStore> = HashMap::new();
        stores.insert("myvol".into(), &store);
        let mut remotes: HashMap<String, &dyn ObjectStore> = HashMap::new();
        remotes.insert("r1".into(), &remote);
        let executor = Executor { stores, remotes, pipelines: HashMap::new() };
        executor.execute(&actions).unwrap();

        assert_eq!(remote.list().unwrap().len(), 1);
        let key = &actions.upload_backups[0].key;
        assert!(key.contains(".full"));
        assert!(remote.contains(key));

        // Second pass: the filesystem and remote are now settled, so assessing and compiling
        // again must produce an empty plan (spec.md scenario 1, idempotence of passes).
        let second_assessment = assess(std::slice::from_ref(&tuple)).unwrap();
        let second_actions = compile(&second_assessment, &TimeZone::UTC);
        assert!(second_actions.is_empty(), "a settled repo must produce an empty plan on the next pass");
    }

    #[test]
    fn scenario_delete_stale_backup_removes_only_the_orphan() {
        let store = FakeSnapshotStore::new();
        let remote = FakeObjectStore::new();
        let source_uuid = Uuid16::new_random();
        let kept_uuid = Uuid16::new_random();

        store.seed(
            SnapshotInfo { id: 1, uuid: kept_uuid, parent_uuid: source_uuid, ctransid: 1, ctime: 1_167_609_600, readonly: true },
            "myvol.existing",
        );
        let kept_key = format!(
            "myvol{}",
            coldsnap_common::encode_backup_key(
                &coldsnap_common::BackupInfo { uuid: kept_uuid, parent_uuid: source_uuid, send_parent_uuid: None, ctransid: 1, ctime: 1_167_609_600 },
                &TimeZone::UTC
            )
        );
        remote.seed(kept_key.clone(), b"data".to_vec());

        let orphan_uuid = Uuid16::new_random();
        let orphan_key = format!(
            "myvol{}",
            coldsnap_common::encode_backup_key(
                &coldsnap_common::BackupInfo { uuid: orphan_uuid, parent_uuid: source_uuid, send_parent_uuid: None, ctransid: 99, ctime: 1_000_000_000 },
                &TimeZone::UTC
            )
        );
        remote.seed(orphan_key.clone(), b"stale".to_vec());

        let policy = RetentionPolicy::new(RetentionParams::default(), 1_167_609_600, TimeZone::UTC);
        let tuple = ConfigTuple {
            source_name: "myvol".into(),
            source_path: PathBuf::from("/src/myvol"),
            source_uuid,
            source_ctransid: 1,
            store: &store,
            remote: &remote,
            remote_name: "r1".into(),
            policy,
        };

        let assessment = assess(std::slice::from_ref(&tuple)).unwrap();
        let actions = compile(&assessment, &TimeZone::UTC);
        assert_eq!(actions.delete_backups.len(), 1);
        assert_eq!(actions.delete_backups[0].key, orphan_key);

        let mut stores: HashMap<String, &dyn SnapshotStore> = HashMap::new();
        stores.insert("myvol".into(), &store);
        let mut remotes: HashMap<String, &dyn ObjectStore> = HashMap::new();
        remotes.insert("r1".into(), &remote);
        let executor = Executor { stores, remotes, pipelines: HashMap::new() };
        executor.execute(&actions).unwrap();

        assert!(!remote.contains(&orphan_key));
        assert!(remote.contains(&kept_key));
    }
}
