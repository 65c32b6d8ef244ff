//! Production `SnapshotStore`: a directory of btrfs snapshots, backed by the ioctls in
//! [`super::ioctl`].

use std::collections::HashMap;
use std::io::Write;
use std::os::fd::{AsFd, OwnedFd};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rustix::fs::{Mode, OFlags};

use coldsnap_common::{SnapshotInfo, Uuid16};
use coldsnap_planner::{PlannerError, SnapshotStore};

use super::ioctl;
use crate::error::AdapterError;

fn open_dir(dir: impl AsFd, path: impl AsRef<Path>) -> std::io::Result<OwnedFd> {
    rustix::fs::openat(dir, path.as_ref(), OFlags::DIRECTORY | OFlags::RDONLY | OFlags::CLOEXEC, Mode::empty())
        .map_err(std::io::Error::from)
}

/// A local directory on a btrfs filesystem holding read-only snapshots of one source subvolume.
pub struct BtrfsSnapshotStore {
    dir_path: PathBuf,
    dir_fd: OwnedFd,
    /// `id -> directory entry name`, populated by [`Self::list`] and kept current by
    /// create/rename/destroy so later actions in the same pass can look up a name by id without
    /// re-walking the directory.
    names: Mutex<HashMap<u64, String>>,
}

impl BtrfsSnapshotStore {
    /// Opens `dir_path`, failing closed if it isn't on btrfs or isn't itself a subvolume boundary.
    pub fn open(dir_path: impl Into<PathBuf>) -> Result<Self, AdapterError> {
        let dir_path = dir_path.into();
        let dir_fd = open_dir(rustix::fs::CWD, &dir_path)
            .map_err(|_| AdapterError::NotBtrfs { path: dir_path.display().to_string() })?;
        ioctl::subvol_getflags(&dir_fd)
            .map_err(|_| AdapterError::NotASubvolume { path: dir_path.display().to_string() })?;
        Ok(Self { dir_path, dir_fd, names: Mutex::new(HashMap::new()) })
    }

    fn entry_fd(&self, name: &str) -> Result<OwnedFd, AdapterError> {
        open_dir(&self.dir_fd, name).map_err(AdapterError::Io)
    }

    fn name_of(&self, id: u64) -> Result<String, AdapterError> {
        self.names
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| AdapterError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, format!("no cached entry for snapshot id {id}"))))
    }
}

impl SnapshotStore for BtrfsSnapshotStore {
    fn list(&self) -> Result<Vec<SnapshotInfo>, PlannerError> {
        let mut infos = Vec::new();
        let mut names = self.names.lock().unwrap();
        names.clear();
        for entry in rustix::fs::Dir::read_from(&self.dir_fd).map_err(std::io::Error::from).map_err(AdapterError::Io)? {
            let entry = entry.map_err(std::io::Error::from).map_err(AdapterError::Io)?;
            let file_name = entry.file_name();
            if !entry.file_type().is_dir() || [&b"."[..], b".."].contains(&file_name.to_bytes()) {
                continue;
            }
            let Ok(name) = std::str::from_utf8(file_name.to_bytes()) else { continue };
            let Ok(fd) = self.entry_fd(name) else { continue };
            let Ok(subvol) = ioctl::get_subvol_info(&fd) else { continue };
            // Only read-only snapshots descended from a tracked source are of interest to the
            // planner.
            if !subvol.is_readonly() || !subvol.has_parent_uuid() {
                continue;
            }
            names.insert(subvol.id, name.to_owned());
            infos.push(SnapshotInfo {
                id: subvol.id,
                uuid: subvol.uuid,
                parent_uuid: subvol.parent_uuid,
                ctransid: subvol.generation,
                ctime: subvol.ctime_sec,
                readonly: subvol.is_readonly(),
            });
        }
        Ok(infos)
    }

    fn create_snapshot(&self, source_path: &Path, transient_name: &str) -> Result<SnapshotInfo, PlannerError> {
        let source_fd = open_dir(rustix::fs::CWD, source_path).map_err(AdapterError::Io)?;
        ioctl::snap_create_v2(&self.dir_fd, transient_name, &source_fd, true)
            .map_err(|source| AdapterError::Ioctl { op: "SNAP_CREATE_V2", path: source_path.display().to_string(), source })?;
        let snap_fd = self.entry_fd(transient_name)?;
        let subvol = ioctl::get_subvol_info(&snap_fd)
            .map_err(|source| AdapterError::Ioctl { op: "GET_SUBVOL_INFO", path: transient_name.to_owned(), source })?;
        self.names.lock().unwrap().insert(subvol.id, transient_name.to_owned());
        Ok(SnapshotInfo {
            id: subvol.id,
            uuid: subvol.uuid,
            parent_uuid: subvol.parent_uuid,
            ctransid: subvol.generation,
            ctime: subvol.ctime_sec,
            readonly: subvol.is_readonly(),
        })
    }

    fn destroy_snapshot(&self, id: u64) -> Result<(), PlannerError> {
        let name = self.name_of(id)?;
        // Re-verify read-only + parent-uuid right before destroying: the safety gate must
        // hold at the moment of the side effect, not just at list time.
        let fd = self.entry_fd(&name)?;
        let subvol = ioctl::get_subvol_info(&fd)
            .map_err(|source| AdapterError::Ioctl { op: "GET_SUBVOL_INFO", path: name.clone(), source })?;
        if !subvol.is_readonly() || !subvol.has_parent_uuid() {
            return Err(AdapterError::NotASubvolume { path: name }.into());
        }
        drop(fd);
        ioctl::snap_destroy_v2(&self.dir_fd, &name)
            .map_err(|source| AdapterError::Ioctl { op: "SNAP_DESTROY_V2", path: name.clone(), source })?;
        self.names.lock().unwrap().remove(&id);
        Ok(())
    }

    fn rename_snapshot(&self, id: u64, target_name: &str) -> Result<(), PlannerError> {
        let name = self.name_of(id)?;
        if name == target_name {
            return Ok(());
        }
        rustix::fs::renameat(&self.dir_fd, &name, &self.dir_fd, target_name)
            .map_err(|source| AdapterError::Ioctl { op: "RENAME", path: name.clone(), source })?;
        self.names.lock().unwrap().insert(id, target_name.to_owned());
        Ok(())
    }

    fn send(&self, id: u64, parent_id: Option<u64>, writer: &mut dyn Write) -> Result<(), PlannerError> {
        let name = self.name_of(id)?;
        let snap_fd = self.entry_fd(&name)?;

        // Re-check identity: the id enumerated earlier in this pass must still refer to the same
        // snapshot.
        let live = ioctl::get_subvol_info(&snap_fd)
            .map_err(|source| AdapterError::Ioctl { op: "GET_SUBVOL_INFO", path: name.clone(), source })?;
        if live.id != id {
            return Err(PlannerError::ConcurrentMutation { id });
        }

        let parent_name = parent_id.map(|pid| self.name_of(pid)).transpose()?;
        let parent_fd = parent_name.as_deref().map(|n| self.entry_fd(n)).transpose()?;

        let (mut pipe_reader, pipe_writer) = os_pipe::pipe().map_err(AdapterError::Io)?;
        let send_result = std::thread::scope(|scope| {
            let handle = scope.spawn(|| {
                let result = ioctl::send(&snap_fd, parent_fd.as_ref().map(|fd| fd.as_fd()), pipe_writer.as_fd());
                drop(pipe_writer);
                result
            });
            let copy_result = std::io::copy(&mut pipe_reader, writer);
            let ioctl_result = handle.join().unwrap_or(Err(rustix::io::Errno::IO));
            (copy_result, ioctl_result)
        });
        let (copy_result, ioctl_result) = send_result;
        ioctl_result.map_err(|source| AdapterError::Ioctl { op: "SEND", path: name, source })?;
        copy_result.map_err(AdapterError::Io)?;
        Ok(())
    }

    fn path_of(&self, id: u64) -> PathBuf {
        match self.name_of(id) {
            Ok(name) => self.dir_path.join(name),
            Err(_) => self.dir_path.join(format!("<unknown-{id}>")),
        }
    }
}

/// `uuid`/`ctransid` of the live source subvolume, needed by the assessor to decide whether a
/// fresh snapshot is due.
pub fn source_identity(source_path: &Path) -> Result<(Uuid16, u64), AdapterError> {
    let fd = open_dir(rustix::fs::CWD, source_path).map_err(AdapterError::Io)?;
    let subvol = ioctl::get_subvol_info(&fd)
        .map_err(|source| AdapterError::Ioctl { op: "GET_SUBVOL_INFO", path: source_path.display().to_string(), source })?;
    Ok((subvol.uuid, subvol.generation))
}
