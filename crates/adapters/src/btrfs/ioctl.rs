//! Raw btrfs ioctl bindings, in the style of `oxalica-simple-snap`'s `ioctl.rs`, extended with
//! two ioctls that reference doesn't need: subvolume info lookup (uuid/parent_uuid/ctransid)
//! and incremental send.

use std::ffi::OsStr;
use std::mem;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::os::unix::ffi::OsStrExt;

use linux_raw_sys::{btrfs, ioctl};
use rustix::io::{Errno, Result};
use rustix::ioctl::{ioctl as do_ioctl, Getter, Setter};

use coldsnap_common::Uuid16;

fn copy_os_str<const N: usize>(src: &OsStr, dst: &mut [std::ffi::c_char; N]) -> Result<()> {
    if src.as_bytes().contains(&0) || src.len() >= dst.len() {
        return Err(Errno::INVAL);
    }
    for (&b, out) in src.as_bytes().iter().zip(dst) {
        *out = b as _;
    }
    Ok(())
}

/// BTRFS_IOC_SNAP_CREATE_V2. Creates a read-only (if requested) snapshot of `src_subvol_fd`
/// named `name` inside `parent_dir_fd`.
pub fn snap_create_v2<F: AsFd, G: AsFd, S: AsRef<OsStr>>(
    parent_dir_fd: F,
    name: S,
    src_subvol_fd: G,
    readonly: bool,
) -> Result<()> {
    // SAFETY: zero is a valid value for `btrfs_ioctl_vol_args_v2`.
    let mut args = unsafe { mem::zeroed::<btrfs::btrfs_ioctl_vol_args_v2>() };
    args.fd = src_subvol_fd.as_fd().as_raw_fd().into();
    if readonly {
        args.flags = btrfs::BTRFS_SUBVOL_RDONLY.into();
    }
    // SAFETY: zero is an initialized value for the union.
    copy_os_str(name.as_ref(), unsafe { &mut args.__bindgen_anon_2.name })?;
    // SAFETY: see <https://btrfs.readthedocs.io/en/latest/btrfs-ioctl.html#btrfs-ioc-snap-create-v2>
    unsafe {
        do_ioctl(parent_dir_fd, <Setter<{ ioctl::BTRFS_IOC_SNAP_CREATE_V2 }, _>>::new(args))?;
    }
    Ok(())
}

/// BTRFS_IOC_SNAP_DESTROY_V2. Destroys the subvolume named `name` inside `parent_dir_fd`.
pub fn snap_destroy_v2<F: AsFd, S: AsRef<OsStr>>(parent_dir_fd: F, name: S) -> Result<()> {
    // SAFETY: zero is a valid value for `btrfs_ioctl_vol_args_v2`.
    let mut args = unsafe { mem::zeroed::<btrfs::btrfs_ioctl_vol_args_v2>() };
    args.flags = 0;
    // SAFETY: zero is an initialized value for the union.
    copy_os_str(name.as_ref(), unsafe { &mut args.__bindgen_anon_2.name })?;
    unsafe {
        do_ioctl(parent_dir_fd, <Setter<{ ioctl::BTRFS_IOC_SNAP_DESTROY_V2 }, _>>::new(args))?;
    }
    Ok(())
}

/// BTRFS_IOC_SUBVOL_GETFLAGS. Errors if `fd` is not a btrfs subvolume at all.
pub fn subvol_getflags<F: AsFd>(fd: F) -> Result<u64> {
    unsafe { do_ioctl(fd, <Getter<{ ioctl::BTRFS_IOC_SUBVOL_GETFLAGS }, u64>>::new()) }
}

/// The fields of `btrfs_ioctl_get_subvol_info_args` this crate cares about, decoupled from the
/// raw struct so callers never see padding/reserved fields.
#[derive(Debug, Clone, Copy)]
pub struct SubvolInfo {
    pub id: u64,
    pub uuid: Uuid16,
    pub parent_uuid: Uuid16,
    pub generation: u64,
    pub flags: u64,
    pub ctime_sec: i64,
}

impl SubvolInfo {
    pub fn is_readonly(&self) -> bool {
        self.flags & u64::from(btrfs::BTRFS_SUBVOL_RDONLY) != 0
    }

    pub fn has_parent_uuid(&self) -> bool {
        !self.parent_uuid.is_nil()
    }
}

/// BTRFS_IOC_GET_SUBVOL_INFO. Looks up identity metadata (uuid, parent uuid, generation/ctransid,
/// flags, creation time) for the subvolume open at `fd`.
pub fn get_subvol_info<F: AsFd>(fd: F) -> Result<SubvolInfo> {
    // SAFETY: see <https://btrfs.readthedocs.io/en/latest/btrfs-ioctl.html#btrfs-ioc-get-subvol-info>
    let args = unsafe {
        do_ioctl(
            fd,
            <Getter<{ ioctl::BTRFS_IOC_GET_SUBVOL_INFO }, btrfs::btrfs_ioctl_get_subvol_info_args>>::new(),
        )?
    };
    Ok(SubvolInfo {
        id: args.treeid,
        uuid: Uuid16::from_bytes(args.uuid),
        parent_uuid: Uuid16::from_bytes(args.parent_uuid),
        generation: args.generation,
        flags: args.flags,
        ctime_sec: args.ctime.sec,
    })
}

/// BTRFS_IOC_SEND. Streams a send of `subvol_fd` (incremental against `parent_fd` when given)
/// into `send_pipe_write_fd`. Blocks until the kernel has written the whole stream or failed.
pub fn send<F: AsFd>(
    subvol_fd: F,
    parent_fd: Option<BorrowedFd<'_>>,
    send_pipe_write_fd: BorrowedFd<'_>,
) -> Result<()> {
    // SAFETY: zero is a valid value for `btrfs_ioctl_send_args`.
    let mut args = unsafe { mem::zeroed::<btrfs::btrfs_ioctl_send_args>() };
    args.send_fd = send_pipe_write_fd.as_raw_fd().into();
    args.clone_sources_count = 0;
    args.clone_sources = std::ptr::null_mut();
    args.parent_root = match parent_fd {
        Some(parent) => get_subvol_info(parent)?.id,
        None => 0,
    };
    // SAFETY: see <https://btrfs.readthedocs.io/en/latest/btrfs-ioctl.html#btrfs-ioc-send>
    unsafe {
        do_ioctl(subvol_fd, <Setter<{ ioctl::BTRFS_IOC_SEND }, _>>::new(args))?;
    }
    Ok(())
}
