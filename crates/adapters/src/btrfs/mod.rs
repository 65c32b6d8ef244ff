//! Local btrfs snapshot management: raw ioctls plus the `SnapshotStore` built on top of them.

mod ioctl;
mod store;

pub use store::{source_identity, BtrfsSnapshotStore};
