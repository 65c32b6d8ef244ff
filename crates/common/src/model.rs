//! The data model shared by the index and resolver.

use crate::bucket::TimeBucket;
use crate::uuid16::Uuid16;
use bitflags::bitflags;
use std::collections::HashSet;

/// Anything the [`crate::index::Index`] can bucket: a uuid-identified item with a creation time
/// and a monotonic generation counter.
pub trait BucketItem {
    fn uuid(&self) -> Uuid16;
    fn ctime(&self) -> i64;
    fn ctransid(&self) -> u64;
}

/// Immutable metadata of a read-only snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SnapshotInfo {
    /// Object id within the snapshot store (btrfs subvolume id).
    pub id: u64,
    pub uuid: Uuid16,
    /// uuid of the source subvolume this snapshot was taken from. Snapshots without one (i.e.
    /// not descended from a tracked source) are filtered out before reaching the resolver.
    pub parent_uuid: Uuid16,
    pub ctransid: u64,
    /// Seconds since epoch, floored to an integer when this value was derived from the store.
    pub ctime: i64,
    /// Whether the snapshot store reports this subvolume as read-only. Only read-only snapshots
    /// are considered by the planner; this field exists so callers can assert the invariant
    /// rather than silently dropping snapshots.
    pub readonly: bool,
}

impl BucketItem for SnapshotInfo {
    fn uuid(&self) -> Uuid16 {
        self.uuid
    }
    fn ctime(&self) -> i64 {
        self.ctime
    }
    fn ctransid(&self) -> u64 {
        self.ctransid
    }
}

impl SnapshotInfo {
    /// Deterministic tie-break key used wherever "newer" needs a total order: `(ctransid, uuid)`
    /// orders snapshots deterministically.
    pub fn order_key(&self) -> (u64, Uuid16) {
        (self.ctransid, self.uuid)
    }
}

/// Immutable metadata describing a backup artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BackupInfo {
    /// Equal to the source snapshot's uuid.
    pub uuid: Uuid16,
    /// Equal to the source subvolume's uuid.
    pub parent_uuid: Uuid16,
    /// `None` means this is a full stream; `Some(parent)` means incremental against `parent`'s
    /// stream.
    pub send_parent_uuid: Option<Uuid16>,
    pub ctransid: u64,
    pub ctime: i64,
}

impl BucketItem for BackupInfo {
    fn uuid(&self) -> Uuid16 {
        self.uuid
    }
    fn ctime(&self) -> i64 {
        self.ctime
    }
    fn ctransid(&self) -> u64 {
        self.ctransid
    }
}

impl PartialOrd for BackupInfo {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordered by `(ctransid, uuid)`, matching [`SnapshotInfo::order_key`].
impl Ord for BackupInfo {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.ctransid, self.uuid).cmp(&(other.ctransid, other.uuid))
    }
}

bitflags! {
    /// Why an item is kept. A zero value means "not kept".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct KeepReasons: u8 {
        /// Nominal item for a currently-preserved bucket.
        const PRESERVED     = 1 << 0;
        /// The single most-recent snapshot (or its backup), regardless of policy.
        const MOST_RECENT   = 1 << 1;
        /// Kept transitively because a kept backup's incremental chain depends on it.
        const SEND_ANCESTOR = 1 << 2;
    }
}

bitflags! {
    /// Annotations describing how/why an item came to be kept, orthogonal to [`KeepReasons`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct KeepFlags: u8 {
        /// A new backup was synthesized this pass and needs uploading.
        const NEW               = 1 << 0;
        /// The nominal backup found in a bucket is newer than the nominal snapshot; a fresh
        /// backup of the snapshot was created instead of reusing it.
        const REPLACING_NEWER    = 1 << 1;
        /// A nominal backup exists for a bucket with no corresponding snapshot.
        const NO_SNAPSHOT        = 1 << 2;
        /// The nominal backup is older (smaller ctransid) than the nominal snapshot, but is kept
        /// as-is rather than replaced.
        const SNAPSHOT_IS_NEWER  = 1 << 3;
    }
}

/// Monoidal annotation attached to a kept snapshot or backup. The empty value
/// (`KeepReasons::empty()`) means "not kept"; combining two marks for the same uuid unions every
/// field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeepMeta {
    pub reasons: KeepReasons,
    pub flags: KeepFlags,
    pub time_buckets: HashSet<TimeBucket>,
    pub other_uuids: HashSet<Uuid16>,
}

impl KeepMeta {
    pub fn is_kept(&self) -> bool {
        !self.reasons.is_empty()
    }

    pub fn merge(&mut self, other: &KeepMeta) {
        self.reasons |= other.reasons;
        self.flags |= other.flags;
        self.time_buckets.extend(other.time_buckets.iter().copied());
        self.other_uuids.extend(other.other_uuids.iter().copied());
    }

    pub fn with_reason(mut self, reason: KeepReasons) -> Self {
        self.reasons |= reason;
        self
    }

    pub fn with_flag(mut self, flag: KeepFlags) -> Self {
        self.flags |= flag;
        self
    }

    pub fn with_bucket(mut self, bucket: TimeBucket) -> Self {
        self.time_buckets.insert(bucket);
        self
    }

    pub fn with_other_uuid(mut self, uuid: Uuid16) -> Self {
        self.other_uuids.insert(uuid);
        self
    }
}

impl std::ops::BitOr for KeepMeta {
    type Output = KeepMeta;
    fn bitor(mut self, rhs: KeepMeta) -> KeepMeta {
        self.merge(&rhs);
        self
    }
}

impl std::ops::BitOrAssign for KeepMeta {
    fn bitor_assign(&mut self, rhs: KeepMeta) {
        self.merge(&rhs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_meta_union_is_commutative_on_the_observable_fields() {
        let a = KeepMeta::default().with_reason(KeepReasons::PRESERVED).with_flag(KeepFlags::NEW);
        let b = KeepMeta::default().with_reason(KeepReasons::MOST_RECENT);
        let ab = a.clone() | b.clone();
        let ba = b | a;
        assert_eq!(ab.reasons, ba.reasons);
        assert_eq!(ab.flags, ba.flags);
    }

    #[test]
    fn empty_meta_is_not_kept() {
        assert!(!KeepMeta::default().is_kept());
        assert!(KeepMeta::default().with_reason(KeepReasons::PRESERVED).is_kept());
    }

    #[test]
    fn backup_info_orders_by_ctransid_then_uuid() {
        let mk = |ctransid: u64, byte: u8| BackupInfo {
            uuid: Uuid16::from_bytes([byte; 16]),
            parent_uuid: Uuid16::from_bytes([0; 16]),
            send_parent_uuid: None,
            ctransid,
            ctime: 0,
        };
        assert!(mk(1, 0xff) < mk(2, 0x00));
        assert!(mk(1, 0x01) < mk(1, 0x02));
    }
}
