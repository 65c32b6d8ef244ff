//! A per-parent, bucket-indexed view over a collection of items.

use crate::bucket::TimeBucket;
use crate::model::BucketItem;
use crate::retention::RetentionPolicy;
use crate::uuid16::Uuid16;
use std::collections::{HashMap, HashSet};

/// Indexes a collection of [`BucketItem`]s by uuid and by every `TimeBucket` they overlap under
/// a given [`RetentionPolicy`]'s enabled timeframes.
pub struct Index<Item> {
    by_uuid: HashMap<Uuid16, Item>,
    by_bucket: HashMap<TimeBucket, Vec<Uuid16>>,
}

impl<Item: BucketItem + Clone> Index<Item> {
    /// Builds the index, calling `policy.buckets_for(item.ctime())` for each item and appending
    /// the item to every resulting bucket's list.
    pub fn build(items: impl IntoIterator<Item = Item>, policy: &RetentionPolicy) -> Self {
        let mut by_uuid = HashMap::new();
        let mut by_bucket: HashMap<TimeBucket, Vec<Uuid16>> = HashMap::new();
        for item in items {
            let uuid = item.uuid();
            for bucket in policy.buckets_for(item.ctime()) {
                by_bucket.entry(bucket).or_default().push(uuid);
            }
            by_uuid.insert(uuid, item);
        }
        Self { by_uuid, by_bucket }
    }

    /// The item in `bucket` with the smallest `ctransid`, tie-broken by `uuid` for determinism.
    /// `None` if the bucket has no items.
    pub fn nominal(&self, bucket: &TimeBucket) -> Option<&Item> {
        self.by_bucket
            .get(bucket)?
            .iter()
            .filter_map(|uuid| self.by_uuid.get(uuid))
            .min_by_key(|item| (item.ctransid(), item.uuid()))
    }

    pub fn get(&self, uuid: Uuid16) -> Option<&Item> {
        self.by_uuid.get(&uuid)
    }

    /// The item with the greatest `ctransid` across the whole collection (tie-broken by uuid).
    pub fn most_recent(&self) -> Option<&Item> {
        self.by_uuid.values().max_by_key(|item| (item.ctransid(), item.uuid()))
    }

    pub fn all_buckets(&self) -> HashSet<TimeBucket> {
        self.by_bucket.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.by_uuid.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_uuid.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::Timeframe;
    use crate::model::SnapshotInfo;
    use crate::retention::RetentionParams;
    use jiff::tz::TimeZone;

    fn snap(uuid_byte: u8, ctime: i64, ctransid: u64) -> SnapshotInfo {
        SnapshotInfo {
            id: u64::from(uuid_byte),
            uuid: Uuid16::from_bytes([uuid_byte; 16]),
            parent_uuid: Uuid16::from_bytes([0xaa; 16]),
            ctransid,
            ctime,
            readonly: true,
        }
    }

    fn policy() -> RetentionPolicy {
        RetentionPolicy::new(RetentionParams { years: 2, ..Default::default() }, 1_167_609_600, TimeZone::UTC)
    }

    #[test]
    fn nominal_picks_smallest_ctransid_tie_broken_by_uuid() {
        let p = policy();
        let items = vec![snap(2, 1_150_372_800, 5), snap(1, 1_150_372_800, 5), snap(3, 1_150_372_800, 9)];
        let index = Index::build(items, &p);
        let bucket = crate::bucket::bucket_of(1_150_372_800, Timeframe::Year, &TimeZone::UTC);
        let nominal = index.nominal(&bucket).unwrap();
        assert_eq!(nominal.uuid, Uuid16::from_bytes([1; 16]));
    }

    #[test]
    fn most_recent_is_global_not_per_bucket() {
        let p = policy();
        let items = vec![snap(1, 1_150_372_800, 5), snap(2, 1_160_000_000, 20)];
        let index = Index::build(items, &p);
        assert_eq!(index.most_recent().unwrap().uuid, Uuid16::from_bytes([2; 16]));
    }

    #[test]
    fn empty_bucket_yields_no_nominal() {
        let p = policy();
        let index: Index<SnapshotInfo> = Index::build(vec![], &p);
        let bucket = crate::bucket::bucket_of(1_150_372_800, Timeframe::Year, &TimeZone::UTC);
        assert!(index.nominal(&bucket).is_none());
    }
}
