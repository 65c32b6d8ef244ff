//! Property-based tests for the `KeepMeta` monoid laws, backup-key round-tripping under
//! arbitrary permutation, and resolver determinism under input permutation.

use coldsnap_common::{
    decode_backup_key, encode_backup_key, resolve, BackupInfo, KeepFlags, KeepMeta, KeepReasons, RetentionParams,
    RetentionPolicy, SnapshotInfo, Uuid16,
};
use jiff::tz::TimeZone;
use proptest::prelude::*;

fn arb_uuid() -> impl Strategy<Value = Uuid16> {
    any::<[u8; 16]>().prop_map(Uuid16::from_bytes)
}

fn arb_ctime() -> impl Strategy<Value = i64> {
    // 2000-01-01 .. 2060-01-01, comfortably within jiff's representable range.
    946_684_800i64..2_840_140_800i64
}

fn arb_reasons() -> impl Strategy<Value = KeepReasons> {
    (any::<bool>(), any::<bool>(), any::<bool>()).prop_map(|(a, b, c)| {
        let mut r = KeepReasons::empty();
        if a {
            r |= KeepReasons::PRESERVED;
        }
        if b {
            r |= KeepReasons::MOST_RECENT;
        }
        if c {
            r |= KeepReasons::SEND_ANCESTOR;
        }
        r
    })
}

fn arb_flags() -> impl Strategy<Value = KeepFlags> {
    (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()).prop_map(|(a, b, c, d)| {
        let mut f = KeepFlags::empty();
        if a {
            f |= KeepFlags::NEW;
        }
        if b {
            f |= KeepFlags::REPLACING_NEWER;
        }
        if c {
            f |= KeepFlags::NO_SNAPSHOT;
        }
        if d {
            f |= KeepFlags::SNAPSHOT_IS_NEWER;
        }
        f
    })
}

fn arb_keep_meta() -> impl Strategy<Value = KeepMeta> {
    (arb_reasons(), arb_flags()).prop_map(|(reasons, flags)| KeepMeta { reasons, flags, ..KeepMeta::default() })
}

proptest! {
    // KeepMeta is a monoid under union; the empty value is "not kept".
    #[test]
    fn keep_meta_union_is_associative(a in arb_keep_meta(), b in arb_keep_meta(), c in arb_keep_meta()) {
        let left = (a.clone() | b.clone()) | c.clone();
        let right = a | (b | c);
        prop_assert_eq!(left.reasons, right.reasons);
        prop_assert_eq!(left.flags, right.flags);
    }

    #[test]
    fn keep_meta_union_is_commutative(a in arb_keep_meta(), b in arb_keep_meta()) {
        let ab = a.clone() | b.clone();
        let ba = b | a;
        prop_assert_eq!(ab.reasons, ba.reasons);
        prop_assert_eq!(ab.flags, ba.flags);
    }

    #[test]
    fn keep_meta_empty_is_identity(a in arb_keep_meta()) {
        let with_empty = a.clone() | KeepMeta::default();
        prop_assert_eq!(with_empty.reasons, a.reasons);
        prop_assert_eq!(with_empty.flags, a.flags);
    }

    // Key round-trip: decoding is invariant under suffix permutation.
    #[test]
    fn backup_key_round_trips_under_any_suffix_permutation(
        uuid in arb_uuid(),
        parent_uuid in arb_uuid(),
        has_send_parent in any::<bool>(),
        send_parent in arb_uuid(),
        ctransid in any::<u64>(),
        ctime in arb_ctime(),
        shuffle_seed in any::<u8>(),
    ) {
        let info = BackupInfo {
            uuid,
            parent_uuid,
            send_parent_uuid: if has_send_parent { Some(send_parent) } else { None },
            ctransid,
            ctime,
        };
        let suffixes = encode_backup_key(&info, &TimeZone::UTC);
        let mut parts: Vec<&str> = suffixes.split('.').filter(|p| !p.is_empty()).collect();
        // Deterministic shuffle driven by the proptest-generated seed, rather than a fresh RNG
        // (module forbids `Math.random()`-equivalents in spirit; this keeps shrinking reproducible).
        let len = parts.len();
        for i in 0..len {
            let j = (usize::from(shuffle_seed) + i * 7) % len;
            parts.swap(i, j);
        }
        let permuted_key = format!("basename.{}", parts.join("."));
        let decoded = decode_backup_key(&permuted_key).unwrap();
        prop_assert_eq!(decoded, info);
    }

    // Determinism: resolve(S, B, P, mk_backup) is pure; permuting the input
    // collections yields bit-identical keep-sets (same uuids, same reasons/flags).
    #[test]
    fn resolver_is_invariant_under_input_permutation(
        count in 1usize..6,
        base_ctime in arb_ctime(),
        shuffle_seed in any::<u8>(),
    ) {
        let parent_uuid = Uuid16::from_bytes([0xaa; 16]);
        let snapshots: Vec<SnapshotInfo> = (0..count)
            .map(|i| SnapshotInfo {
                id: i as u64 + 1,
                uuid: Uuid16::from_bytes([i as u8 + 1; 16]),
                parent_uuid,
                ctransid: i as u64 + 1,
                ctime: base_ctime + i as i64 * 86_400,
                readonly: true,
            })
            .collect();

        fn mk_backup(s: &SnapshotInfo, send_parent: Option<Uuid16>) -> BackupInfo {
            BackupInfo { uuid: s.uuid, parent_uuid: s.parent_uuid, send_parent_uuid: send_parent, ctransid: s.ctransid, ctime: s.ctime }
        }

        let policy = RetentionPolicy::new(RetentionParams { years: 1, days: 5, ..Default::default() }, base_ctime + 365 * 86_400, TimeZone::UTC);

        let baseline = resolve(&snapshots, &[], &policy, &mk_backup);

        let mut permuted = snapshots.clone();
        let len = permuted.len();
        for i in 0..len {
            let j = (usize::from(shuffle_seed) + i * 3) % len;
            permuted.swap(i, j);
        }
        let shuffled = resolve(&permuted, &[], &policy, &mk_backup);

        let mut baseline_keys: Vec<_> = baseline.keep_snapshots.keys().copied().collect();
        let mut shuffled_keys: Vec<_> = shuffled.keep_snapshots.keys().copied().collect();
        baseline_keys.sort();
        shuffled_keys.sort();
        prop_assert_eq!(baseline_keys, shuffled_keys);

        for (uuid, (_, meta)) in &baseline.keep_snapshots {
            let (_, shuffled_meta) = &shuffled.keep_snapshots[uuid];
            prop_assert_eq!(meta.reasons, shuffled_meta.reasons);
            prop_assert_eq!(meta.flags, shuffled_meta.flags);
        }
    }
}
