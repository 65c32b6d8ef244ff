//! Canonical and transient snapshot naming.

use coldsnap_common::SnapshotInfo;
use jiff::tz::TimeZone;

/// `"<source>.<iso8601 ctime with offset>.<ctransid>"`.
pub fn canonical_snapshot_name(source: &str, info: &SnapshotInfo, tz: &TimeZone) -> String {
    let zoned = jiff::Timestamp::from_second(info.ctime)
        .expect("ctime is a representable unix timestamp")
        .to_zoned(tz.clone());
    format!("{source}.{}.{}", format_offset_datetime(&zoned), info.ctransid)
}

/// `"<source>.NEW.<pid>"` — the transient name a proposed-but-not-yet-renamed snapshot carries.
pub fn proposed_snapshot_name(source: &str, pid: u32) -> String {
    format!("{source}.NEW.{pid}")
}

fn format_offset_datetime(z: &jiff::Zoned) -> String {
    let offset_seconds = z.offset().seconds();
    let sign = if offset_seconds < 0 { '-' } else { '+' };
    let abs = offset_seconds.unsigned_abs();
    let (hh, mm) = (abs / 3600, (abs % 3600) / 60);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}{sign}{hh:02}:{mm:02}",
        z.year(),
        z.month(),
        z.day(),
        z.hour(),
        z.minute(),
        z.second()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use coldsnap_common::Uuid16;

    #[test]
    fn canonical_name_matches_expected_shape() {
        let info = SnapshotInfo {
            id: 1,
            uuid: Uuid16::from_bytes([1; 16]),
            parent_uuid: Uuid16::from_bytes([2; 16]),
            ctransid: 123,
            ctime: 1_150_372_800,
            readonly: true,
        };
        let name = canonical_snapshot_name("myvol", &info, &TimeZone::UTC);
        assert_eq!(name, "myvol.2006-06-15T12:00:00+00:00.123");
    }

    #[test]
    fn proposed_name_uses_new_marker_and_pid() {
        assert_eq!(proposed_snapshot_name("myvol", 4242), "myvol.NEW.4242");
    }
}
