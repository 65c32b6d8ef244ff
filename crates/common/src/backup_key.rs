//! Bijective encoding of a backup's identifying metadata into an object key suffix.
//!
//! A key is `<basename>` followed by dot-prefixed suffixes: `.t<ctime>`, `.i<ctransid>`,
//! `.u<uuid>`, either `.s<send_parent_uuid>` or `.full`, and `.p<parent_uuid>`. Suffix order is
//! significant only for emission (produced in that order for readability); decoding accepts any
//! permutation and silently ignores unrelated suffixes such as `.gz`.

use crate::error::CommonError;
use crate::model::BackupInfo;
use crate::uuid16::Uuid16;
use jiff::tz::TimeZone;
use jiff::Zoned;

/// Renders the suffix portion of a backup's object key (everything after `<basename>`).
pub fn encode(info: &BackupInfo, tz: &TimeZone) -> String {
    let zoned = jiff::Timestamp::from_second(info.ctime)
        .expect("ctime is a representable unix timestamp")
        .to_zoned(tz.clone());
    let mut out = String::new();
    out.push_str(".t");
    out.push_str(&format_offset_datetime(&zoned));
    out.push_str(&format!(".i{}", info.ctransid));
    out.push_str(&format!(".u{}", info.uuid));
    match info.send_parent_uuid {
        Some(parent) if !parent.is_nil() => out.push_str(&format!(".s{parent}")),
        _ => out.push_str(".full"),
    }
    out.push_str(&format!(".p{}", info.parent_uuid));
    out
}

fn format_offset_datetime(z: &Zoned) -> String {
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

/// Decodes a backup's identifying metadata from any string containing the `.t`/`.i`/`.u`/
/// `.s`|`.full`/`.p` suffixes (typically the whole object key, basename included — only
/// recognized dot-prefixed components are consulted).
pub fn decode(key: &str) -> Result<BackupInfo, CommonError> {
    let mut ctime = None;
    let mut ctransid = None;
    let mut uuid = None;
    let mut send_parent = None;
    let mut parent_uuid = None;
    let mut full = false;

    for part in key.split('.') {
        if part == "full" {
            full = true;
            continue;
        }
        let Some(tag) = part.chars().next() else { continue };
        let rest = &part[tag.len_utf8()..];
        match tag {
            't' => {
                ctime = Some(rest.parse::<jiff::Timestamp>().map_err(|e| {
                    CommonError::MalformedBackupKeyComponent {
                        key: key.to_owned(),
                        component: "t",
                        source: Box::new(e),
                    }
                })?);
            }
            'i' => {
                ctransid = Some(rest.parse::<u64>().map_err(|e| CommonError::MalformedBackupKeyComponent {
                    key: key.to_owned(),
                    component: "i",
                    source: Box::new(e),
                })?);
            }
            'u' => {
                uuid = Some(rest.parse::<Uuid16>().map_err(|e| CommonError::MalformedBackupKeyComponent {
                    key: key.to_owned(),
                    component: "u",
                    source: Box::new(e),
                })?);
            }
            's' => {
                send_parent = Some(rest.parse::<Uuid16>().map_err(|e| {
                    CommonError::MalformedBackupKeyComponent {
                        key: key.to_owned(),
                        component: "s",
                        source: Box::new(e),
                    }
                })?);
            }
            'p' => {
                parent_uuid = Some(rest.parse::<Uuid16>().map_err(|e| {
                    CommonError::MalformedBackupKeyComponent {
                        key: key.to_owned(),
                        component: "p",
                        source: Box::new(e),
                    }
                })?);
            }
            _ => {} // unrecognized suffix (e.g. ".gz"): ignored
        }
    }

    let (Some(ctime), Some(ctransid), Some(uuid), Some(parent_uuid)) = (ctime, ctransid, uuid, parent_uuid)
    else {
        return Err(CommonError::IncompleteBackupKey);
    };
    if !full && send_parent.is_none() {
        return Err(CommonError::IncompleteBackupKey);
    }
    let send_parent_uuid = send_parent.filter(|id| !id.is_nil());

    Ok(BackupInfo {
        uuid,
        parent_uuid,
        send_parent_uuid,
        ctransid,
        ctime: ctime.as_second(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(send_parent_uuid: Option<Uuid16>) -> BackupInfo {
        BackupInfo {
            uuid: Uuid16::from_bytes([0x11; 16]),
            parent_uuid: Uuid16::from_bytes([0x22; 16]),
            send_parent_uuid,
            ctransid: 123,
            ctime: 1_150_372_800,
        }
    }

    #[test]
    fn round_trips_full_backup() {
        let info = sample(None);
        let key = format!("myvol{}", encode(&info, &TimeZone::UTC));
        assert_eq!(decode(&key).unwrap(), info);
    }

    #[test]
    fn round_trips_incremental_backup() {
        let info = sample(Some(Uuid16::from_bytes([0x33; 16])));
        let key = format!("myvol{}", encode(&info, &TimeZone::UTC));
        assert_eq!(decode(&key).unwrap(), info);
    }

    #[test]
    fn decoding_is_invariant_under_suffix_permutation() {
        let info = sample(Some(Uuid16::from_bytes([0x33; 16])));
        let suffixes = encode(&info, &TimeZone::UTC);
        let mut parts: Vec<&str> = suffixes.split('.').filter(|p| !p.is_empty()).collect();
        parts.reverse();
        let permuted = format!("myvol.{}", parts.join("."));
        assert_eq!(decode(&permuted).unwrap(), info);
    }

    #[test]
    fn ignores_unrelated_suffixes() {
        let info = sample(None);
        let key = format!("myvol{}.gz", encode(&info, &TimeZone::UTC));
        assert_eq!(decode(&key).unwrap(), info);
    }

    #[test]
    fn nil_send_parent_means_full() {
        let info = sample(None);
        let key = format!(
            "myvol.t2006-06-15T12:00:00+00:00.i123.u{}.s{}.p{}",
            info.uuid,
            Uuid16::from_bytes([0; 16]),
            info.parent_uuid
        );
        let decoded = decode(&key).unwrap();
        assert_eq!(decoded.send_parent_uuid, None);
    }

    #[test]
    fn missing_required_suffix_is_an_error() {
        let err = decode("myvol.i123.u00000000-0000-0000-0000-000000000000.full").unwrap_err();
        assert!(matches!(err, CommonError::IncompleteBackupKey));
    }

    #[test]
    fn missing_full_or_send_parent_is_an_error() {
        let info = sample(None);
        let key = format!("myvol.t2006-06-15T12:00:00+00:00.i123.u{}.p{}", info.uuid, info.parent_uuid);
        assert!(matches!(decode(&key), Err(CommonError::IncompleteBackupKey)));
    }
}
