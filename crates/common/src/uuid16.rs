//! Opaque 16-byte identity used for subvolume, snapshot and backup uuids.

use std::fmt;
use std::str::FromStr;

/// A 16-byte identifier, rendered in canonical `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` form.
///
/// This is deliberately not the `uuid` crate's `Uuid` type: snapshot/backup uuids here are
/// opaque bytes handed to us by the snapshot store or decoded from an object key, never
/// generated by RFC 4122 version rules. The `uuid` crate is still used elsewhere to mint
/// genuinely random identifiers (proposed-snapshot temp names).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Uuid16([u8; 16]);

/// The all-zero uuid, used as the sentinel for "no send-parent" in the `.s` key suffix.
pub const NIL: Uuid16 = Uuid16([0; 16]);

impl Uuid16 {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub const fn to_bytes(self) -> [u8; 16] {
        self.0
    }

    pub const fn is_nil(self) -> bool {
        let mut i = 0;
        while i < 16 {
            if self.0[i] != 0 {
                return false;
            }
            i += 1;
        }
        true
    }

    pub fn new_random() -> Self {
        Self(*uuid::Uuid::new_v4().as_bytes())
    }
}

impl fmt::Debug for Uuid16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uuid16({self})")
    }
}

impl fmt::Display for Uuid16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7], b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]
        )
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid uuid string: {0}")]
pub struct ParseUuid16Error(String);

impl FromStr for Uuid16 {
    type Err = ParseUuid16Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex: String = s.chars().filter(|c| *c != '-').collect();
        if hex.len() != 32 {
            return Err(ParseUuid16Error(s.to_owned()));
        }
        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let pair = &hex[i * 2..i * 2 + 2];
            *byte = u8::from_str_radix(pair, 16).map_err(|_| ParseUuid16Error(s.to_owned()))?;
        }
        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_parse() {
        let id = Uuid16::new_random();
        let text = id.to_string();
        assert_eq!(text.parse::<Uuid16>().unwrap(), id);
    }

    #[test]
    fn nil_is_all_zero() {
        assert!(NIL.is_nil());
        assert!(!Uuid16::new_random().is_nil());
    }

    #[test]
    fn rejects_malformed_strings() {
        assert!("not-a-uuid".parse::<Uuid16>().is_err());
        assert!("deadbeef".parse::<Uuid16>().is_err());
    }

    #[test]
    fn canonical_form_is_lowercase_hyphenated() {
        let id = Uuid16::from_bytes([0xAB; 16]);
        assert_eq!(
            id.to_string(),
            "abababab-abab-abab-abab-abababababab"
        );
    }
}
