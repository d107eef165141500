//! Advertisement payload parsing and lock identification
//!
//! Raw BLE advertisements are length-prefixed TLV records. A lock is
//! recognized by its advertised name; the manufacturer-specific record
//! carries the bytes the version tag is derived from. All parsing is
//! defensive: a malformed or truncated payload is simply "not a lock".

use crate::types::MacAddress;

// ----------------------------------------------------------------------------
// Name Conventions
// ----------------------------------------------------------------------------

/// Substring every lock advertises in its device name.
pub const LOCK_NAME_MARKER: &str = "NOKE";

/// Name markers for firmware-update variants. These devices expose the
/// firmware characteristic workflow instead of the session-key read.
const FIRMWARE_NAME_MARKERS: [&str; 3] = ["NOKE_FW", "NFOB_FW", "N3P_FW"];

/// Version codes of legacy hardware whose advertisements carry no decodable
/// version; such devices are accepted without a version tag.
const LEGACY_VERSION_CODES: [&str; 2] = ["04", "06"];

/// AD type byte of the manufacturer-specific TLV record.
const MANUFACTURER_DATA_TYPE: u8 = 0xFF;

/// Whether an advertised name marks a firmware-update variant.
pub fn is_firmware_name(name: &str) -> bool {
    FIRMWARE_NAME_MARKERS.iter().any(|m| name.contains(m))
}

// ----------------------------------------------------------------------------
// Lock Identity
// ----------------------------------------------------------------------------

/// Identity extracted from one accepted advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockIdentity {
    pub mac: MacAddress,
    pub name: String,
    /// Derived version tag; `None` for legacy hardware classes.
    pub version: Option<String>,
}

// ----------------------------------------------------------------------------
// Parsing
// ----------------------------------------------------------------------------

/// Parse one advertisement into a lock identity.
///
/// Returns `None` when the name does not carry the lock marker, when the
/// name is too short for its family's version-code offset, or when a
/// non-legacy device's payload lacks usable manufacturer data.
pub fn parse_advertisement(
    name: &str,
    mac: MacAddress,
    payload: &[u8],
) -> Option<LockIdentity> {
    if !name.contains(LOCK_NAME_MARKER) {
        return None;
    }

    let code = version_code(name)?;

    // Legacy hardware advertises no decodable version; accept as-is.
    if LEGACY_VERSION_CODES.contains(&code) {
        return Some(LockIdentity {
            mac,
            name: name.to_string(),
            version: None,
        });
    }

    let data = manufacturer_data(payload)?;
    let bytes = data.get(2..5)?;
    Some(LockIdentity {
        mac,
        name: name.to_string(),
        version: Some(decode_version(code, bytes)),
    })
}

/// Extract the two-character version code from the advertised name.
///
/// Key fobs ("FOB"-prefixed names, excluding the "NFOB" family) format
/// their names one character shorter than every other hardware class, so
/// the code sits one position earlier. This offset split is fixed by the
/// firmware's naming convention.
fn version_code(name: &str) -> Option<&str> {
    if name.contains("FOB") && !name.contains("NFOB") {
        name.get(3..5)
    } else {
        name.get(4..6)
    }
}

/// Decode the three manufacturer bytes into a version tag, e.g. `3P-2.13.4`.
fn decode_version(code: &str, bytes: &[u8]) -> String {
    format!("{}-{}.{}.{}", code, bytes[0], bytes[1], bytes[2])
}

/// Scan the TLV records for the manufacturer-specific payload.
///
/// Every record is a length byte followed by a type byte and data. Truncated
/// records terminate the scan; out-of-range lengths never index past the end.
fn manufacturer_data(payload: &[u8]) -> Option<&[u8]> {
    let mut i = 0usize;
    while i < payload.len() {
        let length = *payload.get(i)? as usize;
        if length == 0 {
            return None;
        }
        let record_type = *payload.get(i + 1)?;
        if record_type == MANUFACTURER_DATA_TYPE {
            return payload.get(i + 2..i + 1 + length);
        }
        i += 1 + length;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac() -> MacAddress {
        MacAddress::new("C7:00:11:22:33:44")
    }

    /// TLV payload with a flags record and a manufacturer record whose
    /// payload bytes 3-5 are 0x02, 0x0D, 0x04.
    fn well_formed_payload() -> Vec<u8> {
        vec![
            0x02, 0x01, 0x06, // flags
            0x06, 0xFF, 0x23, 0x01, 0x02, 0x0D, 0x04, // manufacturer data
        ]
    }

    #[test]
    fn accepts_standard_lock_name() {
        let identity =
            parse_advertisement("NOKE3P_ABC123", mac(), &well_formed_payload()).unwrap();
        assert_eq!(identity.name, "NOKE3P_ABC123");
        assert_eq!(identity.version.as_deref(), Some("3P-2.13.4"));
    }

    #[test]
    fn fob_family_uses_shifted_version_code() {
        // "FOB2U..." carries its code at chars 3..5; "NFOB..." does not.
        let identity =
            parse_advertisement("FOBNOKE2U_X", mac(), &well_formed_payload()).unwrap();
        assert_eq!(identity.version.as_deref(), Some("NO-2.13.4"));

        let identity =
            parse_advertisement("NFOBNOKE_2U", mac(), &well_formed_payload()).unwrap();
        assert_eq!(identity.version.as_deref(), Some("NO-2.13.4"));
    }

    #[test]
    fn legacy_codes_skip_version_derivation() {
        for name in ["NOKE04_ABC", "NOKE06_ABC"] {
            let identity = parse_advertisement(name, mac(), &[]).unwrap();
            assert_eq!(identity.version, None);
        }
    }

    #[test]
    fn non_lock_names_are_rejected() {
        assert_eq!(parse_advertisement("FitnessBand", mac(), &[0x02, 0x01, 0x06]), None);
        assert_eq!(parse_advertisement("", mac(), &[]), None);
    }

    #[test]
    fn truncated_payloads_never_panic() {
        // Name requires manufacturer data but the payload is garbage.
        for payload in [
            vec![],
            vec![0xFF],
            vec![0x05, 0xFF],               // claims 5 bytes, has none
            vec![0x02, 0x01, 0x06, 0x7F],   // dangling length byte
            vec![0x03, 0xFF, 0x23, 0x01],   // manufacturer record too short for offsets
        ] {
            assert_eq!(parse_advertisement("NOKE3P_ABC123", mac(), &payload), None);
        }
    }

    #[test]
    fn short_names_are_rejected() {
        assert_eq!(parse_advertisement("NOKE", mac(), &well_formed_payload()), None);
    }

    #[test]
    fn firmware_names_are_recognized() {
        assert!(is_firmware_name("NOKE_FW1A2B"));
        assert!(is_firmware_name("NFOB_FW_22"));
        assert!(is_firmware_name("N3P_FW_X"));
        assert!(!is_firmware_name("NOKE3P_ABC123"));
    }
}
