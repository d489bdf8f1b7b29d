//! ULID identifiers for signals, clusters and syntheses. The first 48 bits carry the creation time in milliseconds.

use chrono::{DateTime, Utc};
use ulid::Ulid;

/// Fresh ULID in canonical 26-character Crockford base32.
pub fn new_ulid() -> String {
    Ulid::new().to_string()
}

pub fn is_ulid(s: &str) -> bool {
    s.len() == 26 && Ulid::from_string(s).is_ok()
}

/// Creation time encoded in a ULID, or None when `id` is not a ULID.
pub fn ulid_timestamp(id: &str) -> Option<DateTime<Utc>> {
    let ulid = Ulid::from_string(id).ok()?;
    let millis = i64::try_from(ulid.timestamp_ms()).ok()?;
    DateTime::from_timestamp_millis(millis)
}

/// Largest millisecond timestamp a ULID can carry (48 bits).
const MAX_ULID_MILLIS: u64 = (1 << 48) - 1;

/// ULID whose timestamp is `at` (millisecond precision) with fresh randomness. Used for backdated records.
/// None before the Unix epoch or past the 48-bit range.
pub fn ulid_at(at: DateTime<Utc>) -> Option<String> {
    let millis = u64::try_from(at.timestamp_millis()).ok()?;
    if millis > MAX_ULID_MILLIS {
        return None;
    }
    Some(Ulid::from_parts(millis, Ulid::new().random()).to_string())
}
