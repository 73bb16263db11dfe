//! Composite key forming and parsing. Keys are ASCII, `~`-separated;
//! components must not themselves contain `~`.

use crate::error::{ApiError, Result};

const SEP: char = '~';

/// Joins components with `~`; fails if any component already contains it.
pub fn form(parts: &[&str]) -> Result<String> {
    for p in parts {
        if p.contains(SEP) {
            return Err(ApiError::InvalidInput(format!(
                "key component {:?} contains reserved separator",
                p
            )));
        }
    }
    Ok(parts.join(&SEP.to_string()))
}

/// Splits a key back into its components. Round-trips with [`form`] for any
/// tuple whose components contain no `~`.
pub fn parse(key: &str) -> Vec<String> {
    key.split(SEP).map(str::to_string).collect()
}

/// `invTime = (2^53 - 1) - unixMs`, so ascending byte order on the decimal
/// string is newest-first. `2^53 - 1` bounds the value to stay within the
/// range a JS `Number` can represent exactly, matching the original
/// system's JSON-facing revision keys.
pub const MAX_SAFE_INT: i64 = (1i64 << 53) - 1;

pub fn inverse_time(unix_ms: i64) -> i64 {
    MAX_SAFE_INT - unix_ms
}

pub fn time_from_inverse(inv: i64) -> i64 {
    MAX_SAFE_INT - inv
}

/// `del~<kind>~<id1>[~<id2>...]`
pub fn deleted_marker(kind: &str, ids: &[&str]) -> Result<String> {
    let mut parts = vec!["del", kind];
    parts.extend_from_slice(ids);
    form(&parts)
}

/// `<kind>~<fileKey>~<invTime>` zero-padded so lexicographic order matches
/// numeric order (invTime is always positive and bounded by MAX_SAFE_INT).
pub fn revision_key(kind: &str, file_key: &str, unix_ms: i64) -> Result<String> {
    let inv = inverse_time(unix_ms);
    form(&[kind, file_key, &format!("{:016}", inv)])
}

/// `<ISO8601-time>~<userKey>`
pub fn history_data_key(time_rfc3339: &str, user_key: &str) -> Result<String> {
    form(&[time_rfc3339, user_key])
}

/// `<kind>~<ownerId>~<time>~<userKey>`
pub fn history_index_key(
    kind: &str,
    owner_id: &str,
    time_rfc3339: &str,
    user_key: &str,
) -> Result<String> {
    form(&[kind, owner_id, time_rfc3339, user_key])
}

/// `<userKey>~<fileKey>`
pub fn shared_index_key(user_key: &str, file_key: &str) -> Result<String> {
    form(&[user_key, file_key])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn safe_component() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_.\\-]{0,24}"
    }

    proptest! {
        #[test]
        fn round_trips(a in safe_component(), b in safe_component(), c in safe_component()) {
            let formed = form(&[&a, &b, &c]).unwrap();
            let parsed = parse(&formed);
            prop_assert_eq!(parsed, vec![a, b, c]);
        }

        #[test]
        fn rejects_separator_in_component(a in safe_component()) {
            let bad = format!("{a}~x");
            prop_assert!(form(&[&bad, "y"]).is_err());
        }
    }

    #[test]
    fn inverse_time_round_trips() {
        let now = 1_700_000_000_000i64;
        assert_eq!(time_from_inverse(inverse_time(now)), now);
    }

    #[test]
    fn inverse_time_orders_newest_first() {
        let older = 1_700_000_000_000i64;
        let newer = 1_700_000_001_000i64;
        assert!(inverse_time(newer) < inverse_time(older));
    }

    #[test]
    fn deleted_marker_shape() {
        assert_eq!(deleted_marker("File", &["F1"]).unwrap(), "del~File~F1");
    }
}
