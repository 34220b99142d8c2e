//! Deterministic reordering of handshake attributes.
//!
//! The server recomputes the order of the `<k>` attributes from their contents
//! and rejects the stream if it differs. The order is produced by repeatedly
//! hashing the not-yet-placed entries and using the hash to pick the next key.

use std::collections::BTreeMap;

use crate::bits::DigestAlgorithm;

/// Hash parameters. Anonymous connects use a different pair than connects that
/// carry an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShuffleMode {
    Authenticated,
    Anonymous,
}

impl ShuffleMode {
    fn params(self) -> (i32, u32) {
        match self {
            ShuffleMode::Authenticated => (-1_964_139_357, 7),
            ShuffleMode::Anonymous => (-310_256_979, 13),
        }
    }
}

/// Composite hash of a whole attribute map.
pub fn map_hash_code(map: &BTreeMap<String, String>, mode: ShuffleMode) -> i32 {
    let (base, offset) = mode.params();

    let mut ascending = String::new();
    for (k, v) in map.iter() {
        ascending.push_str(k);
        ascending.push_str(v);
    }
    let mut descending = String::new();
    for (k, v) in map.iter().rev() {
        descending.push_str(k);
        descending.push_str(v);
    }

    let a = ascending.as_bytes();
    let b = descending.as_bytes();
    let hashes = [
        DigestAlgorithm::Sha256.hash_code(a),
        DigestAlgorithm::Sha1.hash_code(a),
        DigestAlgorithm::Md5.hash_code(a),
        DigestAlgorithm::Sha256.hash_code(b),
        DigestAlgorithm::Sha1.hash_code(b),
        DigestAlgorithm::Md5.hash_code(b),
    ];

    // Only four of the six digests feed the result.
    base ^ hashes[0].wrapping_shl(offset)
        ^ hashes[5].wrapping_shl(offset * 2)
        ^ hashes[4].wrapping_shl(offset)
        ^ hashes[3]
}

/// Orders `attrs` the way the server expects for `mode`.
///
/// The result depends only on the set of pairs, never on input order. Duplicate
/// keys keep the last value.
pub fn shuffle<I, K, V>(attrs: I, mode: ShuffleMode) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let mut remaining: BTreeMap<String, String> = attrs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();
    let mut pool: Vec<String> = remaining.keys().cloned().collect();
    let mut ordered = Vec::with_capacity(pool.len());

    while !pool.is_empty() {
        let hash = map_hash_code(&remaining, mode);
        let index = hash.rem_euclid(pool.len() as i32) as usize;
        let key = pool.remove(index);
        if let Some(value) = remaining.remove(&key) {
            ordered.push((key, value));
        }
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<(&'static str, &'static str)> {
        vec![
            ("sid", "a5f0e1c2-7d3b-4e9a-b1c6-0f2e3d4c5b6a"),
            ("lang", "en_US"),
            ("anon", "1"),
            ("ts", "1700000000000"),
            ("v", "15.25.0.22493"),
            ("conn", "WIFI"),
            ("dev", "CAN0123456789abcdef0123456789abcdef"),
        ]
    }

    #[test]
    fn keeps_every_pair() {
        let out = shuffle(sample(), ShuffleMode::Anonymous);
        let mut got: Vec<_> = out.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let mut want = sample();
        got.sort();
        want.sort();
        assert_eq!(got, want);
    }

    #[test]
    fn input_order_does_not_matter() {
        let forward = shuffle(sample(), ShuffleMode::Authenticated);
        let backward = shuffle(sample().into_iter().rev(), ShuffleMode::Authenticated);
        assert_eq!(forward, backward);
    }

    #[test]
    fn empty_and_single() {
        assert!(shuffle(Vec::<(String, String)>::new(), ShuffleMode::Anonymous).is_empty());
        assert_eq!(
            shuffle([("only", "one")], ShuffleMode::Anonymous),
            vec![("only".to_string(), "one".to_string())]
        );
    }
}
