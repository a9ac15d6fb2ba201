//! Content fingerprints (SHA-256, hex encoded).

use sha2::{Digest, Sha256};

pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Fingerprint an unordered collection of identifiers.
///
/// Items are sorted and de-duplicated first so the result does not depend on
/// fetch order.
pub fn fingerprint_set<'a, I>(items: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut sorted: Vec<&str> = items.into_iter().collect();
    sorted.sort_unstable();
    sorted.dedup();
    let mut hasher = Sha256::new();
    for item in sorted {
        hasher.update(item.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Combine two fingerprints into one composite value.
pub fn composite(left: &str, right: &str) -> String {
    fingerprint(format!("{left}:{right}").as_bytes())
}
