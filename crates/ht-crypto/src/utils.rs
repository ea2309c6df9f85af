//! Constant-time comparison for digests, fingerprints and other
//! values an attacker may probe byte by byte.

use constant_time_eq::constant_time_eq;

/// Compare two byte slices in constant time. Slices of different length are unequal.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    constant_time_eq(a, b)
}

/// Compare two strings in constant time over their UTF-8 bytes.
pub fn constant_time_str_eq(a: &str, b: &str) -> bool {
    constant_time_eq(a.as_bytes(), b.as_bytes())
}
