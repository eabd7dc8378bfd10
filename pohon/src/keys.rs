//! Key derivation used by callers before they touch an index.
//!
//! Primary indexes are keyed by the raw record id. Secondary title indexes
//! are keyed by a 32-bit FNV-1a hash of the normalised title, so a hit must
//! be confirmed against the record itself.

use crate::common::Key;

const FNV_OFFSET_BASIS: u32 = 2166136261;
const FNV_PRIME: u32 = 16777619;

pub fn fnv1a32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &byte| {
        (hash ^ byte as u32).wrapping_mul(FNV_PRIME)
    })
}

/// Trims surrounding C-locale whitespace (ASCII whitespace plus vertical tab)
/// and optionally lower-cases ASCII letters.
pub fn normalize_title(title: &str, case_fold: bool) -> String {
    let trimmed = title.trim_matches(|c: char| c.is_ascii_whitespace() || c == '\x0B');
    if case_fold {
        trimmed.to_ascii_lowercase()
    } else {
        trimmed.to_string()
    }
}

pub fn title_key(title: &str) -> Key {
    fnv1a32(normalize_title(title, true).as_bytes()) as Key
}

pub fn primary_key(record_id: i32) -> Key {
    record_id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a_reference_values() {
        assert_eq!(fnv1a32(b""), 0x811c9dc5);
        assert_eq!(fnv1a32(b"a"), 0xe40c292c);
        assert_eq!(fnv1a32(b"foobar"), 0xbf9cf968);
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("  Deep Learning\t\r\n", true), "deep learning");
        assert_eq!(normalize_title("  Deep Learning ", false), "Deep Learning");
        assert_eq!(normalize_title(" \n ", true), "");
        assert_eq!(normalize_title("\x0BDune\x0B\x0C", true), "dune");
    }

    #[test]
    fn test_title_key_ignores_case_and_padding() {
        assert_eq!(title_key("B+Tree Indexing"), title_key("  b+tree indexing\n"));
        assert_ne!(title_key("B+Tree Indexing"), title_key("B-Tree Indexing"));
        assert_eq!(title_key("\x0B Dune \x0B"), title_key("dune"));
        assert_eq!(title_key(""), 0x811c9dc5u32 as i32);
        assert_eq!(primary_key(77), 77);
    }
}
