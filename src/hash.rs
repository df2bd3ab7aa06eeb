//! Slot computation: hash-tag extraction plus the cluster's canonical
//! CRC16/XMODEM key hash.

/// Number of slots in the cluster's hash-slot space.
pub const SLOT_COUNT: u16 = 16384;

/// Returns the substring that should actually be hashed for `key`,
/// honoring the `{tag}` hash-tag convention: if `key` contains `{` at
/// some position `s` followed by a `}` at `e > s + 1`, only `key[s+1..e]`
/// is hashed. Otherwise the whole key is hashed.
fn hash_tag(key: &str) -> &str {
    if let Some(start) = key.find('{') {
        if let Some(rel_end) = key[start + 1..].find('}') {
            let end = start + 1 + rel_end;
            if end > start + 1 {
                return &key[start + 1..end];
            }
        }
    }
    key
}

/// CRC16/XMODEM over raw bytes: polynomial `0x1021`, initial value `0`,
/// no input/output reflection, no final xor. This is the cluster's
/// canonical key-hash.
pub fn crc16(data: &[u8]) -> u16 {
    crc16::State::<crc16::XMODEM>::calculate(data)
}

/// Maps a key string to its slot in `[0, SLOT_COUNT)`.
pub fn keyslot(key: &str) -> u16 {
    crc16(hash_tag(key).as_bytes()) % SLOT_COUNT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc16_vectors() {
        assert_eq!(crc16(b""), 0x0000);
        assert_eq!(crc16(b"123456789"), 0x31C3);
    }

    #[test]
    fn slot_determinism() {
        assert_eq!(keyslot("foo"), 12182);
        assert_eq!(keyslot("foo"), keyslot("foo"));
        assert!(keyslot("foo") < SLOT_COUNT);
    }

    #[test]
    fn hash_tag_groups_keys() {
        assert_eq!(
            keyslot("{user1000}.following"),
            keyslot("{user1000}.followers")
        );
        assert_eq!(keyslot("{user1000}.following"), 5474);
    }

    #[test]
    fn empty_hash_tag_falls_back_to_whole_key() {
        assert_eq!(keyslot("foo{}bar"), keyslot("foo{}bar"));
        assert_ne!(hash_tag("foo{}bar"), "");
        assert_eq!(hash_tag("foo{}bar"), "foo{}bar");
    }

    #[test]
    fn nested_braces_use_first_closing_brace() {
        assert_eq!(hash_tag("foo{bar{baz}}"), "bar{baz");
        assert_eq!(keyslot("foo{bar{baz}}"), keyslot("xxx{bar{baz}}yyy"));
    }

    quickcheck::quickcheck! {
        fn slot_is_always_in_range(key: String) -> bool {
            keyslot(&key) < SLOT_COUNT
        }

        fn slot_is_deterministic(key: String) -> bool {
            keyslot(&key) == keyslot(&key)
        }
    }
}
