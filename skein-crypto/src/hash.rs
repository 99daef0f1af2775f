use skein_types::primitives::Hash;

/// Domain separation context for rendezvous fingerprints.
const RENDEZVOUS_CONTEXT: &str = "skein 2024 rendezvous fingerprint v1";

/// Compute the BLAKE3 hash of the given data.
pub fn blake3_hash(data: &[u8]) -> Hash {
    *blake3::hash(data).as_bytes()
}

/// Compute a BLAKE3 hash with domain separation.
/// The context string ensures different uses of hashing produce different outputs.
pub fn blake3_hash_domain(context: &str, data: &[u8]) -> Hash {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

/// Hash multiple pieces of data together.
pub fn blake3_hash_multi(parts: &[&[u8]]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Fixed-length, hex-encoded fingerprint of a one-time code.
///
/// This is what gets published as the DHT rendezvous key, so an observer of
/// the key learns nothing about the code or the secret behind it.
pub fn fingerprint(code: &str) -> String {
    hex::encode(blake3_hash_domain(RENDEZVOUS_CONTEXT, code.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blake3_hash_deterministic() {
        let data = b"hello skein";
        let h1 = blake3_hash(data);
        let h2 = blake3_hash(data);
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_blake3_hash_different_inputs() {
        let h1 = blake3_hash(b"hello");
        let h2 = blake3_hash(b"world");
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_blake3_domain_separation() {
        let data = b"same data";
        let h1 = blake3_hash_domain("context-a", data);
        let h2 = blake3_hash_domain("context-b", data);
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_blake3_hash_multi() {
        let h = blake3_hash_multi(&[b"hello", b" ", b"world"]);
        // Should be the same as hashing the concatenation
        assert_eq!(h, blake3_hash(b"hello world"));
    }

    #[test]
    fn test_fingerprint_is_fixed_length_hex() {
        for code in ["0", "123456", "000000123456789"] {
            let fp = fingerprint(code);
            assert_eq!(fp.len(), 64);
            assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_fingerprint_hides_code() {
        let fp = fingerprint("123456");
        assert!(!fp.contains("123456"));
        assert_ne!(fingerprint("123456"), fingerprint("123457"));
    }
}
