// lib/src/crypto/blind_index.rs
//! Deterministic blind index over the canonical phone number.
//!
//! The digest is stored unencrypted with a uniqueness constraint and is the
//! only way the system ever looks a patient up by contact address — there is
//! no scan-and-decrypt path over the encrypted phone column.

use models::errors::{BotError, BotResult};
use sha2::{Digest, Sha256};

/// Expected canonical length: 852 prefix plus the 8-digit subscriber number.
const PHONE_LEN: usize = 11;
const REGION_PREFIX: &str = "852";

/// Normalizes a phone representation to the one canonical form before
/// digesting or storage: separators stripped, digits only, fixed length,
/// fixed region prefix.
pub fn canonicalize_phone(raw: &str) -> BotResult<String> {
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, '+' | ' ' | '-' | '.' | '(' | ')'))
        .collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(BotError::Validation("phone number must contain only digits".to_string()));
    }
    if digits.len() != PHONE_LEN || !digits.starts_with(REGION_PREFIX) {
        return Err(BotError::Validation(
            "phone number must match the format 852xxxxxxxx".to_string(),
        ));
    }
    Ok(digits)
}

/// SHA-256 hex digest of an already-canonical value.
pub fn digest(canonical: &str) -> String {
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Canonicalize-then-digest, the form every lookup path uses.
pub fn phone_digest(raw: &str) -> BotResult<String> {
    Ok(digest(&canonicalize_phone(raw)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic_across_representations() {
        let a = phone_digest("85291234567").unwrap();
        let b = phone_digest("+852 9123-4567").unwrap();
        let c = phone_digest("852 9123 4567").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn distinct_numbers_diverge() {
        assert_ne!(phone_digest("85291234567").unwrap(), phone_digest("85291234568").unwrap());
    }

    #[test]
    fn canonicalization_rejects_bad_input() {
        assert!(canonicalize_phone("9123456").is_err()); // too short
        assert!(canonicalize_phone("85591234567").is_err()); // wrong prefix
        assert!(canonicalize_phone("8529123456a").is_err()); // non-digit
        assert!(canonicalize_phone("852912345678").is_err()); // too long
    }

    #[test]
    fn known_vector() {
        // echo -n 85291234567 | sha256sum
        assert_eq!(
            digest("85291234567"),
            "01ee1402a8904af401329a98637b36f2db76d3b16f9d943a5d14a66806ab7f99"
        );
    }
}
