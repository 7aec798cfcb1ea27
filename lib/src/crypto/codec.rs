// lib/src/crypto/codec.rs
//! Field-level authenticated encryption for sensitive columns.
//!
//! Blob layout: base64( 24-byte XChaCha20 nonce ‖ ciphertext+tag ).
//! Given the same key the transform is pure; only the nonce is random.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use models::errors::{BotError, BotResult};

const NONCE_LEN: usize = 24;

/// Symmetric codec for a single field value, keyed process-wide.
///
/// A keyless cipher is constructible so the rest of the system can start,
/// but every encode/decode through it fails with a configuration error —
/// plaintext is never silently written and ciphertext is never silently
/// returned as if it were plaintext.
#[derive(Clone)]
pub struct FieldCipher {
    cipher: Option<XChaCha20Poly1305>,
}

impl FieldCipher {
    pub fn new(key: Option<[u8; 32]>) -> Self {
        FieldCipher {
            cipher: key.map(|k| XChaCha20Poly1305::new(Key::from_slice(&k))),
        }
    }

    /// Builds a cipher from a base64-encoded 32-byte key, the form the key
    /// takes in process configuration.
    pub fn from_base64(encoded: &str) -> BotResult<Self> {
        let raw = BASE64
            .decode(encoded.trim())
            .map_err(|e| BotError::Configuration(format!("ENCRYPTION_KEY is not valid base64: {}", e)))?;
        let key: [u8; 32] = raw
            .try_into()
            .map_err(|_| BotError::Configuration("ENCRYPTION_KEY must decode to exactly 32 bytes".to_string()))?;
        Ok(FieldCipher::new(Some(key)))
    }

    pub fn keyless() -> Self {
        FieldCipher::new(None)
    }

    pub fn has_key(&self) -> bool {
        self.cipher.is_some()
    }

    pub fn encode(&self, plaintext: &str) -> BotResult<String> {
        let cipher = self.cipher.as_ref().ok_or_else(|| {
            BotError::Configuration("no encryption key configured; refusing to store plaintext".to_string())
        })?;
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| BotError::Storage("field encryption failed".to_string()))?;
        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(nonce.as_slice());
        blob.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(blob))
    }

    pub fn decode(&self, blob: &str) -> BotResult<String> {
        let cipher = self.cipher.as_ref().ok_or_else(|| {
            BotError::Configuration("no encryption key configured; cannot decrypt stored field".to_string())
        })?;
        let raw = BASE64
            .decode(blob)
            .map_err(|e| BotError::Decryption(format!("blob is not valid base64: {}", e)))?;
        if raw.len() < NONCE_LEN {
            return Err(BotError::Decryption("blob too short to carry a nonce".to_string()));
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| BotError::Decryption("ciphertext failed authentication".to_string()))?;
        String::from_utf8(plaintext).map_err(|e| BotError::Decryption(format!("decrypted bytes are not UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> FieldCipher {
        FieldCipher::new(Some([7u8; 32]))
    }

    #[test]
    fn round_trip() {
        let c = cipher();
        for s in ["", "hello", "陳小明", "日記：今日好開心", "852 9123-4567"] {
            let blob = c.encode(s).unwrap();
            assert_ne!(blob, s);
            assert_eq!(c.decode(&blob).unwrap(), s);
        }
    }

    #[test]
    fn fresh_nonce_per_encode() {
        let c = cipher();
        assert_ne!(c.encode("same").unwrap(), c.encode("same").unwrap());
    }

    #[test]
    fn tampering_is_detected() {
        let c = cipher();
        let blob = c.encode("sensitive").unwrap();
        let mut raw = BASE64.decode(&blob).unwrap();
        for i in 0..raw.len() {
            raw[i] ^= 0x01;
            let flipped = BASE64.encode(&raw);
            assert!(matches!(c.decode(&flipped), Err(BotError::Decryption(_))), "bit flip at byte {} went undetected", i);
            raw[i] ^= 0x01;
        }
    }

    #[test]
    fn decode_never_falls_back_to_raw_value() {
        // A plaintext-looking blob must error, not echo back.
        let c = cipher();
        assert!(matches!(c.decode("not-a-real-blob"), Err(BotError::Decryption(_))));
    }

    #[test]
    fn keyless_cipher_refuses_both_directions() {
        let c = FieldCipher::keyless();
        assert!(matches!(c.encode("x"), Err(BotError::Configuration(_))));
        assert!(matches!(c.decode("x"), Err(BotError::Configuration(_))));
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let blob = cipher().encode("secret").unwrap();
        let other = FieldCipher::new(Some([8u8; 32]));
        assert!(matches!(other.decode(&blob), Err(BotError::Decryption(_))));
    }

    #[test]
    fn from_base64_validates_key_length() {
        assert!(FieldCipher::from_base64("dG9vLXNob3J0").is_err());
        let good = BASE64.encode([9u8; 32]);
        assert!(FieldCipher::from_base64(&good).unwrap().has_key());
    }
}
