//! Message codec: AES-256-CBC + PKCS#7 + base64, per spec §4.D.
//!
//! The key and IV are fixed at build time and are part of the wire
//! contract, not a KDF (spec §9 "Password-to-key derivation",
//! "Fixed IV with CBC"). This is a known, intentional weakness preserved
//! for interoperability with existing clients; callers must not silently
//! upgrade to a random IV or AEAD cipher.

use crate::error::{ProtocolError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use openssl::symm::{Cipher, Crypter, Mode};

const KEY_MATERIAL: &[u8] = b"nexremote_encryption_key_32chars";
const IV: [u8; 16] = [0u8; 16];

fn derive_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    let n = KEY_MATERIAL.len().min(32);
    key[..n].copy_from_slice(&KEY_MATERIAL[..n]);
    key
}

/// Immutable encryption context shared by the codec; cheap to clone since
/// the key/IV are fixed constants, not per-session secrets.
#[derive(Clone)]
pub struct EncryptionContext {
    key: [u8; 32],
}

impl Default for EncryptionContext {
    fn default() -> Self {
        Self { key: derive_key() }
    }
}

impl EncryptionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encrypts UTF-8 `plaintext` and returns the base64 text-frame payload.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let cipher = Cipher::aes_256_cbc();
        let mut crypter = Crypter::new(cipher, Mode::Encrypt, &self.key, Some(&IV))
            .map_err(|e| ProtocolError::Protocol(format!("cipher init: {e}")))?;
        let data = plaintext.as_bytes();
        let mut out = vec![0u8; data.len() + cipher.block_size()];
        let mut count = crypter
            .update(data, &mut out)
            .map_err(|e| ProtocolError::Protocol(format!("encrypt update: {e}")))?;
        count += crypter
            .finalize(&mut out[count..])
            .map_err(|e| ProtocolError::Protocol(format!("encrypt finalize: {e}")))?;
        out.truncate(count);
        Ok(STANDARD.encode(out))
    }

    /// Decrypts a base64 text-frame payload back to UTF-8 text.
    ///
    /// Per spec §4.D, the initial handshake frame is intentionally sent as
    /// plaintext JSON; callers that cannot decrypt should fall back to
    /// treating the raw payload as plaintext rather than treating this as
    /// an error.
    pub fn decrypt(&self, payload: &str) -> Result<String> {
        let ciphertext = STANDARD
            .decode(payload)
            .map_err(|e| ProtocolError::Protocol(format!("base64 decode: {e}")))?;
        if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
            return Err(ProtocolError::Protocol(
                "ciphertext not a multiple of the block size".into(),
            ));
        }
        let cipher = Cipher::aes_256_cbc();
        let mut crypter = Crypter::new(cipher, Mode::Decrypt, &self.key, Some(&IV))
            .map_err(|e| ProtocolError::Protocol(format!("cipher init: {e}")))?;
        let mut out = vec![0u8; ciphertext.len() + cipher.block_size()];
        let mut count = crypter
            .update(&ciphertext, &mut out)
            .map_err(|e| ProtocolError::Protocol(format!("decrypt update: {e}")))?;
        count += crypter
            .finalize(&mut out[count..])
            .map_err(|e| ProtocolError::Protocol(format!("decrypt finalize: {e}")))?;
        out.truncate(count);
        String::from_utf8(out).map_err(|e| ProtocolError::Protocol(format!("not utf-8: {e}")))
    }

    /// Decodes a frame that may be either the initial plaintext handshake
    /// JSON or an encrypted envelope, per spec §4.C step 1 and §4.D.
    pub fn decode_flexible(&self, payload: &str) -> String {
        if serde_json::from_str::<serde_json::Value>(payload).is_ok() {
            return payload.to_string();
        }
        self.decrypt(payload).unwrap_or_else(|_| payload.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_short_and_long_strings() {
        let ctx = EncryptionContext::new();
        for text in ["{}", "hello world", &"x".repeat(10_000)] {
            let encrypted = ctx.encrypt(text).unwrap();
            let decrypted = ctx.decrypt(&encrypted).unwrap();
            assert_eq!(decrypted, text);
        }
    }

    #[test]
    fn ciphertext_is_base64_and_block_aligned() {
        let ctx = EncryptionContext::new();
        let encrypted = ctx.encrypt(r#"{"device_id":"d1"}"#).unwrap();
        let raw = STANDARD.decode(&encrypted).unwrap();
        assert_eq!(raw.len() % 16, 0);
    }

    #[test]
    fn decode_flexible_prefers_plaintext_json() {
        let ctx = EncryptionContext::new();
        let plaintext = r#"{"device_id":"d1","device_name":"Phone"}"#;
        assert_eq!(ctx.decode_flexible(plaintext), plaintext);
    }

    #[test]
    fn decode_flexible_falls_back_to_decrypt() {
        let ctx = EncryptionContext::new();
        let plaintext = r#"{"type":"keyboard"}"#;
        let encrypted = ctx.encrypt(plaintext).unwrap();
        assert_eq!(ctx.decode_flexible(&encrypted), plaintext);
    }
}
