use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64_light::{base64_decode, base64_encode_bytes};
use rand::RngCore;

use crate::error::{Error, Result};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of the AES-GCM nonce prepended to each cipher text.
pub const NONCE_SIZE: usize = 12;

/// Symmetric cipher for credential values. Every call draws a fresh
/// random nonce; the stored form is base64(nonce || ciphertext+tag).
pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl FieldCipher {
    /// Load the key file, generating it on first use. The key is created
    /// once and only ever read back, never re-derived.
    pub fn load_or_generate(key_path: &Path) -> Result<Self> {
        let key = match fs::read(key_path) {
            Ok(bytes) => {
                if bytes.len() != KEY_SIZE {
                    return Err(Error::KeyFile(format!(
                        "expected {KEY_SIZE} bytes, found {}",
                        bytes.len()
                    )));
                }
                bytes
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let mut key = [0u8; KEY_SIZE];
                OsRng.fill_bytes(&mut key);
                fs::write(key_path, key)?;
                key.to_vec()
            }
            Err(e) => return Err(e.into()),
        };

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| Error::KeyFile(e.to_string()))?;

        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| Error::Encrypt)?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(base64_encode_bytes(&combined))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let combined = base64_decode(encoded);
        if combined.len() < NONCE_SIZE {
            return Err(Error::Decrypt);
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| Error::Decrypt)?;

        String::from_utf8(plaintext).map_err(|_| Error::Decrypt)
    }
}
