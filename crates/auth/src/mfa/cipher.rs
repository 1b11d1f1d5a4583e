use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use sha2::{Digest, Sha256};

use super::MfaError;

/// AES-256-GCM encryption for TOTP secrets at rest.
///
/// The key is derived from configured key material with SHA-256.
/// Ciphertext layout:
///
/// ```text
/// [12 bytes nonce][encrypted secret + tag]
/// ```
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl SecretCipher {
    const NONCE_LENGTH: usize = 12;

    pub fn new(key_material: &[u8]) -> Result<Self, MfaError> {
        let key = Sha256::digest(key_material);
        let cipher =
            Aes256Gcm::new_from_slice(&key).map_err(|e| MfaError::Crypto(e.to_string()))?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, MfaError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let encrypted = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| MfaError::Crypto(e.to_string()))?;

        let mut out = Vec::with_capacity(Self::NONCE_LENGTH + encrypted.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&encrypted);
        Ok(out)
    }

    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, MfaError> {
        if data.len() <= Self::NONCE_LENGTH {
            return Err(MfaError::Crypto("ciphertext too short".to_string()));
        }
        let (nonce, encrypted) = data.split_at(Self::NONCE_LENGTH);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), encrypted)
            .map_err(|e| MfaError::Crypto(e.to_string()))
    }
}

impl core::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SecretCipher(..)")
    }
}
