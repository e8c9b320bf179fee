//! Authenticated encryption of credential secrets.
//!
//! Secrets are sealed with AES-256-GCM under a per-session key. The key
//! lives only in volatile memory: it cannot be serialized, its debug output
//! is redacted, and its bytes are zeroized when the session drops it. The
//! persisted form of a secret is a [`CipherBlob`]: nonce, ciphertext, and
//! authentication tag encoded as one opaque base64 string.

use crate::error::{Error, Result};
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;
/// GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;
/// GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// A symmetric session key.
///
/// Opaque by construction: no serde impls, no byte accessors outside the
/// crate, redacted `Debug`, zeroized on drop. One key exists per signed-in
/// session and is destroyed on sign-out.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKey {
    bytes: [u8; KEY_LEN],
}

impl SessionKey {
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Produce a fresh session key from the platform CSPRNG.
///
/// Fails with [`Error::KeyGeneration`] only if the platform RNG is
/// unavailable.
pub fn generate_key() -> Result<SessionKey> {
    let mut bytes = [0u8; KEY_LEN];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| Error::KeyGeneration(format!("platform rng unavailable: {err}")))?;
    Ok(SessionKey { bytes })
}

/// A sealed secret: nonce plus ciphertext-with-tag.
///
/// Serialized as a single opaque string (`base64(nonce ‖ ciphertext ‖ tag)`)
/// for storage by the remote store. The key is never part of the blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherBlob {
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl CipherBlob {
    /// The nonce this blob was sealed under.
    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    /// Ciphertext including the trailing authentication tag.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Encode as the single opaque storage string.
    pub fn encode(&self) -> String {
        let mut raw = Vec::with_capacity(NONCE_LEN + self.ciphertext.len());
        raw.extend_from_slice(&self.nonce);
        raw.extend_from_slice(&self.ciphertext);
        BASE64.encode(raw)
    }

    /// Decode a storage string back into a blob.
    ///
    /// Malformed input is a [`Error::DecryptionFailure`]; no guessing.
    pub fn decode(encoded: &str) -> Result<Self> {
        let raw = BASE64
            .decode(encoded.trim())
            .map_err(|_| Error::DecryptionFailure("malformed cipher blob".to_string()))?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(Error::DecryptionFailure(
                "cipher blob too short".to_string(),
            ));
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(nonce_bytes);
        Ok(Self {
            nonce,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// Seal a plaintext secret under the session key.
///
/// A fresh random nonce is drawn for every call; nonce reuse under the same
/// key would break both confidentiality and integrity of GCM. The plaintext
/// is neither logged nor retained after return.
pub fn encrypt(key: &SessionKey, plaintext: &str) -> Result<CipherBlob> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|err| Error::KeyGeneration(format!("platform rng unavailable: {err}")))?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|_| Error::EncryptionFailure("aead seal failed".to_string()))?;

    Ok(CipherBlob { nonce, ciphertext })
}

/// Open a sealed secret.
///
/// The authentication tag is verified before any plaintext is released; a
/// mismatch (wrong key, tampered ciphertext, corrupted nonce) yields
/// [`Error::DecryptionFailure`] and never partial output.
pub fn decrypt(key: &SessionKey, blob: &CipherBlob) -> Result<String> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&blob.nonce), blob.ciphertext.as_ref())
        .map_err(|_| Error::DecryptionFailure("authentication tag mismatch".to_string()))?;

    String::from_utf8(plaintext)
        .map_err(|_| Error::DecryptionFailure("plaintext is not valid utf-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let key = generate_key().unwrap();
        let blob = encrypt(&key, "hunter2").unwrap();
        assert_eq!(decrypt(&key, &blob).unwrap(), "hunter2");
    }

    #[test]
    fn test_round_trip_through_encoded_form() {
        let key = generate_key().unwrap();
        let encoded = encrypt(&key, "s3cr3t!").unwrap().encode();
        let blob = CipherBlob::decode(&encoded).unwrap();
        assert_eq!(decrypt(&key, &blob).unwrap(), "s3cr3t!");
    }

    #[test]
    fn test_empty_plaintext_round_trips() {
        let key = generate_key().unwrap();
        let blob = encrypt(&key, "").unwrap();
        assert_eq!(decrypt(&key, &blob).unwrap(), "");
    }

    #[test]
    fn test_nonces_are_unique_per_encryption() {
        let key = generate_key().unwrap();
        let first = encrypt(&key, "same plaintext").unwrap();
        let second = encrypt(&key, "same plaintext").unwrap();
        assert_ne!(first.nonce(), second.nonce());
        assert_ne!(first.ciphertext(), second.ciphertext());
    }

    #[test]
    fn test_tampered_ciphertext_is_rejected() {
        let key = generate_key().unwrap();
        let mut blob = encrypt(&key, "do not touch").unwrap();
        blob.ciphertext[0] ^= 0x01;
        assert!(matches!(
            decrypt(&key, &blob),
            Err(Error::DecryptionFailure(_))
        ));
    }

    #[test]
    fn test_tampered_tag_is_rejected() {
        let key = generate_key().unwrap();
        let mut blob = encrypt(&key, "do not touch").unwrap();
        let last = blob.ciphertext.len() - 1;
        blob.ciphertext[last] ^= 0x80;
        assert!(matches!(
            decrypt(&key, &blob),
            Err(Error::DecryptionFailure(_))
        ));
    }

    #[test]
    fn test_corrupted_nonce_is_rejected() {
        let key = generate_key().unwrap();
        let mut blob = encrypt(&key, "do not touch").unwrap();
        blob.nonce[0] ^= 0xFF;
        assert!(matches!(
            decrypt(&key, &blob),
            Err(Error::DecryptionFailure(_))
        ));
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let key = generate_key().unwrap();
        let other = generate_key().unwrap();
        let blob = encrypt(&key, "for one key only").unwrap();
        assert!(matches!(
            decrypt(&other, &blob),
            Err(Error::DecryptionFailure(_))
        ));
    }

    #[test]
    fn test_malformed_blob_is_rejected() {
        assert!(matches!(
            CipherBlob::decode("not base64 at all!!!"),
            Err(Error::DecryptionFailure(_))
        ));
        // Valid base64, but shorter than nonce + tag.
        let short = BASE64.encode([0u8; 8]);
        assert!(matches!(
            CipherBlob::decode(&short),
            Err(Error::DecryptionFailure(_))
        ));
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = generate_key().unwrap();
        assert_eq!(format!("{key:?}"), "SessionKey(..)");
    }
}
