//! Encryption of the level2 target parameter.
//!
//! The downstream level2 writer decrypts the `d` query parameter of a job's
//! target url to learn which scan, freqmode and project a result belongs to.
//! Both ends use AES in EAX mode keyed by the shared `ODIN_SECRET`
//! (standard base64), and exchange URL-safe base64 of
//! `nonce(16) || tag(16) || ciphertext`.

use std::fmt;

use aes::{Aes128, Aes192, Aes256};
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use eax::aead::{Aead, KeyInit, Nonce};
use eax::Eax;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::CoreError;

const NONCE_LEN: usize = 16;
const TAG_LEN: usize = 16;

#[derive(Clone)]
pub struct TargetCipher {
    key: Vec<u8>,
}

impl fmt::Debug for TargetCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetCipher")
            .field("key_len", &self.key.len())
            .finish()
    }
}

impl TargetCipher {
    /// Decode the base64 shared secret. AES-128/192/256 keys are accepted.
    pub fn from_secret(secret: &str) -> Result<Self, CoreError> {
        let key = STANDARD
            .decode(secret.trim())
            .map_err(|e| CoreError::Cipher(format!("secret is not valid base64: {e}")))?;
        match key.len() {
            16 | 24 | 32 => Ok(Self { key }),
            n => Err(CoreError::Cipher(format!(
                "secret must decode to 16, 24 or 32 bytes, got {n}"
            ))),
        }
    }

    pub fn encrypt(&self, msg: &str) -> Result<String, CoreError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        // EAX appends the tag to the ciphertext.
        let sealed = match self.key.len() {
            16 => seal::<Eax<Aes128>>(&self.key, &nonce, msg.as_bytes()),
            24 => seal::<Eax<Aes192>>(&self.key, &nonce, msg.as_bytes()),
            _ => seal::<Eax<Aes256>>(&self.key, &nonce, msg.as_bytes()),
        }?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(tag);
        out.extend_from_slice(ciphertext);
        Ok(URL_SAFE.encode(out))
    }

    pub fn decrypt(&self, token: &str) -> Result<String, CoreError> {
        let raw = URL_SAFE
            .decode(token)
            .map_err(|e| CoreError::Cipher(format!("token is not valid base64: {e}")))?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(CoreError::Cipher(format!(
                "token too short: {} bytes",
                raw.len()
            )));
        }
        let (nonce, rest) = raw.split_at(NONCE_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        let mut combined = ciphertext.to_vec();
        combined.extend_from_slice(tag);

        let plaintext = match self.key.len() {
            16 => open::<Eax<Aes128>>(&self.key, nonce, &combined),
            24 => open::<Eax<Aes192>>(&self.key, nonce, &combined),
            _ => open::<Eax<Aes256>>(&self.key, nonce, &combined),
        }?;
        String::from_utf8(plaintext)
            .map_err(|e| CoreError::Cipher(format!("plaintext is not utf-8: {e}")))
    }
}

fn seal<A: Aead + KeyInit>(key: &[u8], nonce: &[u8], msg: &[u8]) -> Result<Vec<u8>, CoreError> {
    let cipher = A::new_from_slice(key)
        .map_err(|e| CoreError::Cipher(format!("failed to create cipher: {e}")))?;
    cipher
        .encrypt(Nonce::<A>::from_slice(nonce), msg)
        .map_err(|e| CoreError::Cipher(format!("encryption failed: {e}")))
}

fn open<A: Aead + KeyInit>(key: &[u8], nonce: &[u8], sealed: &[u8]) -> Result<Vec<u8>, CoreError> {
    let cipher = A::new_from_slice(key)
        .map_err(|e| CoreError::Cipher(format!("failed to create cipher: {e}")))?;
    cipher
        .decrypt(Nonce::<A>::from_slice(nonce), sealed)
        .map_err(|e| CoreError::Cipher(format!("decryption failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_secret(len: usize) -> String {
        let mut key = vec![0u8; len];
        OsRng.fill_bytes(&mut key);
        STANDARD.encode(key)
    }

    #[test]
    fn test_encrypt_preserves_message() {
        for len in [16, 24, 32] {
            let cipher = TargetCipher::from_secret(&random_secret(len)).unwrap();
            for msg in ["hello", "", "{\"ScanID\": 1, \"Project\": \"åäö ✓\"}"] {
                let token = cipher.encrypt(msg).unwrap();
                assert_eq!(cipher.decrypt(&token).unwrap(), msg);
            }
        }
    }

    #[test]
    fn test_token_layout() {
        let cipher = TargetCipher::from_secret(&random_secret(16)).unwrap();
        let token = cipher.encrypt("hello").unwrap();
        let raw = URL_SAFE.decode(&token).unwrap();
        assert_eq!(raw.len(), NONCE_LEN + TAG_LEN + "hello".len());
        assert!(!token.contains('+') && !token.contains('/'));
    }

    #[test]
    fn test_nonce_differs_between_calls() {
        let cipher = TargetCipher::from_secret(&random_secret(16)).unwrap();
        assert_ne!(cipher.encrypt("same").unwrap(), cipher.encrypt("same").unwrap());
    }

    #[test]
    fn test_wrong_key_fails() {
        let a = TargetCipher::from_secret(&random_secret(16)).unwrap();
        let b = TargetCipher::from_secret(&random_secret(16)).unwrap();
        let token = a.encrypt("hello").unwrap();
        assert!(b.decrypt(&token).is_err());
    }

    #[test]
    fn test_tampered_token_fails() {
        let cipher = TargetCipher::from_secret(&random_secret(16)).unwrap();
        let mut raw = URL_SAFE.decode(cipher.encrypt("hello").unwrap()).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        assert!(cipher.decrypt(&URL_SAFE.encode(raw)).is_err());
    }

    #[test]
    fn test_bad_secret_rejected() {
        assert!(TargetCipher::from_secret("not base64!").is_err());
        assert!(TargetCipher::from_secret(&STANDARD.encode([0u8; 10])).is_err());
    }
}
