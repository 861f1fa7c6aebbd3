//! Encryption manager.
//!
//! One persisted master key; every rotation window gets its own data key,
//! derived with HKDF-SHA256 using the key id as context. Derived keys live only
//! in memory and can always be re-derived from the master key and the key id
//! recorded in a job's metadata.

use crate::config::EncryptionConfig;
use crate::utils::{EngineError, Result};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine as _;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hkdf::Hkdf;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Mutex;
use tracing::info;

pub const IV_LEN: usize = 12;

const KEY_ID_PREFIX: &str = "key-w";
const HKDF_SALT: &[u8] = b"clinic-backup-engine::data-key";

/// Output of a single encryption.
#[derive(Debug, Clone)]
pub struct EncryptedPayload {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; IV_LEN],
    /// Hex SHA-256 of `ciphertext`.
    pub integrity_hash: String,
}

impl EncryptedPayload {
    pub fn iv_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.iv)
    }
}

pub struct EncryptionManager {
    master_key: [u8; 32],
    rotation_secs: i64,
    cache: DashMap<String, [u8; 32]>,
    current: Mutex<Option<String>>,
}

impl EncryptionManager {
    pub fn new(master_key: [u8; 32], rotation_days: u32) -> Self {
        Self {
            master_key,
            rotation_secs: rotation_days.max(1) as i64 * 86_400,
            cache: DashMap::new(),
            current: Mutex::new(None),
        }
    }

    pub fn from_config(config: &EncryptionConfig) -> Result<Self> {
        Ok(Self::new(config.decode_master_key()?, config.rotation_days))
    }

    pub fn window_of(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp().div_euclid(self.rotation_secs)
    }

    /// Key id for the rotation window containing `now`. A new key is derived
    /// only when the window changes.
    pub fn key_for_window(&self, now: DateTime<Utc>) -> Result<String> {
        let key_id = format!("{KEY_ID_PREFIX}{}", self.window_of(now));
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if current.as_deref() != Some(key_id.as_str()) {
            self.key(&key_id)?;
            if let Some(previous) = current.as_deref() {
                info!(previous = %previous, key_id = %key_id, "Encryption key rotated");
            }
            *current = Some(key_id.clone());
        }
        Ok(key_id)
    }

    pub fn encrypt(&self, plaintext: &[u8], key_id: &str) -> Result<EncryptedPayload> {
        let key = self.key(key_id)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));

        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|e| EngineError::Crypto(format!("encryption failed: {e}")))?;
        let integrity_hash = sha256_hex(&ciphertext);

        Ok(EncryptedPayload {
            ciphertext,
            iv,
            integrity_hash,
        })
    }

    pub fn decrypt(&self, ciphertext: &[u8], key_id: &str, iv: &[u8]) -> Result<Vec<u8>> {
        if iv.len() != IV_LEN {
            return Err(EngineError::Crypto(format!(
                "iv must be {IV_LEN} bytes, got {}",
                iv.len()
            )));
        }
        let key = self.key(key_id)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        cipher
            .decrypt(Nonce::from_slice(iv), ciphertext)
            .map_err(|_| EngineError::Crypto(format!("decryption with {key_id} failed")))
    }

    fn key(&self, key_id: &str) -> Result<[u8; 32]> {
        if let Some(key) = self.cache.get(key_id) {
            return Ok(*key);
        }
        let key = self.derive(key_id)?;
        self.cache.insert(key_id.to_string(), key);
        Ok(key)
    }

    fn derive(&self, key_id: &str) -> Result<[u8; 32]> {
        let valid = key_id
            .strip_prefix(KEY_ID_PREFIX)
            .is_some_and(|w| w.parse::<i64>().is_ok());
        if !valid {
            return Err(EngineError::Crypto(format!("malformed key id '{key_id}'")));
        }

        let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), &self.master_key);
        let mut okm = [0u8; 32];
        hk.expand(key_id.as_bytes(), &mut okm)
            .map_err(|e| EngineError::Crypto(format!("key derivation failed: {e}")))?;
        Ok(okm)
    }
}

pub fn decode_iv(encoded: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| EngineError::Crypto(format!("iv is not valid base64: {e}")))
}

pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Fresh random master key, base64-encoded for configuration files.
pub fn generate_master_key() -> String {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    base64::engine::general_purpose::STANDARD.encode(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn manager() -> EncryptionManager {
        EncryptionManager::new([7u8; 32], 90)
    }

    #[test]
    fn test_round_trip() {
        let crypto = manager();
        let key_id = crypto.key_for_window(Utc::now()).unwrap();
        for payload in [&b""[..], &b"x"[..], &b"patient record payload"[..], &[0u8; 4096][..]] {
            let sealed = crypto.encrypt(payload, &key_id).unwrap();
            let opened = crypto.decrypt(&sealed.ciphertext, &key_id, &sealed.iv).unwrap();
            assert_eq!(opened, payload);
        }
    }

    #[test]
    fn test_integrity_hash_covers_ciphertext() {
        let crypto = manager();
        let key_id = crypto.key_for_window(Utc::now()).unwrap();
        let sealed = crypto.encrypt(b"snapshot", &key_id).unwrap();
        assert_eq!(sealed.integrity_hash, sha256_hex(&sealed.ciphertext));
        assert_eq!(sealed.integrity_hash.len(), 64);
    }

    #[test]
    fn test_fresh_iv_per_encryption() {
        let crypto = manager();
        let key_id = crypto.key_for_window(Utc::now()).unwrap();
        let a = crypto.encrypt(b"same", &key_id).unwrap();
        let b = crypto.encrypt(b"same", &key_id).unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_key_rotates_only_on_window_change() {
        let crypto = manager();
        let t0 = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        let k0 = crypto.key_for_window(t0).unwrap();
        assert_eq!(crypto.key_for_window(t0 + Duration::days(1)).unwrap(), k0);
        assert_eq!(crypto.cache.len(), 1);

        let k1 = crypto.key_for_window(t0 + Duration::days(90)).unwrap();
        assert_ne!(k0, k1);
        assert_eq!(crypto.cache.len(), 2);
    }

    #[test]
    fn test_old_keys_rederive_after_restart() {
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let before = manager();
        let old_id = before.key_for_window(t0).unwrap();
        let sealed = before.encrypt(b"history", &old_id).unwrap();

        // New process, later window, same master key
        let after = manager();
        after.key_for_window(t0 + Duration::days(400)).unwrap();
        let opened = after.decrypt(&sealed.ciphertext, &old_id, &sealed.iv).unwrap();
        assert_eq!(opened, b"history");
    }

    #[test]
    fn test_wrong_key_fails() {
        let crypto = manager();
        let sealed = crypto.encrypt(b"secret", "key-w1").unwrap();
        assert!(crypto.decrypt(&sealed.ciphertext, "key-w2", &sealed.iv).is_err());
        assert!(crypto.encrypt(b"secret", "not-a-key").is_err());
    }

    #[test]
    fn test_generated_master_key_decodes() {
        let config = EncryptionConfig {
            master_key: generate_master_key(),
            rotation_days: 90,
        };
        assert!(EncryptionManager::from_config(&config).is_ok());
    }
}
