//! Encryption strategies for legacy envelopes, and the registry that maps the
//! 16-byte identifier stored in an envelope header to a strategy.
//!
//! Two strategies ship with the crate:
//!
//! | Id (16 B, space padded) | Strategy           |
//! |-------------------------|--------------------|
//! | `noencryption    `      | [`NoEncryption`]   |
//! | `aes256          `      | [`Aes256Encryptor`]|
//!
//! Password-based payload layout:
//! `[ salt (8 B) | nonce (12 B) | ciphertext | GCM tag (16 B) ]`
//! with key = Argon2id(password, salt) → 32 bytes.

use std::collections::HashMap;
use std::sync::OnceLock;

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng as AeadOsRng};
use aes_gcm::Aes256Gcm;
use argon2::{Algorithm, Argon2, Params, Version};
use thiserror::Error;

/// Width of an encryptor identifier as stored in the envelope header.
pub const ENCRYPTOR_ID_LEN: usize = 16;
/// Byte length of the Argon2id salt prepended to every password-encrypted payload.
pub const SALT_LEN: usize = 8;
/// Byte length of the AES-GCM nonce following the salt.
pub const NONCE_LEN: usize = 12;

pub const NO_ENCRYPTION_ID: &[u8; ENCRYPTOR_ID_LEN] = b"noencryption    ";
pub const AES256_ID:        &[u8; ENCRYPTOR_ID_LEN] = b"aes256          ";

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed: wrong password or corrupted data")]
    DecryptionFailed,
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("Encrypted payload too short (minimum {} bytes)", SALT_LEN + NONCE_LEN)]
    TooShort,
    #[error("this backup is encrypted and hence requires a password to decrypt and convert")]
    MissingKey,
    #[error("invalid encryptor id size for {id:?}: {len} (expected {ENCRYPTOR_ID_LEN})")]
    InvalidId { id: String, len: usize },
    #[error("unknown encryptor: {0}")]
    UnknownEncryptor(String),
}

// ── Encryptor trait ─────────────────────────────────────────────────────────

pub trait Encryptor: Send + Sync {
    fn id(&self) -> &[u8; ENCRYPTOR_ID_LEN];
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;
    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// Render an identifier for diagnostics, trimming the padding.
pub fn id_to_string(id: &[u8]) -> String {
    String::from_utf8_lossy(id)
        .trim_end_matches(|c: char| c == ' ' || c == '\0')
        .to_owned()
}

// ── Built-in strategies ─────────────────────────────────────────────────────

/// Identity strategy: payload is stored verbatim.
pub struct NoEncryption;

impl Encryptor for NoEncryption {
    fn id(&self) -> &[u8; ENCRYPTOR_ID_LEN] { NO_ENCRYPTION_ID }
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> { Ok(plaintext.to_vec()) }
    fn decrypt(&self, data: &[u8])      -> Result<Vec<u8>, CryptoError> { Ok(data.to_vec()) }
}

/// AES-256-GCM with a per-payload Argon2id key.
pub struct Aes256Encryptor {
    password: String,
}

impl Aes256Encryptor {
    /// Fails with [`CryptoError::MissingKey`] when no (or an empty) password is given.
    pub fn new(password: Option<&str>) -> Result<Self, CryptoError> {
        match password {
            Some(p) if !p.is_empty() => Ok(Self { password: p.to_owned() }),
            _ => Err(CryptoError::MissingKey),
        }
    }
}

impl std::fmt::Debug for Aes256Encryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aes256Encryptor").field("password", &"[REDACTED]").finish()
    }
}

impl Encryptor for Aes256Encryptor {
    fn id(&self) -> &[u8; ENCRYPTOR_ID_LEN] { AES256_ID }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut salt = [0u8; SALT_LEN];
        AeadOsRng.fill_bytes(&mut salt);
        let key = derive_key(&self.password, &salt)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| CryptoError::EncryptionFailed)?;
        let nonce = Aes256Gcm::generate_nonce(&mut AeadOsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut out = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&salt);
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if data.len() < SALT_LEN + NONCE_LEN {
            return Err(CryptoError::TooShort);
        }
        let (salt, rest) = data.split_at(SALT_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
        let key = derive_key(&self.password, salt)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        cipher
            .decrypt(aes_gcm::Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

/// Derive a 256-bit key from a password and the payload salt using Argon2id.
pub fn derive_key(password: &str, salt: &[u8]) -> Result<[u8; 32], CryptoError> {
    let params = Params::new(64 * 1024, 1, 4, Some(32))
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = [0u8; 32];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

// ── Registry ────────────────────────────────────────────────────────────────

/// Builds a strategy, given the (optional) secret supplied by the caller.
pub type EncryptorCtor = fn(Option<&str>) -> Result<Box<dyn Encryptor>, CryptoError>;

#[derive(Default)]
pub struct EncryptorRegistry {
    entries: HashMap<[u8; ENCRYPTOR_ID_LEN], EncryptorCtor>,
}

impl EncryptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in strategies.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.entries.insert(*NO_ENCRYPTION_ID, |_| Ok(Box::new(NoEncryption)));
        registry.entries.insert(*AES256_ID, |secret| {
            Ok(Box::new(Aes256Encryptor::new(secret)?))
        });
        registry
    }

    /// Process-wide registry, populated once on first use and never mutated.
    pub fn global() -> &'static EncryptorRegistry {
        static GLOBAL: OnceLock<EncryptorRegistry> = OnceLock::new();
        GLOBAL.get_or_init(Self::with_builtins)
    }

    /// Register a strategy.  The id must be exactly [`ENCRYPTOR_ID_LEN`] bytes.
    pub fn register(&mut self, id: &str, ctor: EncryptorCtor) -> Result<(), CryptoError> {
        let key: [u8; ENCRYPTOR_ID_LEN] = id.as_bytes().try_into().map_err(|_| {
            CryptoError::InvalidId { id: id.to_owned(), len: id.len() }
        })?;
        self.entries.insert(key, ctor);
        Ok(())
    }

    pub fn contains(&self, id: &[u8]) -> bool {
        <[u8; ENCRYPTOR_ID_LEN]>::try_from(id)
            .map(|key| self.entries.contains_key(&key))
            .unwrap_or(false)
    }

    /// Look up `id` and construct its strategy with `secret`.
    pub fn resolve(&self, id: &[u8], secret: Option<&str>) -> Result<Box<dyn Encryptor>, CryptoError> {
        let ctor = <[u8; ENCRYPTOR_ID_LEN]>::try_from(id)
            .ok()
            .and_then(|key| self.entries.get(&key))
            .ok_or_else(|| CryptoError::UnknownEncryptor(id_to_string(id)))?;
        ctor(secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_roundtrip() {
        let enc = NoEncryption;
        let data = b"plain section archive".to_vec();
        assert_eq!(enc.decrypt(&enc.encrypt(&data).unwrap()).unwrap(), data);
    }

    #[test]
    fn aes_roundtrip() {
        let enc = Aes256Encryptor::new(Some("hunter2")).unwrap();
        let ciphertext = enc.encrypt(b"secret guild").unwrap();
        assert_ne!(&ciphertext[SALT_LEN + NONCE_LEN..], b"secret guild");
        assert_eq!(enc.decrypt(&ciphertext).unwrap(), b"secret guild");
    }

    #[test]
    fn aes_wrong_password() {
        let ciphertext = Aes256Encryptor::new(Some("right")).unwrap().encrypt(b"x").unwrap();
        let err = Aes256Encryptor::new(Some("wrong")).unwrap().decrypt(&ciphertext).unwrap_err();
        assert!(matches!(err, CryptoError::DecryptionFailed));
    }

    #[test]
    fn aes_requires_password() {
        assert!(matches!(Aes256Encryptor::new(None), Err(CryptoError::MissingKey)));
        assert!(matches!(Aes256Encryptor::new(Some("")), Err(CryptoError::MissingKey)));
    }

    #[test]
    fn aes_short_payload() {
        let enc = Aes256Encryptor::new(Some("pw")).unwrap();
        assert!(matches!(enc.decrypt(&[0u8; 10]), Err(CryptoError::TooShort)));
    }

    #[test]
    fn register_rejects_bad_width() {
        let mut registry = EncryptorRegistry::new();
        let err = registry
            .register("short", |_| Ok(Box::new(NoEncryption)))
            .unwrap_err();
        assert!(matches!(err, CryptoError::InvalidId { len: 5, .. }));
        registry
            .register("exactly16bytes!!", |_| Ok(Box::new(NoEncryption)))
            .unwrap();
        assert!(registry.contains(b"exactly16bytes!!"));
    }

    #[test]
    fn resolve_builtins() {
        let registry = EncryptorRegistry::global();
        assert_eq!(registry.resolve(NO_ENCRYPTION_ID, None).unwrap().id(), NO_ENCRYPTION_ID);
        assert!(matches!(registry.resolve(AES256_ID, None), Err(CryptoError::MissingKey)));
        assert!(matches!(
            registry.resolve(b"rot13           ", None),
            Err(CryptoError::UnknownEncryptor(name)) if name == "rot13"
        ));
    }
}
