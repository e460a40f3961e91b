//! Symmetric authenticated encryption for entry fields.
//!
//! The secret handed to [`encrypt`] can be anything: a passphrase typed by a
//! human or a vault's random [`MasterKey`]. It is hashed with SHA-256 down to
//! the cipher's key size, so both kinds of secret go through one primitive.
//!
//! Blob layout: `[nonce: 24 bytes][ciphertext + Poly1305 tag: N + 16 bytes]`.

use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::Zeroizing;

use crate::error::{PasswardError, Result};

/// Key size for XChaCha20-Poly1305
pub const KEY_LEN: usize = 32;

/// Nonce size for XChaCha20-Poly1305
pub const NONCE_LEN: usize = 24;

/// Poly1305 tag size
const TAG_LEN: usize = 16;

/// Size of a vault master key
pub const MASTER_KEY_LEN: usize = 128;

/// Derive a `size`-byte key from an arbitrary secret.
///
/// Uses the first `size` bytes of `SHA-256(secret)`; asking for more than the
/// digest holds is an error.
pub fn derive_key(secret: &[u8], size: usize) -> Result<Zeroizing<Vec<u8>>> {
    let digest = Zeroizing::new(Sha256::digest(secret).to_vec());
    if size > digest.len() {
        return Err(PasswardError::KeyDerivation {
            requested: size,
            max: digest.len(),
        });
    }
    Ok(Zeroizing::new(digest[..size].to_vec()))
}

/// Fill a buffer of `len` bytes from the operating system RNG
pub fn random_bytes(len: usize) -> Result<Zeroizing<Vec<u8>>> {
    let mut bytes = Zeroizing::new(vec![0u8; len]);
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| PasswardError::Random(e.to_string()))?;
    Ok(bytes)
}

fn cipher_for(secret: &[u8]) -> Result<XChaCha20Poly1305> {
    let key = derive_key(secret, KEY_LEN)?;
    XChaCha20Poly1305::new_from_slice(&key)
        .map_err(|_| PasswardError::KeyDerivation {
            requested: KEY_LEN,
            max: key.len(),
        })
}

/// Encrypt `plaintext` under `secret`, returning `nonce || sealed`
#[allow(deprecated)] // upstream generic-array 0.x deprecation
pub fn encrypt(secret: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher_for(secret)?;
    let nonce_bytes = random_bytes(NONCE_LEN)?;
    let nonce = XNonce::from_slice(&nonce_bytes);

    let sealed = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| PasswardError::Authentication(format!("encryption failed: {}", e)))?;

    let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&sealed);
    Ok(blob)
}

/// Decrypt a blob produced by [`encrypt`]
#[allow(deprecated)]
pub fn decrypt(secret: &[u8], blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < NONCE_LEN + TAG_LEN {
        return Err(PasswardError::Authentication(
            "ciphertext too short".to_string(),
        ));
    }

    let (nonce_bytes, sealed) = blob.split_at(NONCE_LEN);
    let cipher = cipher_for(secret)?;

    cipher
        .decrypt(XNonce::from_slice(nonce_bytes), sealed)
        .map_err(|_| {
            PasswardError::Authentication("wrong key or corrupted ciphertext".to_string())
        })
}

/// [`encrypt`], base64 encoded for storage in a text file
pub fn encrypt_to_base64(secret: &[u8], plaintext: &[u8]) -> Result<String> {
    Ok(STANDARD.encode(encrypt(secret, plaintext)?))
}

/// Inverse of [`encrypt_to_base64`]. Invalid base64 counts as corruption.
pub fn decrypt_base64(secret: &[u8], encoded: &str) -> Result<Vec<u8>> {
    let blob = STANDARD
        .decode(encoded.trim())
        .map_err(|e| PasswardError::Authentication(format!("corrupted ciphertext: {}", e)))?;
    decrypt(secret, &blob)
}

/// A vault's symmetric master key.
///
/// Only ever lives in memory for the length of one operation; the buffer is
/// zeroed when dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct MasterKey(Zeroizing<Vec<u8>>);

impl MasterKey {
    /// Generate a fresh random master key
    pub fn generate() -> Result<Self> {
        Ok(Self(random_bytes(MASTER_KEY_LEN)?))
    }

    /// Wrap bytes recovered from a user's wrapped copy
    pub fn from_bytes(bytes: Zeroizing<Vec<u8>>) -> Result<Self> {
        if bytes.len() != MASTER_KEY_LEN {
            return Err(PasswardError::Authentication(format!(
                "unwrapped master key has wrong length: {} (expected {})",
                bytes.len(),
                MASTER_KEY_LEN
            )));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}
