//! SSH key pairs as encryption identities
//!
//! A user's existing ssh key pair doubles as their vault identity: the public
//! key (authorized_keys format) wraps master keys, the private key unwraps
//! them. Wrapping uses age's ssh recipient stanzas (X25519 for ed25519 keys,
//! RSA-OAEP for rsa keys).

use age::secrecy::SecretString;
use age::ssh::{Identity as SshIdentity, ParseRecipientKeyError, Recipient};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::fmt;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use zeroize::Zeroizing;

use crate::error::{KeyMaterialError, PasswardError, Result};

/// Largest blob the asymmetric primitive will wrap; it is for keys, not data
pub const MAX_WRAP_LEN: usize = 1024;

/// A parsed public key, together with the exact text it was parsed from
#[derive(Clone)]
pub struct PublicKey {
    text: String,
    recipient: Recipient,
}

impl PublicKey {
    /// Parse a single-line authorized key (`ssh-ed25519 AAAA... comment`)
    pub fn parse(text: &str) -> std::result::Result<Self, KeyMaterialError> {
        // type and base64 body; any trailing comment is not part of the key
        let key: Vec<&str> = text.split_whitespace().take(2).collect();
        if key.len() != 2 {
            return Err(KeyMaterialError::MalformedPublicKey(
                "expected `<type> <base64 key> [comment]`".to_string(),
            ));
        }

        let recipient = Recipient::from_str(&key.join(" ")).map_err(|e| match e {
            ParseRecipientKeyError::Unsupported(key_type) => {
                KeyMaterialError::UnsupportedKeyType(key_type)
            }
            ParseRecipientKeyError::RsaModulusTooSmall => KeyMaterialError::UnsupportedKeyType(
                "ssh-rsa with a modulus below 2048 bits".to_string(),
            ),
            ParseRecipientKeyError::RsaModulusTooLarge => KeyMaterialError::UnsupportedKeyType(
                "ssh-rsa with an oversized modulus".to_string(),
            ),
            ParseRecipientKeyError::Invalid(reason) => {
                KeyMaterialError::MalformedPublicKey(reason.to_string())
            }
            ParseRecipientKeyError::Ignore => {
                KeyMaterialError::MalformedPublicKey("not an ssh public key".to_string())
            }
        })?;

        Ok(Self {
            text: text.to_string(),
            recipient,
        })
    }

    /// The key exactly as it was supplied
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Normalized `<type> <base64>` form, without comment or whitespace
    pub fn canonical(&self) -> String {
        self.recipient.to_string()
    }

    /// Wrap a small blob so only the holder of the matching private key can
    /// recover it
    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        if plaintext.len() > MAX_WRAP_LEN {
            return Err(PasswardError::WrapTooLarge {
                len: plaintext.len(),
                max: MAX_WRAP_LEN,
            });
        }

        let recipients: Vec<Box<dyn age::Recipient + Send>> =
            vec![Box::new(self.recipient.clone())];
        let encryptor = age::Encryptor::with_recipients(recipients).ok_or_else(|| {
            PasswardError::KeyMaterial(KeyMaterialError::MalformedPublicKey(
                "no recipient".to_string(),
            ))
        })?;

        let mut wrapped = vec![];
        let mut writer = encryptor
            .wrap_output(&mut wrapped)
            .map_err(|e| PasswardError::Authentication(format!("key wrap failed: {}", e)))?;
        writer.write_all(plaintext)?;
        writer.finish()?;

        Ok(wrapped)
    }

    /// [`encrypt_bytes`](Self::encrypt_bytes), base64 encoded
    pub fn encrypt_to_base64(&self, plaintext: &[u8]) -> Result<String> {
        Ok(STANDARD.encode(self.encrypt_bytes(plaintext)?))
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for PublicKey {}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKey").field(&self.canonical()).finish()
    }
}

impl FromStr for PublicKey {
    type Err = KeyMaterialError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A user's loaded key pair.
///
/// Only ever fully constructed: [`Keyring::load`] either parses and checks
/// both halves or fails.
pub struct Keyring {
    public_key: PublicKey,
    public_key_path: PathBuf,
    private_key_path: PathBuf,
    identity: SshIdentity,
}

impl Keyring {
    /// Load a key pair, decrypting the private key with `passphrase` when it
    /// is protected
    pub fn load(public_key_path: &Path, private_key_path: &Path, passphrase: &str) -> Result<Self> {
        let public_text = fs::read_to_string(public_key_path).map_err(|source| {
            KeyMaterialError::Unreadable {
                path: public_key_path.to_path_buf(),
                source,
            }
        })?;
        let public_key = PublicKey::parse(&public_text)?;

        let private_text = Zeroizing::new(fs::read_to_string(private_key_path).map_err(
            |source| KeyMaterialError::Unreadable {
                path: private_key_path.to_path_buf(),
                source,
            },
        )?);
        let identity = unlock_private_key(private_key_path, &private_text, passphrase)?;

        // the private key carries its own public half; it must be the same key
        let derived = Recipient::try_from(identity.clone()).map_err(|_| {
            KeyMaterialError::MalformedPrivateKey(private_key_path.to_path_buf())
        })?;
        if derived.to_string() != public_key.canonical() {
            return Err(KeyMaterialError::KeyPairMismatch {
                public: public_key_path.to_path_buf(),
                private: private_key_path.to_path_buf(),
            }
            .into());
        }

        tracing::debug!("loaded key pair {}", public_key_path.display());

        Ok(Self {
            public_key,
            public_key_path: public_key_path.to_path_buf(),
            private_key_path: private_key_path.to_path_buf(),
            identity,
        })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// The public key file's contents, byte for byte
    pub fn public_key_string(&self) -> &str {
        self.public_key.as_str()
    }

    pub fn public_key_path(&self) -> &Path {
        &self.public_key_path
    }

    pub fn private_key_path(&self) -> &Path {
        &self.private_key_path
    }

    /// Wrap a small blob under this key pair's own public key
    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.public_key.encrypt_bytes(plaintext)
    }

    /// Unwrap a blob wrapped for this key pair
    pub fn decrypt_bytes(&self, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let decryptor = match age::Decryptor::new(wrapped)
            .map_err(|e| PasswardError::Authentication(e.to_string()))?
        {
            age::Decryptor::Recipients(d) => d,
            _ => {
                return Err(PasswardError::Authentication(
                    "unexpected passphrase encryption".to_string(),
                ))
            }
        };

        let mut reader = decryptor
            .decrypt(std::iter::once(&self.identity as &dyn age::Identity))
            .map_err(|e| match e {
                age::DecryptError::NoMatchingKeys => PasswardError::Authentication(
                    "not wrapped for this key pair".to_string(),
                ),
                other => PasswardError::Authentication(other.to_string()),
            })?;

        let mut plaintext = Zeroizing::new(vec![]);
        reader
            .read_to_end(&mut plaintext)
            .map_err(|e| PasswardError::Authentication(e.to_string()))?;
        Ok(plaintext)
    }

    /// [`encrypt_bytes`](Self::encrypt_bytes), base64 encoded
    pub fn encrypt_to_base64(&self, plaintext: &[u8]) -> Result<String> {
        self.public_key.encrypt_to_base64(plaintext)
    }

    /// Inverse of [`encrypt_to_base64`](Self::encrypt_to_base64)
    pub fn decrypt_base64(&self, encoded: &str) -> Result<Zeroizing<Vec<u8>>> {
        let wrapped = STANDARD
            .decode(encoded.trim())
            .map_err(|e| PasswardError::Authentication(format!("corrupted wrapped key: {}", e)))?;
        self.decrypt_bytes(&wrapped)
    }
}

impl fmt::Debug for Keyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyring")
            .field("public_key", &self.public_key)
            .field("private_key_path", &self.private_key_path)
            .finish_non_exhaustive()
    }
}

/// Parse a private key file, returning it in decrypted form
fn unlock_private_key(path: &Path, text: &str, passphrase: &str) -> Result<SshIdentity> {
    let identity = SshIdentity::from_buffer(text.as_bytes(), Some(path.display().to_string()))
        .map_err(|_| KeyMaterialError::MalformedPrivateKey(path.to_path_buf()))?;

    match identity {
        SshIdentity::Unencrypted(key) => Ok(SshIdentity::Unencrypted(key)),
        SshIdentity::Encrypted(encrypted) => {
            if passphrase.is_empty() {
                return Err(KeyMaterialError::PassphraseRequired(path.to_path_buf()).into());
            }
            let key = encrypted
                .decrypt(SecretString::new(passphrase.to_string()))
                .map_err(|_| KeyMaterialError::WrongPassphrase(path.to_path_buf()))?;
            Ok(SshIdentity::Unencrypted(key))
        }
        SshIdentity::Unsupported(_) => Err(KeyMaterialError::UnsupportedKeyType(format!(
            "private key {}",
            path.display()
        ))
        .into()),
    }
}
