//! Error types for passward

use passward_core::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Problems with a user's key files or the passphrase protecting them
#[derive(Error, Debug)]
pub enum KeyMaterialError {
    #[error("cannot read key file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed public key: {0}")]
    MalformedPublicKey(String),

    #[error("malformed private key {0}")]
    MalformedPrivateKey(PathBuf),

    #[error("private key {0} is passphrase protected, a passphrase is required")]
    PassphraseRequired(PathBuf),

    #[error("wrong passphrase for private key {0}")]
    WrongPassphrase(PathBuf),

    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),

    #[error("private key {private} does not belong to public key {public}")]
    KeyPairMismatch { public: PathBuf, private: PathBuf },
}

/// passward errors
#[derive(Error, Debug)]
pub enum PasswardError {
    #[error(transparent)]
    KeyMaterial(#[from] KeyMaterialError),

    /// Decryption failed an integrity check: wrong key, or corrupted data
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("{what} not found: {name}")]
    NotFound { what: &'static str, name: String },

    #[error("{what} already exists: {name}")]
    Conflict { what: &'static str, name: String },

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("credentials are locked, unlock them first")]
    NotUnlocked,

    #[error("requested key size {requested} exceeds the {max} byte digest")]
    KeyDerivation { requested: usize, max: usize },

    #[error("not enough randomness available: {0}")]
    Random(String),

    #[error("refusing to wrap {len} bytes, key wrapping is limited to {max}")]
    WrapTooLarge { len: usize, max: usize },

    #[error("invalid {what} name: {name:?}")]
    InvalidName { what: &'static str, name: String },

    #[error("cannot remove {0}, the last user of the vault")]
    LastUser(String),

    #[error("cannot parse {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("cannot serialize config: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("field {0} does not decrypt to valid UTF-8")]
    InvalidUtf8(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PasswardError {
    pub(crate) fn not_found(what: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            name: name.into(),
        }
    }

    pub(crate) fn conflict(what: &'static str, name: impl Into<String>) -> Self {
        Self::Conflict {
            what,
            name: name.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PasswardError>;
