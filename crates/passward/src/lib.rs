//! passward - Shared secret vaults keyed by your ssh key pair
//!
//! "Your ssh key already proves who you are. Let it open the vault too."
//!
//! A vault holds entries (site, username, passphrase, description) whose
//! fields are each encrypted under one random master key. That master key is
//! never written in the clear; every member gets their own copy wrapped under
//! their ssh public key, so any member can recover it with their private key
//! alone, and granting access is just wrapping one more copy.
//!
//! Vault directories are snapshotted and shared with git (see
//! [`passward_core::GitStore`]); git only ever sees ciphertext.

pub mod cipher;
pub mod entries;
pub mod error;
mod fsutil;
pub mod keyring;
pub mod registry;
pub mod session;
pub mod users;
pub mod vault;

pub use cipher::MasterKey;
pub use entries::{Entry, RevealedEntry, VaultEntries};
pub use error::{KeyMaterialError, PasswardError, Result};
pub use keyring::{Keyring, PublicKey};
pub use registry::{Passward, RegistryConfig};
pub use session::{Identity, Session, SessionState};
pub use users::{VaultUser, VaultUsers};
pub use vault::{OpContext, Vault, VaultConfig};
