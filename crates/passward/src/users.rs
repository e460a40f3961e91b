//! Users authorized on a vault
//!
//! Each user gets `users/<email>/` holding two files:
//! - `key`: their public key, exactly as they supplied it
//! - `encrypted_master`: the vault master key wrapped for that key, base64

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cipher::MasterKey;
use crate::error::{PasswardError, Result};
use crate::fsutil;
use crate::keyring::{Keyring, PublicKey};

const USERS_DIR: &str = "users";
const KEY_FILE: &str = "key";
const WRAPPED_KEY_FILE: &str = "encrypted_master";

/// One collaborator's access record
#[derive(Debug, Clone)]
pub struct VaultUser {
    path: PathBuf,
    email: String,
    public_key: PublicKey,
    wrapped_master_key: String,
}

impl VaultUser {
    fn read(path: &Path, email: &str) -> Result<Self> {
        let key_text = fs::read_to_string(path.join(KEY_FILE))?;
        let public_key = PublicKey::parse(&key_text)?;
        let wrapped_master_key = fs::read_to_string(path.join(WRAPPED_KEY_FILE))?;

        Ok(Self {
            path: path.to_path_buf(),
            email: email.to_string(),
            public_key,
            wrapped_master_key: wrapped_master_key.trim().to_string(),
        })
    }

    fn save(&self) -> Result<()> {
        fsutil::create_private_dir(&self.path)?;
        fsutil::write_private(&self.path.join(KEY_FILE), self.public_key.as_str().as_bytes())?;
        fsutil::write_private(
            &self.path.join(WRAPPED_KEY_FILE),
            self.wrapped_master_key.as_bytes(),
        )?;
        Ok(())
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Public key text as stored for this user
    pub fn public_key_string(&self) -> &str {
        self.public_key.as_str()
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Base64 of the master key wrapped under this user's public key
    pub fn wrapped_master_key(&self) -> &str {
        &self.wrapped_master_key
    }

    /// Recover the master key with the user's own keyring
    pub fn unwrap_master_key(&self, keyring: &Keyring) -> Result<MasterKey> {
        MasterKey::from_bytes(keyring.decrypt_base64(&self.wrapped_master_key)?)
    }
}

/// The `users/` directory of one vault
#[derive(Debug)]
pub struct VaultUsers {
    path: PathBuf,
    users: BTreeMap<String, VaultUser>,
}

impl VaultUsers {
    /// Empty registry rooted at `<vault>/users`
    pub fn new(vault_path: &Path) -> Self {
        Self {
            path: vault_path.join(USERS_DIR),
            users: BTreeMap::new(),
        }
    }

    /// Read back every user in the directory. A missing directory is empty.
    pub fn load(vault_path: &Path) -> Result<Self> {
        let mut registry = Self::new(vault_path);
        if !registry.path.is_dir() {
            return Ok(registry);
        }

        for (email, dir) in fsutil::visible_subdirs(&registry.path)? {
            let user = VaultUser::read(&dir, &email)?;
            registry.users.insert(email, user);
        }
        tracing::debug!(
            "loaded {} user(s) from {}",
            registry.users.len(),
            registry.path.display()
        );
        Ok(registry)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Authorize `email`, wrapping `master_key` under their public key
    pub fn add_user(
        &mut self,
        email: &str,
        public_key: &str,
        master_key: &MasterKey,
    ) -> Result<&VaultUser> {
        fsutil::validate_name("user", email)?;
        if self.users.contains_key(email) {
            return Err(PasswardError::conflict("user", email));
        }

        let public_key = PublicKey::parse(public_key)?;
        let wrapped_master_key = public_key.encrypt_to_base64(master_key.as_bytes())?;
        let user = VaultUser {
            path: self.path.join(email),
            email: email.to_string(),
            public_key,
            wrapped_master_key,
        };

        fsutil::ensure_tracked_dir(&self.path)?;
        user.save()?;
        Ok(self.users.entry(email.to_string()).or_insert(user))
    }

    /// Revoke `email`'s record. The master key itself is unchanged.
    pub fn remove_user(&mut self, email: &str) -> Result<()> {
        let user = self
            .users
            .remove(email)
            .ok_or_else(|| PasswardError::not_found("user", email))?;
        fs::remove_dir_all(&user.path)?;
        Ok(())
    }

    pub fn lookup_by_email(&self, email: &str) -> Option<&VaultUser> {
        self.users.get(email)
    }

    /// Unwrap `email`'s copy of the master key with `keyring`
    pub fn unwrap_master_key(&self, email: &str, keyring: &Keyring) -> Result<MasterKey> {
        self.lookup_by_email(email)
            .ok_or_else(|| PasswardError::not_found("user", email))?
            .unwrap_master_key(keyring)
    }

    /// Users in email order
    pub fn iter(&self) -> impl Iterator<Item = &VaultUser> {
        self.users.values()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
