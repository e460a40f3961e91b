//! Vault orchestration
//!
//! A vault directory looks like:
//! ```text
//! <vault>/
//!   config.toml            name, description, remote
//!   users/<email>/key
//!   users/<email>/encrypted_master
//!   entries/<entry>/<field>
//! ```
//! Every mutation unwraps the master key through the acting user's record
//! first, then changes files, then snapshots the directory through the
//! [`VaultStore`].

use passward_core::VaultStore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cipher::MasterKey;
use crate::entries::{RevealedEntry, VaultEntries};
use crate::error::{PasswardError, Result};
use crate::fsutil;
use crate::session::Session;
use crate::users::VaultUsers;

pub const CONFIG_FILE: &str = "config.toml";

/// Standard entry fields written by [`Vault::add_entry`]
pub const FIELD_USERNAME: &str = "username";
pub const FIELD_PASSPHRASE: &str = "passphrase";
pub const FIELD_DESCRIPTION: &str = "description";

/// On-disk vault settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_upstream: Option<String>,
}

impl VaultConfig {
    fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PasswardError::not_found("vault config", path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|source| PasswardError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fsutil::write_private(path, content.as_bytes())
    }
}

/// What an operation acts with: the caller's session and the storage backend
#[derive(Clone, Copy)]
pub struct OpContext<'a> {
    pub session: &'a Session,
    pub store: &'a dyn VaultStore,
}

impl<'a> OpContext<'a> {
    pub fn new(session: &'a Session, store: &'a dyn VaultStore) -> Self {
        Self { session, store }
    }
}

/// An open vault
#[derive(Debug)]
pub struct Vault {
    path: PathBuf,
    config: VaultConfig,
    users: VaultUsers,
    entries: VaultEntries,
}

impl Vault {
    /// Lay out a new, unseeded vault at `path` and start tracking it
    pub fn create(
        path: &Path,
        name: &str,
        description: &str,
        store: &dyn VaultStore,
    ) -> Result<Self> {
        fsutil::validate_name("vault", name)?;
        if path.exists() {
            return Err(PasswardError::conflict("vault", name));
        }

        tracing::debug!("initializing vault at {}", path.display());
        fsutil::create_private_dir(path)?;
        store.init(path)?;

        let config = VaultConfig {
            name: name.to_string(),
            description: description.to_string(),
            remote_upstream: None,
        };
        config.write(&path.join(CONFIG_FILE))?;

        let users = VaultUsers::new(path);
        let entries = VaultEntries::new(path);
        fsutil::ensure_tracked_dir(users.path())?;
        fsutil::ensure_tracked_dir(entries.path())?;

        Ok(Self {
            path: path.to_path_buf(),
            config,
            users,
            entries,
        })
    }

    /// Read an existing vault without writing to it. Entries stay encrypted
    /// until revealed.
    pub fn open(path: &Path) -> Result<Self> {
        let config = VaultConfig::read(&path.join(CONFIG_FILE))?;
        Ok(Self {
            path: path.to_path_buf(),
            config,
            users: VaultUsers::load(path)?,
            entries: VaultEntries::load(path)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn description(&self) -> &str {
        &self.config.description
    }

    pub fn remote_upstream(&self) -> Option<&str> {
        self.config.remote_upstream.as_deref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn users(&self) -> &VaultUsers {
        &self.users
    }

    pub fn entries(&self) -> &VaultEntries {
        &self.entries
    }

    /// Whether a master key has been generated
    pub fn is_seeded(&self) -> bool {
        !self.users.is_empty()
    }

    /// Generate the master key and wrap it for the session's identity.
    ///
    /// The only way a master key ever comes into existence.
    pub fn seed(&mut self, ctx: OpContext<'_>) -> Result<()> {
        let keyring = ctx.session.require_unlocked()?;
        if self.is_seeded() {
            return Err(PasswardError::conflict("master key for vault", self.name()));
        }

        let master_key = MasterKey::generate()?;
        let email = &ctx.session.identity().email;
        self.users
            .add_user(email, keyring.public_key_string(), &master_key)?;
        tracing::info!("seeded vault {} for {}", self.name(), email);
        Ok(())
    }

    /// The master key, via the session user's own wrapped copy
    pub fn unlock_master_key(&self, session: &Session) -> Result<MasterKey> {
        let keyring = session.require_unlocked()?;
        self.users
            .unwrap_master_key(&session.identity().email, keyring)
    }

    /// Store a site's credentials as one entry
    pub fn add_entry(
        &mut self,
        ctx: OpContext<'_>,
        site: &str,
        username: &str,
        passphrase: &str,
        description: &str,
    ) -> Result<()> {
        let master_key = self.unlock_master_key(ctx.session)?;

        self.entries
            .set_field(site, FIELD_USERNAME, username, &master_key)?;
        self.entries
            .set_field(site, FIELD_PASSPHRASE, passphrase, &master_key)?;
        if !description.is_empty() {
            self.entries
                .set_field(site, FIELD_DESCRIPTION, description, &master_key)?;
        }
        self.entries.save()?;

        self.commit(ctx, &format!("Added entry: {}", site))
    }

    /// Write or overwrite a single field
    pub fn set_field(
        &mut self,
        ctx: OpContext<'_>,
        entry: &str,
        field: &str,
        value: &str,
    ) -> Result<()> {
        let master_key = self.unlock_master_key(ctx.session)?;
        self.entries.set_field(entry, field, value, &master_key)?;
        self.entries.save()?;

        self.commit(ctx, &format!("Updated {} for {}", field, entry))
    }

    /// Decrypt every field of `entry`
    pub fn reveal_entry(&self, session: &Session, entry: &str) -> Result<RevealedEntry> {
        let master_key = self.unlock_master_key(session)?;
        self.entries.reveal_entry(entry, &master_key)
    }

    /// Give `email` access by wrapping the master key for `public_key`
    pub fn add_user(&mut self, ctx: OpContext<'_>, email: &str, public_key: &str) -> Result<()> {
        let master_key = self.unlock_master_key(ctx.session)?;
        self.users.add_user(email, public_key, &master_key)?;
        tracing::info!("added {} to vault {}", email, self.name());

        self.commit(ctx, &format!("Added user: {}", email))
    }

    /// Remove `email`'s access record.
    ///
    /// The master key is not rotated, so anything the removed user already
    /// copied out stays readable to them.
    pub fn remove_user(&mut self, ctx: OpContext<'_>, email: &str) -> Result<()> {
        // only members may change membership
        self.unlock_master_key(ctx.session)?;

        if self.users.lookup_by_email(email).is_none() {
            return Err(PasswardError::not_found("user", email));
        }
        if self.users.len() == 1 {
            return Err(PasswardError::LastUser(email.to_string()));
        }

        self.users.remove_user(email)?;
        tracing::info!("removed {} from vault {}", email, self.name());

        self.commit(ctx, &format!("Removed user: {}", email))
    }

    /// Record the shared remote and point the store at it
    pub fn set_remote(&mut self, ctx: OpContext<'_>, url: &str) -> Result<()> {
        ctx.store.set_remote(&self.path, url)?;
        self.config.remote_upstream = Some(url.to_string());
        self.save_config()?;

        self.commit(ctx, &format!("Set remote: {}", url))
    }

    /// Publish local snapshots. Pulling is not supported; the last push wins.
    pub fn sync(&self, ctx: OpContext<'_>) -> Result<()> {
        let auth = ctx.session.ssh_auth()?;
        tracing::info!("pushing vault {}", self.name());
        ctx.store.push(&self.path, &auth)?;
        Ok(())
    }

    /// Snapshot the vault directory
    pub fn commit(&self, ctx: OpContext<'_>, message: &str) -> Result<()> {
        tracing::debug!("committing {}: {}", self.path.display(), message);
        ctx.store
            .commit_all(&self.path, message, &ctx.session.identity().author())?;
        Ok(())
    }

    fn save_config(&self) -> Result<()> {
        self.config.write(&self.path.join(CONFIG_FILE))
    }
}
