//! The passward home: one identity, its session and the vaults it knows
//!
//! `<home>/config.toml`:
//! ```toml
//! vaults = ["work", "family"]
//! selected_vault = "work"
//!
//! [identity]
//! name = "Alice"
//! email = "alice@example.com"
//! public_key_path = "/home/alice/.ssh/id_ed25519.pub"
//! private_key_path = "/home/alice/.ssh/id_ed25519"
//! ```

use passward_core::{detect_repo_name, Paths, VaultStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;

use crate::error::{PasswardError, Result};
use crate::fsutil;
use crate::session::{Identity, Session};
use crate::vault::{OpContext, Vault};

/// Commit message for a freshly seeded vault
const NEW_VAULT_MESSAGE: &str = "New vault created.";

/// On-disk form of the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub vaults: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_vault: Option<String>,
    pub identity: Identity,
}

/// A loaded passward home
pub struct Passward {
    paths: Paths,
    session: Session,
    store: Box<dyn VaultStore>,
    vaults: BTreeMap<String, Vault>,
    selected: Option<String>,
}

impl std::fmt::Debug for Passward {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Passward")
            .field("home", &self.paths.home)
            .field("session", &self.session)
            .field("store", &self.store.name())
            .field("vaults", &self.vaults.keys().collect::<Vec<_>>())
            .field("selected", &self.selected)
            .finish()
    }
}

impl Passward {
    /// Set up a new home for `identity`. Fails if the home already exists.
    pub fn create(paths: Paths, identity: Identity, store: Box<dyn VaultStore>) -> Result<Self> {
        if paths.home.exists() {
            return Err(PasswardError::conflict(
                "passward home",
                paths.home.display().to_string(),
            ));
        }

        fsutil::create_private_dir(&paths.home)?;
        fsutil::create_private_dir(&paths.vaults_dir())?;

        let passward = Self {
            paths,
            session: Session::new(identity),
            store,
            vaults: BTreeMap::new(),
            selected: None,
        };
        passward.save()?;
        tracing::info!("created passward home {}", passward.paths.home.display());
        Ok(passward)
    }

    /// Load an existing home and every vault it lists
    pub fn open(paths: Paths, store: Box<dyn VaultStore>) -> Result<Self> {
        let config_file = paths.config_file();
        if !config_file.exists() {
            return Err(PasswardError::not_found(
                "passward config",
                config_file.display().to_string(),
            ));
        }

        let content = fs::read_to_string(&config_file)?;
        let config: RegistryConfig =
            toml::from_str(&content).map_err(|source| PasswardError::Config {
                path: config_file.clone(),
                source,
            })?;

        let mut vaults = BTreeMap::new();
        for name in &config.vaults {
            let dir = paths.vault_dir(name);
            if !dir.is_dir() {
                return Err(PasswardError::not_found("vault", name.as_str()));
            }
            vaults.insert(name.clone(), Vault::open(&dir)?);
        }

        if let Some(selected) = &config.selected_vault {
            if !vaults.contains_key(selected) {
                return Err(PasswardError::not_found("vault", selected.as_str()));
            }
        }

        tracing::debug!(
            "opened {} with {} vault(s)",
            paths.home.display(),
            vaults.len()
        );

        Ok(Self {
            paths,
            session: Session::new(config.identity),
            store,
            vaults,
            selected: config.selected_vault,
        })
    }

    /// Persisted form of the current state
    pub fn config(&self) -> RegistryConfig {
        RegistryConfig {
            vaults: self.vaults.keys().cloned().collect(),
            selected_vault: self.selected.clone(),
            identity: self.session.identity().clone(),
        }
    }

    /// Write `<home>/config.toml`
    pub fn save(&self) -> Result<()> {
        let content = toml::to_string_pretty(&self.config())?;
        fsutil::write_private(&self.paths.config_file(), content.as_bytes())
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn identity(&self) -> &Identity {
        self.session.identity()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn store(&self) -> &dyn VaultStore {
        self.store.as_ref()
    }

    /// Per-operation context for vault calls made outside [`vault_mut`](Self::vault_mut)
    pub fn context(&self) -> OpContext<'_> {
        OpContext::new(&self.session, self.store.as_ref())
    }

    pub fn unlock(&mut self, passphrase: &str) -> Result<()> {
        self.session.unlock(passphrase)
    }

    pub fn lock(&mut self) {
        self.session.lock();
    }

    /// Known vaults in name order
    pub fn vaults(&self) -> impl Iterator<Item = &Vault> {
        self.vaults.values()
    }

    pub fn vault(&self, name: &str) -> Option<&Vault> {
        self.vaults.get(name)
    }

    pub fn selected_vault_name(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected_vault(&self) -> Option<&Vault> {
        self.selected.as_deref().and_then(|name| self.vaults.get(name))
    }

    /// Make `name` the vault commands act on by default
    pub fn use_vault(&mut self, name: &str) -> Result<()> {
        if !self.vaults.contains_key(name) {
            return Err(PasswardError::not_found("vault", name));
        }
        self.selected = Some(name.to_string());
        self.save()
    }

    /// Resolve `name` (or the selected vault) together with the context to act on it
    pub fn vault_mut(&mut self, name: Option<&str>) -> Result<(&mut Vault, OpContext<'_>)> {
        let name = match name.or(self.selected.as_deref()) {
            Some(name) => name.to_string(),
            None => return Err(PasswardError::not_found("vault", "no vault selected")),
        };
        let vault = self
            .vaults
            .get_mut(&name)
            .ok_or_else(|| PasswardError::not_found("vault", name.as_str()))?;
        Ok((vault, OpContext::new(&self.session, self.store.as_ref())))
    }

    /// Create, seed and register a new vault
    pub fn add_vault(&mut self, name: &str, description: &str) -> Result<&Vault> {
        fsutil::validate_name("vault", name)?;
        if self.vaults.contains_key(name) {
            return Err(PasswardError::conflict("vault", name));
        }
        self.session.require_unlocked()?;

        let dir = self.paths.vault_dir(name);
        if dir.exists() {
            return Err(PasswardError::conflict("vault directory", dir.display().to_string()));
        }

        let ctx = OpContext::new(&self.session, self.store.as_ref());
        let built = Vault::create(&dir, name, description, ctx.store).and_then(|mut vault| {
            vault.seed(ctx)?;
            vault.commit(ctx, NEW_VAULT_MESSAGE)?;
            Ok(vault)
        });
        let vault = match built {
            Ok(vault) => vault,
            Err(e) => {
                fsutil::discard_dir(&dir);
                return Err(e);
            }
        };
        tracing::info!("created vault {}", name);

        self.register(name, vault)
    }

    /// Clone a shared vault from `url`; the name defaults to the repository name
    pub fn fetch_vault(&mut self, url: &str, name: Option<&str>) -> Result<&Vault> {
        let name = match name {
            Some(name) => name.to_string(),
            None => detect_repo_name(url)
                .ok_or_else(|| PasswardError::InvalidName {
                    what: "vault",
                    name: url.to_string(),
                })?,
        };
        fsutil::validate_name("vault", &name)?;
        if self.vaults.contains_key(&name) {
            return Err(PasswardError::conflict("vault", name));
        }
        let auth = self.session.ssh_auth()?;

        let dest = self.paths.vault_dir(&name);
        if dest.exists() {
            return Err(PasswardError::conflict("vault directory", dest.display().to_string()));
        }

        tracing::info!("cloning {} into {}", url, dest.display());
        let fetched = self
            .store
            .clone_repo(url, &dest, &auth)
            .map_err(PasswardError::from)
            .and_then(|()| Vault::open(&dest));
        let vault = match fetched {
            Ok(vault) => vault,
            Err(e) => {
                if dest.exists() {
                    fsutil::discard_dir(&dest);
                }
                return Err(e);
            }
        };

        self.register(&name, vault)
    }

    fn register(&mut self, name: &str, vault: Vault) -> Result<&Vault> {
        self.vaults.insert(name.to_string(), vault);
        self.save()?;
        self.vaults
            .get(name)
            .ok_or_else(|| PasswardError::not_found("vault", name))
    }
}
