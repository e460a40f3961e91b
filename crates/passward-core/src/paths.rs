//! Standard paths used by passward

use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the passward home directory
pub const HOME_ENV: &str = "PASSWARD_HOME";

/// Fallback home when no user home directory can be determined
const GLOBAL_HOME: &str = "/opt/passward";

/// Standard passward paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// Root directory (~/.passward)
    pub home: PathBuf,
}

impl Paths {
    /// Resolve the home directory: `$PASSWARD_HOME`, then `~/.passward`,
    /// then `/opt/passward`.
    pub fn detect() -> Self {
        if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Self::new(home);
        }

        match dirs::home_dir() {
            Some(home) => Self::new(home.join(".passward")),
            None => {
                tracing::warn!("no home directory detected, using {}", GLOBAL_HOME);
                Self::new(GLOBAL_HOME)
            }
        }
    }

    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Root registry file
    pub fn config_file(&self) -> PathBuf {
        self.home.join("config.toml")
    }

    /// Directory holding one subdirectory per vault
    pub fn vaults_dir(&self) -> PathBuf {
        self.home.join("vaults")
    }

    /// Working directory of a single vault
    pub fn vault_dir(&self, name: &str) -> PathBuf {
        self.vaults_dir().join(name)
    }

    /// The user's ssh directory (~/.ssh)
    pub fn ssh_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("~"))
            .join(".ssh")
    }
}

/// A public/private key file pair found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPairPaths {
    pub public_key: PathBuf,
    pub private_key: PathBuf,
}

impl KeyPairPaths {
    /// Pair a private key with its `.pub` sibling
    pub fn from_private(private_key: impl Into<PathBuf>) -> Self {
        let private_key = private_key.into();
        let mut public_key = private_key.clone().into_os_string();
        public_key.push(".pub");
        Self {
            public_key: PathBuf::from(public_key),
            private_key,
        }
    }

    pub fn description(&self) -> String {
        format!(
            "{} (public), {} (private)",
            self.public_key.display(),
            self.private_key.display()
        )
    }
}

/// List every `*.pub` key in `dir` that has a private counterpart next to it
pub fn detect_ssh_keys(dir: &Path) -> Vec<KeyPairPaths> {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return vec![];
    };

    let mut keys: Vec<KeyPairPaths> = read_dir
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "pub"))
        .filter_map(|public_key| {
            let private_key = public_key.with_extension("");
            private_key.is_file().then_some(KeyPairPaths {
                public_key,
                private_key,
            })
        })
        .collect();

    keys.sort_by(|a, b| a.private_key.cmp(&b.private_key));
    keys
}
