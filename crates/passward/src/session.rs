//! Credential session: who is acting, and whether their keys are loaded

use passward_core::{Author, SshAuth};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::error::{KeyMaterialError, PasswardError, Result};
use crate::keyring::Keyring;

/// A person and the location of their ssh key pair.
///
/// Persisted in the root registry; never holds decrypted key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
    pub public_key_path: PathBuf,
    pub private_key_path: PathBuf,
}

impl Identity {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        public_key_path: impl Into<PathBuf>,
        private_key_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            public_key_path: public_key_path.into(),
            private_key_path: private_key_path.into(),
        }
    }

    /// Attribution for vault snapshots made by this identity
    pub fn author(&self) -> Author {
        Author {
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }

    /// Contents of the public key file; readable without unlocking
    pub fn public_key_string(&self) -> Result<String> {
        fs::read_to_string(&self.public_key_path).map_err(|source| {
            KeyMaterialError::Unreadable {
                path: self.public_key_path.clone(),
                source,
            }
            .into()
        })
    }
}

/// Whether key material is resident in memory
pub enum SessionState {
    Locked,
    Unlocked {
        keyring: Arc<Keyring>,
        passphrase: Zeroizing<String>,
    },
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Locked => f.write_str("Locked"),
            SessionState::Unlocked { keyring, .. } => f
                .debug_struct("Unlocked")
                .field("keyring", keyring)
                .finish_non_exhaustive(),
        }
    }
}

/// One identity plus, once unlocked, its keyring
#[derive(Debug)]
pub struct Session {
    identity: Identity,
    state: SessionState,
}

impl Session {
    /// A new session starts locked
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            state: SessionState::Locked,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_unlocked(&self) -> bool {
        matches!(self.state, SessionState::Unlocked { .. })
    }

    /// Load the identity's key pair.
    ///
    /// Unlocking an unlocked session succeeds without touching the existing
    /// keyring, whatever passphrase is given.
    pub fn unlock(&mut self, passphrase: &str) -> Result<()> {
        if self.is_unlocked() {
            tracing::debug!("session for {} already unlocked", self.identity.email);
            return Ok(());
        }

        let keyring = Keyring::load(
            &self.identity.public_key_path,
            &self.identity.private_key_path,
            passphrase,
        )?;

        self.state = SessionState::Unlocked {
            keyring: Arc::new(keyring),
            passphrase: Zeroizing::new(passphrase.to_string()),
        };
        tracing::debug!("unlocked session for {}", self.identity.email);
        Ok(())
    }

    /// Drop the keyring and passphrase
    pub fn lock(&mut self) {
        if self.is_unlocked() {
            tracing::debug!("locking session for {}", self.identity.email);
        }
        self.state = SessionState::Locked;
    }

    /// The keyring, or [`PasswardError::NotUnlocked`].
    ///
    /// Every cryptographic operation goes through here first.
    pub fn require_unlocked(&self) -> Result<&Arc<Keyring>> {
        match &self.state {
            SessionState::Unlocked { keyring, .. } => Ok(keyring),
            SessionState::Locked => Err(PasswardError::NotUnlocked),
        }
    }

    /// Transport credentials for the storage backend
    pub fn ssh_auth(&self) -> Result<SshAuth> {
        match &self.state {
            SessionState::Unlocked { passphrase, .. } => Ok(SshAuth {
                private_key: self.identity.private_key_path.clone(),
                public_key: self.identity.public_key_path.clone(),
                passphrase: if passphrase.is_empty() {
                    None
                } else {
                    Some(passphrase.clone())
                },
            }),
            SessionState::Locked => Err(PasswardError::NotUnlocked),
        }
    }

    /// Public key text of the unlocked keyring
    pub fn public_key_string(&self) -> Result<&str> {
        Ok(self.require_unlocked()?.public_key_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{alice_identity, bob_identity, ALICE_PASSPHRASE};

    #[test]
    fn test_starts_locked() {
        let session = Session::new(alice_identity());
        assert!(!session.is_unlocked());
        assert!(matches!(
            session.require_unlocked(),
            Err(PasswardError::NotUnlocked)
        ));
        assert!(matches!(session.ssh_auth(), Err(PasswardError::NotUnlocked)));
    }

    #[test]
    fn test_unlock_and_lock() {
        let mut session = Session::new(alice_identity());
        session.unlock(ALICE_PASSPHRASE).unwrap();
        assert!(session.is_unlocked());

        let auth = session.ssh_auth().unwrap();
        assert_eq!(auth.private_key, alice_identity().private_key_path);
        assert_eq!(
            auth.passphrase.as_deref().map(String::as_str),
            Some(ALICE_PASSPHRASE)
        );

        session.lock();
        assert!(!session.is_unlocked());
        assert!(matches!(
            session.public_key_string(),
            Err(PasswardError::NotUnlocked)
        ));
    }

    #[test]
    fn test_unlock_is_idempotent() {
        let mut session = Session::new(alice_identity());
        session.unlock(ALICE_PASSPHRASE).unwrap();
        let first = Arc::clone(session.require_unlocked().unwrap());

        session.unlock(ALICE_PASSPHRASE).unwrap();
        assert!(Arc::ptr_eq(&first, session.require_unlocked().unwrap()));

        // a different passphrase does not force a reload
        session.unlock("something else entirely").unwrap();
        assert!(Arc::ptr_eq(&first, session.require_unlocked().unwrap()));
    }

    #[test]
    fn test_failed_unlock_stays_locked() {
        let mut session = Session::new(alice_identity());
        let err = session.unlock("wrong").unwrap_err();
        assert!(matches!(
            err,
            PasswardError::KeyMaterial(KeyMaterialError::WrongPassphrase(_))
        ));
        assert!(!session.is_unlocked());

        // the caller may retry
        session.unlock(ALICE_PASSPHRASE).unwrap();
        assert!(session.is_unlocked());
    }

    #[test]
    fn test_unencrypted_key_has_no_askpass_passphrase() {
        let mut session = Session::new(bob_identity());
        session.unlock("").unwrap();
        assert!(session.ssh_auth().unwrap().passphrase.is_none());
        assert_eq!(
            session.public_key_string().unwrap(),
            bob_identity().public_key_string().unwrap()
        );
    }

    #[test]
    fn test_debug_hides_passphrase() {
        let mut session = Session::new(alice_identity());
        session.unlock(ALICE_PASSPHRASE).unwrap();
        assert!(!format!("{:?}", session).contains(ALICE_PASSPHRASE));
    }
}
