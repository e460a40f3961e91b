//! Shared helpers for integration tests
#![allow(dead_code)]

use passward::{Identity, Session};
use passward_core::{Author, SshAuth, StoreError, VaultStore};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

pub const ALICE_PASSPHRASE: &str = "correct horse";

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn key_file(person: &str) -> &'static str {
    match person {
        "alice" => "alice_ed25519",
        "bob" => "bob_ed25519",
        "carol" => "carol_rsa",
        other => panic!("no fixture key for {}", other),
    }
}

pub fn public_key_text(person: &str) -> String {
    fs::read_to_string(fixture(&format!("{}.pub", key_file(person)))).unwrap()
}

pub fn identity(person: &str) -> Identity {
    let key = key_file(person);
    Identity::new(
        person,
        format!("{}@example.com", person),
        fixture(&format!("{}.pub", key)),
        fixture(key),
    )
}

pub fn passphrase(person: &str) -> &'static str {
    if person == "alice" {
        ALICE_PASSPHRASE
    } else {
        ""
    }
}

pub fn unlocked(person: &str) -> Session {
    let mut session = Session::new(identity(person));
    session.unlock(passphrase(person)).unwrap();
    session
}

/// Store that keeps snapshots in memory only
#[derive(Default)]
pub struct MemoryStore {
    commits: RefCell<Vec<String>>,
}

impl MemoryStore {
    pub fn commits(&self) -> Vec<String> {
        self.commits.borrow().clone()
    }
}

impl VaultStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn init(&self, _path: &Path) -> Result<(), StoreError> {
        Ok(())
    }

    fn clone_repo(&self, _url: &str, dest: &Path, _auth: &SshAuth) -> Result<(), StoreError> {
        Err(StoreError::DestinationExists(dest.to_path_buf()))
    }

    fn commit_all(&self, _path: &Path, message: &str, _author: &Author) -> Result<(), StoreError> {
        self.commits.borrow_mut().push(message.to_string());
        Ok(())
    }

    fn set_remote(&self, _path: &Path, _url: &str) -> Result<(), StoreError> {
        Ok(())
    }

    fn has_remote(&self, _path: &Path) -> Result<bool, StoreError> {
        Ok(false)
    }

    fn push(&self, path: &Path, _auth: &SshAuth) -> Result<(), StoreError> {
        Err(StoreError::NoRemote(path.to_path_buf()))
    }
}

pub fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
