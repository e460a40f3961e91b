//! passward-core - Shared plumbing for passward
//!
//! Standard paths and the storage backends that snapshot and share vault
//! directories. Nothing in here ever sees plaintext or key material.

pub mod git;
pub mod paths;

pub use git::{detect_repo_name, Author, GitStore, SshAuth, StoreError, VaultStore, ASKPASS_ENV};
pub use paths::{detect_ssh_keys, KeyPairPaths, Paths};
