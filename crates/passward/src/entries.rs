//! Encrypted secret entries
//!
//! Layout: `entries/<entry>/<field>`, one file per field holding the base64
//! ciphertext of that field alone. Fields are read back as ciphertext and
//! only decrypted when an entry is revealed.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

use crate::cipher::{self, MasterKey};
use crate::error::{PasswardError, Result};
use crate::fsutil;

const ENTRIES_DIR: &str = "entries";

/// Decrypted fields of one entry, keyed by field name
pub type RevealedEntry = BTreeMap<String, Zeroizing<String>>;

/// One secret record
#[derive(Debug, Clone)]
pub struct Entry {
    name: String,
    path: PathBuf,
    fields: BTreeMap<String, String>,
    /// Fields set since the last save
    dirty: BTreeSet<String>,
}

impl Entry {
    fn new(parent: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: parent.join(name),
            fields: BTreeMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    fn read(parent: &Path, name: &str) -> Result<Self> {
        let mut entry = Self::new(parent, name);
        for (field, file) in fsutil::visible_files(&entry.path)? {
            let ciphertext = fs::read_to_string(file)?;
            entry.fields.insert(field, ciphertext.trim().to_string());
        }
        Ok(entry)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Field names, sorted
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Stored ciphertext of one field
    pub fn ciphertext(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    fn set(&mut self, field: &str, value: &str, master_key: &MasterKey) -> Result<()> {
        let encrypted = cipher::encrypt_to_base64(master_key.as_bytes(), value.as_bytes())?;
        self.fields.insert(field.to_string(), encrypted);
        self.dirty.insert(field.to_string());
        Ok(())
    }

    /// Decrypt every field, or fail without returning any of them
    fn reveal(&self, master_key: &MasterKey) -> Result<RevealedEntry> {
        let mut revealed = RevealedEntry::new();
        for (field, ciphertext) in &self.fields {
            let plaintext = Zeroizing::new(cipher::decrypt_base64(master_key.as_bytes(), ciphertext)?);
            let value = std::str::from_utf8(&plaintext)
                .map_err(|_| PasswardError::InvalidUtf8(field.clone()))?;
            revealed.insert(field.clone(), Zeroizing::new(value.to_string()));
        }
        Ok(revealed)
    }

    /// Write the fields changed since the last save; untouched field files
    /// are left alone
    fn save(&mut self) -> Result<()> {
        if self.dirty.is_empty() {
            return Ok(());
        }
        fsutil::create_private_dir(&self.path)?;
        for field in &self.dirty {
            if let Some(ciphertext) = self.fields.get(field) {
                fsutil::write_private(&self.path.join(field), ciphertext.as_bytes())?;
            }
        }
        tracing::debug!("saved {} field(s) of {}", self.dirty.len(), self.name);
        self.dirty.clear();
        Ok(())
    }
}

/// The `entries/` directory of one vault
#[derive(Debug)]
pub struct VaultEntries {
    path: PathBuf,
    entries: BTreeMap<String, Entry>,
}

impl VaultEntries {
    pub fn new(vault_path: &Path) -> Self {
        Self {
            path: vault_path.join(ENTRIES_DIR),
            entries: BTreeMap::new(),
        }
    }

    /// Read back every entry as ciphertext. A missing directory is empty.
    pub fn load(vault_path: &Path) -> Result<Self> {
        let mut store = Self::new(vault_path);
        if !store.path.is_dir() {
            return Ok(store);
        }

        for (name, _) in fsutil::visible_subdirs(&store.path)? {
            let entry = Entry::read(&store.path, &name)?;
            store.entries.insert(name, entry);
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encrypt `value` into one field, creating the entry if needed.
    ///
    /// In memory only until [`save`](Self::save).
    pub fn set_field(
        &mut self,
        entry: &str,
        field: &str,
        value: &str,
        master_key: &MasterKey,
    ) -> Result<()> {
        fsutil::validate_name("entry", entry)?;
        fsutil::validate_name("field", field)?;

        let path = &self.path;
        self.entries
            .entry(entry.to_string())
            .or_insert_with(|| Entry::new(path, entry))
            .set(field, value, master_key)
    }

    /// Decrypt all fields of `entry`
    pub fn reveal_entry(&self, entry: &str, master_key: &MasterKey) -> Result<RevealedEntry> {
        self.get(entry)
            .ok_or_else(|| PasswardError::not_found("entry", entry))?
            .reveal(master_key)
    }

    /// Persist pending field writes
    pub fn save(&mut self) -> Result<()> {
        if self.entries.values().any(|e| !e.dirty.is_empty()) {
            fsutil::ensure_tracked_dir(&self.path)?;
        }
        for entry in self.entries.values_mut() {
            entry.save()?;
        }
        Ok(())
    }

    pub fn get(&self, entry: &str) -> Option<&Entry> {
        self.entries.get(entry)
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries.contains_key(entry)
    }

    /// Entries in name order
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_and_reveal() {
        let dir = TempDir::new().unwrap();
        let master = MasterKey::generate().unwrap();
        let mut entries = VaultEntries::load(dir.path()).unwrap();

        entries.set_field("github.com", "username", "alice", &master).unwrap();
        entries.set_field("github.com", "passphrase", "hunter2", &master).unwrap();

        let revealed = entries.reveal_entry("github.com", &master).unwrap();
        assert_eq!(revealed.len(), 2);
        assert_eq!(revealed["username"].as_str(), "alice");
        assert_eq!(revealed["passphrase"].as_str(), "hunter2");
    }

    #[test]
    fn test_fields_are_encrypted_independently() {
        let dir = TempDir::new().unwrap();
        let master = MasterKey::generate().unwrap();
        let mut entries = VaultEntries::load(dir.path()).unwrap();

        entries.set_field("site", "a", "same", &master).unwrap();
        entries.set_field("site", "b", "same", &master).unwrap();
        let entry = entries.get("site").unwrap();
        assert_ne!(entry.ciphertext("a"), entry.ciphertext("b"));
        assert!(!entry.ciphertext("a").unwrap().contains("same"));
    }

    #[test]
    fn test_save_and_load_defers_decryption() {
        let dir = TempDir::new().unwrap();
        let master = MasterKey::generate().unwrap();
        {
            let mut entries = VaultEntries::load(dir.path()).unwrap();
            entries.set_field("github.com", "username", "alice", &master).unwrap();
            entries.save().unwrap();
        }

        let field_file = dir.path().join("entries/github.com/username");
        let on_disk = fs::read_to_string(&field_file).unwrap();

        let entries = VaultEntries::load(dir.path()).unwrap();
        let entry = entries.get("github.com").unwrap();
        assert_eq!(entry.ciphertext("username"), Some(on_disk.as_str()));
        assert_eq!(
            entries.reveal_entry("github.com", &master).unwrap()["username"].as_str(),
            "alice"
        );
    }

    #[test]
    fn test_unsaved_field_leaves_saved_files_intact() {
        let dir = TempDir::new().unwrap();
        let master = MasterKey::generate().unwrap();
        let mut entries = VaultEntries::load(dir.path()).unwrap();

        entries.set_field("e", "username", "alice", &master).unwrap();
        entries.save().unwrap();
        let username_file = dir.path().join("entries/e/username");
        let before = fs::read(&username_file).unwrap();

        // a second field is set but the process dies before saving
        entries.set_field("e", "passphrase", "hunter2", &master).unwrap();
        drop(entries);

        assert_eq!(fs::read(&username_file).unwrap(), before);
        assert!(!dir.path().join("entries/e/passphrase").exists());

        let reloaded = VaultEntries::load(dir.path()).unwrap();
        let revealed = reloaded.reveal_entry("e", &master).unwrap();
        assert_eq!(revealed.len(), 1);
        assert_eq!(revealed["username"].as_str(), "alice");
    }

    #[test]
    fn test_save_only_rewrites_changed_fields() {
        let dir = TempDir::new().unwrap();
        let master = MasterKey::generate().unwrap();
        let mut entries = VaultEntries::load(dir.path()).unwrap();

        entries.set_field("e", "username", "alice", &master).unwrap();
        entries.set_field("e", "passphrase", "old", &master).unwrap();
        entries.save().unwrap();
        let username_before = fs::read(dir.path().join("entries/e/username")).unwrap();

        entries.set_field("e", "passphrase", "new", &master).unwrap();
        entries.save().unwrap();

        assert_eq!(
            fs::read(dir.path().join("entries/e/username")).unwrap(),
            username_before
        );
        assert_eq!(
            entries.reveal_entry("e", &master).unwrap()["passphrase"].as_str(),
            "new"
        );
    }

    #[test]
    fn test_wrong_master_key_reveals_nothing() {
        let dir = TempDir::new().unwrap();
        let master = MasterKey::generate().unwrap();
        let other = MasterKey::generate().unwrap();
        let mut entries = VaultEntries::load(dir.path()).unwrap();
        entries.set_field("e", "username", "alice", &master).unwrap();

        assert!(matches!(
            entries.reveal_entry("e", &other),
            Err(PasswardError::Authentication(_))
        ));
    }

    #[test]
    fn test_one_corrupted_field_fails_the_whole_entry() {
        let dir = TempDir::new().unwrap();
        let master = MasterKey::generate().unwrap();
        let mut entries = VaultEntries::load(dir.path()).unwrap();
        entries.set_field("e", "a", "fine", &master).unwrap();
        entries.set_field("e", "b", "fine too", &master).unwrap();
        entries.save().unwrap();

        fs::write(dir.path().join("entries/e/b"), "bm90IGNpcGhlcnRleHQ=").unwrap();
        let reloaded = VaultEntries::load(dir.path()).unwrap();
        assert!(matches!(
            reloaded.reveal_entry("e", &master),
            Err(PasswardError::Authentication(_))
        ));
    }

    #[test]
    fn test_load_leaves_missing_directory_alone() {
        let dir = TempDir::new().unwrap();
        let entries = VaultEntries::load(dir.path()).unwrap();
        assert!(entries.is_empty());
        assert!(!dir.path().join("entries").exists());
    }

    #[test]
    fn test_non_utf8_field_fails_reveal() {
        let dir = TempDir::new().unwrap();
        let master = MasterKey::generate().unwrap();
        let mut entries = VaultEntries::load(dir.path()).unwrap();
        entries.set_field("e", "username", "alice", &master).unwrap();
        entries.save().unwrap();

        let garbage = cipher::encrypt_to_base64(master.as_bytes(), &[0xff, 0xfe, 0x00]).unwrap();
        fs::write(dir.path().join("entries/e/blob"), garbage).unwrap();

        let reloaded = VaultEntries::load(dir.path()).unwrap();
        match reloaded.reveal_entry("e", &master) {
            Err(PasswardError::InvalidUtf8(field)) => assert_eq!(field, "blob"),
            other => panic!("unexpected: {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn test_missing_entry() {
        let dir = TempDir::new().unwrap();
        let master = MasterKey::generate().unwrap();
        let entries = VaultEntries::load(dir.path()).unwrap();
        assert!(matches!(
            entries.reveal_entry("nope", &master),
            Err(PasswardError::NotFound { what: "entry", .. })
        ));
    }

    #[test]
    fn test_rejects_bad_names() {
        let dir = TempDir::new().unwrap();
        let master = MasterKey::generate().unwrap();
        let mut entries = VaultEntries::load(dir.path()).unwrap();
        assert!(matches!(
            entries.set_field("a/b", "username", "x", &master),
            Err(PasswardError::InvalidName { what: "entry", .. })
        ));
        assert!(matches!(
            entries.set_field("site", ".placeholder", "x", &master),
            Err(PasswardError::InvalidName { what: "field", .. })
        ));
        assert!(entries.is_empty());
    }
}
