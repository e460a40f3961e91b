//! End to end: share a vault through a local bare git remote

mod common;

use common::{git_available, identity, passphrase, public_key_text};
use passward::Passward;
use passward_core::{GitStore, Paths};
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn bare_remote(path: &Path) {
    let status = Command::new("git")
        .args(["init", "--bare", "-q"])
        .arg(path)
        .status()
        .unwrap();
    assert!(status.success());
    let status = Command::new("git")
        .arg("--git-dir")
        .arg(path)
        .args(["symbolic-ref", "HEAD", "refs/heads/master"])
        .status()
        .unwrap();
    assert!(status.success());
}

fn remote_commits(path: &Path) -> usize {
    let output = Command::new("git")
        .arg("--git-dir")
        .arg(path)
        .args(["rev-list", "--count", "master"])
        .output()
        .unwrap();
    String::from_utf8_lossy(&output.stdout).trim().parse().unwrap()
}

fn home(dir: &TempDir, person: &str) -> Passward {
    let mut pw = Passward::create(
        Paths::new(dir.path().join(person)),
        identity(person),
        Box::new(GitStore::new()),
    )
    .unwrap();
    pw.unlock(passphrase(person)).unwrap();
    pw
}

#[test]
fn share_vault_through_remote() {
    if !git_available() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let remote = dir.path().join("work.git");
    bare_remote(&remote);
    let url = remote.display().to_string();

    let mut alice = home(&dir, "alice");
    alice.add_vault("work", "team secrets").unwrap();
    alice.use_vault("work").unwrap();
    {
        let (vault, ctx) = alice.vault_mut(None).unwrap();
        vault
            .add_entry(ctx, "github.com", "alice", "hunter2", "work account")
            .unwrap();
        vault
            .add_user(ctx, "bob@example.com", &public_key_text("bob"))
            .unwrap();
        vault.set_remote(ctx, &url).unwrap();
        vault.sync(ctx).unwrap();
    }
    assert_eq!(remote_commits(&remote), 4);

    let mut bob = home(&dir, "bob");
    let fetched = bob.fetch_vault(&url, None).unwrap();
    assert_eq!(fetched.name(), "work");
    assert_eq!(fetched.remote_upstream(), Some(url.as_str()));

    let (vault, ctx) = bob.vault_mut(Some("work")).unwrap();
    let revealed = vault.reveal_entry(ctx.session, "github.com").unwrap();
    assert_eq!(revealed["passphrase"].as_str(), "hunter2");

    vault
        .add_entry(ctx, "gitlab.com", "bob", "swordfish", "")
        .unwrap();
    vault.sync(ctx).unwrap();
    assert_eq!(remote_commits(&remote), 5);
}

#[test]
fn fetch_into_existing_name_conflicts() {
    if !git_available() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let remote = dir.path().join("work.git");
    bare_remote(&remote);

    let mut alice = home(&dir, "alice");
    alice.add_vault("work", "").unwrap();

    let err = alice
        .fetch_vault(&remote.display().to_string(), None)
        .unwrap_err();
    assert!(matches!(err, passward::PasswardError::Conflict { .. }));
}
