//! Storage backends for vault directories
//!
//! A vault directory is a plain git working tree. Backends only ever see
//! opaque encrypted files; they snapshot, share and fetch them:
//! - GitStore: drives the `git` binary (works everywhere git works)

use regex::Regex;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use thiserror::Error;
use zeroize::Zeroizing;

/// Environment variable the askpass helper reads the key passphrase from
pub const ASKPASS_ENV: &str = "PASSWARD_ASKPASS_PASSPHRASE";

/// Name of the single remote a vault is shared through
const REMOTE: &str = "origin";

/// Storage errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`git {command}` failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("no remote configured for {0}, set one first")]
    NoRemote(PathBuf),

    #[error("destination already exists: {0}")]
    DestinationExists(PathBuf),
}

/// Who a snapshot is attributed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub email: String,
}

/// SSH credentials for one transport operation.
///
/// Built from an unlocked credential session and handed to every call that
/// talks to a remote, so no backend needs ambient access to the session.
pub struct SshAuth {
    /// Private key file passed to ssh
    pub private_key: PathBuf,
    /// Public half of the key pair
    pub public_key: PathBuf,
    /// Passphrase for the private key, if it has one
    pub passphrase: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for SshAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshAuth")
            .field("private_key", &self.private_key)
            .field("public_key", &self.public_key)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Trait for vault storage backends
pub trait VaultStore {
    /// Return the backend name
    fn name(&self) -> &str;

    /// Start tracking an existing directory
    fn init(&self, path: &Path) -> Result<(), StoreError>;

    /// Fetch a shared vault into `dest` (which must not exist yet)
    fn clone_repo(&self, url: &str, dest: &Path, auth: &SshAuth) -> Result<(), StoreError>;

    /// Snapshot every change in the working directory
    fn commit_all(&self, path: &Path, message: &str, author: &Author) -> Result<(), StoreError>;

    /// Point the vault at the remote it is shared through
    fn set_remote(&self, path: &Path, url: &str) -> Result<(), StoreError>;

    /// Whether a remote has been configured
    fn has_remote(&self, path: &Path) -> Result<bool, StoreError>;

    /// Publish local snapshots to the remote
    fn push(&self, path: &Path, auth: &SshAuth) -> Result<(), StoreError>;
}

/// Git-backed vault storage
pub struct GitStore {
    program: PathBuf,
    branch: String,
    askpass: Option<PathBuf>,
}

impl Default for GitStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GitStore {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("git"),
            branch: "master".to_string(),
            askpass: None,
        }
    }

    /// Program ssh runs to obtain a key passphrase (see [`ASKPASS_ENV`])
    pub fn with_askpass(mut self, program: impl Into<PathBuf>) -> Self {
        self.askpass = Some(program.into());
        self
    }

    fn command(&self, cwd: Option<&Path>) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(dir) = cwd {
            cmd.arg("-C").arg(dir);
        }
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd
    }

    fn git(&self, args: &[&str], cwd: Option<&Path>) -> Result<Output, StoreError> {
        let mut cmd = self.command(cwd);
        cmd.args(args);
        cmd.output().map_err(|source| StoreError::Spawn {
            program: self.program.display().to_string(),
            source,
        })
    }

    /// Run git and fail on a non-zero exit
    fn git_checked(&self, args: &[&str], cwd: Option<&Path>) -> Result<Output, StoreError> {
        let output = self.git(args, cwd)?;
        if !output.status.success() {
            return Err(StoreError::Command {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    fn apply_auth(&self, cmd: &mut Command, auth: &SshAuth) {
        cmd.env(
            "GIT_SSH_COMMAND",
            format!(
                "ssh -i {} -o IdentitiesOnly=yes",
                shell_quote(&auth.private_key.to_string_lossy())
            ),
        );

        let passphrase = auth.passphrase.as_ref().filter(|p| !p.is_empty());
        if let (Some(passphrase), Some(askpass)) = (passphrase, &self.askpass) {
            cmd.env("SSH_ASKPASS", askpass)
                .env("SSH_ASKPASS_REQUIRE", "force")
                .env(ASKPASS_ENV, passphrase.as_str());
        }
    }

    /// Run a transfer command, streaming git's progress output as it arrives
    fn transfer(&self, args: &[&str], cwd: Option<&Path>, auth: &SshAuth) -> Result<(), StoreError> {
        let mut cmd = self.command(cwd);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        self.apply_auth(&mut cmd, auth);

        tracing::debug!(public_key = %auth.public_key.display(), "git {}", args.join(" "));

        let mut child = cmd.spawn().map_err(|source| StoreError::Spawn {
            program: self.program.display().to_string(),
            source,
        })?;

        let mut transcript = String::new();
        if let Some(stderr) = child.stderr.take() {
            stream_progress(BufReader::new(stderr), &mut transcript);
        }

        let status = child.wait().map_err(|source| StoreError::Spawn {
            program: self.program.display().to_string(),
            source,
        })?;

        if !status.success() {
            return Err(StoreError::Command {
                command: args.join(" "),
                stderr: transcript.trim().to_string(),
            });
        }
        Ok(())
    }
}

impl VaultStore for GitStore {
    fn name(&self) -> &str {
        "git"
    }

    fn init(&self, path: &Path) -> Result<(), StoreError> {
        self.git_checked(&["init", "-q"], Some(path))?;
        let head = format!("refs/heads/{}", self.branch);
        self.git_checked(&["symbolic-ref", "HEAD", &head], Some(path))?;
        Ok(())
    }

    fn clone_repo(&self, url: &str, dest: &Path, auth: &SshAuth) -> Result<(), StoreError> {
        if dest.exists() {
            return Err(StoreError::DestinationExists(dest.to_path_buf()));
        }
        let dest_str = dest.to_string_lossy();
        self.transfer(&["clone", "--progress", url, &dest_str], None, auth)
    }

    fn commit_all(&self, path: &Path, message: &str, author: &Author) -> Result<(), StoreError> {
        self.git_checked(&["add", "-A"], Some(path))?;

        let name = format!("user.name={}", author.name);
        let email = format!("user.email={}", author.email);
        self.git_checked(
            &[
                "-c",
                &name,
                "-c",
                &email,
                "-c",
                "commit.gpgsign=false",
                "commit",
                "-q",
                "--allow-empty",
                "-m",
                message,
            ],
            Some(path),
        )?;
        Ok(())
    }

    fn set_remote(&self, path: &Path, url: &str) -> Result<(), StoreError> {
        if self.has_remote(path)? {
            self.git_checked(&["remote", "set-url", REMOTE, url], Some(path))?;
        } else {
            self.git_checked(&["remote", "add", REMOTE, url], Some(path))?;
        }
        Ok(())
    }

    fn has_remote(&self, path: &Path) -> Result<bool, StoreError> {
        let output = self.git(&["remote", "get-url", REMOTE], Some(path))?;
        Ok(output.status.success())
    }

    fn push(&self, path: &Path, auth: &SshAuth) -> Result<(), StoreError> {
        if !self.has_remote(path)? {
            return Err(StoreError::NoRemote(path.to_path_buf()));
        }
        let refspec = format!("HEAD:refs/heads/{}", self.branch);
        self.transfer(&["push", "--progress", REMOTE, &refspec], Some(path), auth)
    }
}

/// Forward git progress lines (separated by `\r` or `\n`) to the log while
/// keeping a transcript for error reporting
fn stream_progress<R: Read>(mut reader: R, transcript: &mut String) {
    let mut buf = [0u8; 1024];
    let mut line = Vec::new();

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for &byte in &buf[..n] {
            if byte == b'\r' || byte == b'\n' {
                flush_progress_line(&mut line, transcript);
            } else {
                line.push(byte);
            }
        }
    }
    flush_progress_line(&mut line, transcript);
}

fn flush_progress_line(line: &mut Vec<u8>, transcript: &mut String) {
    if line.is_empty() {
        return;
    }
    let text = String::from_utf8_lossy(line).trim().to_string();
    if !text.is_empty() {
        tracing::info!(target: "passward_core::git::progress", "{}", text);
        transcript.push_str(&text);
        transcript.push('\n');
    }
    line.clear();
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Derive a vault name from a clone URL
///
/// e.g. `git@github.com:team/work-vault.git` -> `work-vault`
pub fn detect_repo_name(url: &str) -> Option<String> {
    let url = url.trim().trim_end_matches('/');

    if let Ok(re) = Regex::new(r"^.+[/:]([^/:]+)\.git$") {
        if let Some(caps) = re.captures(url) {
            return Some(caps[1].to_string());
        }
    }

    url.rsplit(['/', ':'])
        .next()
        .filter(|name| !name.is_empty() && *name != url)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn author() -> Author {
        Author {
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
        }
    }

    fn no_auth() -> SshAuth {
        SshAuth {
            private_key: PathBuf::from("/nonexistent/id_ed25519"),
            public_key: PathBuf::from("/nonexistent/id_ed25519.pub"),
            passphrase: None,
        }
    }

    fn commit_count(path: &Path) -> usize {
        let output = Command::new("git")
            .arg("-C")
            .arg(path)
            .args(["rev-list", "--count", "HEAD"])
            .output()
            .unwrap();
        String::from_utf8_lossy(&output.stdout).trim().parse().unwrap()
    }

    #[test]
    fn test_detect_repo_name() {
        assert_eq!(
            detect_repo_name("git@github.com:team/work-vault.git"),
            Some("work-vault".to_string())
        );
        assert_eq!(
            detect_repo_name("https://example.com/team/family.git"),
            Some("family".to_string())
        );
        assert_eq!(
            detect_repo_name("ssh://git@example.com/srv/shared/"),
            Some("shared".to_string())
        );
        assert_eq!(detect_repo_name("vault"), None);
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/home/a b/id"), "'/home/a b/id'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_stream_progress_splits_carriage_returns() {
        let input = b"Counting objects: 50%\rCounting objects: 100%\nDone.\n";
        let mut transcript = String::new();
        stream_progress(&input[..], &mut transcript);
        assert_eq!(
            transcript,
            "Counting objects: 50%\nCounting objects: 100%\nDone.\n"
        );
    }

    #[test]
    fn test_ssh_auth_debug_redacts_passphrase() {
        let auth = SshAuth {
            passphrase: Some(Zeroizing::new("hunter2".to_string())),
            ..no_auth()
        };
        let debug = format!("{:?}", auth);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_init_and_commit() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let store = GitStore::new();

        store.init(dir.path()).unwrap();
        fs::write(dir.path().join("config.toml"), "name = \"work\"\n").unwrap();
        store.commit_all(dir.path(), "New vault created.", &author()).unwrap();
        assert_eq!(commit_count(dir.path()), 1);

        // nothing changed, still snapshots
        store.commit_all(dir.path(), "Empty", &author()).unwrap();
        assert_eq!(commit_count(dir.path()), 2);
    }

    #[test]
    fn test_push_without_remote() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let store = GitStore::new();
        store.init(dir.path()).unwrap();

        assert!(!store.has_remote(dir.path()).unwrap());
        let err = store.push(dir.path(), &no_auth()).unwrap_err();
        assert!(matches!(err, StoreError::NoRemote(_)));
    }

    #[test]
    fn test_push_and_clone_through_bare_remote() {
        if !git_available() {
            return;
        }
        let root = TempDir::new().unwrap();
        let remote = root.path().join("remote.git");
        let status = Command::new("git")
            .args(["init", "-q", "--bare"])
            .arg(&remote)
            .status()
            .unwrap();
        assert!(status.success());
        // clone checks out whatever the bare HEAD names
        let status = Command::new("git")
            .arg("--git-dir")
            .arg(&remote)
            .args(["symbolic-ref", "HEAD", "refs/heads/master"])
            .status()
            .unwrap();
        assert!(status.success());

        let store = GitStore::new();
        let local = root.path().join("local");
        fs::create_dir(&local).unwrap();
        store.init(&local).unwrap();
        fs::write(local.join("secret"), "ciphertext").unwrap();
        store.commit_all(&local, "Added entry", &author()).unwrap();

        let url = remote.to_string_lossy().to_string();
        store.set_remote(&local, &url).unwrap();
        assert!(store.has_remote(&local).unwrap());
        // updating an existing remote is fine
        store.set_remote(&local, &url).unwrap();
        store.push(&local, &no_auth()).unwrap();

        let copy = root.path().join("copy");
        store.clone_repo(&url, &copy, &no_auth()).unwrap();
        assert_eq!(fs::read_to_string(copy.join("secret")).unwrap(), "ciphertext");

        let err = store.clone_repo(&url, &copy, &no_auth()).unwrap_err();
        assert!(matches!(err, StoreError::DestinationExists(_)));
    }
}
