//! CLI command definitions and handlers

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use passward::vault::{FIELD_DESCRIPTION, FIELD_PASSPHRASE, FIELD_USERNAME};
use passward::{Identity, KeyMaterialError, Passward, PasswardError, Session, Vault};
use passward_core::{detect_ssh_keys, GitStore, KeyPairPaths, Paths, ASKPASS_ENV};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// How many times `setup` asks for the key passphrase
const SETUP_ATTEMPTS: usize = 3;

/// passward - Shared secret vaults keyed by your ssh key pair
#[derive(Parser)]
#[command(name = "passward")]
#[command(version)]
#[command(about = "Shared secret vaults keyed by your ssh key pair")]
#[command(after_help = "EXAMPLES:\n\
    passward setup --email alice@example.com --key ~/.ssh/id_ed25519\n\
    passward vault new work\n\
    passward secret add github.com --username alice\n\
    passward secret reveal github.com\n\
    passward vault add-user bob@example.com bob.pub\n\
    passward vault set-remote git@example.com:team/work.git\n\
    passward vault sync")]
pub struct Cli {
    /// passward home (default: $PASSWARD_HOME, then ~/.passward)
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the passward home for your identity
    Setup {
        /// Your email address (identifies you in every vault)
        #[arg(long)]
        email: String,

        /// Your name (defaults to the email address)
        #[arg(long)]
        name: Option<String>,

        /// Private key file (defaults to the only key pair in ~/.ssh)
        #[arg(long)]
        key: Option<PathBuf>,
    },

    /// Manage vaults
    #[command(subcommand)]
    Vault(VaultCommands),

    /// Manage secrets in a vault
    #[command(subcommand)]
    Secret(SecretCommands),

    /// Print the key passphrase for ssh (used through SSH_ASKPASS)
    #[command(hide = true)]
    Askpass {
        /// Prompt text from ssh (ignored)
        prompt: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum VaultCommands {
    /// Create a new vault and switch to it
    New {
        name: String,

        /// What the vault is for
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// List known vaults
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a vault's users and entries
    Show {
        /// Vault name (default: selected vault)
        name: Option<String>,
    },

    /// Select the vault other commands act on
    Use { name: String },

    /// Set the git remote the vault is shared through
    SetRemote {
        url: String,

        #[arg(long)]
        vault: Option<String>,
    },

    /// Push the vault to its remote
    Sync {
        #[arg(long)]
        vault: Option<String>,
    },

    /// Clone a shared vault and switch to it
    Fetch {
        url: String,

        /// Local name (default: derived from the url)
        name: Option<String>,
    },

    /// Give someone access to a vault
    AddUser {
        email: String,

        /// Their public key file (e.g. id_ed25519.pub)
        public_key: PathBuf,

        #[arg(long)]
        vault: Option<String>,
    },

    /// Remove someone's access record (the master key is not rotated)
    RemoveUser {
        email: String,

        #[arg(long)]
        vault: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum SecretCommands {
    /// Store a site's credentials (prompts for the passphrase)
    Add {
        /// Site or service name, e.g. github.com
        site: String,

        #[arg(short, long)]
        username: String,

        #[arg(short, long, default_value = "")]
        description: String,

        #[arg(long)]
        vault: Option<String>,
    },

    /// Decrypt and print an entry
    Reveal {
        site: String,

        #[arg(long)]
        vault: Option<String>,
    },
}

/// Summary of one vault for `vault list --json`
#[derive(Serialize)]
struct VaultSummary<'a> {
    name: &'a str,
    description: &'a str,
    remote_upstream: Option<&'a str>,
    users: usize,
    entries: usize,
    selected: bool,
}

fn paths(home: Option<PathBuf>) -> Paths {
    home.map(Paths::new).unwrap_or_else(Paths::detect)
}

fn store() -> GitStore {
    match std::env::current_exe() {
        Ok(exe) => GitStore::new().with_askpass(exe),
        Err(_) => GitStore::new(),
    }
}

fn load(home: Option<PathBuf>) -> Result<Passward> {
    Passward::open(paths(home), Box::new(store()))
        .context("Failed to load passward. Did you run `passward setup`?")
}

fn prompt_passphrase() -> Result<String> {
    rpassword::prompt_password("Passphrase for your ssh key (empty for none): ")
        .context("Failed to read passphrase")
}

/// Load and unlock, prompting once for the key passphrase
fn load_unlocked(home: Option<PathBuf>) -> Result<Passward> {
    let mut pw = load(home)?;
    let passphrase = prompt_passphrase()?;
    pw.unlock(&passphrase).context("Failed to unlock your keys")?;
    Ok(pw)
}

/// After a failed transport, the key the remote has to accept
fn public_key_hint(identity: &Identity) -> String {
    let mut hint = String::from("If authentication failed, the remote may need your public key:\n");
    if let Ok(key) = identity.public_key_string() {
        hint.push('\n');
        hint.push_str(key.trim_end());
        hint.push('\n');
    }
    hint
}

fn choose_key(key: Option<PathBuf>) -> Result<KeyPairPaths> {
    if let Some(private_key) = key {
        return Ok(KeyPairPaths::from_private(private_key));
    }

    let ssh_dir = Paths::ssh_dir();
    let mut found = detect_ssh_keys(&ssh_dir);
    match found.len() {
        0 => bail!(
            "No ssh key pairs found in {}. Run ssh-keygen first.",
            ssh_dir.display()
        ),
        1 => Ok(found.remove(0)),
        _ => {
            eprintln!("Several key pairs found, choose one with --key:");
            for pair in &found {
                eprintln!("  {}", pair.description());
            }
            bail!("Ambiguous key pair")
        }
    }
}

pub fn cmd_setup(
    home: Option<PathBuf>,
    email: String,
    name: Option<String>,
    key: Option<PathBuf>,
) -> Result<()> {
    let pair = choose_key(key)?;
    let name = name.filter(|n| !n.is_empty()).unwrap_or_else(|| email.clone());
    let identity = Identity::new(name, email, &pair.public_key, &pair.private_key);

    // check the key pair before creating anything on disk
    let mut session = Session::new(identity.clone());
    let mut attempt = 0;
    loop {
        attempt += 1;
        let passphrase = prompt_passphrase()?;
        match session.unlock(&passphrase) {
            Ok(()) => break,
            Err(PasswardError::KeyMaterial(
                e @ (KeyMaterialError::WrongPassphrase(_) | KeyMaterialError::PassphraseRequired(_)),
            )) if attempt < SETUP_ATTEMPTS => {
                eprintln!("error: {}, try again", e);
            }
            Err(e) => return Err(e).context("Failed to unlock your keys"),
        }
    }

    let pw = Passward::create(paths(home), identity, Box::new(store()))?;

    println!("success: passward set up in {}", pw.paths().home.display());
    println!("Using key pair: {}", pair.description());
    println!();
    println!("Create a vault with: passward vault new <name>");
    Ok(())
}

pub fn cmd_vault_new(home: Option<PathBuf>, name: &str, description: &str) -> Result<()> {
    let mut pw = load_unlocked(home)?;
    pw.add_vault(name, description)
        .with_context(|| format!("Failed to create vault {}", name))?;

    if let Err(e) = pw.use_vault(name) {
        eprintln!("warning: vault created but could not switch to it: {}", e);
    }

    println!("success: Vault created: {}", name);
    println!("Switched to it. Select another with: passward vault use <name>");
    Ok(())
}

pub fn cmd_vault_list(home: Option<PathBuf>, json: bool) -> Result<()> {
    let pw = load(home)?;
    let selected = pw.selected_vault_name();

    if json {
        let summaries: Vec<VaultSummary> = pw
            .vaults()
            .map(|v| VaultSummary {
                name: v.name(),
                description: v.description(),
                remote_upstream: v.remote_upstream(),
                users: v.users().len(),
                entries: v.entries().len(),
                selected: Some(v.name()) == selected,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if pw.vaults().next().is_none() {
        println!("No vaults yet. Create one with: passward vault new <name>");
        return Ok(());
    }

    println!("Vaults");
    println!();
    for vault in pw.vaults() {
        let marker = if Some(vault.name()) == selected { "*" } else { " " };
        if vault.description().is_empty() {
            println!("{} {}", marker, vault.name());
        } else {
            println!("{} {:<16} {}", marker, vault.name(), vault.description());
        }
    }
    Ok(())
}

fn print_vault(vault: &Vault) {
    println!("Vault: {}", vault.name());
    if !vault.description().is_empty() {
        println!("Description: {}", vault.description());
    }
    println!("Path: {}", vault.path().display());
    println!("Remote: {}", vault.remote_upstream().unwrap_or("(none)"));
    println!();

    println!("Users ({}):", vault.users().len());
    for user in vault.users().iter() {
        println!("  {}", user.email());
    }
    println!();

    println!("Entries ({}):", vault.entries().len());
    for entry in vault.entries().iter() {
        println!("  {}", entry.name());
    }
}

pub fn cmd_vault_show(home: Option<PathBuf>, name: Option<&str>) -> Result<()> {
    let pw = load(home)?;
    let vault = match name {
        Some(name) => pw.vault(name),
        None => pw.selected_vault(),
    };
    match vault {
        Some(vault) => {
            print_vault(vault);
            Ok(())
        }
        None => bail!("Vault not found: {}", name.unwrap_or("(none selected)")),
    }
}

pub fn cmd_vault_use(home: Option<PathBuf>, name: &str) -> Result<()> {
    let mut pw = load(home)?;
    pw.use_vault(name)?;
    println!("success: Using vault: {}", name);
    Ok(())
}

pub fn cmd_vault_set_remote(home: Option<PathBuf>, url: &str, vault: Option<&str>) -> Result<()> {
    let mut pw = load(home)?;
    let (vault, ctx) = pw.vault_mut(vault)?;
    vault.set_remote(ctx, url)?;
    println!("success: Remote for {} set to {}", vault.name(), url);
    Ok(())
}

pub fn cmd_vault_sync(home: Option<PathBuf>, vault: Option<&str>) -> Result<()> {
    let mut pw = load_unlocked(home)?;
    let (vault, ctx) = pw.vault_mut(vault)?;
    let name = vault.name().to_string();
    if let Err(e) = vault.sync(ctx) {
        eprintln!("error: Unable to push vault {}", name);
        eprint!("{}", public_key_hint(pw.identity()));
        return Err(e.into());
    }
    println!("success: Vault pushed: {}", name);
    Ok(())
}

pub fn cmd_vault_fetch(home: Option<PathBuf>, url: &str, name: Option<&str>) -> Result<()> {
    let mut pw = load_unlocked(home)?;

    let fetched = pw.fetch_vault(url, name).map(|v| v.name().to_string());
    let fetched = match fetched {
        Ok(name) => name,
        Err(e) => {
            eprintln!("error: Unable to fetch vault from {}", url);
            eprint!("{}", public_key_hint(pw.identity()));
            return Err(e.into());
        }
    };

    if let Err(e) = pw.use_vault(&fetched) {
        eprintln!("warning: vault fetched but could not switch to it: {}", e);
    }
    println!("success: Vault fetched: {}", fetched);
    Ok(())
}

pub fn cmd_vault_add_user(
    home: Option<PathBuf>,
    email: &str,
    public_key: &Path,
    vault: Option<&str>,
) -> Result<()> {
    let key = fs::read_to_string(public_key)
        .with_context(|| format!("Failed to read public key {}", public_key.display()))?;

    let mut pw = load_unlocked(home)?;
    let (vault, ctx) = pw.vault_mut(vault)?;
    vault.add_user(ctx, email, &key)?;

    println!("success: {} added to {}", email, vault.name());
    println!("Run `passward vault sync` to share the change.");
    Ok(())
}

pub fn cmd_vault_remove_user(home: Option<PathBuf>, email: &str, vault: Option<&str>) -> Result<()> {
    let mut pw = load_unlocked(home)?;
    let (vault, ctx) = pw.vault_mut(vault)?;
    vault.remove_user(ctx, email)?;

    println!("success: {} removed from {}", email, vault.name());
    println!("note: the master key is unchanged; secrets they already saw stay known to them");
    Ok(())
}

pub fn cmd_secret_add(
    home: Option<PathBuf>,
    site: &str,
    username: &str,
    description: &str,
    vault: Option<&str>,
) -> Result<()> {
    let mut pw = load_unlocked(home)?;

    let secret = rpassword::prompt_password(format!("Passphrase for {}: ", site))
        .context("Failed to read secret")?;
    if secret.is_empty() {
        bail!("Empty passphrase not allowed");
    }

    let (vault, ctx) = pw.vault_mut(vault)?;
    vault.add_entry(ctx, site, username, &secret, description)?;

    println!("success: Secret stored: {} in {}", site, vault.name());
    Ok(())
}

pub fn cmd_secret_reveal(home: Option<PathBuf>, site: &str, vault: Option<&str>) -> Result<()> {
    let mut pw = load_unlocked(home)?;
    let (vault, ctx) = pw.vault_mut(vault)?;
    let revealed = vault.reveal_entry(ctx.session, site)?;

    println!("{}", site);
    for field in [FIELD_USERNAME, FIELD_PASSPHRASE, FIELD_DESCRIPTION] {
        if let Some(value) = revealed.get(field) {
            println!("  {}: {}", field, value.as_str());
        }
    }
    for (field, value) in &revealed {
        if ![FIELD_USERNAME, FIELD_PASSPHRASE, FIELD_DESCRIPTION].contains(&field.as_str()) {
            println!("  {}: {}", field, value.as_str());
        }
    }
    Ok(())
}

/// ssh runs this with SSH_ASKPASS; the passphrase comes from the parent
/// passward process through the environment
pub fn cmd_askpass() -> Result<()> {
    let passphrase = std::env::var(ASKPASS_ENV)
        .with_context(|| format!("{} is not set", ASKPASS_ENV))?;
    println!("{}", passphrase);
    Ok(())
}
