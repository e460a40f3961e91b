//! passward - Shared secret vaults keyed by your ssh key pair
//!
//! Commands:
//! - setup: record who you are and which ssh key pair to use
//! - vault new|list|show|use|set-remote|sync|fetch|add-user|remove-user
//! - secret add|reveal

mod cli;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, SecretCommands, VaultCommands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("passward=debug,passward_core=debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let home = cli.home;
    match cli.command {
        Commands::Setup { email, name, key } => cli::cmd_setup(home, email, name, key),
        Commands::Vault(command) => match command {
            VaultCommands::New { name, description } => {
                cli::cmd_vault_new(home, &name, &description)
            }
            VaultCommands::List { json } => cli::cmd_vault_list(home, json),
            VaultCommands::Show { name } => cli::cmd_vault_show(home, name.as_deref()),
            VaultCommands::Use { name } => cli::cmd_vault_use(home, &name),
            VaultCommands::SetRemote { url, vault } => {
                cli::cmd_vault_set_remote(home, &url, vault.as_deref())
            }
            VaultCommands::Sync { vault } => cli::cmd_vault_sync(home, vault.as_deref()),
            VaultCommands::Fetch { url, name } => {
                cli::cmd_vault_fetch(home, &url, name.as_deref())
            }
            VaultCommands::AddUser {
                email,
                public_key,
                vault,
            } => cli::cmd_vault_add_user(home, &email, &public_key, vault.as_deref()),
            VaultCommands::RemoveUser { email, vault } => {
                cli::cmd_vault_remove_user(home, &email, vault.as_deref())
            }
        },
        Commands::Secret(command) => match command {
            SecretCommands::Add {
                site,
                username,
                description,
                vault,
            } => cli::cmd_secret_add(home, &site, &username, &description, vault.as_deref()),
            SecretCommands::Reveal { site, vault } => {
                cli::cmd_secret_reveal(home, &site, vault.as_deref())
            }
        },
        Commands::Askpass { .. } => cli::cmd_askpass(),
    }
}
