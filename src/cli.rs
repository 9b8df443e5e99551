use anyhow::Context;
use clap::{Parser, Subcommand};
use std::collections::BTreeSet;

use crate::config::Config;
use crate::models::ScopeCategory;
use crate::services::token::{build_feed_subscribe_url, build_feed_url, build_share_url};
use crate::services::ShareToken;
use crate::store::SqliteStore;

#[derive(Parser)]
#[command(name = "pawshare")]
#[command(about = "Public share links and calendar feeds for pet care records")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Manage share links
    #[command(subcommand)]
    Share(ShareCommand),
    /// Manage calendar feeds
    #[command(subcommand)]
    Feed(FeedCommand),
}

#[derive(Subcommand)]
pub enum ShareCommand {
    /// Create a share link for a pet
    Create {
        #[arg(long)]
        pet: String,
        /// Comma-separated categories, e.g. contacts,vaccinations
        #[arg(long, default_value = "")]
        scope: String,
        /// Optional PIN (4-12 letters or digits)
        #[arg(long)]
        pin: Option<String>,
    },
    /// Deactivate a share link
    Revoke { token: String },
}

#[derive(Subcommand)]
pub enum FeedCommand {
    /// Issue a new feed token for a pet, invalidating the previous one
    Rotate {
        #[arg(long)]
        pet: String,
        #[arg(long)]
        name: Option<String>,
    },
}

/// Strict scope parsing for operator input: unknown names are an error here,
/// unlike stored scopes where they are dropped.
fn parse_scope_arg(raw: &str) -> anyhow::Result<BTreeSet<ScopeCategory>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|name| {
            ScopeCategory::from_str(name).with_context(|| {
                let known: Vec<_> = ScopeCategory::ALL.iter().map(|c| c.as_str()).collect();
                format!("Unknown scope '{}' (expected one of: {})", name, known.join(", "))
            })
        })
        .collect()
}

pub async fn run_share(store: &SqliteStore, config: &Config, command: ShareCommand) -> anyhow::Result<()> {
    match command {
        ShareCommand::Create { pet, scope, pin } => {
            let scope = parse_scope_arg(&scope)?;
            let token = store.create_share(&pet, &scope, pin.as_deref()).await?;
            println!("{}", build_share_url(&token, &config.share.public_origin));
        }
        ShareCommand::Revoke { token } => {
            let token = ShareToken::parse(token.trim()).context("Malformed share token")?;
            if store.revoke_share(&token).await? {
                println!("Share revoked");
            } else {
                println!("No active share with that token");
            }
        }
    }
    Ok(())
}

pub async fn run_feed(store: &SqliteStore, config: &Config, command: FeedCommand) -> anyhow::Result<()> {
    match command {
        FeedCommand::Rotate { pet, name } => {
            let token = store.rotate_feed_token(&pet, name.as_deref()).await?;
            println!("{}", build_feed_url(&token, &config.share.public_origin));
            println!("{}", build_feed_subscribe_url(&token, &config.share.public_origin));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scope_arg() {
        let scope = parse_scope_arg("contacts, vaccinations").unwrap();
        assert_eq!(
            scope,
            BTreeSet::from([ScopeCategory::Contacts, ScopeCategory::Vaccinations])
        );
        assert!(parse_scope_arg("").unwrap().is_empty());
        assert!(parse_scope_arg("contacts,billing").is_err());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "pawshare", "share", "create", "--pet", "pet-1", "--scope", "contacts", "--pin", "0000",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Share(ShareCommand::Create { ref pet, .. })) if pet == "pet-1"
        ));

        let cli = Cli::try_parse_from(["pawshare"]).unwrap();
        assert!(cli.command.is_none());
    }
}
