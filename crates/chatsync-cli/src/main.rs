use std::path::PathBuf;

use anyhow::{Context, Result};
use chatsync_application::ChatClient;
use chatsync_core::cancel::CancellationToken;
use chatsync_core::message::Direction;
use chatsync_infrastructure::{ChatSyncPaths, ConfigService};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;

const DEFAULT_LOG_FILTER: &str =
    "warn,chatsync_core=info,chatsync_infrastructure=info,chatsync_application=info,reconcile=info";

#[derive(Parser)]
#[command(name = "chatsync")]
#[command(about = "chatsync - customer chat client with account switching and synced history", long_about = None)]
struct Cli {
    /// REST authority base URL (overrides config and CHATSYNC_API_BASE)
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Use the local authority even if an API base is configured
    #[arg(long, global = true)]
    local: bool,

    /// Path to config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage identities
    Accounts {
        #[command(subcommand)]
        action: AccountsAction,
    },
    /// Log in as an identity (builtin identities need no password)
    Login {
        id: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Switch to an identity already known to this client
    Switch { id: String },
    /// Clear the active session
    Logout,
    /// Show the active session
    Whoami,
    /// Send a message as the active identity
    Send { text: String },
    /// Show the conversation history, newest first
    History {
        #[arg(long, value_enum)]
        direction: Option<DirectionArg>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Mark received messages as viewed
    MarkViewed,
    /// Delete the active identity's history
    DeleteHistory,
}

#[derive(Subcommand)]
enum AccountsAction {
    /// List identities (* marks the active one)
    List,
    /// Create an account
    Create {
        name: String,
        #[arg(long, default_value = "")]
        password: String,
        /// Defaults to the password
        #[arg(long)]
        confirm: Option<String>,
    },
    /// Rename an identity
    Rename { id: String, name: String },
    /// Restore an identity's default name
    ResetName { id: String },
    /// Change the password of a created account
    Password {
        id: String,
        #[arg(long)]
        new: String,
        #[arg(long)]
        confirm: String,
    },
    /// Delete a created account
    Delete { id: String },
    /// Drop identities the authority no longer knows
    Reconcile,
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    Sent,
    Received,
}

impl From<DirectionArg> for Direction {
    fn from(value: DirectionArg) -> Self {
        match value {
            DirectionArg::Sent => Direction::Sent,
            DirectionArg::Received => Direction::Received,
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn build_client(cli: &Cli) -> Result<ChatClient> {
    let paths = ChatSyncPaths::resolve().context("Failed to resolve chatsync directories")?;
    let service = match &cli.config {
        Some(path) => ConfigService::new(path.clone()),
        None => ConfigService::from_paths(&paths),
    };
    let mut config = service
        .load()
        .with_context(|| format!("Failed to load {}", service.path().display()))?;

    if let Some(base) = cli.api_base.as_deref().map(str::trim) {
        config.api_base = (!base.is_empty()).then(|| base.to_string());
    }
    config.force_local |= cli.local;
    tracing::debug!(
        path = %service.path().display(),
        local = config.uses_local_authority(),
        "loaded configuration"
    );

    ChatClient::bootstrap(config, &paths).await
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let client = build_client(&cli).await?;

    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling the running command");
            interrupt.cancel();
        }
    });

    match cli.command {
        Commands::Accounts { action } => match action {
            AccountsAction::List => commands::accounts::list(&client).await?,
            AccountsAction::Create {
                name,
                password,
                confirm,
            } => {
                commands::accounts::create(&client, &name, &password, confirm.as_deref(), &token)
                    .await?
            }
            AccountsAction::Rename { id, name } => {
                commands::accounts::rename(&client, &id, &name, &token).await?
            }
            AccountsAction::ResetName { id } => {
                commands::accounts::reset_name(&client, &id, &token).await?
            }
            AccountsAction::Password { id, new, confirm } => {
                commands::accounts::change_password(&client, &id, &new, &confirm, &token).await?
            }
            AccountsAction::Delete { id } => commands::accounts::delete(&client, &id, &token).await?,
            AccountsAction::Reconcile => commands::accounts::reconcile(&client, &token).await?,
        },
        Commands::Login { id, password } => {
            commands::session::login(&client, &id, password.as_deref(), &token).await?
        }
        Commands::Switch { id } => commands::session::switch(&client, &id).await?,
        Commands::Logout => commands::session::logout(&client).await?,
        Commands::Whoami => commands::session::whoami(&client).await?,
        Commands::Send { text } => commands::messages::send(&client, &text, &token).await?,
        Commands::History {
            direction,
            search,
            page,
        } => {
            commands::messages::history(&client, direction.map(Into::into), search, page, &token)
                .await?
        }
        Commands::MarkViewed => commands::messages::mark_viewed(&client, &token).await?,
        Commands::DeleteHistory => commands::messages::delete_history(&client, &token).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_history_flags_parse() {
        let cli = Cli::parse_from([
            "chatsync",
            "history",
            "--direction",
            "received",
            "--search",
            "order",
            "--page",
            "2",
        ]);
        match cli.command {
            Commands::History {
                direction,
                search,
                page,
            } => {
                assert!(matches!(direction, Some(DirectionArg::Received)));
                assert_eq!(search.as_deref(), Some("order"));
                assert_eq!(page, 2);
            }
            _ => panic!("expected history"),
        }
    }
}
