//! Palisade
//!
//! Session-based authentication and group authorization service.

use anyhow::Context;
use clap::{Parser, Subcommand};
use palisade::auth::fixtures;
use palisade::{init_logging, AppConfig, AppState, Server};

/// Session-based authentication and group authorization service
#[derive(Parser)]
#[command(name = "palisade")]
#[command(about = "Session-based authentication and group authorization service")]
#[command(version)]
struct Cli {
    /// Database URL (falls back to DATABASE_URL, then memory stores)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Server host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Server port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },
    /// Provision users and print their ready-to-use authorization headers
    Seed {
        #[command(subcommand)]
        target: SeedTarget,
    },
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Create the system root admin identity
    Root,
    /// Create an admin user with optional groups
    Admin {
        /// Display name for the admin role holder
        #[arg(long)]
        name: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        email: String,
        /// Group display names; may be repeated
        #[arg(long = "group")]
        groups: Vec<String>,
    },
    /// Create an account user
    Account {
        /// Display name for the account role holder
        #[arg(long)]
        name: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        email: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    std::env::set_var(
        "RUST_LOG",
        format!("palisade={},tower_http=debug", cli.log_level),
    );
    init_logging();

    dotenvy::dotenv().ok();

    let mut config = AppConfig::from_env();
    if cli.database_url.is_some() {
        config.database_url = cli.database_url;
    }

    match cli.command {
        Command::Serve { host, port } => {
            config.host = host;
            config.port = port;

            let server = Server::new(config)
                .await
                .context("Failed to build server")?;
            server.start().await.context("Server failed")?;
        }
        Command::Seed { target } => {
            let state = AppState::new(config)
                .await
                .context("Failed to initialize state")?;

            let provisioned = match target {
                SeedTarget::Root => fixtures::create_root_admin_user(&state).await?,
                SeedTarget::Admin {
                    name,
                    username,
                    password,
                    email,
                    groups,
                } => {
                    let groups: Vec<&str> = groups.iter().map(String::as_str).collect();
                    fixtures::create_admin_user(
                        &state, &name, &username, &password, &email, &groups,
                    )
                    .await?
                }
                SeedTarget::Account {
                    name,
                    username,
                    password,
                    email,
                } => {
                    fixtures::create_account_user(&state, &name, &username, &password, &email)
                        .await?
                }
            };

            println!("user id:       {}", provisioned.user.id);
            println!("username:      {}", provisioned.user.username);
            println!("session id:    {}", provisioned.session.session.id);
            println!("authorization: {}", provisioned.auth_header);
        }
    }

    Ok(())
}
