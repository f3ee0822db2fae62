//! Courier portal CLI - migrations and agent management.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! cp-cli migrate
//!
//! # Pre-provision an agent (linked on first sign-in by email)
//! cp-cli agent create -e rider@example.com -n "Rider Name" -p "+1 555 0100"
//!
//! # Soft-disable / re-enable an agent
//! cp-cli agent deactivate -e rider@example.com
//! cp-cli agent activate -e rider@example.com
//!
//! # Insert demo claimable orders
//! cp-cli seed orders -c 10
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "cp-cli")]
#[command(author, version, about = "Courier portal CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage delivery agents
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },
    /// Seed the database with demo data
    Seed {
        #[command(subcommand)]
        target: SeedTarget,
    },
}

#[derive(Subcommand)]
enum AgentAction {
    /// Pre-provision an agent by email
    Create {
        /// Agent email address
        #[arg(short, long)]
        email: String,

        /// Agent display name
        #[arg(short, long)]
        name: String,

        /// Contact phone number
        #[arg(short, long)]
        phone: Option<String>,
    },
    /// Soft-disable an agent
    Deactivate {
        #[arg(short, long)]
        email: String,
    },
    /// Re-enable a disabled agent
    Activate {
        #[arg(short, long)]
        email: String,
    },
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Insert claimable demo orders with line items
    Orders {
        /// Number of orders to create
        #[arg(short, long, default_value_t = 10)]
        count: u32,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CliError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await,
        Commands::Agent { action } => match action {
            AgentAction::Create { email, name, phone } => {
                commands::agent::create(&email, &name, phone.as_deref()).await
            }
            AgentAction::Deactivate { email } => commands::agent::set_active(&email, false).await,
            AgentAction::Activate { email } => commands::agent::set_active(&email, true).await,
        },
        Commands::Seed { target } => match target {
            SeedTarget::Orders { count } => commands::seed::orders(count).await,
        },
    }
}
