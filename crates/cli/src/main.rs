//! Kiosk CLI - Database migrations and identity management.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! kiosk-cli migrate
//!
//! # Make someone staff (they must have logged in once)
//! kiosk-cli staff grant --phone 0912345678
//!
//! # Move a customer to the wholesale price tier
//! kiosk-cli tier set --phone 0912345678 --tier wholesale
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `staff grant|revoke` - Change the staff role
//! - `tier set` - Change the price tier

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use kiosk_core::{Phone, PriceTier, Role};

mod commands;

#[derive(Parser)]
#[command(name = "kiosk-cli")]
#[command(author, version, about = "Kiosk CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage the staff role
    Staff {
        #[command(subcommand)]
        action: StaffAction,
    },
    /// Manage price tiers
    Tier {
        #[command(subcommand)]
        action: TierAction,
    },
}

#[derive(Subcommand)]
enum StaffAction {
    /// Give an identity the staff role
    Grant {
        /// Phone number of the identity
        #[arg(short, long, value_parser = Phone::parse)]
        phone: Phone,
    },
    /// Return an identity to the customer role
    Revoke {
        /// Phone number of the identity
        #[arg(short, long, value_parser = Phone::parse)]
        phone: Phone,
    },
}

#[derive(Subcommand)]
enum TierAction {
    /// Set the price tier of an identity
    Set {
        /// Phone number of the identity
        #[arg(short, long, value_parser = Phone::parse)]
        phone: Phone,

        /// Price tier (`standard`, `member`, `wholesale`)
        #[arg(short, long)]
        tier: PriceTier,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Staff { action } => match action {
            StaffAction::Grant { phone } => {
                commands::identity::set_role(&phone, Role::Staff).await?;
            }
            StaffAction::Revoke { phone } => {
                commands::identity::set_role(&phone, Role::Customer).await?;
            }
        },
        Commands::Tier { action } => match action {
            TierAction::Set { phone, tier } => {
                commands::identity::set_tier(&phone, tier).await?;
            }
        },
    }
    Ok(())
}
