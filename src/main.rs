use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use device_check::{DeviceCheckClient, FileKeyStore, StaticTokenProvider};
use tracing::info;

mod config;
mod logging;

use config::Config;

/// Enrolls this device with the device check service and answers its
/// attestation challenges.
#[derive(Debug, Parser)]
#[command(name = "device-check", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a device key and register it with the service
    Enroll {
        #[arg(long)]
        payment_id: String,
        /// File holding the raw device-integrity token
        #[arg(long)]
        token_file: PathBuf,
    },
    /// Fetch the pending nonce challenge
    Challenge {
        #[arg(long)]
        payment_id: String,
    },
    /// Answer a nonce challenge
    Respond {
        #[arg(long)]
        nonce: String,
    },
    /// Fetch the pending challenge and answer it
    Attest {
        #[arg(long)]
        payment_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = Config::from_env()?;
    logging::setup_logging(&cfg)?;
    cfg.info();

    let token = match &cli.command {
        Command::Enroll { token_file, .. } => std::fs::read(token_file)
            .with_context(|| format!("reading device token from {}", token_file.display()))?,
        _ => Vec::new(),
    };
    let client = DeviceCheckClient::new(
        cfg.client_options(),
        Arc::new(FileKeyStore::new(&cfg.key_dir)),
        Arc::new(StaticTokenProvider::new(token)),
    )?;

    match cli.command {
        Command::Enroll { payment_id, .. } => {
            let token = client.generate_token().await?;
            let registration = client.generate_enrollment(&payment_id, &token)?;
            client.register_device(&registration).await?;
            info!(payment_id = %payment_id, "device enrolled");
        }
        Command::Challenge { payment_id } => {
            let challenge = client.get_attestation(&payment_id).await?;
            println!("{}", challenge.nonce);
        }
        Command::Respond { nonce } => {
            client.set_attestation(&nonce).await?;
            info!(nonce = %nonce, "challenge answered");
        }
        Command::Attest { payment_id } => {
            let nonce = client.attest(&payment_id).await?;
            info!(nonce = %nonce, "challenge answered");
        }
    }
    Ok(())
}
