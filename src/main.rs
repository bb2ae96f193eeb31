//! Wayfarer Runtime
//!
//! The entry point for the navigation agent. Handles CLI args, logging
//! setup, and configuration checks; the episode driver wires a simulator
//! adapter and a prompt collaborator to the agent.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use wayfarer::config::{default_client_config, Credentials};
use wayfarer::inference::{HttpTransport, NavInferenceClient};

const VERSION: &str = "0.1.0";

/// Wayfarer -- Embodied Navigation Agent Core
#[derive(Parser, Debug)]
#[command(
    name = "wayfarer",
    version = VERSION,
    about = "Embodied navigation agent core",
    long_about = "Asks a remote vision-language model to choose among candidate \
                  viewpoints and drives a panorama-graph simulator toward them."
)]
struct Cli {
    /// Validate credentials and construct an inference client, without
    /// any network activity
    #[arg(long)]
    check: bool,

    /// Show the effective client configuration
    #[arg(long)]
    status: bool,
}

/// Validate startup configuration: both credential identifiers must be in
/// the environment, and the client configuration must construct cleanly.
fn check() -> Result<()> {
    let credentials = Credentials::from_env().context("credential check failed")?;

    let config = default_client_config();
    let transport = Arc::new(
        HttpTransport::new(&config.api_url, credentials).context("transport construction failed")?,
    );
    let client =
        NavInferenceClient::new(config, transport).context("client construction failed")?;

    println!("Configuration OK. Model: {}", client.model());
    Ok(())
}

fn show_status() {
    let config = default_client_config();
    println!(
        r#"
=== WAYFARER STATUS ===
Endpoint:   {}
Model:      {}
Max tokens: {}
Attempts:   {}
Backoff:    {:?} .. {:?}
Timeout:    {:?}
Version:    {}
=======================
"#,
        config.api_url,
        config.model,
        config.max_tokens,
        config.retry.max_attempts,
        config.retry.min_backoff,
        config.retry.max_backoff,
        config.attempt_timeout,
        VERSION,
    );
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if cli.status {
        show_status();
        return;
    }

    if cli.check {
        if let Err(e) = check() {
            eprintln!("Check failed: {:#}", e);
            std::process::exit(1);
        }
        return;
    }

    // Default: show help
    println!("Run \"wayfarer --help\" for usage information.");
    println!("Run \"wayfarer --check\" to validate the configuration.");
}
