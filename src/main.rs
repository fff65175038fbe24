//! Gmail Mail Tools - MCP server
//!
//! Exposes `send_email` and `get_emails_tool` over the Model Context Protocol.

use std::sync::Arc;

use clap::{Parser, Subcommand};

use gmail_mail_tools::config::Config;
use gmail_mail_tools::error::Result;
use gmail_mail_tools::gmail::auth::CredentialManager;
use gmail_mail_tools::gmail::client::GmailConnector;
use gmail_mail_tools::mcp::server::McpServer;
use gmail_mail_tools::mcp::tools::{ToolHandler, ToolSettings};

/// Gmail mail tools MCP server
#[derive(Parser)]
#[command(name = "gmail-mail-tools")]
#[command(author, version, about = "MCP server for sending and listing Gmail messages")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Obtain and store credentials now instead of on first tool call
    Auth,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Logs go to stderr; stdout carries the JSON-RPC stream
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = Config::new()?;

    match cli.command {
        Some(Commands::Auth) => {
            let scopes = config.scopes.clone();
            let credentials = CredentialManager::from_config(config);
            credentials.obtain_credentials(&scopes).await?;
            eprintln!("Authentication completed successfully!");
        }
        None => {
            run_server(config).await?;
        }
    }

    Ok(())
}

async fn run_server(config: Config) -> Result<()> {
    if !config.client_secret_exists() && !config.credentials_path.exists() {
        tracing::warn!(
            "Neither {} nor {} found; tool calls will fail until credentials are provided",
            config.client_secret_path.display(),
            config.credentials_path.display()
        );
    }

    let settings = ToolSettings {
        sender_address: config.sender_address.clone(),
        list_limit: config.list_limit,
    };

    let credentials = Arc::new(CredentialManager::from_config(config));
    let connector = Arc::new(GmailConnector::new(credentials));

    tracing::info!("Starting MCP server");
    let mut server = McpServer::new(ToolHandler::new(connector, settings));
    server.run_stdio().await?;

    Ok(())
}
