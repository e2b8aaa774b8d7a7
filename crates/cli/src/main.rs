//! Echelon CLI — the main entry point.
//!
//! Commands:
//! - `init`    — Write a default config file
//! - `message` — Send one message through the agent chain and print the reply
//! - `serve`   — Start the HTTP gateway
//! - `doctor`  — Diagnose configuration health

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "echelon",
    about = "Echelon — hierarchical agent orchestration runtime",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,

    /// Send a single message and print the final response
    Message {
        /// The message text
        text: String,

        /// Address a specific context id
        #[arg(short, long)]
        context: Option<String>,
    },

    /// Start the HTTP gateway server
    Serve {
        /// Override the bind host
        #[arg(long)]
        host: Option<String>,

        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Diagnose configuration health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Message { text, context } => commands::message::run(text, context).await?,
        Commands::Serve { host, port } => commands::serve::run(host, port).await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_declaration_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn message_command_parses() {
        let cli = Cli::parse_from(["echelon", "message", "hello", "--context", "c1"]);
        match cli.command {
            Commands::Message { text, context } => {
                assert_eq!(text, "hello");
                assert_eq!(context.as_deref(), Some("c1"));
            }
            _ => panic!("expected message command"),
        }
    }

    #[test]
    fn serve_command_parses_overrides() {
        let cli = Cli::parse_from(["echelon", "-v", "serve", "--port", "8080"]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Serve { host, port } => {
                assert!(host.is_none());
                assert_eq!(port, Some(8080));
            }
            _ => panic!("expected serve command"),
        }
    }
}
