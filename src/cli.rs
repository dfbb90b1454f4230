//! Command-line interface definition for Streamforge
//!
//! This module defines the CLI structure using clap's derive API: a server
//! command plus read-only history inspection.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Streamforge - streaming chat relay for Gemini models
///
/// Serves token streams over SSE and WebSocket and keeps per-session
/// conversation history.
#[derive(Parser, Debug, Clone)]
#[command(name = "streamforge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the session database path
    #[arg(long, global = true)]
    pub storage_path: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, env = "STREAMFORGE_LOG_JSON")]
    pub json_logs: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Streamforge
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the HTTP and WebSocket server
    Serve {
        /// Address to bind, overriding `server.bind`
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Inspect stored chat history
    History {
        /// History subcommand
        #[command(subcommand)]
        command: HistoryCommand,
    },
}

/// History inspection subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// List sessions grouped by date
    List {
        /// Only show sessions owned by this user
        #[arg(short, long)]
        user: Option<String>,

        /// Page of date groups to show (1-based)
        #[arg(short, long, default_value_t = 1, allow_negative_numbers = true)]
        page: i64,
    },

    /// Show the messages of one session, newest page first
    Show {
        /// Session identifier
        session_id: String,

        /// Page of messages to show (1-based, page 1 is the newest)
        #[arg(short, long, default_value_t = 1, allow_negative_numbers = true)]
        page: i64,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_serve() {
        let cli = Cli::try_parse_from(["streamforge", "serve"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve { bind: None }));
        assert_eq!(cli.config.as_deref(), Some("config/config.yaml"));
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_parse_serve_with_bind() {
        let cli = Cli::try_parse_from(["streamforge", "serve", "--bind", "0.0.0.0:9000"]).unwrap();
        match cli.command {
            Commands::Serve { bind } => assert_eq!(bind.as_deref(), Some("0.0.0.0:9000")),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_history_list() {
        let cli = Cli::try_parse_from([
            "streamforge",
            "history",
            "list",
            "--user",
            "alice",
            "--page",
            "2",
        ])
        .unwrap();
        match cli.command {
            Commands::History {
                command: HistoryCommand::List { user, page },
            } => {
                assert_eq!(user.as_deref(), Some("alice"));
                assert_eq!(page, 2);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_history_show_defaults_to_first_page() {
        let cli = Cli::try_parse_from(["streamforge", "history", "show", "abc"]).unwrap();
        match cli.command {
            Commands::History {
                command: HistoryCommand::Show { session_id, page },
            } => {
                assert_eq!(session_id, "abc");
                assert_eq!(page, 1);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_global_flags() {
        let cli = Cli::try_parse_from([
            "streamforge",
            "--verbose",
            "--config",
            "custom.yaml",
            "history",
            "list",
            "--storage-path",
            "/tmp/s.db",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config.as_deref(), Some("custom.yaml"));
        assert_eq!(cli.storage_path, Some(PathBuf::from("/tmp/s.db")));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["streamforge"]).is_err());
    }
}
