//! Command-line interface argument parsing.
//!
//! Global flags select the configuration, the store snapshot and the
//! analyzer backend; subcommands map onto the report and sharing API.

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// NewsLens - sentiment reports for news text
///
/// Split news text into blocks, label each block with sentiment, intents
/// and keywords using a local Ollama model, and share the resulting
/// reports with other users.
///
/// Examples:
///   newslens user add alice
///   newslens analyze --user alice --name "Morning wire" articles.txt
///   newslens share --user alice 1 bob carol
///   newslens show --user bob 1 --format json
///   newslens --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .newslens.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Store snapshot file (overrides [general] store)
    #[arg(long, value_name = "FILE", global = true, env = "NEWSLENS_STORE")]
    pub store: Option<PathBuf>,

    /// Ollama model used for analysis
    #[arg(short, long, global = true, env = "NEWSLENS_MODEL")]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, global = true, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Per-block analyzer timeout in seconds
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout: Option<u64>,

    /// Maximum concurrent analyzer calls
    #[arg(long, value_name = "NUM", global = true)]
    pub concurrency: Option<usize>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Generate a default .newslens.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Manage registered users
    User {
        #[command(subcommand)]
        action: UserCommand,
    },

    /// Analyze text and store it as a new report
    Analyze {
        #[command(flatten)]
        actor: Actor,

        /// Text file to analyze; reads stdin when omitted or "-"
        #[arg(value_name = "FILE")]
        input: Option<PathBuf>,

        /// Report name
        #[arg(long)]
        name: Option<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Render a report you own or that is shared with you
    Show {
        #[command(flatten)]
        actor: Actor,

        report: u64,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// List your reports and the reports shared with you
    List {
        #[command(flatten)]
        actor: Actor,
    },

    /// Share a report with one or more users
    Share {
        #[command(flatten)]
        actor: Actor,

        report: u64,

        /// Recipient handles
        #[arg(required = true)]
        recipients: Vec<String>,
    },

    /// Stop sharing a report with a user
    Unshare {
        #[command(flatten)]
        actor: Actor,

        report: u64,

        recipient: String,
    },

    /// Replace the full recipient list of a report
    ///
    /// Handles not listed lose access; an empty list unshares everyone.
    SetShares {
        #[command(flatten)]
        actor: Actor,

        report: u64,

        recipients: Vec<String>,
    },

    /// Delete a report you own
    Delete {
        #[command(flatten)]
        actor: Actor,

        report: u64,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum UserCommand {
    /// Register a new user
    Add { handle: String },
    /// List registered users
    List,
    /// Remove a user with their reports and grants
    Remove { handle: String },
}

/// The user a command acts as.
#[derive(ClapArgs, Debug, Clone, PartialEq)]
pub struct Actor {
    /// Handle of the acting user
    #[arg(short, long = "user", value_name = "HANDLE", env = "NEWSLENS_USER")]
    pub user: String,
}

/// Where and how a rendered report is written.
#[derive(ClapArgs, Debug, Clone, PartialEq)]
pub struct OutputArgs {
    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Write the rendered report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.command.is_none() {
            return Err("A subcommand is required (see --help)".to_string());
        }

        if let Some(ref url) = self.ollama_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
