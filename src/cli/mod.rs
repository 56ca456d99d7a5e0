//! CLI command definitions and parsing
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "hindsight",
    version,
    about = "Unified recall over archived conversations",
    long_about = "Hindsight searches an archived conversation corpus by combining exact \
                  full-text matching with embedding similarity, fusing both result sets \
                  into one ranked answer that can be filtered by author role, time range, \
                  and project tag, and optionally grouped by conversation."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/hindsight/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search the archive with fused lexical and semantic recall
    Search(SearchArgs),

    /// Show store statistics and collaborator endpoints
    Status,

    /// Show the project tag rules in effect
    Tags,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Query text; multiple words are matched as one exact phrase
    pub query: String,

    /// Only messages written by this role
    #[arg(short, long, value_parser = ["user", "assistant", "tool", "system"])]
    pub role: Option<String>,

    /// Lower time bound: epoch seconds, YYYY-MM-DD, or ISO-8601
    #[arg(long, value_name = "WHEN")]
    pub since: Option<String>,

    /// Upper time bound, same forms as --since
    #[arg(long, value_name = "WHEN")]
    pub until: Option<String>,

    /// Only hits carrying this project tag
    #[arg(short, long, value_name = "TAG")]
    pub project: Option<String>,

    /// Lexical candidate cap (defaults from config)
    #[arg(long, value_name = "N")]
    pub fts: Option<usize>,

    /// Semantic candidate cap (defaults from config)
    #[arg(long, value_name = "N")]
    pub sem: Option<usize>,

    /// Flat result cap after fusion (defaults from config)
    #[arg(short, long, value_name = "N")]
    pub top: Option<usize>,

    /// Group results by conversation
    #[arg(short, long)]
    pub group: bool,

    /// Conversation cap when grouping (implies --group)
    #[arg(long, value_name = "N")]
    pub convos: Option<usize>,

    /// Hits kept per conversation when grouping (implies --group)
    #[arg(long, value_name = "N")]
    pub per_convo: Option<usize>,

    /// Embedding call timeout in seconds (defaults from config)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
