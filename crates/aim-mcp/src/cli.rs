//! CLI argument types for ai-mail-mcp.
//!
//! The default invocation runs the stdio server; the three flags are
//! one-shot diagnostics that run a single operation and exit.

use clap::Parser;
use std::path::PathBuf;

/// Shared mailbox server for local AI agents
#[derive(Parser, Debug)]
#[command(name = "ai-mail-mcp", version, about)]
pub struct Cli {
    /// Print registered agents and exit
    #[arg(long, conflicts_with_all = ["stats", "cleanup"])]
    pub list_agents: bool,

    /// Print mailbox statistics for this agent and exit
    #[arg(long, conflicts_with = "cleanup")]
    pub stats: bool,

    /// Drop stale agent registrations and companion files, then exit
    #[arg(long)]
    pub cleanup: bool,

    /// Directory holding the store file (default: $AI_MAIL_DATA_DIR or ~/.ai_mail)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Agent name override (default: $AI_AGENT_NAME or auto-detected)
    #[arg(long)]
    pub agent_name: Option<String>,
}
