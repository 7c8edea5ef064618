//! ai-mail-mcp — shared mailbox server for local AI agents.
//!
//! Default invocation registers this process as an agent and serves the
//! mailbox tools over stdio. `--list-agents`, `--stats`, and `--cleanup`
//! run one operation and exit.

use std::sync::Arc;

use clap::Parser;

use aim_core::store::MailStore;
use aim_core::{home, logging};
use aim_mcp::cli::Cli;
use aim_mcp::{admin, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();

    let data_dir = match &cli.data_dir {
        Some(dir) => dir.clone(),
        None => home::data_dir()?,
    };
    let store = MailStore::open(&data_dir)?;

    if cli.list_agents {
        return admin::list_agents(&store);
    }
    if cli.stats {
        return admin::stats(&store, cli.agent_name.as_deref());
    }
    if cli.cleanup {
        return admin::cleanup(&store);
    }

    let mailbox = server::register(store, cli.agent_name.as_deref())?;
    server::serve_stdio(Arc::new(mailbox)).await
}
