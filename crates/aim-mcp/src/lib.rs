//! ai-mail-mcp — stdio tool server for the shared agent mailbox.
//!
//! The binary registers the calling agent, then speaks JSON-RPC over
//! stdin/stdout: `initialize`, `ping`, `tools/list`, and `tools/call` for
//! the ten mailbox tools. The kernel lives in `ai-mail-core`; this crate is
//! the transport adapter around it:
//!
//! - [`tools`] — the tool definitions advertised by `tools/list`
//! - [`dispatcher`] — argument validation and routing into the kernel
//! - [`framing`] — stdio message framing (Content-Length or line-delimited)
//! - [`server`] — the serve loop, heartbeat ticker, and shutdown path
//! - [`admin`] — the `--list-agents` / `--stats` / `--cleanup` one-shots

pub mod admin;
pub mod cli;
pub mod dispatcher;
pub mod framing;
pub mod server;
pub mod tools;
