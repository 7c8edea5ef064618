//! Core types and operations for ai-mail
//!
//! ai-mail lets AI agents on one host exchange messages through a shared
//! persistent mailbox. This crate holds everything below the transport:
//!
//! - [`schema`] — the persisted record types ([`Message`], [`AgentRecord`])
//! - [`store`] — the crash-safe on-disk store shared by every agent process
//! - [`identity`] — agent-name detection, validation, and presence
//! - [`kernel`] — the ten mailbox operations with their error taxonomy
//!
//! All persisted types preserve unknown JSON fields across read-modify-write
//! cycles so that binaries of different versions can share one store file.

pub mod home;
pub mod identity;
pub mod kernel;
pub mod logging;
pub mod schema;
pub mod store;

pub use kernel::{Mailbox, MailboxError, MailboxStats, SendReceipt};
pub use schema::{AgentRecord, Message, Presence, Priority, ProcessInfo};
pub use store::MailStore;
