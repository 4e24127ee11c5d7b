//! # roost-xmpp
//!
//! Stanza routing and clustered delivery engine for an XMPP server.
//!
//! This crate decides where each stanza goes once a client stream has parsed
//! it. Transport, stream negotiation and authentication live outside; they
//! plug in through the [`C2sStream`], [`S2sOutProvider`] and [`Cluster`]
//! contracts.
//!
//! ## Architecture
//!
//! - **Router**: hosted domains, per-user resource bindings, blocking lists
//!   and RFC 6121 delivery rules
//! - **Cluster**: bind/unbind/send propagation between nodes, with remote
//!   resources bound locally as proxies
//! - **Modules**: protocol-extension handlers and the IQ dispatcher
//! - **Storage**: async persistence contract with an in-memory backend
//!
//! ## XEP Support
//!
//! - RFC 6121 (Roster management)
//! - XEP-0012 (Last Activity)
//! - XEP-0030 (Service Discovery)
//! - XEP-0049 (Private XML Storage)
//! - XEP-0054 (vcard-temp)
//! - XEP-0077 (In-Band Registration)
//! - XEP-0092 (Software Version)
//! - XEP-0160 (Offline Messages)
//! - XEP-0191 (Blocking Command)
//! - XEP-0199 (XMPP Ping)

pub mod c2s;
pub mod cluster;
pub mod jid_match;
pub mod module;
pub mod router;
pub mod s2s;
pub mod stanza;
pub mod storage;

mod error;

#[cfg(test)]
mod testing;

pub use c2s::C2sStream;
pub use cluster::{Cluster, ClusterDelegate, ClusterError, ClusterMessage, ClusterNode};
pub use error::{iq_error_reply, iq_result, XmppError};
pub use module::{IqHandler, Module, Modules, ModulesConfig};
pub use router::{Router, RouterConfig, RouterError};
pub use s2s::{S2sError, S2sOut, S2sOutProvider};
pub use stanza::Stanza;
pub use storage::{InMemoryStorage, Storage, StorageError};
