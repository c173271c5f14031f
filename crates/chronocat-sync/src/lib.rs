//! Transport-agnostic peer sync: the [`PeerLink`] abstraction and the
//! [`SyncEngine`] that drives the `yrs` sync handshake over it. The
//! in-process case (two local `Db`s) is handled directly by
//! `chronocat_crdt::Db::sync` and never needs this crate; `SyncEngine` is for
//! peers reachable only through an async byte transport, such as the
//! WebSocket connections `chronocat-server` terminates.

pub mod engine;
pub mod link;

pub use engine::SyncEngine;
pub use link::{MpscLink, PeerLink, channel_link};

// vim: ts=4
