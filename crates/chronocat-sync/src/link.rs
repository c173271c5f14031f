//! The transport abstraction the sync engine drives: anything that can carry
//! an opaque byte message to a remote peer.

use chronocat_types::{Error, Result};
use tokio::sync::mpsc;

/// A one-way channel to a sync peer. Implementors only need to move bytes;
/// the engine (`SyncEngine`) owns the sync-protocol semantics on top.
#[async_trait::async_trait]
pub trait PeerLink: Send + Sync {
	async fn send(&self, bytes: Vec<u8>) -> Result<()>;
}

/// An in-process loopback transport backed by an unbounded `mpsc` channel —
/// the "in-process mpsc channel for tests/same-process peers" transport named
/// in SPEC §4.6. A real network transport (the WebSocket sink `chronocat-server`
/// wires up) implements the same trait without touching this module.
pub struct MpscLink {
	tx: mpsc::UnboundedSender<Vec<u8>>,
}

#[async_trait::async_trait]
impl PeerLink for MpscLink {
	async fn send(&self, bytes: Vec<u8>) -> Result<()> {
		self.tx.send(bytes).map_err(|_| Error::TransportBroken)
	}
}

/// Builds one direction of an in-process transport: a `PeerLink` to hand to a
/// `SyncEngine` plus the receiving half a driver task reads from and feeds
/// into the peer's `SyncEngine::handle_incoming`.
pub fn channel_link() -> (MpscLink, mpsc::UnboundedReceiver<Vec<u8>>) {
	let (tx, rx) = mpsc::unbounded_channel();
	(MpscLink { tx }, rx)
}

// vim: ts=4
