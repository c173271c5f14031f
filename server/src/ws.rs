//! `GET /ws/{room}` — upgrades to a WebSocket and hands it to a per-room sync
//! session, in the split-sink/split-stream-plus-`tokio::sync::Mutex` shape
//! the reference workspace's CRDT WebSocket handler uses.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use chronocat_sync::{PeerLink, SyncEngine};
use chronocat_types::{Error, Result};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;

use crate::registry::Rooms;

pub async fn upgrade(Path(room): Path<String>, State(rooms): State<Arc<Rooms>>, ws: WebSocketUpgrade) -> impl IntoResponse {
	ws.on_upgrade(move |socket| handle_connection(socket, room, rooms))
}

struct WebSocketLink {
	sink: Mutex<SplitSink<WebSocket, Message>>,
}

#[async_trait::async_trait]
impl PeerLink for WebSocketLink {
	async fn send(&self, bytes: Vec<u8>) -> Result<()> {
		self.sink.lock().await.send(Message::Binary(bytes.into())).await.map_err(|_| Error::TransportBroken)
	}
}

async fn handle_connection(socket: WebSocket, room_id: String, rooms: Arc<Rooms>) {
	let room = match rooms.get_or_create(&room_id).await {
		Ok(room) => room,
		Err(err) => {
			tracing::warn!("room {room_id}: failed to open: {err}");
			return;
		}
	};

	let (sink, mut stream) = socket.split();
	let link = Arc::new(WebSocketLink { sink: Mutex::new(sink) });
	let engine = SyncEngine::attach(room.db.doc().clone(), link);

	if let Err(err) = engine.send_initial_sync().await {
		tracing::warn!("room {room_id}: failed to send initial sync: {err}");
		return;
	}

	while let Some(message) = stream.next().await {
		match message {
			Ok(Message::Binary(bytes)) => {
				if let Err(err) = engine.handle_incoming(&bytes).await {
					tracing::warn!("room {room_id}: {err}");
				}
			}
			Ok(Message::Close(_)) => break,
			Ok(_) => continue,
			Err(err) => {
				tracing::warn!("room {room_id}: websocket error: {err}");
				break;
			}
		}
	}

	tracing::debug!("room {room_id}: connection closed");
}

// vim: ts=4
