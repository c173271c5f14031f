use std::sync::Arc;
use std::time::Duration;

use chronocat_crdt::Db;
use chronocat_model::CatalogueModel;
use chronocat_sync::{SyncEngine, channel_link};

/// Wires two `SyncEngine`s back to back over a pair of crossed `mpsc`
/// channels, spawning the driver tasks that pump incoming bytes into each
/// engine — mimicking what a WebSocket read loop would do in `chronocat-server`.
#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn remote_peers_converge_over_mpsc_transport() {
	let a = Db::new();
	let b = Db::new();

	let (a_to_b, mut a_to_b_rx) = channel_link();
	let (b_to_a, mut b_to_a_rx) = channel_link();

	let engine_a = Arc::new(SyncEngine::attach(a.doc().clone(), Arc::new(a_to_b)));
	let engine_b = Arc::new(SyncEngine::attach(b.doc().clone(), Arc::new(b_to_a)));

	let pump_a = {
		let engine_a = Arc::clone(&engine_a);
		tokio::spawn(async move {
			while let Some(message) = b_to_a_rx.recv().await {
				engine_a.handle_incoming(&message).await.unwrap();
			}
		})
	};
	let pump_b = {
		let engine_b = Arc::clone(&engine_b);
		tokio::spawn(async move {
			while let Some(message) = a_to_b_rx.recv().await {
				engine_b.handle_incoming(&message).await.unwrap();
			}
		})
	};

	engine_a.send_initial_sync().await.unwrap();
	tokio::time::sleep(Duration::from_millis(10)).await;

	a.create_catalogue(CatalogueModel::new("cat0", "John"), []).unwrap();
	tokio::time::sleep(Duration::from_millis(10)).await;

	assert_eq!(a.catalogues().len(), 1);
	assert_eq!(b.catalogues().len(), 1);

	pump_a.abort();
	pump_b.abort();
}

// vim: ts=4
