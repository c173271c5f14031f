use std::time::Duration;

use chronocat_crdt::Db;
use chronocat_model::CatalogueModel;
use chronocat_persist::FileLog;

#[tokio::test]
async fn replays_catalogue_and_event_after_reopen() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("room.y");

	{
		let db = Db::new();
		let log = FileLog::open(&path, &db, Duration::ZERO).await.unwrap();
		let event = db.create_event(chronocat_model::EventModel::new("John", chrono::Utc::now(), chrono::Utc::now())).unwrap();
		db.create_catalogue(CatalogueModel::new("cat0", "John"), [event]).unwrap();
		log.flush().await.unwrap();
	}

	let reopened = Db::new();
	let _log = FileLog::open(&path, &reopened, Duration::ZERO).await.unwrap();
	assert_eq!(reopened.catalogues().len(), 1);
	let catalogue = reopened.catalogues().into_iter().next().unwrap();
	assert_eq!(catalogue.name().unwrap(), "cat0");
	assert_eq!(catalogue.events().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn coalesces_bursty_writes_within_the_delay_window() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("room.y");

	let db = Db::new();
	let log = FileLog::open(&path, &db, Duration::from_millis(100)).await.unwrap();

	for i in 0..20 {
		db.create_catalogue(CatalogueModel::new(format!("cat{i}"), "John"), []).unwrap();
		tokio::time::sleep(Duration::from_millis(10)).await;
	}

	// Still within the coalescing window: nothing but the header has hit disk.
	let mid_burst = tokio::fs::read(&path).await.unwrap();
	assert_eq!(mid_burst.len(), 6);

	tokio::time::sleep(Duration::from_millis(150)).await;
	let settled = tokio::fs::read(&path).await.unwrap();
	assert!(settled.len() > 6);

	drop(log);
}

// vim: ts=4
