use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use chronocat_crdt::Db;
use chronocat_model::{CatalogueModel, EventModel};

#[test]
fn scenario_a_local_round_trip() {
	let db = Db::new();
	let catalogue = db.create_catalogue(CatalogueModel::new("cat0", "John"), []).unwrap();
	let start = Utc.with_ymd_and_hms(2025, 1, 31, 0, 0, 0).unwrap();
	let stop = Utc.with_ymd_and_hms(2026, 1, 31, 0, 0, 0).unwrap();
	let event = db.create_event(EventModel::new("John", start, stop)).unwrap();

	catalogue.add_events([event.clone()]).unwrap();

	assert_eq!(catalogue.events().unwrap(), std::iter::once(event.clone()).collect());
	assert_eq!(event.start().unwrap(), start);

	let repr = catalogue.to_json().unwrap();
	let events = repr.get("events").and_then(|v| v.as_array()).unwrap();
	assert!(events.iter().any(|v| v.as_str() == Some(&event.uuid().to_string())));
}

#[test]
fn scenario_d_set_delta_observer_ordering() {
	let a = Db::new();
	let b = Db::new();
	a.sync(&b).unwrap();

	let catalogue_on_a = a.create_catalogue(CatalogueModel::new("cat0", "John"), []).unwrap();
	let catalogue_on_b = b.get_catalogue(catalogue_on_a.uuid()).unwrap();

	let adds: Arc<Mutex<Vec<BTreeSet<String>>>> = Arc::new(Mutex::new(Vec::new()));
	let removes: Arc<Mutex<Vec<BTreeSet<String>>>> = Arc::new(Mutex::new(Vec::new()));

	{
		let adds = Arc::clone(&adds);
		catalogue_on_b.on_add_tags(move |tags| adds.lock().unwrap().push(tags));
	}
	{
		let removes = Arc::clone(&removes);
		catalogue_on_b.on_remove_tags(move |tags| removes.lock().unwrap().push(tags));
	}

	catalogue_on_a.set_tags(["foo", "bar"]).unwrap();
	catalogue_on_a.remove_tags(["foo"]).unwrap();
	catalogue_on_a.add_tags(["baz"]).unwrap();

	let expected_adds: Vec<BTreeSet<String>> =
		vec![["foo", "bar"].into_iter().map(String::from).collect(), ["baz"].into_iter().map(String::from).collect()];
	let expected_removes: Vec<BTreeSet<String>> = vec![["foo"].into_iter().map(String::from).collect()];

	assert_eq!(*adds.lock().unwrap(), expected_adds);
	assert_eq!(*removes.lock().unwrap(), expected_removes);
}

#[test]
fn tombstone_enforcement_rejects_further_mutation() {
	let db = Db::new();
	let event = db.create_event(EventModel::new("John", Utc::now(), Utc::now())).unwrap();
	event.delete().unwrap();

	assert!(matches!(event.author(), Err(chronocat_types::Error::Deleted(_))));
	assert!(matches!(event.set_author("Jane"), Err(chronocat_types::Error::Deleted(_))));
	assert!(matches!(event.delete(), Err(chronocat_types::Error::Deleted(_))));
}

// vim: ts=4
