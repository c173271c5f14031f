//! Translates committed CRDT deltas into typed, per-object callbacks.
//!
//! Each object kind (catalogue, event) gets its own `Registry`: per-uuid scalar
//! field callbacks, per-uuid/per-collection add and remove callbacks, and
//! per-uuid delete callbacks. The object façade decides *when* to register a
//! callback (lazily, on first `on_change_*`/`on_add_*`/`on_delete` call); this
//! module only owns *storage and dispatch*.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

use serde_json::Value;
use uuid::Uuid;

use crate::catalogue::Catalogue;
use crate::event::Event;

/// The payload delivered to a collection add/remove callback. Plain key sets
/// cover `tags`/`products`; `Attributes` additionally carries the new value;
/// `Events` carries already-resolved `Event` handles (dangling uuids filtered).
#[derive(Clone)]
pub enum CollectionDelta {
	Keys(Vec<String>),
	Attributes(Vec<(String, Value)>),
	Events(Vec<Event>),
}

type FieldCallback = Box<dyn FnMut(Value) + Send>;
type DeltaCallback = Box<dyn FnMut(CollectionDelta) + Send>;
type DeleteCallback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Registry {
	fields: Mutex<HashMap<Uuid, HashMap<&'static str, Vec<FieldCallback>>>>,
	added: Mutex<HashMap<Uuid, HashMap<&'static str, Vec<DeltaCallback>>>>,
	removed: Mutex<HashMap<Uuid, HashMap<&'static str, Vec<DeltaCallback>>>>,
	deleted: Mutex<HashMap<Uuid, Vec<DeleteCallback>>>,
}

impl Registry {
	fn on_field(&self, uuid: Uuid, field: &'static str, cb: FieldCallback) {
		lock(&self.fields).entry(uuid).or_default().entry(field).or_default().push(cb);
	}

	fn on_added(&self, uuid: Uuid, collection: &'static str, cb: DeltaCallback) {
		lock(&self.added).entry(uuid).or_default().entry(collection).or_default().push(cb);
	}

	fn on_removed(&self, uuid: Uuid, collection: &'static str, cb: DeltaCallback) {
		lock(&self.removed).entry(uuid).or_default().entry(collection).or_default().push(cb);
	}

	fn on_deleted(&self, uuid: Uuid, cb: DeleteCallback) {
		lock(&self.deleted).entry(uuid).or_default().push(cb);
	}

	fn dispatch_field(&self, uuid: Uuid, field: &str, value: Value) {
		let mut fields = lock(&self.fields);
		let Some(by_field) = fields.get_mut(&uuid) else { return };
		let Some(cbs) = by_field.get_mut(field) else { return };
		for cb in cbs.iter_mut() {
			invoke(AssertUnwindSafe(|| cb(value.clone())));
		}
	}

	fn dispatch_added(&self, uuid: Uuid, collection: &str, delta: CollectionDelta) {
		let mut added = lock(&self.added);
		let Some(by_coll) = added.get_mut(&uuid) else { return };
		let Some(cbs) = by_coll.get_mut(collection) else { return };
		for cb in cbs.iter_mut() {
			invoke(AssertUnwindSafe(|| cb(delta.clone())));
		}
	}

	fn dispatch_removed(&self, uuid: Uuid, collection: &str, delta: CollectionDelta) {
		let mut removed = lock(&self.removed);
		let Some(by_coll) = removed.get_mut(&uuid) else { return };
		let Some(cbs) = by_coll.get_mut(collection) else { return };
		for cb in cbs.iter_mut() {
			invoke(AssertUnwindSafe(|| cb(delta.clone())));
		}
	}

	/// Fires delete callbacks for `uuid` and discards every registry entry for it.
	fn dispatch_deleted(&self, uuid: Uuid) {
		let callbacks = lock(&self.deleted).remove(&uuid).unwrap_or_default();
		for cb in callbacks {
			invoke(AssertUnwindSafe(cb));
		}
		lock(&self.fields).remove(&uuid);
		lock(&self.added).remove(&uuid);
		lock(&self.removed).remove(&uuid);
	}
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn invoke<F: FnOnce() + std::panic::UnwindSafe>(f: F) {
	if catch_unwind(f).is_err() {
		tracing::warn!("a change-dispatcher callback panicked; continuing delivery");
	}
}

/// The change dispatcher. Lives inside `DbInner` and is fed by the deep
/// observers `Db::new` installs on the root `catalogues`/`events` maps and by
/// the per-object observers the façade installs lazily.
#[derive(Default)]
pub struct Dispatcher {
	catalogue: Registry,
	event: Registry,
	on_create_catalogue: Mutex<Vec<Box<dyn FnMut(Catalogue) + Send>>>,
	on_create_event: Mutex<Vec<Box<dyn FnMut(Event) + Send>>>,
}

impl Dispatcher {
	pub fn on_change_catalogue_field(&self, uuid: Uuid, field: &'static str, cb: FieldCallback) {
		self.catalogue.on_field(uuid, field, cb);
	}

	pub fn on_change_event_field(&self, uuid: Uuid, field: &'static str, cb: FieldCallback) {
		self.event.on_field(uuid, field, cb);
	}

	pub fn on_add_catalogue_collection(&self, uuid: Uuid, collection: &'static str, cb: DeltaCallback) {
		self.catalogue.on_added(uuid, collection, cb);
	}

	pub fn on_remove_catalogue_collection(&self, uuid: Uuid, collection: &'static str, cb: DeltaCallback) {
		self.catalogue.on_removed(uuid, collection, cb);
	}

	pub fn on_add_event_collection(&self, uuid: Uuid, collection: &'static str, cb: DeltaCallback) {
		self.event.on_added(uuid, collection, cb);
	}

	pub fn on_remove_event_collection(&self, uuid: Uuid, collection: &'static str, cb: DeltaCallback) {
		self.event.on_removed(uuid, collection, cb);
	}

	pub fn on_delete_catalogue(&self, uuid: Uuid, cb: DeleteCallback) {
		self.catalogue.on_deleted(uuid, cb);
	}

	pub fn on_delete_event(&self, uuid: Uuid, cb: DeleteCallback) {
		self.event.on_deleted(uuid, cb);
	}

	pub fn on_create_catalogue(&self, cb: Box<dyn FnMut(Catalogue) + Send>) {
		lock(&self.on_create_catalogue).push(cb);
	}

	pub fn on_create_event(&self, cb: Box<dyn FnMut(Event) + Send>) {
		lock(&self.on_create_event).push(cb);
	}

	pub fn fire_create_catalogue(&self, catalogue: Catalogue) {
		for cb in lock(&self.on_create_catalogue).iter_mut() {
			invoke(AssertUnwindSafe(|| cb(catalogue.clone())));
		}
	}

	pub fn fire_create_event(&self, event: Event) {
		for cb in lock(&self.on_create_event).iter_mut() {
			invoke(AssertUnwindSafe(|| cb(event.clone())));
		}
	}

	pub fn fire_catalogue_field(&self, uuid: Uuid, field: &str, value: Value) {
		self.catalogue.dispatch_field(uuid, field, value);
	}

	pub fn fire_event_field(&self, uuid: Uuid, field: &str, value: Value) {
		self.event.dispatch_field(uuid, field, value);
	}

	pub fn fire_catalogue_added(&self, uuid: Uuid, collection: &str, delta: CollectionDelta) {
		self.catalogue.dispatch_added(uuid, collection, delta);
	}

	pub fn fire_catalogue_removed(&self, uuid: Uuid, collection: &str, delta: CollectionDelta) {
		self.catalogue.dispatch_removed(uuid, collection, delta);
	}

	pub fn fire_event_added(&self, uuid: Uuid, collection: &str, delta: CollectionDelta) {
		self.event.dispatch_added(uuid, collection, delta);
	}

	pub fn fire_event_removed(&self, uuid: Uuid, collection: &str, delta: CollectionDelta) {
		self.event.dispatch_removed(uuid, collection, delta);
	}

	pub fn fire_catalogue_deleted(&self, uuid: Uuid) {
		self.catalogue.dispatch_deleted(uuid);
	}

	pub fn fire_event_deleted(&self, uuid: Uuid) {
		self.event.dispatch_deleted(uuid);
	}
}

// vim: ts=4
