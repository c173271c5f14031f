//! The root document: two sibling maps (`catalogues`, `events`), the change
//! dispatcher, and the table of peers a `Db` has been paired with via
//! `chronocat-sync`.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::sync::Arc;

use chronocat_model::{CatalogueModel, EventModel};
use chronocat_types::{Error, Kind, Result};
use serde_json::Value;
use uuid::Uuid;
use yrs::types::EntryChange;
use yrs::{Doc, Map, MapRef, Observable, Subscription, Transact};

use crate::catalogue::Catalogue;
use crate::dispatcher::{CollectionDelta, Dispatcher};
use crate::event::Event;
use crate::store;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct DbInner {
	doc: Doc,
	catalogues: MapRef,
	events: MapRef,
	dispatcher: Dispatcher,
	synced: Mutex<Vec<Db>>,
	installed_observers: Mutex<HashSet<(Kind, Uuid, &'static str)>>,
	subscriptions: Mutex<Vec<Subscription>>,
	/// Identity (`Arc` pointer address) of the peer whose update is currently
	/// being applied, if any. Read by this `Db`'s forwarder subscriptions to
	/// avoid bouncing an update straight back to the peer that just sent it
	/// (SPEC §4.6, sync loop prevention) while still fanning it out to any
	/// other synced peers.
	suppress_forward_to: Mutex<Option<usize>>,
}

/// A cheaply-clonable handle onto a catalogue-and-event database: the root
/// document, the two root object maps, and the dispatcher registries.
#[derive(Clone)]
pub struct Db(Arc<DbInner>);

impl Default for Db {
	fn default() -> Self {
		Self::new()
	}
}

impl Db {
	pub fn new() -> Self {
		let doc = Doc::new();
		let catalogues = doc.get_or_insert_map("catalogues");
		let events = doc.get_or_insert_map("events");
		let db = Self(Arc::new(DbInner {
			doc,
			catalogues,
			events,
			dispatcher: Dispatcher::default(),
			synced: Mutex::new(Vec::new()),
			installed_observers: Mutex::new(HashSet::new()),
			subscriptions: Mutex::new(Vec::new()),
			suppress_forward_to: Mutex::new(None),
		}));
		db.install_root_observers();
		db
	}

	pub fn doc(&self) -> &Doc {
		&self.0.doc
	}

	/// Runs `f` inside a single transaction, batching everything it does to
	/// the document into one commit (one round of dispatcher callbacks, one
	/// `Update` broadcast to synced peers) instead of the one-transaction-per-
	/// call default every façade setter uses on its own.
	pub fn transaction<F, T>(&self, f: F) -> T
	where
		F: FnOnce(&mut yrs::TransactionMut) -> T,
	{
		let mut txn = self.0.doc.transact_mut();
		f(&mut txn)
	}

	pub(crate) fn dispatcher(&self) -> &Dispatcher {
		&self.0.dispatcher
	}

	pub(crate) fn root(&self, kind: Kind) -> &MapRef {
		match kind {
			Kind::Catalogue => &self.0.catalogues,
			Kind::Event => &self.0.events,
		}
	}

	pub(crate) fn live_object(&self, kind: Kind, uuid: Uuid) -> Result<MapRef> {
		let txn = self.0.doc.transact();
		store::object_map(self.root(kind), &txn, uuid).ok_or(Error::Deleted(kind))
	}

	fn install_root_observers(&self) {
		let mut subs = Vec::with_capacity(2);
		{
			let db = self.clone();
			subs.push(self.0.catalogues.observe(move |txn, event| {
				for (key, change) in event.keys(txn) {
					db.handle_root_change(Kind::Catalogue, key, change);
				}
			}));
		}
		{
			let db = self.clone();
			subs.push(self.0.events.observe(move |txn, event| {
				for (key, change) in event.keys(txn) {
					db.handle_root_change(Kind::Event, key, change);
				}
			}));
		}
		lock(&self.0.subscriptions).extend(subs);
	}

	fn handle_root_change(&self, kind: Kind, key: &str, change: &EntryChange) {
		let Ok(uuid) = Uuid::parse_str(key) else { return };
		match (kind, change) {
			(Kind::Catalogue, EntryChange::Inserted(_)) => {
				self.0.dispatcher.fire_create_catalogue(Catalogue::new(self.clone(), uuid));
			}
			(Kind::Event, EntryChange::Inserted(_)) => {
				self.0.dispatcher.fire_create_event(Event::new(self.clone(), uuid));
			}
			(Kind::Catalogue, EntryChange::Removed(_)) => {
				self.0.dispatcher.fire_catalogue_deleted(uuid);
			}
			(Kind::Event, EntryChange::Removed(_)) => {
				// `Event::delete` already scrubs every catalogue's `events`
				// sub-map in the same transaction that removed this root
				// entry (local or, via sync, the peer that originated it);
				// this observer only needs to fire the tombstone callback.
				self.0.dispatcher.fire_event_deleted(uuid);
			}
			(_, EntryChange::Updated(..)) => {}
		}
	}

	pub fn create_event(&self, model: EventModel) -> Result<Event> {
		model.validate()?;
		let uuid = model.uuid;
		{
			let mut txn = self.0.doc.transact_mut();
			let obj = store::ensure_sub_map(&self.clone_root_holder(Kind::Event), &mut txn, &uuid.to_string());
			crate::event::write_model(&obj, &mut txn, &model);
		}
		Ok(Event::new(self.clone(), uuid))
	}

	pub fn create_catalogue(&self, model: CatalogueModel, events: impl IntoIterator<Item = Event>) -> Result<Catalogue> {
		model.validate()?;
		let uuid = model.uuid;
		{
			let mut txn = self.0.doc.transact_mut();
			let obj = store::ensure_sub_map(&self.clone_root_holder(Kind::Catalogue), &mut txn, &uuid.to_string());
			crate::catalogue::write_model(&obj, &mut txn, &model);
			let keys = events.into_iter().map(|event| event.uuid().to_string());
			store::collection_add_keys(&obj, &mut txn, "events", keys);
		}
		Ok(Catalogue::new(self.clone(), uuid))
	}

	/// The root map itself doesn't need cloning (it's a thin `Rc`-backed
	/// reference internally) but `MapRef` does not implement `Copy`, so callers
	/// that need to pass it to `store::ensure_sub_map` borrow through this.
	fn clone_root_holder(&self, kind: Kind) -> MapRef {
		self.root(kind).clone()
	}

	pub fn get_event(&self, uuid: Uuid) -> Result<Event> {
		self.live_object(Kind::Event, uuid)?;
		Ok(Event::new(self.clone(), uuid))
	}

	pub fn get_catalogue(&self, uuid: Uuid) -> Result<Catalogue> {
		self.live_object(Kind::Catalogue, uuid)?;
		Ok(Catalogue::new(self.clone(), uuid))
	}

	pub fn events(&self) -> HashSet<Event> {
		let txn = self.0.doc.transact();
		self.0
			.events
			.iter(&txn)
			.filter_map(|(key, _)| Uuid::parse_str(key).ok())
			.map(|uuid| Event::new(self.clone(), uuid))
			.collect()
	}

	pub fn catalogues(&self) -> HashSet<Catalogue> {
		let txn = self.0.doc.transact();
		self.0
			.catalogues
			.iter(&txn)
			.filter_map(|(key, _)| Uuid::parse_str(key).ok())
			.map(|uuid| Catalogue::new(self.clone(), uuid))
			.collect()
	}

	pub fn on_create_event(&self, cb: impl FnMut(Event) + Send + 'static) {
		self.0.dispatcher.on_create_event(Box::new(cb));
	}

	pub fn on_create_catalogue(&self, cb: impl FnMut(Catalogue) + Send + 'static) {
		self.0.dispatcher.on_create_catalogue(Box::new(cb));
	}

	/// Pairs this database with `other`. Idempotent by `Arc` identity: calling
	/// this any number of times on an already-paired pair has no further effect
	/// (`chronocat-sync` relies on this to make `Db::sync` safe to call from both
	/// sides of a connection without double-registering).
	pub fn synced_with(&self, other: &Db) -> bool {
		lock(&self.0.synced).iter().any(|peer| Arc::ptr_eq(&peer.0, &other.0))
	}

	pub fn record_synced(&self, other: &Db) {
		if !self.synced_with(other) {
			lock(&self.0.synced).push(other.clone());
		}
	}

	fn identity(&self) -> usize {
		Arc::as_ptr(&self.0) as usize
	}

	/// Pairs this database with `other` for in-process sync: a synchronous
	/// loopback implementation of the protocol in SPEC §4.6, suitable for two
	/// `Db`s that live in the same process (tests, and `chronocat-sync`'s
	/// `LoopbackLink`). Network peers go through `chronocat-sync`'s
	/// `PeerLink`-based engine instead, which reuses `receive_sync` below but
	/// drives it across an async transport.
	pub fn sync(&self, other: &Db) -> Result<()> {
		if self.synced_with(other) || other.synced_with(self) {
			return Ok(());
		}
		self.record_synced(other);
		other.record_synced(self);
		self.install_forwarder(other);
		other.install_forwarder(self);

		let init = crate::wire::create_sync_message(self.doc());
		for reply in other.receive_sync(&init, true, Some(self))? {
			for reply2 in self.receive_sync(&reply, false, Some(other))? {
				other.receive_sync(&reply2, false, Some(self))?;
			}
		}
		Ok(())
	}

	/// Applies an incoming sync-protocol message from `from` (if known) and
	/// returns any reply messages that must be sent back to the sender. While
	/// the message is being applied, forwarder subscriptions targeting `from`
	/// are suppressed so the update isn't immediately bounced back to the peer
	/// that just sent it (see `install_forwarder`).
	pub(crate) fn receive_sync(&self, message: &[u8], init: bool, from: Option<&Db>) -> Result<Vec<Vec<u8>>> {
		let mut replies = Vec::new();
		if init {
			replies.push(crate::wire::create_sync_message(self.doc()));
		}
		let previous = std::mem::replace(&mut *lock(&self.0.suppress_forward_to), from.map(Db::identity));
		let outcome = crate::wire::handle_sync_message(message, self.doc());
		*lock(&self.0.suppress_forward_to) = previous;
		if let Some(reply) = outcome? {
			replies.push(reply);
		}
		Ok(replies)
	}

	/// Installs a commit-hook subscription that forwards every local update to
	/// `other` as an `UPDATE` message, except while `other`'s own update is
	/// being applied (tracked via `suppress_forward_to`) — otherwise applying a
	/// remote update would immediately re-broadcast it back to its sender.
	fn install_forwarder(&self, other: &Db) {
		let source = self.clone();
		let other = other.clone();
		let target = other.identity();
		let sub = self.0.doc.observe_update_v1(move |_txn, event| {
			if *lock(&source.0.suppress_forward_to) == Some(target) {
				return;
			}
			let message = crate::wire::create_update_message(&event.update);
			if let Err(err) = other.receive_sync(&message, false, Some(&source)) {
				tracing::warn!("dropping forwarded update: {err}");
			}
		});
		match sub {
			Ok(sub) => lock(&self.0.subscriptions).push(sub),
			Err(err) => tracing::warn!("failed to install update forwarder: {err}"),
		}
	}

	pub(crate) fn ensure_field_observer(&self, kind: Kind, uuid: Uuid) {
		let key = (kind, uuid, "__fields__");
		if !lock(&self.0.installed_observers).insert(key) {
			return;
		}
		let Ok(obj) = self.live_object(kind, uuid) else { return };
		let collections = match kind {
			Kind::Catalogue => chronocat_model::catalogue::COLLECTIONS,
			Kind::Event => chronocat_model::event::COLLECTIONS,
		};
		let db = self.clone();
		let sub = obj.observe(move |txn, event| {
			for (raw_key, change) in event.keys(txn) {
				if collections.contains(&raw_key.as_ref()) {
					continue;
				}
				let field: &'static str = match kind {
					Kind::Catalogue => chronocat_model::catalogue::FIELDS,
					Kind::Event => chronocat_model::event::FIELDS,
				}
				.iter()
				.find(|f| **f == raw_key.as_ref())
				.copied()
				.unwrap_or_default();
				if field.is_empty() {
					continue;
				}
				let value = match change {
					EntryChange::Inserted(out) | EntryChange::Updated(_, out) => store::out_to_json(out, txn),
					EntryChange::Removed(_) => Value::Null,
				};
				match kind {
					Kind::Catalogue => db.0.dispatcher.fire_catalogue_field(uuid, field, value),
					Kind::Event => db.0.dispatcher.fire_event_field(uuid, field, value),
				}
			}
		});
		lock(&self.0.subscriptions).push(sub);
	}

	pub(crate) fn ensure_collection_observer(&self, kind: Kind, uuid: Uuid, collection: &'static str) {
		let key = (kind, uuid, collection);
		if !lock(&self.0.installed_observers).insert(key) {
			return;
		}
		let Ok(obj) = self.live_object(kind, uuid) else { return };
		let map = {
			let mut txn = self.0.doc.transact_mut();
			store::ensure_sub_map(&obj, &mut txn, collection)
		};
		let db = self.clone();
		let sub = map.observe(move |txn, event| {
			let mut added = Vec::new();
			let mut removed = Vec::new();
			for (raw_key, change) in event.keys(txn) {
				match change {
					EntryChange::Inserted(out) => added.push((raw_key.to_string(), store::out_to_json(out, txn))),
					EntryChange::Updated(_, out) => {
						removed.push(raw_key.to_string());
						added.push((raw_key.to_string(), store::out_to_json(out, txn)));
					}
					EntryChange::Removed(_) => removed.push(raw_key.to_string()),
				}
			}
			if !added.is_empty() {
				db.fire_collection_delta(kind, uuid, collection, added, true);
			}
			if !removed.is_empty() {
				let removed = removed.into_iter().map(|k| (k, Value::Null)).collect();
				db.fire_collection_delta(kind, uuid, collection, removed, false);
			}
		});
		lock(&self.0.subscriptions).push(sub);
	}

	fn fire_collection_delta(&self, kind: Kind, uuid: Uuid, collection: &'static str, entries: Vec<(String, Value)>, added: bool) {
		let delta = if collection == "attributes" {
			CollectionDelta::Attributes(entries)
		} else if collection == "events" && kind == Kind::Catalogue {
			let resolved = entries
				.into_iter()
				.filter_map(|(key, _)| Uuid::parse_str(&key).ok())
				.filter_map(|event_uuid| self.get_event(event_uuid).ok())
				.collect();
			CollectionDelta::Events(resolved)
		} else {
			CollectionDelta::Keys(entries.into_iter().map(|(key, _)| key).collect())
		};
		match (kind, added) {
			(Kind::Catalogue, true) => self.0.dispatcher.fire_catalogue_added(uuid, collection, delta),
			(Kind::Catalogue, false) => self.0.dispatcher.fire_catalogue_removed(uuid, collection, delta),
			(Kind::Event, true) => self.0.dispatcher.fire_event_added(uuid, collection, delta),
			(Kind::Event, false) => self.0.dispatcher.fire_event_removed(uuid, collection, delta),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;

	#[test]
	fn create_and_fetch_round_trips() {
		let db = Db::new();
		let event = db.create_event(EventModel::new("John", Utc::now(), Utc::now())).unwrap();
		let found = db.get_catalogue(Uuid::new_v4());
		assert!(found.is_err());
		assert_eq!(db.get_event(event.uuid()).unwrap().uuid(), event.uuid());
	}

	#[test]
	fn deleting_event_scrubs_catalogue_reference() {
		let db = Db::new();
		let event = db.create_event(EventModel::new("John", Utc::now(), Utc::now())).unwrap();
		let catalogue = db.create_catalogue(CatalogueModel::new("cat0", "John"), [event.clone()]).unwrap();
		assert!(catalogue.events().unwrap().contains(&event));
		event.delete().unwrap();
		assert!(catalogue.events().unwrap().is_empty());
	}

	#[test]
	fn sync_converges_catalogues_created_on_either_side() {
		let a = Db::new();
		let b = Db::new();
		a.sync(&b).unwrap();

		a.create_catalogue(CatalogueModel::new("cat0", "John"), []).unwrap();
		assert_eq!(a.catalogues().len(), 1);
		assert_eq!(b.catalogues().len(), 1);

		b.create_catalogue(CatalogueModel::new("cat1", "Jane"), []).unwrap();
		assert_eq!(a.catalogues().len(), 2);
		assert_eq!(b.catalogues().len(), 2);

		let a_names: std::collections::BTreeSet<_> = a.catalogues().iter().map(|c| c.name().unwrap()).collect();
		let b_names: std::collections::BTreeSet<_> = b.catalogues().iter().map(|c| c.name().unwrap()).collect();
		assert_eq!(a_names, b_names);
	}

	#[test]
	fn sync_is_idempotent() {
		let a = Db::new();
		let b = Db::new();
		a.sync(&b).unwrap();
		a.sync(&b).unwrap();
		b.sync(&a).unwrap();
		assert_eq!(lock(&a.0.synced).len(), 1);
		assert_eq!(lock(&b.0.synced).len(), 1);
	}

	#[test]
	fn sync_propagates_deletion_and_reference_cleanup() {
		let a = Db::new();
		let b = Db::new();
		a.sync(&b).unwrap();

		let event = a.create_event(EventModel::new("John", Utc::now(), Utc::now())).unwrap();
		let catalogue = a.create_catalogue(CatalogueModel::new("cat0", "John"), [event.clone()]).unwrap();

		let b_catalogue = b.get_catalogue(catalogue.uuid()).unwrap();
		assert!(b_catalogue.events().unwrap().iter().any(|e| e.uuid() == event.uuid()));

		event.delete().unwrap();
		assert!(b.get_event(event.uuid()).is_err());
		assert!(b_catalogue.events().unwrap().is_empty());
	}
}

// vim: ts=4
