//! The `Catalogue` object façade: a typed, validated view over one entry of
//! the `catalogues` root map.

use std::collections::{BTreeSet, HashSet};
use std::hash::{Hash, Hasher};

use chronocat_model::catalogue::{self, CatalogueModel};
use chronocat_model::codec::{Codec, NonEmptyStringCodec, StringCodec};
use chronocat_types::{Error, Kind, Result};
use serde_json::{Map, Value};
use uuid::Uuid;
use yrs::{Map as _, Transact, TransactionMut};

use crate::db::Db;
use crate::dispatcher::CollectionDelta;
use crate::event::Event;
use crate::store;

/// Accepts either an `Event` handle or a bare `Uuid` wherever the façade
/// mutates the `events` sub-map — `remove_events` in particular is useful to
/// call with a uuid that no longer resolves to a live event.
pub trait EventRef {
	fn event_uuid(&self) -> Uuid;
}

impl EventRef for Event {
	fn event_uuid(&self) -> Uuid {
		self.uuid()
	}
}

impl EventRef for Uuid {
	fn event_uuid(&self) -> Uuid {
		*self
	}
}

impl EventRef for &Event {
	fn event_uuid(&self) -> Uuid {
		(*self).uuid()
	}
}

/// A lightweight handle onto one catalogue: a UUID plus a back-reference to
/// the database that owns the underlying CRDT map.
#[derive(Clone)]
pub struct Catalogue {
	db: Db,
	uuid: Uuid,
}

impl Catalogue {
	pub(crate) fn new(db: Db, uuid: Uuid) -> Self {
		Self { db, uuid }
	}

	pub fn uuid(&self) -> Uuid {
		self.uuid
	}

	fn live(&self) -> Result<yrs::MapRef> {
		self.db.live_object(Kind::Catalogue, self.uuid)
	}

	fn field(&self, field: &'static str) -> Result<Value> {
		let obj = self.live()?;
		let txn = self.db.doc().transact();
		Ok(store::get_scalar(&obj, &txn, field).unwrap_or(Value::Null))
	}

	pub fn name(&self) -> Result<String> {
		StringCodec::decode(&self.field("name")?)
	}

	pub fn set_name(&self, value: impl Into<String>) -> Result<()> {
		let value = NonEmptyStringCodec::decode(&Value::String(value.into()))
			.map_err(|_| Error::invalid("invalid value for field 'name': must not be empty"))?;
		let obj = self.live()?;
		let mut txn = self.db.doc().transact_mut();
		store::set_scalar(&obj, &mut txn, "name", &StringCodec::encode(&value));
		Ok(())
	}

	pub fn author(&self) -> Result<String> {
		StringCodec::decode(&self.field("author")?)
	}

	pub fn set_author(&self, value: impl Into<String>) -> Result<()> {
		let value = NonEmptyStringCodec::decode(&Value::String(value.into()))
			.map_err(|_| Error::invalid("invalid value for field 'author': must not be empty"))?;
		let obj = self.live()?;
		let mut txn = self.db.doc().transact_mut();
		store::set_scalar(&obj, &mut txn, "author", &StringCodec::encode(&value));
		Ok(())
	}

	pub fn tags(&self) -> Result<BTreeSet<String>> {
		let obj = self.live()?;
		let txn = self.db.doc().transact();
		Ok(store::collection_keys(&obj, &txn, "tags").into_iter().collect())
	}

	pub fn set_tags(&self, tags: impl IntoIterator<Item = impl Into<String>>) -> Result<()> {
		let obj = self.live()?;
		let mut txn = self.db.doc().transact_mut();
		store::collection_clear(&obj, &mut txn, "tags");
		store::collection_add_keys(&obj, &mut txn, "tags", tags.into_iter().map(Into::into));
		Ok(())
	}

	pub fn add_tags(&self, tags: impl IntoIterator<Item = impl Into<String>>) -> Result<()> {
		let obj = self.live()?;
		let mut txn = self.db.doc().transact_mut();
		store::collection_add_keys(&obj, &mut txn, "tags", tags.into_iter().map(Into::into));
		Ok(())
	}

	pub fn remove_tags(&self, tags: impl IntoIterator<Item = impl Into<String>>) -> Result<()> {
		let obj = self.live()?;
		let mut txn = self.db.doc().transact_mut();
		store::collection_remove_keys(&obj, &mut txn, "tags", tags.into_iter().map(Into::into));
		Ok(())
	}

	/// Snapshot of resolvable event handles. Dangling references (a uuid with
	/// no live event) are silently filtered, per SPEC §3's invariant.
	pub fn events(&self) -> Result<HashSet<Event>> {
		let obj = self.live()?;
		let keys = {
			let txn = self.db.doc().transact();
			store::collection_keys(&obj, &txn, "events")
		};
		Ok(keys
			.into_iter()
			.filter_map(|key| Uuid::parse_str(&key).ok())
			.filter_map(|uuid| self.db.get_event(uuid).ok())
			.collect())
	}

	/// Raw uuids held in the `events` sub-map, including dangling ones.
	pub fn event_uuids(&self) -> Result<BTreeSet<Uuid>> {
		let obj = self.live()?;
		let txn = self.db.doc().transact();
		Ok(store::collection_keys(&obj, &txn, "events").into_iter().filter_map(|k| Uuid::parse_str(&k).ok()).collect())
	}

	pub fn set_events(&self, events: impl IntoIterator<Item = impl EventRef>) -> Result<()> {
		let obj = self.live()?;
		let mut txn = self.db.doc().transact_mut();
		store::collection_clear(&obj, &mut txn, "events");
		let keys = events.into_iter().map(|e| e.event_uuid().to_string());
		store::collection_add_keys(&obj, &mut txn, "events", keys);
		Ok(())
	}

	pub fn add_events(&self, events: impl IntoIterator<Item = impl EventRef>) -> Result<()> {
		let obj = self.live()?;
		let mut txn = self.db.doc().transact_mut();
		let keys = events.into_iter().map(|e| e.event_uuid().to_string());
		store::collection_add_keys(&obj, &mut txn, "events", keys);
		Ok(())
	}

	pub fn remove_events(&self, events: impl IntoIterator<Item = impl EventRef>) -> Result<()> {
		let obj = self.live()?;
		let mut txn = self.db.doc().transact_mut();
		let keys = events.into_iter().map(|e| e.event_uuid().to_string());
		store::collection_remove_keys(&obj, &mut txn, "events", keys);
		Ok(())
	}

	pub fn attributes(&self) -> Result<Map<String, Value>> {
		let obj = self.live()?;
		let txn = self.db.doc().transact();
		Ok(store::collection_entries(&obj, &txn, "attributes").into_iter().collect())
	}

	pub fn set_attributes(&self, attributes: Map<String, Value>) -> Result<()> {
		let obj = self.live()?;
		let mut txn = self.db.doc().transact_mut();
		store::collection_clear(&obj, &mut txn, "attributes");
		for (key, value) in &attributes {
			store::set_attribute(&obj, &mut txn, "attributes", key, value);
		}
		Ok(())
	}

	pub fn set_attribute(&self, key: impl Into<String>, value: Value) -> Result<()> {
		let obj = self.live()?;
		let mut txn = self.db.doc().transact_mut();
		store::set_attribute(&obj, &mut txn, "attributes", &key.into(), &value);
		Ok(())
	}

	pub fn remove_attribute(&self, key: &str) -> Result<()> {
		let obj = self.live()?;
		let mut txn = self.db.doc().transact_mut();
		store::collection_remove_keys(&obj, &mut txn, "attributes", [key.to_string()]);
		Ok(())
	}

	pub fn delete(&self) -> Result<()> {
		self.live()?;
		let mut txn = self.db.doc().transact_mut();
		let root = self.db.root(Kind::Catalogue).clone();
		root.remove(&mut txn, &self.uuid.to_string());
		Ok(())
	}

	pub fn to_json(&self) -> Result<Value> {
		let obj = self.live()?;
		let txn = self.db.doc().transact();
		let mut object = Map::new();
		object.insert("uuid".into(), Value::String(self.uuid.to_string()));
		for field in catalogue::FIELDS.iter().filter(|f| **f != "uuid") {
			if let Some(value) = store::get_scalar(&obj, &txn, field) {
				object.insert((*field).to_string(), value);
			}
		}
		let mut tags = store::collection_keys(&obj, &txn, "tags");
		tags.sort();
		object.insert("tags".into(), Value::Array(tags.into_iter().map(Value::String).collect()));
		let mut events = store::collection_keys(&obj, &txn, "events");
		events.sort();
		object.insert("events".into(), Value::Array(events.into_iter().map(Value::String).collect()));
		let attributes: Map<String, Value> = store::collection_entries(&obj, &txn, "attributes").into_iter().collect();
		object.insert("attributes".into(), Value::Object(attributes));
		Ok(Value::Object(object))
	}

	pub fn on_change_name(&self, mut cb: impl FnMut(String) + Send + 'static) {
		self.db.ensure_field_observer(Kind::Catalogue, self.uuid);
		self.db.dispatcher().on_change_catalogue_field(
			self.uuid,
			"name",
			Box::new(move |v| {
				if let Ok(value) = StringCodec::decode(&v) {
					cb(value);
				}
			}),
		);
	}

	pub fn on_change_author(&self, mut cb: impl FnMut(String) + Send + 'static) {
		self.db.ensure_field_observer(Kind::Catalogue, self.uuid);
		self.db.dispatcher().on_change_catalogue_field(
			self.uuid,
			"author",
			Box::new(move |v| {
				if let Ok(value) = StringCodec::decode(&v) {
					cb(value);
				}
			}),
		);
	}

	pub fn on_add_tags(&self, cb: impl FnMut(BTreeSet<String>) + Send + 'static) {
		self.on_keys_delta("tags", cb, true)
	}

	pub fn on_remove_tags(&self, cb: impl FnMut(BTreeSet<String>) + Send + 'static) {
		self.on_keys_delta("tags", cb, false)
	}

	fn on_keys_delta(&self, collection: &'static str, mut cb: impl FnMut(BTreeSet<String>) + Send + 'static, added: bool) {
		self.db.ensure_collection_observer(Kind::Catalogue, self.uuid, collection);
		let wrapped: Box<dyn FnMut(CollectionDelta) + Send> = Box::new(move |delta| {
			if let CollectionDelta::Keys(keys) = delta {
				cb(keys.into_iter().collect());
			}
		});
		if added {
			self.db.dispatcher().on_add_catalogue_collection(self.uuid, collection, wrapped);
		} else {
			self.db.dispatcher().on_remove_catalogue_collection(self.uuid, collection, wrapped);
		}
	}

	pub fn on_add_events(&self, mut cb: impl FnMut(HashSet<Event>) + Send + 'static) {
		self.db.ensure_collection_observer(Kind::Catalogue, self.uuid, "events");
		self.db.dispatcher().on_add_catalogue_collection(
			self.uuid,
			"events",
			Box::new(move |delta| {
				if let CollectionDelta::Events(events) = delta {
					cb(events.into_iter().collect());
				}
			}),
		);
	}

	/// Delivers the uuids removed from `events`; removed events can no longer
	/// be resolved to live handles, so the payload is uuids rather than
	/// `Event`s (matching the depth-2 remove case in SPEC §4.5).
	pub fn on_remove_events(&self, mut cb: impl FnMut(BTreeSet<Uuid>) + Send + 'static) {
		self.db.ensure_collection_observer(Kind::Catalogue, self.uuid, "events");
		self.db.dispatcher().on_remove_catalogue_collection(
			self.uuid,
			"events",
			Box::new(move |delta| {
				if let CollectionDelta::Keys(keys) = delta {
					cb(keys.into_iter().filter_map(|k| Uuid::parse_str(&k).ok()).collect());
				}
			}),
		);
	}

	pub fn on_add_attributes(&self, mut cb: impl FnMut(Map<String, Value>) + Send + 'static) {
		self.db.ensure_collection_observer(Kind::Catalogue, self.uuid, "attributes");
		self.db.dispatcher().on_add_catalogue_collection(
			self.uuid,
			"attributes",
			Box::new(move |delta| {
				if let CollectionDelta::Attributes(entries) = delta {
					cb(entries.into_iter().collect());
				}
			}),
		);
	}

	pub fn on_remove_attributes(&self, mut cb: impl FnMut(BTreeSet<String>) + Send + 'static) {
		self.db.ensure_collection_observer(Kind::Catalogue, self.uuid, "attributes");
		self.db.dispatcher().on_remove_catalogue_collection(
			self.uuid,
			"attributes",
			Box::new(move |delta| {
				if let CollectionDelta::Attributes(entries) = delta {
					cb(entries.into_iter().map(|(k, _)| k).collect());
				}
			}),
		);
	}

	pub fn on_delete(&self, cb: impl FnOnce() + Send + 'static) {
		self.db.dispatcher().on_delete_catalogue(self.uuid, Box::new(cb));
	}
}

impl PartialEq for Catalogue {
	fn eq(&self, other: &Self) -> bool {
		self.uuid == other.uuid
	}
}

impl Eq for Catalogue {}

impl Hash for Catalogue {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.uuid.hash(state);
	}
}

impl std::fmt::Debug for Catalogue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self.to_json() {
			Ok(json) => write!(f, "Catalogue({json})"),
			Err(_) => write!(f, "Catalogue({})", self.uuid),
		}
	}
}

/// Writes a freshly created catalogue's full model into its (empty) map.
/// Called once, by `Db::create_catalogue`, inside the transaction that
/// inserts the map (the `events` reference set is added separately by the
/// caller so it can accept already-constructed `Event` handles).
pub(crate) fn write_model(obj: &yrs::MapRef, txn: &mut TransactionMut, model: &CatalogueModel) {
	store::set_scalar(obj, txn, "name", &StringCodec::encode(&model.name));
	store::set_scalar(obj, txn, "author", &StringCodec::encode(&model.author));
	store::collection_add_keys(obj, txn, "tags", model.tags.iter().cloned());
	for (key, value) in &model.attributes {
		store::set_attribute(obj, txn, "attributes", key, value);
	}
}

// vim: ts=4
