//! The `Event` object façade: a typed, validated view over one entry of the
//! `events` root map.

use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};

use chronocat_model::codec::{Codec, NonEmptyStringCodec, RatingCodec, StringCodec, TimestampCodec};
use chronocat_model::event::{self, EventModel};
use chronocat_types::{Error, Kind, Result};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;
use yrs::{Map as _, Transact, TransactionMut};

use crate::db::Db;
use crate::dispatcher::CollectionDelta;
use crate::store;

/// A lightweight handle onto one event: a UUID plus a back-reference to the
/// database that owns the underlying CRDT map. Every method re-checks that the
/// map still exists before touching it (see SPEC §4.3's tombstone check).
#[derive(Clone)]
pub struct Event {
	db: Db,
	uuid: Uuid,
}

impl Event {
	pub(crate) fn new(db: Db, uuid: Uuid) -> Self {
		Self { db, uuid }
	}

	pub fn uuid(&self) -> Uuid {
		self.uuid
	}

	fn live(&self) -> Result<yrs::MapRef> {
		self.db.live_object(Kind::Event, self.uuid)
	}

	fn field(&self, field: &'static str) -> Result<Value> {
		let obj = self.live()?;
		let txn = self.db.doc().transact();
		Ok(store::get_scalar(&obj, &txn, field).unwrap_or(Value::Null))
	}

	fn set_field(&self, field: &'static str, value: Value) -> Result<()> {
		let obj = self.live()?;
		let mut txn = self.db.doc().transact_mut();
		store::set_scalar(&obj, &mut txn, field, &value);
		Ok(())
	}

	pub fn start(&self) -> Result<DateTime<Utc>> {
		TimestampCodec::decode(&self.field("start")?)
	}

	pub fn set_start(&self, value: DateTime<Utc>) -> Result<()> {
		self.set_field("start", TimestampCodec::encode(&value))
	}

	pub fn stop(&self) -> Result<DateTime<Utc>> {
		TimestampCodec::decode(&self.field("stop")?)
	}

	pub fn set_stop(&self, value: DateTime<Utc>) -> Result<()> {
		self.set_field("stop", TimestampCodec::encode(&value))
	}

	pub fn author(&self) -> Result<String> {
		StringCodec::decode(&self.field("author")?)
	}

	pub fn set_author(&self, value: impl Into<String>) -> Result<()> {
		let value = NonEmptyStringCodec::decode(&Value::String(value.into()))
			.map_err(|_| Error::invalid("invalid value for field 'author': must not be empty"))?;
		self.set_field("author", StringCodec::encode(&value))
	}

	/// A missing rating and an explicit `None` are indistinguishable: both read
	/// back as `None` because clearing the rating removes the key entirely
	/// (SPEC §9, resolved design decision).
	pub fn rating(&self) -> Result<Option<i32>> {
		let obj = self.live()?;
		let txn = self.db.doc().transact();
		match store::get_scalar(&obj, &txn, "rating") {
			None | Some(Value::Null) => Ok(None),
			Some(value) => RatingCodec::decode(&value).map(Some),
		}
	}

	pub fn set_rating(&self, rating: Option<i32>) -> Result<()> {
		let obj = self.live()?;
		let mut txn = self.db.doc().transact_mut();
		match rating {
			Some(rating) => {
				let encoded = RatingCodec::encode(&RatingCodec::decode(&Value::from(rating))?);
				store::set_scalar(&obj, &mut txn, "rating", &encoded);
			}
			None => store::remove_scalar(&obj, &mut txn, "rating"),
		}
		Ok(())
	}

	pub fn tags(&self) -> Result<BTreeSet<String>> {
		self.string_collection("tags")
	}

	pub fn set_tags(&self, tags: impl IntoIterator<Item = impl Into<String>>) -> Result<()> {
		self.replace_string_collection("tags", tags)
	}

	pub fn add_tags(&self, tags: impl IntoIterator<Item = impl Into<String>>) -> Result<()> {
		self.add_string_collection("tags", tags)
	}

	pub fn remove_tags(&self, tags: impl IntoIterator<Item = impl Into<String>>) -> Result<()> {
		self.remove_string_collection("tags", tags)
	}

	pub fn products(&self) -> Result<BTreeSet<String>> {
		self.string_collection("products")
	}

	pub fn set_products(&self, products: impl IntoIterator<Item = impl Into<String>>) -> Result<()> {
		self.replace_string_collection("products", products)
	}

	pub fn add_products(&self, products: impl IntoIterator<Item = impl Into<String>>) -> Result<()> {
		self.add_string_collection("products", products)
	}

	pub fn remove_products(&self, products: impl IntoIterator<Item = impl Into<String>>) -> Result<()> {
		self.remove_string_collection("products", products)
	}

	fn string_collection(&self, name: &str) -> Result<BTreeSet<String>> {
		let obj = self.live()?;
		let txn = self.db.doc().transact();
		Ok(store::collection_keys(&obj, &txn, name).into_iter().collect())
	}

	fn replace_string_collection(&self, name: &str, values: impl IntoIterator<Item = impl Into<String>>) -> Result<()> {
		let obj = self.live()?;
		let mut txn = self.db.doc().transact_mut();
		store::collection_clear(&obj, &mut txn, name);
		store::collection_add_keys(&obj, &mut txn, name, values.into_iter().map(Into::into));
		Ok(())
	}

	fn add_string_collection(&self, name: &str, values: impl IntoIterator<Item = impl Into<String>>) -> Result<()> {
		let obj = self.live()?;
		let mut txn = self.db.doc().transact_mut();
		store::collection_add_keys(&obj, &mut txn, name, values.into_iter().map(Into::into));
		Ok(())
	}

	fn remove_string_collection(&self, name: &str, values: impl IntoIterator<Item = impl Into<String>>) -> Result<()> {
		let obj = self.live()?;
		let mut txn = self.db.doc().transact_mut();
		store::collection_remove_keys(&obj, &mut txn, name, values.into_iter().map(Into::into));
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

	/// Removes this event from the `events` root and, in the same transaction,
	/// scrubs its uuid out of every catalogue's `events` sub-map. Both removals
	/// land in one commit, so peers that apply the resulting update never
	/// observe a window where the event is gone but a catalogue still
	/// references it.
	pub fn delete(&self) -> Result<()> {
		self.live()?;
		let mut txn = self.db.doc().transact_mut();
		let root = self.db.root(Kind::Event).clone();
		root.remove(&mut txn, &self.uuid.to_string());

		let catalogues = self.db.root(Kind::Catalogue).clone();
		let catalogue_uuids: Vec<Uuid> = catalogues.iter(&txn).filter_map(|(key, _)| Uuid::parse_str(key).ok()).collect();
		for catalogue_uuid in catalogue_uuids {
			if let Some(obj) = store::object_map(&catalogues, &txn, catalogue_uuid) {
				store::collection_remove_keys(&obj, &mut txn, "events", [self.uuid.to_string()]);
			}
		}
		Ok(())
	}

	pub fn to_json(&self) -> Result<Value> {
		let obj = self.live()?;
		let txn = self.db.doc().transact();
		let mut object = Map::new();
		object.insert("uuid".into(), Value::String(self.uuid.to_string()));
		for field in event::FIELDS.iter().filter(|f| **f != "uuid") {
			if let Some(value) = store::get_scalar(&obj, &txn, field) {
				object.insert((*field).to_string(), value);
			}
		}
		for collection in ["tags", "products"] {
			let mut keys = store::collection_keys(&obj, &txn, collection);
			keys.sort();
			object.insert(collection.to_string(), Value::Array(keys.into_iter().map(Value::String).collect()));
		}
		let attributes: Map<String, Value> = store::collection_entries(&obj, &txn, "attributes").into_iter().collect();
		object.insert("attributes".into(), Value::Object(attributes));
		Ok(Value::Object(object))
	}

	pub fn on_change_start(&self, cb: impl FnMut(DateTime<Utc>) + Send + 'static) {
		self.on_change_field("start", cb, |v| TimestampCodec::decode(&v))
	}

	pub fn on_change_stop(&self, cb: impl FnMut(DateTime<Utc>) + Send + 'static) {
		self.on_change_field("stop", cb, |v| TimestampCodec::decode(&v))
	}

	pub fn on_change_author(&self, cb: impl FnMut(String) + Send + 'static) {
		self.on_change_field("author", cb, |v| StringCodec::decode(&v))
	}

	pub fn on_change_rating(&self, mut cb: impl FnMut(Option<i32>) + Send + 'static) {
		self.db.ensure_field_observer(Kind::Event, self.uuid);
		self.db.dispatcher().on_change_event_field(
			self.uuid,
			"rating",
			Box::new(move |v| {
				let rating = if v.is_null() { None } else { RatingCodec::decode(&v).ok() };
				cb(rating);
			}),
		);
	}

	fn on_change_field<T: 'static>(
		&self,
		field: &'static str,
		mut cb: impl FnMut(T) + Send + 'static,
		decode: impl Fn(Value) -> Result<T> + Send + 'static,
	) {
		self.db.ensure_field_observer(Kind::Event, self.uuid);
		self.db.dispatcher().on_change_event_field(
			self.uuid,
			field,
			Box::new(move |v| {
				if let Ok(value) = decode(v) {
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

	pub fn on_add_products(&self, cb: impl FnMut(BTreeSet<String>) + Send + 'static) {
		self.on_keys_delta("products", cb, true)
	}

	pub fn on_remove_products(&self, cb: impl FnMut(BTreeSet<String>) + Send + 'static) {
		self.on_keys_delta("products", cb, false)
	}

	fn on_keys_delta(&self, collection: &'static str, mut cb: impl FnMut(BTreeSet<String>) + Send + 'static, added: bool) {
		self.db.ensure_collection_observer(Kind::Event, self.uuid, collection);
		let wrapped: Box<dyn FnMut(CollectionDelta) + Send> = Box::new(move |delta| {
			if let CollectionDelta::Keys(keys) = delta {
				cb(keys.into_iter().collect());
			}
		});
		if added {
			self.db.dispatcher().on_add_event_collection(self.uuid, collection, wrapped);
		} else {
			self.db.dispatcher().on_remove_event_collection(self.uuid, collection, wrapped);
		}
	}

	pub fn on_add_attributes(&self, mut cb: impl FnMut(Map<String, Value>) + Send + 'static) {
		self.db.ensure_collection_observer(Kind::Event, self.uuid, "attributes");
		self.db.dispatcher().on_add_event_collection(
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
		self.db.ensure_collection_observer(Kind::Event, self.uuid, "attributes");
		self.db.dispatcher().on_remove_event_collection(
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
		self.db.dispatcher().on_delete_event(self.uuid, Box::new(cb));
	}
}

impl PartialEq for Event {
	fn eq(&self, other: &Self) -> bool {
		self.uuid == other.uuid
	}
}

impl Eq for Event {}

impl Hash for Event {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.uuid.hash(state);
	}
}

impl std::fmt::Debug for Event {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self.to_json() {
			Ok(json) => write!(f, "Event({json})"),
			Err(_) => write!(f, "Event({})", self.uuid),
		}
	}
}

/// Writes a freshly created event's full model into its (empty) map. Called
/// once, by `Db::create_event`, inside the transaction that inserts the map.
pub(crate) fn write_model(obj: &yrs::MapRef, txn: &mut TransactionMut, model: &EventModel) {
	store::set_scalar(obj, txn, "start", &TimestampCodec::encode(&model.start));
	store::set_scalar(obj, txn, "stop", &TimestampCodec::encode(&model.stop));
	store::set_scalar(obj, txn, "author", &StringCodec::encode(&model.author));
	if let Some(rating) = model.rating {
		store::set_scalar(obj, txn, "rating", &RatingCodec::encode(&rating));
	}
	store::collection_add_keys(obj, txn, "tags", model.tags.iter().cloned());
	store::collection_add_keys(obj, txn, "products", model.products.iter().cloned());
	for (key, value) in &model.attributes {
		store::set_attribute(obj, txn, "attributes", key, value);
	}
}

/// Materializes an `EventModel` snapshot for tests and for the file adapter's
/// replay sanity checks; not part of the public façade contract.
#[allow(dead_code)]
pub(crate) fn read_model(obj: &yrs::MapRef, txn: &impl yrs::ReadTxn, uuid: Uuid) -> Result<EventModel> {
	let author = StringCodec::decode(&store::get_scalar(obj, txn, "author").ok_or_else(|| Error::invalid("missing author"))?)?;
	let start = TimestampCodec::decode(&store::get_scalar(obj, txn, "start").ok_or_else(|| Error::invalid("missing start"))?)?;
	let stop = TimestampCodec::decode(&store::get_scalar(obj, txn, "stop").ok_or_else(|| Error::invalid("missing stop"))?)?;
	let rating = match store::get_scalar(obj, txn, "rating") {
		None | Some(Value::Null) => None,
		Some(value) => Some(RatingCodec::decode(&value)?),
	};
	let attributes: HashMap<String, Value> = store::collection_entries(obj, txn, "attributes").into_iter().collect();
	Ok(EventModel {
		uuid,
		start,
		stop,
		author,
		tags: store::collection_keys(obj, txn, "tags").into_iter().collect(),
		products: store::collection_keys(obj, txn, "products").into_iter().collect(),
		rating,
		attributes: attributes.into_iter().collect(),
	})
}

// vim: ts=4
