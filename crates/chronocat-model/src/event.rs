use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use chronocat_types::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::codec::{Codec, NonEmptyStringCodec, RatingCodec};

/// The field names an `Event` map may carry. Used by the object façade and the
/// change dispatcher to classify depth-1 mutations.
pub const FIELDS: &[&str] = &["uuid", "start", "stop", "author", "tags", "products", "rating", "attributes"];

/// The names of an event's map-typed sub-collections.
pub const COLLECTIONS: &[&str] = &["tags", "products", "attributes"];

/// A validated, in-memory description of an event, used to create new events
/// and to round-trip an event's state to JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventModel {
	pub uuid: Uuid,
	pub start: DateTime<Utc>,
	pub stop: DateTime<Utc>,
	pub author: String,
	#[serde(default)]
	pub tags: BTreeSet<String>,
	#[serde(default)]
	pub products: BTreeSet<String>,
	#[serde(default)]
	pub rating: Option<i32>,
	#[serde(default)]
	pub attributes: Map<String, Value>,
}

impl EventModel {
	pub fn new(author: impl Into<String>, start: DateTime<Utc>, stop: DateTime<Utc>) -> Self {
		Self {
			uuid: Uuid::new_v4(),
			start,
			stop,
			author: author.into(),
			tags: BTreeSet::new(),
			products: BTreeSet::new(),
			rating: None,
			attributes: Map::new(),
		}
	}

	pub fn with_uuid(mut self, uuid: Uuid) -> Self {
		self.uuid = uuid;
		self
	}

	pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
		self.tags = tags.into_iter().map(Into::into).collect();
		self
	}

	pub fn with_products(mut self, products: impl IntoIterator<Item = impl Into<String>>) -> Self {
		self.products = products.into_iter().map(Into::into).collect();
		self
	}

	pub fn with_rating(mut self, rating: Option<i32>) -> Self {
		self.rating = rating;
		self
	}

	pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
		self.attributes = attributes;
		self
	}

	/// Runs schema validation over every field; returns the first failure found.
	pub fn validate(&self) -> Result<(), Error> {
		NonEmptyStringCodec::decode(&Value::String(self.author.clone()))
			.map_err(|_| Error::invalid("invalid value for field 'author': must not be empty"))?;
		if let Some(rating) = self.rating {
			RatingCodec::decode(&Value::from(rating))
				.map_err(|_| Error::invalid("invalid value for field 'rating': not an integer"))?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_empty_author() {
		let model = EventModel::new("", Utc::now(), Utc::now());
		assert!(model.validate().is_err());
	}

	#[test]
	fn rejects_out_of_range_rating() {
		let model = EventModel::new("John", Utc::now(), Utc::now()).with_rating(Some(100_000));
		assert!(model.validate().is_err());
	}

	#[test]
	fn accepts_well_formed_model() {
		let model = EventModel::new("John", Utc::now(), Utc::now())
			.with_tags(["a", "b"])
			.with_rating(Some(5));
		assert!(model.validate().is_ok());
	}
}

// vim: ts=4
