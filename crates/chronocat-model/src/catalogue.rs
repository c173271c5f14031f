use std::collections::BTreeSet;

use chronocat_types::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::codec::{Codec, NonEmptyStringCodec};

/// The field names a `Catalogue` map may carry.
pub const FIELDS: &[&str] = &["uuid", "name", "author", "tags", "events", "attributes"];

/// The names of a catalogue's map-typed sub-collections.
pub const COLLECTIONS: &[&str] = &["tags", "events", "attributes"];

/// A validated, in-memory description of a catalogue, used to create new
/// catalogues and to round-trip a catalogue's state to JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogueModel {
	pub uuid: Uuid,
	pub name: String,
	pub author: String,
	#[serde(default)]
	pub tags: BTreeSet<String>,
	#[serde(default)]
	pub attributes: Map<String, Value>,
}

impl CatalogueModel {
	pub fn new(name: impl Into<String>, author: impl Into<String>) -> Self {
		Self {
			uuid: Uuid::new_v4(),
			name: name.into(),
			author: author.into(),
			tags: BTreeSet::new(),
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

	pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
		self.attributes = attributes;
		self
	}

	pub fn validate(&self) -> Result<(), Error> {
		NonEmptyStringCodec::decode(&Value::String(self.name.clone()))
			.map_err(|_| Error::invalid("invalid value for field 'name': must not be empty"))?;
		NonEmptyStringCodec::decode(&Value::String(self.author.clone()))
			.map_err(|_| Error::invalid("invalid value for field 'author': must not be empty"))?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_empty_name() {
		let model = CatalogueModel::new("", "John");
		assert!(model.validate().is_err());
	}

	#[test]
	fn accepts_well_formed_model() {
		let model = CatalogueModel::new("cat0", "John").with_tags(["a"]);
		assert!(model.validate().is_ok());
	}
}

// vim: ts=4
