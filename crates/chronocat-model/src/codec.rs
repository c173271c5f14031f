//! Per-field-type codecs: validate a typed value and convert it to/from the
//! JSON-ish representation stored in the CRDT document.

use chrono::{DateTime, Utc};
use chronocat_types::Error;
use serde_json::Value;
use uuid::Uuid;

pub trait Codec {
	type Value;

	fn encode(value: &Self::Value) -> Value;
	fn decode(value: &Value) -> Result<Self::Value, Error>;
}

pub struct StringCodec;

impl Codec for StringCodec {
	type Value = String;

	fn encode(value: &String) -> Value {
		Value::String(value.clone())
	}

	fn decode(value: &Value) -> Result<String, Error> {
		value
			.as_str()
			.map(str::to_owned)
			.ok_or_else(|| Error::invalid("expected a string"))
	}
}

pub struct NonEmptyStringCodec;

impl Codec for NonEmptyStringCodec {
	type Value = String;

	fn encode(value: &String) -> Value {
		Value::String(value.clone())
	}

	fn decode(value: &Value) -> Result<String, Error> {
		let s = StringCodec::decode(value)?;
		if s.is_empty() {
			return Err(Error::invalid("value must not be empty"));
		}
		Ok(s)
	}
}

pub struct UuidCodec;

impl Codec for UuidCodec {
	type Value = Uuid;

	fn encode(value: &Uuid) -> Value {
		Value::String(value.to_string())
	}

	fn decode(value: &Value) -> Result<Uuid, Error> {
		value
			.as_str()
			.and_then(|s| Uuid::parse_str(s).ok())
			.ok_or_else(|| Error::invalid("expected a UUID string"))
	}
}

pub struct TimestampCodec;

impl Codec for TimestampCodec {
	type Value = DateTime<Utc>;

	fn encode(value: &DateTime<Utc>) -> Value {
		Value::String(value.to_rfc3339())
	}

	fn decode(value: &Value) -> Result<DateTime<Utc>, Error> {
		value
			.as_str()
			.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
			.map(|dt| dt.with_timezone(&Utc))
			.ok_or_else(|| Error::invalid("expected an RFC 3339 timestamp"))
	}
}

pub struct RatingCodec;

impl Codec for RatingCodec {
	type Value = i32;

	fn encode(value: &i32) -> Value {
		Value::from(*value)
	}

	fn decode(value: &Value) -> Result<i32, Error> {
		let n = value.as_i64().ok_or_else(|| Error::invalid("rating is not an integer"))?;
		i32::try_from(n)
			.ok()
			.filter(|n| (i64::from(i16::MIN)..=i64::from(i16::MAX)).contains(&i64::from(*n)))
			.ok_or_else(|| Error::invalid("rating must fit in the range -32768..=32767"))
	}
}

/// Validates a field name against the set a kind actually declares, independent
/// of the specific value codec used for that field.
pub fn validate_field_name(field: &str, known: &[&str]) -> Result<(), Error> {
	if known.contains(&field) {
		Ok(())
	} else {
		Err(Error::invalid(format!("unknown field '{field}'")))
	}
}

// vim: ts=4
