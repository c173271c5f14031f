//! Conversion between `serde_json::Value` (the representation `chronocat-model`'s
//! codecs speak) and `yrs::Any` (the representation the CRDT document stores).

use std::collections::HashMap;

use serde_json::{Map, Number, Value};
use yrs::Any;

pub fn json_to_any(value: &Value) -> Any {
	match value {
		Value::Null => Any::Null,
		Value::Bool(b) => Any::Bool(*b),
		Value::Number(n) => number_to_any(n),
		Value::String(s) => Any::String(s.as_str().into()),
		Value::Array(items) => Any::Array(items.iter().map(json_to_any).collect::<Vec<_>>().into()),
		Value::Object(map) => {
			let entries: HashMap<String, Any> =
				map.iter().map(|(k, v)| (k.clone(), json_to_any(v))).collect();
			Any::Map(std::sync::Arc::new(entries))
		}
	}
}

fn number_to_any(n: &Number) -> Any {
	if let Some(i) = n.as_i64() {
		Any::BigInt(i)
	} else if let Some(f) = n.as_f64() {
		Any::Number(f)
	} else {
		Any::Null
	}
}

pub fn any_to_json(value: &Any) -> Value {
	match value {
		Any::Null | Any::Undefined => Value::Null,
		Any::Bool(b) => Value::Bool(*b),
		Any::Number(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
		Any::BigInt(i) => Value::Number(Number::from(*i)),
		Any::String(s) => Value::String(s.to_string()),
		Any::Buffer(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
		Any::Array(items) => Value::Array(items.iter().map(any_to_json).collect()),
		Any::Map(map) => {
			let mut out = Map::new();
			for (k, v) in map.iter() {
				out.insert(k.clone(), any_to_json(v));
			}
			Value::Object(out)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn round_trips_scalars() {
		let value = json!({"a": 1, "b": "text", "c": true, "d": null, "e": [1, 2, 3]});
		let any = json_to_any(&value);
		assert_eq!(any_to_json(&any), value);
	}
}

// vim: ts=4
