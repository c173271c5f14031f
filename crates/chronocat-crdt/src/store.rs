//! Low-level access to the map-shaped layout every catalogue and event map
//! shares: a flat set of scalar fields plus a handful of named sub-maps used
//! as sets (`tags`, `products`, `events`) or as a freeform dictionary
//! (`attributes`).

use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;
use yrs::{Map, MapPrelim, MapRef, Out, ReadTxn, TransactionMut};

use crate::any::{any_to_json, json_to_any};

pub fn object_map(root: &MapRef, txn: &impl ReadTxn, uuid: Uuid) -> Option<MapRef> {
	match root.get(txn, &uuid.to_string()) {
		Some(Out::YMap(map)) => Some(map),
		_ => None,
	}
}

pub fn sub_map(obj: &MapRef, txn: &impl ReadTxn, name: &str) -> Option<MapRef> {
	match obj.get(txn, name) {
		Some(Out::YMap(map)) => Some(map),
		_ => None,
	}
}

pub fn out_to_json(out: &Out, txn: &impl ReadTxn) -> Value {
	match out {
		Out::Any(any) => any_to_json(any),
		Out::YMap(map) => {
			let mut object = serde_json::Map::new();
			for (key, value) in map.iter(txn) {
				object.insert(key.to_string(), out_to_json(&value, txn));
			}
			Value::Object(object)
		}
		_ => Value::Null,
	}
}

pub fn get_scalar(obj: &MapRef, txn: &impl ReadTxn, field: &str) -> Option<Value> {
	obj.get(txn, field).map(|out| out_to_json(&out, txn))
}

pub fn set_scalar(obj: &MapRef, txn: &mut TransactionMut, field: &str, value: &Value) {
	obj.insert(txn, field, json_to_any(value));
}

pub fn remove_scalar(obj: &MapRef, txn: &mut TransactionMut, field: &str) {
	obj.remove(txn, field);
}

fn empty_map_prelim() -> MapPrelim {
	HashMap::<String, yrs::Any>::new().into_iter().collect()
}

pub fn ensure_sub_map(obj: &MapRef, txn: &mut TransactionMut, name: &str) -> MapRef {
	match sub_map(obj, txn, name) {
		Some(existing) => existing,
		None => obj.insert(txn, name, empty_map_prelim()),
	}
}

pub fn collection_keys(obj: &MapRef, txn: &impl ReadTxn, name: &str) -> Vec<String> {
	sub_map(obj, txn, name).map_or_else(Vec::new, |map| map.iter(txn).map(|(key, _)| key.to_string()).collect())
}

pub fn collection_entries(obj: &MapRef, txn: &impl ReadTxn, name: &str) -> Vec<(String, Value)> {
	sub_map(obj, txn, name).map_or_else(Vec::new, |map| {
		map.iter(txn).map(|(key, value)| (key.to_string(), out_to_json(&value, txn))).collect()
	})
}

pub fn collection_add_keys(obj: &MapRef, txn: &mut TransactionMut, name: &str, keys: impl IntoIterator<Item = String>) {
	let map = ensure_sub_map(obj, txn, name);
	for key in keys {
		map.insert(txn, key, true);
	}
}

pub fn collection_remove_keys(obj: &MapRef, txn: &mut TransactionMut, name: &str, keys: impl IntoIterator<Item = String>) {
	if let Some(map) = sub_map(obj, txn, name) {
		for key in keys {
			map.remove(txn, &key);
		}
	}
}

pub fn collection_clear(obj: &MapRef, txn: &mut TransactionMut, name: &str) {
	if let Some(map) = sub_map(obj, txn, name) {
		let keys: Vec<String> = map.iter(txn).map(|(key, _)| key.to_string()).collect();
		for key in keys {
			map.remove(txn, &key);
		}
	}
}

pub fn set_attribute(obj: &MapRef, txn: &mut TransactionMut, name: &str, key: &str, value: &Value) {
	let map = ensure_sub_map(obj, txn, name);
	map.insert(txn, key, json_to_any(value));
}

// vim: ts=4
