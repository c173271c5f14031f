//! CRDT substrate bindings: the four primitives every other module in this
//! crate treats the sync wire format through. Nothing outside this module
//! decodes a sync message by hand.

use chronocat_types::Error;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, Map, ReadTxn, StateVector, Transact, Update};

/// Wire discriminator for every sync-protocol message (see SPEC §6).
pub const MSG_SYNC: u8 = 0;

const STEP_REQUEST: u8 = 0;
const STEP_UPDATE: u8 = 1;

/// Builds a fresh sync-step-1 message: this replica's state vector, so the
/// receiving peer can compute the diff it's missing.
pub fn create_sync_message(doc: &Doc) -> Vec<u8> {
	let sv = doc.transact().state_vector().encode_v1();
	let mut out = Vec::with_capacity(sv.len() + 2);
	out.push(MSG_SYNC);
	out.push(STEP_REQUEST);
	out.extend_from_slice(&sv);
	out
}

/// Wraps a raw `yrs` update (as produced by `doc.observe_after_transaction`) in
/// the sync message envelope for broadcast to a peer.
pub fn create_update_message(update: &[u8]) -> Vec<u8> {
	let mut out = Vec::with_capacity(update.len() + 2);
	out.push(MSG_SYNC);
	out.push(STEP_UPDATE);
	out.extend_from_slice(update);
	out
}

/// Applies an incoming sync message to `doc`. A state-vector request yields a
/// reply update message; an update message is applied and yields no reply.
pub fn handle_sync_message(message: &[u8], doc: &Doc) -> Result<Option<Vec<u8>>, Error> {
	let (&kind, rest) = message.split_first().ok_or_else(|| Error::invalid("empty sync message"))?;
	if kind != MSG_SYNC {
		return Err(Error::invalid(format!("unsupported message discriminator: {kind}")));
	}
	let (&step, payload) = rest.split_first().ok_or_else(|| Error::invalid("truncated sync message"))?;
	match step {
		STEP_REQUEST => {
			let sv = StateVector::decode_v1(payload)
				.map_err(|e| Error::invalid(format!("malformed state vector: {e}")))?;
			let diff = doc.transact().encode_state_as_update_v1(&sv);
			Ok(Some(create_update_message(&diff)))
		}
		STEP_UPDATE => {
			if payload.is_empty() {
				return Ok(None);
			}
			apply_raw_update(doc, payload)?;
			Ok(None)
		}
		other => Err(Error::invalid(format!("unknown sync step: {other}"))),
	}
}

/// Applies a raw (unwrapped) `yrs` update to `doc`.
///
/// A second transaction racing to open on the same document surfaces here as a
/// panic from the underlying borrow guard rather than a typed error; the sync
/// engine (`chronocat-sync`) catches that specific condition at the call site
/// and treats it as a benign, retried-by-the-next-commit race (see SPEC §4.6).
pub fn apply_raw_update(doc: &Doc, payload: &[u8]) -> Result<(), Error> {
	let update = Update::decode_v1(payload).map_err(|e| Error::invalid(format!("malformed update: {e}")))?;
	let mut txn = doc.transact_mut();
	txn.apply_update(update).map_err(|e| Error::invalid(format!("could not apply update: {e}")))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn initial_sync_converges_two_empty_docs() {
		let a = Doc::new();
		let catalogues = a.get_or_insert_map("catalogues");
		{
			let mut txn = a.transact_mut();
			catalogues.insert(&mut txn, "x", "y");
		}

		let b = Doc::new();
		let sync_req = create_sync_message(&b);
		let reply = handle_sync_message(&sync_req, &a).unwrap().unwrap();
		handle_sync_message(&reply, &b).unwrap();

		let b_catalogues = b.get_or_insert_map("catalogues");
		let txn = b.transact();
		assert_eq!(b_catalogues.len(&txn), 1);
	}
}

// vim: ts=4
