//! Per-room `Db` registry: lazily creates (and, under `--directory`,
//! file-backs) one [`Db`] per room id so concurrent connections to the same
//! room share a single document.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chronocat_crdt::Db;
use chronocat_persist::FileLog;
use chronocat_types::Result;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// A room's document plus the file log keeping it durable, if any.
pub struct Room {
	pub db: Db,
	_log: Option<FileLog>,
}

pub struct Rooms {
	directory: Option<PathBuf>,
	open: DashMap<Box<str>, Arc<Room>>,
}

impl Rooms {
	pub fn new(directory: Option<PathBuf>) -> Self {
		Self { directory, open: DashMap::new() }
	}

	/// Returns the room for `room_id`, creating (and replaying its on-disk
	/// log into) a fresh `Db` on first access. Two connections racing to
	/// create the same never-seen room id may each open the file log once;
	/// only the first insertion wins and the loser's log is dropped, closing
	/// its file handle without data loss since nothing was written through it.
	pub async fn get_or_create(&self, room_id: &str) -> Result<Arc<Room>> {
		if let Some(room) = self.open.get(room_id) {
			return Ok(Arc::clone(&room));
		}

		let db = Db::new();
		let log = match &self.directory {
			Some(dir) => {
				let path = dir.join(format!("{room_id}.y"));
				Some(FileLog::open(path, &db, Duration::ZERO).await?)
			}
			None => None,
		};
		let room = Arc::new(Room { db, _log: log });

		match self.open.entry(room_id.into()) {
			Entry::Occupied(existing) => Ok(Arc::clone(existing.get())),
			Entry::Vacant(slot) => {
				slot.insert(Arc::clone(&room));
				Ok(room)
			}
		}
	}
}

// vim: ts=4
