//! Binds a [`chronocat_crdt::Db`]'s document to an append-only file on disk.
//!
//! On-disk layout: a fixed 6-byte ASCII header `"0.0.1\0"`, followed by a
//! sequence of frames, each `[u32 length (little-endian)][length bytes of
//! raw `yrs` update]`. A reader that hits EOF mid-length-prefix or mid-frame
//! stops at the last complete frame boundary rather than erroring — the log
//! tolerates a process that died mid-write.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use chronocat_crdt::Db;
use chronocat_crdt::apply_raw_update;
use chronocat_types::{Error, Result};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use yrs::Subscription;

const HEADER: &[u8; 6] = b"0.0.1\0";

fn io_err(message: impl Into<String>) -> Error {
	Error::PersistenceIo(io::Error::new(io::ErrorKind::InvalidData, message.into()))
}

struct Coalescer {
	pending: StdMutex<Vec<u8>>,
	timer: StdMutex<Option<JoinHandle<()>>>,
}

impl Coalescer {
	fn new() -> Self {
		Self { pending: StdMutex::new(Vec::new()), timer: StdMutex::new(None) }
	}

	fn lock_pending(&self) -> std::sync::MutexGuard<'_, Vec<u8>> {
		self.pending.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
	}

	fn lock_timer(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
		self.timer.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
	}

	/// Appends `frame` to the pending buffer and (re)starts the coalescing
	/// delay. A delay timer still sleeping when a new frame arrives is
	/// aborted and replaced; a write already in progress (past its sleep) is
	/// never touched — see module docs.
	fn enqueue(self: &Arc<Self>, frame: Vec<u8>, write_delay: Duration, file: Arc<AsyncMutex<File>>) {
		self.lock_pending().extend_from_slice(&frame);

		let mut timer = self.lock_timer();
		if let Some(handle) = timer.take() {
			handle.abort();
		}
		let this = Arc::clone(self);
		*timer = Some(tokio::spawn(async move {
			tokio::time::sleep(write_delay).await;
			*this.lock_timer() = None;
			this.flush_now(&file).await;
		}));
	}

	async fn flush_now(&self, file: &AsyncMutex<File>) {
		let buffer = std::mem::take(&mut *self.lock_pending());
		if buffer.is_empty() {
			return;
		}
		let mut file = file.lock().await;
		if let Err(err) = file.write_all(&buffer).await {
			tracing::error!("failed to append chronocat log frame: {err}");
			self.lock_pending().splice(0..0, buffer);
			return;
		}
		if let Err(err) = file.flush().await {
			tracing::error!("failed to flush chronocat log: {err}");
		}
	}

	/// Cancels any pending delay and writes out whatever is buffered right
	/// now, synchronously from the caller's point of view.
	async fn flush_immediately(&self, file: &AsyncMutex<File>) {
		if let Some(handle) = self.lock_timer().take() {
			handle.abort();
		}
		self.flush_now(file).await;
	}
}

/// An append-only on-disk log backing one [`Db`]'s document.
pub struct FileLog {
	path: PathBuf,
	file: Arc<AsyncMutex<File>>,
	coalescer: Arc<Coalescer>,
	_subscription: Subscription,
}

impl FileLog {
	/// Opens (creating if absent) the log at `path`, replaying any existing
	/// frames into `db` before wiring up forwarding of future commits.
	/// `write_delay` governs how long a burst of updates is coalesced before
	/// being flushed to disk; `Duration::ZERO` writes on (almost) every
	/// commit.
	pub async fn open(path: impl Into<PathBuf>, db: &Db, write_delay: Duration) -> Result<Self> {
		let path = path.into();
		let existing = read_existing(&path).await?;
		if let Some(bytes) = &existing {
			replay(bytes, db)?;
		}

		let mut file = OpenOptions::new().create(true).append(true).open(&path).await.map_err(Error::PersistenceIo)?;
		if existing.is_none() {
			file.write_all(HEADER).await.map_err(Error::PersistenceIo)?;
			file.flush().await.map_err(Error::PersistenceIo)?;
		}

		let coalescer = Arc::new(Coalescer::new());
		let file = Arc::new(AsyncMutex::new(file));

		let enqueue_coalescer = Arc::clone(&coalescer);
		let enqueue_file = Arc::clone(&file);
		let subscription = db.doc().observe_update_v1(move |_txn, event| {
			let mut frame = Vec::with_capacity(event.update.len() + 4);
			#[allow(clippy::cast_possible_truncation)]
			frame.extend_from_slice(&(event.update.len() as u32).to_le_bytes());
			frame.extend_from_slice(&event.update);
			enqueue_coalescer.enqueue(frame, write_delay, Arc::clone(&enqueue_file));
		});
		let subscription =
			subscription.map_err(|err| Error::invalid(format!("failed to subscribe to document updates: {err}")))?;

		Ok(Self { path, file, coalescer, _subscription: subscription })
	}

	/// The path this log is backed by.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Cancels any pending coalescing delay and writes everything buffered so
	/// far to disk. Callers that need a durable snapshot before shutting down
	/// (tests included) should await this rather than relying on timing.
	pub async fn flush(&self) -> Result<()> {
		self.coalescer.flush_immediately(&self.file).await;
		Ok(())
	}
}

async fn read_existing(path: &Path) -> Result<Option<Vec<u8>>> {
	match tokio::fs::read(path).await {
		Ok(bytes) => Ok(Some(bytes)),
		Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
		Err(err) => Err(Error::PersistenceIo(err)),
	}
}

fn replay(bytes: &[u8], db: &Db) -> Result<()> {
	if bytes.len() < HEADER.len() || &bytes[..HEADER.len()] != HEADER.as_slice() {
		return Err(io_err("missing or unrecognized chronocat log header"));
	}

	let mut offset = HEADER.len();
	loop {
		if offset + 4 > bytes.len() {
			break;
		}
		let len = u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]]) as usize;
		let frame_start = offset + 4;
		let Some(frame_end) = frame_start.checked_add(len) else {
			break;
		};
		if frame_end > bytes.len() {
			break;
		}
		let frame = &bytes[frame_start..frame_end];
		apply_raw_update(db.doc(), frame).map_err(|err| io_err(format!("corrupt update frame: {err}")))?;
		offset = frame_end;
	}
	Ok(())
}

// vim: ts=4
