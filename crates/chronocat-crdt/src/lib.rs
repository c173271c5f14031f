//! The CRDT-backed catalogue-and-event database: the object façade
//! (`Catalogue`, `Event`), the root database (`Db`), the change dispatcher,
//! and the `yrs` wire-protocol bindings they all sit on.

pub mod any;
pub mod catalogue;
pub mod db;
pub mod dispatcher;
pub mod event;
pub mod store;
pub mod wire;

pub use catalogue::{Catalogue, EventRef};
pub use db::Db;
pub use dispatcher::CollectionDelta;
pub use event::Event;
pub use wire::{MSG_SYNC, apply_raw_update, create_sync_message, create_update_message, handle_sync_message};

// vim: ts=4
