//! Error handling subsystem. Implements the error type shared by every chronocat crate.

use uuid::Uuid;

use crate::kind::Kind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	/// A write failed schema validation; the write was not applied.
	Invalid(String),

	/// No object of the given kind exists with this UUID.
	NotFound(Kind, Uuid),

	/// The handle's object has been tombstoned; the operation was refused.
	Deleted(Kind),

	/// The sync transport to a peer is broken.
	TransportBroken,

	/// The file persistence adapter failed to read or write its log.
	PersistenceIo(std::io::Error),
}

impl Error {
	pub fn invalid(message: impl Into<String>) -> Self {
		Self::Invalid(message.into())
	}
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Error::Invalid(msg) => write!(f, "{msg}"),
			Error::NotFound(kind, uuid) => write!(f, "no {kind} found with UUID {uuid}"),
			Error::Deleted(kind) => write!(f, "{kind} has been deleted", kind = kind.capitalized()),
			Error::TransportBroken => write!(f, "sync transport to peer is broken"),
			Error::PersistenceIo(err) => write!(f, "persistence I/O error: {err}"),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::PersistenceIo(err) => Some(err),
			_ => None,
		}
	}
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		tracing::warn!("persistence io error: {}", err);
		Self::PersistenceIo(err)
	}
}

#[cfg(feature = "server")]
impl axum::response::IntoResponse for Error {
	fn into_response(self) -> axum::response::Response {
		use axum::http::StatusCode;

		let status = match &self {
			Error::Invalid(_) => StatusCode::BAD_REQUEST,
			Error::NotFound(..) => StatusCode::NOT_FOUND,
			Error::Deleted(_) => StatusCode::GONE,
			Error::TransportBroken => StatusCode::SERVICE_UNAVAILABLE,
			Error::PersistenceIo(_) => StatusCode::INTERNAL_SERVER_ERROR,
		};
		(status, self.to_string()).into_response()
	}
}

// vim: ts=4
