//! The two object kinds the database holds.

/// Discriminates a `Catalogue` from an `Event` in error messages and registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
	Catalogue,
	Event,
}

impl Kind {
	/// Capitalized form, used in tombstone error messages ("Catalogue has been deleted").
	pub fn capitalized(self) -> &'static str {
		match self {
			Kind::Catalogue => "Catalogue",
			Kind::Event => "Event",
		}
	}
}

impl std::fmt::Display for Kind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Kind::Catalogue => write!(f, "catalogue"),
			Kind::Event => write!(f, "event"),
		}
	}
}

// vim: ts=4
