pub use crate::error::{Error, Result};
pub use crate::kind::Kind;

pub use tracing::{debug, debug_span, error, error_span, info, info_span, warn, warn_span};

// vim: ts=4
