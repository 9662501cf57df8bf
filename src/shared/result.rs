//! Engine result type

use super::error::Error;

/// Engine result type
pub type Result<T> = std::result::Result<T, Error>;
