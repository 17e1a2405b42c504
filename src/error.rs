//! Error taxonomy of the reconstruction core.
//!
//! Two fatal categories: `Config` for mismatched or malformed inputs detected
//! before any kernel runs, `Geometry` for degenerate per-projection poses.
//! Geometric edge cases (a ray missing the volume bounding box) are ordinary
//! zero-valued results, not errors.

use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Config(String),
    Geometry(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self { Error::Config(msg.into()) }
    pub fn geometry(msg: impl Into<String>) -> Self { Error::Geometry(msg.into()) }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
            Error::Geometry(msg) => write!(f, "geometry error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
