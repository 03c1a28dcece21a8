//! Error type shared by every fallible operation in the core crate.

use thiserror::Error;

/// Errors returned by ID normalization, node operations, and the [`Registry`].
///
/// [`Registry`]: crate::Registry
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// The string does not match any accepted CWE ID form.
    #[error("invalid CWE id: {0:?}")]
    InvalidId(String),

    /// A required string or collection argument was empty.
    #[error("{0} must not be empty")]
    EmptyInput(&'static str),

    /// A registry lookup found no node with this ID.
    #[error("{0} is not registered")]
    NotFound(String),

    /// A node with this ID is already registered.
    #[error("{0} is already registered")]
    DuplicateId(String),

    /// A JSON payload could not be parsed into nodes.
    #[error("failed to decode payload: {0}")]
    Decode(String),

    /// A node could not be rendered as JSON or XML.
    #[error("failed to encode node: {0}")]
    Encode(String),
}

/// Shorthand for results carrying a core [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
