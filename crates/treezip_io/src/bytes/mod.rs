//! Tools for manipulating byte-level data.

/// Bounded in-memory buffering over an external sink.
pub mod chunked;

/// Encoding/decoding floating-point numbers.
pub mod float;

/// Encoding/decoding variable-length numbers.
pub mod varnum;
