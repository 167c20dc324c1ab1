//! Binary serialization of JavaScript ASTs.
//!
//! The format exploits structural redundancy in real programs: the AST is
//! lowered onto a ranked tree, a TreeRePair pass extracts shared subtree
//! patterns into grammar productions ("meta-rules"), and the result is
//! written as a preorder token stream over a partitioned code space
//! (parameters, built-ins, meta-rules, grammar kinds, interned strings,
//! interned numbers).

#[macro_use]
extern crate log;

use treezip_shared::InterfaceName;

/// An error while writing a file.
#[derive(Debug)]
pub enum TokenWriterError {
    WriteError(std::io::Error),

    /// Two nodes of the same kind expose different property sets.
    InconsistentShape {
        kind: InterfaceName,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// A value outside the supported primitive classes.
    UnsupportedPrimitive(String),

    /// An AST node whose kind is absent from the grammar.
    UnknownKind(InterfaceName),

    /// The tree to encode is not rooted in a `Script` or `Module`.
    UnexpectedRoot(InterfaceName),

    /// A structural invariant of the compression engine was violated.
    /// This is a bug, not a user error; the current encode is aborted.
    InternalInvariant(String),
}

/// An error while reading a file.
#[derive(Debug)]
pub enum TokenReaderError {
    ReadError(std::io::Error),

    /// The stream ended in the middle of a token.
    Truncated,

    /// A variable-length integer exceeded the 64-bit range.
    Overflow,

    /// The grammar header could not be parsed.
    BadHeader(String),

    /// A string pool entry is not valid UTF-8.
    Encoding(std::string::FromUtf8Error),

    /// The built-in count does not match this revision of the format.
    VersionMismatch { expected: u64, got: u64 },

    /// A tag outside every partition of the code space.
    UnknownTag(u64),

    /// The decoded tree is not rooted in a `Script` or `Module`.
    UnexpectedRoot(String),

    /// A structurally invalid token sequence (e.g. a `cons` whose tail
    /// is not a list, or a parameter outside any meta-rule scope).
    InvalidValue(String),
}

impl TokenReaderError {
    /// Translate a low-level read failure into its typed counterpart.
    ///
    /// The byte layer reports truncation as `UnexpectedEof` and varnum
    /// overflow as `InvalidData`; everything else is a genuine I/O error.
    pub fn read_error(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::UnexpectedEof => TokenReaderError::Truncated,
            std::io::ErrorKind::InvalidData => TokenReaderError::Overflow,
            _ => TokenReaderError::ReadError(error),
        }
    }
}

/// Byte-level utilities for writing token readers/writers.
pub mod bytes;

/// Recovering the AST schema from an untyped tree.
pub mod grammar;

/// The tree compression engine and the token reader/writer built on it.
pub mod repair;

pub use crate::repair::read::decode;
pub use crate::repair::write::{encode, Encoder};
