//! Error taxonomy for the concurrent parser.
//!
//! Mirrors the fatal/non-fatal split the merge protocol relies on: a
//! [`ParseError`] aborts `Parser::run`, a [`Diagnostic`] is accumulated and
//! handed back alongside otherwise-successful output.

use std::fmt;
use thiserror::Error;

/// Fatal errors that can terminate a parse run.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read input: {0}")]
    ReadFailure(#[source] std::io::Error),

    #[error("no safe cut point found within a full chunk window at offset {offset}")]
    UnsplittableChunk { offset: u64 },

    #[error("merge stalled waiting for chunk {expected_index}")]
    MergeStalled { expected_index: u64 },

    #[error("parse canceled")]
    Canceled,

    #[error("strict mode: {0}")]
    Malformed(Diagnostic),
}

/// Non-fatal, per-chunk findings in `NonStrict` mode. In `Strict` mode the
/// first diagnostic is promoted to a [`ParseError`] and short-circuits the
/// pipeline via cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A token the scanner could not classify; it resynced to the next
    /// recovery byte (`\n` or `>`) and continued.
    UnrecognizedToken { offset: u64 },
    /// A close tag didn't match the name of the open element it popped.
    UnbalancedTag {
        expected: Box<[u8]>,
        got: Box<[u8]>,
        offset: u64,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnrecognizedToken { offset } => {
                write!(f, "unrecognized token at offset {offset}")
            }
            Diagnostic::UnbalancedTag { expected, got, offset } => write!(
                f,
                "unbalanced tag at offset {offset}: expected </{}>, got </{}>",
                String::from_utf8_lossy(expected),
                String::from_utf8_lossy(got),
            ),
        }
    }
}

impl Diagnostic {
    /// Promote this diagnostic to a fatal error, as `Strict` mode requires.
    pub fn into_fatal(self) -> ParseError {
        ParseError::Malformed(self)
    }
}

pub type ParseResult<T> = Result<T, ParseError>;
