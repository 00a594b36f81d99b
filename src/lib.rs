//! A concurrent, non-strict XML parser for documents too large to parse
//! with a single pass: the input is split into chunks at safe boundaries,
//! each chunk is scanned independently across a worker pool, and the
//! results are reassembled in document order by a merger that reconciles
//! elements split across chunk boundaries.
//!
//! The public entry point is [`Parser::run`]; [`parser::parse_all`] is a
//! convenience wrapper for callers who just want the whole element list in
//! memory instead of streaming through a [`Subscriber`].

pub mod byte_class;
pub mod cancellation;
pub mod chunk;
pub mod chunk_parser;
pub mod core;
pub mod element;
pub mod error;
pub mod merger;
pub mod parser;
pub mod splitter;
pub mod stack;
pub mod token_stream;

pub use cancellation::CancellationToken;
pub use chunk::{Chunk, ParsedChunk};
pub use element::{Attribute, Bytes, Element, SourceOffset, Span};
pub use error::{Diagnostic, ParseError, ParseResult};
pub use merger::Subscriber;
pub use parser::{parse_all, Config, Outcome, Parser, Strictness};
pub use splitter::SafeCut;
pub use token_stream::{Token, TokenStream};
