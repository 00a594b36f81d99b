//! The unit of work handed from the splitter to a chunk parser, and from a
//! chunk parser to the merger.

use crate::element::Element;
use std::sync::Arc;

/// A contiguous byte range of the input, cut at a safe boundary.
///
/// `data` is shared via `Arc<[u8]>` so the elements a chunk parser produces
/// can borrow from it (`Bytes::Shared`) without copying, while still being
/// `Send` across the splitter → parser → merger thread boundaries.
pub struct Chunk {
    pub index: u64,
    pub data: Arc<[u8]>,
}

impl Chunk {
    pub fn new(index: u64, data: Vec<u8>) -> Self {
        Chunk {
            index,
            data: Arc::from(data),
        }
    }
}

/// The result of parsing one chunk: its index (for reordering) and the
/// element list produced by the chunk-local stack machine, plus any
/// diagnostics raised along the way.
pub struct ParsedChunk {
    pub index: u64,
    pub data: Arc<[u8]>,
    pub elements: Vec<Element>,
    pub diagnostics: Vec<crate::error::Diagnostic>,
}
