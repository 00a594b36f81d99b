//! Reassembles chunk-parser output into document order and drives the
//! subscriber.
//!
//! Chunks can finish out of order (parser workers race each other), so
//! incoming `ParsedChunk`s are held in a reorder buffer keyed by index
//! until the next expected index is available. Once in order, each
//! chunk's element list is replayed through the same [`StackMachine`] the
//! chunk parser used locally, except this one is global and lives for the
//! whole document: an `OpenTag` left dangling at one chunk's end is simply
//! the next chunk's first `push_open`, continuing an already-open frame.

use crate::cancellation::CancellationToken;
use crate::chunk::ParsedChunk;
use crate::element::Element;
use crate::error::{Diagnostic, ParseError, ParseResult};
use crate::stack::StackMachine;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

/// Receives fully-reassembled, document-order output.
///
/// `on_element` fires for every top-level `Element` (a complete `Node`, or
/// free-standing `CharData`/`CloseTag`/`OpenTag` when the document itself
/// is unbalanced). `on_diagnostic` fires for every non-fatal finding
/// encountered while merging, in document order.
pub trait Subscriber {
    fn on_element(&mut self, element: Element);
    fn on_diagnostic(&mut self, diagnostic: &Diagnostic) {
        let _ = diagnostic;
    }
}

impl<F: FnMut(Element)> Subscriber for F {
    fn on_element(&mut self, element: Element) {
        self(element)
    }
}

/// How long the merger waits for the next expected chunk index before
/// declaring the pipeline stalled (a worker panicked, or a bug dropped a
/// chunk without sending it).
pub const STALL_TIMEOUT: Duration = Duration::from_secs(30);

struct PendingChunk {
    parsed: ParsedChunk,
}

impl PendingChunk {
    fn index(&self) -> u64 {
        self.parsed.index
    }
}

impl PartialEq for PendingChunk {
    fn eq(&self, other: &Self) -> bool {
        self.index() == other.index()
    }
}
impl Eq for PendingChunk {}
impl PartialOrd for PendingChunk {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for PendingChunk {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index().cmp(&other.index())
    }
}

/// Merges an unordered stream of `ParsedChunk`s into document order, driving
/// `subscriber` and accumulating diagnostics in order as it goes.
///
/// `total_chunks`, once known (the splitter returns it when done), lets the
/// merger tell a genuine end-of-document apart from still-waiting: pass
/// `None` until the splitter has finished and you know the final count.
///
/// In `Strict` mode the first diagnostic encountered — whether resolved
/// entirely within one chunk or produced while reconciling a close against
/// the global stack — is promoted to a fatal error and trips `cancellation`,
/// so the splitter and chunk-parser pool can stop early instead of finishing
/// a parse whose outcome is already decided.
pub struct Merger<S> {
    subscriber: S,
    strict: bool,
    cancellation: CancellationToken,
    next_index: u64,
    total_chunks: Option<u64>,
    pending: BinaryHeap<Reverse<PendingChunk>>,
    global: StackMachine,
    diagnostics: Vec<Diagnostic>,
    last_progress: Instant,
}

impl<S: Subscriber> Merger<S> {
    pub fn new(subscriber: S, strict: bool, cancellation: CancellationToken) -> Self {
        Merger {
            subscriber,
            strict,
            cancellation,
            next_index: 0,
            total_chunks: None,
            pending: BinaryHeap::new(),
            global: StackMachine::new(),
            diagnostics: Vec::new(),
            last_progress: Instant::now(),
        }
    }

    /// Tell the merger how many chunks exist in total, once the splitter
    /// has finished reading. Safe to call at any time; only consulted at
    /// end-of-stream to confirm nothing is still pending.
    pub fn set_total_chunks(&mut self, total: u64) {
        self.total_chunks = Some(total);
    }

    /// Feed one parsed chunk in, draining as many now-contiguous chunks
    /// from the reorder buffer as are available. Returns `Err` as soon as a
    /// diagnostic is seen in `Strict` mode.
    pub fn push(&mut self, parsed: ParsedChunk) -> ParseResult<()> {
        self.pending.push(Reverse(PendingChunk { parsed }));
        self.drain()
    }

    fn drain(&mut self) -> ParseResult<()> {
        while let Some(Reverse(candidate)) = self.pending.peek() {
            if candidate.index() != self.next_index {
                break;
            }
            let Reverse(PendingChunk { parsed }) = self.pending.pop().unwrap();
            self.apply_chunk(parsed)?;
            self.next_index += 1;
            self.last_progress = Instant::now();
        }
        Ok(())
    }

    fn apply_chunk(&mut self, mut parsed: ParsedChunk) -> ParseResult<()> {
        // Diagnostics the chunk parser already resolved entirely within its
        // own local stack (e.g. a mismatched close tag closed and reopened
        // inside one chunk) never touch the global stack, so they have to
        // be drained here explicitly or they're lost.
        for diag in std::mem::take(&mut parsed.diagnostics) {
            self.record_diagnostic(diag)?;
        }

        for mut element in std::mem::take(&mut parsed.elements) {
            // Copy out of the chunk's shared buffer before this element can
            // be retained on the global stack past this function returning.
            element.detach();
            replay(&mut self.global, element, &mut self.subscriber);
        }
        for diag in std::mem::take(&mut self.global.diagnostics) {
            self.record_diagnostic(diag)?;
        }
        // The chunk's own backing buffer (`parsed.data`) drops here once no
        // retained `Bytes::Shared` still points into it — every element
        // that survives past this point was already `detach`ed above.
        drop(parsed.data);
        Ok(())
    }

    /// Record one diagnostic: log it, hand it to the subscriber, and either
    /// accumulate it (`NonStrict`) or cancel the run and return it as a
    /// fatal error (`Strict`).
    fn record_diagnostic(&mut self, diagnostic: Diagnostic) -> ParseResult<()> {
        log::warn!("{diagnostic}");
        self.subscriber.on_diagnostic(&diagnostic);
        if self.strict {
            self.cancellation.cancel();
            return Err(diagnostic.into_fatal());
        }
        self.diagnostics.push(diagnostic);
        Ok(())
    }

    /// Has the merger produced everything it's going to, given what the
    /// splitter has told us about the total chunk count?
    pub fn is_finished(&self) -> bool {
        matches!(self.total_chunks, Some(total) if self.next_index >= total)
    }

    /// Check for a stalled pipeline: chunks pending but the expected next
    /// index hasn't arrived in `STALL_TIMEOUT`.
    pub fn check_stalled(&self) -> ParseResult<()> {
        if !self.is_finished() && self.last_progress.elapsed() > STALL_TIMEOUT {
            log::error!(
                "merge stalled waiting for chunk {} ({:?} since last progress)",
                self.next_index,
                self.last_progress.elapsed(),
            );
            return Err(ParseError::MergeStalled {
                expected_index: self.next_index,
            });
        }
        Ok(())
    }

    /// Finalize the merge. Requires every expected chunk to have already
    /// arrived (`is_finished()`); any frame still open at that point is a
    /// document that ends mid-element. In `Strict` mode that's fatal; in
    /// `NonStrict` mode the still-open frames are flushed to the subscriber
    /// the same way a chunk boundary flushes them, via `StackMachine::into_dangling`.
    pub fn finish(mut self) -> ParseResult<Vec<Diagnostic>> {
        if !self.is_finished() {
            return Err(ParseError::MergeStalled {
                expected_index: self.next_index,
            });
        }

        let global = std::mem::take(&mut self.global);
        let (dangling, diagnostics) = global.into_dangling();
        for diag in diagnostics {
            self.record_diagnostic(diag)?;
        }

        if !dangling.is_empty() {
            if self.strict {
                self.cancellation.cancel();
                return Err(ParseError::Malformed(Diagnostic::UnbalancedTag {
                    expected: Box::from(&b""[..]),
                    got: Box::from(&b""[..]),
                    offset: 0,
                }));
            }
            for element in dangling {
                self.subscriber.on_element(element);
            }
        }

        Ok(self.diagnostics)
    }
}

/// Replay one element from a chunk's flat list through the global stack:
/// identical shape to what the chunk parser does locally, just persisting
/// across chunk boundaries instead of resetting every time.
fn replay<S: Subscriber>(global: &mut StackMachine, element: Element, subscriber: &mut S) {
    match element {
        Element::OpenTag { name, attributes, offset } => {
            global.push_open(name, attributes, offset);
        }
        Element::CloseTag { name, offset } => {
            if let Some(still_dangling) =
                global.push_close(name, offset, &mut |el| subscriber.on_element(el))
            {
                subscriber.on_element(still_dangling);
            }
        }
        node @ Element::Node { .. } => {
            global.push_node(node, &mut |el| subscriber.on_element(el));
        }
        Element::CharData { bytes } => {
            global.push_chardata(bytes, &mut |el| subscriber.on_element(el));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_parser::parse_chunk;
    use crate::chunk::Chunk;

    #[derive(Default)]
    struct Collector {
        elements: Vec<Element>,
    }

    impl Subscriber for Collector {
        fn on_element(&mut self, element: Element) {
            self.elements.push(element);
        }
    }

    fn parsed(index: u64, data: &[u8]) -> ParsedChunk {
        let chunk = Chunk::new(index, data.to_vec());
        parse_chunk(&chunk)
    }

    fn non_strict(subscriber: Collector) -> Merger<Collector> {
        Merger::new(subscriber, false, CancellationToken::new())
    }

    #[test]
    fn single_chunk_emits_one_node() {
        let mut merger = non_strict(Collector::default());
        merger.set_total_chunks(1);
        merger.push(parsed(0, b"<a><b/></a>")).unwrap();
        assert!(merger.is_finished());
        assert_eq!(merger.subscriber.elements.len(), 1);
    }

    #[test]
    fn element_split_across_two_chunks_reassembles() {
        let mut merger = non_strict(Collector::default());
        merger.set_total_chunks(2);
        merger.push(parsed(0, b"<a><b>hello")).unwrap();
        merger.push(parsed(1, b" world</b></a>")).unwrap();
        assert!(merger.is_finished());
        assert_eq!(merger.subscriber.elements.len(), 1);
        match &merger.subscriber.elements[0] {
            Element::Node { name, children, .. } => {
                assert_eq!(name.as_slice(), b"a");
                match &children[0] {
                    Element::Node { text, .. } => {
                        assert_eq!(text.as_slice(), b"hello world");
                    }
                    _ => panic!("expected Node"),
                }
            }
            _ => panic!("expected Node"),
        }
    }

    #[test]
    fn out_of_order_arrival_still_reassembles_in_order() {
        let mut merger = non_strict(Collector::default());
        merger.set_total_chunks(3);
        let c0 = parsed(0, b"<a>");
        let c1 = parsed(1, b"<b/>");
        let c2 = parsed(2, b"</a>");
        merger.push(c2).unwrap();
        merger.push(c0).unwrap();
        assert!(!merger.is_finished());
        merger.push(c1).unwrap();
        assert!(merger.is_finished());
        assert_eq!(merger.subscriber.elements.len(), 1);
        match &merger.subscriber.elements[0] {
            Element::Node { children, .. } => assert_eq!(children.len(), 1),
            _ => panic!("expected Node"),
        }
    }

    #[test]
    fn strict_mode_rejects_unbalanced_document() {
        let mut merger = Merger::new(Collector::default(), true, CancellationToken::new());
        merger.set_total_chunks(1);
        merger.push(parsed(0, b"<a><b/>")).unwrap();
        let err = merger.finish().unwrap_err();
        assert!(matches!(err, ParseError::Malformed(_)));
    }

    #[test]
    fn non_strict_mode_flushes_dangling_frames_as_final_elements() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let collected = Rc::new(RefCell::new(Vec::new()));
        let sink = {
            let collected = Rc::clone(&collected);
            move |element: Element| collected.borrow_mut().push(element)
        };

        let mut merger = Merger::new(sink, false, CancellationToken::new());
        merger.set_total_chunks(1);
        merger.push(parsed(0, b"<a><b/>")).unwrap();
        let diagnostics = merger.finish().unwrap();
        assert!(diagnostics.is_empty());

        let elements = collected.borrow();
        assert_eq!(elements.len(), 1);
        match &elements[0] {
            Element::Node { name, children, .. } => {
                assert_eq!(name.as_slice(), b"a");
                assert_eq!(children.len(), 1);
                assert_eq!(children[0].name(), Some(&b"b"[..]));
            }
            _ => panic!("expected Node"),
        }
    }

    #[test]
    fn chunk_local_diagnostics_are_not_dropped() {
        // The mismatch between "</b>" and "</c>" is resolved entirely
        // inside one chunk's own stack machine, never touching the global
        // one — this must still reach the merger's diagnostic list.
        let mut merger = non_strict(Collector::default());
        merger.set_total_chunks(1);
        merger.push(parsed(0, b"<a><b></c></a>")).unwrap();
        let diagnostics = merger.finish().unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(diagnostics[0], Diagnostic::UnbalancedTag { .. }));
    }

    #[test]
    fn strict_mode_fails_fast_on_first_diagnostic_and_cancels() {
        let cancellation = CancellationToken::new();
        let mut merger = Merger::new(Collector::default(), true, cancellation.clone());
        merger.set_total_chunks(1);
        let err = merger.push(parsed(0, b"<a><b></c></a>")).unwrap_err();
        assert!(matches!(err, ParseError::Malformed(_)));
        assert!(cancellation.is_cancelled());
    }
}
