//! The element data model: a closed tagged sum, never an inheritance
//! hierarchy, per the design notes. An `Element` is produced by a chunk
//! parser and reclassified (never mutated in place) by the merger as
//! `OpenTag`s are promoted to `Node`s.

use std::sync::Arc;

/// Byte offset into the source stream, kept for diagnostics. Line/column is
/// not tracked on the hot path — it would mean scanning every newline in
/// every chunk for the common case where no diagnostic is ever printed.
pub type SourceOffset = u64;

/// A lightweight reference into a chunk's shared backing buffer, or an
/// owned copy once that buffer has been (or is about to be) released.
///
/// This is the zero-copy mechanism: many `Bytes` values can share the same
/// `Arc<[u8]>` chunk buffer without any allocation. The merger calls
/// [`Bytes::detach`] on every byte slice it retains past the chunk that
/// produced it (an `OpenTag`'s name/attributes, kept alive in the global
/// stack across chunk boundaries) so the chunk's buffer can be freed.
#[derive(Clone)]
pub enum Bytes {
    Shared(Arc<[u8]>, Span),
    Owned(Box<[u8]>),
}

/// A `(start, len)` pair into a chunk's buffer. `len` is a full `u32` — XML
/// text runs are not bounded to 64KB the way a DOM index might cap them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: u32,
    pub len: u32,
}

impl Span {
    pub fn new(start: usize, len: usize) -> Self {
        Span {
            start: start as u32,
            len: len as u32,
        }
    }

    #[inline]
    pub fn slice<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.start as usize..self.start as usize + self.len as usize]
    }
}

impl Bytes {
    pub fn shared(buf: &Arc<[u8]>, start: usize, len: usize) -> Self {
        Bytes::Shared(Arc::clone(buf), Span::new(start, len))
    }

    pub fn owned(data: impl Into<Box<[u8]>>) -> Self {
        Bytes::Owned(data.into())
    }

    pub fn empty() -> Self {
        Bytes::Owned(Box::default())
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Bytes::Shared(buf, span) => span.slice(buf),
            Bytes::Owned(b) => b,
        }
    }

    /// Copy the referenced bytes out of the shared chunk buffer, so the
    /// chunk's `Arc<[u8]>` can drop once no other `Bytes` still shares it.
    pub fn detach(&mut self) {
        if let Bytes::Shared(..) = self {
            *self = Bytes::Owned(self.as_slice().to_vec().into_boxed_slice());
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

impl std::fmt::Debug for Bytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.as_slice()))
    }
}

impl PartialEq for Bytes {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}
impl Eq for Bytes {}

/// An XML attribute, only ever found as a child of `OpenTag`/`Node`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: Bytes,
    pub value: Bytes,
}

/// A single element produced by a chunk parser, consumed by the merger.
///
/// `Node`'s `children` field may only contain `Node` and `CharData`
/// elements — never a dangling `OpenTag`/`CloseTag` — enforced by
/// construction: the merger is the only place that builds a `Node`.
#[derive(Debug, Clone)]
pub enum Element {
    /// Unmatched start tag awaiting a close, possibly in a later chunk.
    OpenTag {
        name: Bytes,
        attributes: Vec<Attribute>,
        offset: SourceOffset,
    },
    /// Unmatched end tag awaiting a prior open, possibly from an earlier chunk.
    CloseTag { name: Bytes, offset: SourceOffset },
    /// A balanced subtree: both its start and end were observed.
    Node {
        name: Bytes,
        attributes: Vec<Attribute>,
        children: Vec<Element>,
        text: Bytes,
        offset: SourceOffset,
    },
    /// Text between tags, free-standing only when no open parent exists.
    CharData { bytes: Bytes },
}

impl Element {
    pub fn name(&self) -> Option<&[u8]> {
        match self {
            Element::OpenTag { name, .. }
            | Element::CloseTag { name, .. }
            | Element::Node { name, .. } => Some(name.as_slice()),
            Element::CharData { .. } => None,
        }
    }

    pub fn is_open_tag(&self) -> bool {
        matches!(self, Element::OpenTag { .. })
    }

    pub fn is_close_tag(&self) -> bool {
        matches!(self, Element::CloseTag { .. })
    }

    /// Recursively detach every `Bytes` value reachable from this element
    /// from its originating chunk buffer. Called by the merger right
    /// before a chunk's buffer is returned to the free-list.
    pub fn detach(&mut self) {
        match self {
            Element::OpenTag { name, attributes, .. } => {
                name.detach();
                for a in attributes {
                    a.name.detach();
                    a.value.detach();
                }
            }
            Element::CloseTag { name, .. } => name.detach(),
            Element::Node {
                name,
                attributes,
                children,
                text,
                ..
            } => {
                name.detach();
                text.detach();
                for a in attributes {
                    a.name.detach();
                    a.value.detach();
                }
                for c in children {
                    c.detach();
                }
            }
            Element::CharData { bytes } => bytes.detach(),
        }
    }
}
