//! The open-element stack machine, shared verbatim by the chunk parser
//! (applied to a throwaway, chunk-local stack) and the merger (applied to
//! one persistent stack across the whole document). Both walk the same
//! four operations over an element stream; only the stack's lifetime and
//! what "emit" means differ.

use crate::element::{Attribute, Bytes, Element, SourceOffset};
use crate::error::Diagnostic;

/// An element still open: its close has not yet been observed by whoever
/// is running this stack machine.
pub struct Frame {
    pub name: Bytes,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Element>,
    pub text: Vec<u8>,
    pub offset: SourceOffset,
}

impl Frame {
    pub fn new(name: Bytes, attributes: Vec<Attribute>, offset: SourceOffset) -> Self {
        Frame {
            name,
            attributes,
            children: Vec::new(),
            text: Vec::new(),
            offset,
        }
    }

    fn into_node(self) -> Element {
        Element::Node {
            name: self.name,
            attributes: self.attributes,
            children: self.children,
            text: Bytes::owned(self.text),
            offset: self.offset,
        }
    }

    /// Serialize this still-open frame back into a flat element stream: the
    /// bare `OpenTag` (matching the data model exactly — no children/text
    /// field), its buffered text if any, then its children in order.
    ///
    /// Used only when a chunk ends mid-element. The merger pushes a fresh
    /// global frame for the `OpenTag` and then walks straight into this
    /// same text/children sequence next, re-accumulating them exactly as
    /// this chunk did — so nothing collected before the chunk boundary is
    /// lost, it's just re-expressed as the flat stream the merger already
    /// knows how to replay.
    fn flatten_into(self, out: &mut Vec<Element>) {
        out.push(Element::OpenTag {
            name: self.name,
            attributes: self.attributes,
            offset: self.offset,
        });
        if !self.text.is_empty() {
            out.push(Element::CharData {
                bytes: Bytes::owned(self.text),
            });
        }
        out.extend(self.children);
    }
}

/// A stack of open frames plus the non-fatal diagnostics produced while
/// reconciling closes against it.
#[derive(Default)]
pub struct StackMachine {
    pub stack: Vec<Frame>,
    pub diagnostics: Vec<Diagnostic>,
}

impl StackMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_open(&mut self, name: Bytes, attributes: Vec<Attribute>, offset: SourceOffset) {
        self.stack.push(Frame::new(name, attributes, offset));
    }

    /// A complete `Node` (self-closing tag, or a just-promoted close):
    /// attach to the new top's children, or emit if the stack is empty.
    pub fn push_node(&mut self, node: Element, emit: &mut impl FnMut(Element)) {
        match self.stack.last_mut() {
            Some(top) => top.children.push(node),
            None => emit(node),
        }
    }

    /// Attach to the top's text buffer, or emit as a top-level character
    /// event if the stack is empty.
    pub fn push_chardata(&mut self, bytes: Bytes, emit: &mut impl FnMut(Element)) {
        if bytes.is_empty() {
            return;
        }
        match self.stack.last_mut() {
            Some(top) => top.text.extend_from_slice(bytes.as_slice()),
            None => emit(Element::CharData { bytes }),
        }
    }

    /// Pop the stack; promote the popped frame to a `Node` on a name match,
    /// recording an `UnbalancedTag` diagnostic but still popping otherwise
    /// (non-strict). Returns a free-standing `CloseTag` when the stack was
    /// already empty — the caller is responsible for appending it to the
    /// close-only prefix of the chunk's element list.
    pub fn push_close(
        &mut self,
        name: Bytes,
        offset: SourceOffset,
        emit: &mut impl FnMut(Element),
    ) -> Option<Element> {
        match self.stack.pop() {
            Some(frame) => {
                if frame.name.as_slice() != name.as_slice() {
                    self.diagnostics.push(Diagnostic::UnbalancedTag {
                        expected: frame.name.as_slice().to_vec().into_boxed_slice(),
                        got: name.as_slice().to_vec().into_boxed_slice(),
                        offset,
                    });
                }
                let node = frame.into_node();
                self.push_node(node, emit);
                None
            }
            None => Some(Element::CloseTag { name, offset }),
        }
    }

    /// At EOF (document end, not just a chunk boundary): true iff every
    /// open element was eventually closed.
    pub fn is_balanced(&self) -> bool {
        self.stack.is_empty()
    }

    /// Flatten any still-open frames (outermost first) into a flat element
    /// stream, for chunk-end serialization. Consumes the machine.
    pub fn into_dangling(self) -> (Vec<Element>, Vec<Diagnostic>) {
        let mut out = Vec::new();
        for frame in self.stack {
            frame.flatten_into(&mut out);
        }
        (out, self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn name(s: &str) -> Bytes {
        let arc: Arc<[u8]> = Arc::from(s.as_bytes());
        Bytes::shared(&arc, 0, arc.len())
    }

    #[test]
    fn balanced_open_close_emits_one_node() {
        let mut m = StackMachine::new();
        let mut out = Vec::new();
        m.push_open(name("a"), vec![], 0);
        assert!(m.push_close(name("a"), 5, &mut |el| out.push(el)).is_none());
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Element::Node { .. }));
    }

    #[test]
    fn nested_children_attach_to_parent() {
        let mut m = StackMachine::new();
        let mut out = Vec::new();
        m.push_open(name("a"), vec![], 0);
        m.push_open(name("b"), vec![], 1);
        m.push_close(name("b"), 2, &mut |el| out.push(el));
        m.push_close(name("a"), 3, &mut |el| out.push(el));
        assert_eq!(out.len(), 1);
        match &out[0] {
            Element::Node { children, .. } => {
                assert_eq!(children.len(), 1);
                assert_eq!(children[0].name(), Some(&b"b"[..]));
            }
            _ => panic!("expected Node"),
        }
    }

    #[test]
    fn close_with_empty_stack_is_free_standing() {
        let mut m = StackMachine::new();
        let mut out = Vec::new();
        let dangling = m.push_close(name("a"), 0, &mut |el| out.push(el));
        assert!(dangling.is_some());
        assert!(out.is_empty());
    }

    #[test]
    fn mismatched_close_still_pops_and_warns() {
        let mut m = StackMachine::new();
        let mut out = Vec::new();
        m.push_open(name("a"), vec![], 0);
        m.push_close(name("zzz"), 3, &mut |el| out.push(el));
        assert_eq!(out.len(), 1);
        assert_eq!(m.diagnostics.len(), 1);
        assert!(matches!(m.diagnostics[0], Diagnostic::UnbalancedTag { .. }));
    }

    #[test]
    fn dangling_open_flattens_to_open_plus_children() {
        let mut m = StackMachine::new();
        let mut out = Vec::new();
        m.push_open(name("a"), vec![], 0);
        m.push_open(name("b"), vec![], 1);
        m.push_close(name("b"), 2, &mut |el| out.push(el));
        // "a" never closes in this chunk.
        let (dangling, _) = m.into_dangling();
        assert_eq!(dangling.len(), 2);
        assert!(dangling[0].is_open_tag());
        assert_eq!(dangling[1].name(), Some(&b"b"[..]));
    }
}
