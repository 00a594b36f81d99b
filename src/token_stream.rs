//! A pull-based adapter flattening one merger-emitted `Node` into a stream
//! of start/end/character-data tokens, the same three-event shape as a
//! conventional SAX parser.
//!
//! Unlike a span-based event reader over a live buffer, these events own
//! their bytes outright: by the time a `Node` reaches here the merger has
//! already promoted it out of the stack machine and detached its `Bytes`,
//! so the chunk buffers it originally referenced may already be gone.

use crate::element::{Attribute, Bytes, Element};

/// One flattened event in a depth-first walk of a `Node`.
#[derive(Debug, Clone)]
pub enum Token {
    StartElement { name: Bytes, attributes: Vec<Attribute> },
    EndElement { name: Bytes },
    CharData { bytes: Bytes },
}

struct Frame {
    name: Bytes,
    pending_text: Option<Bytes>,
    children: std::vec::IntoIter<Element>,
}

/// Walks a single `Node` depth-first, yielding one `Token` per call to
/// `next()`. Cheap to construct; does no work until pulled.
pub struct TokenStream {
    stack: Vec<Frame>,
    pending_root: Option<Element>,
}

impl TokenStream {
    pub fn new(root: Element) -> Self {
        TokenStream {
            stack: Vec::new(),
            pending_root: Some(root),
        }
    }

    fn enter(&mut self, node: Element) -> Token {
        match node {
            Element::Node {
                name,
                attributes,
                children,
                text,
                ..
            } => {
                let pending_text = if text.is_empty() { None } else { Some(text) };
                self.stack.push(Frame {
                    name: name.clone(),
                    pending_text,
                    children: children.into_iter(),
                });
                Token::StartElement { name, attributes }
            }
            other => {
                // Only `Node`s are ever pushed as children by the merger's
                // stack machine; anything else reaching here is a caller
                // bug (e.g. feeding a free-standing `OpenTag`/`CloseTag`
                // straight into a token stream instead of through a
                // subscriber that only forwards balanced `Node`s).
                panic!("TokenStream::enter called with a non-Node element: {other:?}");
            }
        }
    }
}

impl Iterator for TokenStream {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if let Some(root) = self.pending_root.take() {
            return Some(self.enter(root));
        }

        loop {
            let top = self.stack.last_mut()?;

            if let Some(text) = top.pending_text.take() {
                return Some(Token::CharData { bytes: text });
            }

            match top.children.next() {
                Some(node @ Element::Node { .. }) => return Some(self.enter(node)),
                Some(_) => continue,
                None => {
                    let frame = self.stack.pop().expect("just peeked");
                    return Some(Token::EndElement { name: frame.name });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;
    use crate::chunk_parser::parse_chunk;

    fn root_node(data: &[u8]) -> Element {
        let parsed = parse_chunk(&Chunk::new(0, data.to_vec()));
        assert_eq!(parsed.elements.len(), 1);
        parsed.elements.into_iter().next().unwrap()
    }

    #[test]
    fn flattens_nested_node_into_balanced_start_end_pairs() {
        let node = root_node(b"<book><title>Go Gophers</title></book>");
        let tokens: Vec<Token> = TokenStream::new(node).collect();
        assert_eq!(tokens.len(), 5);
        assert!(matches!(tokens[0], Token::StartElement { .. }));
        assert!(matches!(tokens[1], Token::StartElement { .. }));
        assert!(matches!(tokens[2], Token::CharData { .. }));
        assert!(matches!(tokens[3], Token::EndElement { .. }));
        assert!(matches!(tokens[4], Token::EndElement { .. }));
    }

    #[test]
    fn start_and_end_names_match_for_every_element() {
        let node = root_node(b"<a><b/><c>text</c></a>");
        let tokens: Vec<Token> = TokenStream::new(node).collect();
        let mut stack: Vec<Bytes> = Vec::new();
        for token in &tokens {
            match token {
                Token::StartElement { name, .. } => stack.push(name.clone()),
                Token::EndElement { name } => {
                    assert_eq!(stack.pop().as_ref(), Some(name));
                }
                Token::CharData { .. } => {}
            }
        }
        assert!(stack.is_empty());
    }

    #[test]
    fn self_closing_child_has_no_chardata_token() {
        let node = root_node(b"<a><b/></a>");
        let tokens: Vec<Token> = TokenStream::new(node).collect();
        // a-start, b-start, b-end, a-end: no text anywhere.
        assert_eq!(tokens.len(), 4);
        assert!(!tokens.iter().any(|t| matches!(t, Token::CharData { .. })));
    }
}
