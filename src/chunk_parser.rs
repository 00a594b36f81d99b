//! Parses one chunk into an ordered element list: a single forward pass
//! over the chunk's bytes, driving the same stack machine the merger later
//! runs globally, but reset for each chunk.
//!
//! Markup recognized: start tags (with attributes and `/>` self-closing),
//! end tags, character data, processing instructions (`<?...?>`), comments
//! (`<!--...-->`) and CDATA sections (`<![CDATA[...]]>`). Anything else
//! starting with `<` is an unrecognized token: a diagnostic is recorded and
//! the scanner resyncs at the next newline, so a stray token doesn't take
//! a subsequent legitimate tag down with it.

use crate::byte_class::{is_name_byte, is_name_start_byte, is_space_byte};
use crate::chunk::{Chunk, ParsedChunk};
use crate::core::attributes::parse_attributes;
use crate::element::{Bytes, Element};
use crate::error::Diagnostic;
use crate::stack::StackMachine;
use memchr::memchr;

/// Parse a single chunk. Never fails: every byte either advances the scan
/// or is recorded as a diagnostic and skipped, so strictness promotion (if
/// any) happens one layer up, once the diagnostics are in hand.
pub fn parse_chunk(chunk: &Chunk) -> ParsedChunk {
    let buf: &[u8] = &chunk.data;
    let len = buf.len();
    let mut pos = 0usize;
    let mut elements: Vec<Element> = Vec::new();
    let mut machine = StackMachine::new();

    while pos < len {
        pos = skip_spaces(buf, pos);
        if pos >= len {
            break;
        }

        if buf[pos] != b'<' {
            let start = pos;
            pos = read_text(buf, pos);
            if pos > start {
                let bytes = Bytes::shared(&chunk.data, start, pos - start);
                machine.push_chardata(bytes, &mut |el| elements.push(el));
            }
            continue;
        }

        if pos + 1 >= len {
            machine
                .diagnostics
                .push(Diagnostic::UnrecognizedToken { offset: pos as u64 });
            break;
        }

        let next = buf[pos + 1];
        if is_name_start_byte(next) {
            pos = read_start_tag(&chunk.data, pos, &mut machine, &mut elements);
        } else if next == b'/' {
            pos = read_end_tag(&chunk.data, pos, &mut machine, &mut elements);
        } else if next == b'?' {
            pos = skip_to_terminator(buf, pos + 2, b"?>").unwrap_or(len);
        } else if next == b'!' {
            pos = skip_bang(buf, pos);
        } else {
            machine
                .diagnostics
                .push(Diagnostic::UnrecognizedToken { offset: pos as u64 });
            // Resync at the next newline, not the next `>`: scanning to `>`
            // can swallow an entire legitimate tag that happens to follow
            // the unrecognized token on the same line.
            pos = memchr(b'\n', &buf[pos..]).map(|i| pos + i + 1).unwrap_or(len);
        }
    }

    let (dangling, diagnostics) = machine.into_dangling();
    elements.extend(dangling);

    ParsedChunk {
        index: chunk.index,
        data: chunk.data.clone(),
        elements,
        diagnostics,
    }
}

fn skip_spaces(buf: &[u8], mut pos: usize) -> usize {
    while pos < buf.len() && is_space_byte(buf[pos]) {
        pos += 1;
    }
    pos
}

/// Read character data up to the next `<`, except a `"` at top level opens
/// a quoted run that may legally contain `<` (some producers wrap literal
/// markup-like text in quotes inside otherwise plain character data).
fn read_text(buf: &[u8], mut pos: usize) -> usize {
    let len = buf.len();
    while pos < len {
        match buf[pos] {
            b'<' => break,
            b'"' => {
                pos += 1;
                while pos < len && buf[pos] != b'"' {
                    pos += 1;
                }
                if pos < len {
                    pos += 1;
                }
            }
            _ => pos += 1,
        }
    }
    pos
}

/// `buf[pos] == '<'` and `buf[pos+1]` is a name-start byte.
fn read_start_tag(
    data: &std::sync::Arc<[u8]>,
    pos: usize,
    machine: &mut StackMachine,
    elements: &mut Vec<Element>,
) -> usize {
    let buf: &[u8] = data;
    let len = buf.len();
    let offset = pos as u64;
    let name_start = pos + 1;
    let mut p = name_start;
    while p < len && is_name_byte(buf[p]) {
        p += 1;
    }
    let name = Bytes::shared(data, name_start, p - name_start);

    let (attributes, mut p) = if p < len && is_space_byte(buf[p]) {
        parse_attributes(data, p)
    } else {
        (Vec::new(), p)
    };

    let self_closing = p < len && buf[p] == b'/';
    if self_closing {
        p += 1;
    }

    if p < len && buf[p] == b'>' {
        p += 1;
    } else {
        machine
            .diagnostics
            .push(Diagnostic::UnrecognizedToken { offset: p as u64 });
        p = memchr(b'>', &buf[p..]).map(|i| p + i + 1).unwrap_or(len);
    }

    if self_closing {
        let node = Element::Node {
            name,
            attributes,
            children: Vec::new(),
            text: Bytes::empty(),
            offset,
        };
        machine.push_node(node, &mut |el| elements.push(el));
    } else {
        machine.push_open(name, attributes, offset);
    }

    p
}

/// `buf[pos] == '<'` and `buf[pos+1] == '/'`.
fn read_end_tag(
    data: &std::sync::Arc<[u8]>,
    pos: usize,
    machine: &mut StackMachine,
    elements: &mut Vec<Element>,
) -> usize {
    let buf: &[u8] = data;
    let len = buf.len();
    let offset = pos as u64;
    let name_start = pos + 2;
    let mut p = name_start;
    while p < len && is_name_byte(buf[p]) {
        p += 1;
    }
    let name = Bytes::shared(data, name_start, p - name_start);

    p = memchr(b'>', &buf[p..]).map(|i| p + i + 1).unwrap_or(len);

    if let Some(dangling) = machine.push_close(name, offset, &mut |el| elements.push(el)) {
        elements.push(dangling);
    }

    p
}

/// `buf[pos] == '<'` and `buf[pos+1] == '!'`: comment, CDATA, or some other
/// declaration (e.g. `<!DOCTYPE ...>`), all non-goals beyond skip-and-move-on.
fn skip_bang(buf: &[u8], pos: usize) -> usize {
    let len = buf.len();
    if buf[pos..].starts_with(b"<!--") {
        skip_to_terminator(buf, pos + 4, b"-->").unwrap_or(len)
    } else if buf[pos..].starts_with(b"<![CDATA[") {
        skip_to_terminator(buf, pos + 9, b"]]>").unwrap_or(len)
    } else {
        memchr(b'>', &buf[pos..]).map(|i| pos + i + 1).unwrap_or(len)
    }
}

/// Find `needle` at or after `from`, returning the offset just past it.
fn skip_to_terminator(buf: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    let first = *needle.first()?;
    let mut scan = from;
    while scan < buf.len() {
        let hit = memchr(first, &buf[scan..])? + scan;
        if buf[hit..].starts_with(needle) {
            return Some(hit + needle.len());
        }
        scan = hit + 1;
    }
    None
}
