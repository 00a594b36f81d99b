//! Attribute reading within a start tag.
//!
//! While the next non-space byte is neither `>` nor `/`, read a name; if
//! `=` follows, skip spaces; if the next byte is `"` or `'`, read until the
//! matching quote; otherwise read until the next space (non-strict).
//!
//! Entity references inside attribute values are passed through raw: no
//! decoding is attempted.

use crate::byte_class::{is_name_byte, is_name_start_byte, is_space_byte};
use crate::element::{Attribute, Bytes};
use std::sync::Arc;

/// Parse attributes from a chunk's shared buffer, starting right after the
/// element name (which may be preceded by whitespace). Attribute insertion
/// order is preserved. Returns the attributes found and the offset of the
/// first byte not consumed (the tag's `>` or `/`).
pub fn parse_attributes(chunk: &Arc<[u8]>, start: usize) -> (Vec<Attribute>, usize) {
    let buf: &[u8] = chunk;
    let mut pos = start;
    let mut attrs = Vec::new();

    loop {
        while pos < buf.len() && is_space_byte(buf[pos]) {
            pos += 1;
        }

        if pos >= buf.len() || buf[pos] == b'>' || buf[pos] == b'/' {
            break;
        }

        let name_start = pos;
        if !is_name_start_byte(buf[pos]) {
            // Non-strict: skip the offending byte rather than abort the tag.
            pos += 1;
            continue;
        }
        while pos < buf.len() && is_name_byte(buf[pos]) {
            pos += 1;
        }
        let name = Bytes::shared(chunk, name_start, pos - name_start);

        while pos < buf.len() && is_space_byte(buf[pos]) {
            pos += 1;
        }

        let value = if pos < buf.len() && buf[pos] == b'=' {
            pos += 1;
            while pos < buf.len() && is_space_byte(buf[pos]) {
                pos += 1;
            }

            if pos < buf.len() && (buf[pos] == b'"' || buf[pos] == b'\'') {
                let quote = buf[pos];
                pos += 1;
                let value_start = pos;
                while pos < buf.len() && buf[pos] != quote {
                    pos += 1;
                }
                let value = Bytes::shared(chunk, value_start, pos - value_start);
                if pos < buf.len() {
                    pos += 1; // closing quote
                }
                value
            } else {
                // Non-strict: unquoted value, read to next space/tag end.
                let value_start = pos;
                while pos < buf.len() && !is_space_byte(buf[pos]) && buf[pos] != b'>' && buf[pos] != b'/' {
                    pos += 1;
                }
                Bytes::shared(chunk, value_start, pos - value_start)
            }
        } else {
            Bytes::empty()
        };

        attrs.push(Attribute { name, value });
    }

    (attrs, pos)
}
