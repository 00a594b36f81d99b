//! Splits a byte stream into chunks cut at a safe boundary: read up to
//! `chunk_size` bytes, find the last safe cut point, emit everything before
//! it as one chunk, and carry the remainder into the next read.

use crate::cancellation::CancellationToken;
use crate::chunk::Chunk;
use crate::error::{ParseError, ParseResult};
use crossbeam_channel::Sender;
use memchr::memrchr;
use std::io::Read;

/// The splitter's boundary rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafeCut {
    /// Cut at the last newline byte in the read window.
    Newline,
    /// Cut just past the last `</name>` closing-tag sequence in the window.
    EndTag,
}

/// Read `reader` to completion, emitting `Chunk`s on `out` in order.
///
/// `out` is a bounded channel: sending blocks once workers are saturated,
/// which caps steady-state memory at roughly `workers * chunk_size`.
pub fn split<R: Read>(
    mut reader: R,
    chunk_size: usize,
    safe_cut: SafeCut,
    out: &Sender<Chunk>,
    cancellation: &CancellationToken,
) -> ParseResult<u64> {
    let mut leftover: Vec<u8> = Vec::new();
    let mut index = 0u64;
    let mut total_read: u64 = 0;

    loop {
        if cancellation.is_cancelled() {
            log::debug!("splitter stopping early: cancellation requested after {index} chunks");
            return Err(ParseError::Canceled);
        }

        // Fill the window to a full `chunk_size` before demanding a cut.
        // `Read::read` always signals end-of-stream as a separate zero-byte
        // call (unlike Go's `io.Reader`, which may report `io.EOF` alongside
        // the final batch of data), so a short fill here is proof the stream
        // is exhausted: the remainder can be flushed as the final chunk with
        // no cut required at all, since nothing follows it to mis-split.
        let mut hit_eof = false;
        while leftover.len() < chunk_size {
            let mut buf = vec![0u8; chunk_size - leftover.len()];
            let n = reader.read(&mut buf).map_err(ParseError::ReadFailure)?;
            if n == 0 {
                hit_eof = true;
                break;
            }
            total_read += n as u64;
            leftover.extend_from_slice(&buf[..n]);
        }

        if hit_eof {
            if !leftover.is_empty() {
                out.send(Chunk::new(index, std::mem::take(&mut leftover)))
                    .map_err(|_| ParseError::Canceled)?;
                index += 1;
            }
            log::debug!("splitter finished: {index} chunks, {total_read} bytes read");
            return Ok(index);
        }

        match find_cut(&leftover, safe_cut) {
            Some(cut) => {
                let rest = leftover.split_off(cut);
                out.send(Chunk::new(index, std::mem::replace(&mut leftover, rest)))
                    .map_err(|_| ParseError::Canceled)?;
                index += 1;
            }
            None => {
                log::error!("no safe cut point within a full chunk window at offset {total_read}");
                return Err(ParseError::UnsplittableChunk {
                    offset: total_read,
                });
            }
        }
    }
}

/// Find the first byte offset *after* the last safe cut point in `buf`, or
/// `None` if the whole window contains no safe boundary (a pathological
/// input: one logical line/element longer than `chunk_size`).
fn find_cut(buf: &[u8], policy: SafeCut) -> Option<usize> {
    match policy {
        SafeCut::Newline => memrchr(b'\n', buf).map(|i| i + 1),
        SafeCut::EndTag => find_last_end_tag(buf),
    }
}

/// Find the offset just past the last `</name>` sequence in `buf`, scanning
/// backward from the end and skipping candidate `>` bytes that don't close
/// an end tag.
fn find_last_end_tag(buf: &[u8]) -> Option<usize> {
    let mut search_end = buf.len();
    loop {
        let gt = memrchr(b'>', &buf[..search_end])?;
        let lt = memrchr(b'<', &buf[..gt])?;
        if buf.get(lt + 1) == Some(&b'/') {
            return Some(gt + 1);
        }
        if gt == 0 {
            return None;
        }
        search_end = gt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn collect(data: &[u8], chunk_size: usize, policy: SafeCut) -> Vec<Vec<u8>> {
        let (tx, rx) = crossbeam_channel::unbounded();
        split(
            Cursor::new(data.to_vec()),
            chunk_size,
            policy,
            &tx,
            &CancellationToken::new(),
        )
        .unwrap();
        drop(tx);
        rx.into_iter().map(|c| c.data.to_vec()).collect()
    }

    #[test]
    fn cuts_on_newline_and_carries_leftover() {
        let data = b"<r><k>1</k></r>\n<r><k>2</k></r>\n<r><k>3</k></r>\n";
        let chunks = collect(data, 20, SafeCut::Newline);
        let joined: Vec<u8> = chunks.concat();
        assert_eq!(joined, data);
        assert!(chunks.len() >= 2);
    }

    #[test]
    fn cuts_on_end_tag_when_no_newlines() {
        let data = b"<a><b>xy</b></a><c><d>zw</d></c>";
        let chunks = collect(data, 18, SafeCut::EndTag);
        let joined: Vec<u8> = chunks.concat();
        assert_eq!(joined, &data[..]);
        for c in &chunks[..chunks.len() - 1] {
            assert!(c.ends_with(b">"));
        }
    }

    #[test]
    fn unsplittable_window_is_an_error() {
        let data = b"<a_very_long_element_name_with_no_newline_or_close_tag";
        let (tx, _rx) = crossbeam_channel::unbounded();
        let err = split(
            Cursor::new(data.to_vec()),
            10,
            SafeCut::Newline,
            &tx,
            &CancellationToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::UnsplittableChunk { .. }));
    }

    #[test]
    fn cancellation_stops_the_splitter_before_it_reads_to_eof() {
        let data = b"<r><k>1</k></r>\n".repeat(1000);
        let (tx, _rx) = crossbeam_channel::bounded(1);
        let cancellation = CancellationToken::new();
        cancellation.cancel();
        let err = split(Cursor::new(data), 64, SafeCut::Newline, &tx, &cancellation).unwrap_err();
        assert!(matches!(err, ParseError::Canceled));
    }

    #[test]
    fn small_input_is_single_final_chunk() {
        let data = b"<a/>";
        let chunks = collect(data, 1024, SafeCut::Newline);
        assert_eq!(chunks, vec![data.to_vec()]);
    }
}
