//! Top-level orchestration: wires the splitter, a bounded pool of chunk
//! parsers, and the merger together across threads, and exposes the single
//! entry point, [`Parser::run`].

use crate::cancellation::CancellationToken;
use crate::chunk::Chunk;
use crate::chunk_parser::parse_chunk;
use crate::error::{Diagnostic, ParseError, ParseResult};
use crate::merger::{Merger, Subscriber};
use crate::splitter::{self, SafeCut};
use std::io::Read;
use std::thread;

/// Whether a non-fatal [`Diagnostic`] is tolerated (accumulated and handed
/// back) or promoted to a fatal [`ParseError`] that aborts the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    NonStrict,
    Strict,
}

/// Tuning knobs for a parse run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Target number of bytes read per chunk before a safe cut is sought.
    pub chunk_size: usize,
    /// Number of chunk-parser worker threads.
    pub concurrency: usize,
    /// Boundary rule the splitter uses to cut chunks.
    pub safe_cut: SafeCut,
    pub strictness: Strictness,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            chunk_size: 1 << 20,
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            safe_cut: SafeCut::EndTag,
            strictness: Strictness::NonStrict,
        }
    }
}

/// The outcome of a completed, non-strict run: every diagnostic collected
/// along the way, in document order.
pub struct Outcome {
    pub diagnostics: Vec<Diagnostic>,
}

/// Runs the splitter → parser-pool → merger pipeline over `input`, calling
/// `subscriber` for every element and diagnostic produced, in document
/// order.
pub struct Parser {
    config: Config,
}

impl Parser {
    pub fn new(config: Config) -> Self {
        Parser { config }
    }

    pub fn run<R, S>(&self, input: R, subscriber: S) -> ParseResult<Outcome>
    where
        R: Read + Send,
        S: Subscriber + Send,
    {
        log::info!(
            "starting parse run: concurrency={}, chunk_size={}, safe_cut={:?}",
            self.config.concurrency,
            self.config.chunk_size,
            self.config.safe_cut,
        );

        let chunk_channel_capacity = self.config.concurrency.max(1) * 2;
        let (chunk_tx, chunk_rx) = crossbeam_channel::bounded::<Chunk>(chunk_channel_capacity);
        let (parsed_tx, parsed_rx) =
            crossbeam_channel::bounded::<crate::chunk::ParsedChunk>(chunk_channel_capacity);
        let (total_tx, total_rx) = crossbeam_channel::bounded::<u64>(1);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.concurrency.max(1))
            .build()
            .map_err(|_| ParseError::Canceled)?;

        let chunk_size = self.config.chunk_size;
        let safe_cut = self.config.safe_cut;
        let strict = self.config.strictness == Strictness::Strict;
        let cancellation = CancellationToken::new();

        thread::scope(|scope| -> ParseResult<Outcome> {
            let splitter_cancellation = cancellation.clone();
            let splitter_handle = scope.spawn(move || {
                let result = splitter::split(input, chunk_size, safe_cut, &chunk_tx, &splitter_cancellation);
                if let Ok(total) = result {
                    let _ = total_tx.send(total);
                }
                result
            });

            // The merger runs on its own thread, concurrently with the
            // parser pool below, instead of draining only after every chunk
            // has already been parsed — otherwise a `Strict`-mode
            // cancellation could never take effect before all the work it
            // was meant to cut short had already happened.
            let merger_cancellation = cancellation.clone();
            let merger_handle = scope.spawn(move || -> ParseResult<Vec<Diagnostic>> {
                let mut merger = Merger::new(subscriber, strict, merger_cancellation);
                for parsed in parsed_rx.iter() {
                    merger.push(parsed)?;
                    merger.check_stalled()?;
                }
                if let Ok(total) = total_rx.recv() {
                    merger.set_total_chunks(total);
                }
                merger.finish()
            });

            let pool_cancellation = cancellation.clone();
            pool.scope(|s| {
                for chunk in chunk_rx.iter() {
                    if pool_cancellation.is_cancelled() {
                        break;
                    }
                    let parsed_tx = parsed_tx.clone();
                    s.spawn(move |_| {
                        let parsed = parse_chunk(&chunk);
                        let _ = parsed_tx.send(parsed);
                    });
                }
            });
            drop(parsed_tx);

            let total_chunks = splitter_handle.join().map_err(|_| ParseError::Canceled)?;
            let diagnostics = merger_handle.join().map_err(|_| ParseError::Canceled)?;

            // Surface whichever side actually failed; a cancellation caused
            // by the other side's fatal error takes priority over the
            // `Canceled` error the cancelled side reports for itself.
            let diagnostics = match diagnostics {
                Err(err) => return Err(err),
                Ok(diagnostics) => diagnostics,
            };
            let total_chunks = total_chunks?;

            log::info!(
                "parse run finished: {total_chunks} chunks, {} diagnostics",
                diagnostics.len()
            );
            Ok(Outcome { diagnostics })
        })
    }
}

/// Parse `input` with default tuning and collect every produced element
/// into a single in-memory `Vec`, for callers who don't need streaming
/// output. Intended for tests and small inputs; large documents should use
/// [`Parser::run`] with a streaming [`Subscriber`] instead.
pub fn parse_all<R: Read + Send>(
    input: R,
    config: Config,
) -> ParseResult<(Vec<crate::element::Element>, Vec<Diagnostic>)> {
    use std::sync::{Arc, Mutex};

    let collected = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let collected = Arc::clone(&collected);
        move |el: crate::element::Element| {
            collected.lock().unwrap().push(el);
        }
    };

    let parser = Parser::new(config);
    let outcome = parser.run(input, sink)?;
    let elements = Arc::try_unwrap(collected)
        .map(|m| m.into_inner().unwrap())
        .unwrap_or_default();
    Ok((elements, outcome.diagnostics))
}
