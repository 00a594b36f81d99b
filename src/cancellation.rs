//! A cooperative cancellation signal shared across the splitter, the chunk
//! parser pool, and the merger. Any stage can request a stop; every other
//! stage notices it at its own next check point instead of running the
//! rest of a doomed parse to completion. Closing (dropping) the channels
//! that connect the stages is what actually unblocks a thread parked on a
//! send or receive; the flag is what tells a thread not to start more work
//! in the first place.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
