//! Work accounting for quiescence detection.
//!
//! Every unit of work is counted from the moment it is about to enter a queue
//! until it is finished, and each move between stages is a single locked
//! update. "Both queues empty and nothing in flight" is then one read of four
//! counters taken under the same lock, so a worker can never be between a
//! decrement and the matching increment when the coordinator looks.

use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineCounts {
    /// Addresses queued for fetch (including ones blocked on a full queue).
    pub frontier: usize,
    /// Fetched documents queued for processing.
    pub documents: usize,
    pub fetching: usize,
    pub processing: usize,
}

impl PipelineCounts {
    pub fn is_quiescent(&self) -> bool {
        self.frontier == 0 && self.documents == 0 && self.fetching == 0 && self.processing == 0
    }
}

#[derive(Default)]
pub struct PipelineLedger {
    counts: Mutex<PipelineCounts>,
    idle: Notify,
}

impl PipelineLedger {
    pub fn new() -> Self { Self::default() }

    fn update(&self, f: impl FnOnce(&mut PipelineCounts)) {
        let mut counts = self.counts.lock();
        f(&mut counts);
        if counts.is_quiescent() {
            // Stores a permit if the coordinator is not parked yet.
            self.idle.notify_one();
        }
    }

    /// An address is about to be pushed onto the frontier.
    pub fn enqueue(&self) { self.update(|c| c.frontier += 1) }

    /// A fetch worker took an address off the frontier.
    pub fn begin_fetch(&self) {
        self.update(|c| {
            c.frontier -= 1;
            c.fetching += 1;
        })
    }

    /// Fetch done; the document is about to be pushed for processing.
    pub fn fetch_succeeded(&self) {
        self.update(|c| {
            c.fetching -= 1;
            c.documents += 1;
        })
    }

    /// Fetch failed; the address is about to go back on the frontier.
    pub fn fetch_requeued(&self) {
        self.update(|c| {
            c.fetching -= 1;
            c.frontier += 1;
        })
    }

    /// The address was a duplicate or has been abandoned.
    pub fn fetch_dropped(&self) { self.update(|c| c.fetching -= 1) }

    pub fn begin_processing(&self) {
        self.update(|c| {
            c.documents -= 1;
            c.processing += 1;
        })
    }

    pub fn end_processing(&self) { self.update(|c| c.processing -= 1) }

    pub fn snapshot(&self) -> PipelineCounts { *self.counts.lock() }

    /// Sleeps until no work is queued or in flight.
    pub async fn wait_quiescent(&self) {
        loop {
            if self.snapshot().is_quiescent() {
                return;
            }
            self.idle.notified().await;
        }
    }
}
