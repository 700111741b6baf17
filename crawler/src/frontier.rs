use crawldex_core::Address;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};

/// Addresses waiting to be fetched.
///
/// The first `capacity` addresses sit in a bounded channel; anything pushed
/// while it is full spills into an overflow list that fetch workers drain
/// first. Pushing never blocks, so a process worker can always hand off its
/// links and go back to draining the document queue.
pub struct Frontier {
    tx: mpsc::Sender<Address>,
    rx: tokio::sync::Mutex<mpsc::Receiver<Address>>,
    overflow: Mutex<VecDeque<Address>>,
    spilled: Notify,
}

impl Frontier {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            overflow: Mutex::new(VecDeque::new()),
            spilled: Notify::new(),
        }
    }

    /// Callable from async tasks and plain threads alike.
    pub fn push(&self, address: Address) {
        match self.tx.try_send(address) {
            Ok(()) => {}
            // The receiver lives in `self`, so the channel never closes while
            // a push can still happen.
            Err(TrySendError::Full(address) | TrySendError::Closed(address)) => {
                self.overflow.lock().push_back(address);
                self.spilled.notify_one();
            }
        }
    }

    /// Waits for the next address, preferring spilled ones.
    pub async fn pop(&self) -> Address {
        loop {
            if let Some(address) = self.overflow.lock().pop_front() {
                return address;
            }
            let mut rx = tokio::select! {
                rx = self.rx.lock() => rx,
                _ = self.spilled.notified() => continue,
            };
            tokio::select! {
                next = rx.recv() => {
                    if let Some(address) = next {
                        return address;
                    }
                }
                _ = self.spilled.notified() => {}
            }
        }
    }

    pub fn overflow_len(&self) -> usize { self.overflow.lock().len() }
}

/// Addresses that were fetched successfully or given up on. Once an address is
/// here it is never enqueued again.
#[derive(Default)]
pub struct VisitedSet {
    inner: RwLock<HashSet<Address>>,
}

impl VisitedSet {
    pub fn new() -> Self { Self::default() }

    pub fn contains(&self, address: &Address) -> bool { self.inner.read().contains(address) }

    /// Returns true if the address was not visited before.
    pub fn insert(&self, address: Address) -> bool { self.inner.write().insert(address) }

    pub fn len(&self) -> usize { self.inner.read().len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

/// Per-address fetch failure counts.
#[derive(Default)]
pub struct RetryLedger {
    failures: Mutex<HashMap<Address, u32>>,
}

impl RetryLedger {
    pub fn new() -> Self { Self::default() }

    /// Increments and returns the failure count; the read and the write happen
    /// under one lock so concurrent failures are never lost.
    pub fn record_failure(&self, address: &Address) -> u32 {
        let mut failures = self.failures.lock();
        let count = failures.entry(address.clone()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn failures(&self, address: &Address) -> u32 {
        self.failures.lock().get(address).copied().unwrap_or(0)
    }
}
