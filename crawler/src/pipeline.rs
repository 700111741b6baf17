//! Crawl pipeline.
//!
//! ```text
//! seeds -> frontier -> fetch tasks -> documents -> process threads -> index
//!             ^                                        |
//!             +---------------- new links -------------+
//! ```
//!
//! Fetch workers are tokio tasks (I/O bound, many); process workers are OS
//! threads sized to the CPU count. The document queue is bounded and slows
//! fetching when processing falls behind. The frontier never blocks a pusher
//! (see [`Frontier`]), so process workers always get back to draining
//! documents and the two stages cannot wait on each other in a cycle.

use crate::config::{ConfigError, CrawlConfig};
use crate::fetch::{Document, Fetcher};
use crate::frontier::{Frontier, RetryLedger, VisitedSet};
use crate::ledger::PipelineLedger;
use anyhow::{Context, Result};
use crawldex_core::tokenizer::{tokenize_with, EnglishStemmer, TokenStemmer};
use crawldex_core::{DocIdDictionary, InvertedIndex};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

type DocumentReceiver<D> = parking_lot::Mutex<mpsc::Receiver<D>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub fetched: u64,
    pub failed_attempts: u64,
    pub abandoned: u64,
    pub duplicates_skipped: u64,
    pub processed: u64,
}

#[derive(Default)]
struct Counters {
    fetched: AtomicU64,
    failed_attempts: AtomicU64,
    abandoned: AtomicU64,
    duplicates_skipped: AtomicU64,
    processed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> CrawlStats {
        CrawlStats {
            fetched: self.fetched.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
        }
    }
}

pub struct CrawlOutput {
    pub dictionary: Arc<DocIdDictionary>,
    pub index: Arc<InvertedIndex>,
    pub stats: CrawlStats,
    /// True when the crawl was stopped through a [`StopHandle`] before it ran
    /// out of work.
    pub interrupted: bool,
}

/// Asks a running crawl to stop early. Work already indexed is kept.
#[derive(Clone)]
pub struct StopHandle(Arc<watch::Sender<bool>>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.send_replace(true);
    }
}

struct Shared<F: Fetcher> {
    config: CrawlConfig,
    fetcher: F,
    stemmer: Arc<dyn TokenStemmer>,
    dictionary: Arc<DocIdDictionary>,
    index: Arc<InvertedIndex>,
    frontier: Frontier,
    visited: VisitedSet,
    retries: RetryLedger,
    ledger: PipelineLedger,
    counters: Counters,
}

pub struct Crawler<F: Fetcher> {
    shared: Arc<Shared<F>>,
    cancel: Arc<watch::Sender<bool>>,
}

impl<F: Fetcher> Crawler<F> {
    pub fn new(config: CrawlConfig, fetcher: F) -> Result<Self, ConfigError> {
        Self::with_stemmer(config, fetcher, Arc::new(EnglishStemmer::default()))
    }

    pub fn with_stemmer(config: CrawlConfig, fetcher: F, stemmer: Arc<dyn TokenStemmer>) -> Result<Self, ConfigError> {
        config.validate()?;
        let shared = Shared {
            frontier: Frontier::new(config.frontier_capacity),
            config,
            fetcher,
            stemmer,
            dictionary: Arc::new(DocIdDictionary::new()),
            index: Arc::new(InvertedIndex::new()),
            visited: VisitedSet::new(),
            retries: RetryLedger::new(),
            ledger: PipelineLedger::new(),
            counters: Counters::default(),
        };
        let (cancel, _) = watch::channel(false);
        Ok(Self { shared: Arc::new(shared), cancel: Arc::new(cancel) })
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.cancel))
    }

    /// Crawls until no work is queued or in flight (or a stop is requested),
    /// then stops the workers and hands back the dictionary and index.
    pub async fn run(self) -> Result<CrawlOutput> {
        let Self { shared, cancel } = self;
        let config = &shared.config;
        let started = Instant::now();

        let (doc_tx, doc_rx) = mpsc::channel::<F::Document>(config.document_capacity);
        let doc_rx: Arc<DocumentReceiver<F::Document>> = Arc::new(parking_lot::Mutex::new(doc_rx));
        let cancel_rx = cancel.subscribe();

        info!(
            seeds = config.seeds.len(),
            fetch_workers = config.fetch_workers,
            process_workers = config.process_workers,
            frontier_capacity = config.frontier_capacity,
            document_capacity = config.document_capacity,
            "starting crawl"
        );

        let mut processors: Vec<JoinHandle<()>> = Vec::with_capacity(config.process_workers);
        for i in 0..config.process_workers {
            let shared = Arc::clone(&shared);
            let doc_rx = Arc::clone(&doc_rx);
            let cancel = cancel_rx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("process-{i}"))
                .spawn(move || process_loop(&shared, &doc_rx, &cancel))
                .context("spawning process worker")?;
            processors.push(handle);
        }
        drop(doc_rx);

        let mut fetchers = JoinSet::new();
        for _ in 0..config.fetch_workers {
            fetchers.spawn(fetch_loop(Arc::clone(&shared), doc_tx.clone(), cancel_rx.clone()));
        }
        // From here only fetch tasks can produce documents; once they are gone
        // the document queue closes and the process threads drain out.
        drop(doc_tx);

        for seed in &config.seeds {
            shared.ledger.enqueue();
            shared.frontier.push(seed.clone());
        }

        let mut stop_rx = cancel_rx.clone();
        let interrupted = tokio::select! {
            _ = shared.ledger.wait_quiescent() => {
                info!(elapsed_ms = started.elapsed().as_millis() as u64, "crawl quiescent, stopping workers");
                false
            }
            _ = cancelled(&mut stop_rx) => {
                warn!(pipeline = ?shared.ledger.snapshot(), "stop requested, abandoning queued work");
                true
            }
        };

        cancel.send_replace(true);
        let drained = tokio::time::timeout(config.shutdown_timeout, async {
            while let Some(res) = fetchers.join_next().await {
                if let Err(e) = res {
                    error!(error = %e, "fetch worker failed");
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(remaining = fetchers.len(), "fetch workers did not stop in time, aborting");
            fetchers.abort_all();
            while fetchers.join_next().await.is_some() {}
        }

        let joined = tokio::time::timeout(
            config.shutdown_timeout,
            tokio::task::spawn_blocking(move || {
                for handle in processors {
                    if handle.join().is_err() {
                        error!("process worker panicked");
                    }
                }
            }),
        )
        .await;
        if joined.is_err() {
            warn!("process workers did not stop in time, detaching");
        }

        let stats = shared.counters.snapshot();
        info!(
            docs = shared.dictionary.len(),
            tokens = shared.index.len(),
            fetched = stats.fetched,
            failed_attempts = stats.failed_attempts,
            abandoned = stats.abandoned,
            duplicates_skipped = stats.duplicates_skipped,
            visited = shared.visited.len(),
            interrupted,
            "crawl finished"
        );
        Ok(CrawlOutput {
            dictionary: Arc::clone(&shared.dictionary),
            index: Arc::clone(&shared.index),
            stats,
            interrupted,
        })
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    // An error means the sender is gone, which is as good as a stop request.
    let _ = cancel.wait_for(|stop| *stop).await;
}

async fn fetch_loop<F: Fetcher>(
    shared: Arc<Shared<F>>,
    doc_tx: mpsc::Sender<F::Document>,
    mut cancel: watch::Receiver<bool>,
) {
    loop {
        let address = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => break,
            address = shared.frontier.pop() => address,
        };
        shared.ledger.begin_fetch();

        if shared.visited.contains(&address) {
            debug!(%address, "already visited, skipping");
            shared.counters.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
            shared.ledger.fetch_dropped();
            continue;
        }

        debug!(%address, "fetching");
        let result = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => break,
            result = shared.fetcher.fetch(&address) => result,
        };

        match result {
            Ok(document) => {
                shared.counters.fetched.fetch_add(1, Ordering::Relaxed);
                shared.ledger.fetch_succeeded();
                // Waits while the document queue is full.
                let sent = tokio::select! {
                    biased;
                    _ = cancelled(&mut cancel) => false,
                    res = doc_tx.send(document) => res.is_ok(),
                };
                if !sent { break; }
                shared.visited.insert(address);
            }
            Err(e) => {
                shared.counters.failed_attempts.fetch_add(1, Ordering::Relaxed);
                let failures = shared.retries.record_failure(&address);
                if failures > shared.config.max_retries {
                    warn!(%address, failures, error = %e, "giving up on address");
                    shared.counters.abandoned.fetch_add(1, Ordering::Relaxed);
                    shared.visited.insert(address);
                    shared.ledger.fetch_dropped();
                    continue;
                }
                warn!(%address, failures, error = %e, "fetch failed, requeueing");
                shared.ledger.fetch_requeued();
                shared.frontier.push(address);
            }
        }
    }
}

fn process_loop<F: Fetcher>(shared: &Shared<F>, doc_rx: &DocumentReceiver<F::Document>, cancel: &watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() { break; }
        // Blocks until a document arrives or every fetch task has exited.
        let next = doc_rx.lock().blocking_recv();
        let Some(document) = next else { break };
        shared.ledger.begin_processing();
        shared.process(&document);
        shared.ledger.end_processing();
    }
}

impl<F: Fetcher> Shared<F> {
    fn process(&self, document: &F::Document) {
        let address = document.address();

        let page_host = address.host();
        let mut seen = HashSet::new();
        let mut enqueued = 0usize;
        for link in document.extract_links() {
            if self.visited.contains(&link) || !seen.insert(link.clone()) { continue; }
            if self.config.same_host_only && link.host() != page_host { continue; }
            self.ledger.enqueue();
            self.frontier.push(link);
            enqueued += 1;
        }

        let tokens = tokenize_with(&document.extract_text(), &*self.stemmer);
        let doc_id = self.dictionary.assign_id_if_absent(address);
        self.index.add_document(doc_id, &tokens);

        let processed = self.counters.processed.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(%address, doc_id, tokens = tokens.len(), links = enqueued, "processed document");
        if processed % 100 == 0 {
            info!(
                processed,
                docs = self.dictionary.len(),
                visited = self.visited.len(),
                frontier_overflow = self.frontier.overflow_len(),
                pipeline = ?self.ledger.snapshot(),
                "progress"
            );
        }
    }
}
