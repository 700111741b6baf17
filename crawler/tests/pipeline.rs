use async_trait::async_trait;
use crawldex_core::Address;
use crawler::{CrawlConfig, CrawlOutput, Crawler, Document, FetchError, Fetcher};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Page {
    address: Address,
    links: Vec<Address>,
    text: String,
    text_delay: Duration,
}

impl Document for Page {
    fn address(&self) -> &Address { &self.address }
    fn extract_links(&self) -> Vec<Address> { self.links.clone() }
    fn extract_text(&self) -> String {
        std::thread::sleep(self.text_delay);
        self.text.clone()
    }
}

/// Serves pages from memory. An address listed in `failures` fails that many
/// times before it is served; unknown addresses always fail.
///
/// `hanging` addresses never answer. `blocking` ones hold the worker thread
/// for the given time before answering, ignoring cancellation.
#[derive(Default)]
struct ScriptedFetcher {
    pages: HashMap<Address, (Vec<Address>, String)>,
    failures: HashMap<Address, u32>,
    hanging: HashSet<Address>,
    blocking: HashMap<Address, Duration>,
    slow_text: HashMap<Address, Duration>,
    attempts: Arc<Mutex<HashMap<Address, u32>>>,
}

impl ScriptedFetcher {
    fn page(mut self, url: &str, links: &[&str], text: &str) -> Self {
        self.pages.insert(addr(url), (links.iter().map(|l| addr(l)).collect(), text.to_string()));
        self
    }

    fn failing(mut self, url: &str, times: u32) -> Self {
        self.failures.insert(addr(url), times);
        self
    }

    fn hanging(mut self, url: &str) -> Self {
        self.hanging.insert(addr(url));
        self
    }

    fn blocking(mut self, url: &str, hold: Duration) -> Self {
        self.blocking.insert(addr(url), hold);
        self
    }

    fn slow_text(mut self, url: &str, delay: Duration) -> Self {
        self.slow_text.insert(addr(url), delay);
        self
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    type Document = Page;

    async fn fetch(&self, address: &Address) -> Result<Page, FetchError> {
        let attempt = {
            let mut attempts = self.attempts.lock();
            let n = attempts.entry(address.clone()).or_insert(0);
            *n += 1;
            *n
        };
        if self.hanging.contains(address) {
            std::future::pending::<()>().await;
        }
        if let Some(hold) = self.blocking.get(address) {
            std::thread::sleep(*hold);
        }
        if attempt <= self.failures.get(address).copied().unwrap_or(0) {
            return Err(FetchError::Status(503));
        }
        let Some((links, text)) = self.pages.get(address) else {
            return Err(FetchError::NotFound(address.to_string()));
        };
        Ok(Page {
            address: address.clone(),
            links: links.clone(),
            text: text.clone(),
            text_delay: self.slow_text.get(address).copied().unwrap_or_default(),
        })
    }
}

fn addr(url: &str) -> Address {
    Address::parse(url).unwrap()
}

fn config(seeds: &[&str]) -> CrawlConfig {
    CrawlConfig {
        fetch_workers: 8,
        process_workers: 2,
        shutdown_timeout: Duration::from_secs(5),
        ..CrawlConfig::with_seeds(seeds.iter().map(|s| addr(s)).collect())
    }
}

async fn crawl(config: CrawlConfig, fetcher: ScriptedFetcher) -> CrawlOutput {
    let crawler = Crawler::new(config, fetcher).unwrap();
    tokio::time::timeout(Duration::from_secs(30), crawler.run())
        .await
        .expect("crawl did not terminate")
        .unwrap()
}

/// Starts a crawl, waits until `url` has been requested plus `settle`, then
/// stops it. Returns the output and how long `run` took after the stop.
async fn crawl_and_stop(config: CrawlConfig, fetcher: ScriptedFetcher, url: &str, settle: Duration) -> (CrawlOutput, Duration) {
    let attempts = Arc::clone(&fetcher.attempts);
    let crawler = Crawler::new(config, fetcher).unwrap();
    let stop = crawler.stop_handle();
    let running = tokio::spawn(crawler.run());

    let target = addr(url);
    while !attempts.lock().contains_key(&target) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(settle).await;

    let stopped = Instant::now();
    stop.stop();
    let out = tokio::time::timeout(Duration::from_secs(10), running)
        .await
        .expect("crawl did not stop")
        .unwrap()
        .unwrap();
    (out, stopped.elapsed())
}

#[tokio::test(flavor = "multi_thread")]
async fn every_reachable_page_gets_exactly_one_id() {
    let fetcher = ScriptedFetcher::default()
        .page("http://a.test/", &["http://a.test/b", "http://a.test/c", "http://a.test/b#top"], "test alpha")
        .page("http://a.test/b", &["http://a.test/", "http://a.test/c", "http://a.test/c"], "test beta")
        .page("http://a.test/c", &["http://a.test/", "http://a.test/b"], "test gamma");

    let out = crawl(config(&["http://a.test/", "http://a.test/#again"]), fetcher).await;

    assert_eq!(out.dictionary.len(), 3);
    for url in ["http://a.test/", "http://a.test/b", "http://a.test/c"] {
        assert!(out.dictionary.lookup_id(&addr(url)).is_some(), "{url} missing");
    }
    assert_eq!(out.index.postings("test").unwrap().len(), 3);
    let beta = out.index.postings("beta").unwrap();
    assert_eq!(beta, vec![out.dictionary.lookup_id(&addr("http://a.test/b")).unwrap()]);
    assert_eq!(out.stats.processed as usize, out.stats.fetched as usize);
    assert_eq!(out.stats.abandoned, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn up_to_three_failures_still_index_the_page() {
    let fetcher = ScriptedFetcher::default()
        .page("http://flaky.test/", &[], "test zzz")
        .failing("http://flaky.test/", 3);
    let attempts = Arc::clone(&fetcher.attempts);

    let out = crawl(config(&["http://flaky.test/"]), fetcher).await;

    assert_eq!(out.dictionary.len(), 1);
    assert!(out.index.contains_token("zzz"));
    assert_eq!(attempts.lock()[&addr("http://flaky.test/")], 4);
    assert_eq!(out.stats.failed_attempts, 3);
    assert_eq!(out.stats.abandoned, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn more_than_three_failures_abandon_the_address() {
    let fetcher = ScriptedFetcher::default()
        .page("http://ok.test/", &["http://broken.test/"], "fine")
        .page("http://broken.test/", &[], "qqq")
        .failing("http://broken.test/", 10);
    let attempts = Arc::clone(&fetcher.attempts);

    let out = crawl(config(&["http://ok.test/"]), fetcher).await;

    assert_eq!(out.dictionary.len(), 1);
    assert!(out.dictionary.lookup_id(&addr("http://broken.test/")).is_none());
    assert!(!out.index.contains_token("qqq"));
    assert_eq!(attempts.lock()[&addr("http://broken.test/")], 4);
    assert_eq!(out.stats.abandoned, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_seeds_terminate_with_an_empty_index() {
    let out = crawl(config(&["http://gone.test/", "http://also-gone.test/"]), ScriptedFetcher::default()).await;

    assert!(out.dictionary.is_empty());
    assert!(out.index.is_empty());
    assert_eq!(out.stats.abandoned, 2);
    assert_eq!(out.stats.failed_attempts, 8);
}

#[tokio::test(flavor = "multi_thread")]
async fn same_host_only_skips_foreign_links() {
    let fetcher = ScriptedFetcher::default()
        .page("http://home.test/", &["http://home.test/about", "http://away.test/"], "home")
        .page("http://home.test/about", &[], "about")
        .page("http://away.test/", &[], "away");
    let attempts = Arc::clone(&fetcher.attempts);
    let mut config = config(&["http://home.test/"]);
    config.same_host_only = true;

    let out = crawl(config, fetcher).await;

    assert_eq!(out.dictionary.len(), 2);
    assert!(!attempts.lock().contains_key(&addr("http://away.test/")));
}

#[tokio::test(flavor = "multi_thread")]
async fn tiny_queues_do_not_stall_the_crawl() {
    let mut fetcher = ScriptedFetcher::default();
    let urls: Vec<String> = (0..50).map(|i| format!("http://wide.test/{i}")).collect();
    let links: Vec<&str> = urls.iter().map(String::as_str).collect();
    fetcher = fetcher.page("http://wide.test/", &links, "hub");
    for url in &urls {
        fetcher = fetcher.page(url, &["http://wide.test/"], "leaf");
    }
    let mut config = config(&["http://wide.test/"]);
    config.frontier_capacity = 4;
    config.document_capacity = 2;

    let out = crawl(config, fetcher).await;

    assert_eq!(out.dictionary.len(), 51);
    assert_eq!(out.index.postings("leaf").unwrap().len(), 50);
}

#[tokio::test(flavor = "multi_thread")]
async fn fan_out_with_single_slot_queues_finishes() {
    // hub -> 6 sections -> 6 articles each; every article links back up.
    let mut fetcher = ScriptedFetcher::default();
    let sections: Vec<String> = (0..6).map(|i| format!("http://fan.test/s{i}")).collect();
    let section_links: Vec<&str> = sections.iter().map(String::as_str).collect();
    fetcher = fetcher.page("http://fan.test/", &section_links, "hub");
    for (i, section) in sections.iter().enumerate() {
        let articles: Vec<String> = (0..6).map(|j| format!("http://fan.test/s{i}/a{j}")).collect();
        let article_links: Vec<&str> = articles.iter().map(String::as_str).collect();
        fetcher = fetcher.page(section, &article_links, "section");
        for article in &articles {
            fetcher = fetcher.page(article, &["http://fan.test/", section.as_str(), "http://fan.test/s0"], "article");
        }
    }
    let mut config = config(&["http://fan.test/"]);
    config.fetch_workers = 1;
    config.process_workers = 1;
    config.frontier_capacity = 1;
    config.document_capacity = 1;

    let out = crawl(config, fetcher).await;

    assert_eq!(out.dictionary.len(), 1 + 6 + 36);
    assert_eq!(out.index.postings("section").unwrap().len(), 6);
    assert_eq!(out.index.postings("articl").unwrap().len(), 36);
    assert!(!out.interrupted);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_during_a_hanging_fetch_keeps_finished_pages() {
    let fetcher = ScriptedFetcher::default()
        .page("http://stop.test/", &["http://stop.test/done", "http://stop.test/hang"], "root")
        .page("http://stop.test/done", &[], "finished")
        .page("http://stop.test/hang", &[], "never")
        .hanging("http://stop.test/hang");
    let mut config = config(&["http://stop.test/"]);
    config.shutdown_timeout = Duration::from_secs(2);

    let (out, took) = crawl_and_stop(config, fetcher, "http://stop.test/hang", Duration::from_millis(300)).await;

    assert!(out.interrupted);
    assert!(took < Duration::from_secs(2), "hanging fetch held up shutdown for {took:?}");
    assert_eq!(out.dictionary.len(), 2);
    assert!(out.index.contains_token("finish"));
    assert!(out.dictionary.lookup_id(&addr("http://stop.test/hang")).is_none());
    assert!(!out.index.contains_token("never"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fetch_worker_that_ignores_stop_is_aborted() {
    let fetcher = ScriptedFetcher::default()
        .page("http://abort.test/", &["http://abort.test/stuck"], "root")
        .page("http://abort.test/stuck", &[], "stuck")
        .blocking("http://abort.test/stuck", Duration::from_millis(1500));
    let mut config = config(&["http://abort.test/"]);
    config.shutdown_timeout = Duration::from_millis(200);

    let (out, _) = crawl_and_stop(config, fetcher, "http://abort.test/stuck", Duration::from_millis(50)).await;

    assert!(out.interrupted);
    assert_eq!(out.dictionary.len(), 1);
    assert!(out.dictionary.lookup_id(&addr("http://abort.test/")).is_some());
    assert!(!out.index.contains_token("stuck"));
}

#[tokio::test(flavor = "multi_thread")]
async fn busy_process_worker_is_detached_after_the_timeout() {
    let fetcher = ScriptedFetcher::default()
        .page("http://slow.test/", &["http://slow.test/heavy"], "root")
        .page("http://slow.test/heavy", &[], "heavy")
        .slow_text("http://slow.test/heavy", Duration::from_secs(4));
    let mut config = config(&["http://slow.test/"]);
    config.shutdown_timeout = Duration::from_millis(300);

    let (out, took) = crawl_and_stop(config, fetcher, "http://slow.test/heavy", Duration::from_millis(200)).await;

    assert!(took < Duration::from_millis(2500), "run waited {took:?} on a busy process worker");
    assert!(out.interrupted);
    assert!(out.dictionary.lookup_id(&addr("http://slow.test/")).is_some());
    assert!(out.dictionary.lookup_id(&addr("http://slow.test/heavy")).is_none());
}
