use crawldex_core::Address;
use std::time::Duration;

pub const DEFAULT_FETCH_WORKERS: usize = 256;
pub const DEFAULT_FRONTIER_CAPACITY: usize = 10_000;
pub const DEFAULT_DOCUMENT_CAPACITY: usize = 1_000;
/// An address is abandoned once its failure count exceeds this.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(12);
pub const DEFAULT_USER_AGENT: &str = "crawldex-bot/0.1 (+https://example.com/bot)";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no seed urls configured")]
    NoSeeds,
    #[error("invalid seed url {0:?}")]
    InvalidSeed(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub seeds: Vec<Address>,
    pub fetch_workers: usize,
    pub process_workers: usize,
    pub frontier_capacity: usize,
    pub document_capacity: usize,
    pub max_retries: u32,
    pub shutdown_timeout: Duration,
    /// Only follow links on the same host as the page they were found on.
    pub same_host_only: bool,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            fetch_workers: DEFAULT_FETCH_WORKERS,
            process_workers: default_process_workers(),
            frontier_capacity: DEFAULT_FRONTIER_CAPACITY,
            document_capacity: DEFAULT_DOCUMENT_CAPACITY,
            max_retries: DEFAULT_MAX_RETRIES,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            same_host_only: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl CrawlConfig {
    pub fn with_seeds(seeds: Vec<Address>) -> Self {
        Self { seeds, ..Self::default() }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.seeds.is_empty() {
            return Err(ConfigError::NoSeeds);
        }
        for (value, name) in [
            (self.fetch_workers, "fetch_workers"),
            (self.process_workers, "process_workers"),
            (self.frontier_capacity, "frontier_capacity"),
            (self.document_capacity, "document_capacity"),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }
        Ok(())
    }
}

pub fn default_process_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Parses seed lines: blanks and `#` comments are skipped, scheme-less hosts get
/// `https://`. Anything still unparsable is an error rather than silently dropped.
pub fn parse_seeds<'a>(lines: impl IntoIterator<Item = &'a str>) -> Result<Vec<Address>, ConfigError> {
    let mut seeds = Vec::new();
    for line in lines {
        let s = line.trim();
        if s.is_empty() || s.starts_with('#') { continue; }
        let parsed = if s.contains("://") {
            Address::parse(s)
        } else {
            Address::parse(&format!("https://{s}"))
        };
        match parsed {
            Ok(address) if !seeds.contains(&address) => seeds.push(address),
            Ok(_) => {}
            Err(e) => {
                tracing::error!(seed = s, error = %e, "rejecting seed");
                return Err(ConfigError::InvalidSeed(s.to_string()));
            }
        }
    }
    if seeds.is_empty() {
        return Err(ConfigError::NoSeeds);
    }
    Ok(seeds)
}
