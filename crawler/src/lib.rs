pub mod config;
pub mod fetch;
pub mod frontier;
pub mod ledger;
pub mod pipeline;

pub use config::{parse_seeds, ConfigError, CrawlConfig};
pub use fetch::{Document, FetchError, Fetcher, HtmlDocument, HttpFetcher};
pub use frontier::Frontier;
pub use pipeline::{CrawlOutput, CrawlStats, Crawler, StopHandle};
