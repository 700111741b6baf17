use anyhow::{bail, Context, Result};
use clap::Parser;
use crawldex_core::persist::{load_meta, OutputFormat, SegmentPaths, DEFAULT_FIXED_WIDTH};
use crawldex_core::postings::PostingsEncoding;
use crawldex_core::reader::{read_sorted_dictionary, read_trie};
use crawler::config::{default_process_workers, DEFAULT_FETCH_WORKERS, DEFAULT_USER_AGENT};
use crawler::{parse_seeds, CrawlConfig, Crawler, HttpFetcher};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "crawldex")]
#[command(about = "Crawl from seed URLs and write an inverted index segment")]
struct Cli {
    /// Comma separated seed URLs
    #[arg(long, env = "SEED_URLS", value_delimiter = ',')]
    seeds: Vec<String>,
    /// File with seed URLs, one per line
    #[arg(long)]
    seeds_file: Option<PathBuf>,
    /// Concurrent fetch workers
    #[arg(long, env = "FETCH_WORKERS", default_value_t = DEFAULT_FETCH_WORKERS)]
    fetch_workers: usize,
    /// Process workers (defaults to the number of CPUs)
    #[arg(long)]
    process_workers: Option<usize>,
    /// How long to wait for workers after the crawl goes idle
    #[arg(long, env = "SHUTDOWN_WAIT_SECS", default_value_t = 120)]
    shutdown_wait_secs: u64,
    /// Output directory
    #[arg(long, env = "SEGMENT_DIR", default_value = "./segment")]
    output: PathBuf,
    /// Postings encoding: fixed | compact
    #[arg(long, env = "POSTINGS_ENCODING", default_value_t = PostingsEncoding::Compact)]
    encoding: PostingsEncoding,
    /// Output layout: segment | flat | text
    #[arg(long, default_value_t = OutputFormat::Segment)]
    format: OutputFormat,
    /// Byte width of the fixed-width token dictionary
    #[arg(long, default_value_t = DEFAULT_FIXED_WIDTH)]
    fixed_width: usize,
    /// Only follow links that stay on the page's host
    #[arg(long, default_value_t = false)]
    same_host_only: bool,
    /// Request timeout seconds
    #[arg(long, default_value_t = 12)]
    timeout_secs: u64,
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    user_agent: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Cli::parse();

    let mut lines = args.seeds.clone();
    if let Some(path) = &args.seeds_file {
        let text = fs::read_to_string(path).with_context(|| format!("reading seeds file {}", path.display()))?;
        lines.extend(text.lines().map(str::to_string));
    }
    let seeds = parse_seeds(lines.iter().map(String::as_str))?;

    let config = CrawlConfig {
        seeds,
        fetch_workers: args.fetch_workers,
        process_workers: args.process_workers.unwrap_or_else(default_process_workers),
        shutdown_timeout: Duration::from_secs(args.shutdown_wait_secs),
        same_host_only: args.same_host_only,
        request_timeout: Duration::from_secs(args.timeout_secs),
        user_agent: args.user_agent.clone(),
        ..CrawlConfig::default()
    };
    let fetcher = HttpFetcher::new(&config.user_agent, config.request_timeout)?;
    let crawler = Crawler::new(config, fetcher)?;

    let stop = crawler.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("received Ctrl+C, stopping crawl and writing what was indexed");
            stop.stop();
        }
    });

    let started = Instant::now();
    let output = crawler.run().await?;
    info!(
        docs = output.dictionary.len(),
        tokens = output.index.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        interrupted = output.interrupted,
        "crawl complete, writing {} index to {}",
        args.format,
        args.output.display()
    );

    let writer = args.format.writer(args.encoding, args.fixed_width);
    let summary = writer
        .write(&output.index, &output.dictionary, &args.output)
        .with_context(|| format!("writing index to {}", args.output.display()))?;
    info!(
        docs = summary.num_docs,
        tokens = summary.num_tokens,
        bytes = summary.bytes_written,
        skipped_fixed_width = summary.skipped_fixed_width,
        "index written"
    );

    if args.format == OutputFormat::Segment {
        verify_segment(&args.output)?;
    }
    Ok(())
}

/// Re-reads the trie and sorted dictionary and checks they agree on every offset.
fn verify_segment(dir: &Path) -> Result<()> {
    let paths = SegmentPaths::new(dir);
    let meta = load_meta(&paths)?;
    let dictionary = read_sorted_dictionary(&fs::read(paths.token_dict())?)?;
    let trie = read_trie(&fs::read(paths.token_dict_trie())?)?;
    let mismatched = dictionary.iter().filter(|(token, offset)| trie.lookup(token.as_str()) != Some(*offset)).count();
    if mismatched > 0 {
        bail!("{mismatched} tokens resolve differently in the trie and the sorted dictionary");
    }
    info!(docs = meta.num_docs, tokens = meta.num_tokens, encoding = %meta.postings_encoding, "segment verified");
    Ok(())
}
