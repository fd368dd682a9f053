use indicatif::{ProgressBar, ProgressStyle};
use sitewalk_scanner::error::Result;
use sitewalk_scanner::{AssemblyMode, CancellationToken, Crawler, HttpFetcher, SiteMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

/// Options for configuring a crawl operation
pub struct CrawlOptions {
    pub urls: Vec<String>,
    pub workers: usize,
    pub fetch_timeout: Duration,
    /// Deadline for the whole run; pages still in flight when it passes are
    /// recorded as cancelled.
    pub max_duration: Option<Duration>,
    pub assembly_mode: AssemblyMode,
    pub show_progress_bars: bool,
    pub cancel: CancellationToken,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            workers: 10,
            fetch_timeout: Duration::from_secs(10),
            max_duration: None,
            assembly_mode: AssemblyMode::Cached,
            show_progress_bars: false,
            cancel: CancellationToken::new(),
        }
    }
}

/// Callback for reporting crawl progress
pub type CrawlProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Extract the path component from a URL
pub fn extract_url_path(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map(|u| {
            let path = u.path().to_string();
            if path.is_empty() || path == "/" {
                "/".to_string()
            } else {
                path
            }
        })
        .unwrap_or_else(|| url.to_string())
}

/// Crawl each seed in turn, one independent site map per seed.
///
/// Seeds that cannot be crawled (invalid addresses) are reported through the
/// progress callback and skipped.
pub async fn execute_crawl(
    options: CrawlOptions,
    progress_callback: Option<CrawlProgressCallback>,
) -> Result<Vec<SiteMap>> {
    let CrawlOptions {
        urls,
        workers,
        fetch_timeout,
        max_duration,
        assembly_mode,
        show_progress_bars,
        cancel,
    } = options;

    let progress_bar = if show_progress_bars {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message("Starting crawl...");
        Some(Arc::new(pb))
    } else {
        None
    };

    let processed_count = Arc::new(AtomicUsize::new(0));
    let pb_clone = progress_bar.clone();
    let count_clone = processed_count.clone();
    let page_callback: sitewalk_scanner::ProgressCallback =
        Arc::new(move |visited: usize, url: String| {
            count_clone.fetch_add(1, Ordering::Relaxed);
            if let Some(ref pb) = pb_clone {
                pb.set_message(format!(
                    "Crawling... {} pages visited ({})",
                    visited,
                    extract_url_path(&url)
                ));
            }
        });

    let deadline = max_duration.map(|limit| {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            warn!("Crawl deadline of {:?} reached, cancelling", limit);
            cancel.cancel();
        })
    });

    let fetcher = HttpFetcher::with_timeout(fetch_timeout.as_secs().max(1))?;

    let mut site_maps = Vec::new();
    for (idx, url_str) in urls.iter().enumerate() {
        if cancel.is_cancelled() {
            if let Some(ref callback) = progress_callback {
                callback(format!("[!]  Skipping {}: crawl cancelled", url_str));
            }
            continue;
        }

        if let Some(ref callback) = progress_callback
            && urls.len() > 1
        {
            callback(format!(
                "Crawling host {}/{}: {}",
                idx + 1,
                urls.len(),
                url_str
            ));
        }

        let crawler = Crawler::new(fetcher.clone())
            .with_workers(workers)
            .with_fetch_timeout(fetch_timeout)
            .with_assembly_mode(assembly_mode)
            .with_progress_callback(page_callback.clone())
            .with_cancellation(cancel.clone());

        match crawler.crawl(url_str).await {
            Ok(site_map) => site_maps.push(site_map),
            Err(e) => {
                warn!("Failed to crawl {}: {}", url_str, e);
                if let Some(ref callback) = progress_callback {
                    callback(format!("[!]  Failed to crawl {}: {}", url_str, e));
                }
            }
        }
    }

    if let Some(handle) = deadline {
        handle.abort();
    }

    let total = processed_count.load(Ordering::Relaxed);
    if let Some(ref pb) = progress_bar {
        pb.finish_with_message(format!("Crawl complete! {} pages visited", total));
    }
    info!(
        "Crawled {} of {} seeds, {} pages visited",
        site_maps.len(),
        urls.len(),
        total
    );

    Ok(site_maps)
}
