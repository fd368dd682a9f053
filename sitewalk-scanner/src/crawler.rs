use crate::error::{Result, ScanError};
use crate::fetcher::{FetchedPage, PageFetcher};
use crate::frontier::{Frontier, TraversalState};
use crate::link::{domain_of, outbound_links};
use crate::result::PageResult;
use crate::sitemap::SiteMap;
use futures::stream::{self, FuturesUnordered, StreamExt};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Called after each visited page with the number of pages visited so far.
pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;

/// How the site map is built once traversal finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AssemblyMode {
    /// Reuse the title and links captured while traversing.
    #[default]
    Cached,
    /// Fetch title and links again for every visited page.
    Refetch,
}

/// Visited pages of one finished (or cancelled) traversal.
#[derive(Debug, Clone)]
pub struct Traversal {
    pub seed: String,
    pub domain: String,
    pub pages: HashMap<String, PageResult>,
    pub cancelled: bool,
}

impl Traversal {
    pub fn visited(&self) -> HashSet<String> {
        self.pages.keys().cloned().collect()
    }
}

enum Event {
    Completed(String, Result<FetchedPage>),
    Cancelled,
    Idle,
}

pub struct Crawler<F> {
    fetcher: F,
    workers: usize,
    fetch_timeout: Duration,
    assembly_mode: AssemblyMode,
    progress_callback: Option<ProgressCallback>,
    cancel: CancellationToken,
}

impl<F: PageFetcher> Crawler<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            workers: 10,
            fetch_timeout: Duration::from_secs(10),
            assembly_mode: AssemblyMode::default(),
            progress_callback: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_assembly_mode(mut self, mode: AssemblyMode) -> Self {
        self.assembly_mode = mode;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Crawl every page reachable from `seed` inside its domain and build the
    /// site map.
    pub async fn crawl(&self, seed: &str) -> Result<SiteMap> {
        let traversal = self.traverse(seed).await?;

        let site_map = match self.assembly_mode {
            AssemblyMode::Cached => SiteMap::from_traversal(traversal),
            AssemblyMode::Refetch => self.refetch(traversal).await,
        };

        info!(
            "Site map for {} complete: {} pages, {} failed",
            site_map.domain,
            site_map.len(),
            site_map.failed_pages().count()
        );
        Ok(site_map)
    }

    /// Walk the domain from `seed`, fetching each discovered address once.
    ///
    /// Only an invalid seed is an error. Failed fetches are recorded against
    /// their address and the walk continues.
    pub async fn traverse(&self, seed: &str) -> Result<Traversal> {
        let seed = seed.trim();
        let domain = domain_of(seed)?;
        info!(
            "Starting crawl of {} (domain {}) with {} workers",
            seed, domain, self.workers
        );

        let mut frontier = Frontier::new(seed);
        let mut pages = HashMap::new();
        let mut cancelled = false;

        let mut in_flight = FuturesUnordered::new();
        while frontier.state() == TraversalState::Exploring {
            while in_flight.len() < self.workers {
                let Some(address) = frontier.claim_next() else {
                    break;
                };
                debug!("Dispatching {}", address);
                in_flight.push(self.visit(address));
            }

            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Event::Cancelled,
                next = in_flight.next() => match next {
                    Some((address, outcome)) => Event::Completed(address, outcome),
                    None => Event::Idle,
                },
            };

            match event {
                Event::Completed(address, outcome) => {
                    let result = match outcome {
                        Ok(page) => {
                            let links = outbound_links(&domain, &address, &page.links);
                            for link in &links {
                                if frontier.discover(link.clone()) {
                                    debug!("Discovered {}", link);
                                }
                            }
                            PageResult::fetched(page.title, links)
                        }
                        Err(e) => {
                            warn!("Fetch failed for {}: {}", address, e);
                            PageResult::failed(&e)
                        }
                    };
                    frontier.mark_visited(&address);
                    pages.insert(address.clone(), result);

                    if let Some(ref callback) = self.progress_callback {
                        callback(frontier.visited().len(), address);
                    }
                }
                Event::Cancelled => {
                    warn!(
                        "Crawl of {} cancelled with {} fetches in flight",
                        domain,
                        frontier.in_flight_count()
                    );
                    cancelled = true;
                    break;
                }
                Event::Idle => break,
            }
        }
        drop(in_flight);

        for address in frontier.drain_in_flight() {
            frontier.mark_visited(&address);
            pages.insert(address, PageResult::cancelled());
        }

        info!(
            "Crawl of {} visited {} of {} known pages",
            domain,
            frontier.visited().len(),
            frontier.known().len()
        );

        Ok(Traversal {
            seed: seed.to_string(),
            domain,
            pages,
            cancelled,
        })
    }

    fn visit(&self, address: String) -> impl Future<Output = (String, Result<FetchedPage>)> {
        async move {
            let outcome = match self.assembly_mode {
                AssemblyMode::Cached => self.bounded(self.fetcher.fetch_page(&address)).await,
                AssemblyMode::Refetch => self
                    .bounded(self.fetcher.fetch_links(&address))
                    .await
                    .map(|links| FetchedPage { title: None, links }),
            };
            (address, outcome)
        }
    }

    /// Build the site map by fetching title and links again for every
    /// visited page.
    ///
    /// A cancelled crawl keeps its traversal results as they are. Pages whose
    /// re-fetch is cancelled fall back to what traversal recorded.
    async fn refetch(&self, traversal: Traversal) -> SiteMap {
        if traversal.cancelled || self.cancel.is_cancelled() {
            debug!("Crawl of {} was cancelled, skipping re-fetch", traversal.domain);
            return SiteMap::from_pages(traversal.seed, traversal.domain, traversal.pages, false);
        }

        let Traversal {
            seed,
            domain,
            pages,
            ..
        } = traversal;
        debug!("Re-fetching {} pages for the site map", pages.len());

        let refetched: Vec<(String, PageResult)> = stream::iter(pages)
            .map(|(address, traversed)| self.refetch_page(&domain, address, traversed))
            .buffer_unordered(self.workers)
            .collect()
            .await;

        SiteMap::from_pages(seed, domain, refetched, !self.cancel.is_cancelled())
    }

    async fn refetch_page(
        &self,
        domain: &str,
        address: String,
        traversed: PageResult,
    ) -> (String, PageResult) {
        let fetched = async {
            let title = self.guarded(self.fetcher.fetch_title(&address)).await?;
            let links = self.guarded(self.fetcher.fetch_links(&address)).await?;
            Ok::<_, ScanError>(PageResult::fetched(
                title,
                outbound_links(domain, &address, &links),
            ))
        };

        let result = match fetched.await {
            Ok(result) => result,
            Err(ScanError::Cancelled) => traversed,
            Err(e) => {
                warn!("Re-fetch failed for {}: {}", address, e);
                PageResult::failed(&e)
            }
        };
        (address, result)
    }

    async fn bounded<T>(&self, fetch: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.fetch_timeout, fetch)
            .await
            .unwrap_or_else(|_| Err(ScanError::Timeout(self.fetch_timeout)))
    }

    async fn guarded<T>(&self, fetch: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ScanError::Cancelled),
            result = self.bounded(fetch) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::PageStatus;
    use std::sync::Mutex;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    #[derive(Clone)]
    enum MockPage {
        Html(Option<&'static str>, Vec<String>),
        Broken,
        Slow(Duration),
    }

    /// In-memory link graph that counts every call per address.
    #[derive(Default)]
    struct GraphFetcher {
        pages: HashMap<String, MockPage>,
        link_calls: Mutex<HashMap<String, usize>>,
        title_calls: Mutex<HashMap<String, usize>>,
    }

    impl GraphFetcher {
        fn page(mut self, address: &str, page: MockPage) -> Self {
            self.pages.insert(address.to_string(), page);
            self
        }

        fn link_calls(&self, address: &str) -> usize {
            *self.link_calls.lock().unwrap().get(address).unwrap_or(&0)
        }

        fn total_link_calls(&self) -> usize {
            self.link_calls.lock().unwrap().values().sum()
        }

        async fn lookup(&self, address: &str) -> Result<(Option<String>, HashSet<String>)> {
            match self.pages.get(address).cloned() {
                Some(MockPage::Html(title, links)) => {
                    Ok((title.map(str::to_string), links.into_iter().collect()))
                }
                Some(MockPage::Slow(delay)) => {
                    tokio::time::sleep(delay).await;
                    Ok((Some("slow".to_string()), HashSet::new()))
                }
                Some(MockPage::Broken) => Err(ScanError::Other(format!("broken: {}", address))),
                None => Err(ScanError::HttpStatus {
                    url: address.to_string(),
                    status: 404,
                }),
            }
        }
    }

    impl PageFetcher for GraphFetcher {
        async fn fetch_title(&self, address: &str) -> Result<Option<String>> {
            *self
                .title_calls
                .lock()
                .unwrap()
                .entry(address.to_string())
                .or_insert(0) += 1;
            Ok(self.lookup(address).await?.0)
        }

        async fn fetch_links(&self, address: &str) -> Result<HashSet<String>> {
            *self
                .link_calls
                .lock()
                .unwrap()
                .entry(address.to_string())
                .or_insert(0) += 1;
            Ok(self.lookup(address).await?.1)
        }
    }

    fn html(title: Option<&'static str>, links: &[&str]) -> MockPage {
        MockPage::Html(title, links.iter().map(|link| link.to_string()).collect())
    }

    fn two_page_site() -> GraphFetcher {
        GraphFetcher::default()
            .page(
                "http://x.test/",
                html(Some("Home"), &["/a.html", "http://other.test/"]),
            )
            .page(
                "http://x.test/a.html",
                html(Some("A"), &["/", "/a.html#section"]),
            )
    }

    fn set(addresses: &[&str]) -> HashSet<String> {
        addresses.iter().map(|a| a.to_string()).collect()
    }

    #[tokio::test]
    async fn test_two_page_site_excludes_cross_domain_and_anchor_links() {
        let crawler = Crawler::new(two_page_site());

        let traversal = crawler.traverse("http://x.test/").await.unwrap();
        assert_eq!(
            traversal.visited(),
            set(&["http://x.test/", "http://x.test/a.html"])
        );
        assert!(!traversal.cancelled);

        let site_map = crawler.crawl("http://x.test/").await.unwrap();
        let root = site_map.get("http://x.test/").unwrap();
        assert_eq!(root.title.as_deref(), Some("Home"));
        assert_eq!(
            root.links.iter().collect::<Vec<_>>(),
            vec!["http://x.test/a.html"]
        );

        let a = site_map.get("http://x.test/a.html").unwrap();
        assert_eq!(a.title.as_deref(), Some("A"));
        assert_eq!(a.links.iter().collect::<Vec<_>>(), vec!["http://x.test/"]);
    }

    #[tokio::test]
    async fn test_failed_page_is_visited_with_degraded_result() {
        let fetcher = GraphFetcher::default()
            .page(
                "http://x.test/",
                html(Some("Home"), &["/broken", "/ok"]),
            )
            .page("http://x.test/broken", MockPage::Broken)
            .page("http://x.test/ok", html(None, &["/deeper"]))
            .page("http://x.test/deeper", html(Some("Deep"), &[]));

        let site_map = Crawler::new(fetcher).crawl("http://x.test/").await.unwrap();

        assert_eq!(site_map.len(), 4);
        assert!(site_map.complete);

        let broken = site_map.get("http://x.test/broken").unwrap();
        assert_eq!(broken.title, None);
        assert!(broken.links.is_empty());
        assert!(matches!(broken.status, PageStatus::Failed(_)));

        // Fetched without a title is distinct from a failure
        let ok = site_map.get("http://x.test/ok").unwrap();
        assert_eq!(ok.title, None);
        assert!(ok.is_fetched());

        assert!(site_map.get("http://x.test/deeper").unwrap().is_fetched());
    }

    #[tokio::test]
    async fn test_failed_seed_completes_gracefully() {
        let fetcher = GraphFetcher::default().page("http://x.test/", MockPage::Broken);

        let site_map = Crawler::new(fetcher).crawl("http://x.test/").await.unwrap();

        assert_eq!(site_map.len(), 1);
        assert!(site_map.complete);
        assert!(!site_map.get("http://x.test/").unwrap().is_fetched());
    }

    #[tokio::test]
    async fn test_invalid_seed_fails_before_fetching() {
        let crawler = Crawler::new(GraphFetcher::default());

        let result = crawler.crawl("not a url").await;
        assert!(matches!(result, Err(ScanError::InvalidUrl(_))));
        assert_eq!(crawler.fetcher().total_link_calls(), 0);
    }

    #[tokio::test]
    async fn test_each_address_fetched_once_under_concurrency() {
        // Every page links to every other page
        let addresses: Vec<String> = (0..30).map(|i| format!("/p{}", i)).collect();
        let mut links = addresses.clone();
        links.push("/".to_string());

        let mut fetcher = GraphFetcher::default().page(
            "http://x.test/",
            MockPage::Html(Some("Home"), links.clone()),
        );
        for address in &addresses {
            fetcher = fetcher.page(
                &format!("http://x.test{}", address),
                MockPage::Html(None, links.clone()),
            );
        }

        let crawler = Crawler::new(fetcher).with_workers(8);
        let site_map = crawler.crawl("http://x.test/").await.unwrap();

        assert_eq!(site_map.len(), 31);
        for address in site_map.addresses() {
            assert_eq!(crawler.fetcher().link_calls(address), 1, "{}", address);
        }
        assert_eq!(crawler.fetcher().total_link_calls(), 31);
    }

    #[tokio::test]
    async fn test_cycles_terminate_with_single_worker() {
        let fetcher = GraphFetcher::default()
            .page("http://x.test/", html(None, &["/a"]))
            .page("http://x.test/a", html(None, &["/b", "/"]))
            .page("http://x.test/b", html(None, &["/a", "/"]));

        let traversal = Crawler::new(fetcher)
            .with_workers(1)
            .traverse("http://x.test/")
            .await
            .unwrap();

        assert_eq!(
            traversal.visited(),
            set(&["http://x.test/", "http://x.test/a", "http://x.test/b"])
        );
    }

    #[tokio::test]
    async fn test_refetch_mode_fetches_every_page_again() {
        let crawler = Crawler::new(two_page_site()).with_assembly_mode(AssemblyMode::Refetch);

        let site_map = crawler.crawl("http://x.test/").await.unwrap();

        assert_eq!(site_map.len(), 2);
        assert_eq!(
            site_map.get("http://x.test/a.html").unwrap().title.as_deref(),
            Some("A")
        );
        assert_eq!(crawler.fetcher().link_calls("http://x.test/"), 2);
        assert_eq!(crawler.fetcher().link_calls("http://x.test/a.html"), 2);
        assert_eq!(
            crawler.fetcher().title_calls.lock().unwrap().values().sum::<usize>(),
            2
        );
    }

    #[tokio::test]
    async fn test_cached_mode_matches_refetch_mode() {
        let cached = Crawler::new(two_page_site())
            .crawl("http://x.test/")
            .await
            .unwrap();
        let refetched = Crawler::new(two_page_site())
            .with_assembly_mode(AssemblyMode::Refetch)
            .crawl("http://x.test/")
            .await
            .unwrap();

        assert_eq!(cached, refetched);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_times_out_and_crawl_continues() {
        let fetcher = GraphFetcher::default()
            .page("http://x.test/", html(None, &["/slow", "/fast"]))
            .page("http://x.test/slow", MockPage::Slow(Duration::from_secs(60)))
            .page("http://x.test/fast", html(Some("Fast"), &[]));

        let site_map = Crawler::new(fetcher)
            .with_fetch_timeout(Duration::from_secs(1))
            .crawl("http://x.test/")
            .await
            .unwrap();

        assert_eq!(site_map.len(), 3);
        assert!(site_map.complete);
        assert!(matches!(
            site_map.get("http://x.test/slow").unwrap().status,
            PageStatus::Failed(_)
        ));
        assert!(site_map.get("http://x.test/fast").unwrap().is_fetched());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_marks_in_flight_pages() {
        let fetcher = GraphFetcher::default()
            .page("http://x.test/", html(None, &["/slow", "/fast"]))
            .page("http://x.test/slow", MockPage::Slow(Duration::from_secs(60)))
            .page("http://x.test/fast", html(None, &[]));

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            canceller.cancel();
        });

        let site_map = Crawler::new(fetcher)
            .with_fetch_timeout(Duration::from_secs(120))
            .with_cancellation(token)
            .crawl("http://x.test/")
            .await
            .unwrap();

        assert!(!site_map.complete);
        assert_eq!(site_map.len(), 3);
        assert_eq!(
            site_map.get("http://x.test/slow").unwrap().status,
            PageStatus::Cancelled
        );
        assert!(site_map.get("http://x.test/fast").unwrap().is_fetched());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_refetch_keeps_traversal_results() {
        let fetcher = GraphFetcher::default()
            .page("http://x.test/", html(Some("Home"), &["/slow", "/fast"]))
            .page("http://x.test/slow", MockPage::Slow(Duration::from_secs(60)))
            .page("http://x.test/fast", html(Some("Fast"), &[]));

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            canceller.cancel();
        });

        let crawler = Crawler::new(fetcher)
            .with_fetch_timeout(Duration::from_secs(120))
            .with_assembly_mode(AssemblyMode::Refetch)
            .with_cancellation(token);
        let site_map = crawler.crawl("http://x.test/").await.unwrap();

        assert!(!site_map.complete);
        assert_eq!(site_map.len(), 3);

        let root = site_map.get("http://x.test/").unwrap();
        assert!(root.is_fetched());
        assert_eq!(
            root.links.iter().collect::<Vec<_>>(),
            vec!["http://x.test/fast", "http://x.test/slow"]
        );
        assert!(site_map.get("http://x.test/fast").unwrap().is_fetched());
        assert_eq!(
            site_map.get("http://x.test/slow").unwrap().status,
            PageStatus::Cancelled
        );

        // No second pass once the crawl is cancelled
        assert_eq!(crawler.fetcher().link_calls("http://x.test/"), 1);
        assert!(crawler.fetcher().title_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_progress_callback_reports_each_page() {
        let reported: Arc<Mutex<Vec<(usize, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let reported_clone = reported.clone();

        let crawler = Crawler::new(two_page_site()).with_progress_callback(Arc::new(
            move |count, address| {
                reported_clone.lock().unwrap().push((count, address));
            },
        ));
        crawler.crawl("http://x.test/").await.unwrap();

        let reported = reported.lock().unwrap();
        assert_eq!(reported.len(), 2);
        assert_eq!(reported[1].0, 2);
    }

    #[tokio::test]
    async fn test_http_crawl_end_to_end() {
        let mock_server = MockServer::start().await;

        let root_html = r#"<html><head><title>Root</title></head><body>
                <a href="/page1">Page 1</a>
                <a href="/page2">Page 2</a>
                <a href="http://example.org/">Elsewhere</a>
                <a href="/page1#top">Top</a>
            </body></html>"#;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_bytes(root_html.as_bytes()),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/page1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_bytes(
                        b"<html><head><title>P1</title></head><body><a href=\"/\">Home</a></body></html>"
                            .as_slice(),
                    ),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/page2"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let crawler = Crawler::new(crate::HttpFetcher::new().unwrap()).with_workers(2);
        let seed = format!("{}/", mock_server.uri());
        let site_map = crawler.crawl(&seed).await.unwrap();

        assert_eq!(site_map.len(), 3);
        assert_eq!(site_map.get(&seed).unwrap().title.as_deref(), Some("Root"));
        assert_eq!(site_map.get(&seed).unwrap().links.len(), 2);

        let page1 = site_map.get(&format!("{}/page1", mock_server.uri())).unwrap();
        assert_eq!(page1.title.as_deref(), Some("P1"));
        assert!(page1.links.contains(&seed));

        let page2 = site_map.get(&format!("{}/page2", mock_server.uri())).unwrap();
        assert!(matches!(page2.status, PageStatus::Failed(_)));
    }
}
