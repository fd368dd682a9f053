pub mod crawler;
pub mod error;
pub mod fetcher;
pub mod frontier;
pub mod link;
pub mod result;
pub mod sitemap;

pub use crawler::{AssemblyMode, Crawler, ProgressCallback, Traversal};
pub use error::ScanError;
pub use fetcher::{FetchedPage, HttpFetcher, PageFetcher};
pub use link::{domain_of, normalize_link};
pub use result::{PageResult, PageStatus};
pub use sitemap::SiteMap;
pub use tokio_util::sync::CancellationToken;
