use crate::crawler::Traversal;
use crate::error::Result;
use crate::result::PageResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Every visited address of one crawl with its title and outbound links.
///
/// Keys are exactly the visited set of the traversal that produced the map.
/// `complete` is false when the crawl was cancelled before the frontier was
/// exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteMap {
    pub seed: String,
    pub domain: String,
    pub complete: bool,
    pub pages: BTreeMap<String, PageResult>,
}

impl SiteMap {
    pub fn from_traversal(traversal: Traversal) -> Self {
        let complete = !traversal.cancelled;
        Self::from_pages(traversal.seed, traversal.domain, traversal.pages, complete)
    }

    pub fn from_pages(
        seed: String,
        domain: String,
        pages: impl IntoIterator<Item = (String, PageResult)>,
        complete: bool,
    ) -> Self {
        Self {
            seed,
            domain,
            complete,
            pages: pages.into_iter().collect(),
        }
    }

    pub fn get(&self, address: &str) -> Option<&PageResult> {
        self.pages.get(address)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn addresses(&self) -> impl Iterator<Item = &String> {
        self.pages.keys()
    }

    pub fn failed_pages(&self) -> impl Iterator<Item = (&String, &PageResult)> {
        self.pages.iter().filter(|(_, page)| !page.is_fetched())
    }

    pub fn total_links(&self) -> usize {
        self.pages.values().map(|page| page.links.len()).sum()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
