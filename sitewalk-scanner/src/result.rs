use crate::error::ScanError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How a page's entry in the site map was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "error", rename_all = "lowercase")]
pub enum PageStatus {
    Fetched,
    Failed(String),
    Cancelled,
}

/// Title and outbound in-domain links for one visited address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult {
    pub title: Option<String>,
    pub links: BTreeSet<String>,
    pub status: PageStatus,
}

impl PageResult {
    pub fn fetched(title: Option<String>, links: BTreeSet<String>) -> Self {
        Self {
            title,
            links,
            status: PageStatus::Fetched,
        }
    }

    pub fn failed(error: &ScanError) -> Self {
        if matches!(error, ScanError::Cancelled) {
            return Self::cancelled();
        }
        Self {
            title: None,
            links: BTreeSet::new(),
            status: PageStatus::Failed(error.to_string()),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            title: None,
            links: BTreeSet::new(),
            status: PageStatus::Cancelled,
        }
    }

    pub fn is_fetched(&self) -> bool {
        self.status == PageStatus::Fetched
    }
}
