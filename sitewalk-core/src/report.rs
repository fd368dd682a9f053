// Report generation from site maps

use crate::crawl::extract_url_path;
use serde::{Deserialize, Serialize};
use sitewalk_scanner::{PageStatus, SiteMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub sites: usize,
    pub pages: usize,
    pub failed_pages: usize,
    pub cancelled_pages: usize,
    pub total_links: usize,
}

impl ReportSummary {
    pub fn from_site_maps(site_maps: &[SiteMap]) -> Self {
        let mut summary = ReportSummary {
            sites: site_maps.len(),
            ..Default::default()
        };

        for site_map in site_maps {
            summary.pages += site_map.len();
            summary.total_links += site_map.total_links();
            for (_, page) in site_map.failed_pages() {
                match page.status {
                    PageStatus::Cancelled => summary.cancelled_pages += 1,
                    _ => summary.failed_pages += 1,
                }
            }
        }

        summary
    }
}

pub fn generate_report(
    site_maps: &[SiteMap],
    format: ReportFormat,
) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Json => serde_json::to_string_pretty(site_maps),
        ReportFormat::Text => Ok(generate_text_report(site_maps)),
    }
}

fn generate_text_report(site_maps: &[SiteMap]) -> String {
    let summary = ReportSummary::from_site_maps(site_maps);

    let mut report = String::new();
    report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");
    report.push_str("# Summary:\n");
    report.push_str(&format!("  Sites crawled: {}\n", summary.sites));
    report.push_str(&format!("  Pages visited: {}\n", summary.pages));
    report.push_str(&format!("  Failed pages: {}\n", summary.failed_pages));
    if summary.cancelled_pages > 0 {
        report.push_str(&format!("  Cancelled pages: {}\n", summary.cancelled_pages));
    }
    report.push_str(&format!("  Total links found: {}\n", summary.total_links));
    report.push_str("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");

    for site_map in site_maps {
        report.push_str(&format!("## {}\n", site_map.domain));
        report.push_str(&format!("  {} pages found", site_map.len()));
        if !site_map.complete {
            report.push_str(" (incomplete, crawl cancelled)");
        }
        report.push_str("\n\n");

        // BTreeMap keeps pages sorted by address
        for (address, page) in &site_map.pages {
            let path = extract_url_path(address);
            let line = match &page.status {
                PageStatus::Fetched => format!(
                    "  ✓ {}  {} ({} links)",
                    path,
                    page.title.as_deref().unwrap_or("<no title>"),
                    page.links.len()
                ),
                PageStatus::Failed(error) => format!("  ✗ {}  {}", path, error),
                PageStatus::Cancelled => format!("  - {}  cancelled", path),
            };
            report.push_str(&line);
            report.push('\n');
        }
        report.push('\n');
    }

    report
}
