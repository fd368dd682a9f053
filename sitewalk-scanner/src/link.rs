//! Link normalization against a crawl domain.

use crate::error::{Result, ScanError};
use std::collections::BTreeSet;
use url::Url;

const HTTP: &str = "http://";
const HTTPS: &str = "https://";

/// Extract the crawl domain (host plus explicit port) from a seed address.
///
/// Only absolute `http`/`https` addresses with a host are accepted; anything else
/// fails before a crawl can start.
pub fn domain_of(seed: &str) -> Result<String> {
    let parsed = Url::parse(seed)
        .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", seed, e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ScanError::InvalidUrl(format!(
            "{}: unsupported scheme '{}'",
            seed,
            parsed.scheme()
        )));
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| ScanError::InvalidUrl(format!("{}: missing host", seed)))?;

    Ok(match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Rewrite a raw anchor reference into an absolute address inside `domain`.
///
/// Returns `None` when the reference is empty, carries a fragment, or points
/// outside the domain. Relative references are anchored at `http://{domain}`,
/// so only those starting with `/` or `?` survive: `about.html` would become
/// `http://{domain}about.html` and is rejected.
pub fn normalize_link(domain: &str, reference: Option<&str>) -> Option<String> {
    let reference = reference?;
    if reference.is_empty() || reference.contains('#') {
        return None;
    }

    let absolute = if reference.starts_with("//") {
        format!("http:{}", reference)
    } else if reference.starts_with(HTTP) || reference.starts_with(HTTPS) {
        reference.to_string()
    } else {
        format!("{}{}{}", HTTP, domain, reference)
    };

    if is_in_domain(&absolute, domain) {
        Some(absolute)
    } else {
        None
    }
}

/// Normalize the raw references found on `address`, dropping rejected links and
/// self-references.
pub fn outbound_links<I>(domain: &str, address: &str, references: I) -> BTreeSet<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    references
        .into_iter()
        .filter_map(|reference| normalize_link(domain, Some(reference.as_ref())))
        .filter(|link| link != address)
        .collect()
}

/// The `http://{domain}` prefix must be followed by a path, a query or nothing.
fn is_in_domain(absolute: &str, domain: &str) -> bool {
    let Some(rest) = absolute
        .strip_prefix(HTTP)
        .and_then(|rest| rest.strip_prefix(domain))
    else {
        return false;
    };

    rest.is_empty() || rest.starts_with('/') || rest.starts_with('?')
}
