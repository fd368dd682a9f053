use anyhow::{Context, Result, anyhow, bail};
use clap::ArgMatches;
use colored::Colorize;
use sitewalk_scanner::{AssemblyMode, CancellationToken};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, warn};
use url::Url;

// Re-export crawl types and functions from sitewalk-core
pub use sitewalk_core::crawl::{
    CrawlOptions, CrawlProgressCallback, execute_crawl, extract_url_path,
};
pub use sitewalk_core::report::{ReportFormat, ReportSummary, generate_report};

/// Install the stderr log subscriber. `verbosity` counts `-v` flags.
pub fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    // A second install (tests, embedding) is not an error
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();
}

// Helper functions for crawl handler

/// Load URLs from either a file or a single URL argument
pub fn load_urls_from_source(url: Option<&Url>, hosts_file: Option<&PathBuf>) -> Result<Vec<String>> {
    if let Some(hosts_file_path) = hosts_file {
        load_urls_from_file(hosts_file_path)
    } else if let Some(url) = url {
        Ok(vec![url.as_str().to_string()])
    } else {
        bail!("Either --url or --hosts-file must be provided")
    }
}

/// Load and parse URLs from a file
pub fn load_urls_from_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read hosts file {}", path.display()))?;

    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_url_line)
        .collect();

    if urls.is_empty() {
        bail!("No valid URLs found in {}", path.display());
    }

    Ok(urls)
}

/// Parse a single line as a URL, trying to add http:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    if let Ok(url) = Url::parse(line)
        && matches!(url.scheme(), "http" | "https")
    {
        return Some(line.to_string());
    }

    // Try adding http://
    let with_scheme = format!("http://{}", line);
    if Url::parse(&with_scheme).is_ok() {
        return Some(with_scheme);
    }

    warn!("Skipping invalid URL '{}'", line);
    None
}

/// Expand a leading `~` in a user-supplied output path.
pub fn resolve_output_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).as_ref())
}

/// Write the report to `output`, or to stdout when no path is given.
pub fn write_report(report: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let path = resolve_output_path(path);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::write(&path, report)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
        }
        None => print!("{}", report),
    }
    Ok(())
}

pub async fn handle_crawl(sub_matches: &ArgMatches, quiet: bool) -> Result<()> {
    let url = sub_matches.get_one::<Url>("url");
    let hosts_file = sub_matches.get_one::<PathBuf>("hosts-file");
    let threads = *sub_matches.get_one::<usize>("threads").unwrap_or(&10);
    let timeout = *sub_matches.get_one::<u64>("timeout").unwrap_or(&10);
    let max_duration = sub_matches.get_one::<u64>("max-duration").copied();
    let refetch = sub_matches.get_flag("refetch");
    let output = sub_matches.get_one::<PathBuf>("output");
    let format_name = sub_matches
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("text");
    let format = ReportFormat::from_str(format_name)
        .ok_or_else(|| anyhow!("Unknown report format '{}'", format_name))?;

    let urls = load_urls_from_source(url, hosts_file)?;

    if !quiet {
        eprintln!(
            "\n{} Crawling {} host(s)",
            "→".blue().bold(),
            urls.len().to_string().bright_white()
        );
        eprintln!("Workers: {}", threads);
        eprintln!("Fetch timeout: {}s", timeout);
        if let Some(limit) = max_duration {
            eprintln!("Max duration: {}s", limit);
        }
        eprintln!(
            "Assembly: {}\n",
            if refetch { "refetch every page" } else { "reuse traversal results" }
        );
    }

    // Ctrl-C stops the crawl and reports what was visited so far
    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_cancel.cancel();
        }
    });

    let options = CrawlOptions {
        urls,
        workers: threads,
        fetch_timeout: Duration::from_secs(timeout),
        max_duration: max_duration.map(Duration::from_secs),
        assembly_mode: if refetch {
            AssemblyMode::Refetch
        } else {
            AssemblyMode::Cached
        },
        show_progress_bars: !quiet,
        cancel,
    };

    let progress_callback: Option<CrawlProgressCallback> = if quiet {
        None
    } else {
        Some(Arc::new(|msg: String| {
            eprintln!("{}", msg);
        }))
    };

    let site_maps = execute_crawl(options, progress_callback).await?;
    if site_maps.is_empty() {
        bail!("No site could be crawled");
    }

    if !quiet {
        let summary = ReportSummary::from_site_maps(&site_maps);
        eprintln!(
            "\n{} Crawl complete! {} pages, {} failed\n",
            "✓".green().bold(),
            summary.pages,
            summary.failed_pages
        );
    }

    let report = generate_report(&site_maps, format)?;
    write_report(&report, output.map(PathBuf::as_path))?;

    if let Some(path) = output
        && !quiet
    {
        eprintln!(
            "{} Report saved to {}",
            "✓".green().bold(),
            resolve_output_path(path).display().to_string().bright_white()
        );
    }

    Ok(())
}
