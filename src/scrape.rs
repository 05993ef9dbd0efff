use std::collections::HashSet;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use scraper::Html;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{ScrapeConfig, Timing};
use crate::db::{self, GunplaPatch};
use crate::fetch::Fetcher;
use crate::parser::extract::price::extract_price;
use crate::parser::{self, anchors, CatalogItem, Listing};
use crate::pricing::{self, Currency};
use crate::vocab::{GRADE_LABELS, REFERENCE_SUBCATEGORY};

/// Detail-page pass counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PriceStats {
    pub fetched: usize,
    pub priced: usize,
    pub failed: usize,
    pub dropped: usize,
}

impl PriceStats {
    pub fn print(&self) {
        println!(
            "Prices: {} pages, {} priced, {} fetch errors, {} dropped.",
            self.fetched, self.priced, self.failed, self.dropped
        );
    }
}

fn progress(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta}) {msg}")?
            .progress_chars("=> "),
    );
    Ok(pb)
}

/// Fetch and parse one grade's listing page.
pub async fn scrape_grade(fetcher: &Fetcher, cfg: &ScrapeConfig) -> Result<Listing> {
    info!("Fetching {} listing: {}", cfg.profile.grade, cfg.list_url);
    let html = fetcher
        .fetch_html(&cfg.list_url, cfg.timing.list_timeout)
        .await
        .with_context(|| format!("listing for {} unavailable", cfg.profile.grade))?;
    let listing = parser::process_listing(&html, &cfg.list_url, cfg)?;
    info!(
        "{}: {} items from {} links ({} duplicates)",
        cfg.profile.grade,
        listing.items.len(),
        listing.anchors_seen,
        listing.duplicates
    );
    Ok(listing)
}

async fn fetch_price(fetcher: &Fetcher, url: &str, cfg: &ScrapeConfig) -> Option<Option<f64>> {
    let html = fetcher.try_fetch_html(url, cfg.timing.detail_timeout).await?;
    let found = extract_price(&html, cfg.bounds);
    if let Some(m) = &found {
        debug!("Price {} for {} via {}", m.value, url, m.method);
    }
    Some(found.map(|m| m.value))
}

/// Visit every item's detail page in order and attach its JPY price.
pub async fn enrich_prices(
    fetcher: &Fetcher,
    items: &mut Vec<CatalogItem>,
    cfg: &ScrapeConfig,
) -> Result<PriceStats> {
    let mut stats = PriceStats::default();
    let pb = progress(items.len())?;

    for (i, item) in items.iter_mut().enumerate() {
        if i > 0 {
            tokio::time::sleep(cfg.timing.detail_delay).await;
        }
        pb.set_message(item.name.clone());
        stats.fetched += 1;
        match fetch_price(fetcher, &item.source_url, cfg).await {
            Some(price) => {
                if price.is_some() {
                    stats.priced += 1;
                }
                item.set_price(price, &cfg.rates);
            }
            None => stats.failed += 1,
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    if cfg.policies.drop_unpriced_reference {
        let before = items.len();
        items.retain(|i| !(i.subcategory == REFERENCE_SUBCATEGORY && i.price_jp_msrp.is_none()));
        stats.dropped = before - items.len();
    }

    info!(
        "{}: priced {}/{} items",
        cfg.profile.grade, stats.priced, stats.fetched
    );
    Ok(stats)
}

/// Backfill prices for stored records of the grade that have a URL but no price.
pub async fn refresh_prices(
    fetcher: &Fetcher,
    conn: &Connection,
    cfg: &ScrapeConfig,
) -> Result<PriceStats> {
    let rows = db::fetch_missing_prices(conn, &cfg.profile.grade)?;
    let mut stats = PriceStats::default();
    if rows.is_empty() {
        return Ok(stats);
    }
    let pb = progress(rows.len())?;

    for (i, row) in rows.iter().enumerate() {
        let Some(url) = row.source_url.as_deref() else {
            continue;
        };
        if i > 0 {
            tokio::time::sleep(cfg.timing.detail_delay).await;
        }
        pb.set_message(row.name_cn.clone());
        stats.fetched += 1;
        match fetch_price(fetcher, url, cfg).await {
            Some(Some(jpy)) => {
                let derived = pricing::convert(Some(jpy), &cfg.rates);
                let pick = |c: Currency| derived.iter().find(|(d, _)| *d == c).map(|(_, v)| *v);
                let patch = GunplaPatch {
                    price_jp_msrp: Some(jpy),
                    price_us_msrp: pick(Currency::Usd),
                    price_cn_msrp: pick(Currency::Cny),
                    ..Default::default()
                };
                match db::update_gunpla(conn, row.id, &patch) {
                    Ok(()) => stats.priced += 1,
                    Err(e) => {
                        warn!("Failed to store price for {}: {:#}", row.name_cn, e);
                        stats.failed += 1;
                    }
                }
            }
            Some(None) => {}
            None => stats.failed += 1,
        }
        pb.inc(1);
    }
    pb.finish_and_clear();
    Ok(stats)
}

/// Links on a page whose text is exactly a known grade label, first per label.
pub fn grade_links(html: &str, page_url: &str) -> Result<Vec<(String, String)>> {
    let base = Url::parse(page_url).with_context(|| format!("invalid URL {}", page_url))?;
    let document = Html::parse_document(html);
    let text = document.root_element().text().collect::<String>();
    let mut seen = HashSet::new();
    let links = anchors::collect(&document, &text, &base)
        .into_iter()
        .filter(|a| GRADE_LABELS.contains(&a.text.as_str()))
        .filter(|a| seen.insert(a.text.clone()))
        .map(|a| (a.text, a.url))
        .collect();
    Ok(links)
}

pub async fn discover_grades(
    fetcher: &Fetcher,
    index_url: &str,
    timing: &Timing,
) -> Result<Vec<(String, String)>> {
    let html = fetcher.fetch_html(index_url, timing.list_timeout).await?;
    grade_links(&html, index_url)
}
