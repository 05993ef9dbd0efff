pub mod anchors;
pub mod classify;
pub mod extract;
pub mod sections;
pub mod strategy;

use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::{Context, Result};
use scraper::Html;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::config::ScrapeConfig;
use crate::pricing::{self, Currency, Rates};
use crate::vocab;
use classify::{Classifier, Rejection};

/// A product found on a listing page, before it is stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogItem {
    pub name: String,
    pub grade: String,
    pub subcategory: String,
    pub model_number: Option<String>,
    pub source_url: String,
    pub price_jp_msrp: Option<f64>,
    pub derived: Vec<(Currency, f64)>,
}

impl CatalogItem {
    pub fn set_price(&mut self, jpy: Option<f64>, rates: &Rates) {
        self.price_jp_msrp = jpy;
        self.derived = pricing::convert(jpy, rates);
    }

    pub fn derived_price(&self, currency: Currency) -> Option<f64> {
        self.derived
            .iter()
            .find(|(c, _)| *c == currency)
            .map(|(_, v)| *v)
    }
}

/// Everything one listing page yielded.
#[derive(Debug, Default)]
pub struct Listing {
    pub items: Vec<CatalogItem>,
    pub anchors_seen: usize,
    pub rejected: BTreeMap<Rejection, usize>,
    pub duplicates: usize,
}

impl Listing {
    /// Items per subcategory in display order.
    pub fn subcategory_counts(&self) -> Vec<(String, usize)> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for item in &self.items {
            *counts.entry(item.subcategory.as_str()).or_default() += 1;
        }
        let mut out: Vec<(String, usize)> =
            counts.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        out.sort_by(|a, b| {
            vocab::subcategory_rank(&a.0)
                .cmp(&vocab::subcategory_rank(&b.0))
                .then_with(|| a.0.cmp(&b.0))
        });
        out
    }

    pub fn print_summary(&self) {
        let rejected: usize = self.rejected.values().sum();
        println!(
            "Found {} items ({} links, {} rejected, {} duplicates)",
            self.items.len(),
            self.anchors_seen,
            rejected,
            self.duplicates
        );
        for (label, n) in self.subcategory_counts() {
            println!("  {:<20} {:>4}", label, n);
        }
    }
}

/// Listing HTML → deduplicated catalog items with subcategories and model numbers.
pub fn process_listing(html: &str, list_url: &str, cfg: &ScrapeConfig) -> Result<Listing> {
    let base = Url::parse(list_url).with_context(|| format!("invalid listing URL {}", list_url))?;
    let document = Html::parse_document(html);
    let page_text = document.root_element().text().collect::<String>();

    let found = anchors::collect(&document, &page_text, &base);
    let labels = sections::segment(&found, &page_text, &cfg.sections, cfg.strategy);

    let classifier = Classifier {
        filter: &cfg.filter,
        sections: &cfg.sections,
        reject_placeholders: cfg.policies.reject_placeholders,
    };

    let mut listing = Listing {
        anchors_seen: found.len(),
        ..Default::default()
    };
    let mut seen: HashSet<String> = HashSet::new();

    for (anchor, subcategory) in found.iter().zip(labels) {
        if let Err(reason) = classifier.check(&anchor.text) {
            debug!("Rejected {:?}: {}", anchor.text, reason);
            *listing.rejected.entry(reason).or_default() += 1;
            continue;
        }
        if !seen.insert(anchor.text.clone()) {
            listing.duplicates += 1;
            continue;
        }
        listing.items.push(CatalogItem {
            name: anchor.text.clone(),
            grade: cfg.profile.grade.clone(),
            subcategory,
            model_number: extract::model_number::extract(&anchor.text),
            source_url: anchor.url.clone(),
            price_jp_msrp: None,
            derived: Vec::new(),
        });
    }

    Ok(listing)
}
