use anyhow::Result;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::config::COMMIT_EVERY;
use crate::db::{self, GunplaPatch, GunplaRow};
use crate::parser::CatalogItem;
use crate::pricing::Currency;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Fill blank columns only.
    Backfill,
    /// Replace any column the scrape disagrees with.
    Overwrite,
}

pub struct MergeOptions<'a> {
    pub mode: MergeMode,
    pub series: &'a str,
    pub commit_every: usize,
}

impl<'a> MergeOptions<'a> {
    pub fn new(mode: MergeMode, series: &'a str) -> Self {
        MergeOptions {
            mode,
            series,
            commit_every: COMMIT_EVERY,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl MergeReport {
    pub fn print(&self) {
        println!(
            "Merged: {} created, {} updated, {} unchanged, {} failed.",
            self.created, self.updated, self.skipped, self.failed
        );
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Created,
    Updated,
    Unchanged,
}

/// Everything a scraped item can contribute to a stored record.
pub fn scraped_patch(item: &CatalogItem) -> GunplaPatch {
    GunplaPatch {
        subcategory: Some(item.subcategory.clone()).filter(|s| !s.is_empty()),
        ms_number: item.model_number.clone(),
        source_url: Some(item.source_url.clone()).filter(|s| !s.is_empty()),
        price_jp_msrp: item.price_jp_msrp.filter(|p| *p > 0.0),
        price_us_msrp: item.derived_price(Currency::Usd),
        price_cn_msrp: item.derived_price(Currency::Cny),
    }
}

fn text_blank(v: &Option<String>) -> bool {
    v.as_deref().map_or(true, |s| s.trim().is_empty())
}

fn price_blank(v: Option<f64>) -> bool {
    v.map_or(true, |p| p == 0.0)
}

fn pick_text(mode: MergeMode, stored: &Option<String>, scraped: &Option<String>) -> Option<String> {
    let new = scraped.as_ref().filter(|s| !s.trim().is_empty())?;
    let take = match mode {
        MergeMode::Backfill => text_blank(stored),
        MergeMode::Overwrite => stored.as_ref() != Some(new),
    };
    take.then(|| new.clone())
}

fn pick_price(mode: MergeMode, stored: Option<f64>, scraped: Option<f64>) -> Option<f64> {
    let new = scraped.filter(|p| *p > 0.0)?;
    let take = match mode {
        MergeMode::Backfill => price_blank(stored),
        MergeMode::Overwrite => stored != Some(new),
    };
    take.then_some(new)
}

/// The columns of `existing` that `scraped` should change.
pub fn plan_merge(existing: &GunplaRow, scraped: &GunplaPatch, mode: MergeMode) -> GunplaPatch {
    GunplaPatch {
        subcategory: pick_text(mode, &existing.subcategory, &scraped.subcategory),
        ms_number: pick_text(mode, &existing.ms_number, &scraped.ms_number),
        source_url: pick_text(mode, &existing.source_url, &scraped.source_url),
        price_jp_msrp: pick_price(mode, existing.price_jp_msrp, scraped.price_jp_msrp),
        price_us_msrp: pick_price(mode, existing.price_us_msrp, scraped.price_us_msrp),
        price_cn_msrp: pick_price(mode, existing.price_cn_msrp, scraped.price_cn_msrp),
    }
}

fn merge_one(conn: &Connection, item: &CatalogItem, opts: &MergeOptions) -> Result<Outcome> {
    let scraped = scraped_patch(item);
    match db::find_gunpla(conn, &item.name, &item.grade)? {
        None => {
            db::insert_gunpla(conn, &item.name, &item.grade, opts.series, &scraped)?;
            Ok(Outcome::Created)
        }
        Some(existing) => {
            let patch = plan_merge(&existing, &scraped, opts.mode);
            if patch.is_empty() {
                return Ok(Outcome::Unchanged);
            }
            debug!("Updating {} ({}): {:?}", item.name, item.grade, patch);
            db::update_gunpla(conn, existing.id, &patch)?;
            Ok(Outcome::Updated)
        }
    }
}

/// Insert or merge items. Each item runs in its own savepoint; a failure rolls back that
/// item only. The outer transaction commits every `commit_every` inserts and at the end.
pub fn merge_items(
    conn: &Connection,
    items: &[CatalogItem],
    opts: &MergeOptions,
) -> Result<MergeReport> {
    let mut report = MergeReport::default();
    let mut pending = 0usize;
    let mut tx = conn.unchecked_transaction()?;

    for item in items {
        let outcome = {
            let sp = tx.savepoint()?;
            let outcome = merge_one(&sp, item, opts);
            if outcome.is_ok() {
                sp.commit()?;
            }
            outcome
        };

        match outcome {
            Ok(Outcome::Created) => {
                report.created += 1;
                pending += 1;
                if pending >= opts.commit_every {
                    tx.commit()?;
                    tx = conn.unchecked_transaction()?;
                    pending = 0;
                }
            }
            Ok(Outcome::Updated) => report.updated += 1,
            Ok(Outcome::Unchanged) => report.skipped += 1,
            Err(e) => {
                warn!("Failed to store {} ({}): {:#}", item.name, item.grade, e);
                report.failed += 1;
            }
        }
    }

    tx.commit()?;
    info!(
        "Merge done: {} created, {} updated, {} unchanged, {} failed",
        report.created, report.updated, report.skipped, report.failed
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory;
    use crate::pricing::Rates;

    fn item(name: &str, price: Option<f64>) -> CatalogItem {
        let mut item = CatalogItem {
            name: name.to_string(),
            grade: "RG".to_string(),
            subcategory: "普通版".to_string(),
            model_number: None,
            source_url: "https://acg.78dm.net/ct/2001.html".to_string(),
            price_jp_msrp: None,
            derived: Vec::new(),
        };
        item.set_price(price, &Rates::default());
        item
    }

    fn stored(conn: &Connection, name: &str) -> GunplaRow {
        db::find_gunpla(conn, name, "RG").unwrap().unwrap()
    }

    #[test]
    fn backfill_fills_missing_price() {
        let conn = memory();
        let opts = MergeOptions::new(MergeMode::Backfill, "RG系列拼装模型");
        merge_items(&conn, &[item("RX-78-2 高达 RG", None)], &opts).unwrap();

        let report = merge_items(&conn, &[item("RX-78-2 高达 RG", Some(4500.0))], &opts).unwrap();
        assert_eq!(report, MergeReport { updated: 1, ..Default::default() });
        let row = stored(&conn, "RX-78-2 高达 RG");
        assert_eq!(row.price_jp_msrp, Some(4500.0));
        assert_eq!(row.price_us_msrp, Some(30.15));
        assert_eq!(row.series.as_deref(), Some("RG系列拼装模型"));
    }

    #[test]
    fn backfill_keeps_existing_price() {
        let conn = memory();
        let opts = MergeOptions::new(MergeMode::Backfill, "RG系列拼装模型");
        merge_items(&conn, &[item("RX-78-2 高达 RG", Some(4000.0))], &opts).unwrap();

        let report = merge_items(&conn, &[item("RX-78-2 高达 RG", Some(4500.0))], &opts).unwrap();
        assert_eq!(report, MergeReport { skipped: 1, ..Default::default() });
        assert_eq!(stored(&conn, "RX-78-2 高达 RG").price_jp_msrp, Some(4000.0));
    }

    #[test]
    fn overwrite_replaces_subcategory_but_not_with_blanks() {
        let conn = memory();
        merge_items(
            &conn,
            &[item("RX-78-2 高达 RG", Some(4500.0))],
            &MergeOptions::new(MergeMode::Backfill, "s"),
        )
        .unwrap();

        let mut fixed = item("RX-78-2 高达 RG", None);
        fixed.subcategory = "网络限定版".to_string();
        let report =
            merge_items(&conn, &[fixed], &MergeOptions::new(MergeMode::Overwrite, "s")).unwrap();
        assert_eq!(report.updated, 1);
        let row = stored(&conn, "RX-78-2 高达 RG");
        assert_eq!(row.subcategory.as_deref(), Some("网络限定版"));
        assert_eq!(row.price_jp_msrp, Some(4500.0));
    }

    #[test]
    fn plan_treats_zero_as_blank() {
        let conn = memory();
        let patch = GunplaPatch { price_jp_msrp: Some(0.0), ..Default::default() };
        let id = db::insert_gunpla(&conn, "A", "RG", "s", &patch).unwrap();
        let row = db::get_gunpla(&conn, id).unwrap().unwrap();
        let scraped = GunplaPatch { price_jp_msrp: Some(2500.0), ..Default::default() };
        let plan = plan_merge(&row, &scraped, MergeMode::Backfill);
        assert_eq!(plan.price_jp_msrp, Some(2500.0));
    }

    #[test]
    fn failing_item_rolls_back_alone() {
        let conn = memory();
        conn.execute_batch(
            "CREATE TRIGGER boom BEFORE INSERT ON gunpla WHEN NEW.name_cn = 'BOOM'
             BEGIN SELECT RAISE(ABORT, 'boom'); END;",
        )
        .unwrap();
        let items = vec![item("A 高达", None), item("BOOM", None), item("C 高达", None)];
        let report =
            merge_items(&conn, &items, &MergeOptions::new(MergeMode::Backfill, "s")).unwrap();
        assert_eq!(report, MergeReport { created: 2, failed: 1, ..Default::default() });
        assert!(db::find_gunpla(&conn, "C 高达", "RG").unwrap().is_some());
    }

    #[test]
    fn periodic_commits_keep_every_row() {
        let conn = memory();
        let items: Vec<CatalogItem> = (0..25).map(|i| item(&format!("测试 {}", i), None)).collect();
        let opts = MergeOptions { commit_every: 10, ..MergeOptions::new(MergeMode::Backfill, "s") };
        let report = merge_items(&conn, &items, &opts).unwrap();
        assert_eq!(report.created, 25);
        assert_eq!(db::get_stats(&conn).unwrap().total, 25);
    }

    #[test]
    fn listing_merge_is_idempotent() {
        use crate::config::{ScrapeArgs, ScrapeConfig};
        use crate::parser::process_listing;

        let html = std::fs::read_to_string("tests/fixtures/rg_listing.html").unwrap();
        let cfg = ScrapeConfig::resolve("RG", &ScrapeArgs::default()).unwrap();
        let conn = memory();
        let opts = MergeOptions::new(MergeMode::Backfill, &cfg.profile.series);

        let first = process_listing(&html, &cfg.list_url, &cfg).unwrap();
        let report = merge_items(&conn, &first.items, &opts).unwrap();
        assert_eq!(report.created, 7);

        let second = process_listing(&html, &cfg.list_url, &cfg).unwrap();
        let report = merge_items(&conn, &second.items, &opts).unwrap();
        assert_eq!(report, MergeReport { skipped: 7, ..Default::default() });
    }
}
