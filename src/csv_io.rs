use std::collections::HashMap;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::warn;

use crate::db::{self, Purchase};

const WISHLIST_HEADERS: [&str; 8] = [
    "name_cn",
    "grade",
    "subcategory",
    "price_jp_msrp",
    "price_us_msrp",
    "price_cn_msrp",
    "notes",
    "added_at",
];

const COLLECTION_HEADERS: [&str; 7] = [
    "name_cn",
    "grade",
    "subcategory",
    "purchase_price",
    "purchase_platform",
    "purchase_date",
    "notes",
];

/// (canonical field, accepted header spellings)
const FIELD_ALIASES: &[(&str, &[&str])] = &[
    ("name", &["name_cn", "name", "名称"]),
    ("grade", &["grade", "级别"]),
    ("notes", &["notes", "备注"]),
    ("purchase_price", &["purchase_price", "购买价格"]),
    ("purchase_platform", &["purchase_platform", "购买平台"]),
    ("purchase_date", &["purchase_date", "购买日期"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ListKind {
    Wishlist,
    Collection,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    pub added: usize,
    pub skipped: usize,
    pub not_found: usize,
}

impl ImportReport {
    pub fn print(&self) {
        println!(
            "Imported: {} added, {} skipped, {} not found.",
            self.added, self.skipped, self.not_found
        );
    }
}

fn opt_num(v: Option<f64>) -> String {
    v.map(|p| p.to_string()).unwrap_or_default()
}

/// Write a list as CSV. Returns the number of data rows.
pub fn export<W: Write>(conn: &Connection, kind: ListKind, out: W) -> Result<usize> {
    let mut w = csv::Writer::from_writer(out);
    let rows = match kind {
        ListKind::Wishlist => {
            w.write_record(WISHLIST_HEADERS)?;
            let rows = db::fetch_wishlist(conn)?;
            for r in &rows {
                let g = &r.gunpla;
                w.write_record([
                    g.name_cn.clone(),
                    g.grade.clone(),
                    g.subcategory.clone().unwrap_or_default(),
                    opt_num(g.price_jp_msrp),
                    opt_num(g.price_us_msrp),
                    opt_num(g.price_cn_msrp),
                    r.notes.clone().unwrap_or_default(),
                    r.added_at.format("%Y-%m-%d").to_string(),
                ])?;
            }
            rows.len()
        }
        ListKind::Collection => {
            w.write_record(COLLECTION_HEADERS)?;
            let rows = db::fetch_collection(conn)?;
            for r in &rows {
                let g = &r.gunpla;
                let p = &r.purchase;
                w.write_record([
                    g.name_cn.clone(),
                    g.grade.clone(),
                    g.subcategory.clone().unwrap_or_default(),
                    opt_num(p.price),
                    p.platform.clone().unwrap_or_default(),
                    p.date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default(),
                    p.notes.clone().unwrap_or_default(),
                ])?;
            }
            rows.len()
        }
    };
    w.flush()?;
    Ok(rows)
}

/// Column index per canonical field, first matching alias wins.
fn resolve_headers(headers: &csv::StringRecord) -> HashMap<&'static str, usize> {
    let mut idx = HashMap::new();
    for (field, aliases) in FIELD_ALIASES {
        let found = aliases
            .iter()
            .find_map(|a| headers.iter().position(|h| h.trim() == *a));
        if let Some(i) = found {
            idx.insert(*field, i);
        }
    }
    idx
}

fn cell<'r>(
    record: &'r csv::StringRecord,
    columns: &HashMap<&'static str, usize>,
    name: &str,
) -> Option<&'r str> {
    columns
        .get(name)
        .and_then(|&i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Import list rows from CSV text. A leading UTF-8 BOM is ignored.
pub fn import(conn: &Connection, kind: ListKind, content: &str) -> Result<ImportReport> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content.as_bytes());
    let columns = resolve_headers(rdr.headers().context("CSV has no header row")?);

    let mut report = ImportReport::default();
    let tx = conn.unchecked_transaction()?;

    for (line, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("bad CSV row {}", line + 2))?;
        let field = |name: &'static str| cell(&record, &columns, name);

        let Some(name) = field("name") else {
            report.skipped += 1;
            continue;
        };
        let Some(gunpla) = db::lookup_gunpla(&tx, name, field("grade"))? else {
            report.not_found += 1;
            continue;
        };

        let added = match kind {
            ListKind::Wishlist => db::add_wish(&tx, gunpla.id, field("notes"))?,
            ListKind::Collection => {
                let price = field("purchase_price").and_then(|s| match s.parse::<f64>() {
                    Ok(p) => Some(p),
                    Err(_) => {
                        warn!("Row {}: ignoring purchase price {:?}", line + 2, s);
                        None
                    }
                });
                let purchase = Purchase {
                    date: field("purchase_date").and_then(parse_date),
                    price,
                    platform: field("purchase_platform").map(str::to_string),
                    notes: field("notes").map(str::to_string),
                };
                db::add_owned(&tx, gunpla.id, &purchase)?
            }
        };
        if added {
            report.added += 1;
        } else {
            report.skipped += 1;
        }
    }

    tx.commit()?;
    Ok(report)
}
