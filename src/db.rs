use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::pricing::{Coupon, CouponKind};
use crate::vocab::subcategory_rank;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS gunpla (
            id              INTEGER PRIMARY KEY,
            name_cn         TEXT NOT NULL,
            name_jp         TEXT,
            name_en         TEXT,
            grade           TEXT NOT NULL,
            ms_number       TEXT,
            series          TEXT,
            subcategory     TEXT,
            source_url      TEXT,
            price_jp_msrp   REAL,
            price_jp_market REAL,
            price_us_msrp   REAL,
            price_us_market REAL,
            price_cn_msrp   REAL,
            price_cn_market REAL,
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at      TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(name_cn, grade)
        );
        CREATE INDEX IF NOT EXISTS idx_gunpla_grade ON gunpla(grade);
        CREATE INDEX IF NOT EXISTS idx_gunpla_subcategory ON gunpla(grade, subcategory);

        CREATE TABLE IF NOT EXISTS wishlist (
            id          INTEGER PRIMARY KEY,
            gunpla_id   INTEGER NOT NULL UNIQUE REFERENCES gunpla(id) ON DELETE CASCADE,
            added_at    TEXT NOT NULL DEFAULT (datetime('now')),
            notes       TEXT
        );

        CREATE TABLE IF NOT EXISTS collection (
            id                INTEGER PRIMARY KEY,
            gunpla_id         INTEGER NOT NULL UNIQUE REFERENCES gunpla(id) ON DELETE CASCADE,
            purchase_date     TEXT,
            purchase_price    REAL,
            purchase_platform TEXT,
            notes             TEXT,
            added_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS coupons (
            id             INTEGER PRIMARY KEY,
            platform       TEXT NOT NULL,
            discount_type  TEXT NOT NULL,
            discount_value REAL NOT NULL,
            max_discount   REAL,
            min_purchase   REAL,
            valid_from     TEXT,
            valid_until    TEXT,
            description    TEXT,
            created_at     TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}

// ── Catalog ──

const GUNPLA_COLS: &str = "g.id, g.name_cn, g.name_jp, g.name_en, g.grade, g.ms_number, g.series,
    g.subcategory, g.source_url, g.price_jp_msrp, g.price_jp_market, g.price_us_msrp,
    g.price_us_market, g.price_cn_msrp, g.price_cn_market, g.created_at, g.updated_at";
/// Index of the first column after `GUNPLA_COLS` in a joined select.
const EXTRA_COL: usize = 17;

#[derive(Debug, Clone, PartialEq)]
pub struct GunplaRow {
    pub id: i64,
    pub name_cn: String,
    pub name_jp: Option<String>,
    pub name_en: Option<String>,
    pub grade: String,
    pub ms_number: Option<String>,
    pub series: Option<String>,
    pub subcategory: Option<String>,
    pub source_url: Option<String>,
    pub price_jp_msrp: Option<f64>,
    pub price_jp_market: Option<f64>,
    pub price_us_msrp: Option<f64>,
    pub price_us_market: Option<f64>,
    pub price_cn_msrp: Option<f64>,
    pub price_cn_market: Option<f64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl GunplaRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(GunplaRow {
            id: row.get(0)?,
            name_cn: row.get(1)?,
            name_jp: row.get(2)?,
            name_en: row.get(3)?,
            grade: row.get(4)?,
            ms_number: row.get(5)?,
            series: row.get(6)?,
            subcategory: row.get(7)?,
            source_url: row.get(8)?,
            price_jp_msrp: row.get(9)?,
            price_jp_market: row.get(10)?,
            price_us_msrp: row.get(11)?,
            price_us_market: row.get(12)?,
            price_cn_msrp: row.get(13)?,
            price_cn_market: row.get(14)?,
            created_at: row.get(15)?,
            updated_at: row.get(16)?,
        })
    }
}

/// Columns a scrape may write. `None` leaves the column alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GunplaPatch {
    pub subcategory: Option<String>,
    pub ms_number: Option<String>,
    pub source_url: Option<String>,
    pub price_jp_msrp: Option<f64>,
    pub price_us_msrp: Option<f64>,
    pub price_cn_msrp: Option<f64>,
}

impl GunplaPatch {
    pub fn is_empty(&self) -> bool {
        *self == GunplaPatch::default()
    }

    fn columns(&self) -> Vec<(&'static str, Box<dyn ToSql + '_>)> {
        let mut cols: Vec<(&'static str, Box<dyn ToSql + '_>)> = Vec::new();
        if let Some(v) = &self.subcategory {
            cols.push(("subcategory", Box::new(v)));
        }
        if let Some(v) = &self.ms_number {
            cols.push(("ms_number", Box::new(v)));
        }
        if let Some(v) = &self.source_url {
            cols.push(("source_url", Box::new(v)));
        }
        if let Some(v) = self.price_jp_msrp {
            cols.push(("price_jp_msrp", Box::new(v)));
        }
        if let Some(v) = self.price_us_msrp {
            cols.push(("price_us_msrp", Box::new(v)));
        }
        if let Some(v) = self.price_cn_msrp {
            cols.push(("price_cn_msrp", Box::new(v)));
        }
        cols
    }
}

pub fn find_gunpla(conn: &Connection, name_cn: &str, grade: &str) -> Result<Option<GunplaRow>> {
    let sql = format!("SELECT {} FROM gunpla g WHERE g.name_cn = ?1 AND g.grade = ?2", GUNPLA_COLS);
    let row = conn
        .query_row(&sql, rusqlite::params![name_cn, grade], GunplaRow::from_row)
        .optional()?;
    Ok(row)
}

/// First record with this name, narrowed to `grade` when given.
pub fn lookup_gunpla(
    conn: &Connection,
    name_cn: &str,
    grade: Option<&str>,
) -> Result<Option<GunplaRow>> {
    match grade {
        Some(g) => find_gunpla(conn, name_cn, g),
        None => {
            let sql = format!(
                "SELECT {} FROM gunpla g WHERE g.name_cn = ?1 ORDER BY g.id LIMIT 1",
                GUNPLA_COLS
            );
            let row = conn
                .query_row(&sql, rusqlite::params![name_cn], GunplaRow::from_row)
                .optional()?;
            Ok(row)
        }
    }
}

pub fn get_gunpla(conn: &Connection, id: i64) -> Result<Option<GunplaRow>> {
    let sql = format!("SELECT {} FROM gunpla g WHERE g.id = ?1", GUNPLA_COLS);
    let row = conn
        .query_row(&sql, rusqlite::params![id], GunplaRow::from_row)
        .optional()?;
    Ok(row)
}

pub fn insert_gunpla(
    conn: &Connection,
    name_cn: &str,
    grade: &str,
    series: &str,
    patch: &GunplaPatch,
) -> Result<i64> {
    let mut names = vec!["name_cn", "grade", "series"];
    let mut values: Vec<Box<dyn ToSql + '_>> = Vec::new();
    values.push(Box::new(name_cn));
    values.push(Box::new(grade));
    values.push(Box::new(series));
    for (name, value) in patch.columns() {
        names.push(name);
        values.push(value);
    }
    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "INSERT INTO gunpla ({}) VALUES ({})",
        names.join(", "),
        placeholders.join(", ")
    );
    let refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
    conn.execute(&sql, refs.as_slice())?;
    Ok(conn.last_insert_rowid())
}

/// A hand-entered catalog record.
#[derive(Debug, Clone, Default)]
pub struct NewGunpla {
    pub name_cn: String,
    pub name_jp: Option<String>,
    pub name_en: Option<String>,
    pub grade: String,
    pub ms_number: Option<String>,
    pub series: Option<String>,
    pub subcategory: Option<String>,
    pub price_jp_msrp: Option<f64>,
    pub price_jp_market: Option<f64>,
    pub price_us_msrp: Option<f64>,
    pub price_us_market: Option<f64>,
    pub price_cn_msrp: Option<f64>,
    pub price_cn_market: Option<f64>,
}

pub fn add_gunpla(conn: &Connection, kit: &NewGunpla) -> Result<i64> {
    conn.execute(
        "INSERT INTO gunpla (name_cn, name_jp, name_en, grade, ms_number, series, subcategory,
            price_jp_msrp, price_jp_market, price_us_msrp, price_us_market,
            price_cn_msrp, price_cn_market)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        rusqlite::params![
            kit.name_cn,
            kit.name_jp,
            kit.name_en,
            kit.grade,
            kit.ms_number,
            kit.series,
            kit.subcategory,
            kit.price_jp_msrp,
            kit.price_jp_market,
            kit.price_us_msrp,
            kit.price_us_market,
            kit.price_cn_msrp,
            kit.price_cn_market,
        ],
    )
    .with_context(|| format!("failed to add {} ({})", kit.name_cn, kit.grade))?;
    Ok(conn.last_insert_rowid())
}

/// Write the patch's populated columns and bump `updated_at`.
pub fn update_gunpla(conn: &Connection, id: i64, patch: &GunplaPatch) -> Result<()> {
    let cols = patch.columns();
    if cols.is_empty() {
        return Ok(());
    }
    let sets: Vec<String> = cols
        .iter()
        .enumerate()
        .map(|(i, (name, _))| format!("{} = ?{}", name, i + 2))
        .collect();
    let sql = format!(
        "UPDATE gunpla SET {}, updated_at = datetime('now') WHERE id = ?1",
        sets.join(", ")
    );
    let mut refs: Vec<&dyn ToSql> = Vec::with_capacity(cols.len() + 1);
    refs.push(&id);
    refs.extend(cols.iter().map(|(_, v)| v.as_ref()));
    conn.execute(&sql, refs.as_slice())?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketPrices {
    pub jp: Option<f64>,
    pub us: Option<f64>,
    pub cn: Option<f64>,
}

pub fn set_market_prices(conn: &Connection, id: i64, prices: MarketPrices) -> Result<()> {
    conn.execute(
        "UPDATE gunpla SET
            price_jp_market = COALESCE(?2, price_jp_market),
            price_us_market = COALESCE(?3, price_us_market),
            price_cn_market = COALESCE(?4, price_cn_market),
            updated_at = datetime('now')
         WHERE id = ?1",
        rusqlite::params![id, prices.jp, prices.us, prices.cn],
    )?;
    Ok(())
}

/// Records of a grade with a detail URL but no JPY price.
pub fn fetch_missing_prices(conn: &Connection, grade: &str) -> Result<Vec<GunplaRow>> {
    let sql = format!(
        "SELECT {} FROM gunpla g
         WHERE g.grade = ?1
           AND (g.price_jp_msrp IS NULL OR g.price_jp_msrp = 0)
           AND g.source_url IS NOT NULL AND g.source_url != ''
         ORDER BY g.id",
        GUNPLA_COLS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params![grade], GunplaRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Substring of any name or the model number.
    pub search: Option<String>,
    pub grade: Option<String>,
    pub subcategory: Option<String>,
    pub limit: Option<usize>,
}

pub fn list_gunpla(conn: &Connection, filter: &ListFilter) -> Result<Vec<GunplaRow>> {
    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(q) = &filter.search {
        conditions.push(format!(
            "(g.name_cn LIKE ?{0} OR g.name_jp LIKE ?{0} OR g.name_en LIKE ?{0} OR g.ms_number LIKE ?{0})",
            params.len() + 1
        ));
        params.push(Box::new(format!("%{}%", q)));
    }
    if let Some(g) = &filter.grade {
        conditions.push(format!("g.grade = ?{}", params.len() + 1));
        params.push(Box::new(g.clone()));
    }
    if let Some(s) = &filter.subcategory {
        conditions.push(format!("g.subcategory = ?{}", params.len() + 1));
        params.push(Box::new(s.clone()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    let sql = format!("SELECT {} FROM gunpla g{}", GUNPLA_COLS, where_clause);
    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut rows = stmt
        .query_map(param_refs.as_slice(), GunplaRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    // Display order: grade, known subcategory order, subcategory name, kit name.
    rows.sort_by(|a, b| {
        let rank = |r: &GunplaRow| subcategory_rank(r.subcategory.as_deref().unwrap_or(""));
        a.grade
            .cmp(&b.grade)
            .then_with(|| rank(a).cmp(&rank(b)))
            .then_with(|| a.subcategory.cmp(&b.subcategory))
            .then_with(|| a.name_cn.cmp(&b.name_cn))
    });
    if let Some(n) = filter.limit {
        rows.truncate(n);
    }
    Ok(rows)
}

/// Stored subcategories of a grade with their record counts.
pub fn subcategory_counts(conn: &Connection, grade: &str) -> Result<Vec<(String, usize)>> {
    let mut stmt = conn.prepare(
        "SELECT COALESCE(subcategory, ''), COUNT(*) FROM gunpla
         WHERE grade = ?1 GROUP BY 1",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![grade], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Wishlist / collection ──

pub struct WishRow {
    pub gunpla: GunplaRow,
    pub added_at: NaiveDateTime,
    pub notes: Option<String>,
}

/// False if the kit is already on the wishlist.
pub fn add_wish(conn: &Connection, gunpla_id: i64, notes: Option<&str>) -> Result<bool> {
    let n = conn.execute(
        "INSERT OR IGNORE INTO wishlist (gunpla_id, notes) VALUES (?1, ?2)",
        rusqlite::params![gunpla_id, notes],
    )?;
    Ok(n > 0)
}

pub fn remove_wish(conn: &Connection, gunpla_id: i64) -> Result<bool> {
    let n = conn.execute("DELETE FROM wishlist WHERE gunpla_id = ?1", [gunpla_id])?;
    Ok(n > 0)
}

pub fn fetch_wishlist(conn: &Connection) -> Result<Vec<WishRow>> {
    let sql = format!(
        "SELECT {}, w.added_at, w.notes FROM wishlist w
         JOIN gunpla g ON g.id = w.gunpla_id
         ORDER BY w.added_at DESC, w.id DESC",
        GUNPLA_COLS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(WishRow {
                gunpla: GunplaRow::from_row(row)?,
                added_at: row.get(EXTRA_COL)?,
                notes: row.get(EXTRA_COL + 1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Purchase {
    pub date: Option<NaiveDate>,
    pub price: Option<f64>,
    pub platform: Option<String>,
    pub notes: Option<String>,
}

pub struct OwnedRow {
    pub gunpla: GunplaRow,
    pub purchase: Purchase,
}

/// False if the kit is already in the collection.
pub fn add_owned(conn: &Connection, gunpla_id: i64, purchase: &Purchase) -> Result<bool> {
    let n = conn.execute(
        "INSERT OR IGNORE INTO collection
            (gunpla_id, purchase_date, purchase_price, purchase_platform, notes)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            gunpla_id,
            purchase.date,
            purchase.price,
            purchase.platform,
            purchase.notes
        ],
    )?;
    Ok(n > 0)
}

pub fn remove_owned(conn: &Connection, gunpla_id: i64) -> Result<bool> {
    let n = conn.execute("DELETE FROM collection WHERE gunpla_id = ?1", [gunpla_id])?;
    Ok(n > 0)
}

pub fn fetch_collection(conn: &Connection) -> Result<Vec<OwnedRow>> {
    let sql = format!(
        "SELECT {}, c.purchase_date, c.purchase_price, c.purchase_platform, c.notes
         FROM collection c
         JOIN gunpla g ON g.id = c.gunpla_id
         ORDER BY c.purchase_date DESC, c.id DESC",
        GUNPLA_COLS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(OwnedRow {
                gunpla: GunplaRow::from_row(row)?,
                purchase: Purchase {
                    date: row.get(EXTRA_COL)?,
                    price: row.get(EXTRA_COL + 1)?,
                    platform: row.get(EXTRA_COL + 2)?,
                    notes: row.get(EXTRA_COL + 3)?,
                },
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Coupons ──

pub struct NewCoupon {
    pub platform: String,
    pub coupon: Coupon,
    pub valid_from: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    pub description: Option<String>,
}

pub struct CouponRow {
    pub id: i64,
    pub platform: String,
    pub coupon: Coupon,
    pub valid_from: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
}

impl CouponRow {
    /// Inside the validity window; open ends are unbounded.
    pub fn is_valid_on(&self, day: NaiveDate) -> bool {
        !self.valid_until.is_some_and(|until| day > until)
            && !self.valid_from.is_some_and(|from| day < from)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let kind: String = row.get(2)?;
        let value: f64 = row.get(3)?;
        let kind = match kind.as_str() {
            "percentage" => CouponKind::Percentage {
                percent: value,
                max_discount: row.get(4)?,
            },
            "fixed_amount" => CouponKind::Fixed { amount: value },
            other => {
                return Err(rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    format!("unknown discount type {:?}", other).into(),
                ))
            }
        };
        Ok(CouponRow {
            id: row.get(0)?,
            platform: row.get(1)?,
            coupon: Coupon {
                kind,
                min_purchase: row.get(5)?,
            },
            valid_from: row.get(6)?,
            valid_until: row.get(7)?,
            description: row.get(8)?,
            created_at: row.get(9)?,
        })
    }
}

const COUPON_COLS: &str = "id, platform, discount_type, discount_value, max_discount,
    min_purchase, valid_from, valid_until, description, created_at";

pub fn add_coupon(conn: &Connection, c: &NewCoupon) -> Result<i64> {
    let (kind, value, max_discount) = match c.coupon.kind {
        CouponKind::Percentage { percent, max_discount } => ("percentage", percent, max_discount),
        CouponKind::Fixed { amount } => ("fixed_amount", amount, None),
    };
    conn.execute(
        "INSERT INTO coupons (platform, discount_type, discount_value, max_discount,
            min_purchase, valid_from, valid_until, description)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            c.platform,
            kind,
            value,
            max_discount,
            c.coupon.min_purchase,
            c.valid_from,
            c.valid_until,
            c.description,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_coupon(conn: &Connection, id: i64) -> Result<Option<CouponRow>> {
    let sql = format!("SELECT {} FROM coupons WHERE id = ?1", COUPON_COLS);
    let row = conn
        .query_row(&sql, [id], CouponRow::from_row)
        .optional()?;
    Ok(row)
}

pub fn fetch_coupons(conn: &Connection) -> Result<Vec<CouponRow>> {
    let sql = format!("SELECT {} FROM coupons ORDER BY created_at DESC, id DESC", COUPON_COLS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], CouponRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn remove_coupon(conn: &Connection, id: i64) -> Result<bool> {
    let n = conn.execute("DELETE FROM coupons WHERE id = ?1", [id])?;
    Ok(n > 0)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub with_price: usize,
    pub without_subcategory: usize,
    pub wishlist: usize,
    pub collection: usize,
    pub by_grade: Vec<(String, usize)>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    let total = count("SELECT COUNT(*) FROM gunpla")?;
    let with_price = count("SELECT COUNT(*) FROM gunpla WHERE price_jp_msrp > 0")?;
    let without_subcategory =
        count("SELECT COUNT(*) FROM gunpla WHERE subcategory IS NULL OR subcategory = ''")?;
    let wishlist = count("SELECT COUNT(*) FROM wishlist")?;
    let collection = count("SELECT COUNT(*) FROM collection")?;

    let mut stmt =
        conn.prepare("SELECT grade, COUNT(*) FROM gunpla GROUP BY grade ORDER BY COUNT(*) DESC")?;
    let by_grade = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Stats {
        total,
        with_price,
        without_subcategory,
        wishlist,
        collection,
        by_grade,
    })
}

#[cfg(test)]
pub(crate) fn memory() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
    init_schema(&conn).unwrap();
    conn
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rx78() -> GunplaPatch {
        GunplaPatch {
            subcategory: Some("普通版".into()),
            ms_number: Some("RX-78-2".into()),
            source_url: Some("https://acg.78dm.net/ct/2001.html".into()),
            price_jp_msrp: Some(4500.0),
            ..Default::default()
        }
    }

    #[test]
    fn insert_then_find() {
        let conn = memory();
        let id = insert_gunpla(&conn, "RX-78-2 高达 RG", "RG", "RG系列拼装模型", &rx78()).unwrap();
        let row = find_gunpla(&conn, "RX-78-2 高达 RG", "RG").unwrap().unwrap();
        assert_eq!(row.id, id);
        assert_eq!(row.series.as_deref(), Some("RG系列拼装模型"));
        assert_eq!(row.price_jp_msrp, Some(4500.0));
        assert_eq!(row.price_us_msrp, None);
        assert!(find_gunpla(&conn, "RX-78-2 高达 RG", "MG").unwrap().is_none());
    }

    #[test]
    fn name_and_grade_are_unique() {
        let conn = memory();
        insert_gunpla(&conn, "RX-78-2 高达 RG", "RG", "s", &rx78()).unwrap();
        assert!(insert_gunpla(&conn, "RX-78-2 高达 RG", "RG", "s", &rx78()).is_err());
        assert!(insert_gunpla(&conn, "RX-78-2 高达 RG", "MG", "s", &rx78()).is_ok());
    }

    #[test]
    fn update_touches_only_patched_columns() {
        let conn = memory();
        let id = insert_gunpla(&conn, "MS-06S 扎古", "RG", "s", &GunplaPatch::default()).unwrap();
        let patch = GunplaPatch { price_cn_msrp: Some(125.0), ..Default::default() };
        update_gunpla(&conn, id, &patch).unwrap();
        let row = get_gunpla(&conn, id).unwrap().unwrap();
        assert_eq!(row.price_cn_msrp, Some(125.0));
        assert_eq!(row.subcategory, None);
    }

    #[test]
    fn missing_prices_need_a_url() {
        let conn = memory();
        let with_url = GunplaPatch {
            source_url: Some("https://acg.78dm.net/ct/1.html".into()),
            ..Default::default()
        };
        insert_gunpla(&conn, "A 高达", "RG", "s", &with_url).unwrap();
        insert_gunpla(&conn, "B 高达", "RG", "s", &GunplaPatch::default()).unwrap();
        insert_gunpla(&conn, "C 高达", "RG", "s", &rx78()).unwrap();
        let rows = fetch_missing_prices(&conn, "RG").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name_cn, "A 高达");
    }

    #[test]
    fn list_filters_combine() {
        let conn = memory();
        insert_gunpla(&conn, "RX-78-2 高达 RG", "RG", "s", &rx78()).unwrap();
        insert_gunpla(&conn, "RX-78-2 高达 MG", "MG", "s", &rx78()).unwrap();
        insert_gunpla(&conn, "MS-06S 扎古", "RG", "s", &rx78()).unwrap();

        let f = ListFilter { search: Some("高达".into()), ..Default::default() };
        assert_eq!(list_gunpla(&conn, &f).unwrap().len(), 2);
        let f = ListFilter {
            search: Some("高达".into()),
            grade: Some("RG".into()),
            ..Default::default()
        };
        assert_eq!(list_gunpla(&conn, &f).unwrap().len(), 1);
        let f = ListFilter { limit: Some(1), ..Default::default() };
        assert_eq!(list_gunpla(&conn, &f).unwrap().len(), 1);
    }

    #[test]
    fn search_covers_other_names_and_model_number() {
        let conn = memory();
        let kit = NewGunpla {
            name_cn: "夏亚专用扎古II".into(),
            name_jp: Some("シャア専用ザクII".into()),
            name_en: Some("Char's Zaku II".into()),
            grade: "RG".into(),
            ms_number: Some("MS-06S".into()),
            ..Default::default()
        };
        add_gunpla(&conn, &kit).unwrap();
        insert_gunpla(&conn, "RX-78-2 高达 RG", "RG", "s", &rx78()).unwrap();

        let names = |q: &str| -> Vec<String> {
            let f = ListFilter { search: Some(q.into()), ..Default::default() };
            list_gunpla(&conn, &f).unwrap().into_iter().map(|r| r.name_cn).collect()
        };
        assert_eq!(names("MS-06"), vec!["夏亚专用扎古II"]);
        assert_eq!(names("ザク"), vec!["夏亚专用扎古II"]);
        assert_eq!(names("Zaku"), vec!["夏亚专用扎古II"]);
        assert_eq!(names("RX-78"), vec!["RX-78-2 高达 RG"]);
    }

    #[test]
    fn limit_applies_after_display_order() {
        let conn = memory();
        for (name, sub) in [
            ("A", "其他限定版"),
            ("B", "其他限定版"),
            ("C", "普通版"),
            ("D", "普通版"),
            ("E", "普通版"),
            ("F", "参考出品/开发中"),
        ] {
            let patch = GunplaPatch { subcategory: Some(sub.into()), ..Default::default() };
            insert_gunpla(&conn, name, "RG", "s", &patch).unwrap();
        }
        let f = ListFilter { limit: Some(3), ..Default::default() };
        let rows = list_gunpla(&conn, &f).unwrap();
        let got: Vec<&str> = rows.iter().map(|r| r.name_cn.as_str()).collect();
        assert_eq!(got, vec!["C", "D", "E"]);

        let all = list_gunpla(&conn, &ListFilter::default()).unwrap();
        let subs: Vec<&str> = all.iter().filter_map(|r| r.subcategory.as_deref()).collect();
        assert_eq!(subs, vec!["普通版", "普通版", "普通版", "其他限定版", "其他限定版", "参考出品/开发中"]);
    }

    #[test]
    fn manual_add_keeps_every_price_and_stays_unique() {
        let conn = memory();
        let kit = NewGunpla {
            name_cn: "自由高达 成品".into(),
            grade: "成品".into(),
            price_jp_market: Some(12000.0),
            price_cn_msrp: Some(599.0),
            price_cn_market: Some(480.0),
            ..Default::default()
        };
        let id = add_gunpla(&conn, &kit).unwrap();
        let row = get_gunpla(&conn, id).unwrap().unwrap();
        assert_eq!(row.grade, "成品");
        assert_eq!(row.price_jp_market, Some(12000.0));
        assert_eq!(row.price_cn_market, Some(480.0));
        assert_eq!(row.series, None);
        assert!(add_gunpla(&conn, &kit).is_err());
    }

    #[test]
    fn coupons_round_trip_and_validity() {
        let conn = memory();
        let day = |m, d| NaiveDate::from_ymd_opt(2024, m, d).unwrap();
        let id = add_coupon(
            &conn,
            &NewCoupon {
                platform: "淘宝".into(),
                coupon: Coupon {
                    kind: CouponKind::Percentage { percent: 15.0, max_discount: Some(40.0) },
                    min_purchase: Some(100.0),
                },
                valid_from: Some(day(6, 1)),
                valid_until: Some(day(6, 18)),
                description: Some("618".into()),
            },
        )
        .unwrap();
        add_coupon(
            &conn,
            &NewCoupon {
                platform: "拼多多".into(),
                coupon: Coupon { kind: CouponKind::Fixed { amount: 20.0 }, min_purchase: None },
                valid_from: None,
                valid_until: None,
                description: None,
            },
        )
        .unwrap();

        let c = get_coupon(&conn, id).unwrap().unwrap();
        assert_eq!(c.coupon.kind, CouponKind::Percentage { percent: 15.0, max_discount: Some(40.0) });
        assert_eq!(c.coupon.min_purchase, Some(100.0));
        assert!(c.is_valid_on(day(6, 1)));
        assert!(c.is_valid_on(day(6, 18)));
        assert!(!c.is_valid_on(day(5, 31)));
        assert!(!c.is_valid_on(day(6, 19)));

        let all = fetch_coupons(&conn).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|c| c.platform == "拼多多" && c.is_valid_on(day(1, 1))));
        assert!(remove_coupon(&conn, id).unwrap());
        assert!(get_coupon(&conn, id).unwrap().is_none());
    }

    #[test]
    fn wishlist_and_collection() {
        let conn = memory();
        let id = insert_gunpla(&conn, "RX-78-2 高达 RG", "RG", "s", &rx78()).unwrap();
        assert!(add_wish(&conn, id, Some("生日")).unwrap());
        assert!(!add_wish(&conn, id, None).unwrap());
        let wishes = fetch_wishlist(&conn).unwrap();
        assert_eq!(wishes.len(), 1);
        assert_eq!(wishes[0].notes.as_deref(), Some("生日"));

        let purchase = Purchase {
            date: NaiveDate::from_ymd_opt(2024, 5, 1),
            price: Some(180.0),
            platform: Some("淘宝".into()),
            notes: None,
        };
        assert!(add_owned(&conn, id, &purchase).unwrap());
        let owned = fetch_collection(&conn).unwrap();
        assert_eq!(owned[0].purchase, purchase);

        assert!(remove_wish(&conn, id).unwrap());
        assert!(!remove_wish(&conn, id).unwrap());
        assert!(remove_owned(&conn, id).unwrap());
    }

    #[test]
    fn market_prices_keep_unset_columns() {
        let conn = memory();
        let id = insert_gunpla(&conn, "RX-78-2 高达 RG", "RG", "s", &rx78()).unwrap();
        set_market_prices(&conn, id, MarketPrices { jp: None, us: None, cn: Some(180.0) }).unwrap();
        set_market_prices(&conn, id, MarketPrices { jp: Some(4000.0), us: None, cn: None }).unwrap();
        let row = get_gunpla(&conn, id).unwrap().unwrap();
        assert_eq!(row.price_cn_market, Some(180.0));
        assert_eq!(row.price_jp_market, Some(4000.0));
    }

    #[test]
    fn stats_count_everything() {
        let conn = memory();
        let id = insert_gunpla(&conn, "RX-78-2 高达 RG", "RG", "s", &rx78()).unwrap();
        insert_gunpla(&conn, "MS-06S 扎古", "RG", "s", &GunplaPatch::default()).unwrap();
        add_wish(&conn, id, None).unwrap();
        let s = get_stats(&conn).unwrap();
        assert_eq!(s.total, 2);
        assert_eq!(s.with_price, 1);
        assert_eq!(s.without_subcategory, 1);
        assert_eq!(s.wishlist, 1);
        assert_eq!(s.by_grade, vec![("RG".to_string(), 2)]);
    }
}
