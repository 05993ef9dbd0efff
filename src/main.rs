mod config;
mod coupons;
mod csv_io;
mod db;
mod fetch;
mod parser;
mod pricing;
mod scrape;
mod upsert;
mod vocab;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::builder::PossibleValuesParser;
use clap::{Parser, Subcommand};
use tracing::warn;

use config::{ScrapeArgs, ScrapeConfig};
use csv_io::ListKind;
use fetch::Fetcher;
use pricing::{Coupon, CouponKind};
use upsert::{MergeMode, MergeOptions};

#[derive(Parser)]
#[command(name = "gunpla_scraper", about = "Gunpla catalog scraper for acg.78dm.net")]
struct Cli {
    /// SQLite catalog path
    #[arg(long, global = true, env = "GUNPLA_DB", default_value = config::DEFAULT_DB_PATH)]
    db: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape grade listings (and detail-page prices) into the catalog
    Scrape {
        /// Grades to scrape, e.g. RG HGIBO
        #[arg(required = true)]
        grades: Vec<String>,
        #[command(flatten)]
        args: ScrapeArgs,
        /// Skip detail pages
        #[arg(long)]
        no_prices: bool,
        /// Print items as JSON instead of storing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Re-scrape listings and overwrite stored subcategories
    Fix {
        #[arg(required = true)]
        grades: Vec<String>,
        #[command(flatten)]
        args: ScrapeArgs,
    },
    /// Fetch prices for stored records of a grade that have none
    Prices {
        grade: String,
        #[command(flatten)]
        args: ScrapeArgs,
    },
    /// Built-in grades, or grade links found on the site index
    Grades {
        #[arg(long)]
        discover: bool,
    },
    /// Catalog statistics
    Stats,
    /// Catalog table
    List {
        /// Substring of a name (CN, JP, EN) or model number
        #[arg(short = 'q', long)]
        search: Option<String>,
        #[arg(short, long)]
        grade: Option<String>,
        #[arg(short, long)]
        subcategory: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Add a kit to the catalog by hand
    Add {
        /// Chinese name
        name: String,
        #[arg(
            short,
            long,
            value_parser = PossibleValuesParser::new(vocab::CATALOG_GRADES.iter().copied())
        )]
        grade: String,
        #[arg(long)]
        name_jp: Option<String>,
        #[arg(long)]
        name_en: Option<String>,
        /// Model number; taken from the name when omitted
        #[arg(long)]
        ms_number: Option<String>,
        #[arg(long)]
        series: Option<String>,
        #[arg(long)]
        subcategory: Option<String>,
        #[arg(long)]
        jp_msrp: Option<f64>,
        #[arg(long)]
        jp_market: Option<f64>,
        #[arg(long)]
        us_msrp: Option<f64>,
        #[arg(long)]
        us_market: Option<f64>,
        #[arg(long)]
        cn_msrp: Option<f64>,
        #[arg(long)]
        cn_market: Option<f64>,
    },
    /// Wishlist
    Wish {
        #[command(subcommand)]
        action: ListAction,
    },
    /// Owned kits
    Own {
        #[command(subcommand)]
        action: ListAction,
    },
    /// Record market prices for a kit
    Market {
        name: String,
        #[arg(short, long)]
        grade: Option<String>,
        #[arg(long)]
        jp: Option<f64>,
        #[arg(long)]
        us: Option<f64>,
        #[arg(long)]
        cn: Option<f64>,
    },
    /// Export a list as CSV (stdout unless --out)
    Export {
        #[arg(value_enum)]
        kind: ListKind,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Import a list from CSV
    Import {
        #[arg(value_enum)]
        kind: ListKind,
        path: PathBuf,
    },
    /// Stored coupons
    Coupon {
        #[command(subcommand)]
        action: CouponAction,
    },
    /// Apply a coupon to a price
    Discount {
        price: f64,
        /// Percentage off
        #[arg(long, conflicts_with = "amount", required_unless_present = "amount")]
        percent: Option<f64>,
        /// Fixed amount off
        #[arg(long)]
        amount: Option<f64>,
        /// Cap for percentage coupons
        #[arg(long)]
        max_discount: Option<f64>,
        #[arg(long)]
        min_purchase: Option<f64>,
    },
}

#[derive(Subcommand)]
enum CouponAction {
    /// Store a coupon
    Add {
        /// Shop or platform, e.g. 淘宝
        #[arg(long)]
        platform: String,
        #[arg(long, conflicts_with = "amount", required_unless_present = "amount")]
        percent: Option<f64>,
        #[arg(long)]
        amount: Option<f64>,
        #[arg(long)]
        max_discount: Option<f64>,
        #[arg(long)]
        min_purchase: Option<f64>,
        /// First valid day, YYYY-MM-DD
        #[arg(long)]
        from: Option<String>,
        /// Last valid day, YYYY-MM-DD
        #[arg(long)]
        until: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// All coupons with their validity today
    List,
    Remove {
        id: i64,
    },
    /// Apply a coupon to every wishlist kit's CNY market price
    Analyze {
        id: i64,
    },
}

#[derive(Subcommand)]
enum ListAction {
    /// Add a catalog kit
    Add {
        name: String,
        #[arg(short, long)]
        grade: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Purchase price (collection only)
        #[arg(long)]
        price: Option<f64>,
        /// Shop or platform (collection only)
        #[arg(long)]
        platform: Option<String>,
        /// Purchase date, YYYY-MM-DD (collection only)
        #[arg(long)]
        date: Option<String>,
    },
    /// Remove a kit
    Remove {
        name: String,
        #[arg(short, long)]
        grade: Option<String>,
    },
    /// Show the list
    Show,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Scrape { grades, args, no_prices, dry_run } => {
            let configs = resolve_grades(&grades, &args)?;
            let conn = if dry_run { None } else { Some(open_db(&cli.db)?) };
            let fetcher = Fetcher::new()?;

            for (i, cfg) in configs.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(cfg.timing.grade_delay).await;
                }
                let mut listing = match scrape::scrape_grade(&fetcher, cfg).await {
                    Ok(l) => l,
                    Err(e) => {
                        warn!("Skipping {}: {:#}", cfg.profile.grade, e);
                        continue;
                    }
                };
                println!("── {} ──", cfg.profile.grade);
                listing.print_summary();
                if !no_prices {
                    let stats = scrape::enrich_prices(&fetcher, &mut listing.items, cfg).await?;
                    stats.print();
                }
                match &conn {
                    None => println!("{}", serde_json::to_string_pretty(&listing.items)?),
                    Some(conn) => {
                        let opts = MergeOptions::new(MergeMode::Backfill, &cfg.profile.series);
                        upsert::merge_items(conn, &listing.items, &opts)?.print();
                    }
                }
            }
            Ok(())
        }
        Commands::Fix { grades, args } => {
            let configs = resolve_grades(&grades, &args)?;
            let conn = open_db(&cli.db)?;
            let fetcher = Fetcher::new()?;

            for (i, cfg) in configs.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(cfg.timing.grade_delay).await;
                }
                let listing = match scrape::scrape_grade(&fetcher, cfg).await {
                    Ok(l) => l,
                    Err(e) => {
                        warn!("Skipping {}: {:#}", cfg.profile.grade, e);
                        continue;
                    }
                };
                println!("── {} ──", cfg.profile.grade);
                listing.print_summary();
                let opts = MergeOptions::new(MergeMode::Overwrite, &cfg.profile.series);
                upsert::merge_items(&conn, &listing.items, &opts)?.print();
                print_stored_subcategories(&conn, &cfg.profile.grade)?;
            }
            Ok(())
        }
        Commands::Prices { grade, args } => {
            let cfg = ScrapeConfig::resolve_offline(&grade, &args)?;
            let conn = open_db(&cli.db)?;
            let fetcher = Fetcher::new()?;
            let stats = scrape::refresh_prices(&fetcher, &conn, &cfg).await?;
            if stats.fetched == 0 {
                println!("No {} records are missing a price.", grade);
            } else {
                stats.print();
            }
            Ok(())
        }
        Commands::Grades { discover } => {
            if discover {
                let fetcher = Fetcher::new()?;
                let timing = config::Timing::with_delay(std::time::Duration::ZERO);
                let links =
                    scrape::discover_grades(&fetcher, config::SITE_INDEX_URL, &timing).await?;
                for (label, url) in &links {
                    let known = config::known_grades().any(|(g, _)| g == label.as_str());
                    println!("{:<12} {}{}", label, url, if known { "  (built-in)" } else { "" });
                }
                println!("\n{} grade links found", links.len());
            } else {
                for (grade, url) in config::known_grades() {
                    println!("{:<12} {}", grade, url);
                }
            }
            Ok(())
        }
        Commands::Stats => {
            let conn = open_db(&cli.db)?;
            let s = db::get_stats(&conn)?;
            println!("Kits:           {}", s.total);
            println!("With JPY price: {}", s.with_price);
            println!("No subcategory: {}", s.without_subcategory);
            println!("Wishlist:       {}", s.wishlist);
            println!("Collection:     {}", s.collection);
            if !s.by_grade.is_empty() {
                println!("\n--- By grade ---");
                for (grade, n) in &s.by_grade {
                    println!("  {:<12} {:>5}", grade, n);
                }
            }
            Ok(())
        }
        Commands::List { search, grade, subcategory, limit } => {
            let conn = open_db(&cli.db)?;
            let filter = db::ListFilter { search, grade, subcategory, limit: Some(limit) };
            let rows = db::list_gunpla(&conn, &filter)?;
            if rows.is_empty() {
                println!("No kits found.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<30} | {:<7} | {:<14} | {:>7} | {:>7} | {:>7}",
                "#", "Name", "Grade", "Subcategory", "JPY", "CNY", "算"
            );
            println!("{}", "-".repeat(94));
            for (i, r) in rows.iter().enumerate() {
                let ratio = pricing::value_ratio(r.price_jp_msrp, r.price_cn_market);
                println!(
                    "{:>3} | {:<30} | {:<7} | {:<14} | {:>7} | {:>7} | {:>7}",
                    i + 1,
                    truncate(&r.name_cn, 30),
                    r.grade,
                    truncate(r.subcategory.as_deref().unwrap_or("-"), 14),
                    fmt_price(r.price_jp_msrp),
                    fmt_price(r.price_cn_msrp),
                    fmt_price(ratio),
                );
            }
            println!("\n{} kits", rows.len());
            Ok(())
        }
        Commands::Add {
            name,
            grade,
            name_jp,
            name_en,
            ms_number,
            series,
            subcategory,
            jp_msrp,
            jp_market,
            us_msrp,
            us_market,
            cn_msrp,
            cn_market,
        } => {
            let conn = open_db(&cli.db)?;
            let kit = db::NewGunpla {
                ms_number: ms_number.or_else(|| parser::extract::model_number::extract(&name)),
                name_cn: name,
                name_jp,
                name_en,
                grade,
                series,
                subcategory,
                price_jp_msrp: jp_msrp,
                price_jp_market: jp_market,
                price_us_msrp: us_msrp,
                price_us_market: us_market,
                price_cn_msrp: cn_msrp,
                price_cn_market: cn_market,
            };
            let id = db::add_gunpla(&conn, &kit)?;
            println!("Added {} ({}) as #{}.", kit.name_cn, kit.grade, id);
            Ok(())
        }
        Commands::Wish { action } => {
            let conn = open_db(&cli.db)?;
            match action {
                ListAction::Add { name, grade, notes, .. } => {
                    let g = find_kit(&conn, &name, grade.as_deref())?;
                    if db::add_wish(&conn, g.id, notes.as_deref())? {
                        println!("Added {} ({}) to the wishlist.", g.name_cn, g.grade);
                    } else {
                        println!("{} ({}) is already on the wishlist.", g.name_cn, g.grade);
                    }
                }
                ListAction::Remove { name, grade } => {
                    let g = find_kit(&conn, &name, grade.as_deref())?;
                    if db::remove_wish(&conn, g.id)? {
                        println!("Removed {} ({}) from the wishlist.", g.name_cn, g.grade);
                    } else {
                        println!("{} ({}) was not on the wishlist.", g.name_cn, g.grade);
                    }
                }
                ListAction::Show => {
                    let rows = db::fetch_wishlist(&conn)?;
                    for r in &rows {
                        println!(
                            "{} | {:<30} | {:<7} | {:>7} | {}",
                            r.added_at.format("%Y-%m-%d"),
                            truncate(&r.gunpla.name_cn, 30),
                            r.gunpla.grade,
                            fmt_price(r.gunpla.price_jp_msrp),
                            r.notes.as_deref().unwrap_or("")
                        );
                    }
                    println!("\n{} kits wanted", rows.len());
                }
            }
            Ok(())
        }
        Commands::Own { action } => {
            let conn = open_db(&cli.db)?;
            match action {
                ListAction::Add { name, grade, notes, price, platform, date } => {
                    let g = find_kit(&conn, &name, grade.as_deref())?;
                    let date = parse_day(date.as_deref())?;
                    let purchase = db::Purchase { date, price, platform, notes };
                    if db::add_owned(&conn, g.id, &purchase)? {
                        println!("Added {} ({}) to the collection.", g.name_cn, g.grade);
                    } else {
                        println!("{} ({}) is already in the collection.", g.name_cn, g.grade);
                    }
                }
                ListAction::Remove { name, grade } => {
                    let g = find_kit(&conn, &name, grade.as_deref())?;
                    if db::remove_owned(&conn, g.id)? {
                        println!("Removed {} ({}) from the collection.", g.name_cn, g.grade);
                    } else {
                        println!("{} ({}) was not in the collection.", g.name_cn, g.grade);
                    }
                }
                ListAction::Show => {
                    let rows = db::fetch_collection(&conn)?;
                    let mut spent = 0.0;
                    for r in &rows {
                        spent += r.purchase.price.unwrap_or(0.0);
                        println!(
                            "{:<10} | {:<30} | {:<7} | {:>7} | {}",
                            r.purchase
                                .date
                                .map(|d| d.format("%Y-%m-%d").to_string())
                                .unwrap_or_else(|| "-".into()),
                            truncate(&r.gunpla.name_cn, 30),
                            r.gunpla.grade,
                            fmt_price(r.purchase.price),
                            r.purchase.platform.as_deref().unwrap_or("")
                        );
                    }
                    println!("\n{} kits owned, {:.2} spent", rows.len(), spent);
                }
            }
            Ok(())
        }
        Commands::Market { name, grade, jp, us, cn } => {
            if jp.is_none() && us.is_none() && cn.is_none() {
                bail!("give at least one of --jp, --us, --cn");
            }
            let conn = open_db(&cli.db)?;
            let g = find_kit(&conn, &name, grade.as_deref())?;
            db::set_market_prices(&conn, g.id, db::MarketPrices { jp, us, cn })?;
            let g = db::get_gunpla(&conn, g.id)?.context("kit vanished after update")?;
            match pricing::value_ratio(g.price_jp_msrp, g.price_cn_market) {
                Some(r) => println!("{} ({}): 算 {:.2}", g.name_cn, g.grade, r),
                None => println!("{} ({}): market prices updated", g.name_cn, g.grade),
            }
            Ok(())
        }
        Commands::Export { kind, out } => {
            let conn = open_db(&cli.db)?;
            match out {
                Some(path) => {
                    let file = std::fs::File::create(&path)
                        .with_context(|| format!("failed to create {}", path.display()))?;
                    let n = csv_io::export(&conn, kind, file)?;
                    println!("Exported {} rows to {}", n, path.display());
                }
                None => {
                    csv_io::export(&conn, kind, std::io::stdout().lock())?;
                }
            }
            Ok(())
        }
        Commands::Import { kind, path } => {
            let conn = open_db(&cli.db)?;
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            csv_io::import(&conn, kind, &content)?.print();
            Ok(())
        }
        Commands::Coupon { action } => {
            let conn = open_db(&cli.db)?;
            match action {
                CouponAction::Add {
                    platform,
                    percent,
                    amount,
                    max_discount,
                    min_purchase,
                    from,
                    until,
                    description,
                } => {
                    let kind = coupon_kind(percent, amount, max_discount)?;
                    let valid_from = parse_day(from.as_deref())?;
                    let valid_until = parse_day(until.as_deref())?;
                    if let (Some(f), Some(u)) = (valid_from, valid_until) {
                        if f > u {
                            bail!("coupon validity ends ({}) before it starts ({})", u, f);
                        }
                    }
                    let coupon = db::NewCoupon {
                        platform,
                        coupon: Coupon { kind, min_purchase },
                        valid_from,
                        valid_until,
                        description,
                    };
                    let id = db::add_coupon(&conn, &coupon)?;
                    println!("Stored coupon #{} ({}).", id, describe_coupon(&coupon.coupon));
                }
                CouponAction::List => {
                    let today = chrono::Local::now().date_naive();
                    let rows = db::fetch_coupons(&conn)?;
                    for c in &rows {
                        let window = match (c.valid_from, c.valid_until) {
                            (None, None) => "always".to_string(),
                            (f, u) => format!(
                                "{} ~ {}",
                                f.map(|d| d.to_string()).unwrap_or_default(),
                                u.map(|d| d.to_string()).unwrap_or_default()
                            ),
                        };
                        println!(
                            "#{:<3} {:<8} {:<28} {:<24} {:<7} added {} {}",
                            c.id,
                            c.platform,
                            describe_coupon(&c.coupon),
                            window,
                            if c.is_valid_on(today) { "valid" } else { "expired" },
                            c.created_at.date(),
                            c.description.as_deref().unwrap_or("")
                        );
                    }
                    println!("\n{} coupons", rows.len());
                }
                CouponAction::Remove { id } => {
                    if db::remove_coupon(&conn, id)? {
                        println!("Removed coupon #{}.", id);
                    } else {
                        println!("No coupon #{}.", id);
                    }
                }
                CouponAction::Analyze { id } => {
                    let c = db::get_coupon(&conn, id)?.with_context(|| format!("no coupon #{}", id))?;
                    if !c.is_valid_on(chrono::Local::now().date_naive()) {
                        warn!("Coupon #{} is outside its validity window", id);
                    }
                    println!("Coupon #{} {}: {}", c.id, c.platform, describe_coupon(&c.coupon));
                    coupons::analyze_wishlist(&conn, &c.coupon)?.print();
                }
            }
            Ok(())
        }
        Commands::Discount { price, percent, amount, max_discount, min_purchase } => {
            let coupon = Coupon { kind: coupon_kind(percent, amount, max_discount)?, min_purchase };
            match coupon.apply(price) {
                Some(d) => println!(
                    "Final {:.2} (save {:.2}, {:.2}% off)",
                    d.final_price, d.savings, d.discount_rate
                ),
                None => println!("Coupon needs a purchase of at least {:.2}", min_purchase.unwrap_or(0.0)),
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Resolve every grade's config up front so bad input fails before any request.
fn resolve_grades(grades: &[String], args: &ScrapeArgs) -> anyhow::Result<Vec<ScrapeConfig>> {
    if args.url.is_some() && grades.len() > 1 {
        bail!("--url applies to a single grade");
    }
    grades.iter().map(|g| ScrapeConfig::resolve(g, args)).collect()
}

fn coupon_kind(
    percent: Option<f64>,
    amount: Option<f64>,
    max_discount: Option<f64>,
) -> anyhow::Result<CouponKind> {
    match (percent, amount) {
        (Some(percent), _) => Ok(CouponKind::Percentage { percent, max_discount }),
        (None, Some(amount)) => Ok(CouponKind::Fixed { amount }),
        (None, None) => bail!("give --percent or --amount"),
    }
}

fn describe_coupon(c: &Coupon) -> String {
    let mut s = match c.kind {
        CouponKind::Percentage { percent, max_discount: Some(cap) } => {
            format!("{}% off, up to {}", percent, cap)
        }
        CouponKind::Percentage { percent, max_discount: None } => format!("{}% off", percent),
        CouponKind::Fixed { amount } => format!("{} off", amount),
    };
    if let Some(min) = c.min_purchase {
        s.push_str(&format!(" over {}", min));
    }
    s
}

fn parse_day(s: Option<&str>) -> anyhow::Result<Option<NaiveDate>> {
    match s {
        Some(s) => {
            let day = csv_io::parse_date(s).with_context(|| format!("unrecognised date {:?}", s))?;
            Ok(Some(day))
        }
        None => Ok(None),
    }
}

fn open_db(path: &Path) -> anyhow::Result<rusqlite::Connection> {
    let conn = db::connect(path)?;
    db::init_schema(&conn)?;
    Ok(conn)
}

fn find_kit(
    conn: &rusqlite::Connection,
    name: &str,
    grade: Option<&str>,
) -> anyhow::Result<db::GunplaRow> {
    db::lookup_gunpla(conn, name, grade)?.with_context(|| match grade {
        Some(g) => format!("no kit named {:?} in grade {}", name, g),
        None => format!("no kit named {:?}", name),
    })
}

fn print_stored_subcategories(conn: &rusqlite::Connection, grade: &str) -> anyhow::Result<()> {
    let mut counts = db::subcategory_counts(conn, grade)?;
    counts.sort_by(|a, b| {
        vocab::subcategory_rank(&a.0)
            .cmp(&vocab::subcategory_rank(&b.0))
            .then_with(|| a.0.cmp(&b.0))
    });
    println!("Stored {} subcategories:", grade);
    for (label, n) in counts {
        let label = if label.is_empty() { "-".to_string() } else { label };
        println!("  {:<20} {:>4}", label, n);
    }
    Ok(())
}

fn fmt_price(v: Option<f64>) -> String {
    v.map(|p| format!("{:.0}", p)).unwrap_or_else(|| "-".into())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
