use anyhow::Result;
use rusqlite::Connection;

use crate::db::{self, GunplaRow};
use crate::pricing::{Coupon, Discount};

pub struct KitSaving {
    pub gunpla: GunplaRow,
    pub price: f64,
    pub discount: Discount,
}

/// A coupon applied to every wishlist kit with a CNY market price.
pub struct Analysis {
    pub rows: Vec<KitSaving>,
    pub unpriced: usize,
    pub below_minimum: usize,
}

impl Analysis {
    pub fn print(&self) {
        for r in &self.rows {
            println!(
                "{:<30} | {:<7} | {:>8.2} | {:>8.2} | {:>7.2} | {:>6.2}%",
                r.gunpla.name_cn,
                r.gunpla.grade,
                r.price,
                r.discount.final_price,
                r.discount.savings,
                r.discount.discount_rate
            );
        }
        println!(
            "\n{} kits analysed, {} without a market price, {} below the minimum purchase",
            self.rows.len(),
            self.unpriced,
            self.below_minimum
        );
    }
}

/// Largest savings first.
pub fn analyze_wishlist(conn: &Connection, coupon: &Coupon) -> Result<Analysis> {
    let mut analysis = Analysis {
        rows: Vec::new(),
        unpriced: 0,
        below_minimum: 0,
    };
    for wish in db::fetch_wishlist(conn)? {
        let Some(price) = wish.gunpla.price_cn_market.filter(|p| *p > 0.0) else {
            analysis.unpriced += 1;
            continue;
        };
        match coupon.apply(price) {
            Some(discount) => analysis.rows.push(KitSaving {
                gunpla: wish.gunpla,
                price,
                discount,
            }),
            None => analysis.below_minimum += 1,
        }
    }
    analysis
        .rows
        .sort_by(|a, b| b.discount.savings.total_cmp(&a.discount.savings));
    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{memory, MarketPrices, NewGunpla};
    use crate::pricing::CouponKind;

    fn wish(conn: &Connection, name: &str, cn_market: Option<f64>) {
        let kit = NewGunpla {
            name_cn: name.into(),
            grade: "RG".into(),
            ..Default::default()
        };
        let id = db::add_gunpla(conn, &kit).unwrap();
        db::set_market_prices(conn, id, MarketPrices { jp: None, us: None, cn: cn_market }).unwrap();
        db::add_wish(conn, id, None).unwrap();
    }

    #[test]
    fn sorted_by_savings_with_skips_counted() {
        let conn = memory();
        wish(&conn, "便宜", Some(80.0));
        wish(&conn, "中等", Some(200.0));
        wish(&conn, "昂贵", Some(600.0));
        wish(&conn, "没价格", None);

        let coupon = Coupon {
            kind: CouponKind::Percentage { percent: 10.0, max_discount: Some(50.0) },
            min_purchase: Some(100.0),
        };
        let a = analyze_wishlist(&conn, &coupon).unwrap();
        let names: Vec<&str> = a.rows.iter().map(|r| r.gunpla.name_cn.as_str()).collect();
        assert_eq!(names, vec!["昂贵", "中等"]);
        assert_eq!(a.rows[0].discount.savings, 50.0);
        assert_eq!(a.rows[0].discount.final_price, 550.0);
        assert_eq!(a.rows[1].discount.savings, 20.0);
        assert_eq!(a.unpriced, 1);
        assert_eq!(a.below_minimum, 1);
    }

    #[test]
    fn empty_wishlist() {
        let conn = memory();
        let coupon = Coupon { kind: CouponKind::Fixed { amount: 10.0 }, min_purchase: None };
        let a = analyze_wishlist(&conn, &coupon).unwrap();
        assert!(a.rows.is_empty());
        assert_eq!(a.unpriced, 0);
    }
}
