use serde::{Deserialize, Serialize};

/// JPY per CNY used for the value ratio.
pub const JPY_PER_CNY: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Cny,
}

/// Fixed multiplicative rates from JPY.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rates {
    pub jpy_to_usd: f64,
    pub jpy_to_cny: f64,
}

impl Default for Rates {
    fn default() -> Self {
        Rates {
            jpy_to_usd: 0.0067,
            jpy_to_cny: 0.05,
        }
    }
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Derive USD and CNY prices from a JPY price. Missing or zero input yields nothing.
pub fn convert(jpy: Option<f64>, rates: &Rates) -> Vec<(Currency, f64)> {
    match jpy {
        Some(p) if p != 0.0 => vec![
            (Currency::Usd, round2(p * rates.jpy_to_usd)),
            (Currency::Cny, round2(p * rates.jpy_to_cny)),
        ],
        _ => Vec::new(),
    }
}

/// "算": Chinese market price relative to the Japanese MSRP converted to CNY, times 100.
pub fn value_ratio(price_jp_msrp: Option<f64>, price_cn_market: Option<f64>) -> Option<f64> {
    let (jp, cn) = (price_jp_msrp?, price_cn_market?);
    if jp <= 0.0 || cn <= 0.0 {
        return None;
    }
    Some(round2(cn / (jp / JPY_PER_CNY) * 100.0))
}

// ── Coupons ──

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CouponKind {
    Percentage { percent: f64, max_discount: Option<f64> },
    Fixed { amount: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coupon {
    pub kind: CouponKind,
    pub min_purchase: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Discount {
    pub final_price: f64,
    pub savings: f64,
    pub discount_rate: f64,
}

impl Coupon {
    /// None when the price does not reach the minimum purchase.
    pub fn apply(&self, price: f64) -> Option<Discount> {
        if self.min_purchase.is_some_and(|min| price < min) {
            return None;
        }
        let discount = match self.kind {
            CouponKind::Percentage { percent, max_discount } => {
                let d = price * percent / 100.0;
                max_discount.map_or(d, |cap| d.min(cap))
            }
            CouponKind::Fixed { amount } => amount,
        };
        let final_price = (price - discount).max(0.0);
        // The coupon's face value, even when it exceeds the price.
        let savings = discount;
        let discount_rate = if price > 0.0 { savings / price * 100.0 } else { 0.0 };
        Some(Discount {
            final_price: round2(final_price),
            savings: round2(savings),
            discount_rate: round2(discount_rate),
        })
    }
}
