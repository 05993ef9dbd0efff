use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use crate::config::PriceBounds;
use crate::parser::anchors::element_text;
use crate::parser::strategy::{first_success, Strategy};

const LABEL_KEYWORDS: &[&str] = &["价格", "定价", "日元", "发售价格", "msrp", "price"];

static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());
static THOUSANDS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d)[,，](\d)").unwrap());

/// Most to least specific; the first capture group is the price.
static TEXT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(\d+)\s*→\s*(\d+)\s*日元",
        r"发售价格[：:]\s*[¥￥]?\s*(\d+)",
        r"定价[：:]\s*[¥￥]?\s*(\d+)",
        r"价格[：:]\s*[¥￥]?\s*(\d+)",
        r"[¥￥]\s*(\d+)\s*日元",
        r"(\d+)\s*日元",
        r"JPY\s*(\d+)",
        r"[¥￥]\s*(\d+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceMatch {
    pub value: f64,
    pub method: &'static str,
}

struct DetailPage {
    document: Html,
    text: String,
    bounds: PriceBounds,
}

impl DetailPage {
    fn accept(&self, digits: &str) -> Option<f64> {
        let value: f64 = digits.parse().ok()?;
        self.bounds.contains(value).then_some(value)
    }
}

struct TableRows;
struct TextPatterns;

impl Strategy<DetailPage, f64> for TableRows {
    fn name(&self) -> &str {
        "table"
    }

    fn attempt(&self, page: &DetailPage) -> Option<f64> {
        let row_sel = Selector::parse("tr").unwrap();
        let cell_sel = Selector::parse("td, th").unwrap();
        page.document.select(&row_sel).find_map(|row| {
            let cells: Vec<String> = row.select(&cell_sel).map(element_text).collect();
            let [label, value, ..] = cells.as_slice() else {
                return None;
            };
            let label = label.to_lowercase();
            if !LABEL_KEYWORDS.iter().any(|k| label.contains(k)) {
                return None;
            }
            let value = value.replace([',', '，'], "");
            DIGITS_RE
                .find(&value)
                .and_then(|m| page.accept(m.as_str()))
        })
    }
}

impl Strategy<DetailPage, f64> for TextPatterns {
    fn name(&self) -> &str {
        "text"
    }

    fn attempt(&self, page: &DetailPage) -> Option<f64> {
        let text = strip_thousands(&page.text);
        TEXT_PATTERNS.iter().find_map(|re| {
            let caps = re.captures(&text)?;
            page.accept(caps.get(1)?.as_str())
        })
    }
}

fn strip_thousands(text: &str) -> String {
    let mut out = text.to_string();
    while THOUSANDS_RE.is_match(&out) {
        out = THOUSANDS_RE.replace_all(&out, "$1$2").into_owned();
    }
    out
}

/// Find the JPY price on a detail page. Candidates outside `bounds` are skipped.
pub fn extract_price(html: &str, bounds: PriceBounds) -> Option<PriceMatch> {
    let document = Html::parse_document(html);
    let text = document.root_element().text().collect::<String>();
    let page = DetailPage { document, text, bounds };
    let chain: [&'static dyn Strategy<DetailPage, f64>; 2] = [&TableRows, &TextPatterns];
    first_success(&chain, &page).map(|(value, method)| PriceMatch { value, method })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}", name)).unwrap()
    }

    #[test]
    fn table_row_price() {
        let got = extract_price(&fixture("detail_table.html"), PriceBounds::default()).unwrap();
        assert_eq!(got, PriceMatch { value: 4500.0, method: "table" });
    }

    #[test]
    fn inline_table_row() {
        let html = "<table><tr><td>定价</td><td>4500日元</td></tr></table>";
        assert_eq!(extract_price(html, PriceBounds::default()).unwrap().value, 4500.0);
    }

    #[test]
    fn arrow_price_takes_the_original() {
        let got = extract_price(&fixture("detail_text.html"), PriceBounds::default()).unwrap();
        assert_eq!(got, PriceMatch { value: 2500.0, method: "text" });
    }

    #[test]
    fn out_of_bounds_candidates_are_skipped() {
        let got = extract_price(&fixture("detail_noise.html"), PriceBounds::default()).unwrap();
        assert_eq!(got.value, 3300.0);
    }

    #[test]
    fn thousands_separators() {
        assert_eq!(strip_thousands("1,234,567日元"), "1234567日元");
        assert_eq!(strip_thousands("4，500日元"), "4500日元");
        assert_eq!(strip_thousands("a, b"), "a, b");
    }

    #[test]
    fn no_price_anywhere() {
        let html = "<p>发售日：2024年5月</p><table><tr><td>尺寸</td><td>1/144</td></tr></table>";
        assert_eq!(extract_price(html, PriceBounds::default()), None);
    }

    #[test]
    fn custom_bounds() {
        let html = "<p>定价：80日元</p>";
        assert_eq!(extract_price(html, PriceBounds::default()), None);
        let loose = PriceBounds { min: 50.0, max: 100.0 };
        assert_eq!(extract_price(html, loose).unwrap().value, 80.0);
    }
}
