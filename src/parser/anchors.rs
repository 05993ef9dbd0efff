use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

static ITEM_HREF_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/ct/\d+\.html").unwrap());

/// A catalog-shaped link in document order.
#[derive(Debug, Clone)]
pub struct Anchor<'a> {
    pub element: ElementRef<'a>,
    pub text: String,
    pub url: String,
    /// Byte offset of the first occurrence of `text` in the flattened page text.
    pub offset: Option<usize>,
}

/// Every `<a href>` pointing at a `/ct/<id>.html` page.
pub fn collect<'a>(document: &'a Html, page_text: &str, base: &Url) -> Vec<Anchor<'a>> {
    let sel = Selector::parse("a[href]").unwrap();
    document
        .select(&sel)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            if !ITEM_HREF_RE.is_match(href) {
                return None;
            }
            let url = base.join(href).ok()?.to_string();
            let text = element_text(el);
            let offset = if text.is_empty() {
                None
            } else {
                page_text.find(&text)
            };
            Some(Anchor {
                element: el,
                text,
                url,
                offset,
            })
        })
        .collect()
}

pub fn element_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_item_links() {
        let html = r#"<div>
            <a href="/ct/1.html">RX-78-2 高达</a>
            <a href="/news/2.html">新闻</a>
            <a href="https://acg.78dm.net/ct/3.html"> MS-06S 扎古 </a>
            <a>no href</a>
        </div>"#;
        let doc = Html::parse_document(html);
        let text = doc.root_element().text().collect::<String>();
        let base = Url::parse("https://acg.78dm.net/ct/341672.html").unwrap();
        let anchors = collect(&doc, &text, &base);
        assert_eq!(anchors.len(), 2);
        assert_eq!(anchors[0].url, "https://acg.78dm.net/ct/1.html");
        assert_eq!(anchors[1].text, "MS-06S 扎古");
        assert!(anchors[0].offset.unwrap() < anchors[1].offset.unwrap());
    }

    #[test]
    fn empty_anchor_has_no_offset() {
        let doc = Html::parse_document(r#"<a href="/ct/9.html"><img src="x.png"></a>"#);
        let text = doc.root_element().text().collect::<String>();
        let base = Url::parse("https://acg.78dm.net/").unwrap();
        let anchors = collect(&doc, &text, &base);
        assert_eq!(anchors.len(), 1);
        assert_eq!(anchors[0].offset, None);
    }
}
