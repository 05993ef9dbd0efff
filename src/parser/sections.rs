use anyhow::{Context, Result};
use regex::Regex;
use scraper::ElementRef;

use super::anchors::Anchor;
use super::strategy::{first_success, Strategy};
use crate::config::SectionRule;
use crate::vocab::{COUNT_CONNECTOR, COUNT_UNIT};

/// Levels of ancestors inspected by the structural strategy.
const MAX_ANCESTOR_DEPTH: usize = 10;
/// Characters of page text scanned before an anchor when the ancestor walk finds nothing.
const TEXT_WINDOW_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SegmentStrategy {
    /// Nearest preceding header in the flattened page text
    #[default]
    Positional,
    /// Ancestor walk, then a bounded text window
    Structural,
    /// Header anchors switch the current section
    Sequential,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMarker<'v> {
    pub offset: usize,
    pub label: &'v str,
}

/// Compiled `<keyword>共<N>款` patterns for one grade.
#[derive(Debug)]
pub struct SectionVocabulary {
    rules: Vec<(Regex, String)>,
    default_label: String,
}

impl SectionVocabulary {
    pub fn new(rules: &[SectionRule], default_label: &str) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|r| {
                let pattern = format!(
                    r"{}\s*{}\s*\d+\s*{}",
                    regex::escape(&r.keyword).replace(' ', r"\s*"),
                    COUNT_CONNECTOR,
                    COUNT_UNIT
                );
                let re = Regex::new(&pattern)
                    .with_context(|| format!("bad section keyword {:?}", r.keyword))?;
                Ok((re, r.label.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(SectionVocabulary {
            rules,
            default_label: default_label.to_string(),
        })
    }

    pub fn default_label(&self) -> &str {
        &self.default_label
    }

    /// All header matches in `text`, ordered by offset.
    pub fn find_headers(&self, text: &str) -> Vec<HeaderMarker<'_>> {
        let mut markers: Vec<HeaderMarker> = self
            .rules
            .iter()
            .flat_map(|(re, label)| {
                re.find_iter(text).map(move |m| HeaderMarker {
                    offset: m.start(),
                    label: label.as_str(),
                })
            })
            .collect();
        markers.sort_by_key(|m| m.offset);
        markers
    }

    /// Label of the first rule whose header pattern occurs in `text`.
    pub fn header_label(&self, text: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|(re, _)| re.is_match(text))
            .map(|(_, label)| label.as_str())
    }

    pub fn is_header(&self, text: &str) -> bool {
        self.header_label(text).is_some()
    }
}

/// Label of the nearest marker strictly before `pos`, if any.
pub fn label_at<'v>(markers: &[HeaderMarker<'v>], pos: usize) -> Option<&'v str> {
    let idx = markers.partition_point(|m| m.offset < pos);
    idx.checked_sub(1).map(|i| markers[i].label)
}

/// Assign one subcategory label to every anchor, aligned by index.
pub fn segment(
    anchors: &[Anchor],
    page_text: &str,
    vocab: &SectionVocabulary,
    strategy: SegmentStrategy,
) -> Vec<String> {
    match strategy {
        SegmentStrategy::Positional => positional(anchors, page_text, vocab),
        SegmentStrategy::Structural => structural(anchors, page_text, vocab),
        SegmentStrategy::Sequential => sequential(anchors, vocab),
    }
}

fn positional(anchors: &[Anchor], page_text: &str, vocab: &SectionVocabulary) -> Vec<String> {
    let markers = vocab.find_headers(page_text);
    anchors
        .iter()
        .map(|a| {
            a.offset
                .and_then(|pos| label_at(&markers, pos))
                .unwrap_or(vocab.default_label())
                .to_string()
        })
        .collect()
}

fn sequential(anchors: &[Anchor], vocab: &SectionVocabulary) -> Vec<String> {
    let mut current = vocab.default_label();
    anchors
        .iter()
        .map(|a| {
            if let Some(label) = vocab.header_label(&a.text) {
                current = label;
            }
            current.to_string()
        })
        .collect()
}

// ── Structural ──

struct AnchorContext<'p, 'a> {
    anchor: &'p Anchor<'a>,
    page_text: &'p str,
}

struct AncestorWalk<'v> {
    vocab: &'v SectionVocabulary,
}

struct TextWindow<'v> {
    vocab: &'v SectionVocabulary,
}

impl<'p, 'a> Strategy<AnchorContext<'p, 'a>, String> for AncestorWalk<'_> {
    fn name(&self) -> &str {
        "ancestors"
    }

    fn attempt(&self, ctx: &AnchorContext<'p, 'a>) -> Option<String> {
        let el = ctx.anchor.element;
        el.ancestors()
            .filter_map(ElementRef::wrap)
            .take(MAX_ANCESTOR_DEPTH)
            .find_map(|container| {
                let pos = offset_within(container, el)?;
                let text = container.text().collect::<String>();
                let markers = self.vocab.find_headers(&text);
                label_at(&markers, pos).map(str::to_string)
            })
    }
}

impl<'p, 'a> Strategy<AnchorContext<'p, 'a>, String> for TextWindow<'_> {
    fn name(&self) -> &str {
        "text-window"
    }

    fn attempt(&self, ctx: &AnchorContext<'p, 'a>) -> Option<String> {
        let pos = ctx.anchor.offset?;
        let before = &ctx.page_text[..pos];
        let start = before
            .char_indices()
            .rev()
            .nth(TEXT_WINDOW_CHARS - 1)
            .map_or(0, |(i, _)| i);
        let markers = self.vocab.find_headers(&before[start..]);
        markers.last().map(|m| m.label.to_string())
    }
}

/// Byte offset of `target`'s text inside `container`'s concatenated text.
fn offset_within(container: ElementRef, target: ElementRef) -> Option<usize> {
    let mut offset = 0;
    for node in container.descendants() {
        if node.id() == target.id() {
            return Some(offset);
        }
        if let Some(t) = node.value().as_text() {
            offset += t.len();
        }
    }
    None
}

fn structural(anchors: &[Anchor], page_text: &str, vocab: &SectionVocabulary) -> Vec<String> {
    let walk = AncestorWalk { vocab };
    let window = TextWindow { vocab };
    let chain: [&dyn Strategy<AnchorContext, String>; 2] = [&walk, &window];
    anchors
        .iter()
        .map(|anchor| {
            let ctx = AnchorContext { anchor, page_text };
            first_success(&chain, &ctx)
                .map(|(label, _)| label)
                .unwrap_or_else(|| vocab.default_label().to_string())
        })
        .collect()
}
