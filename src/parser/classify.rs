use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use super::sections::SectionVocabulary;
use crate::config::GradeProfile;
use crate::vocab::{
    CHROME_FRAGMENTS, CHROME_TOKENS, COUNT_CONNECTOR, COUNT_UNIT, GRADE_LABELS, OTHER_LINES,
    PLACEHOLDER_MARKERS,
};

/// "共<N>款", the total count printed after a section label.
static TOTAL_COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"{}\s*\d+\s*{}", COUNT_CONNECTOR, COUNT_UNIT)).unwrap()
});

/// Why an anchor is not a catalog item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rejection {
    TooShort,
    Chrome,
    SectionHeader,
    SiblingLabel,
    SiblingHeader,
    ExcludedFragment,
    Placeholder,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rejection::TooShort => "too short",
            Rejection::Chrome => "navigation chrome",
            Rejection::SectionHeader => "section header",
            Rejection::SiblingLabel => "sibling line label",
            Rejection::SiblingHeader => "sibling line header",
            Rejection::ExcludedFragment => "excluded fragment",
            Rejection::Placeholder => "placeholder",
        };
        f.write_str(s)
    }
}

/// Labels that identify other product lines on a grade's page.
#[derive(Debug, Clone)]
pub struct FilterVocabulary {
    pub sibling_labels: Vec<String>,
    pub excluded_fragments: Vec<String>,
}

impl FilterVocabulary {
    pub fn for_profile(profile: &GradeProfile) -> Self {
        let own: Vec<&str> = profile.own_labels().collect();
        let sibling_labels = GRADE_LABELS
            .iter()
            .chain(OTHER_LINES)
            .filter(|l| !own.contains(*l))
            .map(|l| l.to_string())
            .collect();
        FilterVocabulary {
            sibling_labels,
            excluded_fragments: profile.excluded_fragments.clone(),
        }
    }
}

pub struct Classifier<'c> {
    pub filter: &'c FilterVocabulary,
    pub sections: &'c SectionVocabulary,
    pub reject_placeholders: bool,
}

impl Classifier<'_> {
    pub fn check(&self, text: &str) -> Result<(), Rejection> {
        let text = text.trim();
        if text.chars().count() < 2 {
            return Err(Rejection::TooShort);
        }
        if is_chrome(text) {
            return Err(Rejection::Chrome);
        }
        if self.sections.is_header(text) {
            return Err(Rejection::SectionHeader);
        }
        if self.filter.sibling_labels.iter().any(|l| l == text) {
            return Err(Rejection::SiblingLabel);
        }
        if TOTAL_COUNT_RE.is_match(text)
            && self.filter.sibling_labels.iter().any(|l| contains_label(text, l))
        {
            return Err(Rejection::SiblingHeader);
        }
        if self
            .filter
            .excluded_fragments
            .iter()
            .any(|f| text.contains(f.as_str()))
        {
            return Err(Rejection::ExcludedFragment);
        }
        if self.reject_placeholders && PLACEHOLDER_MARKERS.iter().any(|m| text.contains(m)) {
            return Err(Rejection::Placeholder);
        }
        Ok(())
    }
}

/// Latin labels only count as whole words, so "EG" is not found in "LEGEND".
fn contains_label(text: &str, label: &str) -> bool {
    if !label.is_ascii() {
        return text.contains(label);
    }
    text.match_indices(label).any(|(i, _)| {
        let before = text[..i].chars().next_back();
        let after = text[i + label.len()..].chars().next();
        !before.is_some_and(|c| c.is_ascii_alphanumeric())
            && !after.is_some_and(|c| c.is_ascii_alphanumeric())
    })
}

fn is_chrome(text: &str) -> bool {
    let lower = text.to_lowercase();
    CHROME_TOKENS.iter().any(|t| lower == *t) || CHROME_FRAGMENTS.iter().any(|f| text.contains(f))
}
