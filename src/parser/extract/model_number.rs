use std::sync::LazyLock;

use regex::Regex;

use crate::parser::strategy::{first_success, Strategy};

// RX-78-2, MS-06S, MSZ-006
static DASHED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z]{1,3}-\d{2,4}(?:-\d{1,3})*[A-Z]?").unwrap());
// RG02, GAT01
static COMPACT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Z]{2,4}\d{1,3}").unwrap());

struct Pattern {
    name: &'static str,
    re: &'static LazyLock<Regex>,
}

impl Strategy<str, String> for Pattern {
    fn name(&self) -> &str {
        self.name
    }

    fn attempt(&self, input: &str) -> Option<String> {
        self.re.find(input).map(|m| m.as_str().to_string())
    }
}

static DASHED: Pattern = Pattern { name: "dashed", re: &DASHED_RE };
static COMPACT: Pattern = Pattern { name: "compact", re: &COMPACT_RE };

/// Model number embedded in a product name, if any.
pub fn extract(name: &str) -> Option<String> {
    let chain: [&dyn Strategy<str, String>; 2] = [&DASHED, &COMPACT];
    first_success(&chain, name).map(|(number, _)| number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dashed_numbers() {
        assert_eq!(extract("RX-78-2 高达 RG").as_deref(), Some("RX-78-2"));
        assert_eq!(extract("MS-06S 夏亚专用扎古II").as_deref(), Some("MS-06S"));
        assert_eq!(extract("MSZ-006 Z高达").as_deref(), Some("MSZ-006"));
    }

    #[test]
    fn compact_fallback() {
        assert_eq!(extract("RG02 扎古").as_deref(), Some("RG02"));
    }

    #[test]
    fn dashed_beats_compact_even_later_in_text() {
        assert_eq!(extract("RG02 MS-06 扎古").as_deref(), Some("MS-06"));
    }

    #[test]
    fn no_match() {
        assert_eq!(extract("EVA初号机 DX版"), None);
        assert_eq!(extract(""), None);
    }
}
