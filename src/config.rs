use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::parser::classify::FilterVocabulary;
use crate::parser::sections::{SectionVocabulary, SegmentStrategy};
use crate::pricing::Rates;
use crate::vocab;

pub const DEFAULT_DB_PATH: &str = "data/gunpla.sqlite";
pub const SITE_INDEX_URL: &str = "https://acg.78dm.net";

const KNOWN_LIST_URLS: &[(&str, &str)] = &[
    ("RG", "https://acg.78dm.net/ct/341672.html"),
    ("HGIBO", "https://acg.78dm.net/ct/92653.html"),
];

const GRADE_ALIASES: &[(&str, &[&str])] = &[("HGBF/BD", &["HGBF", "HGBD"])];

/// Commit the merge transaction after this many inserts.
pub const COMMIT_EVERY: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRule {
    pub keyword: String,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for PriceBounds {
    fn default() -> Self {
        PriceBounds { min: 100.0, max: 50000.0 }
    }
}

impl PriceBounds {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Everything grade-specific about a listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeProfile {
    pub grade: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub list_url: Option<String>,
    pub series: String,
    #[serde(default = "standard_sections")]
    pub sections: Vec<SectionRule>,
    #[serde(default = "default_subcategory")]
    pub default_subcategory: String,
    #[serde(default)]
    pub excluded_fragments: Vec<String>,
    #[serde(default)]
    pub price_bounds: PriceBounds,
}

fn rules(table: &[(&str, &str)]) -> Vec<SectionRule> {
    table
        .iter()
        .map(|(keyword, label)| SectionRule {
            keyword: keyword.to_string(),
            label: label.to_string(),
        })
        .collect()
}

fn standard_sections() -> Vec<SectionRule> {
    rules(vocab::STANDARD_SECTIONS)
}

fn default_subcategory() -> String {
    vocab::DEFAULT_SUBCATEGORY.to_string()
}

impl GradeProfile {
    pub fn builtin(grade: &str) -> Self {
        let aliases = GRADE_ALIASES
            .iter()
            .find(|(g, _)| *g == grade)
            .map(|(_, a)| a.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default();
        let list_url = KNOWN_LIST_URLS
            .iter()
            .find(|(g, _)| *g == grade)
            .map(|(_, u)| u.to_string());

        let (sections, excluded_fragments) = match grade {
            "HGIBO" => (
                rules(vocab::HGIBO_SECTIONS),
                vec!["TV 1/100".to_string(), "CHARA STAND PLATE".to_string()],
            ),
            _ => (standard_sections(), Vec::new()),
        };

        GradeProfile {
            grade: grade.to_string(),
            aliases,
            list_url,
            series: format!("{}系列拼装模型", grade),
            sections,
            default_subcategory: default_subcategory(),
            excluded_fragments,
            price_bounds: PriceBounds::default(),
        }
    }

    /// Read a JSON array of profiles and return the one for `grade`, if present.
    pub fn from_file(path: &Path, grade: &str) -> Result<Option<Self>> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read profile file {}", path.display()))?;
        let profiles: Vec<GradeProfile> = serde_json::from_str(&raw)
            .with_context(|| format!("invalid profile file {}", path.display()))?;
        Ok(profiles.into_iter().find(|p| p.grade == grade))
    }

    /// The grade's own label and its aliases.
    pub fn own_labels(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.grade.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Grades with a built-in listing URL.
pub fn known_grades() -> impl Iterator<Item = (&'static str, &'static str)> {
    KNOWN_LIST_URLS.iter().copied()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    pub list_timeout: Duration,
    pub detail_timeout: Duration,
    pub detail_delay: Duration,
    pub grade_delay: Duration,
}

impl Timing {
    pub fn with_delay(detail_delay: Duration) -> Self {
        Timing {
            list_timeout: Duration::from_secs(15),
            detail_timeout: Duration::from_secs(10),
            detail_delay,
            grade_delay: detail_delay * 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policies {
    pub reject_placeholders: bool,
    pub drop_unpriced_reference: bool,
}

/// Flags shared by the commands that read listing pages.
#[derive(Debug, Clone, clap::Args)]
pub struct ScrapeArgs {
    /// Listing URL, overriding the built-in one (single grade only)
    #[arg(long)]
    pub url: Option<String>,
    /// JSON file with grade profiles (array)
    #[arg(long)]
    pub profile: Option<PathBuf>,
    /// Subcategory segmentation strategy
    #[arg(long, value_enum, default_value_t = SegmentStrategy::Positional)]
    pub strategy: SegmentStrategy,
    /// Lowest plausible JPY price
    #[arg(long)]
    pub min_price: Option<f64>,
    /// Highest plausible JPY price
    #[arg(long)]
    pub max_price: Option<f64>,
    /// Seconds between detail-page fetches
    #[arg(long, default_value = "1.5")]
    pub delay: f64,
    /// Keep "未商品化" placeholder entries
    #[arg(long)]
    pub keep_placeholders: bool,
    /// Drop 参考出品/开发中 items for which no price was found
    #[arg(long)]
    pub drop_unpriced_reference: bool,
    /// JPY → USD rate
    #[arg(long)]
    pub usd_rate: Option<f64>,
    /// JPY → CNY rate
    #[arg(long)]
    pub cny_rate: Option<f64>,
}

impl Default for ScrapeArgs {
    fn default() -> Self {
        ScrapeArgs {
            url: None,
            profile: None,
            strategy: SegmentStrategy::Positional,
            min_price: None,
            max_price: None,
            delay: 1.5,
            keep_placeholders: false,
            drop_unpriced_reference: false,
            usd_rate: None,
            cny_rate: None,
        }
    }
}

/// Resolved configuration for one grade. Built before any network I/O.
#[derive(Debug)]
pub struct ScrapeConfig {
    pub profile: GradeProfile,
    pub list_url: String,
    pub filter: FilterVocabulary,
    pub sections: SectionVocabulary,
    pub strategy: SegmentStrategy,
    pub bounds: PriceBounds,
    pub rates: Rates,
    pub timing: Timing,
    pub policies: Policies,
}

impl ScrapeConfig {
    pub fn resolve(grade: &str, args: &ScrapeArgs) -> Result<Self> {
        Self::build(grade, args, true)
    }

    /// For commands that only revisit stored detail URLs; the listing URL may be unknown.
    pub fn resolve_offline(grade: &str, args: &ScrapeArgs) -> Result<Self> {
        Self::build(grade, args, false)
    }

    fn build(grade: &str, args: &ScrapeArgs, need_listing: bool) -> Result<Self> {
        let profile = match &args.profile {
            Some(path) => GradeProfile::from_file(path, grade)?
                .unwrap_or_else(|| GradeProfile::builtin(grade)),
            None => GradeProfile::builtin(grade),
        };
        let list_url = match args.url.clone().or_else(|| profile.list_url.clone()) {
            Some(url) => url,
            None if need_listing => bail!("no known listing URL for grade {}; pass --url", grade),
            None => String::new(),
        };
        if !(args.delay >= 0.0 && args.delay.is_finite()) {
            bail!("--delay must be a non-negative number of seconds");
        }

        let mut bounds = profile.price_bounds;
        if let Some(min) = args.min_price {
            bounds.min = min;
        }
        if let Some(max) = args.max_price {
            bounds.max = max;
        }
        if bounds.min > bounds.max {
            bail!("price bounds are empty: {} > {}", bounds.min, bounds.max);
        }

        let mut rates = Rates::default();
        if let Some(r) = args.usd_rate {
            rates.jpy_to_usd = r;
        }
        if let Some(r) = args.cny_rate {
            rates.jpy_to_cny = r;
        }

        let sections = SectionVocabulary::new(&profile.sections, &profile.default_subcategory)?;
        let filter = FilterVocabulary::for_profile(&profile);

        Ok(ScrapeConfig {
            list_url,
            filter,
            sections,
            strategy: args.strategy,
            bounds,
            rates,
            timing: Timing::with_delay(Duration::from_secs_f64(args.delay)),
            policies: Policies {
                reject_placeholders: !args.keep_placeholders,
                drop_unpriced_reference: args.drop_unpriced_reference,
            },
            profile,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rg_resolves_builtin_url() {
        let cfg = ScrapeConfig::resolve("RG", &ScrapeArgs::default()).unwrap();
        assert_eq!(cfg.list_url, "https://acg.78dm.net/ct/341672.html");
        assert_eq!(cfg.profile.series, "RG系列拼装模型");
        assert_eq!(cfg.timing.grade_delay, Duration::from_secs(3));
    }

    #[test]
    fn unknown_url_is_config_error() {
        let err = ScrapeConfig::resolve("MG", &ScrapeArgs::default()).unwrap_err();
        assert!(err.to_string().contains("no known listing URL"));
    }

    #[test]
    fn offline_resolution_needs_no_url() {
        let cfg = ScrapeConfig::resolve_offline("MG", &ScrapeArgs::default()).unwrap();
        assert!(cfg.list_url.is_empty());
        assert_eq!(cfg.profile.series, "MG系列拼装模型");
    }

    #[test]
    fn url_override_allows_any_grade() {
        let args = ScrapeArgs {
            url: Some("https://acg.78dm.net/ct/1.html".into()),
            ..Default::default()
        };
        let cfg = ScrapeConfig::resolve("MG", &args).unwrap();
        assert_eq!(cfg.list_url, "https://acg.78dm.net/ct/1.html");
    }

    #[test]
    fn inverted_bounds_rejected() {
        let args = ScrapeArgs {
            min_price: Some(9000.0),
            max_price: Some(100.0),
            ..Default::default()
        };
        assert!(ScrapeConfig::resolve("RG", &args).is_err());
    }

    #[test]
    fn hgibo_uses_prefixed_headers() {
        let p = GradeProfile::builtin("HGIBO");
        assert_eq!(p.sections[0].keyword, "HG 1/144 普通版");
        assert!(p.excluded_fragments.iter().any(|f| f == "TV 1/100"));
    }

    #[test]
    fn profile_json_fills_defaults() {
        let json = r#"[{"grade": "MG", "series": "MG系列拼装模型", "list_url": "https://acg.78dm.net/ct/2.html"}]"#;
        let p: Vec<GradeProfile> = serde_json::from_str(json).unwrap();
        assert_eq!(p[0].default_subcategory, "普通版");
        assert_eq!(p[0].sections.len(), vocab::STANDARD_SECTIONS.len());
        assert_eq!(p[0].price_bounds, PriceBounds::default());
    }

    #[test]
    fn aliases_count_as_own_labels() {
        let p = GradeProfile::builtin("HGBF/BD");
        let own: Vec<&str> = p.own_labels().collect();
        assert_eq!(own, vec!["HGBF/BD", "HGBF", "HGBD"]);
    }
}
