//! Keyword-based complaint tagging.
//!
//! Each category carries one regex that is searched (not fully matched) in the
//! cleaned review text. Categories are independent: a review can hit none, one
//! or several. Patterns are written against stemmed tokens, so most of them are
//! word prefixes.
//!
//! The taxonomy is fixed configuration. It will miss paraphrases, synonyms and
//! sarcasm; there is no learning involved. Categories also overlap where a word
//! is ambiguous: Dutch `duur` means both "takes long" and "expensive", so every
//! review calling the food `duur` counts as a wait-time and a pricing complaint.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use regex::Regex;
use serde::Serialize;

use crate::config::Language;
use crate::errors::ConfigError;
use crate::text::CleanedText;

/// Closed set of complaint categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Service,
    WaitTime,
    FoodQuality,
    PortionTemp,
    PricingValue,
    Ambience,
    OrderAccuracy,
    Cleanliness,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Service,
        Category::WaitTime,
        Category::FoodQuality,
        Category::PortionTemp,
        Category::PricingValue,
        Category::Ambience,
        Category::OrderAccuracy,
        Category::Cleanliness,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Service => "service",
            Category::WaitTime => "wait_time",
            Category::FoodQuality => "food_quality",
            Category::PortionTemp => "portion_temp",
            Category::PricingValue => "pricing_value",
            Category::Ambience => "ambience",
            Category::OrderAccuracy => "order_accuracy",
            Category::Cleanliness => "cleanliness",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category tags of one review.
pub type ComplaintTags = BTreeSet<Category>;

/// Per-category counts; every category is present, possibly with zero.
pub type CategoryCounts = BTreeMap<Category, usize>;

pub fn empty_counts() -> CategoryCounts {
    Category::ALL.iter().map(|c| (*c, 0)).collect()
}

// Snowball Dutch undoubles vowels (`duur` -> `dur`, `smaak` -> `smak`), hence the `+`.
const DUTCH_PATTERNS: [(Category, &str); 8] = [
    (
        Category::Service,
        r"bedien|servic|onvriend|gastvrij|attent|aandacht|persone+l|medewerk",
    ),
    (Category::WaitTime, r"wacht|lang|tra+g|du+r|snel|verla+t"),
    (
        Category::FoodQuality,
        r"slecht|not_lekker|taai|rauw|doorbak|verbrand|kwaliteit|sma+k|vies|smerig|klef|dro+g",
    ),
    (Category::PortionTemp, r"koud|lauw|warmhoud|temperat|afgekoeld"),
    (Category::PricingValue, r"du+r|reken|prijs|prijz|overprijs|kost"),
    (
        Category::Ambience,
        r"muziek|lawaai|geluid|herrie|airco|warm|\bhe+t\b|klima|druk|sfe+r",
    ),
    (
        Category::OrderAccuracy,
        r"verget|ontbrak|fout|verke+rd|\bbon\b|bestel|not_gekreg",
    ),
    (Category::Cleanliness, r"vies|smerig|vuil|scho+n|hygi[eë]n|insect|vlieg"),
];

const ENGLISH_PATTERNS: [(Category, &str); 8] = [
    (Category::Service, r"servic|staff|waiter|waitress|rude|unfriend|attent|not_friend|\bhost"),
    (Category::WaitTime, r"\bwait\b|slow|\blate\b|delay|forev|queue"),
    (
        Category::FoodQuality,
        r"bland|tasteless|\braw\b|overcook|undercook|burnt|stale|soggi|greasi|not_tasti|not_good|\bdri\b",
    ),
    (Category::PortionTemp, r"\bcold\b|lukewarm|tepid|portion|\bsmall\b|\btini\b"),
    (Category::PricingValue, r"pricey|expens|overpr|\bbill\b|\bprice|\bcost|charg"),
    (Category::Ambience, r"noisi|\bloud\b|music|crowd|atmospher|\bhot\b|air condit|aircon"),
    (Category::OrderAccuracy, r"wrong|forgot|\bmiss|mistak|mix up|not_receiv"),
    (Category::Cleanliness, r"dirti|\bdirt\b|filth|sticki|hygien|insect|cockroach|\bmold|unclean"),
];

/// Immutable category → pattern table.
#[derive(Debug, Clone)]
pub struct ComplaintTaxonomy {
    entries: Vec<(Category, Regex)>,
}

impl ComplaintTaxonomy {
    /// Build the built-in taxonomy for a corpus language.
    pub fn for_language(language: Language) -> Result<Self, ConfigError> {
        let patterns = match language {
            Language::Dutch => DUTCH_PATTERNS,
            Language::English => ENGLISH_PATTERNS,
        };
        Self::from_patterns(patterns.iter().map(|(c, p)| (*c, *p)))
    }

    /// Build a taxonomy from explicit patterns.
    pub fn from_patterns<'a, I>(patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (Category, &'a str)>,
    {
        let entries = patterns
            .into_iter()
            .map(|(category, pattern)| {
                Regex::new(pattern)
                    .map(|rx| (category, rx))
                    .map_err(|e| ConfigError::InvalidPattern {
                        category: category.to_string(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.entries.iter().map(|(c, _)| *c)
    }

    /// Categories whose pattern occurs anywhere in the cleaned text.
    pub fn tag(&self, cleaned: &CleanedText) -> ComplaintTags {
        self.tag_str(cleaned.as_str())
    }

    pub fn tag_str(&self, text: &str) -> ComplaintTags {
        self.entries
            .iter()
            .filter(|(_, rx)| rx.is_match(text))
            .map(|(c, _)| *c)
            .collect()
    }

    /// Tag every text and count category hits over all of them.
    pub fn tag_all(&self, texts: &[CleanedText]) -> TaggedBatch {
        let per_text: Vec<ComplaintTags> = texts.iter().map(|t| self.tag(t)).collect();
        let totals = count_categories(per_text.iter());
        TaggedBatch { per_text, totals }
    }
}

/// Result of tagging a batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaggedBatch {
    pub per_text: Vec<ComplaintTags>,
    /// Counts across all input texts (not restricted by sentiment)
    pub totals: CategoryCounts,
}

/// Count how many tag sets contain each category.
pub fn count_categories<'a, I>(tags: I) -> CategoryCounts
where
    I: IntoIterator<Item = &'a ComplaintTags>,
{
    let mut counts = empty_counts();
    for set in tags {
        for category in set {
            *counts.entry(*category).or_insert(0) += 1;
        }
    }
    counts
}
