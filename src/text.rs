//! Review text cleaning.
//!
//! Pipeline per review:
//!   lowercase → strip URLs → strip digit runs → split on non-letters
//!   → negation fusion (`niet goed` → `not_goed`) → stop-word / length filter
//!   → Snowball stemming
//!
//! The output is deterministic for a given [`TextCleaner::NORMALIZER_VERSION`];
//! changing stop words, stemmer or the `not_` prefix changes the downstream
//! vocabulary and therefore every trained model and published term list.

use std::collections::HashSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Serialize, Serializer};

use crate::config::Language;

static URL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://\S+|www\.\S+").expect("URL_REGEX: invalid pattern"));

static DIGIT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+").expect("DIGIT_REGEX: invalid pattern"));

/// Prefix of fused negation tokens.
pub const NEGATION_PREFIX: &str = "not_";

/// Snowball Dutch stop words.
const DUTCH_STOP_WORDS: &[&str] = &[
    "de", "en", "van", "ik", "te", "dat", "die", "in", "een", "hij", "het", "niet", "zijn",
    "is", "was", "op", "aan", "met", "als", "voor", "had", "er", "maar", "om", "hem", "dan",
    "zou", "of", "wat", "mijn", "men", "dit", "zo", "door", "over", "ze", "zich", "bij", "ook",
    "tot", "je", "mij", "uit", "der", "daar", "haar", "naar", "heb", "hoe", "heeft", "hebben",
    "deze", "u", "want", "nog", "zal", "me", "zij", "nu", "ge", "geen", "omdat", "iets",
    "worden", "toch", "al", "waren", "veel", "meer", "doen", "toen", "moet", "ben", "zonder",
    "kan", "hun", "dus", "alles", "onder", "ja", "eens", "hier", "wie", "werd", "altijd",
    "doch", "wordt", "wezen", "kunnen", "ons", "zelf", "tegen", "na", "reeds", "wil", "kon",
    "niets", "uw", "iemand", "geweest", "andere",
];

/// Restaurant-review words that carry no signal in a Dutch corpus.
const DUTCH_DOMAIN_STOP_WORDS: &[&str] = &[
    "beren", "restaurant", "eten", "drinken", "menukaart", "besteld", "bestellen", "gerechten",
];

/// Snowball English stop words (apostrophe forms are split by the tokenizer).
const ENGLISH_STOP_WORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "your", "yours",
    "yourself", "yourselves", "he", "him", "his", "himself", "she", "her", "hers", "herself",
    "it", "its", "itself", "they", "them", "their", "theirs", "themselves", "what", "which",
    "who", "whom", "this", "that", "these", "those", "am", "is", "are", "was", "were", "be",
    "been", "being", "have", "has", "had", "having", "do", "does", "did", "doing", "a", "an",
    "the", "and", "but", "if", "or", "because", "as", "until", "while", "of", "at", "by",
    "for", "with", "about", "against", "between", "into", "through", "during", "before",
    "after", "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over",
    "under", "again", "further", "then", "once", "here", "there", "when", "where", "why",
    "how", "all", "any", "both", "each", "few", "more", "most", "other", "some", "such", "no",
    "nor", "not", "only", "own", "same", "so", "than", "too", "very", "s", "t", "can", "will",
    "just", "don", "should", "now", "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren",
    "couldn", "didn", "doesn", "hadn", "hasn", "haven", "isn", "ma", "mightn", "mustn",
    "needn", "shan", "shouldn", "wasn", "weren", "won", "wouldn",
];

const ENGLISH_DOMAIN_STOP_WORDS: &[&str] =
    &["restaurant", "food", "menu", "ordered", "order", "dishes", "place"];

/// Language-specific word lists and stemmer.
#[derive(Debug, Clone, Copy)]
pub struct LanguageProfile {
    pub language: Language,
    pub stop_words: &'static [&'static str],
    pub domain_stop_words: &'static [&'static str],
    pub negation_markers: &'static [&'static str],
    pub algorithm: Algorithm,
}

impl LanguageProfile {
    pub fn for_language(language: Language) -> Self {
        match language {
            Language::Dutch => Self {
                language,
                stop_words: DUTCH_STOP_WORDS,
                domain_stop_words: DUTCH_DOMAIN_STOP_WORDS,
                negation_markers: &["niet", "geen"],
                algorithm: Algorithm::Dutch,
            },
            Language::English => Self {
                language,
                stop_words: ENGLISH_STOP_WORDS,
                domain_stop_words: ENGLISH_DOMAIN_STOP_WORDS,
                negation_markers: &["not", "no", "never"],
                algorithm: Algorithm::English,
            },
        }
    }
}

/// Normalized token stream of one review.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanedText {
    tokens: Vec<String>,
    joined: String,
}

impl CleanedText {
    pub fn from_tokens(tokens: Vec<String>) -> Self {
        let joined = tokens.join(" ");
        Self { tokens, joined }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Space-joined form used for tagging and as classifier input.
    pub fn as_str(&self) -> &str {
        &self.joined
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl fmt::Display for CleanedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined)
    }
}

impl Serialize for CleanedText {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.joined)
    }
}

/// Read-only cleaner shared by every review of a run.
pub struct TextCleaner {
    profile: LanguageProfile,
    stop_words: HashSet<String>,
    negations: HashSet<String>,
    stemmer: Stemmer,
}

impl fmt::Debug for TextCleaner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextCleaner")
            .field("language", &self.profile.language)
            .field("stop_words", &self.stop_words.len())
            .field("negations", &self.negations)
            .finish()
    }
}

impl TextCleaner {
    /// Bumped whenever tokenization, stop words or stemming change.
    pub const NORMALIZER_VERSION: &'static str = "snowball-1";

    pub fn new(language: Language) -> Self {
        Self::with_profile(LanguageProfile::for_language(language))
    }

    pub fn with_profile(profile: LanguageProfile) -> Self {
        let stop_words = profile
            .stop_words
            .iter()
            .chain(profile.domain_stop_words.iter())
            .map(|w| w.to_string())
            .collect();
        let negations = profile.negation_markers.iter().map(|w| w.to_string()).collect();
        Self {
            profile,
            stop_words,
            negations,
            stemmer: Stemmer::create(profile.algorithm),
        }
    }

    pub fn language(&self) -> Language {
        self.profile.language
    }

    pub fn is_stop_word(&self, token: &str) -> bool {
        self.stop_words.contains(token)
    }

    fn is_content(&self, token: &str) -> bool {
        !self.is_stop_word(token) && token.chars().count() > 2
    }

    fn stem(&self, token: &str) -> String {
        self.stemmer.stem(token).into_owned()
    }

    /// Lowercase, drop URLs and digits, split on anything that is not a letter.
    pub fn tokenize(text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let no_urls = URL_REGEX.replace_all(&lowered, " ");
        let no_digits = DIGIT_REGEX.replace_all(&no_urls, " ");
        no_digits
            .split(|c: char| !c.is_alphabetic())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Clean one review. Empty input gives an empty token stream.
    pub fn clean(&self, text: &str) -> CleanedText {
        let parts = Self::tokenize(text);
        let mut out = Vec::with_capacity(parts.len());
        let mut i = 0;
        while i < parts.len() {
            let token = parts[i].as_str();
            if self.negations.contains(token) {
                // Only the next token is considered; a trailing marker is dropped.
                if let Some(next) = parts.get(i + 1).filter(|n| self.is_content(n)) {
                    out.push(format!("{NEGATION_PREFIX}{}", self.stem(next)));
                    i += 2;
                    continue;
                }
                i += 1;
                continue;
            }
            if self.is_content(token) {
                out.push(self.stem(token));
            }
            i += 1;
        }
        CleanedText::from_tokens(out)
    }

    pub fn clean_all<S: AsRef<str>>(&self, texts: &[S]) -> Vec<CleanedText> {
        texts.iter().map(|t| self.clean(t.as_ref())).collect()
    }
}
