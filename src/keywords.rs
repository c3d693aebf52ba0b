//! Controlled-vocabulary keywords.
//!
//! Maps each cleaned review onto a small, fixed list of standardized keywords so
//! the enriched export can be filtered without knowing the complaint regexes.
//! Order of the output follows the vocabulary order, not the text.

use regex::Regex;

use crate::config::Language;
use crate::errors::ConfigError;
use crate::text::CleanedText;

const DUTCH_VOCABULARY: [(&str, &str); 8] = [
    ("lange_wachten", r"\b(lang|half uur|kwartier)|wacht"),
    ("duur", r"\b(du+r|prijz|prijs|overpriced)"),
    ("service", r"\b(servic|bedien|personeel|personel|onvriend|genegeerd)"),
    ("airco", r"\b(airco|benauwd)|he+t binn|warm binn|not_airco"),
    ("eten_koud", r"\b(lauw|afgekoeld)|koud|not_warm"),
    ("bestelling_fout", r"\b(verkeerd|verget|mis)|bestelling fout|not_bestell"),
    ("hygiene", r"\b(vies|smerig|vuil|hygi[eë]n|vlieg|insect|schimmel)"),
    ("lawaai", r"\b(lawaai|herrie|druk)|hard muziek"),
];

const ENGLISH_VOCABULARY: [(&str, &str); 8] = [
    ("long_wait", r"\bwait\b|\b(forev|slow)|half hour"),
    ("expensive", r"\b(expens|pricey|overpr)"),
    ("service", r"\b(servic|staff|waiter|waitress|rude|ignor)"),
    ("air_conditioning", r"\b(aircon|stuffi)|air condit|hot insid"),
    ("cold_food", r"\b(lukewarm|tepid)|\bcold\b|not_warm|not_hot"),
    ("wrong_order", r"\b(wrong|forgot|miss)|mix up"),
    ("hygiene", r"\b(dirti|filth|unclean|hygien|insect|cockroach|mold)"),
    ("noise", r"\b(noisi|loud|crowd)|music"),
];

/// Fixed keyword vocabulary with one pattern per keyword.
#[derive(Debug, Clone)]
pub struct KeywordVocabulary {
    entries: Vec<(&'static str, Regex)>,
}

impl KeywordVocabulary {
    pub fn for_language(language: Language) -> Result<Self, ConfigError> {
        let table = match language {
            Language::Dutch => DUTCH_VOCABULARY,
            Language::English => ENGLISH_VOCABULARY,
        };
        let entries = table
            .iter()
            .map(|(keyword, pattern)| {
                Regex::new(pattern)
                    .map(|rx| (*keyword, rx))
                    .map_err(|e| ConfigError::InvalidPattern {
                        category: keyword.to_string(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    /// Keywords present in one cleaned review, in vocabulary order.
    pub fn extract(&self, cleaned: &CleanedText) -> Vec<&'static str> {
        let text = cleaned.as_str();
        self.entries
            .iter()
            .filter(|(_, rx)| rx.is_match(text))
            .map(|(k, _)| *k)
            .collect()
    }

    /// Comma-joined keywords per review (empty string when nothing matched).
    pub fn extract_controlled(&self, texts: &[CleanedText]) -> Vec<String> {
        texts.iter().map(|t| self.extract(t).join(", ")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::TextCleaner;

    #[test]
    fn test_keywords_follow_vocabulary_order() {
        let vocab = KeywordVocabulary::for_language(Language::English).unwrap();
        let cleaner = TextCleaner::new(Language::English);
        let cleaned = cleaner.clean("Dirty tables, loud music and we had to wait forever");
        assert_eq!(vocab.extract(&cleaned), vec!["long_wait", "hygiene", "noise"]);
    }

    #[test]
    fn test_dutch_keywords() {
        let vocab = KeywordVocabulary::for_language(Language::Dutch).unwrap();
        let cleaner = TextCleaner::new(Language::Dutch);
        let joined = vocab.extract_controlled(&[cleaner.clean("Veel te duur en het eten was lauw")]);
        assert_eq!(joined, vec!["duur, eten_koud".to_string()]);
    }

    #[test]
    fn test_nothing_matched_is_empty_string() {
        let vocab = KeywordVocabulary::for_language(Language::Dutch).unwrap();
        assert_eq!(vocab.extract_controlled(&[CleanedText::default()]), vec![String::new()]);
    }
}
