//! Run configuration.
//!
//! Every option can be given on the command line or through the environment
//! (a `.env` file is honoured by the binaries). Parsing happens once at startup;
//! the resulting [`Settings`] value is read-only for the rest of the run.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;

use crate::errors::ConfigError;

/// Language of the review corpus. Selects stop words, negation markers,
/// stemmer and complaint taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Dutch,
    English,
}

impl FromStr for Language {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dutch" | "nl" => Ok(Language::Dutch),
            "english" | "en" => Ok(Language::English),
            other => Err(ConfigError::UnsupportedLanguage(other.to_string())),
        }
    }
}

/// How sentiment labels are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentMode {
    /// Label straight from the star rating
    Rule,
    /// Train a text classifier on a stratified split
    Ml,
}

impl FromStr for SentimentMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rule" => Ok(SentimentMode::Rule),
            "ml" => Ok(SentimentMode::Ml),
            other => Err(ConfigError::UnsupportedSentimentMode(other.to_string())),
        }
    }
}

/// Command line / environment surface.
#[derive(Debug, Parser)]
#[command(name = "review-insights", version, about = "Batch analytics report for restaurant reviews")]
pub struct Cli {
    /// Delimited review file (header row required)
    #[arg(long, env = "DATA_PATH", default_value = "data/reviews.csv")]
    pub data_path: PathBuf,

    /// Directory receiving the report files
    #[arg(long, env = "OUTPUT_DIR", default_value = "outputs")]
    pub output_dir: PathBuf,

    /// Sentiment labeling strategy: rule | ml
    #[arg(long, env = "SENTIMENT_MODE", default_value = "rule")]
    pub sentiment_mode: String,

    /// Corpus language: dutch | english
    #[arg(long, env = "REVIEW_LANGUAGE", default_value = "dutch")]
    pub language: String,

    /// Held-out fraction for the ML evaluation split
    #[arg(long, env = "TEST_SIZE", default_value_t = 0.2)]
    pub test_size: f64,

    /// Seed for splits and fold shuffling
    #[arg(long, env = "SEED", default_value_t = 42)]
    pub seed: u64,

    /// Number of indicative terms kept per sentiment class
    #[arg(long, env = "TOP_TERMS", default_value_t = 15)]
    pub top_terms: usize,

    /// Ask the Ollama server for improvement suggestions
    #[arg(long, env = "USE_LLM_SUGGESTIONS", default_value_t = false)]
    pub use_llm_suggestions: bool,

    /// Ask the Ollama server to clean up the top-term lists
    #[arg(long, env = "REFINE_TOP_TERMS", default_value_t = false)]
    pub refine_top_terms: bool,

    /// Emit canned suggestions per complaint category when no LLM output exists
    #[arg(long, env = "RULE_SUGGESTIONS", default_value_t = false)]
    pub rule_suggestions: bool,

    #[arg(long, env = "OLLAMA_BASE_URL", default_value = "http://localhost:11434")]
    pub ollama_base_url: String,

    #[arg(long, env = "OLLAMA_MODEL", default_value = "gemma3:latest")]
    pub ollama_model: String,

    /// Max negative reviews included in the suggestion prompt
    #[arg(long, env = "LLM_MAX_NEG_REVIEW_SAMPLES", default_value_t = 50)]
    pub llm_max_negative_samples: usize,

    #[arg(long, env = "LLM_TIMEOUT_SECS", default_value_t = 120)]
    pub llm_timeout_secs: u64,
}

/// Settings for the optional Ollama collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    pub max_negative_samples: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "gemma3:latest".to_string(),
            timeout: Duration::from_secs(120),
            max_negative_samples: 50,
        }
    }
}

/// Validated, immutable run settings.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub data_path: PathBuf,
    pub output_dir: PathBuf,
    pub sentiment_mode: SentimentMode,
    pub language: Language,
    pub test_size: f64,
    pub seed: u64,
    pub top_terms: usize,
    pub use_llm_suggestions: bool,
    pub refine_top_terms: bool,
    pub rule_suggestions: bool,
    pub llm: LlmSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/reviews.csv"),
            output_dir: PathBuf::from("outputs"),
            sentiment_mode: SentimentMode::Rule,
            language: Language::Dutch,
            test_size: 0.2,
            seed: 42,
            top_terms: 15,
            use_llm_suggestions: false,
            refine_top_terms: false,
            rule_suggestions: false,
            llm: LlmSettings::default(),
        }
    }
}

impl Settings {
    /// Check the numeric ranges that parsing alone cannot enforce.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(ConfigError::InvalidTestSize(self.test_size));
        }
        if self.llm.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

impl TryFrom<Cli> for Settings {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let settings = Settings {
            data_path: cli.data_path,
            output_dir: cli.output_dir,
            sentiment_mode: cli.sentiment_mode.parse()?,
            language: cli.language.parse()?,
            test_size: cli.test_size,
            seed: cli.seed,
            top_terms: cli.top_terms,
            use_llm_suggestions: cli.use_llm_suggestions,
            refine_top_terms: cli.refine_top_terms,
            rule_suggestions: cli.rule_suggestions,
            llm: LlmSettings {
                base_url: cli.ollama_base_url,
                model: cli.ollama_model,
                timeout: Duration::from_secs(cli.llm_timeout_secs),
                max_negative_samples: cli.llm_max_negative_samples,
            },
        };
        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Settings, ConfigError> {
        let mut argv = vec!["review-insights"];
        argv.extend_from_slice(args);
        Settings::try_from(Cli::parse_from(argv))
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = parse(&[]).unwrap();
        assert_eq!(settings.sentiment_mode, SentimentMode::Rule);
        assert_eq!(settings.language, Language::Dutch);
        assert_eq!(settings.llm.timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_unsupported_mode_is_fatal() {
        let err = parse(&["--sentiment-mode", "transformer"]).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedSentimentMode(m) if m == "transformer"));
    }

    #[test]
    fn test_unsupported_language_is_fatal() {
        let err = parse(&["--language", "klingon"]).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedLanguage(_)));
    }

    #[test]
    fn test_test_size_range() {
        assert!(matches!(
            parse(&["--test-size", "1.0"]),
            Err(ConfigError::InvalidTestSize(_))
        ));
        assert!(parse(&["--test-size", "0.25", "--sentiment-mode", "ML"]).is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(matches!(
            parse(&["--llm-timeout-secs", "0"]),
            Err(ConfigError::ZeroTimeout)
        ));
    }
}
