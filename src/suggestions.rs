//! Business improvement suggestions.
//!
//! The text-generation service is an optional collaborator: every failure
//! (connection refused, timeout, non-2xx, unparseable body) is logged and turned
//! into an empty result, so the rest of the report never depends on it.
//!
//! Also home to the top-term cleanup used before terms are shown to people.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::complaints::{Category, CategoryCounts};
use crate::config::{Language, LlmSettings};
use crate::normalize::SentimentLabel;
use crate::sentiment::TopTerms;

const MAX_SNIPPET_CHARS: usize = 400;
const MAX_PROMPT_TERMS: usize = 15;
const MAX_LINE_SUGGESTIONS: usize = 7;
const PREFILTER_KEEP: usize = 25;
const REFINED_KEEP: usize = 15;

// Generic words that never make a useful indicative term, in either corpus language
static TERM_STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    vec![
        "the", "a", "an", "and", "or", "but", "to", "of", "in", "on", "for", "with", "at", "by",
        "from", "as", "it", "is", "are", "was", "were", "be", "been", "being", "i", "we", "you",
        "they", "he", "she", "them", "this", "that", "these", "those", "very", "much", "more",
        "most", "so", "too", "not", "no", "yes",
        "de", "het", "een", "en", "of", "maar", "want", "dus", "niet", "geen", "wel", "ook", "al",
        "dan", "als", "bij", "voor", "na", "van", "met", "op", "aan", "ik", "jij", "je", "u",
        "hij", "zij", "wij", "ze", "dit", "dat", "die", "deze", "daar", "hier", "veel", "weinig",
        "meer", "minder",
        "restaurant", "beren", "deberen", "menukaart", "menu", "eten", "drinken", "zaak",
        "bedrijf", "filiaal", "best", "top", "lekker",
    ]
    .into_iter()
    .collect()
});

/// Where the published suggestions came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionSource {
    Rule,
    Llm,
    None,
}

impl SuggestionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionSource::Rule => "rule",
            SuggestionSource::Llm => "llm",
            SuggestionSource::None => "none",
        }
    }
}

/// Inputs handed to a generator.
#[derive(Debug, Clone)]
pub struct SuggestionRequest {
    pub language: Language,
    /// Cleaned text of negative reviews, already capped in number
    pub negative_reviews: Vec<String>,
    pub complaint_counts: BTreeMap<String, usize>,
    pub top_terms: TopTerms,
}

impl SuggestionRequest {
    pub fn new(
        language: Language,
        negative_reviews: Vec<String>,
        negative_complaints: &CategoryCounts,
        top_terms: TopTerms,
    ) -> Self {
        Self {
            language,
            negative_reviews,
            complaint_counts: negative_complaints
                .iter()
                .filter(|(_, n)| **n > 0)
                .map(|(c, n)| (c.to_string(), *n))
                .collect(),
            top_terms,
        }
    }
}

/// Something that turns complaint evidence into short suggestions.
///
/// Implementations never fail: problems surface as an empty list / `None`.
#[async_trait]
pub trait SuggestionGenerator: Send + Sync {
    /// Identifier recorded with generated suggestions, e.g. `ollama:gemma3:latest`.
    fn model_name(&self) -> String;

    async fn suggest(&self, request: &SuggestionRequest) -> Vec<String>;

    /// Cleaned-up term lists, or `None` when the generator cannot help.
    async fn refine_terms(&self, _terms: &TopTerms) -> Option<TopTerms> {
        None
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Client for an Ollama server's `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaSuggester {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaSuggester {
    pub fn new(settings: &LlmSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            timeout: settings.timeout,
        })
    }

    async fn post_generate(&self, url: &str, body: &GenerateRequest<'_>) -> anyhow::Result<String> {
        let response = self.client.post(url).json(body).send().await?;
        if !response.status().is_success() {
            bail!("{} returned {}", url, response.status());
        }
        let data: GenerateResponse = response.json().await?;
        Ok(data.response.trim().to_string())
    }

    async fn generate(&self, system: &str, prompt: &str) -> anyhow::Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt: format!("System Instructions:\n{system}\n\nUser:\n{prompt}"),
            stream: false,
        };
        match tokio::time::timeout(self.timeout, self.post_generate(&url, &body)).await {
            Ok(result) => result,
            Err(_) => bail!("{} timed out after {:?}", url, self.timeout),
        }
    }
}

#[async_trait]
impl SuggestionGenerator for OllamaSuggester {
    fn model_name(&self) -> String {
        format!("ollama:{}", self.model)
    }

    async fn suggest(&self, request: &SuggestionRequest) -> Vec<String> {
        let prompt = build_prompt(request);
        match self.generate(system_instructions(request.language), &prompt).await {
            Ok(text) => {
                let suggestions = parse_suggestions(&text);
                info!("💡 [LLM] {} suggestions received from {}", suggestions.len(), self.model_name());
                suggestions
            }
            Err(e) => {
                warn!("⚠️ [LLM] Suggestion request failed: {:#}", e);
                Vec::new()
            }
        }
    }

    async fn refine_terms(&self, terms: &TopTerms) -> Option<TopTerms> {
        match self.generate(REFINE_INSTRUCTIONS, &build_refine_prompt(terms)).await {
            Ok(text) => {
                let refined = parse_refined_terms(&text);
                if refined.is_none() {
                    warn!("⚠️ [LLM] Refine terms: response was not a term map");
                }
                refined
            }
            Err(e) => {
                warn!("⚠️ [LLM] Refine terms failed: {:#}", e);
                None
            }
        }
    }
}

fn system_instructions(language: Language) -> &'static str {
    match language {
        Language::Dutch => {
            "Je bent een operationeel analist voor een restaurantketen. Lees de aantallen per \
             klachtcategorie en een steekproef van recente negatieve reviews. Formuleer 3-7 \
             beknopte, uitvoerbare verbetersuggesties voor het bedrijf. Iedere suggestie is \
             specifiek, haalbaar en gericht op operationele verbeteringen (bezetting, processen, \
             kwaliteitscontrole, training, menu, prijsstelling, ambiance). Vermijd algemene \
             adviezen. Gebruik bewijs uit de data. Geef het antwoord ALLEEN terug als een \
             JSON-lijst met Nederlandstalige strings."
        }
        Language::English => {
            "You are an operations analyst for a restaurant chain. Read the counts per complaint \
             category and a sample of recent negative reviews. Write 3-7 concise, actionable \
             improvement suggestions for the business. Each suggestion is specific, feasible and \
             aimed at operational improvements (staffing, processes, quality control, training, \
             menu, pricing, ambience). Avoid generic advice. Use evidence from the data. Answer \
             ONLY with a JSON list of strings."
        }
    }
}

const REFINE_INSTRUCTIONS: &str = "You are an NLP assistant cleaning model-derived 'top terms per \
     sentiment'. Remove tokens that are not meaningful sentiment-bearing terms for restaurant \
     reviews: numbers, stopwords, stems without meaning, brand names, isolated short tokens, \
     duplicates, and non-words. Return up to 15 concise, human-readable terms per sentiment that \
     best indicate that sentiment. Output ONLY a compact JSON object mapping sentiment to a list \
     of strings.";

struct PromptText {
    counts_header: &'static str,
    terms_header: &'static str,
    reviews_header: &'static str,
    closing: &'static str,
}

fn prompt_text(language: Language) -> PromptText {
    match language {
        Language::Dutch => PromptText {
            counts_header: "Aantallen per klachtcategorie:",
            terms_header: "Belangrijkste termen per sentiment (model-afgeleid):",
            reviews_header: "Voorbeeld negatieve reviews (ingekort):",
            closing: "Genereer beknopte, kwalitatieve suggesties. Antwoord ALLEEN met een \
                      JSON-array van Nederlandstalige strings (geen extra tekst).",
        },
        Language::English => PromptText {
            counts_header: "Counts per complaint category:",
            terms_header: "Top terms per sentiment (model-derived):",
            reviews_header: "Sample negative reviews (truncated):",
            closing: "Generate concise, qualitative suggestions. Answer ONLY with a JSON array \
                      of strings (no extra text).",
        },
    }
}

/// Prompt body: counts (most frequent first), optional top terms, numbered review snippets.
pub fn build_prompt(request: &SuggestionRequest) -> String {
    let text = prompt_text(request.language);
    let mut parts = vec![text.counts_header.to_string()];

    let mut counts: Vec<(&String, &usize)> = request.complaint_counts.iter().collect();
    counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    parts.extend(counts.into_iter().map(|(k, v)| format!("- {k}: {v}")));
    parts.push(String::new());

    if !request.top_terms.is_empty() {
        parts.push(text.terms_header.to_string());
        for (label, terms) in &request.top_terms {
            let shown: Vec<&str> = terms.iter().take(MAX_PROMPT_TERMS).map(String::as_str).collect();
            parts.push(format!("- {}: {}", label, shown.join(", ")));
        }
        parts.push(String::new());
    }

    parts.push(text.reviews_header.to_string());
    for (i, review) in request.negative_reviews.iter().enumerate() {
        let snippet = review.trim();
        let snippet = if snippet.chars().count() > MAX_SNIPPET_CHARS {
            format!("{}…", snippet.chars().take(MAX_SNIPPET_CHARS).collect::<String>())
        } else {
            snippet.to_string()
        };
        parts.push(format!("{}. {}", i + 1, snippet));
    }
    parts.push(String::new());
    parts.push(text.closing.to_string());
    parts.join("\n")
}

fn dedupe_in_order(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string().trim().to_string(),
    }
}

/// `text[first open ..= last close]`, when such a span exists.
fn json_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// Strip a leading `-`, `•`, `*` or `N.` / `N)` marker; `None` when the line has none.
fn strip_bullet(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix(['-', '•', '*']) {
        return Some(rest.trim());
    }
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    line[digits..].strip_prefix(['.', ')']).map(str::trim)
}

/// Parse a generator response: a JSON array of strings if possible, otherwise
/// bulleted lines of plain prose. Anything else (half-written JSON, markup,
/// unstructured text) gives an empty list.
pub fn parse_suggestions(text: &str) -> Vec<String> {
    let text = text.trim();
    let parsed = serde_json::from_str::<Value>(text)
        .ok()
        .or_else(|| json_span(text, '[', ']').and_then(|s| serde_json::from_str(s).ok()));
    if let Some(Value::Array(items)) = parsed {
        return dedupe_in_order(items.iter().map(value_text).filter(|s| !s.is_empty()));
    }

    if text.contains(['{', '[', '<']) {
        return Vec::new();
    }
    let bullets = text
        .lines()
        .filter_map(|line| strip_bullet(line.trim()))
        .filter(|line| line.chars().count() > 6)
        .take(MAX_LINE_SUGGESTIONS)
        .map(str::to_string);
    dedupe_in_order(bullets)
}

/// Deterministic cleanup of a term list: no short tokens, digits, stop words or
/// duplicates (case-insensitive). Keeps at most 25.
pub fn prefilter_terms(terms: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for term in terms {
        let term = term.trim();
        let lowered = term.to_lowercase();
        if lowered.chars().count() < 3
            || TERM_STOP_WORDS.contains(lowered.as_str())
            || lowered.chars().any(|c| c.is_ascii_digit())
            || lowered.chars().filter(|c| c.is_alphabetic()).count() < 2
            || !seen.insert(lowered)
        {
            continue;
        }
        out.push(term.to_string());
        if out.len() >= PREFILTER_KEEP {
            break;
        }
    }
    out
}

pub fn prefilter_top_terms(terms: &TopTerms) -> TopTerms {
    terms
        .iter()
        .map(|(label, list)| (*label, prefilter_terms(list)))
        .collect()
}

fn build_refine_prompt(terms: &TopTerms) -> String {
    let mut lines = vec!["Top terms per sentiment (raw):".to_string()];
    for (label, list) in terms {
        lines.push(format!("- {}: {}", label, prefilter_terms(list).join(", ")));
    }
    lines.push(String::new());
    lines.push(
        "Clean and filter the lists. Keep only relevant sentiment-indicative terms for each \
         sentiment. Return up to 15 concise, human-readable terms per sentiment that best \
         indicate that sentiment. Output ONLY a compact JSON object mapping sentiment to a list \
         of strings."
            .to_string(),
    );
    lines.join("\n")
}

/// Parse `{"negative": [...], ...}`, possibly wrapped in prose or code fences.
pub fn parse_refined_terms(text: &str) -> Option<TopTerms> {
    let span = json_span(text.trim(), '{', '}')?;
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(span) else {
        return None;
    };
    let refined: TopTerms = map
        .iter()
        .filter_map(|(key, terms)| {
            let key = key.trim().to_lowercase();
            let label = SentimentLabel::ALL.into_iter().find(|l| l.as_str() == key)?;
            let Value::Array(items) = terms else {
                return None;
            };
            let cleaned = dedupe_in_order(items.iter().map(value_text).filter(|s| !s.is_empty()));
            Some((label, cleaned.into_iter().take(REFINED_KEEP).collect()))
        })
        .collect();
    (!refined.is_empty()).then_some(refined)
}

/// Prefilter the terms, then let the generator refine them. Any failure keeps
/// the prefiltered lists.
pub async fn refine_top_terms(generator: &dyn SuggestionGenerator, terms: &TopTerms) -> TopTerms {
    let prefiltered = prefilter_top_terms(terms);
    match generator.refine_terms(terms).await {
        Some(refined) => {
            info!("💡 [LLM] Refine terms: received filtered terms");
            refined
        }
        None => prefiltered,
    }
}

fn rule_suggestion(category: Category, language: Language) -> &'static str {
    match (language, category) {
        (Language::Dutch, Category::Service) => {
            "Train het bedieningspersoneel in gastvrijheid en plan vaste check-ins aan tafel."
        }
        (Language::Dutch, Category::WaitTime) => {
            "Stem de bezetting af op piekuren en stel een maximale wachttijd per bestelling in."
        }
        (Language::Dutch, Category::FoodQuality) => {
            "Voer een kwaliteitscontrole uit bij de pass voordat gerechten de keuken verlaten."
        }
        (Language::Dutch, Category::PortionTemp) => {
            "Serveer gerechten direct en controleer portiegrootte en temperatuur bij uitgifte."
        }
        (Language::Dutch, Category::PricingValue) => {
            "Herzie de prijsstelling en communiceer duidelijk wat gasten voor hun geld krijgen."
        }
        (Language::Dutch, Category::Ambience) => {
            "Controleer geluidsniveau, klimaatbeheersing en drukte in de zaak tijdens piekuren."
        }
        (Language::Dutch, Category::OrderAccuracy) => {
            "Laat bestellingen herhalen bij opname en controleer de bon voor uitgifte."
        }
        (Language::Dutch, Category::Cleanliness) => {
            "Voer een schoonmaakrooster met aftekenlijst in voor zaal, toiletten en keuken."
        }
        (Language::English, Category::Service) => {
            "Train floor staff on hospitality and schedule regular table check-ins."
        }
        (Language::English, Category::WaitTime) => {
            "Match staffing to peak hours and set a maximum ticket time per order."
        }
        (Language::English, Category::FoodQuality) => {
            "Add a quality check at the pass before dishes leave the kitchen."
        }
        (Language::English, Category::PortionTemp) => {
            "Serve dishes immediately and check portion size and temperature at the pass."
        }
        (Language::English, Category::PricingValue) => {
            "Review pricing and make the value of each dish clear on the menu."
        }
        (Language::English, Category::Ambience) => {
            "Monitor noise, climate control and crowding during peak hours."
        }
        (Language::English, Category::OrderAccuracy) => {
            "Read orders back to guests and check tickets before serving."
        }
        (Language::English, Category::Cleanliness) => {
            "Introduce a cleaning schedule with sign-off for dining room, restrooms and kitchen."
        }
    }
}

/// One canned action per negative complaint category that occurred, most frequent first.
pub fn rule_suggestions(negative_complaints: &CategoryCounts, language: Language) -> Vec<String> {
    let mut hit: Vec<(&Category, &usize)> =
        negative_complaints.iter().filter(|(_, n)| **n > 0).collect();
    hit.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    hit.into_iter()
        .map(|(c, _)| rule_suggestion(*c, language).to_string())
        .collect()
}

pub fn fallback_message(language: Language) -> &'static str {
    match language {
        Language::Dutch => {
            "Geen sterke, terugkerende pijnpunten gevonden in negatieve reviews. Blijf monitoren."
        }
        Language::English => {
            "No strong, recurring pain points found in negative reviews. Keep monitoring."
        }
    }
}

/// Published suggestions with provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestionReport {
    pub suggestions: Vec<String>,
    pub source: SuggestionSource,
    /// Set only for generated suggestions
    pub model: Option<String>,
    /// RFC 3339, UTC, `Z` suffix
    pub generated_at: String,
    /// Present when there is nothing to suggest
    pub fallback_message: Option<String>,
    #[serde(skip)]
    pub language: Language,
}

impl SuggestionReport {
    /// Generated suggestions win over rule suggestions; both are deduplicated.
    pub fn build(
        generated: Vec<String>,
        rules: Vec<String>,
        model_name: Option<String>,
        language: Language,
        now: DateTime<Utc>,
    ) -> Self {
        let (suggestions, source) = if !generated.is_empty() {
            (dedupe_in_order(generated), SuggestionSource::Llm)
        } else if !rules.is_empty() {
            (dedupe_in_order(rules), SuggestionSource::Rule)
        } else {
            (Vec::new(), SuggestionSource::None)
        };
        Self {
            model: if source == SuggestionSource::Llm { model_name } else { None },
            fallback_message: suggestions
                .is_empty()
                .then(|| fallback_message(language).to_string()),
            suggestions,
            source,
            generated_at: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            language,
        }
    }

    /// Human-readable form written to `business_suggestions.txt`.
    pub fn render_text(&self) -> String {
        if let Some(message) = &self.fallback_message {
            return message.clone();
        }
        let heading = match self.language {
            Language::Dutch => "Belangrijkste verbetersuggesties",
            Language::English => "Top improvement suggestions",
        };
        let mut out = format!("{} (source={})\n", heading, self.source.as_str());
        for suggestion in &self.suggestions {
            out.push_str(&format!("- {suggestion}\n"));
        }
        out
    }
}
