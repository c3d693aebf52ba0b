//! Print what the cleaner, tagger and keyword extractor make of the first few
//! reviews of a file. Handy when tuning stop words or complaint patterns.
//!
//! Usage: `inspect_reviews [--language english] [--limit 10] <path>`

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

use review_insights::complaints::ComplaintTaxonomy;
use review_insights::ingest::load_reviews;
use review_insights::keywords::KeywordVocabulary;
use review_insights::normalize::normalize;
use review_insights::text::TextCleaner;
use review_insights::Language;

#[derive(Debug, Parser)]
#[command(name = "inspect_reviews", about = "Show cleaned tokens, tags and keywords per review")]
struct Args {
    /// Review file to inspect
    path: PathBuf,

    #[arg(long, env = "REVIEW_LANGUAGE", default_value = "dutch")]
    language: String,

    /// Number of normalized reviews to print
    #[arg(long, default_value_t = 10)]
    limit: usize,
}

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let language: Language = args.language.parse().context("invalid --language")?;
    let cleaner = TextCleaner::new(language);
    let taxonomy = ComplaintTaxonomy::for_language(language)?;
    let vocabulary = KeywordVocabulary::for_language(language)?;

    let (records, stats) = normalize(load_reviews(&args.path)?);
    println!("🔍 {} of {} rows kept ({})", stats.rows_out, stats.rows_in, TextCleaner::NORMALIZER_VERSION);

    for (i, record) in records.iter().take(args.limit).enumerate() {
        let cleaned = cleaner.clean(&record.review_text);
        let tags: Vec<&str> = taxonomy.tag(&cleaned).iter().map(|c| c.as_str()).collect();
        println!("\n#{} [{}★ {}] {}", i + 1, record.rating, record.sentiment_label, record.review_text);
        println!("   tokens:   {}", cleaned);
        println!("   tags:     {}", tags.join(", "));
        println!("   keywords: {}", vocabulary.extract(&cleaned).join(", "));
    }
    Ok(())
}
