use anyhow::Context;
use clap::Parser;
use dotenv::dotenv;
use tracing::info;
use tracing_subscriber::EnvFilter;

use review_insights::export;
use review_insights::ingest::load_reviews;
use review_insights::pipeline::{self, Pipeline};
use review_insights::suggestions::{OllamaSuggester, SuggestionGenerator};
use review_insights::{Cli, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::try_from(Cli::parse()).context("invalid configuration")?;
    info!(
        "🚀 Review report: {} ({:?}, {:?} mode)",
        settings.data_path.display(),
        settings.language,
        settings.sentiment_mode
    );

    let pipeline = Pipeline::from_settings(&settings).context("building pipeline")?;
    let rows = load_reviews(&settings.data_path)?;
    let analysis = pipeline.analyze(rows);

    let ollama = if settings.use_llm_suggestions || settings.refine_top_terms {
        Some(OllamaSuggester::new(&settings.llm)?)
    } else {
        None
    };
    let generator = ollama.as_ref().map(|o| o as &dyn SuggestionGenerator);

    let top_terms = pipeline::published_top_terms(&analysis, &settings, generator).await;
    let suggestions = pipeline::build_suggestions(&analysis, &settings, generator, &top_terms).await;

    let written = export::write_report(&settings.output_dir, &settings, &analysis, &top_terms, &suggestions)?;
    info!(
        "✅ Done: {} reviews, {} files in {} (suggestions: {})",
        analysis.report.total_reviews,
        written.len(),
        settings.output_dir.display(),
        suggestions.source.as_str()
    );
    Ok(())
}
