//! Batch analytics for restaurant reviews.
//!
//! Stages, leaves first:
//! - [`ingest`] / [`normalize`]: raw rows to validated, deduplicated records
//! - [`text`]: negation-aware cleaning and stemming
//! - [`complaints`] / [`keywords`]: fixed-pattern tagging
//! - [`features`] / [`model`] / [`sentiment`]: rule or trained sentiment labels
//! - [`aggregate`]: corpus statistics
//! - [`suggestions`]: optional text-generation collaborator
//! - [`pipeline`] / [`export`]: wiring and report files

pub mod aggregate;
pub mod complaints;
pub mod config;
pub mod errors;
pub mod export;
pub mod features;
pub mod ingest;
pub mod keywords;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod sentiment;
pub mod suggestions;
pub mod text;

pub use config::{Cli, Language, SentimentMode, Settings};
pub use pipeline::{Pipeline, ReviewAnalysis};
