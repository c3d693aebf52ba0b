//! Review file loading.
//!
//! Header names are trimmed, lowercased and mapped through a small alias table so
//! exports from different review platforms land in the same shape. Columns that
//! are missing simply come through as `None`.

use std::fs::File;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use tracing::info;

use crate::errors::IngestError;

/// One row as read from disk, before any validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawReview {
    pub source: Option<String>,
    pub rating: Option<String>,
    pub review: Option<String>,
    pub location: Option<String>,
    pub timestamp: Option<String>,
}

/// Canonical columns understood by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Source,
    Rating,
    Review,
    Location,
    Timestamp,
}

/// Map a (trimmed, lowercased) header to its canonical column.
fn column_for(header: &str) -> Option<Column> {
    match header {
        "source" => Some(Column::Source),
        "rating" | "stars" => Some(Column::Rating),
        "review" | "review_text" => Some(Column::Review),
        "location" | "locatie" => Some(Column::Location),
        "timestamp" | "review_date" | "date" => Some(Column::Timestamp),
        _ => None,
    }
}

/// Normalize a raw header cell: strip BOM and whitespace, lowercase.
fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}').trim().to_lowercase()
}

/// Build raw rows from a header record and data records.
///
/// When two headers alias the same column the first one wins.
pub fn rows_from_records<'a, I>(headers: &StringRecord, records: I) -> Vec<RawReview>
where
    I: IntoIterator<Item = &'a StringRecord>,
{
    let mut positions: Vec<(Column, usize)> = Vec::new();
    for (idx, header) in headers.iter().enumerate() {
        if let Some(col) = column_for(&normalize_header(header)) {
            if !positions.iter().any(|(c, _)| *c == col) {
                positions.push((col, idx));
            }
        }
    }

    records
        .into_iter()
        .map(|record| {
            let mut row = RawReview::default();
            for (col, idx) in &positions {
                let value = record.get(*idx).map(|v| v.to_string());
                match col {
                    Column::Source => row.source = value,
                    Column::Rating => row.rating = value,
                    Column::Review => row.review = value,
                    Column::Location => row.location = value,
                    Column::Timestamp => row.timestamp = value,
                }
            }
            row
        })
        .collect()
}

/// Load every row of a delimited review file.
pub fn load_reviews(path: &Path) -> Result<Vec<RawReview>, IngestError> {
    if !path.exists() {
        return Err(IngestError::NotFound(path.to_path_buf()));
    }
    let file = File::open(path)?;
    let csv_err = |source: csv::Error| IngestError::Csv {
        path: path.display().to_string(),
        source,
    };

    let mut reader = ReaderBuilder::new().flexible(true).from_reader(file);
    let headers = reader.headers().map_err(csv_err)?.clone();
    let records = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(csv_err)?;

    let rows = rows_from_records(&headers, &records);
    info!("📥 Loaded {} rows from {}", rows.len(), path.display());
    Ok(rows)
}
