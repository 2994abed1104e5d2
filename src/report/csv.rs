//! Flat CSV export of any result table.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("CSV output was not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("CSV buffer could not be flushed: {0}")]
    Flush(String),
}

/// Render rows as CSV with a header taken from the row's field names.
///
/// Missing optional values become empty cells.
pub fn to_csv<T: Serialize>(rows: &[T]) -> Result<String, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ReportError::Flush(e.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}
