//! Tabular views of snapshots and results for renderers.

pub mod csv;
pub mod ownership;

pub use self::csv::{to_csv, ReportError};
pub use ownership::{
    ownership_report, ClassOwnershipRow, OwnershipReport, OwnershipRow, OwnershipSummary,
};
