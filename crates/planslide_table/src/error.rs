//! Table-kernel error type.

use thiserror::Error;

/// Errors raised while loading records, building, paginating or exporting tables.
#[derive(Debug, Error)]
pub enum TableError {
    /// No records match the requested (market, brand, year).
    #[error("No records for market={market:?} brand={brand:?} year={year}")]
    NotFound {
        market: String,
        brand: String,
        year: i32,
    },

    /// Records exist but the filtered budget sums to zero.
    #[error("Zero total budget for market={market:?} brand={brand:?} year={year}")]
    ZeroBudget {
        market: String,
        brand: String,
        year: i32,
    },

    /// Slide capacity cannot hold the smallest paginated unit.
    #[error("Invalid slide capacity: {0}")]
    InvalidCapacity(String),

    /// A required record column is absent from the source frame.
    #[error("Missing record column: {0:?}")]
    MissingColumn(String),

    /// The normalization layer delivered fewer rows than required.
    #[error("Record count {found} is below the required minimum {required}")]
    BelowMinimumRows { found: usize, required: usize },

    /// Source read failure (IO/Polars).
    #[error("Failed to load records: {0}")]
    Load(String),

    /// Config parse/validation failure.
    #[error("Invalid config: {0}")]
    Config(String),

    /// Workbook export failure.
    #[error("Workbook write error: {0}")]
    Workbook(String),
}

impl TableError {
    /// Layout errors mean "no renderable slide"; callers skip instead of aborting.
    pub fn is_layout_skip(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::ZeroBudget { .. })
    }
}
