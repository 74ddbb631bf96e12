//! `planslide_verify` v1:
//! Reconciliation of rendered summary tiles against canonical records.
//!
//! Architecture:
//! - `spec`      : tolerance/config models, reconciliation records, error type
//! - `util`      : title/tile parsing and expected aggregates
//! - `reconcile` : `ReconciliationEngine`
//! - `report`    : summary counters and delimited report persistence
pub mod reconcile;
pub mod report;
pub mod spec;
pub mod util;

pub use reconcile::{ReconciliationEngine, verify_deck};
pub use report::{ReportReconciliation, ReportReconciliationBuilder, write_reconciliation_csv};
pub use spec::{
    SpecReconciliationRecord, SpecSlideReconciliation, SpecTolerancePolicy, SpecVerifyConfig,
    VerifyError, derive_verify_config_from_toml,
};
pub use util::{parse_slide_title, parse_tile_number};
