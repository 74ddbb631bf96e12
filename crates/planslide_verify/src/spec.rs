//! Verification models: tolerance config, comparison records, errors.

use planslide_table::{EnumTileCategory, TableError};
use serde::Deserialize;
use thiserror::Error;

////////////////////////////////////////////////////////////////////////////////
// #region Config

/// Numeric tolerance applied when display strings differ.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpecTolerancePolicy {
    /// Relative budget tolerance (0.005 = 0.5% of expected).
    pub budget_rel: f64,
    /// Absolute budget tolerance floor, in currency units.
    pub budget_floor: f64,
    /// Share tolerance in percentage points.
    pub share_pp: f64,
}

impl Default for SpecTolerancePolicy {
    fn default() -> Self {
        Self {
            budget_rel: 0.005,
            budget_floor: 500.0,
            share_pp: 0.5,
        }
    }
}

impl SpecTolerancePolicy {
    /// Allowed absolute deviation for a tile of `category` with `expected` value.
    pub fn tolerance_for(&self, category: EnumTileCategory, expected: f64) -> f64 {
        match category {
            EnumTileCategory::QuarterBudget => {
                f64::max(self.budget_rel * expected.abs(), self.budget_floor)
            }
            EnumTileCategory::MediaShare | EnumTileCategory::FunnelShare => self.share_pp,
        }
    }
}

/// Verify-side options, read from the same TOML text as the deck config.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct SpecVerifyConfig {
    pub tolerance: SpecTolerancePolicy,
}

/// Parse verify config from TOML text; absent keys keep their defaults.
pub fn derive_verify_config_from_toml(text: &str) -> Result<SpecVerifyConfig, VerifyError> {
    let cfg: SpecVerifyConfig =
        toml::from_str(text).map_err(|err| VerifyError::Config(err.to_string()))?;
    let tol = &cfg.tolerance;
    if tol.budget_rel < 0.0 || tol.budget_floor < 0.0 || tol.share_pp < 0.0 {
        return Err(VerifyError::Config(
            "tolerance values must be >= 0.".to_string(),
        ));
    }
    Ok(cfg)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Records

/// One expected-vs-rendered comparison; never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecReconciliationRecord {
    pub idx_slide: usize,
    pub market: String,
    pub brand: String,
    /// Year whose aggregates were compared; `None` when no data exists.
    pub year: Option<i32>,
    /// Tile category token (`quarter_budget`, `media_share`, `funnel_share`).
    pub category: String,
    pub label: String,
    pub expected_display: String,
    pub actual_display: String,
    pub expected_value: Option<f64>,
    pub actual_value: Option<f64>,
    /// `actual - expected` when both are known.
    pub difference: Option<f64>,
    pub tolerance: f64,
    pub if_passed: bool,
    pub notes: String,
}

/// Comparisons of one rendered slide.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecSlideReconciliation {
    pub idx_slide: usize,
    pub title: String,
    pub market: String,
    pub brand: String,
    pub year: Option<i32>,
    pub records: Vec<SpecReconciliationRecord>,
}

impl SpecSlideReconciliation {
    pub fn n_passed(&self) -> usize {
        self.records.iter().filter(|rec| rec.if_passed).count()
    }

    pub fn n_failed(&self) -> usize {
        self.records.len() - self.n_passed()
    }

    /// `true` when every comparison passed.
    pub fn if_passed(&self) -> bool {
        self.n_failed() == 0
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// Verification failures escalated to the caller.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Record loading or table-kernel failure.
    #[error(transparent)]
    Table(#[from] TableError),

    /// Report generation failure (frame build / CSV write).
    #[error("Failed to write reconciliation report: {0}")]
    Report(String),

    /// Config parse/validation failure.
    #[error("Invalid verify config: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tolerance_uses_relative_budget_or_floor() {
        let tol = SpecTolerancePolicy::default();
        assert_eq!(tol.tolerance_for(EnumTileCategory::QuarterBudget, 300_000.0), 1_500.0);
        assert_eq!(tol.tolerance_for(EnumTileCategory::QuarterBudget, 10_000.0), 500.0);
        assert_eq!(tol.tolerance_for(EnumTileCategory::MediaShare, 45.0), 0.5);
    }

    #[test]
    fn test_verify_config_reads_tolerance_table_and_ignores_deck_keys() {
        let cfg = derive_verify_config_from_toml(
            r#"
n_rows_per_slide_max = 20

[tolerance]
share_pp = 1.0
"#,
        )
        .expect("config");
        assert_eq!(cfg.tolerance.share_pp, 1.0);
        assert_eq!(cfg.tolerance.budget_floor, 500.0);

        let err = derive_verify_config_from_toml("[tolerance]\nbudget_rel = -1.0").expect_err("must fail");
        assert!(matches!(err, VerifyError::Config(_)));
    }
}
