//! Reconciliation report models, mutable report builder and CSV persistence.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::path::Path;

use polars::prelude::{Column, CsvWriter, DataFrame, SerWriter};
use tracing::debug;

use crate::spec::{SpecReconciliationRecord, SpecSlideReconciliation, VerifyError};

/// Column order of the delimited report.
pub const L_REPORT_COLUMNS: [&str; 14] = [
    "slide_index",
    "market",
    "brand",
    "year",
    "category",
    "label",
    "expected_display",
    "actual_display",
    "expected_value",
    "actual_value",
    "difference",
    "tolerance",
    "passed",
    "notes",
];

/// Aggregate counters and diagnostics for one reconciliation run.
#[derive(Debug, Default, Clone)]
pub struct ReportReconciliation {
    /// Slides carrying tiles that were compared.
    pub cnt_slides_checked: u64,
    /// Slides without tiles (section slides).
    pub cnt_slides_skipped: u64,
    pub cnt_comparisons: u64,
    pub cnt_passed: u64,
    pub cnt_failed: u64,
    /// One entry per slide with at least one failed comparison.
    pub warnings: Vec<String>,
}

impl ReportReconciliation {
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// `true` when no comparison failed.
    pub fn if_passed(&self) -> bool {
        self.cnt_failed == 0
    }

    /// Machine-readable counters.
    pub fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_slides_checked".to_string(), self.cnt_slides_checked);
        dict_counts.insert("cnt_slides_skipped".to_string(), self.cnt_slides_skipped);
        dict_counts.insert("cnt_comparisons".to_string(), self.cnt_comparisons);
        dict_counts.insert("cnt_passed".to_string(), self.cnt_passed);
        dict_counts.insert("cnt_failed".to_string(), self.cnt_failed);
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        let dict_counts = self.to_dict();
        format!(
            "{prefix} checked={} skipped={} comparisons={} passed={} failed={} warnings={}",
            dict_counts["cnt_slides_checked"],
            dict_counts["cnt_slides_skipped"],
            dict_counts["cnt_comparisons"],
            dict_counts["cnt_passed"],
            dict_counts["cnt_failed"],
            dict_counts["cnt_warnings"]
        )
    }
}

impl fmt::Display for ReportReconciliation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[RECONCILE]"))
    }
}

/// Mutable accumulator for reconciliation statistics.
#[derive(Debug, Default, Clone)]
pub struct ReportReconciliationBuilder {
    pub cnt_slides_checked: u64,
    pub cnt_slides_skipped: u64,
    pub cnt_comparisons: u64,
    pub cnt_passed: u64,
    pub cnt_failed: u64,
    pub warnings: Vec<String>,
}

impl ReportReconciliationBuilder {
    /// Count one reconciled slide and its comparisons.
    pub fn add_slide(&mut self, result: &SpecSlideReconciliation) {
        self.cnt_slides_checked += 1;
        self.cnt_comparisons += result.records.len() as u64;
        self.cnt_passed += result.n_passed() as u64;
        self.cnt_failed += result.n_failed() as u64;
        if !result.if_passed() {
            self.add_warning(format!(
                "slide {} '{}': {} of {} comparisons failed",
                result.idx_slide,
                result.title,
                result.n_failed(),
                result.records.len()
            ));
        }
    }

    pub fn add_skipped(&mut self, n_slides: usize) {
        self.cnt_slides_skipped += n_slides as u64;
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Finalize builder into immutable report.
    pub fn build(self) -> ReportReconciliation {
        ReportReconciliation {
            cnt_slides_checked: self.cnt_slides_checked,
            cnt_slides_skipped: self.cnt_slides_skipped,
            cnt_comparisons: self.cnt_comparisons,
            cnt_passed: self.cnt_passed,
            cnt_failed: self.cnt_failed,
            warnings: self.warnings,
        }
    }
}

/// Flatten slide results into one frame, one row per comparison.
pub fn derive_reconciliation_frame(
    results: &[SpecSlideReconciliation],
) -> Result<DataFrame, VerifyError> {
    let l_records: Vec<&SpecReconciliationRecord> =
        results.iter().flat_map(|result| result.records.iter()).collect();

    let collect_text = |get: fn(&SpecReconciliationRecord) -> &str| -> Vec<String> {
        l_records.iter().map(|rec| get(rec).to_string()).collect()
    };
    let collect_value = |get: fn(&SpecReconciliationRecord) -> Option<f64>| -> Vec<Option<f64>> {
        l_records.iter().map(|rec| get(rec)).collect()
    };

    let l_slide_index: Vec<u64> = l_records.iter().map(|rec| rec.idx_slide as u64).collect();
    let l_year: Vec<Option<i32>> = l_records.iter().map(|rec| rec.year).collect();
    let l_tolerance: Vec<f64> = l_records.iter().map(|rec| rec.tolerance).collect();
    let l_passed: Vec<bool> = l_records.iter().map(|rec| rec.if_passed).collect();

    let l_columns = vec![
        Column::new(L_REPORT_COLUMNS[0].into(), l_slide_index),
        Column::new(L_REPORT_COLUMNS[1].into(), collect_text(|rec| rec.market.as_str())),
        Column::new(L_REPORT_COLUMNS[2].into(), collect_text(|rec| rec.brand.as_str())),
        Column::new(L_REPORT_COLUMNS[3].into(), l_year),
        Column::new(L_REPORT_COLUMNS[4].into(), collect_text(|rec| rec.category.as_str())),
        Column::new(L_REPORT_COLUMNS[5].into(), collect_text(|rec| rec.label.as_str())),
        Column::new(L_REPORT_COLUMNS[6].into(), collect_text(|rec| rec.expected_display.as_str())),
        Column::new(L_REPORT_COLUMNS[7].into(), collect_text(|rec| rec.actual_display.as_str())),
        Column::new(L_REPORT_COLUMNS[8].into(), collect_value(|rec| rec.expected_value)),
        Column::new(L_REPORT_COLUMNS[9].into(), collect_value(|rec| rec.actual_value)),
        Column::new(L_REPORT_COLUMNS[10].into(), collect_value(|rec| rec.difference)),
        Column::new(L_REPORT_COLUMNS[11].into(), l_tolerance),
        Column::new(L_REPORT_COLUMNS[12].into(), l_passed),
        Column::new(L_REPORT_COLUMNS[13].into(), collect_text(|rec| rec.notes.as_str())),
    ];
    DataFrame::new(l_columns).map_err(|err| VerifyError::Report(err.to_string()))
}

/// Write the comparison rows as CSV with a header, even when empty.
pub fn write_reconciliation_csv(
    path: &Path,
    results: &[SpecSlideReconciliation],
) -> Result<(), VerifyError> {
    let mut df = derive_reconciliation_frame(results)?;
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)
        .map_err(|err| VerifyError::Report(err.to_string()))?;
    debug!(path = %path.display(), n_rows = df.height(), "reconciliation report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_result(idx_slide: usize, passed: &[bool]) -> SpecSlideReconciliation {
        let records = passed
            .iter()
            .map(|if_passed| SpecReconciliationRecord {
                idx_slide,
                market: "United Kingdom".to_string(),
                brand: "Acme".to_string(),
                year: Some(2024),
                category: "quarter_budget".to_string(),
                label: "Q1".to_string(),
                expected_display: "Q1: £300K".to_string(),
                actual_display: "Q1: £299K".to_string(),
                expected_value: Some(300_000.0),
                actual_value: Some(299_000.0),
                difference: Some(-1_000.0),
                tolerance: 1_500.0,
                if_passed: *if_passed,
                notes: String::new(),
            })
            .collect();
        SpecSlideReconciliation {
            idx_slide,
            title: "United Kingdom - Acme".to_string(),
            market: "United Kingdom".to_string(),
            brand: "Acme".to_string(),
            year: Some(2024),
            records,
        }
    }

    #[test]
    fn report_reconciliation_to_dict_and_format() {
        let mut builder = ReportReconciliationBuilder::default();
        builder.add_slide(&create_result(1, &[true, true]));
        builder.add_slide(&create_result(3, &[true, false, false]));
        builder.add_skipped(2);
        let report = builder.build();

        let dict_counts = report.to_dict();
        assert_eq!(dict_counts["cnt_slides_checked"], 2);
        assert_eq!(dict_counts["cnt_comparisons"], 5);
        assert_eq!(dict_counts["cnt_failed"], 2);
        assert_eq!(
            report.warnings,
            vec!["slide 3 'United Kingdom - Acme': 2 of 3 comparisons failed".to_string()]
        );
        assert!(!report.if_passed());

        let txt = report.format("[RECONCILE]");
        assert_eq!(
            txt,
            "[RECONCILE] checked=2 skipped=2 comparisons=5 passed=3 failed=2 warnings=1"
        );
        assert_eq!(report.to_string(), txt);
    }

    #[test]
    fn test_csv_report_has_one_row_per_comparison() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("reconciliation.csv");
        write_reconciliation_csv(&path, &[create_result(1, &[true, false])]).expect("write");

        let text = std::fs::read_to_string(&path).expect("read");
        let l_lines: Vec<&str> = text.lines().collect();
        assert_eq!(l_lines[0], L_REPORT_COLUMNS.join(","));
        assert_eq!(l_lines.len(), 3);
        assert!(l_lines[1].starts_with("1,United Kingdom,Acme,2024,quarter_budget,Q1,"));
        assert!(l_lines[2].contains("false"));
    }

    #[test]
    fn test_empty_report_still_has_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty.csv");
        write_reconciliation_csv(&path, &[]).expect("write");

        let text = std::fs::read_to_string(&path).expect("read");
        assert_eq!(text.trim_end(), L_REPORT_COLUMNS.join(","));
    }
}
