//! Merge computation over rendered tables.
//!
//! One top-to-bottom scan drives four trackers, each an `Idle` /
//! `Accumulating` state machine:
//!
//! - campaign names in column 0 (vertical)
//! - media channels in column 1 (vertical)
//! - percentage-of-total cells (vertical)
//! - boundary-row labels across columns 0..=2 (horizontal)
//!
//! [`apply_merges`] is idempotent: regions already merged are skipped.

use tracing::{debug, warn};

use crate::conf::{
    C_FILL_BRAND_TOTAL, N_COL_CAMPAIGN, N_COL_LABEL_MERGE_END, N_COL_MEDIA, N_COL_PERCENT,
    N_FONT_SIZE_BRAND_TOTAL,
};
use crate::spec::{
    EnumFillClass, EnumMergeRule, EnumRowKind, SpecMergeReport, SpecMergeSpan, SpecRenderedRow,
    SpecRenderedTable,
};
use crate::util::{
    derive_campaign_name, format_smart_line_break, is_grand_total_label, is_total_label,
    match_media_token, normalize_label,
};

////////////////////////////////////////////////////////////////////////////////
// #region TrackerState

/// State of one vertical tracker.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EnumTrackerState {
    #[default]
    Idle,
    Accumulating { n_row_start: usize, label: String },
}

impl EnumTrackerState {
    /// Return to `Idle`, yielding the open run if there was one.
    fn take(&mut self) -> Option<(usize, String)> {
        match std::mem::take(self) {
            Self::Idle => None,
            Self::Accumulating { n_row_start, label } => Some((n_row_start, label)),
        }
    }
}

/// One merge tracker fed by the shared row cursor.
pub trait MergeTracker {
    /// Observe row `n_idx_row`; closed runs are pushed to `l_spans`.
    fn on_row(&mut self, n_idx_row: usize, row: &SpecRenderedRow, l_spans: &mut Vec<SpecMergeSpan>);

    /// Close any run still open at end of table.
    fn on_end(&mut self, n_rows: usize, l_spans: &mut Vec<SpecMergeSpan>);
}

fn is_run_boundary(row: &SpecRenderedRow) -> bool {
    row.kind == EnumRowKind::Header || row.kind.is_total()
}

/// Campaign name opening a run: white body row with a non-total label.
fn derive_campaign_entry(row: &SpecRenderedRow) -> Option<String> {
    if row.fill_class != EnumFillClass::White || is_run_boundary(row) {
        return None;
    }
    let c_norm = normalize_label(row.text_at(N_COL_CAMPAIGN));
    if c_norm.is_empty() || is_total_label(&c_norm) {
        return None;
    }
    Some(derive_campaign_name(row.text_at(N_COL_CAMPAIGN)))
}

fn create_vertical_span(
    n_row_start: usize,
    n_row_end_exclusive: usize,
    n_col: usize,
    label: String,
    rule: EnumMergeRule,
) -> SpecMergeSpan {
    SpecMergeSpan {
        row_start: n_row_start,
        row_end: n_row_end_exclusive - 1,
        col_start: n_col,
        col_end: n_col,
        label,
        rule,
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Trackers

/// Column-0 campaign runs; single-row runs are kept so their label is still formatted.
#[derive(Debug, Default)]
pub struct CampaignTracker {
    state: EnumTrackerState,
}

impl MergeTracker for CampaignTracker {
    fn on_row(&mut self, n_idx_row: usize, row: &SpecRenderedRow, l_spans: &mut Vec<SpecMergeSpan>) {
        if is_run_boundary(row) {
            if let Some((n_row_start, label)) = self.state.take() {
                // "MONTHLY TOTAL (...)\nName" carries the authoritative name
                let c_embedded = if row.kind == EnumRowKind::MonthlyTotal {
                    derive_campaign_name(row.text_at(N_COL_CAMPAIGN))
                } else {
                    String::new()
                };
                let c_label = if c_embedded.is_empty() { label } else { c_embedded };
                l_spans.push(create_vertical_span(
                    n_row_start,
                    n_idx_row,
                    N_COL_CAMPAIGN,
                    c_label,
                    EnumMergeRule::Campaign,
                ));
            }
            return;
        }
        if let Some(c_name) = derive_campaign_entry(row) {
            if let Some((n_row_start, label)) = self.state.take() {
                l_spans.push(create_vertical_span(
                    n_row_start,
                    n_idx_row,
                    N_COL_CAMPAIGN,
                    label,
                    EnumMergeRule::Campaign,
                ));
            }
            self.state = EnumTrackerState::Accumulating {
                n_row_start: n_idx_row,
                label: c_name,
            };
        }
    }

    fn on_end(&mut self, n_rows: usize, l_spans: &mut Vec<SpecMergeSpan>) {
        if let Some((n_row_start, label)) = self.state.take() {
            l_spans.push(create_vertical_span(
                n_row_start,
                n_rows,
                N_COL_CAMPAIGN,
                label,
                EnumMergeRule::Campaign,
            ));
        }
    }
}

/// Column-1 media runs.
#[derive(Debug, Default)]
pub struct MediaTracker {
    state: EnumTrackerState,
}

impl MediaTracker {
    fn close(&mut self, n_row_end_exclusive: usize, l_spans: &mut Vec<SpecMergeSpan>) {
        if let Some((n_row_start, label)) = self.state.take()
            && n_row_end_exclusive - n_row_start > 1
        {
            l_spans.push(create_vertical_span(
                n_row_start,
                n_row_end_exclusive,
                N_COL_MEDIA,
                label,
                EnumMergeRule::Media,
            ));
        }
    }
}

impl MergeTracker for MediaTracker {
    fn on_row(&mut self, n_idx_row: usize, row: &SpecRenderedRow, l_spans: &mut Vec<SpecMergeSpan>) {
        if is_run_boundary(row) || derive_campaign_entry(row).is_some() {
            self.close(n_idx_row, l_spans);
        }
        if is_run_boundary(row) {
            return;
        }
        let c_text = row.text_at(N_COL_MEDIA).trim();
        if c_text.is_empty() {
            return;
        }
        match match_media_token(c_text) {
            Some(media) => {
                if let EnumTrackerState::Accumulating { label, .. } = &self.state
                    && match_media_token(label) == Some(media)
                {
                    return;
                }
                self.close(n_idx_row, l_spans);
                self.state = EnumTrackerState::Accumulating {
                    n_row_start: n_idx_row,
                    label: c_text.to_string(),
                };
            }
            None => self.close(n_idx_row, l_spans),
        }
    }

    fn on_end(&mut self, n_rows: usize, l_spans: &mut Vec<SpecMergeSpan>) {
        self.close(n_rows, l_spans);
    }
}

/// Percentage column runs; boundaries follow the campaign tracker.
#[derive(Debug)]
pub struct PercentTracker {
    n_col: usize,
    state: EnumTrackerState,
}

impl Default for PercentTracker {
    fn default() -> Self {
        Self {
            n_col: N_COL_PERCENT,
            state: EnumTrackerState::Idle,
        }
    }
}

impl PercentTracker {
    fn close(&mut self, n_row_end_exclusive: usize, l_spans: &mut Vec<SpecMergeSpan>) {
        if let Some((n_row_start, label)) = self.state.take()
            && n_row_end_exclusive - n_row_start > 1
        {
            l_spans.push(create_vertical_span(
                n_row_start,
                n_row_end_exclusive,
                self.n_col,
                label,
                EnumMergeRule::Percent,
            ));
        }
    }
}

impl MergeTracker for PercentTracker {
    fn on_row(&mut self, n_idx_row: usize, row: &SpecRenderedRow, l_spans: &mut Vec<SpecMergeSpan>) {
        if is_run_boundary(row) {
            self.close(n_idx_row, l_spans);
            return;
        }
        if derive_campaign_entry(row).is_some() {
            self.close(n_idx_row, l_spans);
            if row.cells.len() > self.n_col {
                self.state = EnumTrackerState::Accumulating {
                    n_row_start: n_idx_row,
                    label: row.text_at(self.n_col).to_string(),
                };
            }
        }
    }

    fn on_end(&mut self, n_rows: usize, l_spans: &mut Vec<SpecMergeSpan>) {
        self.close(n_rows, l_spans);
    }
}

/// Gray boundary rows: one-row runs merged across the label columns.
#[derive(Debug, Default)]
pub struct TotalLabelTracker;

impl MergeTracker for TotalLabelTracker {
    fn on_row(&mut self, n_idx_row: usize, row: &SpecRenderedRow, l_spans: &mut Vec<SpecMergeSpan>) {
        if row.fill_class != EnumFillClass::Gray
            || !row.kind.is_total()
            || row.cells.len() <= N_COL_LABEL_MERGE_END
        {
            return;
        }
        let c_norm = normalize_label(row.text_at(N_COL_CAMPAIGN));
        if !is_total_label(&c_norm) {
            return;
        }
        let rule = if !is_grand_total_label(&c_norm) {
            EnumMergeRule::TotalLabel
        } else if c_norm.contains("BRAND") {
            EnumMergeRule::BrandTotalLabel
        } else {
            EnumMergeRule::GrandTotalLabel
        };
        l_spans.push(SpecMergeSpan {
            row_start: n_idx_row,
            row_end: n_idx_row,
            col_start: N_COL_CAMPAIGN,
            col_end: N_COL_LABEL_MERGE_END,
            label: row.text_at(N_COL_CAMPAIGN).to_string(),
            rule,
        });
    }

    fn on_end(&mut self, _n_rows: usize, _l_spans: &mut Vec<SpecMergeSpan>) {}
}

/// Feed every row of `table` to `trackers` in one pass.
pub fn drive_trackers(table: &SpecRenderedTable, trackers: &mut [Box<dyn MergeTracker>]) -> Vec<SpecMergeSpan> {
    let mut l_spans = Vec::new();
    for (n_idx_row, row) in table.rows.iter().enumerate() {
        for tracker in trackers.iter_mut() {
            tracker.on_row(n_idx_row, row, &mut l_spans);
        }
    }
    for tracker in trackers.iter_mut() {
        tracker.on_end(table.rows.len(), &mut l_spans);
    }
    l_spans
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ComputeAndApply

/// Merge spans of `table`, ordered by anchor cell.
pub fn compute_merges(table: &SpecRenderedTable) -> Vec<SpecMergeSpan> {
    let mut l_trackers: Vec<Box<dyn MergeTracker>> = vec![
        Box::new(CampaignTracker::default()),
        Box::new(MediaTracker::default()),
        Box::new(PercentTracker::default()),
        Box::new(TotalLabelTracker),
    ];
    let mut l_spans = drive_trackers(table, &mut l_trackers);
    l_spans.sort_by_key(|span| (span.row_start, span.col_start, span.row_end, span.col_end));
    debug!(n_rows = table.rows.len(), n_spans = l_spans.len(), "merge spans computed");
    l_spans
}

fn validate_span_bounds(table: &SpecRenderedTable, span: &SpecMergeSpan) -> Result<(), String> {
    if span.row_start > span.row_end || span.col_start > span.col_end {
        return Err(format!("inverted span {span:?}"));
    }
    if span.row_end >= table.rows.len() {
        return Err(format!(
            "span rows {}..={} exceed table height {}",
            span.row_start,
            span.row_end,
            table.rows.len()
        ));
    }
    for n_idx_row in span.row_start..=span.row_end {
        if table.rows[n_idx_row].cells.len() <= span.col_end {
            return Err(format!(
                "span column {} missing on row {n_idx_row}",
                span.col_end
            ));
        }
    }
    Ok(())
}

/// Apply `spans` to `table` in place.
///
/// Exact regions already merged are skipped silently. Overlapping or
/// out-of-bounds spans are skipped with a warning; the scan continues.
pub fn apply_merges(table: &mut SpecRenderedTable, spans: &[SpecMergeSpan]) -> SpecMergeReport {
    let mut report = SpecMergeReport::default();
    for span in spans {
        if let Err(msg) = validate_span_bounds(table, span) {
            warn!(reason = %msg, "merge span skipped");
            report.warn(msg);
            report.cnt_skipped += 1;
            continue;
        }
        if table.is_merged(span) {
            report.cnt_skipped += 1;
            continue;
        }
        if let Some(merged) = table.merges.iter().find(|merged| merged.overlaps(span)) {
            let msg = format!(
                "span rows {}..={} cols {}..={} overlaps merged region rows {}..={} cols {}..={}",
                span.row_start,
                span.row_end,
                span.col_start,
                span.col_end,
                merged.row_start,
                merged.row_end,
                merged.col_start,
                merged.col_end
            );
            warn!(reason = %msg, "merge span skipped");
            report.warn(msg);
            report.cnt_skipped += 1;
            continue;
        }

        let c_anchor = match span.rule {
            EnumMergeRule::Campaign => format_smart_line_break(&span.label),
            _ => span.label.clone(),
        };
        if span.n_cells() == 1 {
            let cell = &mut table.rows[span.row_start].cells[span.col_start];
            if cell.text == c_anchor {
                report.cnt_skipped += 1;
            } else {
                cell.text = c_anchor;
                report.cnt_applied += 1;
            }
            continue;
        }

        for n_idx_row in span.row_start..=span.row_end {
            for n_idx_col in span.col_start..=span.col_end {
                let cell = &mut table.rows[n_idx_row].cells[n_idx_col];
                if n_idx_row == span.row_start && n_idx_col == span.col_start {
                    cell.text = c_anchor.clone();
                } else {
                    cell.text.clear();
                }
                match span.rule {
                    EnumMergeRule::TotalLabel | EnumMergeRule::GrandTotalLabel => cell.bold = true,
                    EnumMergeRule::BrandTotalLabel => {
                        cell.bold = true;
                        cell.font_size = N_FONT_SIZE_BRAND_TOTAL;
                        cell.fill = C_FILL_BRAND_TOTAL.to_string();
                    }
                    _ => {}
                }
            }
        }
        table.merges.push(span.clone());
        report.cnt_applied += 1;
    }
    debug!(
        cnt_applied = report.cnt_applied,
        cnt_skipped = report.cnt_skipped,
        n_warnings = report.warnings.len(),
        "merges applied"
    );
    report
}

/// [`compute_merges`] then [`apply_merges`].
pub fn merge_rendered_table(table: &mut SpecRenderedTable) -> SpecMergeReport {
    let l_spans = compute_merges(table);
    apply_merges(table, &l_spans)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TableModelBuilder;
    use crate::builder::tests::create_record;
    use crate::conf::{C_FILL_GRAY, C_FILL_WHITE, N_COLS_TABLE};
    use crate::paginate::paginate_matrix;
    use crate::render::render_chunk;

    fn create_table(rows: &[(&[&str], &str)], n_cols: usize) -> SpecRenderedTable {
        let l_grid: Vec<Vec<String>> = rows
            .iter()
            .map(|(l_texts, _)| {
                let mut l_row: Vec<String> = l_texts.iter().map(|text| text.to_string()).collect();
                l_row.resize(n_cols, String::new());
                l_row
            })
            .collect();
        let l_fills: Vec<String> = rows.iter().map(|(_, c_fill)| c_fill.to_string()).collect();
        SpecRenderedTable::from_grid(&l_grid, &l_fills)
    }

    #[test]
    fn test_campaign_and_total_label_spans() {
        let table = create_table(
            &[
                (&["Campaign A", "Television", "£ 000"], C_FILL_WHITE),
                (&["", "", ""], C_FILL_WHITE),
                (&["MONTHLY TOTAL (£ 000)", "", ""], C_FILL_GRAY),
            ],
            3,
        );
        let l_spans = compute_merges(&table);
        let l_col0: Vec<&SpecMergeSpan> = l_spans.iter().filter(|span| span.col_start == 0).collect();

        assert_eq!(l_col0.len(), 2);
        assert_eq!(
            (l_col0[0].row_start, l_col0[0].row_end, l_col0[0].col_end),
            (0, 1, 0)
        );
        assert_eq!(l_col0[0].label, "CAMPAIGN A");
        assert_eq!(l_col0[0].rule, EnumMergeRule::Campaign);
        assert_eq!(
            (l_col0[1].row_start, l_col0[1].row_end, l_col0[1].col_start, l_col0[1].col_end),
            (2, 2, 0, 2)
        );
        assert_eq!(l_col0[1].rule, EnumMergeRule::TotalLabel);
    }

    #[test]
    fn test_campaign_name_embedded_in_monthly_total_wins() {
        let table = create_table(
            &[
                (&["Spring", "Digital", "£ 000"], C_FILL_WHITE),
                (&["", "Radio", "£ 000"], C_FILL_WHITE),
                (&["MONTHLY TOTAL (£ 000)\nSpring Sale 2024", "", ""], C_FILL_GRAY),
            ],
            3,
        );
        let l_spans = compute_merges(&table);
        let span = l_spans
            .iter()
            .find(|span| span.rule == EnumMergeRule::Campaign)
            .expect("campaign span");
        assert_eq!(span.label, "SPRING SALE 2024");
    }

    #[test]
    fn test_media_tracker_spans_metric_rows_and_skips_single_rows() {
        let mut trackers: Vec<Box<dyn MergeTracker>> = vec![Box::new(MediaTracker::default())];
        let table = create_table(
            &[
                (&["Alpha", "Television", "£ 000"], C_FILL_WHITE),
                (&["", "", "GRPs"], C_FILL_WHITE),
                (&["", "", "Reach 1+ (%)"], C_FILL_WHITE),
                (&["", "Digital", "£ 000"], C_FILL_WHITE),
                (&["MONTHLY TOTAL (£ 000)", "", ""], C_FILL_GRAY),
                (&["Beta", "Radio", "£ 000"], C_FILL_WHITE),
                (&["", "", ""], C_FILL_WHITE),
            ],
            3,
        );
        let l_spans = drive_trackers(&table, &mut trackers);

        assert_eq!(l_spans.len(), 2);
        assert_eq!((l_spans[0].row_start, l_spans[0].row_end), (0, 2));
        assert_eq!(l_spans[0].label, "Television");
        // closed at end of table
        assert_eq!((l_spans[1].row_start, l_spans[1].row_end), (5, 6));
        assert_eq!(l_spans[1].rule, EnumMergeRule::Media);
    }

    #[test]
    fn test_percent_span_clears_intermediate_cells() {
        let mut l_first = vec![""; N_COLS_TABLE];
        l_first[0] = "Alpha";
        l_first[1] = "Digital";
        l_first[N_COL_PERCENT] = "60.0%";
        let mut l_second = vec![""; N_COLS_TABLE];
        l_second[1] = "Radio";
        l_second[N_COL_PERCENT] = "stale";
        let mut table = create_table(
            &[
                (l_first.as_slice(), C_FILL_WHITE),
                (l_second.as_slice(), C_FILL_WHITE),
                (&["MONTHLY TOTAL (£ 000)"], C_FILL_GRAY),
            ],
            N_COLS_TABLE,
        );
        let report = merge_rendered_table(&mut table);

        assert!(report.warnings.is_empty());
        assert_eq!(table.rows[0].text_at(N_COL_PERCENT), "60.0%");
        assert_eq!(table.rows[1].text_at(N_COL_PERCENT), "");
        assert!(
            table
                .merges
                .iter()
                .any(|span| span.rule == EnumMergeRule::Percent && span.row_end == 1)
        );
    }

    #[test]
    fn test_brand_total_gets_larger_font_and_fill() {
        let mut table = create_table(
            &[
                (&["Alpha", "Digital", "£ 000"], C_FILL_WHITE),
                (&["MONTHLY TOTAL (£ 000)", "", ""], C_FILL_GRAY),
                (&["BRAND TOTAL", "", ""], C_FILL_GRAY),
            ],
            3,
        );
        assert_eq!(table.rows[2].kind, EnumRowKind::GrandTotal);
        merge_rendered_table(&mut table);

        let span = table.merge_at(2, 1).expect("brand span");
        assert_eq!(span.rule, EnumMergeRule::BrandTotalLabel);
        assert_eq!(table.rows[2].cells[0].font_size, N_FONT_SIZE_BRAND_TOTAL);
        assert_eq!(table.rows[2].cells[2].fill, C_FILL_BRAND_TOTAL);
        assert_eq!(table.rows[1].cells[0].font_size, crate::conf::N_FONT_SIZE_BODY);
    }

    #[test]
    fn test_apply_merges_is_idempotent() {
        let l_records = vec![
            create_record("Spring Sale", "Television", &[(0, 5_000.0)]),
            create_record("Spring Sale", "Digital", &[(1, 2_000.0)]),
            create_record("Autumn-Push", "Radio", &[(8, 1_000.0)]),
        ];
        let matrix = TableModelBuilder::default()
            .build(&l_records, "UK", "Acme", 2024)
            .expect("matrix");
        let l_chunks = paginate_matrix(&matrix, 32, true).expect("chunks");
        let mut table = render_chunk(&l_chunks[0]);

        let report_first = merge_rendered_table(&mut table);
        assert!(report_first.cnt_applied > 0);
        assert!(report_first.warnings.is_empty());
        let table_once = table.clone();

        let report_second = merge_rendered_table(&mut table);
        assert_eq!(report_second.cnt_applied, 0);
        assert_eq!(table, table_once);

        assert_eq!(table.rows[1].text_at(0), "AUTUMN-\nPUSH");
        assert_eq!(table.rows[3].text_at(0), "SPRING\nSALE");
    }

    #[test]
    fn test_overlapping_and_out_of_bounds_spans_are_skipped_with_warnings() {
        let mut table = create_table(
            &[
                (&["Alpha", "Digital", "£ 000"], C_FILL_WHITE),
                (&["", "", ""], C_FILL_WHITE),
            ],
            3,
        );
        let span_ok = SpecMergeSpan {
            row_start: 0,
            row_end: 1,
            col_start: 0,
            col_end: 0,
            label: "ALPHA".to_string(),
            rule: EnumMergeRule::Campaign,
        };
        let span_overlap = SpecMergeSpan {
            col_end: 1,
            ..span_ok.clone()
        };
        let span_outside = SpecMergeSpan {
            row_end: 9,
            ..span_ok.clone()
        };
        let report = apply_merges(&mut table, &[span_ok, span_overlap, span_outside]);

        assert_eq!(report.cnt_applied, 1);
        assert_eq!(report.cnt_skipped, 2);
        assert_eq!(report.warnings.len(), 2);
        assert_eq!(table.merges.len(), 1);
    }
}
