//! `TableModelBuilder`: canonical records -> logical table matrix.

use std::collections::BTreeMap;

use tracing::debug;

use crate::conf::{
    C_LABEL_GRAND_TOTAL, C_LABEL_HEADER_CAMPAIGN, C_METRIC_GRP, C_METRIC_OTS_3, C_METRIC_REACH_1,
    L_MONTH_LABELS, N_COL_CAMPAIGN, N_COL_GRP, N_COL_MEDIA, N_COL_METRIC, N_COL_MONTH_FIRST,
    N_COL_PERCENT, N_COL_TOTAL, N_COLS_TABLE, N_EPS_COST, N_EPS_METRIC,
};
use crate::error::TableError;
use crate::spec::{
    EnumMediaType, EnumRowKind, SpecCampaignBlock, SpecCanonicalRecord, SpecCell, SpecTableMatrix,
    SpecTableRow,
};
use crate::util::{
    collapse_whitespace, format_cost_thousands, format_metric, format_percent,
    select_records_for_key,
};

////////////////////////////////////////////////////////////////////////////////
// #region RunningSum

/// Per-month spend accumulator shared by the builder and the paginator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecRunningSum {
    pub months: [f64; 12],
    pub total: f64,
    pub grp: f64,
}

impl SpecRunningSum {
    /// Add the spend/GRP columns of one row.
    pub fn add_row(&mut self, row: &SpecTableRow) {
        for (n_idx_month, value) in row.month_values().iter().enumerate() {
            self.months[n_idx_month] += value;
        }
        self.total += row.total_value();
        self.grp += row.grp_value();
    }

    /// Add another accumulator.
    pub fn add(&mut self, other: &SpecRunningSum) {
        for (n_idx_month, value) in other.months.iter().enumerate() {
            self.months[n_idx_month] += value;
        }
        self.total += other.total;
        self.grp += other.grp;
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RowFactories

fn create_cost_cell(value: f64, media_type: Option<EnumMediaType>) -> SpecCell {
    SpecCell::number(
        value,
        format_cost_thousands(value),
        media_type,
        value.abs() > N_EPS_COST,
    )
}

fn create_metric_cell(value: Option<f64>) -> SpecCell {
    match value {
        Some(val) => SpecCell::number(
            val,
            format_metric(val),
            Some(EnumMediaType::Television),
            val.abs() >= N_EPS_METRIC,
        ),
        None => SpecCell::number(0.0, "", Some(EnumMediaType::Television), false),
    }
}

fn create_percent_cell(n_part: f64, n_whole: f64) -> SpecCell {
    if n_whole.abs() <= N_EPS_COST {
        return SpecCell::empty();
    }
    let n_share_pct = n_part / n_whole * 100.0;
    SpecCell::number(n_share_pct, format_percent(n_share_pct), None, true)
}

/// Header row: campaign, media, unit, months, total, share, GRPs.
pub fn create_header_row() -> SpecTableRow {
    let mut l_cells = vec![SpecCell::empty(); N_COLS_TABLE];
    l_cells[N_COL_CAMPAIGN] = SpecCell::text(C_LABEL_HEADER_CAMPAIGN);
    l_cells[N_COL_MEDIA] = SpecCell::text("MEDIA");
    l_cells[N_COL_METRIC] = SpecCell::text("METRIC");
    for (n_idx_month, c_month) in L_MONTH_LABELS.iter().enumerate() {
        l_cells[N_COL_MONTH_FIRST + n_idx_month] = SpecCell::text(*c_month);
    }
    l_cells[N_COL_TOTAL] = SpecCell::text("TOTAL");
    l_cells[N_COL_PERCENT] = SpecCell::text("% OF TOTAL");
    l_cells[N_COL_GRP] = SpecCell::text("GRPs");
    SpecTableRow {
        kind: EnumRowKind::Header,
        cells: l_cells,
    }
}

/// Boundary row (monthly total, subtotal, carried forward, grand total) from sums.
///
/// `n_total_grand` fills the share column; `None` leaves it blank.
pub fn create_summary_row(
    kind: EnumRowKind,
    label: &str,
    sums: &SpecRunningSum,
    n_total_grand: Option<f64>,
) -> SpecTableRow {
    let mut l_cells = vec![SpecCell::empty(); N_COLS_TABLE];
    l_cells[N_COL_CAMPAIGN] = SpecCell::text(label);
    for (n_idx_month, value) in sums.months.iter().enumerate() {
        l_cells[N_COL_MONTH_FIRST + n_idx_month] = create_cost_cell(*value, None);
    }
    l_cells[N_COL_TOTAL] = create_cost_cell(sums.total, None);
    if let Some(n_whole) = n_total_grand {
        l_cells[N_COL_PERCENT] = create_percent_cell(sums.total, n_whole);
    }
    if sums.grp.abs() >= N_EPS_METRIC {
        l_cells[N_COL_GRP] = create_metric_cell(Some(sums.grp));
    }
    SpecTableRow {
        kind,
        cells: l_cells,
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region TelevisionMetrics

/// Monthly GRP sums and Reach@1+/OTS@3+ averages of television records.
#[derive(Debug, Clone, PartialEq, Default)]
struct SpecTvMetrics {
    grp_by_month: [f64; 12],
    reach_1_by_month: [Option<f64>; 12],
    ots_3_by_month: [Option<f64>; 12],
}

impl SpecTvMetrics {
    fn grp_total(&self) -> f64 {
        self.grp_by_month.iter().sum()
    }
}

fn derive_mean_by_month(sums: &[f64; 12], counts: &[usize; 12]) -> [Option<f64>; 12] {
    let mut l_means = [None; 12];
    for (n_idx_month, mean) in l_means.iter_mut().enumerate() {
        if counts[n_idx_month] > 0 {
            *mean = Some(sums[n_idx_month] / counts[n_idx_month] as f64);
        }
    }
    l_means
}

fn derive_mean_of_present(values: &[Option<f64>; 12]) -> Option<f64> {
    let l_present: Vec<f64> = values.iter().flatten().copied().collect();
    if l_present.is_empty() {
        return None;
    }
    Some(l_present.iter().sum::<f64>() / l_present.len() as f64)
}

/// Attribute each record's metrics to the months where it spends, weighted by cost.
fn derive_tv_metrics(records: &[&SpecCanonicalRecord]) -> SpecTvMetrics {
    let mut l_grp = [0.0; 12];
    let mut l_reach_sum = [0.0; 12];
    let mut l_reach_cnt = [0usize; 12];
    let mut l_ots_sum = [0.0; 12];
    let mut l_ots_cnt = [0usize; 12];

    for rec in records {
        let n_cost_sum = rec.cost_months_sum();
        if n_cost_sum.abs() <= N_EPS_COST {
            continue;
        }
        for (n_idx_month, n_cost) in rec.costs_by_month.iter().enumerate() {
            if n_cost.abs() <= N_EPS_COST {
                continue;
            }
            l_grp[n_idx_month] += rec.grp * (n_cost / n_cost_sum);
            if rec.reach_1_plus.abs() >= N_EPS_METRIC {
                l_reach_sum[n_idx_month] += rec.reach_1_plus;
                l_reach_cnt[n_idx_month] += 1;
            }
            if rec.reach_3_plus.abs() >= N_EPS_METRIC {
                l_ots_sum[n_idx_month] += rec.reach_3_plus;
                l_ots_cnt[n_idx_month] += 1;
            }
        }
    }

    SpecTvMetrics {
        grp_by_month: l_grp,
        reach_1_by_month: derive_mean_by_month(&l_reach_sum, &l_reach_cnt),
        ots_3_by_month: derive_mean_by_month(&l_ots_sum, &l_ots_cnt),
    }
}

fn create_metric_row(label: &str, values: &[Option<f64>; 12], total: Option<f64>) -> SpecTableRow {
    let mut l_cells = vec![SpecCell::empty(); N_COLS_TABLE];
    l_cells[N_COL_METRIC] = SpecCell::text(label);
    for (n_idx_month, value) in values.iter().enumerate() {
        l_cells[N_COL_MONTH_FIRST + n_idx_month] = create_metric_cell(*value);
    }
    l_cells[N_COL_TOTAL] = create_metric_cell(total);
    SpecTableRow {
        kind: EnumRowKind::MetricSub,
        cells: l_cells,
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Builder

/// Builds the logical table of one (market, brand, year).
#[derive(Debug, Clone)]
pub struct TableModelBuilder {
    currency_symbol: String,
}

impl Default for TableModelBuilder {
    fn default() -> Self {
        Self::new("£")
    }
}

impl TableModelBuilder {
    pub fn new(currency_symbol: impl Into<String>) -> Self {
        Self {
            currency_symbol: currency_symbol.into(),
        }
    }

    /// Unit label of cost rows (`£ 000`).
    pub fn cost_unit_label(&self) -> String {
        format!("{} 000", self.currency_symbol)
    }

    /// Monthly total row label (`MONTHLY TOTAL (£ 000)`).
    pub fn monthly_total_label(&self) -> String {
        format!("MONTHLY TOTAL ({})", self.cost_unit_label())
    }

    /// Build the matrix for `(market, brand, year)`.
    ///
    /// Campaigns are ordered by case-insensitive name; media by
    /// [`EnumMediaType`] priority. Television rows are followed by GRP,
    /// Reach@1+ and OTS@3+ sub-rows, which never enter spend totals.
    ///
    /// Returns [`TableError::NotFound`] when nothing matches and
    /// [`TableError::ZeroBudget`] when the matched spend sums to zero.
    pub fn build(
        &self,
        records: &[SpecCanonicalRecord],
        market: &str,
        brand: &str,
        year: i32,
    ) -> Result<SpecTableMatrix, TableError> {
        let l_selected = select_records_for_key(records, market, brand, Some(year));
        if l_selected.is_empty() {
            return Err(TableError::NotFound {
                market: market.to_string(),
                brand: brand.to_string(),
                year,
            });
        }

        let n_total_grand: f64 = l_selected.iter().map(|rec| rec.cost_months_sum()).sum();
        if n_total_grand.abs() <= N_EPS_COST {
            return Err(TableError::ZeroBudget {
                market: market.to_string(),
                brand: brand.to_string(),
                year,
            });
        }

        // lower-cased name -> (first display spelling, media -> records)
        type TypeMediaGroups<'a> = BTreeMap<EnumMediaType, Vec<&'a SpecCanonicalRecord>>;
        let mut dict_campaigns: BTreeMap<String, (String, TypeMediaGroups<'_>)> = BTreeMap::new();
        for rec in &l_selected {
            let c_display = collapse_whitespace(&rec.campaign_name);
            let (_, dict_media) = dict_campaigns
                .entry(c_display.to_lowercase())
                .or_insert_with(|| (c_display.clone(), BTreeMap::new()));
            dict_media
                .entry(EnumMediaType::from_raw(&rec.media_type))
                .or_default()
                .push(rec);
        }

        let c_unit = self.cost_unit_label();
        let c_monthly_total = self.monthly_total_label();
        let mut l_rows = vec![create_header_row()];
        let mut l_blocks = Vec::with_capacity(dict_campaigns.len());
        let mut sums_grand = SpecRunningSum::default();

        for (c_campaign, dict_media) in dict_campaigns.values() {
            let n_row_start = l_rows.len();
            let n_total_campaign: f64 = dict_media
                .values()
                .flatten()
                .map(|rec| rec.cost_months_sum())
                .sum();
            let mut sums_campaign = SpecRunningSum::default();

            for (n_idx_media, (media, l_recs)) in dict_media.iter().enumerate() {
                let mut l_months = [0.0; 12];
                for rec in l_recs {
                    for (n_idx_month, n_cost) in rec.costs_by_month.iter().enumerate() {
                        l_months[n_idx_month] += n_cost;
                    }
                }
                let n_total_media: f64 = l_months.iter().sum();
                let metrics_tv = (*media == EnumMediaType::Television).then(|| derive_tv_metrics(l_recs));

                let mut l_cells = vec![SpecCell::empty(); N_COLS_TABLE];
                if n_idx_media == 0 {
                    l_cells[N_COL_CAMPAIGN] = SpecCell::text(c_campaign.clone());
                    l_cells[N_COL_PERCENT] = create_percent_cell(n_total_campaign, n_total_grand);
                }
                l_cells[N_COL_MEDIA] = SpecCell::text(media.label());
                l_cells[N_COL_METRIC] = SpecCell::text(c_unit.clone());
                for (n_idx_month, value) in l_months.iter().enumerate() {
                    l_cells[N_COL_MONTH_FIRST + n_idx_month] = create_cost_cell(*value, Some(*media));
                }
                l_cells[N_COL_TOTAL] = create_cost_cell(n_total_media, Some(*media));
                if let Some(metrics) = &metrics_tv
                    && metrics.grp_total().abs() >= N_EPS_METRIC
                {
                    l_cells[N_COL_GRP] = create_metric_cell(Some(metrics.grp_total()));
                }

                let row_media = SpecTableRow {
                    kind: EnumRowKind::CampaignMedia,
                    cells: l_cells,
                };
                sums_campaign.add_row(&row_media);
                l_rows.push(row_media);

                if let Some(metrics) = metrics_tv {
                    let l_grp: [Option<f64>; 12] = metrics.grp_by_month.map(Some);
                    l_rows.push(create_metric_row(C_METRIC_GRP, &l_grp, Some(metrics.grp_total())));
                    l_rows.push(create_metric_row(
                        C_METRIC_REACH_1,
                        &metrics.reach_1_by_month,
                        derive_mean_of_present(&metrics.reach_1_by_month),
                    ));
                    l_rows.push(create_metric_row(
                        C_METRIC_OTS_3,
                        &metrics.ots_3_by_month,
                        derive_mean_of_present(&metrics.ots_3_by_month),
                    ));
                }
            }

            l_rows.push(create_summary_row(
                EnumRowKind::MonthlyTotal,
                &c_monthly_total,
                &sums_campaign,
                None,
            ));
            sums_grand.add(&sums_campaign);
            l_blocks.push(SpecCampaignBlock {
                campaign_name: c_campaign.clone(),
                row_start_inclusive: n_row_start,
                row_end_exclusive: l_rows.len(),
            });
        }

        l_rows.push(create_summary_row(
            EnumRowKind::GrandTotal,
            C_LABEL_GRAND_TOTAL,
            &sums_grand,
            Some(n_total_grand),
        ));

        debug!(
            market,
            brand,
            year,
            n_rows = l_rows.len(),
            n_blocks = l_blocks.len(),
            "table matrix built"
        );

        Ok(SpecTableMatrix {
            market: market.to_string(),
            brand: brand.to_string(),
            year,
            rows: l_rows,
            blocks: l_blocks,
        })
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
