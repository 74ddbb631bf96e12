//! Shared table models: records, rows, chunks, merge spans, rendered tables.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::conf::{N_COL_GRP, N_COL_MONTH_FIRST, N_COL_TOTAL};

////////////////////////////////////////////////////////////////////////////////
// #region CanonicalRecord

/// One campaign/media aggregate delivered by the normalization layer.
///
/// Immutable once produced; every downstream stage only reads it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecCanonicalRecord {
    pub market: String,
    pub brand: String,
    pub product: String,
    /// Raw media label; mapped through [`EnumMediaType::from_raw`].
    pub media_type: String,
    pub campaign_name: String,
    pub campaign_type: String,
    pub funnel_stage: String,
    pub year: i32,
    /// Cost per month, January first.
    pub costs_by_month: [f64; 12],
    pub total_cost: f64,
    pub grp: f64,
    pub frequency: f64,
    /// Reach at 1+ frequency, in percent.
    pub reach_1_plus: f64,
    /// Reach at 3+ frequency (OTS 3+), in percent.
    pub reach_3_plus: f64,
}

impl SpecCanonicalRecord {
    /// Sum of the monthly costs.
    pub fn cost_months_sum(&self) -> f64 {
        self.costs_by_month.iter().sum()
    }
}

/// Media channels in table priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EnumMediaType {
    Television,
    Digital,
    Ooh,
    Radio,
    Cinema,
    Print,
    Other,
}

impl EnumMediaType {
    /// All channels in emission order.
    pub const ALL: [EnumMediaType; 7] = [
        Self::Television,
        Self::Digital,
        Self::Ooh,
        Self::Radio,
        Self::Cinema,
        Self::Print,
        Self::Other,
    ];

    /// Display label used in the media column and tiles.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Television => "Television",
            Self::Digital => "Digital",
            Self::Ooh => "OOH",
            Self::Radio => "Radio",
            Self::Cinema => "Cinema",
            Self::Print => "Print",
            Self::Other => "Other",
        }
    }

    /// Upper-case token matched by the media merge tracker.
    pub fn token(&self) -> &'static str {
        match self {
            Self::Television => "TELEVISION",
            Self::Digital => "DIGITAL",
            Self::Ooh => "OOH",
            Self::Radio => "RADIO",
            Self::Cinema => "CINEMA",
            Self::Print => "PRINT",
            Self::Other => "OTHER",
        }
    }

    /// Map a raw source label; unknown labels fall into [`Self::Other`].
    pub fn from_raw(raw: &str) -> Self {
        let c_raw = raw.trim().to_ascii_lowercase();
        let l_rules: [(&[&str], EnumMediaType); 6] = [
            (&["television", "tv", "bvod", "vod"], Self::Television),
            (
                &["digital", "online", "social", "search", "display", "programmatic"],
                Self::Digital,
            ),
            (&["ooh", "outdoor", "out of home", "dooh"], Self::Ooh),
            (&["radio", "audio", "podcast"], Self::Radio),
            (&["cinema"], Self::Cinema),
            (&["print", "press", "magazine", "newspaper"], Self::Print),
        ];
        for (l_keys, media) in l_rules {
            if l_keys.iter().any(|key| {
                if key.len() <= 3 {
                    c_raw
                        .split(|chr: char| !chr.is_ascii_alphanumeric())
                        .any(|word| word == *key)
                } else {
                    c_raw.contains(key)
                }
            }) {
                return media;
            }
        }
        Self::Other
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region TableMatrix

/// Logical row kind, assigned once and carried through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumRowKind {
    Header,
    CampaignMedia,
    MetricSub,
    MonthlyTotal,
    CarriedForward,
    Subtotal,
    GrandTotal,
}

impl EnumRowKind {
    /// Gray boundary rows closing or restating a run.
    pub fn is_total(&self) -> bool {
        matches!(
            self,
            Self::MonthlyTotal | Self::CarriedForward | Self::Subtotal | Self::GrandTotal
        )
    }
}

/// Background color class of a rendered row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumFillClass {
    White,
    Gray,
    Other,
}

/// Per-cell metadata.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecCellMeta {
    /// Unrounded numeric value behind the display text.
    pub value: Option<f64>,
    /// Media channel of the row owning this cell.
    pub media_type: Option<EnumMediaType>,
    /// Authoritative "not empty" flag; a displayed `0` may still carry data.
    pub if_has_data: bool,
}

/// One logical cell: display text plus optional metadata.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecCell {
    pub text: String,
    pub meta: Option<SpecCellMeta>,
}

impl SpecCell {
    /// Blank cell without metadata.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Text-only cell.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            meta: None,
        }
    }

    /// Numeric cell; `text` is the already formatted display string.
    pub fn number(
        value: f64,
        text: impl Into<String>,
        media_type: Option<EnumMediaType>,
        if_has_data: bool,
    ) -> Self {
        Self {
            text: if if_has_data {
                text.into()
            } else {
                String::new()
            },
            meta: Some(SpecCellMeta {
                value: Some(value),
                media_type,
                if_has_data,
            }),
        }
    }

    /// Numeric value when the cell carries data, else `0.0`.
    pub fn value_or_zero(&self) -> f64 {
        match &self.meta {
            Some(SpecCellMeta {
                value: Some(val),
                if_has_data: true,
                ..
            }) => *val,
            _ => 0.0,
        }
    }
}

/// One logical table row.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecTableRow {
    pub kind: EnumRowKind,
    pub cells: Vec<SpecCell>,
}

impl SpecTableRow {
    /// Column-0 display text.
    pub fn label(&self) -> &str {
        self.cells.first().map_or("", |cell| cell.text.as_str())
    }

    /// Numeric value at `col_idx`, `0.0` when empty/out of range.
    pub fn value_at(&self, col_idx: usize) -> f64 {
        self.cells.get(col_idx).map_or(0.0, SpecCell::value_or_zero)
    }

    /// Monthly values, January first.
    pub fn month_values(&self) -> [f64; 12] {
        let mut l_values = [0.0; 12];
        for (n_idx_month, value) in l_values.iter_mut().enumerate() {
            *value = self.value_at(N_COL_MONTH_FIRST + n_idx_month);
        }
        l_values
    }

    /// Row total column value.
    pub fn total_value(&self) -> f64 {
        self.value_at(N_COL_TOTAL)
    }

    /// Aggregate GRP column value.
    pub fn grp_value(&self) -> f64 {
        self.value_at(N_COL_GRP)
    }
}

/// Row range of one campaign block in [`SpecTableMatrix::rows`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecCampaignBlock {
    /// Campaign display name.
    pub campaign_name: String,
    /// Inclusive first row.
    pub row_start_inclusive: usize,
    /// Exclusive end row; the row before it is the block's MonthlyTotal.
    pub row_end_exclusive: usize,
}

impl SpecCampaignBlock {
    pub fn n_rows(&self) -> usize {
        self.row_end_exclusive - self.row_start_inclusive
    }
}

/// Header row + campaign blocks + grand total row for one (market, brand, year).
#[derive(Debug, Clone, PartialEq)]
pub struct SpecTableMatrix {
    pub market: String,
    pub brand: String,
    pub year: i32,
    pub rows: Vec<SpecTableRow>,
    pub blocks: Vec<SpecCampaignBlock>,
}

impl SpecTableMatrix {
    /// Header row (row 0).
    pub fn header(&self) -> Option<&SpecTableRow> {
        self.rows.first()
    }

    /// Grand total row (last row).
    pub fn grand_total(&self) -> Option<&SpecTableRow> {
        self.rows
            .last()
            .filter(|row| row.kind == EnumRowKind::GrandTotal)
    }

    /// Rows of one block.
    pub fn block_rows(&self, block: &SpecCampaignBlock) -> &[SpecTableRow] {
        &self.rows[block.row_start_inclusive..block.row_end_exclusive]
    }

    /// Cell metadata keyed by `(row, col)`.
    pub fn derive_cell_metadata(&self) -> BTreeMap<(usize, usize), SpecCellMeta> {
        derive_cell_metadata_from_rows(&self.rows)
    }
}

/// One slide-sized slice of a matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecSlideChunk {
    pub rows: Vec<SpecTableRow>,
    /// `true` for every chunk after the first.
    pub if_continuation: bool,
    /// Zero-based chunk position.
    pub idx_chunk: usize,
    /// Number of chunks produced for the matrix.
    pub n_chunks: usize,
}

impl SpecSlideChunk {
    /// Cell metadata keyed by chunk-local `(row, col)`.
    pub fn derive_cell_metadata(&self) -> BTreeMap<(usize, usize), SpecCellMeta> {
        derive_cell_metadata_from_rows(&self.rows)
    }

    /// Title pagination suffix, e.g. ` (2 of 3)`; empty for a single chunk.
    pub fn derive_title_suffix(&self) -> String {
        if self.n_chunks <= 1 {
            return String::new();
        }
        format!(" ({} of {})", self.idx_chunk + 1, self.n_chunks)
    }
}

fn derive_cell_metadata_from_rows(rows: &[SpecTableRow]) -> BTreeMap<(usize, usize), SpecCellMeta> {
    let mut dict_meta = BTreeMap::new();
    for (n_idx_row, row) in rows.iter().enumerate() {
        for (n_idx_col, cell) in row.cells.iter().enumerate() {
            if let Some(meta) = &cell.meta {
                dict_meta.insert((n_idx_row, n_idx_col), meta.clone());
            }
        }
    }
    dict_meta
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region MergeSpecification

/// Which tracker produced a span; drives content/styling on apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumMergeRule {
    /// Vertical campaign-name run in column 0.
    Campaign,
    /// Vertical media run in column 1.
    Media,
    /// Vertical percentage run.
    Percent,
    /// Horizontal total label across columns 0..=2.
    TotalLabel,
    /// Horizontal grand/brand total label across columns 0..=2.
    GrandTotalLabel,
    /// Grand/brand total label containing `BRAND`: larger font and distinct fill.
    BrandTotalLabel,
}

/// Rectangular merge region (inclusive bounds).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecMergeSpan {
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
    /// Resolved label for the anchor cell.
    pub label: String,
    pub rule: EnumMergeRule,
}

impl SpecMergeSpan {
    pub fn n_cells(&self) -> usize {
        (self.row_end - self.row_start + 1) * (self.col_end - self.col_start + 1)
    }

    pub fn contains(&self, row_idx: usize, col_idx: usize) -> bool {
        (self.row_start..=self.row_end).contains(&row_idx)
            && (self.col_start..=self.col_end).contains(&col_idx)
    }

    pub fn overlaps(&self, other: &SpecMergeSpan) -> bool {
        self.row_start <= other.row_end
            && other.row_start <= self.row_end
            && self.col_start <= other.col_end
            && other.col_start <= self.col_end
    }

    fn same_region(&self, other: &SpecMergeSpan) -> bool {
        self.row_start == other.row_start
            && self.row_end == other.row_end
            && self.col_start == other.col_start
            && self.col_end == other.col_end
    }
}

/// Outcome of one `apply_merges` call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecMergeReport {
    pub cnt_applied: usize,
    pub cnt_skipped: usize,
    /// Non-fatal per-span/per-cell problems.
    pub warnings: Vec<String>,
}

impl SpecMergeReport {
    pub fn warn(&mut self, msg: impl AsRef<str>) {
        self.warnings.push(msg.as_ref().to_string());
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RenderedTable

/// One materialized table cell.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecRenderedCell {
    pub text: String,
    /// Background color as `#RRGGBB`.
    pub fill: String,
    pub bold: bool,
    pub font_size: u32,
}

/// One materialized row; `kind` is carried from the logical row or classified once.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecRenderedRow {
    pub kind: EnumRowKind,
    pub fill_class: EnumFillClass,
    pub cells: Vec<SpecRenderedCell>,
}

impl SpecRenderedRow {
    /// Cell text at `col_idx`, empty when out of range.
    pub fn text_at(&self, col_idx: usize) -> &str {
        self.cells.get(col_idx).map_or("", |cell| cell.text.as_str())
    }
}

/// Materialized table for one slide, with its applied merge regions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecRenderedTable {
    pub rows: Vec<SpecRenderedRow>,
    /// Regions already merged, in application order.
    pub merges: Vec<SpecMergeSpan>,
}

impl SpecRenderedTable {
    /// Build from raw text grid + per-row fill color, classifying each row once.
    pub fn from_grid(grid: &[Vec<String>], fills: &[String]) -> Self {
        let rows = grid
            .iter()
            .enumerate()
            .map(|(n_idx_row, l_texts)| {
                let c_fill = fills
                    .get(n_idx_row)
                    .cloned()
                    .unwrap_or_else(|| crate::conf::C_FILL_WHITE.to_string());
                let fill_class = crate::util::derive_fill_class(&c_fill);
                let l_text_refs: Vec<&str> = l_texts.iter().map(String::as_str).collect();
                SpecRenderedRow {
                    kind: crate::util::classify_row_kind(&l_text_refs, fill_class),
                    fill_class,
                    cells: l_texts
                        .iter()
                        .map(|text| SpecRenderedCell {
                            text: text.clone(),
                            fill: c_fill.clone(),
                            bold: fill_class == EnumFillClass::Gray,
                            font_size: crate::conf::N_FONT_SIZE_BODY,
                        })
                        .collect(),
                }
            })
            .collect();
        Self {
            rows,
            merges: vec![],
        }
    }

    /// Number of columns of the widest row.
    pub fn n_cols(&self) -> usize {
        self.rows.iter().map(|row| row.cells.len()).max().unwrap_or(0)
    }

    /// Merge region covering `(row, col)`, if any.
    pub fn merge_at(&self, row_idx: usize, col_idx: usize) -> Option<&SpecMergeSpan> {
        self.merges
            .iter()
            .find(|span| span.contains(row_idx, col_idx))
    }

    /// `true` when exactly this region is already merged.
    pub fn is_merged(&self, span: &SpecMergeSpan) -> bool {
        self.merges.iter().any(|merged| merged.same_region(span))
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Deck

/// Summary tile category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumTileCategory {
    /// Sum of a quarter's three months.
    QuarterBudget,
    /// Share of total per mapped media type, in percent.
    MediaShare,
    /// Share of total per funnel stage, in percent.
    FunnelShare,
}

impl EnumTileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuarterBudget => "quarter_budget",
            Self::MediaShare => "media_share",
            Self::FunnelShare => "funnel_share",
        }
    }
}

/// Named tile contract: shape name -> metric.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpecTileConfig {
    pub shape_name: String,
    pub category: EnumTileCategory,
    /// Quarter (`Q1`), media label (`Television`) or funnel stage (`Awareness`).
    pub label: String,
    /// Display divisor (`1000.0` renders `£300K`).
    #[serde(default = "derive_default_tile_scale")]
    pub scale: f64,
}

fn derive_default_tile_scale() -> f64 {
    1.0
}

/// One slide of the rendered deck.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecRenderedSlide {
    /// Zero-based position in the deck.
    pub idx_slide: usize,
    pub title: String,
    /// `None` for section/delimiter slides.
    pub table: Option<SpecRenderedTable>,
    /// Shape name -> tile text.
    pub tiles: BTreeMap<String, String>,
}

/// Ordered slides.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecRenderedDeck {
    pub slides: Vec<SpecRenderedSlide>,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CellFormatSpecification

/// Cell format overlay used by the workbook writer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SpecCellFormat {
    pub font_name: Option<String>,
    pub font_size: Option<u32>,
    pub bold: Option<bool>,
    pub font_color: Option<String>,
    pub bg_color: Option<String>,
    pub align: Option<String>,
    pub valign: Option<String>,
    pub border: Option<i64>,
    pub text_wrap: Option<bool>,
}

impl SpecCellFormat {
    /// Merge two formats with right-side non-`None` overwrite semantics.
    pub fn merge(&self, other: &SpecCellFormat) -> SpecCellFormat {
        SpecCellFormat {
            font_name: other.font_name.clone().or_else(|| self.font_name.clone()),
            font_size: other.font_size.or(self.font_size),
            bold: other.bold.or(self.bold),
            font_color: other.font_color.clone().or_else(|| self.font_color.clone()),
            bg_color: other.bg_color.clone().or_else(|| self.bg_color.clone()),
            align: other.align.clone().or_else(|| self.align.clone()),
            valign: other.valign.clone().or_else(|| self.valign.clone()),
            border: other.border.or(self.border),
            text_wrap: other.text_wrap.or(self.text_wrap),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_from_raw_maps_aliases_and_falls_back_to_other() {
        assert_eq!(EnumMediaType::from_raw("TV"), EnumMediaType::Television);
        assert_eq!(EnumMediaType::from_raw("Linear TV"), EnumMediaType::Television);
        assert_eq!(EnumMediaType::from_raw("Paid Social"), EnumMediaType::Digital);
        assert_eq!(EnumMediaType::from_raw("Out of Home"), EnumMediaType::Ooh);
        assert_eq!(EnumMediaType::from_raw("Press"), EnumMediaType::Print);
        assert_eq!(EnumMediaType::from_raw("Sponsorship"), EnumMediaType::Other);
        assert_eq!(EnumMediaType::from_raw("Stunts"), EnumMediaType::Other);
    }

    #[test]
    fn test_media_type_order_is_priority_order() {
        let mut l_media = vec![
            EnumMediaType::Other,
            EnumMediaType::Radio,
            EnumMediaType::Television,
            EnumMediaType::Digital,
        ];
        l_media.sort();
        assert_eq!(
            l_media,
            vec![
                EnumMediaType::Television,
                EnumMediaType::Digital,
                EnumMediaType::Radio,
                EnumMediaType::Other
            ]
        );
    }

    #[test]
    fn test_number_cell_without_data_is_blank() {
        let cell = SpecCell::number(0.0004, "0", None, false);
        assert_eq!(cell.text, "");
        assert_eq!(cell.value_or_zero(), 0.0);
        let cell = SpecCell::number(400.0, "0", None, true);
        assert_eq!(cell.text, "0");
        assert_eq!(cell.value_or_zero(), 400.0);
    }
}
