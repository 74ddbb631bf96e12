//! Title/tile parsing and expected aggregates.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use planslide_table::{EnumMediaType, EnumTileCategory, SpecCanonicalRecord, SpecTileConfig};
use regex::Regex;

static RE_TITLE_PAGINATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*\(\s*\d+\s*(?:of|/)\s*\d+\s*\)\s*$").expect("Invalid title pagination regex")
});
static RE_TILE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d[\d,]*(?:\.\d+)?").expect("Invalid tile number regex"));

const TUP_CURRENCY_SYMBOLS: [char; 4] = ['£', '$', '€', '¥'];

/// Split a slide title into `(market, brand)`.
///
/// A trailing `(N of M)` / `(N/M)` suffix is dropped first; the remainder is
/// split on the first `" - "`.
pub fn parse_slide_title(title: &str) -> Option<(String, String)> {
    let c_title = RE_TITLE_PAGINATION.replace(title.trim(), "");
    let (c_market, c_brand) = c_title.split_once(" - ")?;
    let (c_market, c_brand) = (c_market.trim(), c_brand.trim());
    if c_market.is_empty() || c_brand.is_empty() {
        return None;
    }
    Some((c_market.to_string(), c_brand.to_string()))
}

/// Numeric value of a tile text, multiplied by the tile's display `scale`.
///
/// Only the part after the last `:` is read; currency and percent symbols
/// and thousands separators are ignored.
pub fn parse_tile_number(text: &str, scale: f64) -> Option<f64> {
    let c_value = text.rsplit_once(':').map_or(text, |(_, val)| val);
    let c_clean: String = c_value
        .chars()
        .filter(|chr| !TUP_CURRENCY_SYMBOLS.contains(chr) && *chr != '%')
        .collect();
    let c_number = RE_TILE_NUMBER.find(&c_clean)?.as_str().replace(',', "");
    let n_value: f64 = c_number.parse().ok()?;
    Some(n_value * if scale > 0.0 { scale } else { 1.0 })
}

/// Aggregates recomputed from records for one (market, brand, year).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecExpectedAggregates {
    pub quarters: [f64; 4],
    pub total: f64,
    /// Share of total per media type, in percent.
    pub media_share_pct: BTreeMap<EnumMediaType, f64>,
    /// Share of total per lower-cased funnel stage, in percent.
    pub funnel_share_pct: BTreeMap<String, f64>,
}

impl SpecExpectedAggregates {
    /// Expected value for `tile`, in the same unit as the parsed tile number.
    pub fn value_for(&self, tile: &SpecTileConfig) -> Option<f64> {
        let c_label = tile.label.trim().to_lowercase();
        match tile.category {
            EnumTileCategory::QuarterBudget => {
                let n_quarter: usize = c_label.strip_prefix('q')?.parse().ok()?;
                self.quarters.get(n_quarter.checked_sub(1)?).copied()
            }
            EnumTileCategory::MediaShare => {
                let media = EnumMediaType::ALL
                    .into_iter()
                    .find(|media| media.label().to_lowercase() == c_label)?;
                Some(self.media_share_pct.get(&media).copied().unwrap_or(0.0))
            }
            EnumTileCategory::FunnelShare => {
                Some(self.funnel_share_pct.get(&c_label).copied().unwrap_or(0.0))
            }
        }
    }
}

/// Quarter budgets, media shares and funnel shares of `records`.
pub fn derive_expected_aggregates(records: &[&SpecCanonicalRecord]) -> SpecExpectedAggregates {
    let mut aggregates = SpecExpectedAggregates::default();
    let mut dict_media: BTreeMap<EnumMediaType, f64> = BTreeMap::new();
    let mut dict_funnel: BTreeMap<String, f64> = BTreeMap::new();

    for rec in records {
        for (n_idx_month, n_cost) in rec.costs_by_month.iter().enumerate() {
            aggregates.quarters[n_idx_month / 3] += n_cost;
        }
        let n_cost_rec = rec.cost_months_sum();
        aggregates.total += n_cost_rec;
        *dict_media.entry(EnumMediaType::from_raw(&rec.media_type)).or_default() += n_cost_rec;
        *dict_funnel
            .entry(rec.funnel_stage.trim().to_lowercase())
            .or_default() += n_cost_rec;
    }

    if aggregates.total.abs() > f64::EPSILON {
        let n_total = aggregates.total;
        aggregates.media_share_pct = dict_media
            .into_iter()
            .map(|(media, n_cost)| (media, n_cost / n_total * 100.0))
            .collect();
        aggregates.funnel_share_pct = dict_funnel
            .into_iter()
            .map(|(c_stage, n_cost)| (c_stage, n_cost / n_total * 100.0))
            .collect();
    }
    aggregates
}
