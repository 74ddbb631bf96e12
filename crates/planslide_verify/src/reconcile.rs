//! `ReconciliationEngine`: rendered tiles vs. aggregates recomputed from records.

use std::collections::BTreeSet;
use std::path::Path;

use planslide_table::{
    SpecCanonicalRecord, SpecDeckConfig, SpecRecordCache, SpecRenderedSlide, SpecTileConfig,
    format_tile_text, select_records_for_key,
};
use tracing::{debug, info, warn};

use crate::report::{ReportReconciliation, ReportReconciliationBuilder, write_reconciliation_csv};
use crate::spec::{
    SpecReconciliationRecord, SpecSlideReconciliation, SpecTolerancePolicy, SpecVerifyConfig,
    VerifyError,
};
use crate::util::{SpecExpectedAggregates, derive_expected_aggregates, parse_slide_title, parse_tile_number};

const C_NOTE_DATA_MISSING: &str = "expected data missing";
const C_NOTE_TILE_MISSING: &str = "tile missing on slide";
const C_NOTE_NOT_PARSEABLE: &str = "tile value not parseable";
const C_NOTE_OUT_OF_TOLERANCE: &str = "outside tolerance";
const C_NOTE_LABEL_UNKNOWN: &str = "tile label not understood";

/// Identity of the slide under comparison.
struct SlideKey<'a> {
    idx_slide: usize,
    market: &'a str,
    brand: &'a str,
    year: Option<i32>,
}

/// Compares rendered tile texts with expected aggregates.
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    tiles: Vec<SpecTileConfig>,
    tolerance: SpecTolerancePolicy,
    currency_symbol: String,
}

impl ReconciliationEngine {
    pub fn new(
        tiles: Vec<SpecTileConfig>,
        tolerance: SpecTolerancePolicy,
        currency_symbol: impl Into<String>,
    ) -> Self {
        Self {
            tiles,
            tolerance,
            currency_symbol: currency_symbol.into(),
        }
    }

    /// Engine using the deck's tile contract and the verify tolerance.
    pub fn from_configs(deck: &SpecDeckConfig, verify: &SpecVerifyConfig) -> Self {
        Self::new(
            deck.tiles.clone(),
            verify.tolerance.clone(),
            deck.currency_symbol.clone(),
        )
    }

    /// Reconcile every slide carrying tiles; section slides are skipped.
    pub fn reconcile(
        &self,
        slides: &[SpecRenderedSlide],
        records: &[SpecCanonicalRecord],
    ) -> Vec<SpecSlideReconciliation> {
        slides
            .iter()
            .filter_map(|slide| self.reconcile_slide(slide, records))
            .collect()
    }

    /// Reconcile one slide; `None` when it has no tiles.
    pub fn reconcile_slide(
        &self,
        slide: &SpecRenderedSlide,
        records: &[SpecCanonicalRecord],
    ) -> Option<SpecSlideReconciliation> {
        if slide.tiles.is_empty() {
            debug!(idx_slide = slide.idx_slide, title = %slide.title, "slide without tiles skipped");
            return None;
        }
        let (c_market, c_brand) = parse_slide_title(&slide.title).unwrap_or_else(|| {
            warn!(idx_slide = slide.idx_slide, title = %slide.title, "slide title has no market/brand separator");
            (slide.title.trim().to_string(), String::new())
        });

        let l_years: BTreeSet<i32> = select_records_for_key(records, &c_market, &c_brand, None)
            .iter()
            .map(|rec| rec.year)
            .collect();

        let mut best: Option<(usize, f64, i32, Vec<SpecReconciliationRecord>)> = None;
        for n_year in l_years {
            let l_selected = select_records_for_key(records, &c_market, &c_brand, Some(n_year));
            let aggregates = derive_expected_aggregates(&l_selected);
            let key = SlideKey {
                idx_slide: slide.idx_slide,
                market: &c_market,
                brand: &c_brand,
                year: Some(n_year),
            };
            let l_records = self.compare_tiles(slide, &key, Some(&aggregates));
            let n_passed = l_records.iter().filter(|rec| rec.if_passed).count();
            let n_deviation: f64 = l_records
                .iter()
                .filter_map(|rec| rec.difference)
                .map(f64::abs)
                .sum();

            // ascending years: only a strictly better score replaces the best
            let if_better = match &best {
                None => true,
                Some((n_passed_best, n_deviation_best, _, _)) => {
                    n_passed > *n_passed_best
                        || (n_passed == *n_passed_best && n_deviation < *n_deviation_best)
                }
            };
            if if_better {
                best = Some((n_passed, n_deviation, n_year, l_records));
            }
        }

        let result = match best {
            Some((n_passed, _, n_year, l_records)) => {
                info!(
                    idx_slide = slide.idx_slide,
                    market = %c_market,
                    brand = %c_brand,
                    year = n_year,
                    n_passed,
                    n_compared = l_records.len(),
                    "slide reconciled"
                );
                SpecSlideReconciliation {
                    idx_slide: slide.idx_slide,
                    title: slide.title.clone(),
                    market: c_market,
                    brand: c_brand,
                    year: Some(n_year),
                    records: l_records,
                }
            }
            None => {
                warn!(
                    idx_slide = slide.idx_slide,
                    market = %c_market,
                    brand = %c_brand,
                    "no records for slide; all comparisons failed"
                );
                let key = SlideKey {
                    idx_slide: slide.idx_slide,
                    market: &c_market,
                    brand: &c_brand,
                    year: None,
                };
                let l_records = self.compare_tiles(slide, &key, None);
                SpecSlideReconciliation {
                    idx_slide: slide.idx_slide,
                    title: slide.title.clone(),
                    market: c_market,
                    brand: c_brand,
                    year: None,
                    records: l_records,
                }
            }
        };
        Some(result)
    }

    fn compare_tiles(
        &self,
        slide: &SpecRenderedSlide,
        key: &SlideKey<'_>,
        aggregates: Option<&SpecExpectedAggregates>,
    ) -> Vec<SpecReconciliationRecord> {
        self.tiles
            .iter()
            .map(|tile| {
                let c_actual = slide.tiles.get(&tile.shape_name).map(String::as_str);
                self.compare_tile(tile, key, c_actual, aggregates)
            })
            .collect()
    }

    /// Byte-identical displays pass; otherwise the numeric deviation must be within tolerance.
    fn compare_tile(
        &self,
        tile: &SpecTileConfig,
        key: &SlideKey<'_>,
        actual_display: Option<&str>,
        aggregates: Option<&SpecExpectedAggregates>,
    ) -> SpecReconciliationRecord {
        let c_actual = actual_display.unwrap_or_default();
        let n_actual = actual_display.and_then(|text| parse_tile_number(text, tile.scale));
        let mut rec = SpecReconciliationRecord {
            idx_slide: key.idx_slide,
            market: key.market.to_string(),
            brand: key.brand.to_string(),
            year: key.year,
            category: tile.category.as_str().to_string(),
            label: tile.label.clone(),
            expected_display: String::new(),
            actual_display: c_actual.to_string(),
            expected_value: None,
            actual_value: n_actual,
            difference: None,
            tolerance: 0.0,
            if_passed: false,
            notes: String::new(),
        };

        let Some(aggregates) = aggregates else {
            rec.notes = C_NOTE_DATA_MISSING.to_string();
            return rec;
        };
        let Some(n_expected) = aggregates.value_for(tile) else {
            rec.notes = C_NOTE_LABEL_UNKNOWN.to_string();
            return rec;
        };
        rec.expected_value = Some(n_expected);
        rec.expected_display = format_tile_text(
            tile.category,
            &tile.label,
            n_expected,
            tile.scale,
            &self.currency_symbol,
        );
        rec.tolerance = self.tolerance.tolerance_for(tile.category, n_expected);
        rec.difference = n_actual.map(|val| val - n_expected);

        if actual_display.is_none() {
            rec.notes = C_NOTE_TILE_MISSING.to_string();
        } else if rec.expected_display == c_actual {
            rec.if_passed = true;
        } else {
            match rec.difference {
                None => rec.notes = C_NOTE_NOT_PARSEABLE.to_string(),
                Some(n_diff) if n_diff.abs() <= rec.tolerance => rec.if_passed = true,
                Some(_) => rec.notes = C_NOTE_OUT_OF_TOLERANCE.to_string(),
            }
        }
        rec
    }
}

/// Load records through `cache`, reconcile `slides` and write the CSV report.
///
/// Load and report-write failures are escalated, never turned into an empty report.
pub fn verify_deck(
    engine: &ReconciliationEngine,
    slides: &[SpecRenderedSlide],
    path_records: &Path,
    path_report: &Path,
    cache: &mut SpecRecordCache,
) -> Result<ReportReconciliation, VerifyError> {
    let records = cache.get_or_load(path_records)?;
    let l_results = engine.reconcile(slides, &records);
    write_reconciliation_csv(path_report, &l_results)?;

    let mut builder = ReportReconciliationBuilder::default();
    for result in &l_results {
        builder.add_slide(result);
    }
    builder.add_skipped(slides.len() - l_results.len());
    let report = builder.build();
    info!("{report}");
    Ok(report)
}
