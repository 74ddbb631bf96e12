//! Deck assembly: records -> section slides + paginated, merged table slides with tiles.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::builder::TableModelBuilder;
use crate::conf::{N_EPS_COST, SpecDeckConfig};
use crate::error::TableError;
use crate::merge::merge_rendered_table;
use crate::paginate::PaginationEngine;
use crate::render::render_chunk;
use crate::spec::{
    EnumRowKind, EnumTileCategory, SpecCanonicalRecord, SpecRenderedDeck, SpecRenderedSlide,
    SpecTableMatrix, SpecTileConfig,
};
use crate::util::{
    derive_report_keys, format_tile_text, normalize_market, select_records_for_key,
};

/// Quarter number (`Q1`..`Q4`) named by a tile label.
fn parse_quarter_label(label: &str) -> Option<usize> {
    let c_label = label.trim().to_ascii_uppercase();
    let n_quarter: usize = c_label.strip_prefix('Q')?.parse().ok()?;
    (1..=4).contains(&n_quarter).then_some(n_quarter)
}

fn derive_share_pct(n_part: f64, n_whole: f64) -> f64 {
    if n_whole.abs() <= N_EPS_COST {
        0.0
    } else {
        n_part / n_whole * 100.0
    }
}

/// Tile value of `tile` for one table, before display scaling.
fn derive_tile_value(
    tile: &SpecTileConfig,
    matrix: &SpecTableMatrix,
    records: &[&SpecCanonicalRecord],
) -> Option<f64> {
    let row_grand = matrix.grand_total()?;
    let n_total = row_grand.total_value();
    match tile.category {
        EnumTileCategory::QuarterBudget => {
            let n_quarter = parse_quarter_label(&tile.label)?;
            let l_months = row_grand.month_values();
            Some(l_months[(n_quarter - 1) * 3..n_quarter * 3].iter().sum())
        }
        EnumTileCategory::MediaShare => {
            let c_label = tile.label.trim().to_lowercase();
            let n_media: f64 = matrix
                .rows
                .iter()
                .filter(|row| row.kind == EnumRowKind::CampaignMedia)
                .filter(|row| {
                    row.cells
                        .iter()
                        .find_map(|cell| cell.meta.as_ref().and_then(|meta| meta.media_type))
                        .is_some_and(|media| media.label().to_lowercase() == c_label)
                })
                .map(|row| row.total_value())
                .fold(0.0, |n_acc, n_val| n_acc + n_val);
            Some(derive_share_pct(n_media, n_total))
        }
        EnumTileCategory::FunnelShare => {
            let c_label = tile.label.trim().to_lowercase();
            let n_stage: f64 = records
                .iter()
                .filter(|rec| rec.funnel_stage.trim().to_lowercase() == c_label)
                .map(|rec| rec.cost_months_sum())
                .fold(0.0, |n_acc, n_val| n_acc + n_val);
            Some(derive_share_pct(n_stage, n_total))
        }
    }
}

/// Shape name -> tile text for one table.
pub fn derive_tile_texts(
    tiles: &[SpecTileConfig],
    matrix: &SpecTableMatrix,
    records: &[&SpecCanonicalRecord],
    currency_symbol: &str,
) -> BTreeMap<String, String> {
    let mut dict_tiles = BTreeMap::new();
    for tile in tiles {
        match derive_tile_value(tile, matrix, records) {
            Some(value) => {
                dict_tiles.insert(
                    tile.shape_name.clone(),
                    format_tile_text(tile.category, &tile.label, value, tile.scale, currency_symbol),
                );
            }
            None => {
                warn!(shape = %tile.shape_name, label = %tile.label, "tile label not understood; tile left empty");
            }
        }
    }
    dict_tiles
}

/// Builds a rendered deck from canonical records.
#[derive(Debug, Clone)]
pub struct DeckAssembler {
    builder: TableModelBuilder,
    engine: PaginationEngine,
    tiles: Vec<SpecTileConfig>,
    currency_symbol: String,
}

impl DeckAssembler {
    pub fn new(config: &SpecDeckConfig) -> Self {
        Self {
            builder: TableModelBuilder::new(config.currency_symbol.clone()),
            engine: PaginationEngine::new(config.n_rows_per_slide_max, config.if_carry_forward),
            tiles: config.tiles.clone(),
            currency_symbol: config.currency_symbol.clone(),
        }
    }

    /// One section slide per market, then one slide per chunk of each
    /// `(market, brand, year)` table.
    ///
    /// Keys without data or with zero budget are skipped; other errors abort.
    pub fn assemble(&self, records: &[SpecCanonicalRecord]) -> Result<SpecRenderedDeck, TableError> {
        let mut deck = SpecRenderedDeck::default();
        let mut c_market_prev: Option<String> = None;
        let mut cnt_skipped = 0usize;

        for (c_market, c_brand, n_year) in derive_report_keys(records) {
            let c_market_key = normalize_market(&c_market);
            if c_market_prev.as_deref() != Some(c_market_key.as_str()) {
                deck.slides.push(SpecRenderedSlide {
                    idx_slide: deck.slides.len(),
                    title: c_market.clone(),
                    ..Default::default()
                });
                c_market_prev = Some(c_market_key);
            }

            match self.push_table_slides(&mut deck, records, &c_market, &c_brand, n_year) {
                Ok(()) => {}
                Err(err @ TableError::NotFound { .. }) => {
                    info!(reason = %err, "slide skipped");
                    cnt_skipped += 1;
                }
                Err(err @ TableError::ZeroBudget { .. }) => {
                    warn!(reason = %err, "slide skipped");
                    cnt_skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }

        info!(n_slides = deck.slides.len(), cnt_skipped, "deck assembled");
        Ok(deck)
    }

    fn push_table_slides(
        &self,
        deck: &mut SpecRenderedDeck,
        records: &[SpecCanonicalRecord],
        market: &str,
        brand: &str,
        year: i32,
    ) -> Result<(), TableError> {
        let matrix = self.builder.build(records, market, brand, year)?;
        let l_chunks = self.engine.paginate(&matrix)?;
        let l_selected = select_records_for_key(records, market, brand, Some(year));
        let dict_tiles = derive_tile_texts(&self.tiles, &matrix, &l_selected, &self.currency_symbol);

        for chunk in &l_chunks {
            let mut table = render_chunk(chunk);
            let report = merge_rendered_table(&mut table);
            if !report.warnings.is_empty() {
                warn!(
                    market,
                    brand,
                    year,
                    idx_chunk = chunk.idx_chunk,
                    n_warnings = report.warnings.len(),
                    "merge warnings on slide"
                );
            }
            deck.slides.push(SpecRenderedSlide {
                idx_slide: deck.slides.len(),
                title: format!("{market} - {brand}{}", chunk.derive_title_suffix()),
                table: Some(table),
                tiles: dict_tiles.clone(),
            });
        }
        debug!(
            market,
            brand,
            year,
            n_chunks = l_chunks.len(),
            "table slides added"
        );
        Ok(())
    }
}

/// Assemble the deck for `records` under `config`.
pub fn build_report_deck(
    records: &[SpecCanonicalRecord],
    config: &SpecDeckConfig,
) -> Result<SpecRenderedDeck, TableError> {
    DeckAssembler::new(config).assemble(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::tests::create_record;

    fn create_records() -> Vec<SpecCanonicalRecord> {
        let mut rec_tv = create_record("Spring", "Television", &[(0, 200_000.0), (4, 100_000.0)]);
        rec_tv.funnel_stage = "Awareness".to_string();
        let mut rec_digital = create_record("Spring", "Digital", &[(1, 100_000.0)]);
        rec_digital.funnel_stage = "Conversion".to_string();
        let mut rec_fr = create_record("Summer", "Radio", &[(6, 50_000.0)]);
        rec_fr.market = "FRA".to_string();
        vec![rec_tv, rec_digital, rec_fr]
    }

    #[test]
    fn test_deck_has_section_and_table_slides_with_tiles() {
        let deck = build_report_deck(&create_records(), &SpecDeckConfig::default()).expect("deck");

        let l_titles: Vec<&str> = deck.slides.iter().map(|slide| slide.title.as_str()).collect();
        assert_eq!(
            l_titles,
            vec!["FRA", "FRA - Acme", "United Kingdom", "United Kingdom - Acme"]
        );
        assert!(deck.slides[0].table.is_none());
        assert!(deck.slides[0].tiles.is_empty());

        let slide = &deck.slides[3];
        assert_eq!(slide.idx_slide, 3);
        assert_eq!(slide.tiles["TILE_Q1_BUDGET"], "Q1: £300K");
        assert_eq!(slide.tiles["TILE_Q2_BUDGET"], "Q2: £100K");
        assert_eq!(slide.tiles["TILE_SHARE_TELEVISION"], "Television: 75.0%");
        assert_eq!(slide.tiles["TILE_SHARE_RADIO"], "Radio: 0.0%");
        assert_eq!(slide.tiles["TILE_FUNNEL_CONVERSION"], "Conversion: 25.0%");
        assert_eq!(slide.tiles["TILE_FUNNEL_CONSIDERATION"], "Consideration: 0.0%");
        assert!(slide.tiles.values().all(|c_text| !c_text.contains("-0.0")));
        let table = slide.table.as_ref().expect("table");
        assert!(!table.merges.is_empty());
    }

    #[test]
    fn test_paginated_tables_get_numbered_titles() {
        let l_records: Vec<SpecCanonicalRecord> = (0..40)
            .map(|n_idx| create_record(&format!("C{n_idx:02}"), "Digital", &[(0, 1_000.0)]))
            .collect();
        let deck = build_report_deck(&l_records, &SpecDeckConfig::default()).expect("deck");

        assert_eq!(deck.slides.len(), 4);
        assert_eq!(deck.slides[1].title, "United Kingdom - Acme (1 of 3)");
        assert_eq!(deck.slides[3].title, "United Kingdom - Acme (3 of 3)");
        assert_eq!(deck.slides[1].tiles, deck.slides[3].tiles);
    }

    #[test]
    fn test_zero_budget_keys_are_skipped() {
        let mut l_records = create_records();
        l_records.push(SpecCanonicalRecord {
            brand: "Ghost".to_string(),
            ..create_record("Nothing", "Radio", &[])
        });
        let deck = build_report_deck(&l_records, &SpecDeckConfig::default()).expect("deck");
        assert!(deck.slides.iter().all(|slide| !slide.title.contains("Ghost")));
    }

    #[test]
    fn test_invalid_capacity_aborts_the_deck() {
        let l_records: Vec<SpecCanonicalRecord> = (0..10)
            .map(|n_idx| create_record(&format!("C{n_idx}"), "Television", &[(0, 1_000.0)]))
            .collect();
        let config = SpecDeckConfig {
            n_rows_per_slide_max: 6,
            ..SpecDeckConfig::default()
        };
        let err = build_report_deck(&l_records, &config).expect_err("must fail");
        assert!(matches!(err, TableError::InvalidCapacity(_)));
    }
}
