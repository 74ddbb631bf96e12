//! `PaginationEngine`: splits a table matrix into slide-sized chunks.
//!
//! Campaign blocks stay whole when they fit an empty slide. Each chunk
//! starts with the header and, when another chunk follows, ends with a
//! closing total; continuation chunks open with a carried-forward row.

use tracing::{debug, warn};

use crate::builder::{SpecRunningSum, create_summary_row};
use crate::conf::{
    C_LABEL_CARRIED_FORWARD, C_LABEL_CONTINUED_SUFFIX, C_LABEL_GRAND_TOTAL, C_LABEL_SUBTOTAL,
    C_LABEL_TOTAL_PREFIX, N_COL_CAMPAIGN,
};
use crate::error::TableError;
use crate::spec::{EnumRowKind, SpecCell, SpecSlideChunk, SpecTableMatrix, SpecTableRow};

/// Rows of one chunk under construction.
struct ChunkCursor {
    rows: Vec<SpecTableRow>,
    /// Header plus optional carried-forward row.
    n_rows_fixed: usize,
    /// Campaign/media spend placed in this chunk.
    sums: SpecRunningSum,
}

impl ChunkCursor {
    fn open(header: &SpecTableRow, carried: Option<&SpecRunningSum>, n_total_grand: Option<f64>) -> Self {
        let mut l_rows = vec![header.clone()];
        if let Some(sums) = carried {
            l_rows.push(create_summary_row(
                EnumRowKind::CarriedForward,
                C_LABEL_CARRIED_FORWARD,
                sums,
                n_total_grand,
            ));
        }
        Self {
            n_rows_fixed: l_rows.len(),
            rows: l_rows,
            sums: SpecRunningSum::default(),
        }
    }

    /// `n_rows` more body rows still leave room for the closing row.
    fn fits(&self, n_rows: usize, n_rows_max: usize) -> bool {
        self.rows.len() + n_rows < n_rows_max
    }

    fn has_body(&self) -> bool {
        self.rows.len() > self.n_rows_fixed
    }

    fn push_rows(&mut self, rows: impl IntoIterator<Item = SpecTableRow>) {
        for row in rows {
            if row.kind == EnumRowKind::CampaignMedia {
                self.sums.add_row(&row);
            }
            self.rows.push(row);
        }
    }
}

/// Media row with its metric sub-rows; the block's MonthlyTotal row stays
/// with the last media group.
fn derive_block_units(rows: &[SpecTableRow]) -> Vec<&[SpecTableRow]> {
    let mut l_units = Vec::new();
    let mut n_idx_start = 0;
    for (n_idx_row, row) in rows.iter().enumerate().skip(1) {
        if row.kind == EnumRowKind::CampaignMedia {
            l_units.push(&rows[n_idx_start..n_idx_row]);
            n_idx_start = n_idx_row;
        }
    }
    if n_idx_start < rows.len() {
        l_units.push(&rows[n_idx_start..]);
    }
    l_units
}

/// Splits matrices into slide chunks.
#[derive(Debug, Clone)]
pub struct PaginationEngine {
    n_rows_per_slide_max: usize,
    if_carry_forward: bool,
}

impl PaginationEngine {
    pub fn new(n_rows_per_slide_max: usize, if_carry_forward: bool) -> Self {
        Self {
            n_rows_per_slide_max,
            if_carry_forward,
        }
    }

    /// Partition `matrix` into chunks of at most `n_rows_per_slide_max` rows.
    ///
    /// A matrix that fits returns one chunk equal to the input rows.
    /// A block larger than an empty continuation slide is split between
    /// media groups and its next segment is labelled `(CONT.)`.
    pub fn paginate(&self, matrix: &SpecTableMatrix) -> Result<Vec<SpecSlideChunk>, TableError> {
        let n_rows_max = self.n_rows_per_slide_max;
        if matrix.rows.len() <= n_rows_max {
            return Ok(vec![SpecSlideChunk {
                rows: matrix.rows.clone(),
                if_continuation: false,
                idx_chunk: 0,
                n_chunks: 1,
            }]);
        }

        let Some(header) = matrix.header() else {
            return Err(TableError::InvalidCapacity(
                "matrix has no header row".to_string(),
            ));
        };

        let n_rows_unit_max = matrix
            .blocks
            .iter()
            .flat_map(|block| derive_block_units(matrix.block_rows(block)))
            .map(<[SpecTableRow]>::len)
            .max()
            .unwrap_or(0);
        let n_rows_fixed = 1 + usize::from(self.if_carry_forward);
        if n_rows_fixed + n_rows_unit_max + 1 > n_rows_max {
            return Err(TableError::InvalidCapacity(format!(
                "{n_rows_max} rows cannot hold header, carried-forward, closing row and a {n_rows_unit_max}-row media group"
            )));
        }

        let n_total_grand = matrix.grand_total().map(SpecTableRow::total_value);
        let mut l_chunk_rows: Vec<Vec<SpecTableRow>> = Vec::new();
        let mut sums_cumulative = SpecRunningSum::default();
        let mut cursor = ChunkCursor::open(header, None, n_total_grand);

        for block in &matrix.blocks {
            let l_rows = matrix.block_rows(block);
            if !cursor.fits(l_rows.len(), n_rows_max) && cursor.has_body() {
                self.close_chunk(&mut cursor, &mut l_chunk_rows, &mut sums_cumulative, header, n_total_grand);
            }
            if cursor.fits(l_rows.len(), n_rows_max) {
                cursor.push_rows(l_rows.iter().cloned());
                continue;
            }

            warn!(
                campaign = %block.campaign_name,
                n_rows = l_rows.len(),
                n_rows_max,
                "campaign block exceeds slide capacity; splitting between media groups"
            );
            for l_unit in derive_block_units(l_rows) {
                if cursor.fits(l_unit.len(), n_rows_max) {
                    cursor.push_rows(l_unit.iter().cloned());
                    continue;
                }
                self.close_chunk(&mut cursor, &mut l_chunk_rows, &mut sums_cumulative, header, n_total_grand);
                let mut l_unit_rows = l_unit.to_vec();
                if let Some(row_first) = l_unit_rows.first_mut()
                    && row_first.kind == EnumRowKind::CampaignMedia
                {
                    row_first.cells[N_COL_CAMPAIGN] = SpecCell::text(format!(
                        "{} {C_LABEL_CONTINUED_SUFFIX}",
                        block.campaign_name
                    ));
                }
                cursor.push_rows(l_unit_rows);
            }
        }

        sums_cumulative.add(&cursor.sums);
        cursor.rows.push(create_summary_row(
            EnumRowKind::GrandTotal,
            C_LABEL_GRAND_TOTAL,
            &sums_cumulative,
            Some(sums_cumulative.total),
        ));
        l_chunk_rows.push(cursor.rows);

        let n_chunks = l_chunk_rows.len();
        debug!(
            market = %matrix.market,
            brand = %matrix.brand,
            year = matrix.year,
            n_rows = matrix.rows.len(),
            n_chunks,
            "matrix paginated"
        );
        Ok(l_chunk_rows
            .into_iter()
            .enumerate()
            .map(|(idx_chunk, rows)| SpecSlideChunk {
                rows,
                if_continuation: idx_chunk > 0,
                idx_chunk,
                n_chunks,
            })
            .collect())
    }

    /// Append the closing row, bank the chunk and open the next one.
    fn close_chunk(
        &self,
        cursor: &mut ChunkCursor,
        l_chunk_rows: &mut Vec<Vec<SpecTableRow>>,
        sums_cumulative: &mut SpecRunningSum,
        header: &SpecTableRow,
        n_total_grand: Option<f64>,
    ) {
        let n_slide = l_chunk_rows.len() + 1;
        let c_label = if n_slide == 1 {
            format!("{C_LABEL_TOTAL_PREFIX} SLIDE {n_slide}")
        } else {
            format!("{C_LABEL_SUBTOTAL} - SLIDE {n_slide}")
        };
        cursor.rows.push(create_summary_row(
            EnumRowKind::Subtotal,
            &c_label,
            &cursor.sums,
            n_total_grand,
        ));
        sums_cumulative.add(&cursor.sums);

        let carried = self.if_carry_forward.then_some(&*sums_cumulative);
        let cursor_done = std::mem::replace(cursor, ChunkCursor::open(header, carried, n_total_grand));
        l_chunk_rows.push(cursor_done.rows);
    }
}

/// Convenience wrapper around [`PaginationEngine::paginate`].
pub fn paginate_matrix(
    matrix: &SpecTableMatrix,
    n_rows_per_slide_max: usize,
    if_carry_forward: bool,
) -> Result<Vec<SpecSlideChunk>, TableError> {
    PaginationEngine::new(n_rows_per_slide_max, if_carry_forward).paginate(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TableModelBuilder;
    use crate::builder::tests::create_record;
    use crate::spec::SpecCanonicalRecord;
    use proptest::prelude::*;

    fn build(records: &[SpecCanonicalRecord]) -> SpecTableMatrix {
        TableModelBuilder::default()
            .build(records, "United Kingdom", "Acme", 2024)
            .expect("matrix")
    }

    /// `n_campaigns` campaigns with one digital row each (3-row blocks with header/total).
    fn build_digital_campaigns(n_campaigns: usize) -> SpecTableMatrix {
        let l_records: Vec<SpecCanonicalRecord> = (0..n_campaigns)
            .map(|n_idx| {
                create_record(
                    &format!("Campaign {n_idx:02}"),
                    "Digital",
                    &[(n_idx % 12, 1_000.0 * (n_idx + 1) as f64)],
                )
            })
            .collect();
        build(&l_records)
    }

    fn count_kind(chunk: &SpecSlideChunk, kind: EnumRowKind) -> usize {
        chunk.rows.iter().filter(|row| row.kind == kind).count()
    }

    fn assert_chunk_invariants(matrix: &SpecTableMatrix, l_chunks: &[SpecSlideChunk], n_rows_max: usize, if_cf: bool) {
        let mut n_cumulative = 0.0;
        for chunk in l_chunks {
            assert!(chunk.rows.len() <= n_rows_max);
            assert_eq!(chunk.rows[0].kind, EnumRowKind::Header);

            let n_body: f64 = chunk
                .rows
                .iter()
                .filter(|row| row.kind == EnumRowKind::CampaignMedia)
                .map(SpecTableRow::total_value)
                .sum();
            if let Some(row_cf) = chunk.rows.iter().find(|row| row.kind == EnumRowKind::CarriedForward) {
                assert!((row_cf.total_value() - n_cumulative).abs() < 1e-6);
            } else if chunk.idx_chunk > 0 {
                assert!(!if_cf);
            }
            let row_close = chunk.rows.last().expect("closing row");
            if chunk.idx_chunk + 1 < chunk.n_chunks {
                assert_eq!(row_close.kind, EnumRowKind::Subtotal);
                assert!((row_close.total_value() - n_body).abs() < 1e-6);
            } else {
                assert_eq!(row_close.kind, EnumRowKind::GrandTotal);
            }
            n_cumulative += n_body;
        }

        let n_monthly: f64 = matrix
            .rows
            .iter()
            .filter(|row| row.kind == EnumRowKind::MonthlyTotal)
            .map(SpecTableRow::total_value)
            .sum();
        let row_grand = l_chunks
            .last()
            .and_then(|chunk| chunk.rows.last())
            .expect("grand total");
        assert!((row_grand.total_value() - n_monthly).abs() < 1e-6);
        assert!((n_cumulative - n_monthly).abs() < 1e-6);
    }

    #[test]
    fn test_small_matrix_is_one_chunk_equal_to_input() {
        let matrix = build(&[create_record("Alpha", "Television", &[(0, 1_000.0)])]);
        let l_chunks = paginate_matrix(&matrix, 32, true).expect("chunks");

        assert_eq!(l_chunks.len(), 1);
        assert_eq!(l_chunks[0].rows, matrix.rows);
        assert!(!l_chunks[0].if_continuation);
        assert_eq!(l_chunks[0].derive_title_suffix(), "");
    }

    #[test]
    fn test_forty_campaigns_split_without_breaking_blocks() {
        let matrix = build_digital_campaigns(40);
        assert_eq!(matrix.rows.len(), 1 + 40 * 2 + 1);

        let l_chunks = paginate_matrix(&matrix, 32, true).expect("chunks");
        assert_eq!(l_chunks.len(), 3);
        assert_eq!(count_kind(&l_chunks[0], EnumRowKind::MonthlyTotal), 15);
        assert_eq!(count_kind(&l_chunks[1], EnumRowKind::MonthlyTotal), 14);
        assert_eq!(count_kind(&l_chunks[2], EnumRowKind::MonthlyTotal), 11);
        assert_eq!(l_chunks[0].rows.last().map(SpecTableRow::label), Some("TOTAL - SLIDE 1"));
        assert_eq!(l_chunks[1].rows[1].kind, EnumRowKind::CarriedForward);
        assert_eq!(l_chunks[1].rows.last().map(SpecTableRow::label), Some("SUBTOTAL - SLIDE 2"));
        assert_eq!(l_chunks[2].derive_title_suffix(), " (3 of 3)");

        for chunk in &l_chunks {
            for (n_idx_row, row) in chunk.rows.iter().enumerate() {
                if row.kind == EnumRowKind::CampaignMedia {
                    assert_eq!(chunk.rows[n_idx_row + 1].kind, EnumRowKind::MonthlyTotal);
                }
            }
        }
        assert_chunk_invariants(&matrix, &l_chunks, 32, true);
    }

    #[test]
    fn test_without_carry_forward_continuations_have_no_carried_row() {
        let matrix = build_digital_campaigns(40);
        let l_chunks = paginate_matrix(&matrix, 32, false).expect("chunks");

        assert!(l_chunks.len() >= 3);
        for chunk in &l_chunks {
            assert_eq!(count_kind(chunk, EnumRowKind::CarriedForward), 0);
        }
        assert_chunk_invariants(&matrix, &l_chunks, 32, false);
    }

    #[test]
    fn test_oversized_block_splits_between_media_groups() {
        let l_records: Vec<SpecCanonicalRecord> = [
            "Television",
            "Digital",
            "OOH",
            "Radio",
            "Cinema",
            "Print",
            "Sponsorship",
        ]
        .iter()
        .map(|media| create_record("Mega", media, &[(0, 10_000.0)]))
        .collect();
        let matrix = build(&l_records);
        assert_eq!(matrix.blocks[0].n_rows(), 11);

        let l_chunks = paginate_matrix(&matrix, 8, true).expect("chunks");
        assert_eq!(l_chunks.len(), 2);
        assert_eq!(l_chunks[0].rows.len(), 8);
        assert_eq!(l_chunks[1].rows[2].label(), "Mega (CONT.)");
        assert_eq!(l_chunks[1].rows[2].cells[1].text, "Radio");
        // metric sub-rows stay with their television row
        assert_eq!(l_chunks[0].rows[1].cells[1].text, "Television");
        assert_eq!(count_kind(&l_chunks[0], EnumRowKind::MetricSub), 3);
        assert_eq!(count_kind(&l_chunks[1], EnumRowKind::MonthlyTotal), 1);
        assert_chunk_invariants(&matrix, &l_chunks, 8, true);
    }

    #[test]
    fn test_monthly_total_travels_with_last_media_group() {
        let l_records: Vec<SpecCanonicalRecord> =
            ["Digital", "OOH", "Radio", "Cinema", "Print", "Sponsorship"]
                .iter()
                .map(|media| create_record("Mega", media, &[(0, 10_000.0)]))
                .collect();
        let matrix = build(&l_records);
        assert_eq!(matrix.blocks[0].n_rows(), 7);

        let l_chunks = paginate_matrix(&matrix, 8, true).expect("chunks");
        assert_eq!(l_chunks.len(), 2);
        assert_eq!(count_kind(&l_chunks[0], EnumRowKind::MonthlyTotal), 0);

        let l_kinds: Vec<EnumRowKind> = l_chunks[1].rows.iter().map(|row| row.kind).collect();
        assert_eq!(
            l_kinds,
            vec![
                EnumRowKind::Header,
                EnumRowKind::CarriedForward,
                EnumRowKind::CampaignMedia,
                EnumRowKind::MonthlyTotal,
                EnumRowKind::GrandTotal,
            ]
        );
        assert_eq!(l_chunks[1].rows[2].label(), "Mega (CONT.)");
        assert!(l_chunks[1].rows[3].label().starts_with("MONTHLY TOTAL"));
        for chunk in &l_chunks {
            for row in chunk.rows.iter().filter(|row| row.label().ends_with("(CONT.)")) {
                assert_eq!(row.kind, EnumRowKind::CampaignMedia);
            }
        }
        assert_chunk_invariants(&matrix, &l_chunks, 8, true);
    }

    #[test]
    fn test_capacity_below_smallest_unit_is_rejected() {
        let matrix = build(&[
            create_record("Alpha", "Television", &[(0, 1_000.0)]),
            create_record("Beta", "Digital", &[(0, 1_000.0)]),
        ]);
        let err = paginate_matrix(&matrix, 5, true).expect_err("must fail");
        assert!(matches!(err, TableError::InvalidCapacity(_)));
    }

    proptest! {
        #[test]
        fn prop_chunks_preserve_totals(
            l_costs in proptest::collection::vec((0usize..12, 1.0f64..1_000_000.0, any::<bool>()), 1..60),
            n_rows_max in 8usize..40,
            if_cf in any::<bool>(),
        ) {
            let l_records: Vec<SpecCanonicalRecord> = l_costs
                .iter()
                .enumerate()
                .map(|(n_idx, (n_month, n_cost, if_tv))| {
                    let c_media = if *if_tv { "Television" } else { "Radio" };
                    create_record(&format!("C{n_idx:03}"), c_media, &[(*n_month, *n_cost)])
                })
                .collect();
            let matrix = build(&l_records);
            let l_chunks = paginate_matrix(&matrix, n_rows_max, if_cf).expect("chunks");
            assert_chunk_invariants(&matrix, &l_chunks, n_rows_max, if_cf);
        }
    }
}
