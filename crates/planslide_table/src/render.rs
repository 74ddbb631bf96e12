//! Chunk -> rendered table (text, fill, font) before merging.

use crate::conf::{C_FILL_GRAY, C_FILL_HEADER, C_FILL_WHITE, N_FONT_SIZE_BODY};
use crate::spec::{
    EnumRowKind, SpecRenderedCell, SpecRenderedRow, SpecRenderedTable, SpecSlideChunk,
    SpecTableRow,
};
use crate::util::derive_fill_class;

fn derive_row_style(kind: EnumRowKind) -> (&'static str, bool) {
    match kind {
        EnumRowKind::Header => (C_FILL_HEADER, true),
        kind if kind.is_total() => (C_FILL_GRAY, true),
        _ => (C_FILL_WHITE, false),
    }
}

/// Materialize logical rows; row kinds are carried over, not re-derived.
pub fn render_rows(rows: &[SpecTableRow]) -> SpecRenderedTable {
    let l_rows = rows
        .iter()
        .map(|row| {
            let (c_fill, if_bold) = derive_row_style(row.kind);
            SpecRenderedRow {
                kind: row.kind,
                fill_class: derive_fill_class(c_fill),
                cells: row
                    .cells
                    .iter()
                    .map(|cell| SpecRenderedCell {
                        text: cell.text.clone(),
                        fill: c_fill.to_string(),
                        bold: if_bold,
                        font_size: N_FONT_SIZE_BODY,
                    })
                    .collect(),
            }
        })
        .collect();
    SpecRenderedTable {
        rows: l_rows,
        merges: vec![],
    }
}

/// Render one slide chunk.
pub fn render_chunk(chunk: &SpecSlideChunk) -> SpecRenderedTable {
    render_rows(&chunk.rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TableModelBuilder;
    use crate::builder::tests::create_record;
    use crate::paginate::paginate_matrix;
    use crate::spec::EnumFillClass;

    #[test]
    fn test_render_chunk_styles_totals_gray_and_bold() {
        let matrix = TableModelBuilder::default()
            .build(
                &[create_record("Alpha", "Digital", &[(0, 2_000.0)])],
                "UK",
                "Acme",
                2024,
            )
            .expect("matrix");
        let l_chunks = paginate_matrix(&matrix, 32, true).expect("chunks");
        let table = render_chunk(&l_chunks[0]);

        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.rows[0].fill_class, EnumFillClass::Other);
        assert_eq!(table.rows[1].fill_class, EnumFillClass::White);
        assert!(!table.rows[1].cells[0].bold);
        assert_eq!(table.rows[2].kind, EnumRowKind::MonthlyTotal);
        assert_eq!(table.rows[2].fill_class, EnumFillClass::Gray);
        assert!(table.rows[3].cells[0].bold);
        assert_eq!(table.rows[3].text_at(0), "GRAND TOTAL");
        assert!(table.merges.is_empty());
    }
}
