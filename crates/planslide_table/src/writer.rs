//! Workbook export of a rendered deck: one worksheet per slide.

use std::collections::BTreeSet;
use std::path::PathBuf;

use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, Worksheet, XlsxError};
use tracing::debug;

use crate::conf::{C_FILL_WHITE, N_FONT_SIZE_BODY, N_FONT_SIZE_TITLE};
use crate::error::TableError;
use crate::spec::{
    EnumRowKind, SpecCellFormat, SpecRenderedCell, SpecRenderedDeck, SpecRenderedSlide,
    SpecRenderedTable,
};
use crate::util::{N_LEN_EXCEL_SHEET_NAME_MAX, sanitize_sheet_name};

/// First worksheet row of the slide table (row 0 holds the title).
const N_ROW_TABLE_FIRST: usize = 2;
const N_WIDTH_LABEL_COL: f64 = 24.0;

/// Per-sheet write summary.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecSheetReport {
    pub sheet_name: String,
    pub idx_slide: usize,
    pub n_rows_table: usize,
    pub n_merges: usize,
    pub n_tiles: usize,
}

/// Stateful deck workbook writer.
///
/// The workbook is buffered in memory until [`Self::close`] is called.
pub struct DeckWorkbookWriter {
    path_file_out: PathBuf,
    workbook: Workbook,
    fmt_title: SpecCellFormat,
    fmt_tile: SpecCellFormat,
    set_sheet_names_existing: BTreeSet<String>,
    l_reports: Vec<SpecSheetReport>,
    if_closed: bool,
}

impl DeckWorkbookWriter {
    pub fn new(path_file_out: PathBuf) -> Self {
        Self {
            path_file_out,
            workbook: Workbook::new(),
            fmt_title: SpecCellFormat {
                font_size: Some(N_FONT_SIZE_TITLE),
                bold: Some(true),
                ..Default::default()
            },
            fmt_tile: derive_base_cell_format().merge(&SpecCellFormat {
                text_wrap: Some(false),
                ..Default::default()
            }),
            set_sheet_names_existing: BTreeSet::new(),
            l_reports: Vec::new(),
            if_closed: false,
        }
    }

    /// Return output file path as string.
    pub fn file_out(&self) -> String {
        self.path_file_out.to_string_lossy().to_string()
    }

    /// Return snapshot of per-sheet reports.
    pub fn report(&self) -> Vec<SpecSheetReport> {
        self.l_reports.clone()
    }

    /// Flush workbook to disk. Idempotent.
    pub fn close(&mut self) -> Result<(), TableError> {
        if self.if_closed {
            return Ok(());
        }
        self.workbook
            .save(&self.path_file_out)
            .map_err(derive_xlsx_error)?;
        self.if_closed = true;
        debug!(path = %self.path_file_out.display(), n_sheets = self.l_reports.len(), "workbook saved");
        Ok(())
    }

    /// Write every slide of `deck`.
    pub fn write_deck(&mut self, deck: &SpecRenderedDeck) -> Result<(), TableError> {
        for slide in &deck.slides {
            self.write_slide(slide)?;
        }
        Ok(())
    }

    /// Write one slide as a worksheet: title, merged table, tile column.
    pub fn write_slide(&mut self, slide: &SpecRenderedSlide) -> Result<(), TableError> {
        if self.if_closed {
            return Err(TableError::Workbook("Cannot write after close().".to_string()));
        }
        let sheet_name = self.derive_unique_sheet_name(&sanitize_sheet_name(&slide.title, "_"));
        let fmt_title = derive_rust_xlsx_format(&self.fmt_title);
        let fmt_tile = derive_rust_xlsx_format(&self.fmt_tile);

        let worksheet = self.workbook.add_worksheet();
        worksheet.set_name(&sheet_name).map_err(derive_xlsx_error)?;
        worksheet
            .write_string_with_format(0, 0, &slide.title, &fmt_title)
            .map_err(derive_xlsx_error)?;

        let mut report = SpecSheetReport {
            sheet_name,
            idx_slide: slide.idx_slide,
            n_tiles: slide.tiles.len(),
            ..Default::default()
        };

        let mut n_col_tiles = 0;
        if let Some(table) = &slide.table {
            write_table(worksheet, table)?;
            worksheet
                .set_column_width(0, N_WIDTH_LABEL_COL)
                .map_err(derive_xlsx_error)?;
            report.n_rows_table = table.rows.len();
            report.n_merges = table.merges.len();
            n_col_tiles = table.n_cols() + 1;
        }

        for (n_idx_tile, (c_shape, c_text)) in slide.tiles.iter().enumerate() {
            let n_row = cast_row_num(N_ROW_TABLE_FIRST + n_idx_tile)?;
            worksheet
                .write_string_with_format(n_row, cast_col_num(n_col_tiles)?, c_shape, &fmt_tile)
                .map_err(derive_xlsx_error)?;
            worksheet
                .write_string_with_format(n_row, cast_col_num(n_col_tiles + 1)?, c_text, &fmt_tile)
                .map_err(derive_xlsx_error)?;
        }

        self.l_reports.push(report);
        Ok(())
    }

    /// Sheet names compare case-insensitively, as in Excel.
    fn derive_unique_sheet_name(&mut self, name: &str) -> String {
        if self.set_sheet_names_existing.insert(name.to_lowercase()) {
            return name.to_string();
        }

        let base_name: String = name
            .chars()
            .take(usize::max(1, N_LEN_EXCEL_SHEET_NAME_MAX - 4))
            .collect();

        let mut n_idx = 2usize;
        loop {
            let candidate: String = format!("{base_name}__{n_idx}")
                .chars()
                .take(N_LEN_EXCEL_SHEET_NAME_MAX)
                .collect();
            if self.set_sheet_names_existing.insert(candidate.to_lowercase()) {
                return candidate;
            }
            n_idx += 1;
        }
    }
}

fn derive_base_cell_format() -> SpecCellFormat {
    SpecCellFormat {
        font_size: Some(N_FONT_SIZE_BODY),
        valign: Some("vcenter".to_string()),
        border: Some(1),
        text_wrap: Some(true),
        ..Default::default()
    }
}

/// Base table format overlaid with the rendered cell's font and fill.
fn derive_cell_format(cell: &SpecRenderedCell, kind: EnumRowKind) -> SpecCellFormat {
    derive_base_cell_format().merge(&SpecCellFormat {
        font_size: Some(cell.font_size),
        bold: Some(cell.bold),
        font_color: (kind == EnumRowKind::Header).then(|| C_FILL_WHITE.to_string()),
        bg_color: Some(cell.fill.clone()),
        ..Default::default()
    })
}

fn write_table(worksheet: &mut Worksheet, table: &SpecRenderedTable) -> Result<(), TableError> {
    for (n_idx_row, row) in table.rows.iter().enumerate() {
        for (n_idx_col, cell) in row.cells.iter().enumerate() {
            let n_row = cast_row_num(N_ROW_TABLE_FIRST + n_idx_row)?;
            let n_col = cast_col_num(n_idx_col)?;
            let format = derive_rust_xlsx_format(&derive_cell_format(cell, row.kind));

            match table.merge_at(n_idx_row, n_idx_col) {
                Some(span) if span.row_start == n_idx_row && span.col_start == n_idx_col => {
                    worksheet
                        .merge_range(
                            n_row,
                            n_col,
                            cast_row_num(N_ROW_TABLE_FIRST + span.row_end)?,
                            cast_col_num(span.col_end)?,
                            &cell.text,
                            &format,
                        )
                        .map_err(derive_xlsx_error)?;
                }
                // covered by a merge anchored elsewhere
                Some(_) => {}
                None if cell.text.is_empty() => {
                    worksheet
                        .write_blank(n_row, n_col, &format)
                        .map_err(derive_xlsx_error)?;
                }
                None => {
                    worksheet
                        .write_string_with_format(n_row, n_col, &cell.text, &format)
                        .map_err(derive_xlsx_error)?;
                }
            }
        }
    }
    Ok(())
}

fn derive_rust_xlsx_format(spec: &SpecCellFormat) -> Format {
    let mut format = Format::new();

    if let Some(val) = &spec.font_name {
        format = format.set_font_name(val.clone());
    }
    if let Some(val) = spec.font_size {
        format = format.set_font_size(val as f64);
    }
    if spec.bold.unwrap_or(false) {
        format = format.set_bold();
    }
    if let Some(val) = &spec.align
        && let Some(align) = derive_format_align(val)
    {
        format = format.set_align(align);
    }
    if let Some(val) = &spec.valign
        && let Some(align) = derive_format_align(val)
    {
        format = format.set_align(align);
    }
    if let Some(val) = &spec.bg_color {
        format = format.set_background_color(val.as_str());
    }
    if let Some(val) = &spec.font_color {
        format = format.set_font_color(val.as_str());
    }
    if let Some(val) = spec.border {
        format = format.set_border(derive_format_border(val));
    }
    if spec.text_wrap.unwrap_or(false) {
        format = format.set_text_wrap();
    }

    format
}

fn derive_format_border(border: i64) -> FormatBorder {
    match border {
        1 => FormatBorder::Thin,
        2 => FormatBorder::Medium,
        5 => FormatBorder::Thick,
        _ => FormatBorder::None,
    }
}

fn derive_format_align(align: &str) -> Option<FormatAlign> {
    match align.trim().to_ascii_lowercase().as_str() {
        "left" => Some(FormatAlign::Left),
        "center" => Some(FormatAlign::Center),
        "right" => Some(FormatAlign::Right),
        "top" => Some(FormatAlign::Top),
        "bottom" => Some(FormatAlign::Bottom),
        "vcenter" | "vertical_center" => Some(FormatAlign::VerticalCenter),
        _ => None,
    }
}

fn cast_row_num(value: usize) -> Result<u32, TableError> {
    u32::try_from(value).map_err(|_| TableError::Workbook(format!("row index overflow: {value}")))
}

fn cast_col_num(value: usize) -> Result<u16, TableError> {
    u16::try_from(value).map_err(|_| TableError::Workbook(format!("column index overflow: {value}")))
}

fn derive_xlsx_error(err: XlsxError) -> TableError {
    TableError::Workbook(format!("xlsx write error: {err}"))
}
