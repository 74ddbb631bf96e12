//! `planslide_table` v1:
//! Report-table assembly kernel for campaign x media x month slides.
//!
//! Architecture:
//! - `conf`     : constants, default presets and TOML deck config
//! - `spec`     : records/rows/chunks/spans/rendered-table models
//! - `error`    : crate error type
//! - `util`     : pure helpers (label normalization, row classification, formatting)
//! - `record`   : canonical record loading and the per-run record cache
//! - `builder`  : `TableModelBuilder` (records -> `SpecTableMatrix`)
//! - `paginate` : `PaginationEngine` (matrix -> slide chunks)
//! - `render`   : slide chunk -> rendered table
//! - `merge`    : merge state machine (rendered table -> merge spans)
//! - `deck`     : end-to-end deck assembly
//! - `writer`   : workbook export of a rendered deck
pub mod builder;
pub mod conf;
pub mod deck;
pub mod error;
pub mod merge;
pub mod paginate;
pub mod record;
pub mod render;
pub mod spec;
pub mod util;
pub mod writer;

pub use builder::TableModelBuilder;
pub use conf::{N_COLS_TABLE, SpecDeckConfig, derive_deck_config_from_toml};
pub use deck::{DeckAssembler, build_report_deck};
pub use error::TableError;
pub use merge::{apply_merges, compute_merges};
pub use paginate::{PaginationEngine, paginate_matrix};
pub use record::{SpecRecordCache, derive_records_from_dataframe, load_records};
pub use render::render_chunk;
pub use spec::{
    EnumFillClass, EnumMediaType, EnumMergeRule, EnumRowKind, EnumTileCategory,
    SpecCampaignBlock, SpecCanonicalRecord, SpecCell, SpecCellMeta, SpecMergeReport,
    SpecMergeSpan, SpecRenderedCell, SpecRenderedDeck, SpecRenderedRow, SpecRenderedSlide,
    SpecRenderedTable, SpecSlideChunk, SpecTableMatrix, SpecTableRow, SpecTileConfig,
};
pub use util::{
    classify_row_kind, derive_report_keys, format_smart_line_break, format_tile_text,
    normalize_label, select_records_for_key,
};
pub use writer::DeckWorkbookWriter;
