//! Table layout constants, default presets and deck configuration.

use serde::Deserialize;

use crate::error::TableError;
use crate::spec::{EnumMediaType, EnumTileCategory, SpecTileConfig};

////////////////////////////////////////////////////////////////////////////////
// #region TableLayout

/// Campaign label column.
pub const N_COL_CAMPAIGN: usize = 0;
/// Media channel column.
pub const N_COL_MEDIA: usize = 1;
/// Metric/unit column (`£ 000`, `GRPs`, ...).
pub const N_COL_METRIC: usize = 2;
/// First month column (January).
pub const N_COL_MONTH_FIRST: usize = 3;
/// Row total column.
pub const N_COL_TOTAL: usize = 15;
/// Percentage-of-total column.
pub const N_COL_PERCENT: usize = 16;
/// Aggregate GRP column.
pub const N_COL_GRP: usize = 17;
/// Number of table columns.
pub const N_COLS_TABLE: usize = 18;
/// Last column covered by a horizontal total-label merge.
pub const N_COL_LABEL_MERGE_END: usize = 2;

/// Month header labels.
pub const L_MONTH_LABELS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// Header label of column 0; also the header-row classifier key.
pub const C_LABEL_HEADER_CAMPAIGN: &str = "CAMPAIGN";
/// Grand total row label.
pub const C_LABEL_GRAND_TOTAL: &str = "GRAND TOTAL";
/// Carried forward row label.
pub const C_LABEL_CARRIED_FORWARD: &str = "CARRIED FORWARD";
/// Subtotal row label prefix.
pub const C_LABEL_SUBTOTAL: &str = "SUBTOTAL";
/// First-slide closing row label prefix.
pub const C_LABEL_TOTAL_PREFIX: &str = "TOTAL -";
/// Suffix marking a campaign segment continued from the previous slide.
pub const C_LABEL_CONTINUED_SUFFIX: &str = "(CONT.)";

/// Metric sub-row labels for television rows.
pub const C_METRIC_GRP: &str = "GRPs";
pub const C_METRIC_REACH_1: &str = "Reach 1+ (%)";
pub const C_METRIC_OTS_3: &str = "OTS 3+ (%)";

/// Magnitudes below this are "no data" for metric cells.
pub const N_EPS_METRIC: f64 = 0.01;
/// Magnitudes below this are "no data" for cost cells.
pub const N_EPS_COST: f64 = 1e-9;

/// Default maximum rows per slide (header and boundary rows included).
pub const N_ROWS_PER_SLIDE_DEFAULT: usize = 32;
/// Default minimum record count accepted from the normalization layer.
pub const N_ROWS_RECORDS_MIN: usize = 1;

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Styling

/// Body row fill.
pub const C_FILL_WHITE: &str = "#FFFFFF";
/// Total/subtotal row fill.
pub const C_FILL_GRAY: &str = "#D9D9D9";
/// Header row fill.
pub const C_FILL_HEADER: &str = "#1F3864";
/// Brand total row fill.
pub const C_FILL_BRAND_TOTAL: &str = "#BDD7EE";

/// Body font size in points.
pub const N_FONT_SIZE_BODY: u32 = 9;
/// Brand total font size in points.
pub const N_FONT_SIZE_BRAND_TOTAL: u32 = 11;
/// Slide title font size in points.
pub const N_FONT_SIZE_TITLE: u32 = 14;

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region MarketNames

/// Market code -> display name.
pub const L_MARKET_CODES: [(&str, &str); 14] = [
    ("UK", "United Kingdom"),
    ("GBR", "United Kingdom"),
    ("US", "United States"),
    ("USA", "United States"),
    ("DEU", "Germany"),
    ("FRA", "France"),
    ("ESP", "Spain"),
    ("ITA", "Italy"),
    ("NLD", "Netherlands"),
    ("IRL", "Ireland"),
    ("AUS", "Australia"),
    ("CAN", "Canada"),
    ("POL", "Poland"),
    ("SWE", "Sweden"),
];

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region DeckConfig

/// Funnel stages with a default share tile.
pub const L_FUNNEL_STAGES: [&str; 3] = ["Awareness", "Consideration", "Conversion"];

/// Deck-level options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpecDeckConfig {
    /// Maximum rows per slide table.
    pub n_rows_per_slide_max: usize,
    /// Seed continuation slides with a carried-forward row.
    pub if_carry_forward: bool,
    /// Currency symbol used in unit labels and tiles.
    pub currency_symbol: String,
    /// Minimum record count accepted by [`crate::record`] loaders.
    pub n_records_min: usize,
    /// Summary tiles placed on each table slide.
    pub tiles: Vec<SpecTileConfig>,
}

impl Default for SpecDeckConfig {
    fn default() -> Self {
        Self {
            n_rows_per_slide_max: N_ROWS_PER_SLIDE_DEFAULT,
            if_carry_forward: true,
            currency_symbol: "£".to_string(),
            n_records_min: N_ROWS_RECORDS_MIN,
            tiles: derive_default_tile_configs(),
        }
    }
}

/// Build the default tile preset: quarter budgets, media shares, funnel shares.
pub fn derive_default_tile_configs() -> Vec<SpecTileConfig> {
    let mut l_tiles = Vec::new();
    for n_quarter in 1..=4 {
        l_tiles.push(SpecTileConfig {
            shape_name: format!("TILE_Q{n_quarter}_BUDGET"),
            category: EnumTileCategory::QuarterBudget,
            label: format!("Q{n_quarter}"),
            scale: 1_000.0,
        });
    }
    for media in EnumMediaType::ALL {
        if media == EnumMediaType::Other {
            continue;
        }
        l_tiles.push(SpecTileConfig {
            shape_name: format!("TILE_SHARE_{}", media.label().to_ascii_uppercase()),
            category: EnumTileCategory::MediaShare,
            label: media.label().to_string(),
            scale: 1.0,
        });
    }
    for c_stage in L_FUNNEL_STAGES {
        l_tiles.push(SpecTileConfig {
            shape_name: format!("TILE_FUNNEL_{}", c_stage.to_ascii_uppercase()),
            category: EnumTileCategory::FunnelShare,
            label: c_stage.to_string(),
            scale: 1.0,
        });
    }
    l_tiles
}

/// Parse deck config from TOML text; absent keys keep their defaults.
pub fn derive_deck_config_from_toml(text: &str) -> Result<SpecDeckConfig, TableError> {
    let cfg: SpecDeckConfig =
        toml::from_str(text).map_err(|err| TableError::Config(err.to_string()))?;
    if cfg.n_rows_per_slide_max == 0 {
        return Err(TableError::Config(
            "n_rows_per_slide_max must be >= 1.".to_string(),
        ));
    }
    Ok(cfg)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
