//! Canonical record loading (DataFrame / IPC / CSV) and the per-run record cache.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use polars::prelude::{AnyValue, CsvReadOptions, DataFrame, IpcReader, SerReader};
use tracing::{debug, info};

use crate::conf::{L_MONTH_LABELS, N_ROWS_RECORDS_MIN};
use crate::error::TableError;
use crate::spec::SpecCanonicalRecord;

const L_COLS_REQUIRED_TEXT: [&str; 4] = ["market", "brand", "media_type", "campaign_name"];
const L_COLS_OPTIONAL_TEXT: [&str; 3] = ["product", "campaign_type", "funnel_stage"];
const C_COL_YEAR: &str = "year";

////////////////////////////////////////////////////////////////////////////////
// #region AnyValueConversion

fn derive_f64_from_any_value(value: AnyValue<'_>) -> Option<f64> {
    match value {
        AnyValue::UInt8(val) => Some(val as f64),
        AnyValue::UInt16(val) => Some(val as f64),
        AnyValue::UInt32(val) => Some(val as f64),
        AnyValue::UInt64(val) => Some(val as f64),
        AnyValue::Int8(val) => Some(val as f64),
        AnyValue::Int16(val) => Some(val as f64),
        AnyValue::Int32(val) => Some(val as f64),
        AnyValue::Int64(val) => Some(val as f64),
        AnyValue::Float32(val) => Some(val as f64),
        AnyValue::Float64(val) => Some(val),
        AnyValue::String(val) => val.trim().replace(',', "").parse::<f64>().ok(),
        AnyValue::StringOwned(val) => val.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    }
}

fn derive_text_from_any_value(value: AnyValue<'_>) -> String {
    match value {
        AnyValue::Null => String::new(),
        AnyValue::String(val) => val.trim().to_string(),
        AnyValue::StringOwned(val) => val.trim().to_string(),
        _ => value.to_string(),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Loaders

/// Lower-cased column name -> actual column name.
fn derive_column_lookup(df: &DataFrame) -> BTreeMap<String, String> {
    df.get_column_names_str()
        .into_iter()
        .map(|name| (name.trim().to_lowercase(), name.to_string()))
        .collect()
}

fn resolve_column<'a>(
    dict_cols: &'a BTreeMap<String, String>,
    name: &str,
) -> Result<&'a str, TableError> {
    dict_cols
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| TableError::MissingColumn(name.to_string()))
}

fn read_cell<'a>(df: &'a DataFrame, col: &str, n_idx_row: usize) -> Result<AnyValue<'a>, TableError> {
    df.column(col)
        .and_then(|column| column.get(n_idx_row))
        .map_err(|err| TableError::Load(format!("{col}[{n_idx_row}]: {err}")))
}

/// Convert a normalized frame into canonical records.
///
/// Identity columns, `year` and the twelve month columns (`jan`..`dec`) are
/// required; other text and metric columns default to empty / zero. A missing
/// `total_cost` is recomputed from the months.
pub fn derive_records_from_dataframe(df: &DataFrame) -> Result<Vec<SpecCanonicalRecord>, TableError> {
    let dict_cols = derive_column_lookup(df);

    let mut dict_required: BTreeMap<&str, &str> = BTreeMap::new();
    for c_name in L_COLS_REQUIRED_TEXT.into_iter().chain([C_COL_YEAR]) {
        dict_required.insert(c_name, resolve_column(&dict_cols, c_name)?);
    }
    let l_cols_month: Vec<String> = L_MONTH_LABELS.iter().map(|c_month| c_month.to_lowercase()).collect();
    let mut l_cols_month_actual = Vec::with_capacity(12);
    for c_month in &l_cols_month {
        l_cols_month_actual.push(resolve_column(&dict_cols, c_month)?);
    }
    let resolve_optional = |name: &str| dict_cols.get(name).map(String::as_str);

    let mut l_records = Vec::with_capacity(df.height());
    for n_idx_row in 0..df.height() {
        let read_text = |c_key: &str| -> Result<String, TableError> {
            match dict_required.get(c_key).copied().or_else(|| resolve_optional(c_key)) {
                Some(col) => Ok(derive_text_from_any_value(read_cell(df, col, n_idx_row)?)),
                None => Ok(String::new()),
            }
        };
        let read_number = |c_key: &str| -> Result<Option<f64>, TableError> {
            match resolve_optional(c_key) {
                Some(col) => Ok(derive_f64_from_any_value(read_cell(df, col, n_idx_row)?)),
                None => Ok(None),
            }
        };

        let n_year = derive_f64_from_any_value(read_cell(df, dict_required[C_COL_YEAR], n_idx_row)?)
            .ok_or_else(|| TableError::Load(format!("row {n_idx_row}: invalid year")))?;

        let mut l_costs = [0.0; 12];
        for (n_idx_month, col) in l_cols_month_actual.iter().enumerate() {
            l_costs[n_idx_month] = derive_f64_from_any_value(read_cell(df, col, n_idx_row)?).unwrap_or(0.0);
        }

        let mut rec = SpecCanonicalRecord {
            market: read_text("market")?,
            brand: read_text("brand")?,
            media_type: read_text("media_type")?,
            campaign_name: read_text("campaign_name")?,
            year: n_year as i32,
            costs_by_month: l_costs,
            total_cost: read_number("total_cost")?.unwrap_or_else(|| l_costs.iter().sum()),
            grp: read_number("grp")?.unwrap_or(0.0),
            frequency: read_number("frequency")?.unwrap_or(0.0),
            reach_1_plus: read_number("reach_1_plus")?.unwrap_or(0.0),
            reach_3_plus: read_number("reach_3_plus")?.unwrap_or(0.0),
            ..Default::default()
        };
        for c_key in L_COLS_OPTIONAL_TEXT {
            let c_value = read_text(c_key)?;
            match c_key {
                "product" => rec.product = c_value,
                "campaign_type" => rec.campaign_type = c_value,
                _ => rec.funnel_stage = c_value,
            }
        }
        l_records.push(rec);
    }
    Ok(l_records)
}

/// Load records from Polars IPC bytes.
pub fn load_records_from_ipc_bytes(v_ipc_df: &[u8]) -> Result<Vec<SpecCanonicalRecord>, TableError> {
    let df = IpcReader::new(Cursor::new(v_ipc_df))
        .finish()
        .map_err(|err| TableError::Load(format!("Failed to read IPC DataFrame bytes: {err}")))?;
    derive_records_from_dataframe(&df)
}

/// Load records from an Arrow IPC file.
pub fn load_records_from_ipc_file(path: &Path) -> Result<Vec<SpecCanonicalRecord>, TableError> {
    let file = File::open(path).map_err(|err| TableError::Load(format!("{}: {err}", path.display())))?;
    let df = IpcReader::new(file)
        .finish()
        .map_err(|err| TableError::Load(format!("{}: {err}", path.display())))?;
    derive_records_from_dataframe(&df)
}

/// Load records from a headed CSV file.
pub fn load_records_from_csv_file(path: &Path) -> Result<Vec<SpecCanonicalRecord>, TableError> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(|err| TableError::Load(format!("{}: {err}", path.display())))?;
    derive_records_from_dataframe(&df)
}

/// Load records, dispatching on the file extension (`csv`, `arrow`/`ipc`/`feather`).
pub fn load_records(path: &Path) -> Result<Vec<SpecCanonicalRecord>, TableError> {
    if !path.exists() {
        return Err(TableError::Load(format!("{}: file not found", path.display())));
    }
    let c_ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match c_ext.as_str() {
        "csv" => load_records_from_csv_file(path),
        "arrow" | "ipc" | "feather" => load_records_from_ipc_file(path),
        _ => Err(TableError::Load(format!(
            "{}: unsupported record file extension {c_ext:?}",
            path.display()
        ))),
    }
}

/// Reject record sets smaller than `n_min`.
pub fn validate_record_count(records: &[SpecCanonicalRecord], n_min: usize) -> Result<(), TableError> {
    if records.len() < n_min {
        return Err(TableError::BelowMinimumRows {
            found: records.len(),
            required: n_min,
        });
    }
    Ok(())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RecordCache

/// Records loaded during one pipeline run, keyed by source path.
///
/// Owned by the caller and dropped with the run.
#[derive(Debug)]
pub struct SpecRecordCache {
    n_records_min: usize,
    dict_records_by_path: BTreeMap<PathBuf, Arc<Vec<SpecCanonicalRecord>>>,
    cnt_hits: usize,
    cnt_loads: usize,
}

impl Default for SpecRecordCache {
    fn default() -> Self {
        Self::new(N_ROWS_RECORDS_MIN)
    }
}

impl SpecRecordCache {
    pub fn new(n_records_min: usize) -> Self {
        Self {
            n_records_min,
            dict_records_by_path: BTreeMap::new(),
            cnt_hits: 0,
            cnt_loads: 0,
        }
    }

    /// Records of `path`, loading and validating them on first access.
    pub fn get_or_load(&mut self, path: &Path) -> Result<Arc<Vec<SpecCanonicalRecord>>, TableError> {
        if let Some(records) = self.dict_records_by_path.get(path) {
            self.cnt_hits += 1;
            debug!(path = %path.display(), "record cache hit");
            return Ok(Arc::clone(records));
        }
        let l_records = load_records(path)?;
        validate_record_count(&l_records, self.n_records_min)?;
        info!(path = %path.display(), n_records = l_records.len(), "records loaded");

        let records = Arc::new(l_records);
        self.dict_records_by_path
            .insert(path.to_path_buf(), Arc::clone(&records));
        self.cnt_loads += 1;
        Ok(records)
    }

    pub fn cnt_hits(&self) -> usize {
        self.cnt_hits
    }

    pub fn cnt_loads(&self) -> usize {
        self.cnt_loads
    }

    pub fn len(&self) -> usize {
        self.dict_records_by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dict_records_by_path.is_empty()
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
