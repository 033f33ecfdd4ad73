//! Shared XLSX specification models.

use std::collections::HashMap;

use serde_json::Value;

use crate::conf::{
    C_SHEET_NAME_DEFAULT, N_WIDTH_COLUMN_MAX, N_WIDTH_COLUMN_MIN, N_WIDTH_COLUMN_PADDING,
    N_WIDTH_HEADER_PADDING, derive_default_header_format, derive_default_subtotal_format,
};

////////////////////////////////////////////////////////////////////////////////
// #region CellFormatSpecification

/// Row format specification, converted to `rust_xlsxwriter::Format` at write time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SpecCellFormat {
    /// Bold style.
    pub bold: Option<bool>,
    /// Horizontal alignment.
    pub align: Option<String>,
    /// Vertical alignment.
    pub valign: Option<String>,
    /// Solid background fill color (`#RRGGBB`).
    pub bg_color: Option<String>,
}

impl SpecCellFormat {
    /// Return a new format by overlaying `patch` onto `self`.
    pub fn with_(&self, patch: SpecCellFormat) -> SpecCellFormat {
        self.merge(&patch)
    }

    /// Merge two formats with right-side non-`None` overwrite semantics.
    pub fn merge(&self, other: &SpecCellFormat) -> SpecCellFormat {
        SpecCellFormat {
            bold: other.bold.or(self.bold),
            align: other.align.clone().or_else(|| self.align.clone()),
            valign: other.valign.clone().or_else(|| self.valign.clone()),
            bg_color: other.bg_color.clone().or_else(|| self.bg_color.clone()),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CellValue

/// Normalized scalar cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumCellValue {
    /// Missing/blank value.
    None,
    /// Text value.
    String(String),
    /// Numeric value.
    Number(f64),
}

impl EnumCellValue {
    /// Convert one JSON value.
    ///
    /// Booleans become `"true"`/`"false"`, nested arrays/objects become their
    /// compact JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => EnumCellValue::None,
            Value::String(s) => EnumCellValue::String(s.clone()),
            Value::Number(n) => n
                .as_f64()
                .map_or_else(|| EnumCellValue::String(n.to_string()), EnumCellValue::Number),
            Value::Bool(b) => EnumCellValue::String(b.to_string()),
            Value::Array(_) | Value::Object(_) => EnumCellValue::String(value.to_string()),
        }
    }

    /// Text form used for width inference.
    pub fn to_display_text(&self) -> String {
        match self {
            EnumCellValue::None => String::new(),
            EnumCellValue::String(s) => s.clone(),
            EnumCellValue::Number(n) => derive_number_text(*n),
        }
    }

    /// Number of characters in [`Self::to_display_text`].
    pub fn display_len(&self) -> usize {
        match self {
            EnumCellValue::None => 0,
            EnumCellValue::String(s) => s.chars().count(),
            EnumCellValue::Number(n) => derive_number_text(*n).chars().count(),
        }
    }

    /// Numeric payload, if any.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            EnumCellValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

fn derive_number_text(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        return (n as i64).to_string();
    }
    n.to_string()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Row

/// One input record: ordered `key -> value` mapping.
///
/// Keys keep insertion order; a repeated key overwrites in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecRow {
    l_cells: Vec<(String, EnumCellValue)>,
    dict_idx_by_key: HashMap<String, usize>,
}

impl SpecRow {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: EnumCellValue) {
        let key = key.into();
        if let Some(&n_idx) = self.dict_idx_by_key.get(&key) {
            self.l_cells[n_idx].1 = value;
            return;
        }
        self.dict_idx_by_key.insert(key.clone(), self.l_cells.len());
        self.l_cells.push((key, value));
    }

    /// Value at `key`.
    pub fn get(&self, key: &str) -> Option<&EnumCellValue> {
        self.dict_idx_by_key
            .get(key)
            .map(|&n_idx| &self.l_cells[n_idx].1)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.l_cells.iter().map(|(key, _)| key.as_str())
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.l_cells.len()
    }

    /// Whether the row has no fields.
    pub fn is_empty(&self) -> bool {
        self.l_cells.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, EnumCellValue)> for SpecRow {
    fn from_iter<T: IntoIterator<Item = (K, EnumCellValue)>>(iter: T) -> Self {
        let mut row = SpecRow::new();
        for (key, value) in iter {
            row.insert(key, value);
        }
        row
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ColumnLayout

/// One output column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecColumn {
    /// Field key looked up in every row.
    pub key: String,
    /// Header text.
    pub label: String,
    /// Emit a `SUBTOTAL` formula for this column.
    pub summable: bool,
}

impl SpecColumn {
    /// Non-summable column.
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            summable: false,
        }
    }

    /// Mark column as summable.
    pub fn summable(mut self) -> Self {
        self.summable = true;
        self
    }
}

/// Ordered column layout with unique, non-empty keys.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecColumnLayout {
    columns: Vec<SpecColumn>,
}

impl SpecColumnLayout {
    /// Validate and wrap `columns`.
    pub fn new(columns: Vec<SpecColumn>) -> Result<Self, String> {
        let l_keys: Vec<String> = columns.iter().map(|col| col.key.clone()).collect();
        if let Some(n_idx) = l_keys.iter().position(String::is_empty) {
            return Err(format!("Column {n_idx} has an empty key."));
        }
        crate::util::validate_unique_columns(&l_keys)?;
        Ok(Self { columns })
    }

    /// Columns in output order.
    pub fn columns(&self) -> &[SpecColumn] {
        &self.columns
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the layout has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Whether any column is summable.
    pub fn has_summable(&self) -> bool {
        self.columns.iter().any(|col| col.summable)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region WriteOptions

/// Value conversion policy applied while materializing rows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecXlsxValuePolicy {
    /// Convert numeric-looking strings to numbers in summable columns.
    pub if_coerce_numeric_text: bool,
}

/// Column width inference policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecAutofitCellsPolicy {
    /// Floor for the header-derived width.
    pub width_cell_min: usize,
    /// Cap applied before padding.
    pub width_cell_max: usize,
    /// Added to the label length for the header-derived width.
    pub width_header_padding: usize,
    /// Added after the cap.
    pub width_cell_padding: usize,
}

impl Default for SpecAutofitCellsPolicy {
    fn default() -> Self {
        Self {
            width_cell_min: N_WIDTH_COLUMN_MIN,
            width_cell_max: N_WIDTH_COLUMN_MAX,
            width_header_padding: N_WIDTH_HEADER_PADDING,
            width_cell_padding: N_WIDTH_COLUMN_PADDING,
        }
    }
}

/// Per-render options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecXlsxWriteOptions {
    /// Worksheet name (sanitized before use).
    pub sheet_name: String,
    /// Header row format.
    pub fmt_header: SpecCellFormat,
    /// Subtotal row format.
    pub fmt_subtotal: SpecCellFormat,
    /// Value conversion policy.
    pub value_policy: SpecXlsxValuePolicy,
    /// Width inference policy.
    pub policy_autofit: SpecAutofitCellsPolicy,
    /// Freeze panes below the header row.
    pub if_freeze_header: bool,
}

impl Default for SpecXlsxWriteOptions {
    fn default() -> Self {
        Self {
            sheet_name: C_SHEET_NAME_DEFAULT.to_string(),
            fmt_header: derive_default_header_format(),
            fmt_subtotal: derive_default_subtotal_format(),
            value_policy: SpecXlsxValuePolicy::default(),
            policy_autofit: SpecAutofitCellsPolicy::default(),
            if_freeze_header: true,
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region DocumentModel

/// Zero-based inclusive cell range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecCellRange {
    /// First row.
    pub row_first: usize,
    /// First column.
    pub col_first: usize,
    /// Last row.
    pub row_last: usize,
    /// Last column.
    pub col_last: usize,
}

/// Column declaration handed to a sheet sink.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecSheetColumn {
    /// Field key.
    pub key: String,
    /// Header text.
    pub header: String,
    /// Column width in character units.
    pub width: usize,
}

/// Rendered column.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecDocumentColumn {
    /// Field key.
    pub key: String,
    /// Header text.
    pub label: String,
    /// Summable flag copied from the layout.
    pub summable: bool,
    /// Header-derived width (floor of the final width).
    pub width_header: usize,
    /// Final width.
    pub width: usize,
    /// Subtotal formula for summable columns.
    pub formula: Option<String>,
}

/// Subtotal row cell.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumSubtotalCell {
    /// Non-summable column.
    Empty,
    /// `SUBTOTAL` formula with its precomputed result.
    Formula {
        /// Formula text without leading `=`.
        formula: String,
        /// Sum of the numeric data cells, written as cached result.
        cached: f64,
    },
}

/// In-memory single-sheet document, ready for serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecDocument {
    /// Sanitized worksheet name.
    pub sheet_name: String,
    /// Columns in output order.
    pub columns: Vec<SpecDocumentColumn>,
    /// Data rows, one value per column.
    pub rows: Vec<Vec<EnumCellValue>>,
    /// Subtotal row, present iff a column is summable and there is data.
    pub subtotal: Option<Vec<EnumSubtotalCell>>,
    /// Auto-filter range over the header row.
    pub autofilter: SpecCellRange,
    /// Header row format.
    pub fmt_header: SpecCellFormat,
    /// Subtotal row format.
    pub fmt_subtotal: SpecCellFormat,
    /// Freeze panes below the header row.
    pub if_freeze_header: bool,
}

impl SpecDocument {
    /// Zero-based row index of the subtotal row, if any.
    pub fn subtotal_row_idx(&self) -> Option<usize> {
        self.subtotal.as_ref().map(|_| self.rows.len() + 1)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ReportSpecification

/// Per-render report.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecXlsxReport {
    /// Data rows written.
    pub n_rows: usize,
    /// Columns written.
    pub n_cols: usize,
    /// Non-fatal warnings.
    pub warnings: Vec<String>,
}

impl SpecXlsxReport {
    /// Add a warning message.
    pub fn warn(&mut self, msg: impl AsRef<str>) {
        self.warnings.push(msg.as_ref().to_string());
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
