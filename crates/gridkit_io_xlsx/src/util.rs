//! Stateless helper utilities used by the XLSX kernel.

use std::collections::{BTreeMap, BTreeSet};

use crate::conf::{N_LEN_EXCEL_CELL_TEXT_MAX, N_LEN_EXCEL_SHEET_NAME_MAX, TUP_EXCEL_ILLEGAL};
use crate::spec::{EnumCellValue, SpecXlsxValuePolicy};

////////////////////////////////////////////////////////////////////////////////
// #region CellValueConversion

/// Normalize a cell value according to the column's summable flag and policy.
pub fn convert_cell_value(
    value: &EnumCellValue,
    if_is_summable_col: bool,
    value_policy: &SpecXlsxValuePolicy,
) -> EnumCellValue {
    if !if_is_summable_col || !value_policy.if_coerce_numeric_text {
        return value.clone();
    }

    match value {
        EnumCellValue::String(s) => match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => EnumCellValue::Number(v),
            _ => EnumCellValue::String(s.clone()),
        },
        _ => value.clone(),
    }
}

/// Cut `text` to Excel's cell text limit. Returns `None` when it already fits.
pub fn truncate_cell_text(text: &str) -> Option<String> {
    if text.len() <= N_LEN_EXCEL_CELL_TEXT_MAX || text.chars().count() <= N_LEN_EXCEL_CELL_TEXT_MAX {
        return None;
    }
    Some(text.chars().take(N_LEN_EXCEL_CELL_TEXT_MAX).collect())
}

/// Capitalize the first character, leaving the rest untouched.
pub fn capitalize_first_letter(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(c_first) => c_first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ColumnUtils

/// Validate that `columns` has no duplicated names.
pub fn validate_unique_columns(columns: &[String]) -> Result<(), String> {
    if columns.len() == columns.iter().collect::<BTreeSet<_>>().len() {
        return Ok(());
    }

    let mut dict_pos: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (n_idx, c_name) in columns.iter().enumerate() {
        dict_pos.entry(c_name).or_default().push(n_idx);
    }

    let c_msg = dict_pos
        .iter()
        .filter_map(|(c_name, l_pos)| {
            if l_pos.len() > 1 {
                Some(format!(
                    "{c_name:?} x{} at indices {:?}",
                    l_pos.len(),
                    l_pos
                ))
            } else {
                None
            }
        })
        .collect::<Vec<_>>()
        .join("; ");

    Err(format!("Duplicate column names detected: {c_msg}"))
}

/// Convert a zero-based column index to its Excel letter (`0 -> A`, `26 -> AA`).
pub fn column_index_to_letter(col_idx: usize) -> String {
    let mut l_letters = Vec::new();
    let mut n_rest = col_idx + 1;
    while n_rest > 0 {
        let n_digit = (n_rest - 1) % 26;
        l_letters.push(char::from(b'A' + n_digit as u8));
        n_rest = (n_rest - 1) / 26;
    }
    l_letters.iter().rev().collect()
}

/// Excel A1 reference for zero-based `(row_idx, col_idx)`.
pub fn derive_cell_reference(row_idx: usize, col_idx: usize) -> String {
    format!("{}{}", column_index_to_letter(col_idx), row_idx + 1)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetNormalization

/// Replace invalid chars and trim to valid Excel sheet name.
///
/// Excel also forbids a leading or trailing apostrophe, so those are stripped.
pub fn sanitize_sheet_name(name: &str, replace_to: &str) -> String {
    let mut c_name = name.to_string();
    for c_illegal in TUP_EXCEL_ILLEGAL {
        c_name = c_name.replace(c_illegal, replace_to);
    }
    c_name = c_name.trim().trim_matches('\'').trim().to_string();
    if c_name.is_empty() {
        c_name = "Sheet".to_string();
    }

    let c_name: String = c_name.chars().take(N_LEN_EXCEL_SHEET_NAME_MAX).collect();
    match c_name.trim_end_matches('\'').trim_end() {
        "" => "Sheet".to_string(),
        c_trimmed => c_trimmed.to_string(),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Workers

/// Resolve the render worker count: explicit values are clamped to the CPU
/// count, the default is the CPU count clamped to `1..=8`.
pub fn calculate_worker_limit(num_workers_max: Option<usize>) -> usize {
    let n_cpu = std::thread::available_parallelism()
        .map(|v| v.get())
        .unwrap_or(1);

    match num_workers_max {
        Some(n) => n.clamp(1, n_cpu),
        None => n_cpu.clamp(1, 8),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
