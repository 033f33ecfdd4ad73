//! Column layout resolution from raw request JSON.
//!
//! An explicit config is used when it is a non-empty array; anything else
//! (absent, `null`, non-array, empty array) falls back to inference from the
//! first row's keys.

use serde_json::{Map, Value};

use crate::error::XlsxExportError;
use crate::spec::{EnumCellValue, SpecColumn, SpecColumnLayout, SpecRow};
use crate::util::capitalize_first_letter;

/// Parse the request `data` member into rows.
///
/// `data` must be a non-empty array of JSON objects.
pub fn parse_rows(data: &Value) -> Result<Vec<SpecRow>, XlsxExportError> {
    let Value::Array(l_values) = data else {
        return Err(XlsxExportError::InvalidInput(
            "data must be a non-empty array".to_string(),
        ));
    };
    if l_values.is_empty() {
        return Err(XlsxExportError::InvalidInput(
            "data must be a non-empty array".to_string(),
        ));
    }

    l_values
        .iter()
        .enumerate()
        .map(|(n_idx, value)| match value {
            Value::Object(dict_fields) => Ok(derive_row_from_object(dict_fields)),
            _ => Err(XlsxExportError::InvalidInput(format!(
                "data[{n_idx}] is not an object"
            ))),
        })
        .collect()
}

fn derive_row_from_object(dict_fields: &Map<String, Value>) -> SpecRow {
    dict_fields
        .iter()
        .map(|(key, value)| (key.clone(), EnumCellValue::from_json(value)))
        .collect()
}

/// Resolve the final column layout.
pub fn resolve_column_layout(
    rows: &[SpecRow],
    config: Option<&Value>,
) -> Result<SpecColumnLayout, XlsxExportError> {
    if rows.is_empty() {
        return Err(XlsxExportError::InvalidInput(
            "data must be a non-empty array".to_string(),
        ));
    }

    match config {
        Some(Value::Array(l_entries)) if !l_entries.is_empty() => parse_column_config(l_entries),
        _ => Ok(infer_column_layout(&rows[0])),
    }
}

/// Infer one non-summable column per key of `row_first`, in key order.
pub fn infer_column_layout(row_first: &SpecRow) -> SpecColumnLayout {
    let l_columns: Vec<SpecColumn> = row_first
        .keys()
        .filter(|key| !key.is_empty())
        .map(|key| SpecColumn::new(key, capitalize_first_letter(key)))
        .collect();
    // Keys of one JSON object are unique and blanks were dropped.
    SpecColumnLayout::new(l_columns).unwrap_or_default()
}

/// Parse an explicit, non-empty config array.
pub fn parse_column_config(l_entries: &[Value]) -> Result<SpecColumnLayout, XlsxExportError> {
    let mut l_columns = Vec::with_capacity(l_entries.len());
    for (n_idx, entry) in l_entries.iter().enumerate() {
        l_columns.push(parse_column_entry(n_idx, entry)?);
    }
    SpecColumnLayout::new(l_columns).map_err(XlsxExportError::InvalidInput)
}

fn parse_column_entry(n_idx: usize, entry: &Value) -> Result<SpecColumn, XlsxExportError> {
    let Value::Object(dict_entry) = entry else {
        return Err(XlsxExportError::InvalidInput(format!(
            "config[{n_idx}] is not an object"
        )));
    };

    let key = match dict_entry.get("key") {
        Some(Value::String(key)) if !key.is_empty() => key.clone(),
        _ => {
            return Err(XlsxExportError::InvalidInput(format!(
                "config[{n_idx}].key must be a non-empty string"
            )));
        }
    };
    let label = match dict_entry.get("label") {
        Some(Value::String(label)) => label.clone(),
        _ => {
            return Err(XlsxExportError::InvalidInput(format!(
                "config[{n_idx}].label must be a string"
            )));
        }
    };
    let summable = match dict_entry.get("summable") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => {
            return Err(XlsxExportError::InvalidInput(format!(
                "config[{n_idx}].summable must be a boolean"
            )));
        }
    };

    Ok(SpecColumn {
        key,
        label,
        summable,
    })
}
