//! Sheet sink abstraction and its `rust_xlsxwriter` implementation.

use std::collections::{BTreeMap, HashMap};

use rust_xlsxwriter::{Format, FormatAlign, Formula, Workbook, Worksheet, XlsxError};

use crate::error::XlsxExportError;
use crate::util::sanitize_sheet_name;
use crate::spec::{
    EnumCellValue, EnumSubtotalCell, SpecCellFormat, SpecCellRange, SpecDocument,
    SpecSheetColumn,
};

/// Write target for one worksheet.
///
/// Row indices are zero-based; row 0 is the header written by
/// [`SheetSink::declare_columns`]. Row formats may be registered before or
/// after the row's cells are appended.
pub trait SheetSink {
    /// Declare columns (key, header text, width) and write the header row.
    fn declare_columns(&mut self, columns: &[SpecSheetColumn]) -> Result<(), String>;

    /// Apply a row-level format (bold, alignment, fill).
    fn style_row(&mut self, row_idx: usize, fmt: &SpecCellFormat) -> Result<(), String>;

    /// Append one row of `key -> value` pairs; unknown keys are ignored.
    ///
    /// Returns the row index the values were written to.
    fn append_row(&mut self, cells: &[(&str, &EnumCellValue)]) -> Result<usize, String>;

    /// Put a formula with a cached result into an existing cell.
    fn set_formula(
        &mut self,
        row_idx: usize,
        col_idx: usize,
        formula: &str,
        cached: f64,
    ) -> Result<(), String>;

    /// Declare the auto-filter range.
    fn set_autofilter(&mut self, range: SpecCellRange) -> Result<(), String>;

    /// Freeze the top `n_rows` rows.
    fn freeze_rows(&mut self, n_rows: usize) -> Result<(), String>;

    /// Serialize the sheet into a binary workbook.
    fn serialize(&mut self) -> Result<Vec<u8>, String>;
}

/// Drive `sink` with the content of `doc`.
pub fn write_document(doc: &SpecDocument, sink: &mut dyn SheetSink) -> Result<(), String> {
    let l_sheet_columns: Vec<SpecSheetColumn> = doc
        .columns
        .iter()
        .map(|col| SpecSheetColumn {
            key: col.key.clone(),
            header: col.label.clone(),
            width: col.width,
        })
        .collect();

    sink.style_row(0, &doc.fmt_header)?;
    sink.declare_columns(&l_sheet_columns)?;

    for row in &doc.rows {
        let l_cells: Vec<(&str, &EnumCellValue)> = doc
            .columns
            .iter()
            .map(|col| col.key.as_str())
            .zip(row.iter())
            .collect();
        sink.append_row(&l_cells)?;
    }

    if let Some(l_subtotal) = &doc.subtotal {
        let n_row_subtotal = sink.append_row(&[])?;
        sink.style_row(n_row_subtotal, &doc.fmt_subtotal)?;
        for (n_idx_col, cell) in l_subtotal.iter().enumerate() {
            if let EnumSubtotalCell::Formula { formula, cached } = cell {
                sink.set_formula(n_row_subtotal, n_idx_col, formula, *cached)?;
            }
        }
    }

    sink.set_autofilter(doc.autofilter)?;
    if doc.if_freeze_header {
        sink.freeze_rows(1)?;
    }
    Ok(())
}

/// Serialize `doc` into XLSX bytes.
pub fn render_document_to_xlsx_bytes(doc: &SpecDocument) -> Result<Vec<u8>, XlsxExportError> {
    let mut sink = XlsxSheetSink::new(&doc.sheet_name);
    write_document(doc, &mut sink).map_err(XlsxExportError::Render)?;
    sink.serialize().map_err(XlsxExportError::Render)
}

/// Sanitize `name` and check it against the worksheet naming rules.
///
/// Returns the name the worksheet will carry.
pub fn validate_sheet_name(name: &str) -> Result<String, String> {
    let c_name = sanitize_sheet_name(name, "_");
    let mut worksheet = Worksheet::new();
    worksheet.set_name(&c_name).map_err(derive_xlsx_error_text)?;
    Ok(c_name)
}

/// Buffered single-sheet sink backed by an in-memory `rust_xlsxwriter` workbook.
///
/// Cells are kept in memory and written in one pass by [`SheetSink::serialize`].
#[derive(Debug, Clone)]
pub struct XlsxSheetSink {
    sheet_name: String,
    l_columns: Vec<SpecSheetColumn>,
    dict_col_idx_by_key: HashMap<String, usize>,
    l_rows_body: Vec<Vec<EnumCellValue>>,
    dict_fmt_by_row: BTreeMap<usize, SpecCellFormat>,
    dict_formula_by_cell: BTreeMap<(usize, usize), (String, f64)>,
    autofilter: Option<SpecCellRange>,
    n_rows_freeze: usize,
}

impl XlsxSheetSink {
    /// Create an empty sink for sheet `sheet_name`.
    pub fn new(sheet_name: &str) -> Self {
        Self {
            sheet_name: sheet_name.to_string(),
            l_columns: Vec::new(),
            dict_col_idx_by_key: HashMap::new(),
            l_rows_body: Vec::new(),
            dict_fmt_by_row: BTreeMap::new(),
            dict_formula_by_cell: BTreeMap::new(),
            autofilter: None,
            n_rows_freeze: 0,
        }
    }

    fn n_rows_total(&self) -> usize {
        1 + self.l_rows_body.len()
    }

    fn write_worksheet(&self, worksheet: &mut Worksheet) -> Result<(), String> {
        worksheet
            .set_name(&self.sheet_name)
            .map_err(derive_xlsx_error_text)?;

        let dict_row_format: BTreeMap<usize, Format> = self
            .dict_fmt_by_row
            .iter()
            .map(|(row_idx, fmt)| (*row_idx, derive_rust_xlsx_format(fmt)))
            .collect();

        let fmt_header = dict_row_format.get(&0);
        for (n_idx_col, col) in self.l_columns.iter().enumerate() {
            let value = EnumCellValue::String(col.header.clone());
            write_cell_with_format(worksheet, 0, n_idx_col, &value, fmt_header)?;
            worksheet
                .set_column_width(cast_col_num(n_idx_col)?, col.width as f64)
                .map_err(derive_xlsx_error_text)?;
        }

        for (n_idx_body, row_values) in self.l_rows_body.iter().enumerate() {
            let n_idx_row = n_idx_body + 1;
            let fmt_row = dict_row_format.get(&n_idx_row);

            for (n_idx_col, value) in row_values.iter().enumerate() {
                if let Some((formula, cached)) = self.dict_formula_by_cell.get(&(n_idx_row, n_idx_col))
                {
                    let formula = Formula::new(formula.as_str())
                        .set_result(EnumCellValue::Number(*cached).to_display_text());
                    let (n_row, n_col) = (cast_row_num(n_idx_row)?, cast_col_num(n_idx_col)?);
                    let result = match fmt_row {
                        Some(fmt) => worksheet.write_formula_with_format(n_row, n_col, formula, fmt),
                        None => worksheet.write_formula(n_row, n_col, formula),
                    };
                    result.map_err(derive_xlsx_error_text)?;
                    continue;
                }
                write_cell_with_format(worksheet, n_idx_row, n_idx_col, value, fmt_row)?;
            }
        }

        if let Some(range) = self.autofilter {
            worksheet
                .autofilter(
                    cast_row_num(range.row_first)?,
                    cast_col_num(range.col_first)?,
                    cast_row_num(range.row_last)?,
                    cast_col_num(range.col_last)?,
                )
                .map_err(derive_xlsx_error_text)?;
        }
        if self.n_rows_freeze > 0 {
            worksheet
                .set_freeze_panes(cast_row_num(self.n_rows_freeze)?, 0)
                .map_err(derive_xlsx_error_text)?;
        }
        Ok(())
    }
}

impl SheetSink for XlsxSheetSink {
    fn declare_columns(&mut self, columns: &[SpecSheetColumn]) -> Result<(), String> {
        if !self.l_columns.is_empty() {
            return Err("Columns already declared.".to_string());
        }
        self.dict_col_idx_by_key = columns
            .iter()
            .enumerate()
            .map(|(n_idx, col)| (col.key.clone(), n_idx))
            .collect();
        self.l_columns = columns.to_vec();
        Ok(())
    }

    fn style_row(&mut self, row_idx: usize, fmt: &SpecCellFormat) -> Result<(), String> {
        cast_row_num(row_idx)?;
        self.dict_fmt_by_row.insert(row_idx, fmt.clone());
        Ok(())
    }

    fn append_row(&mut self, cells: &[(&str, &EnumCellValue)]) -> Result<usize, String> {
        if self.l_columns.is_empty() {
            return Err("Cannot append a row before columns are declared.".to_string());
        }
        let n_idx_row = self.n_rows_total();
        cast_row_num(n_idx_row)?;

        let mut l_values = vec![EnumCellValue::None; self.l_columns.len()];
        for (key, value) in cells {
            if let Some(&n_idx_col) = self.dict_col_idx_by_key.get(*key) {
                l_values[n_idx_col] = (*value).clone();
            }
        }
        self.l_rows_body.push(l_values);
        Ok(n_idx_row)
    }

    fn set_formula(
        &mut self,
        row_idx: usize,
        col_idx: usize,
        formula: &str,
        cached: f64,
    ) -> Result<(), String> {
        if row_idx == 0 || row_idx >= self.n_rows_total() || col_idx >= self.l_columns.len() {
            return Err(format!(
                "Formula target ({row_idx}, {col_idx}) is outside the written body."
            ));
        }
        self.dict_formula_by_cell
            .insert((row_idx, col_idx), (formula.to_string(), cached));
        Ok(())
    }

    fn set_autofilter(&mut self, range: SpecCellRange) -> Result<(), String> {
        if range.row_first > range.row_last
            || range.col_first > range.col_last
            || range.col_last >= self.l_columns.len()
        {
            return Err(format!("Invalid auto-filter range: {range:?}"));
        }
        self.autofilter = Some(range);
        Ok(())
    }

    fn freeze_rows(&mut self, n_rows: usize) -> Result<(), String> {
        cast_row_num(n_rows)?;
        self.n_rows_freeze = n_rows;
        Ok(())
    }

    fn serialize(&mut self) -> Result<Vec<u8>, String> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        self.write_worksheet(worksheet)?;
        workbook.save_to_buffer().map_err(derive_xlsx_error_text)
    }
}

/// Write one cell; `None` cells are only written (blank) when the row is styled.
fn write_cell_with_format(
    worksheet: &mut Worksheet,
    row_idx: usize,
    col_idx: usize,
    value: &EnumCellValue,
    format: Option<&Format>,
) -> Result<(), String> {
    let (n_row, n_col) = (cast_row_num(row_idx)?, cast_col_num(col_idx)?);
    let result = match (value, format) {
        (EnumCellValue::None, None) => return Ok(()),
        (EnumCellValue::String(val), None) if val.is_empty() => return Ok(()),
        (EnumCellValue::None, Some(format)) => worksheet.write_blank(n_row, n_col, format),
        (EnumCellValue::String(val), Some(format)) if val.is_empty() => {
            worksheet.write_blank(n_row, n_col, format)
        }
        (EnumCellValue::String(val), Some(format)) => {
            worksheet.write_string_with_format(n_row, n_col, val, format)
        }
        (EnumCellValue::String(val), None) => worksheet.write_string(n_row, n_col, val),
        (EnumCellValue::Number(val), Some(format)) => {
            worksheet.write_number_with_format(n_row, n_col, *val, format)
        }
        (EnumCellValue::Number(val), None) => worksheet.write_number(n_row, n_col, *val),
    };
    result.map(|_| ()).map_err(derive_xlsx_error_text)
}

fn derive_rust_xlsx_format(spec: &SpecCellFormat) -> Format {
    let mut format = Format::new();

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

    format
}

fn derive_format_align(align: &str) -> Option<FormatAlign> {
    let value = align.trim().to_ascii_lowercase();
    match value.as_str() {
        "general" => Some(FormatAlign::General),
        "left" => Some(FormatAlign::Left),
        "center" => Some(FormatAlign::Center),
        "right" => Some(FormatAlign::Right),
        "top" => Some(FormatAlign::Top),
        "bottom" => Some(FormatAlign::Bottom),
        "vcenter" | "vertical_center" => Some(FormatAlign::VerticalCenter),
        _ => None,
    }
}

fn cast_row_num(value: usize) -> Result<u32, String> {
    u32::try_from(value).map_err(|_| format!("row index overflow: {value}"))
}

fn cast_col_num(value: usize) -> Result<u16, String> {
    u16::try_from(value).map_err(|_| format!("column index overflow: {value}"))
}

fn derive_xlsx_error_text(err: XlsxError) -> String {
    format!("xlsx write error: {err}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_document;
    use crate::spec::{SpecColumn, SpecColumnLayout, SpecRow, SpecXlsxWriteOptions};

    /// Sink that records every call in order.
    #[derive(Default)]
    struct RecordingSink {
        l_calls: Vec<String>,
        n_rows: usize,
    }

    impl SheetSink for RecordingSink {
        fn declare_columns(&mut self, columns: &[SpecSheetColumn]) -> Result<(), String> {
            let l_desc: Vec<String> = columns
                .iter()
                .map(|c| format!("{}:{}:{}", c.key, c.header, c.width))
                .collect();
            self.l_calls.push(format!("columns {}", l_desc.join(",")));
            self.n_rows = 1;
            Ok(())
        }

        fn style_row(&mut self, row_idx: usize, fmt: &SpecCellFormat) -> Result<(), String> {
            self.l_calls.push(format!(
                "style {row_idx} {}",
                fmt.bg_color.clone().unwrap_or_default()
            ));
            Ok(())
        }

        fn append_row(&mut self, cells: &[(&str, &EnumCellValue)]) -> Result<usize, String> {
            let l_desc: Vec<String> = cells
                .iter()
                .map(|(k, v)| format!("{k}={}", v.to_display_text()))
                .collect();
            self.l_calls.push(format!("row {}", l_desc.join(",")));
            self.n_rows += 1;
            Ok(self.n_rows - 1)
        }

        fn set_formula(
            &mut self,
            row_idx: usize,
            col_idx: usize,
            formula: &str,
            cached: f64,
        ) -> Result<(), String> {
            self.l_calls
                .push(format!("formula {row_idx},{col_idx} {formula} {cached}"));
            Ok(())
        }

        fn set_autofilter(&mut self, range: SpecCellRange) -> Result<(), String> {
            self.l_calls.push(format!(
                "filter {}:{}-{}:{}",
                range.row_first, range.col_first, range.row_last, range.col_last
            ));
            Ok(())
        }

        fn freeze_rows(&mut self, n_rows: usize) -> Result<(), String> {
            self.l_calls.push(format!("freeze {n_rows}"));
            Ok(())
        }

        fn serialize(&mut self) -> Result<Vec<u8>, String> {
            Ok(vec![])
        }
    }

    fn derive_sample_document() -> SpecDocument {
        let layout = SpecColumnLayout::new(vec![
            SpecColumn::new("qty", "Qty").summable(),
            SpecColumn::new("name", "Name"),
        ])
        .unwrap();
        let rows: Vec<SpecRow> = vec![
            [("qty", EnumCellValue::Number(2.0)), ("name", EnumCellValue::String("a".into()))]
                .into_iter()
                .collect(),
            [("qty", EnumCellValue::Number(5.0))].into_iter().collect(),
        ];
        build_document(&rows, &layout, &SpecXlsxWriteOptions::default()).unwrap()
    }

    #[test]
    fn test_write_document_drives_sink_in_order() {
        let doc = derive_sample_document();
        let mut sink = RecordingSink::default();

        write_document(&doc, &mut sink).unwrap();

        assert_eq!(
            sink.l_calls,
            vec![
                "style 0 #CCFFCC",
                "columns qty:Qty:12,name:Name:12",
                "row qty=2,name=a",
                "row qty=5,name=",
                "row ",
                "style 3 #FFCC00",
                "formula 3,0 SUBTOTAL(9,A2:A3) 7",
                "filter 0:0-0:1",
                "freeze 1",
            ]
        );
    }

    #[test]
    fn test_xlsx_sink_ignores_unknown_keys_and_validates_targets() {
        let mut sink = XlsxSheetSink::new("Data");
        assert!(sink.append_row(&[]).is_err());

        sink.declare_columns(&[SpecSheetColumn {
            key: "a".into(),
            header: "A".into(),
            width: 10,
        }])
        .unwrap();
        let value = EnumCellValue::Number(1.0);
        let extra = EnumCellValue::String("x".into());
        let n_row = sink.append_row(&[("a", &value), ("zzz", &extra)]).unwrap();

        assert_eq!(n_row, 1);
        assert_eq!(sink.l_rows_body, vec![vec![EnumCellValue::Number(1.0)]]);
        assert!(sink.set_formula(0, 0, "SUM(A1)", 0.0).is_err());
        assert!(sink.set_formula(2, 0, "SUM(A1)", 0.0).is_err());
        assert!(sink.set_formula(1, 1, "SUM(A1)", 0.0).is_err());
        assert!(
            sink.set_autofilter(SpecCellRange {
                row_first: 0,
                col_first: 0,
                row_last: 0,
                col_last: 1,
            })
            .is_err()
        );
    }

    #[test]
    fn test_validate_sheet_name_accepts_sanitized_names() {
        assert_eq!(validate_sheet_name("'Report'").unwrap(), "Report");
        assert_eq!(validate_sheet_name("Q1/Q2").unwrap(), "Q1_Q2");
        assert_eq!(validate_sheet_name("").unwrap(), "Sheet");
    }

    #[test]
    fn test_apostrophe_sheet_name_renders() {
        let mut doc = derive_sample_document();
        doc.sheet_name = validate_sheet_name("'Quoted'").unwrap();

        let bytes = render_document_to_xlsx_bytes(&doc).unwrap();

        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn test_render_document_to_xlsx_bytes_produces_zip_payload() {
        let bytes = render_document_to_xlsx_bytes(&derive_sample_document()).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }
}
