//! Pure `(rows, layout) -> SpecDocument` transformation.
//!
//! Row 1 of the sheet is the header, data occupies rows `2..=n+1`, and the
//! optional subtotal row sits at `n+2`. Formula ranges are derived from the
//! same column positions used to write the cells.

use std::collections::HashSet;

use crate::conf::{
    N_LEN_EXCEL_CELL_TEXT_MAX, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX, N_SUBTOTAL_FUNCTION_SUM,
};
use crate::error::XlsxExportError;
use crate::spec::{
    EnumCellValue, EnumSubtotalCell, SpecAutofitCellsPolicy, SpecCellRange, SpecColumnLayout,
    SpecDocument, SpecDocumentColumn, SpecRow, SpecXlsxReport, SpecXlsxWriteOptions,
};
use crate::util::{
    convert_cell_value, derive_cell_reference, sanitize_sheet_name, truncate_cell_text,
};

/// Build the document model for `rows` under `layout`.
pub fn build_document(
    rows: &[SpecRow],
    layout: &SpecColumnLayout,
    options: &SpecXlsxWriteOptions,
) -> Result<SpecDocument, XlsxExportError> {
    build_document_with_cancel(rows, layout, options, || false).map(|(doc, _)| doc)
}

/// Same as [`build_document`], polling `should_stop` before each row.
///
/// Also returns a report with row/column counts and non-fatal warnings.
pub fn build_document_with_cancel<F>(
    rows: &[SpecRow],
    layout: &SpecColumnLayout,
    options: &SpecXlsxWriteOptions,
    should_stop: F,
) -> Result<(SpecDocument, SpecXlsxReport), XlsxExportError>
where
    F: Fn() -> bool,
{
    validate_policy_autofit(&options.policy_autofit).map_err(XlsxExportError::Render)?;
    if layout.is_empty() {
        return Err(XlsxExportError::Render(
            "Column layout is empty; nothing to render.".to_string(),
        ));
    }
    if layout.len() > N_NCOLS_EXCEL_MAX {
        return Err(XlsxExportError::Render(format!(
            "Column count {} exceeds Excel limit {N_NCOLS_EXCEL_MAX}.",
            layout.len()
        )));
    }

    let if_has_subtotal = layout.has_summable() && !rows.is_empty();
    let n_rows_sheet = 1 + rows.len() + usize::from(if_has_subtotal);
    if n_rows_sheet > N_NROWS_EXCEL_MAX {
        return Err(XlsxExportError::Render(format!(
            "Row count {n_rows_sheet} exceeds Excel limit {N_NROWS_EXCEL_MAX}."
        )));
    }

    let mut n_cells_truncated = 0usize;
    let l_labels: Vec<String> = layout
        .columns()
        .iter()
        .map(|col| match truncate_cell_text(&col.label) {
            Some(label_cut) => {
                n_cells_truncated += 1;
                label_cut
            }
            None => col.label.clone(),
        })
        .collect();

    let policy_autofit = &options.policy_autofit;
    let l_width_by_col_header: Vec<usize> = l_labels
        .iter()
        .map(|label| derive_header_width(label, policy_autofit))
        .collect();

    let set_layout_keys: HashSet<&str> = layout.columns().iter().map(|c| c.key.as_str()).collect();
    let mut l_width_by_col_body = vec![0usize; layout.len()];
    let mut l_rows_doc = Vec::with_capacity(rows.len());
    let mut n_rows_with_extra_keys = 0usize;

    for row in rows {
        if should_stop() {
            return Err(XlsxExportError::Render("Render cancelled.".to_string()));
        }
        if row.keys().any(|key| !set_layout_keys.contains(key)) {
            n_rows_with_extra_keys += 1;
        }

        let l_values: Vec<EnumCellValue> = layout
            .columns()
            .iter()
            .enumerate()
            .map(|(n_idx_col, col)| {
                let value = row.get(&col.key).unwrap_or(&EnumCellValue::None);
                let value = match convert_cell_value(value, col.summable, &options.value_policy) {
                    EnumCellValue::String(text) => match truncate_cell_text(&text) {
                        Some(text_cut) => {
                            n_cells_truncated += 1;
                            EnumCellValue::String(text_cut)
                        }
                        None => EnumCellValue::String(text),
                    },
                    other => other,
                };
                l_width_by_col_body[n_idx_col] =
                    usize::max(l_width_by_col_body[n_idx_col], value.display_len());
                value
            })
            .collect();
        l_rows_doc.push(l_values);
    }

    let n_row_data_first = 1;
    let n_row_data_last = rows.len();

    let mut l_columns_doc = Vec::with_capacity(layout.len());
    for (n_idx_col, col) in layout.columns().iter().enumerate() {
        let formula = if if_has_subtotal && col.summable {
            Some(derive_subtotal_formula(
                n_idx_col,
                n_row_data_first,
                n_row_data_last,
            ))
        } else {
            None
        };
        l_columns_doc.push(SpecDocumentColumn {
            key: col.key.clone(),
            label: l_labels[n_idx_col].clone(),
            summable: col.summable,
            width_header: l_width_by_col_header[n_idx_col],
            width: derive_final_width(
                l_width_by_col_header[n_idx_col],
                l_width_by_col_body[n_idx_col],
                policy_autofit,
            ),
            formula,
        });
    }

    let subtotal = if if_has_subtotal {
        Some(
            l_columns_doc
                .iter()
                .enumerate()
                .map(|(n_idx_col, col)| match &col.formula {
                    Some(formula) => EnumSubtotalCell::Formula {
                        formula: formula.clone(),
                        cached: l_rows_doc
                            .iter()
                            .filter_map(|row| row[n_idx_col].as_number())
                            .sum(),
                    },
                    None => EnumSubtotalCell::Empty,
                })
                .collect(),
        )
    } else {
        None
    };

    let mut report = SpecXlsxReport {
        n_rows: l_rows_doc.len(),
        n_cols: l_columns_doc.len(),
        warnings: vec![],
    };
    if n_rows_with_extra_keys > 0 {
        report.warn(format!(
            "{n_rows_with_extra_keys} of {} rows carry keys outside the column layout; ignored.",
            rows.len()
        ));
    }
    if n_cells_truncated > 0 {
        report.warn(format!(
            "{n_cells_truncated} cells exceed Excel's {N_LEN_EXCEL_CELL_TEXT_MAX}-character limit; truncated."
        ));
    }

    let doc = SpecDocument {
        sheet_name: sanitize_sheet_name(&options.sheet_name, "_"),
        autofilter: SpecCellRange {
            row_first: 0,
            col_first: 0,
            row_last: 0,
            col_last: l_columns_doc.len() - 1,
        },
        columns: l_columns_doc,
        rows: l_rows_doc,
        subtotal,
        fmt_header: options.fmt_header.clone(),
        fmt_subtotal: options.fmt_subtotal.clone(),
        if_freeze_header: options.if_freeze_header,
    };
    Ok((doc, report))
}

/// `max(len(label) + padding, min)`.
pub fn derive_header_width(label: &str, policy_autofit: &SpecAutofitCellsPolicy) -> usize {
    usize::max(
        label.chars().count() + policy_autofit.width_header_padding,
        policy_autofit.width_cell_min,
    )
}

/// `min(max(header, body), max) + padding`.
pub fn derive_final_width(
    width_header: usize,
    width_body: usize,
    policy_autofit: &SpecAutofitCellsPolicy,
) -> usize {
    usize::min(
        usize::max(width_header, width_body),
        policy_autofit.width_cell_max,
    ) + policy_autofit.width_cell_padding
}

/// `SUBTOTAL(9,<col><first>:<col><last>)` over zero-based data row indices.
pub fn derive_subtotal_formula(col_idx: usize, row_idx_first: usize, row_idx_last: usize) -> String {
    format!(
        "SUBTOTAL({N_SUBTOTAL_FUNCTION_SUM},{}:{})",
        derive_cell_reference(row_idx_first, col_idx),
        derive_cell_reference(row_idx_last, col_idx)
    )
}

fn validate_policy_autofit(policy_autofit: &SpecAutofitCellsPolicy) -> Result<(), String> {
    if policy_autofit.width_cell_min == 0 {
        return Err("policy_autofit.width_cell_min must be >= 1.".to_string());
    }
    if policy_autofit.width_cell_max < policy_autofit.width_cell_min {
        return Err(
            "policy_autofit.width_cell_max must be >= policy_autofit.width_cell_min.".to_string(),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::spec::SpecColumn;

    fn row(l_cells: &[(&str, EnumCellValue)]) -> SpecRow {
        l_cells
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    fn num(n: f64) -> EnumCellValue {
        EnumCellValue::Number(n)
    }

    fn text(s: &str) -> EnumCellValue {
        EnumCellValue::String(s.to_string())
    }

    #[test]
    fn test_rows_follow_layout_order_and_missing_keys_are_empty() {
        let layout = SpecColumnLayout::new(vec![
            SpecColumn::new("name", "Name"),
            SpecColumn::new("age", "Age"),
        ])
        .unwrap();
        let rows = vec![
            row(&[("age", num(30.0)), ("name", text("Ann"))]),
            row(&[("name", text("Bob")), ("extra", text("ignored"))]),
        ];

        let (doc, report) =
            build_document_with_cancel(&rows, &layout, &SpecXlsxWriteOptions::default(), || {
                false
            })
            .unwrap();

        assert_eq!(
            doc.rows,
            vec![
                vec![text("Ann"), num(30.0)],
                vec![text("Bob"), EnumCellValue::None]
            ]
        );
        assert!(doc.subtotal.is_none());
        assert_eq!(report.n_rows, 2);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_subtotal_formula_covers_exactly_the_data_rows() {
        let layout = SpecColumnLayout::new(vec![
            SpecColumn::new("a", "A").summable(),
            SpecColumn::new("b", "B"),
        ])
        .unwrap();
        let rows = vec![
            row(&[("a", num(1.0)), ("b", text("x"))]),
            row(&[("a", num(2.0)), ("b", text("y"))]),
            row(&[("a", num(3.5)), ("b", text("z"))]),
        ];

        let doc = build_document(&rows, &layout, &SpecXlsxWriteOptions::default()).unwrap();

        assert_eq!(
            doc.subtotal,
            Some(vec![
                EnumSubtotalCell::Formula {
                    formula: "SUBTOTAL(9,A2:A4)".to_string(),
                    cached: 6.5,
                },
                EnumSubtotalCell::Empty,
            ])
        );
        assert_eq!(doc.subtotal_row_idx(), Some(4));
        assert_eq!(doc.columns[0].formula.as_deref(), Some("SUBTOTAL(9,A2:A4)"));
        assert_eq!(doc.columns[1].formula, None);
    }

    #[test]
    fn test_subtotal_formula_addresses_columns_past_z() {
        let l_columns: Vec<SpecColumn> = (0..28)
            .map(|n_idx| {
                let col = SpecColumn::new(format!("c{n_idx}"), format!("C{n_idx}"));
                if n_idx == 27 { col.summable() } else { col }
            })
            .collect();
        let layout = SpecColumnLayout::new(l_columns).unwrap();
        let rows = vec![row(&[("c27", num(4.0))]), row(&[("c27", num(5.0))])];

        let doc = build_document(&rows, &layout, &SpecXlsxWriteOptions::default()).unwrap();

        assert_eq!(doc.columns[27].formula.as_deref(), Some("SUBTOTAL(9,AB2:AB3)"));
        assert_eq!(doc.autofilter.col_last, 27);
    }

    #[test]
    fn test_width_is_capped_then_padded() {
        let layout = SpecColumnLayout::new(vec![
            SpecColumn::new("long", "Long"),
            SpecColumn::new("abc", "Abc"),
            SpecColumn::new("mid", "Mid"),
        ])
        .unwrap();
        let rows = vec![row(&[
            ("long", text(&"x".repeat(250))),
            ("mid", text(&"y".repeat(15))),
        ])];

        let doc = build_document(&rows, &layout, &SpecXlsxWriteOptions::default()).unwrap();

        assert_eq!(doc.columns[0].width, 102);
        assert_eq!(doc.columns[1].width_header, 10);
        assert_eq!(doc.columns[1].width, 12);
        assert_eq!(doc.columns[2].width, 17);
    }

    #[test]
    fn test_header_width_uses_label_length() {
        let policy = SpecAutofitCellsPolicy::default();
        assert_eq!(derive_header_width("abc", &policy), 10);
        assert_eq!(derive_header_width("A much longer label", &policy), 21);
    }

    #[test]
    fn test_empty_layout_is_a_render_error() {
        let rows = vec![row(&[("a", num(1.0))])];
        let result = build_document(
            &rows,
            &SpecColumnLayout::default(),
            &SpecXlsxWriteOptions::default(),
        );
        assert!(matches!(result, Err(XlsxExportError::Render(_))));
    }

    #[test]
    fn test_no_data_rows_means_no_subtotal_row() {
        let layout = SpecColumnLayout::new(vec![SpecColumn::new("a", "A").summable()]).unwrap();
        let doc = build_document(&[], &layout, &SpecXlsxWriteOptions::default()).unwrap();
        assert!(doc.subtotal.is_none());
        assert!(doc.columns[0].formula.is_none());
    }

    #[test]
    fn test_build_is_deterministic() {
        let layout = SpecColumnLayout::new(vec![
            SpecColumn::new("a", "A").summable(),
            SpecColumn::new("b", "B"),
        ])
        .unwrap();
        let rows = vec![
            row(&[("a", num(1.0)), ("b", text("x"))]),
            row(&[("b", text("only b"))]),
        ];
        let options = SpecXlsxWriteOptions::default();

        assert_eq!(
            build_document(&rows, &layout, &options).unwrap(),
            build_document(&rows, &layout, &options).unwrap()
        );
    }

    #[test]
    fn test_cancel_predicate_stops_the_build() {
        let layout = SpecColumnLayout::new(vec![SpecColumn::new("a", "A")]).unwrap();
        let rows = vec![row(&[("a", num(1.0))]); 5];
        let n_polls = Cell::new(0);

        let result = build_document_with_cancel(&rows, &layout, &SpecXlsxWriteOptions::default(), || {
            n_polls.set(n_polls.get() + 1);
            n_polls.get() > 2
        });

        assert!(matches!(result, Err(XlsxExportError::Render(msg)) if msg.contains("cancelled")));
        assert_eq!(n_polls.get(), 3);
    }

    #[test]
    fn test_overlong_text_is_truncated_with_a_warning() {
        let layout = SpecColumnLayout::new(vec![
            SpecColumn::new("note", "Note"),
            SpecColumn::new("id", "Id"),
        ])
        .unwrap();
        let rows = vec![
            row(&[("note", text(&"x".repeat(40_000))), ("id", num(1.0))]),
            row(&[("note", text("short")), ("id", num(2.0))]),
        ];

        let (doc, report) =
            build_document_with_cancel(&rows, &layout, &SpecXlsxWriteOptions::default(), || {
                false
            })
            .unwrap();

        assert_eq!(doc.rows[0][0], text(&"x".repeat(32_767)));
        assert_eq!(doc.rows[1][0], text("short"));
        assert_eq!(doc.columns[0].width, 102);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("truncated"));
    }

    #[test]
    fn test_numeric_text_coercion_feeds_the_cached_subtotal() {
        let layout = SpecColumnLayout::new(vec![SpecColumn::new("a", "A").summable()]).unwrap();
        let rows = vec![row(&[("a", text("2"))]), row(&[("a", num(3.0))])];
        let mut options = SpecXlsxWriteOptions::default();
        options.value_policy.if_coerce_numeric_text = true;

        let doc = build_document(&rows, &layout, &options).unwrap();

        assert_eq!(doc.rows[0][0], num(2.0));
        assert!(matches!(
            doc.subtotal.as_deref(),
            Some([EnumSubtotalCell::Formula { cached, .. }]) if *cached == 5.0
        ));
    }
}
