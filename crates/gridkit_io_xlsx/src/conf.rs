//! XLSX constants and default preset factories.

use crate::spec::SpecCellFormat;

/// Excel worksheet maximum row count.
pub const N_NROWS_EXCEL_MAX: usize = 1_048_576;
/// Excel worksheet maximum column count.
pub const N_NCOLS_EXCEL_MAX: usize = 16_384;
/// Excel cell text maximum length in characters.
pub const N_LEN_EXCEL_CELL_TEXT_MAX: usize = 32_767;
/// Excel sheet name maximum length.
pub const N_LEN_EXCEL_SHEET_NAME_MAX: usize = 31;
/// Characters not allowed in sheet names.
pub const TUP_EXCEL_ILLEGAL: [&str; 7] = ["*", ":", "?", "/", "\\", "[", "]"];

/// Default worksheet name.
pub const C_SHEET_NAME_DEFAULT: &str = "Data";

/// Lower bound of the header-derived column width.
pub const N_WIDTH_COLUMN_MIN: usize = 10;
/// Cap applied to the inferred width before padding.
pub const N_WIDTH_COLUMN_MAX: usize = 100;
/// Padding added to the header label length.
pub const N_WIDTH_HEADER_PADDING: usize = 2;
/// Padding added after the cap.
pub const N_WIDTH_COLUMN_PADDING: usize = 2;

/// `SUBTOTAL` function number for SUM that skips filter-hidden rows.
pub const N_SUBTOTAL_FUNCTION_SUM: u8 = 9;

/// Header fill (light green).
pub const C_COLOR_HEADER_FILL: &str = "#CCFFCC";
/// Subtotal fill (yellow).
pub const C_COLOR_SUBTOTAL_FILL: &str = "#FFCC00";

/// Build the header row format: bold, centered, light-green fill.
pub fn derive_default_header_format() -> SpecCellFormat {
    SpecCellFormat {
        bold: Some(true),
        align: Some("center".to_string()),
        valign: Some("vcenter".to_string()),
        bg_color: Some(C_COLOR_HEADER_FILL.to_string()),
        ..Default::default()
    }
}

/// Build the subtotal row format: header style with a yellow fill.
pub fn derive_default_subtotal_format() -> SpecCellFormat {
    derive_default_header_format().with_(SpecCellFormat {
        bg_color: Some(C_COLOR_SUBTOTAL_FILL.to_string()),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_and_subtotal_fills_differ() {
        let fmt_header = derive_default_header_format();
        let fmt_subtotal = derive_default_subtotal_format();

        assert_eq!(fmt_subtotal.bold, Some(true));
        assert_eq!(fmt_subtotal.align.as_deref(), Some("center"));
        assert_ne!(fmt_header.bg_color, fmt_subtotal.bg_color);
    }
}
