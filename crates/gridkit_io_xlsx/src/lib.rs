//! `gridkit_io_xlsx` v1:
//! JSON records -> styled single-sheet XLSX kernel.
//!
//! Modules:
//! - `conf`     : constants and default presets
//! - `spec`     : specs/models/options
//! - `error`    : request-terminal error taxonomy
//! - `util`     : pure helper functions
//! - `layout`   : column layout resolution
//! - `builder`  : document model construction
//! - `writer`   : sheet sink + `rust_xlsxwriter` backend
//! - `dispatch` : off-runtime render execution
pub mod builder;
pub mod conf;
pub mod dispatch;
pub mod error;
pub mod layout;
pub mod spec;
pub mod util;
pub mod writer;

pub use builder::{build_document, build_document_with_cancel};
pub use conf::{
    N_LEN_EXCEL_CELL_TEXT_MAX, N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX,
    TUP_EXCEL_ILLEGAL,
};
pub use dispatch::{CancelFlag, EnumDispatchPolicy, RenderDispatcher, SpecDispatchOptions};
pub use error::XlsxExportError;
pub use layout::{parse_rows, resolve_column_layout};
pub use spec::{
    EnumCellValue, EnumSubtotalCell, SpecAutofitCellsPolicy, SpecCellFormat, SpecCellRange,
    SpecColumn, SpecColumnLayout, SpecDocument, SpecDocumentColumn, SpecRow, SpecSheetColumn,
    SpecXlsxReport, SpecXlsxValuePolicy, SpecXlsxWriteOptions,
};
pub use util::{column_index_to_letter, sanitize_sheet_name};
pub use writer::{
    SheetSink, XlsxSheetSink, render_document_to_xlsx_bytes, validate_sheet_name, write_document,
};
