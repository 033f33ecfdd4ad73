//! `POST /download-excel` request handling, independent of the HTTP framework.

use gridkit_io_xlsx::{RenderDispatcher, XlsxExportError, parse_rows, resolve_column_layout};
use serde_json::Value;
use tracing::{error, info, warn};

pub const C_CONTENT_TYPE_XLSX: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const C_CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";
pub const C_CONTENT_DISPOSITION_XLSX: &str = "attachment; filename=\"data.xlsx\"";
/// Client-facing body for every 500; details stay in the logs.
pub const C_MSG_RENDER_FAILED: &str = "Failed to generate Excel file";

/// Status, headers and body of one handled request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecHttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl SpecHttpResponse {
    fn text(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), C_CONTENT_TYPE_TEXT.to_string())],
            body: message.into().into_bytes(),
        }
    }

    fn xlsx(bytes: Vec<u8>) -> Self {
        Self {
            status: 200,
            headers: vec![
                ("Content-Type".to_string(), C_CONTENT_TYPE_XLSX.to_string()),
                (
                    "Content-Disposition".to_string(),
                    C_CONTENT_DISPOSITION_XLSX.to_string(),
                ),
            ],
            body: bytes,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Handle a raw request body: parse JSON, then delegate to [`handle_download_request`].
pub async fn handle_download_bytes(dispatcher: &RenderDispatcher, raw: &[u8]) -> SpecHttpResponse {
    match serde_json::from_slice::<Value>(raw) {
        Ok(body) => handle_download_request(dispatcher, &body).await,
        Err(e) => derive_error_response(&XlsxExportError::InvalidInput(format!(
            "request body is not valid JSON ({e})"
        ))),
    }
}

/// Handle a parsed request body `{ "data": [...], "config": [...]? }`.
///
/// Every outcome maps to exactly one response; nothing propagates further.
pub async fn handle_download_request(
    dispatcher: &RenderDispatcher,
    body: &Value,
) -> SpecHttpResponse {
    match derive_xlsx_payload(dispatcher, body).await {
        Ok(bytes) => {
            info!(n_bytes = bytes.len(), "Excel file generated");
            SpecHttpResponse::xlsx(bytes)
        }
        Err(e) => derive_error_response(&e),
    }
}

async fn derive_xlsx_payload(
    dispatcher: &RenderDispatcher,
    body: &Value,
) -> Result<Vec<u8>, XlsxExportError> {
    if !body.is_object() {
        return Err(XlsxExportError::InvalidInput(
            "request body must be a JSON object".to_string(),
        ));
    }
    let rows = parse_rows(body.get("data").unwrap_or(&Value::Null))?;
    let layout = resolve_column_layout(&rows, body.get("config"))?;
    info!(
        n_rows = rows.len(),
        n_cols = layout.len(),
        "Rendering Excel file"
    );
    dispatcher.render_async(rows, layout).await
}

fn derive_error_response(err: &XlsxExportError) -> SpecHttpResponse {
    let status = err.http_status();
    match err {
        XlsxExportError::InvalidInput(_) => {
            warn!(error = %err, "Rejected request");
            SpecHttpResponse::text(status, err.to_string())
        }
        XlsxExportError::Render(_) => {
            error!(error = %err, "Error generating Excel file");
            SpecHttpResponse::text(status, C_MSG_RENDER_FAILED)
        }
        XlsxExportError::WorkerCrash { code, detail } => {
            error!(code = *code, detail = %detail, "Render worker crashed");
            SpecHttpResponse::text(status, C_MSG_RENDER_FAILED)
        }
    }
}
