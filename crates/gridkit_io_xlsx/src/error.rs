//! Request-terminal error taxonomy.

use thiserror::Error;

/// Exit code reported for a worker that panicked (Rust's panic exit status).
pub const N_EXIT_CODE_PANIC: i32 = 101;
/// Exit code reported for a worker abandoned after the render timeout.
pub const N_EXIT_CODE_TIMEOUT: i32 = 124;

/// Errors surfaced to the request handler. None of them is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XlsxExportError {
    /// Request data or column config is empty or malformed.
    #[error("Invalid data: {0}")]
    InvalidInput(String),

    /// Document construction or serialization failed, including an explicit
    /// failure reported by the render worker.
    #[error("Render failed: {0}")]
    Render(String),

    /// The render worker terminated without replying.
    #[error("Render worker terminated abnormally (code {code}): {detail}")]
    WorkerCrash {
        /// Termination code ([`N_EXIT_CODE_PANIC`] or [`N_EXIT_CODE_TIMEOUT`]).
        code: i32,
        /// Panic payload or timeout description.
        detail: String,
    },
}

impl XlsxExportError {
    /// HTTP status the error maps to.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::Render(_) | Self::WorkerCrash { .. } => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(XlsxExportError::InvalidInput("x".into()).http_status(), 400);
        assert_eq!(XlsxExportError::Render("x".into()).http_status(), 500);
        assert_eq!(
            XlsxExportError::WorkerCrash {
                code: N_EXIT_CODE_PANIC,
                detail: "boom".into()
            }
            .http_status(),
            500
        );
    }
}
