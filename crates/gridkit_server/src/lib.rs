//! `gridkit_server` v1:
//! HTTP front end for the `gridkit_io_xlsx` kernel.
//!
//! Modules:
//! - `conf`    : CLI/env configuration
//! - `handler` : framework-independent request handling
//! - `app`     : axum router
pub mod app;
pub mod conf;
pub mod handler;

pub use app::build_router;
pub use conf::SpecServerConfig;
pub use handler::{SpecHttpResponse, handle_download_bytes, handle_download_request};
