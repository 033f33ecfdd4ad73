//! Server configuration (CLI flags with environment fallbacks).

use std::time::Duration;

use clap::{Parser, ValueEnum};
use gridkit_io_xlsx::conf::C_SHEET_NAME_DEFAULT;
use gridkit_io_xlsx::dispatch::N_SECS_RENDER_TIMEOUT_DEFAULT;
use gridkit_io_xlsx::{
    EnumDispatchPolicy, SpecDispatchOptions, SpecXlsxWriteOptions, validate_sheet_name,
};

/// Default listening port.
pub const N_PORT_DEFAULT: u16 = 3000;
/// Default request body limit (10 MiB).
pub const N_BODY_LIMIT_BYTES_DEFAULT: usize = 10 * 1024 * 1024;

/// Render thread policy as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EnumDispatchPolicyArg {
    /// One fresh thread per request.
    OneShot,
    /// Fixed pool of reusable threads.
    Pooled,
}

/// HTTP service turning JSON records into XLSX downloads.
#[derive(Debug, Clone, Parser)]
#[command(name = "gridkit-server", version, about)]
pub struct SpecServerConfig {
    /// Interface to bind.
    #[arg(long, env = "GRIDKIT_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind.
    #[arg(long, env = "GRIDKIT_PORT", default_value_t = N_PORT_DEFAULT)]
    pub port: u16,

    /// Maximum accepted request body in bytes.
    #[arg(long, env = "GRIDKIT_BODY_LIMIT_BYTES", default_value_t = N_BODY_LIMIT_BYTES_DEFAULT)]
    pub body_limit_bytes: usize,

    /// Per-render timeout in seconds; 0 disables the timeout.
    #[arg(long, env = "GRIDKIT_RENDER_TIMEOUT_SECS", default_value_t = N_SECS_RENDER_TIMEOUT_DEFAULT)]
    pub render_timeout_secs: u64,

    /// Render thread policy.
    #[arg(long, env = "GRIDKIT_DISPATCH_POLICY", value_enum, default_value_t = EnumDispatchPolicyArg::OneShot)]
    pub dispatch_policy: EnumDispatchPolicyArg,

    /// Pool size for `--dispatch-policy pooled` (defaults to CPU count, at most 8).
    #[arg(long, env = "GRIDKIT_POOL_WORKERS")]
    pub pool_workers: Option<usize>,

    /// Worksheet name of generated files.
    #[arg(long, env = "GRIDKIT_SHEET_NAME", default_value = C_SHEET_NAME_DEFAULT)]
    pub sheet_name: String,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long, env = "GRIDKIT_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl SpecServerConfig {
    /// `host:port` bind address.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject settings that would make every render fail.
    pub fn validate(&self) -> Result<(), String> {
        validate_sheet_name(&self.sheet_name)
            .map(|_| ())
            .map_err(|e| format!("invalid --sheet-name {:?}: {e}", self.sheet_name))
    }

    /// Dispatcher options derived from the flags.
    pub fn derive_dispatch_options(&self) -> SpecDispatchOptions {
        let policy = match self.dispatch_policy {
            EnumDispatchPolicyArg::OneShot => EnumDispatchPolicy::OneShot,
            EnumDispatchPolicyArg::Pooled => EnumDispatchPolicy::Pooled {
                n_workers: self.pool_workers,
            },
        };
        let render_timeout = match self.render_timeout_secs {
            0 => None,
            n_secs => Some(Duration::from_secs(n_secs)),
        };

        SpecDispatchOptions {
            policy,
            render_timeout,
            write_options: SpecXlsxWriteOptions {
                sheet_name: self.sheet_name.clone(),
                ..Default::default()
            },
        }
    }
}
