//! Off-runtime render execution.
//!
//! Every render runs on an OS thread outside the async runtime and replies
//! over a `oneshot` channel. A reply of `Err(message)` is an explicit
//! failure; a dropped sender (the worker panicked) is a crash. Each call
//! resolves exactly once.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tokio::sync::{Semaphore, oneshot};
use tracing::{debug, error, warn};

use crate::builder::build_document_with_cancel;
use crate::error::{N_EXIT_CODE_PANIC, N_EXIT_CODE_TIMEOUT, XlsxExportError};
use crate::spec::{SpecColumnLayout, SpecRow, SpecXlsxWriteOptions};
use crate::util::calculate_worker_limit;
use crate::writer::render_document_to_xlsx_bytes;

/// Default render timeout.
pub const N_SECS_RENDER_TIMEOUT_DEFAULT: u64 = 30;

////////////////////////////////////////////////////////////////////////////////
// #region DispatchOptions

/// How render jobs are mapped onto threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumDispatchPolicy {
    /// Fresh named thread per render.
    #[default]
    OneShot,
    /// Fixed pool of reusable threads, FIFO admission.
    Pooled {
        /// Pool size; `None` resolves via [`calculate_worker_limit`].
        n_workers: Option<usize>,
    },
}

/// Dispatcher options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecDispatchOptions {
    /// Thread policy.
    pub policy: EnumDispatchPolicy,
    /// Per-render timeout; `None` waits indefinitely.
    pub render_timeout: Option<Duration>,
    /// Options passed to the document builder.
    pub write_options: SpecXlsxWriteOptions,
}

impl Default for SpecDispatchOptions {
    fn default() -> Self {
        Self {
            policy: EnumDispatchPolicy::OneShot,
            render_timeout: Some(Duration::from_secs(N_SECS_RENDER_TIMEOUT_DEFAULT)),
            write_options: SpecXlsxWriteOptions::default(),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CancelFlag

/// Cooperative cancellation flag shared with one render job.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Ask the job to stop.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether the job was asked to stop.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Sets the flag when dropped, so a caller that stops awaiting (client
/// disconnect, aborted task) also stops its job.
struct CancelOnDrop(CancelFlag);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Dispatcher

enum EnumExecutor {
    OneShot,
    Pooled {
        thread_pool: ThreadPool,
        admission: Arc<Semaphore>,
    },
}

/// Runs render jobs off the async runtime.
pub struct RenderDispatcher {
    options: SpecDispatchOptions,
    executor: EnumExecutor,
    n_jobs_dispatched: AtomicU64,
}

impl RenderDispatcher {
    /// Create a dispatcher.
    ///
    /// If the pool cannot be built the dispatcher falls back to one-shot
    /// threads with a warning.
    pub fn new(options: SpecDispatchOptions) -> Self {
        let executor = match options.policy {
            EnumDispatchPolicy::OneShot => EnumExecutor::OneShot,
            EnumDispatchPolicy::Pooled { n_workers } => {
                let n_workers = calculate_worker_limit(n_workers);
                let thread_pool = ThreadPoolBuilder::new()
                    .num_threads(n_workers)
                    .thread_name(|n_idx| format!("gridkit-render-pool-{n_idx}"))
                    .panic_handler(|payload| {
                        error!(
                            code = N_EXIT_CODE_PANIC,
                            detail = %derive_panic_detail(payload.as_ref()),
                            "render pool worker panicked"
                        );
                    })
                    .build();
                match thread_pool {
                    Ok(thread_pool) => EnumExecutor::Pooled {
                        thread_pool,
                        admission: Arc::new(Semaphore::new(n_workers)),
                    },
                    Err(err) => {
                        warn!(
                            n_workers,
                            error = %err,
                            "failed to initialize render pool; falling back to one-shot threads"
                        );
                        EnumExecutor::OneShot
                    }
                }
            }
        };

        Self {
            options,
            executor,
            n_jobs_dispatched: AtomicU64::new(0),
        }
    }

    /// Whether jobs run on a reusable pool.
    pub fn is_pooled(&self) -> bool {
        matches!(self.executor, EnumExecutor::Pooled { .. })
    }

    /// Build and serialize one document on a worker thread.
    pub async fn render_async(
        &self,
        rows: Vec<SpecRow>,
        layout: SpecColumnLayout,
    ) -> Result<Vec<u8>, XlsxExportError> {
        let write_options = self.options.write_options.clone();
        self.dispatch(move |cancel| render_job(&rows, &layout, &write_options, cancel))
            .await
    }

    /// Run an arbitrary job on a worker thread and await its single reply.
    pub async fn dispatch<F>(&self, job: F) -> Result<Vec<u8>, XlsxExportError>
    where
        F: FnOnce(&CancelFlag) -> Result<Vec<u8>, String> + Send + 'static,
    {
        let n_job = self.n_jobs_dispatched.fetch_add(1, Ordering::Relaxed);
        let cancel = CancelFlag::default();
        let cancel_worker = cancel.clone();
        let _guard_cancel = CancelOnDrop(cancel.clone());
        let (tx, rx) = oneshot::channel::<Result<Vec<u8>, String>>();

        match &self.executor {
            EnumExecutor::OneShot => {
                let handle = std::thread::Builder::new()
                    .name(format!("gridkit-render-{n_job}"))
                    .spawn(move || {
                        // The receiver is gone if the caller already timed out.
                        let _ = tx.send(job(&cancel_worker));
                    })
                    .map_err(|err| {
                        XlsxExportError::Render(format!("Failed to spawn render worker: {err}"))
                    })?;
                self.await_reply(n_job, rx, cancel, Some(handle)).await
            }
            EnumExecutor::Pooled {
                thread_pool,
                admission,
            } => {
                let permit = Arc::clone(admission)
                    .acquire_owned()
                    .await
                    .map_err(|_| XlsxExportError::Render("Render pool is closed.".to_string()))?;
                thread_pool.spawn(move || {
                    let _permit = permit;
                    let _ = tx.send(job(&cancel_worker));
                });
                self.await_reply(n_job, rx, cancel, None).await
            }
        }
    }

    async fn await_reply(
        &self,
        n_job: u64,
        rx: oneshot::Receiver<Result<Vec<u8>, String>>,
        cancel: CancelFlag,
        handle: Option<JoinHandle<()>>,
    ) -> Result<Vec<u8>, XlsxExportError> {
        let reply = match self.options.render_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    cancel.cancel();
                    let detail = format!("render exceeded timeout of {timeout:?}");
                    error!(n_job, code = N_EXIT_CODE_TIMEOUT, %detail, "render worker abandoned");
                    return Err(XlsxExportError::WorkerCrash {
                        code: N_EXIT_CODE_TIMEOUT,
                        detail,
                    });
                }
            },
            None => rx.await,
        };

        match reply {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(msg)) => {
                warn!(n_job, error = %msg, "render worker reported failure");
                Err(XlsxExportError::Render(msg))
            }
            Err(_) => {
                let detail = match handle {
                    Some(handle) => join_crashed_worker(handle).await,
                    None => "worker dropped its reply channel without a result".to_string(),
                };
                error!(n_job, code = N_EXIT_CODE_PANIC, %detail, "render worker terminated abnormally");
                Err(XlsxExportError::WorkerCrash {
                    code: N_EXIT_CODE_PANIC,
                    detail,
                })
            }
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region WorkerSide

fn render_job(
    rows: &[SpecRow],
    layout: &SpecColumnLayout,
    write_options: &SpecXlsxWriteOptions,
    cancel: &CancelFlag,
) -> Result<Vec<u8>, String> {
    let (doc, report) =
        build_document_with_cancel(rows, layout, write_options, || cancel.is_cancelled())
            .map_err(derive_error_message)?;
    for c_warning in &report.warnings {
        warn!(warning = %c_warning, "render warning");
    }
    if cancel.is_cancelled() {
        return Err("Render cancelled.".to_string());
    }

    let bytes = render_document_to_xlsx_bytes(&doc).map_err(derive_error_message)?;
    debug!(
        n_rows = report.n_rows,
        n_cols = report.n_cols,
        n_bytes = bytes.len(),
        "render finished"
    );
    Ok(bytes)
}

fn derive_error_message(err: XlsxExportError) -> String {
    match err {
        XlsxExportError::InvalidInput(msg) | XlsxExportError::Render(msg) => msg,
        other => other.to_string(),
    }
}

async fn join_crashed_worker(handle: JoinHandle<()>) -> String {
    match tokio::task::spawn_blocking(move || handle.join()).await {
        Ok(Err(payload)) => derive_panic_detail(payload.as_ref()),
        Ok(Ok(())) => "worker exited without replying".to_string(),
        Err(err) => format!("failed to join render worker: {err}"),
    }
}

fn derive_panic_detail(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return (*msg).to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
