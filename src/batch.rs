//! Batch coordination: convert and upload every file of a request.
//!
//! Each [`ConversionRequest`] becomes one tokio task. Decode/encode work is
//! CPU-bound and runs on a dedicated rayon pool sized by
//! [`effective_threads`]; uploads are I/O-bound and stay on the async
//! runtime, bounded separately by the [`Uploader`].
//!
//! ```text
//! requests ──spawn──▶ task i ──pool──▶ convert ──▶ upload ──▶ slot[i]
//! ```
//!
//! ## Failure isolation
//!
//! Every task produces exactly one [`ConversionOutcome`] in its own slot. A
//! file that fails to decode, targets an unsupported format, is refused by
//! the store, or panics the backend is recorded as a `Failure` for that
//! index; its siblings carry on. The batch as a whole only fails when it is
//! cancelled.
//!
//! ## Resource bounds
//!
//! - CPU: rayon pool of `effective_threads` workers.
//! - Memory: at most `max_in_flight` files between "conversion started" and
//!   "upload finished".
//! - Network: at most `max_concurrent_uploads` puts at once.
//!
//! ## Cancellation
//!
//! Cancelling the token aborts every outstanding task; queued pool jobs see
//! the token and skip their work. Objects already written stay written.

use crate::config::{AppConfig, effective_in_flight, effective_threads};
use crate::imaging::{ConvertError, EncodeSettings, ImageBackend, convert_image};
use crate::storage::{StoreError, Uploader};
use crate::types::{BatchResult, ConversionOutcome, ConversionRequest, ErrorKind};
use bytes::Bytes;
use futures::FutureExt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Semaphore, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("batch cancelled")]
    Cancelled,
    #[error("failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Why a single file failed.
#[derive(Error, Debug)]
enum FileError {
    #[error(transparent)]
    Convert(#[from] ConvertError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FileError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Convert(e) => e.kind(),
            Self::Store(e) => e.kind(),
        }
    }
}

/// Worker pool sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    pub threads: usize,
    pub in_flight: usize,
}

/// Runs batches. Cheap to clone; clones share the pool and limits.
#[derive(Clone)]
pub struct Coordinator {
    backend: Arc<dyn ImageBackend>,
    uploader: Uploader,
    pool: Arc<rayon::ThreadPool>,
    in_flight: Arc<Semaphore>,
    settings: Arc<EncodeSettings>,
}

impl Coordinator {
    pub fn new(
        backend: Arc<dyn ImageBackend>,
        uploader: Uploader,
        settings: EncodeSettings,
        limits: PoolLimits,
    ) -> Result<Self, BatchError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(limits.threads.max(1))
            .thread_name(|i| format!("convert-{i}"))
            .panic_handler(|_| error!("image worker panicked outside a conversion"))
            .build()?;

        Ok(Self {
            backend,
            uploader,
            pool: Arc::new(pool),
            in_flight: Arc::new(Semaphore::new(limits.in_flight.max(1))),
            settings: Arc::new(settings),
        })
    }

    /// Build from the `[processing]` and `[images]` config sections.
    pub fn from_config(
        config: &AppConfig,
        backend: Arc<dyn ImageBackend>,
        uploader: Uploader,
    ) -> Result<Self, BatchError> {
        let limits = PoolLimits {
            threads: effective_threads(&config.processing),
            in_flight: effective_in_flight(&config.processing),
        };
        info!(
            threads = limits.threads,
            in_flight = limits.in_flight,
            "conversion pool ready"
        );
        Self::new(backend, uploader, config.encode_settings(), limits)
    }

    /// Convert and upload every request, returning one outcome per request
    /// in input order.
    #[instrument(skip_all, fields(files = requests.len()))]
    pub async fn run(
        &self,
        requests: Vec<ConversionRequest>,
        cancel: CancellationToken,
    ) -> Result<BatchResult, BatchError> {
        let names: Vec<String> = requests
            .iter()
            .map(|r| r.file.original_name.clone())
            .collect();
        let mut slots: Vec<Option<ConversionOutcome>> = vec![None; requests.len()];

        let mut tasks = JoinSet::new();
        for (index, request) in requests.into_iter().enumerate() {
            let worker = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let name = request.file.original_name.clone();
                let outcome = AssertUnwindSafe(worker.process(request, cancel))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        ConversionOutcome::failure(name, ErrorKind::InternalError, "task panicked")
                    });
                (index, outcome)
            });
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    warn!(pending = tasks.len(), "batch cancelled");
                    return Err(BatchError::Cancelled);
                }
                joined = tasks.join_next() => match joined {
                    Some(Ok((index, outcome))) => slots[index] = Some(outcome),
                    Some(Err(e)) => error!(error = %e, "conversion task did not complete"),
                    None => break,
                },
            }
        }

        let outcomes: Vec<ConversionOutcome> = slots
            .into_iter()
            .zip(names)
            .map(|(slot, name)| {
                slot.unwrap_or_else(|| {
                    ConversionOutcome::failure(name, ErrorKind::InternalError, "no outcome recorded")
                })
            })
            .collect();

        let result = BatchResult { outcomes };
        info!(
            succeeded = result.succeeded(),
            failed = result.len() - result.succeeded(),
            "batch complete"
        );
        Ok(result)
    }

    #[instrument(
        skip_all,
        fields(file = %request.file.original_name, key = %request.output_key)
    )]
    async fn process(
        self,
        request: ConversionRequest,
        cancel: CancellationToken,
    ) -> ConversionOutcome {
        let name = request.file.original_name.clone();
        match self.convert_and_upload(request, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let kind = e.kind();
                warn!(error_kind = %kind, error = %e, "file failed");
                ConversionOutcome::failure(name, kind, e.to_string())
            }
        }
    }

    async fn convert_and_upload(
        &self,
        request: ConversionRequest,
        cancel: CancellationToken,
    ) -> Result<ConversionOutcome, FileError> {
        let _permit = self
            .in_flight
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ConvertError::Internal("in-flight limiter closed".into()))?;

        let ConversionRequest {
            file,
            spec,
            output_key,
        } = request;

        let backend = Arc::clone(&self.backend);
        let settings = Arc::clone(&self.settings);
        let (tx, rx) = oneshot::channel();
        self.pool.spawn(move || {
            if cancel.is_cancelled() {
                return;
            }
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                convert_image(backend.as_ref(), &file.bytes, &spec, &settings)
            }))
            .unwrap_or_else(|_| Err(ConvertError::Internal("image backend panicked".into())));
            let _ = tx.send(result);
        });

        let converted = rx
            .await
            .map_err(|_| ConvertError::Internal("conversion abandoned".into()))??;

        let format = converted.format;
        let stored = self
            .uploader
            .upload(&output_key, Bytes::from(converted.bytes), format)
            .await?;

        Ok(ConversionOutcome::Success {
            output_key,
            output_format: format,
            encoded_byte_size: stored.bytes_transferred,
            object_url: stored.url,
        })
    }
}
