//! Scans pending records and runs the pipeline over them

use crate::{
    error::{BlastError, Result},
    pipeline::MattingPipeline,
    store::RecordStore,
    types::{ImageRecord, RecordId},
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Outcome of one pass over the pending records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub attempted: usize,
    pub succeeded: Vec<RecordId>,
    pub failed: Vec<(RecordId, String)>,
}

impl PassReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Progress of a pass, reported once per record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassProgress {
    /// The pending scan finished
    Scanned { total: usize },
    /// A record was attempted; `index` counts from 1
    Finished {
        index: usize,
        total: usize,
        id: RecordId,
        succeeded: bool,
    },
}

/// Applies the pipeline to every pending record
///
/// Passes take a single snapshot of the pending list and walk it in order.
/// A failed record is left pending and picked up by a later pass.
#[derive(Clone)]
pub struct PendingWorker {
    pipeline: Arc<MattingPipeline>,
    store: Arc<dyn RecordStore>,
}

impl std::fmt::Debug for PendingWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingWorker")
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl PendingWorker {
    #[must_use]
    pub fn new(pipeline: Arc<MattingPipeline>, store: Arc<dyn RecordStore>) -> Self {
        Self { pipeline, store }
    }

    /// Run one pass over the pending records, most recent first
    ///
    /// # Errors
    /// - `Store` when the pending scan fails; per-record failures are
    ///   reported in the [`PassReport`] instead
    pub async fn process_pending(&self) -> Result<PassReport> {
        self.process_pending_with_progress(|_| {}).await
    }

    /// Like [`Self::process_pending`], calling `progress` as the pass advances
    ///
    /// # Errors
    /// - `Store` when the pending scan fails
    #[instrument(skip(self, progress))]
    pub async fn process_pending_with_progress<F>(&self, mut progress: F) -> Result<PassReport>
    where
        F: FnMut(PassProgress) + Send,
    {
        let pending = self.store.pending_most_recent_first()?;
        let total = pending.len();
        progress(PassProgress::Scanned { total });

        let mut report = PassReport {
            attempted: total,
            ..PassReport::default()
        };
        if total == 0 {
            debug!("No pending records");
            return Ok(report);
        }
        info!(total, "Processing pending records");

        for (index, record) in pending.into_iter().enumerate() {
            let id = record.id;
            let outcome = self.process_record(record).await;
            let succeeded = outcome.is_ok();

            match outcome {
                Ok(()) => report.succeeded.push(id),
                Err(e) => {
                    if e.is_per_image() {
                        warn!(id, error = %e, "Record left pending");
                    } else {
                        error!(id, error = %e, "Record left pending after a provider or store failure");
                    }
                    report.failed.push((id, e.to_string()));
                },
            }
            progress(PassProgress::Finished {
                index: index + 1,
                total,
                id,
                succeeded,
            });
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Pass complete"
        );
        Ok(report)
    }

    async fn process_record(&self, record: ImageRecord) -> Result<()> {
        let pipeline = Arc::clone(&self.pipeline);
        let ImageRecord { id, source, .. } = record;

        let result = tokio::task::spawn_blocking(move || pipeline.remove_background(&source))
            .await
            .map_err(|e| BlastError::internal(format!("Pipeline task for record {id} failed: {e}")))??;

        debug!(id, timings = %result.timings.summary(), "Storing processed image");
        self.store.set_processed(id, result.file)
    }

    /// Run passes every `interval` until `shutdown` resolves
    ///
    /// A failed scan is logged and retried on the next tick. A pass in
    /// progress finishes before shutdown is observed.
    pub async fn poll<S>(&self, interval: Duration, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Stopping pending-work polling");
                    break;
                },
                _ = ticker.tick() => {
                    if let Err(e) = self.process_pending().await {
                        warn!(error = %e, "Pending scan failed");
                    }
                },
            }
        }
    }
}
