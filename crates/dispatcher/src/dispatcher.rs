//! Production dispatch loop.
//!
//! Each cycle the dispatcher reads PENDING jobs, resolves each job's
//! material and color requirement from its product, finds the first idle
//! printer that can serve it, and runs the assignment transaction:
//!
//! 1. claim (job UPLOADING, printer PRINTING, order PRINTING) in one commit,
//! 2. upload the build file, then start the print,
//! 3. on success mark the job PRINTING; on failure fail the job and release
//!    the printer in one commit.
//!
//! Jobs are handled one at a time. Cancellation is observed only at tick
//! boundaries and between jobs, so an assignment that has started always
//! runs to its commit or revert.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use factoryos_core::color::parse_hex;
use factoryos_core::filament::{find_printer_for_job, FilamentMatch};
use factoryos_core::types::DbId;
use factoryos_db::models::job::Job;
use factoryos_db::models::printer::Printer;
use factoryos_db::repositories::ClaimOutcome;
use factoryos_printer::{CommandError, PrinterControl};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::store::DispatchStore;

/// Default time between dispatch cycles.
pub const DEFAULT_DISPATCH_INTERVAL: Duration = Duration::from_secs(10);

/// Attempts at writing a failure revert before it is deferred to the next
/// cycle.
pub const REVERT_ATTEMPTS: u32 = 3;

/// Pause between revert attempts within one cycle.
const REVERT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// A failure revert whose write has not gone through yet.
#[derive(Debug, Clone)]
struct PendingRevert {
    job_id: DbId,
    printer_serial: String,
    reason: String,
}

/// What happened to one matched job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentOutcome {
    /// Uploaded and started; the job is PRINTING.
    Started,
    /// The printer stopped being IDLE before the claim. Job stays PENDING.
    PrinterUnavailable,
    /// The job left PENDING before the claim. Nothing was written.
    JobNotPending,
    /// Execution failed; the job is FAILED with this reason and the printer
    /// is IDLE again.
    Failed(String),
}

/// Errors from the execution phase of an assignment. The display text is
/// persisted as the job's error message.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("missing printer address/credential")]
    MissingConnectionDetails,

    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Tally of one dispatch cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub pending: usize,
    /// Jobs whose product is missing or declares no material.
    pub skipped: usize,
    /// Jobs no idle printer could serve.
    pub unmatched: usize,
    /// Claims that lost to a concurrent state change.
    pub contended: usize,
    pub started: usize,
    pub failed: usize,
}

/// Matches PENDING jobs to idle printers and drives them to PRINTING.
pub struct ProductionDispatcher {
    store: Arc<dyn DispatchStore>,
    printers: Arc<dyn PrinterControl>,
    interval: Duration,
    /// Reverts that failed every attempt; retried first thing each cycle.
    pending_reverts: Mutex<Vec<PendingRevert>>,
}

impl ProductionDispatcher {
    /// Create a dispatcher with the default 10-second interval.
    pub fn new(store: Arc<dyn DispatchStore>, printers: Arc<dyn PrinterControl>) -> Self {
        Self {
            store,
            printers,
            interval: DEFAULT_DISPATCH_INTERVAL,
            pending_reverts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run the dispatch loop until the cancellation token is triggered.
    ///
    /// A cycle runs immediately, then the loop sleeps the full interval
    /// after each cycle completes.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            "Production dispatcher started",
        );

        while !cancel.is_cancelled() {
            if let Err(e) = self.run_cycle(&cancel).await {
                tracing::error!(error = %e, "Dispatch cycle failed");
            }

            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::info!("Production dispatcher shutting down");
    }

    /// One pass over the PENDING jobs.
    ///
    /// Store errors abort the cycle and are returned; everything else is
    /// recorded in the report. Stops early, between jobs, once `cancel`
    /// fires. Reverts deferred by an earlier cycle are written first.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport, sqlx::Error> {
        self.flush_pending_reverts().await?;

        let jobs = self.store.pending_jobs().await?;
        let mut report = CycleReport {
            pending: jobs.len(),
            ..CycleReport::default()
        };
        if jobs.is_empty() {
            return Ok(report);
        }

        tracing::info!(count = jobs.len(), "Found pending jobs");

        for job in &jobs {
            if cancel.is_cancelled() {
                tracing::info!("Shutdown requested, leaving remaining jobs pending");
                break;
            }

            let Some(product) = self.store.product_for_build_file(&job.gcode_path).await? else {
                tracing::warn!(
                    job_id = job.id,
                    gcode_path = %job.gcode_path,
                    "No product for build file, skipping job",
                );
                report.skipped += 1;
                continue;
            };

            let Some(material) = product.required_material() else {
                tracing::warn!(
                    job_id = job.id,
                    sku = %product.sku,
                    "Product declares no required material, skipping job",
                );
                report.skipped += 1;
                continue;
            };

            let colors = product.required_colors();
            let Some(matched) = self.match_resources(material, &colors).await? else {
                tracing::debug!(
                    job_id = job.id,
                    material,
                    colors = ?colors,
                    "No idle printer matches job",
                );
                report.unmatched += 1;
                continue;
            };

            tracing::info!(
                job_id = job.id,
                printer_serial = %matched.printer_serial,
                ams_mapping = ?matched.ams_mapping,
                "Matched job to printer",
            );

            match self.try_assign(job, &matched).await? {
                AssignmentOutcome::Started => report.started += 1,
                AssignmentOutcome::PrinterUnavailable => {
                    tracing::warn!(
                        job_id = job.id,
                        printer_serial = %matched.printer_serial,
                        "Printer no longer idle, job stays pending",
                    );
                    report.contended += 1;
                }
                AssignmentOutcome::JobNotPending => {
                    tracing::warn!(job_id = job.id, "Job left PENDING before claim");
                    report.contended += 1;
                }
                AssignmentOutcome::Failed(_) => report.failed += 1,
            }
        }

        tracing::debug!(?report, "Dispatch cycle complete");
        Ok(report)
    }

    /// First idle printer able to serve `material` in every color.
    pub async fn match_resources(
        &self,
        material: &str,
        colors: &[String],
    ) -> Result<Option<FilamentMatch>, sqlx::Error> {
        for color in colors {
            if let Err(e) = parse_hex(color) {
                tracing::debug!(color = %color, error = %e, "Required color is malformed");
            }
        }

        let printers = self.store.idle_printers().await?;
        Ok(find_printer_for_job(&printers, material, colors))
    }

    /// Claim the matched printer for `job`, then upload and start.
    pub async fn try_assign(
        &self,
        job: &Job,
        matched: &FilamentMatch,
    ) -> Result<AssignmentOutcome, sqlx::Error> {
        let (job, printer) = match self.store.claim(job.id, &matched.printer_serial).await? {
            ClaimOutcome::Claimed { job, printer } => (job, printer),
            ClaimOutcome::PrinterUnavailable => return Ok(AssignmentOutcome::PrinterUnavailable),
            ClaimOutcome::JobNotPending => return Ok(AssignmentOutcome::JobNotPending),
        };

        tracing::info!(
            job_id = job.id,
            printer_serial = %printer.serial,
            "Job claimed, starting upload",
        );

        match self.execute(&job, &printer, &matched.ams_mapping).await {
            Ok(()) => {
                if self.store.mark_printing(job.id).await?.is_none() {
                    tracing::warn!(job_id = job.id, "Job left UPLOADING while the print was starting");
                }
                tracing::info!(
                    job_id = job.id,
                    printer_serial = %printer.serial,
                    "Print started",
                );
                Ok(AssignmentOutcome::Started)
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(
                    job_id = job.id,
                    printer_serial = %printer.serial,
                    error = %reason,
                    "Job execution failed, releasing printer",
                );
                let revert = PendingRevert {
                    job_id: job.id,
                    printer_serial: printer.serial.clone(),
                    reason: reason.clone(),
                };
                if let Err(e) = self.revert_with_retry(&revert).await {
                    self.pending_reverts.lock().await.push(revert);
                    return Err(e);
                }
                Ok(AssignmentOutcome::Failed(reason))
            }
        }
    }

    /// Number of failure reverts waiting for the next cycle.
    pub async fn pending_revert_count(&self) -> usize {
        self.pending_reverts.lock().await.len()
    }

    /// Write a failure revert, retrying up to [`REVERT_ATTEMPTS`] times.
    async fn revert_with_retry(&self, revert: &PendingRevert) -> Result<(), sqlx::Error> {
        let mut attempt = 1;
        loop {
            match self
                .store
                .fail_and_release(revert.job_id, Some(&revert.printer_serial), &revert.reason)
                .await
            {
                Ok(reverted) => {
                    if reverted.is_none() {
                        tracing::warn!(job_id = revert.job_id, "Job already terminal, nothing reverted");
                    }
                    return Ok(());
                }
                Err(e) if attempt < REVERT_ATTEMPTS => {
                    tracing::warn!(
                        job_id = revert.job_id,
                        printer_serial = %revert.printer_serial,
                        attempt,
                        error = %e,
                        "Failure revert did not commit, retrying",
                    );
                    attempt += 1;
                    tokio::time::sleep(REVERT_RETRY_DELAY).await;
                }
                Err(e) => {
                    tracing::error!(
                        job_id = revert.job_id,
                        printer_serial = %revert.printer_serial,
                        error = %e,
                        "Failure revert did not commit, deferring to next cycle",
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Retry reverts deferred by earlier cycles. Those that fail again stay
    /// queued.
    async fn flush_pending_reverts(&self) -> Result<(), sqlx::Error> {
        let mut pending = self.pending_reverts.lock().await;
        while let Some(revert) = pending.first().cloned() {
            self.revert_with_retry(&revert).await?;
            pending.remove(0);
            tracing::info!(
                job_id = revert.job_id,
                printer_serial = %revert.printer_serial,
                "Deferred failure revert committed",
            );
        }
        Ok(())
    }

    async fn execute(
        &self,
        job: &Job,
        printer: &Printer,
        ams_mapping: &[i32],
    ) -> Result<(), ExecutionError> {
        let (ip, access_code) = printer
            .connection()
            .ok_or(ExecutionError::MissingConnectionDetails)?;
        let remote_name = job.remote_file_name();

        self.printers
            .upload_file(ip, access_code, Path::new(&job.gcode_path), &remote_name)
            .await?;
        self.printers
            .start_print(ip, &printer.serial, access_code, &remote_name, ams_mapping)
            .await?;
        Ok(())
    }
}
