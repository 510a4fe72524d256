//! Repository for the `jobs` table.
//!
//! Uses `JobStatus` from `models::status` for all status transitions; each
//! update binds the legal predecessor set so an out-of-order transition
//! matches zero rows instead of corrupting the lifecycle.

use factoryos_core::types::DbId;
use sqlx::PgPool;

use crate::models::job::{CreateJob, Job};
use crate::models::printer::Printer;
use crate::models::status::{JobStatus, OrderStatus, PrinterStatus};
use crate::repositories::printer_repo;

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, order_id, assigned_printer_serial, gcode_path, status_id, \
    error_message, created_at, updated_at";

/// Result of an attempt to bind a job to a printer.
#[derive(Debug)]
pub enum ClaimOutcome {
    /// Committed: job UPLOADING, printer PRINTING, order PRINTING.
    Claimed { job: Job, printer: Printer },
    /// The printer is missing or no longer IDLE. Nothing was written.
    PrinterUnavailable,
    /// The job left PENDING since it was read. Nothing was written.
    JobNotPending,
}

/// Provides lifecycle operations for print jobs.
pub struct JobRepo;

impl JobRepo {
    /// Queue a new PENDING job.
    pub async fn create(pool: &PgPool, input: &CreateJob) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (order_id, gcode_path, status_id) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(input.order_id)
            .bind(&input.gcode_path)
            .bind(JobStatus::Pending.id())
            .fetch_one(pool)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List jobs in a given status, oldest first.
    pub async fn list_by_status(
        pool: &PgPool,
        status: JobStatus,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs WHERE status_id = $1 ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(status.id())
            .fetch_all(pool)
            .await
    }

    /// Atomically claim `printer_serial` for a PENDING job.
    ///
    /// In one transaction: lock the printer row, verify it is still IDLE,
    /// move the job to UPLOADING with the printer assigned, flip the printer
    /// to PRINTING and the owning order to PRINTING. Any precondition miss
    /// rolls back and is reported through [`ClaimOutcome`].
    pub async fn claim_for_printer(
        pool: &PgPool,
        job_id: DbId,
        printer_serial: &str,
    ) -> Result<ClaimOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let lock_query = format!(
            "SELECT {} FROM printers WHERE serial = $1 FOR UPDATE",
            printer_repo::COLUMNS
        );
        let printer = sqlx::query_as::<_, Printer>(&lock_query)
            .bind(printer_serial)
            .fetch_optional(&mut *tx)
            .await?;

        match printer {
            Some(p) if p.status == PrinterStatus::Idle => {}
            other => {
                tracing::debug!(
                    job_id,
                    printer_serial,
                    status = ?other.map(|p| p.status),
                    "Claim rejected, printer not idle",
                );
                tx.rollback().await?;
                return Ok(ClaimOutcome::PrinterUnavailable);
            }
        }

        let job_query = format!(
            "UPDATE jobs \
             SET assigned_printer_serial = $2, status_id = $3, error_message = NULL, \
                 updated_at = NOW() \
             WHERE id = $1 AND status_id = ANY($4) \
             RETURNING {COLUMNS}"
        );
        let job = sqlx::query_as::<_, Job>(&job_query)
            .bind(job_id)
            .bind(printer_serial)
            .bind(JobStatus::Uploading.id())
            .bind(JobStatus::predecessor_ids(JobStatus::Uploading))
            .fetch_optional(&mut *tx)
            .await?;

        let Some(job) = job else {
            tracing::debug!(job_id, "Claim rejected, job not pending");
            tx.rollback().await?;
            return Ok(ClaimOutcome::JobNotPending);
        };

        let printer_query = format!(
            "UPDATE printers SET status_id = $2, updated_at = NOW() \
             WHERE serial = $1 \
             RETURNING {}",
            printer_repo::COLUMNS
        );
        let printer = sqlx::query_as::<_, Printer>(&printer_query)
            .bind(printer_serial)
            .bind(PrinterStatus::Printing.id())
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("UPDATE orders SET status_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(job.order_id)
            .bind(OrderStatus::Printing.id())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(ClaimOutcome::Claimed { job, printer })
    }

    /// Move an UPLOADING job to PRINTING once the printer accepted it.
    ///
    /// Returns `None` if the job was not UPLOADING.
    pub async fn mark_printing(pool: &PgPool, job_id: DbId) -> Result<Option<Job>, sqlx::Error> {
        Self::advance(pool, job_id, JobStatus::Printing).await
    }

    /// Mark a PRINTING job FINISHED and release its printer.
    ///
    /// Called by the telemetry listener when the device reports completion.
    /// The printer assignment is kept on the job for history.
    pub async fn mark_finished(pool: &PgPool, job_id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "UPDATE jobs SET status_id = $2, updated_at = NOW() \
             WHERE id = $1 AND status_id = ANY($3) \
             RETURNING {COLUMNS}"
        );
        let job = sqlx::query_as::<_, Job>(&query)
            .bind(job_id)
            .bind(JobStatus::Finished.id())
            .bind(JobStatus::predecessor_ids(JobStatus::Finished))
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(serial) = job.as_ref().and_then(|j| j.assigned_printer_serial.as_deref()) {
            sqlx::query("UPDATE printers SET status_id = $2, updated_at = NOW() WHERE serial = $1")
                .bind(serial)
                .bind(PrinterStatus::Idle.id())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(job)
    }

    /// Fail a job and release the printer it was claimed for.
    ///
    /// In one transaction: re-read the job under lock, set it FAILED with
    /// `reason`, clear its printer assignment, and set `printer_serial` (if
    /// any) back to IDLE. Returns `None` (and writes nothing) if the job was
    /// already terminal.
    pub async fn fail_and_release(
        pool: &PgPool,
        job_id: DbId,
        printer_serial: Option<&str>,
        reason: &str,
    ) -> Result<Option<Job>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let current = sqlx::query_as::<_, Job>(&format!(
            "SELECT {COLUMNS} FROM jobs WHERE id = $1 FOR UPDATE"
        ))
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?;

        if !current.is_some_and(|j| j.status.can_transition_to(JobStatus::Failed)) {
            tracing::debug!(job_id, "Fail skipped, job missing or terminal");
            tx.rollback().await?;
            return Ok(None);
        }

        let query = format!(
            "UPDATE jobs \
             SET status_id = $2, error_message = $3, assigned_printer_serial = NULL, \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let job = sqlx::query_as::<_, Job>(&query)
            .bind(job_id)
            .bind(JobStatus::Failed.id())
            .bind(reason)
            .fetch_one(&mut *tx)
            .await?;

        if let Some(serial) = printer_serial {
            sqlx::query("UPDATE printers SET status_id = $2, updated_at = NOW() WHERE serial = $1")
                .bind(serial)
                .bind(PrinterStatus::Idle.id())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(Some(job))
    }

    /// Single-row forward transition guarded by the predecessor table.
    async fn advance(
        pool: &PgPool,
        job_id: DbId,
        next: JobStatus,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs SET status_id = $2, updated_at = NOW() \
             WHERE id = $1 AND status_id = ANY($3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(job_id)
            .bind(next.id())
            .bind(JobStatus::predecessor_ids(next))
            .fetch_optional(pool)
            .await
    }
}
