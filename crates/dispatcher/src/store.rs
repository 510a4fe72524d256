//! Persistence seam used by the dispatcher.
//!
//! [`DispatchStore`] lists exactly the reads and atomic writes a dispatch
//! cycle needs. [`PgDispatchStore`] forwards each one to the repositories;
//! tests substitute an in-memory implementation.

use async_trait::async_trait;
use factoryos_core::types::DbId;
use factoryos_db::models::job::Job;
use factoryos_db::models::printer::PrinterWithSlots;
use factoryos_db::models::product::Product;
use factoryos_db::models::status::JobStatus;
use factoryos_db::repositories::{ClaimOutcome, JobRepo, PrinterRepo, ProductRepo};
use sqlx::PgPool;

#[async_trait]
pub trait DispatchStore: Send + Sync {
    /// PENDING jobs, oldest first.
    async fn pending_jobs(&self) -> Result<Vec<Job>, sqlx::Error>;

    /// The product whose build file is `path`.
    async fn product_for_build_file(&self, path: &str) -> Result<Option<Product>, sqlx::Error>;

    /// IDLE printers with their slots, in a stable order.
    async fn idle_printers(&self) -> Result<Vec<PrinterWithSlots>, sqlx::Error>;

    /// Atomically bind a PENDING job to a still-IDLE printer.
    async fn claim(&self, job_id: DbId, printer_serial: &str) -> Result<ClaimOutcome, sqlx::Error>;

    /// UPLOADING -> PRINTING.
    async fn mark_printing(&self, job_id: DbId) -> Result<Option<Job>, sqlx::Error>;

    /// Atomically fail a job and return its printer to IDLE.
    async fn fail_and_release(
        &self,
        job_id: DbId,
        printer_serial: Option<&str>,
        reason: &str,
    ) -> Result<Option<Job>, sqlx::Error>;

    /// Jobs left in UPLOADING, i.e. claimed but never confirmed.
    async fn stranded_jobs(&self) -> Result<Vec<Job>, sqlx::Error>;
}

/// [`DispatchStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgDispatchStore {
    pool: PgPool,
}

impl PgDispatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DispatchStore for PgDispatchStore {
    async fn pending_jobs(&self) -> Result<Vec<Job>, sqlx::Error> {
        JobRepo::list_by_status(&self.pool, JobStatus::Pending).await
    }

    async fn product_for_build_file(&self, path: &str) -> Result<Option<Product>, sqlx::Error> {
        ProductRepo::find_by_file_path(&self.pool, path).await
    }

    async fn idle_printers(&self) -> Result<Vec<PrinterWithSlots>, sqlx::Error> {
        PrinterRepo::list_idle_with_slots(&self.pool).await
    }

    async fn claim(&self, job_id: DbId, printer_serial: &str) -> Result<ClaimOutcome, sqlx::Error> {
        JobRepo::claim_for_printer(&self.pool, job_id, printer_serial).await
    }

    async fn mark_printing(&self, job_id: DbId) -> Result<Option<Job>, sqlx::Error> {
        JobRepo::mark_printing(&self.pool, job_id).await
    }

    async fn fail_and_release(
        &self,
        job_id: DbId,
        printer_serial: Option<&str>,
        reason: &str,
    ) -> Result<Option<Job>, sqlx::Error> {
        JobRepo::fail_and_release(&self.pool, job_id, printer_serial, reason).await
    }

    async fn stranded_jobs(&self) -> Result<Vec<Job>, sqlx::Error> {
        JobRepo::list_by_status(&self.pool, JobStatus::Uploading).await
    }
}
