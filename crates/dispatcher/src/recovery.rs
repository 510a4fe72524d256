//! Startup recovery for jobs stranded in UPLOADING.
//!
//! A job is UPLOADING only while an assignment is executing. Finding one at
//! startup means the previous process stopped mid-assignment, and whether
//! the printer ever received the file is unknown. Such jobs are failed and
//! their printers released so an operator can re-queue them.

use crate::store::DispatchStore;

/// Error message stored on jobs failed by recovery.
pub const STRANDED_UPLOAD_REASON: &str = "dispatcher restarted during upload";

/// Fail every UPLOADING job and release its printer.
///
/// Returns how many jobs were failed.
pub async fn recover_stranded_jobs(store: &dyn DispatchStore) -> Result<usize, sqlx::Error> {
    let stranded = store.stranded_jobs().await?;
    let mut recovered = 0;

    for job in stranded {
        let printer_serial = job.assigned_printer_serial.as_deref();
        match store
            .fail_and_release(job.id, printer_serial, STRANDED_UPLOAD_REASON)
            .await?
        {
            Some(_) => {
                tracing::warn!(
                    job_id = job.id,
                    printer_serial = ?printer_serial,
                    "Failed job stranded in UPLOADING",
                );
                recovered += 1;
            }
            None => {
                tracing::debug!(job_id = job.id, "Stranded job already terminal");
            }
        }
    }

    Ok(recovered)
}
