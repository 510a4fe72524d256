//! Print job entity.

use std::path::Path;

use factoryos_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::JobStatus;

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub order_id: DbId,
    pub assigned_printer_serial: Option<String>,
    /// Local path of the build file; also the key used to find the product.
    pub gcode_path: String,
    #[sqlx(rename = "status_id")]
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// File name the build file is stored under on the printer.
    pub fn remote_file_name(&self) -> String {
        Path::new(&self.gcode_path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.gcode_path.clone())
    }
}

/// DTO for queueing a new job.
#[derive(Debug, Deserialize)]
pub struct CreateJob {
    pub order_id: DbId,
    pub gcode_path: String,
}
