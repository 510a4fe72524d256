//! Printer and AMS slot entities.
//!
//! Status and telemetry columns are normally written by the telemetry
//! listener; the dispatcher reads them and flips status on claim/release.

use factoryos_core::filament::{FleetPrinter, LoadedSlot};
use factoryos_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::PrinterStatus;

/// A row from the `printers` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Printer {
    pub serial: String,
    pub name: String,
    pub ip_address: Option<String>,
    #[serde(skip_serializing)]
    pub access_code: Option<String>,
    /// Hardware model, e.g. `P1S`, `X1C`, `A1 Mini`.
    pub model: String,
    #[sqlx(rename = "status_id")]
    pub status: PrinterStatus,
    pub current_temp_nozzle: f64,
    pub current_temp_bed: f64,
    /// Print progress, 0-100.
    pub current_progress: i32,
    /// Minutes remaining on the current print.
    pub remaining_time: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Printer {
    /// Address and access code, if both are present and non-blank.
    pub fn connection(&self) -> Option<(&str, &str)> {
        let ip = self.ip_address.as_deref().filter(|s| !s.trim().is_empty())?;
        let code = self.access_code.as_deref().filter(|s| !s.trim().is_empty())?;
        Some((ip, code))
    }
}

/// A row from the `ams_slots` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AmsSlot {
    pub id: DbId,
    pub printer_serial: String,
    pub ams_index: i16,
    pub slot_index: i16,
    pub tray_type: Option<String>,
    pub tray_color: Option<String>,
    pub remaining_percent: Option<i16>,
    pub updated_at: Timestamp,
}

impl LoadedSlot for AmsSlot {
    fn unit_index(&self) -> i32 {
        i32::from(self.ams_index)
    }

    fn slot_index(&self) -> i32 {
        i32::from(self.slot_index)
    }

    fn material(&self) -> Option<&str> {
        self.tray_type.as_deref()
    }

    fn color(&self) -> Option<&str> {
        self.tray_color.as_deref()
    }
}

/// A printer together with its slots, ordered by unit then slot.
#[derive(Debug, Clone, Serialize)]
pub struct PrinterWithSlots {
    #[serde(flatten)]
    pub printer: Printer,
    pub ams_slots: Vec<AmsSlot>,
}

impl FleetPrinter for PrinterWithSlots {
    type Slot = AmsSlot;

    fn serial(&self) -> &str {
        &self.printer.serial
    }

    fn slots(&self) -> &[AmsSlot] {
        &self.ams_slots
    }
}

/// DTO for registering a printer.
#[derive(Debug, Deserialize)]
pub struct CreatePrinter {
    pub serial: String,
    pub name: String,
    pub ip_address: Option<String>,
    pub access_code: Option<String>,
    pub model: String,
}

/// DTO for writing the state of one AMS slot.
#[derive(Debug, Deserialize)]
pub struct UpsertAmsSlot {
    pub ams_index: i16,
    pub slot_index: i16,
    pub tray_type: Option<String>,
    pub tray_color: Option<String>,
    pub remaining_percent: Option<i16>,
}
