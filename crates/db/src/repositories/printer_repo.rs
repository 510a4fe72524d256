//! Repository for the `printers` and `ams_slots` tables.

use std::collections::HashMap;

use sqlx::PgPool;

use crate::models::printer::{AmsSlot, CreatePrinter, Printer, PrinterWithSlots, UpsertAmsSlot};
use crate::models::status::PrinterStatus;

/// Column list for `printers` queries.
pub(crate) const COLUMNS: &str = "\
    serial, name, ip_address, access_code, model, status_id, \
    current_temp_nozzle, current_temp_bed, current_progress, remaining_time, \
    created_at, updated_at";

/// Column list for `ams_slots` queries.
const SLOT_COLUMNS: &str = "\
    id, printer_serial, ams_index, slot_index, tray_type, tray_color, \
    remaining_percent, updated_at";

/// Provides CRUD operations for printers and their AMS slots.
pub struct PrinterRepo;

impl PrinterRepo {
    /// Register a printer. New printers start IDLE.
    pub async fn create(pool: &PgPool, input: &CreatePrinter) -> Result<Printer, sqlx::Error> {
        let query = format!(
            "INSERT INTO printers (serial, name, ip_address, access_code, model, status_id) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Printer>(&query)
            .bind(&input.serial)
            .bind(&input.name)
            .bind(&input.ip_address)
            .bind(&input.access_code)
            .bind(&input.model)
            .bind(PrinterStatus::Idle.id())
            .fetch_one(pool)
            .await
    }

    /// Find a printer by serial.
    pub async fn find_by_serial(
        pool: &PgPool,
        serial: &str,
    ) -> Result<Option<Printer>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM printers WHERE serial = $1");
        sqlx::query_as::<_, Printer>(&query)
            .bind(serial)
            .fetch_optional(pool)
            .await
    }

    /// List IDLE printers with their slots, ordered by serial.
    ///
    /// Slots are ordered by unit then slot index so matching is stable.
    pub async fn list_idle_with_slots(
        pool: &PgPool,
    ) -> Result<Vec<PrinterWithSlots>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM printers WHERE status_id = $1 ORDER BY serial ASC"
        );
        let printers = sqlx::query_as::<_, Printer>(&query)
            .bind(PrinterStatus::Idle.id())
            .fetch_all(pool)
            .await?;

        if printers.is_empty() {
            return Ok(Vec::new());
        }

        let serials: Vec<String> = printers.iter().map(|p| p.serial.clone()).collect();
        let slot_query = format!(
            "SELECT {SLOT_COLUMNS} FROM ams_slots \
             WHERE printer_serial = ANY($1) \
             ORDER BY printer_serial, ams_index, slot_index"
        );
        let slots = sqlx::query_as::<_, AmsSlot>(&slot_query)
            .bind(&serials)
            .fetch_all(pool)
            .await?;

        let mut by_printer: HashMap<String, Vec<AmsSlot>> = HashMap::new();
        for slot in slots {
            by_printer
                .entry(slot.printer_serial.clone())
                .or_default()
                .push(slot);
        }

        Ok(printers
            .into_iter()
            .map(|printer| {
                let ams_slots = by_printer.remove(&printer.serial).unwrap_or_default();
                PrinterWithSlots { printer, ams_slots }
            })
            .collect())
    }

    /// List the slots of one printer, ordered by unit then slot.
    pub async fn list_slots(pool: &PgPool, serial: &str) -> Result<Vec<AmsSlot>, sqlx::Error> {
        let query = format!(
            "SELECT {SLOT_COLUMNS} FROM ams_slots \
             WHERE printer_serial = $1 \
             ORDER BY ams_index, slot_index"
        );
        sqlx::query_as::<_, AmsSlot>(&query)
            .bind(serial)
            .fetch_all(pool)
            .await
    }

    /// Overwrite a printer's status. Returns `false` if the printer is unknown.
    pub async fn set_status(
        pool: &PgPool,
        serial: &str,
        status: PrinterStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE printers SET status_id = $2, updated_at = NOW() WHERE serial = $1",
        )
        .bind(serial)
        .bind(status.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Insert or replace the contents of one AMS slot.
    pub async fn upsert_slot(
        pool: &PgPool,
        serial: &str,
        input: &UpsertAmsSlot,
    ) -> Result<AmsSlot, sqlx::Error> {
        let query = format!(
            "INSERT INTO ams_slots \
                 (printer_serial, ams_index, slot_index, tray_type, tray_color, remaining_percent) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (printer_serial, ams_index, slot_index) DO UPDATE SET \
                 tray_type = EXCLUDED.tray_type, \
                 tray_color = EXCLUDED.tray_color, \
                 remaining_percent = EXCLUDED.remaining_percent, \
                 updated_at = NOW() \
             RETURNING {SLOT_COLUMNS}"
        );
        sqlx::query_as::<_, AmsSlot>(&query)
            .bind(serial)
            .bind(input.ams_index)
            .bind(input.slot_index)
            .bind(&input.tray_type)
            .bind(&input.tray_color)
            .bind(input.remaining_percent)
            .fetch_one(pool)
            .await
    }
}
