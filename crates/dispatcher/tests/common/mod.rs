//! Shared fixtures for dispatcher integration tests.
//!
//! [`MemoryStore`] mirrors the repository semantics (guarded transitions,
//! atomic claim and release) without a database. [`ScriptedPrinters`]
//! records every printer call and can be told to fail.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use factoryos_core::types::DbId;
use factoryos_db::models::job::Job;
use factoryos_db::models::printer::{AmsSlot, Printer, PrinterWithSlots};
use factoryos_db::models::product::Product;
use factoryos_db::models::status::{JobStatus, OrderStatus, PrinterStatus};
use factoryos_db::repositories::ClaimOutcome;
use factoryos_dispatcher::store::DispatchStore;
use factoryos_printer::ftps::FtpsError;
use factoryos_printer::{CommandError, PrinterControl};

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct State {
    jobs: Vec<Job>,
    printers: Vec<PrinterWithSlots>,
    products: Vec<Product>,
    orders: Vec<(DbId, OrderStatus)>,
    /// Every job status change, in order.
    transitions: Vec<(DbId, JobStatus, JobStatus)>,
    /// Printer flipped to PRINTING right before the next claim.
    steal_before_claim: Option<String>,
    next_id: DbId,
}

impl State {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }

    fn set_job_status(&mut self, job_id: DbId, next: JobStatus) -> Option<&mut Job> {
        let job = self.jobs.iter_mut().find(|j| j.id == job_id)?;
        let from = job.status;
        job.status = from.transition(next).ok()?;
        self.transitions.push((job_id, from, next));
        job.updated_at = Utc::now();
        Some(job)
    }

    fn printer_mut(&mut self, serial: &str) -> Option<&mut PrinterWithSlots> {
        self.printers.iter_mut().find(|p| p.printer.serial == serial)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_next_read: AtomicBool,
    failing_releases: AtomicU32,
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_767_225_600, 0).unwrap_or_default()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a printer with `(unit, slot, material, color)` slots.
    pub fn add_printer(&self, serial: &str, ip: Option<&str>, slots: &[(i16, i16, &str, &str)]) {
        let mut state = self.state.lock().unwrap();
        let ams_slots = slots
            .iter()
            .map(|(unit, slot, material, color)| AmsSlot {
                id: state.next_id(),
                printer_serial: serial.to_string(),
                ams_index: *unit,
                slot_index: *slot,
                tray_type: Some(material.to_string()),
                tray_color: Some(color.to_string()),
                remaining_percent: Some(100),
                updated_at: epoch(),
            })
            .collect();

        state.printers.push(PrinterWithSlots {
            printer: Printer {
                serial: serial.to_string(),
                name: format!("Printer {serial}"),
                ip_address: ip.map(str::to_string),
                access_code: Some("12345678".to_string()),
                model: "P1S".to_string(),
                status: PrinterStatus::Idle,
                current_temp_nozzle: 0.0,
                current_temp_bed: 0.0,
                current_progress: 0,
                remaining_time: 0,
                created_at: epoch(),
                updated_at: epoch(),
            },
            ams_slots,
        });
    }

    pub fn add_product(&self, build_file: &str, material: Option<&str>, color: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.products.push(Product {
            id,
            name: format!("Product {id}"),
            sku: format!("SKU-{id}"),
            description: None,
            file_path_3mf: build_file.to_string(),
            required_filament_type: material.map(str::to_string),
            required_filament_color: color.map(str::to_string),
            created_at: epoch(),
        });
    }

    /// Queue a PENDING job (and its order). Later jobs are newer.
    pub fn add_job(&self, build_file: &str) -> DbId {
        let mut state = self.state.lock().unwrap();
        let order_id = state.next_id();
        state.orders.push((order_id, OrderStatus::Queued));

        let id = state.next_id();
        let created_at = epoch() + ChronoDuration::seconds(id);
        state.jobs.push(Job {
            id,
            order_id,
            assigned_printer_serial: None,
            gcode_path: build_file.to_string(),
            status: JobStatus::Pending,
            error_message: None,
            created_at,
            updated_at: created_at,
        });
        id
    }

    pub fn job(&self, id: DbId) -> Job {
        let state = self.state.lock().unwrap();
        state.jobs.iter().find(|j| j.id == id).cloned().unwrap()
    }

    pub fn printer_status(&self, serial: &str) -> PrinterStatus {
        let state = self.state.lock().unwrap();
        state
            .printers
            .iter()
            .find(|p| p.printer.serial == serial)
            .map(|p| p.printer.status)
            .unwrap()
    }

    pub fn set_printer_status(&self, serial: &str, status: PrinterStatus) {
        let mut state = self.state.lock().unwrap();
        state.printer_mut(serial).unwrap().printer.status = status;
    }

    pub fn order_status(&self, order_id: DbId) -> OrderStatus {
        let state = self.state.lock().unwrap();
        state
            .orders
            .iter()
            .find(|(id, _)| *id == order_id)
            .map(|(_, status)| *status)
            .unwrap()
    }

    /// Simulate another actor taking `serial` between match and claim.
    pub fn steal_before_next_claim(&self, serial: &str) {
        self.state.lock().unwrap().steal_before_claim = Some(serial.to_string());
    }

    /// Make the next job/printer listing fail with a pool error.
    pub fn fail_next_read(&self) {
        self.fail_next_read.store(true, Ordering::SeqCst);
    }

    /// Make the next `count` failure reverts error before writing anything.
    pub fn fail_next_releases(&self, count: u32) {
        self.failing_releases.store(count, Ordering::SeqCst);
    }

    pub fn transitions(&self) -> Vec<(DbId, JobStatus, JobStatus)> {
        self.state.lock().unwrap().transitions.clone()
    }

    /// Every recorded job transition followed the legal order.
    pub fn assert_forward_only(&self) {
        for (job_id, from, to) in self.transitions() {
            assert!(
                from.can_transition_to(to),
                "job {job_id} moved illegally {from} -> {to}"
            );
        }
    }

    fn check_read_failure(&self) -> Result<(), sqlx::Error> {
        if self.fail_next_read.swap(false, Ordering::SeqCst) {
            Err(sqlx::Error::PoolTimedOut)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DispatchStore for MemoryStore {
    async fn pending_jobs(&self) -> Result<Vec<Job>, sqlx::Error> {
        self.check_read_failure()?;
        let state = self.state.lock().unwrap();
        let mut jobs: Vec<Job> = state
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Pending)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| (j.created_at, j.id));
        Ok(jobs)
    }

    async fn product_for_build_file(&self, path: &str) -> Result<Option<Product>, sqlx::Error> {
        let state = self.state.lock().unwrap();
        Ok(state
            .products
            .iter()
            .filter(|p| p.file_path_3mf == path)
            .min_by_key(|p| p.id)
            .cloned())
    }

    async fn idle_printers(&self) -> Result<Vec<PrinterWithSlots>, sqlx::Error> {
        self.check_read_failure()?;
        let state = self.state.lock().unwrap();
        let mut printers: Vec<PrinterWithSlots> = state
            .printers
            .iter()
            .filter(|p| p.printer.status == PrinterStatus::Idle)
            .cloned()
            .collect();
        printers.sort_by(|a, b| a.printer.serial.cmp(&b.printer.serial));
        for printer in &mut printers {
            printer
                .ams_slots
                .sort_by_key(|s| (s.ams_index, s.slot_index));
        }
        Ok(printers)
    }

    async fn claim(&self, job_id: DbId, printer_serial: &str) -> Result<ClaimOutcome, sqlx::Error> {
        let mut state = self.state.lock().unwrap();

        if let Some(stolen) = state.steal_before_claim.take() {
            if let Some(p) = state.printer_mut(&stolen) {
                p.printer.status = PrinterStatus::Printing;
            }
        }

        match state.printer_mut(printer_serial) {
            Some(p) if p.printer.status == PrinterStatus::Idle => {}
            _ => return Ok(ClaimOutcome::PrinterUnavailable),
        }

        let Some(job) = state.set_job_status(job_id, JobStatus::Uploading) else {
            return Ok(ClaimOutcome::JobNotPending);
        };
        job.assigned_printer_serial = Some(printer_serial.to_string());
        job.error_message = None;
        let job = job.clone();

        let printer = {
            let p = state.printer_mut(printer_serial).unwrap();
            p.printer.status = PrinterStatus::Printing;
            p.printer.clone()
        };

        if let Some(order) = state.orders.iter_mut().find(|(id, _)| *id == job.order_id) {
            order.1 = OrderStatus::Printing;
        }

        Ok(ClaimOutcome::Claimed { job, printer })
    }

    async fn mark_printing(&self, job_id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let mut state = self.state.lock().unwrap();
        Ok(state.set_job_status(job_id, JobStatus::Printing).cloned())
    }

    async fn fail_and_release(
        &self,
        job_id: DbId,
        printer_serial: Option<&str>,
        reason: &str,
    ) -> Result<Option<Job>, sqlx::Error> {
        let failing = self
            .failing_releases
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(sqlx::Error::PoolTimedOut);
        }

        let mut state = self.state.lock().unwrap();
        let Some(job) = state.set_job_status(job_id, JobStatus::Failed) else {
            return Ok(None);
        };
        job.error_message = Some(reason.to_string());
        job.assigned_printer_serial = None;
        let job = job.clone();

        if let Some(p) = printer_serial.and_then(|serial| state.printer_mut(serial)) {
            p.printer.status = PrinterStatus::Idle;
        }
        Ok(Some(job))
    }

    async fn stranded_jobs(&self) -> Result<Vec<Job>, sqlx::Error> {
        let state = self.state.lock().unwrap();
        Ok(state
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Uploading)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Scripted printer control
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrinterCall {
    Upload {
        ip: String,
        local_path: String,
        remote_name: String,
    },
    Start {
        ip: String,
        serial: String,
        file_name: String,
        ams_mapping: Vec<i32>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    RejectLogin,
    TimeOutOnStart,
}

pub struct ScriptedPrinters {
    behavior: Behavior,
    calls: Mutex<Vec<PrinterCall>>,
}

impl ScriptedPrinters {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<PrinterCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PrinterControl for ScriptedPrinters {
    async fn upload_file(
        &self,
        ip: &str,
        _access_code: &str,
        local_path: &Path,
        remote_name: &str,
    ) -> Result<(), CommandError> {
        self.calls.lock().unwrap().push(PrinterCall::Upload {
            ip: ip.to_string(),
            local_path: local_path.display().to_string(),
            remote_name: remote_name.to_string(),
        });
        match self.behavior {
            Behavior::RejectLogin => Err(CommandError::Upload(FtpsError::UnexpectedReply {
                code: 530,
                text: "Login incorrect.".to_string(),
            })),
            _ => Ok(()),
        }
    }

    async fn start_print(
        &self,
        ip: &str,
        serial: &str,
        _access_code: &str,
        file_name: &str,
        ams_mapping: &[i32],
    ) -> Result<(), CommandError> {
        self.calls.lock().unwrap().push(PrinterCall::Start {
            ip: ip.to_string(),
            serial: serial.to_string(),
            file_name: file_name.to_string(),
            ams_mapping: ams_mapping.to_vec(),
        });
        match self.behavior {
            Behavior::TimeOutOnStart => Err(CommandError::ConnectionTimeout),
            _ => Ok(()),
        }
    }
}
