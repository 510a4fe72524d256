//! FactoryOS production dispatcher.
//!
//! Periodically assigns PENDING print jobs to idle printers whose loaded
//! filament matches, uploads the build file and starts the print. The
//! binary in `main.rs` wires the Postgres store and the real printer client
//! into [`service::DispatcherService`].

pub mod config;
pub mod dispatcher;
pub mod recovery;
pub mod service;
pub mod store;

pub use dispatcher::{
    AssignmentOutcome, CycleReport, ExecutionError, ProductionDispatcher, REVERT_ATTEMPTS,
};
pub use service::DispatcherService;
pub use store::{DispatchStore, PgDispatchStore};
