//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod job_repo;
pub mod order_repo;
pub mod printer_repo;
pub mod product_repo;

pub use job_repo::{ClaimOutcome, JobRepo};
pub use order_repo::OrderRepo;
pub use printer_repo::PrinterRepo;
pub use product_repo::ProductRepo;
