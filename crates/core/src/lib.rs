//! Pure domain logic shared by the FactoryOS dispatch engine.
//!
//! Nothing in this crate performs I/O: color science, material/color
//! matching over a fleet snapshot, and the shared id/error types live here
//! so the database and dispatcher crates can both depend on them.

pub mod color;
pub mod error;
pub mod filament;
pub mod types;
