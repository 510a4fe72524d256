//! Domain model structs and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row and, where rows are inserted by this crate, a create DTO.

pub mod job;
pub mod order;
pub mod printer;
pub mod product;
pub mod status;
