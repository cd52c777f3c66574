//! Row structs and DTOs.
//!
//! Each submodule contains a `FromRow` entity matching the database row
//! and, where the table accepts inserts, a create DTO.

pub mod device;
pub mod schedule;
