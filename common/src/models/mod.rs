//! Shared data models.

pub mod query;

pub use query::{CellValue, ResultSet};
