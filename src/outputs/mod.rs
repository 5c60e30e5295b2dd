//! Persistence of finished datasets.
//!
//! - [`csv`]: the dataset table, one row per classified case
//! - [`json`]: the same records plus run statistics, for programmatic consumers

pub mod csv;
pub mod json;
