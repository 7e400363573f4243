//! Saving and loading samples and data sets.

#[cfg(feature = "csv")]
pub mod csv;

pub mod json;

pub use json::{load_data, load_frequency_data, load_json, save_json};
