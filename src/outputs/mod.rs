//! Run output.
//!
//! - [`json`]: writes the end-of-run [`crate::models::RunReport`]

pub mod json;
