//! Metrics module.
//!
//! Holds the latest sample per target and renders it for scraping.

mod exposition;
mod models;
mod store;

pub use exposition::*;
pub use models::*;
pub use store::*;
