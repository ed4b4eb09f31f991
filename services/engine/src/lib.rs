//! Lornu AI Engine Library
//!
//! Multi-region tag compliance scanning.

pub mod agents;

pub use agents::tag_compliance::{MultiRegionScanner, ScanRequest};
