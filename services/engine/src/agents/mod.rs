//! Agent modules for the Lornu AI Engine
//!
//! - `tag_compliance`: Multi-region tag compliance scanning

pub mod tag_compliance;

pub use tag_compliance::MultiRegionScanner;
