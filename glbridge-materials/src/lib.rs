//! Material handling for glbridge
//!
//! - Usage analysis: which material slots faces actually reference
//! - Cleaning: stripping unused slots from working copies
//! - Readiness: whether a material's shader graph survives export

pub mod analyzer;
pub mod cleaner;
pub mod readiness;

pub use analyzer::*;
pub use cleaner::*;
pub use readiness::*;
