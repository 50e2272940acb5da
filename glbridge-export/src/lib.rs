//! Export pipeline for glbridge
//!
//! Turns a selection in the authoring host into a published GLB without
//! touching the originals: every modification happens on temporary working
//! copies, and temporaries plus any host state changed on the way are cleaned
//! up by deferred tasks after the export returns.

pub mod config;
pub mod deferred;
pub mod encoder;
pub mod glb;
pub mod host;
pub mod report;
pub mod snapshot;

pub use config::*;
pub use deferred::*;
pub use encoder::*;
pub use glb::{assemble_glb, GlbEncoder};
pub use host::*;
pub use report::*;
pub use snapshot::*;
