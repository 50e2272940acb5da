//! UV preparation for web export
//!
//! - Material-grouped atlases: objects sharing a primary material are joined
//!   and packed into one `AtlasUV` channel
//! - Individual seam-projection unwrapping into `UVMap`
//! - Island detection and deterministic rectangle packing used by both

pub mod atlas;
pub mod islands;
pub mod pack;
pub mod unwrap;

pub use atlas::*;
pub use islands::*;
pub use pack::*;
pub use unwrap::*;
