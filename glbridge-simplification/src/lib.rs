//! Mesh repair and decimation for web export
//!
//! Working copies are preprocessed into clean triangle meshes and then
//! reduced by one of two backends:
//! - Seam-aware quadric edge collapse over manifold input (`quadric` feature)
//! - Progressive vertex-pair collapse over a triangle soup, always available
//!
//! `DecimationEngine` picks the backend, falls back on failure and only
//! commits successful results.

pub mod adaptive;
pub mod backend;
pub mod engine;
pub mod preprocess;
pub mod progressive;
#[cfg(feature = "quadric")]
pub mod quadric;
mod quadrics;

pub use adaptive::*;
pub use backend::*;
pub use engine::*;
pub use preprocess::*;
pub use progressive::*;
#[cfg(feature = "quadric")]
pub use quadric::*;
