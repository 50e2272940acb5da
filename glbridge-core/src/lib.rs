//! Core data structures for glbridge
//!
//! This crate provides the scene and mesh model shared by every pipeline
//! stage: polygon meshes with material slots and per-corner UV channels,
//! scene objects, export selections, and the working copies that all
//! destructive processing operates on.

pub mod error;
pub mod mesh;
pub mod point;
pub mod scene;
pub mod subdivide;
pub mod transform;
pub mod working;

pub use error::*;
pub use mesh::*;
pub use point::*;
pub use scene::*;
pub use transform::*;
pub use working::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

/// Prefix for working copies of individual objects
pub const TEMP_PREFIX: &str = "TEMP_DATA_";

/// Prefix for joined atlas copies
pub const ATLAS_PREFIX: &str = "UV_Atlas_";

/// Name of the working copy derived from `original`
pub fn temp_name(original: &str) -> String {
    format!("{}{}", TEMP_PREFIX, original)
}

/// Name of the joined copy for a material group
pub fn atlas_name(material: &str) -> String {
    format!("{}{}", ATLAS_PREFIX, material)
}
