//! Decimation backends and runtime capability probing

use glbridge_core::{MeshObject, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// A concrete decimation backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Backend {
    /// Seam-aware quadric edge collapse. Fast, needs manifold input, optional.
    Quadric,
    /// Triangle-soup progressive collapse. Slower, always available.
    Progressive,
}

impl Backend {
    /// Stable identifier used in reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Quadric => "BackendA",
            Backend::Progressive => "BackendB",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which backend a decimation request asks for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecimationMethod {
    /// Quadric when available, progressive on any failure
    #[default]
    Auto,
    Quadric,
    Progressive,
}

/// Common interface of the decimation backends
pub trait MeshDecimator: Send + Sync {
    fn backend(&self) -> Backend;

    /// Reduce a triangulated mesh toward `target_faces` triangles.
    ///
    /// Implementations work on a borrowed mesh and return a new one, so a
    /// failed attempt never leaves partial changes behind.
    fn decimate(&self, mesh: &MeshObject, target_faces: usize) -> Result<MeshObject>;
}

/// Which backends this process can run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub quadric: bool,
}

static DETECTED: OnceLock<Capabilities> = OnceLock::new();

impl Capabilities {
    /// Detect once per process; later calls return the cached answer
    pub fn detect() -> Capabilities {
        *DETECTED.get_or_init(|| {
            let caps = Capabilities {
                quadric: cfg!(feature = "quadric"),
            };
            tracing::debug!(quadric = caps.quadric, "detected decimation backends");
            caps
        })
    }

    /// A runtime where only the always-available backend exists
    pub fn progressive_only() -> Capabilities {
        Capabilities { quadric: false }
    }

    pub fn supports(&self, backend: Backend) -> bool {
        match backend {
            Backend::Quadric => self.quadric,
            Backend::Progressive => true,
        }
    }
}
