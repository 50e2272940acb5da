//! Adaptive decimation ratio
//!
//! Maps a mesh's face count to a ratio through configurable breakpoints,
//! interpolating linearly between them and clamping outside. Denser meshes
//! never get a gentler ratio than sparser ones.

use glbridge_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Ratio to apply at a given face count
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub faces: usize,
    pub ratio: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveRatio {
    pub breakpoints: Vec<Breakpoint>,
}

impl Default for AdaptiveRatio {
    fn default() -> Self {
        Self {
            breakpoints: vec![
                Breakpoint { faces: 1_000, ratio: 1.0 },
                Breakpoint { faces: 10_000, ratio: 0.5 },
                Breakpoint { faces: 100_000, ratio: 0.2 },
                Breakpoint { faces: 1_000_000, ratio: 0.05 },
            ],
        }
    }
}

impl AdaptiveRatio {
    pub fn new(breakpoints: Vec<Breakpoint>) -> Result<Self> {
        let mapping = Self { breakpoints };
        mapping.validate()?;
        Ok(mapping)
    }

    /// Breakpoints must be non-empty, strictly increasing in face count,
    /// non-increasing in ratio, with every ratio in (0, 1].
    pub fn validate(&self) -> Result<()> {
        if self.breakpoints.is_empty() {
            return Err(Error::Config("adaptive mapping needs at least one breakpoint".into()));
        }
        for bp in &self.breakpoints {
            if !(bp.ratio > 0.0 && bp.ratio <= 1.0) {
                return Err(Error::Config(format!(
                    "adaptive ratio {} at {} faces is outside (0, 1]",
                    bp.ratio, bp.faces
                )));
            }
        }
        for pair in self.breakpoints.windows(2) {
            if pair[1].faces <= pair[0].faces {
                return Err(Error::Config(format!(
                    "adaptive breakpoints must increase in face count ({} after {})",
                    pair[1].faces, pair[0].faces
                )));
            }
            if pair[1].ratio > pair[0].ratio {
                return Err(Error::Config(format!(
                    "adaptive ratio rises from {} to {} between {} and {} faces",
                    pair[0].ratio, pair[1].ratio, pair[0].faces, pair[1].faces
                )));
            }
        }
        Ok(())
    }

    /// Effective ratio for a mesh with `faces` faces
    pub fn ratio_for(&self, faces: usize) -> f32 {
        let Some(first) = self.breakpoints.first() else {
            return 1.0;
        };
        if faces <= first.faces {
            return first.ratio;
        }
        for pair in self.breakpoints.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if faces <= hi.faces {
                let t = (faces - lo.faces) as f32 / (hi.faces - lo.faces) as f32;
                return lo.ratio + (hi.ratio - lo.ratio) * t;
            }
        }
        self.breakpoints.last().map(|b| b.ratio).unwrap_or(1.0)
    }
}
