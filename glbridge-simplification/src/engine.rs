//! Decimation engine: preprocessing, backend selection and fallback
//!
//! The engine stages every attempt on a clone of the working copy and only
//! writes the result back when a backend produced a usable mesh, so a failed
//! decimation leaves the copy exactly as it was.

use crate::adaptive::AdaptiveRatio;
use crate::backend::{Backend, Capabilities, DecimationMethod, MeshDecimator};
use crate::preprocess::{preprocess, PreprocessConfig};
use crate::progressive::ProgressiveDecimator;
use glbridge_core::{Error, MeshObject, Result, WorkingCopy};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Decimation engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecimationConfig {
    pub preprocess: PreprocessConfig,
    /// Floor on the triangle count of any decimated mesh
    pub min_faces: usize,
    /// Keep open borders fixed in the quadric backend
    pub preserve_boundary: bool,
    /// Penalty on border collapses (quadric) / weight of border planes (progressive)
    pub boundary_weight: f64,
    /// Quadric backend stops once the cheapest collapse costs more than this
    pub error_threshold: Option<f64>,
    /// Progressive backend refuses normal flips on its first pass
    pub prevent_flips: bool,
    pub adaptive: AdaptiveRatio,
}

impl Default for DecimationConfig {
    fn default() -> Self {
        Self {
            preprocess: PreprocessConfig::default(),
            min_faces: 4,
            preserve_boundary: false,
            boundary_weight: 100.0,
            error_threshold: None,
            prevent_flips: true,
            adaptive: AdaptiveRatio::default(),
        }
    }
}

impl DecimationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_faces < 4 {
            return Err(Error::Config(format!(
                "min_faces must be at least 4, got {}",
                self.min_faces
            )));
        }
        if !(self.boundary_weight >= 0.0 && self.boundary_weight.is_finite()) {
            return Err(Error::Config("boundary_weight must be a finite non-negative number".into()));
        }
        if self.preprocess.dissolve_distance < 0.0
            || self.preprocess.merge_thresholds.iter().any(|t| !(*t > 0.0))
        {
            return Err(Error::Config("merge distances must be positive".into()));
        }
        self.adaptive.validate()
    }
}

/// Outcome of decimating one working copy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecimationResult {
    pub object: String,
    pub faces_before: usize,
    pub faces_after: usize,
    pub backend_used: Option<Backend>,
    pub success: bool,
    pub message: Option<String>,
}

impl DecimationResult {
    pub fn reduction(&self) -> f32 {
        if self.faces_before == 0 {
            return 0.0;
        }
        1.0 - self.faces_after as f32 / self.faces_before as f32
    }
}

pub struct DecimationEngine {
    config: DecimationConfig,
    capabilities: Capabilities,
}

impl Default for DecimationEngine {
    fn default() -> Self {
        Self::new(DecimationConfig::default())
    }
}

impl DecimationEngine {
    /// Engine using the backends this process was built with
    pub fn new(config: DecimationConfig) -> Self {
        Self::with_capabilities(config, Capabilities::detect())
    }

    pub fn with_capabilities(config: DecimationConfig, capabilities: Capabilities) -> Self {
        Self {
            config,
            capabilities,
        }
    }

    pub fn config(&self) -> &DecimationConfig {
        &self.config
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Ratio the adaptive mapping assigns to this mesh
    pub fn adaptive_ratio(&self, mesh: &MeshObject) -> f32 {
        self.config.adaptive.ratio_for(mesh.triangle_count())
    }

    fn decimator(&self, backend: Backend) -> Result<Box<dyn MeshDecimator>> {
        match backend {
            Backend::Progressive => Ok(Box::new(ProgressiveDecimator {
                boundary_weight: self.config.boundary_weight,
                prevent_flips: self.config.prevent_flips,
                min_faces: self.config.min_faces,
            })),
            Backend::Quadric => {
                if !self.capabilities.quadric {
                    return Err(Error::BackendUnavailable(backend.as_str().to_string()));
                }
                self.quadric_decimator()
            }
        }
    }

    #[cfg(feature = "quadric")]
    fn quadric_decimator(&self) -> Result<Box<dyn MeshDecimator>> {
        let mut decimator = crate::quadric::QuadricDecimator::with_params(
            self.config.error_threshold,
            self.config.preserve_boundary,
            self.config.boundary_weight,
        );
        decimator.min_faces = self.config.min_faces;
        Ok(Box::new(decimator))
    }

    #[cfg(not(feature = "quadric"))]
    fn quadric_decimator(&self) -> Result<Box<dyn MeshDecimator>> {
        Err(Error::BackendUnavailable(Backend::Quadric.as_str().to_string()))
    }

    /// Run one backend and reject results that are unusable for export
    fn attempt(&self, backend: Backend, mesh: &MeshObject, target: usize) -> Result<MeshObject> {
        let before = mesh.face_count();
        let out = self.decimator(backend)?.decimate(mesh, target)?;
        let after = out.face_count();
        if after == 0 || after < self.config.min_faces || after > before {
            return Err(Error::DecimationDegenerate(format!(
                "{} turned {} faces of '{}' into {}",
                backend, before, mesh.name, after
            )));
        }
        Ok(out)
    }

    fn run(
        &self,
        mesh: &MeshObject,
        target: usize,
        method: DecimationMethod,
    ) -> Result<(MeshObject, Backend, Option<String>)> {
        match method {
            DecimationMethod::Quadric => self
                .attempt(Backend::Quadric, mesh, target)
                .map(|m| (m, Backend::Quadric, None)),
            DecimationMethod::Progressive => self
                .attempt(Backend::Progressive, mesh, target)
                .map(|m| (m, Backend::Progressive, None)),
            DecimationMethod::Auto => {
                let mut fallback_reason = None;
                if self.capabilities.quadric {
                    match self.attempt(Backend::Quadric, mesh, target) {
                        Ok(m) => return Ok((m, Backend::Quadric, None)),
                        Err(e) => {
                            warn!(object = %mesh.name, error = %e, "BackendA failed, falling back to BackendB");
                            fallback_reason = Some(format!("fell back to BackendB: {}", e));
                        }
                    }
                }
                self.attempt(Backend::Progressive, mesh, target)
                    .map(|m| (m, Backend::Progressive, fallback_reason))
            }
        }
    }

    /// Decimate a working copy toward `target_ratio` of its preprocessed face count.
    ///
    /// Returns `Err` for an invalid ratio, malformed input or when every
    /// applicable backend failed; the copy is unchanged in those cases.
    pub fn decimate(
        &self,
        copy: &mut WorkingCopy,
        target_ratio: f32,
        method: DecimationMethod,
    ) -> Result<DecimationResult> {
        if !(target_ratio > 0.0 && target_ratio <= 1.0) {
            return Err(Error::InvalidData(format!(
                "decimation ratio {} is outside (0, 1]",
                target_ratio
            )));
        }

        let mut staged = copy.clone();
        let prep = preprocess(&mut staged, &self.config.preprocess)?;
        let before = staged.mesh().face_count();
        let object = copy.name().to_string();

        if before <= self.config.min_faces {
            *copy = staged;
            return Ok(DecimationResult {
                object,
                faces_before: before,
                faces_after: before,
                backend_used: None,
                success: true,
                message: Some(format!(
                    "{} faces is at or below the minimum of {}; left unchanged",
                    before, self.config.min_faces
                )),
            });
        }

        if target_ratio >= 1.0 {
            *copy = staged;
            return Ok(DecimationResult {
                object,
                faces_before: before,
                faces_after: before,
                backend_used: None,
                success: true,
                message: Some(format!("ratio 1.0, preprocessing only ({})", prep.summary())),
            });
        }

        let target = ((before as f64 * target_ratio as f64).ceil() as usize).max(self.config.min_faces);
        let (mesh, backend, note) = self.run(staged.mesh(), target, method)?;
        let after = mesh.face_count();
        *staged.mesh_mut() = mesh;
        *copy = staged;

        let mut notes: Vec<String> = note.into_iter().collect();
        if after > target {
            notes.push(format!("stopped at {} faces, target was {}", after, target));
        }
        info!(object = %object, faces_before = before, faces_after = after, backend = %backend, "decimated");
        Ok(DecimationResult {
            object,
            faces_before: before,
            faces_after: after,
            backend_used: Some(backend),
            success: true,
            message: (!notes.is_empty()).then(|| notes.join("; ")),
        })
    }

    /// Decimate several copies in parallel; each job owns its copy exclusively.
    pub fn decimate_batch(
        &self,
        jobs: Vec<(&mut WorkingCopy, f32)>,
        method: DecimationMethod,
    ) -> Vec<Result<DecimationResult>> {
        debug!(jobs = jobs.len(), ?method, "batch decimation");
        jobs.into_par_iter()
            .map(|(copy, ratio)| self.decimate(copy, ratio, method))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glbridge_core::{Point3f, Vector3f};
    use std::collections::HashMap;

    fn make_icosphere(subdivisions: usize) -> MeshObject {
        let t = (1.0 + 5.0f32.sqrt()) / 2.0;
        let mut positions: Vec<Point3f> = [
            (-1.0, t, 0.0), (1.0, t, 0.0), (-1.0, -t, 0.0), (1.0, -t, 0.0),
            (0.0, -1.0, t), (0.0, 1.0, t), (0.0, -1.0, -t), (0.0, 1.0, -t),
            (t, 0.0, -1.0), (t, 0.0, 1.0), (-t, 0.0, -1.0), (-t, 0.0, 1.0),
        ]
        .iter()
        .map(|&(x, y, z)| Point3f::from(Vector3f::new(x, y, z).normalize()))
        .collect();
        let mut faces: Vec<[usize; 3]> = vec![
            [0, 11, 5], [0, 5, 1], [0, 1, 7], [0, 7, 10], [0, 10, 11],
            [1, 5, 9], [5, 11, 4], [11, 10, 2], [10, 7, 6], [7, 1, 8],
            [3, 9, 4], [3, 4, 2], [3, 2, 6], [3, 6, 8], [3, 8, 9],
            [4, 9, 5], [2, 4, 11], [6, 2, 10], [8, 6, 7], [9, 8, 1],
        ];
        for _ in 0..subdivisions {
            let mut cache: HashMap<(usize, usize), usize> = HashMap::new();
            let mut midpoint = |a: usize, b: usize, positions: &mut Vec<Point3f>| {
                *cache.entry((a.min(b), a.max(b))).or_insert_with(|| {
                    let m = (positions[a].coords + positions[b].coords).normalize();
                    positions.push(Point3f::from(m));
                    positions.len() - 1
                })
            };
            let mut next = Vec::with_capacity(faces.len() * 4);
            for [a, b, c] in faces {
                let ab = midpoint(a, b, &mut positions);
                let bc = midpoint(b, c, &mut positions);
                let ca = midpoint(c, a, &mut positions);
                next.extend([[a, ab, ca], [b, bc, ab], [c, ca, bc], [ab, bc, ca]]);
            }
            faces = next;
        }
        let polygons = faces.iter().map(|f| f.to_vec()).collect();
        MeshObject::from_polygons("Sphere", positions, polygons).with_material_slots(["Stone"])
    }

    fn make_tetrahedron() -> MeshObject {
        MeshObject::from_polygons(
            "Tetra",
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.5, 1.0, 0.0),
                Point3f::new(0.5, 0.5, 1.0),
            ],
            vec![vec![0, 2, 1], vec![0, 1, 3], vec![1, 2, 3], vec![0, 3, 2]],
        )
    }

    #[test]
    fn test_icosphere_fallback_to_progressive() {
        let sphere = make_icosphere(3);
        assert_eq!(sphere.face_count(), 1280);
        let mut copy = WorkingCopy::duplicate(&sphere, "TEMP_DATA_Sphere");
        let engine = DecimationEngine::with_capabilities(
            DecimationConfig::default(),
            Capabilities::progressive_only(),
        );

        let result = engine.decimate(&mut copy, 0.3, DecimationMethod::Auto).unwrap();

        assert_eq!(result.faces_before, 1280);
        assert!(result.faces_after <= 384);
        assert!(result.faces_after >= 370);
        assert_eq!(result.backend_used, Some(Backend::Progressive));
        assert_eq!(copy.mesh().face_count(), result.faces_after);
        assert_eq!(sphere.face_count(), 1280);
    }

    #[cfg(feature = "quadric")]
    #[test]
    fn test_auto_prefers_quadric() {
        let sphere = make_icosphere(2);
        let mut copy = WorkingCopy::duplicate(&sphere, "TEMP_DATA_Sphere");
        let engine = DecimationEngine::default();
        let result = engine.decimate(&mut copy, 0.5, DecimationMethod::Auto).unwrap();
        assert_eq!(result.backend_used, Some(Backend::Quadric));
        assert!(result.faces_after <= result.faces_before);
    }

    #[test]
    fn test_explicit_quadric_unavailable() {
        let sphere = make_icosphere(1);
        let mut copy = WorkingCopy::duplicate(&sphere, "TEMP_DATA_Sphere");
        let before = copy.clone();
        let engine = DecimationEngine::with_capabilities(
            DecimationConfig::default(),
            Capabilities::progressive_only(),
        );
        let err = engine.decimate(&mut copy, 0.5, DecimationMethod::Quadric).unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)));
        assert_eq!(copy, before);
    }

    #[test]
    fn test_ratio_bounds() {
        let sphere = make_icosphere(1);
        let mut copy = WorkingCopy::duplicate(&sphere, "TEMP_DATA_Sphere");
        let engine = DecimationEngine::default();
        assert!(engine.decimate(&mut copy, 0.0, DecimationMethod::Auto).is_err());
        assert!(engine.decimate(&mut copy, 1.5, DecimationMethod::Auto).is_err());
        assert!(engine.decimate(&mut copy, f32::NAN, DecimationMethod::Auto).is_err());

        let result = engine.decimate(&mut copy, 1.0, DecimationMethod::Auto).unwrap();
        assert_eq!(result.faces_before, result.faces_after);
        assert_eq!(result.backend_used, None);
    }

    #[test]
    fn test_tiny_mesh_left_unchanged() {
        let mut copy = WorkingCopy::duplicate(&make_tetrahedron(), "TEMP_DATA_Tetra");
        let result = DecimationEngine::default()
            .decimate(&mut copy, 0.1, DecimationMethod::Auto)
            .unwrap();
        assert_eq!(result.faces_before, 4);
        assert_eq!(result.faces_after, 4);
        assert!(result.message.is_some());
    }

    #[test]
    fn test_bounds_hold_for_all_ratios() {
        let sphere = make_icosphere(2);
        let engine = DecimationEngine::with_capabilities(
            DecimationConfig::default(),
            Capabilities::progressive_only(),
        );
        for ratio in [0.01, 0.1, 0.25, 0.5, 0.9] {
            let mut copy = WorkingCopy::duplicate(&sphere, "TEMP_DATA_Sphere");
            let result = engine.decimate(&mut copy, ratio, DecimationMethod::Auto).unwrap();
            assert!(result.faces_after <= result.faces_before);
            assert!(result.faces_after >= 4);
        }
    }

    #[test]
    fn test_batch() {
        let sphere = make_icosphere(2);
        let mut a = WorkingCopy::duplicate(&sphere, "TEMP_DATA_A");
        let mut b = WorkingCopy::duplicate(&sphere, "TEMP_DATA_B");
        let engine = DecimationEngine::with_capabilities(
            DecimationConfig::default(),
            Capabilities::progressive_only(),
        );
        let results = engine.decimate_batch(vec![(&mut a, 0.5), (&mut b, 0.25)], DecimationMethod::Auto);
        assert_eq!(results.len(), 2);
        let ra = results[0].as_ref().unwrap();
        let rb = results[1].as_ref().unwrap();
        assert_eq!(ra.object, "TEMP_DATA_A");
        assert!(rb.faces_after < ra.faces_after);
    }

    #[test]
    fn test_config_validation() {
        assert!(DecimationConfig::default().validate().is_ok());
        let config = DecimationConfig {
            min_faces: 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
