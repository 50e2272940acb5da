//! Seam-projection unwrapping
//!
//! Faces are grown into charts across shared edges for as long as their
//! normal stays within `angle_limit` of the chart's average normal. Each
//! chart is then projected onto the plane of that average normal and the
//! charts are packed into the unit square.

use crate::pack::{pack_charts, write_charts, Chart};
use glbridge_core::{Error, MeshObject, Result, Uv, Vector3f, WorkingCopy};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Channel written by individual unwrapping
pub const UNWRAP_CHANNEL: &str = "UVMap";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnwrapConfig {
    /// Largest angle in degrees between a face and its chart's normal
    pub angle_limit: f32,
    /// Gap between charts as a fraction of the UV square
    pub island_margin: f32,
}

impl Default for UnwrapConfig {
    fn default() -> Self {
        Self {
            angle_limit: 66.0,
            island_margin: 0.02,
        }
    }
}

impl UnwrapConfig {
    pub fn new(angle_limit: f32, island_margin: f32) -> Self {
        Self {
            angle_limit,
            island_margin,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.angle_limit > 0.0 && self.angle_limit <= 90.0) {
            return Err(Error::Config(format!(
                "angle_limit {} must be in (0, 90] degrees",
                self.angle_limit
            )));
        }
        if !(0.0..0.5).contains(&self.island_margin) {
            return Err(Error::Config(format!(
                "island_margin {} must be in [0, 0.5)",
                self.island_margin
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnwrapReport {
    pub object: String,
    pub charts: usize,
    pub effective_margin: f32,
}

fn unit_normal(mesh: &MeshObject, fi: usize) -> Option<Vector3f> {
    let n = mesh.face_normal_raw(&mesh.faces[fi]);
    let len = n.norm();
    (len.is_finite() && len > 1e-12).then(|| n / len)
}

/// Orthonormal tangent frame of the plane with normal `n`
fn plane_basis(n: &Vector3f) -> (Vector3f, Vector3f) {
    let helper = if n.x.abs() < 0.9 {
        Vector3f::x()
    } else {
        Vector3f::y()
    };
    let t = helper.cross(n).normalize();
    let b = n.cross(&t);
    (t, b)
}

/// Grow angle-limited charts over `faces` and project each onto its plane
pub fn angle_charts(mesh: &MeshObject, faces: &[usize], angle_limit: f32) -> Result<Vec<Chart>> {
    if let Some(&bad) = faces.iter().find(|&&fi| fi >= mesh.faces.len()) {
        return Err(Error::malformed(&mesh.name, format!("face {} does not exist", bad)));
    }
    let cos_limit = angle_limit.to_radians().cos();
    let normals: Vec<Option<Vector3f>> = faces.iter().map(|&fi| unit_normal(mesh, fi)).collect();

    let mut edge_faces: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
    for (local, &fi) in faces.iter().enumerate() {
        let verts = &mesh.faces[fi].vertices;
        for j in 0..verts.len() {
            let (a, b) = (verts[j], verts[(j + 1) % verts.len()]);
            edge_faces.entry((a.min(b), a.max(b))).or_default().push(local);
        }
    }

    let mut assigned = vec![false; faces.len()];
    let mut charts = Vec::new();

    for seed in 0..faces.len() {
        if assigned[seed] {
            continue;
        }
        assigned[seed] = true;
        let mut members = vec![seed];
        let mut sum = normals[seed].unwrap_or_else(Vector3f::zeros);
        let mut queue = VecDeque::from([seed]);

        while let Some(current) = queue.pop_front() {
            let verts = &mesh.faces[faces[current]].vertices;
            for j in 0..verts.len() {
                let (a, b) = (verts[j], verts[(j + 1) % verts.len()]);
                let Some(neighbours) = edge_faces.get(&(a.min(b), a.max(b))) else {
                    continue;
                };
                for &next in neighbours {
                    if assigned[next] {
                        continue;
                    }
                    let accept = match normals[next] {
                        None => true,
                        Some(n) if sum.norm() < 1e-12 => {
                            sum = n;
                            true
                        }
                        Some(n) => n.dot(&sum.normalize()) >= cos_limit,
                    };
                    if accept {
                        assigned[next] = true;
                        if let Some(n) = normals[next] {
                            sum += n;
                        }
                        members.push(next);
                        queue.push_back(next);
                    }
                }
            }
        }

        let axis = if sum.norm() > 1e-12 {
            sum.normalize()
        } else {
            Vector3f::z()
        };
        let (t, b) = plane_basis(&axis);
        let chart_faces: Vec<usize> = members.iter().map(|&l| faces[l]).collect();
        let corners: Vec<Vec<Uv>> = chart_faces
            .iter()
            .map(|&fi| {
                mesh.faces[fi]
                    .vertices
                    .iter()
                    .map(|&v| {
                        let p = mesh.vertices[v].position.coords;
                        [p.dot(&t), p.dot(&b)]
                    })
                    .collect()
            })
            .collect();
        charts.push(Chart::from_corners(chart_faces, corners));
    }
    Ok(charts)
}

/// Unwrap a working copy into a fresh `UVMap` channel.
///
/// The copy is only modified once packing has succeeded.
pub fn unwrap(copy: &mut WorkingCopy, config: &UnwrapConfig) -> Result<UnwrapReport> {
    let mesh = copy.mesh();
    mesh.validate()?;
    let all: Vec<usize> = (0..mesh.faces.len()).collect();
    let charts = angle_charts(mesh, &all, config.angle_limit)?;
    let layout = pack_charts(&charts, config.island_margin)?;

    let mesh = copy.mesh_mut();
    let channel = mesh.add_uv_channel(UNWRAP_CHANNEL);
    write_charts(mesh, channel, &charts, &layout);
    debug!(object = %mesh.name, charts = charts.len(), "unwrapped");

    Ok(UnwrapReport {
        object: mesh.name.clone(),
        charts: charts.len(),
        effective_margin: layout.effective_margin,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::{any_overlap, UvRegion};
    use glbridge_core::Point3f;

    fn make_cube() -> MeshObject {
        MeshObject::from_polygons(
            "Cube",
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
                Point3f::new(0.0, 0.0, 1.0),
                Point3f::new(1.0, 0.0, 1.0),
                Point3f::new(1.0, 1.0, 1.0),
                Point3f::new(0.0, 1.0, 1.0),
            ],
            vec![
                vec![0, 3, 2, 1],
                vec![4, 5, 6, 7],
                vec![0, 1, 5, 4],
                vec![1, 2, 6, 5],
                vec![2, 3, 7, 6],
                vec![3, 0, 4, 7],
            ],
        )
        .with_material_slots(["Crate"])
    }

    #[test]
    fn test_cube_gets_one_chart_per_side() {
        let cube = make_cube();
        let charts = angle_charts(&cube, &[0, 1, 2, 3, 4, 5], 66.0).unwrap();
        assert_eq!(charts.len(), 6);
        assert!(charts.iter().all(|c| c.faces.len() == 1));
    }

    #[test]
    fn test_wide_limit_merges_neighbours() {
        let cube = make_cube();
        let charts = angle_charts(&cube, &[0, 1, 2, 3, 4, 5], 90.0).unwrap();
        assert!(charts.len() < 6);
    }

    #[test]
    fn test_unwrap_writes_uvmap() {
        let cube = make_cube();
        let mut copy = WorkingCopy::duplicate(&cube, "TEMP_DATA_Cube");
        let report = unwrap(&mut copy, &UnwrapConfig::default()).unwrap();
        assert_eq!(report.charts, 6);

        let mesh = copy.mesh();
        let ch = mesh.uv_channel_index(UNWRAP_CHANNEL).unwrap();
        let regions: Vec<UvRegion> = mesh
            .faces
            .iter()
            .filter_map(|f| UvRegion::from_points(f.uvs[ch].iter()))
            .collect();
        assert!(regions.iter().all(|r| r.within_unit_square()));
        assert!(!any_overlap(&regions));
        assert!(regions.iter().all(|r| r.width() > 0.1));
        assert!(!cube.has_uvs());
    }

    #[test]
    fn test_unwrap_rejects_nan_positions() {
        let mut cube = make_cube();
        cube.vertices[6].position = Point3f::new(f32::NAN, 1.0, 1.0);
        let mut copy = WorkingCopy::duplicate(&cube, "TEMP_DATA_Cube");
        assert!(unwrap(&mut copy, &UnwrapConfig::default()).is_err());
        assert!(!copy.mesh().has_uvs());
    }

    #[test]
    fn test_config_validation() {
        assert!(UnwrapConfig::default().validate().is_ok());
        assert!(UnwrapConfig::new(0.0, 0.02).validate().is_err());
        assert!(UnwrapConfig::new(66.0, 0.6).validate().is_err());
    }
}
