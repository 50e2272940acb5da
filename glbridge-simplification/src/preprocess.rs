//! Mesh repair before decimation
//!
//! Quadric edge collapse needs clean triangle topology. Preprocessing
//! triangulates, dissolves degenerate faces, welds vertices at escalating
//! distances while non-manifold edges remain, drops loose vertices and
//! recomputes normals. It only ever runs on a working copy.

use glbridge_core::{Face, MeshObject, Point3f, Result, WorkingCopy};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Preprocessing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Weld distances tried in order while non-manifold edges remain
    pub merge_thresholds: Vec<f32>,
    /// Vertices closer than this are welded before degenerate faces are dissolved
    pub dissolve_distance: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            merge_thresholds: vec![0.001, 0.01, 0.1],
            dissolve_distance: 0.0001,
        }
    }
}

/// What preprocessing changed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PreprocessReport {
    pub faces_in: usize,
    pub polygons_triangulated: usize,
    pub degenerate_removed: usize,
    pub non_manifold_before: usize,
    pub non_manifold_after: usize,
    pub merge_threshold_used: Option<f32>,
    pub vertices_merged: usize,
    pub loose_removed: usize,
    pub faces_out: usize,
}

impl PreprocessReport {
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if self.polygons_triangulated > 0 {
            parts.push(format!("triangulated {} polygons", self.polygons_triangulated));
        }
        if self.degenerate_removed > 0 {
            parts.push(format!("dissolved {} degenerate faces", self.degenerate_removed));
        }
        if let Some(t) = self.merge_threshold_used {
            parts.push(format!("merged {} vertices at {}", self.vertices_merged, t));
        }
        if self.non_manifold_after > 0 {
            parts.push(format!("{} non-manifold edges remain", self.non_manifold_after));
        }
        if self.loose_removed > 0 {
            parts.push(format!("removed {} loose vertices", self.loose_removed));
        }
        if parts.is_empty() {
            "mesh already clean".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Topology statistics for a mesh
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MeshDiagnosis {
    pub triangles: usize,
    pub quads: usize,
    pub ngons: usize,
    pub loose_vertices: usize,
    pub boundary_edges: usize,
    pub non_manifold_edges: usize,
    pub zero_area_faces: usize,
}

impl MeshDiagnosis {
    pub fn has_issues(&self) -> bool {
        self.loose_vertices > 0 || self.non_manifold_edges > 0 || self.zero_area_faces > 0
    }
}

#[inline]
pub(crate) fn edge_key(a: usize, b: usize) -> (usize, usize) {
    (a.min(b), a.max(b))
}

/// Number of faces using each undirected edge
pub(crate) fn edge_face_counts(mesh: &MeshObject) -> HashMap<(usize, usize), usize> {
    let mut counts = HashMap::new();
    for face in &mesh.faces {
        for (&a, &b) in face.vertices.iter().circular_tuple_windows() {
            *counts.entry(edge_key(a, b)).or_insert(0) += 1;
        }
    }
    counts
}

/// Edges shared by more than two faces
pub fn count_non_manifold_edges(mesh: &MeshObject) -> usize {
    edge_face_counts(mesh).values().filter(|&&c| c > 2).count()
}

/// Inspect a mesh without modifying it
pub fn diagnose(mesh: &MeshObject) -> MeshDiagnosis {
    let mut d = MeshDiagnosis::default();
    let mut referenced = vec![false; mesh.vertices.len()];
    for face in &mesh.faces {
        match face.vertices.len() {
            3 => d.triangles += 1,
            4 => d.quads += 1,
            n if n > 4 => d.ngons += 1,
            _ => {}
        }
        for &v in &face.vertices {
            if let Some(r) = referenced.get_mut(v) {
                *r = true;
            }
        }
        if face.vertices.iter().all(|&v| v < mesh.vertices.len())
            && mesh.face_area(face) <= f32::EPSILON
        {
            d.zero_area_faces += 1;
        }
    }
    d.loose_vertices = referenced.iter().filter(|r| !**r).count();
    for &count in edge_face_counts(mesh).values() {
        match count {
            1 => d.boundary_edges += 1,
            c if c > 2 => d.non_manifold_edges += 1,
            _ => {}
        }
    }
    d
}

/// Fan-triangulate every polygon, carrying UV corners along
pub fn triangulate(mesh: &mut MeshObject) -> usize {
    let mut split = 0;
    let mut faces = Vec::with_capacity(mesh.triangle_count());
    for face in mesh.faces.drain(..) {
        if face.vertices.len() <= 3 {
            faces.push(face);
            continue;
        }
        split += 1;
        for i in 1..face.vertices.len() - 1 {
            faces.push(Face {
                vertices: vec![face.vertices[0], face.vertices[i], face.vertices[i + 1]],
                material_index: face.material_index,
                uvs: face
                    .uvs
                    .iter()
                    .map(|layer| vec![layer[0], layer[i], layer[i + 1]])
                    .collect(),
            });
        }
    }
    mesh.faces = faces;
    split
}

type Cell = (i64, i64, i64);

fn cell_of(p: &Point3f, size: f32) -> Cell {
    (
        (p.x / size).floor() as i64,
        (p.y / size).floor() as i64,
        (p.z / size).floor() as i64,
    )
}

/// Map every vertex to the first earlier vertex within `distance`
fn weld_map(positions: &[Point3f], distance: f32) -> (Vec<usize>, usize) {
    let mut grid: HashMap<Cell, Vec<usize>> = HashMap::new();
    let mut map = Vec::with_capacity(positions.len());
    let mut merged = 0;
    let dist_sq = distance * distance;

    for (i, p) in positions.iter().enumerate() {
        let (cx, cy, cz) = cell_of(p, distance);
        let mut target = None;
        'search: for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    if let Some(bucket) = grid.get(&(cx + dx, cy + dy, cz + dz)) {
                        for &rep in bucket {
                            if (positions[rep] - p).norm_squared() <= dist_sq {
                                target = Some(rep);
                                break 'search;
                            }
                        }
                    }
                }
            }
        }
        match target {
            Some(rep) => {
                map.push(rep);
                merged += 1;
            }
            None => {
                grid.entry((cx, cy, cz)).or_default().push(i);
                map.push(i);
            }
        }
    }
    (map, merged)
}

/// Weld vertices within `distance`. Collapsed faces are left for
/// `dissolve_degenerate`. Returns merged count.
pub fn merge_by_distance(mesh: &mut MeshObject, distance: f32) -> usize {
    if distance <= 0.0 || mesh.vertices.is_empty() {
        return 0;
    }
    let positions: Vec<Point3f> = mesh.vertices.iter().map(|v| v.position).collect();
    let (map, merged) = weld_map(&positions, distance);
    if merged == 0 {
        return 0;
    }
    for face in &mut mesh.faces {
        for v in &mut face.vertices {
            *v = map[*v];
        }
    }
    merged
}

/// Remove faces with repeated corners, (near) zero area, or the same corner
/// set as an earlier face. Returns removed count.
pub fn dissolve_degenerate(mesh: &mut MeshObject, distance: f32) -> usize {
    let min_area = 0.5 * distance * distance;
    let before = mesh.faces.len();
    let vertices = &mesh.vertices;
    let mut seen: HashSet<Vec<usize>> = HashSet::new();
    mesh.faces.retain(|face| {
        if !face.vertices.iter().all_unique() || polygon_area(vertices, face) <= min_area {
            return false;
        }
        seen.insert(face.vertices.iter().copied().sorted().collect())
    });
    before - mesh.faces.len()
}

fn polygon_area(vertices: &[glbridge_core::Vertex], face: &Face) -> f32 {
    let p0 = vertices[face.vertices[0]].position;
    let mut area = 0.0;
    for i in 1..face.vertices.len() - 1 {
        let p1 = vertices[face.vertices[i]].position;
        let p2 = vertices[face.vertices[i + 1]].position;
        area += (p1 - p0).cross(&(p2 - p0)).norm() * 0.5;
    }
    area
}

/// Drop vertices no face references, compacting indices. Returns removed count.
pub fn remove_loose(mesh: &mut MeshObject) -> usize {
    let mut remap = vec![usize::MAX; mesh.vertices.len()];
    for face in &mesh.faces {
        for &v in &face.vertices {
            remap[v] = 0;
        }
    }
    let mut next = 0;
    let mut kept = Vec::with_capacity(mesh.vertices.len());
    for (i, vertex) in mesh.vertices.iter().enumerate() {
        if remap[i] != usize::MAX {
            remap[i] = next;
            next += 1;
            kept.push(*vertex);
        }
    }
    let removed = mesh.vertices.len() - kept.len();
    mesh.vertices = kept;
    for face in &mut mesh.faces {
        for v in &mut face.vertices {
            *v = remap[*v];
        }
    }
    removed
}

/// Run the full repair sequence on a working copy
pub fn preprocess(copy: &mut WorkingCopy, config: &PreprocessConfig) -> Result<PreprocessReport> {
    let mesh = copy.mesh_mut();
    mesh.validate()?;

    let mut report = PreprocessReport {
        faces_in: mesh.faces.len(),
        ..Default::default()
    };

    report.polygons_triangulated = triangulate(mesh);

    merge_by_distance(mesh, config.dissolve_distance);
    report.degenerate_removed = dissolve_degenerate(mesh, config.dissolve_distance);

    let mut non_manifold = count_non_manifold_edges(mesh);
    report.non_manifold_before = non_manifold;

    for &threshold in &config.merge_thresholds {
        if non_manifold == 0 {
            break;
        }
        let mut candidate = mesh.clone();
        let merged = merge_by_distance(&mut candidate, threshold);
        if merged == 0 {
            continue;
        }
        let dissolved = dissolve_degenerate(&mut candidate, config.dissolve_distance);
        let remaining = count_non_manifold_edges(&candidate);
        if remaining < non_manifold {
            debug!(
                object = %mesh.name,
                threshold,
                merged,
                remaining,
                "weld reduced non-manifold edges"
            );
            *mesh = candidate;
            non_manifold = remaining;
            report.merge_threshold_used = Some(threshold);
            report.vertices_merged = merged;
            report.degenerate_removed += dissolved;
        }
    }
    report.non_manifold_after = non_manifold;

    report.loose_removed = remove_loose(mesh);
    mesh.recompute_normals();
    report.faces_out = mesh.faces.len();

    debug!(object = %mesh.name, summary = %report.summary(), "preprocessed");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glbridge_core::Vertex;

    fn make_quad_pair() -> MeshObject {
        // Two quads sharing an edge, split vertices along the shared edge
        let mut mesh = MeshObject::from_polygons(
            "pair",
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
                Point3f::new(1.00005, 0.0, 0.0),
                Point3f::new(2.0, 0.0, 0.0),
                Point3f::new(2.0, 1.0, 0.0),
                Point3f::new(1.00005, 1.0, 0.0),
            ],
            vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7]],
        )
        .with_material_slots(["M"]);
        mesh.add_uv_channel("UVMap");
        mesh
    }

    fn make_fin() -> MeshObject {
        // Three triangles sharing one edge: edge (0, 1) is non-manifold
        MeshObject::from_polygons(
            "fin",
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.5, 1.0, 0.0),
                Point3f::new(0.5, -1.0, 0.0),
                Point3f::new(0.5, 0.0, 1.0),
            ],
            vec![vec![0, 1, 2], vec![1, 0, 3], vec![0, 1, 4]],
        )
    }

    #[test]
    fn test_triangulate_carries_uvs() {
        let mut mesh = make_quad_pair();
        let split = triangulate(&mut mesh);
        assert_eq!(split, 2);
        assert_eq!(mesh.faces.len(), 4);
        assert!(mesh.faces.iter().all(|f| f.is_triangle() && f.uvs[0].len() == 3));
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_merge_by_distance_welds_seam() {
        let mut mesh = make_quad_pair();
        let merged = merge_by_distance(&mut mesh, 0.0001);
        assert_eq!(merged, 2);
        assert_eq!(mesh.faces[1].vertices, vec![1, 5, 6, 2]);
        assert_eq!(remove_loose(&mut mesh), 2);
        assert_eq!(mesh.vertex_count(), 6);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_dissolve_degenerate() {
        let mut mesh = make_fin();
        mesh.faces.push(Face::triangle(0, 0, 1, 0));
        mesh.vertices.push(Vertex::new(Point3f::new(2.0, 0.0, 0.0)));
        // collinear: zero area
        mesh.faces.push(Face::triangle(0, 1, 5, 0));
        assert_eq!(dissolve_degenerate(&mut mesh, 0.0001), 2);
        assert_eq!(mesh.faces.len(), 3);
    }

    #[test]
    fn test_diagnose() {
        let mesh = make_fin();
        let d = diagnose(&mesh);
        assert_eq!(d.triangles, 3);
        assert_eq!(d.non_manifold_edges, 1);
        assert!(d.has_issues());

        let quads = diagnose(&make_quad_pair());
        assert_eq!(quads.quads, 2);
        assert_eq!(quads.non_manifold_edges, 0);
    }

    #[test]
    fn test_preprocess_report() {
        let mut copy = WorkingCopy::duplicate(&make_quad_pair(), "t");
        let report = preprocess(&mut copy, &PreprocessConfig::default()).unwrap();
        assert_eq!(report.faces_in, 2);
        assert_eq!(report.polygons_triangulated, 2);
        assert_eq!(report.faces_out, 4);
        assert_eq!(report.loose_removed, 2);
        let mesh = copy.mesh();
        assert!(mesh.faces.iter().all(|f| f.is_triangle()));
        assert!(mesh.vertices.iter().all(|v| (v.normal.z - 1.0).abs() < 1e-5));
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_preprocess_escalates_until_manifold() {
        // A fin where the third triangle is nearly a duplicate of the first;
        // welding at 0.01 collapses it onto the first and clears the fin.
        let mut mesh = make_fin();
        mesh.vertices.push(Vertex::new(Point3f::new(0.5, 1.005, 0.0)));
        mesh.faces[2] = Face::new(vec![0, 1, 5], 0);
        let mut copy = WorkingCopy::duplicate(&mesh, "t");
        let report = preprocess(&mut copy, &PreprocessConfig::default()).unwrap();
        assert_eq!(report.non_manifold_before, 1);
        assert_eq!(report.merge_threshold_used, Some(0.01));
        assert!(!report.summary().is_empty());
    }

    #[test]
    fn test_preprocess_rejects_malformed() {
        let mut mesh = make_fin();
        mesh.faces[0].vertices[1] = 99;
        let mut copy = WorkingCopy::duplicate(&mesh, "t");
        assert!(preprocess(&mut copy, &PreprocessConfig::default()).is_err());
    }
}
