//! Quadric error metric helpers shared by both decimation backends

use crate::preprocess::edge_key;
use glbridge_core::{Error, Face, MeshObject, Point3f, Result, Vector3f, Vertex};
use nalgebra::{Matrix4, Vector4};
use std::collections::HashMap;

/// Plane through a triangle as `(a, b, c, d)` with unit normal, `None` if degenerate
pub(crate) fn compute_plane(v0: &Point3f, v1: &Point3f, v2: &Point3f) -> Option<Vector4<f64>> {
    let e1 = (v1 - v0).cast::<f64>();
    let e2 = (v2 - v0).cast::<f64>();
    let n = e1.cross(&e2);
    let len = n.norm();
    if !len.is_finite() || len < 1e-12 {
        return None;
    }
    let n = n / len;
    let d = -n.dot(&v0.coords.cast::<f64>());
    Some(Vector4::new(n.x, n.y, n.z, d))
}

pub(crate) fn plane_to_quadric(p: &Vector4<f64>) -> Matrix4<f64> {
    let (a, b, c, d) = (p[0], p[1], p[2], p[3]);
    Matrix4::new(
        a * a, a * b, a * c, a * d,
        a * b, b * b, b * c, b * d,
        a * c, b * c, c * c, c * d,
        a * d, b * d, c * d, d * d,
    )
}

/// Per-vertex sum of the quadrics of incident triangle planes
pub(crate) fn vertex_quadrics(positions: &[Point3f], triangles: &[[usize; 3]]) -> Vec<Matrix4<f64>> {
    let mut quadrics = vec![Matrix4::zeros(); positions.len()];
    for t in triangles {
        if let Some(plane) = compute_plane(&positions[t[0]], &positions[t[1]], &positions[t[2]]) {
            let q = plane_to_quadric(&plane);
            for &v in t {
                quadrics[v] += q;
            }
        }
    }
    quadrics
}

/// Add perpendicular constraint planes along boundary edges so open borders
/// resist collapsing inward.
pub(crate) fn add_boundary_constraints(
    quadrics: &mut [Matrix4<f64>],
    positions: &[Point3f],
    triangles: &[[usize; 3]],
    weight: f64,
) {
    let mut edge_faces: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
    for (ti, t) in triangles.iter().enumerate() {
        for j in 0..3 {
            edge_faces
                .entry(edge_key(t[j], t[(j + 1) % 3]))
                .or_default()
                .push(ti);
        }
    }
    for (&(a, b), faces) in &edge_faces {
        if faces.len() != 1 {
            continue;
        }
        let t = triangles[faces[0]];
        let Some(face_plane) = compute_plane(&positions[t[0]], &positions[t[1]], &positions[t[2]])
        else {
            continue;
        };
        let edge = (positions[b] - positions[a]).cast::<f64>();
        let face_n = face_plane.xyz();
        let n = edge.cross(&face_n);
        let len = n.norm();
        if len < 1e-12 {
            continue;
        }
        let n = n / len;
        let d = -n.dot(&positions[a].coords.cast::<f64>());
        let q = plane_to_quadric(&Vector4::new(n.x, n.y, n.z, d)) * weight;
        quadrics[a] += q;
        quadrics[b] += q;
    }
}

pub(crate) fn quadric_error(q: &Matrix4<f64>, p: &Point3f) -> f64 {
    let vh = Vector4::new(p.x as f64, p.y as f64, p.z as f64, 1.0);
    (vh.transpose() * q * vh)[0].max(0.0)
}

/// Optimal position and error for merging two vertices with combined quadric `q`
pub(crate) fn collapse_target(q: &Matrix4<f64>, p1: &Point3f, p2: &Point3f) -> (Point3f, f64) {
    let q3 = q.fixed_view::<3, 3>(0, 0).into_owned();
    let q1 = q.fixed_view::<3, 1>(0, 3).into_owned();

    if q3.determinant().abs() > 1e-10 {
        if let Some(inv) = q3.try_inverse() {
            let p = -inv * q1;
            let optimal = Point3f::new(p[0] as f32, p[1] as f32, p[2] as f32);
            if optimal.iter().all(|c| c.is_finite()) {
                return (optimal, quadric_error(q, &optimal));
            }
        }
    }

    let mid = Point3f::from((p1.coords + p2.coords) * 0.5);
    [*p1, *p2, mid]
        .into_iter()
        .map(|p| (p, quadric_error(q, &p)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .unwrap_or((mid, 0.0))
}

/// Triangle index lists of an already triangulated mesh
pub(crate) fn triangles_of(mesh: &MeshObject) -> Result<Vec<[usize; 3]>> {
    mesh.faces
        .iter()
        .enumerate()
        .map(|(fi, f)| match f.vertices.as_slice() {
            &[a, b, c] => Ok([a, b, c]),
            _ => Err(Error::Algorithm(format!(
                "face {} of '{}' is not a triangle; preprocess first",
                fi, mesh.name
            ))),
        })
        .collect()
}

/// Build the decimated mesh from surviving triangles.
///
/// Each surviving triangle keeps the material slot and UV corners of the
/// source face it started as; corner order is preserved by both backends.
pub(crate) fn rebuild(
    source: &MeshObject,
    positions: &[Point3f],
    normals: &[Vector3f],
    triangles: impl IntoIterator<Item = (usize, [usize; 3])>,
) -> MeshObject {
    let mut out = source.clone();
    out.vertices.clear();
    out.faces.clear();
    let mut remap: HashMap<usize, usize> = HashMap::new();

    for (origin, tri) in triangles {
        if tri[0] == tri[1] || tri[1] == tri[2] || tri[2] == tri[0] {
            continue;
        }
        let vertices = tri
            .iter()
            .map(|&v| {
                *remap.entry(v).or_insert_with(|| {
                    out.vertices.push(Vertex::with_normal(positions[v], normals[v]));
                    out.vertices.len() - 1
                })
            })
            .collect();
        let src = &source.faces[origin];
        out.faces.push(Face {
            vertices,
            material_index: src.material_index,
            uvs: src.uvs.clone(),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_plane_of_xy_triangle() {
        let plane = compute_plane(
            &Point3f::new(0.0, 0.0, 1.0),
            &Point3f::new(1.0, 0.0, 1.0),
            &Point3f::new(0.0, 1.0, 1.0),
        )
        .unwrap();
        assert_relative_eq!(plane[2], 1.0);
        assert_relative_eq!(plane[3], -1.0);
    }

    #[test]
    fn test_degenerate_plane() {
        let p = Point3f::new(1.0, 1.0, 1.0);
        assert!(compute_plane(&p, &p, &p).is_none());
    }

    #[test]
    fn test_coplanar_collapse_has_zero_error() {
        let positions = vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
            Point3f::new(1.0, 1.0, 0.0),
        ];
        let tris = vec![[0, 1, 2], [1, 3, 2]];
        let q = vertex_quadrics(&positions, &tris);
        let (_, cost) = collapse_target(&(q[1] + q[2]), &positions[1], &positions[2]);
        assert_relative_eq!(cost, 0.0, epsilon = 1e-9);
    }
}
