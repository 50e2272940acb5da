//! Evaluation of procedural subdivision
//!
//! Hosts export the evaluated mesh, so a duplicate of an object carrying
//! subdivision levels is refined before any processing sees it. Refinement
//! here is linear: every n-gon splits into n quads through its centroid and
//! edge midpoints, carrying UV corners along.

use crate::error::Result;
use crate::mesh::{Face, MeshObject, Vertex};
use crate::point::{Point3f, Uv};
use std::collections::HashMap;

fn mid_uv(a: Uv, b: Uv) -> Uv {
    [(a[0] + b[0]) * 0.5, (a[1] + b[1]) * 0.5]
}

fn subdivide_once(mesh: &MeshObject) -> MeshObject {
    let mut out = mesh.clone();
    out.faces = Vec::with_capacity(mesh.faces.len() * 4);
    let mut edge_points: HashMap<(usize, usize), usize> = HashMap::new();

    for face in &mesh.faces {
        let n = face.vertices.len();
        let centroid = face
            .vertices
            .iter()
            .fold(Point3f::origin().coords, |acc, &v| acc + mesh.vertices[v].position.coords)
            / n as f32;
        let center = out.vertices.len();
        out.vertices.push(Vertex::new(Point3f::from(centroid)));

        let mut mids = Vec::with_capacity(n);
        for i in 0..n {
            let a = face.vertices[i];
            let b = face.vertices[(i + 1) % n];
            let key = (a.min(b), a.max(b));
            let idx = *edge_points.entry(key).or_insert_with(|| {
                let p = Point3f::from(
                    (mesh.vertices[a].position.coords + mesh.vertices[b].position.coords) * 0.5,
                );
                out.vertices.push(Vertex::new(p));
                out.vertices.len() - 1
            });
            mids.push(idx);
        }

        let uv_centers: Vec<Uv> = face
            .uvs
            .iter()
            .map(|layer| {
                let sum = layer
                    .iter()
                    .fold([0.0f32, 0.0], |acc, uv| [acc[0] + uv[0], acc[1] + uv[1]]);
                [sum[0] / n as f32, sum[1] / n as f32]
            })
            .collect();

        for i in 0..n {
            let prev = (i + n - 1) % n;
            let next = (i + 1) % n;
            let uvs = face
                .uvs
                .iter()
                .zip(&uv_centers)
                .map(|(layer, &c)| {
                    vec![
                        layer[i],
                        mid_uv(layer[i], layer[next]),
                        c,
                        mid_uv(layer[prev], layer[i]),
                    ]
                })
                .collect();
            out.faces.push(Face {
                vertices: vec![face.vertices[i], mids[i], center, mids[prev]],
                material_index: face.material_index,
                uvs,
            });
        }
    }

    out
}

/// Refine `mesh` by `levels` rounds of linear subdivision.
///
/// The input must validate; refinement of a valid mesh stays valid.
pub fn subdivide(mesh: &MeshObject, levels: u32) -> Result<MeshObject> {
    mesh.validate()?;
    let mut current = mesh.clone();
    for _ in 0..levels {
        current = subdivide_once(&current);
    }
    if levels > 0 {
        current.recompute_normals();
    }
    Ok(current)
}

/// The mesh as a host would export it: subdivision applied at its viewport level
pub fn evaluate(mesh: &MeshObject) -> Result<MeshObject> {
    let mut evaluated = match mesh.subdivision {
        Some(levels) if levels.viewport > 0 => subdivide(mesh, levels.viewport)?,
        _ => {
            mesh.validate()?;
            mesh.clone()
        }
    };
    evaluated.subdivision = None;
    Ok(evaluated)
}
