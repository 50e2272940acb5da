//! UV island detection on an existing channel
//!
//! Two faces belong to the same island when they share a mesh edge and agree
//! on the UV coordinates at both of its ends.

use crate::pack::{Chart, UvRegion};
use glbridge_core::{Error, MeshObject, Result, Uv};
use std::collections::HashMap;

const UV_EPSILON: f32 = 1e-5;

#[derive(Debug, Clone, PartialEq)]
pub struct UvIsland {
    pub faces: Vec<usize>,
    pub bounds: UvRegion,
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}

fn same_uv(a: &Uv, b: &Uv) -> bool {
    (a[0] - b[0]).abs() <= UV_EPSILON && (a[1] - b[1]).abs() <= UV_EPSILON
}

/// Islands of UV channel `channel` among `faces`, in order of their first face
pub fn find_islands(mesh: &MeshObject, channel: usize, faces: &[usize]) -> Result<Vec<UvIsland>> {
    if channel >= mesh.uv_channels.len() {
        return Err(Error::InvalidData(format!(
            "'{}' has no UV channel {}",
            mesh.name, channel
        )));
    }

    // (low vertex, high vertex) -> [(local face, uv at low, uv at high)]
    let mut edges: HashMap<(usize, usize), Vec<(usize, Uv, Uv)>> = HashMap::new();
    for (local, &fi) in faces.iter().enumerate() {
        let face = mesh
            .faces
            .get(fi)
            .ok_or_else(|| Error::malformed(&mesh.name, format!("face {} does not exist", fi)))?;
        let uvs = &face.uvs[channel];
        let n = face.vertices.len();
        for j in 0..n {
            let (a, b) = (face.vertices[j], face.vertices[(j + 1) % n]);
            let (ua, ub) = (uvs[j], uvs[(j + 1) % n]);
            let entry = if a <= b { (local, ua, ub) } else { (local, ub, ua) };
            edges.entry((a.min(b), a.max(b))).or_default().push(entry);
        }
    }

    let mut sets = DisjointSet::new(faces.len());
    for sharing in edges.values() {
        for (i, (fa, ua0, ua1)) in sharing.iter().enumerate() {
            for (fb, ub0, ub1) in &sharing[i + 1..] {
                if same_uv(ua0, ub0) && same_uv(ua1, ub1) {
                    sets.union(*fa, *fb);
                }
            }
        }
    }

    let mut index_of_root: HashMap<usize, usize> = HashMap::new();
    let mut islands: Vec<UvIsland> = Vec::new();
    for (local, &fi) in faces.iter().enumerate() {
        let root = sets.find(local);
        let face_bounds = UvRegion::from_points(mesh.faces[fi].uvs[channel].iter())
            .unwrap_or(UvRegion::new([0.0, 0.0], [0.0, 0.0]));
        match index_of_root.get(&root) {
            Some(&idx) => {
                let island = &mut islands[idx];
                island.faces.push(fi);
                island.bounds = island.bounds.union(&face_bounds);
            }
            None => {
                index_of_root.insert(root, islands.len());
                islands.push(UvIsland {
                    faces: vec![fi],
                    bounds: face_bounds,
                });
            }
        }
    }
    Ok(islands)
}

/// Existing UV islands turned into charts that keep their shape
pub fn island_charts(mesh: &MeshObject, channel: usize, faces: &[usize]) -> Result<Vec<Chart>> {
    Ok(find_islands(mesh, channel, faces)?
        .into_iter()
        .map(|island| {
            let corners = island
                .faces
                .iter()
                .map(|&fi| mesh.faces[fi].uvs[channel].clone())
                .collect();
            Chart::from_corners(island.faces, corners)
        })
        .collect())
}
