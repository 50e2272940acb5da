//! Progressive vertex-pair collapse backend
//!
//! Works on a plain triangle soup, so it tolerates non-manifold edges and
//! inconsistent winding that the quadric backend rejects. Candidates live
//! in a binary heap and are invalidated lazily through per-vertex version
//! stamps. A first pass refuses collapses that flip a face normal; if it
//! runs dry before the target, a relaxed pass finishes the job.

use crate::backend::{Backend, MeshDecimator};
use crate::quadrics::{add_boundary_constraints, collapse_target, rebuild, triangles_of, vertex_quadrics};
use glbridge_core::{Error, MeshObject, Point3f, Result, Vector3f};
use nalgebra::Matrix4;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

#[derive(Debug, Clone, Copy)]
struct Candidate {
    cost: f64,
    v1: usize,
    v2: usize,
    stamp1: u32,
    stamp2: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cost.total_cmp(&other.cost) == Ordering::Equal
    }
}
impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; cheapest collapse first
        other.cost.total_cmp(&self.cost)
    }
}

struct Soup {
    positions: Vec<Point3f>,
    normals: Vec<Vector3f>,
    quadrics: Vec<Matrix4<f64>>,
    triangles: Vec<[usize; 3]>,
    face_alive: Vec<bool>,
    alive: usize,
    vertex_faces: Vec<Vec<usize>>,
    stamps: Vec<u32>,
    removed: Vec<bool>,
    heap: BinaryHeap<Candidate>,
}

impl Soup {
    fn new(mesh: &MeshObject, triangles: Vec<[usize; 3]>, boundary_weight: f64) -> Self {
        let positions: Vec<Point3f> = mesh.vertices.iter().map(|v| v.position).collect();
        let mut quadrics = vertex_quadrics(&positions, &triangles);
        if boundary_weight > 0.0 {
            add_boundary_constraints(&mut quadrics, &positions, &triangles, boundary_weight);
        }
        let mut vertex_faces = vec![Vec::new(); positions.len()];
        for (fi, t) in triangles.iter().enumerate() {
            for &v in t {
                vertex_faces[v].push(fi);
            }
        }
        let nv = positions.len();
        Self {
            normals: mesh.vertices.iter().map(|v| v.normal).collect(),
            quadrics,
            face_alive: vec![true; triangles.len()],
            alive: triangles.len(),
            triangles,
            vertex_faces,
            stamps: vec![0; nv],
            removed: vec![false; nv],
            heap: BinaryHeap::new(),
            positions,
        }
    }

    fn alive_faces(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        self.vertex_faces[v]
            .iter()
            .copied()
            .filter(move |&f| self.face_alive[f])
    }

    fn push_candidate(&mut self, v1: usize, v2: usize) {
        let q = self.quadrics[v1] + self.quadrics[v2];
        let (_, cost) = collapse_target(&q, &self.positions[v1], &self.positions[v2]);
        self.heap.push(Candidate {
            cost,
            v1,
            v2,
            stamp1: self.stamps[v1],
            stamp2: self.stamps[v2],
        });
    }

    fn neighbors(&self, v: usize) -> HashSet<usize> {
        self.alive_faces(v)
            .flat_map(|f| self.triangles[f])
            .filter(|&n| n != v)
            .collect()
    }

    fn seed_heap(&mut self) {
        self.heap.clear();
        let mut seen = HashSet::new();
        for fi in 0..self.triangles.len() {
            if !self.face_alive[fi] {
                continue;
            }
            let t = self.triangles[fi];
            for j in 0..3 {
                let (a, b) = (t[j], t[(j + 1) % 3]);
                if seen.insert((a.min(b), a.max(b))) {
                    self.push_candidate(a, b);
                }
            }
        }
    }

    fn triangle_normal(&self, t: [usize; 3], moved: &[usize; 2], to: &Point3f) -> Vector3f {
        let p = |v: usize| if moved.contains(&v) { *to } else { self.positions[v] };
        let (a, b, c) = (p(t[0]), p(t[1]), p(t[2]));
        (b - a).cross(&(c - a))
    }

    /// Whether moving v1 and v2 to `to` flips or degenerates any face that survives
    fn flips(&self, v1: usize, v2: usize, to: &Point3f) -> bool {
        let moved = [v1, v2];
        let none: [usize; 2] = [usize::MAX, usize::MAX];
        self.alive_faces(v1)
            .chain(self.alive_faces(v2))
            .filter(|&f| {
                let t = self.triangles[f];
                !(t.contains(&v1) && t.contains(&v2))
            })
            .any(|f| {
                let t = self.triangles[f];
                let before = self.triangle_normal(t, &none, to);
                let after = self.triangle_normal(t, &moved, to);
                after.norm_squared() < 1e-20 || before.dot(&after) <= 0.0
            })
    }

    fn run(&mut self, target: usize, min_faces: usize, prevent_flips: bool) -> usize {
        let mut skipped_for_minimum = 0;
        while self.alive > target {
            let Some(c) = self.heap.pop() else {
                break;
            };
            let (v1, v2) = (c.v1, c.v2);
            if self.removed[v1]
                || self.removed[v2]
                || self.stamps[v1] != c.stamp1
                || self.stamps[v2] != c.stamp2
            {
                continue;
            }

            let shared: Vec<usize> = self
                .alive_faces(v1)
                .filter(|&f| self.triangles[f].contains(&v2))
                .collect();
            if shared.is_empty() {
                continue;
            }
            if self.alive - shared.len() < min_faces {
                skipped_for_minimum += 1;
                continue;
            }

            let q = self.quadrics[v1] + self.quadrics[v2];
            let (pos, _) = collapse_target(&q, &self.positions[v1], &self.positions[v2]);
            if prevent_flips && self.flips(v1, v2, &pos) {
                continue;
            }

            // merge v2 into v1
            for &f in &shared {
                self.face_alive[f] = false;
            }
            self.alive -= shared.len();
            let moved: Vec<usize> = self.alive_faces(v2).collect();
            for f in moved {
                for corner in self.triangles[f].iter_mut() {
                    if *corner == v2 {
                        *corner = v1;
                    }
                }
                self.vertex_faces[v1].push(f);
            }
            self.vertex_faces[v2].clear();
            self.removed[v2] = true;
            self.positions[v1] = pos;
            self.quadrics[v1] = q;
            let avg = (self.normals[v1] + self.normals[v2]).normalize();
            if avg.iter().all(|x| x.is_finite()) {
                self.normals[v1] = avg;
            }
            self.stamps[v1] += 1;
            self.vertex_faces[v1].retain(|&f| self.face_alive[f]);

            for n in self.neighbors(v1) {
                self.push_candidate(v1, n);
            }
        }
        skipped_for_minimum
    }

    fn surviving(&self) -> Vec<(usize, [usize; 3])> {
        self.triangles
            .iter()
            .enumerate()
            .filter(|(fi, _)| self.face_alive[*fi])
            .map(|(fi, t)| (fi, *t))
            .collect()
    }
}

/// Greedy quadric-costed vertex pair collapse over a triangle soup.
#[derive(Debug, Clone)]
pub struct ProgressiveDecimator {
    /// Weight of the constraint planes placed along open borders
    pub boundary_weight: f64,
    /// Refuse collapses that flip a face normal (first pass only)
    pub prevent_flips: bool,
    /// Collapses that would leave fewer faces are skipped
    pub min_faces: usize,
}

impl Default for ProgressiveDecimator {
    fn default() -> Self {
        Self {
            boundary_weight: 100.0,
            prevent_flips: true,
            min_faces: 4,
        }
    }
}

impl ProgressiveDecimator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MeshDecimator for ProgressiveDecimator {
    fn backend(&self) -> Backend {
        Backend::Progressive
    }

    fn decimate(&self, mesh: &MeshObject, target_faces: usize) -> Result<MeshObject> {
        if mesh.faces.is_empty() {
            return Err(Error::InvalidData(format!("'{}' has no faces", mesh.name)));
        }
        let triangles = triangles_of(mesh)?;
        let target_faces = target_faces.max(self.min_faces);
        if triangles.len() <= target_faces {
            return Ok(mesh.clone());
        }

        let mut soup = Soup::new(mesh, triangles, self.boundary_weight);
        let passes: &[bool] = if self.prevent_flips { &[true, false] } else { &[false] };
        for &strict in passes {
            soup.seed_heap();
            let clamped = soup.run(target_faces, self.min_faces, strict);
            if clamped > 0 {
                tracing::debug!(object = %mesh.name, clamped, "skipped collapses below minimum face count");
            }
            if soup.alive <= target_faces {
                break;
            }
        }

        Ok(rebuild(mesh, &soup.positions, &soup.normals, soup.surviving()))
    }
}
