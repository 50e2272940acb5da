//! Quadric edge collapse backend
//!
//! Collapses edges in quadric error (QEM) order over a table of manifold
//! triangles that still know their source face. Edges between faces with
//! different material slots or UV coordinates form seams: a collapse that
//! would pinch a seam pays `seam_weight` on top of its geometric error, and
//! a collapse that merely touches one keeps the seam vertex where it is.
//!
//! Input must be consistently wound and manifold. An edge traversed twice in
//! the same direction is rejected up front so the caller can fall back to the
//! progressive backend.

use crate::backend::{Backend, MeshDecimator};
use crate::preprocess::edge_key;
use crate::quadrics::{collapse_target, quadric_error, rebuild, triangles_of, vertex_quadrics};
use glbridge_core::{Error, MeshObject, Point3f, Result, Uv, Vector3f};
use nalgebra::Matrix4;
use priority_queue::PriorityQueue;
use std::cmp::{Ordering, Reverse};
use std::collections::HashSet;

/// Collapse cost with a total order so it can key the priority queue
#[derive(Debug, Clone, Copy)]
struct Cost(f64);

impl PartialEq for Cost {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}
impl Eq for Cost {}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cost {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Cheapest edge first; pushing an edge again replaces its cost
type EdgeQueue = PriorityQueue<(usize, usize), Reverse<Cost>>;

/// How one edge would collapse: `drop` merges into `keep` at `position`
#[derive(Debug, Clone, Copy)]
struct Collapse {
    keep: usize,
    drop: usize,
    position: Point3f,
    cost: f64,
}

/// Manifold triangles indexed by their source face.
///
/// Triangle `f` keeps corner order through every collapse, so corner `k`
/// always reads its UVs from corner `k` of `source.faces[f]`.
struct TriangleTable<'a> {
    source: &'a MeshObject,
    corners: Vec<[usize; 3]>,
    face_alive: Vec<bool>,
    alive: usize,
    /// Triangles touching each vertex
    incident: Vec<Vec<usize>>,
    positions: Vec<Point3f>,
    normals: Vec<Vector3f>,
    quadrics: Vec<Matrix4<f64>>,
    removed: Vec<bool>,
}

impl<'a> TriangleTable<'a> {
    fn new(source: &'a MeshObject) -> Result<Self> {
        let corners = triangles_of(source)?;

        let mut directed = HashSet::with_capacity(corners.len() * 3);
        for t in &corners {
            for j in 0..3 {
                let (from, to) = (t[j], t[(j + 1) % 3]);
                if !directed.insert((from, to)) {
                    return Err(Error::Algorithm(format!(
                        "'{}' has non-manifold or inconsistently wound edge ({}, {})",
                        source.name, from, to
                    )));
                }
            }
        }

        let nv = source.vertices.len();
        let mut incident = vec![Vec::new(); nv];
        for (fi, t) in corners.iter().enumerate() {
            for &v in t {
                incident[v].push(fi);
            }
        }

        let positions: Vec<Point3f> = source.vertices.iter().map(|v| v.position).collect();
        let quadrics = vertex_quadrics(&positions, &corners);

        Ok(Self {
            source,
            face_alive: vec![true; corners.len()],
            alive: corners.len(),
            corners,
            incident,
            normals: source.vertices.iter().map(|v| v.normal).collect(),
            positions,
            quadrics,
            removed: vec![false; nv],
        })
    }

    fn faces_of(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        self.incident[v]
            .iter()
            .copied()
            .filter(move |&f| self.face_alive[f])
    }

    /// Live triangles using the undirected edge (a, b)
    fn edge_faces(&self, a: usize, b: usize) -> Vec<usize> {
        self.faces_of(a)
            .filter(|&f| self.corners[f].contains(&b))
            .collect()
    }

    fn neighbors(&self, v: usize) -> HashSet<usize> {
        self.faces_of(v)
            .flat_map(|f| self.corners[f])
            .filter(|&n| n != v)
            .collect()
    }

    fn is_boundary_vertex(&self, v: usize) -> bool {
        self.neighbors(v)
            .into_iter()
            .any(|n| self.edge_faces(v, n).len() == 1)
    }

    /// UVs of vertex `v` as seen from triangle `f`, one entry per channel
    fn corner_uvs(&self, f: usize, v: usize) -> impl Iterator<Item = Option<Uv>> + '_ {
        let corner = self.corners[f].iter().position(|&c| c == v);
        self.source.faces[f]
            .uvs
            .iter()
            .map(move |channel| corner.and_then(|k| channel.get(k).copied()))
    }

    /// Whether the two faces across (a, b) disagree on material or UVs
    fn is_seam(&self, a: usize, b: usize) -> bool {
        let faces = self.edge_faces(a, b);
        let &[f, g] = faces.as_slice() else {
            return false;
        };
        if self.source.faces[f].material_index != self.source.faces[g].material_index {
            return true;
        }
        [a, b]
            .into_iter()
            .any(|v| !self.corner_uvs(f, v).eq(self.corner_uvs(g, v)))
    }

    fn on_seam(&self, v: usize) -> bool {
        self.neighbors(v).into_iter().any(|n| self.is_seam(v, n))
    }

    /// Common neighbours must be exactly the apices opposite the edge,
    /// otherwise the collapse would fold the surface onto itself
    fn link_ok(&self, a: usize, b: usize) -> bool {
        let shared = self.edge_faces(a, b).len();
        shared > 0 && self.neighbors(a).intersection(&self.neighbors(b)).count() == shared
    }

    fn plan(&self, a: usize, b: usize, settings: &QuadricDecimator) -> Option<Collapse> {
        if self.edge_faces(a, b).is_empty() {
            return None;
        }
        let boundary = self.is_boundary_vertex(a) || self.is_boundary_vertex(b);
        if boundary && settings.preserve_boundary {
            return None;
        }

        let q = self.quadrics[a] + self.quadrics[b];
        let pinned = |keep: usize, drop: usize| Collapse {
            keep,
            drop,
            position: self.positions[keep],
            cost: quadric_error(&q, &self.positions[keep]),
        };
        let mut collapse = match (self.on_seam(a), self.on_seam(b)) {
            (true, false) => pinned(a, b),
            (false, true) => pinned(b, a),
            (both, _) => {
                let (position, cost) = collapse_target(&q, &self.positions[a], &self.positions[b]);
                let seam = if both { settings.seam_weight } else { 0.0 };
                Collapse {
                    keep: a,
                    drop: b,
                    position,
                    cost: cost + seam,
                }
            }
        };
        if boundary {
            collapse.cost += settings.boundary_weight;
        }
        Some(collapse)
    }

    /// Merge `drop` into `keep`; triangles using both vanish, the rest are
    /// rewritten in place
    fn collapse(&mut self, c: &Collapse) {
        for f in std::mem::take(&mut self.incident[c.drop]) {
            if !self.face_alive[f] {
                continue;
            }
            if self.corners[f].contains(&c.keep) {
                self.face_alive[f] = false;
                self.alive -= 1;
            } else {
                for corner in self.corners[f].iter_mut().filter(|v| **v == c.drop) {
                    *corner = c.keep;
                }
                self.incident[c.keep].push(f);
            }
        }
        let alive = &self.face_alive;
        self.incident[c.keep].retain(|&f| alive[f]);
        self.removed[c.drop] = true;

        self.positions[c.keep] = c.position;
        let merged = self.quadrics[c.drop];
        self.quadrics[c.keep] += merged;
        let avg = (self.normals[c.keep] + self.normals[c.drop]).normalize();
        if avg.iter().all(|x| x.is_finite()) {
            self.normals[c.keep] = avg;
        }
    }

    fn surviving(&self) -> impl Iterator<Item = (usize, [usize; 3])> + '_ {
        self.corners
            .iter()
            .enumerate()
            .filter(|(f, _)| self.face_alive[*f])
            .map(|(f, t)| (f, *t))
    }
}

/// Seam-aware quadric edge collapse decimator.
#[derive(Debug, Clone)]
pub struct QuadricDecimator {
    /// Stop when the cheapest remaining collapse exceeds this error
    pub error_threshold: Option<f64>,
    /// Never collapse edges touching the mesh boundary
    pub preserve_boundary: bool,
    /// Extra cost for collapses touching the boundary
    pub boundary_weight: f64,
    /// Extra cost for collapses joining two vertices on a material or UV seam
    pub seam_weight: f64,
    /// Collapses that would leave fewer faces are skipped
    pub min_faces: usize,
}

impl Default for QuadricDecimator {
    fn default() -> Self {
        Self {
            error_threshold: None,
            preserve_boundary: true,
            boundary_weight: 100.0,
            seam_weight: 10.0,
            min_faces: 4,
        }
    }
}

impl QuadricDecimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(
        error_threshold: Option<f64>,
        preserve_boundary: bool,
        boundary_weight: f64,
    ) -> Self {
        Self {
            error_threshold,
            preserve_boundary,
            boundary_weight,
            ..Self::default()
        }
    }

    fn seed(&self, table: &TriangleTable) -> EdgeQueue {
        let mut queue = EdgeQueue::new();
        for t in table.surviving().map(|(_, t)| t) {
            for j in 0..3 {
                let key = edge_key(t[j], t[(j + 1) % 3]);
                if queue.get(&key).is_some() {
                    continue;
                }
                if let Some(c) = table.plan(key.0, key.1, self) {
                    queue.push(key, Reverse(Cost(c.cost)));
                }
            }
        }
        queue
    }
}

impl MeshDecimator for QuadricDecimator {
    fn backend(&self) -> Backend {
        Backend::Quadric
    }

    fn decimate(&self, mesh: &MeshObject, target_faces: usize) -> Result<MeshObject> {
        if mesh.faces.is_empty() {
            return Err(Error::InvalidData(format!("'{}' has no faces", mesh.name)));
        }
        let target_faces = target_faces.max(self.min_faces);
        let mut table = TriangleTable::new(mesh)?;
        if table.alive <= target_faces {
            return Ok(mesh.clone());
        }

        let mut queue = self.seed(&table);
        while table.alive > target_faces {
            let Some(((a, b), Reverse(Cost(queued)))) = queue.pop() else {
                break;
            };
            if table.removed[a] || table.removed[b] {
                continue;
            }
            let Some(collapse) = table.plan(a, b, self) else {
                continue;
            };
            // Neighbouring collapses can make an edge dearer after it was queued
            if collapse.cost > queued + 1e-12 {
                queue.push((a, b), Reverse(Cost(collapse.cost)));
                continue;
            }
            if self.error_threshold.is_some_and(|t| collapse.cost > t) {
                break;
            }
            let removing = table.edge_faces(a, b).len();
            if table.alive - removing < self.min_faces || !table.link_ok(a, b) {
                continue;
            }

            table.collapse(&collapse);
            for n in table.neighbors(collapse.keep) {
                if let Some(c) = table.plan(collapse.keep, n, self) {
                    queue.push(edge_key(collapse.keep, n), Reverse(Cost(c.cost)));
                }
            }
        }

        Ok(rebuild(
            mesh,
            &table.positions,
            &table.normals,
            table.surviving(),
        ))
    }
}
