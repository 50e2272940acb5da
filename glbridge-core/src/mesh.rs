//! Mesh data structures and functionality

use crate::error::{Error, Result};
use crate::point::*;
use crate::transform::Transform3D;
use serde::{Deserialize, Serialize};

/// A mesh vertex with position and normal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub position: Point3f,
    pub normal: Vector3f,
}

impl Vertex {
    pub fn new(position: Point3f) -> Self {
        Self {
            position,
            normal: Vector3f::zeros(),
        }
    }

    pub fn with_normal(position: Point3f, normal: Vector3f) -> Self {
        Self { position, normal }
    }
}

/// A polygon face.
///
/// `uvs[channel][corner]` holds one coordinate per corner for every UV
/// channel declared on the owning mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub vertices: Vec<usize>,
    pub material_index: usize,
    pub uvs: Vec<Vec<Uv>>,
}

impl Face {
    pub fn new(vertices: Vec<usize>, material_index: usize) -> Self {
        Self {
            vertices,
            material_index,
            uvs: Vec::new(),
        }
    }

    pub fn triangle(a: usize, b: usize, c: usize, material_index: usize) -> Self {
        Self::new(vec![a, b, c], material_index)
    }

    pub fn corner_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_triangle(&self) -> bool {
        self.vertices.len() == 3
    }
}

/// A material slot. Whether the slot is used is computed from faces, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialSlot {
    pub material: Option<String>,
}

impl MaterialSlot {
    pub fn new(material: impl Into<String>) -> Self {
        Self {
            material: Some(material.into()),
        }
    }

    pub fn empty() -> Self {
        Self { material: None }
    }

    pub fn name(&self) -> &str {
        self.material.as_deref().unwrap_or("<empty>")
    }
}

/// Procedural subdivision levels carried by an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubdivisionLevels {
    pub viewport: u32,
    pub render: u32,
}

impl SubdivisionLevels {
    pub fn new(viewport: u32, render: u32) -> Self {
        Self { viewport, render }
    }

    /// Clamp both levels to `cap`. Levels are only ever reduced.
    pub fn capped(self, cap: u32) -> Self {
        Self {
            viewport: self.viewport.min(cap),
            render: self.render.min(cap),
        }
    }

    pub fn exceeds(&self, cap: u32) -> bool {
        self.viewport > cap || self.render > cap
    }
}

/// A named polygon mesh object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshObject {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub faces: Vec<Face>,
    pub material_slots: Vec<MaterialSlot>,
    pub uv_channels: Vec<String>,
    pub transform: Transform3D,
    pub subdivision: Option<SubdivisionLevels>,
}

impl MeshObject {
    /// Create a new empty mesh object
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vertices: Vec::new(),
            faces: Vec::new(),
            material_slots: Vec::new(),
            uv_channels: Vec::new(),
            transform: Transform3D::identity(),
            subdivision: None,
        }
    }

    /// Create a mesh from positions and polygon index lists, all faces on slot 0
    pub fn from_polygons(
        name: impl Into<String>,
        positions: Vec<Point3f>,
        polygons: Vec<Vec<usize>>,
    ) -> Self {
        let mut mesh = Self::new(name);
        mesh.vertices = positions.into_iter().map(Vertex::new).collect();
        mesh.faces = polygons.into_iter().map(|p| Face::new(p, 0)).collect();
        mesh
    }

    pub fn with_material_slots<I, S>(mut self, materials: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.material_slots = materials.into_iter().map(MaterialSlot::new).collect();
        self
    }

    pub fn with_transform(mut self, transform: Transform3D) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_subdivision(mut self, levels: SubdivisionLevels) -> Self {
        self.subdivision = Some(levels);
        self
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Number of triangles this mesh would have after fan triangulation
    pub fn triangle_count(&self) -> usize {
        self.faces
            .iter()
            .map(|f| f.vertices.len().saturating_sub(2))
            .sum()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    pub fn has_uvs(&self) -> bool {
        !self.uv_channels.is_empty()
    }

    pub fn uv_channel_index(&self, name: &str) -> Option<usize> {
        self.uv_channels.iter().position(|c| c == name)
    }

    /// Add a UV channel, filling every face corner with `[0, 0]`.
    /// Returns the channel index; an existing channel of the same name is reused.
    pub fn add_uv_channel(&mut self, name: impl Into<String>) -> usize {
        let name = name.into();
        if let Some(idx) = self.uv_channel_index(&name) {
            return idx;
        }
        for face in &mut self.faces {
            face.uvs.push(vec![[0.0, 0.0]; face.vertices.len()]);
        }
        self.uv_channels.push(name);
        self.uv_channels.len() - 1
    }

    /// Check all index invariants
    pub fn validate(&self) -> Result<()> {
        let nv = self.vertices.len();
        let ns = self.material_slots.len();
        let nc = self.uv_channels.len();
        for (fi, face) in self.faces.iter().enumerate() {
            if face.vertices.len() < 3 {
                return Err(Error::malformed(
                    &self.name,
                    format!("face {} has {} corners", fi, face.vertices.len()),
                ));
            }
            if let Some(&bad) = face.vertices.iter().find(|&&v| v >= nv) {
                return Err(Error::malformed(
                    &self.name,
                    format!("face {} references vertex {} of {}", fi, bad, nv),
                ));
            }
            let slot_ok = if ns == 0 {
                face.material_index == 0
            } else {
                face.material_index < ns
            };
            if !slot_ok {
                return Err(Error::malformed(
                    &self.name,
                    format!(
                        "face {} references material slot {} of {}",
                        fi, face.material_index, ns
                    ),
                ));
            }
            if face.uvs.len() != nc {
                return Err(Error::malformed(
                    &self.name,
                    format!("face {} has {} UV layers, mesh has {}", fi, face.uvs.len(), nc),
                ));
            }
            if face.uvs.iter().any(|layer| layer.len() != face.vertices.len()) {
                return Err(Error::malformed(
                    &self.name,
                    format!("face {} has a UV layer with the wrong corner count", fi),
                ));
            }
        }
        Ok(())
    }

    /// Area of a polygon face (fan sum)
    pub fn face_area(&self, face: &Face) -> f32 {
        let p0 = self.vertices[face.vertices[0]].position;
        let mut area = 0.0;
        for i in 1..face.vertices.len().saturating_sub(1) {
            let p1 = self.vertices[face.vertices[i]].position;
            let p2 = self.vertices[face.vertices[i + 1]].position;
            area += (p1 - p0).cross(&(p2 - p0)).norm() * 0.5;
        }
        area
    }

    /// Unnormalized polygon normal (Newell's method); its length is twice the area
    pub fn face_normal_raw(&self, face: &Face) -> Vector3f {
        let mut n = Vector3f::zeros();
        let count = face.vertices.len();
        for i in 0..count {
            let a = self.vertices[face.vertices[i]].position;
            let b = self.vertices[face.vertices[(i + 1) % count]].position;
            n.x += (a.y - b.y) * (a.z + b.z);
            n.y += (a.z - b.z) * (a.x + b.x);
            n.z += (a.x - b.x) * (a.y + b.y);
        }
        n
    }

    /// Calculate face normals
    pub fn calculate_face_normals(&self) -> Vec<Vector3f> {
        self.faces
            .iter()
            .map(|f| {
                let n = self.face_normal_raw(f);
                let len = n.norm();
                if len > f32::EPSILON {
                    n / len
                } else {
                    Vector3f::zeros()
                }
            })
            .collect()
    }

    /// Recompute area-weighted vertex normals from face geometry
    pub fn recompute_normals(&mut self) {
        let mut acc = vec![Vector3f::zeros(); self.vertices.len()];
        for face in &self.faces {
            let n = self.face_normal_raw(face);
            for &v in &face.vertices {
                acc[v] += n;
            }
        }
        for (vertex, n) in self.vertices.iter_mut().zip(acc) {
            let len = n.norm();
            vertex.normal = if len > f32::EPSILON {
                n / len
            } else {
                Vector3f::new(0.0, 0.0, 1.0)
            };
        }
    }

    /// Return a copy with the object transform baked into vertex data
    pub fn baked(&self) -> MeshObject {
        let mut out = self.clone();
        if self.transform.is_identity(1e-6) {
            return out;
        }
        let normal_matrix = self.transform.normal_matrix();
        for v in &mut out.vertices {
            v.position = self.transform.transform_point(&v.position);
            let n = normal_matrix * v.normal;
            let len = n.norm();
            v.normal = if len > f32::EPSILON { n / len } else { v.normal };
        }
        out.transform = Transform3D::identity();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn make_quad() -> MeshObject {
        MeshObject::from_polygons(
            "quad",
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            vec![vec![0, 1, 2, 3]],
        )
        .with_material_slots(["Mat"])
    }

    #[test]
    fn test_counts() {
        let mesh = make_quad();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.face_count(), 1);
        assert_eq!(mesh.triangle_count(), 2);
        assert!(!mesh.has_uvs());
    }

    #[test]
    fn test_validate_ok() {
        assert!(make_quad().validate().is_ok());
    }

    #[test]
    fn test_validate_bad_vertex() {
        let mut mesh = make_quad();
        mesh.faces[0].vertices[2] = 17;
        assert!(matches!(mesh.validate(), Err(Error::MalformedMesh { .. })));
    }

    #[test]
    fn test_validate_bad_slot() {
        let mut mesh = make_quad();
        mesh.faces[0].material_index = 3;
        assert!(matches!(mesh.validate(), Err(Error::MalformedMesh { .. })));
    }

    #[test]
    fn test_validate_slotless_mesh_requires_zero_index() {
        let mut mesh = make_quad();
        mesh.material_slots.clear();
        assert!(mesh.validate().is_ok());
        mesh.faces[0].material_index = 1;
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn test_add_uv_channel() {
        let mut mesh = make_quad();
        let idx = mesh.add_uv_channel("UVMap");
        assert_eq!(idx, 0);
        assert_eq!(mesh.faces[0].uvs[0].len(), 4);
        assert_eq!(mesh.add_uv_channel("UVMap"), 0);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_face_area_and_normals() {
        let mut mesh = make_quad();
        let face = mesh.faces[0].clone();
        assert_relative_eq!(mesh.face_area(&face), 1.0, epsilon = 1e-6);
        mesh.recompute_normals();
        for v in &mesh.vertices {
            assert_relative_eq!(v.normal.z, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_baked_transform() {
        let mesh = make_quad()
            .with_transform(Transform3D::translation(Vector3::new(2.0, 0.0, 0.0)));
        let baked = mesh.baked();
        assert_relative_eq!(baked.vertices[0].position.x, 2.0);
        assert!(baked.transform.is_identity(1e-6));
        // the source keeps its own transform
        assert_relative_eq!(mesh.vertices[0].position.x, 0.0);
    }

    #[test]
    fn test_subdivision_capped() {
        let levels = SubdivisionLevels::new(4, 3);
        assert!(levels.exceeds(2));
        assert_eq!(levels.capped(2), SubdivisionLevels::new(2, 2));
        assert_eq!(SubdivisionLevels::new(1, 0).capped(2), SubdivisionLevels::new(1, 0));
    }
}
