//! Working copies: disposable duplicates used for destructive processing
//!
//! Every destructive stage takes `&mut WorkingCopy`. A `WorkingCopy` can only
//! be built by duplicating or joining, so originals never reach those stages.

use crate::error::{Error, Result};
use crate::mesh::{Face, MaterialSlot, MeshObject};
use std::collections::HashMap;

/// An owned transient duplicate of one or more mesh objects
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingCopy {
    mesh: MeshObject,
    sources: Vec<String>,
}

impl WorkingCopy {
    /// Duplicate `original` under `temp_name`
    pub fn duplicate(original: &MeshObject, temp_name: impl Into<String>) -> Self {
        let mut mesh = original.clone();
        mesh.name = temp_name.into();
        Self {
            mesh,
            sources: vec![original.name.clone()],
        }
    }

    /// Join several copies into one, baking their transforms into world space.
    ///
    /// Material slots are merged by material name and UV channels are unioned
    /// by name; faces of a member that lacks a channel get `[0, 0]` corners.
    pub fn join(temp_name: impl Into<String>, members: &[&WorkingCopy]) -> Result<Self> {
        let temp_name = temp_name.into();
        if members.is_empty() {
            return Err(Error::InvalidData(format!(
                "cannot join '{}' from zero members",
                temp_name
            )));
        }

        let mut channels: Vec<String> = Vec::new();
        for member in members {
            for c in &member.mesh.uv_channels {
                if !channels.contains(c) {
                    channels.push(c.clone());
                }
            }
        }

        let mut joined = MeshObject::new(temp_name);
        joined.uv_channels = channels.clone();
        let mut slot_lookup: HashMap<Option<String>, usize> = HashMap::new();
        let mut sources = Vec::new();

        for member in members {
            member.mesh.validate()?;
            let baked = member.mesh.baked();
            let offset = joined.vertices.len();
            joined.vertices.extend(baked.vertices.iter().copied());

            let slot_map: Vec<usize> = baked
                .material_slots
                .iter()
                .map(|slot| {
                    *slot_lookup.entry(slot.material.clone()).or_insert_with(|| {
                        joined.material_slots.push(slot.clone());
                        joined.material_slots.len() - 1
                    })
                })
                .collect();

            for face in &baked.faces {
                let material_index = if slot_map.is_empty() {
                    // slotless members land on a shared empty slot
                    *slot_lookup.entry(None).or_insert_with(|| {
                        joined.material_slots.push(MaterialSlot::empty());
                        joined.material_slots.len() - 1
                    })
                } else {
                    slot_map[face.material_index]
                };
                let uvs = channels
                    .iter()
                    .map(|c| match baked.uv_channel_index(c) {
                        Some(idx) => face.uvs[idx].clone(),
                        None => vec![[0.0, 0.0]; face.vertices.len()],
                    })
                    .collect();
                joined.faces.push(Face {
                    vertices: face.vertices.iter().map(|v| v + offset).collect(),
                    material_index,
                    uvs,
                });
            }
            sources.extend(member.sources.iter().cloned());
        }

        tracing::debug!(
            joined = %joined.name,
            members = members.len(),
            faces = joined.faces.len(),
            slots = joined.material_slots.len(),
            "joined working copies"
        );

        Ok(Self {
            mesh: joined,
            sources,
        })
    }

    pub fn name(&self) -> &str {
        &self.mesh.name
    }

    /// Names of the original objects this copy was derived from
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn mesh(&self) -> &MeshObject {
        &self.mesh
    }

    pub fn mesh_mut(&mut self) -> &mut MeshObject {
        &mut self.mesh
    }

    pub fn into_mesh(self) -> MeshObject {
        self.mesh
    }
}

/// Name-keyed arena of working copies, in export order
#[derive(Debug, Default)]
pub struct WorkingSet {
    order: Vec<String>,
    copies: HashMap<String, WorkingCopy>,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a copy under `key`, replacing any previous copy with that key
    pub fn insert(&mut self, key: impl Into<String>, copy: WorkingCopy) {
        let key = key.into();
        if self.copies.insert(key.clone(), copy).is_none() {
            self.order.push(key);
        }
    }

    pub fn get(&self, key: &str) -> Option<&WorkingCopy> {
        self.copies.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut WorkingCopy> {
        self.copies.get_mut(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.copies.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<WorkingCopy> {
        let removed = self.copies.remove(key);
        if removed.is_some() {
            self.order.retain(|k| k != key);
        }
        removed
    }

    /// Replace `members` with a single `joined` copy placed where the first member was
    pub fn replace_with_joined(&mut self, members: &[String], key: impl Into<String>, joined: WorkingCopy) {
        let key = key.into();
        let position = self
            .order
            .iter()
            .position(|k| members.contains(k))
            .unwrap_or(self.order.len());
        for m in members {
            self.copies.remove(m);
        }
        self.order.retain(|k| !members.contains(k));
        let position = position.min(self.order.len());
        self.order.insert(position, key.clone());
        self.copies.insert(key, joined);
    }

    pub fn keys(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &WorkingCopy)> {
        self.order
            .iter()
            .filter_map(move |k| self.copies.get(k).map(|c| (k.as_str(), c)))
    }

    /// Mutable access to every copy with its key, in arbitrary order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut WorkingCopy)> {
        self.copies.iter_mut().map(|(k, c)| (k.as_str(), c))
    }

    /// Consume the set, yielding copies in export order
    pub fn into_ordered(mut self) -> Vec<(String, WorkingCopy)> {
        self.order
            .into_iter()
            .filter_map(|k| self.copies.remove(&k).map(|c| (k, c)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::Point3f;
    use crate::transform::Transform3D;
    use nalgebra::Vector3;

    fn make_triangle(name: &str, material: &str) -> MeshObject {
        MeshObject::from_polygons(
            name,
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            vec![vec![0, 1, 2]],
        )
        .with_material_slots([material])
    }

    #[test]
    fn test_duplicate_leaves_original() {
        let original = make_triangle("Tri", "Mat");
        let mut copy = WorkingCopy::duplicate(&original, "TEMP_DATA_Tri");
        copy.mesh_mut().faces.clear();
        assert_eq!(original.face_count(), 1);
        assert_eq!(copy.name(), "TEMP_DATA_Tri");
        assert_eq!(copy.sources(), &["Tri".to_string()]);
    }

    #[test]
    fn test_join_merges_slots_and_bakes_transforms() {
        let a = WorkingCopy::duplicate(&make_triangle("A", "Shared"), "TEMP_DATA_A");
        let b_mesh = make_triangle("B", "Shared")
            .with_transform(Transform3D::translation(Vector3::new(5.0, 0.0, 0.0)));
        let b = WorkingCopy::duplicate(&b_mesh, "TEMP_DATA_B");

        let joined = WorkingCopy::join("UV_Atlas_Shared", &[&a, &b]).unwrap();
        let mesh = joined.mesh();
        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.face_count(), 2);
        assert_eq!(mesh.material_slots.len(), 1);
        assert_eq!(mesh.faces[1].vertices, vec![3, 4, 5]);
        assert_eq!(mesh.vertices[3].position.x, 5.0);
        assert_eq!(joined.sources(), &["A".to_string(), "B".to_string()]);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_join_unions_uv_channels() {
        let mut with_uv = make_triangle("A", "M");
        with_uv.add_uv_channel("UVMap");
        let a = WorkingCopy::duplicate(&with_uv, "TEMP_DATA_A");
        let b = WorkingCopy::duplicate(&make_triangle("B", "M"), "TEMP_DATA_B");
        let joined = WorkingCopy::join("J", &[&a, &b]).unwrap();
        assert_eq!(joined.mesh().uv_channels, vec!["UVMap".to_string()]);
        assert!(joined.mesh().validate().is_ok());
    }

    #[test]
    fn test_join_rejects_malformed_member() {
        let mut bad = make_triangle("Bad", "M");
        bad.faces[0].vertices[0] = 9;
        let copy = WorkingCopy::duplicate(&bad, "TEMP_DATA_Bad");
        assert!(WorkingCopy::join("J", &[&copy]).is_err());
    }

    #[test]
    fn test_working_set_replace_with_joined() {
        let mut set = WorkingSet::new();
        for name in ["A", "B", "C"] {
            set.insert(name, WorkingCopy::duplicate(&make_triangle(name, "M"), name));
        }
        let joined = WorkingCopy::join("J", &[set.get("A").unwrap(), set.get("C").unwrap()]).unwrap();
        set.replace_with_joined(&["A".to_string(), "C".to_string()], "J", joined);
        assert_eq!(set.keys(), &["J".to_string(), "B".to_string()]);
        assert!(!set.contains("A"));
        assert_eq!(set.len(), 2);
    }
}
