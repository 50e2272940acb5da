//! Material usage analysis
//!
//! A slot is "used" when at least one face references it, whether or not a
//! material is assigned. Usage is always recomputed from faces.

use glbridge_core::MeshObject;
use serde::Serialize;
use std::collections::BTreeSet;

/// One material slot in a usage report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotInfo {
    pub index: usize,
    pub material: String,
    pub face_count: usize,
}

/// Per-object material usage report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterialUsage {
    pub object: String,
    pub total_slots: usize,
    pub total_faces: usize,
    pub used: Vec<SlotInfo>,
    pub unused: Vec<SlotInfo>,
}

impl MaterialUsage {
    pub fn unused_count(&self) -> usize {
        self.unused.len()
    }
}

/// Slot indices referenced by at least one face.
///
/// Indices outside the slot range are ignored, so the result is always a
/// subset of `0..mesh.material_slots.len()`. A mesh without faces yields an
/// empty set.
pub fn used_slots(mesh: &MeshObject) -> BTreeSet<usize> {
    let slot_count = mesh.material_slots.len();
    mesh.faces
        .iter()
        .map(|f| f.material_index)
        .filter(|&idx| idx < slot_count)
        .collect()
}

/// Number of faces referencing each slot (out-of-range references are dropped)
pub fn face_counts_per_slot(mesh: &MeshObject) -> Vec<usize> {
    let mut counts = vec![0usize; mesh.material_slots.len()];
    for face in &mesh.faces {
        if let Some(c) = counts.get_mut(face.material_index) {
            *c += 1;
        }
    }
    counts
}

/// Build a usage report for one object
pub fn analyze_usage(mesh: &MeshObject) -> MaterialUsage {
    let counts = face_counts_per_slot(mesh);
    let (used, unused): (Vec<SlotInfo>, Vec<SlotInfo>) = mesh
        .material_slots
        .iter()
        .enumerate()
        .map(|(index, slot)| SlotInfo {
            index,
            material: slot.name().to_string(),
            face_count: counts[index],
        })
        .partition(|info| info.face_count > 0);

    MaterialUsage {
        object: mesh.name.clone(),
        total_slots: mesh.material_slots.len(),
        total_faces: mesh.faces.len(),
        used,
        unused,
    }
}

/// The material referenced by the most faces.
///
/// Ties resolve to the lowest slot index. Without any referencing faces the
/// first slot's material is used; empty slots never count as a material.
pub fn primary_material(mesh: &MeshObject) -> Option<String> {
    let counts = face_counts_per_slot(mesh);
    let best = counts
        .iter()
        .enumerate()
        .filter(|(idx, &c)| c > 0 && mesh.material_slots[*idx].material.is_some())
        .fold(None::<(usize, usize)>, |best, (idx, &c)| match best {
            Some((_, bc)) if bc >= c => best,
            _ => Some((idx, c)),
        });

    match best {
        Some((idx, _)) => mesh.material_slots[idx].material.clone(),
        None => mesh.material_slots.first().and_then(|s| s.material.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glbridge_core::{Face, Point3f};

    fn make_strip(slots: &[&str], face_slots: &[usize]) -> MeshObject {
        let mut positions = Vec::new();
        let mut polygons = Vec::new();
        for i in 0..face_slots.len() {
            let x = i as f32;
            positions.push(Point3f::new(x, 0.0, 0.0));
            positions.push(Point3f::new(x + 1.0, 0.0, 0.0));
            positions.push(Point3f::new(x, 1.0, 0.0));
            polygons.push(vec![3 * i, 3 * i + 1, 3 * i + 2]);
        }
        let mut mesh =
            MeshObject::from_polygons("strip", positions, polygons).with_material_slots(slots.iter().copied());
        for (face, &slot) in mesh.faces.iter_mut().zip(face_slots) {
            face.material_index = slot;
        }
        mesh
    }

    #[test]
    fn test_used_slots() {
        let mesh = make_strip(&["A", "B", "C", "D", "E"], &[0, 2, 2, 4]);
        let used = used_slots(&mesh);
        assert_eq!(used.into_iter().collect::<Vec<_>>(), vec![0, 2, 4]);
    }

    #[test]
    fn test_used_slots_empty_mesh() {
        let mesh = make_strip(&["A", "B"], &[]);
        assert!(used_slots(&mesh).is_empty());
        assert_eq!(analyze_usage(&mesh).unused_count(), 2);
    }

    #[test]
    fn test_used_slots_ignores_out_of_range() {
        let mut mesh = make_strip(&["A"], &[0]);
        mesh.faces.push(Face::triangle(0, 1, 2, 7));
        let used = used_slots(&mesh);
        assert!(used.iter().all(|&i| i < mesh.material_slots.len()));
        assert_eq!(used.len(), 1);
    }

    #[test]
    fn test_analyze_usage_partition() {
        let mesh = make_strip(&["A", "B", "C"], &[1, 1]);
        let usage = analyze_usage(&mesh);
        assert_eq!(usage.used.len(), 1);
        assert_eq!(usage.used[0].material, "B");
        assert_eq!(usage.used[0].face_count, 2);
        assert_eq!(usage.unused.len(), 2);
    }

    #[test]
    fn test_primary_material_most_faces() {
        let mesh = make_strip(&["A", "B"], &[0, 1, 1]);
        assert_eq!(primary_material(&mesh).as_deref(), Some("B"));
    }

    #[test]
    fn test_primary_material_tie_prefers_lowest_slot() {
        let mesh = make_strip(&["A", "B"], &[1, 0]);
        assert_eq!(primary_material(&mesh).as_deref(), Some("A"));
    }

    #[test]
    fn test_primary_material_without_faces() {
        let mesh = make_strip(&["First", "Second"], &[]);
        assert_eq!(primary_material(&mesh).as_deref(), Some("First"));
        let bare = make_strip(&[], &[]);
        assert_eq!(primary_material(&bare), None);
    }
}
