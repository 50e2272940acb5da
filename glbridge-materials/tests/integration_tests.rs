//! Integration tests for material analysis and cleaning

use glbridge_core::{MeshObject, Point3f, WorkingCopy};
use glbridge_materials::{analyze_usage, summarize, used_slots, MaterialCleaner, MaterialDefinition};

fn make_cube_with_slots(slots: &[&str], face_slots: [usize; 6]) -> MeshObject {
    let positions = vec![
        Point3f::new(0.0, 0.0, 0.0),
        Point3f::new(1.0, 0.0, 0.0),
        Point3f::new(1.0, 1.0, 0.0),
        Point3f::new(0.0, 1.0, 0.0),
        Point3f::new(0.0, 0.0, 1.0),
        Point3f::new(1.0, 0.0, 1.0),
        Point3f::new(1.0, 1.0, 1.0),
        Point3f::new(0.0, 1.0, 1.0),
    ];
    let polygons = vec![
        vec![0, 3, 2, 1],
        vec![4, 5, 6, 7],
        vec![0, 1, 5, 4],
        vec![1, 2, 6, 5],
        vec![2, 3, 7, 6],
        vec![3, 0, 4, 7],
    ];
    let mut mesh = MeshObject::from_polygons("Cube", positions, polygons)
        .with_material_slots(slots.iter().copied());
    for (face, slot) in mesh.faces.iter_mut().zip(face_slots) {
        face.material_index = slot;
    }
    mesh
}

#[test]
fn test_used_slots_within_range() {
    let mesh = make_cube_with_slots(&["A", "B", "C", "D", "E"], [0, 0, 1, 1, 4, 4]);
    let used = used_slots(&mesh);
    assert!(used.iter().all(|&i| i < mesh.material_slots.len()));
}

#[test]
fn test_five_slots_three_referenced() {
    let mesh = make_cube_with_slots(&["A", "B", "C", "D", "E"], [0, 0, 2, 2, 4, 4]);
    let mut copy = WorkingCopy::duplicate(&mesh, "TEMP_DATA_Cube");
    let removed = MaterialCleaner::new().clean(&mut copy).unwrap();
    assert_eq!(removed, 2);
    assert!(copy.mesh().faces.iter().all(|f| f.material_index < 3));
    assert!(copy.mesh().validate().is_ok());

    let usage = analyze_usage(copy.mesh());
    assert!(usage.unused.is_empty());
    assert_eq!(usage.used.len(), 3);
}

#[test]
fn test_summary_serializes_for_metadata() {
    let summary = summarize(&[MaterialDefinition::principled("Paint")]);
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["total"], 1);
    assert_eq!(json["ready"], 1);
    assert_eq!(json["analysis"]["Paint"]["is_ready"], true);
}
