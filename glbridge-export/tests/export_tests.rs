//! End-to-end exports against an in-memory scene

use glbridge_core::{atlas_name, temp_name, ExportSelection, MeshObject, Point3f, SceneObject, SubdivisionLevels};
use glbridge_export::*;
use glbridge_materials::MaterialDefinition;
use glbridge_server::ModelStore;
use serde_json::Value;
use std::sync::Arc;

fn make_cube(name: &str, materials: &[&str]) -> MeshObject {
    MeshObject::from_polygons(
        name,
        vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(1.0, 1.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
            Point3f::new(0.0, 0.0, 1.0),
            Point3f::new(1.0, 0.0, 1.0),
            Point3f::new(1.0, 1.0, 1.0),
            Point3f::new(0.0, 1.0, 1.0),
        ],
        vec![
            vec![0, 3, 2, 1],
            vec![4, 5, 6, 7],
            vec![0, 1, 5, 4],
            vec![1, 2, 6, 5],
            vec![2, 3, 7, 6],
            vec![3, 0, 4, 7],
        ],
    )
    .with_material_slots(materials.iter().copied())
}

fn setup() -> (SnapshotManager, Arc<ModelStore>) {
    let store = Arc::new(ModelStore::new());
    let manager = SnapshotManager::new(ExportSettings::default(), store.clone()).unwrap();
    (manager, store)
}

/// JSON chunk of a GLB container
fn glb_json(bytes: &[u8]) -> Value {
    assert_eq!(&bytes[0..4], b"glTF");
    let len = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;
    serde_json::from_slice(&bytes[20..20 + len]).unwrap()
}

fn node_names(document: &Value) -> Vec<String> {
    document["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["name"].as_str().unwrap().to_string())
        .collect()
}

struct BrokenEncoder;

impl Encoder for BrokenEncoder {
    fn encode(&self, _set: &ExportSet, _compression: &CompressionConfig) -> Result<Vec<u8>, EncodeError> {
        Err(EncodeError::Compression("encoder offline".to_string()))
    }
}

#[test]
fn test_shared_material_builds_one_atlas() {
    let (mut manager, store) = setup();
    let mut scene = MemoryScene::new()
        .with_document("crates")
        .with_material(MaterialDefinition::principled("Wood"))
        .with_object(SceneObject::mesh(make_cube("CrateA", &["Wood"])))
        .with_object(SceneObject::mesh(make_cube("CrateB", &["Wood"])));

    let outcome = manager
        .run_export(&mut scene, &ExportSelection::new(["CrateA", "CrateB"]))
        .unwrap();
    assert_eq!(outcome.report.atlases_created, 1);
    assert_eq!(outcome.report.packed, 2);
    assert_eq!(outcome.report.unwrapped, 0);

    let artifact = store.latest().unwrap();
    let document = glb_json(&artifact.bytes);
    assert_eq!(node_names(&document), vec![atlas_name("Wood")]);
    assert_eq!(document["nodes"][0]["extras"]["sources"], serde_json::json!(["CrateA", "CrateB"]));

    manager.flush(&mut scene);
    for temp in [temp_name("CrateA"), temp_name("CrateB"), atlas_name("Wood")] {
        assert_eq!(scene.destroy_calls(&temp), 1, "{}", temp);
    }
    assert_eq!(scene.temp_names().count(), 0);
    assert!(!scene.object("CrateA").unwrap().as_mesh().unwrap().has_uvs());
}

#[test]
fn test_unused_slots_removed_from_copy_only() {
    let (mut manager, store) = setup();
    let mut cube = make_cube("Props", &["A", "B", "C", "D", "E"]);
    for (face, slot) in cube.faces.iter_mut().zip([0, 0, 2, 2, 4, 4]) {
        face.material_index = slot;
    }
    let mut scene = MemoryScene::new().with_object(SceneObject::mesh(cube));

    let outcome = manager
        .run_export(&mut scene, &ExportSelection::new(["Props"]))
        .unwrap();
    assert_eq!(outcome.report.cleaned, 1);
    assert_eq!(outcome.report.materials_removed, 2);

    let document = glb_json(&store.latest().unwrap().bytes);
    let materials: Vec<&str> = document["materials"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["name"].as_str().unwrap())
        .collect();
    assert_eq!(materials, vec!["A", "C", "E"]);
    assert_eq!(document["meshes"][0]["primitives"].as_array().unwrap().len(), 3);

    let original = scene.object("Props").unwrap().as_mesh().unwrap();
    assert_eq!(original.material_slots.len(), 5);
}

#[test]
fn test_metadata_published_with_artifact() {
    let (mut manager, store) = setup();
    let mut legacy = MaterialDefinition::new("Legacy");
    legacy.use_nodes = false;
    let mut scene = MemoryScene::new()
        .with_document("scene")
        .with_material(MaterialDefinition::principled("Paint"))
        .with_material(legacy)
        .with_object(SceneObject::mesh(make_cube("Body", &["Paint"])))
        .with_object(SceneObject::mesh(make_cube("Trim", &["Legacy"])));

    let outcome = manager
        .run_export(&mut scene, &ExportSelection::new(["Body", "Trim"]))
        .unwrap();
    let artifact = store.latest().unwrap();
    let metadata = &artifact.metadata;

    assert_eq!(metadata.filename, "scene.glb");
    assert_eq!(metadata.size, artifact.bytes.len());
    assert_eq!(metadata.object_count, Some(2));
    let settings = metadata.export_settings.as_ref().unwrap();
    assert_eq!(settings.compression, "MEDIUM");
    assert!(settings.draco_enabled);

    let materials = metadata.materials.as_ref().unwrap();
    assert_eq!(materials.total, 2);
    assert_eq!(materials.ready, 1);
    assert_eq!(materials.unsupported, vec!["Legacy".to_string()]);
    assert_eq!(outcome.report.unsupported_materials, vec!["Legacy".to_string()]);
    assert_eq!(outcome.receipt.size, artifact.bytes.len());
    assert!(outcome.report.to_string().starts_with("Exported "));
}

#[test]
fn test_encode_failure_still_cleans_up_once() {
    let (manager, store) = setup();
    let mut manager = manager.with_encoder(BrokenEncoder);
    let mut scene = MemoryScene::new()
        .with_object(SceneObject::mesh(make_cube("Lamp", &["Brass"])))
        .with_object(SceneObject::mesh(
            make_cube("Shade", &["Cloth"]).with_subdivision(SubdivisionLevels::new(4, 4)),
        ));
    scene.select(ExportSelection::new(["Lamp"]).with_active("Lamp"));

    let failure = manager
        .run_export(&mut scene, &ExportSelection::new(["Lamp", "Shade"]))
        .unwrap_err();
    assert!(matches!(failure.kind, ExportErrorKind::Encode(_)));
    assert!(store.is_empty());
    assert_eq!(scene.subdivision("Shade"), Some(SubdivisionLevels::new(2, 2)));

    let runs = manager.flush(&mut scene);
    assert_eq!(runs.len(), 2);
    assert_eq!(scene.destroy_calls(&temp_name("Lamp")), 1);
    assert_eq!(scene.destroy_calls(&temp_name("Shade")), 1);
    assert_eq!(scene.subdivision("Shade"), Some(SubdivisionLevels::new(4, 4)));
    assert_eq!(scene.selection(), ExportSelection::new(["Lamp"]).with_active("Lamp"));

    // cleanup never repeats
    assert!(manager.flush(&mut scene).is_empty());
    assert_eq!(scene.destroy_calls(&temp_name("Lamp")), 1);
}

#[test]
fn test_second_export_rejected_while_pending() {
    let (mut manager, _store) = setup();
    let mut scene = MemoryScene::new().with_object(SceneObject::mesh(make_cube("Box", &["Wood"])));
    let selection = ExportSelection::new(["Box"]);

    manager.run_export(&mut scene, &selection).unwrap();
    let failure = manager.run_export(&mut scene, &selection).unwrap_err();
    assert!(matches!(failure.kind, ExportErrorKind::ExportInProgress));
    assert_eq!(scene.destroy_calls(&temp_name("Box")), 0);

    manager.flush(&mut scene);
    assert!(manager.run_export(&mut scene, &selection).is_ok());
}

#[test]
fn test_instances_pass_through() {
    let (mut manager, store) = setup();
    let mut scene = MemoryScene::new()
        .with_object(SceneObject::mesh(make_cube("Chair", &["Wood"])))
        .with_object(SceneObject::instance("Chairs", vec!["Chair".to_string()]))
        .with_object(SceneObject::empty("Pivot"));

    let outcome = manager
        .run_export(&mut scene, &ExportSelection::new(["Chairs", "Pivot"]))
        .unwrap();
    assert_eq!(outcome.report.objects, 2);

    let document = glb_json(&store.latest().unwrap().bytes);
    let names = node_names(&document);
    let chair = names.iter().position(|n| n == "Chair").unwrap();
    let chairs = names.iter().position(|n| n == "Chairs").unwrap();
    assert_eq!(document["nodes"][chairs]["children"], serde_json::json!([chair]));

    let roots = document["scenes"][0]["nodes"].as_array().unwrap();
    assert!(!roots.contains(&serde_json::json!(chair)));
    assert_eq!(roots.len(), 2);
}

#[test]
fn test_missing_objects_reported() {
    let (mut manager, _store) = setup();
    let mut scene = MemoryScene::new().with_object(SceneObject::mesh(make_cube("Box", &["Wood"])));

    let outcome = manager
        .run_export(&mut scene, &ExportSelection::new(["Box", "Deleted"]))
        .unwrap();
    let failure = outcome.report.failed("Deleted").unwrap();
    assert_eq!(failure.stage, Stage::Resolve);
    assert_eq!(outcome.report.objects, 1);
    assert!(outcome.report.to_string().contains("1 object failure(s)"));
}

#[test]
fn test_empty_selection() {
    let (mut manager, store) = setup();
    let mut scene = MemoryScene::new();
    let failure = manager.run_export(&mut scene, &ExportSelection::default()).unwrap_err();
    assert!(matches!(failure.kind, ExportErrorKind::EmptySelection));
    assert!(store.is_empty());
}

#[test]
fn test_decimation_reduces_copies_only() {
    let store = Arc::new(ModelStore::new());
    let mut settings = ExportSettings::default();
    settings.decimation.enabled = true;
    settings.decimation.ratio = 0.5;
    settings.decimation.min_faces = 0;
    settings.auto_uv = false;
    let mut manager = SnapshotManager::new(settings, store.clone()).unwrap();

    let dense = make_cube("Dense", &["Stone"]).with_subdivision(SubdivisionLevels::new(2, 2));
    let mut scene = MemoryScene::new().with_object(SceneObject::mesh(dense));

    let outcome = manager
        .run_export(&mut scene, &ExportSelection::new(["Dense"]))
        .unwrap();
    assert_eq!(outcome.report.decimation.len(), 1);
    let result = &outcome.report.decimation[0];
    assert_eq!(result.object, temp_name("Dense"));
    assert!(result.faces_after <= result.faces_before);
    assert_eq!(scene.object("Dense").unwrap().as_mesh().unwrap().face_count(), 6);
}

fn broken_cube(name: &str) -> MeshObject {
    let mut cube = make_cube(name, &["Wood"]);
    cube.faces[0].vertices[1] = 99;
    cube
}

#[test]
fn test_malformed_object_skipped_others_published() {
    let (mut manager, store) = setup();
    let mut scene = MemoryScene::new()
        .with_object(SceneObject::mesh(make_cube("Good", &["Wood"])))
        .with_object(SceneObject::mesh(broken_cube("Bad")));

    let outcome = manager
        .run_export(&mut scene, &ExportSelection::new(["Good", "Bad"]))
        .unwrap();
    assert_eq!(outcome.report.failed("Bad").map(|f| f.stage), Some(Stage::Duplicate));
    assert!(outcome.report.failed("Good").is_none());

    let document = glb_json(&store.latest().unwrap().bytes);
    assert_eq!(node_names(&document), vec!["Good".to_string()]);

    let runs = manager.flush(&mut scene);
    assert_eq!(runs.len(), 2);
    assert_eq!(scene.destroy_calls(&temp_name("Good")), 1);
    assert_eq!(scene.destroy_calls(&temp_name("Bad")), 1);
    assert!(manager.flush(&mut scene).is_empty());
}

#[test]
fn test_malformed_subdivided_object_restored_once() {
    let (mut manager, store) = setup();
    let bad = broken_cube("Bad").with_subdivision(SubdivisionLevels::new(3, 3));
    let mut scene = MemoryScene::new()
        .with_object(SceneObject::mesh(make_cube("Good", &["Wood"])))
        .with_object(SceneObject::mesh(bad));
    scene.select(ExportSelection::new(["Good"]));

    let outcome = manager
        .run_export(&mut scene, &ExportSelection::new(["Good", "Bad"]))
        .unwrap();
    assert!(outcome.report.failed("Bad").is_some());
    assert_eq!(outcome.report.subdivision_capped, 1);
    assert!(store.latest().is_some());

    let runs = manager.flush(&mut scene);
    let kinds: Vec<_> = runs.iter().map(|r| r.kind).collect();
    assert_eq!(kinds, vec!["destroy_temps", "restore_state"]);
    assert_eq!(scene.destroy_calls(&temp_name("Bad")), 1);
    assert_eq!(scene.subdivision("Bad"), Some(SubdivisionLevels::new(3, 3)));
    assert_eq!(scene.selection(), ExportSelection::new(["Good"]));
}
