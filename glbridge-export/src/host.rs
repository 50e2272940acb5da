//! The authoring environment as seen by the export pipeline
//!
//! Everything is addressed by name. Handles into host state may be invalidated
//! by the pipeline's own substitutions, names are not.

use glbridge_core::subdivide::evaluate;
use glbridge_core::{Error, ExportSelection, Result, SceneObject, SubdivisionLevels, WorkingCopy};
use glbridge_materials::MaterialDefinition;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

pub trait Host {
    fn selection(&self) -> ExportSelection;

    fn set_selection(&mut self, selection: &ExportSelection);

    fn object(&self, name: &str) -> Option<&SceneObject>;

    fn material(&self, name: &str) -> Option<&MaterialDefinition>;

    /// Stem of the open document's file name, if it has been saved
    fn document_name(&self) -> Option<String>;

    fn subdivision(&self, object: &str) -> Option<SubdivisionLevels>;

    /// Returns false when the object has no subdivision to set
    fn set_subdivision(&mut self, object: &str, levels: SubdivisionLevels) -> bool;

    /// Claim `name` in the scene namespace for a temporary object
    fn link_temp(&mut self, name: &str) -> Result<()>;

    /// Release a temporary object. Returns false if it no longer exists.
    fn destroy_temp(&mut self, name: &str) -> bool;

    /// Duplicate the evaluated mesh of `object` as a working copy.
    ///
    /// Fails with `MalformedMesh` if the object's geometry does not validate.
    fn duplicate(&self, object: &str, temp_name: &str) -> Result<WorkingCopy> {
        let mesh = self
            .object(object)
            .and_then(SceneObject::as_mesh)
            .ok_or_else(|| Error::ObjectNotFound(object.to_string()))?;
        Ok(WorkingCopy::duplicate(&evaluate(mesh)?, temp_name))
    }
}

/// In-memory scene for tests and tooling
#[derive(Debug, Default)]
pub struct MemoryScene {
    objects: Vec<SceneObject>,
    materials: BTreeMap<String, MaterialDefinition>,
    selection: ExportSelection,
    document: Option<String>,
    temps: BTreeSet<String>,
    destroy_calls: HashMap<String, usize>,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, name: impl Into<String>) -> Self {
        self.document = Some(name.into());
        self
    }

    pub fn with_object(mut self, object: SceneObject) -> Self {
        self.add_object(object);
        self
    }

    pub fn with_material(mut self, material: MaterialDefinition) -> Self {
        self.materials.insert(material.name.clone(), material);
        self
    }

    /// Add or replace an object by name
    pub fn add_object(&mut self, object: SceneObject) {
        match self.objects.iter_mut().find(|o| o.name == object.name) {
            Some(existing) => *existing = object,
            None => self.objects.push(object),
        }
    }

    pub fn object_mut(&mut self, name: &str) -> Option<&mut SceneObject> {
        self.objects.iter_mut().find(|o| o.name == name)
    }

    pub fn select(&mut self, selection: ExportSelection) {
        self.selection = selection;
    }

    pub fn temp_names(&self) -> impl Iterator<Item = &str> {
        self.temps.iter().map(String::as_str)
    }

    pub fn has_temp(&self, name: &str) -> bool {
        self.temps.contains(name)
    }

    /// How many times `destroy_temp` was called for `name`
    pub fn destroy_calls(&self, name: &str) -> usize {
        self.destroy_calls.get(name).copied().unwrap_or(0)
    }
}

impl Host for MemoryScene {
    fn selection(&self) -> ExportSelection {
        self.selection.clone()
    }

    fn set_selection(&mut self, selection: &ExportSelection) {
        self.selection = selection.clone();
    }

    fn object(&self, name: &str) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.name == name)
    }

    fn material(&self, name: &str) -> Option<&MaterialDefinition> {
        self.materials.get(name)
    }

    fn document_name(&self) -> Option<String> {
        self.document.clone()
    }

    fn subdivision(&self, object: &str) -> Option<SubdivisionLevels> {
        self.object(object)?.as_mesh()?.subdivision
    }

    fn set_subdivision(&mut self, object: &str, levels: SubdivisionLevels) -> bool {
        match self.object_mut(object).and_then(|o| o.as_mesh_mut()) {
            Some(mesh) if mesh.subdivision.is_some() => {
                mesh.subdivision = Some(levels);
                true
            }
            _ => false,
        }
    }

    fn link_temp(&mut self, name: &str) -> Result<()> {
        if self.temps.contains(name) || self.object(name).is_some() {
            return Err(Error::InvalidData(format!("name '{}' is already in use", name)));
        }
        self.temps.insert(name.to_string());
        debug!(temp = name, "linked temporary object");
        Ok(())
    }

    fn destroy_temp(&mut self, name: &str) -> bool {
        *self.destroy_calls.entry(name.to_string()).or_insert(0) += 1;
        self.temps.remove(name)
    }
}
