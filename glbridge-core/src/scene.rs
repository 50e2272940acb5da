//! Scene objects and export selections

use crate::mesh::MeshObject;
use serde::{Deserialize, Serialize};

/// What a scene object carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectKind {
    Mesh(MeshObject),
    /// Instances a collection of other objects by name
    Instance { collection: Vec<String> },
    /// Anything without geometry (lights, cameras, empties)
    Empty,
}

/// A named object in the host scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub name: String,
    pub kind: ObjectKind,
}

impl SceneObject {
    pub fn mesh(mesh: MeshObject) -> Self {
        Self {
            name: mesh.name.clone(),
            kind: ObjectKind::Mesh(mesh),
        }
    }

    pub fn instance(name: impl Into<String>, collection: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: ObjectKind::Instance { collection },
        }
    }

    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ObjectKind::Empty,
        }
    }

    pub fn as_mesh(&self) -> Option<&MeshObject> {
        match &self.kind {
            ObjectKind::Mesh(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_mesh_mut(&mut self) -> Option<&mut MeshObject> {
        match &mut self.kind {
            ObjectKind::Mesh(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_instance(&self) -> bool {
        matches!(self.kind, ObjectKind::Instance { .. })
    }
}

/// The objects the user intended to export, captured by name.
///
/// Names survive structural changes during processing where live handles would not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSelection {
    pub names: Vec<String>,
    pub active: Option<String>,
}

impl ExportSelection {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            active: None,
        }
    }

    pub fn with_active(mut self, active: impl Into<String>) -> Self {
        self.active = Some(active.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
