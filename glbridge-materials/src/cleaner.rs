//! Removal of unused material slots from working copies

use crate::analyzer::{analyze_usage, used_slots};
use glbridge_core::{Error, MeshObject, Result, WorkingCopy};
use serde::Serialize;
use tracing::{debug, warn};

/// What cleaning one object did (or would do)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub object: String,
    pub slots_before: usize,
    pub slots_after: usize,
    pub removed: Vec<String>,
}

impl CleanReport {
    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }
}

/// Totals across several objects
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanBatchReport {
    pub total_objects: usize,
    pub cleaned_objects: usize,
    pub total_removed: usize,
    pub results: Vec<CleanReport>,
    pub failures: Vec<(String, String)>,
}

/// Strips unused material slots and re-indexes faces contiguously
#[derive(Debug, Clone, Default)]
pub struct MaterialCleaner;

impl MaterialCleaner {
    pub fn new() -> Self {
        Self
    }

    fn check_indices(mesh: &MeshObject) -> Result<()> {
        let slot_count = mesh.material_slots.len();
        for (fi, face) in mesh.faces.iter().enumerate() {
            let valid = face.material_index < slot_count || (slot_count == 0 && face.material_index == 0);
            if !valid {
                return Err(Error::malformed(
                    &mesh.name,
                    format!(
                        "face {} references material slot {} but only {} slots exist",
                        fi, face.material_index, slot_count
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Report what `clean` would remove, without modifying anything
    pub fn plan(&self, mesh: &MeshObject) -> Result<CleanReport> {
        Self::check_indices(mesh)?;
        let usage = analyze_usage(mesh);
        Ok(CleanReport {
            object: mesh.name.clone(),
            slots_before: usage.total_slots,
            slots_after: usage.used.len(),
            removed: usage.unused.into_iter().map(|s| s.material).collect(),
        })
    }

    /// Remove every unused slot from `copy`, returning how many were removed.
    ///
    /// A face referencing a slot that does not exist is a `MalformedMesh`
    /// error and leaves the copy untouched; clamping would silently change
    /// what the viewer renders.
    pub fn clean(&self, copy: &mut WorkingCopy) -> Result<usize> {
        Ok(self.clean_with_report(copy)?.removed_count())
    }

    pub fn clean_with_report(&self, copy: &mut WorkingCopy) -> Result<CleanReport> {
        let mesh = copy.mesh_mut();
        Self::check_indices(mesh)?;

        let used = used_slots(mesh);
        let slots_before = mesh.material_slots.len();
        if used.len() == slots_before {
            return Ok(CleanReport {
                object: mesh.name.clone(),
                slots_before,
                slots_after: slots_before,
                removed: Vec::new(),
            });
        }

        // old index -> new contiguous index
        let mut remap = vec![usize::MAX; slots_before];
        let mut kept = Vec::with_capacity(used.len());
        let mut removed = Vec::new();
        for (idx, slot) in mesh.material_slots.drain(..).enumerate() {
            if used.contains(&idx) {
                remap[idx] = kept.len();
                kept.push(slot);
            } else {
                removed.push(slot.name().to_string());
            }
        }
        mesh.material_slots = kept;
        for face in &mut mesh.faces {
            face.material_index = remap[face.material_index];
        }

        debug!(
            object = %mesh.name,
            removed = removed.len(),
            remaining = mesh.material_slots.len(),
            "removed unused material slots"
        );

        Ok(CleanReport {
            object: mesh.name.clone(),
            slots_before,
            slots_after: mesh.material_slots.len(),
            removed,
        })
    }

    /// Clean several copies; a malformed copy is recorded and the rest continue
    pub fn clean_batch(&self, copies: &mut [&mut WorkingCopy]) -> CleanBatchReport {
        let mut report = CleanBatchReport {
            total_objects: copies.len(),
            ..Default::default()
        };
        for copy in copies.iter_mut() {
            match self.clean_with_report(copy) {
                Ok(r) => {
                    if r.removed_count() > 0 {
                        report.cleaned_objects += 1;
                        report.total_removed += r.removed_count();
                    }
                    report.results.push(r);
                }
                Err(e) => {
                    warn!(object = %copy.name(), error = %e, "material cleaning failed");
                    report.failures.push((copy.name().to_string(), e.to_string()));
                }
            }
        }
        report
    }
}
