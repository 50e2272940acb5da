//! Scene snapshot and restore
//!
//! `SnapshotManager::run_export` duplicates the selected meshes into working
//! copies, runs cleaning, UV preparation and decimation over the copies only,
//! encodes and publishes the result, and then queues cleanup. Cleanup is
//! queued on every path that got past the busy check, exactly once, and runs
//! later from `tick` or `flush`.

use crate::config::ExportSettings;
use crate::deferred::{CleanupDelays, DeferredQueue, DeferredTask, TaskId, TaskRun};
use crate::encoder::{EncodeError, Encoder, ExportEntry, ExportSet};
use crate::glb::GlbEncoder;
use crate::host::Host;
use crate::report::{ExportReport, Stage};
use glbridge_core::{temp_name, ExportSelection, ObjectKind, Result, SubdivisionLevels, WorkingSet, TEMP_PREFIX};
use glbridge_materials::{summarize, MaterialCleaner, MaterialDefinition, MaterialsSummary};
use glbridge_server::{ArtifactMetadata, PublishReceipt, PublishedArtifact, Publisher};
use glbridge_simplification::DecimationEngine;
use glbridge_uv::{group_by_primary_material, AtlasPacker, UvState};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ExportErrorKind {
    #[error("nothing in the selection could be exported")]
    EmptySelection,

    #[error("an export or its cleanup is still pending")]
    ExportInProgress,

    #[error("encoding failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("publishing failed: {0}")]
    Publish(String),

    #[error("invalid settings: {0}")]
    Config(String),
}

/// A whole-export failure, still carrying everything the run recorded
#[derive(Debug)]
pub struct ExportFailure {
    pub kind: ExportErrorKind,
    pub report: ExportReport,
}

impl fmt::Display for ExportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Export failed: {}. {}", self.kind, self.report)
    }
}

impl std::error::Error for ExportFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub report: ExportReport,
    pub receipt: PublishReceipt,
    pub metadata: ArtifactMetadata,
}

/// Queued cleanup handles for one export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupTickets {
    pub destroy: TaskId,
    pub restore: TaskId,
}

/// What has to be undone, collected as the pipeline touches the host
#[derive(Debug, Default)]
struct Undo {
    temps: Vec<String>,
    subdivision: Vec<(String, SubdivisionLevels)>,
}

/// Objects reachable from the selection
#[derive(Debug, Default)]
struct Collected {
    /// Mesh objects and whether they are only reached through an instance
    meshes: Vec<(String, bool)>,
    passthrough: Vec<ExportEntry>,
}

impl Collected {
    fn is_instanced(&self, name: &str) -> bool {
        self.meshes.iter().any(|(n, instanced)| n == name && *instanced)
    }
}

/// Stage runner; owns everything an export reads but not the cleanup queue
struct Pipeline {
    settings: ExportSettings,
    encoder: Box<dyn Encoder>,
    publisher: Arc<dyn Publisher>,
    engine: DecimationEngine,
    cleaner: MaterialCleaner,
    packer: AtlasPacker,
}

/// Schedules cleanup for one export when dropped, including during unwinding
struct CleanupGuard<'a> {
    queue: &'a mut DeferredQueue,
    pending: &'a mut Option<CleanupTickets>,
    delays: CleanupDelays,
    now: Instant,
    selection: ExportSelection,
    undo: Undo,
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        let undo = std::mem::take(&mut self.undo);
        let destroy = self.queue.schedule(
            DeferredTask::DestroyTemps { names: undo.temps },
            self.delays.destroy_temps(),
            self.now,
        );
        let restore = self.queue.schedule(
            DeferredTask::RestoreState {
                subdivision: undo.subdivision,
                selection: std::mem::take(&mut self.selection),
            },
            self.delays.restore_state(),
            self.now,
        );
        *self.pending = Some(CleanupTickets { destroy, restore });
        debug!(?destroy, ?restore, "cleanup scheduled");
    }
}

pub struct SnapshotManager {
    pipeline: Pipeline,
    queue: DeferredQueue,
    pending: Option<CleanupTickets>,
}

impl SnapshotManager {
    pub fn new(settings: ExportSettings, publisher: Arc<dyn Publisher>) -> Result<Self> {
        settings.validate()?;
        let engine = DecimationEngine::new(settings.decimation.engine.clone());
        Ok(Self {
            pipeline: Pipeline {
                settings,
                encoder: Box::new(GlbEncoder::new()),
                publisher,
                engine,
                cleaner: MaterialCleaner::new(),
                packer: AtlasPacker::new(),
            },
            queue: DeferredQueue::new(),
            pending: None,
        })
    }

    pub fn with_encoder(mut self, encoder: impl Encoder + 'static) -> Self {
        self.pipeline.encoder = Box::new(encoder);
        self
    }

    /// Replace the decimation engine, e.g. to restrict the available backends
    pub fn with_engine(mut self, engine: DecimationEngine) -> Self {
        self.pipeline.engine = engine;
        self
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.pipeline.settings
    }

    /// True while the previous export's restore task has not run yet
    pub fn is_busy(&self) -> bool {
        self.pending
            .is_some_and(|tickets| !self.queue.is_complete(tickets.restore))
    }

    pub fn pending_cleanup(&self) -> Option<CleanupTickets> {
        self.pending.filter(|_| self.is_busy())
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.queue.next_due()
    }

    /// Run cleanup tasks that are due at `now`
    pub fn tick(&mut self, host: &mut dyn Host, now: Instant) -> Vec<TaskRun> {
        let runs = self.queue.tick(host, now);
        self.settle();
        runs
    }

    /// Run all queued cleanup immediately
    pub fn flush(&mut self, host: &mut dyn Host) -> Vec<TaskRun> {
        let runs = self.queue.flush(host);
        self.settle();
        runs
    }

    fn settle(&mut self) {
        if let Some(tickets) = self.pending {
            if self.queue.is_complete(tickets.restore) {
                debug!("export cleanup finished");
                self.pending = None;
            }
        }
    }

    pub fn run_export(
        &mut self,
        host: &mut dyn Host,
        selection: &ExportSelection,
    ) -> std::result::Result<ExportOutcome, ExportFailure> {
        self.run_export_at(host, selection, Instant::now())
    }

    /// Export with cleanup delays measured from `now`
    pub fn run_export_at(
        &mut self,
        host: &mut dyn Host,
        selection: &ExportSelection,
        now: Instant,
    ) -> std::result::Result<ExportOutcome, ExportFailure> {
        if self.is_busy() {
            warn!("export rejected, previous export still pending");
            return Err(ExportFailure {
                kind: ExportErrorKind::ExportInProgress,
                report: ExportReport::default(),
            });
        }

        let mut guard = CleanupGuard {
            queue: &mut self.queue,
            pending: &mut self.pending,
            delays: self.pipeline.settings.cleanup,
            now,
            selection: host.selection(),
            undo: Undo::default(),
        };
        let mut report = ExportReport::default();
        info!(objects = selection.names.len(), "export started");

        let result = self.pipeline.run(host, selection, &mut guard.undo, &mut report);
        drop(guard);

        match result {
            Ok((receipt, metadata)) => {
                info!(summary = %report, "export finished");
                Ok(ExportOutcome {
                    report,
                    receipt,
                    metadata,
                })
            }
            Err(kind) => {
                warn!(error = %kind, "export failed");
                Err(ExportFailure { kind, report })
            }
        }
    }
}

impl Pipeline {
    fn collect(&self, host: &dyn Host, selection: &ExportSelection, report: &mut ExportReport) -> Collected {
        let mut collected = Collected::default();
        let mut visited = HashSet::new();
        let mut stack: Vec<(String, bool)> = selection.names.iter().rev().map(|n| (n.clone(), false)).collect();

        while let Some((name, via_instance)) = stack.pop() {
            let Some(object) = host.object(&name) else {
                let message = if via_instance {
                    "instanced object not found"
                } else {
                    "object not found"
                };
                report.fail(&name, Stage::Resolve, message);
                continue;
            };
            if !visited.insert(name.clone()) {
                // a selected object that an instance also uses is exported through the instance
                if via_instance {
                    if let Some(entry) = collected.meshes.iter_mut().find(|(n, _)| *n == name) {
                        entry.1 = true;
                    }
                }
                continue;
            }
            match &object.kind {
                ObjectKind::Mesh(_) => collected.meshes.push((name, via_instance)),
                ObjectKind::Instance { collection } => {
                    collected.passthrough.push(ExportEntry::instance(&name, collection.clone()));
                    stack.extend(collection.iter().rev().map(|n| (n.clone(), true)));
                }
                ObjectKind::Empty => collected.passthrough.push(ExportEntry::empty(&name)),
            }
        }
        collected
    }

    fn cap_subdivision(&self, host: &mut dyn Host, meshes: &[(String, bool)], undo: &mut Undo, report: &mut ExportReport) {
        for (name, _) in meshes {
            let (Some(cap), Some(levels)) = (self.settings.subdivision.cap_for(name), host.subdivision(name)) else {
                continue;
            };
            if !levels.exceeds(cap) {
                continue;
            }
            undo.subdivision.push((name.clone(), levels));
            if host.set_subdivision(name, levels.capped(cap)) {
                debug!(object = %name, from = ?levels, cap, "capped subdivision");
                report.subdivision_capped += 1;
            }
        }
        if report.subdivision_capped > 0 {
            report.note(format!("Subdivision capped on {} object(s)", report.subdivision_capped));
        }
    }

    fn duplicate(&self, host: &mut dyn Host, meshes: &[(String, bool)], undo: &mut Undo, report: &mut ExportReport) -> WorkingSet {
        let mut set = WorkingSet::new();
        for (name, _) in meshes {
            let temp = temp_name(name);
            if let Err(e) = host.link_temp(&temp) {
                report.fail(name, Stage::Duplicate, e);
                continue;
            }
            undo.temps.push(temp.clone());
            let copy = host
                .duplicate(name, &temp)
                .and_then(|copy| copy.mesh().validate().map(|()| copy));
            match copy {
                Ok(copy) => set.insert(name.clone(), copy),
                Err(e) => {
                    warn!(object = %name, error = %e, "skipping object");
                    report.fail(name, Stage::Duplicate, e);
                }
            }
        }
        set
    }

    fn clean(&self, set: &mut WorkingSet, report: &mut ExportReport) {
        let mut broken = Vec::new();
        for (key, copy) in set.iter_mut() {
            match self.cleaner.clean(copy) {
                Ok(0) => {}
                Ok(removed) => {
                    report.cleaned += 1;
                    report.materials_removed += removed;
                }
                Err(e) => broken.push((key.to_string(), copy.sources().to_vec(), e)),
            }
        }
        for (key, sources, e) in broken {
            warn!(object = %key, error = %e, "dropping object with malformed mesh");
            set.remove(&key);
            for source in sources {
                report.fail(source, Stage::Clean, &e);
            }
        }
        if report.materials_removed > 0 {
            report.note(format!("Removed {} unused materials", report.materials_removed));
        }
    }

    fn prepare_uvs(&self, host: &mut dyn Host, set: &mut WorkingSet, undo: &mut Undo, report: &mut ExportReport) {
        if !self.settings.auto_uv {
            return;
        }
        let config = &self.settings.atlas;
        let mut grouping = {
            let meshes: Vec<_> = set.iter().map(|(_, copy)| copy.mesh()).collect();
            group_by_primary_material(&meshes, config)
        };
        // copies carry their temp names, the set is indexed by original name
        let original = |name: &mut String| {
            if let Some(stripped) = name.strip_prefix(TEMP_PREFIX) {
                *name = stripped.to_string();
            }
        };
        grouping.groups.iter_mut().flat_map(|g| g.members.iter_mut()).for_each(original);
        grouping.singles.iter_mut().for_each(original);
        grouping.kept_existing.iter_mut().for_each(original);

        let result = self.packer.process(&grouping, set, config);

        let mut atlases: Vec<&String> = result.entries.iter().filter_map(|e| e.atlas.as_ref()).collect();
        atlases.dedup();
        for atlas in atlases {
            match host.link_temp(atlas) {
                Ok(()) => undo.temps.push(atlas.clone()),
                Err(e) => warn!(atlas = %atlas, error = %e, "atlas name already in use"),
            }
        }
        for entry in result.entries.iter().filter(|e| e.state == UvState::Failed) {
            report.fail(&entry.object, Stage::Uv, "UV unwrap failed, exported with its original UVs");
        }

        report.atlases_created = result.atlases_created;
        report.packed = result.packed_objects();
        report.unwrapped = result.individually_unwrapped;
        if result.atlases_created > 0 {
            report.note(format!(
                "{} UV atlas(es) for {} objects",
                result.atlases_created,
                result.packed_objects()
            ));
        }
        if result.individually_unwrapped > 0 {
            report.note(format!("UV unwrapped {} objects", result.individually_unwrapped));
        }
        if result.skipped > 0 {
            report.note(format!("{} atlas group(s) fell back to individual unwrap", result.skipped));
        }
    }

    fn decimate(&self, set: &mut WorkingSet, report: &mut ExportReport) {
        let settings = &self.settings.decimation;
        if !settings.enabled {
            return;
        }

        let mut jobs = Vec::new();
        for (key, copy) in set.iter_mut() {
            let sources = copy.sources();
            if sources.iter().all(|s| settings.exclude.contains(s)) {
                debug!(object = %key, "excluded from decimation");
                continue;
            }
            if copy.mesh().face_count() <= settings.min_faces {
                continue;
            }
            let ratio = match sources.iter().find_map(|s| settings.overrides.get(s)) {
                Some(&ratio) => ratio,
                None if settings.adaptive => self.engine.adaptive_ratio(copy.mesh()),
                None => settings.ratio,
            };
            jobs.push((key.to_string(), copy.sources().to_vec(), copy, ratio));
        }
        jobs.sort_by(|a, b| a.0.cmp(&b.0));

        let (labels, batch): (Vec<_>, Vec<_>) = jobs
            .into_iter()
            .map(|(key, sources, copy, ratio)| ((key, sources), (copy, ratio)))
            .unzip();
        let results = self.engine.decimate_batch(batch, settings.method);

        for ((key, sources), outcome) in labels.into_iter().zip(results) {
            match outcome {
                Ok(result) => {
                    if result.backend_used.is_some() {
                        report.decimated += 1;
                        report.faces_before += result.faces_before;
                        report.faces_after += result.faces_after;
                    }
                    report.decimation.push(result);
                }
                Err(e) => {
                    warn!(object = %key, error = %e, "decimation failed, exporting undecimated");
                    for source in sources {
                        report.fail(source, Stage::Decimate, &e);
                    }
                }
            }
        }
        if report.decimated > 0 {
            report.note(format!(
                "Decimated {} objects ({:.0}% reduction)",
                report.decimated,
                report.reduction_percent()
            ));
        }
    }

    fn analyze_materials(&self, host: &dyn Host, set: &WorkingSet, report: &mut ExportReport) -> MaterialsSummary {
        let mut seen = HashSet::new();
        let mut definitions: Vec<MaterialDefinition> = Vec::new();
        for (_, copy) in set.iter() {
            for slot in &copy.mesh().material_slots {
                let Some(name) = slot.material.as_deref() else {
                    continue;
                };
                if seen.insert(name.to_string()) {
                    match host.material(name) {
                        Some(definition) => definitions.push(definition.clone()),
                        None => debug!(material = name, "no definition to analyze"),
                    }
                }
            }
        }
        let summary = summarize(&definitions);
        report.unsupported_materials = summary.unsupported.clone();
        summary
    }

    fn build_export_set(set: WorkingSet, collected: Collected) -> ExportSet {
        let mut export = ExportSet::new();
        for (name, copy) in set.into_ordered() {
            let sources = copy.sources().to_vec();
            let instanced = sources.iter().all(|s| collected.is_instanced(s));
            let mut mesh = copy.into_mesh();
            mesh.name = name.clone();
            let mut entry = ExportEntry::mesh(name, sources, mesh);
            entry.instanced = instanced;
            export.push(entry);
        }
        for entry in collected.passthrough {
            export.push(entry);
        }
        export
    }

    fn run(
        &self,
        host: &mut dyn Host,
        selection: &ExportSelection,
        undo: &mut Undo,
        report: &mut ExportReport,
    ) -> std::result::Result<(PublishReceipt, ArtifactMetadata), ExportErrorKind> {
        let collected = self.collect(&*host, selection, report);
        if collected.meshes.is_empty() && collected.passthrough.is_empty() {
            return Err(ExportErrorKind::EmptySelection);
        }
        let object_count = selection
            .names
            .iter()
            .filter(|n| host.object(n).is_some())
            .count();
        report.objects = object_count;

        self.cap_subdivision(host, &collected.meshes, undo, report);
        let mut set = self.duplicate(host, &collected.meshes, undo, report);
        self.clean(&mut set, report);
        self.prepare_uvs(host, &mut set, undo, report);
        self.decimate(&mut set, report);
        let materials = self.analyze_materials(&*host, &set, report);

        let export = Self::build_export_set(set, collected);
        let compression = self.settings.compression.resolve();
        let bytes = self.encoder.encode(&export, &compression)?;

        let filename = host
            .document_name()
            .map(|stem| format!("{}.glb", stem))
            .unwrap_or_else(|| "untitled.glb".to_string());
        let mut metadata = ArtifactMetadata::new(filename, bytes.len())
            .with_export_settings(self.settings.compression.preset.as_str(), compression.enabled)
            .with_object_count(object_count);
        if materials.total > 0 {
            metadata = metadata.with_materials(materials);
        }

        let size = bytes.len();
        let receipt = self
            .publisher
            .publish(PublishedArtifact::new(bytes, metadata.clone()))
            .map_err(|e| ExportErrorKind::Publish(e.to_string()))?;
        report.size = Some(size);
        report.note(if compression.enabled {
            format!("Draco Level {}", compression.compression_level)
        } else {
            "Uncompressed".to_string()
        });
        Ok((receipt, metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::CompressionConfig;
    use crate::host::MemoryScene;
    use glbridge_core::{Error, MeshObject, Point3f, SceneObject};
    use glbridge_server::ModelStore;

    fn make_cube(name: &str, material: &str) -> MeshObject {
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
        .with_material_slots([material])
    }

    fn manager() -> (SnapshotManager, Arc<ModelStore>) {
        let store = Arc::new(ModelStore::new());
        let manager = SnapshotManager::new(ExportSettings::default(), store.clone()).unwrap();
        (manager, store)
    }

    struct RefusingPublisher;

    impl Publisher for RefusingPublisher {
        fn publish(&self, _artifact: PublishedArtifact) -> Result<PublishReceipt> {
            Err(Error::ServerIo("store closed".to_string()))
        }
    }

    #[test]
    fn test_busy_until_restore_runs() {
        let (mut manager, _store) = manager();
        let mut scene = MemoryScene::new().with_object(SceneObject::mesh(make_cube("Box", "Wood")));
        let selection = ExportSelection::new(["Box"]);
        let start = Instant::now();

        manager.run_export_at(&mut scene, &selection, start).unwrap();
        assert!(manager.is_busy());
        let second = manager.run_export_at(&mut scene, &selection, start).unwrap_err();
        assert!(matches!(second.kind, ExportErrorKind::ExportInProgress));

        // destroy is due first, restore has not run yet
        let runs = manager.tick(&mut scene, start + manager.settings().cleanup.destroy_temps());
        assert_eq!(runs.len(), 1);
        assert!(manager.is_busy());

        manager.tick(&mut scene, start + manager.settings().cleanup.restore_state());
        assert!(!manager.is_busy());
        assert!(manager.run_export_at(&mut scene, &selection, start).is_ok());
    }

    #[test]
    fn test_empty_selection_still_schedules_cleanup() {
        let (mut manager, store) = manager();
        let mut scene = MemoryScene::new();
        let failure = manager
            .run_export(&mut scene, &ExportSelection::new(["Ghost"]))
            .unwrap_err();
        assert!(matches!(failure.kind, ExportErrorKind::EmptySelection));
        assert_eq!(failure.report.failed("Ghost").map(|f| f.stage), Some(Stage::Resolve));
        assert!(manager.pending_cleanup().is_some());
        assert!(store.is_empty());

        manager.flush(&mut scene);
        assert!(!manager.is_busy());
    }

    #[test]
    fn test_subdivision_capped_then_restored() {
        let (mut manager, _store) = manager();
        let cube = make_cube("Smooth", "Wood").with_subdivision(SubdivisionLevels::new(3, 4));
        let mut scene = MemoryScene::new().with_object(SceneObject::mesh(cube));

        let outcome = manager
            .run_export(&mut scene, &ExportSelection::new(["Smooth"]))
            .unwrap();
        assert_eq!(outcome.report.subdivision_capped, 1);
        assert_eq!(scene.subdivision("Smooth"), Some(SubdivisionLevels::new(2, 2)));

        manager.flush(&mut scene);
        assert_eq!(scene.subdivision("Smooth"), Some(SubdivisionLevels::new(3, 4)));
    }

    #[test]
    fn test_selected_instance_source_is_marked_instanced() {
        let (manager, _store) = manager();
        let scene = MemoryScene::new()
            .with_object(SceneObject::mesh(make_cube("Chair", "Wood")))
            .with_object(SceneObject::instance("Chairs", vec!["Chair".to_string()]));
        let mut report = ExportReport::default();
        let collected = manager.pipeline.collect(&scene, &ExportSelection::new(["Chair", "Chairs"]), &mut report);

        assert_eq!(collected.meshes, vec![("Chair".to_string(), true)]);
        assert_eq!(collected.passthrough.len(), 1);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_publish_failure_keeps_report() {
        let mut manager = SnapshotManager::new(ExportSettings::default(), Arc::new(RefusingPublisher)).unwrap();
        let mut scene = MemoryScene::new().with_object(SceneObject::mesh(make_cube("Box", "Wood")));
        let failure = manager
            .run_export(&mut scene, &ExportSelection::new(["Box"]))
            .unwrap_err();
        assert!(matches!(failure.kind, ExportErrorKind::Publish(_)));
        assert_eq!(failure.report.objects, 1);
        assert!(failure.report.size.is_none());

        manager.flush(&mut scene);
        assert_eq!(scene.destroy_calls("TEMP_DATA_Box"), 1);
        assert!(!scene.has_temp("TEMP_DATA_Box"));
    }

    struct PanickingEncoder;

    impl Encoder for PanickingEncoder {
        fn encode(&self, _set: &ExportSet, _compression: &CompressionConfig) -> std::result::Result<Vec<u8>, EncodeError> {
            panic!("encoder crashed");
        }
    }

    #[test]
    fn test_cleanup_scheduled_when_a_stage_panics() {
        let (manager, _store) = manager();
        let mut manager = manager.with_encoder(PanickingEncoder);
        let cube = make_cube("Box", "Wood").with_subdivision(SubdivisionLevels::new(4, 4));
        let mut scene = MemoryScene::new().with_object(SceneObject::mesh(cube));

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            manager.run_export(&mut scene, &ExportSelection::new(["Box"]))
        }));
        assert!(outcome.is_err());
        assert!(manager.is_busy());

        assert_eq!(manager.flush(&mut scene).len(), 2);
        assert_eq!(scene.destroy_calls("TEMP_DATA_Box"), 1);
        assert_eq!(scene.subdivision("Box"), Some(SubdivisionLevels::new(4, 4)));
        assert!(!manager.is_busy());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut settings = ExportSettings::default();
        settings.decimation.ratio = 1.5;
        assert!(SnapshotManager::new(settings, Arc::new(ModelStore::new())).is_err());
    }
}
