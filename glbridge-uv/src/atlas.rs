//! Material-grouped UV atlas packing
//!
//! Objects whose primary material matches are joined into one working copy
//! named `UV_Atlas_<material>` and their charts are packed into a shared
//! `AtlasUV` channel, so the group renders with a single texture. Groups that
//! cannot be packed fall back to individual unwrapping of their members.

use crate::islands::island_charts;
use crate::pack::{pack_charts, write_charts, Chart, UvRegion};
use crate::unwrap::{angle_charts, unwrap, UnwrapConfig};
use glbridge_core::{atlas_name, Error, MeshObject, Result, WorkingCopy, WorkingSet};
use glbridge_materials::primary_material;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Channel written on joined atlas copies
pub const ATLAS_CHANNEL: &str = "AtlasUV";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    pub enabled: bool,
    /// Smallest number of objects that forms an atlas group
    pub min_group_size: usize,
    /// Target texture resolution in pixels; the margin never drops below one texel
    pub texture_size: u32,
    /// Gap between islands as a fraction of the atlas side
    pub margin: f32,
    /// Leave objects that already have UVs alone
    pub respect_existing_uvs: bool,
    /// Settings for objects unwrapped on their own
    pub unwrap: UnwrapConfig,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_group_size: 2,
            texture_size: 1024,
            margin: 0.05,
            respect_existing_uvs: true,
            unwrap: UnwrapConfig::default(),
        }
    }
}

impl AtlasConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_group_size < 2 {
            return Err(Error::Config(format!(
                "min_group_size must be at least 2, got {}",
                self.min_group_size
            )));
        }
        if self.texture_size == 0 {
            return Err(Error::Config("texture_size must be positive".into()));
        }
        if !(0.0..0.5).contains(&self.margin) {
            return Err(Error::Config(format!("atlas margin {} must be in [0, 0.5)", self.margin)));
        }
        self.unwrap.validate()
    }

    fn effective_margin(&self) -> f32 {
        self.margin.max(1.0 / self.texture_size as f32)
    }
}

/// Objects sharing a primary material
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialGroup {
    pub material: String,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Grouping {
    pub groups: Vec<MaterialGroup>,
    /// Objects to unwrap individually
    pub singles: Vec<String>,
    /// Objects left with their existing UVs
    pub kept_existing: Vec<String>,
}

/// Group meshes by primary material, in order of first appearance
pub fn group_by_primary_material(meshes: &[&MeshObject], config: &AtlasConfig) -> Grouping {
    let mut grouping = Grouping::default();
    let mut by_material: Vec<MaterialGroup> = Vec::new();

    for mesh in meshes {
        if config.respect_existing_uvs && mesh.has_uvs() {
            grouping.kept_existing.push(mesh.name.clone());
            continue;
        }
        match primary_material(mesh) {
            Some(material) if config.enabled => {
                match by_material.iter_mut().find(|g| g.material == material) {
                    Some(group) => group.members.push(mesh.name.clone()),
                    None => by_material.push(MaterialGroup {
                        material,
                        members: vec![mesh.name.clone()],
                    }),
                }
            }
            _ => grouping.singles.push(mesh.name.clone()),
        }
    }

    for group in by_material {
        if group.members.len() >= config.min_group_size {
            grouping.groups.push(group);
        } else {
            grouping.singles.extend(group.members);
        }
    }
    grouping
}

/// Lifecycle of one object through UV processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UvState {
    NoUv,
    CandidateForAtlas,
    NeedsIndividualUnwrap,
    Packed,
    IndividuallyUnwrapped,
    Failed,
}

impl UvState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UvState::Packed | UvState::IndividuallyUnwrapped | UvState::Failed
        )
    }

    pub fn can_transition(&self, to: UvState) -> bool {
        use UvState::*;
        matches!(
            (self, to),
            (NoUv, CandidateForAtlas)
                | (NoUv, NeedsIndividualUnwrap)
                | (NoUv, Failed)
                | (CandidateForAtlas, Packed)
                | (CandidateForAtlas, NeedsIndividualUnwrap)
                | (CandidateForAtlas, Failed)
                | (NeedsIndividualUnwrap, IndividuallyUnwrapped)
                | (NeedsIndividualUnwrap, Failed)
        )
    }

    pub fn transition(self, to: UvState) -> Result<UvState> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(Error::InvalidData(format!("illegal UV state change {:?} -> {:?}", self, to)))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AtlasEntry {
    pub object: String,
    pub state: UvState,
    /// Area the object occupies in its atlas
    pub region: Option<UvRegion>,
    /// Name of the joined copy holding this object
    pub atlas: Option<String>,
}

impl AtlasEntry {
    fn new(object: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            state: UvState::NoUv,
            region: None,
            atlas: None,
        }
    }

    fn advance(&mut self, to: UvState) {
        match self.state.transition(to) {
            Ok(next) => self.state = next,
            Err(e) => {
                warn!(object = %self.object, error = %e, "marking object failed");
                self.state = UvState::Failed;
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AtlasPackResult {
    pub entries: Vec<AtlasEntry>,
    pub atlas_resolution: u32,
    pub margin: f32,
    pub atlases_created: usize,
    pub individually_unwrapped: usize,
    /// Groups that could not be packed
    pub skipped: usize,
    pub failed: usize,
    pub kept_existing: usize,
}

impl AtlasPackResult {
    pub fn entry(&self, object: &str) -> Option<&AtlasEntry> {
        self.entries.iter().find(|e| e.object == object)
    }

    pub fn packed_objects(&self) -> usize {
        self.entries.iter().filter(|e| e.state == UvState::Packed).count()
    }
}

impl fmt::Display for AtlasPackResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} atlases ({} objects), {} individual unwraps, {} skipped, {} failed",
            self.atlases_created,
            self.packed_objects(),
            self.individually_unwrapped,
            self.skipped,
            self.failed
        )
    }
}

struct PackedGroup {
    joined: WorkingCopy,
    regions: Vec<Option<UvRegion>>,
}

/// Packs material groups into shared atlases
#[derive(Debug, Clone, Default)]
pub struct AtlasPacker;

impl AtlasPacker {
    pub fn new() -> Self {
        Self
    }

    fn member_charts(member: &MeshObject, joined: &MeshObject, faces: &[usize], config: &AtlasConfig) -> Result<Vec<Chart>> {
        let existing = member
            .uv_channels
            .first()
            .and_then(|name| joined.uv_channel_index(name));
        match existing {
            Some(channel) => island_charts(joined, channel, faces),
            None => angle_charts(joined, faces, config.unwrap.angle_limit),
        }
    }

    fn pack_group(&self, group: &MaterialGroup, set: &WorkingSet, config: &AtlasConfig) -> Result<PackedGroup> {
        let failure = |reason: String| Error::AtlasPackFailure {
            group: group.material.clone(),
            reason,
        };

        let members: Vec<&WorkingCopy> = group
            .members
            .iter()
            .map(|name| {
                set.get(name)
                    .ok_or_else(|| failure(format!("no working copy for '{}'", name)))
            })
            .collect::<Result<_>>()?;

        let mut joined = WorkingCopy::join(atlas_name(&group.material), &members)
            .map_err(|e| failure(e.to_string()))?;

        let mut charts = Vec::new();
        let mut owners = Vec::new();
        let mut start = 0;
        for (idx, member) in members.iter().enumerate() {
            let count = member.mesh().faces.len();
            let faces: Vec<usize> = (start..start + count).collect();
            let member_charts = Self::member_charts(member.mesh(), joined.mesh(), &faces, config)
                .map_err(|e| failure(e.to_string()))?;
            owners.extend(std::iter::repeat(idx).take(member_charts.len()));
            charts.extend(member_charts);
            start += count;
        }

        let layout = pack_charts(&charts, config.effective_margin()).map_err(|e| failure(e.to_string()))?;

        let mut regions: Vec<Option<UvRegion>> = vec![None; members.len()];
        for (owner, placement) in owners.iter().zip(&layout.placements) {
            let slot = &mut regions[*owner];
            *slot = Some(match slot {
                Some(r) => r.union(&placement.region),
                None => placement.region,
            });
        }

        let mesh = joined.mesh_mut();
        let channel = mesh.add_uv_channel(ATLAS_CHANNEL);
        write_charts(mesh, channel, &charts, &layout);
        debug!(
            atlas = %mesh.name,
            members = members.len(),
            charts = charts.len(),
            margin = layout.effective_margin,
            "packed atlas"
        );
        Ok(PackedGroup { joined, regions })
    }

    fn unwrap_individually(&self, entry: &mut AtlasEntry, set: &mut WorkingSet, config: &AtlasConfig, result: &mut AtlasPackResult) {
        let outcome = match set.get_mut(&entry.object) {
            Some(copy) => unwrap(copy, &config.unwrap),
            None => Err(Error::ObjectNotFound(entry.object.clone())),
        };
        match outcome {
            Ok(report) => {
                debug!(object = %entry.object, charts = report.charts, "individually unwrapped");
                entry.advance(UvState::IndividuallyUnwrapped);
                result.individually_unwrapped += 1;
            }
            Err(e) => {
                warn!(object = %entry.object, error = %e, "individual unwrap failed");
                entry.advance(UvState::Failed);
                result.failed += 1;
            }
        }
    }

    /// Pack each group into its own atlas.
    ///
    /// Successfully packed members are replaced in `set` by the joined copy.
    /// A group that fails is counted in `skipped` and its members are
    /// unwrapped one by one instead; nothing here aborts the export.
    pub fn pack_atlas(&self, groups: &[MaterialGroup], set: &mut WorkingSet, config: &AtlasConfig) -> AtlasPackResult {
        let mut result = AtlasPackResult {
            atlas_resolution: config.texture_size,
            margin: config.effective_margin(),
            ..Default::default()
        };

        for group in groups {
            let mut entries: Vec<AtlasEntry> = group
                .members
                .iter()
                .map(|name| {
                    let mut entry = AtlasEntry::new(name);
                    entry.advance(UvState::CandidateForAtlas);
                    entry
                })
                .collect();

            match self.pack_group(group, set, config) {
                Ok(PackedGroup { joined, regions }) => {
                    let atlas = joined.name().to_string();
                    for (entry, region) in entries.iter_mut().zip(regions) {
                        entry.advance(UvState::Packed);
                        entry.region = region;
                        entry.atlas = Some(atlas.clone());
                    }
                    set.replace_with_joined(&group.members, atlas.clone(), joined);
                    result.atlases_created += 1;
                    info!(atlas = %atlas, objects = group.members.len(), "created UV atlas");
                }
                Err(e) => {
                    warn!(material = %group.material, error = %e, "atlas packing failed, unwrapping members individually");
                    result.skipped += 1;
                    for entry in &mut entries {
                        entry.advance(UvState::NeedsIndividualUnwrap);
                        self.unwrap_individually(entry, set, config, &mut result);
                    }
                }
            }
            result.entries.extend(entries);
        }
        result
    }

    /// Run a full grouping: atlases for groups, unwraps for singles
    pub fn process(&self, grouping: &Grouping, set: &mut WorkingSet, config: &AtlasConfig) -> AtlasPackResult {
        let mut result = self.pack_atlas(&grouping.groups, set, config);
        for name in &grouping.singles {
            let mut entry = AtlasEntry::new(name);
            entry.advance(UvState::NeedsIndividualUnwrap);
            self.unwrap_individually(&mut entry, set, config, &mut result);
            result.entries.push(entry);
        }
        result.kept_existing = grouping.kept_existing.len();
        result
    }
}
