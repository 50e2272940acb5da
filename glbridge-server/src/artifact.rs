//! Published artifacts and the metadata served alongside them

use chrono::{DateTime, Utc};
use glbridge_materials::MaterialsSummary;
use serde::{Deserialize, Serialize};

/// File name used when the uploader did not describe the artifact
pub const DEFAULT_FILENAME: &str = "model.glb";

/// Size in megabytes with two decimals, as shown to clients
pub fn size_mb(bytes: usize) -> String {
    format!("{:.2}", bytes as f64 / (1024.0 * 1024.0))
}

/// Compression settings the artifact was encoded with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSettingsInfo {
    pub compression: String,
    pub draco_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub filename: String,
    /// Always present in the JSON, `null` when unknown
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub size: usize,
    #[serde(default)]
    pub size_mb: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_settings: Option<ExportSettingsInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub materials: Option<MaterialsSummary>,
}

impl ArtifactMetadata {
    pub fn new(filename: impl Into<String>, size: usize) -> Self {
        Self {
            filename: filename.into(),
            timestamp: Some(Utc::now()),
            size,
            size_mb: size_mb(size),
            export_settings: None,
            object_count: None,
            materials: None,
        }
    }

    /// Metadata recorded for an upload that carried no description
    pub fn minimal(size: usize) -> Self {
        Self {
            timestamp: None,
            ..Self::new(DEFAULT_FILENAME, size)
        }
    }

    pub fn with_export_settings(mut self, compression: impl Into<String>, draco_enabled: bool) -> Self {
        self.export_settings = Some(ExportSettingsInfo {
            compression: compression.into(),
            draco_enabled,
        });
        self
    }

    pub fn with_object_count(mut self, count: usize) -> Self {
        self.object_count = Some(count);
        self
    }

    pub fn with_materials(mut self, materials: MaterialsSummary) -> Self {
        self.materials = Some(materials);
        self
    }

    /// Overwrite the size fields with the real payload length
    pub fn set_size(&mut self, size: usize) {
        self.size = size;
        self.size_mb = size_mb(size);
    }
}

/// An encoded model and its metadata, immutable once published
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedArtifact {
    pub bytes: Vec<u8>,
    pub metadata: ArtifactMetadata,
}

impl PublishedArtifact {
    /// Wrap `bytes`, forcing the metadata size fields to match them
    pub fn new(bytes: Vec<u8>, mut metadata: ArtifactMetadata) -> Self {
        metadata.set_size(bytes.len());
        Self { bytes, metadata }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
