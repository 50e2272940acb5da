//! Encoder interface and compression settings

use glbridge_core::MeshObject;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("nothing to encode")]
    Empty,

    #[error("cannot encode '{object}': {reason}")]
    InvalidMesh { object: String, reason: String },

    #[error("invalid compression settings: {0}")]
    Compression(String),

    #[error("output exceeds the 4 GiB container limit")]
    TooLarge,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Mesh compression parameters handed to the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
    /// 0 is fastest, 10 is smallest
    pub compression_level: u8,
    pub position_quantization_bits: u8,
    pub normal_quantization_bits: u8,
    pub uv_quantization_bits: u8,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        CompressionPreset::Medium.config()
    }
}

impl CompressionConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..CompressionPreset::Medium.config()
        }
    }

    pub fn validate(&self) -> Result<(), EncodeError> {
        if self.compression_level > 10 {
            return Err(EncodeError::Compression(format!(
                "compression_level {} is outside 0-10",
                self.compression_level
            )));
        }
        for (name, bits) in [
            ("position", self.position_quantization_bits),
            ("normal", self.normal_quantization_bits),
            ("uv", self.uv_quantization_bits),
        ] {
            if !(8..=16).contains(&bits) {
                return Err(EncodeError::Compression(format!(
                    "{} quantization of {} bits is outside 8-16",
                    name, bits
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CompressionPreset {
    None,
    Low,
    #[default]
    Medium,
    High,
    /// Use the explicit compression settings
    Custom,
}

impl CompressionPreset {
    /// Settings for this preset; `Custom` yields the `Medium` values as a starting point
    pub fn config(self) -> CompressionConfig {
        let (enabled, level, position, normal, uv) = match self {
            CompressionPreset::None => (false, 0, 14, 10, 12),
            CompressionPreset::Low => (true, 3, 16, 12, 14),
            CompressionPreset::Medium | CompressionPreset::Custom => (true, 6, 14, 10, 12),
            CompressionPreset::High => (true, 10, 11, 8, 10),
        };
        CompressionConfig {
            enabled,
            compression_level: level,
            position_quantization_bits: position,
            normal_quantization_bits: normal,
            uv_quantization_bits: uv,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CompressionPreset::None => "NONE",
            CompressionPreset::Low => "LOW",
            CompressionPreset::Medium => "MEDIUM",
            CompressionPreset::High => "HIGH",
            CompressionPreset::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for CompressionPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryKind {
    Mesh(MeshObject),
    /// Passed through unmodified; members are resolved by source name
    Instance { collection: Vec<String> },
    /// Objects without geometry, exported as bare nodes
    Empty,
}

/// One object of the substituted export set
#[derive(Debug, Clone, PartialEq)]
pub struct ExportEntry {
    pub name: String,
    /// Original objects this entry stands for
    pub sources: Vec<String>,
    pub kind: EntryKind,
    /// Only reachable through an instance, not exported at top level
    pub instanced: bool,
}

impl ExportEntry {
    pub fn mesh(name: impl Into<String>, sources: Vec<String>, mesh: MeshObject) -> Self {
        Self {
            name: name.into(),
            sources,
            kind: EntryKind::Mesh(mesh),
            instanced: false,
        }
    }

    pub fn instance(name: impl Into<String>, collection: Vec<String>) -> Self {
        let name = name.into();
        Self {
            sources: vec![name.clone()],
            name,
            kind: EntryKind::Instance { collection },
            instanced: false,
        }
    }

    pub fn empty(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            sources: vec![name.clone()],
            name,
            kind: EntryKind::Empty,
            instanced: false,
        }
    }

    pub fn as_mesh(&self) -> Option<&MeshObject> {
        match &self.kind {
            EntryKind::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }
}

/// Everything handed to the encoder, in export order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportSet {
    pub entries: Vec<ExportEntry>,
}

impl ExportSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ExportEntry) {
        self.entries.push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn meshes(&self) -> impl Iterator<Item = &MeshObject> {
        self.entries.iter().filter_map(ExportEntry::as_mesh)
    }
}

/// Turns an export set into artifact bytes
pub trait Encoder {
    fn encode(&self, set: &ExportSet, compression: &CompressionConfig) -> Result<Vec<u8>, EncodeError>;
}
