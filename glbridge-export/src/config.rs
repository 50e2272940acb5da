//! Export settings, loadable from TOML

use crate::deferred::CleanupDelays;
use crate::encoder::{CompressionConfig, CompressionPreset};
use glbridge_core::{Error, Result};
use glbridge_simplification::{DecimationConfig, DecimationMethod};
use glbridge_uv::AtlasConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Highest subdivision cap accepted in settings
pub const MAX_SUBDIVISION_CAP: u32 = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionSettings {
    pub preset: CompressionPreset,
    /// Used when `preset` is `CUSTOM`
    pub custom: CompressionConfig,
}

impl CompressionSettings {
    pub fn resolve(&self) -> CompressionConfig {
        match self.preset {
            CompressionPreset::Custom => self.custom,
            preset => preset.config(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecimationSettings {
    pub enabled: bool,
    /// Fraction of faces to keep
    pub ratio: f32,
    pub method: DecimationMethod,
    /// Derive each object's ratio from its face count instead of `ratio`
    pub adaptive: bool,
    /// Objects with this many faces or fewer are not decimated
    pub min_faces: usize,
    pub exclude: Vec<String>,
    /// Per-object ratios, taking precedence over `ratio` and `adaptive`
    pub overrides: BTreeMap<String, f32>,
    pub engine: DecimationConfig,
}

impl Default for DecimationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            ratio: 0.1,
            method: DecimationMethod::Auto,
            adaptive: false,
            min_faces: 10,
            exclude: Vec::new(),
            overrides: BTreeMap::new(),
            engine: DecimationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubdivisionSettings {
    pub enabled: bool,
    pub cap: u32,
    pub exclude: Vec<String>,
    /// Per-object caps
    pub overrides: BTreeMap<String, u32>,
}

impl Default for SubdivisionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cap: 2,
            exclude: Vec::new(),
            overrides: BTreeMap::new(),
        }
    }
}

impl SubdivisionSettings {
    /// Cap applied to `object`, or `None` if it is left alone
    pub fn cap_for(&self, object: &str) -> Option<u32> {
        if !self.enabled || self.exclude.iter().any(|n| n == object) {
            return None;
        }
        Some(self.overrides.get(object).copied().unwrap_or(self.cap))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub compression: CompressionSettings,
    pub decimation: DecimationSettings,
    /// Generate UVs for objects that need them
    pub auto_uv: bool,
    pub atlas: AtlasConfig,
    pub subdivision: SubdivisionSettings,
    pub cleanup: CleanupDelays,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            compression: CompressionSettings::default(),
            decimation: DecimationSettings::default(),
            auto_uv: true,
            atlas: AtlasConfig::default(),
            subdivision: SubdivisionSettings::default(),
            cleanup: CleanupDelays::default(),
        }
    }
}

fn check_ratio(what: &str, ratio: f32) -> Result<()> {
    if ratio > 0.0 && ratio <= 1.0 {
        Ok(())
    } else {
        Err(Error::Config(format!("{} {} must be in (0, 1]", what, ratio)))
    }
}

impl ExportSettings {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: Self =
            toml::from_str(text).map_err(|e| Error::Config(format!("invalid export settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(format!("cannot serialize export settings: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        self.compression
            .resolve()
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;

        let decimation = &self.decimation;
        check_ratio("decimation ratio", decimation.ratio)?;
        for (name, ratio) in &decimation.overrides {
            check_ratio(&format!("decimation override for '{}'", name), *ratio)?;
        }
        decimation.engine.validate()?;

        self.atlas.validate()?;

        let subdivision = &self.subdivision;
        for (name, cap) in std::iter::once(("<global>", &subdivision.cap))
            .chain(subdivision.overrides.iter().map(|(n, c)| (n.as_str(), c)))
        {
            if *cap > MAX_SUBDIVISION_CAP {
                return Err(Error::Config(format!(
                    "subdivision cap {} for {} exceeds {}",
                    cap, name, MAX_SUBDIVISION_CAP
                )));
            }
        }
        Ok(())
    }
}
