//! The per-export summary shown to the user

use glbridge_simplification::DecimationResult;
use serde::Serialize;
use std::fmt;

/// Pipeline stage an object failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Resolve,
    Duplicate,
    Clean,
    Uv,
    Decimate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Resolve => "resolve",
            Stage::Duplicate => "duplicate",
            Stage::Clean => "clean",
            Stage::Uv => "uv",
            Stage::Decimate => "decimate",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectFailure {
    pub object: String,
    pub stage: Stage,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportReport {
    pub objects: usize,
    pub subdivision_capped: usize,
    /// Objects that lost at least one material slot
    pub cleaned: usize,
    pub materials_removed: usize,
    pub atlases_created: usize,
    pub packed: usize,
    pub unwrapped: usize,
    pub decimated: usize,
    pub faces_before: usize,
    pub faces_after: usize,
    pub decimation: Vec<DecimationResult>,
    pub unsupported_materials: Vec<String>,
    /// Size of the published artifact
    pub size: Option<usize>,
    pub failures: Vec<ObjectFailure>,
    pub info: Vec<String>,
}

impl ExportReport {
    pub fn fail(&mut self, object: impl Into<String>, stage: Stage, message: impl fmt::Display) {
        self.failures.push(ObjectFailure {
            object: object.into(),
            stage,
            message: message.to_string(),
        });
    }

    pub fn note(&mut self, line: impl Into<String>) {
        self.info.push(line.into());
    }

    /// Percentage of faces removed across all decimated objects
    pub fn reduction_percent(&self) -> f32 {
        if self.faces_before == 0 {
            return 0.0;
        }
        (self.faces_before - self.faces_after.min(self.faces_before)) as f32 / self.faces_before as f32 * 100.0
    }

    pub fn failed(&self, object: &str) -> Option<&ObjectFailure> {
        self.failures.iter().find(|f| f.object == object)
    }
}

impl fmt::Display for ExportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.size {
            Some(size) => write!(f, "Exported {:.2}MB", size as f64 / (1024.0 * 1024.0))?,
            None => f.write_str("Export failed")?,
        }
        if !self.info.is_empty() {
            write!(f, " ({})", self.info.join(", "))?;
        }
        if !self.unsupported_materials.is_empty() {
            let shown: Vec<&str> = self.unsupported_materials.iter().take(5).map(String::as_str).collect();
            write!(
                f,
                ". {} unsupported material(s): {}",
                self.unsupported_materials.len(),
                shown.join(", ")
            )?;
            if self.unsupported_materials.len() > 5 {
                write!(f, " (+{} more)", self.unsupported_materials.len() - 5)?;
            }
        }
        if !self.failures.is_empty() {
            let listed: Vec<String> = self
                .failures
                .iter()
                .map(|fail| format!("{} ({}: {})", fail.object, fail.stage, fail.message))
                .collect();
            write!(f, ". {} object failure(s): {}", self.failures.len(), listed.join("; "))?;
        }
        Ok(())
    }
}
