//! Synchronization settings.

use std::path::Path;

use serde::{Deserialize, Serialize};
use stagelink_core::{Purpose, StageInfo, UpAxis};

use crate::error::{SyncError, SyncResult};

/// Settings controlling how a stage is translated into the scene.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Time code the stage is first evaluated at
    pub initial_time: f64,

    /// Prims whose computed purpose is not listed are skipped with their subtree
    pub purposes_to_load: Vec<Purpose>,

    /// Model kinds whose subtree is merged into a single asset and component
    pub kinds_to_collapse: Vec<String>,

    /// Share one asset between prims producing identical data
    pub merge_identical_assets: bool,

    /// Engine up axis
    pub target_up_axis: UpAxis,

    /// Engine linear unit
    pub target_meters_per_unit: f64,

    /// Worker threads for asset builds (0 = one per core)
    pub worker_threads: usize,

    /// Spawn actors for model prims (assembly, group, component)
    pub spawn_actors_for_models: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            initial_time: 0.0,
            purposes_to_load: vec![Purpose::Default, Purpose::Proxy, Purpose::Render],
            kinds_to_collapse: vec!["component".to_string()],
            merge_identical_assets: true,
            target_up_axis: UpAxis::Z,
            target_meters_per_unit: 0.01,
            worker_threads: 0,
            spawn_actors_for_models: true,
        }
    }
}

impl SyncSettings {
    /// Parse settings from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> SyncResult<Self> {
        let settings: SyncSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> SyncResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let settings = Self::from_json_str(&content)?;
        log::info!("Loaded sync settings from {}", path.as_ref().display());
        Ok(settings)
    }

    pub fn validate(&self) -> SyncResult<()> {
        if !(self.target_meters_per_unit.is_finite() && self.target_meters_per_unit > 0.0) {
            return Err(SyncError::InvalidSettings(format!(
                "target_meters_per_unit must be positive, got {}",
                self.target_meters_per_unit
            )));
        }
        if !self.initial_time.is_finite() {
            return Err(SyncError::InvalidSettings("initial_time must be finite".to_string()));
        }
        Ok(())
    }

    /// Engine-side stage info the stage is converted into.
    pub fn target_info(&self) -> StageInfo {
        StageInfo {
            up_axis: self.target_up_axis,
            meters_per_unit: self.target_meters_per_unit,
        }
    }

    pub fn loads_purpose(&self, purpose: Purpose) -> bool {
        self.purposes_to_load.contains(&purpose)
    }

    pub fn collapses_kind(&self, kind: &str) -> bool {
        self.kinds_to_collapse.iter().any(|k| k == kind)
    }
}
