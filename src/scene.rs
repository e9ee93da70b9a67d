//! Scene documents: a photo, its calibration, the material records and the
//! mask snapshots, as one JSON file. Input for the binaries.

use serde::{Deserialize, Serialize};
use std::fs::read_to_string;

use crate::error::SceneError;
use crate::material::{MaterialLibrary, MaterialRecord};
use crate::model::{Calibration, Mask, PhotoResource};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub photo: PhotoResource,
    #[serde(default)]
    pub calibration: Option<Calibration>,
    #[serde(default)]
    pub materials: Vec<MaterialRecord>,
    #[serde(default)]
    pub masks: Vec<Mask>,
}

impl Scene {
    pub fn from_json(data: &str) -> Result<Self, SceneError> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn load(path: &str) -> Result<Self, SceneError> {
        let data = read_to_string(path).map_err(|source| SceneError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_json(&data)
    }

    pub fn material_library(&self) -> MaterialLibrary {
        MaterialLibrary::from_records(self.materials.iter().cloned())
    }

    /// Calibration if it is usable.
    pub fn usable_calibration(&self) -> Option<Calibration> {
        self.calibration.filter(Calibration::is_usable)
    }
}
