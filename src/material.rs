//! Materials library boundary: raw REST records are normalised into one
//! canonical `Material` shape on ingestion.

use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::MaterialError;

/// Repeat size used when a record carries no sizing at all.
pub const DEFAULT_REPEAT_M: f32 = 0.30;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RecordId {
    Text(String),
    Number(i64),
}

impl RecordId {
    fn into_string(self) -> String {
        match self {
            RecordId::Text(s) => s,
            RecordId::Number(n) => n.to_string(),
        }
    }
}

/// Material as it arrives from the materials API. Field names vary between
/// endpoints and record generations.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MaterialRecord {
    pub id: Option<RecordId>,
    pub name: Option<String>,
    pub texture_url: Option<String>,
    pub image_url: Option<String>,
    pub albedo_url: Option<String>,
    pub physical_repeat_m: Option<f32>,
    pub sheet_width_mm: Option<f32>,
    pub tile_width_mm: Option<f32>,
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialCategory {
    /// Ceramic / glass tile, typically submerged.
    Tile,
    Stone,
    Paving,
    Coping,
    #[default]
    Other,
}

impl MaterialCategory {
    pub fn from_label(label: &str) -> Self {
        let label = label.to_ascii_lowercase();
        if label.contains("coping") {
            MaterialCategory::Coping
        } else if label.contains("pav") {
            MaterialCategory::Paving
        } else if label.contains("stone") || label.contains("granite") || label.contains("travertine")
        {
            MaterialCategory::Stone
        } else if label.contains("tile") || label.contains("mosaic") || label.contains("pool") {
            MaterialCategory::Tile
        } else {
            MaterialCategory::Other
        }
    }
}

/// Canonical, read-only material.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub id: String,
    pub name: Option<String>,
    pub texture_url: Option<String>,
    /// Real-world size of one texture repeat, in metres.
    pub repeat_m: f32,
    pub category: MaterialCategory,
}

fn positive(value: Option<f32>) -> Option<f32> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl Material {
    pub fn from_record(record: MaterialRecord) -> Result<Self, MaterialError> {
        let id = record
            .id
            .map(RecordId::into_string)
            .filter(|id| !id.is_empty())
            .ok_or(MaterialError::MissingId)?;

        let texture_url = non_empty(record.texture_url)
            .or_else(|| non_empty(record.image_url))
            .or_else(|| non_empty(record.albedo_url));

        let repeat_m = positive(record.physical_repeat_m)
            .or_else(|| positive(record.sheet_width_mm).map(|mm| mm / 1000.0))
            .or_else(|| positive(record.tile_width_mm).map(|mm| mm / 1000.0))
            .unwrap_or(DEFAULT_REPEAT_M);

        let category = record
            .category
            .as_deref()
            .or(record.kind.as_deref())
            .map(MaterialCategory::from_label)
            .unwrap_or_default();

        Ok(Self {
            id,
            name: record.name,
            texture_url,
            repeat_m,
            category,
        })
    }
}

/// Where the library pulls its records from (the materials API).
pub trait MaterialSource {
    fn fetch_all(&self) -> LocalBoxFuture<'_, Result<Vec<MaterialRecord>, MaterialError>>;
}

#[derive(Default)]
pub struct MaterialLibrary {
    materials: RefCell<Option<HashMap<String, Rc<Material>>>>,
}

impl MaterialLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an already-loaded library. Records that fail to normalise are
    /// skipped with a warning.
    pub fn from_records(records: impl IntoIterator<Item = MaterialRecord>) -> Self {
        let library = Self::new();
        library.install(records);
        library
    }

    pub fn from_json(data: &str) -> Result<Self, MaterialError> {
        let records: Vec<MaterialRecord> = serde_json::from_str(data)?;
        Ok(Self::from_records(records))
    }

    fn install(&self, records: impl IntoIterator<Item = MaterialRecord>) {
        let mut map = HashMap::new();
        for record in records {
            match Material::from_record(record) {
                Ok(material) => {
                    map.insert(material.id.clone(), Rc::new(material));
                }
                Err(err) => log::warn!("skipping material record: {err}"),
            }
        }
        *self.materials.borrow_mut() = Some(map);
    }

    pub fn is_loaded(&self) -> bool {
        self.materials.borrow().is_some()
    }

    /// Loads the library from `source` unless it is already loaded.
    pub async fn ensure_loaded(&self, source: &dyn MaterialSource) -> Result<(), MaterialError> {
        if self.is_loaded() {
            return Ok(());
        }
        let records = source.fetch_all().await?;
        // another caller may have finished first; keep the first load
        if !self.is_loaded() {
            self.install(records);
        }
        Ok(())
    }

    pub fn get_by_id(&self, id: &str) -> Option<Rc<Material>> {
        self.materials.borrow().as_ref()?.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.materials.borrow().as_ref().map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
