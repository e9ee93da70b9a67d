use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::Position;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaskId(pub String);

impl MaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tiling layout of the material inside a mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BondPattern {
    #[default]
    Straight,
    /// Running bond: odd rows shifted by half a tile.
    Brick50,
    Herringbone,
}

/// Per-mask rendering parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MaskMeta {
    /// World repeat size override in metres.
    pub scale: Option<f32>,
    pub rotation_deg: f32,
    /// Pattern phase, normalised; wraps.
    pub offset_x: f32,
    pub offset_y: f32,
    pub bond: BondPattern,
    pub grout_width_mm: f32,
    pub grout_color: Option<String>,
}

impl Default for MaskMeta {
    fn default() -> Self {
        Self {
            scale: None,
            rotation_deg: 0.0,
            offset_x: 0.0,
            offset_y: 0.0,
            bond: BondPattern::Straight,
            grout_width_mm: 0.0,
            grout_color: None,
        }
    }
}

/// Read-only snapshot of a user-drawn region, as handed over by the
/// mask-editing store. The rendering core never writes these back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mask {
    pub id: MaskId,
    #[serde(alias = "points")]
    pub polygon: Vec<Position>,
    #[serde(default)]
    pub material_id: Option<String>,
    #[serde(default)]
    pub meta: MaskMeta,
    #[serde(default = "visible_by_default")]
    pub is_visible: bool,
}

fn visible_by_default() -> bool {
    true
}

impl Mask {
    pub fn new(id: impl Into<String>, polygon: Vec<Position>) -> Self {
        Self {
            id: MaskId::new(id),
            polygon,
            material_id: None,
            meta: MaskMeta::default(),
            is_visible: true,
        }
    }

    pub fn with_material(mut self, material_id: impl Into<String>) -> Self {
        self.material_id = Some(material_id.into());
        self
    }

    pub fn with_meta(mut self, meta: MaskMeta) -> Self {
        self.meta = meta;
        self
    }

    /// A mask wants a textured mesh when it is visible, has a material and
    /// enough points to enclose an area.
    pub fn wants_texture(&self) -> bool {
        self.is_visible && self.material_id.is_some() && self.polygon.len() >= 3
    }
}

/// Pixels of the background photo per metre of real-world surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calibration {
    pub px_per_meter: f32,
}

impl Calibration {
    pub fn is_usable(&self) -> bool {
        self.px_per_meter.is_finite() && self.px_per_meter > 0.0
    }
}

/// Background photograph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoResource {
    pub url: String,
    #[serde(default, alias = "naturalWidth")]
    pub width: Option<u32>,
    #[serde(default, alias = "naturalHeight")]
    pub height: Option<u32>,
}
