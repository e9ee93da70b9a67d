//! Render configuration, selected once at start-up and threaded through
//! every component.

use serde::{Deserialize, Serialize};
use std::fs::read_to_string;

use crate::error::ConfigError;

/// Which presentation paths draw mask materials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Textured GPU meshes only.
    #[default]
    Mesh,
    /// Clipped 2D pattern fills only.
    Vector,
    /// Meshes with the vector layer drawn on top (outlines, debug markers).
    Both,
}

impl RenderMode {
    pub fn draws_meshes(self) -> bool {
        matches!(self, RenderMode::Mesh | RenderMode::Both)
    }

    pub fn draws_vector_fills(self) -> bool {
        matches!(self, RenderMode::Vector)
    }
}

/// How base texture coordinates are derived from a polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UvMappingPolicy {
    /// World-calibrated when a calibration is known, stretch otherwise.
    #[default]
    Auto,
    Stretch,
    World,
}

/// Texture addressing the UVs are produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UvAddressing {
    /// Continuous tile-space coordinates; the sampler wraps.
    #[default]
    Repeat,
    /// Coordinates folded and clamped into [0, 1].
    Clamp,
}

impl UvAddressing {
    pub fn address_mode(self) -> wgpu::AddressMode {
        match self {
            UvAddressing::Repeat => wgpu::AddressMode::Repeat,
            UvAddressing::Clamp => wgpu::AddressMode::ClampToEdge,
        }
    }
}

/// How the photo is fitted into its container before user zoom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitPolicy {
    #[default]
    Contain,
    Cover,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureConfig {
    /// Same-origin endpoint that forwards a remote image.
    pub proxy_endpoint: String,
    /// Prepended to the endpoint; empty in the browser, a host on native.
    pub proxy_origin: String,
    /// LRU capacity of the decoded-bitmap cache; unbounded when absent.
    pub max_entries: Option<usize>,
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self {
            proxy_endpoint: "/api/texture".to_string(),
            proxy_origin: String::new(),
            max_entries: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub mode: RenderMode,
    pub uv_mapping: UvMappingPolicy,
    pub uv_addressing: UvAddressing,
    pub fit: FitPolicy,
    pub debug_overlay: bool,
    pub shading: bool,
    pub min_tile_screen_px: f32,
    pub repeat_px_override: Option<f32>,
    pub default_tile_px: f32,
    /// Vector fills follow the calibrated world grid and scale with zoom
    /// instead of keeping a constant on-screen tile size.
    pub world_locked_tiles: bool,
    pub diagnostic_color: [u8; 4],
    pub outline_color: [u8; 4],
    pub clear_color: [u8; 4],
    pub texture: TextureConfig,
    pub log_filter: Option<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            mode: RenderMode::default(),
            uv_mapping: UvMappingPolicy::default(),
            uv_addressing: UvAddressing::default(),
            fit: FitPolicy::default(),
            debug_overlay: false,
            shading: true,
            min_tile_screen_px: 16.0,
            repeat_px_override: None,
            default_tile_px: 96.0,
            world_locked_tiles: false,
            diagnostic_color: [255, 0, 255, 160],
            outline_color: [0, 200, 255, 255],
            clear_color: [26, 26, 30, 255],
            texture: TextureConfig::default(),
            log_filter: None,
        }
    }
}

impl RenderConfig {
    pub fn from_toml_str(data: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(data)?)
    }

    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let data = read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml_str(&data)
    }
}
