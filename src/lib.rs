//! Material texturing for masked regions of a photograph.
//!
//! Two presentation paths share one texture cache and one view transform:
//! the GPU mesh path ([`renderer::MeshRenderer`]) and the tiny-skia vector
//! path ([`overlay::VectorOverlay`]). [`transform::TransformBridge`] keeps
//! them aligned.

pub mod config;
pub mod error;
pub mod fetch;
pub mod material;
pub mod model;
pub mod overlay;
pub mod renderer;
pub mod scene;
pub mod shading;
pub mod texture_loader;
pub mod transform;
pub mod triangulate;
pub mod utils;
pub mod uv;

#[cfg(feature = "backend-wgpu")]
pub mod gpu;

#[cfg(all(feature = "viewer", not(target_arch = "wasm32")))]
pub mod app;

pub use config::{FitPolicy, RenderConfig, RenderMode, UvAddressing, UvMappingPolicy};
pub use error::{RenderError, TextureLoadError};
pub use material::{Material, MaterialLibrary};
pub use model::{BondPattern, Calibration, Mask, MaskId, MaskMeta};
pub use overlay::VectorOverlay;
pub use renderer::{MeshRenderer, RenderBackend};
pub use scene::Scene;
pub use texture_loader::{Bitmap, TextureCache};
pub use transform::{TransformBridge, ViewTransform};

/// Installs the global logger. `RUST_LOG` wins over `default_filter`, which
/// falls back to `info`. Calling it twice is harmless.
pub fn init_logger(default_filter: Option<&str>) {
    let env = env_logger::Env::default().default_filter_or(default_filter.unwrap_or("info"));
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}
