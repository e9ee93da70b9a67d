use thiserror::Error;

use crate::transform::ViewTransform;

/// Failure of a single transport attempt (direct or proxied).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("HTTP status {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Network(String),

    #[error("unsupported url: {0}")]
    Unsupported(String),
}

/// A material's source image could not be turned into a bitmap.
///
/// Cloneable because a single in-flight load is shared by every caller
/// that asked for the same URL.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TextureLoadError {
    #[error("texture url is empty")]
    EmptyUrl,

    #[error(
        "failed to fetch {url} (direct: {direct}; proxy: {})",
        .proxy.as_ref().map_or_else(|| "not configured".to_string(), ToString::to_string)
    )]
    Unreachable {
        url: String,
        direct: FetchError,
        proxy: Option<FetchError>,
    },

    #[error("failed to decode {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("{url} decoded to an empty image")]
    EmptyImage { url: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("mesh build failed for mask {mask}: {reason}")]
    MeshBuild { mask: String, reason: String },

    #[error("shading failed for mask {mask}: {reason}")]
    Shading { mask: String, reason: String },

    #[error("surface error: {0}")]
    Surface(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("unknown mesh handle")]
    UnknownMesh,

    #[error("unknown texture handle")]
    UnknownTexture,
}

/// Why a polygon cannot be meshed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolygonIssue {
    #[error("polygon has {0} points, need at least 3")]
    TooFewPoints(usize),

    #[error("points {index} and {next} coincide")]
    DuplicatePoint { index: usize, next: usize },

    #[error("polygon area {area:.1} is below the minimum")]
    AreaTooSmall { area: f32 },

    #[error("triangulation produced no triangles")]
    NoTriangles,
}

/// The vector overlay and the mesh stage were handed different transforms.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("transform desync: vector layer {vector:?} vs mesh stage {stage:?}")]
pub struct TransformDesync {
    pub vector: Option<ViewTransform>,
    pub stage: Option<ViewTransform>,
}

#[derive(Error, Debug)]
pub enum MaterialError {
    #[error("material record has no id")]
    MissingId,

    #[error("material source failed: {0}")]
    Source(String),

    #[error("invalid material json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Error, Debug)]
pub enum SceneError {
    #[error("failed to read scene {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid scene json: {0}")]
    Json(#[from] serde_json::Error),
}
