//! Texture coordinates for mask meshes.
//!
//! Pipeline per vertex: base mapping (stretch or world-calibrated), rotation
//! about the texture centre, bond pattern, offset phase, then the addressing
//! policy (`Repeat` keeps continuous tile coordinates, `Clamp` folds them
//! into the unit square).

use crate::config::{UvAddressing, UvMappingPolicy};
use crate::model::{BondPattern, Calibration, MaskMeta};
use crate::utils::{Position, Rectangle};

pub type Uv = [f32; 2];

/// Base mapping from polygon space to tile space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UvMapping {
    /// Normalise by the polygon's own bounding box.
    Stretch,
    /// Project onto a world grid: one tile every `px_per_unit * repeat` pixels.
    World { px_per_unit: f32, repeat: f32 },
}

impl UvMapping {
    /// Picks the mapping for a mask. `Auto` goes world-calibrated whenever a
    /// usable calibration exists.
    pub fn select(
        policy: UvMappingPolicy,
        calibration: Option<Calibration>,
        repeat_m: f32,
    ) -> UvMapping {
        let calibrated = calibration.filter(Calibration::is_usable);
        match (policy, calibrated) {
            (UvMappingPolicy::Stretch, _) => UvMapping::Stretch,
            (UvMappingPolicy::World | UvMappingPolicy::Auto, Some(c)) => UvMapping::World {
                px_per_unit: c.px_per_meter,
                repeat: repeat_m,
            },
            (UvMappingPolicy::World, None) => {
                log::debug!("world uv mapping requested without calibration; stretching");
                UvMapping::Stretch
            }
            (UvMappingPolicy::Auto, None) => UvMapping::Stretch,
        }
    }
}

/// Everything besides the points that determines a mask's UVs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvParams {
    pub mapping: UvMapping,
    pub rotation_deg: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub bond: BondPattern,
    pub addressing: UvAddressing,
}

impl UvParams {
    pub fn new(mapping: UvMapping, addressing: UvAddressing) -> Self {
        Self {
            mapping,
            rotation_deg: 0.0,
            offset_x: 0.0,
            offset_y: 0.0,
            bond: BondPattern::Straight,
            addressing,
        }
    }

    pub fn from_meta(mapping: UvMapping, meta: &MaskMeta, addressing: UvAddressing) -> Self {
        Self {
            mapping,
            rotation_deg: meta.rotation_deg,
            offset_x: meta.offset_x,
            offset_y: meta.offset_y,
            bond: meta.bond,
            addressing,
        }
    }
}

/// Stretch-to-fit: each point normalised into [0, 1] by the bounding box.
pub fn stretch_uvs(points: &[Position]) -> Vec<Uv> {
    let Some(bounds) = Rectangle::bounding(points) else {
        return Vec::new();
    };
    let w = if bounds.width > 0.0 { bounds.width } else { 1.0 };
    let h = if bounds.height > 0.0 { bounds.height } else { 1.0 };
    points
        .iter()
        .map(|p| [(p.x - bounds.x) / w, (p.y - bounds.y) / h])
        .collect()
}

/// World-calibrated: adjacent masks sharing a material tile continuously
/// because the grid is anchored at the image origin, not the polygon.
pub fn world_uvs(points: &[Position], px_per_unit: f32, repeat: f32) -> Vec<Uv> {
    let tile_px = px_per_unit * repeat;
    if !(tile_px.is_finite() && tile_px > 0.0) {
        return stretch_uvs(points);
    }
    points
        .iter()
        .map(|p| [p.x / tile_px, p.y / tile_px])
        .collect()
}

/// Rotates about the (0.5, 0.5) texture centre, clockwise-positive in the
/// y-down texture frame.
pub fn rotate_uvs(uvs: &mut [Uv], rotation_deg: f32) {
    if rotation_deg == 0.0 {
        return;
    }
    let (sin, cos) = rotation_deg.to_radians().sin_cos();
    for uv in uvs.iter_mut() {
        let du = uv[0] - 0.5;
        let dv = uv[1] - 0.5;
        *uv = [0.5 + du * cos - dv * sin, 0.5 + du * sin + dv * cos];
    }
}

/// Wraps into [0, 1); negative inputs come out non-negative.
pub fn wrap_unit(value: f32) -> f32 {
    let mut r = value % 1.0;
    if r < 0.0 {
        r += 1.0;
    }
    // -1e-9 % 1.0 + 1.0 rounds to exactly 1.0 in f32
    if r >= 1.0 {
        r = 0.0;
    }
    r
}

/// Adds the pattern phase and wraps every coordinate into [0, 1).
pub fn apply_offset(uvs: &mut [Uv], offset_x: f32, offset_y: f32) {
    for uv in uvs.iter_mut() {
        uv[0] = wrap_unit(uv[0] + offset_x);
        uv[1] = wrap_unit(uv[1] + offset_y);
    }
}

/// Adds the pattern phase without wrapping vertices, for repeat addressing
/// where the sampler wraps and interpolation must stay continuous.
pub fn apply_phase(uvs: &mut [Uv], offset_x: f32, offset_y: f32) {
    let (px, py) = (wrap_unit(offset_x), wrap_unit(offset_y));
    for uv in uvs.iter_mut() {
        uv[0] += px;
        uv[1] += py;
    }
}

fn is_odd(cell: f32) -> bool {
    (cell as i64).rem_euclid(2) == 1
}

/// Bond layout post-process on tile-space coordinates.
pub fn apply_bond_pattern(uvs: &[Uv], bond: BondPattern) -> Vec<Uv> {
    match bond {
        BondPattern::Straight => uvs.to_vec(),
        BondPattern::Brick50 => uvs
            .iter()
            .map(|&[u, v]| {
                if is_odd(v.floor()) {
                    [u + 0.5, v]
                } else {
                    [u, v]
                }
            })
            .collect(),
        BondPattern::Herringbone => uvs
            .iter()
            .map(|&[u, v]| {
                let (cu, cv) = (u.floor(), v.floor());
                if is_odd(cu + cv) {
                    // swap within the cell: a transposed tile
                    [cu + (v - cv), cv + (u - cu)]
                } else {
                    [u, v]
                }
            })
            .collect(),
    }
}

/// Folds tile coordinates into [0, 1]; values already inside are kept so an
/// exact fit keeps its closing edge at 1.
fn fold_unit(value: f32) -> f32 {
    if (0.0..=1.0).contains(&value) {
        value
    } else {
        wrap_unit(value)
    }
}

pub fn clamp_uvs(uvs: &mut [Uv]) {
    for uv in uvs.iter_mut() {
        uv[0] = fold_unit(uv[0]).clamp(0.0, 1.0);
        uv[1] = fold_unit(uv[1]).clamp(0.0, 1.0);
    }
}

/// Full UV computation for a polygon.
pub fn compute_uvs(points: &[Position], params: &UvParams) -> Vec<Uv> {
    let mut uvs = match params.mapping {
        UvMapping::Stretch => stretch_uvs(points),
        UvMapping::World {
            px_per_unit,
            repeat,
        } => world_uvs(points, px_per_unit, repeat),
    };
    rotate_uvs(&mut uvs, params.rotation_deg);
    let mut uvs = apply_bond_pattern(&uvs, params.bond);

    let has_offset = params.offset_x != 0.0 || params.offset_y != 0.0;
    match params.addressing {
        UvAddressing::Repeat => {
            if has_offset {
                apply_phase(&mut uvs, params.offset_x, params.offset_y);
            }
        }
        UvAddressing::Clamp => {
            if has_offset {
                apply_offset(&mut uvs, params.offset_x, params.offset_y);
            }
            clamp_uvs(&mut uvs);
        }
    }
    uvs
}
