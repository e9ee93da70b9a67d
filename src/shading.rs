//! Tint heuristic keyed by material category. A presentation shortcut, not
//! a lighting model.

use crate::error::RenderError;
use crate::material::{Material, MaterialCategory};
use crate::model::{BondPattern, Mask, MaskMeta};
use crate::utils::{parse_hex_color, SurfaceUniform};

/// Grout colour when a mask sets a width but no colour.
pub const DEFAULT_GROUT_COLOR: [f32; 4] = [0.82, 0.80, 0.76, 1.0];

/// Widest grout line, as a fraction of one tile.
pub const MAX_GROUT_FRACTION: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshShading {
    pub tint: [f32; 4],
    pub opacity: f32,
    pub grout_fraction: f32,
    pub grout_color: [f32; 4],
    /// Laid out per fragment by the mesh shader.
    pub bond: BondPattern,
}

impl Default for MeshShading {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl MeshShading {
    pub const NEUTRAL: MeshShading = MeshShading {
        tint: [1.0, 1.0, 1.0, 1.0],
        opacity: 1.0,
        grout_fraction: 0.0,
        grout_color: DEFAULT_GROUT_COLOR,
        bond: BondPattern::Straight,
    };

    /// Category tint plus grout for one mask. Fails on an unparsable grout
    /// colour; callers log and keep rendering untinted.
    pub fn for_mask(mask: &Mask, material: &Material, tinting: bool) -> Result<Self, RenderError> {
        let meta = &mask.meta;
        let mut shading = if tinting {
            category_tint(material.category)
        } else {
            Self::NEUTRAL
        };

        shading.bond = meta.bond;
        shading.grout_fraction = grout_fraction(meta, effective_repeat_m(material, meta));
        if let Some(color) = meta.grout_color.as_deref() {
            shading.grout_color = parse_hex_color(color).ok_or_else(|| RenderError::Shading {
                mask: mask.id.to_string(),
                reason: format!("bad grout colour {color:?}"),
            })?;
        }
        Ok(shading)
    }

    pub fn to_uniform(&self) -> SurfaceUniform {
        SurfaceUniform {
            tint: self.tint,
            grout_color: self.grout_color,
            params: [self.grout_fraction, self.opacity, bond_code(self.bond), 0.0],
        }
    }
}

/// Bond selector as the shader reads it from `params.z`.
pub fn bond_code(bond: BondPattern) -> f32 {
    match bond {
        BondPattern::Straight => 0.0,
        BondPattern::Brick50 => 1.0,
        BondPattern::Herringbone => 2.0,
    }
}

fn category_tint(category: MaterialCategory) -> MeshShading {
    let (tint, opacity) = match category {
        // submerged: cool and a touch translucent
        MaterialCategory::Tile => ([0.90, 0.96, 1.0, 1.0], 0.97),
        MaterialCategory::Stone | MaterialCategory::Coping => ([1.0, 0.97, 0.92, 1.0], 1.0),
        MaterialCategory::Paving => ([0.98, 0.98, 0.96, 1.0], 1.0),
        MaterialCategory::Other => ([1.0, 1.0, 1.0, 1.0], 1.0),
    };
    MeshShading {
        tint,
        opacity,
        ..MeshShading::NEUTRAL
    }
}

/// The mask's scale override wins over the material's repeat.
pub fn effective_repeat_m(material: &Material, meta: &MaskMeta) -> f32 {
    meta.scale
        .filter(|s| s.is_finite() && *s > 0.0)
        .unwrap_or(material.repeat_m)
}

/// Grout width as a fraction of one texture repeat.
pub fn grout_fraction(meta: &MaskMeta, repeat_m: f32) -> f32 {
    if !(meta.grout_width_mm > 0.0) || !(repeat_m > 0.0) {
        return 0.0;
    }
    (meta.grout_width_mm / (repeat_m * 1000.0)).clamp(0.0, MAX_GROUT_FRACTION)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(category: MaterialCategory) -> Material {
        Material {
            id: "m".into(),
            name: None,
            texture_url: Some("t.png".into()),
            repeat_m: 0.3,
            category,
        }
    }

    fn mask(meta: MaskMeta) -> Mask {
        Mask::new("pool-floor", Vec::new()).with_meta(meta)
    }

    #[test]
    fn tile_is_cool_and_nearly_opaque() {
        let s = MeshShading::for_mask(&mask(MaskMeta::default()), &material(MaterialCategory::Tile), true)
            .unwrap();
        assert!(s.tint[2] > s.tint[0]);
        assert!(s.opacity < 1.0 && s.opacity > 0.9);
    }

    #[test]
    fn disabled_tinting_is_neutral() {
        let s = MeshShading::for_mask(&mask(MaskMeta::default()), &material(MaterialCategory::Stone), false)
            .unwrap();
        assert_eq!(s, MeshShading::NEUTRAL);
    }

    #[test]
    fn grout_is_a_fraction_of_the_repeat() {
        let meta = MaskMeta {
            grout_width_mm: 3.0,
            ..MaskMeta::default()
        };
        let s = MeshShading::for_mask(&mask(meta), &material(MaterialCategory::Tile), true).unwrap();
        assert!((s.grout_fraction - 0.01).abs() < 1e-6);
    }

    #[test]
    fn bond_is_carried_to_the_uniform() {
        let meta = MaskMeta {
            bond: BondPattern::Herringbone,
            ..MaskMeta::default()
        };
        let s = MeshShading::for_mask(&mask(meta), &material(MaterialCategory::Paving), false).unwrap();
        assert_eq!(s.bond, BondPattern::Herringbone);
        assert_eq!(s.to_uniform().params[2], 2.0);
        assert_eq!(MeshShading::NEUTRAL.to_uniform().params[2], 0.0);
    }

    #[test]
    fn bad_grout_colour_is_an_error() {
        let meta = MaskMeta {
            grout_color: Some("grey".into()),
            ..MaskMeta::default()
        };
        let err = MeshShading::for_mask(&mask(meta), &material(MaterialCategory::Tile), true).unwrap_err();
        assert!(err.to_string().contains("pool-floor"));
    }
}
