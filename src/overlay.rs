//! Vector overlay: clips a repeating material pattern to each mask polygon
//! on a tiny-skia canvas.
//!
//! Draws in image space under the root transform handed over by the
//! transform bridge (translate, then uniform scale), the same one the mesh
//! stage receives.

use std::collections::{HashMap, HashSet};
use tiny_skia::{
    Color, FillRule, FilterQuality, IntRect, Paint, Path, PathBuilder, Pattern, Pixmap,
    PixmapPaint, Rect, SpreadMode, Stroke, Transform,
};

use crate::config::RenderConfig;
use crate::error::TextureLoadError;
use crate::material::{Material, MaterialLibrary};
use crate::model::{BondPattern, Calibration, Mask, MaskId};
use crate::shading::{effective_repeat_m, MeshShading};
use crate::texture_loader::{Bitmap, TextureCache};
use crate::transform::{TransformTarget, ViewTransform};
use crate::utils::Position;
use crate::uv::UvMapping;

/// Debug border colour.
const DEBUG_BORDER: [u8; 4] = [255, 64, 160, 255];
const DEBUG_ANCHOR: [u8; 4] = [255, 220, 0, 255];

fn color(rgba: [u8; 4]) -> Color {
    Color::from_rgba8(rgba[0], rgba[1], rgba[2], rgba[3])
}

fn float_color(rgba: [f32; 4]) -> Color {
    let c = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    Color::from_rgba8(c(rgba[0]), c(rgba[1]), c(rgba[2]), c(rgba[3]))
}

fn solid(rgba: [u8; 4]) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(color(rgba));
    paint.anti_alias = true;
    paint
}

/// Closed path through the polygon, `None` for fewer than 3 points.
pub fn polygon_path(points: &[Position]) -> Option<Path> {
    if points.len() < 3 {
        return None;
    }
    let mut pb = PathBuilder::new();
    pb.move_to(points[0].x, points[0].y);
    for p in &points[1..] {
        pb.line_to(p.x, p.y);
    }
    pb.close();
    pb.finish()
}

/// Root transform for a view: translate to the origin, then scale.
pub fn root_transform(view: ViewTransform) -> Transform {
    Transform::from_translate(view.origin_x, view.origin_y).pre_scale(view.s, view.s)
}

/// Bakes one repeat of the bond layout, with grout lines, from a texture
/// tile. Returns the super-tile and the edge length of one tile in it.
pub fn bake_super_tile(
    tile: &Pixmap,
    bond: BondPattern,
    grout_fraction: f32,
    grout_color: [f32; 4],
) -> Option<(Pixmap, f32)> {
    let (w, h) = (tile.width(), tile.height());
    let paint = PixmapPaint::default();

    let (mut baked, cells, unit) = match bond {
        BondPattern::Straight => (tile.clone(), vec![(0.0, 0.0, w, h)], w as f32),
        BondPattern::Brick50 => {
            let mut out = Pixmap::new(w, h.checked_mul(2)?)?;
            let half = (w / 2) as i32;
            out.draw_pixmap(0, 0, tile.as_ref(), &paint, Transform::identity(), None);
            out.draw_pixmap(-half, h as i32, tile.as_ref(), &paint, Transform::identity(), None);
            out.draw_pixmap(w as i32 - half, h as i32, tile.as_ref(), &paint, Transform::identity(), None);
            let (wf, hf, halff) = (w as f32, h as f32, half as f32);
            let cells = vec![
                (0.0, 0.0, w, h),
                (-halff, hf, w, h),
                (wf - halff, hf, w, h),
            ];
            (out, cells, wf)
        }
        BondPattern::Herringbone => {
            let n = w.min(h);
            let square = tile.clone_rect(IntRect::from_xywh(0, 0, n, n)?)?;
            let mut out = Pixmap::new(n.checked_mul(2)?, n.checked_mul(2)?)?;
            let nf = n as f32;
            for (cx, cy) in [(0u32, 0u32), (1, 0), (0, 1), (1, 1)] {
                let (tx, ty) = (cx as f32 * nf, cy as f32 * nf);
                let transform = if (cx + cy) % 2 == 1 {
                    // transposed tile
                    Transform::from_row(0.0, 1.0, 1.0, 0.0, tx, ty)
                } else {
                    Transform::from_translate(tx, ty)
                };
                out.draw_pixmap(0, 0, square.as_ref(), &paint, transform, None);
            }
            let cells: Vec<(f32, f32, u32, u32)> = [(0.0, 0.0), (nf, 0.0), (0.0, nf), (nf, nf)]
                .into_iter()
                .map(|(x, y)| (x, y, n, n))
                .collect();
            (out, cells, nf)
        }
    };

    if grout_fraction > 0.0 {
        let half = (grout_fraction * unit * 0.5).max(0.5);
        let mut grout = Paint::default();
        grout.set_color(float_color(grout_color));
        for (x, y, cw, ch) in cells {
            let (cw, ch) = (cw as f32, ch as f32);
            let edges = [
                Rect::from_xywh(x, y, cw, half),
                Rect::from_xywh(x, y + ch - half, cw, half),
                Rect::from_xywh(x, y, half, ch),
                Rect::from_xywh(x + cw - half, y, half, ch),
            ];
            for rect in edges.into_iter().flatten() {
                baked.fill_rect(rect, &grout, Transform::identity(), None);
            }
        }
    }
    Some((baked, unit))
}

/// What a frame drew, by mask id.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct OverlayReport {
    pub filled: Vec<MaskId>,
    /// Material assigned but no usable bitmap: flat diagnostic colour.
    pub diagnostic: Vec<MaskId>,
    pub outlined: Vec<MaskId>,
}

struct CachedPath {
    polygon: Vec<Position>,
    path: Path,
}

pub struct VectorOverlay {
    config: RenderConfig,
    transform: Option<ViewTransform>,
    paths: HashMap<MaskId, CachedPath>,
    tiles: HashMap<String, Pixmap>,
    patterns: HashMap<String, (Pixmap, f32)>,
    warned: HashSet<(MaskId, String)>,
}

impl VectorOverlay {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            transform: None,
            paths: HashMap::new(),
            tiles: HashMap::new(),
            patterns: HashMap::new(),
            warned: HashSet::new(),
        }
    }

    pub fn view(&self) -> ViewTransform {
        self.transform.unwrap_or_default()
    }

    pub fn root_transform(&self) -> Transform {
        root_transform(self.view())
    }

    /// Clip path for a mask, rebuilt only when its polygon changed.
    fn path_for(&mut self, mask: &Mask) -> Option<Path> {
        if let Some(cached) = self.paths.get(&mask.id) {
            if cached.polygon == mask.polygon {
                return Some(cached.path.clone());
            }
        }
        let path = polygon_path(&mask.polygon)?;
        self.paths.insert(
            mask.id.clone(),
            CachedPath {
                polygon: mask.polygon.clone(),
                path: path.clone(),
            },
        );
        Some(path)
    }

    /// Edge length of one texture repeat in image pixels. Divided by the
    /// view scale so a tile keeps its screen size at every zoom, unless
    /// `world_locked_tiles` pins it to the calibrated world grid.
    fn tile_image_px(
        &self,
        material: &Material,
        mask: &Mask,
        calibration: Option<Calibration>,
    ) -> f32 {
        let s = self.view().s.max(f32::EPSILON);
        let min_image = self.config.min_tile_screen_px / s;

        let repeat_m = effective_repeat_m(material, &mask.meta);
        let world = match UvMapping::select(self.config.uv_mapping, calibration, repeat_m) {
            UvMapping::World {
                px_per_unit,
                repeat,
            } => Some(px_per_unit * repeat),
            UvMapping::Stretch => None,
        };
        if let (true, Some(world_px)) = (self.config.world_locked_tiles, world) {
            // zooms with the photo, like the meshes
            return world_px.max(min_image);
        }
        let screen = self.config.min_tile_screen_px.max(
            self.config
                .repeat_px_override
                .unwrap_or(self.config.default_tile_px),
        );
        screen / s
    }

    fn super_tile(
        &mut self,
        bitmap: &Bitmap,
        mask: &Mask,
        material: &Material,
    ) -> Option<(Pixmap, f32)> {
        let (grout_fraction, grout_color) = match MeshShading::for_mask(mask, material, false) {
            Ok(shading) => (shading.grout_fraction, shading.grout_color),
            Err(err) => {
                log::warn!("{err}; drawing without grout");
                (0.0, MeshShading::NEUTRAL.grout_color)
            }
        };
        let key = format!(
            "{}|{:?}|{:.5}|{:?}",
            bitmap.url, mask.meta.bond, grout_fraction, grout_color
        );
        if let Some(found) = self.patterns.get(&key) {
            return Some(found.clone());
        }

        if !self.tiles.contains_key(&bitmap.url) {
            let pixmap = bitmap.to_pixmap()?;
            self.tiles.insert(bitmap.url.clone(), pixmap);
        }
        let tile = self.tiles.get(&bitmap.url)?;
        let baked = bake_super_tile(tile, mask.meta.bond, grout_fraction, grout_color)?;
        self.patterns.insert(key, baked.clone());
        Some(baked)
    }

    /// Pattern placement in image space: scale one tile to `tile_px`,
    /// shift by the offset phase, rotate about the tile centre.
    fn pattern_transform(mask: &Mask, unit: f32, tile_px: f32) -> Transform {
        let k = tile_px / unit.max(1.0);
        let centre = tile_px * 0.5;
        Transform::from_scale(k, k)
            .post_concat(Transform::from_translate(
                -mask.meta.offset_x * tile_px,
                -mask.meta.offset_y * tile_px,
            ))
            .post_concat(Transform::from_rotate_at(-mask.meta.rotation_deg, centre, centre))
    }

    fn warn_once(&mut self, mask: &MaskId, url: &str, message: &str) {
        if self.warned.insert((mask.clone(), url.to_string())) {
            log::warn!("mask {mask}: {message} ({url}); using diagnostic fill");
        }
    }

    fn fill_mask(
        &mut self,
        canvas: &mut Pixmap,
        mask: &Mask,
        path: &Path,
        material: &Material,
        bitmap: Option<&Bitmap>,
        calibration: Option<Calibration>,
    ) -> bool {
        let root = self.root_transform();
        let url = material.texture_url.clone().unwrap_or_default();

        let baked = match bitmap {
            Some(bitmap) if bitmap.is_complete() => self.super_tile(bitmap, mask, material),
            _ => None,
        };
        let Some((pattern_tile, unit)) = baked else {
            self.warn_once(&mask.id, &url, "bitmap missing or incomplete");
            canvas.fill_path(
                path,
                &solid(self.config.diagnostic_color),
                FillRule::Winding,
                root,
                None,
            );
            return false;
        };

        let Some(mut clip) = tiny_skia::Mask::new(canvas.width(), canvas.height()) else {
            return false;
        };
        clip.fill_path(path, FillRule::Winding, true, root);

        let tile_px = self.tile_image_px(material, mask, calibration);
        let paint = Paint {
            shader: Pattern::new(
                pattern_tile.as_ref(),
                SpreadMode::Repeat,
                FilterQuality::Bilinear,
                1.0,
                Self::pattern_transform(mask, unit, tile_px),
            ),
            anti_alias: true,
            ..Paint::default()
        };
        let bounds = path.bounds();
        canvas.fill_rect(bounds, &paint, root, Some(&clip));
        true
    }

    fn outline(&self, canvas: &mut Pixmap, path: &Path, rgba: [u8; 4], width_px: f32) {
        let stroke = Stroke {
            width: width_px / self.view().s.max(f32::EPSILON),
            ..Stroke::default()
        };
        canvas.stroke_path(path, &solid(rgba), &stroke, self.root_transform(), None);
    }

    fn debug_markers(&self, canvas: &mut Pixmap, mask: &Mask, path: &Path) {
        let s = self.view().s.max(f32::EPSILON);
        self.outline(canvas, path, DEBUG_BORDER, 2.0);
        let paint = solid(DEBUG_ANCHOR);
        for p in &mask.polygon {
            if let Some(dot) = PathBuilder::from_circle(p.x, p.y, 3.0 / s) {
                canvas.fill_path(&dot, &paint, FillRule::Winding, self.root_transform(), None);
            }
        }
    }

    /// Draws one frame. `photo` (already premultiplied) goes underneath when
    /// given; otherwise the canvas is cleared to transparent.
    pub fn render_frame(
        &mut self,
        canvas: &mut Pixmap,
        photo: Option<&Pixmap>,
        masks: &[Mask],
        materials: &MaterialLibrary,
        cache: &TextureCache,
        calibration: Option<Calibration>,
    ) -> OverlayReport {
        let mut report = OverlayReport::default();
        let root = self.root_transform();

        match photo {
            Some(photo) => {
                canvas.fill(color(self.config.clear_color));
                let paint = PixmapPaint {
                    quality: FilterQuality::Bilinear,
                    ..PixmapPaint::default()
                };
                canvas.draw_pixmap(0, 0, photo.as_ref(), &paint, root, None);
            }
            None => canvas.fill(Color::TRANSPARENT),
        }

        let present: HashSet<&MaskId> = masks.iter().map(|m| &m.id).collect();
        self.paths.retain(|id, _| present.contains(id));

        let fills = self.config.mode.draws_vector_fills();
        for mask in masks.iter().filter(|m| m.is_visible) {
            let Some(path) = self.path_for(mask) else {
                continue;
            };

            let material = mask
                .material_id
                .as_deref()
                .and_then(|id| materials.get_by_id(id));
            let textured = match (&material, fills) {
                (Some(material), true) if material.texture_url.is_some() => {
                    let url = material.texture_url.as_deref().unwrap_or_default();
                    if cache.is_loading(url) {
                        log::debug!("mask {}: texture {url} still loading", mask.id);
                        false
                    } else {
                        let bitmap = cache.peek(url);
                        if self.fill_mask(canvas, mask, &path, material, bitmap.as_deref(), calibration)
                        {
                            report.filled.push(mask.id.clone());
                        } else {
                            report.diagnostic.push(mask.id.clone());
                        }
                        true
                    }
                }
                _ => false,
            };

            if !textured {
                self.outline(canvas, &path, self.config.outline_color, 1.5);
                report.outlined.push(mask.id.clone());
            }
            if self.config.debug_overlay {
                self.debug_markers(canvas, mask, &path);
            }
        }
        report
    }
}

impl TransformTarget for VectorOverlay {
    fn apply_transform(&mut self, transform: ViewTransform) {
        self.transform = Some(transform);
    }

    fn applied_transform(&self) -> Option<ViewTransform> {
        self.transform
    }
}

/// Resolves every texture the masks reference through the cache, so the
/// synchronous overlay can find them. Returns the failures.
pub async fn load_textures(
    masks: &[Mask],
    materials: &MaterialLibrary,
    cache: &TextureCache,
) -> Vec<TextureLoadError> {
    let mut urls: Vec<String> = masks
        .iter()
        .filter(|m| m.wants_texture())
        .filter_map(|m| materials.get_by_id(m.material_id.as_deref()?))
        .filter_map(|material| material.texture_url.clone())
        .collect();
    urls.sort();
    urls.dedup();

    let loads = urls.iter().map(|url| cache.load(url));
    futures::future::join_all(loads)
        .await
        .into_iter()
        .filter_map(Result::err)
        .collect()
}
