//! Single source of truth for photo placement.
//!
//! `PhotoSpace` holds the inputs (natural image size, zoom, pan, container),
//! `compute_transform` derives the `ViewTransform` both presentation layers
//! apply, and `TransformBridge` owns the state and pushes every change to
//! the vector overlay and the mesh stage together.

use crate::config::FitPolicy;
use crate::error::TransformDesync;
use crate::utils::{Position, Size, TransformUniform};

pub const MIN_ZOOM: f32 = 0.05;
pub const MAX_ZOOM: f32 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhotoSpace {
    pub img_w: f32,
    pub img_h: f32,
    /// User zoom on top of the fit scale.
    pub zoom: f32,
    pub pan_x: f32,
    pub pan_y: f32,
    pub container_w: f32,
    pub container_h: f32,
}

impl Default for PhotoSpace {
    fn default() -> Self {
        Self {
            img_w: 0.0,
            img_h: 0.0,
            zoom: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
            container_w: 0.0,
            container_h: 0.0,
        }
    }
}

impl PhotoSpace {
    pub fn new(image: Size, container: Size) -> Self {
        Self {
            img_w: image.width,
            img_h: image.height,
            container_w: container.width,
            container_h: container.height,
            ..Self::default()
        }
    }

    pub fn has_image(&self) -> bool {
        self.img_w > 0.0 && self.img_h > 0.0
    }

    fn fit_scale(&self, fit: FitPolicy) -> f32 {
        if !self.has_image() {
            return 1.0;
        }
        let sx = self.container_w / self.img_w;
        let sy = self.container_h / self.img_h;
        match fit {
            FitPolicy::Contain => sx.min(sy),
            FitPolicy::Cover => sx.max(sy),
        }
    }

    /// Origin that centres the scaled image, before pan.
    fn centred_origin(&self, s: f32) -> (f32, f32) {
        if !self.has_image() {
            return (0.0, 0.0);
        }
        (
            (self.container_w - self.img_w * s) / 2.0,
            (self.container_h - self.img_h * s) / 2.0,
        )
    }
}

/// Image space to screen space: `screen = origin + image * s`, applied as
/// translate then uniform scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub s: f32,
    pub origin_x: f32,
    pub origin_y: f32,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl ViewTransform {
    pub const IDENTITY: ViewTransform = ViewTransform {
        s: 1.0,
        origin_x: 0.0,
        origin_y: 0.0,
    };

    pub fn image_to_screen(&self, p: Position) -> Position {
        Position::new(self.origin_x + p.x * self.s, self.origin_y + p.y * self.s)
    }

    pub fn screen_to_image(&self, p: Position) -> Position {
        if self.s == 0.0 {
            return Position::default();
        }
        Position::new((p.x - self.origin_x) / self.s, (p.y - self.origin_y) / self.s)
    }

    /// Column-major image-space to clip-space matrix for a viewport of
    /// `viewport` pixels (y down on screen, y up in clip space).
    pub fn to_clip_matrix(&self, viewport: Size) -> [[f32; 4]; 4] {
        let w = viewport.width.max(1.0);
        let h = viewport.height.max(1.0);
        [
            [2.0 * self.s / w, 0.0, 0.0, 0.0],
            [0.0, -2.0 * self.s / h, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [
                2.0 * self.origin_x / w - 1.0,
                1.0 - 2.0 * self.origin_y / h,
                0.0,
                1.0,
            ],
        ]
    }

    pub fn to_uniform(&self, viewport: Size) -> TransformUniform {
        TransformUniform {
            transform: self.to_clip_matrix(viewport),
        }
    }
}

/// Derives the transform for a photo space. Pure; both layers get their
/// transform from here and nowhere else.
pub fn compute_transform(space: &PhotoSpace, fit: FitPolicy) -> ViewTransform {
    let s = space.fit_scale(fit) * space.zoom;
    let (cx, cy) = space.centred_origin(s);
    ViewTransform {
        s,
        origin_x: cx + space.pan_x,
        origin_y: cy + space.pan_y,
    }
}

/// A presentation layer positioned by the bridge.
pub trait TransformTarget {
    fn apply_transform(&mut self, transform: ViewTransform);

    fn applied_transform(&self) -> Option<ViewTransform>;

    /// Drawing-buffer resize; only GPU-backed layers care.
    fn resize_surface(&mut self, _width: u32, _height: u32) {}
}

/// Collapses a burst of resize events into the last one.
#[derive(Debug, Default)]
pub struct ResizeCoalescer {
    pending: Option<(u32, u32)>,
    coalesced: u32,
}

impl ResizeCoalescer {
    pub fn request(&mut self, width: u32, height: u32) {
        if self.pending.is_some() {
            self.coalesced += 1;
        }
        self.pending = Some((width, height));
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn take(&mut self) -> Option<(u32, u32)> {
        let pending = self.pending.take();
        if pending.is_some() && self.coalesced > 0 {
            log::debug!("coalesced {} resize events", self.coalesced + 1);
        }
        self.coalesced = 0;
        pending
    }
}

/// Result of a flush: the transform to apply and, when the container changed
/// size, the new drawing-buffer size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BridgeUpdate {
    pub transform: ViewTransform,
    pub resized: Option<(u32, u32)>,
}

#[derive(Debug)]
pub struct TransformBridge {
    space: PhotoSpace,
    fit: FitPolicy,
    resize: ResizeCoalescer,
    dirty: bool,
}

impl TransformBridge {
    pub fn new(space: PhotoSpace, fit: FitPolicy) -> Self {
        Self {
            space,
            fit,
            resize: ResizeCoalescer::default(),
            dirty: true,
        }
    }

    pub fn space(&self) -> &PhotoSpace {
        &self.space
    }

    pub fn transform(&self) -> ViewTransform {
        compute_transform(&self.space, self.fit)
    }

    /// Seeds the natural image size once the photo has loaded.
    pub fn set_image_size(&mut self, width: f32, height: f32) {
        self.space.img_w = width;
        self.space.img_h = height;
        self.dirty = true;
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        self.space.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        self.dirty = true;
    }

    /// Zooms by `factor` keeping the image point under `anchor` (screen
    /// space) fixed.
    pub fn zoom_at(&mut self, factor: f32, anchor: Position) {
        if !(factor.is_finite() && factor > 0.0) {
            return;
        }
        let fixed = self.transform().screen_to_image(anchor);
        self.space.zoom = (self.space.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);

        let s = self.space.fit_scale(self.fit) * self.space.zoom;
        let (cx, cy) = self.space.centred_origin(s);
        self.space.pan_x = anchor.x - fixed.x * s - cx;
        self.space.pan_y = anchor.y - fixed.y * s - cy;
        self.dirty = true;
    }

    pub fn pan_by(&mut self, dx: f32, dy: f32) {
        self.space.pan_x += dx;
        self.space.pan_y += dy;
        self.dirty = true;
    }

    pub fn reset_view(&mut self) {
        self.space.zoom = 1.0;
        self.space.pan_x = 0.0;
        self.space.pan_y = 0.0;
        self.dirty = true;
    }

    /// Records a container resize; applied on the next `flush`.
    pub fn request_resize(&mut self, width: u32, height: u32) {
        self.resize.request(width, height);
    }

    /// Applies pending changes and returns the update, if any.
    pub fn flush(&mut self) -> Option<BridgeUpdate> {
        let resized = self.resize.take();
        if let Some((w, h)) = resized {
            self.space.container_w = w as f32;
            self.space.container_h = h as f32;
            self.dirty = true;
        }
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(BridgeUpdate {
            transform: self.transform(),
            resized,
        })
    }

    /// Flushes and pushes the same transform to both layers, then checks
    /// they agree.
    pub fn sync(
        &mut self,
        vector: &mut dyn TransformTarget,
        stage: &mut dyn TransformTarget,
    ) -> Option<BridgeUpdate> {
        let update = self.flush()?;
        if let Some((w, h)) = update.resized {
            stage.resize_surface(w, h);
        }
        vector.apply_transform(update.transform);
        stage.apply_transform(update.transform);
        if let Err(err) = verify_sync(vector, stage) {
            log::error!("{err}");
        }
        Some(update)
    }
}

/// Fails when the two layers hold different transforms.
pub fn verify_sync(
    vector: &dyn TransformTarget,
    stage: &dyn TransformTarget,
) -> Result<(), TransformDesync> {
    let (v, s) = (vector.applied_transform(), stage.applied_transform());
    let same = match (v, s) {
        (Some(a), Some(b)) => {
            a.s.to_bits() == b.s.to_bits()
                && a.origin_x.to_bits() == b.origin_x.to_bits()
                && a.origin_y.to_bits() == b.origin_y.to_bits()
        }
        (None, None) => true,
        _ => false,
    };
    if same {
        Ok(())
    } else {
        Err(TransformDesync {
            vector: v,
            stage: s,
        })
    }
}
