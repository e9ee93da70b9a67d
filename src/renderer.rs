//! Mesh renderer: reconciles mask snapshots into textured meshes on a
//! `RenderBackend`.
//!
//! Per mask id a mesh moves through `absent -> Building -> Live`, and
//! `Live -> Stale -> Live` while a new texture is loading. Everything except
//! texture resolution is synchronous; a texture completion is applied only if
//! the mask still waits for that URL from the same pass.

use futures::stream::{FuturesUnordered, StreamExt};
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use uuid::Uuid;

use crate::config::RenderConfig;
use crate::error::{PolygonIssue, RenderError, TextureLoadError};
use crate::material::MaterialLibrary;
use crate::model::{BondPattern, Calibration, Mask, MaskId};
use crate::shading::{effective_repeat_m, MeshShading};
use crate::texture_loader::{Bitmap, TextureCache};
use crate::transform::{TransformTarget, ViewTransform};
use crate::triangulate::{mesh_polygon, validate_polygon};
use crate::utils::{Position, Vertex};
use crate::uv::{compute_uvs, UvMapping, UvParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureKey(pub Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshKey(pub Uuid);

impl TextureKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl MeshKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TextureKey {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for MeshKey {
    fn default() -> Self {
        Self::new()
    }
}

/// Mesh-ready geometry: one vertex per polygon point, image-space positions.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshGeometry {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

/// Triangulates the polygon and attaches UVs. Vertices carry the straight
/// tile grid; the bond layout is resolved per fragment from the mesh's
/// shading, since interpolating bonded corner UVs shears the texture.
pub fn build_geometry(polygon: &[Position], uv: &UvParams) -> Result<MeshGeometry, PolygonIssue> {
    let mesh = mesh_polygon(polygon)?;
    let straight = UvParams {
        bond: BondPattern::Straight,
        ..*uv
    };
    let uvs = compute_uvs(polygon, &straight);
    let vertices = mesh
        .positions()
        .zip(uvs)
        .map(|(p, tex_coords)| Vertex {
            position: [p.x, p.y],
            tex_coords,
        })
        .collect();
    Ok(MeshGeometry {
        vertices,
        indices: mesh.indices,
    })
}

/// GPU seam. The wgpu implementation lives in `gpu`; tests use a recorder.
pub trait RenderBackend {
    fn upload_texture(&mut self, bitmap: &Bitmap) -> Result<TextureKey, RenderError>;

    fn release_texture(&mut self, texture: TextureKey);

    fn create_mesh(
        &mut self,
        geometry: &MeshGeometry,
        texture: TextureKey,
        shading: &MeshShading,
    ) -> Result<MeshKey, RenderError>;

    fn update_mesh_geometry(
        &mut self,
        mesh: MeshKey,
        geometry: &MeshGeometry,
    ) -> Result<(), RenderError>;

    fn set_mesh_texture(&mut self, mesh: MeshKey, texture: TextureKey) -> Result<(), RenderError>;

    fn set_mesh_shading(&mut self, mesh: MeshKey, shading: &MeshShading)
        -> Result<(), RenderError>;

    /// Removes the mesh from the render tree and frees its buffers.
    fn destroy_mesh(&mut self, mesh: MeshKey);

    /// Resizes the drawing buffer.
    fn resize(&mut self, width: u32, height: u32);

    fn set_stage_transform(&mut self, transform: ViewTransform);

    /// Draws the given meshes, in order, over the background.
    fn draw(&mut self, meshes: &[MeshKey]) -> Result<(), RenderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshState {
    /// Waiting for a texture; nothing attached yet.
    Building,
    Live,
    /// Live mesh still shown while a replacement texture loads.
    Stale,
}

#[derive(Debug, Clone, PartialEq)]
struct GeometryInputs {
    polygon: Vec<Position>,
    uv: UvParams,
}

struct LiveMesh {
    key: MeshKey,
    url: String,
    inputs: GeometryInputs,
    shading: MeshShading,
}

struct Pending {
    url: String,
    generation: u64,
}

struct MeshEntry {
    state: MeshState,
    live: Option<LiveMesh>,
    pending: Option<Pending>,
}

struct GpuTexture {
    key: TextureKey,
    refs: usize,
}

/// One mask's target for this pass.
struct Job {
    mask: MaskId,
    url: String,
    inputs: GeometryInputs,
    shading: MeshShading,
    generation: u64,
}

/// What a `render_masks` pass did, by mask id.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RenderReport {
    pub created: Vec<MaskId>,
    pub updated: Vec<MaskId>,
    pub removed: Vec<MaskId>,
    /// Masks that waited on a texture fetch during the pass.
    pub pending: Vec<MaskId>,
    /// No material, no texture or a degenerate polygon.
    pub outline_only: Vec<MaskId>,
    pub failed: Vec<MaskId>,
    /// Texture completions that arrived after a newer pass took over.
    pub discarded: Vec<MaskId>,
}

pub struct MeshRenderer<B: RenderBackend> {
    backend: RefCell<B>,
    cache: TextureCache,
    config: RenderConfig,
    entries: RefCell<HashMap<MaskId, MeshEntry>>,
    textures: RefCell<HashMap<String, GpuTexture>>,
    order: RefCell<Vec<MaskId>>,
    generation: Cell<u64>,
    transform: Cell<Option<ViewTransform>>,
}

impl<B: RenderBackend> MeshRenderer<B> {
    pub fn new(backend: B, cache: TextureCache, config: RenderConfig) -> Self {
        Self {
            backend: RefCell::new(backend),
            cache,
            config,
            entries: RefCell::new(HashMap::new()),
            textures: RefCell::new(HashMap::new()),
            order: RefCell::new(Vec::new()),
            generation: Cell::new(0),
            transform: Cell::new(None),
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn cache(&self) -> &TextureCache {
        &self.cache
    }

    pub fn backend(&self) -> Ref<'_, B> {
        self.backend.borrow()
    }

    pub fn backend_mut(&self) -> RefMut<'_, B> {
        self.backend.borrow_mut()
    }

    pub fn mesh_state(&self, mask: &MaskId) -> Option<MeshState> {
        self.entries.borrow().get(mask).map(|e| e.state)
    }

    pub fn live_mesh(&self, mask: &MaskId) -> Option<MeshKey> {
        self.entries
            .borrow()
            .get(mask)
            .and_then(|e| e.live.as_ref())
            .map(|l| l.key)
    }

    /// URL of the texture the mask's live mesh shows.
    pub fn live_texture_url(&self, mask: &MaskId) -> Option<String> {
        self.entries
            .borrow()
            .get(mask)
            .and_then(|e| e.live.as_ref())
            .map(|l| l.url.clone())
    }

    pub fn mesh_count(&self) -> usize {
        self.entries
            .borrow()
            .values()
            .filter(|e| e.live.is_some())
            .count()
    }

    /// Live meshes holding the GPU texture for `url`.
    pub fn texture_refs(&self, url: &str) -> usize {
        self.textures.borrow().get(url).map_or(0, |t| t.refs)
    }

    /// Reconciles the mesh set with a mask snapshot. Idempotent; call on
    /// every relevant change. Per-mask failures are logged and never abort
    /// the pass.
    pub async fn render_masks(
        &self,
        masks: &[Mask],
        materials: &MaterialLibrary,
        calibration: Option<Calibration>,
    ) -> RenderReport {
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        let mut report = RenderReport::default();

        let jobs: Vec<Job> = if self.config.mode.draws_meshes() {
            masks
                .iter()
                .filter_map(|mask| {
                    let job = self.plan(mask, materials, calibration, generation);
                    if job.is_none() {
                        report.outline_only.push(mask.id.clone());
                    }
                    job
                })
                .collect()
        } else {
            Vec::new()
        };

        // removals first to bound peak GPU usage
        let wanted: HashSet<&MaskId> = jobs.iter().map(|j| &j.mask).collect();
        let stale: Vec<MaskId> = self
            .entries
            .borrow()
            .keys()
            .filter(|id| !wanted.contains(id))
            .cloned()
            .collect();
        for id in stale {
            self.destroy(&id);
            report.removed.push(id);
        }
        *self.order.borrow_mut() = jobs.iter().map(|j| j.mask.clone()).collect();

        let waiting: Vec<Job> = jobs
            .into_iter()
            .filter_map(|job| self.reconcile(job, &mut report))
            .collect();
        if waiting.is_empty() {
            return report;
        }

        let mut loads: FuturesUnordered<_> = waiting
            .into_iter()
            .map(|job| {
                let load = self.cache.load(&job.url);
                async move { (job, load.await) }
            })
            .collect();
        while let Some((job, result)) = loads.next().await {
            self.complete(job, result, &mut report);
        }
        report
    }

    /// Resolves a mask to this pass's target, or `None` for outline only.
    fn plan(
        &self,
        mask: &Mask,
        materials: &MaterialLibrary,
        calibration: Option<Calibration>,
        generation: u64,
    ) -> Option<Job> {
        if !mask.wants_texture() {
            return None;
        }
        let material_id = mask.material_id.as_deref()?;
        let Some(material) = materials.get_by_id(material_id) else {
            log::debug!("mask {}: material {material_id} not found", mask.id);
            return None;
        };
        let Some(url) = material.texture_url.clone() else {
            log::debug!("mask {}: material {material_id} has no texture", mask.id);
            return None;
        };
        if let Err(issue) = validate_polygon(&mask.polygon) {
            log::debug!("mask {}: {issue}; outline only", mask.id);
            return None;
        }

        let repeat_m = effective_repeat_m(&material, &mask.meta);
        let mapping = UvMapping::select(self.config.uv_mapping, calibration, repeat_m);
        let uv = UvParams::from_meta(mapping, &mask.meta, self.config.uv_addressing);
        let shading = MeshShading::for_mask(mask, &material, self.config.shading)
            .unwrap_or_else(|err| {
                log::warn!("{err}; rendering untinted");
                MeshShading::NEUTRAL
            });

        Some(Job {
            mask: mask.id.clone(),
            url,
            inputs: GeometryInputs {
                polygon: mask.polygon.clone(),
                uv,
            },
            shading,
            generation,
        })
    }

    /// Applies a job synchronously when possible; returns it when it has to
    /// wait for a texture.
    fn reconcile(&self, job: Job, report: &mut RenderReport) -> Option<Job> {
        let same_texture = self
            .entries
            .borrow()
            .get(&job.mask)
            .and_then(|e| e.live.as_ref())
            .is_some_and(|l| l.url == job.url);
        if same_texture {
            self.refresh(&job, report);
            return None;
        }

        if self.textures.borrow().contains_key(&job.url) {
            self.attach(&job, None, report);
            return None;
        }
        if let Some(bitmap) = self.cache.peek(&job.url) {
            self.attach(&job, Some(bitmap), report);
            return None;
        }

        let mut entries = self.entries.borrow_mut();
        let entry = entries.entry(job.mask.clone()).or_insert(MeshEntry {
            state: MeshState::Building,
            live: None,
            pending: None,
        });
        entry.pending = Some(Pending {
            url: job.url.clone(),
            generation: job.generation,
        });
        entry.state = if entry.live.is_some() {
            MeshState::Stale
        } else {
            MeshState::Building
        };
        report.pending.push(job.mask.clone());
        Some(job)
    }

    /// Same texture as the live mesh: rebuild geometry only if its inputs
    /// changed.
    fn refresh(&self, job: &Job, report: &mut RenderReport) {
        let Some((key, inputs_changed, shading_changed)) =
            self.entries.borrow().get(&job.mask).and_then(|e| {
                e.live
                    .as_ref()
                    .map(|l| (l.key, l.inputs != job.inputs, l.shading != job.shading))
            })
        else {
            return;
        };

        if inputs_changed {
            let built = build_geometry(&job.inputs.polygon, &job.inputs.uv)
                .map_err(|issue| RenderError::MeshBuild {
                    mask: job.mask.to_string(),
                    reason: issue.to_string(),
                })
                .and_then(|geometry| {
                    self.backend
                        .borrow_mut()
                        .update_mesh_geometry(key, &geometry)
                });
            if let Err(err) = built {
                log::error!("{err}");
                self.destroy(&job.mask);
                report.failed.push(job.mask.clone());
                return;
            }
            report.updated.push(job.mask.clone());
        }
        if shading_changed {
            self.apply_shading(&job.mask, key, &job.shading);
        }

        if let Some(entry) = self.entries.borrow_mut().get_mut(&job.mask) {
            entry.state = MeshState::Live;
            entry.pending = None;
            if let Some(live) = entry.live.as_mut() {
                live.inputs = job.inputs.clone();
                live.shading = job.shading;
            }
        }
    }

    /// Attaches the job's texture, creating the mesh or swapping the texture
    /// of the live one. Nothing is attached unless every step succeeds.
    fn attach(&self, job: &Job, bitmap: Option<Rc<Bitmap>>, report: &mut RenderReport) {
        let texture = match self.acquire_texture(&job.url, bitmap) {
            Ok(texture) => texture,
            Err(err) => {
                log::error!("mask {}: texture upload failed: {err}", job.mask);
                self.settle_after_failure(&job.mask);
                report.failed.push(job.mask.clone());
                return;
            }
        };

        let previous = self
            .entries
            .borrow()
            .get(&job.mask)
            .and_then(|e| e.live.as_ref())
            .map(|l| (l.key, l.url.clone(), l.inputs.clone()));

        let result = match &previous {
            Some((key, _, old_inputs)) => self.swap_texture(job, *key, texture, old_inputs),
            None => self.create_mesh(job, texture),
        };
        let key = match result {
            Ok(key) => key,
            Err(err) => {
                log::error!("{err}");
                self.release_texture(&job.url);
                self.settle_after_failure(&job.mask);
                report.failed.push(job.mask.clone());
                return;
            }
        };

        if let Some((_, old_url, _)) = &previous {
            self.release_texture(old_url);
            report.updated.push(job.mask.clone());
        } else {
            report.created.push(job.mask.clone());
        }
        self.entries.borrow_mut().insert(
            job.mask.clone(),
            MeshEntry {
                state: MeshState::Live,
                live: Some(LiveMesh {
                    key,
                    url: job.url.clone(),
                    inputs: job.inputs.clone(),
                    shading: job.shading,
                }),
                pending: None,
            },
        );
    }

    fn create_mesh(&self, job: &Job, texture: TextureKey) -> Result<MeshKey, RenderError> {
        let geometry = build_geometry(&job.inputs.polygon, &job.inputs.uv).map_err(|issue| {
            RenderError::MeshBuild {
                mask: job.mask.to_string(),
                reason: issue.to_string(),
            }
        })?;
        self.backend
            .borrow_mut()
            .create_mesh(&geometry, texture, &job.shading)
            .map_err(|err| RenderError::MeshBuild {
                mask: job.mask.to_string(),
                reason: err.to_string(),
            })
    }

    fn swap_texture(
        &self,
        job: &Job,
        key: MeshKey,
        texture: TextureKey,
        old_inputs: &GeometryInputs,
    ) -> Result<MeshKey, RenderError> {
        let mesh_error = |reason: String| RenderError::MeshBuild {
            mask: job.mask.to_string(),
            reason,
        };
        // build before touching the live mesh so a failure leaves it intact
        let geometry = if *old_inputs == job.inputs {
            None
        } else {
            Some(
                build_geometry(&job.inputs.polygon, &job.inputs.uv)
                    .map_err(|issue| mesh_error(issue.to_string()))?,
            )
        };

        {
            let mut backend = self.backend.borrow_mut();
            // geometry first: the mesh must keep pointing at the texture its
            // entry records until the swap is certain
            if let Some(geometry) = &geometry {
                backend
                    .update_mesh_geometry(key, geometry)
                    .map_err(|err| mesh_error(err.to_string()))?;
            }
            if let Err(err) = backend.set_mesh_texture(key, texture) {
                if geometry.is_some() {
                    let restored = build_geometry(&old_inputs.polygon, &old_inputs.uv)
                        .map_err(|issue| mesh_error(issue.to_string()))
                        .and_then(|old| {
                            backend
                                .update_mesh_geometry(key, &old)
                                .map_err(|err| mesh_error(err.to_string()))
                        });
                    if let Err(restore) = restored {
                        log::warn!("mask {}: previous geometry not restored: {restore}", job.mask);
                    }
                }
                return Err(mesh_error(err.to_string()));
            }
        }
        self.apply_shading(&job.mask, key, &job.shading);
        Ok(key)
    }

    fn apply_shading(&self, mask: &MaskId, key: MeshKey, shading: &MeshShading) {
        if let Err(err) = self.backend.borrow_mut().set_mesh_shading(key, shading) {
            log::warn!("mask {mask}: shading not applied: {err}");
        }
    }

    /// Texture completion for a job that had to wait.
    fn complete(
        &self,
        job: Job,
        result: Result<Rc<Bitmap>, TextureLoadError>,
        report: &mut RenderReport,
    ) {
        let current = self
            .entries
            .borrow()
            .get(&job.mask)
            .and_then(|e| e.pending.as_ref())
            .is_some_and(|p| p.url == job.url && p.generation == job.generation);
        if !current {
            log::debug!("mask {}: discarding stale texture {}", job.mask, job.url);
            report.discarded.push(job.mask);
            return;
        }

        match result {
            Ok(bitmap) => self.attach(&job, Some(bitmap), report),
            Err(err) => {
                log::warn!("mask {}: {err}; keeping previous surface", job.mask);
                self.settle_after_failure(&job.mask);
                report.failed.push(job.mask);
            }
        }
    }

    /// Drops the pending request; a live mesh stays as it was, a mask that
    /// never got one goes back to absent so the next pass retries.
    fn settle_after_failure(&self, mask: &MaskId) {
        let mut entries = self.entries.borrow_mut();
        let keep = match entries.get_mut(mask) {
            Some(entry) => {
                entry.pending = None;
                if entry.live.is_some() {
                    entry.state = MeshState::Live;
                    true
                } else {
                    false
                }
            }
            None => return,
        };
        if !keep {
            entries.remove(mask);
        }
    }

    fn acquire_texture(
        &self,
        url: &str,
        bitmap: Option<Rc<Bitmap>>,
    ) -> Result<TextureKey, RenderError> {
        let mut textures = self.textures.borrow_mut();
        if let Some(texture) = textures.get_mut(url) {
            texture.refs += 1;
            return Ok(texture.key);
        }
        let bitmap = bitmap
            .or_else(|| self.cache.peek(url))
            .ok_or(RenderError::UnknownTexture)?;
        let key = self.backend.borrow_mut().upload_texture(&bitmap)?;
        textures.insert(url.to_string(), GpuTexture { key, refs: 1 });
        Ok(key)
    }

    fn release_texture(&self, url: &str) {
        let mut textures = self.textures.borrow_mut();
        let Some(texture) = textures.get_mut(url) else {
            return;
        };
        texture.refs = texture.refs.saturating_sub(1);
        if texture.refs == 0 {
            let key = texture.key;
            textures.remove(url);
            self.backend.borrow_mut().release_texture(key);
        }
    }

    /// Removes a mask's entry and frees its GPU resources.
    fn destroy(&self, mask: &MaskId) {
        let Some(entry) = self.entries.borrow_mut().remove(mask) else {
            return;
        };
        if let Some(live) = entry.live {
            log::debug!("mask {mask}: destroying mesh");
            self.backend.borrow_mut().destroy_mesh(live.key);
            self.release_texture(&live.url);
        }
    }

    /// Destroys every mesh.
    pub fn clear(&self) {
        let ids: Vec<MaskId> = self.entries.borrow().keys().cloned().collect();
        for id in ids {
            self.destroy(&id);
        }
        self.order.borrow_mut().clear();
    }

    /// Live meshes in mask order.
    pub fn draw_list(&self) -> Vec<MeshKey> {
        let entries = self.entries.borrow();
        self.order
            .borrow()
            .iter()
            .filter_map(|id| entries.get(id)?.live.as_ref().map(|l| l.key))
            .collect()
    }

    pub fn draw(&self) -> Result<(), RenderError> {
        let meshes = self.draw_list();
        self.backend.borrow_mut().draw(&meshes)
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.backend.borrow_mut().resize(width, height);
    }
}

impl<B: RenderBackend> MeshRenderer<B> {
    /// Positions the mesh stage. Only the transform bridge should call this.
    pub fn apply_stage_transform(&self, transform: ViewTransform) {
        self.transform.set(Some(transform));
        self.backend.borrow_mut().set_stage_transform(transform);
    }

    pub fn stage_transform(&self) -> Option<ViewTransform> {
        self.transform.get()
    }
}

impl<B: RenderBackend> TransformTarget for MeshRenderer<B> {
    fn apply_transform(&mut self, transform: ViewTransform) {
        self.apply_stage_transform(transform);
    }

    fn applied_transform(&self) -> Option<ViewTransform> {
        self.stage_transform()
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.resize(width, height);
    }
}

/// Shared renderer: passes still running hold their own `Rc`.
impl<B: RenderBackend> TransformTarget for Rc<MeshRenderer<B>> {
    fn apply_transform(&mut self, transform: ViewTransform) {
        self.apply_stage_transform(transform);
    }

    fn applied_transform(&self) -> Option<ViewTransform> {
        self.stage_transform()
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.resize(width, height);
    }
}
