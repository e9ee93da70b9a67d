#![allow(dead_code)]

use futures::channel::oneshot;
use futures::future::{FutureExt, LocalBoxFuture};
use image::{ImageFormat, Rgba, RgbaImage};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::rc::Rc;

use veneer_engine::config::TextureConfig;
use veneer_engine::error::{FetchError, RenderError};
use veneer_engine::fetch::TextureFetcher;
use veneer_engine::material::{MaterialLibrary, MaterialRecord, RecordId};
use veneer_engine::renderer::{MeshGeometry, MeshKey, RenderBackend, TextureKey};
use veneer_engine::shading::MeshShading;
use veneer_engine::texture_loader::{Bitmap, TextureCache};
use veneer_engine::transform::ViewTransform;
use veneer_engine::utils::Position;

pub fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba(color));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

pub fn png_with(width: u32, height: u32, f: impl Fn(u32, u32) -> [u8; 4]) -> Vec<u8> {
    let image = RgbaImage::from_fn(width, height, |x, y| Rgba(f(x, y)));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// In-memory transport. Unknown URLs fail with 404; gated URLs wait until
/// their gate is opened.
#[derive(Default)]
pub struct MockFetcher {
    responses: RefCell<HashMap<String, Result<Vec<u8>, FetchError>>>,
    gates: RefCell<HashMap<String, oneshot::Receiver<()>>>,
    log: RefCell<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn serve(&self, url: &str, bytes: Vec<u8>) {
        self.responses.borrow_mut().insert(url.to_string(), Ok(bytes));
    }

    pub fn serve_png(&self, url: &str, color: [u8; 4]) {
        self.serve(url, png_bytes(4, 4, color));
    }

    pub fn fail(&self, url: &str, err: FetchError) {
        self.responses.borrow_mut().insert(url.to_string(), Err(err));
    }

    /// Holds the next fetch of `url` until the returned sender fires.
    pub fn gate(&self, url: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.borrow_mut().insert(url.to_string(), rx);
        tx
    }

    pub fn requests(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    pub fn count(&self, url: &str) -> usize {
        self.log.borrow().iter().filter(|u| *u == url).count()
    }
}

impl TextureFetcher for MockFetcher {
    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, FetchError>> {
        self.log.borrow_mut().push(url.to_string());
        let response = self
            .responses
            .borrow()
            .get(url)
            .cloned()
            .unwrap_or(Err(FetchError::Status(404)));
        let gate = self.gates.borrow_mut().remove(url);
        async move {
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            response
        }
        .boxed_local()
    }
}

pub fn cache_with(fetcher: &Rc<MockFetcher>) -> TextureCache {
    let fetcher: Rc<dyn TextureFetcher> = fetcher.clone();
    TextureCache::new(fetcher, &TextureConfig::default())
}

pub fn rect(x: f32, y: f32, w: f32, h: f32) -> Vec<Position> {
    vec![
        Position::new(x, y),
        Position::new(x + w, y),
        Position::new(x + w, y + h),
        Position::new(x, y + h),
    ]
}

pub fn material(id: &str, texture_url: Option<&str>) -> MaterialRecord {
    MaterialRecord {
        id: Some(RecordId::Text(id.to_string())),
        texture_url: texture_url.map(str::to_string),
        physical_repeat_m: Some(0.5),
        ..MaterialRecord::default()
    }
}

pub fn library(records: Vec<MaterialRecord>) -> MaterialLibrary {
    MaterialLibrary::from_records(records)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Upload(TextureKey),
    ReleaseTexture(TextureKey),
    CreateMesh(MeshKey),
    UpdateGeometry(MeshKey),
    SetTexture(MeshKey, TextureKey),
    SetShading(MeshKey),
    DestroyMesh(MeshKey),
    Resize(u32, u32),
    Draw(Vec<MeshKey>),
}

pub struct RecordedMesh {
    pub texture: TextureKey,
    pub geometry: MeshGeometry,
    pub shading: MeshShading,
}

/// Backend that keeps the scene graph in memory and records every call.
#[derive(Default)]
pub struct RecordingBackend {
    pub calls: Vec<Call>,
    pub textures: HashMap<TextureKey, String>,
    pub meshes: HashMap<MeshKey, RecordedMesh>,
    pub stage: Option<ViewTransform>,
    pub fail_uploads: HashSet<String>,
    pub fail_geometry_updates: bool,
    pub fail_texture_swaps: bool,
}

impl RecordingBackend {
    pub fn texture_url(&self, key: TextureKey) -> Option<&str> {
        self.textures.get(&key).map(String::as_str)
    }

    pub fn mesh_texture_url(&self, mesh: MeshKey) -> Option<&str> {
        let texture = self.meshes.get(&mesh)?.texture;
        self.texture_url(texture)
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }
}

impl RenderBackend for RecordingBackend {
    fn upload_texture(&mut self, bitmap: &Bitmap) -> Result<TextureKey, RenderError> {
        if self.fail_uploads.contains(&bitmap.url) {
            return Err(RenderError::Device(format!("upload of {} refused", bitmap.url)));
        }
        let key = TextureKey::new();
        self.textures.insert(key, bitmap.url.clone());
        self.calls.push(Call::Upload(key));
        Ok(key)
    }

    fn release_texture(&mut self, texture: TextureKey) {
        self.textures.remove(&texture);
        self.calls.push(Call::ReleaseTexture(texture));
    }

    fn create_mesh(
        &mut self,
        geometry: &MeshGeometry,
        texture: TextureKey,
        shading: &MeshShading,
    ) -> Result<MeshKey, RenderError> {
        if !self.textures.contains_key(&texture) {
            return Err(RenderError::UnknownTexture);
        }
        let key = MeshKey::new();
        self.meshes.insert(
            key,
            RecordedMesh {
                texture,
                geometry: geometry.clone(),
                shading: *shading,
            },
        );
        self.calls.push(Call::CreateMesh(key));
        Ok(key)
    }

    fn update_mesh_geometry(
        &mut self,
        mesh: MeshKey,
        geometry: &MeshGeometry,
    ) -> Result<(), RenderError> {
        if self.fail_geometry_updates {
            return Err(RenderError::Device("geometry update refused".to_string()));
        }
        let entry = self.meshes.get_mut(&mesh).ok_or(RenderError::UnknownMesh)?;
        entry.geometry = geometry.clone();
        self.calls.push(Call::UpdateGeometry(mesh));
        Ok(())
    }

    fn set_mesh_texture(&mut self, mesh: MeshKey, texture: TextureKey) -> Result<(), RenderError> {
        if self.fail_texture_swaps {
            return Err(RenderError::Device("texture swap refused".to_string()));
        }
        if !self.textures.contains_key(&texture) {
            return Err(RenderError::UnknownTexture);
        }
        let entry = self.meshes.get_mut(&mesh).ok_or(RenderError::UnknownMesh)?;
        entry.texture = texture;
        self.calls.push(Call::SetTexture(mesh, texture));
        Ok(())
    }

    fn set_mesh_shading(
        &mut self,
        mesh: MeshKey,
        shading: &MeshShading,
    ) -> Result<(), RenderError> {
        let entry = self.meshes.get_mut(&mesh).ok_or(RenderError::UnknownMesh)?;
        entry.shading = *shading;
        self.calls.push(Call::SetShading(mesh));
        Ok(())
    }

    fn destroy_mesh(&mut self, mesh: MeshKey) {
        self.meshes.remove(&mesh);
        self.calls.push(Call::DestroyMesh(mesh));
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.calls.push(Call::Resize(width, height));
    }

    fn set_stage_transform(&mut self, transform: ViewTransform) {
        self.stage = Some(transform);
    }

    fn draw(&mut self, meshes: &[MeshKey]) -> Result<(), RenderError> {
        if let Some(missing) = meshes.iter().find(|m| !self.meshes.contains_key(m)) {
            log::error!("draw references destroyed mesh {missing:?}");
            return Err(RenderError::UnknownMesh);
        }
        self.calls.push(Call::Draw(meshes.to_vec()));
        Ok(())
    }
}
