//! Interactive viewport: photo, textured masks and the vector overlay in a
//! winit window. Drag to pan, wheel to zoom, `0` resets the view.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tiny_skia::Pixmap;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::Key,
    window::{Window, WindowId},
};

use crate::config::RenderConfig;
use crate::fetch::{HttpFetcher, TextureFetcher};
use crate::gpu::WgpuBackend;
use crate::material::MaterialLibrary;
use crate::overlay::{load_textures, VectorOverlay};
use crate::renderer::MeshRenderer;
use crate::scene::Scene;
use crate::texture_loader::{Bitmap, TextureCache};
use crate::transform::{PhotoSpace, TransformBridge};
use crate::utils::{Position, Size};

/// Zoom factor per wheel line.
const WHEEL_ZOOM_STEP: f32 = 1.1;

pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Veneer".to_string(),
            width: 1280,
            height: 800,
        }
    }
}

type Renderer = MeshRenderer<WgpuBackend<'static>>;

pub struct ViewerApp {
    window_config: WindowConfig,
    config: RenderConfig,
    scene: Rc<Scene>,
    materials: Rc<MaterialLibrary>,
    cache: TextureCache,
    bridge: TransformBridge,
    overlay: VectorOverlay,
    canvas: Option<Pixmap>,
    renderer: Option<Rc<Renderer>>,
    window: Option<Arc<Window>>,
    runtime: tokio::runtime::Runtime,
    local: tokio::task::LocalSet,
    photo: Rc<RefCell<Option<Rc<Bitmap>>>>,
    photo_applied: bool,
    cursor: Option<Position>,
    dragging: bool,
}

impl ViewerApp {
    pub fn new(
        window_config: WindowConfig,
        config: RenderConfig,
        scene: Scene,
    ) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let fetcher: Rc<dyn TextureFetcher> = Rc::new(HttpFetcher::new());
        let cache = TextureCache::new(fetcher, &config.texture);

        let image = Size::new(
            scene.photo.width.unwrap_or(0) as f32,
            scene.photo.height.unwrap_or(0) as f32,
        );
        let container = Size::new(window_config.width as f32, window_config.height as f32);
        let bridge = TransformBridge::new(PhotoSpace::new(image, container), config.fit);

        Ok(Self {
            window_config,
            overlay: VectorOverlay::new(config.clone()),
            materials: Rc::new(scene.material_library()),
            scene: Rc::new(scene),
            config,
            cache,
            bridge,
            canvas: None,
            renderer: None,
            window: None,
            runtime,
            local: tokio::task::LocalSet::new(),
            photo: Rc::new(RefCell::new(None)),
            photo_applied: false,
            cursor: None,
            dragging: false,
        })
    }

    /// Lets spawned loads and render passes make progress.
    fn pump(&mut self) {
        self.runtime
            .block_on(self.local.run_until(tokio::task::yield_now()));
    }

    fn start_loading(&mut self, renderer: Rc<Renderer>) {
        let cache = self.cache.clone();
        let slot = Rc::clone(&self.photo);
        let url = self.scene.photo.url.clone();
        self.local.spawn_local(async move {
            match cache.load(&url).await {
                Ok(bitmap) => *slot.borrow_mut() = Some(bitmap),
                Err(err) => log::error!("photo unavailable: {err}"),
            }
        });

        let scene = Rc::clone(&self.scene);
        let materials = Rc::clone(&self.materials);
        let cache = self.cache.clone();
        let mode = self.config.mode;
        self.local.spawn_local(async move {
            if mode.draws_meshes() {
                let report = renderer
                    .render_masks(&scene.masks, &materials, scene.usable_calibration())
                    .await;
                log::info!(
                    "meshes: {} created, {} outline only, {} failed",
                    report.created.len(),
                    report.outline_only.len(),
                    report.failed.len()
                );
            }
            if mode.draws_vector_fills() {
                for err in load_textures(&scene.masks, &materials, &cache).await {
                    log::warn!("{err}");
                }
            }
        });
    }

    fn apply_photo(&mut self) {
        if self.photo_applied {
            return;
        }
        let Some(bitmap) = self.photo.borrow().clone() else {
            return;
        };
        if let Some(renderer) = &self.renderer {
            renderer.backend_mut().set_photo(Some(&bitmap));
        }
        self.bridge
            .set_image_size(bitmap.width() as f32, bitmap.height() as f32);
        self.photo_applied = true;
    }

    fn frame(&mut self) {
        self.pump();
        self.apply_photo();

        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        if let Some(update) = self.bridge.sync(&mut self.overlay, renderer) {
            if let Some((w, h)) = update.resized {
                self.canvas = Pixmap::new(w, h);
            }
        }

        if let Some(canvas) = self.canvas.as_mut() {
            let scene = &self.scene;
            self.overlay.render_frame(
                canvas,
                None,
                &scene.masks,
                &self.materials,
                &self.cache,
                scene.usable_calibration(),
            );
            renderer.backend_mut().set_overlay(Some(&*canvas));
        }

        if let Err(err) = renderer.draw() {
            log::error!("frame dropped: {err}");
        }
    }
}

impl ApplicationHandler<()> for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let window_attributes = Window::default_attributes()
            .with_title(&self.window_config.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.window_config.width,
                self.window_config.height,
            ));

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                log::error!("failed to create window: {err}");
                event_loop.exit();
                return;
            }
        };
        let size = window.inner_size();
        let surface = match instance.create_surface(window.clone()) {
            Ok(surface) => surface,
            Err(err) => {
                log::error!("failed to create surface: {err}");
                event_loop.exit();
                return;
            }
        };
        let backend = match pollster::block_on(WgpuBackend::new(
            &instance,
            surface,
            size.width,
            size.height,
            &self.config,
        )) {
            Ok(backend) => backend,
            Err(err) => {
                log::error!("{err}");
                event_loop.exit();
                return;
            }
        };

        let renderer = Rc::new(MeshRenderer::new(
            backend,
            self.cache.clone(),
            self.config.clone(),
        ));
        self.bridge.request_resize(size.width, size.height);
        self.start_loading(Rc::clone(&renderer));
        self.renderer = Some(renderer);
        window.request_redraw();
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                let next = Position::new(position.x as f32, position.y as f32);
                if let (true, Some(prev)) = (self.dragging, self.cursor) {
                    self.bridge.pan_by(next.x - prev.x, next.y - prev.y);
                }
                self.cursor = Some(next);
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                self.dragging = state == ElementState::Pressed;
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / 40.0,
                };
                let anchor = self.cursor.unwrap_or_default();
                self.bridge.zoom_at(WHEEL_ZOOM_STEP.powf(lines), anchor);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed() {
                    if let Key::Character(c) = &event.logical_key {
                        if c.as_str() == "0" {
                            self.bridge.reset_view();
                        }
                    }
                }
            }
            WindowEvent::Resized(new_size) => {
                // coalesced; applied once on the next frame
                self.bridge.request_resize(new_size.width, new_size.height);
            }
            WindowEvent::RedrawRequested => {
                self.frame();
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            WindowEvent::CloseRequested => {
                if let Some(renderer) = &self.renderer {
                    renderer.clear();
                }
                event_loop.exit();
            }
            _ => (),
        }
    }
}

pub fn run_viewer(
    window_config: WindowConfig,
    config: RenderConfig,
    scene: Scene,
) -> Result<(), Box<dyn std::error::Error>> {
    let event_loop = EventLoop::new()?;
    let mut app = ViewerApp::new(window_config, config, scene)?;

    event_loop.run_app(&mut app)?;
    Ok(())
}
