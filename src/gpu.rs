//! wgpu implementation of `RenderBackend`.
//!
//! Bind groups: 0 = stage transform (image space -> clip), 1 = texture and
//! sampler, 2 = per-surface tint/grout. The background photo and the vector
//! overlay are drawn with the same pipeline as the meshes; the overlay uses
//! a screen-space stage.

use std::borrow::Cow;
use std::collections::HashMap;
use uuid::Uuid;
use wgpu::util::DeviceExt;

use crate::config::RenderConfig;
use crate::error::RenderError;
use crate::renderer::{MeshGeometry, MeshKey, RenderBackend, TextureKey};
use crate::shading::MeshShading;
use crate::texture_loader::Bitmap;
use crate::transform::ViewTransform;
use crate::utils::{rgba8_to_f32, Size, SurfaceUniform, TransformUniform, Vertex};

const COPY_BYTES_PER_ROW_ALIGNMENT: usize = 256;

struct GpuImage {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    texture: Uuid,
    surface_buffer: wgpu::Buffer,
    surface_bind_group: wgpu::BindGroup,
}

/// Image quad drawn outside the mesh set (photo, overlay).
struct Quad {
    image: GpuImage,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    surface_bind_group: wgpu::BindGroup,
}

pub struct WgpuBackend<'a> {
    surface: wgpu::Surface<'a>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    pipeline: wgpu::RenderPipeline,
    texture_layout: wgpu::BindGroupLayout,
    surface_layout: wgpu::BindGroupLayout,
    pattern_sampler: wgpu::Sampler,
    image_sampler: wgpu::Sampler,
    stage_buffer: wgpu::Buffer,
    stage_bind_group: wgpu::BindGroup,
    screen_buffer: wgpu::Buffer,
    screen_bind_group: wgpu::BindGroup,
    viewport: Size,
    transform: ViewTransform,
    clear_color: wgpu::Color,
    textures: HashMap<Uuid, GpuImage>,
    meshes: HashMap<Uuid, GpuMesh>,
    photo: Option<Quad>,
    overlay: Option<Quad>,
}

fn quad_indices() -> [u32; 6] {
    [0, 1, 2, 0, 2, 3]
}

fn quad_vertices(width: f32, height: f32) -> [Vertex; 4] {
    [
        Vertex {
            position: [0.0, 0.0],
            tex_coords: [0.0, 0.0],
        },
        Vertex {
            position: [width, 0.0],
            tex_coords: [1.0, 0.0],
        },
        Vertex {
            position: [width, height],
            tex_coords: [1.0, 1.0],
        },
        Vertex {
            position: [0.0, height],
            tex_coords: [0.0, 1.0],
        },
    ]
}

impl<'a> WgpuBackend<'a> {
    pub async fn new(
        instance: &wgpu::Instance,
        surface: wgpu::Surface<'a>,
        width: u32,
        height: u32,
        render_config: &RenderConfig,
    ) -> Result<Self, RenderError> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                force_fallback_adapter: false,
                compatible_surface: Some(&surface),
            })
            .await
            .ok_or_else(|| RenderError::Device("no suitable adapter".into()))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("veneer device"),
                    required_features: wgpu::Features::empty(),
                    // webgl2 limits so the same code runs in the browser
                    required_limits: wgpu::Limits::downlevel_webgl2_defaults()
                        .using_resolution(adapter.limits()),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| RenderError::Device(e.to_string()))?;

        let capabilities = surface.get_capabilities(&adapter);
        let format = capabilities
            .formats
            .iter()
            .copied()
            .find(wgpu::TextureFormat::is_srgb)
            .or_else(|| capabilities.formats.first().copied())
            .ok_or_else(|| RenderError::Surface("surface reports no formats".into()))?;

        let config = wgpu::SurfaceConfiguration {
            desired_maximum_frame_latency: 2,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
        };
        surface.configure(&device, &config);

        let uniform_entry = |visibility: wgpu::ShaderStages, size: usize| wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(size as _),
            },
            count: None,
        };

        let stage_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("stage_bind_group_layout"),
            entries: &[uniform_entry(
                wgpu::ShaderStages::VERTEX,
                std::mem::size_of::<TransformUniform>(),
            )],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let surface_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("surface_bind_group_layout"),
            entries: &[uniform_entry(
                wgpu::ShaderStages::FRAGMENT,
                std::mem::size_of::<SurfaceUniform>(),
            )],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("mesh shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("../shaders/mesh.wgsl"))),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mesh Pipeline Layout"),
            bind_group_layouts: &[&stage_layout, &texture_layout, &surface_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Mesh Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            // polygons arrive in either winding
            primitive: wgpu::PrimitiveState {
                cull_mode: None,
                ..wgpu::PrimitiveState::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let address_mode = render_config.uv_addressing.address_mode();
        let pattern_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("pattern sampler"),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let image_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("image sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let viewport = Size::new(config.width as f32, config.height as f32);
        let transform = ViewTransform::IDENTITY;

        let stage_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Stage Uniform Buffer"),
            contents: bytemuck::cast_slice(&[transform.to_uniform(viewport)]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let stage_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("stage_bind_group"),
            layout: &stage_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: stage_buffer.as_entire_binding(),
            }],
        });

        // overlay pixmaps are already in screen pixels
        let screen_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Screen Uniform Buffer"),
            contents: bytemuck::cast_slice(&[ViewTransform::IDENTITY.to_uniform(viewport)]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let screen_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("screen_bind_group"),
            layout: &stage_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: screen_buffer.as_entire_binding(),
            }],
        });

        let [r, g, b, a] = rgba8_to_f32(render_config.clear_color);
        log::info!(
            "wgpu backend ready: {:?} {}x{}",
            adapter.get_info().backend,
            config.width,
            config.height
        );

        Ok(Self {
            surface,
            device,
            queue,
            config,
            pipeline,
            texture_layout,
            surface_layout,
            pattern_sampler,
            image_sampler,
            stage_buffer,
            stage_bind_group,
            screen_buffer,
            screen_bind_group,
            viewport,
            transform,
            clear_color: wgpu::Color {
                r: r as f64,
                g: g as f64,
                b: b as f64,
                a: a as f64,
            },
            textures: HashMap::new(),
            meshes: HashMap::new(),
            photo: None,
            overlay: None,
        })
    }

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    fn write_stage_uniforms(&self) {
        self.queue.write_buffer(
            &self.stage_buffer,
            0,
            bytemuck::cast_slice(&[self.transform.to_uniform(self.viewport)]),
        );
        self.queue.write_buffer(
            &self.screen_buffer,
            0,
            bytemuck::cast_slice(&[ViewTransform::IDENTITY.to_uniform(self.viewport)]),
        );
    }

    /// Copies tightly packed RGBA8 rows into `texture` through a buffer with
    /// 256-byte aligned rows.
    fn copy_rgba(&self, texture: &wgpu::Texture, width: u32, height: u32, rgba: &[u8]) {
        let unpadded_bytes_per_row = width as usize * 4;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(COPY_BYTES_PER_ROW_ALIGNMENT)
            * COPY_BYTES_PER_ROW_ALIGNMENT;

        let mut padded = vec![0u8; padded_bytes_per_row * height as usize];
        for (src, dst) in rgba
            .chunks_exact(unpadded_bytes_per_row)
            .zip(padded.chunks_exact_mut(padded_bytes_per_row))
        {
            dst[..unpadded_bytes_per_row].copy_from_slice(src);
        }

        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Texture Staging Buffer"),
                contents: &padded,
                usage: wgpu::BufferUsages::COPY_SRC,
            });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Texture Upload Encoder"),
            });
        encoder.copy_buffer_to_texture(
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row as u32),
                    rows_per_image: Some(height),
                },
            },
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn create_image(
        &self,
        label: &str,
        width: u32,
        height: u32,
        rgba: &[u8],
        sampler: &wgpu::Sampler,
    ) -> GpuImage {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.copy_rgba(&texture, width, height, rgba);

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });
        GpuImage {
            texture,
            bind_group,
            width,
            height,
        }
    }

    /// Bitmap pixels, downscaled when they exceed the device texture limit.
    fn fit_to_limits(&self, bitmap: &Bitmap) -> image::RgbaImage {
        let max = self.device.limits().max_texture_dimension_2d;
        let (w, h) = (bitmap.width(), bitmap.height());
        if w <= max && h <= max {
            return bitmap.image.clone();
        }
        let scale = max as f32 / w.max(h) as f32;
        let (nw, nh) = (
            ((w as f32 * scale) as u32).max(1),
            ((h as f32 * scale) as u32).max(1),
        );
        log::info!("downscaling {} from {w}x{h} to {nw}x{nh}", bitmap.url);
        image::imageops::resize(&bitmap.image, nw, nh, image::imageops::FilterType::Triangle)
    }

    fn create_surface_uniform(&self, shading: &MeshShading) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Surface Uniform Buffer"),
                contents: bytemuck::cast_slice(&[shading.to_uniform()]),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("surface_bind_group"),
            layout: &self.surface_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        (buffer, bind_group)
    }

    fn create_quad(&self, label: &str, width: u32, height: u32, rgba: &[u8], size: Size) -> Quad {
        let image = self.create_image(label, width, height, rgba, &self.image_sampler);
        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Quad Vertex Buffer"),
                contents: bytemuck::cast_slice(&quad_vertices(size.width, size.height)),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Quad Index Buffer"),
                contents: bytemuck::cast_slice(&quad_indices()),
                usage: wgpu::BufferUsages::INDEX,
            });
        let (_, surface_bind_group) = self.create_surface_uniform(&MeshShading::NEUTRAL);
        Quad {
            image,
            vertex_buffer,
            index_buffer,
            surface_bind_group,
        }
    }

    /// Background photo, drawn under the meshes in image space.
    pub fn set_photo(&mut self, bitmap: Option<&Bitmap>) {
        if let Some(old) = self.photo.take() {
            old.image.texture.destroy();
        }
        let Some(bitmap) = bitmap.filter(|b| b.is_complete()) else {
            return;
        };
        let natural = Size::new(bitmap.width() as f32, bitmap.height() as f32);
        let pixels = self.fit_to_limits(bitmap);
        self.photo = Some(self.create_quad(
            "photo",
            pixels.width(),
            pixels.height(),
            pixels.as_raw(),
            natural,
        ));
    }

    /// Screen-space vector layer composited over the meshes.
    pub fn set_overlay(&mut self, pixmap: Option<&tiny_skia::Pixmap>) {
        let Some(pixmap) = pixmap else {
            if let Some(old) = self.overlay.take() {
                old.image.texture.destroy();
            }
            return;
        };
        let (w, h) = (pixmap.width(), pixmap.height());
        let rgba: Vec<u8> = pixmap
            .pixels()
            .iter()
            .flat_map(|p| {
                let c = p.demultiply();
                [c.red(), c.green(), c.blue(), c.alpha()]
            })
            .collect();

        if let Some(overlay) = &self.overlay {
            if overlay.image.width == w && overlay.image.height == h {
                self.copy_rgba(&overlay.image.texture, w, h, &rgba);
                return;
            }
        }
        if let Some(old) = self.overlay.take() {
            old.image.texture.destroy();
        }
        self.overlay = Some(self.create_quad(
            "overlay",
            w,
            h,
            &rgba,
            Size::new(w as f32, h as f32),
        ));
    }

    fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.config);
    }
}

impl RenderBackend for WgpuBackend<'_> {
    fn upload_texture(&mut self, bitmap: &Bitmap) -> Result<TextureKey, RenderError> {
        if !bitmap.is_complete() {
            return Err(RenderError::Device(format!("{} is empty", bitmap.url)));
        }
        let pixels = self.fit_to_limits(bitmap);
        let image = self.create_image(
            &bitmap.url,
            pixels.width(),
            pixels.height(),
            pixels.as_raw(),
            &self.pattern_sampler,
        );
        let key = TextureKey::new();
        self.textures.insert(key.0, image);
        Ok(key)
    }

    fn release_texture(&mut self, texture: TextureKey) {
        if let Some(image) = self.textures.remove(&texture.0) {
            image.texture.destroy();
        }
    }

    fn create_mesh(
        &mut self,
        geometry: &MeshGeometry,
        texture: TextureKey,
        shading: &MeshShading,
    ) -> Result<MeshKey, RenderError> {
        if !self.textures.contains_key(&texture.0) {
            return Err(RenderError::UnknownTexture);
        }
        if geometry.indices.is_empty() {
            return Err(RenderError::Device("empty geometry".into()));
        }
        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Vertex Buffer"),
                contents: bytemuck::cast_slice(&geometry.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Index Buffer"),
                contents: bytemuck::cast_slice(&geometry.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        let (surface_buffer, surface_bind_group) = self.create_surface_uniform(shading);

        let key = MeshKey::new();
        self.meshes.insert(
            key.0,
            GpuMesh {
                vertex_buffer,
                index_buffer,
                index_count: geometry.indices.len() as u32,
                texture: texture.0,
                surface_buffer,
                surface_bind_group,
            },
        );
        Ok(key)
    }

    fn update_mesh_geometry(
        &mut self,
        mesh: MeshKey,
        geometry: &MeshGeometry,
    ) -> Result<(), RenderError> {
        if geometry.indices.is_empty() {
            return Err(RenderError::Device("empty geometry".into()));
        }
        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Vertex Buffer"),
                contents: bytemuck::cast_slice(&geometry.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Index Buffer"),
                contents: bytemuck::cast_slice(&geometry.indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        let entry = self
            .meshes
            .get_mut(&mesh.0)
            .ok_or(RenderError::UnknownMesh)?;
        entry.vertex_buffer.destroy();
        entry.index_buffer.destroy();
        entry.vertex_buffer = vertex_buffer;
        entry.index_buffer = index_buffer;
        entry.index_count = geometry.indices.len() as u32;
        Ok(())
    }

    fn set_mesh_texture(&mut self, mesh: MeshKey, texture: TextureKey) -> Result<(), RenderError> {
        if !self.textures.contains_key(&texture.0) {
            return Err(RenderError::UnknownTexture);
        }
        let entry = self
            .meshes
            .get_mut(&mesh.0)
            .ok_or(RenderError::UnknownMesh)?;
        entry.texture = texture.0;
        Ok(())
    }

    fn set_mesh_shading(
        &mut self,
        mesh: MeshKey,
        shading: &MeshShading,
    ) -> Result<(), RenderError> {
        let entry = self.meshes.get(&mesh.0).ok_or(RenderError::UnknownMesh)?;
        self.queue.write_buffer(
            &entry.surface_buffer,
            0,
            bytemuck::cast_slice(&[shading.to_uniform()]),
        );
        Ok(())
    }

    fn destroy_mesh(&mut self, mesh: MeshKey) {
        if let Some(entry) = self.meshes.remove(&mesh.0) {
            entry.vertex_buffer.destroy();
            entry.index_buffer.destroy();
            entry.surface_buffer.destroy();
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.reconfigure();
        self.viewport = Size::new(width as f32, height as f32);
        self.write_stage_uniforms();
    }

    fn set_stage_transform(&mut self, transform: ViewTransform) {
        self.transform = transform;
        self.write_stage_uniforms();
    }

    fn draw(&mut self, meshes: &[MeshKey]) -> Result<(), RenderError> {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("surface lost; reconfiguring and skipping frame");
                self.reconfigure();
                return Ok(());
            }
            Err(err) => return Err(RenderError::Surface(err.to_string())),
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Mask Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            rpass.set_pipeline(&self.pipeline);

            rpass.set_bind_group(0, &self.stage_bind_group, &[]);
            if let Some(photo) = &self.photo {
                draw_quad(&mut rpass, photo);
            }

            for key in meshes {
                let Some(mesh) = self.meshes.get(&key.0) else {
                    continue;
                };
                let Some(image) = self.textures.get(&mesh.texture) else {
                    continue;
                };
                rpass.set_bind_group(1, &image.bind_group, &[]);
                rpass.set_bind_group(2, &mesh.surface_bind_group, &[]);
                rpass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                rpass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                rpass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }

            if let Some(overlay) = &self.overlay {
                rpass.set_bind_group(0, &self.screen_bind_group, &[]);
                draw_quad(&mut rpass, overlay);
            }
        }

        self.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }
}

fn draw_quad(rpass: &mut wgpu::RenderPass<'_>, quad: &Quad) {
    rpass.set_bind_group(1, &quad.image.bind_group, &[]);
    rpass.set_bind_group(2, &quad.surface_bind_group, &[]);
    rpass.set_vertex_buffer(0, quad.vertex_buffer.slice(..));
    rpass.set_index_buffer(quad.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
    rpass.draw_indexed(0..6, 0, 0..1);
}
