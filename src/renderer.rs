use bytemuck::{Pod, Zeroable};
use std::num::NonZeroU32;
use std::sync::Arc;
use wgpu::util::DeviceExt;

use crate::color::Color;
use crate::tessellate::StrokeVertex;

const SHADER: &str = include_str!("wave.wgsl");

// Initial vertex capacity; grows by powers of two.
const INITIAL_VERTICES: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to create GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("window presentation failed: {0}")]
    Present(#[from] softbuffer::SoftBufferError),
}

/// Uniform buffer layout (16 bytes), matches wave.wgsl
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct Uniforms {
    resolution: [f32; 2], // 8 bytes (offset 0)
    _pad: [f32; 2],       // 8 bytes (offset 8)
}

/// Shared GPU resources, created once per process.
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
}

impl GpuContext {
    pub async fn new() -> Result<Self, RenderError> {
        // No surface: frames go to a texture and are blitted with softbuffer
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::VULKAN | wgpu::Backends::GL,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;

        log::info!("[Render] GPU adapter: {:?}", adapter.get_info().name);

        let (device, queue) = match adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("aura-device"),
                required_features: wgpu::Features::MAPPABLE_PRIMARY_BUFFERS,
                ..Default::default()
            })
            .await
        {
            Ok(pair) => pair,
            Err(_) => {
                log::info!("[Render] Falling back to default device features");
                adapter
                    .request_device(&wgpu::DeviceDescriptor {
                        label: Some("aura-device"),
                        ..Default::default()
                    })
                    .await?
            }
        };

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }
}

/// Draws stroke triangles into an offscreen texture, reads it back and
/// blits the pixels into the window through softbuffer.
pub struct Renderer {
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    vertex_buffer: wgpu::Buffer,
    vertex_capacity: usize,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    render_texture: wgpu::Texture,
    render_view: wgpu::TextureView,
    readback_buffer: wgpu::Buffer,
    _sb_context: softbuffer::Context<Arc<winit::window::Window>>,
    sb_surface: WindowSurface,
    pub width: u32,
    pub height: u32,
}

const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x4];

impl Renderer {
    pub fn new(gpu: &GpuContext, window: Arc<winit::window::Window>) -> Result<Self, RenderError> {
        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);

        let (render_texture, render_view) = create_target(&gpu.device, width, height);
        let readback_buffer = create_readback(&gpu.device, width, height);

        let sb_context = softbuffer::Context::new(window.clone())?;
        let sb_surface = softbuffer::Surface::new(&sb_context, window.clone())?;

        let shader = gpu
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("wave-shader"),
                source: wgpu::ShaderSource::Wgsl(SHADER.into()),
            });

        let uniforms = Uniforms {
            resolution: [width as f32, height as f32],
            _pad: [0.0; 2],
        };
        let uniform_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("uniform-buffer"),
                contents: bytemuck::bytes_of(&uniforms),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });

        let bind_group_layout =
            gpu.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("uniform-bind-group-layout"),
                    entries: &[wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    }],
                });

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniform-bind-group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = gpu
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("pipeline-layout"),
                bind_group_layouts: &[&bind_group_layout],
                immediate_size: 0,
            });

        let vertex_layout = wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<StrokeVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &VERTEX_ATTRIBUTES,
        };

        // Premultiplied alpha blending; wave.wgsl premultiplies in fs_main
        let premultiplied = wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        };

        let pipeline = gpu
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("wave-pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[vertex_layout],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: FORMAT,
                        blend: Some(wgpu::BlendState {
                            color: premultiplied,
                            alpha: premultiplied,
                        }),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            });

        let vertex_buffer = create_vertex_buffer(&gpu.device, INITIAL_VERTICES);

        Ok(Self {
            pipeline,
            uniform_buffer,
            bind_group,
            vertex_buffer,
            vertex_capacity: INITIAL_VERTICES,
            device: gpu.device.clone(),
            queue: gpu.queue.clone(),
            render_texture,
            render_view,
            readback_buffer,
            _sb_context: sb_context,
            sb_surface,
            width,
            height,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 || (width == self.width && height == self.height) {
            return;
        }
        self.width = width;
        self.height = height;

        let (texture, view) = create_target(&self.device, width, height);
        self.render_texture = texture;
        self.render_view = view;
        self.readback_buffer = create_readback(&self.device, width, height);

        let uniforms = Uniforms {
            resolution: [width as f32, height as f32],
            _pad: [0.0; 2],
        };
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
        log::debug!("[Render] Resized to {}x{}", width, height);
    }

    /// Clear to `background`, draw the triangles, present.
    pub fn render(&mut self, vertices: &[StrokeVertex], background: Color) -> Result<(), RenderError> {
        if vertices.len() > self.vertex_capacity {
            self.vertex_capacity = vertices.len().next_power_of_two();
            self.vertex_buffer = create_vertex_buffer(&self.device, self.vertex_capacity);
            log::debug!("[Render] Vertex buffer grown to {}", self.vertex_capacity);
        }
        if !vertices.is_empty() {
            self.queue
                .write_buffer(&self.vertex_buffer, 0, bytemuck::cast_slice(vertices));
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("render-encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("render-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.render_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(background.to_wgpu()),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            if !vertices.is_empty() {
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &self.bind_group, &[]);
                pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
                pass.draw(0..vertices.len() as u32, 0..1);
            }
        }

        let bytes_per_row = aligned_bytes_per_row(self.width);
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.render_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.readback_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );

        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = self.readback_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        });

        let mut presented = Ok(());
        if rx.recv().ok().and_then(|r| r.ok()).is_some() {
            let data = buffer_slice.get_mapped_range();
            presented = blit(
                &mut self.sb_surface,
                self.width,
                self.height,
                &data,
                bytes_per_row as usize,
            );
            drop(data);
        } else {
            log::warn!("[Render] Readback mapping failed; frame dropped");
        }
        self.readback_buffer.unmap();
        presented
    }
}

type WindowSurface = softbuffer::Surface<Arc<winit::window::Window>, Arc<winit::window::Window>>;

fn blit(
    surface: &mut WindowSurface,
    width: u32,
    height: u32,
    data: &[u8],
    stride: usize,
) -> Result<(), RenderError> {
    let (Some(w), Some(h)) = (NonZeroU32::new(width), NonZeroU32::new(height)) else {
        return Ok(());
    };
    surface.resize(w, h)?;

    let width = width as usize;
    let mut buffer = surface.buffer_mut()?;
    for (y, row) in buffer.chunks_exact_mut(width).enumerate() {
        let src = &data[y * stride..y * stride + width * 4];
        for (dst, px) in row.iter_mut().zip(src.chunks_exact(4)) {
            *dst = pack_argb([px[0], px[1], px[2], px[3]]);
        }
    }
    buffer.present()?;
    Ok(())
}

fn create_target(device: &wgpu::Device, width: u32, height: u32) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("render-target"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

fn create_readback(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback-buffer"),
        size: (aligned_bytes_per_row(width) * height) as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    })
}

fn create_vertex_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("vertex-buffer"),
        size: (capacity * std::mem::size_of::<StrokeVertex>()) as u64,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Bytes per row aligned to wgpu's COPY_BYTES_PER_ROW_ALIGNMENT (256)
fn aligned_bytes_per_row(width: u32) -> u32 {
    let unaligned = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unaligned.div_ceil(align) * align
}

/// RGBA bytes to softbuffer's 0xAARRGGBB.
fn pack_argb([r, g, b, a]: [u8; 4]) -> u32 {
    (a as u32) << 24 | (r as u32) << 16 | (g as u32) << 8 | b as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_copy_alignment() {
        assert_eq!(aligned_bytes_per_row(1), 256);
        assert_eq!(aligned_bytes_per_row(64), 256);
        assert_eq!(aligned_bytes_per_row(65), 512);
        assert_eq!(aligned_bytes_per_row(800) % 256, 0);
    }

    #[test]
    fn pixels_pack_as_argb() {
        assert_eq!(pack_argb([0x11, 0x22, 0x33, 0xff]), 0xff11_2233);
        assert_eq!(pack_argb([0, 0, 0, 0]), 0);
    }

    #[test]
    fn vertex_layout_matches_shader_stride() {
        assert_eq!(std::mem::size_of::<StrokeVertex>(), 24);
        assert_eq!(std::mem::size_of::<Uniforms>(), 16);
    }
}
