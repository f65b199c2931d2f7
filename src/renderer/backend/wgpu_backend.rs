//! wgpu Device
//!
//! [`GpuDevice`] implementation on top of `wgpu`.
//!
//! wgpu records work into command encoders and render passes, while the
//! render cores issue immediate-mode calls. The device bridges the two by
//! recording a list of [`RecordedOp`]s and translating them on
//! [`WgpuDevice::submit`]:
//!
//! ```text
//! clear_color / clear_depth  ──►  one render pass with LoadOp::Clear
//! draw* (same target set)    ──►  one render pass with LoadOp::Load
//! copy_texture               ──►  encoder.copy_texture_to_texture
//! resolve_texture            ──►  render pass with resolve_target
//! ```
//!
//! Recorded ops hold clones of the wgpu objects they touch, so a texture
//! destroyed through the trait after being used stays valid until the
//! recorded work is submitted.
//!
//! CPU uploads go through the queue. Pending recorded work is flushed first
//! so uploads stay ordered with respect to draws.
//!
//! # Shader Passes
//!
//! Shader passes are registered with a [`ShaderPassDesc`]. All resources of a
//! pass live in bind group 0; the bind group is rebuilt per draw from the
//! slots bound on the device. Render pipelines are created lazily per target
//! signature (color formats, depth format, sample count).

use std::borrow::Cow;
use std::ops::Range;

use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use smallvec::SmallVec;

use super::{
    AddressMode, BackendError, BackendResult, BufferDesc, BufferHandle, BufferKind,
    DepthStencilView, FilterMode, GpuDevice, IndexFormat, RenderTargetSet, RenderTargetView,
    SampleDesc, SamplerDesc, SamplerHandle, ShaderPassHandle, ShaderResourceView, TextureDesc,
    TextureFormat, TextureHandle, TextureRegion, TextureUsage, Viewport,
};

// ─── Format Conversion ────────────────────────────────────────────────────────

impl TextureFormat {
    #[must_use]
    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            Self::R8Unorm => wgpu::TextureFormat::R8Unorm,
            Self::R16Float => wgpu::TextureFormat::R16Float,
            Self::R32Float => wgpu::TextureFormat::R32Float,
            Self::Rg16Float => wgpu::TextureFormat::Rg16Float,
            Self::Rg32Float => wgpu::TextureFormat::Rg32Float,
            Self::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            Self::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            Self::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            Self::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            Self::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            Self::Depth32Float => wgpu::TextureFormat::Depth32Float,
            Self::Depth24PlusStencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
        }
    }

    /// Maps a wgpu format back, for imported surfaces.
    #[must_use]
    pub fn from_wgpu(format: wgpu::TextureFormat) -> Option<Self> {
        Some(match format {
            wgpu::TextureFormat::R8Unorm => Self::R8Unorm,
            wgpu::TextureFormat::R16Float => Self::R16Float,
            wgpu::TextureFormat::R32Float => Self::R32Float,
            wgpu::TextureFormat::Rg16Float => Self::Rg16Float,
            wgpu::TextureFormat::Rg32Float => Self::Rg32Float,
            wgpu::TextureFormat::Rgba8Unorm => Self::Rgba8Unorm,
            wgpu::TextureFormat::Bgra8Unorm => Self::Bgra8Unorm,
            wgpu::TextureFormat::Bgra8UnormSrgb => Self::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba16Float => Self::Rgba16Float,
            wgpu::TextureFormat::Rgba32Float => Self::Rgba32Float,
            wgpu::TextureFormat::Depth32Float => Self::Depth32Float,
            wgpu::TextureFormat::Depth24PlusStencil8 => Self::Depth24PlusStencil8,
            _ => return None,
        })
    }
}

impl TextureUsage {
    fn to_wgpu(self) -> wgpu::TextureUsages {
        let mut usages = wgpu::TextureUsages::empty();
        if self.contains(Self::COPY_SRC) {
            usages |= wgpu::TextureUsages::COPY_SRC;
        }
        if self.contains(Self::COPY_DST) {
            usages |= wgpu::TextureUsages::COPY_DST;
        }
        if self.contains(Self::TEXTURE_BINDING) {
            usages |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if self.contains(Self::RENDER_ATTACHMENT) {
            usages |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        usages
    }
}

fn address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
    }
}

fn filter_mode(filter: FilterMode) -> wgpu::FilterMode {
    match filter {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

fn index_format(format: IndexFormat) -> wgpu::IndexFormat {
    match format {
        IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
        IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
    }
}

// ─── Shader Pass Description ──────────────────────────────────────────────────

/// One entry of a shader pass bind group (group 0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PassBinding {
    /// The texture bound at device slot `slot`.
    Texture {
        binding: u32,
        slot: u32,
        sample_type: wgpu::TextureSampleType,
        multisampled: bool,
    },
    /// The sampler bound at device slot `slot`.
    Sampler {
        binding: u32,
        slot: u32,
        kind: wgpu::SamplerBindingType,
    },
    /// The constant buffer bound at device slot `slot`.
    Uniform { binding: u32, slot: u32 },
}

/// Vertex buffer layout of a geometry pass.
#[derive(Debug, Clone)]
pub struct VertexLayout {
    pub stride: u64,
    pub attributes: Vec<wgpu::VertexAttribute>,
}

/// Depth test configuration of a pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassDepthState {
    pub write: bool,
    pub compare: wgpu::CompareFunction,
}

/// Everything needed to build pipelines for a shader pass.
#[derive(Debug, Clone)]
pub struct ShaderPassDesc {
    pub label: &'static str,
    /// WGSL source with `vs_main` and `fs_main` entry points.
    pub source: Cow<'static, str>,
    pub bindings: Vec<PassBinding>,
    pub vertex_layouts: Vec<VertexLayout>,
    /// Blend state per color target; missing entries write without blending.
    pub blend: Vec<Option<wgpu::BlendState>>,
    /// Depth test, used when the bound target set has a depth buffer.
    pub depth: Option<PassDepthState>,
    pub cull_mode: Option<wgpu::Face>,
}

impl ShaderPassDesc {
    /// A full-screen pass: no vertex buffers, no depth, no culling.
    #[must_use]
    pub fn fullscreen(
        label: &'static str,
        source: &'static str,
        bindings: Vec<PassBinding>,
    ) -> Self {
        Self {
            label,
            source: Cow::Borrowed(source),
            bindings,
            vertex_layouts: Vec::new(),
            blend: Vec::new(),
            depth: None,
            cull_mode: None,
        }
    }

    #[must_use]
    pub fn with_blend(mut self, blend: Vec<Option<wgpu::BlendState>>) -> Self {
        self.blend = blend;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    colors: SmallVec<[wgpu::TextureFormat; 4]>,
    depth: Option<wgpu::TextureFormat>,
    samples: u32,
}

struct GpuShaderPass {
    desc: ShaderPassDesc,
    module: wgpu::ShaderModule,
    layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: FxHashMap<PipelineKey, wgpu::RenderPipeline>,
}

// ─── Resource Storage ─────────────────────────────────────────────────────────

struct GpuTexture {
    desc: TextureDesc,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    /// View used when the texture is sampled (depth aspect only for depth formats).
    sample_view: wgpu::TextureView,
    external: bool,
}

struct GpuBuffer {
    desc: BufferDesc,
    buffer: wgpu::Buffer,
}

#[derive(Default)]
struct BoundState {
    targets: RenderTargetSet,
    viewport: Viewport,
    pass: Option<ShaderPassHandle>,
    textures: FxHashMap<u32, ShaderResourceView>,
    samplers: FxHashMap<u32, SamplerHandle>,
    constants: FxHashMap<u32, BufferHandle>,
    vertex_buffers: FxHashMap<u32, BufferHandle>,
    index_buffer: Option<(BufferHandle, IndexFormat)>,
}

// ─── Recorded Work ────────────────────────────────────────────────────────────

struct AttachmentViews {
    key: RenderTargetSet,
    colors: SmallVec<[wgpu::TextureView; 4]>,
    depth: Option<(wgpu::TextureView, bool)>,
}

struct RecordedDraw {
    label: &'static str,
    attachments: AttachmentViews,
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    viewport: Viewport,
    vertex_buffers: SmallVec<[(u32, wgpu::Buffer); 2]>,
    index_buffer: Option<(wgpu::Buffer, wgpu::IndexFormat)>,
    range: Range<u32>,
    base_vertex: i32,
    instances: Range<u32>,
}

enum RecordedOp {
    ClearColor {
        view: wgpu::TextureView,
        color: [f32; 4],
    },
    ClearDepth {
        view: wgpu::TextureView,
        has_stencil: bool,
        depth: f32,
    },
    Draw(Box<RecordedDraw>),
    Copy {
        source: wgpu::Texture,
        destination: wgpu::Texture,
    },
    Resolve {
        source: wgpu::TextureView,
        destination: wgpu::TextureView,
    },
}

// ─── Device ───────────────────────────────────────────────────────────────────

/// wgpu-backed [`GpuDevice`].
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,

    textures: SlotMap<TextureHandle, GpuTexture>,
    samplers: SlotMap<SamplerHandle, wgpu::Sampler>,
    buffers: SlotMap<BufferHandle, GpuBuffer>,
    passes: SlotMap<ShaderPassHandle, GpuShaderPass>,

    state: BoundState,
    recorded: Vec<RecordedOp>,
}

impl WgpuDevice {
    #[must_use]
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            textures: SlotMap::with_key(),
            samplers: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            passes: SlotMap::with_key(),
            state: BoundState::default(),
            recorded: Vec::new(),
        }
    }

    /// Creates a device on the default adapter without a surface.
    pub fn new_headless() -> BackendResult<Self> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| {
            log::error!("No suitable adapter: {e}");
            BackendError::DeviceLost
        })?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Render Core Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        }))
        .map_err(|e| {
            log::error!("Device request failed: {e}");
            BackendError::DeviceLost
        })?;

        Ok(Self::new(device, queue))
    }

    #[inline]
    #[must_use]
    pub fn wgpu_device(&self) -> &wgpu::Device {
        &self.device
    }

    #[inline]
    #[must_use]
    pub fn wgpu_queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Registers an externally owned texture (e.g. the current surface
    /// texture) so cores can target it. Release it with [`Self::release_import`].
    pub fn import_texture(
        &mut self,
        label: &'static str,
        texture: &wgpu::Texture,
    ) -> BackendResult<TextureHandle> {
        let format = TextureFormat::from_wgpu(texture.format()).ok_or_else(|| {
            BackendError::TextureCreationFailed {
                label,
                reason: format!("unsupported surface format {:?}", texture.format()),
            }
        })?;

        let mut usage = TextureUsage::empty();
        let wgpu_usage = texture.usage();
        usage.set(TextureUsage::COPY_SRC, wgpu_usage.contains(wgpu::TextureUsages::COPY_SRC));
        usage.set(TextureUsage::COPY_DST, wgpu_usage.contains(wgpu::TextureUsages::COPY_DST));
        usage.set(
            TextureUsage::TEXTURE_BINDING,
            wgpu_usage.contains(wgpu::TextureUsages::TEXTURE_BINDING),
        );
        usage.set(
            TextureUsage::RENDER_ATTACHMENT,
            wgpu_usage.contains(wgpu::TextureUsages::RENDER_ATTACHMENT),
        );

        let desc = TextureDesc {
            label,
            width: texture.width(),
            height: texture.height(),
            format,
            samples: SampleDesc::new(texture.sample_count()),
            usage,
        };
        Ok(self.insert_texture(desc, texture.clone(), true))
    }

    /// Forgets an imported texture without destroying it.
    pub fn release_import(&mut self, texture: TextureHandle) {
        if self.textures.get(texture).is_some_and(|t| t.external) {
            self.textures.remove(texture);
        }
    }

    /// Registers a shader pass. Pipelines are built on first use.
    pub fn register_pass(&mut self, desc: ShaderPassDesc) -> ShaderPassHandle {
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.label),
            source: wgpu::ShaderSource::Wgsl(desc.source.clone()),
        });

        let entries: Vec<wgpu::BindGroupLayoutEntry> = desc
            .bindings
            .iter()
            .map(|binding| match *binding {
                PassBinding::Texture {
                    binding,
                    sample_type,
                    multisampled,
                    ..
                } => wgpu::BindGroupLayoutEntry {
                    binding,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled,
                    },
                    count: None,
                },
                PassBinding::Sampler { binding, kind, .. } => wgpu::BindGroupLayoutEntry {
                    binding,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(kind),
                    count: None,
                },
                PassBinding::Uniform { binding, .. } => wgpu::BindGroupLayoutEntry {
                    binding,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            })
            .collect();

        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(desc.label),
                entries: &entries,
            });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.label),
                bind_group_layouts: &[Some(&layout)],
                immediate_size: 0,
            });

        self.passes.insert(GpuShaderPass {
            desc,
            module,
            layout,
            pipeline_layout,
            pipelines: FxHashMap::default(),
        })
    }

    /// Encodes and submits all recorded work.
    pub fn submit(&mut self) {
        if self.recorded.is_empty() {
            return;
        }

        let ops = std::mem::take(&mut self.recorded);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Core Encoder"),
            });

        let mut index = 0;
        while index < ops.len() {
            match &ops[index] {
                RecordedOp::ClearColor { view, color } => {
                    let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("Clear Color"),
                        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                            view,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Clear(wgpu::Color {
                                    r: f64::from(color[0]),
                                    g: f64::from(color[1]),
                                    b: f64::from(color[2]),
                                    a: f64::from(color[3]),
                                }),
                                store: wgpu::StoreOp::Store,
                            },
                            depth_slice: None,
                        })],
                        depth_stencil_attachment: None,
                        timestamp_writes: None,
                        occlusion_query_set: None,
                        multiview_mask: None,
                    });
                    index += 1;
                }
                RecordedOp::ClearDepth {
                    view,
                    has_stencil,
                    depth,
                } => {
                    let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("Clear Depth"),
                        color_attachments: &[],
                        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                            view,
                            depth_ops: Some(wgpu::Operations {
                                load: wgpu::LoadOp::Clear(*depth),
                                store: wgpu::StoreOp::Store,
                            }),
                            stencil_ops: has_stencil.then_some(wgpu::Operations {
                                load: wgpu::LoadOp::Clear(0),
                                store: wgpu::StoreOp::Store,
                            }),
                        }),
                        timestamp_writes: None,
                        occlusion_query_set: None,
                        multiview_mask: None,
                    });
                    index += 1;
                }
                RecordedOp::Draw(first) => {
                    let mut end = index + 1;
                    while let Some(RecordedOp::Draw(next)) = ops.get(end) {
                        if next.attachments.key != first.attachments.key {
                            break;
                        }
                        end += 1;
                    }
                    Self::encode_draws(&mut encoder, &ops[index..end]);
                    index = end;
                }
                RecordedOp::Copy {
                    source,
                    destination,
                } => {
                    encoder.copy_texture_to_texture(
                        wgpu::TexelCopyTextureInfo {
                            texture: source,
                            mip_level: 0,
                            origin: wgpu::Origin3d::ZERO,
                            aspect: wgpu::TextureAspect::All,
                        },
                        wgpu::TexelCopyTextureInfo {
                            texture: destination,
                            mip_level: 0,
                            origin: wgpu::Origin3d::ZERO,
                            aspect: wgpu::TextureAspect::All,
                        },
                        source.size(),
                    );
                    index += 1;
                }
                RecordedOp::Resolve {
                    source,
                    destination,
                } => {
                    let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("Resolve"),
                        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                            view: source,
                            resolve_target: Some(destination),
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Load,
                                store: wgpu::StoreOp::Store,
                            },
                            depth_slice: None,
                        })],
                        depth_stencil_attachment: None,
                        timestamp_writes: None,
                        occlusion_query_set: None,
                        multiview_mask: None,
                    });
                    index += 1;
                }
            }
        }

        self.queue.submit(Some(encoder.finish()));
    }

    fn encode_draws(encoder: &mut wgpu::CommandEncoder, ops: &[RecordedOp]) {
        let Some(RecordedOp::Draw(first)) = ops.first() else {
            return;
        };

        let color_attachments: SmallVec<[Option<wgpu::RenderPassColorAttachment>; 4]> = first
            .attachments
            .colors
            .iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
            })
            .collect();

        let depth_stencil_attachment =
            first
                .attachments
                .depth
                .as_ref()
                .map(|(view, has_stencil)| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: has_stencil.then_some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(first.label),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        for op in ops {
            let RecordedOp::Draw(draw) = op else {
                continue;
            };
            let vp = draw.viewport;
            pass.set_viewport(vp.x, vp.y, vp.width, vp.height, vp.min_depth, vp.max_depth);
            pass.set_pipeline(&draw.pipeline);
            pass.set_bind_group(0, &draw.bind_group, &[]);
            for (slot, buffer) in &draw.vertex_buffers {
                pass.set_vertex_buffer(*slot, buffer.slice(..));
            }
            match &draw.index_buffer {
                Some((buffer, format)) => {
                    pass.set_index_buffer(buffer.slice(..), *format);
                    pass.draw_indexed(draw.range.clone(), draw.base_vertex, draw.instances.clone());
                }
                None => pass.draw(draw.range.clone(), draw.instances.clone()),
            }
        }
    }

    fn insert_texture(
        &mut self,
        desc: TextureDesc,
        texture: wgpu::Texture,
        external: bool,
    ) -> TextureHandle {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sample_view = if desc.format.is_depth() {
            texture.create_view(&wgpu::TextureViewDescriptor {
                aspect: wgpu::TextureAspect::DepthOnly,
                ..Default::default()
            })
        } else {
            view.clone()
        };
        self.textures.insert(GpuTexture {
            desc,
            texture,
            view,
            sample_view,
            external,
        })
    }

    fn flush_before_upload(&mut self) {
        if !self.recorded.is_empty() {
            self.submit();
        }
    }

    fn attachment_views(&self) -> Option<AttachmentViews> {
        let targets = &self.state.targets;
        let mut colors = SmallVec::new();
        for color in &targets.colors {
            colors.push(self.textures.get(color.texture())?.view.clone());
        }
        let depth = match targets.depth {
            Some(depth) => {
                let texture = self.textures.get(depth.texture())?;
                Some((
                    texture.view.clone(),
                    texture.desc.format == TextureFormat::Depth24PlusStencil8,
                ))
            }
            None => None,
        };
        Some(AttachmentViews {
            key: targets.clone(),
            colors,
            depth,
        })
    }

    fn pipeline_key(&self) -> Option<PipelineKey> {
        let targets = &self.state.targets;
        let mut samples = None;
        let mut colors = SmallVec::new();
        for color in &targets.colors {
            let desc = &self.textures.get(color.texture())?.desc;
            samples.get_or_insert(desc.samples.count);
            colors.push(desc.format.to_wgpu());
        }
        let depth = match targets.depth {
            Some(depth) => {
                let desc = &self.textures.get(depth.texture())?.desc;
                samples.get_or_insert(desc.samples.count);
                Some(desc.format.to_wgpu())
            }
            None => None,
        };
        Some(PipelineKey {
            colors,
            depth,
            samples: samples.unwrap_or(1),
        })
    }

    fn pipeline_for(
        &mut self,
        pass: ShaderPassHandle,
        key: PipelineKey,
    ) -> Option<wgpu::RenderPipeline> {
        let device = &self.device;
        let gpu_pass = self.passes.get_mut(pass)?;
        if let Some(pipeline) = gpu_pass.pipelines.get(&key) {
            return Some(pipeline.clone());
        }

        let desc = &gpu_pass.desc;
        let targets: Vec<Option<wgpu::ColorTargetState>> = key
            .colors
            .iter()
            .enumerate()
            .map(|(i, format)| {
                Some(wgpu::ColorTargetState {
                    format: *format,
                    blend: desc.blend.get(i).copied().flatten(),
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let depth_stencil = key.depth.map(|format| {
            let state = desc.depth.unwrap_or(PassDepthState {
                write: false,
                compare: wgpu::CompareFunction::Always,
            });
            wgpu::DepthStencilState {
                format,
                depth_write_enabled: Some(state.write),
                depth_compare: Some(state.compare),
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }
        });

        let attribute_sets: Vec<&[wgpu::VertexAttribute]> = desc
            .vertex_layouts
            .iter()
            .map(|l| l.attributes.as_slice())
            .collect();
        let vertex_buffers: Vec<wgpu::VertexBufferLayout<'_>> = desc
            .vertex_layouts
            .iter()
            .zip(&attribute_sets)
            .map(|(layout, attributes)| wgpu::VertexBufferLayout {
                array_stride: layout.stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            })
            .collect();

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(desc.label),
            layout: Some(&gpu_pass.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &gpu_pass.module,
                entry_point: Some("vs_main"),
                buffers: &vertex_buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &gpu_pass.module,
                entry_point: Some("fs_main"),
                targets: &targets,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                cull_mode: desc.cull_mode,
                ..Default::default()
            },
            depth_stencil,
            multisample: wgpu::MultisampleState {
                count: key.samples,
                ..Default::default()
            },
            multiview_mask: None,
            cache: None,
        });

        gpu_pass.pipelines.insert(key, pipeline.clone());
        Some(pipeline)
    }

    fn build_bind_group(&self, pass: ShaderPassHandle) -> Option<wgpu::BindGroup> {
        let gpu_pass = self.passes.get(pass)?;
        let mut entries = Vec::with_capacity(gpu_pass.desc.bindings.len());

        for binding in &gpu_pass.desc.bindings {
            let entry = match *binding {
                PassBinding::Texture { binding, slot, .. } => {
                    let Some(texture) = self
                        .state
                        .textures
                        .get(&slot)
                        .and_then(|view| self.textures.get(view.texture()))
                    else {
                        log::warn!("{}: no texture bound at slot {slot}", gpu_pass.desc.label);
                        return None;
                    };
                    wgpu::BindGroupEntry {
                        binding,
                        resource: wgpu::BindingResource::TextureView(&texture.sample_view),
                    }
                }
                PassBinding::Sampler { binding, slot, .. } => {
                    let Some(sampler) = self
                        .state
                        .samplers
                        .get(&slot)
                        .and_then(|s| self.samplers.get(*s))
                    else {
                        log::warn!("{}: no sampler bound at slot {slot}", gpu_pass.desc.label);
                        return None;
                    };
                    wgpu::BindGroupEntry {
                        binding,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    }
                }
                PassBinding::Uniform { binding, slot } => {
                    let Some(buffer) = self
                        .state
                        .constants
                        .get(&slot)
                        .and_then(|b| self.buffers.get(*b))
                    else {
                        log::warn!("{}: no constant buffer at slot {slot}", gpu_pass.desc.label);
                        return None;
                    };
                    wgpu::BindGroupEntry {
                        binding,
                        resource: buffer.buffer.as_entire_binding(),
                    }
                }
            };
            entries.push(entry);
        }

        Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(gpu_pass.desc.label),
            layout: &gpu_pass.layout,
            entries: &entries,
        }))
    }

    fn record_draw(
        &mut self,
        range: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
        indexed: bool,
    ) {
        let Some(pass) = self.state.pass else {
            log::warn!("draw without a bound shader pass skipped");
            return;
        };
        let (Some(key), Some(attachments)) = (self.pipeline_key(), self.attachment_views()) else {
            log::warn!("draw with released render targets skipped");
            return;
        };
        let Some(pipeline) = self.pipeline_for(pass, key) else {
            return;
        };
        let Some(bind_group) = self.build_bind_group(pass) else {
            return;
        };

        let vertex_buffers = self
            .state
            .vertex_buffers
            .iter()
            .filter_map(|(slot, b)| self.buffers.get(*b).map(|g| (*slot, g.buffer.clone())))
            .collect();

        let index_buffer = if indexed {
            let Some((buffer, format)) = self.state.index_buffer else {
                log::warn!("indexed draw without an index buffer skipped");
                return;
            };
            let Some(buffer) = self.buffers.get(buffer) else {
                return;
            };
            Some((buffer.buffer.clone(), index_format(format)))
        } else {
            None
        };

        let label = self.passes.get(pass).map_or("Draw", |p| p.desc.label);
        self.recorded.push(RecordedOp::Draw(Box::new(RecordedDraw {
            label,
            attachments,
            pipeline,
            bind_group,
            viewport: self.state.viewport,
            vertex_buffers,
            index_buffer,
            range,
            base_vertex,
            instances,
        })));
    }
}

impl GpuDevice for WgpuDevice {
    fn create_texture(&mut self, desc: &TextureDesc) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::InvalidDimensions {
                width: desc.width,
                height: desc.height,
            });
        }
        let limit = self.device.limits().max_texture_dimension_2d;
        if desc.width > limit || desc.height > limit {
            return Err(BackendError::TextureCreationFailed {
                label: desc.label,
                reason: format!("{}x{} exceeds the device limit {limit}", desc.width, desc.height),
            });
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: desc.samples.count,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format.to_wgpu(),
            usage: desc.usage.to_wgpu(),
            view_formats: &[],
        });
        log::debug!(
            "Created texture '{}' {}x{} {:?} x{}",
            desc.label,
            desc.width,
            desc.height,
            desc.format,
            desc.samples.count
        );
        Ok(self.insert_texture(desc.clone(), texture, false))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        match self.textures.get(texture).map(|t| t.external) {
            Some(false) => {
                self.textures.remove(texture);
            }
            Some(true) => log::warn!("destroy_texture on an imported texture ignored"),
            None => log::warn!("destroy_texture on a released handle ignored"),
        }
    }

    fn texture_desc(&self, texture: TextureHandle) -> Option<TextureDesc> {
        self.textures.get(texture).map(|t| t.desc.clone())
    }

    fn write_texture(&mut self, texture: TextureHandle, region: TextureRegion, data: &[u8]) {
        self.flush_before_upload();
        let Some(gpu) = self.textures.get(texture) else {
            log::warn!("write_texture on a released handle ignored");
            return;
        };
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &gpu.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: region.x,
                    y: region.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(region.bytes_per_row),
                rows_per_image: Some(region.height),
            },
            wgpu::Extent3d {
                width: region.width,
                height: region.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> BackendResult<SamplerHandle> {
        let mode = address_mode(desc.address_mode);
        let filter = filter_mode(desc.filter);
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(desc.label),
            address_mode_u: mode,
            address_mode_v: mode,
            address_mode_w: mode,
            mag_filter: filter,
            min_filter: filter,
            compare: desc.comparison.then_some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });
        Ok(self.samplers.insert(sampler))
    }

    fn destroy_sampler(&mut self, sampler: SamplerHandle) {
        self.samplers.remove(sampler);
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> BackendResult<BufferHandle> {
        if desc.size == 0 {
            return Err(BackendError::BufferCreationFailed(desc.label));
        }
        let usage = match desc.kind {
            BufferKind::Uniform => wgpu::BufferUsages::UNIFORM,
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
            BufferKind::Index => wgpu::BufferUsages::INDEX,
        } | wgpu::BufferUsages::COPY_DST;
        // Writes must be a multiple of 4 bytes.
        let size = desc.size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label),
            size,
            usage,
            mapped_at_creation: false,
        });
        Ok(self.buffers.insert(GpuBuffer {
            desc: desc.clone(),
            buffer,
        }))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        self.flush_before_upload();
        let Some(gpu) = self.buffers.get(buffer) else {
            log::warn!("write_buffer on a released handle ignored");
            return;
        };
        if offset + data.len() as u64 > gpu.desc.size {
            log::warn!("write_buffer overflows '{}', ignored", gpu.desc.label);
            return;
        }
        self.queue.write_buffer(&gpu.buffer, offset, data);
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(buffer);
    }

    fn set_render_targets(&mut self, targets: &RenderTargetSet) {
        self.state.targets = targets.clone();
    }

    fn render_targets(&self) -> RenderTargetSet {
        self.state.targets.clone()
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.state.viewport = viewport;
    }

    fn viewport(&self) -> Viewport {
        self.state.viewport
    }

    fn clear_color(&mut self, target: RenderTargetView, color: [f32; 4]) {
        if let Some(texture) = self.textures.get(target.texture()) {
            self.recorded.push(RecordedOp::ClearColor {
                view: texture.view.clone(),
                color,
            });
        }
    }

    fn clear_depth(&mut self, target: DepthStencilView, depth: f32) {
        if let Some(texture) = self.textures.get(target.texture()) {
            self.recorded.push(RecordedOp::ClearDepth {
                view: texture.view.clone(),
                has_stencil: texture.desc.format == TextureFormat::Depth24PlusStencil8,
                depth,
            });
        }
    }

    fn bind_shader_pass(&mut self, pass: ShaderPassHandle) {
        self.state.pass = Some(pass);
    }

    fn bind_texture(&mut self, slot: u32, view: Option<ShaderResourceView>) {
        match view {
            Some(view) => {
                self.state.textures.insert(slot, view);
            }
            None => {
                self.state.textures.remove(&slot);
            }
        }
    }

    fn bind_sampler(&mut self, slot: u32, sampler: SamplerHandle) {
        self.state.samplers.insert(slot, sampler);
    }

    fn bind_constant_buffer(&mut self, slot: u32, buffer: BufferHandle) {
        self.state.constants.insert(slot, buffer);
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle) {
        self.state.vertex_buffers.insert(slot, buffer);
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat) {
        self.state.index_buffer = Some((buffer, format));
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.record_draw(vertices, 0, instances, false);
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.record_draw(indices, base_vertex, instances, true);
    }

    fn copy_texture(&mut self, source: TextureHandle, destination: TextureHandle) {
        let (Some(src), Some(dst)) = (self.textures.get(source), self.textures.get(destination))
        else {
            log::warn!("copy_texture with a released handle ignored");
            return;
        };
        self.recorded.push(RecordedOp::Copy {
            source: src.texture.clone(),
            destination: dst.texture.clone(),
        });
    }

    fn resolve_texture(&mut self, source: TextureHandle, destination: TextureHandle) {
        let (Some(src), Some(dst)) = (self.textures.get(source), self.textures.get(destination))
        else {
            log::warn!("resolve_texture with a released handle ignored");
            return;
        };
        self.recorded.push(RecordedOp::Resolve {
            source: src.view.clone(),
            destination: dst.view.clone(),
        });
    }
}
