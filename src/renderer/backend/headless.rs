//! Headless Device
//!
//! A [`GpuDevice`] implementation without a GPU. It keeps the full resource
//! bookkeeping of a real backend (handles, descriptors, bound state) and
//! records every call as a [`DeviceCommand`], so higher layers can be driven
//! and inspected without a graphics adapter.
//!
//! Beyond recording, the device validates the usage rules the render cores
//! rely on and reports violations through [`HeadlessDevice::violations`]:
//!
//! - a texture bound as a shader input while also bound as a render target
//! - a draw without a bound shader pass
//! - use or release of a handle that is not alive (double free, use after free)
//! - uploads that fall outside the texture bounds
//!
//! Allocation failures can be injected with
//! [`HeadlessDevice::fail_texture_creation`] to emulate device loss.

use std::ops::Range;

use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use smallvec::SmallVec;

use super::{
    BackendError, BackendResult, BufferDesc, BufferHandle, DepthStencilView, GpuDevice,
    IndexFormat, RenderTargetSet, RenderTargetView, SampleDesc, SamplerDesc, SamplerHandle,
    ShaderPassHandle, ShaderResourceView, TextureDesc, TextureFormat, TextureHandle,
    TextureRegion, TextureUsage, Viewport,
};

/// A recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    CreateTexture { texture: TextureHandle, desc: TextureDesc },
    DestroyTexture(TextureHandle),
    WriteTexture { texture: TextureHandle, region: TextureRegion },
    CreateSampler(SamplerHandle),
    DestroySampler(SamplerHandle),
    CreateBuffer(BufferHandle),
    WriteBuffer { buffer: BufferHandle, offset: u64, len: usize },
    DestroyBuffer(BufferHandle),
    SetRenderTargets(RenderTargetSet),
    SetViewport(Viewport),
    ClearColor { texture: TextureHandle, color: [f32; 4] },
    ClearDepth { texture: TextureHandle, depth: f32 },
    BindShaderPass(ShaderPassHandle),
    BindTexture { slot: u32, view: Option<ShaderResourceView> },
    BindSampler { slot: u32, sampler: SamplerHandle },
    BindConstantBuffer { slot: u32, buffer: BufferHandle },
    SetVertexBuffer { slot: u32, buffer: BufferHandle },
    SetIndexBuffer { buffer: BufferHandle, format: IndexFormat },
    Draw(DrawRecord),
    CopyTexture { source: TextureHandle, destination: TextureHandle },
    ResolveTexture { source: TextureHandle, destination: TextureHandle },
}

/// Snapshot of the pipeline state at a draw call.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub pass: Option<ShaderPassHandle>,
    pub targets: RenderTargetSet,
    pub viewport: Viewport,
    /// Shader inputs bound at the time of the draw, sorted by slot.
    pub inputs: SmallVec<[(u32, TextureHandle); 8]>,
    pub vertex_count: u32,
    pub instance_count: u32,
    pub indexed: bool,
}

impl DrawRecord {
    /// Returns the texture bound to `slot`, if any.
    #[must_use]
    pub fn input(&self, slot: u32) -> Option<TextureHandle> {
        self.inputs
            .iter()
            .find_map(|(s, t)| (*s == slot).then_some(*t))
    }
}

/// Bookkeeping for a live texture.
#[derive(Debug, Clone)]
pub struct TextureState {
    pub desc: TextureDesc,
    /// Imported (externally owned) textures are excluded from leak counts.
    pub external: bool,
    /// Value of the most recent clear, if any.
    pub last_clear: Option<[f32; 4]>,
    /// Draws that wrote this texture since its last clear.
    pub draws_since_clear: u32,
    /// Total uploads (`write_texture`) into this texture.
    pub uploads: u32,
}

#[derive(Debug, Clone)]
struct BufferState {
    desc: BufferDesc,
    data: Vec<u8>,
}

/// Resource creation/destruction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceCounters {
    pub textures_created: u32,
    pub textures_destroyed: u32,
    pub samplers_created: u32,
    pub samplers_destroyed: u32,
    pub buffers_created: u32,
    pub buffers_destroyed: u32,
}

/// GPU-less validating device.
#[derive(Default)]
pub struct HeadlessDevice {
    textures: SlotMap<TextureHandle, TextureState>,
    samplers: SlotMap<SamplerHandle, SamplerDesc>,
    buffers: SlotMap<BufferHandle, BufferState>,
    passes: SlotMap<ShaderPassHandle, String>,

    targets: RenderTargetSet,
    viewport: Viewport,
    bound_pass: Option<ShaderPassHandle>,
    bound_textures: FxHashMap<u32, ShaderResourceView>,

    commands: Vec<DeviceCommand>,
    counters: ResourceCounters,
    violations: Vec<String>,
    fail_texture_creation: bool,
}

impl HeadlessDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ── Setup helpers ──────────────────────────────────────────────────────

    /// Registers a named shader pass and returns its handle.
    pub fn register_pass(&mut self, name: &str) -> ShaderPassHandle {
        self.passes.insert(name.to_owned())
    }

    /// Name a pass was registered with.
    #[must_use]
    pub fn pass_name(&self, pass: ShaderPassHandle) -> Option<&str> {
        self.passes.get(pass).map(String::as_str)
    }

    /// Registers an externally owned texture, such as a swap-chain back buffer.
    pub fn import_texture(&mut self, desc: TextureDesc) -> TextureHandle {
        self.textures.insert(TextureState {
            desc,
            external: true,
            last_clear: None,
            draws_since_clear: 0,
            uploads: 0,
        })
    }

    /// Creates an external back buffer with a matching depth buffer.
    pub fn create_back_buffer(
        &mut self,
        width: u32,
        height: u32,
        samples: SampleDesc,
    ) -> (RenderTargetView, DepthStencilView) {
        let color = self.import_texture(TextureDesc {
            label: "Back Buffer",
            width,
            height,
            format: TextureFormat::Bgra8Unorm,
            samples,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
        });
        let depth = self.import_texture(TextureDesc {
            label: "Back Buffer Depth",
            width,
            height,
            format: TextureFormat::Depth32Float,
            samples,
            usage: TextureUsage::RENDER_ATTACHMENT,
        });
        (RenderTargetView::new(color), DepthStencilView::new(depth))
    }

    /// Releases an imported texture.
    pub fn release_import(&mut self, texture: TextureHandle) {
        if self.textures.get(texture).is_some_and(|t| t.external) {
            self.textures.remove(texture);
        }
    }

    /// When set, every subsequent texture creation fails with `DeviceLost`.
    pub fn fail_texture_creation(&mut self, fail: bool) {
        self.fail_texture_creation = fail;
    }

    // ── Inspection ─────────────────────────────────────────────────────────

    #[must_use]
    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    /// Forgets all recorded commands; resource state is kept.
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// All recorded draws, in submission order.
    pub fn draws(&self) -> impl Iterator<Item = &DrawRecord> {
        self.commands.iter().filter_map(|c| match c {
            DeviceCommand::Draw(d) => Some(d),
            _ => None,
        })
    }

    /// Number of recorded draws issued with the pass registered as `name`.
    #[must_use]
    pub fn draw_count_with_pass(&self, name: &str) -> usize {
        self.draws()
            .filter(|d| d.pass.and_then(|p| self.pass_name(p)) == Some(name))
            .count()
    }

    #[must_use]
    pub fn counters(&self) -> ResourceCounters {
        self.counters
    }

    /// Live textures created through [`GpuDevice::create_texture`].
    #[must_use]
    pub fn owned_texture_count(&self) -> usize {
        self.textures.values().filter(|t| !t.external).count()
    }

    #[must_use]
    pub fn live_sampler_count(&self) -> usize {
        self.samplers.len()
    }

    #[must_use]
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    #[must_use]
    pub fn texture_state(&self, texture: TextureHandle) -> Option<&TextureState> {
        self.textures.get(texture)
    }

    /// Contents of a buffer as last written.
    #[must_use]
    pub fn buffer_data(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(buffer).map(|b| b.data.as_slice())
    }

    /// Usage-rule violations observed so far.
    #[must_use]
    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    fn violation(&mut self, message: String) {
        log::error!("HeadlessDevice: {message}");
        self.violations.push(message);
    }

    fn check_texture(&mut self, texture: TextureHandle, what: &str) -> bool {
        if self.textures.contains_key(texture) {
            true
        } else {
            self.violation(format!("{what}: texture {texture:?} is not alive"));
            false
        }
    }
}

impl GpuDevice for HeadlessDevice {
    fn create_texture(&mut self, desc: &TextureDesc) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::InvalidDimensions {
                width: desc.width,
                height: desc.height,
            });
        }
        if self.fail_texture_creation {
            return Err(BackendError::DeviceLost);
        }

        let texture = self.textures.insert(TextureState {
            desc: desc.clone(),
            external: false,
            last_clear: None,
            draws_since_clear: 0,
            uploads: 0,
        });
        self.counters.textures_created += 1;
        self.commands.push(DeviceCommand::CreateTexture {
            texture,
            desc: desc.clone(),
        });
        Ok(texture)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        match self.textures.get(texture).map(|t| t.external) {
            Some(false) => {
                self.textures.remove(texture);
                self.counters.textures_destroyed += 1;
                self.commands.push(DeviceCommand::DestroyTexture(texture));
            }
            Some(true) => self.violation(format!("destroy_texture: {texture:?} is externally owned")),
            None => self.violation(format!("destroy_texture: {texture:?} released twice")),
        }
    }

    fn texture_desc(&self, texture: TextureHandle) -> Option<TextureDesc> {
        self.textures.get(texture).map(|t| t.desc.clone())
    }

    fn write_texture(&mut self, texture: TextureHandle, region: TextureRegion, data: &[u8]) {
        if !self.check_texture(texture, "write_texture") {
            return;
        }
        let (width, height, bpp) = {
            let desc = &self.textures[texture].desc;
            (desc.width, desc.height, desc.format.bytes_per_pixel())
        };
        if region.x + region.width > width || region.y + region.height > height {
            self.violation(format!("write_texture: region {region:?} outside {width}x{height}"));
            return;
        }
        let required = region.bytes_per_row as usize * region.height.saturating_sub(1) as usize
            + (region.width * bpp) as usize;
        if data.len() < required {
            self.violation(format!(
                "write_texture: {} bytes supplied, {required} required",
                data.len()
            ));
            return;
        }
        self.textures[texture].uploads += 1;
        self.commands.push(DeviceCommand::WriteTexture { texture, region });
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> BackendResult<SamplerHandle> {
        let sampler = self.samplers.insert(desc.clone());
        self.counters.samplers_created += 1;
        self.commands.push(DeviceCommand::CreateSampler(sampler));
        Ok(sampler)
    }

    fn destroy_sampler(&mut self, sampler: SamplerHandle) {
        if self.samplers.remove(sampler).is_some() {
            self.counters.samplers_destroyed += 1;
            self.commands.push(DeviceCommand::DestroySampler(sampler));
        } else {
            self.violation(format!("destroy_sampler: {sampler:?} released twice"));
        }
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> BackendResult<BufferHandle> {
        let buffer = self.buffers.insert(BufferState {
            desc: desc.clone(),
            data: vec![0; desc.size as usize],
        });
        self.counters.buffers_created += 1;
        self.commands.push(DeviceCommand::CreateBuffer(buffer));
        Ok(buffer)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        let Some(state) = self.buffers.get_mut(buffer) else {
            self.violation(format!("write_buffer: {buffer:?} is not alive"));
            return;
        };
        let start = offset as usize;
        let end = start + data.len();
        if end as u64 > state.desc.size {
            let size = state.desc.size;
            self.violation(format!("write_buffer: {end} bytes exceed buffer size {size}"));
            return;
        }
        state.data[start..end].copy_from_slice(data);
        self.commands.push(DeviceCommand::WriteBuffer {
            buffer,
            offset,
            len: data.len(),
        });
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(buffer).is_some() {
            self.counters.buffers_destroyed += 1;
            self.commands.push(DeviceCommand::DestroyBuffer(buffer));
        } else {
            self.violation(format!("destroy_buffer: {buffer:?} released twice"));
        }
    }

    fn set_render_targets(&mut self, targets: &RenderTargetSet) {
        for color in &targets.colors {
            self.check_texture(color.texture(), "set_render_targets");
        }
        if let Some(depth) = targets.depth {
            self.check_texture(depth.texture(), "set_render_targets");
        }
        self.targets = targets.clone();
        self.commands
            .push(DeviceCommand::SetRenderTargets(targets.clone()));
    }

    fn render_targets(&self) -> RenderTargetSet {
        self.targets.clone()
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.commands.push(DeviceCommand::SetViewport(viewport));
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn clear_color(&mut self, target: RenderTargetView, color: [f32; 4]) {
        let texture = target.texture();
        if !self.check_texture(texture, "clear_color") {
            return;
        }
        let state = &mut self.textures[texture];
        state.last_clear = Some(color);
        state.draws_since_clear = 0;
        self.commands.push(DeviceCommand::ClearColor { texture, color });
    }

    fn clear_depth(&mut self, target: DepthStencilView, depth: f32) {
        let texture = target.texture();
        if !self.check_texture(texture, "clear_depth") {
            return;
        }
        let state = &mut self.textures[texture];
        state.last_clear = Some([depth; 4]);
        state.draws_since_clear = 0;
        self.commands.push(DeviceCommand::ClearDepth { texture, depth });
    }

    fn bind_shader_pass(&mut self, pass: ShaderPassHandle) {
        if !self.passes.contains_key(pass) {
            self.violation(format!("bind_shader_pass: unknown pass {pass:?}"));
        }
        self.bound_pass = Some(pass);
        self.commands.push(DeviceCommand::BindShaderPass(pass));
    }

    fn bind_texture(&mut self, slot: u32, view: Option<ShaderResourceView>) {
        match view {
            Some(view) => {
                self.check_texture(view.texture(), "bind_texture");
                self.bound_textures.insert(slot, view);
            }
            None => {
                self.bound_textures.remove(&slot);
            }
        }
        self.commands.push(DeviceCommand::BindTexture { slot, view });
    }

    fn bind_sampler(&mut self, slot: u32, sampler: SamplerHandle) {
        if !self.samplers.contains_key(sampler) {
            self.violation(format!("bind_sampler: {sampler:?} is not alive"));
        }
        self.commands
            .push(DeviceCommand::BindSampler { slot, sampler });
    }

    fn bind_constant_buffer(&mut self, slot: u32, buffer: BufferHandle) {
        if !self.buffers.contains_key(buffer) {
            self.violation(format!("bind_constant_buffer: {buffer:?} is not alive"));
        }
        self.commands
            .push(DeviceCommand::BindConstantBuffer { slot, buffer });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle) {
        self.commands
            .push(DeviceCommand::SetVertexBuffer { slot, buffer });
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat) {
        self.commands
            .push(DeviceCommand::SetIndexBuffer { buffer, format });
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.record_draw(vertices.len() as u32, instances.len() as u32, false);
    }

    fn draw_indexed(&mut self, indices: Range<u32>, _base_vertex: i32, instances: Range<u32>) {
        self.record_draw(indices.len() as u32, instances.len() as u32, true);
    }

    fn copy_texture(&mut self, source: TextureHandle, destination: TextureHandle) {
        self.record_transfer(source, destination, false);
    }

    fn resolve_texture(&mut self, source: TextureHandle, destination: TextureHandle) {
        self.record_transfer(source, destination, true);
    }
}

impl HeadlessDevice {
    fn record_draw(&mut self, vertex_count: u32, instance_count: u32, indexed: bool) {
        if self.bound_pass.is_none() {
            self.violation("draw: no shader pass bound".to_owned());
        }

        let mut inputs: SmallVec<[(u32, TextureHandle); 8]> = self
            .bound_textures
            .iter()
            .map(|(slot, view)| (*slot, view.texture()))
            .collect();
        inputs.sort_unstable_by_key(|(slot, _)| *slot);

        for (slot, texture) in inputs.clone() {
            if !self.textures.contains_key(texture) {
                self.violation(format!("draw: slot {slot} reads released texture {texture:?}"));
            } else if self.targets.writes(texture) {
                self.violation(format!(
                    "draw: texture {texture:?} is read at slot {slot} and written in the same draw"
                ));
            }
        }

        let written: SmallVec<[TextureHandle; 5]> = self
            .targets
            .colors
            .iter()
            .map(RenderTargetView::texture)
            .chain(self.targets.depth.map(|d| d.texture()))
            .collect();
        for texture in written {
            if let Some(state) = self.textures.get_mut(texture) {
                state.draws_since_clear += 1;
            }
        }

        self.commands.push(DeviceCommand::Draw(DrawRecord {
            pass: self.bound_pass,
            targets: self.targets.clone(),
            viewport: self.viewport,
            inputs,
            vertex_count,
            instance_count,
            indexed,
        }));
    }

    fn record_transfer(&mut self, source: TextureHandle, destination: TextureHandle, resolve: bool) {
        let what = if resolve { "resolve_texture" } else { "copy_texture" };
        if !self.check_texture(source, what) || !self.check_texture(destination, what) {
            return;
        }
        let src = self.textures[source].desc.clone();
        let dst = self.textures[destination].desc.clone();
        if src.width != dst.width || src.height != dst.height {
            self.violation(format!(
                "{what}: size mismatch {}x{} -> {}x{}",
                src.width, src.height, dst.width, dst.height
            ));
            return;
        }
        if resolve && (!src.samples.is_multisampled() || dst.samples.is_multisampled()) {
            self.violation(format!("{what}: requires multisampled source and single-sampled destination"));
            return;
        }
        if !resolve && src.samples != dst.samples {
            self.violation(format!("{what}: sample count mismatch"));
            return;
        }

        let state = &mut self.textures[destination];
        state.last_clear = None;
        state.draws_since_clear = 0;
        self.commands.push(if resolve {
            DeviceCommand::ResolveTexture { source, destination }
        } else {
            DeviceCommand::CopyTexture { source, destination }
        });
    }
}
