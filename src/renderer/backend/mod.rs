//! Device Backends
//!
//! The render cores never talk to a graphics API directly. Every device access
//! goes through the [`GpuDevice`] trait, which is passed explicitly into
//! `attach`, `detach` and `render`. This makes the device the explicit graphics
//! context of a frame instead of ambient global state.
//!
//! # Backends
//!
//! | Backend | Module | Purpose |
//! |---------|--------|---------|
//! | [`WgpuDevice`] | `wgpu_backend` | Real GPU rendering through `wgpu` |
//! | [`HeadlessDevice`] | `headless` | GPU-less validation and command recording |
//!
//! # Call Model
//!
//! The trait is immediate-mode: bind targets, bind inputs, draw. Backends that
//! record command buffers (wgpu) translate the call stream into render passes
//! at submission time.

pub mod headless;
mod types;
pub mod wgpu_backend;

pub use headless::{DeviceCommand, HeadlessDevice};
pub use types::*;
pub use wgpu_backend::{PassBinding, PassDepthState, ShaderPassDesc, VertexLayout, WgpuDevice};

use std::ops::Range;

use thiserror::Error;

/// Backend error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Failed to create texture '{label}': {reason}")]
    TextureCreationFailed { label: &'static str, reason: String },
    #[error("Failed to create buffer '{0}'")]
    BufferCreationFailed(&'static str),
    #[error("Failed to create sampler '{0}'")]
    SamplerCreationFailed(&'static str),
    #[error("Invalid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("Invalid or released resource handle")]
    InvalidHandle,
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Immediate-mode device interface used by every render core.
///
/// Resources created through this trait are owned by the caller, which must
/// release them with the matching `destroy_*` call. Backends never release a
/// live handle behind the owner's back.
pub trait GpuDevice {
    // ── Resources ──────────────────────────────────────────────────────────

    fn create_texture(&mut self, desc: &TextureDesc) -> BackendResult<TextureHandle>;
    fn destroy_texture(&mut self, texture: TextureHandle);
    fn texture_desc(&self, texture: TextureHandle) -> Option<TextureDesc>;
    fn write_texture(&mut self, texture: TextureHandle, region: TextureRegion, data: &[u8]);

    fn create_sampler(&mut self, desc: &SamplerDesc) -> BackendResult<SamplerHandle>;
    fn destroy_sampler(&mut self, sampler: SamplerHandle);

    fn create_buffer(&mut self, desc: &BufferDesc) -> BackendResult<BufferHandle>;
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]);
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    // ── Output state ───────────────────────────────────────────────────────

    fn set_render_targets(&mut self, targets: &RenderTargetSet);
    /// Currently bound targets, used by cores to restore the caller's state.
    fn render_targets(&self) -> RenderTargetSet;
    fn set_viewport(&mut self, viewport: Viewport);
    fn viewport(&self) -> Viewport;
    fn clear_color(&mut self, target: RenderTargetView, color: [f32; 4]);
    fn clear_depth(&mut self, target: DepthStencilView, depth: f32);

    // ── Input state ────────────────────────────────────────────────────────

    fn bind_shader_pass(&mut self, pass: ShaderPassHandle);
    fn bind_texture(&mut self, slot: u32, view: Option<ShaderResourceView>);
    fn bind_sampler(&mut self, slot: u32, sampler: SamplerHandle);
    fn bind_constant_buffer(&mut self, slot: u32, buffer: BufferHandle);
    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle);
    fn set_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat);

    // ── Work ───────────────────────────────────────────────────────────────

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);
    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);
    /// Draws a single full-screen triangle with the bound pass.
    fn draw_fullscreen(&mut self) {
        self.draw(0..3, 0..1);
    }
    fn copy_texture(&mut self, source: TextureHandle, destination: TextureHandle);
    /// Resolves a multisampled texture into a single-sampled one.
    fn resolve_texture(&mut self, source: TextureHandle, destination: TextureHandle);
}
