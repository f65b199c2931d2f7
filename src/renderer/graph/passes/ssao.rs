//! SSAO Core
//!
//! Screen-space ambient occlusion in four passes:
//!
//! ```text
//! opaque nodes ──► depth_normal (Rgba16Float) + depth
//!                        │
//!                        ▼
//!     kernel + noise ─► ssao (R8Unorm, raw)
//!                        │
//!                        ▼  blur H
//!                     blur_tmp
//!                        │
//!                        ▼  blur V
//!                     ssao (R8Unorm, blurred) ──► SharedResourceSet::ssao_map
//! ```
//!
//! All working targets are sized by [`SsaoQuality`] relative to the output.
//! When any of them is (re)allocated the frame is skipped and a retry is
//! requested, so the pass never samples uninitialized targets.
//!
//! The kernel is regenerated only when its seed or angle limit changes, and
//! the constant buffer is uploaded only when its content changes.
//!
//! [`SsaoQuality`]: crate::resources::SsaoQuality

use glam::Vec4;

use crate::errors::Result;
use crate::renderer::backend::{
    BufferDesc, BufferHandle, BufferKind, GpuDevice, RenderTargetSet, SampleDesc, SamplerDesc,
    SamplerHandle, ShaderPassHandle, ShaderResourceView, TextureDesc, TextureFormat,
    TextureHandle, TextureRegion, TextureUsage, Viewport,
};
use crate::renderer::core::{RenderContext, RenderCore, RenderOutcome, RenderStage};
use crate::renderer::graph::target_cache::{OffscreenTargetCache, TargetStatus};
use crate::renderer::pipeline::technique::{passes, require_pass, slot_or, slots};
use crate::renderer::pipeline::Technique;
use crate::resources::ssao::{generate_kernel, generate_noise, SSAO_KERNEL_SIZE, SSAO_NOISE_SIZE};
use crate::resources::{SsaoSettings, SsaoUniforms};

const CORE_NAME: &str = "SsaoCore";

pub const SSAO_TEXTURE_FORMAT: TextureFormat = TextureFormat::R8Unorm;
pub const DEPTH_NORMAL_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
const PREPASS_DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Sampler slots used by the built-in SSAO and blur shaders.
pub const POINT_SAMPLER_SLOT: u32 = 0;
pub const NOISE_SAMPLER_SLOT: u32 = 1;

#[derive(Debug, Clone, Copy)]
struct SsaoPasses {
    depth_normal: ShaderPassHandle,
    ssao: ShaderPassHandle,
    blur_h: ShaderPassHandle,
    blur_v: ShaderPassHandle,
}

#[derive(Debug, Clone, Copy)]
struct SsaoSlots {
    depth_normal: u32,
    noise: u32,
    constants: u32,
    blur_source: u32,
    blur_depth_normal: u32,
    blur_constants: u32,
    frame_constants: u32,
}

#[derive(Debug, Clone, Copy)]
struct AttachedResources {
    noise: TextureHandle,
    point_sampler: SamplerHandle,
    noise_sampler: SamplerHandle,
    uniforms: BufferHandle,
}

pub struct SsaoCore {
    settings: SsaoSettings,

    // === Working Targets ===
    depth_normal: OffscreenTargetCache,
    prepass_depth: OffscreenTargetCache,
    ssao: OffscreenTargetCache,
    blur_tmp: OffscreenTargetCache,

    // === Attached Resources ===
    passes: Option<SsaoPasses>,
    slots: Option<SsaoSlots>,
    noise: Option<TextureHandle>,
    point_sampler: Option<SamplerHandle>,
    noise_sampler: Option<SamplerHandle>,
    uniforms: Option<BufferHandle>,

    // === Kernel & Uniform Cache ===
    kernel: Vec<Vec4>,
    kernel_params: Option<(u64, u32)>,
    uploaded: Option<SsaoUniforms>,
    uploads: u32,
}

impl SsaoCore {
    #[must_use]
    pub fn new(settings: SsaoSettings) -> Self {
        Self {
            settings,
            depth_normal: OffscreenTargetCache::new("SSAO Depth Normal"),
            prepass_depth: OffscreenTargetCache::with_usage(
                "SSAO Prepass Depth",
                TextureUsage::RENDER_ATTACHMENT,
            ),
            ssao: OffscreenTargetCache::new("SSAO Output"),
            blur_tmp: OffscreenTargetCache::new("SSAO Blur Temp"),
            passes: None,
            slots: None,
            noise: None,
            point_sampler: None,
            noise_sampler: None,
            uniforms: None,
            kernel: Vec::new(),
            kernel_params: None,
            uploaded: None,
            uploads: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &SsaoSettings {
        &self.settings
    }

    #[inline]
    pub fn settings_mut(&mut self) -> &mut SsaoSettings {
        &mut self.settings
    }

    /// The current sample kernel (regenerated lazily on render).
    #[inline]
    #[must_use]
    pub fn kernel(&self) -> &[Vec4] {
        &self.kernel
    }

    /// Number of constant buffer uploads performed.
    #[inline]
    #[must_use]
    pub fn uniform_uploads(&self) -> u32 {
        self.uploads
    }

    /// The blurred occlusion target, once allocated.
    #[must_use]
    pub fn output(&self) -> Option<ShaderResourceView> {
        self.ssao.current().map(|t| t.shader_view())
    }

    fn attached(&self) -> Option<AttachedResources> {
        Some(AttachedResources {
            noise: self.noise?,
            point_sampler: self.point_sampler?,
            noise_sampler: self.noise_sampler?,
            uniforms: self.uniforms?,
        })
    }

    fn publish_none(ctx: &mut RenderContext<'_>) {
        ctx.shared.ssao_map = None;
        ctx.constants.has_ssao_map = 0;
    }

    fn ensure_kernel(&mut self) {
        let params = (
            self.settings.kernel_seed,
            self.settings.max_sample_angle_deg.to_bits(),
        );
        if self.kernel_params != Some(params) {
            self.kernel = generate_kernel(
                self.settings.kernel_seed,
                SSAO_KERNEL_SIZE,
                self.settings.max_sample_angle_deg,
            );
            self.kernel_params = Some(params);
            log::debug!("{CORE_NAME}: kernel regenerated (seed {})", self.settings.kernel_seed);
        }
    }

    /// Brings every working target to `width × height`. Returns `None` when
    /// allocation failed, `Some(true)` when anything was (re)allocated.
    fn ensure_targets(&mut self, device: &mut dyn GpuDevice, width: u32, height: u32) -> Option<bool> {
        let requests: [(&mut OffscreenTargetCache, TextureFormat); 4] = [
            (&mut self.depth_normal, DEPTH_NORMAL_FORMAT),
            (&mut self.prepass_depth, PREPASS_DEPTH_FORMAT),
            (&mut self.ssao, SSAO_TEXTURE_FORMAT),
            (&mut self.blur_tmp, SSAO_TEXTURE_FORMAT),
        ];

        let mut created = false;
        for (cache, format) in requests {
            match cache.get_or_create(device, width, height, format, SampleDesc::SINGLE) {
                Ok(TargetStatus::Created(_)) => created = true,
                Ok(TargetStatus::Cached(_)) => {}
                Ok(TargetStatus::Empty) => return None,
                Err(e) => {
                    log::warn!("{CORE_NAME}: {} allocation failed ({e}); rendering without SSAO", cache.label());
                    return None;
                }
            }
        }
        Some(created)
    }

    fn release_targets(&mut self, device: &mut dyn GpuDevice) {
        self.depth_normal.release(device);
        self.prepass_depth.release(device);
        self.ssao.release(device);
        self.blur_tmp.release(device);
    }

    fn upload_uniforms(&mut self, device: &mut dyn GpuDevice, buffer: BufferHandle, uniforms: SsaoUniforms) {
        if self.uploaded != Some(uniforms) {
            device.write_buffer(buffer, 0, bytemuck::bytes_of(&uniforms));
            self.uploaded = Some(uniforms);
            self.uploads += 1;
        }
    }
}

impl Default for SsaoCore {
    fn default() -> Self {
        Self::new(SsaoSettings::default())
    }
}

impl RenderCore for SsaoCore {
    fn name(&self) -> &'static str {
        CORE_NAME
    }

    fn on_attach(&mut self, technique: &dyn Technique, device: &mut dyn GpuDevice) -> Result<()> {
        let passes = SsaoPasses {
            depth_normal: require_pass(technique, CORE_NAME, passes::SSAO_DEPTH_NORMAL)?,
            ssao: require_pass(technique, CORE_NAME, passes::SSAO)?,
            blur_h: require_pass(technique, CORE_NAME, passes::SSAO_BLUR_H)?,
            blur_v: require_pass(technique, CORE_NAME, passes::SSAO_BLUR_V)?,
        };
        let slots = SsaoSlots {
            depth_normal: slot_or(technique, passes::SSAO, slots::DEPTH_NORMAL, 0),
            noise: slot_or(technique, passes::SSAO, slots::NOISE, 1),
            constants: slot_or(technique, passes::SSAO, slots::SSAO_CONSTANTS, 0),
            blur_source: slot_or(technique, passes::SSAO_BLUR_H, slots::SOURCE, 0),
            blur_depth_normal: slot_or(technique, passes::SSAO_BLUR_H, slots::DEPTH_NORMAL, 1),
            blur_constants: slot_or(technique, passes::SSAO_BLUR_H, slots::SSAO_CONSTANTS, 0),
            frame_constants: slot_or(
                technique,
                passes::SSAO_DEPTH_NORMAL,
                slots::FRAME_CONSTANTS,
                slots::DEFAULT_FRAME_CONSTANTS,
            ),
        };

        // Stored as soon as created so a failed attach is released by `on_detach`.
        let noise = device.create_texture(&TextureDesc {
            label: "SSAO Noise 4x4",
            width: SSAO_NOISE_SIZE,
            height: SSAO_NOISE_SIZE,
            format: TextureFormat::Rgba8Unorm,
            samples: SampleDesc::SINGLE,
            usage: TextureUsage::UPLOAD,
        })?;
        self.noise = Some(noise);
        device.write_texture(
            noise,
            TextureRegion::full(SSAO_NOISE_SIZE, SSAO_NOISE_SIZE, TextureFormat::Rgba8Unorm),
            &generate_noise(),
        );
        self.point_sampler =
            Some(device.create_sampler(&SamplerDesc::point_clamp("SSAO Point Sampler"))?);
        self.noise_sampler =
            Some(device.create_sampler(&SamplerDesc::point_wrap("SSAO Noise Sampler"))?);
        self.uniforms = Some(device.create_buffer(&BufferDesc {
            label: "SSAO Uniforms",
            size: std::mem::size_of::<SsaoUniforms>() as u64,
            kind: BufferKind::Uniform,
        })?);

        self.passes = Some(passes);
        self.slots = Some(slots);
        self.uploaded = None;
        Ok(())
    }

    fn on_detach(&mut self, device: &mut dyn GpuDevice) {
        self.release_targets(device);
        if let Some(noise) = self.noise.take() {
            device.destroy_texture(noise);
        }
        if let Some(sampler) = self.point_sampler.take() {
            device.destroy_sampler(sampler);
        }
        if let Some(sampler) = self.noise_sampler.take() {
            device.destroy_sampler(sampler);
        }
        if let Some(buffer) = self.uniforms.take() {
            device.destroy_buffer(buffer);
        }
        self.passes = None;
        self.slots = None;
        self.uploaded = None;
    }

    fn on_render(&mut self, ctx: &mut RenderContext<'_>, device: &mut dyn GpuDevice) -> RenderOutcome {
        if !self.settings.enabled {
            self.release_targets(device);
            Self::publish_none(ctx);
            return RenderOutcome::Skipped;
        }
        let (Some(passes), Some(slots), Some(res)) = (self.passes, self.slots, self.attached()) else {
            debug_assert!(false, "{CORE_NAME}: rendered without attached resources");
            Self::publish_none(ctx);
            return RenderOutcome::Skipped;
        };

        let (width, height) = self
            .settings
            .quality
            .working_size(ctx.output.width, ctx.output.height);
        match self.ensure_targets(device, width, height) {
            None => {
                Self::publish_none(ctx);
                return RenderOutcome::Skipped;
            }
            Some(true) => {
                log::debug!("{CORE_NAME}: working targets resized to {width}x{height}");
                Self::publish_none(ctx);
                return RenderOutcome::NeedsRetry;
            }
            Some(false) => {}
        }
        let (Some(depth_normal), Some(prepass_depth), Some(ssao), Some(blur_tmp)) = (
            self.depth_normal.current(),
            self.prepass_depth.current(),
            self.ssao.current(),
            self.blur_tmp.current(),
        ) else {
            Self::publish_none(ctx);
            return RenderOutcome::Skipped;
        };

        self.ensure_kernel();
        let uniforms = SsaoUniforms::new(&self.settings, &self.kernel, ctx.projection, (width, height));
        self.upload_uniforms(device, res.uniforms, uniforms);

        let previous_targets = device.render_targets();
        let previous_viewport = device.viewport();
        let previous_stage = ctx.stage;
        let working_viewport = Viewport::from_size(width, height);

        // --- 1. Depth + normal prepass ---
        ctx.set_stage(RenderStage::Ssao);
        device.set_render_targets(&RenderTargetSet::new(
            &[depth_normal.render_target()],
            Some(prepass_depth.depth_stencil()),
        ));
        device.set_viewport(working_viewport);
        device.clear_color(depth_normal.render_target(), [0.0, 0.0, 0.0, 0.0]);
        device.clear_depth(prepass_depth.depth_stencil(), 1.0);
        device.bind_shader_pass(passes.depth_normal);
        if let Some(buffer) = ctx.constants_buffer {
            device.bind_constant_buffer(slots.frame_constants, buffer);
        }
        let lists = ctx.lists;
        for node in lists.opaque {
            if node.test_frustum(&ctx.frustum) {
                node.render(ctx, device);
            }
        }

        // --- 2. Raw occlusion ---
        device.set_render_targets(&RenderTargetSet::new(&[ssao.render_target()], None));
        device.bind_shader_pass(passes.ssao);
        device.bind_texture(slots.depth_normal, Some(depth_normal.shader_view()));
        device.bind_texture(slots.noise, Some(ShaderResourceView::new(res.noise)));
        device.bind_sampler(POINT_SAMPLER_SLOT, res.point_sampler);
        device.bind_sampler(NOISE_SAMPLER_SLOT, res.noise_sampler);
        device.bind_constant_buffer(slots.constants, res.uniforms);
        device.draw_fullscreen();
        device.bind_texture(slots.depth_normal, None);
        device.bind_texture(slots.noise, None);

        // --- 3. Horizontal blur: ssao → blur_tmp ---
        device.set_render_targets(&RenderTargetSet::new(&[blur_tmp.render_target()], None));
        device.bind_shader_pass(passes.blur_h);
        device.bind_texture(slots.blur_source, Some(ssao.shader_view()));
        device.bind_texture(slots.blur_depth_normal, Some(depth_normal.shader_view()));
        device.bind_sampler(POINT_SAMPLER_SLOT, res.point_sampler);
        device.bind_constant_buffer(slots.blur_constants, res.uniforms);
        device.draw_fullscreen();
        device.bind_texture(slots.blur_source, None);

        // --- 4. Vertical blur: blur_tmp → ssao ---
        device.set_render_targets(&RenderTargetSet::new(&[ssao.render_target()], None));
        device.bind_shader_pass(passes.blur_v);
        device.bind_texture(slots.blur_source, Some(blur_tmp.shader_view()));
        device.draw_fullscreen();
        device.bind_texture(slots.blur_source, None);
        device.bind_texture(slots.blur_depth_normal, None);

        // --- 5. Restore and publish ---
        ctx.set_stage(previous_stage);
        device.set_render_targets(&previous_targets);
        device.set_viewport(previous_viewport);

        ctx.shared.ssao_map = Some(ssao.shader_view());
        ctx.constants.has_ssao_map = 1;
        RenderOutcome::Rendered
    }
}
