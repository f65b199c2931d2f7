//! Weighted Blended OIT Core
//!
//! Single-pass order-independent transparency. Every transparent node is
//! drawn once into two targets at the same time:
//!
//! | Target | Format | Clear | Blend |
//! |--------|--------|-------|-------|
//! | accumulation | `Rgba16Float` | `(0, 0, 0, 0)` | `src·1 + dst·1` (premultiplied, weighted) |
//! | revealage | `R8Unorm` | `1` | `src·0 + dst·(1 - αsrc)` |
//!
//! A full-screen composite then blends the average color over the opaque
//! image bound before the core ran (see [`resolve_pixel`]).
//!
//! Both targets follow the output size and sample count. On any mismatch they
//! are reallocated and the frame is skipped with [`RenderOutcome::NeedsRetry`];
//! a freshly allocated target is never drawn into before it is cleared.

use glam::{Vec3, Vec4};

use crate::errors::Result;
use crate::renderer::backend::{
    BackendResult, BufferDesc, BufferHandle, BufferKind, GpuDevice, RenderTargetSet, SampleDesc,
    ShaderPassHandle, TextureFormat,
};
use crate::renderer::core::{RenderContext, RenderCore, RenderOutcome, RenderStage};
use crate::renderer::graph::target_cache::{OffscreenTarget, OffscreenTargetCache};
use crate::renderer::pipeline::technique::{passes, require_pass, slot_or, slots};
use crate::renderer::pipeline::Technique;
use crate::resources::{OitSettings, OitUniforms};

const CORE_NAME: &str = "WeightedOitCore";

pub const ACCUMULATION_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
pub const REVEALAGE_FORMAT: TextureFormat = TextureFormat::R8Unorm;

pub const ACCUMULATION_CLEAR: [f32; 4] = [0.0, 0.0, 0.0, 0.0];
pub const REVEALAGE_CLEAR: [f32; 4] = [1.0, 0.0, 0.0, 0.0];

const EPSILON: f32 = 1.0e-5;

/// CPU reference of the composite pass.
///
/// `accumulation.rgb` holds the weighted premultiplied color sum and
/// `accumulation.a` the weighted alpha sum; `revealage` is the product of
/// `(1 - α)` over all fragments, i.e. the share of the background still
/// visible.
#[must_use]
pub fn resolve_pixel(accumulation: Vec4, revealage: f32, background: Vec3) -> Vec3 {
    let average = accumulation.truncate() / accumulation.w.max(EPSILON);
    let coverage = 1.0 - revealage.clamp(0.0, 1.0);
    average * coverage + background * (1.0 - coverage)
}

#[derive(Debug, Clone, Copy)]
struct OitSlots {
    frame_constants: u32,
    oit_constants: u32,
    accumulation: u32,
    revealage: u32,
}

pub struct WeightedOitCore {
    settings: OitSettings,

    accumulation: OffscreenTargetCache,
    revealage: OffscreenTargetCache,

    accumulate_pass: Option<ShaderPassHandle>,
    composite_pass: Option<ShaderPassHandle>,
    slots: Option<OitSlots>,
    uniforms: Option<BufferHandle>,
    uploaded: Option<OitUniforms>,
}

impl WeightedOitCore {
    #[must_use]
    pub fn new(settings: OitSettings) -> Self {
        Self {
            settings,
            accumulation: OffscreenTargetCache::new("OIT Accumulation"),
            revealage: OffscreenTargetCache::new("OIT Revealage"),
            accumulate_pass: None,
            composite_pass: None,
            slots: None,
            uniforms: None,
            uploaded: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &OitSettings {
        &self.settings
    }

    #[inline]
    pub fn settings_mut(&mut self) -> &mut OitSettings {
        &mut self.settings
    }

    #[inline]
    #[must_use]
    pub fn accumulation_target(&self) -> Option<OffscreenTarget> {
        self.accumulation.current()
    }

    #[inline]
    #[must_use]
    pub fn revealage_target(&self) -> Option<OffscreenTarget> {
        self.revealage.current()
    }

    /// Allocation counters of (accumulation, revealage).
    #[must_use]
    pub fn allocations(&self) -> (u32, u32) {
        (self.accumulation.allocations(), self.revealage.allocations())
    }

    /// Returns both targets and whether either was just (re)allocated, or
    /// `None` for an empty output.
    fn ensure_targets(
        &mut self,
        device: &mut dyn GpuDevice,
        width: u32,
        height: u32,
        samples: SampleDesc,
    ) -> BackendResult<Option<(OffscreenTarget, OffscreenTarget, bool)>> {
        let accumulation = self
            .accumulation
            .get_or_create(device, width, height, ACCUMULATION_FORMAT, samples)?;
        let revealage = self
            .revealage
            .get_or_create(device, width, height, REVEALAGE_FORMAT, samples)?;

        let created = accumulation.is_created() || revealage.is_created();
        Ok(match (accumulation.target(), revealage.target()) {
            (Some(a), Some(r)) => Some((a, r, created)),
            _ => None,
        })
    }

    fn release_targets(&mut self, device: &mut dyn GpuDevice) {
        self.accumulation.release(device);
        self.revealage.release(device);
    }
}

impl Default for WeightedOitCore {
    fn default() -> Self {
        Self::new(OitSettings::default())
    }
}

impl RenderCore for WeightedOitCore {
    fn name(&self) -> &'static str {
        CORE_NAME
    }

    fn on_attach(&mut self, technique: &dyn Technique, device: &mut dyn GpuDevice) -> Result<()> {
        self.accumulate_pass = Some(require_pass(technique, CORE_NAME, passes::OIT_ACCUMULATE)?);
        self.composite_pass = Some(require_pass(technique, CORE_NAME, passes::OIT_COMPOSITE)?);
        self.slots = Some(OitSlots {
            frame_constants: slot_or(
                technique,
                passes::OIT_ACCUMULATE,
                slots::FRAME_CONSTANTS,
                slots::DEFAULT_FRAME_CONSTANTS,
            ),
            oit_constants: slot_or(
                technique,
                passes::OIT_ACCUMULATE,
                slots::OIT_CONSTANTS,
                slots::DEFAULT_OIT_CONSTANTS,
            ),
            accumulation: slot_or(technique, passes::OIT_COMPOSITE, slots::ACCUMULATION, 0),
            revealage: slot_or(technique, passes::OIT_COMPOSITE, slots::REVEALAGE, 1),
        });
        self.uniforms = Some(device.create_buffer(&BufferDesc {
            label: "OIT Uniforms",
            size: std::mem::size_of::<OitUniforms>() as u64,
            kind: BufferKind::Uniform,
        })?);
        self.uploaded = None;
        Ok(())
    }

    fn on_detach(&mut self, device: &mut dyn GpuDevice) {
        self.release_targets(device);
        if let Some(buffer) = self.uniforms.take() {
            device.destroy_buffer(buffer);
        }
        self.accumulate_pass = None;
        self.composite_pass = None;
        self.slots = None;
        self.uploaded = None;
    }

    fn on_render(&mut self, ctx: &mut RenderContext<'_>, device: &mut dyn GpuDevice) -> RenderOutcome {
        let (Some(accumulate_pass), Some(composite_pass), Some(slots), Some(uniforms)) = (
            self.accumulate_pass,
            self.composite_pass,
            self.slots,
            self.uniforms,
        ) else {
            debug_assert!(false, "{CORE_NAME}: rendered without attached resources");
            return RenderOutcome::Skipped;
        };

        let output = ctx.output;
        let (accumulation, revealage) =
            match self.ensure_targets(device, output.width, output.height, output.samples) {
                Err(e) => {
                    log::warn!("{CORE_NAME}: target allocation failed ({e}); transparency disabled this frame");
                    self.release_targets(device);
                    return RenderOutcome::Skipped;
                }
                Ok(None) => return RenderOutcome::Skipped,
                Ok(Some((_, _, true))) => {
                    log::debug!(
                        "{CORE_NAME}: targets reallocated to {}x{} x{}",
                        output.width,
                        output.height,
                        output.samples.count
                    );
                    return RenderOutcome::NeedsRetry;
                }
                Ok(Some((a, r, false))) => (a, r),
            };

        let oit_uniforms = OitUniforms::from(&self.settings);
        if self.uploaded != Some(oit_uniforms) {
            device.write_buffer(uniforms, 0, bytemuck::bytes_of(&oit_uniforms));
            self.uploaded = Some(oit_uniforms);
        }

        let previous_targets = device.render_targets();
        let previous_stage = ctx.stage;

        // --- Accumulation ---
        device.set_render_targets(&RenderTargetSet::new(
            &[accumulation.render_target(), revealage.render_target()],
            output.depth,
        ));
        device.clear_color(accumulation.render_target(), ACCUMULATION_CLEAR);
        device.clear_color(revealage.render_target(), REVEALAGE_CLEAR);

        let lists = ctx.lists;
        if lists.transparent.is_empty() {
            device.set_render_targets(&previous_targets);
            return RenderOutcome::Skipped;
        }

        ctx.set_stage(RenderStage::SinglePassWeightedOit);
        device.bind_shader_pass(accumulate_pass);
        if let Some(buffer) = ctx.constants_buffer {
            device.bind_constant_buffer(slots.frame_constants, buffer);
        }
        device.bind_constant_buffer(slots.oit_constants, uniforms);
        for node in lists.transparent {
            node.render(ctx, device);
        }
        ctx.set_stage(previous_stage);

        // --- Composite over the previous targets ---
        device.set_render_targets(&previous_targets);
        device.bind_shader_pass(composite_pass);
        device.bind_texture(slots.accumulation, Some(accumulation.shader_view()));
        device.bind_texture(slots.revealage, Some(revealage.shader_view()));
        device.draw_fullscreen();
        device.bind_texture(slots.accumulation, None);
        device.bind_texture(slots.revealage, None);

        RenderOutcome::Rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_without_fragments_is_background() {
        let background = Vec3::new(0.2, 0.4, 0.6);
        let out = resolve_pixel(Vec4::ZERO, 1.0, background);
        assert!((out - background).length() < 1e-6);
    }

    #[test]
    fn test_resolve_single_opaque_fragment() {
        // One fragment, alpha 1, weight w: accum = (c·w, w), revealage = 0.
        let color = Vec3::new(1.0, 0.0, 0.0);
        let w = 7.5;
        let out = resolve_pixel((color * w).extend(w), 0.0, Vec3::ONE);
        assert!((out - color).length() < 1e-5);
    }

    #[test]
    fn test_resolve_half_transparent_fragment() {
        let color = Vec3::new(0.0, 1.0, 0.0);
        let alpha = 0.5;
        let out = resolve_pixel((color * alpha).extend(alpha), 1.0 - alpha, Vec3::ZERO);
        assert!((out - color * 0.5).length() < 1e-5);
    }
}
