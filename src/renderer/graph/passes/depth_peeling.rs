//! Dual Depth Peeling OIT Core
//!
//! Exact transparency for the first N layers. Each geometry pass extracts the
//! nearest and the farthest remaining layer at once, accumulating the near
//! ones front-to-back and the far ones back-to-front.
//!
//! # Targets
//!
//! | Target | Format | Per frame |
//! |--------|--------|-----------|
//! | min-max `[2]` | `Rg32Float` | ping-pong, cleared to `(-1, -1)` before each write |
//! | front | `Rgba16Float` | cleared to transparent black |
//! | back | output format | seeded with the opaque image (copy or MSAA resolve) |
//!
//! # Pass Sequence
//!
//! ```text
//! init        write min-max[0]                  (stage DepthPeelingInitMinMaxZ)
//! layer k     read  min-max[1 - k % 2] @ slot 100
//!             write min-max[k % 2], front, back (stage DepthPeeling)
//! final       read  min-max[(N - 1) % 2], front, back → output
//! ```
//!
//! The transparent list is rendered `max(1, N)` times per frame. With N = 1
//! only the init pass runs and the final pass shows the nearest surface.
//!
//! For single-sample outputs the output depth buffer is attached to the init
//! and layer passes; their pipelines are expected to test against it without
//! writing. Multisampled outputs peel without opaque occlusion.

use crate::errors::Result;
use crate::renderer::backend::{
    BackendResult, GpuDevice, RenderTargetSet, SampleDesc, ShaderPassHandle, TextureFormat, TextureUsage,
};
use crate::renderer::core::{RenderContext, RenderCore, RenderOutcome, RenderStage};
use crate::renderer::graph::target_cache::{OffscreenTarget, OffscreenTargetCache};
use crate::renderer::pipeline::technique::{passes, require_pass, slot_or, slots};
use crate::renderer::pipeline::Technique;
use crate::resources::OitSettings;

const CORE_NAME: &str = "DepthPeelingOitCore";

pub const MIN_MAX_FORMAT: TextureFormat = TextureFormat::Rg32Float;
pub const FRONT_FORMAT: TextureFormat = TextureFormat::Rgba16Float;

pub const MIN_MAX_CLEAR: [f32; 4] = [-1.0, -1.0, 0.0, 0.0];
pub const FRONT_CLEAR: [f32; 4] = [0.0, 0.0, 0.0, 0.0];

/// Target indices used by one peel layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeelLayer {
    pub layer: u32,
    pub read: usize,
    pub write: usize,
}

impl PeelLayer {
    /// Layer `layer >= 1` writes `layer % 2` and reads the other target.
    #[must_use]
    pub fn new(layer: u32) -> Self {
        let write = (layer % 2) as usize;
        Self {
            layer,
            read: 1 - write,
            write,
        }
    }
}

/// What the last frame did, for inspection by the driver and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeelingIterationState {
    /// Effective iteration count (`peeling_iterations`, at least 1).
    pub iterations: u32,
    /// Renders of the whole transparent list, init pass included.
    pub transparent_renders: u32,
    pub layers: Vec<PeelLayer>,
    /// Min-max target read by the final pass.
    pub final_read: Option<usize>,
    pub back_seeded_by_resolve: bool,
    /// The opaque depth buffer was attached to the init and layer passes.
    pub depth_tested: bool,
}

#[derive(Debug, Clone, Copy)]
struct PeelSlots {
    frame_constants: u32,
    previous_min_max: u32,
    final_min_max: u32,
    final_front: u32,
    final_back: u32,
}

#[derive(Debug, Clone, Copy)]
struct PeelPasses {
    init: ShaderPassHandle,
    layer: ShaderPassHandle,
    composite: ShaderPassHandle,
}

struct PeelTargets {
    min_max: [OffscreenTarget; 2],
    front: OffscreenTarget,
    back: OffscreenTarget,
}

pub struct DepthPeelingOitCore {
    settings: OitSettings,

    min_max: [OffscreenTargetCache; 2],
    front: OffscreenTargetCache,
    back: OffscreenTargetCache,

    passes: Option<PeelPasses>,
    slots: Option<PeelSlots>,

    state: PeelingIterationState,
}

impl DepthPeelingOitCore {
    #[must_use]
    pub fn new(settings: OitSettings) -> Self {
        Self {
            settings,
            min_max: [
                OffscreenTargetCache::new("Peel MinMax 0"),
                OffscreenTargetCache::new("Peel MinMax 1"),
            ],
            front: OffscreenTargetCache::new("Peel Front"),
            back: OffscreenTargetCache::with_usage(
                "Peel Back",
                TextureUsage::OFFSCREEN | TextureUsage::COPY_DST,
            ),
            passes: None,
            slots: None,
            state: PeelingIterationState::default(),
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

    /// State of the last rendered frame.
    #[inline]
    #[must_use]
    pub fn iteration_state(&self) -> &PeelingIterationState {
        &self.state
    }

    #[must_use]
    pub fn min_max_target(&self, index: usize) -> Option<OffscreenTarget> {
        self.min_max.get(index).and_then(OffscreenTargetCache::current)
    }

    #[must_use]
    pub fn front_target(&self) -> Option<OffscreenTarget> {
        self.front.current()
    }

    #[must_use]
    pub fn back_target(&self) -> Option<OffscreenTarget> {
        self.back.current()
    }

    /// Returns the targets, or `Ok(None)` when any of them was just
    /// (re)allocated or the output is empty.
    fn ensure_targets(
        &mut self,
        device: &mut dyn GpuDevice,
        width: u32,
        height: u32,
        back_format: TextureFormat,
    ) -> BackendResult<(Option<PeelTargets>, bool)> {
        let single = SampleDesc::SINGLE;
        let [cache0, cache1] = &mut self.min_max;
        let statuses = [
            cache0.get_or_create(device, width, height, MIN_MAX_FORMAT, single)?,
            cache1.get_or_create(device, width, height, MIN_MAX_FORMAT, single)?,
            self.front.get_or_create(device, width, height, FRONT_FORMAT, single)?,
            self.back.get_or_create(device, width, height, back_format, single)?,
        ];
        let created = statuses.iter().any(|s| s.is_created());
        let targets = match statuses.map(|s| s.target()) {
            [Some(m0), Some(m1), Some(front), Some(back)] => Some(PeelTargets {
                min_max: [m0, m1],
                front,
                back,
            }),
            _ => None,
        };
        Ok((targets, created))
    }

    fn release_targets(&mut self, device: &mut dyn GpuDevice) {
        for cache in &mut self.min_max {
            cache.release(device);
        }
        self.front.release(device);
        self.back.release(device);
    }

    fn render_transparent(ctx: &mut RenderContext<'_>, device: &mut dyn GpuDevice, stage: RenderStage) {
        let previous = ctx.stage;
        ctx.set_stage(stage);
        let lists = ctx.lists;
        for node in lists.transparent {
            node.render(ctx, device);
        }
        ctx.set_stage(previous);
    }
}

impl Default for DepthPeelingOitCore {
    fn default() -> Self {
        Self::new(OitSettings::default())
    }
}

impl RenderCore for DepthPeelingOitCore {
    fn name(&self) -> &'static str {
        CORE_NAME
    }

    fn on_attach(&mut self, technique: &dyn Technique, _device: &mut dyn GpuDevice) -> Result<()> {
        self.passes = Some(PeelPasses {
            init: require_pass(technique, CORE_NAME, passes::PEEL_INIT_MIN_MAX)?,
            layer: require_pass(technique, CORE_NAME, passes::PEEL_LAYER)?,
            composite: require_pass(technique, CORE_NAME, passes::PEEL_FINAL)?,
        });
        self.slots = Some(PeelSlots {
            frame_constants: slot_or(
                technique,
                passes::PEEL_LAYER,
                slots::FRAME_CONSTANTS,
                slots::DEFAULT_FRAME_CONSTANTS,
            ),
            previous_min_max: slot_or(
                technique,
                passes::PEEL_LAYER,
                slots::PREVIOUS_MIN_MAX,
                slots::DEFAULT_PREVIOUS_MIN_MAX,
            ),
            final_min_max: slot_or(technique, passes::PEEL_FINAL, slots::MIN_MAX, 0),
            final_front: slot_or(technique, passes::PEEL_FINAL, slots::FRONT, 1),
            final_back: slot_or(technique, passes::PEEL_FINAL, slots::BACK, 2),
        });
        self.state = PeelingIterationState::default();
        Ok(())
    }

    fn on_detach(&mut self, device: &mut dyn GpuDevice) {
        self.release_targets(device);
        self.passes = None;
        self.slots = None;
        self.state = PeelingIterationState::default();
    }

    fn on_render(&mut self, ctx: &mut RenderContext<'_>, device: &mut dyn GpuDevice) -> RenderOutcome {
        let (Some(passes), Some(slots)) = (self.passes, self.slots) else {
            debug_assert!(false, "{CORE_NAME}: rendered without attached resources");
            return RenderOutcome::Skipped;
        };
        self.state = PeelingIterationState::default();

        let output = ctx.output;
        let targets = match self.ensure_targets(device, output.width, output.height, output.format) {
            Ok((Some(targets), false)) => targets,
            Ok((Some(_), true)) => {
                log::debug!("{CORE_NAME}: targets reallocated to {}x{}", output.width, output.height);
                return RenderOutcome::NeedsRetry;
            }
            Ok((None, _)) => return RenderOutcome::Skipped,
            Err(e) => {
                log::warn!("{CORE_NAME}: target allocation failed ({e}); transparency disabled this frame");
                self.release_targets(device);
                return RenderOutcome::Skipped;
            }
        };

        let lists = ctx.lists;
        if lists.transparent.is_empty() {
            return RenderOutcome::Skipped;
        }

        let iterations = self.settings.peeling_iterations.max(1);
        let previous_targets = device.render_targets();
        self.state.iterations = iterations;

        // --- Init: seed accumulators, extract the nearest/farthest depth ---
        device.clear_color(targets.front.render_target(), FRONT_CLEAR);
        if output.samples.is_multisampled() {
            device.resolve_texture(output.color_texture(), targets.back.texture);
            self.state.back_seeded_by_resolve = true;
        } else {
            device.copy_texture(output.color_texture(), targets.back.texture);
        }

        // Opaque depth is attached read-only so hidden layers fail the depth
        // test. A multisampled depth buffer cannot pair with the single-sample
        // peel targets; those passes run without occlusion.
        let opaque_depth = if output.samples.is_multisampled() {
            None
        } else {
            output.depth
        };
        self.state.depth_tested = opaque_depth.is_some();

        let init_target = targets.min_max[0].render_target();
        device.set_render_targets(&RenderTargetSet::new(&[init_target], opaque_depth));
        device.clear_color(init_target, MIN_MAX_CLEAR);
        device.bind_shader_pass(passes.init);
        if let Some(buffer) = ctx.constants_buffer {
            device.bind_constant_buffer(slots.frame_constants, buffer);
        }
        Self::render_transparent(ctx, device, RenderStage::DepthPeelingInitMinMaxZ);
        self.state.transparent_renders += 1;

        // --- Peel layers ---
        for layer in 1..iterations {
            let peel = PeelLayer::new(layer);
            let write = targets.min_max[peel.write].render_target();

            device.bind_texture(slots.previous_min_max, None);
            device.set_render_targets(&RenderTargetSet::new(
                &[write, targets.front.render_target(), targets.back.render_target()],
                opaque_depth,
            ));
            device.clear_color(write, MIN_MAX_CLEAR);
            device.bind_shader_pass(passes.layer);
            if let Some(buffer) = ctx.constants_buffer {
                device.bind_constant_buffer(slots.frame_constants, buffer);
            }
            device.bind_texture(
                slots.previous_min_max,
                Some(targets.min_max[peel.read].shader_view()),
            );
            Self::render_transparent(ctx, device, RenderStage::DepthPeeling);

            self.state.layers.push(peel);
            self.state.transparent_renders += 1;
        }
        device.bind_texture(slots.previous_min_max, None);

        // --- Final composite into the real target ---
        let final_read = ((iterations - 1) % 2) as usize;
        device.set_render_targets(&previous_targets);
        device.bind_shader_pass(passes.composite);
        device.bind_texture(slots.final_min_max, Some(targets.min_max[final_read].shader_view()));
        device.bind_texture(slots.final_front, Some(targets.front.shader_view()));
        device.bind_texture(slots.final_back, Some(targets.back.shader_view()));
        device.draw_fullscreen();
        device.bind_texture(slots.final_min_max, None);
        device.bind_texture(slots.final_front, None);
        device.bind_texture(slots.final_back, None);
        self.state.final_read = Some(final_read);

        log::trace!("{CORE_NAME}: {iterations} iterations");
        RenderOutcome::Rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peel_layers_ping_pong() {
        for layer in 1..16 {
            let peel = PeelLayer::new(layer);
            assert_eq!(peel.write, (layer % 2) as usize);
            assert_eq!(peel.read, 1 - peel.write);
        }
    }
}
