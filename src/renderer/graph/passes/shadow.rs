//! Shadow Map Core
//!
//! Renders the opaque shadow casters from the light's point of view into a
//! single depth target and publishes it for the opaque pass.
//!
//! # Frame Flow
//!
//! ```text
//! disabled ──────────────────────────────► publish "no shadow map", release target
//! enabled:
//!   counter = frame % max(1, update_frequency)
//!   counter != 0 ────────────────────────► republish previous map (off-frame)
//!   no light ────────────────────────────► publish "no shadow map"
//!   allocation failed ───────────────────► publish "no shadow map" (warn)
//!   otherwise:
//!     swap culling frustum → light frustum
//!     clear depth, draw casters inside the light frustum
//!     restore frustum, targets, viewport
//!     publish map + light view-projection
//! ```
//!
//! The opaque pass must render correctly in every branch; it reads
//! `FrameConstants::has_shadow_map` to decide whether to sample the map.

use glam::{Mat4, Vec4};

use crate::errors::Result;
use crate::renderer::backend::{
    BufferDesc, BufferHandle, BufferKind, GpuDevice, RenderTargetSet, SampleDesc,
    ShaderPassHandle, TextureFormat, Viewport,
};
use crate::renderer::core::{RenderContext, RenderCore, RenderOutcome, RenderStage};
use crate::renderer::graph::target_cache::{OffscreenTarget, OffscreenTargetCache};
use crate::renderer::pipeline::technique::{passes, require_pass, slot_or, slots};
use crate::renderer::pipeline::Technique;
use crate::resources::{FrameConstants, ShadowSettings};
use crate::scene::ShadowLight;

const CORE_NAME: &str = "ShadowMapCore";

/// Depth format of the shadow map.
pub const SHADOW_MAP_FORMAT: TextureFormat = TextureFormat::Depth32Float;

pub struct ShadowMapCore {
    settings: ShadowSettings,

    // === Light (supplied by the frame driver each frame) ===
    light: Option<ShadowLight>,

    // === Device Resources ===
    depth_target: OffscreenTargetCache,
    light_constants: Option<BufferHandle>,
    pass: Option<ShaderPassHandle>,
    constants_slot: u32,

    // === Runtime State ===
    frame_counter: u32,
    /// View-projection the current map was rendered with, if it holds valid content.
    rendered_with: Option<Mat4>,
    render_count: u64,
}

impl ShadowMapCore {
    #[must_use]
    pub fn new(settings: ShadowSettings) -> Self {
        Self {
            settings,
            light: None,
            depth_target: OffscreenTargetCache::new("Shadow Map"),
            light_constants: None,
            pass: None,
            constants_slot: slots::DEFAULT_FRAME_CONSTANTS,
            frame_counter: 0,
            rendered_with: None,
            render_count: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &ShadowSettings {
        &self.settings
    }

    /// Mutable settings. A size change takes effect on the next render frame.
    #[inline]
    pub fn settings_mut(&mut self) -> &mut ShadowSettings {
        &mut self.settings
    }

    /// Supplies the light found by the scene scan for the coming render.
    pub fn set_light(&mut self, light: Option<ShadowLight>) {
        self.light = light;
    }

    #[inline]
    #[must_use]
    pub fn found_light(&self) -> bool {
        self.light.is_some()
    }

    /// Number of frames in which the map was actually re-rendered.
    #[inline]
    #[must_use]
    pub fn render_count(&self) -> u64 {
        self.render_count
    }

    #[inline]
    #[must_use]
    pub fn depth_target(&self) -> &OffscreenTargetCache {
        &self.depth_target
    }

    fn publish(&self, ctx: &mut RenderContext<'_>, target: OffscreenTarget, light_view_projection: Mat4) {
        let (width, height) = (target.key.width as f32, target.key.height as f32);
        ctx.shared.shadow_map = Some(target.shader_view());
        ctx.constants.has_shadow_map = 1;
        ctx.constants.light_view_projection = light_view_projection;
        ctx.constants.shadow_params = Vec4::new(
            self.settings.intensity,
            self.settings.bias,
            1.0 / width,
            1.0 / height,
        );
    }

    fn publish_none(ctx: &mut RenderContext<'_>) {
        ctx.shared.shadow_map = None;
        ctx.constants.has_shadow_map = 0;
        ctx.constants.light_view_projection = Mat4::IDENTITY;
        ctx.constants.shadow_params = Vec4::ZERO;
    }

    fn render_map(
        &mut self,
        ctx: &mut RenderContext<'_>,
        device: &mut dyn GpuDevice,
        light: ShadowLight,
    ) -> RenderOutcome {
        let (Some(pass), Some(light_constants)) = (self.pass, self.light_constants) else {
            debug_assert!(false, "{CORE_NAME}: rendered without attached resources");
            Self::publish_none(ctx);
            return RenderOutcome::Skipped;
        };

        let status = match self.depth_target.get_or_create(
            device,
            self.settings.width,
            self.settings.height,
            SHADOW_MAP_FORMAT,
            SampleDesc::SINGLE,
        ) {
            Ok(status) => status,
            Err(e) => {
                log::warn!("{CORE_NAME}: depth target allocation failed ({e}); rendering without shadows");
                self.rendered_with = None;
                Self::publish_none(ctx);
                return RenderOutcome::Skipped;
            }
        };
        let Some(target) = status.target() else {
            self.rendered_with = None;
            Self::publish_none(ctx);
            return RenderOutcome::Skipped;
        };

        let light_view_projection = light.view_projection();
        let constants = FrameConstants {
            view: light.view,
            projection: light.projection,
            view_projection: light_view_projection,
            light_view_projection,
            viewport: Vec4::new(0.0, 0.0, target.key.width as f32, target.key.height as f32),
            stage: RenderStage::ShadowPass.as_u32(),
            ..FrameConstants::default()
        };
        device.write_buffer(light_constants, 0, bytemuck::bytes_of(&constants));

        let previous_targets = device.render_targets();
        let previous_viewport = device.viewport();
        let previous_stage = ctx.stage;
        let camera_frustum = std::mem::replace(&mut ctx.frustum, light.frustum());
        ctx.set_stage(RenderStage::ShadowPass);

        device.set_render_targets(&RenderTargetSet::new(&[], Some(target.depth_stencil())));
        device.set_viewport(Viewport::from_size(target.key.width, target.key.height));
        device.clear_depth(target.depth_stencil(), 1.0);
        device.bind_shader_pass(pass);
        device.bind_constant_buffer(self.constants_slot, light_constants);

        let lists = ctx.lists;
        let mut casters = 0usize;
        for node in lists.opaque {
            if node.casts_shadow() && node.test_frustum(&ctx.frustum) {
                node.render(ctx, device);
                casters += 1;
            }
        }

        ctx.frustum = camera_frustum;
        ctx.set_stage(previous_stage);
        device.set_render_targets(&previous_targets);
        device.set_viewport(previous_viewport);

        log::trace!("{CORE_NAME}: rendered {casters} casters");
        self.rendered_with = Some(light_view_projection);
        self.render_count += 1;
        self.publish(ctx, target, light_view_projection);
        RenderOutcome::Rendered
    }
}

impl Default for ShadowMapCore {
    fn default() -> Self {
        Self::new(ShadowSettings::default())
    }
}

impl RenderCore for ShadowMapCore {
    fn name(&self) -> &'static str {
        CORE_NAME
    }

    fn on_attach(&mut self, technique: &dyn Technique, device: &mut dyn GpuDevice) -> Result<()> {
        self.pass = Some(require_pass(technique, CORE_NAME, passes::SHADOW_DEPTH)?);
        self.constants_slot = slot_or(
            technique,
            passes::SHADOW_DEPTH,
            slots::FRAME_CONSTANTS,
            slots::DEFAULT_FRAME_CONSTANTS,
        );
        self.light_constants = Some(device.create_buffer(&BufferDesc {
            label: "Shadow Light Constants",
            size: std::mem::size_of::<FrameConstants>() as u64,
            kind: BufferKind::Uniform,
        })?);
        self.frame_counter = 0;
        self.rendered_with = None;
        Ok(())
    }

    fn on_detach(&mut self, device: &mut dyn GpuDevice) {
        self.depth_target.release(device);
        if let Some(buffer) = self.light_constants.take() {
            device.destroy_buffer(buffer);
        }
        self.pass = None;
        self.rendered_with = None;
    }

    fn on_render(&mut self, ctx: &mut RenderContext<'_>, device: &mut dyn GpuDevice) -> RenderOutcome {
        if !self.settings.enabled {
            if self.depth_target.current().is_some() {
                self.depth_target.release(device);
                self.rendered_with = None;
            }
            Self::publish_none(ctx);
            return RenderOutcome::Skipped;
        }

        let due = self.frame_counter == 0;
        self.frame_counter = (self.frame_counter + 1) % self.settings.period();

        if !due {
            match (self.depth_target.current(), self.rendered_with) {
                (Some(target), Some(view_projection)) => self.publish(ctx, target, view_projection),
                _ => Self::publish_none(ctx),
            }
            return RenderOutcome::Skipped;
        }

        match self.light {
            Some(light) => self.render_map(ctx, device, light),
            None => {
                log::trace!("{CORE_NAME}: no light source found");
                self.rendered_with = None;
                Self::publish_none(ctx);
                RenderOutcome::Skipped
            }
        }
    }
}
