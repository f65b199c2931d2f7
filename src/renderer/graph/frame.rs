//! Frame Driver
//!
//! [`FrameDriver`] owns every render core and runs them in a fixed order,
//! once per frame, on the calling thread:
//!
//! ```text
//! upload FrameConstants
//!   │
//!   ├─ depth prepass        (optional, output depth only)
//!   ├─ ShadowMapCore        light from the LightScanner
//!   ├─ SsaoCore
//!   ├─ opaque pass          re-upload constants, shadow map @8, SSAO map @9
//!   ├─ WeightedOitCore  ┐   selected by OitSettings::mode
//!   │  DepthPeelingOitCore ┘
//!   └─ ScreenCloneCore      (when configured)
//! ```
//!
//! Later stages read what earlier stages published in the
//! [`SharedResourceSet`](crate::renderer::core::SharedResourceSet); the
//! fixed order is the only synchronization. Per-core results are collected
//! in a [`FrameReport`]; any [`RenderOutcome::NeedsRetry`] asks the caller to
//! schedule another frame.

use smallvec::SmallVec;

use crate::errors::{RenderError, Result};
use crate::renderer::backend::{
    BufferDesc, BufferHandle, BufferKind, GpuDevice, RenderTargetSet, ShaderPassHandle,
};
use crate::renderer::core::{CoreHost, RenderContext, RenderOutcome, RenderStage};
use crate::renderer::graph::passes::{
    DepthPeelingOitCore, DuplicationFactory, ScreenCloneCore, ShadowMapCore, SsaoCore,
    WeightedOitCore,
};
use crate::renderer::pipeline::technique::{passes, slot_or, slots};
use crate::renderer::pipeline::Technique;
use crate::renderer::settings::RenderCoreSettings;
use crate::resources::{FrameConstants, OitMode};
use crate::scene::{LightScanner, NoLight};

/// Results of one frame.
#[derive(Debug, Default)]
pub struct FrameReport {
    pub frame_index: u64,
    /// Outcome of each core that was asked to render, in pass order.
    pub outcomes: SmallVec<[(&'static str, RenderOutcome); 6]>,
    pub light_found: bool,
    /// Opaque nodes drawn by the opaque pass.
    pub opaque_drawn: usize,
}

impl FrameReport {
    /// Whether any core asked for another frame.
    #[must_use]
    pub fn needs_retry(&self) -> bool {
        self.outcomes.iter().any(|(_, o)| o.needs_retry())
    }

    #[must_use]
    pub fn outcome(&self, core: &str) -> Option<&RenderOutcome> {
        self.outcomes.iter().find(|(name, _)| *name == core).map(|(_, o)| o)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&'static str, &RenderError)> {
        self.outcomes.iter().filter_map(|(name, outcome)| match outcome {
            RenderOutcome::Failed(e) => Some((*name, e)),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct DriverSlots {
    frame_constants: u32,
    shadow_map: u32,
    ssao_map: u32,
    environment_map: u32,
}

impl Default for DriverSlots {
    fn default() -> Self {
        Self {
            frame_constants: slots::DEFAULT_FRAME_CONSTANTS,
            shadow_map: slots::DEFAULT_SHADOW_MAP,
            ssao_map: slots::DEFAULT_SSAO_MAP,
            environment_map: slots::DEFAULT_ENVIRONMENT_MAP,
        }
    }
}

pub struct FrameDriver {
    settings: RenderCoreSettings,

    shadow: CoreHost<ShadowMapCore>,
    ssao: CoreHost<SsaoCore>,
    weighted_oit: CoreHost<WeightedOitCore>,
    depth_peeling: CoreHost<DepthPeelingOitCore>,
    screen_clone: Option<CoreHost<ScreenCloneCore>>,

    light_scanner: Box<dyn LightScanner>,

    depth_prepass: Option<ShaderPassHandle>,
    opaque: Option<ShaderPassHandle>,
    slots: DriverSlots,
    constants_buffer: Option<BufferHandle>,
    attached: bool,

    frame_index: u64,
}

impl FrameDriver {
    #[must_use]
    pub fn new(settings: RenderCoreSettings) -> Self {
        Self {
            shadow: CoreHost::new(ShadowMapCore::new(settings.shadow.clone())),
            ssao: CoreHost::new(SsaoCore::new(settings.ssao.clone())),
            weighted_oit: CoreHost::new(WeightedOitCore::new(settings.oit.clone())),
            depth_peeling: CoreHost::new(DepthPeelingOitCore::new(settings.oit.clone())),
            screen_clone: None,
            settings,
            light_scanner: Box::new(NoLight),
            depth_prepass: None,
            opaque: None,
            slots: DriverSlots::default(),
            constants_buffer: None,
            attached: false,
            frame_index: 0,
        }
    }

    /// Sets the scanner asked for the shadow-casting light every frame.
    #[must_use]
    pub fn with_light_scanner(mut self, scanner: impl LightScanner + 'static) -> Self {
        self.light_scanner = Box::new(scanner);
        self
    }

    /// Adds the screen clone core, capturing through `factory`. Must be
    /// called before [`Self::attach`].
    #[must_use]
    pub fn with_screen_clone(mut self, factory: Box<dyn DuplicationFactory>) -> Self {
        let settings = self.settings.screen_clone.get_or_insert_with(Default::default).clone();
        self.screen_clone = Some(CoreHost::new(ScreenCloneCore::new(settings, factory)));
        self
    }

    /// Settings applied to the cores at the start of every frame.
    #[inline]
    #[must_use]
    pub fn settings(&self) -> &RenderCoreSettings {
        &self.settings
    }

    #[inline]
    pub fn settings_mut(&mut self) -> &mut RenderCoreSettings {
        &mut self.settings
    }

    #[inline]
    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    #[inline]
    #[must_use]
    pub fn shadow(&self) -> &CoreHost<ShadowMapCore> {
        &self.shadow
    }

    #[inline]
    #[must_use]
    pub fn ssao(&self) -> &CoreHost<SsaoCore> {
        &self.ssao
    }

    #[inline]
    #[must_use]
    pub fn weighted_oit(&self) -> &CoreHost<WeightedOitCore> {
        &self.weighted_oit
    }

    #[inline]
    #[must_use]
    pub fn depth_peeling(&self) -> &CoreHost<DepthPeelingOitCore> {
        &self.depth_peeling
    }

    #[inline]
    #[must_use]
    pub fn screen_clone(&self) -> Option<&CoreHost<ScreenCloneCore>> {
        self.screen_clone.as_ref()
    }

    #[inline]
    pub fn screen_clone_mut(&mut self) -> Option<&mut CoreHost<ScreenCloneCore>> {
        self.screen_clone.as_mut()
    }

    #[inline]
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Attaches every core to `technique`.
    ///
    /// A core whose passes are missing stays detached and is skipped each
    /// frame; the error is logged. Only failing to create the driver's own
    /// constant buffer is returned.
    pub fn attach(&mut self, technique: &dyn Technique, device: &mut dyn GpuDevice) -> Result<()> {
        if self.attached {
            self.detach(device);
        }

        self.constants_buffer = Some(device.create_buffer(&BufferDesc {
            label: "Frame Constants",
            size: std::mem::size_of::<FrameConstants>() as u64,
            kind: BufferKind::Uniform,
        })?);
        self.depth_prepass = technique.shader_pass(passes::DEPTH_PREPASS);
        self.opaque = technique.shader_pass(passes::OPAQUE);
        self.slots = DriverSlots {
            frame_constants: slot_or(
                technique,
                passes::OPAQUE,
                slots::FRAME_CONSTANTS,
                slots::DEFAULT_FRAME_CONSTANTS,
            ),
            shadow_map: slot_or(technique, passes::OPAQUE, slots::SHADOW_MAP, slots::DEFAULT_SHADOW_MAP),
            ssao_map: slot_or(technique, passes::OPAQUE, slots::SSAO_MAP, slots::DEFAULT_SSAO_MAP),
            environment_map: slot_or(
                technique,
                passes::OPAQUE,
                slots::ENVIRONMENT_MAP,
                slots::DEFAULT_ENVIRONMENT_MAP,
            ),
        };

        // Failures are logged by the hosts; the cores stay detached.
        let _ = self.shadow.attach(technique, device);
        let _ = self.ssao.attach(technique, device);
        let _ = self.weighted_oit.attach(technique, device);
        let _ = self.depth_peeling.attach(technique, device);
        if let Some(screen_clone) = &mut self.screen_clone {
            let _ = screen_clone.attach(technique, device);
        }

        self.attached = true;
        log::info!("FrameDriver: attached");
        Ok(())
    }

    /// Detaches every core and releases the driver's own resources.
    pub fn detach(&mut self, device: &mut dyn GpuDevice) {
        self.shadow.detach(device);
        self.ssao.detach(device);
        self.weighted_oit.detach(device);
        self.depth_peeling.detach(device);
        if let Some(screen_clone) = &mut self.screen_clone {
            screen_clone.detach(device);
        }
        if let Some(buffer) = self.constants_buffer.take() {
            device.destroy_buffer(buffer);
        }
        self.depth_prepass = None;
        self.opaque = None;
        self.attached = false;
    }

    fn apply_settings(&mut self) {
        let settings = &self.settings;
        if self.shadow.core().settings() != &settings.shadow {
            *self.shadow.core_mut().settings_mut() = settings.shadow.clone();
        }
        if self.ssao.core().settings() != &settings.ssao {
            *self.ssao.core_mut().settings_mut() = settings.ssao.clone();
        }
        if self.weighted_oit.core().settings() != &settings.oit {
            *self.weighted_oit.core_mut().settings_mut() = settings.oit.clone();
        }
        if self.depth_peeling.core().settings() != &settings.oit {
            *self.depth_peeling.core_mut().settings_mut() = settings.oit.clone();
        }
        if let (Some(host), Some(clone_settings)) = (&mut self.screen_clone, &settings.screen_clone)
            && host.core().settings() != clone_settings
        {
            *host.core_mut().settings_mut() = clone_settings.clone();
        }
    }

    fn upload_constants(&self, ctx: &RenderContext<'_>, device: &mut dyn GpuDevice) {
        if let Some(buffer) = self.constants_buffer {
            device.write_buffer(buffer, 0, bytemuck::bytes_of(&ctx.constants));
        }
    }

    fn run_depth_prepass(&self, ctx: &mut RenderContext<'_>, device: &mut dyn GpuDevice) {
        let (Some(pass), Some(depth)) = (self.depth_prepass, ctx.output.depth) else {
            log::debug!("FrameDriver: depth prepass requested without pass or output depth");
            return;
        };
        let previous_targets = device.render_targets();
        ctx.set_stage(RenderStage::DepthPrepass);
        device.set_render_targets(&RenderTargetSet::new(&[], Some(depth)));
        device.bind_shader_pass(pass);
        if let Some(buffer) = self.constants_buffer {
            device.bind_constant_buffer(self.slots.frame_constants, buffer);
        }
        let lists = ctx.lists;
        for node in lists.opaque {
            node.render(ctx, device);
        }
        ctx.set_stage(RenderStage::None);
        device.set_render_targets(&previous_targets);
    }

    fn run_opaque(&self, ctx: &mut RenderContext<'_>, device: &mut dyn GpuDevice) -> usize {
        ctx.set_stage(RenderStage::None);
        self.upload_constants(ctx, device);

        if let Some(pass) = self.opaque {
            device.bind_shader_pass(pass);
        }
        if let Some(buffer) = self.constants_buffer {
            device.bind_constant_buffer(self.slots.frame_constants, buffer);
        }
        let shared = ctx.shared;
        device.bind_texture(self.slots.shadow_map, shared.shadow_map);
        device.bind_texture(self.slots.ssao_map, shared.ssao_map);
        device.bind_texture(self.slots.environment_map, shared.environment_map);

        let lists = ctx.lists;
        for node in lists.opaque {
            node.render(ctx, device);
        }

        // The shadow core writes its map next frame while it is still published.
        device.bind_texture(self.slots.shadow_map, None);
        device.bind_texture(self.slots.ssao_map, None);
        device.bind_texture(self.slots.environment_map, None);
        lists.opaque.len()
    }

    /// Renders one frame into `ctx.output`.
    pub fn render_frame(&mut self, ctx: &mut RenderContext<'_>, device: &mut dyn GpuDevice) -> FrameReport {
        let mut report = FrameReport {
            frame_index: self.frame_index,
            ..FrameReport::default()
        };
        if !self.attached {
            log::debug!("FrameDriver: render before attach skipped");
            return report;
        }

        self.apply_settings();
        ctx.frame_index = self.frame_index;
        ctx.constants_buffer = self.constants_buffer;
        device.set_render_targets(&ctx.output.targets());
        device.set_viewport(ctx.output.viewport());
        self.upload_constants(ctx, device);

        if self.settings.depth_prepass {
            self.run_depth_prepass(ctx, device);
        }

        let light = self.light_scanner.scan();
        report.light_found = light.is_some();
        self.shadow.core_mut().set_light(light);
        report.outcomes.push(("ShadowMapCore", self.shadow.render(ctx, device)));

        report.outcomes.push(("SsaoCore", self.ssao.render(ctx, device)));

        report.opaque_drawn = self.run_opaque(ctx, device);

        let oit = match self.settings.oit.mode {
            OitMode::Weighted => ("WeightedOitCore", self.weighted_oit.render(ctx, device)),
            OitMode::DepthPeeling => ("DepthPeelingOitCore", self.depth_peeling.render(ctx, device)),
        };
        report.outcomes.push(oit);

        if self.settings.screen_clone.is_some()
            && let Some(screen_clone) = &mut self.screen_clone
        {
            report.outcomes.push(("ScreenCloneCore", screen_clone.render(ctx, device)));
        }

        self.frame_index += 1;
        report
    }
}

impl Default for FrameDriver {
    fn default() -> Self {
        Self::new(RenderCoreSettings::default())
    }
}
