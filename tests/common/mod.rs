//! Shared fixtures for the render core integration tests.
//!
//! Every test runs against [`HeadlessDevice`], which records the call stream
//! and flags usage violations (read/write hazards, double frees, leaks).

#![allow(dead_code)]

use std::cell::RefCell;

use glam::{Mat4, Vec3};

use myth_render_core::renderer::backend::{GpuDevice, HeadlessDevice, SampleDesc, TextureFormat};
use myth_render_core::renderer::core::{
    CoreHost, OutputSurface, RenderContext, RenderCore, RenderStage,
};
use myth_render_core::renderer::pipeline::PassTable;
use myth_render_core::renderer::pipeline::technique::passes;
use myth_render_core::resources::BoundingBox;
use myth_render_core::scene::{RenderLists, SceneNode};

pub const EPSILON: f32 = 1e-4;

pub fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Scene
// ============================================================================

/// A unit cube that records the stage of every draw it issues.
pub struct TestMesh {
    pub bounds: BoundingBox,
    pub casts_shadow: bool,
    stages: RefCell<Vec<RenderStage>>,
}

impl TestMesh {
    pub fn at(center: Vec3) -> Self {
        Self {
            bounds: BoundingBox::new(center - Vec3::splat(0.5), center + Vec3::splat(0.5)),
            casts_shadow: true,
            stages: RefCell::new(Vec::new()),
        }
    }

    pub fn non_caster(center: Vec3) -> Self {
        Self {
            casts_shadow: false,
            ..Self::at(center)
        }
    }

    pub fn stages(&self) -> Vec<RenderStage> {
        self.stages.borrow().clone()
    }

    pub fn draw_count(&self, stage: RenderStage) -> usize {
        self.stages.borrow().iter().filter(|s| **s == stage).count()
    }
}

impl SceneNode for TestMesh {
    fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    fn casts_shadow(&self) -> bool {
        self.casts_shadow
    }

    fn render(&self, ctx: &RenderContext<'_>, device: &mut dyn GpuDevice) {
        self.stages.borrow_mut().push(ctx.stage);
        device.draw(0..36, 0..1);
    }
}

// ============================================================================
// Device & Technique
// ============================================================================

pub const ALL_PASSES: [&str; 14] = [
    passes::DEPTH_PREPASS,
    passes::OPAQUE,
    passes::SHADOW_DEPTH,
    passes::SSAO_DEPTH_NORMAL,
    passes::SSAO,
    passes::SSAO_BLUR_H,
    passes::SSAO_BLUR_V,
    passes::OIT_ACCUMULATE,
    passes::OIT_COMPOSITE,
    passes::PEEL_INIT_MIN_MAX,
    passes::PEEL_LAYER,
    passes::PEEL_FINAL,
    passes::SCREEN_QUAD,
    passes::SCREEN_CURSOR,
];

/// A technique providing every well-known pass, registered under its own name.
pub fn full_technique(device: &mut HeadlessDevice) -> PassTable {
    technique_without(device, &[])
}

/// Like [`full_technique`] but lacking the passes in `missing`.
pub fn technique_without(device: &mut HeadlessDevice, missing: &[&str]) -> PassTable {
    let mut table = PassTable::new();
    for name in ALL_PASSES {
        if !missing.contains(&name) {
            let pass = device.register_pass(name);
            table.insert_pass(name, pass);
        }
    }
    table
}

pub fn back_buffer(device: &mut HeadlessDevice, width: u32, height: u32, samples: u32) -> OutputSurface {
    let samples = SampleDesc::new(samples);
    let (color, depth) = device.create_back_buffer(width, height, samples);
    OutputSurface {
        color,
        depth: Some(depth),
        width,
        height,
        format: TextureFormat::Bgra8Unorm,
        samples,
    }
}

/// Camera at +Z looking at the origin.
pub fn camera(width: u32, height: u32) -> (Mat4, Mat4) {
    let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
    let projection = Mat4::perspective_rh(
        60f32.to_radians(),
        width as f32 / height.max(1) as f32,
        0.1,
        100.0,
    );
    (view, projection)
}

pub fn context<'a>(output: OutputSurface, lists: RenderLists<'a>) -> RenderContext<'a> {
    let (view, projection) = camera(output.width, output.height);
    RenderContext::new(view, projection, output, lists)
}

/// Binds the output as the current render target, as the frame driver does.
pub fn begin_frame(device: &mut HeadlessDevice, output: &OutputSurface) {
    device.set_render_targets(&output.targets());
    device.set_viewport(output.viewport());
}

pub fn attached<C: RenderCore>(core: C, technique: &PassTable, device: &mut HeadlessDevice) -> CoreHost<C> {
    let mut host = CoreHost::new(core);
    host.attach(technique, device).expect("attach");
    host
}

pub fn assert_no_violations(device: &HeadlessDevice) {
    assert!(
        device.violations().is_empty(),
        "device violations: {:#?}",
        device.violations()
    );
}
