//! Frame Driver Tests
//!
//! Tests for:
//! - Fixed core order and the per-frame report
//! - Shared shadow / SSAO maps bound for the opaque pass and unbound after
//! - OIT mode selection
//! - Optional depth prepass
//! - Settings applied at the start of each frame
//! - Missing passes leave only the affected core detached

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec3;

use myth_render_core::renderer::backend::{DeviceCommand, HeadlessDevice};
use myth_render_core::renderer::core::{RenderOutcome, RenderStage};
use myth_render_core::renderer::graph::FrameDriver;
use myth_render_core::renderer::graph::passes::{
    CaptureError, CapturedFrame, DuplicationFactory, DuplicationSession,
};
use myth_render_core::renderer::pipeline::technique::{passes, slots};
use myth_render_core::renderer::settings::RenderCoreSettings;
use myth_render_core::resources::{FrameConstants, OitMode};
use myth_render_core::scene::{RenderLists, SceneNode, ShadowLight};

use common::*;

fn sun() -> Option<ShadowLight> {
    Some(ShadowLight::directional(Vec3::new(0.0, -1.0, -0.3), Vec3::ZERO, 10.0))
}

// ============================================================================
// Order & Report
// ============================================================================

#[test]
fn cores_run_in_fixed_order() {
    init_logger();
    let mut device = HeadlessDevice::new();
    let technique = full_technique(&mut device);
    let output = back_buffer(&mut device, 800, 600, 1);

    let floor = TestMesh::at(Vec3::ZERO);
    let glass = TestMesh::at(Vec3::new(0.0, 0.0, 1.0));
    let opaque: [&dyn SceneNode; 1] = [&floor];
    let transparent: [&dyn SceneNode; 1] = [&glass];

    let mut driver = FrameDriver::default().with_light_scanner(sun);
    driver.attach(&technique, &mut device).unwrap();

    let mut ctx = context(output, RenderLists::new(&opaque, &transparent));
    let first = driver.render_frame(&mut ctx, &mut device);
    assert!(first.needs_retry(), "working targets are allocated on the first frame");
    assert!(first.light_found);

    let mut ctx = context(output, RenderLists::new(&opaque, &transparent));
    let report = driver.render_frame(&mut ctx, &mut device);
    assert_eq!(report.frame_index, 1);
    assert!(!report.needs_retry());
    let names: Vec<&str> = report.outcomes.iter().map(|(name, _)| *name).collect();
    assert_eq!(names, vec!["ShadowMapCore", "SsaoCore", "WeightedOitCore"]);
    assert!(report.outcomes.iter().all(|(_, o)| o.is_rendered()));
    assert_eq!(report.opaque_drawn, 1);
    assert_eq!(report.failures().count(), 0);

    // Second frame of the floor: shadow, SSAO prepass, opaque.
    assert_eq!(
        floor.stages()[floor.stages().len() - 3..],
        [RenderStage::ShadowPass, RenderStage::Ssao, RenderStage::None]
    );
    assert_eq!(glass.draw_count(RenderStage::SinglePassWeightedOit), 1);
    assert_eq!(driver.frame_index(), 2);

    driver.detach(&mut device);
    assert_eq!(device.owned_texture_count(), 0);
    assert_eq!(device.live_buffer_count(), 0);
    assert_eq!(device.live_sampler_count(), 0);
    assert_no_violations(&device);
}

#[test]
fn render_before_attach_returns_empty_report() {
    let mut device = HeadlessDevice::new();
    let output = back_buffer(&mut device, 800, 600, 1);
    device.clear_commands();

    let mut driver = FrameDriver::default();
    let mut ctx = context(output, RenderLists::default());
    let report = driver.render_frame(&mut ctx, &mut device);
    assert!(report.outcomes.is_empty());
    assert!(device.commands().is_empty());
    assert_eq!(driver.frame_index(), 0);
}

// ============================================================================
// Shared Resources
// ============================================================================

#[test]
fn opaque_pass_reads_published_maps_then_unbinds_them() {
    let mut device = HeadlessDevice::new();
    let technique = full_technique(&mut device);
    let output = back_buffer(&mut device, 800, 600, 1);
    let floor = TestMesh::at(Vec3::ZERO);
    let opaque: [&dyn SceneNode; 1] = [&floor];

    let mut driver = FrameDriver::default().with_light_scanner(sun);
    driver.attach(&technique, &mut device).unwrap();

    let mut ctx = context(output, RenderLists::new(&opaque, &[]));
    driver.render_frame(&mut ctx, &mut device);
    device.clear_commands();
    let mut ctx = context(output, RenderLists::new(&opaque, &[]));
    driver.render_frame(&mut ctx, &mut device);

    let shadow_map = ctx.shared.shadow_map.unwrap().texture();
    let ssao_map = ctx.shared.ssao_map.unwrap().texture();
    assert_eq!(ctx.constants.has_shadow_map, 1);
    assert_eq!(ctx.constants.has_ssao_map, 1);

    let opaque_draw = device
        .draws()
        .find(|d| d.pass.and_then(|p| device.pass_name(p)) == Some(passes::OPAQUE))
        .expect("opaque draw");
    assert_eq!(opaque_draw.input(slots::DEFAULT_SHADOW_MAP), Some(shadow_map));
    assert_eq!(opaque_draw.input(slots::DEFAULT_SSAO_MAP), Some(ssao_map));
    assert_eq!(opaque_draw.targets, output.targets());

    let unbound = |slot| {
        device
            .commands()
            .iter()
            .any(|c| *c == DeviceCommand::BindTexture { slot, view: None })
    };
    assert!(unbound(slots::DEFAULT_SHADOW_MAP));
    assert!(unbound(slots::DEFAULT_SSAO_MAP));

    driver.detach(&mut device);
    assert_no_violations(&device);
}

#[test]
fn constants_are_uploaded_with_published_flags() {
    let mut device = HeadlessDevice::new();
    let technique = full_technique(&mut device);
    let output = back_buffer(&mut device, 800, 600, 1);
    let floor = TestMesh::at(Vec3::ZERO);
    let opaque: [&dyn SceneNode; 1] = [&floor];

    let mut driver = FrameDriver::default().with_light_scanner(sun);
    driver.attach(&technique, &mut device).unwrap();
    let mut ctx = context(output, RenderLists::new(&opaque, &[]));
    driver.render_frame(&mut ctx, &mut device);
    let mut ctx = context(output, RenderLists::new(&opaque, &[]));
    driver.render_frame(&mut ctx, &mut device);

    let buffer = ctx.constants_buffer.expect("driver constant buffer");
    let data = device.buffer_data(buffer).unwrap();
    let constants: FrameConstants = bytemuck::pod_read_unaligned(data);
    assert_eq!(constants.has_shadow_map, 1);
    assert_eq!(constants.has_ssao_map, 1);

    driver.detach(&mut device);
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn oit_mode_selects_one_core() {
    let mut device = HeadlessDevice::new();
    let technique = full_technique(&mut device);
    let output = back_buffer(&mut device, 320, 240, 1);
    let glass = TestMesh::at(Vec3::ZERO);
    let transparent: [&dyn SceneNode; 1] = [&glass];

    let mut driver = FrameDriver::default();
    driver.attach(&technique, &mut device).unwrap();
    driver.settings_mut().oit.mode = OitMode::DepthPeeling;
    driver.settings_mut().oit.peeling_iterations = 3;

    let mut ctx = context(output, RenderLists::new(&[], &transparent));
    driver.render_frame(&mut ctx, &mut device);
    let mut ctx = context(output, RenderLists::new(&[], &transparent));
    let report = driver.render_frame(&mut ctx, &mut device);

    assert!(report.outcome("WeightedOitCore").is_none());
    assert!(report.outcome("DepthPeelingOitCore").unwrap().is_rendered());
    assert_eq!(driver.depth_peeling().core().iteration_state().transparent_renders, 3);
    assert_eq!(glass.draw_count(RenderStage::SinglePassWeightedOit), 0);

    driver.detach(&mut device);
}

#[test]
fn depth_prepass_draws_opaque_depth_first() {
    let mut device = HeadlessDevice::new();
    let technique = full_technique(&mut device);
    let output = back_buffer(&mut device, 320, 240, 1);
    let floor = TestMesh::at(Vec3::ZERO);
    let opaque: [&dyn SceneNode; 1] = [&floor];

    let settings = RenderCoreSettings::from_json_str(r#"{ "depth_prepass": true }"#).unwrap();
    let mut driver = FrameDriver::new(settings);
    driver.attach(&technique, &mut device).unwrap();

    let mut ctx = context(output, RenderLists::new(&opaque, &[]));
    driver.render_frame(&mut ctx, &mut device);

    assert_eq!(floor.stages()[0], RenderStage::DepthPrepass);
    let prepass = device.draws().next().unwrap();
    assert_eq!(prepass.pass.and_then(|p| device.pass_name(p)), Some(passes::DEPTH_PREPASS));
    assert!(prepass.targets.colors.is_empty());
    assert_eq!(prepass.targets.depth, output.depth);

    driver.detach(&mut device);
}

#[test]
fn settings_changes_apply_next_frame() {
    let mut device = HeadlessDevice::new();
    let technique = full_technique(&mut device);
    let output = back_buffer(&mut device, 320, 240, 1);
    let mut driver = FrameDriver::default().with_light_scanner(sun);
    driver.attach(&technique, &mut device).unwrap();

    let mut ctx = context(output, RenderLists::default());
    driver.render_frame(&mut ctx, &mut device);

    driver.settings_mut().shadow.enabled = false;
    driver.settings_mut().ssao.enabled = false;
    let mut ctx = context(output, RenderLists::default());
    let report = driver.render_frame(&mut ctx, &mut device);

    assert!(matches!(report.outcome("ShadowMapCore"), Some(RenderOutcome::Skipped)));
    assert!(matches!(report.outcome("SsaoCore"), Some(RenderOutcome::Skipped)));
    assert!(ctx.shared.shadow_map.is_none());
    assert!(ctx.shared.ssao_map.is_none());
    assert!(!driver.shadow().core().settings().enabled);

    driver.detach(&mut device);
}

#[test]
fn missing_pass_detaches_only_that_core() {
    let mut device = HeadlessDevice::new();
    let technique = technique_without(&mut device, &[passes::SHADOW_DEPTH]);
    let output = back_buffer(&mut device, 320, 240, 1);

    let mut driver = FrameDriver::default().with_light_scanner(sun);
    driver.attach(&technique, &mut device).unwrap();
    assert!(!driver.shadow().is_attached());
    assert!(driver.ssao().is_attached());
    assert!(driver.weighted_oit().is_attached());

    let mut ctx = context(output, RenderLists::default());
    let report = driver.render_frame(&mut ctx, &mut device);
    assert!(matches!(report.outcome("ShadowMapCore"), Some(RenderOutcome::Skipped)));
    assert!(ctx.shared.shadow_map.is_none());

    driver.detach(&mut device);
}

// ============================================================================
// Screen Clone
// ============================================================================

struct DeniedFactory(Rc<RefCell<u32>>);

impl DuplicationFactory for DeniedFactory {
    fn create_session(&mut self, _output: u32) -> Result<Box<dyn DuplicationSession>, CaptureError> {
        *self.0.borrow_mut() += 1;
        Err(CaptureError::Denied)
    }
}

struct StaticSession;

impl DuplicationSession for StaticSession {
    fn output_size(&self) -> (u32, u32) {
        (64, 32)
    }

    fn acquire_frame(&mut self, _timeout_ms: u32) -> Result<CapturedFrame, CaptureError> {
        Ok(CapturedFrame {
            width: 64,
            height: 32,
            row_pitch: 256,
            pixels: vec![0; 256 * 32],
            dirty_rects: Default::default(),
            pointer: None,
        })
    }
}

struct StaticFactory;

impl DuplicationFactory for StaticFactory {
    fn create_session(&mut self, _output: u32) -> Result<Box<dyn DuplicationSession>, CaptureError> {
        Ok(Box::new(StaticSession))
    }
}

#[test]
fn screen_clone_runs_last() {
    let mut device = HeadlessDevice::new();
    let technique = full_technique(&mut device);
    let output = back_buffer(&mut device, 320, 240, 1);

    let mut driver = FrameDriver::default().with_screen_clone(Box::new(StaticFactory));
    assert!(driver.settings().screen_clone.is_some());
    driver.attach(&technique, &mut device).unwrap();

    let mut ctx = context(output, RenderLists::default());
    driver.render_frame(&mut ctx, &mut device);
    let mut ctx = context(output, RenderLists::default());
    let report = driver.render_frame(&mut ctx, &mut device);

    let (last, outcome) = report.outcomes.last().unwrap();
    assert_eq!(*last, "ScreenCloneCore");
    assert!(outcome.is_rendered());
    let quad = device.draws().last().unwrap();
    assert_eq!(quad.pass.and_then(|p| device.pass_name(p)), Some(passes::SCREEN_QUAD));

    driver.detach(&mut device);
    assert_eq!(device.owned_texture_count(), 0);
}

#[test]
fn denied_screen_clone_is_reported_once() {
    let creates = Rc::new(RefCell::new(0));
    let mut device = HeadlessDevice::new();
    let technique = full_technique(&mut device);
    let output = back_buffer(&mut device, 320, 240, 1);

    let mut driver = FrameDriver::default().with_screen_clone(Box::new(DeniedFactory(Rc::clone(&creates))));
    driver.attach(&technique, &mut device).unwrap();

    let mut ctx = context(output, RenderLists::default());
    let report = driver.render_frame(&mut ctx, &mut device);
    let failures: Vec<_> = report.failures().map(|(name, _)| name).collect();
    assert_eq!(failures, vec!["ScreenCloneCore"]);

    let mut ctx = context(output, RenderLists::default());
    let report = driver.render_frame(&mut ctx, &mut device);
    assert_eq!(report.failures().count(), 0);
    assert!(driver.screen_clone().unwrap().core().is_denied());
    assert_eq!(*creates.borrow(), 1);

    // Removing the settings disables the core.
    driver.settings_mut().screen_clone = None;
    let mut ctx = context(output, RenderLists::default());
    let report = driver.render_frame(&mut ctx, &mut device);
    assert!(report.outcome("ScreenCloneCore").is_none());

    driver.detach(&mut device);
}
