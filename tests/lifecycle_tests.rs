//! Core Lifecycle Tests
//!
//! Tests for:
//! - Rendering a detached core is a no-op
//! - Attach failures (missing pass, device failure) leave nothing allocated
//! - Detach releases every owned resource, including lazily created targets
//! - Re-attach after detach

mod common;

use glam::Vec3;

use myth_render_core::errors::{BackendError, RenderError};
use myth_render_core::renderer::backend::HeadlessDevice;
use myth_render_core::renderer::core::{CoreHost, CoreState, RenderOutcome};
use myth_render_core::renderer::graph::passes::{
    DepthPeelingOitCore, ShadowMapCore, SsaoCore, WeightedOitCore,
};
use myth_render_core::renderer::pipeline::technique::passes;
use myth_render_core::resources::{OitSettings, SsaoSettings};
use myth_render_core::scene::{RenderLists, SceneNode, ShadowLight};

use common::*;

// ============================================================================
// Detached
// ============================================================================

#[test]
fn render_before_attach_touches_nothing() {
    init_logger();
    let mut device = HeadlessDevice::new();
    let output = back_buffer(&mut device, 800, 600, 1);
    device.clear_commands();

    let mesh = TestMesh::at(Vec3::ZERO);
    let nodes: [&dyn SceneNode; 1] = [&mesh];
    let mut ctx = context(output, RenderLists::new(&nodes, &nodes));

    let mut ssao = CoreHost::new(SsaoCore::default());
    let mut oit = CoreHost::new(WeightedOitCore::default());
    let mut shadow = CoreHost::new(ShadowMapCore::default());
    shadow.core_mut().set_light(Some(ShadowLight::directional(Vec3::NEG_Y, Vec3::ZERO, 10.0)));

    assert!(matches!(ssao.render(&mut ctx, &mut device), RenderOutcome::Skipped));
    assert!(matches!(oit.render(&mut ctx, &mut device), RenderOutcome::Skipped));
    assert!(matches!(shadow.render(&mut ctx, &mut device), RenderOutcome::Skipped));

    assert!(device.commands().is_empty());
    assert!(mesh.stages().is_empty());
    assert!(ctx.shared.shadow_map.is_none());
}

// ============================================================================
// Attach Failures
// ============================================================================

#[test]
fn missing_pass_fails_attach_without_leaks() {
    let mut device = HeadlessDevice::new();
    let technique = technique_without(&mut device, &[passes::SSAO_BLUR_V]);

    let mut host = CoreHost::new(SsaoCore::default());
    let err = host.attach(&technique, &mut device).unwrap_err();
    assert!(matches!(
        err,
        RenderError::MissingShaderPass {
            core: "SsaoCore",
            pass: "ssao_blur_v"
        }
    ));
    assert_eq!(host.state(), CoreState::Detached);
    assert_eq!(device.owned_texture_count(), 0);
    assert_eq!(device.live_sampler_count(), 0);
    assert_eq!(device.live_buffer_count(), 0);
}

#[test]
fn device_failure_during_attach_is_reported() {
    let mut device = HeadlessDevice::new();
    let technique = full_technique(&mut device);
    device.fail_texture_creation(true);

    let mut host = CoreHost::new(SsaoCore::default());
    let err = host.attach(&technique, &mut device).unwrap_err();
    assert!(matches!(err, RenderError::Backend(BackendError::DeviceLost)));
    assert!(!host.is_attached());
    assert_eq!(device.live_sampler_count(), 0);
    assert_eq!(device.live_buffer_count(), 0);
}

// ============================================================================
// Detach
// ============================================================================

#[test]
fn detach_releases_lazily_created_targets() {
    init_logger();
    let mut device = HeadlessDevice::new();
    let technique = full_technique(&mut device);
    let output = back_buffer(&mut device, 640, 480, 1);

    let mesh = TestMesh::at(Vec3::ZERO);
    let glass = TestMesh::at(Vec3::new(0.0, 0.0, 1.0));
    let opaque: [&dyn SceneNode; 1] = [&mesh];
    let transparent: [&dyn SceneNode; 1] = [&glass];

    let mut shadow = attached(ShadowMapCore::default(), &technique, &mut device);
    let mut ssao = attached(SsaoCore::new(SsaoSettings::default()), &technique, &mut device);
    let mut oit = attached(WeightedOitCore::default(), &technique, &mut device);
    let mut peeling = attached(DepthPeelingOitCore::new(OitSettings::default()), &technique, &mut device);
    shadow.core_mut().set_light(Some(ShadowLight::directional(Vec3::NEG_Y, Vec3::ZERO, 10.0)));

    for _ in 0..3 {
        let mut ctx = context(output, RenderLists::new(&opaque, &transparent));
        begin_frame(&mut device, &output);
        shadow.render(&mut ctx, &mut device);
        ssao.render(&mut ctx, &mut device);
        oit.render(&mut ctx, &mut device);
        peeling.render(&mut ctx, &mut device);
    }
    assert!(device.owned_texture_count() > 0);

    shadow.detach(&mut device);
    ssao.detach(&mut device);
    oit.detach(&mut device);
    peeling.detach(&mut device);

    assert_eq!(device.owned_texture_count(), 0);
    assert_eq!(device.live_sampler_count(), 0);
    assert_eq!(device.live_buffer_count(), 0);
    let counters = device.counters();
    assert_eq!(counters.textures_created, counters.textures_destroyed);
    assert_no_violations(&device);
}

#[test]
fn detach_twice_is_harmless() {
    let mut device = HeadlessDevice::new();
    let technique = full_technique(&mut device);
    let mut host = attached(SsaoCore::default(), &technique, &mut device);

    host.detach(&mut device);
    host.detach(&mut device);
    assert_eq!(host.state(), CoreState::Detached);
    assert_no_violations(&device);
}

#[test]
fn reattach_after_detach_renders_again() {
    let mut device = HeadlessDevice::new();
    let technique = full_technique(&mut device);
    let output = back_buffer(&mut device, 320, 240, 1);
    let glass = TestMesh::at(Vec3::ZERO);
    let transparent: [&dyn SceneNode; 1] = [&glass];

    let mut host = attached(WeightedOitCore::default(), &technique, &mut device);
    host.detach(&mut device);
    host.attach(&technique, &mut device).unwrap();

    let mut ctx = context(output, RenderLists::new(&[], &transparent));
    begin_frame(&mut device, &output);
    assert!(host.render(&mut ctx, &mut device).needs_retry());
    assert!(host.render(&mut ctx, &mut device).is_rendered());

    host.detach(&mut device);
    assert_eq!(device.owned_texture_count(), 0);
    assert_no_violations(&device);
}
