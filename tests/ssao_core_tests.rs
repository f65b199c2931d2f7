//! SSAO Core Tests
//!
//! Tests for:
//! - Working targets at half / full resolution and retry after allocation
//! - Pass order: depth-normal prepass, occlusion, horizontal and vertical blur
//! - Publishing the SSAO map
//! - Uniform upload only on change
//! - Kernel generation bounds

mod common;

use glam::Vec3;

use myth_render_core::renderer::backend::{DeviceCommand, GpuDevice, HeadlessDevice, TextureFormat};
use myth_render_core::renderer::core::{RenderOutcome, RenderStage};
use myth_render_core::renderer::graph::passes::SsaoCore;
use myth_render_core::resources::ssao::SSAO_KERNEL_SIZE;
use myth_render_core::resources::{SsaoQuality, SsaoSettings};
use myth_render_core::scene::{RenderLists, SceneNode};

use common::*;

// ============================================================================
// Targets
// ============================================================================

#[test]
fn first_frame_allocates_and_requests_retry() {
    init_logger();
    let mut device = HeadlessDevice::new();
    let technique = full_technique(&mut device);
    let output = back_buffer(&mut device, 800, 600, 1);
    let mut host = attached(SsaoCore::default(), &technique, &mut device);

    let mut ctx = context(output, RenderLists::default());
    begin_frame(&mut device, &output);
    assert!(host.render(&mut ctx, &mut device).needs_retry());
    assert!(ctx.shared.ssao_map.is_none());
    assert_eq!(device.draws().count(), 0);

    // Low quality works at half resolution.
    let sizes: Vec<(u32, u32, TextureFormat)> = device
        .commands()
        .iter()
        .filter_map(|c| match c {
            DeviceCommand::CreateTexture { desc, .. } if desc.label.starts_with("SSAO") && desc.width > 4 => {
                Some((desc.width, desc.height, desc.format))
            }
            _ => None,
        })
        .collect();
    assert_eq!(sizes.len(), 4);
    assert!(sizes.iter().all(|(w, h, _)| (*w, *h) == (400, 300)));
    assert!(sizes.contains(&(400, 300, TextureFormat::R8Unorm)));
    assert!(sizes.contains(&(400, 300, TextureFormat::Rgba16Float)));

    let mut ctx = context(output, RenderLists::default());
    assert!(host.render(&mut ctx, &mut device).is_rendered());

    host.detach(&mut device);
}

#[test]
fn quality_change_reallocates_at_full_resolution() {
    let mut device = HeadlessDevice::new();
    let technique = full_technique(&mut device);
    let output = back_buffer(&mut device, 800, 600, 1);
    let mut host = attached(SsaoCore::default(), &technique, &mut device);

    let mut ctx = context(output, RenderLists::default());
    host.render(&mut ctx, &mut device);
    host.render(&mut ctx, &mut device);

    host.core_mut().settings_mut().quality = SsaoQuality::High;
    assert!(host.render(&mut ctx, &mut device).needs_retry());
    assert!(host.render(&mut ctx, &mut device).is_rendered());

    let map = ctx.shared.ssao_map.unwrap();
    let desc = device.texture_desc(map.texture()).unwrap();
    assert_eq!((desc.width, desc.height), (800, 600));
    assert_eq!(desc.format, TextureFormat::R8Unorm);

    host.detach(&mut device);
    assert_no_violations(&device);
}

// ============================================================================
// Passes
// ============================================================================

#[test]
fn renders_prepass_occlusion_and_two_blurs() {
    let mut device = HeadlessDevice::new();
    let technique = full_technique(&mut device);
    let output = back_buffer(&mut device, 800, 600, 1);

    let a = TestMesh::at(Vec3::ZERO);
    let b = TestMesh::at(Vec3::new(1.0, 0.0, 0.0));
    let behind = TestMesh::at(Vec3::new(0.0, 0.0, 50.0));
    let opaque: [&dyn SceneNode; 3] = [&a, &b, &behind];
    let mut host = attached(SsaoCore::default(), &technique, &mut device);

    let mut ctx = context(output, RenderLists::new(&opaque, &[]));
    begin_frame(&mut device, &output);
    host.render(&mut ctx, &mut device);
    device.clear_commands();

    assert!(host.render(&mut ctx, &mut device).is_rendered());
    assert_eq!(a.draw_count(RenderStage::Ssao), 1);
    assert_eq!(b.draw_count(RenderStage::Ssao), 1);
    assert!(behind.stages().is_empty(), "nodes outside the camera frustum are culled");

    let order: Vec<&str> = device
        .draws()
        .filter_map(|d| d.pass.and_then(|p| device.pass_name(p)))
        .collect();
    assert_eq!(
        order,
        vec!["ssao_depth_normal", "ssao_depth_normal", "ssao", "ssao_blur_h", "ssao_blur_v"]
    );

    // The final blur writes the published map.
    let map = ctx.shared.ssao_map.unwrap();
    let last = device.draws().last().unwrap();
    assert!(last.targets.writes(map.texture()));
    assert_eq!(ctx.constants.has_ssao_map, 1);
    assert_eq!(ctx.stage, RenderStage::None);
    assert_eq!(device.render_targets(), output.targets());

    host.detach(&mut device);
    assert_no_violations(&device);
}

#[test]
fn uniforms_upload_only_when_changed() {
    let mut device = HeadlessDevice::new();
    let technique = full_technique(&mut device);
    let output = back_buffer(&mut device, 800, 600, 1);
    let mut host = attached(SsaoCore::default(), &technique, &mut device);

    let mut ctx = context(output, RenderLists::default());
    for _ in 0..4 {
        host.render(&mut ctx, &mut device);
    }
    assert_eq!(host.core().uniform_uploads(), 1);

    host.core_mut().settings_mut().radius = 1.5;
    host.render(&mut ctx, &mut device);
    assert_eq!(host.core().uniform_uploads(), 2);

    host.detach(&mut device);
}

#[test]
fn kernel_stays_inside_hemisphere_cone() {
    let mut device = HeadlessDevice::new();
    let technique = full_technique(&mut device);
    let output = back_buffer(&mut device, 64, 64, 1);
    let settings = SsaoSettings {
        max_sample_angle_deg: 60.0,
        ..SsaoSettings::default()
    };
    let mut host = attached(SsaoCore::new(settings), &technique, &mut device);

    let mut ctx = context(output, RenderLists::default());
    host.render(&mut ctx, &mut device);
    host.render(&mut ctx, &mut device);

    let kernel = host.core().kernel();
    assert_eq!(kernel.len(), SSAO_KERNEL_SIZE);
    let cos_limit = 60f32.to_radians().cos();
    for sample in kernel {
        let v = sample.truncate();
        assert!(v.z > 0.0);
        assert!(v.normalize().dot(Vec3::Z) >= cos_limit - EPSILON);
        assert!(v.length() <= 1.0 + EPSILON);
    }

    host.detach(&mut device);
}

#[test]
fn disabled_publishes_nothing() {
    let mut device = HeadlessDevice::new();
    let technique = full_technique(&mut device);
    let output = back_buffer(&mut device, 800, 600, 1);
    let settings = SsaoSettings {
        enabled: false,
        ..SsaoSettings::default()
    };
    let mut host = attached(SsaoCore::new(settings), &technique, &mut device);

    let mut ctx = context(output, RenderLists::default());
    assert!(matches!(host.render(&mut ctx, &mut device), RenderOutcome::Skipped));
    assert!(ctx.shared.ssao_map.is_none());
    assert_eq!(device.draws().count(), 0);

    host.detach(&mut device);
}

#[test]
fn disabling_releases_working_targets() {
    let mut device = HeadlessDevice::new();
    let technique = full_technique(&mut device);
    let output = back_buffer(&mut device, 800, 600, 1);
    let mut host = attached(SsaoCore::default(), &technique, &mut device);
    let baseline = device.owned_texture_count();

    let mut ctx = context(output, RenderLists::default());
    host.render(&mut ctx, &mut device);
    assert!(host.render(&mut ctx, &mut device).is_rendered());
    assert_eq!(device.owned_texture_count(), baseline + 4);

    host.core_mut().settings_mut().enabled = false;
    let mut ctx = context(output, RenderLists::default());
    assert!(matches!(host.render(&mut ctx, &mut device), RenderOutcome::Skipped));
    assert!(host.core().output().is_none());
    assert_eq!(device.owned_texture_count(), baseline);

    // Re-enabling allocates again before rendering.
    host.core_mut().settings_mut().enabled = true;
    assert!(host.render(&mut ctx, &mut device).needs_retry());
    assert!(host.render(&mut ctx, &mut device).is_rendered());

    host.detach(&mut device);
    assert_no_violations(&device);
}
