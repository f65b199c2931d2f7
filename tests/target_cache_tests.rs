//! Offscreen Target Cache Tests
//!
//! Tests for:
//! - Reallocation exactly when the (size, format, samples) key changes
//! - Zero-sized requests
//! - Allocation failure leaving the cache empty
//! - Release bookkeeping

mod common;

use myth_render_core::errors::BackendError;
use myth_render_core::renderer::backend::{GpuDevice, HeadlessDevice, SampleDesc, TextureFormat};
use myth_render_core::renderer::graph::{OffscreenTargetCache, TargetStatus};

use common::assert_no_violations;

// ============================================================================
// Key Checks
// ============================================================================

#[test]
fn same_key_returns_cached_target() {
    let mut device = HeadlessDevice::new();
    let mut cache = OffscreenTargetCache::new("Test Target");

    let first = cache
        .get_or_create(&mut device, 800, 600, TextureFormat::Rgba16Float, SampleDesc::SINGLE)
        .unwrap();
    assert!(first.is_created());

    let second = cache
        .get_or_create(&mut device, 800, 600, TextureFormat::Rgba16Float, SampleDesc::SINGLE)
        .unwrap();
    assert_eq!(second, TargetStatus::Cached(first.target().unwrap()));
    assert_eq!(cache.allocations(), 1);
    assert_eq!(device.owned_texture_count(), 1);
}

#[test]
fn any_key_change_reallocates() {
    let mut device = HeadlessDevice::new();
    let mut cache = OffscreenTargetCache::new("Test Target");

    let base = cache
        .get_or_create(&mut device, 800, 600, TextureFormat::Rgba16Float, SampleDesc::SINGLE)
        .unwrap()
        .target()
        .unwrap();

    let resized = cache
        .get_or_create(&mut device, 1024, 768, TextureFormat::Rgba16Float, SampleDesc::SINGLE)
        .unwrap();
    assert!(resized.is_created());
    assert!(device.texture_state(base.texture).is_none(), "old target must be destroyed");

    let reformatted = cache
        .get_or_create(&mut device, 1024, 768, TextureFormat::R8Unorm, SampleDesc::SINGLE)
        .unwrap();
    assert!(reformatted.is_created());

    let multisampled = cache
        .get_or_create(&mut device, 1024, 768, TextureFormat::R8Unorm, SampleDesc::new(4))
        .unwrap();
    assert!(multisampled.is_created());
    let key = multisampled.target().unwrap().key;
    assert_eq!((key.width, key.height, key.samples.count), (1024, 768, 4));

    assert_eq!(cache.allocations(), 4);
    assert_eq!(cache.releases(), 3);
    assert_eq!(device.owned_texture_count(), 1);
    assert_no_violations(&device);
}

#[test]
fn zero_size_releases_and_returns_empty() {
    let mut device = HeadlessDevice::new();
    let mut cache = OffscreenTargetCache::new("Test Target");
    cache
        .get_or_create(&mut device, 64, 64, TextureFormat::Rgba8Unorm, SampleDesc::SINGLE)
        .unwrap();

    let status = cache
        .get_or_create(&mut device, 0, 64, TextureFormat::Rgba8Unorm, SampleDesc::SINGLE)
        .unwrap();
    assert_eq!(status, TargetStatus::Empty);
    assert!(cache.current().is_none());
    assert_eq!(device.owned_texture_count(), 0);
}

// ============================================================================
// Failure & Release
// ============================================================================

#[test]
fn failed_allocation_leaves_cache_empty() {
    let mut device = HeadlessDevice::new();
    let mut cache = OffscreenTargetCache::new("Test Target");
    cache
        .get_or_create(&mut device, 64, 64, TextureFormat::Rgba8Unorm, SampleDesc::SINGLE)
        .unwrap();

    device.fail_texture_creation(true);
    let err = cache
        .get_or_create(&mut device, 128, 128, TextureFormat::Rgba8Unorm, SampleDesc::SINGLE)
        .unwrap_err();
    assert_eq!(err, BackendError::DeviceLost);
    assert!(cache.current().is_none());
    assert_eq!(device.owned_texture_count(), 0);

    device.fail_texture_creation(false);
    let status = cache
        .get_or_create(&mut device, 128, 128, TextureFormat::Rgba8Unorm, SampleDesc::SINGLE)
        .unwrap();
    assert!(status.is_created());
}

#[test]
fn release_is_idempotent() {
    let mut device = HeadlessDevice::new();
    let mut cache = OffscreenTargetCache::new("Test Target");
    cache
        .get_or_create(&mut device, 32, 32, TextureFormat::Rgba8Unorm, SampleDesc::SINGLE)
        .unwrap();

    cache.release(&mut device);
    cache.release(&mut device);
    assert_eq!(cache.releases(), 1);
    assert_eq!(device.counters().textures_destroyed, 1);
    assert_no_violations(&device);
}

#[test]
fn target_views_share_the_texture() {
    let mut device = HeadlessDevice::new();
    let mut cache = OffscreenTargetCache::new("Test Target");
    let target = cache
        .get_or_create(&mut device, 16, 16, TextureFormat::Depth32Float, SampleDesc::SINGLE)
        .unwrap()
        .target()
        .unwrap();
    assert_eq!(target.render_target().texture(), target.texture);
    assert_eq!(target.depth_stencil().texture(), target.texture);
    assert_eq!(target.shader_view().texture(), target.texture);
    assert_eq!(device.texture_desc(target.texture).unwrap().label, "Test Target");
}
