//! SSAO (Screen Space Ambient Occlusion) Configuration
//!
//! Settings, GPU constant layout and the CPU-side generation of the sample
//! kernel and rotation noise.
//!
//! # Algorithm
//!
//! 1. A depth + normal prepass of the opaque geometry into a working target
//!    sized by [`SsaoQuality`]
//! 2. A hemisphere sample kernel of [`SSAO_KERNEL_SIZE`] vectors, rejection
//!    sampled within [`SsaoSettings::max_sample_angle_deg`] of the normal axis
//!    and scaled to concentrate near the origin
//! 3. A 4×4 tiled rotation noise texture that randomizes the kernel orientation
//!    per pixel
//! 4. A separable blur (horizontal, then vertical) over the raw occlusion

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use serde::{Deserialize, Serialize};

/// Number of kernel samples uploaded to the SSAO pass.
pub const SSAO_KERNEL_SIZE: usize = 32;

/// Edge length of the tiled rotation noise texture.
pub const SSAO_NOISE_SIZE: u32 = 4;

const NOISE_SEED: u64 = 12345;

/// Working resolution of the SSAO targets relative to the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SsaoQuality {
    /// Half resolution.
    #[default]
    Low,
    /// Full resolution.
    High,
}

impl SsaoQuality {
    #[inline]
    #[must_use]
    pub fn scale(self) -> f32 {
        match self {
            Self::Low => 0.5,
            Self::High => 1.0,
        }
    }

    /// Working size for an output of `width × height`, at least 1×1.
    #[must_use]
    pub fn working_size(self, width: u32, height: u32) -> (u32, u32) {
        let scale = self.scale();
        (
            ((width as f32 * scale) as u32).max(1),
            ((height as f32 * scale) as u32).max(1),
        )
    }
}

/// SSAO configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsaoSettings {
    pub enabled: bool,
    /// Occlusion radius in view-space units.
    pub radius: f32,
    pub quality: SsaoQuality,
    /// Depth bias against self-occlusion.
    pub bias: f32,
    /// Exponent applied to the final occlusion.
    pub intensity: f32,
    /// Seed of the kernel generator.
    pub kernel_seed: u64,
    /// Largest accepted angle between a kernel sample and the normal axis.
    pub max_sample_angle_deg: f32,
}

impl Default for SsaoSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            radius: 0.5,
            quality: SsaoQuality::Low,
            bias: 0.025,
            intensity: 1.0,
            kernel_seed: 42,
            max_sample_angle_deg: 75.0,
        }
    }
}

// ============================================================================
// GPU Uniform Struct
// ============================================================================

/// Constant buffer of the SSAO pass.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SsaoUniforms {
    pub projection: Mat4,
    pub inverse_projection: Mat4,
    pub samples: [Vec4; SSAO_KERNEL_SIZE],
    pub radius: f32,
    pub bias: f32,
    pub intensity: f32,
    pub sample_count: u32,
    /// `working_size / SSAO_NOISE_SIZE`, tiles the noise over the target.
    pub noise_scale: [f32; 2],
    /// Texel size of the working target, used by the blur.
    pub texel_size: [f32; 2],
}

impl SsaoUniforms {
    #[must_use]
    pub fn new(settings: &SsaoSettings, kernel: &[Vec4], projection: Mat4, size: (u32, u32)) -> Self {
        let mut samples = [Vec4::ZERO; SSAO_KERNEL_SIZE];
        for (dst, src) in samples.iter_mut().zip(kernel) {
            *dst = *src;
        }
        let (width, height) = (size.0.max(1) as f32, size.1.max(1) as f32);
        Self {
            projection,
            inverse_projection: projection.inverse(),
            samples,
            radius: settings.radius.max(0.01),
            bias: settings.bias.max(0.0),
            intensity: settings.intensity.max(0.0),
            sample_count: kernel.len().min(SSAO_KERNEL_SIZE) as u32,
            noise_scale: [width / SSAO_NOISE_SIZE as f32, height / SSAO_NOISE_SIZE as f32],
            texel_size: [1.0 / width, 1.0 / height],
        }
    }
}

// ============================================================================
// Kernel & Noise Generation
// ============================================================================

/// Generates a hemisphere sample kernel around +Z.
///
/// Candidate directions further than `max_angle_deg` from +Z are rejected.
/// Accepted samples get a random length, then a quadratic scale from 0.1 to 1
/// over the kernel index so they cluster near the origin. The same seed
/// always yields the same kernel.
#[must_use]
pub fn generate_kernel(seed: u64, count: usize, max_angle_deg: f32) -> Vec<Vec4> {
    let cos_limit = max_angle_deg.clamp(1.0, 90.0).to_radians().cos();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut kernel = Vec::with_capacity(count);

    while kernel.len() < count {
        let candidate = Vec3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(0.0..1.0),
        );
        let Some(direction) = candidate.try_normalize() else {
            continue;
        };
        if direction.dot(Vec3::Z) < cos_limit {
            continue;
        }

        let length = rng.random_range(0.1..1.0f32);
        let t = kernel.len() as f32 / count as f32;
        let scale = lerp(0.1, 1.0, t * t);
        kernel.push((direction * length * scale).extend(0.0));
    }
    kernel
}

/// Generates the 4×4 rotation noise as RGBA8 texels.
///
/// Each texel stores a random unit rotation in XY, remapped to `[0, 255]`.
/// The texture is sampled with `Repeat` addressing and `Nearest` filtering.
#[must_use]
pub fn generate_noise() -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(NOISE_SEED);
    let texels = (SSAO_NOISE_SIZE * SSAO_NOISE_SIZE) as usize;
    let mut noise = Vec::with_capacity(texels * 4);
    while noise.len() < texels * 4 {
        let rotation = Vec3::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0), 0.0);
        let Some(xy) = rotation.try_normalize() else {
            continue;
        };
        noise.extend_from_slice(&[
            ((xy.x * 0.5 + 0.5) * 255.0) as u8,
            ((xy.y * 0.5 + 0.5) * 255.0) as u8,
            0,
            255,
        ]);
    }
    noise
}

fn lerp(a: f32, b: f32, f: f32) -> f32 {
    a + f * (b - a)
}
