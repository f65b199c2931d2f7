//! Order-Independent Transparency Configuration
//!
//! Two techniques are available:
//!
//! | Mode | Passes | Result |
//! |------|--------|--------|
//! | [`OitMode::Weighted`] | 1 geometry + 1 composite | Approximate, blend-weighted |
//! | [`OitMode::DepthPeeling`] | N geometry + 1 composite | Exact for the first N layers |
//!
//! # Weight Functions
//!
//! Weighted blending scales each fragment's contribution by a depth-dependent
//! weight so nearer surfaces dominate. `z` is the view-space distance and `d`
//! the window-space depth in `[0, 1]`:
//!
//! | Mode | Weight |
//! |------|--------|
//! | `Linear0` | `α · clamp(10 / (1e-5 + (z/5)² + (z/s)⁶), 1e-2, 3e3)` |
//! | `Linear1` | `α · clamp(10 / (1e-5 + (z/10)³ + (z/s)⁶), 1e-2, 3e3)` |
//! | `Linear2` | `α · clamp(0.03 / (1e-5 + (z/s)⁴), 1e-2, 3e3)` |
//! | `NonLinear` | `α · max(1e-2, 3e3 · (1 - d)^p)` |
//!
//! `s` is [`OitSettings::depth_scale`] and `p` is [`OitSettings::weight_power`].

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OitMode {
    #[default]
    Weighted,
    DepthPeeling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum WeightMode {
    #[default]
    Linear0 = 0,
    Linear1 = 1,
    Linear2 = 2,
    NonLinear = 3,
}

impl WeightMode {
    const MIN_WEIGHT: f32 = 1.0e-2;
    const MAX_WEIGHT: f32 = 3.0e3;

    /// Blend weight of a fragment with coverage `alpha`, view distance
    /// `view_z` and window depth `depth`.
    #[must_use]
    pub fn weight(self, alpha: f32, view_z: f32, depth: f32, power: f32, depth_scale: f32) -> f32 {
        let z = view_z.abs();
        let s = depth_scale.max(f32::EPSILON);
        let raw = match self {
            Self::Linear0 => 10.0 / (1.0e-5 + (z / 5.0).powi(2) + (z / s).powi(6)),
            Self::Linear1 => 10.0 / (1.0e-5 + (z / 10.0).powi(3) + (z / s).powi(6)),
            Self::Linear2 => 0.03 / (1.0e-5 + (z / s).powi(4)),
            Self::NonLinear => {
                return alpha * (Self::MAX_WEIGHT * (1.0 - depth.clamp(0.0, 1.0)).powf(power))
                    .max(Self::MIN_WEIGHT);
            }
        };
        alpha * raw.clamp(Self::MIN_WEIGHT, Self::MAX_WEIGHT)
    }
}

/// Transparency configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OitSettings {
    pub mode: OitMode,
    pub weight_mode: WeightMode,
    /// Exponent of the `NonLinear` weight.
    pub weight_power: f32,
    /// Distance scale of the linear weights.
    pub depth_scale: f32,
    /// Layers extracted by depth peeling. 0 behaves like 1.
    pub peeling_iterations: u32,
}

impl Default for OitSettings {
    fn default() -> Self {
        Self {
            mode: OitMode::Weighted,
            weight_mode: WeightMode::Linear0,
            weight_power: 3.0,
            depth_scale: 200.0,
            peeling_iterations: 4,
        }
    }
}

/// Constant buffer of the weighted accumulation pass.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct OitUniforms {
    pub weight_mode: u32,
    pub weight_power: f32,
    pub depth_scale: f32,
    pub _pad: f32,
}

impl From<&OitSettings> for OitUniforms {
    fn from(settings: &OitSettings) -> Self {
        Self {
            weight_mode: settings.weight_mode as u32,
            weight_power: settings.weight_power,
            depth_scale: settings.depth_scale,
            _pad: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearer_fragments_weigh_more() {
        for mode in [WeightMode::Linear0, WeightMode::Linear1, WeightMode::Linear2] {
            let near = mode.weight(0.5, 1.0, 0.1, 3.0, 200.0);
            let far = mode.weight(0.5, 150.0, 0.9, 3.0, 200.0);
            assert!(near > far, "{mode:?}: {near} <= {far}");
        }
        let near = WeightMode::NonLinear.weight(0.5, 1.0, 0.1, 3.0, 200.0);
        let far = WeightMode::NonLinear.weight(0.5, 1.0, 0.9, 3.0, 200.0);
        assert!(near > far);
    }

    #[test]
    fn test_weight_is_clamped() {
        let w = WeightMode::Linear0.weight(1.0, 0.0, 0.0, 3.0, 200.0);
        assert!((w - 3.0e3).abs() < 1e-3);
        let w = WeightMode::NonLinear.weight(1.0, 0.0, 1.0, 3.0, 200.0);
        assert!((w - 1.0e-2).abs() < 1e-6);
    }
}
