//! Shadow Map Configuration

use serde::{Deserialize, Serialize};

/// Shadow map configuration.
///
/// # Example
///
/// ```rust,ignore
/// let mut shadow = ShadowSettings::default();
/// shadow.width = 2048;
/// shadow.height = 2048;
/// // Re-render the map every other frame
/// shadow.update_frequency = 2;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowSettings {
    /// When `false` the opaque pass runs without a shadow map.
    pub enabled: bool,
    /// Shadow map width in texels. A change reallocates the depth target.
    pub width: u32,
    /// Shadow map height in texels.
    pub height: u32,
    /// Darkening applied to shadowed fragments, 0–1.
    pub intensity: f32,
    /// Depth bias against shadow acne.
    pub bias: f32,
    /// Render the map on one of every N frames. 0 behaves like 1.
    pub update_frequency: u32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            width: 1024,
            height: 1024,
            intensity: 0.5,
            bias: 0.0015,
            update_frequency: 1,
        }
    }
}

impl ShadowSettings {
    /// Effective update period, never zero.
    #[inline]
    #[must_use]
    pub fn period(&self) -> u32 {
        self.update_frequency.max(1)
    }
}
