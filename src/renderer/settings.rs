//! Render Core Settings
//!
//! [`RenderCoreSettings`] gathers the configuration of every core driven by
//! the [`FrameDriver`]. It is plain data: serializable, comparable, and
//! applied to the cores at the start of each frame, so changing a field takes
//! effect on the next rendered frame.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use myth_render_core::renderer::settings::RenderCoreSettings;
//! use myth_render_core::resources::{OitMode, SsaoQuality};
//!
//! let mut settings = RenderCoreSettings::default();
//! settings.ssao.quality = SsaoQuality::High;
//! settings.oit.mode = OitMode::DepthPeeling;
//!
//! // Or from a JSON file; missing fields keep their defaults.
//! let settings = RenderCoreSettings::from_json_str(r#"{ "shadow": { "width": 2048 } }"#)?;
//! ```
//!
//! [`FrameDriver`]: crate::renderer::graph::FrameDriver

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::resources::{OitSettings, ScreenCloneSettings, ShadowSettings, SsaoSettings};

/// Configuration of the whole render-core pipeline.
///
/// # Fields
///
/// | Field | Description | Default |
/// |-------|-------------|---------|
/// | `depth_prepass` | Depth-only pass of opaque nodes before shading | `false` |
/// | `shadow` | [`ShadowSettings`] | enabled, 1024², every frame |
/// | `ssao` | [`SsaoSettings`] | enabled, half resolution |
/// | `oit` | [`OitSettings`] | weighted blended |
/// | `screen_clone` | [`ScreenCloneSettings`], `None` disables the core | `None` |
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderCoreSettings {
    pub depth_prepass: bool,
    pub shadow: ShadowSettings,
    pub ssao: SsaoSettings,
    pub oit: OitSettings,
    pub screen_clone: Option<ScreenCloneSettings>,
}

impl RenderCoreSettings {
    /// Parses settings from JSON. Absent fields take their default values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Pretty-printed JSON of the settings.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
