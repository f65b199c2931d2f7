//! Render Core Resources
//!
//! Pure data definitions shared by the render cores. Nothing here touches
//! the device:
//!
//! - [`ShadowSettings`], [`SsaoSettings`], [`OitSettings`], [`ScreenCloneSettings`]:
//!   per-core configuration with their tuning defaults
//! - [`FrameConstants`]: per-frame constant data read by the opaque pass
//! - [`SsaoUniforms`], [`OitUniforms`]: GPU constant layouts of the cores
//! - [`BoundingBox`]: world-space bounds of scene nodes

pub mod geometry;
pub mod oit;
pub mod screen_clone;
pub mod shadow;
pub mod ssao;
pub mod uniforms;

pub use geometry::BoundingBox;
pub use oit::{OitMode, OitSettings, OitUniforms, WeightMode};
pub use screen_clone::ScreenCloneSettings;
pub use shadow::ShadowSettings;
pub use ssao::{SsaoQuality, SsaoSettings, SsaoUniforms};
pub use uniforms::FrameConstants;
