//! Render Cores
//!
//! Each core owns the device resources of one multi-pass technique:
//!
//! - [`ShadowMapCore`]: light-space depth map, published for the opaque pass
//! - [`SsaoCore`]: depth-normal prepass, ambient occlusion and separable blur
//! - [`WeightedOitCore`]: single-pass weighted blended transparency
//! - [`DepthPeelingOitCore`]: dual depth peeling transparency
//! - [`ScreenCloneCore`]: desktop capture presented as a quad

pub mod depth_peeling;
pub mod screen_clone;
pub mod shadow;
pub mod ssao;
pub mod weighted_oit;

pub use depth_peeling::{DepthPeelingOitCore, PeelLayer, PeelingIterationState};
pub use screen_clone::capture::{
    CaptureError, CapturedFrame, DirtyRect, DuplicationFactory, DuplicationSession, PointerInfo,
    PointerShape, PointerShapeKind,
};
pub use screen_clone::{CaptureStats, ScreenCloneCore};
pub use shadow::ShadowMapCore;
pub use ssao::SsaoCore;
pub use weighted_oit::{WeightedOitCore, resolve_pixel};
