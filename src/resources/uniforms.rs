//! Per-Frame Constants
//!
//! [`FrameConstants`] is the constant buffer shared by every geometry pass of
//! a frame. Cores publish into it (shadow map availability, SSAO availability,
//! light matrices) and the frame driver uploads it before the opaque pass.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameConstants {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    /// World to light clip space; identity when no shadow map is published.
    pub light_view_projection: Mat4,
    /// `(x, y, width, height)` of the output viewport.
    pub viewport: Vec4,
    /// `(intensity, bias, 1 / width, 1 / height)` of the shadow map.
    pub shadow_params: Vec4,
    /// 1 when a shadow map is bound for this frame, 0 otherwise.
    pub has_shadow_map: u32,
    /// 1 when an SSAO map is bound for this frame, 0 otherwise.
    pub has_ssao_map: u32,
    /// [`RenderStage`](crate::renderer::core::RenderStage) as `u32`.
    pub stage: u32,
    pub _pad: u32,
}

impl Default for FrameConstants {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            view_projection: Mat4::IDENTITY,
            light_view_projection: Mat4::IDENTITY,
            viewport: Vec4::ZERO,
            shadow_params: Vec4::ZERO,
            has_shadow_map: 0,
            has_ssao_map: 0,
            stage: 0,
            _pad: 0,
        }
    }
}
