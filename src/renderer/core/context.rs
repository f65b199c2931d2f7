//! Per-Frame Render Context
//!
//! [`RenderContext`] carries the read-mostly state of one frame: camera
//! matrices, viewport, the active culling frustum, the current stage, the
//! output surface and the node lists. Cores mutate it only to publish results
//! ([`SharedResourceSet`], [`FrameConstants`]) and to swap the stage or the
//! culling frustum for the duration of a pass.

use glam::{Mat4, Vec4};

use crate::renderer::backend::{
    BufferHandle, DepthStencilView, RenderTargetSet, RenderTargetView, SampleDesc, ShaderResourceView,
    TextureFormat, TextureHandle, Viewport,
};
use crate::renderer::graph::RenderStage;
use crate::resources::FrameConstants;
use crate::scene::{Frustum, RenderLists};

/// Results published by cores for later passes of the same frame.
///
/// Each field has a single writer:
///
/// | Field | Writer | Readers |
/// |-------|--------|---------|
/// | `shadow_map` | `ShadowMapCore` | Opaque pass |
/// | `ssao_map` | `SsaoCore` | Opaque pass |
/// | `environment_map` | Application | Opaque / transparent passes |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SharedResourceSet {
    pub shadow_map: Option<ShaderResourceView>,
    pub ssao_map: Option<ShaderResourceView>,
    pub environment_map: Option<ShaderResourceView>,
}

/// The real render target of the frame (usually the swap-chain back buffer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSurface {
    pub color: RenderTargetView,
    pub depth: Option<DepthStencilView>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub samples: SampleDesc,
}

impl OutputSurface {
    /// Targets binding the output color and depth.
    #[must_use]
    pub fn targets(&self) -> RenderTargetSet {
        RenderTargetSet::new(&[self.color], self.depth)
    }

    #[inline]
    #[must_use]
    pub fn color_texture(&self) -> TextureHandle {
        self.color.texture()
    }

    #[must_use]
    pub fn viewport(&self) -> Viewport {
        Viewport::from_size(self.width, self.height)
    }
}

/// Per-frame state handed to every core.
pub struct RenderContext<'a> {
    pub view: Mat4,
    pub projection: Mat4,
    pub viewport: Viewport,
    /// Culling volume of the current pass. Cores rendering from another
    /// point of view swap it and restore it before returning.
    pub frustum: Frustum,
    pub stage: RenderStage,
    pub shared: SharedResourceSet,
    pub constants: FrameConstants,
    /// Device buffer holding `constants`, uploaded by the frame driver.
    /// Cores drawing camera-view geometry bind it at the frame constants slot.
    pub constants_buffer: Option<BufferHandle>,
    pub output: OutputSurface,
    pub lists: RenderLists<'a>,
    pub frame_index: u64,
}

impl<'a> RenderContext<'a> {
    #[must_use]
    pub fn new(view: Mat4, projection: Mat4, output: OutputSurface, lists: RenderLists<'a>) -> Self {
        let viewport = output.viewport();
        let view_projection = projection * view;
        Self {
            view,
            projection,
            viewport,
            frustum: Frustum::from_matrix(view_projection),
            stage: RenderStage::None,
            shared: SharedResourceSet::default(),
            constants: FrameConstants {
                view,
                projection,
                view_projection,
                viewport: Vec4::new(viewport.x, viewport.y, viewport.width, viewport.height),
                ..FrameConstants::default()
            },
            constants_buffer: None,
            output,
            lists,
            frame_index: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Culling volume of the camera, independent of any swapped frustum.
    #[must_use]
    pub fn camera_frustum(&self) -> Frustum {
        Frustum::from_matrix(self.view_projection())
    }

    /// Sets the stage and mirrors it into the frame constants.
    pub fn set_stage(&mut self, stage: RenderStage) {
        self.stage = stage;
        self.constants.stage = stage.as_u32();
    }
}
