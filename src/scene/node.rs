use crate::renderer::backend::GpuDevice;
use crate::renderer::core::RenderContext;
use crate::resources::geometry::BoundingBox;
use crate::scene::Frustum;

/// A drawable supplied by the scene graph.
///
/// Before calling [`SceneNode::render`] the core has bound the shader pass,
/// the targets and any shared inputs for the current [`RenderStage`]; the node
/// only binds its own geometry and issues draws.
///
/// [`RenderStage`]: crate::renderer::core::RenderStage
pub trait SceneNode {
    /// World-space bounds.
    fn bounds(&self) -> BoundingBox;

    fn casts_shadow(&self) -> bool {
        true
    }

    /// Frustum test used by passes that cull against a volume other than the
    /// camera (shadow, SSAO prepass).
    fn test_frustum(&self, frustum: &Frustum) -> bool {
        frustum.intersects_box(&self.bounds())
    }

    fn render(&self, ctx: &RenderContext<'_>, device: &mut dyn GpuDevice);
}

/// Per-frame node lists, already culled against the camera frustum.
#[derive(Clone, Copy, Default)]
pub struct RenderLists<'a> {
    pub opaque: &'a [&'a dyn SceneNode],
    pub transparent: &'a [&'a dyn SceneNode],
}

impl<'a> RenderLists<'a> {
    #[must_use]
    pub fn new(opaque: &'a [&'a dyn SceneNode], transparent: &'a [&'a dyn SceneNode]) -> Self {
        Self {
            opaque,
            transparent,
        }
    }
}
