//! # Myth Render Core
//!
//! Render-pipeline cores for a real-time 3D renderer: shadow maps, screen-space
//! ambient occlusion, weighted blended and depth-peeled order-independent
//! transparency, and a desktop-duplication screen clone. Each core allocates
//! its GPU resources on attach, renders through an explicit device handle,
//! and releases everything on detach. [`FrameDriver`] runs them in order.
//!
//! ```rust,ignore
//! use myth_render_core::prelude::*;
//!
//! let mut device = WgpuDevice::new_headless()?;
//! let mut technique = register_fullscreen_passes(&mut device);
//! technique.merge(my_geometry_passes(&mut device));
//!
//! let mut driver = FrameDriver::new(RenderCoreSettings::default());
//! driver.attach(&technique, &mut device)?;
//!
//! let lists = RenderLists::new(&opaque, &transparent);
//! let mut ctx = RenderContext::new(view, projection, output, lists);
//! let report = driver.render_frame(&mut ctx, &mut device);
//! if report.needs_retry() {
//!     request_redraw();
//! }
//! ```

pub mod errors;
pub mod renderer;
pub mod resources;
pub mod scene;

pub use errors::{RenderError, Result};
pub use renderer::{FrameDriver, FrameReport, RenderCoreSettings};

/// Commonly used types.
pub mod prelude {
    pub use crate::errors::{BackendError, RenderError, Result};
    pub use crate::renderer::backend::{GpuDevice, HeadlessDevice, WgpuDevice};
    pub use crate::renderer::core::{OutputSurface, RenderContext, RenderCore, RenderOutcome, RenderStage};
    pub use crate::renderer::graph::passes::{
        DepthPeelingOitCore, ScreenCloneCore, ShadowMapCore, SsaoCore, WeightedOitCore,
    };
    pub use crate::renderer::graph::{FrameDriver, FrameReport, OffscreenTargetCache};
    pub use crate::renderer::pipeline::{PassTable, Technique, register_fullscreen_passes};
    pub use crate::renderer::settings::RenderCoreSettings;
    pub use crate::resources::{OitMode, OitSettings, ShadowSettings, SsaoQuality, SsaoSettings};
    pub use crate::scene::{LightScanner, RenderLists, SceneNode, ShadowLight};
}
