//! Render Core Contract
//!
//! - [`RenderContext`]: per-frame state passed to every core
//! - [`SharedResourceSet`]: cross-core read channel within a frame
//! - [`RenderCore`] / [`CoreHost`]: attach / detach / render lifecycle
//! - [`RenderOutcome`]: result of a render call

pub mod context;
pub mod lifecycle;

pub use crate::renderer::graph::RenderStage;
pub use context::{OutputSurface, RenderContext, SharedResourceSet};
pub use lifecycle::{CoreHost, CoreState, RenderCore, RenderOutcome};
