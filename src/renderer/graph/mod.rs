//! Frame Organization
//!
//! - [`OffscreenTargetCache`]: lazily sized render targets shared by all cores
//! - [`passes`]: the render cores
//! - [`FrameDriver`]: fixed per-frame pass order
//! - [`RenderStage`]: stage tag published to shaders and nodes

pub mod frame;
pub mod passes;
pub mod stage;
pub mod target_cache;

pub use frame::{FrameDriver, FrameReport};
pub use stage::RenderStage;
pub use target_cache::{OffscreenTarget, OffscreenTargetCache, TargetKey, TargetStatus};
