//! Rendering
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`backend`] | [`GpuDevice`](backend::GpuDevice) trait, wgpu and headless backends |
//! | [`core`] | Core lifecycle, per-frame context |
//! | [`graph`] | Offscreen targets, the render cores, the frame driver |
//! | [`pipeline`] | Technique seam, built-in shaders |
//! | [`settings`] | Serializable configuration of all cores |

pub mod backend;
pub mod core;
pub mod graph;
pub mod pipeline;
pub mod settings;

pub use graph::{FrameDriver, FrameReport};
pub use settings::RenderCoreSettings;
