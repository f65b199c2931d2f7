//! Shader Pipelines
//!
//! - [`technique`]: the pass-name and slot-name seam between cores and shaders
//! - [`builtin`]: WGSL fullscreen passes shipped with the crate

pub mod builtin;
pub mod technique;

pub use builtin::register_fullscreen_passes;
pub use technique::{PassTable, Technique};
