//! Technique Seam
//!
//! A technique maps well-known pass names to compiled shader passes and
//! named bind slots to slot indices. Cores resolve everything they need once
//! in `on_attach` and keep the resulting handles; names are never looked up
//! per frame.
//!
//! ```rust,ignore
//! let technique = PassTable::new()
//!     .with_pass(passes::SHADOW_DEPTH, shadow_pass)
//!     .with_pass(passes::PEEL_LAYER, peel_pass)
//!     .with_slot(passes::PEEL_LAYER, slots::PREVIOUS_MIN_MAX, 7);
//! ```

use rustc_hash::FxHashMap;

use crate::errors::{RenderError, Result};
use crate::renderer::backend::ShaderPassHandle;

/// Well-known shader pass names.
pub mod passes {
    pub const DEPTH_PREPASS: &str = "depth_prepass";
    pub const OPAQUE: &str = "opaque";
    pub const SHADOW_DEPTH: &str = "shadow_depth";
    pub const SSAO_DEPTH_NORMAL: &str = "ssao_depth_normal";
    pub const SSAO: &str = "ssao";
    pub const SSAO_BLUR_H: &str = "ssao_blur_h";
    pub const SSAO_BLUR_V: &str = "ssao_blur_v";
    pub const OIT_ACCUMULATE: &str = "oit_accumulate";
    pub const OIT_COMPOSITE: &str = "oit_composite";
    pub const PEEL_INIT_MIN_MAX: &str = "peel_init_min_max";
    pub const PEEL_LAYER: &str = "peel_layer";
    pub const PEEL_FINAL: &str = "peel_final";
    pub const SCREEN_QUAD: &str = "screen_quad";
    pub const SCREEN_CURSOR: &str = "screen_cursor";
}

/// Well-known bind slot names and their default indices.
///
/// Texture, sampler and constant-buffer slots are separate namespaces.
pub mod slots {
    // Frame-level inputs of geometry passes.
    pub const FRAME_CONSTANTS: &str = "frame_constants";
    pub const SHADOW_MAP: &str = "shadow_map";
    pub const SSAO_MAP: &str = "ssao_map";
    pub const ENVIRONMENT_MAP: &str = "environment_map";
    pub const OIT_CONSTANTS: &str = "oit_constants";

    // Fullscreen pass inputs.
    pub const DEPTH_NORMAL: &str = "depth_normal";
    pub const NOISE: &str = "noise";
    pub const SSAO_CONSTANTS: &str = "ssao_constants";
    pub const SOURCE: &str = "source";
    pub const ACCUMULATION: &str = "accumulation";
    pub const REVEALAGE: &str = "revealage";
    pub const PREVIOUS_MIN_MAX: &str = "previous_min_max";
    pub const MIN_MAX: &str = "min_max";
    pub const FRONT: &str = "front";
    pub const BACK: &str = "back";
    pub const CAPTURE: &str = "capture";
    pub const CURSOR: &str = "cursor";
    pub const QUAD_CONSTANTS: &str = "quad_constants";

    pub const DEFAULT_FRAME_CONSTANTS: u32 = 0;
    pub const DEFAULT_OIT_CONSTANTS: u32 = 1;
    pub const DEFAULT_SHADOW_MAP: u32 = 8;
    pub const DEFAULT_SSAO_MAP: u32 = 9;
    pub const DEFAULT_ENVIRONMENT_MAP: u32 = 10;
    /// Slot of the previous min-max depth target while peeling.
    pub const DEFAULT_PREVIOUS_MIN_MAX: u32 = 100;
}

/// Source of shader passes and bind slots.
pub trait Technique {
    fn shader_pass(&self, name: &str) -> Option<ShaderPassHandle>;

    /// Slot index of `slot` in pass `pass`.
    fn slot(&self, pass: &str, slot: &str) -> Option<u32>;
}

/// Resolves a pass a core cannot work without.
pub fn require_pass(
    technique: &dyn Technique,
    core: &'static str,
    pass: &'static str,
) -> Result<ShaderPassHandle> {
    technique
        .shader_pass(pass)
        .ok_or(RenderError::MissingShaderPass { core, pass })
}

/// Resolves a slot, falling back to its documented default.
#[must_use]
pub fn slot_or(technique: &dyn Technique, pass: &str, slot: &str, default: u32) -> u32 {
    technique.slot(pass, slot).unwrap_or(default)
}

/// Builder-style [`Technique`] backed by hash maps.
#[derive(Debug, Clone, Default)]
pub struct PassTable {
    passes: FxHashMap<String, ShaderPassHandle>,
    slots: FxHashMap<(String, String), u32>,
}

impl PassTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_pass(mut self, name: &str, pass: ShaderPassHandle) -> Self {
        self.insert_pass(name, pass);
        self
    }

    #[must_use]
    pub fn with_slot(mut self, pass: &str, slot: &str, index: u32) -> Self {
        self.insert_slot(pass, slot, index);
        self
    }

    pub fn insert_pass(&mut self, name: &str, pass: ShaderPassHandle) {
        self.passes.insert(name.to_owned(), pass);
    }

    pub fn insert_slot(&mut self, pass: &str, slot: &str, index: u32) {
        self.slots.insert((pass.to_owned(), slot.to_owned()), index);
    }

    pub fn remove_pass(&mut self, name: &str) -> Option<ShaderPassHandle> {
        self.passes.remove(name)
    }

    /// Adds every pass and slot of `other`, replacing duplicates.
    pub fn merge(&mut self, other: Self) {
        self.passes.extend(other.passes);
        self.slots.extend(other.slots);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

impl Technique for PassTable {
    fn shader_pass(&self, name: &str) -> Option<ShaderPassHandle> {
        self.passes.get(name).copied()
    }

    fn slot(&self, pass: &str, slot: &str) -> Option<u32> {
        self.slots
            .get(&(pass.to_owned(), slot.to_owned()))
            .copied()
    }
}
