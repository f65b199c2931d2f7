//! Render Stage Definitions
//!
//! `RenderStage` tells scene nodes which variant of their draw is being
//! requested. It is set on the [`RenderContext`] by whichever core is
//! currently issuing geometry.
//!
//! | Stage | Set by | Node output |
//! |-------|--------|-------------|
//! | `None` | Frame driver (opaque pass) | Shaded color |
//! | `DepthPrepass` | Frame driver | Depth only |
//! | `ShadowPass` | `ShadowMapCore` | Light-space depth |
//! | `Ssao` | `SsaoCore` | Depth + view normal |
//! | `SinglePassWeightedOit` | `WeightedOitCore` | Weighted accumulation |
//! | `DepthPeelingInitMinMaxZ` | `DepthPeelingOitCore` | Min/max depth seed |
//! | `DepthPeeling` | `DepthPeelingOitCore` | One peeled layer |
//!
//! [`RenderContext`]: crate::renderer::core::RenderContext

#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy, Default)]
#[repr(u32)]
pub enum RenderStage {
    #[default]
    None = 0,
    DepthPrepass = 1,
    ShadowPass = 2,
    Ssao = 3,
    SinglePassWeightedOit = 4,
    DepthPeeling = 5,
    DepthPeelingInitMinMaxZ = 6,
}

impl RenderStage {
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Returns the stage name for debugging.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::DepthPrepass => "DepthPrepass",
            Self::ShadowPass => "ShadowPass",
            Self::Ssao => "SSAO",
            Self::SinglePassWeightedOit => "SinglePassWeightedOIT",
            Self::DepthPeeling => "DepthPeeling",
            Self::DepthPeelingInitMinMaxZ => "DepthPeelingInitMinMaxZ",
        }
    }
}
