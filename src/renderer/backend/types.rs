//! Common types shared between backends

use bitflags::bitflags;
use smallvec::SmallVec;

slotmap::new_key_type! {
    /// Handle to a device texture (render target, depth buffer or sampled image).
    pub struct TextureHandle;
    /// Handle to a device sampler.
    pub struct SamplerHandle;
    /// Handle to a device buffer (constants, vertices, indices).
    pub struct BufferHandle;
    /// Opaque handle to a compiled shader pass supplied by a technique.
    pub struct ShaderPassHandle;
}

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    R8Unorm,
    R16Float,
    R32Float,
    Rg16Float,
    Rg32Float,
    Rgba8Unorm,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Rgba32Float,
    Depth32Float,
    Depth24PlusStencil8,
}

impl TextureFormat {
    #[must_use]
    pub fn is_depth(&self) -> bool {
        matches!(self, Self::Depth32Float | Self::Depth24PlusStencil8)
    }

    #[must_use]
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::R16Float => 2,
            Self::R32Float
            | Self::Rg16Float
            | Self::Rgba8Unorm
            | Self::Bgra8Unorm
            | Self::Bgra8UnormSrgb
            | Self::Depth32Float
            | Self::Depth24PlusStencil8 => 4,
            Self::Rg32Float | Self::Rgba16Float => 8,
            Self::Rgba32Float => 16,
        }
    }
}

/// Multisample descriptor of a surface.
///
/// Two targets with different sample descriptors are never interchangeable,
/// so this is part of every offscreen target key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleDesc {
    pub count: u32,
    pub quality: u32,
}

impl SampleDesc {
    pub const SINGLE: Self = Self { count: 1, quality: 0 };

    #[must_use]
    pub const fn new(count: u32) -> Self {
        Self { count, quality: 0 }
    }

    #[inline]
    #[must_use]
    pub fn is_multisampled(&self) -> bool {
        self.count > 1
    }
}

impl Default for SampleDesc {
    fn default() -> Self {
        Self::SINGLE
    }
}

bitflags! {
    /// Texture usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const COPY_SRC = 1 << 0;
        const COPY_DST = 1 << 1;
        const TEXTURE_BINDING = 1 << 2;
        const RENDER_ATTACHMENT = 1 << 3;
    }
}

impl TextureUsage {
    /// Usage of a texture that is rendered into and sampled afterwards.
    pub const OFFSCREEN: Self = Self::RENDER_ATTACHMENT.union(Self::TEXTURE_BINDING);
    /// Usage of a texture filled from the CPU and sampled.
    pub const UPLOAD: Self = Self::COPY_DST.union(Self::TEXTURE_BINDING);
}

/// Description of a 2D texture allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub samples: SampleDesc,
    pub usage: TextureUsage,
}

/// A rectangular region of a texture, used for CPU uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Byte stride between rows of the source data.
    pub bytes_per_row: u32,
}

impl TextureRegion {
    /// A region covering a whole `width × height` texture.
    #[must_use]
    pub fn full(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
            bytes_per_row: width * format.bytes_per_pixel(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    ClampToEdge,
    Repeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Description of a sampler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerDesc {
    pub label: &'static str,
    pub address_mode: AddressMode,
    pub filter: FilterMode,
    /// Depth comparison sampler (shadow map lookups).
    pub comparison: bool,
}

impl SamplerDesc {
    #[must_use]
    pub const fn point_clamp(label: &'static str) -> Self {
        Self {
            label,
            address_mode: AddressMode::ClampToEdge,
            filter: FilterMode::Nearest,
            comparison: false,
        }
    }

    #[must_use]
    pub const fn linear_clamp(label: &'static str) -> Self {
        Self {
            label,
            address_mode: AddressMode::ClampToEdge,
            filter: FilterMode::Linear,
            comparison: false,
        }
    }

    #[must_use]
    pub const fn point_wrap(label: &'static str) -> Self {
        Self {
            label,
            address_mode: AddressMode::Repeat,
            filter: FilterMode::Nearest,
            comparison: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Uniform,
    Vertex,
    Index,
}

/// Description of a device buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    pub label: &'static str,
    pub size: u64,
    pub kind: BufferKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

// ─── Typed Views ──────────────────────────────────────────────────────────────

/// A texture viewed as a color draw destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetView(TextureHandle);

/// A texture viewed as a depth(-stencil) draw destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilView(TextureHandle);

/// A texture viewed as a read-only shader input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderResourceView(TextureHandle);

macro_rules! impl_view {
    ($name:ident) => {
        impl $name {
            #[inline]
            #[must_use]
            pub const fn new(texture: TextureHandle) -> Self {
                Self(texture)
            }

            /// The texture this view refers to.
            #[inline]
            #[must_use]
            pub const fn texture(&self) -> TextureHandle {
                self.0
            }
        }
    };
}

impl_view!(RenderTargetView);
impl_view!(DepthStencilView);
impl_view!(ShaderResourceView);

/// The color and depth destinations bound for subsequent draws.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderTargetSet {
    pub colors: SmallVec<[RenderTargetView; 4]>,
    pub depth: Option<DepthStencilView>,
}

impl RenderTargetSet {
    #[must_use]
    pub fn new(colors: &[RenderTargetView], depth: Option<DepthStencilView>) -> Self {
        Self {
            colors: SmallVec::from_slice(colors),
            depth,
        }
    }

    /// Returns `true` when `texture` is written by this target set.
    #[must_use]
    pub fn writes(&self, texture: TextureHandle) -> bool {
        self.colors.iter().any(|c| c.texture() == texture)
            || self.depth.is_some_and(|d| d.texture() == texture)
    }
}

/// Rasterizer viewport rectangle in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    #[must_use]
    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::from_size(1, 1)
    }
}
