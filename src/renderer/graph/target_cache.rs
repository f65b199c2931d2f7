//! Offscreen Target Cache
//!
//! Lazily allocates a render target and keeps it until its key changes.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │               OffscreenTargetCache                    │
//! │                                                       │
//! │  entry: Option<OffscreenTarget>   (one live texture)  │
//! │                                                       │
//! │  get_or_create(w, h, fmt, samples)                    │
//! │     key unchanged     → Cached(entry)                 │
//! │     key changed       → release old, Created(new)     │
//! │     zero width/height → release old, Empty            │
//! │  release()            → destroy entry (on detach)     │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! Every core uses this for its working targets. A [`TargetStatus::Created`]
//! result means the texture content is undefined, which cores treat as
//! "skip this frame and clear before the next draw".

use crate::renderer::backend::{
    BackendResult, DepthStencilView, GpuDevice, RenderTargetView, SampleDesc,
    ShaderResourceView, TextureDesc, TextureFormat, TextureHandle, TextureUsage,
};

// ─── Public Types ─────────────────────────────────────────────────────────────

/// Identity of an offscreen target. Any difference forces reallocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetKey {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub samples: SampleDesc,
}

/// A live offscreen texture with its draw and sample views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffscreenTarget {
    pub texture: TextureHandle,
    pub key: TargetKey,
}

impl OffscreenTarget {
    #[inline]
    #[must_use]
    pub fn render_target(&self) -> RenderTargetView {
        RenderTargetView::new(self.texture)
    }

    #[inline]
    #[must_use]
    pub fn depth_stencil(&self) -> DepthStencilView {
        DepthStencilView::new(self.texture)
    }

    #[inline]
    #[must_use]
    pub fn shader_view(&self) -> ShaderResourceView {
        ShaderResourceView::new(self.texture)
    }
}

/// Result of [`OffscreenTargetCache::get_or_create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
    /// Zero-sized request; nothing is allocated.
    Empty,
    /// The existing target matches the key.
    Cached(OffscreenTarget),
    /// A new target was allocated; its content is undefined.
    Created(OffscreenTarget),
}

impl TargetStatus {
    #[must_use]
    pub fn target(&self) -> Option<OffscreenTarget> {
        match self {
            Self::Empty => None,
            Self::Cached(t) | Self::Created(t) => Some(*t),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

// ─── Cache ────────────────────────────────────────────────────────────────────

/// Single-entry, key-checked render target allocator.
#[derive(Debug)]
pub struct OffscreenTargetCache {
    label: &'static str,
    usage: TextureUsage,
    entry: Option<OffscreenTarget>,
    allocations: u32,
    releases: u32,
}

impl OffscreenTargetCache {
    /// A cache for textures that are rendered into and sampled.
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Self::with_usage(label, TextureUsage::OFFSCREEN)
    }

    #[must_use]
    pub fn with_usage(label: &'static str, usage: TextureUsage) -> Self {
        Self {
            label,
            usage,
            entry: None,
            allocations: 0,
            releases: 0,
        }
    }

    /// Returns the target for `key`, reallocating when the key changed.
    ///
    /// On allocation failure the previous target has already been released
    /// and the cache is empty.
    pub fn get_or_create(
        &mut self,
        device: &mut dyn GpuDevice,
        width: u32,
        height: u32,
        format: TextureFormat,
        samples: SampleDesc,
    ) -> BackendResult<TargetStatus> {
        let key = TargetKey {
            width,
            height,
            format,
            samples,
        };

        if let Some(entry) = self.entry
            && entry.key == key
        {
            return Ok(TargetStatus::Cached(entry));
        }

        self.release(device);

        if width == 0 || height == 0 {
            return Ok(TargetStatus::Empty);
        }

        let texture = device.create_texture(&TextureDesc {
            label: self.label,
            width,
            height,
            format,
            samples,
            usage: self.usage,
        })?;
        self.allocations += 1;
        log::debug!(
            "{}: allocated {width}x{height} {format:?} x{}",
            self.label,
            samples.count
        );

        let target = OffscreenTarget { texture, key };
        self.entry = Some(target);
        Ok(TargetStatus::Created(target))
    }

    /// Destroys the current target, if any.
    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        if let Some(entry) = self.entry.take() {
            device.destroy_texture(entry.texture);
            self.releases += 1;
        }
    }

    #[inline]
    #[must_use]
    pub fn current(&self) -> Option<OffscreenTarget> {
        self.entry
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Number of textures allocated over the cache lifetime.
    #[inline]
    #[must_use]
    pub fn allocations(&self) -> u32 {
        self.allocations
    }

    /// Number of textures released over the cache lifetime.
    #[inline]
    #[must_use]
    pub fn releases(&self) -> u32 {
        self.releases
    }
}
