//! Render Core Lifecycle
//!
//! Every render core follows the same three-state contract:
//!
//! ```text
//!              attach() Ok                render()
//!  Detached ───────────────► Attached ─────────────► Rendering
//!     ▲                        │  ▲                      │
//!     │        detach()        │  └──────────────────────┘
//!     └────────────────────────┘        outcome
//! ```
//!
//! - **Detached**: the core owns no device resources. `render` is a no-op
//!   returning [`RenderOutcome::Skipped`] and never touches the device.
//! - **Attached**: resources created in `on_attach` (and lazily in
//!   `on_render`) are owned by the core.
//! - **Rendering**: inside `on_render`.
//!
//! A failed attach releases whatever the core allocated before failing and
//! leaves it detached until the next successful attach. `detach` releases
//! every owned resource regardless of resolution or error state.
//!
//! [`CoreHost`] enforces these rules so individual cores only implement the
//! `on_*` hooks.

use crate::errors::{RenderError, Result};
use crate::renderer::backend::GpuDevice;
use crate::renderer::core::RenderContext;
use crate::renderer::pipeline::Technique;

/// Result of one `render` call.
#[derive(Debug)]
pub enum RenderOutcome {
    /// The core drew this frame.
    Rendered,
    /// Nothing to do this frame (disabled, detached, off-frame, no input).
    Skipped,
    /// Targets were (re)allocated or input is not ready; request another frame.
    NeedsRetry,
    /// The core cannot produce a valid frame.
    Failed(RenderError),
}

impl RenderOutcome {
    #[inline]
    #[must_use]
    pub fn needs_retry(&self) -> bool {
        matches!(self, Self::NeedsRetry)
    }

    #[inline]
    #[must_use]
    pub fn is_rendered(&self) -> bool {
        matches!(self, Self::Rendered)
    }

    #[inline]
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// A unit of GPU work driven by the frame driver.
pub trait RenderCore {
    fn name(&self) -> &'static str;

    /// Resolves shader passes and slots and creates persistent resources.
    ///
    /// Returns [`RenderError::MissingShaderPass`] when the technique lacks a
    /// required pass.
    fn on_attach(&mut self, technique: &dyn Technique, device: &mut dyn GpuDevice) -> Result<()>;

    /// Releases every device resource the core owns. Must be safe to call on
    /// a partially attached core.
    fn on_detach(&mut self, device: &mut dyn GpuDevice);

    fn on_render(&mut self, ctx: &mut RenderContext<'_>, device: &mut dyn GpuDevice)
    -> RenderOutcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreState {
    Detached,
    Attached,
    Rendering,
}

/// Owns a core and enforces its lifecycle.
pub struct CoreHost<C: RenderCore> {
    core: C,
    state: CoreState,
}

impl<C: RenderCore> CoreHost<C> {
    #[must_use]
    pub fn new(core: C) -> Self {
        Self {
            core,
            state: CoreState::Detached,
        }
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> CoreState {
        self.state
    }

    #[inline]
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.state == CoreState::Attached
    }

    #[inline]
    #[must_use]
    pub fn core(&self) -> &C {
        &self.core
    }

    /// Mutable access for configuration. Resource fields stay owned by the core.
    #[inline]
    pub fn core_mut(&mut self) -> &mut C {
        &mut self.core
    }

    /// Attaches the core to `technique`, detaching it first if needed.
    pub fn attach(&mut self, technique: &dyn Technique, device: &mut dyn GpuDevice) -> Result<()> {
        if self.state != CoreState::Detached {
            self.detach(device);
        }

        match self.core.on_attach(technique, device) {
            Ok(()) => {
                log::debug!("{}: attached", self.core.name());
                self.state = CoreState::Attached;
                Ok(())
            }
            Err(e) => {
                log::error!("{}: attach failed: {e}", self.core.name());
                self.core.on_detach(device);
                self.state = CoreState::Detached;
                Err(e)
            }
        }
    }

    /// Releases every device resource of the core.
    pub fn detach(&mut self, device: &mut dyn GpuDevice) {
        if self.state == CoreState::Detached {
            return;
        }
        self.core.on_detach(device);
        self.state = CoreState::Detached;
        log::debug!("{}: detached", self.core.name());
    }

    /// Renders the core, or returns [`RenderOutcome::Skipped`] without
    /// touching the device when it is not attached.
    pub fn render(&mut self, ctx: &mut RenderContext<'_>, device: &mut dyn GpuDevice) -> RenderOutcome {
        if self.state != CoreState::Attached {
            log::debug!("{}: render while detached skipped", self.core.name());
            return RenderOutcome::Skipped;
        }

        self.state = CoreState::Rendering;
        let outcome = self.core.on_render(ctx, device);
        self.state = CoreState::Attached;

        match &outcome {
            RenderOutcome::NeedsRetry => log::debug!("{}: frame skipped, retry requested", self.core.name()),
            RenderOutcome::Failed(e) => log::error!("{}: {e}", self.core.name()),
            RenderOutcome::Rendered | RenderOutcome::Skipped => {}
        }
        outcome
    }
}

impl<C: RenderCore> Drop for CoreHost<C> {
    fn drop(&mut self) {
        if self.state != CoreState::Detached {
            log::warn!(
                "{}: dropped while attached; device resources were not released",
                self.core.name()
            );
        }
    }
}
