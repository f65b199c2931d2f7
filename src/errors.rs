//! Error Types
//!
//! This module defines the error types used throughout the render core.
//!
//! # Overview
//!
//! The main error type [`RenderError`] covers the failure modes that a render
//! core can surface to the frame driver:
//! - Device failures (allocation, device loss) reported by the backend
//! - Missing shader passes at attach time
//! - Unrecoverable capture-session loss in the screen clone core
//! - Configuration parsing errors
//!
//! Transient conditions (resolution changed, capture timed out) are **not**
//! errors. They are reported as [`RenderOutcome::NeedsRetry`] so the driver
//! can request another frame.
//!
//! [`RenderOutcome::NeedsRetry`]: crate::renderer::core::RenderOutcome::NeedsRetry
//!
//! # Usage
//!
//! ```rust,ignore
//! use myth_render_core::errors::{RenderError, Result};
//!
//! fn load_settings(json: &str) -> Result<RenderCoreSettings> {
//!     RenderCoreSettings::from_json_str(json)
//! }
//! ```

use thiserror::Error;

pub use crate::renderer::backend::BackendError;

/// The main error type for the render core.
#[derive(Error, Debug)]
pub enum RenderError {
    // ========================================================================
    // Device Errors
    // ========================================================================
    /// A device-level operation failed.
    #[error("Device error: {0}")]
    Backend(#[from] BackendError),

    // ========================================================================
    // Technique Errors
    // ========================================================================
    /// A shader pass required by a core is not provided by the technique.
    #[error("{core}: required shader pass '{pass}' is missing from the technique")]
    MissingShaderPass {
        /// Name of the core that requested the pass
        core: &'static str,
        /// Name of the missing pass
        pass: &'static str,
    },

    // ========================================================================
    // Capture Errors
    // ========================================================================
    /// The desktop duplication session lost access to the output.
    ///
    /// The session has been torn down; the next render re-creates it.
    #[error("Capture access lost; duplication session must be re-created")]
    CaptureAccessLost,

    /// Creating the duplication session was denied.
    ///
    /// The screen clone core stays inactive until a new session is requested.
    #[error("Capture denied while creating the duplication session")]
    CaptureDenied,

    /// Any other capture failure reported by the capture backend.
    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Settings JSON could not be parsed.
    #[error("Settings parse error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Alias for `Result<T, RenderError>`.
pub type Result<T> = std::result::Result<T, RenderError>;
