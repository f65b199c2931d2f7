//! Desktop Capture Seam
//!
//! The screen clone core never talks to an OS capture API directly. A
//! [`DuplicationFactory`] opens [`DuplicationSession`]s for an output, and a
//! session hands out CPU-visible frames with the regions that changed since
//! the previous frame.

use smallvec::SmallVec;
use thiserror::Error;

/// Failures reported by a capture backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// No new frame within the timeout. The previous frame is still valid.
    #[error("no new desktop frame within the timeout")]
    Timeout,
    /// The session lost access to the output (mode change, secure desktop,
    /// display switch). The session must be re-created.
    #[error("access to the captured output was lost")]
    AccessLost,
    /// The OS refused to create a duplication session.
    #[error("desktop duplication was denied")]
    Denied,
    #[error("{0}")]
    Other(String),
}

/// A changed region of the captured output, in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl DirtyRect {
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Clips the rectangle to a `width × height` surface; `None` if nothing remains.
    #[must_use]
    pub fn clipped(&self, width: u32, height: u32) -> Option<Self> {
        let x1 = (self.x.saturating_add(self.width)).min(width);
        let y1 = (self.y.saturating_add(self.height)).min(height);
        (self.x < x1 && self.y < y1).then(|| Self::new(self.x, self.y, x1 - self.x, y1 - self.y))
    }
}

/// Encoding of a pointer shape buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerShapeKind {
    /// 1 bpp AND mask followed by a 1 bpp XOR mask; `height` covers both.
    Monochrome,
    /// 32 bpp BGRA with straight alpha.
    Color,
    /// 32 bpp BGR with the top byte acting as an XOR mask flag.
    MaskedColor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerShape {
    pub kind: PointerShapeKind,
    pub width: u32,
    pub height: u32,
    /// Bytes per row of `data`.
    pub pitch: u32,
    pub hot_spot: (i32, i32),
    pub data: Vec<u8>,
}

/// Pointer state delivered with a frame. A new value replaces the previous
/// one completely; `shape` is `None` when the shape did not change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointerInfo {
    /// Top-left of the pointer image in source pixels.
    pub position: (i32, i32),
    pub visible: bool,
    pub shape: Option<PointerShape>,
}

/// A captured desktop frame in `Bgra8Unorm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    /// Bytes per row of `pixels`.
    pub row_pitch: u32,
    pub pixels: Vec<u8>,
    /// Regions changed since the previous frame. Empty means "everything".
    pub dirty_rects: SmallVec<[DirtyRect; 8]>,
    /// `None` when the pointer did not change.
    pub pointer: Option<PointerInfo>,
}

/// An open duplication of one output.
pub trait DuplicationSession {
    /// Size of the duplicated output in pixels.
    fn output_size(&self) -> (u32, u32);

    /// Waits up to `timeout_ms` for the next frame.
    fn acquire_frame(&mut self, timeout_ms: u32) -> Result<CapturedFrame, CaptureError>;

    /// Returns the frame acquired last to the capture backend.
    fn release_frame(&mut self) {}
}

/// Opens duplication sessions.
pub trait DuplicationFactory {
    fn create_session(&mut self, output: u32) -> Result<Box<dyn DuplicationSession>, CaptureError>;
}
