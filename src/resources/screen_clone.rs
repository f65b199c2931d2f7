//! Screen Clone Configuration

use serde::{Deserialize, Serialize};

/// Desktop capture and presentation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenCloneSettings {
    /// Index of the captured output (monitor).
    pub output: u32,
    /// Time to wait for a new desktop frame before reusing the last one.
    pub capture_timeout_ms: u32,
    /// Captured sub-rectangle `[x, y, width, height]`; whole output when `None`.
    pub clone_rect: Option<[u32; 4]>,
    /// Stretch the capture over the whole target instead of letterboxing.
    pub stretch_to_fill: bool,
    pub show_cursor: bool,
}

impl Default for ScreenCloneSettings {
    fn default() -> Self {
        Self {
            output: 0,
            capture_timeout_ms: 50,
            clone_rect: None,
            stretch_to_fill: false,
            show_cursor: true,
        }
    }
}
