//! Cursor Shapes and Quad Placement
//!
//! Pointer shapes arrive in one of three encodings and are converted to a
//! straight-alpha BGRA image before upload:
//!
//! | Encoding | AND/mask | XOR/color | Result |
//! |----------|----------|-----------|--------|
//! | Monochrome | 1 | 0 | transparent |
//! | Monochrome | 0 | 0 | opaque black |
//! | Monochrome | 0 | 1 | opaque white |
//! | Monochrome | 1 | 1 | opaque black (screen inversion is not reproduced) |
//! | MaskedColor | mask 0 | rgb | opaque rgb |
//! | MaskedColor | mask 1 | rgb = 0 | transparent |
//! | MaskedColor | mask 1 | rgb ≠ 0 | opaque rgb |
//! | Color | - | bgra | unchanged |

use bytemuck::{Pod, Zeroable};
use glam::Vec4;

use super::capture::{PointerShape, PointerShapeKind};

/// A pointer image ready for upload (`Bgra8Unorm`, tightly packed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

const OPAQUE_BLACK: [u8; 4] = [0, 0, 0, 255];
const OPAQUE_WHITE: [u8; 4] = [255, 255, 255, 255];
const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];

/// Converts a pointer shape to BGRA. Returns `None` for an empty or truncated buffer.
#[must_use]
pub fn convert_shape(shape: &PointerShape) -> Option<CursorImage> {
    match shape.kind {
        PointerShapeKind::Monochrome => convert_monochrome(shape),
        PointerShapeKind::Color | PointerShapeKind::MaskedColor => convert_color(shape),
    }
}

fn convert_monochrome(shape: &PointerShape) -> Option<CursorImage> {
    // The buffer stacks the AND mask on top of the XOR mask.
    let width = shape.width;
    let height = shape.height / 2;
    if width == 0 || height == 0 || shape.pitch * 8 < width {
        return None;
    }
    let pitch = shape.pitch as usize;
    if shape.data.len() < pitch * height as usize * 2 {
        return None;
    }

    let bit = |row: usize, x: u32| -> bool {
        let byte = shape.data[row * pitch + (x / 8) as usize];
        byte & (0x80 >> (x % 8)) != 0
    };

    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height as usize {
        for x in 0..width {
            let and = bit(y, x);
            let xor = bit(y + height as usize, x);
            let texel = match (and, xor) {
                (true, false) => TRANSPARENT,
                (false, false) | (true, true) => OPAQUE_BLACK,
                (false, true) => OPAQUE_WHITE,
            };
            pixels.extend_from_slice(&texel);
        }
    }
    Some(CursorImage { width, height, pixels })
}

fn convert_color(shape: &PointerShape) -> Option<CursorImage> {
    let (width, height) = (shape.width, shape.height);
    let pitch = shape.pitch as usize;
    let row_bytes = width as usize * 4;
    if width == 0 || height == 0 || pitch < row_bytes {
        return None;
    }
    if shape.data.len() < pitch * (height as usize - 1) + row_bytes {
        return None;
    }

    let masked = shape.kind == PointerShapeKind::MaskedColor;
    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for y in 0..height as usize {
        let row = &shape.data[y * pitch..y * pitch + row_bytes];
        if !masked {
            pixels.extend_from_slice(row);
            continue;
        }
        for texel in row.chunks_exact(4) {
            let [b, g, r, mask] = [texel[0], texel[1], texel[2], texel[3]];
            let alpha = if mask == 0 || (b | g | r) != 0 { 255 } else { 0 };
            pixels.extend_from_slice(&[b, g, r, alpha]);
        }
    }
    Some(CursorImage { width, height, pixels })
}

// ─── Quad Placement ───────────────────────────────────────────────────────────

/// A rectangle in target pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PixelRect {
    /// `(x0, y0, x1, y1)` in NDC with y up.
    #[must_use]
    pub fn to_ndc(&self, target_width: u32, target_height: u32) -> Vec4 {
        let (w, h) = (target_width.max(1) as f32, target_height.max(1) as f32);
        Vec4::new(
            self.x / w * 2.0 - 1.0,
            1.0 - self.y / h * 2.0,
            (self.x + self.width) / w * 2.0 - 1.0,
            1.0 - (self.y + self.height) / h * 2.0,
        )
    }
}

/// Places a `source` sized image into `target`, centered and letterboxed
/// unless `stretch` is set.
#[must_use]
pub fn fit_quad(source: (u32, u32), target: (u32, u32), stretch: bool) -> PixelRect {
    let (tw, th) = (target.0 as f32, target.1 as f32);
    if stretch || source.0 == 0 || source.1 == 0 {
        return PixelRect {
            x: 0.0,
            y: 0.0,
            width: tw,
            height: th,
        };
    }
    let scale = (tw / source.0 as f32).min(th / source.1 as f32);
    let (width, height) = (source.0 as f32 * scale, source.1 as f32 * scale);
    PixelRect {
        x: (tw - width) * 0.5,
        y: (th - height) * 0.5,
        width,
        height,
    }
}

/// The captured sub-rectangle `[x, y, width, height]`, clipped to the source.
/// Falls back to the whole source when the rectangle is empty after clipping.
#[must_use]
pub fn capture_rect(clone_rect: Option<[u32; 4]>, source: (u32, u32)) -> [u32; 4] {
    let full = [0, 0, source.0, source.1];
    let Some([x, y, w, h]) = clone_rect else {
        return full;
    };
    let x1 = x.saturating_add(w).min(source.0);
    let y1 = y.saturating_add(h).min(source.1);
    if x >= x1 || y >= y1 {
        return full;
    }
    [x, y, x1 - x, y1 - y]
}

/// Constant buffer of the screen quad and cursor passes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct QuadConstants {
    /// Destination `(x0, y0, x1, y1)` in NDC.
    pub rect: Vec4,
    /// Source `(u0, v0, u1, v1)`.
    pub uv_rect: Vec4,
}

impl QuadConstants {
    /// Constants drawing the `rect` region of a `source` sized capture into `placement`.
    #[must_use]
    pub fn capture(placement: PixelRect, target: (u32, u32), rect: [u32; 4], source: (u32, u32)) -> Self {
        let (sw, sh) = (source.0.max(1) as f32, source.1.max(1) as f32);
        Self {
            rect: placement.to_ndc(target.0, target.1),
            uv_rect: Vec4::new(
                rect[0] as f32 / sw,
                rect[1] as f32 / sh,
                (rect[0] + rect[2]) as f32 / sw,
                (rect[1] + rect[3]) as f32 / sh,
            ),
        }
    }

    /// Constants drawing a cursor whose top-left is at `position` (source
    /// pixels) over a capture of `rect` placed at `placement`.
    #[must_use]
    pub fn cursor(
        placement: PixelRect,
        target: (u32, u32),
        rect: [u32; 4],
        position: (i32, i32),
        cursor_size: (u32, u32),
    ) -> Self {
        let scale_x = placement.width / rect[2].max(1) as f32;
        let scale_y = placement.height / rect[3].max(1) as f32;
        let cursor = PixelRect {
            x: placement.x + (position.0 - rect[0] as i32) as f32 * scale_x,
            y: placement.y + (position.1 - rect[1] as i32) as f32 * scale_y,
            width: cursor_size.0 as f32 * scale_x,
            height: cursor_size.1 as f32 * scale_y,
        };
        Self {
            rect: cursor.to_ndc(target.0, target.1),
            uv_rect: Vec4::new(0.0, 0.0, 1.0, 1.0),
        }
    }
}
