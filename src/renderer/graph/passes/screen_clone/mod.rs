//! Screen Clone Core
//!
//! Presents a captured desktop output (optionally a sub-rectangle of it) as a
//! textured quad in the output, with the pointer composited on top.
//!
//! # Session State Machine
//!
//! ```text
//!            create ok
//!   Idle ───────────────► Active ──── AccessLost ───► Idle  (Failed, target released)
//!    │  ▲                   │  │
//!    │  └── reset_session ──┘  └──── Timeout ───────► Active (last frame, NeedsRetry)
//!    │
//!    └── create denied ──► Denied ── (Skipped every frame) ── reset_session ──► Idle
//! ```
//!
//! The capture texture follows the source output size. A freshly allocated
//! texture is filled completely from the next frame; afterwards only the
//! dirty rectangles of each frame are uploaded.

pub mod capture;
pub mod cursor;

use crate::errors::{RenderError, Result};
use crate::renderer::backend::{
    BufferDesc, BufferHandle, BufferKind, GpuDevice, SampleDesc, SamplerDesc, SamplerHandle,
    ShaderPassHandle, TextureFormat, TextureRegion, TextureUsage,
};
use crate::renderer::core::{RenderContext, RenderCore, RenderOutcome};
use crate::renderer::graph::target_cache::{OffscreenTarget, OffscreenTargetCache, TargetStatus};
use crate::renderer::pipeline::technique::{passes, require_pass, slot_or, slots};
use crate::renderer::pipeline::Technique;
use crate::resources::ScreenCloneSettings;

use capture::{CaptureError, CapturedFrame, DuplicationFactory, DuplicationSession, PointerInfo};
use cursor::{capture_rect, convert_shape, fit_quad, CursorImage, QuadConstants};

const CORE_NAME: &str = "ScreenCloneCore";

pub const CAPTURE_FORMAT: TextureFormat = TextureFormat::Bgra8Unorm;

/// Vertices of the two-triangle quad drawn by the quad and cursor passes.
const QUAD_VERTICES: std::ops::Range<u32> = 0..6;

enum SessionState {
    Idle,
    Active(Box<dyn DuplicationSession>),
    Denied,
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Active(_) => "Active",
            Self::Denied => "Denied",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CloneSlots {
    quad_constants: u32,
    capture: u32,
    cursor: u32,
    sampler: u32,
}

#[derive(Debug, Clone, Copy)]
struct ClonePasses {
    quad: ShaderPassHandle,
    cursor: ShaderPassHandle,
}

/// Per-frame statistics of the capture upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames_acquired: u64,
    pub timeouts: u64,
    pub full_uploads: u64,
    pub dirty_rect_uploads: u64,
    pub sessions_created: u32,
}

pub struct ScreenCloneCore {
    settings: ScreenCloneSettings,
    factory: Box<dyn DuplicationFactory>,
    session: SessionState,

    capture: OffscreenTargetCache,
    cursor: OffscreenTargetCache,

    passes: Option<ClonePasses>,
    slots: Option<CloneSlots>,
    sampler: Option<SamplerHandle>,
    quad_buffer: Option<BufferHandle>,
    cursor_buffer: Option<BufferHandle>,

    needs_full_upload: bool,
    has_frame: bool,
    pointer: PointerInfo,
    cursor_image: Option<CursorImage>,
    cursor_dirty: bool,
    uploaded_quad: Option<QuadConstants>,
    uploaded_cursor: Option<QuadConstants>,
    stats: CaptureStats,
}

impl ScreenCloneCore {
    #[must_use]
    pub fn new(settings: ScreenCloneSettings, factory: Box<dyn DuplicationFactory>) -> Self {
        Self {
            settings,
            factory,
            session: SessionState::Idle,
            capture: OffscreenTargetCache::with_usage("Screen Capture", TextureUsage::UPLOAD),
            cursor: OffscreenTargetCache::with_usage("Screen Cursor", TextureUsage::UPLOAD),
            passes: None,
            slots: None,
            sampler: None,
            quad_buffer: None,
            cursor_buffer: None,
            needs_full_upload: true,
            has_frame: false,
            pointer: PointerInfo::default(),
            cursor_image: None,
            cursor_dirty: false,
            uploaded_quad: None,
            uploaded_cursor: None,
            stats: CaptureStats::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &ScreenCloneSettings {
        &self.settings
    }

    /// Mutable settings. Changing `output` takes effect after [`Self::reset_session`].
    #[inline]
    pub fn settings_mut(&mut self) -> &mut ScreenCloneSettings {
        &mut self.settings
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    #[must_use]
    pub fn session_state(&self) -> &'static str {
        self.session.name()
    }

    #[inline]
    #[must_use]
    pub fn is_denied(&self) -> bool {
        matches!(self.session, SessionState::Denied)
    }

    #[inline]
    #[must_use]
    pub fn pointer(&self) -> &PointerInfo {
        &self.pointer
    }

    #[inline]
    #[must_use]
    pub fn capture_target(&self) -> Option<OffscreenTarget> {
        self.capture.current()
    }

    #[inline]
    #[must_use]
    pub fn cursor_target(&self) -> Option<OffscreenTarget> {
        self.cursor.current()
    }

    /// Drops the current session (or the denied state); the next render
    /// opens a new one.
    pub fn reset_session(&mut self) {
        self.session = SessionState::Idle;
        self.has_frame = false;
        self.needs_full_upload = true;
    }

    fn teardown_session(&mut self, device: &mut dyn GpuDevice) {
        self.session = SessionState::Idle;
        self.capture.release(device);
        self.has_frame = false;
        self.needs_full_upload = true;
    }

    fn open_session(&mut self) -> std::result::Result<(), RenderOutcome> {
        if !matches!(self.session, SessionState::Idle) {
            return Ok(());
        }
        match self.factory.create_session(self.settings.output) {
            Ok(session) => {
                log::info!(
                    "{CORE_NAME}: duplicating output {} ({}x{})",
                    self.settings.output,
                    session.output_size().0,
                    session.output_size().1
                );
                self.session = SessionState::Active(session);
                self.stats.sessions_created += 1;
                self.has_frame = false;
                self.needs_full_upload = true;
                Ok(())
            }
            Err(CaptureError::Denied) => {
                log::error!("{CORE_NAME}: duplication denied for output {}", self.settings.output);
                self.session = SessionState::Denied;
                Err(RenderOutcome::Failed(RenderError::CaptureDenied))
            }
            Err(e) => {
                log::warn!("{CORE_NAME}: could not open duplication session ({e})");
                Err(RenderOutcome::Failed(RenderError::CaptureFailed(e.to_string())))
            }
        }
    }

    fn upload_frame(&mut self, device: &mut dyn GpuDevice, target: OffscreenTarget, frame: &CapturedFrame) {
        let bpp = CAPTURE_FORMAT.bytes_per_pixel();
        if self.needs_full_upload || frame.dirty_rects.is_empty() {
            device.write_texture(
                target.texture,
                TextureRegion {
                    x: 0,
                    y: 0,
                    width: frame.width,
                    height: frame.height,
                    bytes_per_row: frame.row_pitch,
                },
                &frame.pixels,
            );
            self.needs_full_upload = false;
            self.stats.full_uploads += 1;
            return;
        }

        for rect in &frame.dirty_rects {
            let Some(rect) = rect.clipped(frame.width, frame.height) else {
                continue;
            };
            let offset = (rect.y * frame.row_pitch + rect.x * bpp) as usize;
            let Some(data) = frame.pixels.get(offset..) else {
                continue;
            };
            device.write_texture(
                target.texture,
                TextureRegion {
                    x: rect.x,
                    y: rect.y,
                    width: rect.width,
                    height: rect.height,
                    bytes_per_row: frame.row_pitch,
                },
                data,
            );
            self.stats.dirty_rect_uploads += 1;
        }
    }

    fn update_pointer(&mut self, pointer: PointerInfo) {
        if let Some(shape) = &pointer.shape {
            match convert_shape(shape) {
                Some(image) => {
                    self.cursor_image = Some(image);
                    self.cursor_dirty = true;
                }
                None => log::debug!("{CORE_NAME}: ignoring malformed pointer shape"),
            }
        }
        self.pointer = pointer;
    }

    fn upload_cursor(&mut self, device: &mut dyn GpuDevice) -> Option<OffscreenTarget> {
        let image = self.cursor_image.as_ref()?;
        let status = match self.cursor.get_or_create(
            device,
            image.width,
            image.height,
            CAPTURE_FORMAT,
            SampleDesc::SINGLE,
        ) {
            Ok(status) => status,
            Err(e) => {
                log::warn!("{CORE_NAME}: cursor texture allocation failed ({e})");
                return None;
            }
        };
        let target = status.target()?;
        if self.cursor_dirty || status.is_created() {
            device.write_texture(
                target.texture,
                TextureRegion::full(image.width, image.height, CAPTURE_FORMAT),
                &image.pixels,
            );
            self.cursor_dirty = false;
        }
        Some(target)
    }

    fn write_constants(
        device: &mut dyn GpuDevice,
        buffer: BufferHandle,
        cached: &mut Option<QuadConstants>,
        constants: QuadConstants,
    ) {
        if *cached != Some(constants) {
            device.write_buffer(buffer, 0, bytemuck::bytes_of(&constants));
            *cached = Some(constants);
        }
    }

    fn draw(&mut self, ctx: &RenderContext<'_>, device: &mut dyn GpuDevice, capture: OffscreenTarget) {
        let (Some(passes), Some(slots), Some(sampler), Some(quad_buffer), Some(cursor_buffer)) = (
            self.passes,
            self.slots,
            self.sampler,
            self.quad_buffer,
            self.cursor_buffer,
        ) else {
            return;
        };

        let source = (capture.key.width, capture.key.height);
        let target = (ctx.output.width, ctx.output.height);
        let rect = capture_rect(self.settings.clone_rect, source);
        let placement = fit_quad((rect[2], rect[3]), target, self.settings.stretch_to_fill);

        Self::write_constants(
            device,
            quad_buffer,
            &mut self.uploaded_quad,
            QuadConstants::capture(placement, target, rect, source),
        );
        device.bind_shader_pass(passes.quad);
        device.bind_constant_buffer(slots.quad_constants, quad_buffer);
        device.bind_sampler(slots.sampler, sampler);
        device.bind_texture(slots.capture, Some(capture.shader_view()));
        device.draw(QUAD_VERTICES, 0..1);
        device.bind_texture(slots.capture, None);

        if !(self.settings.show_cursor && self.pointer.visible) {
            return;
        }
        let Some(cursor) = self.upload_cursor(device) else {
            return;
        };
        Self::write_constants(
            device,
            cursor_buffer,
            &mut self.uploaded_cursor,
            QuadConstants::cursor(
                placement,
                target,
                rect,
                self.pointer.position,
                (cursor.key.width, cursor.key.height),
            ),
        );
        device.bind_shader_pass(passes.cursor);
        device.bind_constant_buffer(slots.quad_constants, cursor_buffer);
        device.bind_sampler(slots.sampler, sampler);
        device.bind_texture(slots.cursor, Some(cursor.shader_view()));
        device.draw(QUAD_VERTICES, 0..1);
        device.bind_texture(slots.cursor, None);
    }
}

impl RenderCore for ScreenCloneCore {
    fn name(&self) -> &'static str {
        CORE_NAME
    }

    fn on_attach(&mut self, technique: &dyn Technique, device: &mut dyn GpuDevice) -> Result<()> {
        self.passes = Some(ClonePasses {
            quad: require_pass(technique, CORE_NAME, passes::SCREEN_QUAD)?,
            cursor: require_pass(technique, CORE_NAME, passes::SCREEN_CURSOR)?,
        });
        self.slots = Some(CloneSlots {
            quad_constants: slot_or(technique, passes::SCREEN_QUAD, slots::QUAD_CONSTANTS, 0),
            capture: slot_or(technique, passes::SCREEN_QUAD, slots::CAPTURE, 0),
            cursor: slot_or(technique, passes::SCREEN_CURSOR, slots::CURSOR, 0),
            sampler: 0,
        });
        self.sampler = Some(device.create_sampler(&SamplerDesc::linear_clamp("Screen Clone Sampler"))?);
        let desc = |label| BufferDesc {
            label,
            size: std::mem::size_of::<QuadConstants>() as u64,
            kind: BufferKind::Uniform,
        };
        self.quad_buffer = Some(device.create_buffer(&desc("Screen Quad Constants"))?);
        self.cursor_buffer = Some(device.create_buffer(&desc("Screen Cursor Constants"))?);
        self.uploaded_quad = None;
        self.uploaded_cursor = None;
        self.needs_full_upload = true;
        self.cursor_dirty = self.cursor_image.is_some();
        Ok(())
    }

    fn on_detach(&mut self, device: &mut dyn GpuDevice) {
        self.capture.release(device);
        self.cursor.release(device);
        if let Some(sampler) = self.sampler.take() {
            device.destroy_sampler(sampler);
        }
        for buffer in [self.quad_buffer.take(), self.cursor_buffer.take()].into_iter().flatten() {
            device.destroy_buffer(buffer);
        }
        // A denied session stays denied until reset_session().
        if matches!(self.session, SessionState::Active(_)) {
            self.session = SessionState::Idle;
        }
        self.passes = None;
        self.slots = None;
        self.has_frame = false;
        self.needs_full_upload = true;
    }

    fn on_render(&mut self, ctx: &mut RenderContext<'_>, device: &mut dyn GpuDevice) -> RenderOutcome {
        if self.passes.is_none() {
            debug_assert!(false, "{CORE_NAME}: rendered without attached resources");
            return RenderOutcome::Skipped;
        }
        if self.is_denied() {
            return RenderOutcome::Skipped;
        }
        if let Err(outcome) = self.open_session() {
            return outcome;
        }
        let SessionState::Active(session) = &mut self.session else {
            return RenderOutcome::Skipped;
        };

        // --- Capture texture follows the source size ---
        let (width, height) = session.output_size();
        let capture = match self
            .capture
            .get_or_create(device, width, height, CAPTURE_FORMAT, SampleDesc::SINGLE)
        {
            Ok(TargetStatus::Cached(target)) => target,
            Ok(TargetStatus::Created(_)) => {
                log::debug!("{CORE_NAME}: capture texture reallocated to {width}x{height}");
                self.has_frame = false;
                self.needs_full_upload = true;
                return RenderOutcome::NeedsRetry;
            }
            Ok(TargetStatus::Empty) => return RenderOutcome::Skipped,
            Err(e) => {
                log::warn!("{CORE_NAME}: capture texture allocation failed ({e})");
                return RenderOutcome::Skipped;
            }
        };

        // --- Acquire ---
        let mut outcome = RenderOutcome::Rendered;
        match session.acquire_frame(self.settings.capture_timeout_ms) {
            Ok(frame) => {
                self.stats.frames_acquired += 1;
                if (frame.width, frame.height) != (width, height) {
                    session.release_frame();
                    log::debug!("{CORE_NAME}: frame size changed, reallocating");
                    self.capture.release(device);
                    self.has_frame = false;
                    self.needs_full_upload = true;
                    return RenderOutcome::NeedsRetry;
                }
                self.upload_frame(device, capture, &frame);
                if let SessionState::Active(session) = &mut self.session {
                    session.release_frame();
                }
                if let Some(pointer) = frame.pointer {
                    self.update_pointer(pointer);
                }
                self.has_frame = true;
            }
            Err(CaptureError::Timeout) => {
                self.stats.timeouts += 1;
                if !self.has_frame {
                    return RenderOutcome::NeedsRetry;
                }
                outcome = RenderOutcome::NeedsRetry;
            }
            Err(CaptureError::AccessLost) => {
                log::error!("{CORE_NAME}: capture access lost, tearing down the session");
                self.teardown_session(device);
                return RenderOutcome::Failed(RenderError::CaptureAccessLost);
            }
            Err(CaptureError::Denied) => {
                log::error!("{CORE_NAME}: capture denied");
                self.session = SessionState::Denied;
                return RenderOutcome::Failed(RenderError::CaptureDenied);
            }
            Err(CaptureError::Other(message)) => {
                log::warn!("{CORE_NAME}: capture failed ({message})");
                return RenderOutcome::Failed(RenderError::CaptureFailed(message));
            }
        }

        self.draw(ctx, device, capture);
        outcome
    }
}
