//! Screen Clone Core Tests
//!
//! Tests for:
//! - Session creation and capture texture allocation
//! - Full upload after (re)allocation, dirty-rectangle uploads afterwards
//! - Failure taxonomy: timeout, access lost, denied, other
//! - Pointer composition

mod common;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use myth_render_core::errors::RenderError;
use myth_render_core::renderer::backend::HeadlessDevice;
use myth_render_core::renderer::core::{CoreHost, RenderOutcome};
use myth_render_core::renderer::graph::passes::{
    CaptureError, CapturedFrame, DirtyRect, DuplicationFactory, DuplicationSession, PointerInfo,
    PointerShape, PointerShapeKind, ScreenCloneCore,
};
use myth_render_core::renderer::pipeline::PassTable;
use myth_render_core::resources::ScreenCloneSettings;
use myth_render_core::scene::RenderLists;

use common::*;

// ============================================================================
// Mock Capture Backend
// ============================================================================

#[derive(Default)]
struct Script {
    size: (u32, u32),
    create_errors: VecDeque<CaptureError>,
    frames: VecDeque<Result<CapturedFrame, CaptureError>>,
    creates: u32,
    releases: u32,
}

type SharedScript = Rc<RefCell<Script>>;

struct MockFactory(SharedScript);

impl DuplicationFactory for MockFactory {
    fn create_session(&mut self, _output: u32) -> Result<Box<dyn DuplicationSession>, CaptureError> {
        let mut script = self.0.borrow_mut();
        script.creates += 1;
        match script.create_errors.pop_front() {
            Some(err) => Err(err),
            None => Ok(Box::new(MockSession(Rc::clone(&self.0)))),
        }
    }
}

struct MockSession(SharedScript);

impl DuplicationSession for MockSession {
    fn output_size(&self) -> (u32, u32) {
        self.0.borrow().size
    }

    fn acquire_frame(&mut self, _timeout_ms: u32) -> Result<CapturedFrame, CaptureError> {
        self.0
            .borrow_mut()
            .frames
            .pop_front()
            .unwrap_or(Err(CaptureError::Timeout))
    }

    fn release_frame(&mut self) {
        self.0.borrow_mut().releases += 1;
    }
}

const WIDTH: u32 = 320;
const HEIGHT: u32 = 200;

fn frame(dirty_rects: &[DirtyRect]) -> CapturedFrame {
    sized_frame(WIDTH, HEIGHT, dirty_rects)
}

fn sized_frame(width: u32, height: u32, dirty_rects: &[DirtyRect]) -> CapturedFrame {
    CapturedFrame {
        width,
        height,
        row_pitch: width * 4,
        pixels: vec![0x80; (width * height * 4) as usize],
        dirty_rects: dirty_rects.iter().copied().collect(),
        pointer: None,
    }
}

struct Fixture {
    device: HeadlessDevice,
    technique: PassTable,
    script: SharedScript,
    host: CoreHost<ScreenCloneCore>,
}

impl Fixture {
    fn new(settings: ScreenCloneSettings) -> Self {
        init_logger();
        let mut device = HeadlessDevice::new();
        let technique = full_technique(&mut device);
        let script = Rc::new(RefCell::new(Script {
            size: (WIDTH, HEIGHT),
            ..Script::default()
        }));
        let core = ScreenCloneCore::new(settings, Box::new(MockFactory(Rc::clone(&script))));
        let host = attached(core, &technique, &mut device);
        Self {
            device,
            technique,
            script,
            host,
        }
    }

    fn push(&self, result: Result<CapturedFrame, CaptureError>) {
        self.script.borrow_mut().frames.push_back(result);
    }

    fn render(&mut self) -> RenderOutcome {
        let output = back_buffer(&mut self.device, 800, 600, 1);
        let mut ctx = context(output, RenderLists::default());
        begin_frame(&mut self.device, &output);
        self.host.render(&mut ctx, &mut self.device)
    }

    /// Runs the allocation frame and one full upload.
    fn warm_up(&mut self) {
        assert!(self.render().needs_retry());
        self.push(Ok(frame(&[])));
        assert!(self.render().is_rendered());
    }

    fn core(&self) -> &ScreenCloneCore {
        self.host.core()
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        self.host.detach(&mut self.device);
    }
}

// ============================================================================
// Session & Uploads
// ============================================================================

#[test]
fn first_frame_allocates_then_uploads_everything() {
    let mut fx = Fixture::new(ScreenCloneSettings::default());

    assert!(fx.render().needs_retry());
    assert_eq!(fx.core().session_state(), "Active");
    assert_eq!(fx.core().stats().sessions_created, 1);
    let capture = fx.core().capture_target().unwrap();
    assert_eq!((capture.key.width, capture.key.height), (WIDTH, HEIGHT));

    // Even with dirty rects, a fresh texture is filled completely.
    fx.push(Ok(frame(&[DirtyRect::new(0, 0, 8, 8)])));
    assert!(fx.render().is_rendered());
    let stats = fx.core().stats();
    assert_eq!(stats.full_uploads, 1);
    assert_eq!(stats.dirty_rect_uploads, 0);
    assert_eq!(fx.device.texture_state(capture.texture).unwrap().uploads, 1);
    assert_eq!(fx.device.draw_count_with_pass("screen_quad"), 1);
    assert_eq!(fx.script.borrow().releases, 1);
}

#[test]
fn later_frames_upload_only_dirty_rects() {
    let mut fx = Fixture::new(ScreenCloneSettings::default());
    fx.warm_up();

    fx.push(Ok(frame(&[
        DirtyRect::new(10, 10, 20, 20),
        DirtyRect::new(300, 190, 50, 50), // clipped to 20x10
        DirtyRect::new(400, 0, 10, 10),   // fully outside
    ])));
    assert!(fx.render().is_rendered());

    let stats = fx.core().stats();
    assert_eq!(stats.full_uploads, 1);
    assert_eq!(stats.dirty_rect_uploads, 2);
    let capture = fx.core().capture_target().unwrap();
    assert_eq!(fx.device.texture_state(capture.texture).unwrap().uploads, 3);
    assert_no_violations(&fx.device);
}

#[test]
fn source_resize_reallocates_and_uploads_fully() {
    let mut fx = Fixture::new(ScreenCloneSettings::default());
    fx.warm_up();

    fx.script.borrow_mut().size = (WIDTH / 2, HEIGHT / 2);
    assert!(fx.render().needs_retry());
    let capture = fx.core().capture_target().unwrap();
    assert_eq!((capture.key.width, capture.key.height), (WIDTH / 2, HEIGHT / 2));

    fx.push(Ok(sized_frame(WIDTH / 2, HEIGHT / 2, &[DirtyRect::new(0, 0, 4, 4)])));
    assert!(fx.render().is_rendered());
    assert_eq!(fx.core().stats().full_uploads, 2);
    assert_eq!(fx.core().stats().dirty_rect_uploads, 0);
}

#[test]
fn mismatched_frame_is_dropped() {
    let mut fx = Fixture::new(ScreenCloneSettings::default());
    fx.warm_up();

    fx.push(Ok(sized_frame(WIDTH * 2, HEIGHT, &[])));
    assert!(fx.render().needs_retry());
    assert!(fx.core().capture_target().is_none());
    assert_eq!(fx.script.borrow().releases, 2);

    assert!(fx.render().needs_retry());
    assert!(fx.core().capture_target().is_some());
    assert_eq!(fx.core().stats().full_uploads, 1);
}

// ============================================================================
// Failure Taxonomy
// ============================================================================

#[test]
fn timeout_reuses_last_frame() {
    let mut fx = Fixture::new(ScreenCloneSettings::default());

    assert!(fx.render().needs_retry());
    // No frame yet: nothing to draw.
    assert!(fx.render().needs_retry());
    assert_eq!(fx.device.draw_count_with_pass("screen_quad"), 0);

    fx.push(Ok(frame(&[])));
    assert!(fx.render().is_rendered());

    // Timed out: draw the previous content and ask for another frame.
    assert!(fx.render().needs_retry());
    assert_eq!(fx.device.draw_count_with_pass("screen_quad"), 2);
    assert_eq!(fx.core().stats().timeouts, 2);
    assert_eq!(fx.core().session_state(), "Active");
}

#[test]
fn access_lost_tears_down_and_recreates() {
    let mut fx = Fixture::new(ScreenCloneSettings::default());
    fx.warm_up();

    fx.push(Err(CaptureError::AccessLost));
    let outcome = fx.render();
    assert!(matches!(outcome, RenderOutcome::Failed(RenderError::CaptureAccessLost)));
    assert_eq!(fx.core().session_state(), "Idle");
    assert!(fx.core().capture_target().is_none());

    assert!(fx.render().needs_retry());
    assert_eq!(fx.core().stats().sessions_created, 2);
    fx.push(Ok(frame(&[DirtyRect::new(0, 0, 4, 4)])));
    assert!(fx.render().is_rendered());
    assert_eq!(fx.core().stats().full_uploads, 2);
}

#[test]
fn denied_session_stays_inactive_until_reset() {
    let mut fx = Fixture::new(ScreenCloneSettings::default());
    fx.script.borrow_mut().create_errors.push_back(CaptureError::Denied);

    assert!(matches!(fx.render(), RenderOutcome::Failed(RenderError::CaptureDenied)));
    assert!(fx.core().is_denied());

    assert!(matches!(fx.render(), RenderOutcome::Skipped));
    assert_eq!(fx.script.borrow().creates, 1);

    // Re-attaching does not retry the denied session.
    fx.host.detach(&mut fx.device);
    fx.host.attach(&fx.technique, &mut fx.device).unwrap();
    assert!(matches!(fx.render(), RenderOutcome::Skipped));
    assert_eq!(fx.script.borrow().creates, 1);

    fx.host.core_mut().reset_session();
    assert!(fx.render().needs_retry());
    assert_eq!(fx.script.borrow().creates, 2);
    assert_eq!(fx.core().session_state(), "Active");
}

#[test]
fn denied_while_acquiring() {
    let mut fx = Fixture::new(ScreenCloneSettings::default());
    fx.warm_up();

    fx.push(Err(CaptureError::Denied));
    assert!(matches!(fx.render(), RenderOutcome::Failed(RenderError::CaptureDenied)));
    assert!(fx.core().is_denied());
}

#[test]
fn other_errors_are_reported_with_message() {
    let mut fx = Fixture::new(ScreenCloneSettings::default());
    fx.script
        .borrow_mut()
        .create_errors
        .push_back(CaptureError::Other("no adapter output".to_owned()));

    match fx.render() {
        RenderOutcome::Failed(RenderError::CaptureFailed(message)) => {
            assert_eq!(message, "no adapter output");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(fx.core().session_state(), "Idle");

    // Not sticky: the next frame tries again.
    assert!(fx.render().needs_retry());
}

// ============================================================================
// Pointer
// ============================================================================

fn pointer_frame(visible: bool) -> CapturedFrame {
    // 8x8 monochrome arrow: AND rows all 0, XOR rows all 1 (opaque white).
    let mut data = vec![0x00; 8];
    data.extend_from_slice(&[0xFF; 8]);
    CapturedFrame {
        pointer: Some(PointerInfo {
            position: (100, 50),
            visible,
            shape: Some(PointerShape {
                kind: PointerShapeKind::Monochrome,
                width: 8,
                height: 16,
                pitch: 1,
                hot_spot: (0, 0),
                data,
            }),
        }),
        ..frame(&[])
    }
}

#[test]
fn visible_pointer_is_drawn_over_the_quad() {
    let mut fx = Fixture::new(ScreenCloneSettings::default());
    assert!(fx.render().needs_retry());
    fx.push(Ok(pointer_frame(true)));
    assert!(fx.render().is_rendered());

    assert_eq!(fx.device.draw_count_with_pass("screen_cursor"), 1);
    let cursor = fx.core().cursor_target().unwrap();
    assert_eq!((cursor.key.width, cursor.key.height), (8, 8));
    assert_eq!(fx.core().pointer().position, (100, 50));

    // A frame without pointer update keeps the previous pointer.
    fx.push(Ok(frame(&[DirtyRect::new(0, 0, 1, 1)])));
    fx.render();
    assert_eq!(fx.device.draw_count_with_pass("screen_cursor"), 2);
    assert_eq!(fx.device.texture_state(cursor.texture).unwrap().uploads, 1);
}

#[test]
fn hidden_pointer_or_disabled_cursor_is_not_drawn() {
    let mut fx = Fixture::new(ScreenCloneSettings::default());
    assert!(fx.render().needs_retry());
    fx.push(Ok(pointer_frame(false)));
    fx.render();
    assert_eq!(fx.device.draw_count_with_pass("screen_cursor"), 0);

    let mut fx = Fixture::new(ScreenCloneSettings {
        show_cursor: false,
        ..ScreenCloneSettings::default()
    });
    assert!(fx.render().needs_retry());
    fx.push(Ok(pointer_frame(true)));
    fx.render();
    assert_eq!(fx.device.draw_count_with_pass("screen_cursor"), 0);
    assert_eq!(fx.device.draw_count_with_pass("screen_quad"), 1);
}
