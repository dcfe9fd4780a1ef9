use crate::blur::capture::{CaptureError, RegionCapturer, ScreenGrabber};
use crate::blur::effect::{EffectProcessor, EffectResult};
use crate::blur::geometry::ScreenRect;
use crate::blur::hover::HoverCoordinator;
use crate::blur::locator::{TargetWindowRef, WindowLocator};
use crate::blur::messages::{BlurCommand, TestCaptureResult};
use crate::blur::overlay::{OverlaySurface, OverlayWindow};
use crate::blur::service::{Diagnostics, ServiceHandle};
use crate::blur::state::{can_transition, OverlayState};
use crate::blur::visibility::VisibilityOracle;
use crate::settings::Settings;
use crate::window_system::WindowSystem;
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Queue wait between message pumps.
const PUMP_INTERVAL: Duration = Duration::from_millis(16);
const WORKER_POLL: Duration = Duration::from_millis(5);
const TEST_CAPTURE_FILE: &str = "whatsapp_blur_test_capture.png";

const PERMISSION_HINT: &str = "screen capture is blocked; allow desktop apps to capture the \
     screen under Settings > Privacy & security > Screenshots and apps";

/// Owns the overlay and every piece of mutable engine state.
///
/// All commands are handled one at a time on the thread that calls
/// [`TrackingLoop::run`] (or the `process_*` helpers). Background threads only
/// reach it through the command queue.
pub struct TrackingLoop {
    settings: Settings,
    windows: Arc<dyn WindowSystem>,
    capturer: Arc<RegionCapturer>,
    effects: EffectProcessor,
    locator: WindowLocator,
    oracle: VisibilityOracle,
    overlay: OverlayWindow,
    hover: HoverCoordinator,
    state: OverlayState,
    target: Option<TargetWindowRef>,
    blur_cache: Option<EffectResult>,
    enabled: bool,
    last_blur_attempt: Option<Instant>,
    last_error: Option<String>,
    permission_notice_shown: bool,
    last_test_capture: Option<TestCaptureResult>,
    shutdown: bool,
    tx: Sender<BlurCommand>,
    rx: Receiver<BlurCommand>,
    diagnostics: Arc<Mutex<Diagnostics>>,
}

impl TrackingLoop {
    /// `make_surface` receives the queue sender so the native window can
    /// report pointer movement.
    pub fn new<F>(
        settings: Settings,
        windows: Arc<dyn WindowSystem>,
        grabber: Arc<dyn ScreenGrabber>,
        make_surface: F,
    ) -> Self
    where
        F: FnOnce(Sender<BlurCommand>) -> Box<dyn OverlaySurface>,
    {
        let (tx, rx) = channel();
        let capturer = Arc::new(RegionCapturer::new(
            grabber,
            settings.capture_settle(),
            settings.min_capture_size,
        ));
        let hover = HoverCoordinator::new(
            Arc::clone(&windows),
            tx.clone(),
            settings.hover_poll_interval(),
        );
        let mut tracking = Self {
            effects: EffectProcessor::new(settings.effect.clone()),
            locator: WindowLocator::new(settings.target.clone(), settings.window_cache_ttl()),
            oracle: VisibilityOracle::new(settings.visibility, settings.min_capture_size),
            overlay: OverlayWindow::new(make_surface(tx.clone()))
                .with_rounded_corners(settings.rounded_corners),
            hover,
            capturer,
            windows,
            settings,
            state: OverlayState::Hidden,
            target: None,
            blur_cache: None,
            enabled: true,
            last_blur_attempt: None,
            last_error: None,
            permission_notice_shown: false,
            last_test_capture: None,
            shutdown: false,
            tx,
            rx,
            diagnostics: Arc::new(Mutex::new(Diagnostics::default())),
        };
        tracking.publish();
        tracking
    }

    pub fn handle(&self) -> ServiceHandle {
        ServiceHandle::new(self.tx.clone(), Arc::clone(&self.diagnostics))
    }

    pub fn sender(&self) -> Sender<BlurCommand> {
        self.tx.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn state(&self) -> OverlayState {
        self.state
    }

    pub fn target(&self) -> Option<&TargetWindowRef> {
        self.target.as_ref()
    }

    pub fn overlay(&self) -> &OverlayWindow {
        &self.overlay
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_hovering(&self) -> bool {
        self.hover.is_hovering()
    }

    pub fn blur_cache_size(&self) -> Option<(u32, u32)> {
        self.blur_cache.as_ref().map(EffectResult::size)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_test_capture(&self) -> Option<&TestCaptureResult> {
        self.last_test_capture.as_ref()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Handle everything currently queued, including follow-up commands.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while !self.shutdown {
            match self.rx.try_recv() {
                Ok(cmd) => {
                    self.dispatch(cmd);
                    handled += 1;
                }
                Err(_) => break,
            }
        }
        handled
    }

    /// Wait up to `timeout` for one command. Returns `false` on timeout.
    pub fn process_next(&mut self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(cmd) => {
                self.dispatch(cmd);
                true
            }
            Err(_) => false,
        }
    }

    /// Block until [`BlurCommand::Shutdown`] is handled.
    pub fn run(&mut self) {
        tracing::info!("tracking loop started");
        while !self.shutdown {
            self.overlay.pump_messages();
            match self.rx.recv_timeout(PUMP_INTERVAL) {
                Ok(cmd) => self.dispatch(cmd),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.teardown();
        tracing::info!("tracking loop stopped");
    }

    /// One capture of a fixed screen corner to surface missing permissions
    /// at startup.
    pub fn startup_capture_check(&mut self) {
        match self.capturer.test_capture() {
            Ok(_) => tracing::debug!("startup screen capture succeeded"),
            Err(err) => self.record_capture_error(&err),
        }
        self.publish();
    }

    pub fn dispatch(&mut self, cmd: BlurCommand) {
        tracing::trace!(?cmd, state = ?self.state, "handling command");
        match cmd {
            BlurCommand::ShowBlur => self.show_blur(),
            BlurCommand::HideBlur => self.hide_blur(),
            BlurCommand::ToggleBlur => self.toggle_blur(),
            BlurCommand::UpdatePosition => self.update_position(),
            BlurCommand::ReEvaluate => self.re_evaluate(),
            BlurCommand::PointerEntered => self.pointer_entered(),
            BlurCommand::HoverEnded { generation } => self.hover_ended(generation),
            BlurCommand::TestCapture => self.test_capture(),
            BlurCommand::Shutdown => {
                self.shutdown = true;
                self.teardown();
            }
        }
        debug_assert!(self.state == OverlayState::Hidden || self.target.is_some());
        self.publish();
    }

    fn enqueue(&self, cmd: BlurCommand) {
        let _ = self.tx.send(cmd);
    }

    fn transition(&mut self, to: OverlayState) {
        if !can_transition(self.state, to) {
            tracing::warn!(from = ?self.state, ?to, "rejected overlay state transition");
            return;
        }
        if self.state != to {
            tracing::debug!(from = ?self.state, ?to, "overlay state changed");
        }
        self.state = to;
    }

    fn show_blur(&mut self) {
        if self.state != OverlayState::Hidden {
            return;
        }
        let now = Instant::now();
        if let Some(last) = self.last_blur_attempt {
            if now.saturating_duration_since(last) < self.settings.min_blur_interval() {
                tracing::debug!("show request debounced");
                return;
            }
        }

        let Some(mut target) = self.locator.locate(self.windows.as_ref()) else {
            tracing::debug!("no target window to shield");
            return;
        };
        let Some(rect) = self.oracle.visible_rect(self.windows.as_ref(), &target) else {
            tracing::debug!(handle = ?target.handle, "target is not visible");
            return;
        };

        // Only attempts that reach the screen count towards the debounce.
        self.last_blur_attempt = Some(now);
        let content = match self.capture_and_process(rect) {
            Ok(content) => content,
            Err(err) => {
                self.record_capture_error(&err);
                return;
            }
        };

        if let Err(err) = self.overlay.create_or_update(rect, &content) {
            tracing::warn!(%err, ?rect, "failed to create overlay");
            self.last_error = Some(err.to_string());
            self.overlay.destroy();
            return;
        }

        target.rect = rect;
        target.last_verified = Instant::now();
        tracing::info!(?rect, process = %target.process_name, "blur shown");
        self.target = Some(target);
        self.blur_cache = Some(content);
        self.last_error = None;
        self.transition(OverlayState::Visible);
    }

    fn hide_blur(&mut self) {
        if self.state == OverlayState::Hidden {
            return;
        }
        self.hover.cancel();
        self.overlay.destroy();
        self.blur_cache = None;
        self.transition(OverlayState::Hidden);
        self.target = None;
        tracing::info!("blur hidden");
    }

    fn toggle_blur(&mut self) {
        match self.state {
            OverlayState::Hidden => {
                self.enabled = true;
                self.enqueue(BlurCommand::ShowBlur);
            }
            OverlayState::Visible => {
                self.enabled = false;
                self.enqueue(BlurCommand::HideBlur);
            }
            OverlayState::HoverTransparent => {
                tracing::debug!("toggle ignored while hovering");
            }
        }
    }

    fn resize_exceeds_threshold(&self, rect: ScreenRect) -> bool {
        let Some((width, height)) = self.blur_cache_size() else {
            return true;
        };
        let threshold = self.settings.resize_recapture_threshold;
        (rect.width - width as i32).abs() > threshold
            || (rect.height - height as i32).abs() > threshold
    }

    fn update_position(&mut self) {
        let Some(handle) = self.target.as_ref().map(|t| t.handle) else {
            return;
        };
        let Some(rect) = self.windows.window_rect(handle) else {
            return;
        };
        match self.state {
            OverlayState::Hidden => {}
            OverlayState::HoverTransparent => {
                if let Some(target) = self.target.as_mut() {
                    target.rect = rect;
                }
            }
            OverlayState::Visible => {
                if self.overlay.rect() == Some(rect) {
                    return;
                }
                if self.resize_exceeds_threshold(rect) {
                    tracing::debug!(?rect, "target resized; recapturing");
                    self.blur_cache = None;
                    self.last_blur_attempt = None;
                    self.enqueue(BlurCommand::HideBlur);
                    self.enqueue(BlurCommand::ShowBlur);
                    return;
                }
                let moved = match self.blur_cache.as_ref() {
                    Some(cache) => self.overlay.create_or_update(rect, cache),
                    None => return,
                };
                match moved {
                    Ok(()) => {
                        if let Some(target) = self.target.as_mut() {
                            target.rect = rect;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(%err, "failed to move overlay");
                        self.last_error = Some(err.to_string());
                        self.enqueue(BlurCommand::HideBlur);
                    }
                }
            }
        }
    }

    fn re_evaluate(&mut self) {
        let located = self.locator.locate(self.windows.as_ref());
        let visible = located
            .as_ref()
            .and_then(|t| self.oracle.visible_rect(self.windows.as_ref(), t));

        match self.state {
            OverlayState::Hidden => {
                if self.enabled && visible.is_some() {
                    self.enqueue(BlurCommand::ShowBlur);
                }
            }
            OverlayState::Visible | OverlayState::HoverTransparent => {
                let current = self.target.as_ref().map(|t| t.handle);
                match (located, visible) {
                    (Some(found), Some(_)) if Some(found.handle) == current => {
                        self.enqueue(BlurCommand::UpdatePosition);
                    }
                    (Some(found), Some(_)) => {
                        tracing::info!(handle = ?found.handle, "target window changed");
                        self.last_blur_attempt = None;
                        self.enqueue(BlurCommand::HideBlur);
                        if self.enabled {
                            self.enqueue(BlurCommand::ShowBlur);
                        }
                    }
                    _ => self.enqueue(BlurCommand::HideBlur),
                }
            }
        }
    }

    fn pointer_entered(&mut self) {
        if self.state != OverlayState::Visible || !self.settings.hover_reveal {
            return;
        }
        let Some((handle, rect)) = self.target.as_ref().map(|t| (t.handle, t.rect)) else {
            return;
        };
        match self.hover.enter(&mut self.overlay, handle, rect) {
            Ok(true) => self.transition(OverlayState::HoverTransparent),
            Ok(false) => {}
            Err(err) => tracing::warn!(%err, "failed to make overlay transparent"),
        }
    }

    fn hover_ended(&mut self, generation: u64) {
        if self.state != OverlayState::HoverTransparent || generation != self.hover.generation() {
            tracing::trace!(generation, "stale hover notification");
            return;
        }
        let still_visible = if self.enabled {
            self.target
                .as_ref()
                .and_then(|t| self.oracle.visible_rect(self.windows.as_ref(), t))
        } else {
            None
        };
        let Some(rect) = still_visible else {
            self.hover.cancel();
            self.hide_blur();
            return;
        };

        if self.overlay.rect() != Some(rect) {
            if let Some(cache) = self.blur_cache.as_ref() {
                if let Err(err) = self.overlay.create_or_update(rect, cache) {
                    tracing::warn!(%err, "failed to move overlay after hover");
                }
            }
            if let Some(target) = self.target.as_mut() {
                target.rect = rect;
            }
        }

        match self.hover.restore(&mut self.overlay) {
            Ok(()) => self.transition(OverlayState::Visible),
            Err(err) => {
                tracing::warn!(%err, "failed to restore overlay after hover");
                self.last_error = Some(err.to_string());
                self.hide_blur();
            }
        }
    }

    fn test_capture(&mut self) {
        let capturer = Arc::clone(&self.capturer);
        let path = std::env::temp_dir().join(TEST_CAPTURE_FILE);
        let result = self.run_off_thread("blur-test-capture", move || save_test_capture(&capturer, path));
        let result = match result {
            Ok(result) => result,
            Err(error) => TestCaptureResult::Failed { error },
        };
        match &result {
            TestCaptureResult::Saved {
                path,
                width,
                height,
            } => {
                tracing::info!(path = %path.display(), width, height, "test capture saved");
            }
            TestCaptureResult::Failed { error } => {
                tracing::warn!(%error, "test capture failed");
                self.last_error = Some(error.clone());
            }
        }
        self.last_test_capture = Some(result);
    }

    fn capture_and_process(&mut self, rect: ScreenRect) -> Result<EffectResult, CaptureError> {
        let capturer = Arc::clone(&self.capturer);
        let effects = self.effects.clone();
        self.run_off_thread("blur-capture", move || {
            let frame = capturer.capture(rect)?;
            effects
                .process(&frame)
                .ok_or_else(|| CaptureError::Failed("captured frame is empty".into()))
        })
        .map_err(CaptureError::Failed)?
    }

    /// Run `job` on a worker while this thread keeps pumping window messages.
    fn run_off_thread<T, F>(&mut self, name: &str, job: F) -> Result<T, String>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(job)
            .map_err(|err| format!("failed to spawn {name} worker: {err}"))?;
        while !worker.is_finished() {
            self.overlay.pump_messages();
            thread::sleep(WORKER_POLL);
        }
        worker
            .join()
            .map_err(|_| format!("{name} worker panicked"))
    }

    fn record_capture_error(&mut self, err: &CaptureError) {
        match err {
            CaptureError::PermissionDenied => {
                if !self.permission_notice_shown {
                    tracing::warn!("{PERMISSION_HINT}");
                    self.permission_notice_shown = true;
                }
            }
            err if err.is_transient() => tracing::debug!(%err, "capture skipped"),
            err => tracing::warn!(%err, "capture failed"),
        }
        self.last_error = Some(err.to_string());
    }

    fn teardown(&mut self) {
        self.hover.cancel();
        self.overlay.destroy();
        self.blur_cache = None;
        if self.state != OverlayState::Hidden {
            self.transition(OverlayState::Hidden);
        }
        self.target = None;
    }

    fn publish(&mut self) {
        if let Ok(mut diagnostics) = self.diagnostics.lock() {
            *diagnostics = Diagnostics {
                enabled: self.enabled,
                overlay_state: self.state,
                target_found: self.target.is_some(),
                last_error: self.last_error.clone(),
                last_test_capture: self.last_test_capture.clone(),
            };
        }
    }
}

fn save_test_capture(capturer: &RegionCapturer, path: PathBuf) -> TestCaptureResult {
    let frame = match capturer.test_capture() {
        Ok(frame) => frame,
        Err(err) => {
            return TestCaptureResult::Failed {
                error: err.to_string(),
            }
        }
    };
    let (width, height) = frame.image.dimensions();
    match frame.image.save(&path) {
        Ok(()) => TestCaptureResult::Saved {
            path,
            width,
            height,
        },
        Err(err) => TestCaptureResult::Failed {
            error: format!("failed to write {}: {err}", path.display()),
        },
    }
}
