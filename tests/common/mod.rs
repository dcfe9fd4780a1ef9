#![allow(dead_code)]

use image::{Rgba, RgbaImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use whatsapp_blur::blur::capture::{CaptureError, ScreenGrabber};
use whatsapp_blur::blur::geometry::ScreenRect;
use whatsapp_blur::blur::overlay::{OverlayError, OverlaySurface};
use whatsapp_blur::blur::tracking::TrackingLoop;
use whatsapp_blur::settings::Settings;
use whatsapp_blur::window_system::{
    occluded_in_stack, StackedWindow, WindowHandle, WindowInfo, WindowSystem,
};

pub const SCREEN: ScreenRect = ScreenRect::new(0, 0, 1920, 1080);
pub const WHATSAPP: WindowHandle = WindowHandle(1);
pub const OWN_PID: u32 = 1;
/// Handle the fake overlay takes in the desktop's z-order.
pub const OVERLAY: WindowHandle = WindowHandle(900);

#[derive(Debug, Clone)]
pub struct FakeWindow {
    pub info: WindowInfo,
    pub alive: bool,
    pub visible: bool,
    pub minimized: bool,
    pub topmost: bool,
}

#[derive(Debug, Default)]
pub struct Desktop {
    pub windows: Vec<FakeWindow>,
    pub foreground: Option<WindowHandle>,
    pub cursor: Option<(i32, i32)>,
}

/// In-memory desktop shared between the test and the engine. `windows` is
/// in z-order, topmost first.
#[derive(Clone, Default)]
pub struct FakeWindows {
    pub desktop: Arc<Mutex<Desktop>>,
}

pub fn window(handle: WindowHandle, process: &str, title: &str, rect: ScreenRect) -> WindowInfo {
    WindowInfo {
        handle,
        title: title.to_string(),
        process_name: process.to_string(),
        pid: 1000 + handle.0 as u32,
        rect,
        scale_factor: 1.0,
    }
}

pub fn whatsapp_rect() -> ScreenRect {
    ScreenRect::from_ltrb(100, 100, 900, 700)
}

impl FakeWindows {
    /// Desktop with a foreground WhatsApp window at (100,100)-(900,700).
    pub fn with_whatsapp() -> Self {
        let fake = Self::default();
        fake.add(window(WHATSAPP, "whatsapp.exe", "WhatsApp", whatsapp_rect()));
        fake.set_foreground(Some(WHATSAPP));
        fake
    }

    /// Open `info` in front of every other normal window.
    pub fn add(&self, info: WindowInfo) {
        self.insert(FakeWindow {
            info,
            alive: true,
            visible: true,
            minimized: false,
            topmost: false,
        });
    }

    fn insert(&self, window: FakeWindow) {
        let mut desktop = self.desktop.lock().unwrap();
        desktop.windows.retain(|w| w.info.handle != window.info.handle);
        let at = if window.topmost {
            0
        } else {
            desktop.windows.iter().take_while(|w| w.topmost).count()
        };
        desktop.windows.insert(at, window);
    }

    /// Bring `handle` in front of every other normal window.
    pub fn raise(&self, handle: WindowHandle) {
        if let Some(window) = self.find(handle) {
            self.insert(window);
        }
    }

    /// Show or move this process's topmost overlay window.
    pub fn place_overlay(&self, rect: ScreenRect) {
        let mut info = window(OVERLAY, "whatsapp_blur.exe", "", rect);
        info.pid = OWN_PID;
        self.insert(FakeWindow {
            info,
            alive: true,
            visible: true,
            minimized: false,
            topmost: true,
        });
    }

    pub fn remove(&self, handle: WindowHandle) {
        self.desktop
            .lock()
            .unwrap()
            .windows
            .retain(|w| w.info.handle != handle);
    }

    fn update(&self, handle: WindowHandle, f: impl FnOnce(&mut FakeWindow)) {
        let mut desktop = self.desktop.lock().unwrap();
        if let Some(w) = desktop.windows.iter_mut().find(|w| w.info.handle == handle) {
            f(w);
        }
    }

    pub fn close(&self, handle: WindowHandle) {
        self.update(handle, |w| w.alive = false);
    }

    pub fn reopen(&self, handle: WindowHandle) {
        self.update(handle, |w| w.alive = true);
    }

    pub fn set_rect(&self, handle: WindowHandle, rect: ScreenRect) {
        self.update(handle, |w| w.info.rect = rect);
    }

    pub fn set_minimized(&self, handle: WindowHandle, minimized: bool) {
        self.update(handle, |w| w.minimized = minimized);
    }

    pub fn set_visible(&self, handle: WindowHandle, visible: bool) {
        self.update(handle, |w| w.visible = visible);
    }

    pub fn set_foreground(&self, handle: Option<WindowHandle>) {
        self.desktop.lock().unwrap().foreground = handle;
    }

    pub fn set_cursor(&self, cursor: Option<(i32, i32)>) {
        self.desktop.lock().unwrap().cursor = cursor;
    }

    fn find(&self, handle: WindowHandle) -> Option<FakeWindow> {
        self.desktop
            .lock()
            .unwrap()
            .windows
            .iter()
            .find(|w| w.info.handle == handle)
            .cloned()
    }
}

impl WindowSystem for FakeWindows {
    fn top_level_windows(&self) -> Vec<WindowInfo> {
        self.desktop
            .lock()
            .unwrap()
            .windows
            .iter()
            .filter(|w| w.alive && w.visible && !w.info.title.is_empty())
            .map(|w| w.info.clone())
            .collect()
    }

    fn window_rect(&self, handle: WindowHandle) -> Option<ScreenRect> {
        self.find(handle).filter(|w| w.alive).map(|w| w.info.rect)
    }

    fn is_alive(&self, handle: WindowHandle) -> bool {
        self.find(handle).is_some_and(|w| w.alive)
    }

    fn is_visible(&self, handle: WindowHandle) -> bool {
        self.find(handle).is_some_and(|w| w.alive && w.visible)
    }

    fn is_minimized(&self, handle: WindowHandle) -> bool {
        self.find(handle).is_some_and(|w| w.minimized)
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        self.desktop.lock().unwrap().foreground
    }

    fn is_fully_occluded(&self, handle: WindowHandle, rect: ScreenRect) -> bool {
        let stack: Vec<StackedWindow> = self
            .desktop
            .lock()
            .unwrap()
            .windows
            .iter()
            .filter(|w| w.alive && w.visible && !w.minimized)
            .map(|w| StackedWindow {
                handle: w.info.handle,
                pid: w.info.pid,
                rect: w.info.rect,
            })
            .collect();
        occluded_in_stack(&stack, handle, rect, OWN_PID)
    }

    fn virtual_screen(&self) -> ScreenRect {
        SCREEN
    }

    fn cursor_position(&self) -> Option<(i32, i32)> {
        self.desktop.lock().unwrap().cursor
    }

    fn current_process_id(&self) -> u32 {
        OWN_PID
    }
}

/// Returns a flat grey frame of the requested size and counts calls.
#[derive(Default)]
pub struct FakeGrabber {
    pub grabs: AtomicUsize,
    pub error: Mutex<Option<CaptureError>>,
    pub delay: Mutex<Duration>,
}

impl FakeGrabber {
    pub fn count(&self) -> usize {
        self.grabs.load(Ordering::SeqCst)
    }

    pub fn fail_with(&self, err: Option<CaptureError>) {
        *self.error.lock().unwrap() = err;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }
}

impl ScreenGrabber for FakeGrabber {
    fn grab(&self, rect: ScreenRect) -> Result<RgbaImage, CaptureError> {
        self.grabs.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if let Some(err) = self.error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(RgbaImage::from_pixel(
            rect.width as u32,
            rect.height as u32,
            Rgba([90, 120, 150, 255]),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceCall {
    Build(ScreenRect),
    Reveal,
    Geometry(ScreenRect, u32, u32),
    Layer(u8, bool),
    RoundCorners,
    Release,
}

#[derive(Debug, Default)]
pub struct SurfaceLog {
    pub calls: Vec<SurfaceCall>,
    pub built: bool,
    pub fail_build: bool,
    pub corners_unsupported: bool,
}

/// Records every native call instead of creating a window. When `desktop` is
/// set, the built overlay also appears there as a topmost window of this
/// process.
#[derive(Clone, Default)]
pub struct FakeSurface {
    pub log: Arc<Mutex<SurfaceLog>>,
    pub desktop: Option<FakeWindows>,
}

impl FakeSurface {
    pub fn on_desktop(desktop: &FakeWindows) -> Self {
        Self {
            log: Arc::default(),
            desktop: Some(desktop.clone()),
        }
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.log.lock().unwrap().calls.clone()
    }

    pub fn layer_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, SurfaceCall::Layer(..)))
            .count()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().calls.clear();
    }

    pub fn fail_build(&self, fail: bool) {
        self.log.lock().unwrap().fail_build = fail;
    }

    pub fn corners_unsupported(&self, unsupported: bool) {
        self.log.lock().unwrap().corners_unsupported = unsupported;
    }
}

impl OverlaySurface for FakeSurface {
    fn build_hidden(&mut self, rect: ScreenRect, image: &RgbaImage) -> Result<(), OverlayError> {
        let mut log = self.log.lock().unwrap();
        if log.fail_build {
            return Err(OverlayError::CreateFailed("refused by test".into()));
        }
        assert_eq!(image.dimensions(), (rect.width as u32, rect.height as u32));
        log.calls.push(SurfaceCall::Build(rect));
        log.built = true;
        if let Some(desktop) = &self.desktop {
            desktop.place_overlay(rect);
        }
        Ok(())
    }

    fn reveal(&mut self) -> Result<(), OverlayError> {
        let mut log = self.log.lock().unwrap();
        if !log.built {
            return Err(OverlayError::NotBuilt);
        }
        log.calls.push(SurfaceCall::Reveal);
        Ok(())
    }

    fn set_geometry(&mut self, rect: ScreenRect, image: &RgbaImage) -> Result<(), OverlayError> {
        let mut log = self.log.lock().unwrap();
        log.calls
            .push(SurfaceCall::Geometry(rect, image.width(), image.height()));
        if let Some(desktop) = &self.desktop {
            desktop.place_overlay(rect);
        }
        Ok(())
    }

    fn set_layer(&mut self, alpha: u8, clickthrough: bool) -> Result<(), OverlayError> {
        let mut log = self.log.lock().unwrap();
        if !log.built {
            return Err(OverlayError::NotBuilt);
        }
        log.calls.push(SurfaceCall::Layer(alpha, clickthrough));
        Ok(())
    }

    fn round_corners(&mut self) -> Result<(), OverlayError> {
        let mut log = self.log.lock().unwrap();
        if log.corners_unsupported {
            return Err(OverlayError::Os("corner preference not supported".into()));
        }
        log.calls.push(SurfaceCall::RoundCorners);
        Ok(())
    }

    fn release(&mut self) {
        let mut log = self.log.lock().unwrap();
        if log.built {
            log.calls.push(SurfaceCall::Release);
        }
        log.built = false;
        if let Some(desktop) = &self.desktop {
            desktop.remove(OVERLAY);
        }
    }
}

/// Settings without delays so tests run fast.
pub fn fast_settings() -> Settings {
    Settings {
        min_blur_interval_ms: 0,
        capture_settle_ms: 0,
        hover_poll_interval_ms: 20,
        effect: whatsapp_blur::settings::EffectSettings {
            blur_radius: 0.0,
            ..Default::default()
        },
        ..Settings::default()
    }
}

pub struct Harness {
    pub tracking: TrackingLoop,
    pub desktop: FakeWindows,
    pub grabber: Arc<FakeGrabber>,
    pub surface: FakeSurface,
}

pub fn harness(settings: Settings, desktop: FakeWindows) -> Harness {
    let grabber = Arc::new(FakeGrabber::default());
    let surface = FakeSurface::on_desktop(&desktop);
    let native = surface.clone();
    let tracking = TrackingLoop::new(
        settings,
        Arc::new(desktop.clone()),
        grabber.clone(),
        move |_tx| Box::new(native) as Box<dyn OverlaySurface>,
    );
    Harness {
        tracking,
        desktop,
        grabber,
        surface,
    }
}
