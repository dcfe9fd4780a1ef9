use crate::blur::messages::{BlurCommand, TestCaptureResult};
use crate::blur::poller::PeriodicTimer;
use crate::blur::state::OverlayState;
use crate::blur::tracking::TrackingLoop;
use crate::global_hotkey::HotkeyBinding;
use crate::settings::Settings;
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

/// Snapshot for status surfaces such as a tray menu.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    pub enabled: bool,
    pub overlay_state: OverlayState,
    pub target_found: bool,
    pub last_error: Option<String>,
    pub last_test_capture: Option<TestCaptureResult>,
}

/// Cloneable control surface. Every call only enqueues a command.
#[derive(Clone)]
pub struct ServiceHandle {
    tx: Sender<BlurCommand>,
    diagnostics: Arc<Mutex<Diagnostics>>,
}

impl ServiceHandle {
    pub(crate) fn new(tx: Sender<BlurCommand>, diagnostics: Arc<Mutex<Diagnostics>>) -> Self {
        Self { tx, diagnostics }
    }

    /// Returns `false` once the service has stopped.
    pub fn send(&self, cmd: BlurCommand) -> bool {
        self.tx.send(cmd).is_ok()
    }

    pub fn toggle(&self) -> bool {
        self.send(BlurCommand::ToggleBlur)
    }

    pub fn test_capture(&self) -> bool {
        self.send(BlurCommand::TestCapture)
    }

    pub fn shutdown(&self) -> bool {
        self.send(BlurCommand::Shutdown)
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

/// Running engine: tracking loop, poll timer and global hotkey.
pub struct BlurService {
    tracking: TrackingLoop,
    poller: Option<PeriodicTimer>,
    hotkey: Option<HotkeyBinding>,
}

impl BlurService {
    /// Start on the native desktop. Fails when the hotkey or the window
    /// subsystem is unavailable.
    #[cfg(windows)]
    pub fn start(settings: Settings) -> Result<Self> {
        use crate::blur::capture::GdiScreenGrabber;
        use crate::blur::overlay::{OverlaySurface, Win32OverlaySurface};
        use crate::window_system::{enable_dpi_awareness, Win32WindowSystem};

        enable_dpi_awareness();
        let hotkey = settings.hotkey();
        let mut tracking = TrackingLoop::new(
            settings.clone(),
            Arc::new(Win32WindowSystem::new()),
            Arc::new(GdiScreenGrabber),
            |tx| Box::new(Win32OverlaySurface::new(tx)) as Box<dyn OverlaySurface>,
        );
        let binding = HotkeyBinding::register(hotkey, tracking.sender())
            .with_context(|| format!("failed to register global hotkey '{}'", settings.hotkey))?;
        tracking.startup_capture_check();
        tracing::info!(hotkey = %settings.hotkey, "press the hotkey to toggle the blur");
        Self::assemble(tracking, Some(binding))
    }

    #[cfg(not(windows))]
    pub fn start(_settings: Settings) -> Result<Self> {
        anyhow::bail!("the blur overlay requires the Windows desktop")
    }

    /// Wire an existing loop to the poll timer.
    pub fn assemble(tracking: TrackingLoop, hotkey: Option<HotkeyBinding>) -> Result<Self> {
        let period = tracking.settings().poll_interval();
        let poller = PeriodicTimer::spawn(
            "blur-poller",
            period,
            tracking.sender(),
            BlurCommand::ReEvaluate,
        )
        .context("failed to spawn re-evaluation timer")?;
        Ok(Self {
            tracking,
            poller: Some(poller),
            hotkey,
        })
    }

    pub fn handle(&self) -> ServiceHandle {
        self.tracking.handle()
    }

    /// Block until shutdown, then release the hotkey and the overlay.
    pub fn run(mut self) {
        self.tracking.run();
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.stop();
        }
        // Dropping the binding unregisters the hotkey.
        self.hotkey.take();
    }
}

impl Drop for BlurService {
    fn drop(&mut self) {
        self.stop();
    }
}

