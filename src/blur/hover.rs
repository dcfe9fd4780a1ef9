use crate::blur::geometry::ScreenRect;
use crate::blur::messages::BlurCommand;
use crate::blur::overlay::{OverlayError, VisibilityControl};
use crate::window_system::{WindowHandle, WindowSystem};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

struct Watcher {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Makes the overlay transparent while the pointer is over the target.
///
/// The watcher thread only observes the cursor. It reports the pointer
/// leaving through the command queue and never touches the overlay.
pub struct HoverCoordinator {
    windows: Arc<dyn WindowSystem>,
    tx: Sender<BlurCommand>,
    tick: Duration,
    hovering: bool,
    generation: u64,
    watcher: Option<Watcher>,
}

impl HoverCoordinator {
    pub fn new(windows: Arc<dyn WindowSystem>, tx: Sender<BlurCommand>, tick: Duration) -> Self {
        Self {
            windows,
            tx,
            tick,
            hovering: false,
            generation: 0,
            watcher: None,
        }
    }

    pub fn is_hovering(&self) -> bool {
        self.hovering
    }

    /// Generation of the most recent watcher.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn watcher_running(&self) -> bool {
        self.watcher.is_some()
    }

    /// Returns `Ok(false)` when a watcher is already active.
    pub fn enter(
        &mut self,
        overlay: &mut dyn VisibilityControl,
        target: WindowHandle,
        rect: ScreenRect,
    ) -> Result<bool, OverlayError> {
        if self.watcher_running() {
            return Ok(false);
        }
        overlay.set_visibility(0.0, true)?;
        self.hovering = true;
        self.generation += 1;

        let stop = Arc::new(AtomicBool::new(false));
        let spawned = spawn_watcher(
            Arc::clone(&self.windows),
            self.tx.clone(),
            Arc::clone(&stop),
            self.tick,
            target,
            rect,
            self.generation,
        );
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                tracing::error!(%err, "failed to spawn hover watcher");
                self.hovering = false;
                overlay.set_visibility(1.0, false)?;
                return Ok(false);
            }
        };
        self.watcher = Some(Watcher { stop, handle });
        tracing::debug!(generation = self.generation, "hover started");
        Ok(true)
    }

    /// Opaque and click-catching again.
    pub fn restore(&mut self, overlay: &mut dyn VisibilityControl) -> Result<(), OverlayError> {
        self.cancel();
        overlay.set_visibility(1.0, false)
    }

    /// Stop watching without touching the overlay.
    pub fn cancel(&mut self) {
        self.hovering = false;
        if let Some(watcher) = self.watcher.take() {
            watcher.stop.store(true, Ordering::Release);
            if watcher.handle.is_finished() {
                let _ = watcher.handle.join();
            }
        }
    }
}

impl Drop for HoverCoordinator {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn spawn_watcher(
    windows: Arc<dyn WindowSystem>,
    tx: Sender<BlurCommand>,
    stop: Arc<AtomicBool>,
    tick: Duration,
    target: WindowHandle,
    mut rect: ScreenRect,
    generation: u64,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("blur-hover".into())
        .spawn(move || loop {
            thread::sleep(tick);
            if stop.load(Ordering::Acquire) {
                return;
            }
            // A vanished target counts as the pointer leaving.
            if !windows.is_alive(target) {
                let _ = tx.send(BlurCommand::HoverEnded { generation });
                return;
            }
            if let Some(live) = windows.window_rect(target) {
                rect = live;
            }
            let left = windows
                .cursor_position()
                .is_some_and(|cursor| !rect.contains(cursor));
            if left {
                if !stop.load(Ordering::Acquire) {
                    let _ = tx.send(BlurCommand::HoverEnded { generation });
                }
                return;
            }
        })
}
