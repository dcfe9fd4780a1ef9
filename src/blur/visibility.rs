use crate::blur::geometry::ScreenRect;
use crate::blur::locator::TargetWindowRef;
use crate::window_system::WindowSystem;
use serde::{Deserialize, Serialize};

/// How strict the "really visible" test is.
///
/// `Strict` only shields the foreground window: a background window is never
/// covered, but switching to another application always removes the shield.
/// `Relaxed` keeps the shield while any part of the window is exposed, which
/// may cover a window the user is not looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityPolicy {
    #[default]
    Strict,
    Relaxed,
}

pub struct VisibilityOracle {
    policy: VisibilityPolicy,
    min_visible: i32,
}

impl VisibilityOracle {
    /// `min_visible` is the smallest on-screen extent, per axis, that counts.
    pub fn new(policy: VisibilityPolicy, min_visible: i32) -> Self {
        Self {
            policy,
            min_visible,
        }
    }

    pub fn policy(&self) -> VisibilityPolicy {
        self.policy
    }

    /// Live rectangle of the target if it is really visible.
    pub fn visible_rect(
        &self,
        windows: &dyn WindowSystem,
        target: &TargetWindowRef,
    ) -> Option<ScreenRect> {
        let handle = target.handle;
        if !windows.is_alive(handle) || !windows.is_visible(handle) || windows.is_minimized(handle)
        {
            return None;
        }
        let rect = windows.window_rect(handle)?;
        let on_screen = rect.intersection(&windows.virtual_screen())?;
        if on_screen.width < self.min_visible || on_screen.height < self.min_visible {
            return None;
        }
        let exposed = match self.policy {
            VisibilityPolicy::Strict => windows.foreground_window() == Some(handle),
            VisibilityPolicy::Relaxed => !windows.is_fully_occluded(handle, on_screen),
        };
        exposed.then_some(rect)
    }

    pub fn is_really_visible(&self, windows: &dyn WindowSystem, target: &TargetWindowRef) -> bool {
        self.visible_rect(windows, target).is_some()
    }
}
