use crate::blur::geometry::ScreenRect;
use crate::settings::TargetSettings;
use crate::window_system::{WindowHandle, WindowInfo, WindowSystem};
use std::time::{Duration, Instant};

/// Candidates must be larger than this in both axes, in device-independent
/// pixels.
pub const MIN_CANDIDATE_DIP: f32 = 200.0;

pub const PRIORITY_EXECUTABLE: u32 = 100;
pub const PRIORITY_SHELL_HOST: u32 = 90;
pub const PRIORITY_TITLE: u32 = 80;

#[derive(Debug, Clone, PartialEq)]
pub struct TargetWindowRef {
    pub handle: WindowHandle,
    pub rect: ScreenRect,
    pub process_name: String,
    pub title: String,
    pub last_verified: Instant,
}

impl TargetWindowRef {
    fn from_info(info: &WindowInfo, now: Instant) -> Self {
        Self {
            handle: info.handle,
            rect: info.rect,
            process_name: info.process_name.clone(),
            title: info.title.clone(),
            last_verified: now,
        }
    }
}

fn list_contains(list: &[String], value: &str) -> bool {
    list.iter().any(|item| item.eq_ignore_ascii_case(value))
}

fn large_enough(window: &WindowInfo) -> bool {
    let scale = if window.scale_factor > 0.0 {
        window.scale_factor
    } else {
        1.0
    };
    window.rect.width as f32 / scale > MIN_CANDIDATE_DIP
        && window.rect.height as f32 / scale > MIN_CANDIDATE_DIP
}

/// Priority of `window` as the shielded target. `0` means "never".
pub fn score_candidate(window: &WindowInfo, target: &TargetSettings, own_pid: u32) -> u32 {
    let title = window.title.trim();
    if title.is_empty() || window.pid == own_pid {
        return 0;
    }
    let title_lower = title.to_lowercase();
    if target
        .denied_title_keywords
        .iter()
        .any(|kw| !kw.is_empty() && title_lower.contains(&kw.to_lowercase()))
    {
        return 0;
    }

    let process = window.process_name.as_str();
    if process.eq_ignore_ascii_case(&target.executable) {
        return PRIORITY_EXECUTABLE;
    }
    let app_name = target.display_name.to_lowercase();
    if list_contains(&target.shell_hosts, process) && title_lower.contains(&app_name) {
        return PRIORITY_SHELL_HOST;
    }
    if title.eq_ignore_ascii_case(&target.display_name) && !list_contains(&target.denied_hosts, process)
    {
        return PRIORITY_TITLE;
    }
    0
}

/// Highest-priority candidate, ties broken by the larger area.
pub fn select_target<'a>(
    windows: &'a [WindowInfo],
    target: &TargetSettings,
    own_pid: u32,
) -> Option<&'a WindowInfo> {
    windows
        .iter()
        .filter(|w| large_enough(w))
        .map(|w| (score_candidate(w, target, own_pid), w))
        .filter(|(score, _)| *score > 0)
        .max_by(|(sa, a), (sb, b)| sa.cmp(sb).then(a.rect.area().cmp(&b.rect.area())))
        .map(|(_, w)| w)
}

/// Finds the target window, remembering a hit for a limited time.
pub struct WindowLocator {
    target: TargetSettings,
    ttl: Duration,
    cached: Option<(TargetWindowRef, Instant)>,
}

impl WindowLocator {
    pub fn new(target: TargetSettings, ttl: Duration) -> Self {
        Self {
            target,
            ttl,
            cached: None,
        }
    }

    pub fn locate(&mut self, windows: &dyn WindowSystem) -> Option<TargetWindowRef> {
        self.locate_at(windows, Instant::now())
    }

    pub fn locate_at(
        &mut self,
        windows: &dyn WindowSystem,
        now: Instant,
    ) -> Option<TargetWindowRef> {
        if let Some(hit) = self.cached_hit(windows, now) {
            return Some(hit);
        }

        let candidates = windows.top_level_windows();
        let found = select_target(&candidates, &self.target, windows.current_process_id())
            .map(|info| TargetWindowRef::from_info(info, now));
        match &found {
            Some(target) => {
                tracing::debug!(
                    handle = ?target.handle,
                    process = %target.process_name,
                    title = %target.title,
                    rect = ?target.rect,
                    "located target window"
                );
                self.cached = Some((target.clone(), now));
            }
            None => {
                tracing::trace!(candidates = candidates.len(), "no target window found");
                self.cached = None;
            }
        }
        found
    }

    fn cached_hit(&mut self, windows: &dyn WindowSystem, now: Instant) -> Option<TargetWindowRef> {
        let (cached, located_at) = self.cached.as_mut()?;
        let fresh = now.saturating_duration_since(*located_at) < self.ttl;
        let alive = windows.is_alive(cached.handle) && windows.is_visible(cached.handle);
        let rect = if fresh && alive {
            windows.window_rect(cached.handle)
        } else {
            None
        };
        match rect {
            Some(rect) => {
                cached.rect = rect;
                cached.last_verified = now;
                Some(cached.clone())
            }
            None => {
                if fresh {
                    tracing::debug!(handle = ?cached.handle, "cached target is gone");
                }
                self.cached = None;
                None
            }
        }
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }
}
