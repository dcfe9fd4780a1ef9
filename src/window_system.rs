//! Read-only view of the desktop's top-level windows.
//!
//! The engine only talks to [`WindowSystem`], so locating and visibility rules
//! can be exercised without a live desktop.

use crate::blur::geometry::ScreenRect;

/// Opaque top-level window handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub isize);

#[derive(Debug, Clone, PartialEq)]
pub struct WindowInfo {
    pub handle: WindowHandle,
    pub title: String,
    /// Lower-case executable file name, e.g. `whatsapp.exe`.
    pub process_name: String,
    pub pid: u32,
    /// Visible frame in physical pixels.
    pub rect: ScreenRect,
    /// Monitor scale for the window, `1.0` at 96 DPI.
    pub scale_factor: f32,
}

pub trait WindowSystem: Send + Sync {
    /// Visible top-level windows in z-order.
    fn top_level_windows(&self) -> Vec<WindowInfo>;
    fn window_rect(&self, handle: WindowHandle) -> Option<ScreenRect>;
    fn is_alive(&self, handle: WindowHandle) -> bool;
    fn is_visible(&self, handle: WindowHandle) -> bool;
    fn is_minimized(&self, handle: WindowHandle) -> bool;
    fn foreground_window(&self) -> Option<WindowHandle>;
    /// `true` when no part of `rect` shows `handle`. Windows owned by this
    /// process, such as the overlay itself, are looked through.
    fn is_fully_occluded(&self, handle: WindowHandle, rect: ScreenRect) -> bool;
    /// Bounding box of all monitors.
    fn virtual_screen(&self) -> ScreenRect;
    fn cursor_position(&self) -> Option<(i32, i32)>;
    fn current_process_id(&self) -> u32 {
        std::process::id()
    }
}

/// Points sampled per axis when probing occlusion.
pub const OCCLUSION_GRID: i32 = 3;

/// One entry of a front-to-back window stack used for hit testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackedWindow {
    pub handle: WindowHandle,
    pub pid: u32,
    pub rect: ScreenRect,
}

/// Hit-test a grid of points inside `rect` against `stack` (topmost first).
///
/// Windows of `own_pid` are skipped so the overlay never hides or exposes the
/// window beneath it. Returns `false` as soon as one point lands on `target`.
pub fn occluded_in_stack(
    stack: &[StackedWindow],
    target: WindowHandle,
    rect: ScreenRect,
    own_pid: u32,
) -> bool {
    if rect.is_empty() {
        return true;
    }
    for row in 0..OCCLUSION_GRID {
        for col in 0..OCCLUSION_GRID {
            let point = (
                rect.x + rect.width * (2 * col + 1) / (2 * OCCLUSION_GRID),
                rect.y + rect.height * (2 * row + 1) / (2 * OCCLUSION_GRID),
            );
            let hit = stack
                .iter()
                .find(|w| w.pid != own_pid && w.rect.contains(point));
            if hit.is_some_and(|w| w.handle == target) {
                return false;
            }
        }
    }
    true
}

/// Opt the process into per-monitor DPI awareness so window rectangles and
/// captures share one coordinate space.
pub fn enable_dpi_awareness() {
    #[cfg(windows)]
    platform::enable_dpi_awareness();
}

#[cfg(windows)]
pub use platform::Win32WindowSystem;

#[cfg(windows)]
mod platform {
    use super::{occluded_in_stack, StackedWindow, WindowHandle, WindowInfo, WindowSystem};
    use crate::blur::geometry::ScreenRect;
    use hashlink::LruCache;
    use std::ffi::c_void;
    use std::mem;
    use std::sync::Mutex;
    use windows::core::PWSTR;
    use windows::Win32::Foundation::{CloseHandle, BOOL, HWND, LPARAM, POINT, RECT};
    use windows::Win32::Graphics::Dwm::{
        DwmGetWindowAttribute, DWMWA_CLOAKED, DWMWA_EXTENDED_FRAME_BOUNDS,
    };
    use windows::Win32::System::Threading::{
        OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
        PROCESS_QUERY_LIMITED_INFORMATION,
    };
    use windows::Win32::UI::HiDpi::{
        GetDpiForWindow, SetProcessDpiAwarenessContext,
        DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        EnumWindows, GetAncestor, GetCursorPos, GetForegroundWindow, GetSystemMetrics,
        GetWindowRect, GetWindowTextLengthW, GetWindowTextW, GetWindowThreadProcessId, IsIconic,
        IsWindow, IsWindowVisible, GA_ROOTOWNER, SM_CXVIRTUALSCREEN,
        SM_CYVIRTUALSCREEN, SM_XVIRTUALSCREEN, SM_YVIRTUALSCREEN,
    };

    const PROCESS_NAME_CACHE_SIZE: usize = 100;

    pub(super) fn enable_dpi_awareness() {
        unsafe {
            if let Err(err) =
                SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2)
            {
                // Already set by a manifest or an earlier call.
                tracing::debug!(%err, "per-monitor DPI awareness not applied");
            }
        }
    }

    fn hwnd(handle: WindowHandle) -> HWND {
        HWND(handle.0 as *mut c_void)
    }

    pub struct Win32WindowSystem {
        process_names: Mutex<LruCache<u32, String>>,
    }

    impl Default for Win32WindowSystem {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Win32WindowSystem {
        pub fn new() -> Self {
            Self {
                process_names: Mutex::new(LruCache::new(PROCESS_NAME_CACHE_SIZE)),
            }
        }

        fn enumerate_handles() -> Vec<isize> {
            unsafe extern "system" fn enum_proc(hwnd: HWND, data: LPARAM) -> BOOL {
                let handles = unsafe { &mut *(data.0 as *mut Vec<isize>) };
                handles.push(hwnd.0 as isize);
                BOOL(1)
            }

            let mut handles: Vec<isize> = Vec::new();
            unsafe {
                let _ = EnumWindows(
                    Some(enum_proc),
                    LPARAM(&mut handles as *mut Vec<isize> as isize),
                );
            }
            handles
        }

        fn title(hwnd: HWND) -> String {
            unsafe {
                let len = GetWindowTextLengthW(hwnd);
                if len <= 0 {
                    return String::new();
                }
                let mut buf = vec![0u16; len as usize + 1];
                let copied = GetWindowTextW(hwnd, &mut buf);
                String::from_utf16_lossy(&buf[..copied.max(0) as usize])
            }
        }

        fn pid(hwnd: HWND) -> u32 {
            let mut pid = 0u32;
            unsafe {
                GetWindowThreadProcessId(hwnd, Some(&mut pid as *mut u32));
            }
            pid
        }

        fn is_cloaked(hwnd: HWND) -> bool {
            let mut cloaked = 0u32;
            unsafe {
                DwmGetWindowAttribute(
                    hwnd,
                    DWMWA_CLOAKED,
                    &mut cloaked as *mut u32 as *mut c_void,
                    mem::size_of::<u32>() as u32,
                )
                .is_ok()
                    && cloaked != 0
            }
        }

        fn frame_rect(hwnd: HWND) -> Option<ScreenRect> {
            let mut rect = RECT::default();
            unsafe {
                let dwm = DwmGetWindowAttribute(
                    hwnd,
                    DWMWA_EXTENDED_FRAME_BOUNDS,
                    &mut rect as *mut RECT as *mut c_void,
                    mem::size_of::<RECT>() as u32,
                );
                if dwm.is_err() && GetWindowRect(hwnd, &mut rect).is_err() {
                    return None;
                }
            }
            Some(ScreenRect::from_ltrb(
                rect.left,
                rect.top,
                rect.right,
                rect.bottom,
            ))
        }

        fn scale_factor(hwnd: HWND) -> f32 {
            let dpi = unsafe { GetDpiForWindow(hwnd) };
            if dpi == 0 {
                1.0
            } else {
                dpi as f32 / 96.0
            }
        }

        fn process_name(&self, pid: u32) -> String {
            if let Ok(mut cache) = self.process_names.lock() {
                if let Some(name) = cache.get(&pid) {
                    return name.clone();
                }
            }
            let name = query_process_name(pid).unwrap_or_default();
            if !name.is_empty() {
                if let Ok(mut cache) = self.process_names.lock() {
                    cache.insert(pid, name.clone());
                }
            }
            name
        }

        /// Shown top-level windows, topmost first, with owned popups folded
        /// into their root owner.
        fn window_stack() -> Vec<StackedWindow> {
            let mut stack = Vec::new();
            for raw in Self::enumerate_handles() {
                let hwnd = HWND(raw as *mut c_void);
                let shown = unsafe { IsWindowVisible(hwnd).as_bool() && !IsIconic(hwnd).as_bool() };
                if !shown || Self::is_cloaked(hwnd) {
                    continue;
                }
                let Some(rect) = Self::frame_rect(hwnd) else {
                    continue;
                };
                let root = unsafe { GetAncestor(hwnd, GA_ROOTOWNER) };
                let root = if root.0.is_null() { hwnd } else { root };
                stack.push(StackedWindow {
                    handle: WindowHandle(root.0 as isize),
                    pid: Self::pid(hwnd),
                    rect,
                });
            }
            stack
        }
    }

    fn query_process_name(pid: u32) -> Option<String> {
        unsafe {
            let process = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid).ok()?;
            let mut buf = [0u16; 1024];
            let mut len = buf.len() as u32;
            let result = QueryFullProcessImageNameW(
                process,
                PROCESS_NAME_WIN32,
                PWSTR(buf.as_mut_ptr()),
                &mut len,
            );
            let _ = CloseHandle(process);
            result.ok()?;
            let path = String::from_utf16_lossy(&buf[..len as usize]);
            path.rsplit(['\\', '/'])
                .next()
                .map(|name| name.to_ascii_lowercase())
        }
    }

    impl WindowSystem for Win32WindowSystem {
        fn top_level_windows(&self) -> Vec<WindowInfo> {
            let mut windows = Vec::new();
            for raw in Self::enumerate_handles() {
                let hwnd = HWND(raw as *mut c_void);
                let visible = unsafe { IsWindowVisible(hwnd) }.as_bool();
                if !visible || Self::is_cloaked(hwnd) {
                    continue;
                }
                let title = Self::title(hwnd);
                if title.is_empty() {
                    continue;
                }
                let Some(rect) = Self::frame_rect(hwnd) else {
                    continue;
                };
                let pid = Self::pid(hwnd);
                windows.push(WindowInfo {
                    handle: WindowHandle(raw),
                    title,
                    process_name: self.process_name(pid),
                    pid,
                    rect,
                    scale_factor: Self::scale_factor(hwnd),
                });
            }
            windows
        }

        fn window_rect(&self, handle: WindowHandle) -> Option<ScreenRect> {
            if !self.is_alive(handle) {
                return None;
            }
            Self::frame_rect(hwnd(handle))
        }

        fn is_alive(&self, handle: WindowHandle) -> bool {
            unsafe { IsWindow(hwnd(handle)) }.as_bool()
        }

        fn is_visible(&self, handle: WindowHandle) -> bool {
            let hwnd = hwnd(handle);
            unsafe { IsWindowVisible(hwnd) }.as_bool() && !Self::is_cloaked(hwnd)
        }

        fn is_minimized(&self, handle: WindowHandle) -> bool {
            unsafe { IsIconic(hwnd(handle)) }.as_bool()
        }

        fn foreground_window(&self) -> Option<WindowHandle> {
            let fg = unsafe { GetForegroundWindow() };
            if fg.0.is_null() {
                return None;
            }
            let root = unsafe { GetAncestor(fg, GA_ROOTOWNER) };
            let root = if root.0.is_null() { fg } else { root };
            Some(WindowHandle(root.0 as isize))
        }

        fn is_fully_occluded(&self, handle: WindowHandle, rect: ScreenRect) -> bool {
            occluded_in_stack(&Self::window_stack(), handle, rect, self.current_process_id())
        }

        fn virtual_screen(&self) -> ScreenRect {
            unsafe {
                ScreenRect::new(
                    GetSystemMetrics(SM_XVIRTUALSCREEN),
                    GetSystemMetrics(SM_YVIRTUALSCREEN),
                    GetSystemMetrics(SM_CXVIRTUALSCREEN),
                    GetSystemMetrics(SM_CYVIRTUALSCREEN),
                )
            }
        }

        fn cursor_position(&self) -> Option<(i32, i32)> {
            let mut point = POINT::default();
            unsafe { GetCursorPos(&mut point) }.ok()?;
            Some((point.x, point.y))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: WindowHandle = WindowHandle(1);
    const OWN_PID: u32 = 7;

    fn entry(handle: isize, pid: u32, rect: ScreenRect) -> StackedWindow {
        StackedWindow {
            handle: WindowHandle(handle),
            pid,
            rect,
        }
    }

    #[test]
    fn own_windows_are_looked_through() {
        let rect = ScreenRect::new(0, 0, 600, 600);
        let stack = [entry(99, OWN_PID, rect), entry(1, 100, rect)];
        assert!(!occluded_in_stack(&stack, TARGET, rect, OWN_PID));
    }

    #[test]
    fn foreign_window_under_own_overlay_still_occludes() {
        let rect = ScreenRect::new(0, 0, 600, 600);
        let stack = [
            entry(99, OWN_PID, rect),
            entry(2, 200, ScreenRect::new(-10, -10, 700, 700)),
            entry(1, 100, rect),
        ];
        assert!(occluded_in_stack(&stack, TARGET, rect, OWN_PID));
    }

    #[test]
    fn one_exposed_sample_is_enough() {
        let rect = ScreenRect::new(0, 0, 600, 600);
        // Covers everything except the right-hand column of samples.
        let stack = [entry(2, 200, ScreenRect::new(0, 0, 400, 600)), entry(1, 100, rect)];
        assert!(!occluded_in_stack(&stack, TARGET, rect, OWN_PID));
    }

    #[test]
    fn empty_rect_counts_as_occluded() {
        assert!(occluded_in_stack(&[], TARGET, ScreenRect::new(0, 0, 0, 0), OWN_PID));
    }
}
