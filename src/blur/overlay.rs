use crate::blur::effect::EffectResult;
use crate::blur::geometry::ScreenRect;
use image::RgbaImage;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OverlayError {
    #[error("overlay window could not be created: {0}")]
    CreateFailed(String),
    #[error("overlay window is not built")]
    NotBuilt,
    #[error("overlay window operation failed: {0}")]
    Os(String),
}

/// Native window backing an [`OverlayWindow`].
///
/// Callers always build hidden, configure the layer and only then reveal, so
/// no blank frame is ever shown.
pub trait OverlaySurface {
    /// Create the window at `rect` with `image` as content without showing it.
    fn build_hidden(&mut self, rect: ScreenRect, image: &RgbaImage) -> Result<(), OverlayError>;
    /// Show the built window above every other window without activating it.
    fn reveal(&mut self) -> Result<(), OverlayError>;
    /// Move to `rect` and replace the content. `image` matches `rect`'s size.
    fn set_geometry(&mut self, rect: ScreenRect, image: &RgbaImage) -> Result<(), OverlayError>;
    fn set_layer(&mut self, alpha: u8, clickthrough: bool) -> Result<(), OverlayError>;
    /// Ask the compositor for rounded window corners. Not every system
    /// supports it.
    fn round_corners(&mut self) -> Result<(), OverlayError> {
        Ok(())
    }
    /// Drop the window and its pixel buffer. Safe to call when nothing is built.
    fn release(&mut self);
    /// Dispatch pending window messages.
    fn pump_messages(&mut self) {}
}

/// Narrow access for code that may only flip transparency.
pub trait VisibilityControl {
    fn set_visibility(&mut self, alpha: f32, clickthrough: bool) -> Result<(), OverlayError>;
}

fn alpha_byte(alpha: f32) -> u8 {
    (alpha.clamp(0.0, 1.0) * 255.0).round() as u8
}

pub struct OverlayWindow {
    surface: Box<dyn OverlaySurface>,
    live: bool,
    rect: Option<ScreenRect>,
    alpha: f32,
    clickthrough: bool,
    rounded: bool,
}

impl OverlayWindow {
    pub fn new(surface: Box<dyn OverlaySurface>) -> Self {
        Self {
            surface,
            live: false,
            rect: None,
            alpha: 1.0,
            clickthrough: false,
            rounded: false,
        }
    }

    /// Match the rounded frame of Windows 11 app windows.
    pub fn with_rounded_corners(mut self, rounded: bool) -> Self {
        self.rounded = rounded;
        self
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn rect(&self) -> Option<ScreenRect> {
        self.rect
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn is_clickthrough(&self) -> bool {
        self.clickthrough
    }

    /// Build and reveal the overlay, or move and resample a live one.
    pub fn create_or_update(
        &mut self,
        rect: ScreenRect,
        content: &EffectResult,
    ) -> Result<(), OverlayError> {
        if rect.is_empty() {
            return Err(OverlayError::Os(format!("empty overlay rect {rect:?}")));
        }
        if self.live && self.rect == Some(rect) {
            return Ok(());
        }
        let target_size = (rect.width as u32, rect.height as u32);
        let resampled;
        let image = if content.size() == target_size {
            &content.image
        } else {
            resampled = content.resized(target_size.0, target_size.1);
            &resampled.image
        };

        if self.live {
            self.surface.set_geometry(rect, image)?;
            self.rect = Some(rect);
            tracing::trace!(?rect, "overlay repositioned");
            return Ok(());
        }

        let built = self.surface.build_hidden(rect, image).and_then(|_| {
            if self.rounded {
                if let Err(err) = self.surface.round_corners() {
                    tracing::debug!(%err, "rounded overlay corners unavailable");
                }
            }
            self.surface.set_layer(255, false)?;
            self.surface.reveal()
        });
        if let Err(err) = built {
            self.surface.release();
            return Err(err);
        }
        self.live = true;
        self.rect = Some(rect);
        self.alpha = 1.0;
        self.clickthrough = false;
        tracing::debug!(?rect, "overlay revealed");
        Ok(())
    }

    pub fn set_visibility(&mut self, alpha: f32, clickthrough: bool) -> Result<(), OverlayError> {
        if !self.live {
            return Err(OverlayError::NotBuilt);
        }
        let alpha = alpha.clamp(0.0, 1.0);
        if alpha_byte(alpha) == alpha_byte(self.alpha) && clickthrough == self.clickthrough {
            return Ok(());
        }
        self.surface.set_layer(alpha_byte(alpha), clickthrough)?;
        self.alpha = alpha;
        self.clickthrough = clickthrough;
        Ok(())
    }

    pub fn destroy(&mut self) {
        if self.live {
            tracing::debug!(rect = ?self.rect, "overlay destroyed");
        }
        self.surface.release();
        self.live = false;
        self.rect = None;
        self.alpha = 1.0;
        self.clickthrough = false;
    }

    pub fn pump_messages(&mut self) {
        self.surface.pump_messages();
    }
}

impl VisibilityControl for OverlayWindow {
    fn set_visibility(&mut self, alpha: f32, clickthrough: bool) -> Result<(), OverlayError> {
        OverlayWindow::set_visibility(self, alpha, clickthrough)
    }
}

impl Drop for OverlayWindow {
    fn drop(&mut self) {
        self.surface.release();
    }
}

#[cfg(windows)]
pub use platform::{compose_overlay_window_ex_style, Win32OverlaySurface};

#[cfg(windows)]
mod platform {
    use super::{OverlayError, OverlaySurface};
    use crate::blur::geometry::ScreenRect;
    use crate::blur::messages::BlurCommand;
    use image::RgbaImage;
    use once_cell::sync::Lazy;
    use std::collections::HashMap;
    use std::mem;
    use std::ptr;
    use std::sync::mpsc::Sender;
    use std::sync::Mutex;
    use std::sync::Once;
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::{COLORREF, HANDLE, HWND, LPARAM, LRESULT, WPARAM};
    use windows::Win32::Graphics::Dwm::{
        DwmSetWindowAttribute, DWMWA_WINDOW_CORNER_PREFERENCE, DWMWCP_ROUND,
    };
    use windows::Win32::Graphics::Gdi::{
        BeginPaint, BitBlt, CreateCompatibleDC, CreateDIBSection, DeleteDC, DeleteObject, EndPaint,
        InvalidateRect, SelectObject, UpdateWindow, BITMAPINFO, BITMAPINFOHEADER, BI_RGB,
        DIB_RGB_COLORS, HBITMAP, HDC, HGDIOBJ, PAINTSTRUCT, SRCCOPY,
    };
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::UI::WindowsAndMessaging::{
        CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetWindowLongPtrW,
        PeekMessageW, RegisterClassW, SetLayeredWindowAttributes, SetWindowLongPtrW,
        SetWindowPos, TranslateMessage, GWLP_USERDATA, GWL_EXSTYLE, HWND_TOPMOST, LWA_ALPHA,
        MA_NOACTIVATE, MSG, PM_REMOVE, SWP_NOACTIVATE, SWP_SHOWWINDOW, WINDOW_EX_STYLE,
        WINDOW_STYLE, WM_ERASEBKGND, WM_MOUSEACTIVATE, WM_MOUSEMOVE, WM_PAINT, WNDCLASSW,
        WS_EX_LAYERED, WS_EX_NOACTIVATE, WS_EX_TOOLWINDOW, WS_EX_TOPMOST, WS_EX_TRANSPARENT,
        WS_POPUP,
    };

    static POINTER_SENDERS: Lazy<Mutex<HashMap<isize, Sender<BlurCommand>>>> =
        Lazy::new(|| Mutex::new(HashMap::new()));

    const CLASS_NAME: &str = "WhatsAppBlurOverlay";

    pub fn compose_overlay_window_ex_style() -> WINDOW_EX_STYLE {
        WS_EX_LAYERED | WS_EX_TOPMOST | WS_EX_TOOLWINDOW | WS_EX_NOACTIVATE
    }

    fn widestring(value: &str) -> Vec<u16> {
        use std::os::windows::ffi::OsStrExt;
        std::ffi::OsStr::new(value)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect()
    }

    unsafe extern "system" fn overlay_wndproc(
        hwnd: HWND,
        msg: u32,
        wparam: WPARAM,
        lparam: LPARAM,
    ) -> LRESULT {
        match msg {
            WM_ERASEBKGND => LRESULT(1),
            WM_PAINT => {
                let mut ps = PAINTSTRUCT::default();
                let hdc = unsafe { BeginPaint(hwnd, &mut ps) };
                if !hdc.0.is_null() {
                    let mem_dc = HDC(unsafe { GetWindowLongPtrW(hwnd, GWLP_USERDATA) } as *mut _);
                    if !mem_dc.0.is_null() {
                        let _ = unsafe {
                            BitBlt(
                                hdc,
                                ps.rcPaint.left,
                                ps.rcPaint.top,
                                ps.rcPaint.right - ps.rcPaint.left,
                                ps.rcPaint.bottom - ps.rcPaint.top,
                                mem_dc,
                                ps.rcPaint.left,
                                ps.rcPaint.top,
                                SRCCOPY,
                            )
                        };
                    }
                }
                unsafe {
                    let _ = EndPaint(hwnd, &ps);
                }
                LRESULT(0)
            }
            // Clicking the shield must not steal focus from the window below.
            WM_MOUSEACTIVATE => LRESULT(MA_NOACTIVATE as isize),
            WM_MOUSEMOVE => {
                if let Ok(senders) = POINTER_SENDERS.lock() {
                    if let Some(tx) = senders.get(&(hwnd.0 as isize)) {
                        let _ = tx.send(BlurCommand::PointerEntered);
                    }
                }
                LRESULT(0)
            }
            _ => unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) },
        }
    }

    struct DibSection {
        mem_dc: HDC,
        dib: HBITMAP,
        old_bitmap: HGDIOBJ,
        bits: *mut u8,
        width: i32,
        height: i32,
    }

    impl DibSection {
        fn create(width: i32, height: i32) -> Result<Self, OverlayError> {
            let mem_dc = unsafe { CreateCompatibleDC(HDC::default()) };
            if mem_dc.0.is_null() {
                return Err(OverlayError::CreateFailed("CreateCompatibleDC failed".into()));
            }
            let mut bmi = BITMAPINFO::default();
            bmi.bmiHeader = BITMAPINFOHEADER {
                biSize: mem::size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: width,
                biHeight: -height,
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_RGB.0,
                ..Default::default()
            };
            let mut bits: *mut core::ffi::c_void = ptr::null_mut();
            let dib = unsafe {
                CreateDIBSection(mem_dc, &bmi, DIB_RGB_COLORS, &mut bits, HANDLE::default(), 0)
            };
            let dib = match dib {
                Ok(dib) if !bits.is_null() => dib,
                Ok(dib) => {
                    unsafe {
                        let _ = DeleteObject(dib);
                        let _ = DeleteDC(mem_dc);
                    }
                    return Err(OverlayError::CreateFailed("DIB section has no pixels".into()));
                }
                Err(err) => {
                    unsafe {
                        let _ = DeleteDC(mem_dc);
                    }
                    return Err(OverlayError::CreateFailed(format!(
                        "CreateDIBSection failed: {err}"
                    )));
                }
            };
            let old_bitmap = unsafe { SelectObject(mem_dc, dib) };
            Ok(Self {
                mem_dc,
                dib,
                old_bitmap,
                bits: bits as *mut u8,
                width,
                height,
            })
        }

        fn write_rgba(&mut self, image: &RgbaImage) {
            let len = (self.width as usize) * (self.height as usize) * 4;
            if image.as_raw().len() != len {
                return;
            }
            let pixels = unsafe { std::slice::from_raw_parts_mut(self.bits, len) };
            for (dst, src) in pixels.chunks_exact_mut(4).zip(image.as_raw().chunks_exact(4)) {
                dst[0] = src[2];
                dst[1] = src[1];
                dst[2] = src[0];
                dst[3] = 255;
            }
        }

        fn release(&mut self) {
            unsafe {
                let _ = SelectObject(self.mem_dc, self.old_bitmap);
                let _ = DeleteObject(self.dib);
                let _ = DeleteDC(self.mem_dc);
            }
            self.bits = ptr::null_mut();
        }
    }

    /// Layered popup window painted from a DIB section.
    pub struct Win32OverlaySurface {
        hwnd: HWND,
        dib: Option<DibSection>,
        rect: ScreenRect,
        pointer_tx: Sender<BlurCommand>,
    }

    impl Win32OverlaySurface {
        /// Pointer movement over the window is reported on `pointer_tx`.
        pub fn new(pointer_tx: Sender<BlurCommand>) -> Self {
            Self {
                hwnd: HWND::default(),
                dib: None,
                rect: ScreenRect::default(),
                pointer_tx,
            }
        }

        fn attach_dib(&mut self, dib: DibSection) {
            unsafe {
                let _ = SetWindowLongPtrW(self.hwnd, GWLP_USERDATA, dib.mem_dc.0 as isize);
            }
            if let Some(mut old) = self.dib.replace(dib) {
                old.release();
            }
        }

        fn place(&self, flags_show: bool) -> Result<(), OverlayError> {
            let flags = if flags_show {
                SWP_NOACTIVATE | SWP_SHOWWINDOW
            } else {
                SWP_NOACTIVATE
            };
            unsafe {
                SetWindowPos(
                    self.hwnd,
                    HWND_TOPMOST,
                    self.rect.x,
                    self.rect.y,
                    self.rect.width,
                    self.rect.height,
                    flags,
                )
            }
            .map_err(|err| OverlayError::Os(format!("SetWindowPos failed: {err}")))
        }
    }

    impl OverlaySurface for Win32OverlaySurface {
        fn build_hidden(&mut self, rect: ScreenRect, image: &RgbaImage) -> Result<(), OverlayError> {
            self.release();

            static REGISTER_CLASS: Once = Once::new();
            let class_name = widestring(CLASS_NAME);
            let hinstance = unsafe { GetModuleHandleW(PCWSTR::null()) }
                .map_err(|err| OverlayError::CreateFailed(format!("GetModuleHandleW: {err}")))?;

            REGISTER_CLASS.call_once(|| unsafe {
                let wc = WNDCLASSW {
                    hInstance: hinstance.into(),
                    lpszClassName: PCWSTR(class_name.as_ptr()),
                    lpfnWndProc: Some(overlay_wndproc),
                    ..Default::default()
                };
                let _ = RegisterClassW(&wc);
            });

            let hwnd = unsafe {
                CreateWindowExW(
                    compose_overlay_window_ex_style(),
                    PCWSTR(class_name.as_ptr()),
                    PCWSTR::null(),
                    WINDOW_STYLE(WS_POPUP.0),
                    rect.x,
                    rect.y,
                    rect.width,
                    rect.height,
                    None,
                    None,
                    hinstance,
                    None,
                )
            }
            .map_err(|err| OverlayError::CreateFailed(format!("CreateWindowExW: {err}")))?;
            self.hwnd = hwnd;
            self.rect = rect;

            let mut dib = match DibSection::create(rect.width, rect.height) {
                Ok(dib) => dib,
                Err(err) => {
                    self.release();
                    return Err(err);
                }
            };
            dib.write_rgba(image);
            self.attach_dib(dib);

            if let Ok(mut senders) = POINTER_SENDERS.lock() {
                senders.insert(hwnd.0 as isize, self.pointer_tx.clone());
            }
            Ok(())
        }

        fn reveal(&mut self) -> Result<(), OverlayError> {
            if self.hwnd.0.is_null() {
                return Err(OverlayError::NotBuilt);
            }
            self.place(true)?;
            unsafe {
                let _ = InvalidateRect(self.hwnd, None, false);
                let _ = UpdateWindow(self.hwnd);
            }
            Ok(())
        }

        fn set_geometry(&mut self, rect: ScreenRect, image: &RgbaImage) -> Result<(), OverlayError> {
            if self.hwnd.0.is_null() {
                return Err(OverlayError::NotBuilt);
            }
            let resized = self
                .dib
                .as_ref()
                .map_or(true, |dib| (dib.width, dib.height) != rect.size());
            if resized {
                let dib = DibSection::create(rect.width, rect.height)?;
                self.attach_dib(dib);
            }
            if let Some(dib) = self.dib.as_mut() {
                dib.write_rgba(image);
            }
            self.rect = rect;
            self.place(false)?;
            unsafe {
                let _ = InvalidateRect(self.hwnd, None, false);
            }
            Ok(())
        }

        fn set_layer(&mut self, alpha: u8, clickthrough: bool) -> Result<(), OverlayError> {
            if self.hwnd.0.is_null() {
                return Err(OverlayError::NotBuilt);
            }
            unsafe {
                let ex_style = GetWindowLongPtrW(self.hwnd, GWL_EXSTYLE);
                let transparent = WS_EX_TRANSPARENT.0 as isize;
                let updated = if clickthrough {
                    ex_style | transparent
                } else {
                    ex_style & !transparent
                };
                if updated != ex_style {
                    let _ = SetWindowLongPtrW(self.hwnd, GWL_EXSTYLE, updated);
                }
                SetLayeredWindowAttributes(self.hwnd, COLORREF(0), alpha, LWA_ALPHA)
                    .map_err(|err| OverlayError::Os(format!("SetLayeredWindowAttributes: {err}")))
            }
        }

        fn round_corners(&mut self) -> Result<(), OverlayError> {
            if self.hwnd.0.is_null() {
                return Err(OverlayError::NotBuilt);
            }
            let preference = DWMWCP_ROUND;
            unsafe {
                DwmSetWindowAttribute(
                    self.hwnd,
                    DWMWA_WINDOW_CORNER_PREFERENCE,
                    &preference as *const _ as *const core::ffi::c_void,
                    mem::size_of_val(&preference) as u32,
                )
            }
            .map_err(|err| OverlayError::Os(format!("DwmSetWindowAttribute: {err}")))
        }

        fn release(&mut self) {
            if !self.hwnd.0.is_null() {
                if let Ok(mut senders) = POINTER_SENDERS.lock() {
                    senders.remove(&(self.hwnd.0 as isize));
                }
                unsafe {
                    let _ = SetWindowLongPtrW(self.hwnd, GWLP_USERDATA, 0);
                    let _ = DestroyWindow(self.hwnd);
                }
                self.hwnd = HWND::default();
            }
            if let Some(mut dib) = self.dib.take() {
                dib.release();
            }
        }

        fn pump_messages(&mut self) {
            unsafe {
                let mut msg = MSG::default();
                while PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_REMOVE).into() {
                    let _ = TranslateMessage(&msg);
                    let _ = DispatchMessageW(&msg);
                }
            }
        }
    }

    impl Drop for Win32OverlaySurface {
        fn drop(&mut self) {
            self.release();
        }
    }
}
