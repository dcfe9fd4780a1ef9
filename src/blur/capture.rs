use crate::blur::geometry::ScreenRect;
use image::RgbaImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Region grabbed by the diagnostic capture.
pub const TEST_CAPTURE_RECT: ScreenRect = ScreenRect::new(0, 0, 400, 300);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("capture region {width}x{height} is too small")]
    InvalidRegion { width: i32, height: i32 },
    #[error("another capture is already in progress")]
    Busy,
    #[error("screen capture was denied by the system")]
    PermissionDenied,
    #[error("screen capture failed: {0}")]
    Failed(String),
}

impl CaptureError {
    /// Transient errors just skip the current cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Busy | Self::InvalidRegion { .. })
    }
}

/// Reads raw screen pixels.
pub trait ScreenGrabber: Send + Sync {
    fn grab(&self, rect: ScreenRect) -> Result<RgbaImage, CaptureError>;
}

#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub rect: ScreenRect,
    pub image: RgbaImage,
}

pub struct RegionCapturer {
    grabber: Arc<dyn ScreenGrabber>,
    settle: Duration,
    min_size: i32,
    in_flight: AtomicBool,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RegionCapturer {
    pub fn new(grabber: Arc<dyn ScreenGrabber>, settle: Duration, min_size: i32) -> Self {
        Self {
            grabber,
            settle,
            min_size: min_size.max(1),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn capture(&self, rect: ScreenRect) -> Result<CapturedFrame, CaptureError> {
        if rect.width < self.min_size || rect.height < self.min_size {
            return Err(CaptureError::InvalidRegion {
                width: rect.width,
                height: rect.height,
            });
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CaptureError::Busy);
        }
        let _guard = InFlight(&self.in_flight);

        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }
        let image = self.grabber.grab(rect)?;
        if (image.width(), image.height()) != (rect.width as u32, rect.height as u32) {
            return Err(CaptureError::Failed(format!(
                "expected {}x{} pixels, got {}x{}",
                rect.width,
                rect.height,
                image.width(),
                image.height()
            )));
        }
        tracing::trace!(?rect, "captured region");
        Ok(CapturedFrame { rect, image })
    }

    /// Capture a fixed corner of the primary screen to check that screen
    /// capture works at all.
    pub fn test_capture(&self) -> Result<CapturedFrame, CaptureError> {
        self.capture(TEST_CAPTURE_RECT)
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

#[cfg(windows)]
pub use platform::GdiScreenGrabber;

#[cfg(windows)]
mod platform {
    use super::{CaptureError, ScreenGrabber};
    use crate::blur::geometry::ScreenRect;
    use image::RgbaImage;
    use windows::Win32::Foundation::{E_ACCESSDENIED, HWND};
    use windows::Win32::Graphics::Gdi::{
        BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC,
        GetDIBits, ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, CAPTUREBLT,
        DIB_RGB_COLORS, HGDIOBJ, ROP_CODE, SRCCOPY,
    };

    /// Desktop capture through GDI `BitBlt`.
    #[derive(Debug, Default)]
    pub struct GdiScreenGrabber;

    impl ScreenGrabber for GdiScreenGrabber {
        fn grab(&self, rect: ScreenRect) -> Result<RgbaImage, CaptureError> {
            if rect.is_empty() {
                return Err(CaptureError::InvalidRegion {
                    width: rect.width,
                    height: rect.height,
                });
            }

            unsafe {
                let screen_dc = GetDC(HWND::default());
                if screen_dc.0.is_null() {
                    return Err(CaptureError::Failed("GetDC failed".into()));
                }
                let mem_dc = CreateCompatibleDC(screen_dc);
                if mem_dc.0.is_null() {
                    let _ = ReleaseDC(HWND::default(), screen_dc);
                    return Err(CaptureError::Failed("CreateCompatibleDC failed".into()));
                }
                let bmp = CreateCompatibleBitmap(screen_dc, rect.width, rect.height);
                if bmp.0.is_null() {
                    let _ = DeleteDC(mem_dc);
                    let _ = ReleaseDC(HWND::default(), screen_dc);
                    return Err(CaptureError::Failed("CreateCompatibleBitmap failed".into()));
                }

                let old_obj = SelectObject(mem_dc, HGDIOBJ(bmp.0));
                let blit = BitBlt(
                    mem_dc,
                    0,
                    0,
                    rect.width,
                    rect.height,
                    screen_dc,
                    rect.x,
                    rect.y,
                    ROP_CODE(SRCCOPY.0 | CAPTUREBLT.0),
                );

                if let Err(err) = blit {
                    let _ = SelectObject(mem_dc, old_obj);
                    let _ = DeleteObject(bmp);
                    let _ = DeleteDC(mem_dc);
                    let _ = ReleaseDC(HWND::default(), screen_dc);
                    if err.code() == E_ACCESSDENIED {
                        return Err(CaptureError::PermissionDenied);
                    }
                    return Err(CaptureError::Failed(format!("BitBlt failed: {err}")));
                }

                let mut bmi = BITMAPINFO::default();
                bmi.bmiHeader = BITMAPINFOHEADER {
                    biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: rect.width,
                    biHeight: -rect.height,
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0,
                    ..Default::default()
                };

                let mut bgra = vec![0u8; (rect.width as usize) * (rect.height as usize) * 4];
                let rows = GetDIBits(
                    mem_dc,
                    bmp,
                    0,
                    rect.height as u32,
                    Some(bgra.as_mut_ptr() as *mut _),
                    &mut bmi,
                    DIB_RGB_COLORS,
                );

                let _ = SelectObject(mem_dc, old_obj);
                let _ = DeleteObject(bmp);
                let _ = DeleteDC(mem_dc);
                let _ = ReleaseDC(HWND::default(), screen_dc);

                if rows == 0 {
                    return Err(CaptureError::Failed("GetDIBits failed".into()));
                }

                for px in bgra.chunks_exact_mut(4) {
                    px.swap(0, 2);
                    px[3] = 255;
                }

                RgbaImage::from_raw(rect.width as u32, rect.height as u32, bgra)
                    .ok_or_else(|| CaptureError::Failed("pixel buffer size mismatch".into()))
            }
        }
    }
}
