mod common;

use common::{FakeSurface, SurfaceCall};
use image::{Rgba, RgbaImage};
use whatsapp_blur::blur::effect::EffectResult;
use whatsapp_blur::blur::geometry::ScreenRect;
use whatsapp_blur::blur::overlay::{OverlayError, OverlayWindow};

fn content(width: u32, height: u32) -> EffectResult {
    EffectResult {
        image: RgbaImage::from_pixel(width, height, Rgba([200, 200, 200, 255])),
    }
}

fn overlay() -> (OverlayWindow, FakeSurface) {
    let surface = FakeSurface::default();
    (OverlayWindow::new(Box::new(surface.clone())), surface)
}

#[test]
fn reveal_happens_after_layer_is_configured() {
    let (mut overlay, surface) = overlay();
    let rect = ScreenRect::new(100, 100, 300, 200);

    overlay.create_or_update(rect, &content(300, 200)).unwrap();

    assert!(overlay.is_live());
    assert_eq!(overlay.rect(), Some(rect));
    assert_eq!(
        surface.calls(),
        vec![
            SurfaceCall::Build(rect),
            SurfaceCall::Layer(255, false),
            SurfaceCall::Reveal
        ]
    );
}

#[test]
fn rounded_corners_are_requested_before_reveal() {
    let surface = FakeSurface::default();
    let mut overlay = OverlayWindow::new(Box::new(surface.clone())).with_rounded_corners(true);
    let rect = ScreenRect::new(100, 100, 300, 200);

    overlay.create_or_update(rect, &content(300, 200)).unwrap();

    assert_eq!(
        surface.calls(),
        vec![
            SurfaceCall::Build(rect),
            SurfaceCall::RoundCorners,
            SurfaceCall::Layer(255, false),
            SurfaceCall::Reveal
        ]
    );
}

#[test]
fn missing_corner_support_still_reveals() {
    let surface = FakeSurface::default();
    surface.corners_unsupported(true);
    let mut overlay = OverlayWindow::new(Box::new(surface.clone())).with_rounded_corners(true);
    let rect = ScreenRect::new(100, 100, 300, 200);

    overlay.create_or_update(rect, &content(300, 200)).unwrap();

    assert!(overlay.is_live());
    assert_eq!(surface.calls().last(), Some(&SurfaceCall::Reveal));
    assert!(!surface.calls().contains(&SurfaceCall::RoundCorners));
}

#[test]
fn same_rect_is_a_no_op() {
    let (mut overlay, surface) = overlay();
    let rect = ScreenRect::new(0, 0, 300, 200);
    overlay.create_or_update(rect, &content(300, 200)).unwrap();
    surface.clear();

    overlay.create_or_update(rect, &content(300, 200)).unwrap();
    assert!(surface.calls().is_empty());
}

#[test]
fn live_overlay_moves_and_resamples() {
    let (mut overlay, surface) = overlay();
    overlay
        .create_or_update(ScreenRect::new(0, 0, 300, 200), &content(300, 200))
        .unwrap();
    surface.clear();

    let moved = ScreenRect::new(50, 60, 320, 210);
    overlay.create_or_update(moved, &content(300, 200)).unwrap();

    assert_eq!(surface.calls(), vec![SurfaceCall::Geometry(moved, 320, 210)]);
    assert_eq!(overlay.rect(), Some(moved));
}

#[test]
fn content_is_resampled_before_first_build() {
    let (mut overlay, surface) = overlay();
    let rect = ScreenRect::new(0, 0, 250, 180);
    // FakeSurface asserts that the image matches the rect.
    overlay.create_or_update(rect, &content(300, 200)).unwrap();
    assert_eq!(surface.calls()[0], SurfaceCall::Build(rect));
}

#[test]
fn failed_build_leaves_nothing_behind() {
    let (mut overlay, surface) = overlay();
    surface.fail_build(true);

    let err = overlay
        .create_or_update(ScreenRect::new(0, 0, 300, 200), &content(300, 200))
        .unwrap_err();

    assert!(matches!(err, OverlayError::CreateFailed(_)));
    assert!(!overlay.is_live());
    assert_eq!(overlay.rect(), None);
    assert!(surface.calls().is_empty());
}

#[test]
fn empty_rect_is_rejected() {
    let (mut overlay, surface) = overlay();
    assert!(overlay
        .create_or_update(ScreenRect::new(0, 0, 0, 10), &content(10, 10))
        .is_err());
    assert!(surface.calls().is_empty());
}

#[test]
fn visibility_requires_a_live_overlay() {
    let (mut overlay, _surface) = overlay();
    assert_eq!(overlay.set_visibility(0.0, true), Err(OverlayError::NotBuilt));
}

#[test]
fn visibility_changes_are_idempotent() {
    let (mut overlay, surface) = overlay();
    overlay
        .create_or_update(ScreenRect::new(0, 0, 300, 200), &content(300, 200))
        .unwrap();
    surface.clear();

    overlay.set_visibility(0.0, true).unwrap();
    overlay.set_visibility(0.0, true).unwrap();
    assert_eq!(surface.calls(), vec![SurfaceCall::Layer(0, true)]);
    assert!(overlay.is_clickthrough());
    assert_eq!(overlay.alpha(), 0.0);

    overlay.set_visibility(1.0, false).unwrap();
    overlay.set_visibility(1.0, false).unwrap();
    assert_eq!(
        surface.calls(),
        vec![SurfaceCall::Layer(0, true), SurfaceCall::Layer(255, false)]
    );
}

#[test]
fn destroy_releases_and_allows_rebuild() {
    let (mut overlay, surface) = overlay();
    let rect = ScreenRect::new(0, 0, 300, 200);
    overlay.create_or_update(rect, &content(300, 200)).unwrap();

    overlay.destroy();
    assert!(!overlay.is_live());
    assert_eq!(surface.calls().last(), Some(&SurfaceCall::Release));

    // Destroying twice does not release twice.
    overlay.destroy();
    assert_eq!(
        surface
            .calls()
            .iter()
            .filter(|c| **c == SurfaceCall::Release)
            .count(),
        1
    );

    surface.clear();
    overlay.create_or_update(rect, &content(300, 200)).unwrap();
    assert_eq!(surface.calls()[0], SurfaceCall::Build(rect));
}

#[test]
fn dropping_a_live_overlay_releases_it() {
    let (mut overlay, surface) = overlay();
    overlay
        .create_or_update(ScreenRect::new(0, 0, 300, 200), &content(300, 200))
        .unwrap();
    drop(overlay);
    assert_eq!(surface.calls().last(), Some(&SurfaceCall::Release));
}
