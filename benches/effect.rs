use criterion::{criterion_group, criterion_main, Criterion};
use image::{Rgba, RgbaImage};
use whatsapp_blur::blur::capture::CapturedFrame;
use whatsapp_blur::blur::effect::EffectProcessor;
use whatsapp_blur::blur::geometry::ScreenRect;
use whatsapp_blur::settings::{EffectMode, EffectSettings};

fn frame() -> CapturedFrame {
    let image = RgbaImage::from_fn(800, 600, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
    });
    CapturedFrame {
        rect: ScreenRect::new(0, 0, 800, 600),
        image,
    }
}

fn bench_effects(c: &mut Criterion) {
    let frame = frame();
    let gaussian = EffectProcessor::new(EffectSettings::default());
    let glass = EffectProcessor::new(EffectSettings {
        mode: EffectMode::Glass,
        ..Default::default()
    });

    c.bench_function("gaussian_800x600", |b| b.iter(|| gaussian.process(&frame)));
    c.bench_function("glass_800x600", |b| b.iter(|| glass.process(&frame)));

    let blurred = gaussian.process(&frame).expect("blurred frame");
    c.bench_function("resample_800x600_to_900x650", |b| {
        b.iter(|| blurred.resized(900, 650))
    });
}

criterion_group!(benches, bench_effects);
criterion_main!(benches);
