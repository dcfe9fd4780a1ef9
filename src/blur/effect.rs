use crate::blur::capture::CapturedFrame;
use crate::settings::{EffectMode, EffectSettings};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Blur sigma per pass before downsampling kicks in.
const MAX_DIRECT_SIGMA: f32 = 8.0;
const GLASS_SMOOTHING_SIGMA: f32 = 1.5;

/// Processed overlay content.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectResult {
    pub image: RgbaImage,
}

impl EffectResult {
    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Resample to `width` x `height`.
    pub fn resized(&self, width: u32, height: u32) -> EffectResult {
        if self.size() == (width, height) || width == 0 || height == 0 {
            return self.clone();
        }
        EffectResult {
            image: imageops::resize(&self.image, width, height, FilterType::Lanczos3),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EffectProcessor {
    settings: EffectSettings,
}

impl EffectProcessor {
    pub fn new(settings: EffectSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &EffectSettings {
        &self.settings
    }

    /// `None` only for an empty frame.
    pub fn process(&self, frame: &CapturedFrame) -> Option<EffectResult> {
        let (width, height) = frame.image.dimensions();
        if width == 0 || height == 0 {
            return None;
        }
        let image = match self.settings.mode {
            EffectMode::Gaussian => {
                let mut blurred = gaussian(&frame.image, self.settings.blur_radius);
                if let Some(tint) = self.settings.tint {
                    apply_tint(&mut blurred, tint);
                }
                blurred
            }
            EffectMode::Glass => glass(
                width,
                height,
                self.settings.glass_color,
                self.settings.glass_noise,
                self.settings.glass_seed,
            ),
        };
        Some(EffectResult { image })
    }
}

/// Large radii are blurred on a downsampled copy and scaled back up.
fn gaussian(source: &RgbaImage, sigma: f32) -> RgbaImage {
    if sigma <= 0.0 {
        return source.clone();
    }
    let (width, height) = source.dimensions();
    let factor = (sigma / MAX_DIRECT_SIGMA).ceil().max(1.0) as u32;
    let small_w = (width / factor).max(1);
    let small_h = (height / factor).max(1);
    if factor == 1 || small_w < 4 || small_h < 4 {
        return imageops::blur(source, sigma);
    }
    let small = imageops::resize(source, small_w, small_h, FilterType::Triangle);
    let blurred = imageops::blur(&small, sigma / factor as f32);
    imageops::resize(&blurred, width, height, FilterType::Lanczos3)
}

fn apply_tint(image: &mut RgbaImage, tint: [u8; 4]) {
    let alpha = tint[3] as f32 / 255.0;
    if alpha <= 0.0 {
        return;
    }
    for px in image.pixels_mut() {
        for c in 0..3 {
            let base = px[c] as f32;
            px[c] = (base + (tint[c] as f32 - base) * alpha).round().clamp(0.0, 255.0) as u8;
        }
        px[3] = 255;
    }
}

/// Flat tinted noise, independent of what is on screen.
fn glass(width: u32, height: u32, color: [u8; 3], noise: f32, seed: u64) -> RgbaImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut image = RgbaImage::from_pixel(width, height, Rgba([color[0], color[1], color[2], 255]));
    if noise > 0.0 {
        for px in image.pixels_mut() {
            for c in 0..3 {
                let value = color[c] as f32 + gaussian_sample(&mut rng) * noise;
                px[c] = value.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    imageops::blur(&image, GLASS_SMOOTHING_SIGMA)
}

/// Standard normal sample via Box-Muller.
fn gaussian_sample(rng: &mut StdRng) -> f32 {
    let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
    let u2: f32 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos()
}
