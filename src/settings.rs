use crate::blur::visibility::VisibilityPolicy;
use crate::hotkey::{is_valid_key_combo, parse_hotkey, Hotkey};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name used for the settings file next to the executable.
pub const SETTINGS_FILE_NAME: &str = "whatsapp_blur_settings.json";

/// Re-evaluation cannot run faster than this.
pub const MIN_POLL_INTERVAL_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EffectMode {
    #[default]
    Gaussian,
    Glass,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectSettings {
    #[serde(default)]
    pub mode: EffectMode,
    /// Gaussian radius in pixels.
    #[serde(default = "default_blur_radius")]
    pub blur_radius: f32,
    /// RGBA tint composited over the blurred image. `None` disables it.
    #[serde(default = "default_tint")]
    pub tint: Option<[u8; 4]>,
    #[serde(default = "default_glass_color")]
    pub glass_color: [u8; 3],
    /// Standard deviation of the per-channel noise in the glass texture.
    #[serde(default = "default_glass_noise")]
    pub glass_noise: f32,
    #[serde(default = "default_glass_seed")]
    pub glass_seed: u64,
}

fn default_blur_radius() -> f32 {
    40.0
}

fn default_tint() -> Option<[u8; 4]> {
    Some([220, 220, 220, 80])
}

fn default_glass_color() -> [u8; 3] {
    [245, 248, 255]
}

fn default_glass_noise() -> f32 {
    2.0
}

fn default_glass_seed() -> u64 {
    42
}

impl Default for EffectSettings {
    fn default() -> Self {
        Self {
            mode: EffectMode::default(),
            blur_radius: default_blur_radius(),
            tint: default_tint(),
            glass_color: default_glass_color(),
            glass_noise: default_glass_noise(),
            glass_seed: default_glass_seed(),
        }
    }
}

/// Describes which window is shielded. Names are matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSettings {
    #[serde(default = "default_executable")]
    pub executable: String,
    #[serde(default = "default_display_name")]
    pub display_name: String,
    /// Processes that host packaged apps under their own executable name.
    #[serde(default = "default_shell_hosts")]
    pub shell_hosts: Vec<String>,
    /// Processes whose windows never match on title alone.
    #[serde(default = "default_denied_hosts")]
    pub denied_hosts: Vec<String>,
    /// Title fragments that disqualify a window outright.
    #[serde(default = "default_denied_title_keywords")]
    pub denied_title_keywords: Vec<String>,
}

fn default_executable() -> String {
    "whatsapp.exe".into()
}

fn default_display_name() -> String {
    "WhatsApp".into()
}

fn default_shell_hosts() -> Vec<String> {
    vec!["applicationframehost.exe".into()]
}

fn default_denied_hosts() -> Vec<String> {
    [
        "windowsterminal.exe",
        "explorer.exe",
        "python.exe",
        "code.exe",
        "cmd.exe",
        "powershell.exe",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_denied_title_keywords() -> Vec<String> {
    ["visual studio", "terminal", "explorer", "python", "blur", "cmd"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            display_name: default_display_name(),
            shell_hosts: default_shell_hosts(),
            denied_hosts: default_denied_hosts(),
            denied_title_keywords: default_denied_title_keywords(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Global toggle shortcut, e.g. `Ctrl+Alt+Q`.
    #[serde(default = "default_hotkey")]
    pub hotkey: String,
    /// Minimum time between two capture attempts.
    #[serde(default = "default_min_blur_interval_ms")]
    pub min_blur_interval_ms: u64,
    /// How long a located target is trusted before enumerating again.
    #[serde(default = "default_window_cache_ttl_ms")]
    pub window_cache_ttl_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_hover_poll_interval_ms")]
    pub hover_poll_interval_ms: u64,
    /// Delay before reading the screen so pending repaints can land.
    #[serde(default = "default_capture_settle_ms")]
    pub capture_settle_ms: u64,
    /// Captures smaller than this in either dimension are rejected.
    #[serde(default = "default_min_capture_size")]
    pub min_capture_size: i32,
    /// Size change (in pixels, either axis) that forces a fresh capture
    /// instead of resampling the cached image.
    #[serde(default = "default_resize_recapture_threshold")]
    pub resize_recapture_threshold: i32,
    #[serde(default)]
    pub visibility: VisibilityPolicy,
    /// Reveal the window underneath while the pointer is over it.
    #[serde(default = "default_true")]
    pub hover_reveal: bool,
    /// Round the overlay's corners where the compositor supports it.
    #[serde(default = "default_true")]
    pub rounded_corners: bool,
    #[serde(default)]
    pub effect: EffectSettings,
    #[serde(default)]
    pub target: TargetSettings,
    /// When enabled the logger is initialised at debug level.
    #[serde(default)]
    pub debug_logging: bool,
    /// Optional log file. Logs go to stderr when unset.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

fn default_hotkey() -> String {
    "Ctrl+Alt+Q".into()
}

fn default_min_blur_interval_ms() -> u64 {
    2000
}

fn default_window_cache_ttl_ms() -> u64 {
    8000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_hover_poll_interval_ms() -> u64 {
    100
}

fn default_capture_settle_ms() -> u64 {
    100
}

fn default_min_capture_size() -> i32 {
    100
}

fn default_resize_recapture_threshold() -> i32 {
    200
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hotkey: default_hotkey(),
            min_blur_interval_ms: default_min_blur_interval_ms(),
            window_cache_ttl_ms: default_window_cache_ttl_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            hover_poll_interval_ms: default_hover_poll_interval_ms(),
            capture_settle_ms: default_capture_settle_ms(),
            min_capture_size: default_min_capture_size(),
            resize_recapture_threshold: default_resize_recapture_threshold(),
            visibility: VisibilityPolicy::default(),
            hover_reveal: true,
            rounded_corners: true,
            effect: EffectSettings::default(),
            target: TargetSettings::default(),
            debug_logging: false,
            log_file: None,
        }
    }
}

impl Settings {
    /// Load settings from `path`. A missing or empty file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).unwrap_or_default();
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Self = serde_json::from_str(&content)?;
        Ok(settings.sanitized())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Settings file next to the running executable, falling back to the
    /// working directory.
    pub fn default_path() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(SETTINGS_FILE_NAME)))
            .unwrap_or_else(|| PathBuf::from(SETTINGS_FILE_NAME))
    }

    /// Clamp out-of-range values and replace an invalid hotkey.
    pub fn sanitized(mut self) -> Self {
        if self.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            tracing::warn!(
                "poll_interval_ms {} is too fast; clamping to {}",
                self.poll_interval_ms,
                MIN_POLL_INTERVAL_MS
            );
            self.poll_interval_ms = MIN_POLL_INTERVAL_MS;
        }
        if self.hover_poll_interval_ms == 0 {
            self.hover_poll_interval_ms = default_hover_poll_interval_ms();
        }
        if self.min_capture_size < 1 {
            self.min_capture_size = 1;
        }
        if !self.effect.blur_radius.is_finite() || self.effect.blur_radius < 0.0 {
            self.effect.blur_radius = default_blur_radius();
        }
        if !is_valid_key_combo(&self.hotkey) || parse_hotkey(&self.hotkey).is_none() {
            tracing::warn!(
                "provided hotkey string '{}' is invalid; using default {}",
                self.hotkey,
                default_hotkey()
            );
            self.hotkey = default_hotkey();
        }
        self
    }

    pub fn hotkey(&self) -> Hotkey {
        parse_hotkey(&self.hotkey).unwrap_or_default()
    }

    pub fn min_blur_interval(&self) -> Duration {
        Duration::from_millis(self.min_blur_interval_ms)
    }

    pub fn window_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.window_cache_ttl_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn hover_poll_interval(&self) -> Duration {
        Duration::from_millis(self.hover_poll_interval_ms.max(1))
    }

    pub fn capture_settle(&self) -> Duration {
        Duration::from_millis(self.capture_settle_ms)
    }
}
