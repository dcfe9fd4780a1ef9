pub mod blur;
pub mod global_hotkey;
pub mod hotkey;
pub mod logging;
pub mod settings;
pub mod window_system;
