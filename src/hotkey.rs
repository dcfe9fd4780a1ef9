use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static HOTKEY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:(?:Ctrl|Control|Alt|Shift|Win)\+){0,4}(?:F(?:[1-9]|1[0-9]|2[0-4])|[A-Z]|[0-9]|NUMPAD[0-9]|UP|DOWN|LEFT|RIGHT|BACKSPACE|TAB|ENTER|PAUSE|ESCAPE|ESC|SPACE|PAGEUP|PAGEDOWN|END|HOME|INSERT|DELETE)$")
        .expect("invalid hotkey regex")
});

/// Returns `true` when `input` looks like `Mod+Mod+Key`.
pub fn is_valid_key_combo(input: &str) -> bool {
    HOTKEY_REGEX.is_match(input.trim())
}

/// A global shortcut resolved to a Win32 virtual-key code plus modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hotkey {
    pub vk: u32,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub win: bool,
}

impl Default for Hotkey {
    /// `Ctrl+Alt+Q`
    fn default() -> Self {
        Self {
            vk: 0x51,
            ctrl: true,
            shift: false,
            alt: true,
            win: false,
        }
    }
}

impl Hotkey {
    /// Modifier bitmask in the layout `RegisterHotKey` expects.
    pub fn modifier_bits(&self) -> u32 {
        let mut bits = 0;
        if self.alt {
            bits |= 0x0001;
        }
        if self.ctrl {
            bits |= 0x0002;
        }
        if self.shift {
            bits |= 0x0004;
        }
        if self.win {
            bits |= 0x0008;
        }
        bits
    }
}

impl fmt::Display for Hotkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            write!(f, "Ctrl+")?;
        }
        if self.alt {
            write!(f, "Alt+")?;
        }
        if self.shift {
            write!(f, "Shift+")?;
        }
        if self.win {
            write!(f, "Win+")?;
        }
        match self.vk {
            0x30..=0x39 | 0x41..=0x5A => write!(f, "{}", self.vk as u8 as char),
            0x70..=0x87 => write!(f, "F{}", self.vk - 0x70 + 1),
            0x20 => write!(f, "Space"),
            other => write!(f, "VK_0x{other:02X}"),
        }
    }
}

/// Parse a hotkey string like "Ctrl+Alt+Q" into a [`Hotkey`].
pub fn parse_hotkey(s: &str) -> Option<Hotkey> {
    let mut ctrl = false;
    let mut shift = false;
    let mut alt = false;
    let mut win = false;
    let mut vk: Option<u32> = None;

    for part in s.split('+') {
        let upper = part.trim().to_ascii_uppercase();
        match upper.as_str() {
            "CTRL" | "CONTROL" => ctrl = true,
            "SHIFT" => shift = true,
            "ALT" => alt = true,
            "WIN" => win = true,
            "" => {}
            _ => {
                // A second non-modifier key is not a valid combo.
                if vk.is_some() {
                    return None;
                }
                vk = Some(virtual_key_from_string(&upper)?);
            }
        }
    }

    vk.map(|vk| Hotkey {
        vk,
        ctrl,
        shift,
        alt,
        win,
    })
}

pub fn virtual_key_from_string(key: &str) -> Option<u32> {
    let upper = key.to_ascii_uppercase();
    match upper.as_str() {
        "SPACE" => Some(0x20),
        "TAB" => Some(0x09),
        "ENTER" | "RETURN" => Some(0x0D),
        "ESC" | "ESCAPE" => Some(0x1B),
        "BACKSPACE" => Some(0x08),
        "PAUSE" => Some(0x13),
        "PAGEUP" => Some(0x21),
        "PAGEDOWN" => Some(0x22),
        "END" => Some(0x23),
        "HOME" => Some(0x24),
        "LEFT" => Some(0x25),
        "UP" => Some(0x26),
        "RIGHT" => Some(0x27),
        "DOWN" => Some(0x28),
        "INSERT" => Some(0x2D),
        "DELETE" => Some(0x2E),
        _ if upper.starts_with("NUMPAD") => match upper[6..].parse::<u32>() {
            Ok(n) if n <= 9 => Some(0x60 + n),
            _ => None,
        },
        _ if upper.len() > 1 && upper.starts_with('F') => match upper[1..].parse::<u32>() {
            Ok(n) if (1..=24).contains(&n) => Some(0x70 + n - 1),
            _ => None,
        },
        _ => {
            let mut chars = upper.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_uppercase() || c.is_ascii_digit() => Some(c as u32),
                _ => None,
            }
        }
    }
}
