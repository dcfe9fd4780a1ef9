use crate::hotkey::Hotkey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HotkeyError {
    #[error("hotkey '{0}' has no usable key")]
    Invalid(String),
    #[error("hotkey '{0}' is already taken or cannot be registered: {1}")]
    RegistrationFailed(String, String),
    #[error("hotkey listener could not be started: {0}")]
    Listener(String),
    #[error("global hotkeys are only available on Windows")]
    Unsupported,
}

/// A registered system-wide shortcut. Pressing it only enqueues
/// [`ToggleBlur`](crate::blur::messages::BlurCommand::ToggleBlur). Dropping the binding unregisters it.
pub struct HotkeyBinding {
    #[cfg(windows)]
    thread_id: u32,
    #[cfg(windows)]
    listener: Option<std::thread::JoinHandle<()>>,
    hotkey: Hotkey,
}

impl HotkeyBinding {
    pub fn hotkey(&self) -> Hotkey {
        self.hotkey
    }

    /// Register `hotkey` system-wide. Fails when the key code is unusable or
    /// another application already owns the combination.
    pub fn register(
        hotkey: Hotkey,
        tx: std::sync::mpsc::Sender<crate::blur::messages::BlurCommand>,
    ) -> Result<Self, HotkeyError> {
        if hotkey.vk == 0 || hotkey.vk > MAX_VIRTUAL_KEY {
            return Err(HotkeyError::Invalid(hotkey.to_string()));
        }
        Self::register_native(hotkey, tx)
    }

    #[cfg(not(windows))]
    fn register_native(
        _hotkey: Hotkey,
        _tx: std::sync::mpsc::Sender<crate::blur::messages::BlurCommand>,
    ) -> Result<Self, HotkeyError> {
        Err(HotkeyError::Unsupported)
    }
}

const MAX_VIRTUAL_KEY: u32 = 0xFE;

#[cfg(windows)]
mod platform {
    use super::{HotkeyBinding, HotkeyError};
    use crate::blur::messages::BlurCommand;
    use crate::hotkey::Hotkey;
    use std::sync::mpsc::{channel, Sender};
    use std::thread;
    use tracing::{debug, info, warn};
    use windows::Win32::Foundation::{HWND, LPARAM, WPARAM};
    use windows::Win32::System::Threading::GetCurrentThreadId;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        RegisterHotKey, UnregisterHotKey, HOT_KEY_MODIFIERS, MOD_NOREPEAT,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        GetMessageW, PeekMessageW, PostThreadMessageW, MSG, PM_NOREMOVE, WM_HOTKEY, WM_QUIT,
    };

    const HOTKEY_ID: i32 = 0x5742;

    impl HotkeyBinding {
        /// Runs `RegisterHotKey` on a dedicated message thread.
        pub(super) fn register_native(
            hotkey: Hotkey,
            tx: Sender<BlurCommand>,
        ) -> Result<Self, HotkeyError> {
            let (ready_tx, ready_rx) = channel::<Result<u32, HotkeyError>>();
            let listener = thread::Builder::new()
                .name("blur-hotkey".into())
                .spawn(move || {
                    let thread_id = unsafe { GetCurrentThreadId() };
                    let mut msg = MSG::default();
                    // Create the thread's message queue before anyone can post WM_QUIT to it.
                    unsafe {
                        let _ = PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_NOREMOVE);
                    }
                    let modifiers = HOT_KEY_MODIFIERS(hotkey.modifier_bits() | MOD_NOREPEAT.0);
                    if let Err(err) = unsafe { RegisterHotKey(None, HOTKEY_ID, modifiers, hotkey.vk) }
                    {
                        let _ = ready_tx.send(Err(HotkeyError::RegistrationFailed(
                            hotkey.to_string(),
                            err.to_string(),
                        )));
                        return;
                    }
                    let _ = ready_tx.send(Ok(thread_id));

                    while unsafe { GetMessageW(&mut msg, HWND::default(), 0, 0) }.0 > 0 {
                        if msg.message == WM_HOTKEY && msg.wParam.0 as i32 == HOTKEY_ID {
                            debug!("toggle hotkey pressed");
                            if tx.send(BlurCommand::ToggleBlur).is_err() {
                                break;
                            }
                        }
                    }

                    unsafe {
                        if UnregisterHotKey(None, HOTKEY_ID).is_err() {
                            warn!("Failed to unregister hotkey '{}'.", hotkey);
                        }
                    }
                })
                .map_err(|err| HotkeyError::Listener(err.to_string()))?;

            let thread_id = match ready_rx.recv() {
                Ok(Ok(thread_id)) => thread_id,
                Ok(Err(err)) => {
                    let _ = listener.join();
                    return Err(err);
                }
                Err(_) => {
                    let _ = listener.join();
                    return Err(HotkeyError::Listener("listener exited early".into()));
                }
            };
            info!("Registered hotkey '{}'.", hotkey);
            Ok(Self {
                thread_id,
                listener: Some(listener),
                hotkey,
            })
        }
    }

    impl Drop for HotkeyBinding {
        fn drop(&mut self) {
            unsafe {
                let _ = PostThreadMessageW(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
            }
            if let Some(listener) = self.listener.take() {
                let _ = listener.join();
            }
            info!("Unregistered hotkey '{}'.", self.hotkey);
        }
    }
}
