//! Windows platform backend: WH_KEYBOARD_LL hook, ToUnicode translation.
//!
//! Factory functions return boxed trait objects backed by `WindowsHook`
//! (low-level keyboard hook on a message-loop thread) and `WindowsLayout`
//! (active keyboard layout of the foreground session).

mod hook;
pub(crate) mod instance;
mod layout;

use hook::WindowsHook;
use layout::WindowsLayout;

use crate::platform::{HookBackend, KeyboardLayout, PlatformError};

/// Returns a `WindowsHook` backed by `WH_KEYBOARD_LL`.
pub fn create_hook_backend() -> Result<Box<dyn HookBackend>, PlatformError> {
    Ok(Box::new(WindowsHook::new()))
}

/// Returns a `WindowsLayout` backed by `ToUnicode`.
pub fn create_keyboard_layout() -> Result<Box<dyn KeyboardLayout>, PlatformError> {
    Ok(Box::new(WindowsLayout))
}
