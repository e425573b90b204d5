//! Platform abstraction layer.
//!
//! Defines the `HookBackend` and `KeyboardLayout` traits plus the raw event
//! types that cross them. The interceptor only ever talks to these traits;
//! the Windows implementation lives in `windows`, and `simulated` provides
//! scriptable doubles for tests and for hosts without a real hook API.

pub mod simulated;
#[cfg(target_os = "windows")]
mod windows;

use std::sync::Arc;

use thiserror::Error;

use crate::keycodes::{VK_CAPITAL, VK_LSHIFT, VK_RSHIFT, VK_SHIFT};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by platform backends.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The OS refused to install the hook. `code` is the OS error code, if any.
    #[error("hook installation refused by the OS (error code {code})")]
    InstallRefused { code: u32 },
    /// Another hook is already registered in this process.
    #[error("a keyboard hook is already active in this process")]
    Busy,
    /// No backend exists for this platform or session.
    #[error("platform unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Other(String),
}

// ---------------------------------------------------------------------------
// Raw event record
// ---------------------------------------------------------------------------

/// Extended key (right-hand Alt/Ctrl, navigation cluster, NumpadEnter).
pub const FLAG_EXTENDED: u32 = 0x01;
/// Event was injected (`SendInput`, `keybd_event`), not typed.
pub const FLAG_INJECTED: u32 = 0x10;
/// Alt was held when the transition happened.
pub const FLAG_ALT_DOWN: u32 = 0x20;
/// Transition is a key release.
pub const FLAG_UP: u32 = 0x80;

/// Direction of a physical key transition as reported by the hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTransition {
    Down,
    Up,
    /// Key-down while Alt is held, or F10.
    SysDown,
    SysUp,
}

/// One hardware key transition, valid only for the duration of a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawKeyEvent {
    pub vk_code: u32,
    pub scan_code: u32,
    pub flags: u32,
    pub time: u32,
    pub extra_info: usize,
    pub transition: KeyTransition,
}

impl RawKeyEvent {
    /// Builds a plain key-down for `vk_code` with no flags set.
    pub fn key_down(vk_code: u32, scan_code: u32) -> Self {
        Self {
            vk_code,
            scan_code,
            flags: 0,
            time: 0,
            extra_info: 0,
            transition: KeyTransition::Down,
        }
    }

    /// Builds the matching release for `vk_code`.
    pub fn key_up(vk_code: u32, scan_code: u32) -> Self {
        Self {
            flags: FLAG_UP,
            transition: KeyTransition::Up,
            ..Self::key_down(vk_code, scan_code)
        }
    }

    pub fn is_injected(&self) -> bool {
        self.flags & FLAG_INJECTED != 0
    }
}

// ---------------------------------------------------------------------------
// Keyboard state
// ---------------------------------------------------------------------------

/// Snapshot of all 256 virtual-key states.
///
/// Each byte uses the Win32 encoding: bit 7 set means the key is down,
/// bit 0 set means the key is toggled (only meaningful for lock keys).
#[derive(Clone, PartialEq, Eq)]
pub struct KeyboardState([u8; 256]);

impl KeyboardState {
    const PRESSED: u8 = 0x80;
    const TOGGLED: u8 = 0x01;

    pub fn new() -> Self {
        Self([0; 256])
    }

    pub fn from_bytes(bytes: [u8; 256]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 256] {
        &self.0
    }

    pub fn is_pressed(&self, vk: u32) -> bool {
        self.byte(vk) & Self::PRESSED != 0
    }

    pub fn is_toggled(&self, vk: u32) -> bool {
        self.byte(vk) & Self::TOGGLED != 0
    }

    pub fn set_pressed(&mut self, vk: u32, pressed: bool) {
        if let Some(b) = self.0.get_mut(vk as usize) {
            if pressed {
                *b |= Self::PRESSED;
            } else {
                *b &= !Self::PRESSED;
            }
        }
    }

    pub fn set_toggled(&mut self, vk: u32, toggled: bool) {
        if let Some(b) = self.0.get_mut(vk as usize) {
            if toggled {
                *b |= Self::TOGGLED;
            } else {
                *b &= !Self::TOGGLED;
            }
        }
    }

    /// True if either Shift key (or the generic VK_SHIFT) is down.
    pub fn shift_down(&self) -> bool {
        [VK_SHIFT, VK_LSHIFT, VK_RSHIFT]
            .iter()
            .any(|&vk| self.is_pressed(vk))
    }

    pub fn caps_lock_on(&self) -> bool {
        self.is_toggled(VK_CAPITAL)
    }

    fn byte(&self, vk: u32) -> u8 {
        self.0.get(vk as usize).copied().unwrap_or(0)
    }
}

impl Default for KeyboardState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KeyboardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only the keys that carry state; 256 zero bytes are noise.
        let active: Vec<(usize, u8)> = self
            .0
            .iter()
            .enumerate()
            .filter(|(_, b)| **b != 0)
            .map(|(vk, b)| (vk, *b))
            .collect();
        f.debug_tuple("KeyboardState").field(&active).finish()
    }
}

/// Live modifier state read at translation time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierState {
    pub shift_down: bool,
    pub caps_lock_on: bool,
}

// ---------------------------------------------------------------------------
// Translation result
// ---------------------------------------------------------------------------

/// Outcome of translating a virtual key against a keyboard state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Translation {
    /// No character for this key in this state (modifiers, function keys).
    None,
    /// Dead key; composition state is left to the OS.
    Dead,
    One(char),
    /// A dead key that could not compose with the following key.
    Two(char, char),
}

// ---------------------------------------------------------------------------
// Hook disposition
// ---------------------------------------------------------------------------

/// What the hook procedure tells the OS to do with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Pass to the next hook in the chain; normal delivery follows.
    Forward,
    /// Return non-zero: the event is consumed and never delivered.
    Block,
    /// Return zero without calling the next hook. Later hooks in the chain
    /// never see the event, but the OS still delivers it to the focused window.
    BypassChain,
}

impl Disposition {
    pub fn is_forwarded(self) -> bool {
        self == Disposition::Forward
    }
}

/// Handler invoked by a backend for every key transition.
///
/// Shared so the backend can clone it out of its slot before calling,
/// keeping any lock hold time off the callback path.
pub type HookHandler = Arc<dyn Fn(&RawKeyEvent) -> Disposition + Send + Sync>;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Installs and removes a system-wide low-level keyboard hook.
pub trait HookBackend: Send {
    /// Installs the hook. The backend keeps `handler` alive until `uninstall`.
    fn install(&mut self, handler: HookHandler) -> Result<(), PlatformError>;

    /// Removes the hook and drops the handler. Must be a no-op when idle.
    fn uninstall(&mut self) -> Result<(), PlatformError>;

    fn is_installed(&self) -> bool;
}

/// Translates virtual keys to characters using the active keyboard layout.
pub trait KeyboardLayout: Send + Sync {
    /// Captures the full 256-key state table.
    fn snapshot(&self) -> KeyboardState;

    fn translate(&self, event: &RawKeyEvent, state: &KeyboardState) -> Translation;

    /// Reads Shift and Caps Lock at the moment of the call.
    fn modifiers(&self) -> ModifierState;
}

// ---------------------------------------------------------------------------
// Factories
// ---------------------------------------------------------------------------

/// Returns the hook backend for this platform.
pub fn create_hook_backend() -> Result<Box<dyn HookBackend>, PlatformError> {
    #[cfg(target_os = "windows")]
    {
        windows::create_hook_backend()
    }
    #[cfg(not(target_os = "windows"))]
    {
        Err(PlatformError::Unavailable(
            "low-level keyboard hooks are only available on Windows".into(),
        ))
    }
}

/// Returns the keyboard layout for this platform.
pub fn create_keyboard_layout() -> Result<Box<dyn KeyboardLayout>, PlatformError> {
    #[cfg(target_os = "windows")]
    {
        windows::create_keyboard_layout()
    }
    #[cfg(not(target_os = "windows"))]
    {
        Err(PlatformError::Unavailable(
            "keyboard layout translation is only available on Windows".into(),
        ))
    }
}

/// Guard that keeps other copies of the program from running.
pub struct InstanceGuard {
    #[cfg(target_os = "windows")]
    _inner: windows::instance::NamedMutex,
}

/// Claims the process-wide single-instance lock.
///
/// Returns `Ok(None)` when another instance already holds it. On platforms
/// without a hook backend there is nothing to coordinate, so this always
/// succeeds.
pub fn acquire_single_instance(name: &str) -> Result<Option<InstanceGuard>, PlatformError> {
    #[cfg(target_os = "windows")]
    {
        Ok(windows::instance::NamedMutex::acquire(name)?
            .map(|m| InstanceGuard { _inner: m }))
    }
    #[cfg(not(target_os = "windows"))]
    {
        let _ = name;
        Ok(Some(InstanceGuard {}))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keycodes::{VK_A, VK_NUMLOCK};

    #[test]
    fn empty_state_has_no_modifiers() {
        let state = KeyboardState::new();
        assert!(!state.shift_down());
        assert!(!state.caps_lock_on());
    }

    #[test]
    fn either_shift_counts_as_shift() {
        let mut state = KeyboardState::new();
        state.set_pressed(VK_RSHIFT, true);
        assert!(state.shift_down());
        state.set_pressed(VK_RSHIFT, false);
        state.set_pressed(VK_LSHIFT, true);
        assert!(state.shift_down());
    }

    #[test]
    fn pressed_and_toggled_bits_are_independent() {
        let mut state = KeyboardState::new();
        state.set_toggled(VK_CAPITAL, true);
        assert!(state.caps_lock_on());
        assert!(!state.is_pressed(VK_CAPITAL));

        state.set_pressed(VK_CAPITAL, true);
        state.set_toggled(VK_CAPITAL, false);
        assert!(state.is_pressed(VK_CAPITAL));
        assert!(!state.caps_lock_on());
    }

    #[test]
    fn out_of_range_vk_is_ignored() {
        let mut state = KeyboardState::new();
        state.set_pressed(0x1FF, true);
        assert!(!state.is_pressed(0x1FF));
        assert_eq!(state, KeyboardState::new());
    }

    #[test]
    fn debug_lists_only_active_keys() {
        let mut state = KeyboardState::new();
        state.set_toggled(VK_NUMLOCK, true);
        state.set_pressed(VK_A, true);
        let rendered = format!("{state:?}");
        assert!(rendered.contains("(65, 128)"));
        assert!(rendered.contains("(144, 1)"));
    }

    #[test]
    fn key_up_carries_up_flag() {
        let up = RawKeyEvent::key_up(VK_A, 0x1E);
        assert_eq!(up.transition, KeyTransition::Up);
        assert_eq!(up.flags & FLAG_UP, FLAG_UP);
        assert!(!up.is_injected());
    }

    #[test]
    fn only_forward_is_forwarded() {
        assert!(Disposition::Forward.is_forwarded());
        assert!(!Disposition::Block.is_forwarded());
        assert!(!Disposition::BypassChain.is_forwarded());
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn factories_report_unavailable_off_windows() {
        assert!(matches!(
            create_hook_backend(),
            Err(PlatformError::Unavailable(_))
        ));
        assert!(matches!(
            create_keyboard_layout(),
            Err(PlatformError::Unavailable(_))
        ));
    }
}
