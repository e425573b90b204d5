//! Character translation against the active Windows keyboard layout.
//!
//! Inside a low-level hook the calling thread's key state is stale: the
//! hook runs before the system updates it, and the hook thread owns no
//! window. `snapshot()` therefore patches Shift, Ctrl, Alt and Caps Lock
//! from the live asynchronous state before `ToUnicode` sees the table. AltGr
//! arrives as Ctrl+Alt, so both must be current for layouts that use it.

use windows_sys::Win32::UI::Input::KeyboardAndMouse::{
    GetAsyncKeyState, GetKeyState, GetKeyboardState, ToUnicode,
};

use crate::keycodes::{
    VK_CAPITAL, VK_CONTROL, VK_LCONTROL, VK_LMENU, VK_LSHIFT, VK_MENU, VK_RCONTROL, VK_RMENU,
    VK_RSHIFT, VK_SHIFT,
};
use crate::platform::{KeyboardLayout, KeyboardState, ModifierState, RawKeyEvent, Translation};

/// `ToUnicode` wFlags bit 2: do not change kernel keyboard state
/// (Windows 10 1607+). Without it, probing a dead key consumes the pending
/// accent and the user's next keystroke loses its diacritic.
const TOUNICODE_NO_STATE_CHANGE: u32 = 0x4;

/// Keys whose pressed bit is refreshed from `GetAsyncKeyState`.
const LIVE_KEYS: [u32; 9] = [
    VK_SHIFT,
    VK_LSHIFT,
    VK_RSHIFT,
    VK_CONTROL,
    VK_LCONTROL,
    VK_RCONTROL,
    VK_MENU,
    VK_LMENU,
    VK_RMENU,
];

/// Overwrites the pressed bit of every live key with `is_down(vk)`.
fn refresh_pressed(state: &mut KeyboardState, is_down: impl Fn(u32) -> bool) {
    for vk in LIVE_KEYS {
        state.set_pressed(vk, is_down(vk));
    }
}

fn async_down(vk: u32) -> bool {
    let raw = unsafe { GetAsyncKeyState(vk as i32) } as u16;
    raw & 0x8000 != 0
}

pub struct WindowsLayout;

impl KeyboardLayout for WindowsLayout {
    fn snapshot(&self) -> KeyboardState {
        let mut bytes = [0u8; 256];
        // A zero return leaves the table empty, which translates unshifted.
        unsafe { GetKeyboardState(bytes.as_mut_ptr()) };

        let mut state = KeyboardState::from_bytes(bytes);
        refresh_pressed(&mut state, async_down);
        state.set_toggled(VK_CAPITAL, self.modifiers().caps_lock_on);
        state
    }

    fn translate(&self, event: &RawKeyEvent, state: &KeyboardState) -> Translation {
        let mut buf = [0u16; 8];
        let n = unsafe {
            ToUnicode(
                event.vk_code,
                event.scan_code,
                state.as_bytes().as_ptr(),
                buf.as_mut_ptr(),
                buf.len() as i32,
                TOUNICODE_NO_STATE_CHANGE,
            )
        };

        if n < 0 {
            return Translation::Dead;
        }
        let n = (n as usize).min(buf.len());

        let mut chars = char::decode_utf16(buf[..n].iter().copied()).filter_map(Result::ok);
        match (chars.next(), chars.next()) {
            (Some(a), None) => Translation::One(a),
            (Some(a), Some(b)) => Translation::Two(a, b),
            _ => Translation::None,
        }
    }

    fn modifiers(&self) -> ModifierState {
        let caps = unsafe { GetKeyState(VK_CAPITAL as i32) } as u16;
        ModifierState {
            shift_down: async_down(VK_SHIFT),
            caps_lock_on: caps & 0x0001 != 0,
        }
    }
}
