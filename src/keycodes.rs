//! Windows virtual-key codes and their diagnostic names.
//!
//! VK codes are from the Windows SDK (winuser.h). They are plain integers,
//! so this module is platform-independent: the simulated layout and the
//! keyboard state helpers use the same numbering as the real hook.
//!
//! Left/right modifier variants (VK_LSHIFT, VK_RSHIFT, ...) are what
//! WH_KEYBOARD_LL actually reports; the generic VK_SHIFT/VK_CONTROL/VK_MENU
//! appear only in `GetKeyState` queries and keyboard state tables.

pub const VK_BACK: u32 = 0x08;
pub const VK_TAB: u32 = 0x09;
pub const VK_RETURN: u32 = 0x0D;
pub const VK_SHIFT: u32 = 0x10;
pub const VK_CONTROL: u32 = 0x11;
pub const VK_MENU: u32 = 0x12;
pub const VK_PAUSE: u32 = 0x13;
pub const VK_CAPITAL: u32 = 0x14;
pub const VK_ESCAPE: u32 = 0x1B;
pub const VK_SPACE: u32 = 0x20;
pub const VK_PRIOR: u32 = 0x21;
pub const VK_NEXT: u32 = 0x22;
pub const VK_END: u32 = 0x23;
pub const VK_HOME: u32 = 0x24;
pub const VK_LEFT: u32 = 0x25;
pub const VK_UP: u32 = 0x26;
pub const VK_RIGHT: u32 = 0x27;
pub const VK_DOWN: u32 = 0x28;
pub const VK_SNAPSHOT: u32 = 0x2C;
pub const VK_INSERT: u32 = 0x2D;
pub const VK_DELETE: u32 = 0x2E;

/// VK_0 .. VK_9 share their values with ASCII '0' .. '9'.
pub const VK_0: u32 = 0x30;
pub const VK_9: u32 = 0x39;
/// VK_A .. VK_Z share their values with ASCII 'A' .. 'Z'.
pub const VK_A: u32 = 0x41;
pub const VK_Z: u32 = 0x5A;

pub const VK_LWIN: u32 = 0x5B;
pub const VK_RWIN: u32 = 0x5C;
pub const VK_NUMPAD0: u32 = 0x60;
pub const VK_NUMPAD9: u32 = 0x69;
pub const VK_MULTIPLY: u32 = 0x6A;
pub const VK_ADD: u32 = 0x6B;
pub const VK_SUBTRACT: u32 = 0x6D;
pub const VK_DECIMAL: u32 = 0x6E;
pub const VK_DIVIDE: u32 = 0x6F;
pub const VK_F1: u32 = 0x70;
pub const VK_F24: u32 = 0x87;
pub const VK_NUMLOCK: u32 = 0x90;
pub const VK_SCROLL: u32 = 0x91;
pub const VK_LSHIFT: u32 = 0xA0;
pub const VK_RSHIFT: u32 = 0xA1;
pub const VK_LCONTROL: u32 = 0xA2;
pub const VK_RCONTROL: u32 = 0xA3;
pub const VK_LMENU: u32 = 0xA4;
pub const VK_RMENU: u32 = 0xA5;

// OEM punctuation keys (US ANSI layout positions).
pub const VK_OEM_1: u32 = 0xBA; // ;:
pub const VK_OEM_PLUS: u32 = 0xBB; // =+
pub const VK_OEM_COMMA: u32 = 0xBC; // ,<
pub const VK_OEM_MINUS: u32 = 0xBD; // -_
pub const VK_OEM_PERIOD: u32 = 0xBE; // .>
pub const VK_OEM_2: u32 = 0xBF; // /?
pub const VK_OEM_3: u32 = 0xC0; // `~
pub const VK_OEM_4: u32 = 0xDB; // [{
pub const VK_OEM_5: u32 = 0xDC; // \|
pub const VK_OEM_6: u32 = 0xDD; // ]}
pub const VK_OEM_7: u32 = 0xDE; // '"

/// Returns true for Shift, Ctrl, Alt and Win keys in any of their variants.
pub fn is_modifier(vk: u32) -> bool {
    matches!(
        vk,
        VK_SHIFT
            | VK_CONTROL
            | VK_MENU
            | VK_LSHIFT
            | VK_RSHIFT
            | VK_LCONTROL
            | VK_RCONTROL
            | VK_LMENU
            | VK_RMENU
            | VK_LWIN
            | VK_RWIN
    )
}

/// Returns a stable diagnostic name for a virtual-key code.
///
/// Letters and digits are named by their key cap ("A", "5"). Used only for
/// keys that produce no character, so logs never carry typed text.
pub fn vk_name(vk: u32) -> Option<&'static str> {
    const LETTERS: [&str; 26] = [
        "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P", "Q",
        "R", "S", "T", "U", "V", "W", "X", "Y", "Z",
    ];
    const DIGITS: [&str; 10] = ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"];
    const NUMPAD: [&str; 10] = [
        "Numpad0", "Numpad1", "Numpad2", "Numpad3", "Numpad4", "Numpad5", "Numpad6",
        "Numpad7", "Numpad8", "Numpad9",
    ];
    const FKEYS: [&str; 24] = [
        "F1", "F2", "F3", "F4", "F5", "F6", "F7", "F8", "F9", "F10", "F11", "F12", "F13",
        "F14", "F15", "F16", "F17", "F18", "F19", "F20", "F21", "F22", "F23", "F24",
    ];

    let name = match vk {
        VK_A..=VK_Z => LETTERS[(vk - VK_A) as usize],
        VK_0..=VK_9 => DIGITS[(vk - VK_0) as usize],
        VK_NUMPAD0..=VK_NUMPAD9 => NUMPAD[(vk - VK_NUMPAD0) as usize],
        VK_F1..=VK_F24 => FKEYS[(vk - VK_F1) as usize],

        VK_SHIFT => "Shift",
        VK_LSHIFT => "LShift",
        VK_RSHIFT => "RShift",
        VK_CONTROL => "Ctrl",
        VK_LCONTROL => "LCtrl",
        VK_RCONTROL => "RCtrl",
        VK_MENU => "Alt",
        VK_LMENU => "LAlt",
        VK_RMENU => "RAlt",
        VK_LWIN => "LWin",
        VK_RWIN => "RWin",

        VK_BACK => "Backspace",
        VK_TAB => "Tab",
        VK_RETURN => "Enter",
        VK_ESCAPE => "Escape",
        VK_SPACE => "Space",
        VK_PRIOR => "PageUp",
        VK_NEXT => "PageDown",
        VK_END => "End",
        VK_HOME => "Home",
        VK_LEFT => "Left",
        VK_UP => "Up",
        VK_RIGHT => "Right",
        VK_DOWN => "Down",
        VK_INSERT => "Insert",
        VK_DELETE => "Delete",

        VK_CAPITAL => "CapsLock",
        VK_NUMLOCK => "NumLock",
        VK_SCROLL => "ScrollLock",
        VK_SNAPSHOT => "PrintScreen",
        VK_PAUSE => "Pause",

        VK_MULTIPLY => "NumpadMul",
        VK_ADD => "NumpadAdd",
        VK_SUBTRACT => "NumpadSub",
        VK_DECIMAL => "NumpadDecimal",
        VK_DIVIDE => "NumpadDiv",

        VK_OEM_1 => "Semicolon",
        VK_OEM_PLUS => "Equal",
        VK_OEM_COMMA => "Comma",
        VK_OEM_MINUS => "Minus",
        VK_OEM_PERIOD => "Period",
        VK_OEM_2 => "Slash",
        VK_OEM_3 => "Backtick",
        VK_OEM_4 => "LeftBracket",
        VK_OEM_5 => "Backslash",
        VK_OEM_6 => "RightBracket",
        VK_OEM_7 => "Quote",

        _ => return None,
    };
    Some(name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
