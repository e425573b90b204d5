//! Scriptable hook backend and keyboard layout.
//!
//! `SimulatedBackend` stands in for the OS hook chain: `inject()` plays the
//! role of a physical key transition, runs the installed handler, and records
//! whether the event was forwarded down the chain and whether it reached the
//! focused application. `SimulatedLayout` emulates a US keyboard layout and
//! lets individual keys be scripted to any `Translation`.
//!
//! Both are cheap clonable handles over shared state, so a test can hand one
//! clone to the interceptor and keep another to drive and inspect it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::keycodes::*;
use crate::platform::{
    Disposition, HookBackend, HookHandler, KeyTransition, KeyboardLayout, KeyboardState,
    ModifierState, PlatformError, RawKeyEvent, Translation,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[derive(Default)]
struct BackendState {
    handler: Option<HookHandler>,
    /// Events passed on to the next hook in the chain.
    forwarded: Vec<RawKeyEvent>,
    /// Events that reached the focused application.
    delivered: Vec<RawKeyEvent>,
    refuse_next: Option<PlatformError>,
    installs: usize,
    layout: Option<SimulatedLayout>,
}

/// In-process stand-in for the OS hook chain.
#[derive(Clone, Default)]
pub struct SimulatedBackend {
    inner: Arc<Mutex<BackendState>>,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Links a layout whose key state follows the injected transitions, the
    /// way the OS updates its key state after the hook chain has run.
    pub fn with_layout(layout: SimulatedLayout) -> Self {
        let backend = Self::new();
        lock(&backend.inner).layout = Some(layout);
        backend
    }

    /// Makes the next `install` fail with `err`.
    pub fn refuse_next_install(&self, err: PlatformError) {
        lock(&self.inner).refuse_next = Some(err);
    }

    /// Delivers one key transition through the simulated hook chain.
    pub fn inject(&self, event: RawKeyEvent) -> Disposition {
        // Clone the handler out so it runs without the state lock held.
        let handler = lock(&self.inner).handler.clone();
        let disposition = match handler {
            Some(h) => h(&event),
            None => Disposition::Forward,
        };

        let layout = {
            let mut state = lock(&self.inner);
            if disposition.is_forwarded() {
                state.forwarded.push(event);
            }
            if disposition != Disposition::Block {
                state.delivered.push(event);
            }
            state.layout.clone()
        };

        if disposition != Disposition::Block {
            if let Some(layout) = layout {
                layout.apply(&event);
            }
        }

        disposition
    }

    /// Injects a full press-and-release of `vk`, returning the key-down disposition.
    pub fn tap(&self, vk: u32) -> Disposition {
        let down = self.inject(RawKeyEvent::key_down(vk, 0));
        self.inject(RawKeyEvent::key_up(vk, 0));
        down
    }

    pub fn forwarded(&self) -> Vec<RawKeyEvent> {
        lock(&self.inner).forwarded.clone()
    }

    pub fn delivered(&self) -> Vec<RawKeyEvent> {
        lock(&self.inner).delivered.clone()
    }

    /// Number of successful installs since creation.
    pub fn install_count(&self) -> usize {
        lock(&self.inner).installs
    }
}

impl HookBackend for SimulatedBackend {
    fn install(&mut self, handler: HookHandler) -> Result<(), PlatformError> {
        let mut state = lock(&self.inner);
        if let Some(err) = state.refuse_next.take() {
            return Err(err);
        }
        if state.handler.is_some() {
            return Err(PlatformError::Busy);
        }
        state.handler = Some(handler);
        state.installs += 1;
        Ok(())
    }

    fn uninstall(&mut self) -> Result<(), PlatformError> {
        lock(&self.inner).handler = None;
        Ok(())
    }

    fn is_installed(&self) -> bool {
        lock(&self.inner).handler.is_some()
    }
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LayoutState {
    keys: KeyboardState,
    scripted: HashMap<u32, Translation>,
}

/// US-layout translator with a mutable key state table.
#[derive(Clone, Default)]
pub struct SimulatedLayout {
    inner: Arc<Mutex<LayoutState>>,
}

impl SimulatedLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self, vk: u32) {
        lock(&self.inner).keys.set_pressed(vk, true);
    }

    pub fn release(&self, vk: u32) {
        lock(&self.inner).keys.set_pressed(vk, false);
    }

    pub fn set_caps_lock(&self, on: bool) {
        lock(&self.inner).keys.set_toggled(VK_CAPITAL, on);
    }

    /// Forces `vk` to translate to `translation` regardless of state.
    pub fn script(&self, vk: u32, translation: Translation) {
        lock(&self.inner).scripted.insert(vk, translation);
    }

    /// Updates key state for a transition that made it past the hook chain.
    fn apply(&self, event: &RawKeyEvent) {
        let mut state = lock(&self.inner);
        match event.transition {
            KeyTransition::Down | KeyTransition::SysDown => {
                if event.vk_code == VK_CAPITAL && !state.keys.is_pressed(VK_CAPITAL) {
                    let on = state.keys.caps_lock_on();
                    state.keys.set_toggled(VK_CAPITAL, !on);
                }
                state.keys.set_pressed(event.vk_code, true);
                if let Some(generic) = generic_modifier(event.vk_code) {
                    state.keys.set_pressed(generic, true);
                }
            }
            KeyTransition::Up | KeyTransition::SysUp => {
                state.keys.set_pressed(event.vk_code, false);
                if let Some(generic) = generic_modifier(event.vk_code) {
                    state.keys.set_pressed(generic, false);
                }
            }
        }
    }
}

impl KeyboardLayout for SimulatedLayout {
    fn snapshot(&self) -> KeyboardState {
        lock(&self.inner).keys.clone()
    }

    fn translate(&self, event: &RawKeyEvent, state: &KeyboardState) -> Translation {
        if let Some(t) = lock(&self.inner).scripted.get(&event.vk_code) {
            return *t;
        }
        us_layout(event.vk_code, state)
    }

    fn modifiers(&self) -> ModifierState {
        let state = lock(&self.inner);
        ModifierState {
            shift_down: state.keys.shift_down(),
            caps_lock_on: state.keys.caps_lock_on(),
        }
    }
}

fn generic_modifier(vk: u32) -> Option<u32> {
    match vk {
        VK_LSHIFT | VK_RSHIFT => Some(VK_SHIFT),
        VK_LCONTROL | VK_RCONTROL => Some(VK_CONTROL),
        VK_LMENU | VK_RMENU => Some(VK_MENU),
        _ => None,
    }
}

/// Translates `vk` the way `ToUnicode` does for the US English layout.
fn us_layout(vk: u32, state: &KeyboardState) -> Translation {
    const SHIFTED_DIGITS: [char; 10] = [')', '!', '@', '#', '$', '%', '^', '&', '*', '('];

    let shift = state.shift_down();
    let c = match vk {
        VK_A..=VK_Z => {
            let upper = shift ^ state.caps_lock_on();
            let base = (b'a' + (vk - VK_A) as u8) as char;
            if upper {
                base.to_ascii_uppercase()
            } else {
                base
            }
        }
        VK_0..=VK_9 if shift => SHIFTED_DIGITS[(vk - VK_0) as usize],
        VK_0..=VK_9 => (b'0' + (vk - VK_0) as u8) as char,
        VK_NUMPAD0..=VK_NUMPAD9 if state.is_toggled(VK_NUMLOCK) => {
            (b'0' + (vk - VK_NUMPAD0) as u8) as char
        }
        VK_SPACE => ' ',
        VK_RETURN => '\r',
        VK_BACK => '\u{8}',
        VK_TAB => '\t',
        VK_ESCAPE => '\u{1b}',
        VK_MULTIPLY => '*',
        VK_ADD => '+',
        VK_SUBTRACT => '-',
        VK_DIVIDE => '/',
        VK_OEM_1 => pick(shift, ';', ':'),
        VK_OEM_PLUS => pick(shift, '=', '+'),
        VK_OEM_COMMA => pick(shift, ',', '<'),
        VK_OEM_MINUS => pick(shift, '-', '_'),
        VK_OEM_PERIOD => pick(shift, '.', '>'),
        VK_OEM_2 => pick(shift, '/', '?'),
        VK_OEM_3 => pick(shift, '`', '~'),
        VK_OEM_4 => pick(shift, '[', '{'),
        VK_OEM_5 => pick(shift, '\\', '|'),
        VK_OEM_6 => pick(shift, ']', '}'),
        VK_OEM_7 => pick(shift, '\'', '"'),
        _ => return Translation::None,
    };
    Translation::One(c)
}

fn pick(shift: bool, plain: char, shifted: char) -> char {
    if shift {
        shifted
    } else {
        plain
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn translate(layout: &SimulatedLayout, vk: u32) -> Translation {
        layout.translate(&RawKeyEvent::key_down(vk, 0), &layout.snapshot())
    }

    #[test]
    fn uninstalled_backend_forwards_everything() {
        let backend = SimulatedBackend::new();
        assert_eq!(backend.tap(VK_A), Disposition::Forward);
        assert_eq!(backend.forwarded().len(), 2);
        assert_eq!(backend.delivered().len(), 2);
    }

    #[test]
    fn handler_decides_disposition() {
        let mut backend = SimulatedBackend::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        backend
            .install(Arc::new(move |_: &RawKeyEvent| {
                seen.fetch_add(1, Ordering::SeqCst);
                Disposition::Block
            }))
            .unwrap();

        assert_eq!(backend.tap(VK_A), Disposition::Block);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(backend.forwarded().is_empty());
        assert!(backend.delivered().is_empty());
    }

    #[test]
    fn bypass_is_delivered_but_not_forwarded() {
        let mut backend = SimulatedBackend::new();
        backend
            .install(Arc::new(|_: &RawKeyEvent| Disposition::BypassChain))
            .unwrap();
        backend.inject(RawKeyEvent::key_down(VK_A, 0));
        assert!(backend.forwarded().is_empty());
        assert_eq!(backend.delivered().len(), 1);
    }

    #[test]
    fn second_install_is_busy() {
        let mut backend = SimulatedBackend::new();
        backend
            .install(Arc::new(|_: &RawKeyEvent| Disposition::Forward))
            .unwrap();
        let err = backend
            .install(Arc::new(|_: &RawKeyEvent| Disposition::Forward))
            .unwrap_err();
        assert_eq!(err, PlatformError::Busy);
        assert_eq!(backend.install_count(), 1);
    }

    #[test]
    fn refused_install_leaves_backend_idle() {
        let mut backend = SimulatedBackend::new();
        backend.refuse_next_install(PlatformError::InstallRefused { code: 8 });
        let err = backend
            .install(Arc::new(|_: &RawKeyEvent| Disposition::Forward))
            .unwrap_err();
        assert_eq!(err, PlatformError::InstallRefused { code: 8 });
        assert!(!backend.is_installed());
    }

    #[test]
    fn uninstall_when_idle_is_noop() {
        let mut backend = SimulatedBackend::new();
        assert!(backend.uninstall().is_ok());
        assert!(backend.uninstall().is_ok());
    }

    #[test]
    fn us_layout_letters_follow_shift_and_caps() {
        let layout = SimulatedLayout::new();
        assert_eq!(translate(&layout, VK_A), Translation::One('a'));

        layout.press(VK_LSHIFT);
        assert_eq!(translate(&layout, VK_A), Translation::One('A'));

        layout.set_caps_lock(true);
        assert_eq!(translate(&layout, VK_A), Translation::One('a'));

        layout.release(VK_LSHIFT);
        assert_eq!(translate(&layout, VK_A), Translation::One('A'));
    }

    #[test]
    fn us_layout_shifted_digits_and_punctuation() {
        let layout = SimulatedLayout::new();
        assert_eq!(translate(&layout, b'5' as u32), Translation::One('5'));
        assert_eq!(translate(&layout, VK_OEM_2), Translation::One('/'));
        layout.press(VK_RSHIFT);
        assert_eq!(translate(&layout, b'5' as u32), Translation::One('%'));
        assert_eq!(translate(&layout, VK_OEM_2), Translation::One('?'));
    }

    #[test]
    fn us_layout_control_and_untranslatable_keys() {
        let layout = SimulatedLayout::new();
        assert_eq!(translate(&layout, VK_RETURN), Translation::One('\r'));
        assert_eq!(translate(&layout, VK_LSHIFT), Translation::None);
        assert_eq!(translate(&layout, VK_F1), Translation::None);
        // Numpad digits need NumLock.
        assert_eq!(translate(&layout, VK_NUMPAD0 + 3), Translation::None);
    }

    #[test]
    fn scripted_translation_wins() {
        let layout = SimulatedLayout::new();
        layout.script(VK_OEM_7, Translation::Dead);
        assert_eq!(translate(&layout, VK_OEM_7), Translation::Dead);
    }

    #[test]
    fn linked_layout_tracks_injected_modifiers() {
        let layout = SimulatedLayout::new();
        let backend = SimulatedBackend::with_layout(layout.clone());

        backend.inject(RawKeyEvent::key_down(VK_LSHIFT, 0x2A));
        assert!(layout.modifiers().shift_down);
        assert!(layout.snapshot().is_pressed(VK_SHIFT));
        backend.inject(RawKeyEvent::key_up(VK_LSHIFT, 0x2A));
        assert!(!layout.modifiers().shift_down);

        backend.tap(VK_CAPITAL);
        assert!(layout.modifiers().caps_lock_on);
        backend.tap(VK_CAPITAL);
        assert!(!layout.modifiers().caps_lock_on);
    }

    #[test]
    fn blocked_events_do_not_update_key_state() {
        let layout = SimulatedLayout::new();
        let mut backend = SimulatedBackend::with_layout(layout.clone());
        backend
            .install(Arc::new(|_: &RawKeyEvent| Disposition::Block))
            .unwrap();
        backend.inject(RawKeyEvent::key_down(VK_LSHIFT, 0x2A));
        assert!(!layout.modifiers().shift_down);
    }
}
