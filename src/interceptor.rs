//! Global keyboard interceptor.
//!
//! `Interceptor` owns one `HookBackend` and one `KeyboardLayout`. While
//! hooked, the backend calls into `Shared::handle` for every key transition,
//! synchronously and on the backend's hook thread. That path decides the
//! event's fate:
//!
//! 1. Swallow mode on: consume (per `SwallowStrategy`), no character event.
//! 2. Key-down only: snapshot the key state and translate.
//! 3. Apply the Shift/Caps Lock case rule to each printable character.
//! 4. Dispatch a `KeyPress` to every subscriber in registration order.
//!    If any subscriber marks it handled, block this one event.
//!
//! The handler must return quickly or the OS drops the hook, so it only
//! touches an atomic, a read lock, and the layout. Subscribers must not
//! block and must not subscribe or unsubscribe from inside a callback.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Deserialize;

use crate::keycodes::{is_modifier, vk_name};
use crate::platform::{
    Disposition, HookBackend, HookHandler, KeyTransition, KeyboardLayout, ModifierState,
    PlatformError, RawKeyEvent, Translation,
};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A decoded character delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub character: char,
    /// Set to true to consume this single event at the OS level.
    pub handled: bool,
}

/// Token returned by `subscribe`, used to remove the subscriber again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    Unhooked,
    Hooked,
}

/// How a swallowed event is reported back to the OS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SwallowStrategy {
    /// Discard the event entirely.
    #[default]
    Block,
    /// Skip the rest of the hook chain but let the focused window have it.
    BypassChain,
}

impl SwallowStrategy {
    fn disposition(self) -> Disposition {
        match self {
            SwallowStrategy::Block => Disposition::Block,
            SwallowStrategy::BypassChain => Disposition::BypassChain,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterceptorOptions {
    pub swallow_strategy: SwallowStrategy,
    /// Forward injected (synthetic) events untouched.
    pub pass_injected: bool,
}

type Subscriber = Box<dyn Fn(&mut KeyPress) + Send + Sync>;

// ---------------------------------------------------------------------------
// State shared with the hook thread
// ---------------------------------------------------------------------------

struct Shared {
    swallow: AtomicBool,
    options: InterceptorOptions,
    layout: Box<dyn KeyboardLayout>,
    subscribers: RwLock<Vec<(SubscriptionId, Subscriber)>>,
    next_id: AtomicU64,
}

impl Shared {
    fn handle(&self, event: &RawKeyEvent) -> Disposition {
        if self.options.pass_injected && event.is_injected() {
            return Disposition::Forward;
        }

        if self.swallow.load(Ordering::Acquire) {
            return self.options.swallow_strategy.disposition();
        }

        if event.transition != KeyTransition::Down {
            return Disposition::Forward;
        }

        let state = self.layout.snapshot();
        let decoded = match self.layout.translate(event, &state) {
            Translation::One(c) => [Some(c), None],
            Translation::Two(a, b) => [Some(a), Some(b)],
            Translation::Dead => return Disposition::Forward,
            Translation::None => {
                if !is_modifier(event.vk_code) {
                    log::trace!(
                        "hook: no translation for {}",
                        vk_name(event.vk_code).unwrap_or("unknown key")
                    );
                }
                return Disposition::Forward;
            }
        };

        let modifiers = self.layout.modifiers();
        let mut handled = false;
        for c in decoded.into_iter().flatten() {
            let c = apply_case(c, modifiers);
            if c.is_control() {
                continue;
            }
            handled |= self.dispatch(c);
        }

        if handled {
            Disposition::Block
        } else {
            Disposition::Forward
        }
    }

    /// Delivers `character` to every subscriber. Returns whether any handled it.
    fn dispatch(&self, character: char) -> bool {
        let Ok(subscribers) = self.subscribers.read() else {
            log::warn!("hook: subscriber list poisoned; forwarding event");
            return false;
        };

        let mut press = KeyPress {
            character,
            handled: false,
        };
        for (_, subscriber) in subscribers.iter() {
            subscriber(&mut press);
        }
        press.handled
    }
}

/// Uppercases alphabetic characters when exactly one of Shift and Caps Lock is active.
pub fn apply_case(c: char, modifiers: ModifierState) -> char {
    if !(modifiers.shift_down ^ modifiers.caps_lock_on) || !c.is_alphabetic() {
        return c;
    }
    let mut upper = c.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(u), None) => u,
        // Multi-char uppercase forms ('ß' -> "SS") cannot be one event.
        _ => c,
    }
}

// ---------------------------------------------------------------------------
// Swallow control handle
// ---------------------------------------------------------------------------

/// Clonable handle that toggles swallow mode from any thread.
#[derive(Clone)]
pub struct SwallowControl {
    shared: Arc<Shared>,
}

impl SwallowControl {
    pub fn set(&self, swallow: bool) {
        self.shared.swallow.store(swallow, Ordering::Release);
    }

    pub fn get(&self) -> bool {
        self.shared.swallow.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Interceptor
// ---------------------------------------------------------------------------

/// Owner of the system-wide keyboard hook.
pub struct Interceptor {
    shared: Arc<Shared>,
    backend: Box<dyn HookBackend>,
}

impl Interceptor {
    pub fn new(
        backend: Box<dyn HookBackend>,
        layout: Box<dyn KeyboardLayout>,
        options: InterceptorOptions,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                swallow: AtomicBool::new(false),
                options,
                layout,
                subscribers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
            backend,
        }
    }

    /// Installs the hook with the given initial swallow mode.
    ///
    /// Hooking while already hooked only updates the swallow mode; the
    /// existing registration is kept. On failure the interceptor stays
    /// unhooked and keys are not intercepted.
    pub fn hook(&mut self, swallow: bool) -> Result<(), PlatformError> {
        if self.backend.is_installed() {
            log::debug!("hook: already installed; updating swallow mode only");
            self.set_swallow(swallow);
            return Ok(());
        }

        self.set_swallow(swallow);
        let shared = Arc::clone(&self.shared);
        let handler: HookHandler = Arc::new(move |event: &RawKeyEvent| shared.handle(event));

        if let Err(e) = self.backend.install(handler) {
            log::warn!("hook: install failed: {e}");
            self.set_swallow(false);
            return Err(e);
        }

        log::info!("hook: installed (swallow={swallow})");
        Ok(())
    }

    /// Removes the hook if installed and turns swallow mode off.
    pub fn unhook(&mut self) -> Result<(), PlatformError> {
        let was_installed = self.backend.is_installed();
        self.set_swallow(false);
        if was_installed {
            self.backend.uninstall()?;
            log::info!("hook: removed");
        }
        Ok(())
    }

    /// Reinstalls the hook to regain the head of the hook chain.
    ///
    /// Swallow mode survives the cycle. Must not be called from a subscriber.
    pub fn rehook(&mut self) -> Result<(), PlatformError> {
        let swallow = self.swallow();
        self.unhook()?;
        self.hook(swallow)?;
        log::debug!("rehook: hook reinstalled");
        Ok(())
    }

    pub fn set_swallow(&self, swallow: bool) {
        self.shared.swallow.store(swallow, Ordering::Release);
    }

    pub fn swallow(&self) -> bool {
        self.shared.swallow.load(Ordering::Acquire)
    }

    pub fn swallow_control(&self) -> SwallowControl {
        SwallowControl {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn state(&self) -> HookState {
        if self.backend.is_installed() {
            HookState::Hooked
        } else {
            HookState::Unhooked
        }
    }

    /// Registers `f` to receive every decoded character while hooked.
    pub fn subscribe<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&mut KeyPress) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subscribers = self
            .shared
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.push((id, Box::new(f)));
        id
    }

    /// Removes a subscriber. Returns false if `id` was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .shared
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }
}

impl Drop for Interceptor {
    fn drop(&mut self) {
        if let Err(e) = self.unhook() {
            log::warn!("hook: unhook on drop failed: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
