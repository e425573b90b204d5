//! Windows keyboard interception via WH_KEYBOARD_LL (low-level keyboard hook).
//!
//! `WindowsHook` implements `HookBackend`. `install()` spawns a background
//! thread that installs the hook and runs a `GetMessageW` loop (required for
//! low-level hooks to deliver events). `uninstall()` removes the hook, posts
//! `WM_QUIT` to exit the message loop, then joins the thread.
//!
//! No special permissions are required on Windows for WH_KEYBOARD_LL.
//!
//! Dispositions map onto the hook proc's return value:
//!   Forward     -> `CallNextHookEx` (next hook runs, normal delivery)
//!   Block       -> non-zero `LRESULT` (event discarded)
//!   BypassChain -> zero `LRESULT` without `CallNextHookEx` (later hooks
//!                  skipped, the focused window still receives the key)
//!
//! Handler storage: `WH_KEYBOARD_LL` hook procs receive no `user_info`
//! pointer, so the handler lives in a process-global slot. A second install
//! while the slot is occupied fails with `PlatformError::Busy`.
//!
//! The OS silently drops a low-level hook whose proc exceeds
//! `LowLevelHooksTimeout`; the handler must never block.

use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::mpsc;
use std::sync::RwLock;
use std::thread::{self, JoinHandle};

use windows_sys::Win32::Foundation::{GetLastError, LPARAM, LRESULT, WPARAM};
use windows_sys::Win32::System::Threading::GetCurrentThreadId;
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, GetMessageW, PostThreadMessageW, SetWindowsHookExW, UnhookWindowsHookEx,
    HC_ACTION, HHOOK, KBDLLHOOKSTRUCT, MSG, WH_KEYBOARD_LL, WM_KEYDOWN, WM_KEYUP, WM_QUIT,
    WM_SYSKEYDOWN, WM_SYSKEYUP,
};

use crate::platform::{
    Disposition, HookBackend, HookHandler, KeyTransition, PlatformError, RawKeyEvent,
};

// ---------------------------------------------------------------------------
// Process-global handler storage
// ---------------------------------------------------------------------------

/// Handler for the active hook. At most one `WindowsHook` may own it.
static HOOK_HANDLER: RwLock<Option<HookHandler>> = RwLock::new(None);

fn claim_slot(handler: HookHandler) -> Result<(), PlatformError> {
    let mut slot = HOOK_HANDLER
        .write()
        .map_err(|_| PlatformError::Other("hook handler lock poisoned".into()))?;
    if slot.is_some() {
        return Err(PlatformError::Busy);
    }
    *slot = Some(handler);
    Ok(())
}

fn release_slot() {
    if let Ok(mut slot) = HOOK_HANDLER.write() {
        *slot = None;
    }
}

// ---------------------------------------------------------------------------
// Public struct
// ---------------------------------------------------------------------------

/// Windows hook backend using `WH_KEYBOARD_LL`.
pub struct WindowsHook {
    /// Handle returned by `SetWindowsHookExW`. Stored as isize for Send.
    hook: Option<isize>,
    /// Thread ID of the message-loop thread; target of `PostThreadMessageW`.
    thread_id: u32,
    thread: Option<JoinHandle<()>>,
}

impl WindowsHook {
    pub fn new() -> Self {
        Self {
            hook: None,
            thread_id: 0,
            thread: None,
        }
    }
}

// ---------------------------------------------------------------------------
// HookBackend trait impl
// ---------------------------------------------------------------------------

impl HookBackend for WindowsHook {
    fn install(&mut self, handler: HookHandler) -> Result<(), PlatformError> {
        if self.hook.is_some() {
            return Err(PlatformError::Busy);
        }

        // Handler must be in place before the first event can arrive.
        claim_slot(handler)?;

        // Background thread reports (hook_handle, thread_id) once set up.
        let (info_tx, info_rx) = mpsc::channel::<Result<(isize, u32), PlatformError>>();

        let thread = thread::spawn(move || {
            let hook =
                unsafe { SetWindowsHookExW(WH_KEYBOARD_LL, Some(hook_proc), ptr::null_mut(), 0) };

            if hook.is_null() {
                let code = unsafe { GetLastError() };
                let _ = info_tx.send(Err(PlatformError::InstallRefused { code }));
                return;
            }

            let thread_id = unsafe { GetCurrentThreadId() };
            let _ = info_tx.send(Ok((hook as isize, thread_id)));

            log::info!("hook: WH_KEYBOARD_LL installed");

            // Returns 0 on WM_QUIT, -1 on error; both exit the loop.
            unsafe {
                let mut msg: MSG = std::mem::zeroed();
                while GetMessageW(&mut msg, ptr::null_mut(), 0, 0) > 0 {}
            }

            log::debug!("hook: message loop exited");
        });

        match info_rx.recv() {
            Ok(Ok((hook, thread_id))) => {
                self.hook = Some(hook);
                self.thread_id = thread_id;
                self.thread = Some(thread);
                Ok(())
            }
            Ok(Err(e)) => {
                release_slot();
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                release_slot();
                Err(PlatformError::Other(
                    "hook thread exited before reporting status".into(),
                ))
            }
        }
    }

    fn uninstall(&mut self) -> Result<(), PlatformError> {
        // Unhook first so no further hook_proc calls start after this point.
        // The error code is read immediately; the calls below overwrite it.
        let failure = match self.hook.take() {
            Some(hook) if unsafe { UnhookWindowsHookEx(hook as HHOOK) } == 0 => {
                Some(unsafe { GetLastError() })
            }
            _ => None,
        };

        if self.thread_id != 0 {
            unsafe { PostThreadMessageW(self.thread_id, WM_QUIT, 0, 0) };
            self.thread_id = 0;
        }

        // Joining the message-loop thread guarantees no proc is still running.
        if let Some(t) = self.thread.take() {
            let _ = t.join();
            release_slot();
            log::info!("hook: WH_KEYBOARD_LL removed");
        }

        removal_result(failure)
    }

    fn is_installed(&self) -> bool {
        self.hook.is_some()
    }
}

impl Drop for WindowsHook {
    fn drop(&mut self) {
        let _ = self.uninstall();
    }
}

/// Maps the error code captured right after `UnhookWindowsHookEx`.
fn removal_result(failure: Option<u32>) -> Result<(), PlatformError> {
    match failure {
        None => Ok(()),
        Some(code) => Err(PlatformError::Other(format!(
            "UnhookWindowsHookEx failed (error code {code})"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Hook procedure
// ---------------------------------------------------------------------------

/// Low-level keyboard hook proc, called on the message-loop thread.
///
/// `n_code < 0` and unrecognised messages always go down the chain, as the
/// hook contract requires. A panicking handler is treated as `Forward` so a
/// bug can never lock the user out of their keyboard.
unsafe extern "system" fn hook_proc(n_code: i32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    if n_code != HC_ACTION as i32 {
        return CallNextHookEx(ptr::null_mut(), n_code, w_param, l_param);
    }

    let transition = match w_param as u32 {
        WM_KEYDOWN => KeyTransition::Down,
        WM_KEYUP => KeyTransition::Up,
        WM_SYSKEYDOWN => KeyTransition::SysDown,
        WM_SYSKEYUP => KeyTransition::SysUp,
        _ => return CallNextHookEx(ptr::null_mut(), n_code, w_param, l_param),
    };

    let kb = &*(l_param as *const KBDLLHOOKSTRUCT);
    let event = RawKeyEvent {
        vk_code: kb.vkCode,
        scan_code: kb.scanCode,
        flags: kb.flags,
        time: kb.time,
        extra_info: kb.dwExtraInfo,
        transition,
    };

    // Clone the Arc out so the lock is not held while the handler runs.
    let handler = HOOK_HANDLER.read().ok().and_then(|slot| slot.clone());

    let disposition = match handler {
        Some(h) => panic::catch_unwind(AssertUnwindSafe(|| h(&event))).unwrap_or_else(|_| {
            log::error!("hook: handler panicked; forwarding event");
            Disposition::Forward
        }),
        None => Disposition::Forward,
    };

    match disposition {
        Disposition::Forward => CallNextHookEx(ptr::null_mut(), n_code, w_param, l_param),
        Disposition::Block => 1,
        Disposition::BypassChain => 0,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removal_failure_keeps_the_unhook_error_code() {
        assert!(removal_result(None).is_ok());
        let err = removal_result(Some(1404)).unwrap_err();
        assert!(err.to_string().contains("1404"));
    }

    #[test]
    fn new_produces_idle_state() {
        let hook = WindowsHook::new();
        assert!(hook.hook.is_none());
        assert_eq!(hook.thread_id, 0);
        assert!(hook.thread.is_none());
        assert!(!hook.is_installed());
    }

    /// Uninstalling a hook that was never installed must return Ok and not panic.
    #[test]
    fn uninstall_on_idle_hook_is_noop() {
        let mut hook = WindowsHook::new();
        assert!(hook.uninstall().is_ok());
        assert!(hook.uninstall().is_ok());
    }
}
