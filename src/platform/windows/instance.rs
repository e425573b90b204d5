//! Single-instance guard backed by a named kernel mutex.
//!
//! Two copies of the program would each install a hook and fight over the
//! top of the chain on every re-hook tick.

use std::ptr;

use windows_sys::Win32::Foundation::{CloseHandle, GetLastError, ERROR_ALREADY_EXISTS, HANDLE};
use windows_sys::Win32::System::Threading::CreateMutexW;

use crate::platform::PlatformError;

/// Owns a named mutex handle for the lifetime of the process.
pub struct NamedMutex {
    handle: HANDLE,
}

impl NamedMutex {
    /// Creates `Local\<name>`. Returns `Ok(None)` when it already exists.
    pub fn acquire(name: &str) -> Result<Option<Self>, PlatformError> {
        let wide: Vec<u16> = format!("Local\\{name}")
            .encode_utf16()
            .chain(std::iter::once(0))
            .collect();

        let handle = unsafe { CreateMutexW(ptr::null(), 0, wide.as_ptr()) };
        if handle.is_null() {
            let code = unsafe { GetLastError() };
            return Err(PlatformError::Other(format!(
                "CreateMutexW failed (error code {code})"
            )));
        }

        if unsafe { GetLastError() } == ERROR_ALREADY_EXISTS {
            unsafe { CloseHandle(handle) };
            return Ok(None);
        }

        Ok(Some(Self { handle }))
    }
}

impl Drop for NamedMutex {
    fn drop(&mut self) {
        unsafe { CloseHandle(self.handle) };
    }
}
