//! keyguard -- global low-level keyboard interceptor.
//!
//! The core is `interceptor::Interceptor`: it installs a system-wide
//! keyboard hook, decodes key-downs to characters, reports them to
//! subscribers, and can swallow keystrokes before any other hook sees them.
//! The remaining modules host it as a small daemon: toggles, periodic
//! re-hooking, a capture log, configuration and the control loop.

pub mod capture_log;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod interceptor;
pub mod keycodes;
pub mod platform;
pub mod protection;
pub mod rehook;

pub use interceptor::{HookState, Interceptor, InterceptorOptions, KeyPress, SwallowStrategy};
pub use platform::PlatformError;
