//! Daemon lifecycle: wires the interceptor to the toggles, the re-hook
//! schedule and the capture log, and runs the control loop.
//!
//! Threads:
//!   hook thread    -- owned by the backend; runs the hook callback. The only
//!                     subscriber sends characters over a channel.
//!   stdin thread   -- parses control commands and sends them.
//!   signal handler -- sends `Shutdown` on Ctrl-C.
//!   main thread    -- `Daemon::run`: receives events, applies commands,
//!                     re-hooks on schedule, prints output.
//!
//! Everything that can block or print happens on the main thread.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::capture_log::CaptureLog;
use crate::cli::{Command, USAGE};
use crate::config::{Config, ConfigError};
use crate::interceptor::{HookState, Interceptor};
use crate::platform::PlatformError;
use crate::protection::{Notice, ProtectionController};
use crate::rehook::RehookSchedule;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error("another instance is already running")]
    AlreadyRunning,
    #[error("cannot install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

/// Messages delivered to the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonEvent {
    Key(char),
    Command(Command),
    Shutdown,
}

pub struct Daemon {
    interceptor: Interceptor,
    controller: ProtectionController,
    schedule: RehookSchedule,
    capture: CaptureLog,
    /// Read by the hook-thread subscriber to decide whether to emit keys.
    display: Arc<AtomicBool>,
}

impl Daemon {
    pub fn new(config: &Config, interceptor: Interceptor) -> Self {
        let controller = ProtectionController::new(
            config.interceptor.swallow_on_start,
            config.display.show_captured,
        );
        Self {
            interceptor,
            controller,
            schedule: RehookSchedule::new(&config.rehook, Instant::now()),
            capture: CaptureLog::new(config.display.capture_capacity),
            display: Arc::new(AtomicBool::new(controller.display_enabled())),
        }
    }

    /// Subscribes to decoded keys and installs the hook.
    pub fn start(&mut self, events: Sender<DaemonEvent>) -> Result<(), PlatformError> {
        let display = Arc::clone(&self.display);
        self.interceptor.subscribe(move |press| {
            if display.load(Ordering::Relaxed) {
                let _ = events.send(DaemonEvent::Key(press.character));
            }
        });
        self.interceptor.hook(self.controller.swallow())?;
        log::info!(
            "daemon: started (protection={}, display={})",
            self.controller.protection_enabled(),
            self.controller.display_enabled()
        );
        Ok(())
    }

    /// Runs until `Quit`, `Shutdown`, or every sender is gone, then unhooks.
    pub fn run(&mut self, events: &Receiver<DaemonEvent>) -> Result<(), DaemonError> {
        loop {
            let timeout = self.schedule.until_due(Instant::now());
            match events.recv_timeout(timeout) {
                Ok(DaemonEvent::Key(c)) => self.on_key(c),
                Ok(DaemonEvent::Command(cmd)) => {
                    if !self.apply(cmd) {
                        break;
                    }
                }
                Ok(DaemonEvent::Shutdown) => {
                    log::info!("daemon: shutdown requested");
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.tick(Instant::now());
        }

        self.interceptor.unhook()?;
        log::info!("daemon: stopped");
        Ok(())
    }

    /// Applies one control command. Returns false when the loop should exit.
    pub fn apply(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Protect(on) => {
                let notices = self.controller.set_protection(on);
                self.sync(&notices);
            }
            Command::Display(on) => {
                let notices = self.controller.set_display(on);
                self.sync(&notices);
            }
            Command::Status => println!("{}", self.status_line()),
            Command::Show => println!("{}", self.capture.contents()),
            Command::Clear => self.capture.clear(),
            Command::Help => println!("{USAGE}"),
            Command::Quit => return false,
        }
        true
    }

    /// Re-hooks when the schedule says so. A hook lost to a failed
    /// re-install is restored on the next due tick.
    pub fn tick(&mut self, now: Instant) {
        if !self.schedule.due(now, self.controller.protection_enabled()) {
            return;
        }
        let result = match self.interceptor.state() {
            HookState::Hooked => self.interceptor.rehook(),
            HookState::Unhooked => self.interceptor.hook(self.controller.swallow()),
        };
        match result {
            // Rehook preserves the interceptor's mode; make sure it matches the toggles.
            Ok(()) => self.interceptor.set_swallow(self.controller.swallow()),
            Err(e) => log::warn!("rehook: failed: {e}"),
        }
    }

    pub fn status_line(&self) -> String {
        let hooked = match self.interceptor.state() {
            HookState::Hooked => "hooked",
            HookState::Unhooked => "unhooked",
        };
        format!(
            "{hooked}, protection {}, display {}, swallow {}, {} captured",
            on_off(self.controller.protection_enabled()),
            on_off(self.controller.display_enabled()),
            on_off(self.interceptor.swallow()),
            self.capture.len()
        )
    }

    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    pub fn controller(&self) -> &ProtectionController {
        &self.controller
    }

    pub fn capture(&self) -> &CaptureLog {
        &self.capture
    }

    fn on_key(&mut self, c: char) {
        // A key queued just before display went off is dropped here.
        if !self.controller.display_enabled() {
            return;
        }
        self.capture.push(c);
        let mut out = io::stdout().lock();
        let _ = write!(out, "{c}");
        let _ = out.flush();
    }

    fn sync(&mut self, notices: &[Notice]) {
        self.interceptor.set_swallow(self.controller.swallow());
        self.display
            .store(self.controller.display_enabled(), Ordering::Relaxed);
        if !self.controller.display_enabled() {
            self.capture.clear();
        }
        for notice in notices {
            log::info!("{}: {}", notice.title(), notice.message());
        }
    }
}

fn on_off(b: bool) -> &'static str {
    if b {
        "on"
    } else {
        "off"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
