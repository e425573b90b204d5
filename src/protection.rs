//! Protection and display toggles.
//!
//! Two user-facing switches drive the interceptor:
//!
//! - protection: keystrokes are swallowed before any later hook sees them.
//! - display: keystrokes that do get decoded are echoed back to the user,
//!   demonstrating what a keylogger would have captured.
//!
//! Keystrokes are only let through to later hooks while protection is off
//! and display is on. Turning protection off on its own keeps swallowing;
//! it just reports the state. Turning display off also turns protection
//! back on, so leaving the demonstration always ends protected. Every
//! effective change yields one or more `Notice`s for the user.

/// User-visible status message for a toggle change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// Protection enabled while display is off.
    TypingProtectionEnabled,
    /// Protection disabled while display is off.
    TypingProtectionDisabled,
    /// Display on and protection on: nothing will be echoed.
    CaptureShownProtectionOn,
    /// Display on and protection off: keystrokes are being echoed.
    CaptureShownProtectionOff,
    CaptureHidden,
}

impl Notice {
    pub fn title(self) -> &'static str {
        match self {
            Notice::TypingProtectionEnabled | Notice::TypingProtectionDisabled => "Status change",
            Notice::CaptureShownProtectionOn => "Capture display on : protection ON",
            Notice::CaptureShownProtectionOff => "Capture display on : protection OFF",
            Notice::CaptureHidden => "Capture display off",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Notice::TypingProtectionEnabled => "Typing protection enabled.",
            Notice::TypingProtectionDisabled => "Typing protection disabled.",
            Notice::CaptureShownProtectionOn => {
                "Protection is enabled: keystrokes cannot be captured and will not be echoed, \
                 even by other software hooking the keyboard."
            }
            Notice::CaptureShownProtectionOff => {
                "Keystrokes typed in any program are now captured and echoed here. \
                 Any other keyboard hook on this machine sees them too."
            }
            Notice::CaptureHidden => {
                "Captured keystrokes are no longer echoed. Malicious software would not tell you."
            }
        }
    }
}

/// State of the two toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectionController {
    protection: bool,
    display: bool,
}

impl ProtectionController {
    pub fn new(protection: bool, display: bool) -> Self {
        Self {
            protection,
            display,
        }
    }

    pub fn protection_enabled(&self) -> bool {
        self.protection
    }

    pub fn display_enabled(&self) -> bool {
        self.display
    }

    /// Swallow mode the interceptor should be in.
    pub fn swallow(&self) -> bool {
        self.protection || !self.display
    }

    pub fn enable_protection(&mut self) -> Vec<Notice> {
        if self.protection {
            return Vec::new();
        }
        self.protection = true;
        vec![if self.display {
            Notice::CaptureShownProtectionOn
        } else {
            Notice::TypingProtectionEnabled
        }]
    }

    pub fn disable_protection(&mut self) -> Vec<Notice> {
        if !self.protection {
            return Vec::new();
        }
        self.protection = false;
        vec![if self.display {
            Notice::CaptureShownProtectionOff
        } else {
            Notice::TypingProtectionDisabled
        }]
    }

    pub fn set_protection(&mut self, on: bool) -> Vec<Notice> {
        if on {
            self.enable_protection()
        } else {
            self.disable_protection()
        }
    }

    /// Turns the capture display on or off. Off forces protection on.
    pub fn set_display(&mut self, on: bool) -> Vec<Notice> {
        if self.display == on {
            return Vec::new();
        }
        self.display = on;
        if on {
            return vec![if self.protection {
                Notice::CaptureShownProtectionOn
            } else {
                Notice::CaptureShownProtectionOff
            }];
        }

        let mut notices = vec![Notice::CaptureHidden];
        notices.extend(self.enable_protection());
        notices
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swallow_stops_only_when_unprotected_and_displayed() {
        assert!(ProtectionController::new(true, false).swallow());
        assert!(ProtectionController::new(true, true).swallow());
        assert!(!ProtectionController::new(false, true).swallow());
        assert!(ProtectionController::new(false, false).swallow());
    }

    #[test]
    fn disabling_without_display_keeps_swallowing() {
        let mut c = ProtectionController::new(true, false);
        assert_eq!(c.set_protection(false), vec![Notice::TypingProtectionDisabled]);
        assert!(!c.protection_enabled());
        assert!(c.swallow());
    }

    #[test]
    fn display_off_while_unprotected_resumes_swallowing() {
        let mut c = ProtectionController::new(false, true);
        assert!(!c.swallow());
        c.set_display(false);
        assert!(c.swallow());
    }

    #[test]
    fn enabling_twice_notifies_once() {
        let mut c = ProtectionController::new(false, false);
        assert_eq!(c.enable_protection(), vec![Notice::TypingProtectionEnabled]);
        assert!(c.enable_protection().is_empty());
        assert!(c.protection_enabled());
    }

    #[test]
    fn disabling_with_display_warns_about_capture() {
        let mut c = ProtectionController::new(true, true);
        assert_eq!(
            c.disable_protection(),
            vec![Notice::CaptureShownProtectionOff]
        );
        assert!(!c.swallow());
        assert!(c.disable_protection().is_empty());
    }

    #[test]
    fn display_on_reports_current_protection() {
        let mut c = ProtectionController::new(true, false);
        assert_eq!(c.set_display(true), vec![Notice::CaptureShownProtectionOn]);

        let mut c = ProtectionController::new(false, false);
        assert_eq!(c.set_display(true), vec![Notice::CaptureShownProtectionOff]);
        assert!(!c.swallow());
    }

    #[test]
    fn display_off_forces_protection_on() {
        let mut c = ProtectionController::new(false, true);
        assert_eq!(
            c.set_display(false),
            vec![Notice::CaptureHidden, Notice::TypingProtectionEnabled]
        );
        assert!(c.protection_enabled());
        assert!(!c.display_enabled());
        assert!(c.swallow());
    }

    #[test]
    fn display_off_when_already_protected_only_hides() {
        let mut c = ProtectionController::new(true, true);
        assert_eq!(c.set_display(false), vec![Notice::CaptureHidden]);
    }

    #[test]
    fn unchanged_display_is_silent() {
        let mut c = ProtectionController::new(true, false);
        assert!(c.set_display(false).is_empty());
    }

    #[test]
    fn every_notice_has_text() {
        for n in [
            Notice::TypingProtectionEnabled,
            Notice::TypingProtectionDisabled,
            Notice::CaptureShownProtectionOn,
            Notice::CaptureShownProtectionOff,
            Notice::CaptureHidden,
        ] {
            assert!(!n.title().is_empty());
            assert!(!n.message().is_empty());
        }
    }
}
