//! Command-line arguments and stdin control commands.

use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_FILE;

pub const USAGE: &str = "\
usage: keyguard [--config <path>] [--version] [--help]

Commands (one per line on stdin):
  protect on|off   swallow keystrokes before other hooks see them
  display on|off   echo keystrokes that get captured
  status           show hook, protection and display state
  show             print the captured keystroke buffer
  clear            empty the captured keystroke buffer
  help             this text
  quit             unhook and exit";

/// What the process was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Run {
        config: PathBuf,
        /// True when the path was given explicitly and must exist.
        explicit: bool,
    },
    Version,
    Help,
}

/// Parses process arguments (without the program name).
pub fn parse_args<I>(args: I) -> Result<Invocation, String>
where
    I: IntoIterator<Item = String>,
{
    let mut config: Option<PathBuf> = None;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Invocation::Help),
            "-V" | "--version" => return Ok(Invocation::Version),
            "-c" | "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| format!("{arg} requires a path"))?;
                config = Some(PathBuf::from(path));
            }
            other => {
                if let Some(path) = other.strip_prefix("--config=") {
                    config = Some(PathBuf::from(path));
                } else {
                    return Err(format!("unexpected argument '{other}'"));
                }
            }
        }
    }

    Ok(match config {
        Some(path) => Invocation::Run {
            config: path,
            explicit: true,
        },
        None => Invocation::Run {
            config: PathBuf::from(DEFAULT_CONFIG_FILE),
            explicit: false,
        },
    })
}

/// A control command read from stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Protect(bool),
    Display(bool),
    Status,
    Show,
    Clear,
    Help,
    Quit,
}

/// Parses one stdin line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();
    if let Some(extra) = words.next() {
        return Err(format!("unexpected '{extra}'"));
    }

    let switch = |name: &str| -> Result<bool, String> {
        match arg.map(str::to_ascii_lowercase).as_deref() {
            Some("on") => Ok(true),
            Some("off") => Ok(false),
            Some(other) => Err(format!("{name}: expected on|off, got '{other}'")),
            None => Err(format!("{name}: expected on|off")),
        }
    };
    let bare = |cmd: Command| -> Result<Option<Command>, String> {
        match arg {
            Some(a) => Err(format!("unexpected '{a}'")),
            None => Ok(Some(cmd)),
        }
    };

    match verb.to_ascii_lowercase().as_str() {
        "protect" => Ok(Some(Command::Protect(switch("protect")?))),
        "display" => Ok(Some(Command::Display(switch("display")?))),
        "status" => bare(Command::Status),
        "show" => bare(Command::Show),
        "clear" => bare(Command::Clear),
        "help" | "?" => bare(Command::Help),
        "quit" | "exit" => bare(Command::Quit),
        other => Err(format!("unknown command '{other}' (try 'help')")),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_args_uses_default_optional_config() {
        assert_eq!(
            parse_args(args(&[])),
            Ok(Invocation::Run {
                config: PathBuf::from(DEFAULT_CONFIG_FILE),
                explicit: false,
            })
        );
    }

    #[test]
    fn config_flag_in_both_forms() {
        let expected = Ok(Invocation::Run {
            config: PathBuf::from("/etc/keyguard.toml"),
            explicit: true,
        });
        assert_eq!(parse_args(args(&["--config", "/etc/keyguard.toml"])), expected);
        assert_eq!(parse_args(args(&["--config=/etc/keyguard.toml"])), expected);
        assert_eq!(parse_args(args(&["-c", "/etc/keyguard.toml"])), expected);
    }

    #[test]
    fn config_flag_without_path_is_error() {
        assert!(parse_args(args(&["--config"])).is_err());
    }

    #[test]
    fn help_and_version_short_circuit() {
        assert_eq!(parse_args(args(&["--help", "--bogus"])), Ok(Invocation::Help));
        assert_eq!(parse_args(args(&["-V"])), Ok(Invocation::Version));
    }

    #[test]
    fn unknown_arg_is_error() {
        assert!(parse_args(args(&["--swallow"])).is_err());
    }

    #[test]
    fn switch_commands_parse() {
        assert_eq!(parse_command("protect on"), Ok(Some(Command::Protect(true))));
        assert_eq!(parse_command("  DISPLAY  Off "), Ok(Some(Command::Display(false))));
    }

    #[test]
    fn bare_commands_parse() {
        assert_eq!(parse_command("status"), Ok(Some(Command::Status)));
        assert_eq!(parse_command("show"), Ok(Some(Command::Show)));
        assert_eq!(parse_command("clear"), Ok(Some(Command::Clear)));
        assert_eq!(parse_command("?"), Ok(Some(Command::Help)));
        assert_eq!(parse_command("exit"), Ok(Some(Command::Quit)));
    }

    #[test]
    fn blank_line_is_nothing() {
        assert_eq!(parse_command("   "), Ok(None));
    }

    #[test]
    fn malformed_commands_are_errors() {
        assert!(parse_command("protect").is_err());
        assert!(parse_command("protect maybe").is_err());
        assert!(parse_command("status now").is_err());
        assert!(parse_command("display on please").is_err());
        assert!(parse_command("hook").is_err());
    }
}
