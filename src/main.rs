//! keyguard -- global keyboard interceptor daemon.
//!
//! Entry point, daemon lifecycle, and signal handling.

use std::io::{self, BufRead};
use std::process::ExitCode;
use std::sync::mpsc::{self, Sender};
use std::thread;

use keyguard::cli::{self, Invocation, USAGE};
use keyguard::config::Config;
use keyguard::daemon::{Daemon, DaemonError, DaemonEvent};
use keyguard::interceptor::Interceptor;
use keyguard::platform;

/// Name of the single-instance lock.
const INSTANCE_NAME: &str = "keyguard-interceptor";

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let invocation = match cli::parse_args(std::env::args().skip(1)) {
        Ok(inv) => inv,
        Err(msg) => {
            eprintln!("keyguard: {msg}\n\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    match invocation {
        Invocation::Help => {
            println!("{USAGE}");
            ExitCode::SUCCESS
        }
        Invocation::Version => {
            println!("keyguard v{}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        Invocation::Run { config, explicit } => {
            let result = Config::load(&config, !explicit)
                .map_err(DaemonError::from)
                .and_then(|cfg| run(&cfg));
            match result {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    log::error!("{e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn run(config: &Config) -> Result<(), DaemonError> {
    let Some(_instance) = platform::acquire_single_instance(INSTANCE_NAME)? else {
        return Err(DaemonError::AlreadyRunning);
    };

    let interceptor = Interceptor::new(
        platform::create_hook_backend()?,
        platform::create_keyboard_layout()?,
        config.interceptor.options(),
    );
    let mut daemon = Daemon::new(config, interceptor);

    let (tx, rx) = mpsc::channel();

    let signal_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = signal_tx.send(DaemonEvent::Shutdown);
    })?;

    spawn_stdin_reader(tx.clone());
    daemon.start(tx)?;
    daemon.run(&rx)
}

/// Forwards parsed stdin commands to the main loop until EOF.
fn spawn_stdin_reader(tx: Sender<DaemonEvent>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match cli::parse_command(&line) {
                Ok(Some(cmd)) => {
                    if tx.send(DaemonEvent::Command(cmd)).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(msg) => eprintln!("keyguard: {msg}"),
            }
        }
        log::debug!("daemon: stdin closed");
    });
}
