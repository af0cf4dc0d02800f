//! Unix signal handling.
//!
//! A signal-hook iterator thread turns signals into `SignalMessage`s on an
//! mpsc channel. The control loop sleeps on that channel with `recv_timeout`,
//! so a shutdown request cuts the sleep short instead of waiting out the
//! interval.
//!
//! - SIGINT, SIGTERM, SIGHUP: graceful shutdown
//! - SIGUSR1: log a status report

use anyhow::{Context, Result};
use signal_hook::{
    consts::signal::{SIGHUP, SIGINT, SIGTERM, SIGUSR1},
    iterator::Signals,
};
use std::{
    sync::Arc,
    sync::atomic::{AtomicBool, Ordering},
    sync::mpsc::{Receiver, Sender, channel},
    thread,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalMessage {
    Shutdown,
    Status,
}

pub struct SignalState {
    pub running: Arc<AtomicBool>,
    pub signal_receiver: Receiver<SignalMessage>,
    pub signal_sender: Sender<SignalMessage>,
}

impl SignalState {
    /// Channel and flag without any OS signal registration.
    pub fn new() -> Self {
        let (signal_sender, signal_receiver) = channel();
        Self {
            running: Arc::new(AtomicBool::new(true)),
            signal_receiver,
            signal_sender,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the loop after the current tick and wake it if sleeping.
    pub fn request_shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.signal_sender.send(SignalMessage::Shutdown);
    }
}

impl Default for SignalState {
    fn default() -> Self {
        Self::new()
    }
}

/// Register signal handlers and start the forwarding thread.
pub fn setup_signal_handler(debug_enabled: bool) -> Result<SignalState> {
    let state = SignalState::new();

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP, SIGUSR1])
        .context("failed to register signal handlers")?;

    let running_clone = state.running.clone();
    let signal_sender_clone = state.signal_sender.clone();

    thread::spawn(move || {
        #[cfg(debug_assertions)]
        eprintln!(
            "DEBUG: Signal handler thread starting for PID: {}",
            std::process::id()
        );

        for sig in signals.forever() {
            if sig == SIGUSR1 {
                if debug_enabled {
                    log_pipe!();
                    log_debug!("Received SIGUSR1, reporting status");
                }
                if signal_sender_clone.send(SignalMessage::Status).is_err() {
                    break;
                }
                continue;
            }

            let user_message = match sig {
                SIGINT => {
                    if debug_enabled {
                        "Received SIGINT (Ctrl+C), initiating graceful shutdown..."
                    } else {
                        "Received interrupt signal, initiating graceful shutdown..."
                    }
                }
                SIGTERM => "Received termination request, initiating graceful shutdown...",
                SIGHUP => "Terminal disconnected, initiating graceful shutdown...",
                _ => "Received shutdown signal, initiating graceful shutdown...",
            };

            log_pipe!();
            log_info!("{}", user_message);

            running_clone.store(false, Ordering::SeqCst);

            if let Err(e) = signal_sender_clone.send(SignalMessage::Shutdown) {
                log_warning!("Failed to send shutdown message: {e}");
                log_indented!("Main loop appears to have already exited");
            }

            break;
        }
    });

    Ok(state)
}
