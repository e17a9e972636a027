// SPDX-License-Identifier: GPL-3.0-only

//! Capture thread lifecycle shared by the transports
//!
//! Both transports run their acquisition in one dedicated thread. The
//! controller owns the stop flag and the join handle so stream shutdown
//! is the same everywhere: set the flag, join, done.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Returned by the loop body to control the capture loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Continue,
    Stop,
}

/// Handle to a running capture loop
pub struct CaptureLoop {
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    name: &'static str,
}

impl CaptureLoop {
    /// Spawn a capture loop thread
    ///
    /// `init` runs once on the new thread and produces the loop state (an
    /// open stream, a scene generator). If it fails the thread exits and
    /// the error is logged; the receiver side observes a dead channel.
    /// `body` is called repeatedly with the state until it returns
    /// [`LoopAction::Stop`] or [`CaptureLoop::stop`] is called.
    pub fn spawn<S, I, F>(name: &'static str, init: I, mut body: F) -> Self
    where
        S: Send + 'static,
        I: FnOnce() -> Result<S, String> + Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        debug!(name, "Starting capture loop");
        let handle = thread::spawn(move || {
            let mut state = match init() {
                Ok(state) => state,
                Err(e) => {
                    warn!(name, error = %e, "Capture loop init failed");
                    return;
                }
            };
            while !stop_flag.load(Ordering::SeqCst) {
                if body(&mut state) == LoopAction::Stop {
                    debug!(name, "Capture loop stopped itself");
                    break;
                }
            }
            debug!(name, "Capture loop exiting");
        });

        Self {
            handle: Some(handle),
            stop,
            name,
        }
    }

    /// Signal the loop to stop and join the thread
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.join();
    }

    /// Wait for the thread without signalling, for loops that stop themselves
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(name = self.name, "Capture loop thread panicked");
            }
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[test]
    fn test_loop_stops_itself() {
        let count = Arc::new(AtomicU32::new(0));
        let count_in_loop = Arc::clone(&count);
        let mut capture = CaptureLoop::spawn(
            "test",
            || Ok(()),
            move |_| {
                if count_in_loop.fetch_add(1, Ordering::SeqCst) >= 4 {
                    LoopAction::Stop
                } else {
                    LoopAction::Continue
                }
            },
        );
        capture.join();
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_stop_signal_terminates_loop() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_in_loop = Arc::clone(&ran);
        let mut capture = CaptureLoop::spawn(
            "test",
            || Ok(()),
            move |_| {
                ran_in_loop.store(true, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(1));
                LoopAction::Continue
            },
        );
        thread::sleep(Duration::from_millis(20));
        capture.stop();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_failed_init_never_runs_body() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_in_loop = Arc::clone(&ran);
        let mut capture = CaptureLoop::spawn(
            "test",
            || Err::<(), _>("no device".to_string()),
            move |_: &mut ()| {
                ran_in_loop.store(true, Ordering::SeqCst);
                LoopAction::Stop
            },
        );
        capture.join();
        assert!(!ran.load(Ordering::SeqCst));
    }
}
