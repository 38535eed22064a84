//! Background refresh of cached device state
//!
//! A dedicated thread re-reads all fields with a bulk `status` request at a
//! configurable interval. With an interval of zero the thread sleeps until
//! it is reconfigured or stopped.

use crate::error::{Cp750Error, Result};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Anything that can re-synchronize its cached state on demand
pub trait RefreshTarget: Send + Sync {
    fn refresh(&self) -> Result<()>;
}

enum Control {
    Interval(Duration),
    Stop,
}

/// Handle to the refresh thread
pub struct RefreshScheduler {
    control: Sender<Control>,
    interval_ms: Arc<AtomicU64>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
    /// Start the refresh thread; a zero `interval` starts it idle
    pub fn spawn(target: Arc<dyn RefreshTarget>, interval: Duration) -> Result<Self> {
        let (control, receiver) = channel::unbounded();
        let interval_ms = Arc::new(AtomicU64::new(as_millis(interval)));

        let published = interval_ms.clone();
        let handle = thread::Builder::new()
            .name("cp750-refresh".to_string())
            .spawn(move || {
                run(target, receiver, interval);
                published.store(0, Ordering::Release);
            })
            .map_err(Cp750Error::Spawn)?;

        Ok(Self {
            control,
            interval_ms,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Current interval, zero when disabled or once the thread has exited
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::Acquire))
    }

    /// Change the refresh interval; zero disables refreshing.
    ///
    /// The next refresh is due one full interval after this call.
    pub fn set_interval(&self, interval: Duration) {
        self.interval_ms.store(as_millis(interval), Ordering::Release);
        if self.control.send(Control::Interval(interval)).is_err() {
            debug!("Refresh thread already stopped");
            self.interval_ms.store(0, Ordering::Release);
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the thread and wait for it to exit.
    ///
    /// A refresh already in progress finishes (or fails) first. Called from
    /// the refresh thread itself (a listener closing the session), the
    /// thread is told to stop but not joined.
    pub fn stop(&self) {
        let _ = self.control.send(Control::Stop);
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            warn!("Refresh thread panicked");
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn as_millis(interval: Duration) -> u64 {
    u64::try_from(interval.as_millis()).unwrap_or(u64::MAX)
}

fn next_trigger(interval: Duration) -> Option<Instant> {
    if interval.is_zero() {
        None
    } else {
        Instant::now().checked_add(interval)
    }
}

fn run(target: Arc<dyn RefreshTarget>, control: Receiver<Control>, mut interval: Duration) {
    debug!("Refresh thread started");
    let mut next = next_trigger(interval);

    loop {
        let message = match next {
            Some(deadline) => control.recv_deadline(deadline),
            None => control.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match message {
            Ok(Control::Interval(new_interval)) => {
                debug!("Refresh interval set to {}ms", new_interval.as_millis());
                interval = new_interval;
                next = next_trigger(interval);
            }
            Ok(Control::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                match target.refresh() {
                    Ok(()) => debug!("Automatic refresh complete"),
                    Err(Cp750Error::StreamClosed) => {
                        info!("Connection closed, stopping automatic refresh");
                        break;
                    }
                    Err(e) => warn!("Automatic refresh failed: {}", e),
                }
                next = next_trigger(interval);
            }
        }
    }
    debug!("Refresh thread stopped");
}
