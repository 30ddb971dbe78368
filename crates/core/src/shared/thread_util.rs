use std::sync::{Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Join `handle`, giving up after `timeout`.
///
/// Returns `None` when the thread is still running at the deadline (it is
/// left detached) or when it panicked.
pub fn join_with_timeout<T>(handle: JoinHandle<T>, timeout: Duration) -> Option<T> {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            log::warn!("Worker thread did not stop within {timeout:?}; detaching");
            return None;
        }
        std::thread::sleep(JOIN_POLL_INTERVAL);
    }
    match handle.join() {
        Ok(value) => Some(value),
        Err(_) => {
            log::error!("Worker thread panicked");
            None
        }
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
