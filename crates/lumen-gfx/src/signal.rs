use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Manual-reset event used to announce device removal.
///
/// One signal lives for the whole process and serves each device in turn:
/// the removal callback of the current device sets it, the recovery loop
/// resets it before rebuilding so the same signal can serve the replacement
/// device. Clones share the same underlying event.
#[derive(Clone)]
pub struct RemovalSignal {
    inner: Arc<Inner>,
}

struct Inner {
    set: Mutex<bool>,
    cond: Condvar,
}

impl RemovalSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                set: Mutex::new(false),
                cond: Condvar::new(),
            }),
        }
    }

    /// Signal the event. Stays set until [`reset`](Self::reset) is called.
    pub fn set(&self) {
        let mut set = self.inner.set.lock().unwrap();
        *set = true;
        self.inner.cond.notify_all();
    }

    /// Re-arm the event for the next device.
    pub fn reset(&self) {
        *self.inner.set.lock().unwrap() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.inner.set.lock().unwrap()
    }

    /// Block the calling thread until the event is set.
    pub fn wait(&self) {
        let mut set = self.inner.set.lock().unwrap();
        while !*set {
            set = self.inner.cond.wait(set).unwrap();
        }
    }

    /// Block until the event is set or the timeout elapses. Returns whether
    /// the event was set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut set = self.inner.set.lock().unwrap();
        let deadline = std::time::Instant::now() + timeout;
        while !*set {
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, res) = self.inner.cond.wait_timeout(set, deadline - now).unwrap();
            set = guard;
            if res.timed_out() && !*set {
                return false;
            }
        }
        true
    }
}

impl Default for RemovalSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_set_wakes_waiter() {
        let signal = RemovalSignal::new();
        let waiter = signal.clone();
        let handle = std::thread::spawn(move || {
            waiter.wait();
            true
        });
        std::thread::sleep(Duration::from_millis(20));
        signal.set();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_manual_reset_semantics() {
        let signal = RemovalSignal::new();
        assert!(!signal.is_set());
        signal.set();
        // Stays set until explicitly reset; a wait on a set signal returns
        // immediately.
        assert!(signal.is_set());
        signal.wait();
        assert!(signal.is_set());
        signal.reset();
        assert!(!signal.is_set());
    }

    #[test]
    fn test_reusable_after_reset() {
        let signal = RemovalSignal::new();
        signal.set();
        signal.reset();
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
        signal.set();
        assert!(signal.wait_timeout(Duration::from_millis(10)));
    }
}
