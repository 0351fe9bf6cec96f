use crate::sync::{Condvar, Mutex};

/// A blocking signal built on a mutex-protected flag and a condition
/// variable.
///
/// A manual-reset event stays set once [`Event::set`] has been called and
/// releases every current and future waiter. An auto-reset event releases a
/// single waiter and clears itself, which makes it suitable as a wake-up
/// doorbell for one consumer thread: a `set` issued while nobody waits is
/// remembered until the next `wait`.
#[derive(Debug)]
pub(crate) struct Event {
    signaled: Mutex<bool>,
    cond: Condvar,
    manual_reset: bool,
}

impl Event {
    pub(crate) fn manual_reset() -> Self {
        Self::new(true)
    }

    pub(crate) fn auto_reset() -> Self {
        Self::new(false)
    }

    fn new(manual_reset: bool) -> Self {
        Self {
            signaled: Mutex::new(false),
            cond: Condvar::new(),
            manual_reset,
        }
    }

    pub(crate) fn set(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        if self.manual_reset {
            self.cond.notify_all();
        } else {
            self.cond.notify_one();
        }
    }

    pub(crate) fn wait(&self) {
        let mut signaled = self.signaled.lock();
        while !*signaled {
            signaled = self.cond.wait(signaled);
        }
        if !self.manual_reset {
            *signaled = false;
        }
    }

    #[cfg(test)]
    pub(crate) fn is_set(&self) -> bool {
        *self.signaled.lock()
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use std::{sync::Arc, thread, time::Duration};

    #[test]
    fn manual_reset_releases_every_waiter() {
        let event = Arc::new(Event::manual_reset());
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let event = event.clone();
                thread::spawn(move || event.wait())
            })
            .collect();
        thread::sleep(Duration::from_millis(10));
        event.set();
        for waiter in waiters {
            waiter.join().unwrap();
        }
        assert!(event.is_set());
        // Still set: late waiters return immediately.
        event.wait();
    }

    #[test]
    fn auto_reset_remembers_a_set_without_waiters() {
        let event = Event::auto_reset();
        event.set();
        event.wait();
        assert!(!event.is_set());
    }
}
