#[cfg(feature = "loom")]
mod imp {
    pub(crate) use loom::{
        sync::atomic::{AtomicBool, AtomicUsize, Ordering, fence},
        thread::JoinHandle,
    };
    pub(crate) use std::sync::Arc;
    use std::io;

    pub(crate) type MutexGuard<'a, T> = loom::sync::MutexGuard<'a, T>;

    #[derive(Debug)]
    pub(crate) struct Mutex<T>(loom::sync::Mutex<T>);

    impl<T> Mutex<T> {
        pub(crate) fn new(val: T) -> Self {
            Self(loom::sync::Mutex::new(val))
        }

        pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
            self.0.lock().unwrap()
        }
    }

    #[derive(Debug)]
    pub(crate) struct Condvar(loom::sync::Condvar);

    impl Condvar {
        pub(crate) fn new() -> Self {
            Self(loom::sync::Condvar::new())
        }

        pub(crate) fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
            self.0.wait(guard).unwrap()
        }

        pub(crate) fn notify_one(&self) {
            self.0.notify_one();
        }

        pub(crate) fn notify_all(&self) {
            self.0.notify_all();
        }
    }

    /// Thread names are not modelled by loom.
    pub(crate) fn spawn(
        _name: String,
        f: impl FnOnce() + Send + 'static,
    ) -> io::Result<JoinHandle<()>> {
        Ok(loom::thread::spawn(f))
    }

    /// Affinity is meaningless inside a loom model.
    pub(crate) fn pin_current_thread(_core: usize) -> bool {
        true
    }

    pub(crate) fn core_ids() -> Vec<usize> {
        vec![0]
    }
}

#[cfg(not(feature = "loom"))]
mod imp {
    pub(crate) use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering, fence};
    pub(crate) use parking_lot::{Mutex, MutexGuard};
    pub(crate) use std::{sync::Arc, thread::JoinHandle};
    use std::{io, thread};

    /// `parking_lot::Condvar` with the by-value `wait` signature of loom/std.
    #[derive(Debug)]
    pub(crate) struct Condvar(parking_lot::Condvar);

    impl Condvar {
        pub(crate) fn new() -> Self {
            Self(parking_lot::Condvar::new())
        }

        pub(crate) fn wait<'a, T>(&self, mut guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
            self.0.wait(&mut guard);
            guard
        }

        pub(crate) fn notify_one(&self) {
            self.0.notify_one();
        }

        pub(crate) fn notify_all(&self) {
            self.0.notify_all();
        }
    }

    pub(crate) fn spawn(
        name: String,
        f: impl FnOnce() + Send + 'static,
    ) -> io::Result<JoinHandle<()>> {
        thread::Builder::new().name(name).spawn(f)
    }

    /// Best-effort: returns `false` if `core` is not a CPU id the process
    /// may run on or the platform refused the request.
    pub(crate) fn pin_current_thread(core: usize) -> bool {
        core_affinity::get_core_ids()
            .and_then(|ids| ids.into_iter().find(|id| id.id == core))
            .is_some_and(core_affinity::set_for_current)
    }

    /// Ids of the CPUs in the process affinity mask.
    /// These are OS CPU numbers, not positions: under `taskset -c 4-7` this
    /// is `[4, 5, 6, 7]`.
    pub(crate) fn core_ids() -> Vec<usize> {
        core_affinity::get_core_ids()
            .map(|ids| ids.into_iter().map(|id| id.id).collect())
            .unwrap_or_default()
    }
}

pub(crate) use imp::*;
