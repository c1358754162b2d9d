//! Thread local storage for the current-context tracker.
//! Easy switch to fast thread local.

use std::cell::{Cell, UnsafeCell};
use std::ptr;

use crate::Context;

/// Cache padded to avoid potential performance hit due to false sharing.
#[repr(align(128))]
struct Tracker {
    /// The thread's original execution state, only ever written by switching away from it.
    root: UnsafeCell<Context>,
    /// Null until the first use on this thread, then always the running context.
    current: Cell<*mut Context>,
}

impl Tracker {
    const fn new() -> Self {
        Tracker {
            root: UnsafeCell::new(Context::new()),
            current: Cell::new(ptr::null_mut()),
        }
    }

    /// Publishes the root context exactly once, without writing to it.
    fn slot(&self) -> *mut *mut Context {
        if self.current.get().is_null() {
            log::trace!("bootstrapping root context at {:p}", self.root.get());
            self.current.set(self.root.get());
        }

        self.current.as_ptr()
    }
}

#[cfg(not(feature = "fast_thread_local"))]
thread_local! {
    /// Each thread gets its own independent chain of fibers.
    static TRACKER: Tracker = const { Tracker::new() };
}

/// Address of this thread's current-context pointer, valid for the thread's lifetime.
#[cfg(not(feature = "fast_thread_local"))]
pub(crate) fn current_slot() -> *mut *mut Context {
    TRACKER.with(Tracker::slot)
}

#[cfg(feature = "fast_thread_local")]
#[thread_local]
static TRACKER: Tracker = Tracker::new();

/// Address of this thread's current-context pointer, valid for the thread's lifetime.
#[cfg(feature = "fast_thread_local")]
pub(crate) fn current_slot() -> *mut *mut Context {
    TRACKER.slot()
}
