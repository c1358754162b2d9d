//! Abstraction over userspace multitasking.
//!
//! Provides an implementation for every CPU architecture.

use std::ffi::c_void;
use std::ptr::NonNull;

use crate::{tls, Entry, STACK_HEADROOM};

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("fiber only supports x86_64 and aarch64");

#[cfg(target_arch = "x86_64")]
mod x86_64;
#[cfg(target_arch = "x86_64")]
pub use x86_64::Context;
#[cfg(target_arch = "x86_64")]
use x86_64::switch_context;

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "aarch64")]
pub use aarch64::Context;
#[cfg(target_arch = "aarch64")]
use aarch64::switch_context;

/// Both supported ABIs align the stack to 16 bytes at call boundaries.
const STACK_ALIGNMENT: usize = 16;

/// Makes the first switch into `context` call `entry(arg)` on the given stack.
///
/// # Safety
/// See [crate::init].
pub(crate) unsafe fn prepare(
    context: NonNull<Context>,
    entry: Entry,
    arg: *mut c_void,
    stack: *mut u8,
    stack_len: usize,
) {
    let top = stack.add(stack_len - STACK_HEADROOM);
    context.as_ptr().write(Context::at_entry(entry, arg, top));
}

/// Context of the fiber running on this thread.
pub(crate) fn running() -> NonNull<Context> {
    let slot = tls::current_slot();
    // safety: the slot always points at a live context once bootstrapped
    unsafe { NonNull::new_unchecked(*slot) }
}

/// Executes a context switch.
///
/// Spills registers into the running context, marks `to` as running, restores registers from `to`.
///
/// # Safety
/// See [crate::switch].
#[inline]
pub(crate) unsafe fn jump(to: NonNull<Context>) {
    let slot = tls::current_slot();
    debug_assert_ne!(*slot, to.as_ptr(), "switched to the running context");
    switch_context(slot, to.as_ptr());
}
