//! Cooperative context switching between caller-owned stacks.
//!
//! A fiber is an execution context that shares its OS thread with other fibers and only gives up the CPU by
//! calling [switch]. This crate is the primitive underneath green threads, generators, and actor schedulers:
//! it saves and restores machine state, nothing more. There is no scheduler, no stack allocator, and no runtime
//! checking on the hot path. All memory is owned by the caller.
//!
//! # Examples
//!
//! ```
//! use std::ffi::c_void;
//! use std::ptr::NonNull;
//!
//! struct Shared {
//!     caller: NonNull<fiber::Context>,
//!     counter: u32,
//! }
//!
//! extern "C" fn count(arg: *mut c_void) -> ! {
//!     let shared = arg as *mut Shared;
//!     loop {
//!         unsafe {
//!             (*shared).counter += 1;
//!             fiber::switch((*shared).caller);
//!         }
//!     }
//! }
//!
//! let mut record = Box::new(fiber::Context::new());
//! let mut stack = vec![0u8; 64 * 1024];
//! let mut shared = Shared { caller: fiber::current(), counter: 0 };
//!
//! let context = NonNull::from(&mut *record);
//! let arg = &mut shared as *mut Shared as *mut c_void;
//! unsafe {
//!     fiber::init(context, count, arg, stack.as_mut_ptr(), stack.len());
//!     fiber::switch(context);
//!     fiber::switch(context);
//! }
//!
//! assert_eq!(shared.counter, 2);
//! ```

#![cfg_attr(feature = "fast_thread_local", feature(thread_local))]

use std::alloc::Layout;
use std::ffi::c_void;
use std::ptr::NonNull;

mod context_switch;
#[cfg(all(test, unix))]
mod stack;
mod tls;

pub use context_switch::Context;

/// Function a fiber starts executing on its first switch.
///
/// It must never return, instead it ends by switching to another fiber or exiting the process.
/// A panic that escapes it aborts the process.
pub type Entry = extern "C" fn(arg: *mut c_void) -> !;

/// Smallest stack [init] accepts, enough for the first frame of an entry function.
pub const MIN_STACK_SIZE: usize = 2048;

/// Bytes left untouched at the top of every stack before the first frame.
pub const STACK_HEADROOM: usize = 64;

/// Size in bytes of a [Context] on this target.
pub const fn size() -> usize {
    std::mem::size_of::<Context>()
}

/// Alignment in bytes a [Context] requires on this target.
#[doc(alias = "alignment")]
pub const fn align() -> usize {
    std::mem::align_of::<Context>()
}

/// Memory layout of a [Context], for allocating one with [std::alloc].
pub const fn layout() -> Layout {
    Layout::new::<Context>()
}

impl Context {
    /// Zeroed storage for a context.
    ///
    /// Switching to it is undefined behavior until it's been passed to [init].
    pub const fn new() -> Self {
        Context::zeroed()
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

/// Prepares `context` so the first [switch] into it calls `entry(arg)` on the given stack.
///
/// The initial stack pointer is the highest properly aligned address at least [STACK_HEADROOM] bytes below
/// the top of the stack. Previous contents of `context` are overwritten.
///
/// # Safety
/// - `context` must point to writable memory of at least [size] bytes aligned to [align].
/// - `stack` must point to `stack_len` writable bytes, and `stack_len` must be at least [MIN_STACK_SIZE].
/// - Both must outlive every switch into `context`, and `context` must not be running.
pub unsafe fn init(context: NonNull<Context>, entry: Entry, arg: *mut c_void, stack: *mut u8, stack_len: usize) {
    log::trace!("initializing context at {:p} with {stack_len} byte stack at {stack:p}", context.as_ptr());
    context_switch::prepare(context, entry, arg, stack, stack_len);
}

/// [init], after checking whatever can be checked about its arguments.
///
/// # Safety
/// `context` and `stack` must still be valid memory that outlives every switch into `context`.
pub unsafe fn try_init(
    context: NonNull<Context>,
    entry: Entry,
    arg: *mut c_void,
    stack: *mut u8,
    stack_len: usize,
) -> Result<(), Error> {
    if stack.is_null() {
        return Err(Error::NullStack);
    }

    if stack_len < MIN_STACK_SIZE {
        return Err(Error::StackTooSmall {
            length: stack_len,
            minimum: MIN_STACK_SIZE,
        });
    }

    let stack_start = stack as usize;
    let stack_end = stack_start.checked_add(stack_len).ok_or(Error::StackOutOfBounds)?;

    let address = context.as_ptr() as usize;
    if address % align() != 0 {
        return Err(Error::MisalignedContext {
            address,
            alignment: align(),
        });
    }

    if address < stack_end && stack_start < address + size() {
        return Err(Error::ContextOverlapsStack);
    }

    init(context, entry, arg, stack, stack_len);
    Ok(())
}

/// Context of the fiber running on the calling thread.
///
/// Before any fiber was switched to, this is the thread's root context, representing its original stack.
/// The root context is saved into by the first switch away from it, so it can be switched back to later.
pub fn current() -> NonNull<Context> {
    context_switch::running()
}

/// Suspends the running fiber and resumes `to`.
///
/// Returns once a later switch targets the context that was running when this was called.
/// The first switch into a freshly initialized context calls its entry function instead.
///
/// # Safety
/// - `to` must have been passed to [init] and its memory must still be valid.
/// - `to` must not be [current], and must belong to this thread.
pub unsafe fn switch(to: NonNull<Context>) {
    context_switch::jump(to);
}

/// Rejected arguments to [try_init].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("stack pointer is null")]
    NullStack,
    #[error("stack of {length} bytes is smaller than the {minimum} byte minimum")]
    StackTooSmall { length: usize, minimum: usize },
    #[error("stack extends past the end of the address space")]
    StackOutOfBounds,
    #[error("context at {address:#x} isn't aligned to {alignment} bytes")]
    MisalignedContext { address: usize, alignment: usize },
    #[error("context overlaps its own stack")]
    ContextOverlapsStack,
}
