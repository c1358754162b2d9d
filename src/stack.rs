//! Guarded stacks for exercising fibers in tests.

use std::num::NonZeroUsize;
use std::{ffi, io, ptr};

#[derive(Debug)]
pub(crate) struct Stack {
    pointer: *mut u8,
    length: usize,
    guard_length: usize,
}

impl Stack {
    /// Allocates a stack protected from overflow by guard pages at its lowest addresses.
    /// Demand paging ensures that physical memory is allocated only as necessary, during a page fault.
    pub(crate) fn new(guard_pages: NonZeroUsize, usable_pages: NonZeroUsize) -> io::Result<Self> {
        let (guard_pages, usable_pages) = (guard_pages.get(), usable_pages.get());

        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize };
        let length = (guard_pages + usable_pages) * page_size;

        // kernel allocates an unused block of virtual memory
        let pointer = unsafe {
            libc::mmap(
                ptr::null_mut(),
                length,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if pointer == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        // if guarding memory goes wrong then mmap gets cleaned up in Stack's drop
        let stack = Stack {
            pointer: pointer as *mut u8,
            length,
            guard_length: guard_pages * page_size,
        };

        let result = unsafe { libc::mprotect(pointer, stack.guard_length, libc::PROT_NONE) };
        if result == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(stack)
    }

    /// Lowest usable address, just above the guard pages.
    pub(crate) fn bottom(&self) -> *mut u8 {
        // safety: part of same allocation
        unsafe { self.pointer.add(self.guard_length) }
    }

    /// Number of usable bytes above the guard pages.
    pub(crate) fn len(&self) -> usize {
        self.length - self.guard_length
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        let result = unsafe { libc::munmap(self.pointer as *mut ffi::c_void, self.length) };
        assert_eq!(result, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_and_writes() {
        let stack = Stack::new(NonZeroUsize::MIN, NonZeroUsize::MIN).unwrap();
        unsafe {
            let pointer = stack.bottom().add(stack.len() - 1);
            pointer.write(123);
            assert_eq!(pointer.read(), 123);
        }
    }

    #[test]
    fn usable_region_excludes_guard() {
        let stack = Stack::new(NonZeroUsize::MIN, NonZeroUsize::new(4).unwrap()).unwrap();
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize };

        assert_eq!(stack.len(), 4 * page_size);
        assert_eq!(stack.bottom() as usize - stack.pointer as usize, page_size);
    }

    #[test]
    #[ignore = "aborts process"]
    fn overflow() {
        let stack = Stack::new(NonZeroUsize::MIN, NonZeroUsize::MIN).unwrap();
        unsafe {
            let pointer = stack.bottom().sub(1);
            pointer.write(123);
        }
    }
}
