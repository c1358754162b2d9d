//! AArch64, honoring AAPCS64 as well as the Apple and Windows ARM64 variants of it.
//!
//! All three agree on the callee-saved set: `x19` to `x28`, the frame pointer, and the low 64 bits of `v8` to `v15`.
//! `x18` is reserved by Apple and Windows, so it is never touched.

use std::arch::naked_asm;
use std::ffi::c_void;
use std::mem::{align_of, offset_of, size_of};

use crate::Entry;

/// Saved machine state of a suspended fiber.
#[repr(C)]
#[derive(Debug)]
pub struct Context {
    arg: *mut c_void,
    pc: u64,
    sp: u64,
    fp: u64,
    x19_to_x28: [u64; 10],
    d8_to_d15: [u64; 8],
}

// switch_context addresses fields by these offsets
const _: () = {
    assert!(offset_of!(Context, arg) == 0);
    assert!(offset_of!(Context, pc) == 8);
    assert!(offset_of!(Context, sp) == 16);
    assert!(offset_of!(Context, fp) == 24);
    assert!(offset_of!(Context, x19_to_x28) == 32);
    assert!(offset_of!(Context, d8_to_d15) == 112);
    assert!(size_of::<Context>() == 176);
    assert!(align_of::<Context>() == 8);
};

impl Context {
    pub(crate) const fn zeroed() -> Self {
        Context {
            arg: std::ptr::null_mut(),
            pc: 0,
            sp: 0,
            fp: 0,
            x19_to_x28: [0; 10],
            d8_to_d15: [0; 8],
        }
    }

    /// Builds a context that calls `entry(arg)` on the stack growing down from `top`.
    pub(super) fn at_entry(entry: Entry, arg: *mut c_void, top: *mut u8) -> Self {
        // sp must be 16 byte aligned at all times, not just at calls
        let aligned_top = top as usize & !(super::STACK_ALIGNMENT - 1);

        Context {
            arg,
            pc: entry as usize as u64,
            sp: aligned_top as u64,
            ..Context::zeroed()
        }
    }

    #[cfg(test)]
    pub(super) fn stack_pointer(&self) -> usize {
        self.sp as usize
    }

    #[cfg(test)]
    pub(super) fn resume_address(&self) -> usize {
        self.pc as usize
    }

    #[cfg(test)]
    pub(super) fn argument(&self) -> *mut c_void {
        self.arg
    }
}

/// Suspends the running fiber into `*slot`, publishes `to` through `slot`, then resumes `to`.
///
/// Returns once some later switch targets the context that was in `*slot`.
///
/// # Safety
/// `*slot` and `to` must be distinct, valid contexts and `to` must be initialized.
#[unsafe(naked)]
pub(super) unsafe extern "C" fn switch_context(slot: *mut *mut Context, to: *mut Context) {
    naked_asm!(
        "ldr x8, [x0]",
        // resume as if returning from this call
        "str x30, [x8, #8]",
        "mov x9, sp",
        "str x9, [x8, #16]",
        "str x29, [x8, #24]",
        "stp x19, x20, [x8, #32]",
        "stp x21, x22, [x8, #48]",
        "stp x23, x24, [x8, #64]",
        "stp x25, x26, [x8, #80]",
        "stp x27, x28, [x8, #96]",
        "stp d8, d9, [x8, #112]",
        "stp d10, d11, [x8, #128]",
        "stp d12, d13, [x8, #144]",
        "stp d14, d15, [x8, #160]",
        // current = to
        "str x1, [x0]",
        "ldp d14, d15, [x1, #160]",
        "ldp d12, d13, [x1, #144]",
        "ldp d10, d11, [x1, #128]",
        "ldp d8, d9, [x1, #112]",
        "ldp x27, x28, [x1, #96]",
        "ldp x25, x26, [x1, #80]",
        "ldp x23, x24, [x1, #64]",
        "ldp x21, x22, [x1, #48]",
        "ldp x19, x20, [x1, #32]",
        "ldr x29, [x1, #24]",
        "ldr x9, [x1, #16]",
        "mov sp, x9",
        "ldr x9, [x1, #8]",
        "ldr x0, [x1]",
        // entry frames record a null return address
        "mov x30, xzr",
        // ret rather than br: resume addresses aren't BTI landing pads
        "ret x9",
    )
}
