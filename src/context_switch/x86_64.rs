//! x86_64, honoring both the System V and the Microsoft x64 calling conventions.
//!
//! The switch routine is declared `sysv64` on every OS so its arguments always arrive in `rdi` and `rsi`.
//! Registers only the Microsoft ABI treats as callee-saved (`xmm6` to `xmm15`) are preserved regardless,
//! and the argument is placed in both `rdi` and `rcx` so an `extern "C"` entry function finds it either way.

use std::arch::naked_asm;
use std::ffi::c_void;
use std::mem::{align_of, offset_of, size_of};

use crate::Entry;

/// MXCSR power-on state: all exceptions masked, round to nearest.
const DEFAULT_MXCSR: u32 = 0x1F80;

/// x87 control word power-on state: all exceptions masked, 64-bit precision, round to nearest.
const DEFAULT_FPU_CONTROL: u16 = 0x037F;

/// Saved machine state of a suspended fiber.
#[repr(C, align(16))]
#[derive(Debug)]
pub struct Context {
    arg: *mut c_void,
    rip: u64,
    rsp: u64,
    rbp: u64,
    rbx: u64,
    r12: u64,
    r13: u64,
    r14: u64,
    r15: u64,
    /// Only the control bits matter, the status bits are caller-saved.
    mxcsr: u32,
    fpu_control: u16,
    _padding: u16,
    xmm6_to_xmm15: [u128; 10],
}

// switch_context addresses fields by these offsets
const _: () = {
    assert!(offset_of!(Context, arg) == 0);
    assert!(offset_of!(Context, rip) == 8);
    assert!(offset_of!(Context, rsp) == 16);
    assert!(offset_of!(Context, rbp) == 24);
    assert!(offset_of!(Context, rbx) == 32);
    assert!(offset_of!(Context, r12) == 40);
    assert!(offset_of!(Context, r13) == 48);
    assert!(offset_of!(Context, r14) == 56);
    assert!(offset_of!(Context, r15) == 64);
    assert!(offset_of!(Context, mxcsr) == 72);
    assert!(offset_of!(Context, fpu_control) == 76);
    assert!(offset_of!(Context, xmm6_to_xmm15) == 80);
    assert!(size_of::<Context>() == 240);
    assert!(align_of::<Context>() == 16);
};

impl Context {
    pub(crate) const fn zeroed() -> Self {
        Context {
            arg: std::ptr::null_mut(),
            rip: 0,
            rsp: 0,
            rbp: 0,
            rbx: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
            mxcsr: 0,
            fpu_control: 0,
            _padding: 0,
            xmm6_to_xmm15: [0; 10],
        }
    }

    /// Builds a context that calls `entry(arg)` on the stack growing down from `top`.
    ///
    /// Writes a null return address just below the aligned top, so `rsp + 8` is 16 byte aligned on entry
    /// exactly as if `entry` had been called, and frame walkers stop there.
    ///
    /// # Safety
    /// The 16 bytes below `top` must be writable.
    pub(super) unsafe fn at_entry(entry: Entry, arg: *mut c_void, top: *mut u8) -> Self {
        let aligned_top = top as usize & !(super::STACK_ALIGNMENT - 1);
        let return_address = (aligned_top - size_of::<u64>()) as *mut u64;
        return_address.write(0);

        Context {
            arg,
            rip: entry as usize as u64,
            rsp: return_address as u64,
            mxcsr: DEFAULT_MXCSR,
            fpu_control: DEFAULT_FPU_CONTROL,
            ..Context::zeroed()
        }
    }

    #[cfg(test)]
    pub(super) fn stack_pointer(&self) -> usize {
        self.rsp as usize
    }

    #[cfg(test)]
    pub(super) fn resume_address(&self) -> usize {
        self.rip as usize
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
pub(super) unsafe extern "sysv64" fn switch_context(slot: *mut *mut Context, to: *mut Context) {
    naked_asm!(
        "mov rax, [rdi]",
        // resume as if returning from this call
        "pop rcx",
        "mov [rax + 8], rcx",
        "mov [rax + 16], rsp",
        "mov [rax + 24], rbp",
        "mov [rax + 32], rbx",
        "mov [rax + 40], r12",
        "mov [rax + 48], r13",
        "mov [rax + 56], r14",
        "mov [rax + 64], r15",
        "stmxcsr dword ptr [rax + 72]",
        "fnstcw word ptr [rax + 76]",
        "movups [rax + 80], xmm6",
        "movups [rax + 96], xmm7",
        "movups [rax + 112], xmm8",
        "movups [rax + 128], xmm9",
        "movups [rax + 144], xmm10",
        "movups [rax + 160], xmm11",
        "movups [rax + 176], xmm12",
        "movups [rax + 192], xmm13",
        "movups [rax + 208], xmm14",
        "movups [rax + 224], xmm15",
        // current = to
        "mov [rdi], rsi",
        "movups xmm6, [rsi + 80]",
        "movups xmm7, [rsi + 96]",
        "movups xmm8, [rsi + 112]",
        "movups xmm9, [rsi + 128]",
        "movups xmm10, [rsi + 144]",
        "movups xmm11, [rsi + 160]",
        "movups xmm12, [rsi + 176]",
        "movups xmm13, [rsi + 192]",
        "movups xmm14, [rsi + 208]",
        "movups xmm15, [rsi + 224]",
        "ldmxcsr dword ptr [rsi + 72]",
        "fldcw word ptr [rsi + 76]",
        "mov r15, [rsi + 64]",
        "mov r14, [rsi + 56]",
        "mov r13, [rsi + 48]",
        "mov r12, [rsi + 40]",
        "mov rbx, [rsi + 32]",
        "mov rbp, [rsi + 24]",
        "mov rsp, [rsi + 16]",
        // first argument under System V and Microsoft x64 respectively
        "mov rdi, [rsi]",
        "mov rcx, rdi",
        "jmp qword ptr [rsi + 8]",
    )
}
