use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ffi::c_void;
use std::ptr::NonNull;

const MEMORY_SIZE: usize = 1 << 16;

static mut COUNTER: u32 = 0;

extern "C" fn increment(arg: *mut c_void) -> ! {
    let caller = NonNull::new(arg as *mut fiber::Context).unwrap();
    unsafe {
        COUNTER += 1;
        println!("here!");
        fiber::switch(caller);
    }
    unreachable!()
}

fn main() {
    // context and stack share one allocation
    let layout = Layout::from_size_align(MEMORY_SIZE, fiber::align()).unwrap();
    let memory = unsafe { alloc_zeroed(layout) };
    let context = NonNull::new(memory as *mut fiber::Context).unwrap();
    let stack = unsafe { memory.add(fiber::size()) };

    let caller = fiber::current().as_ptr() as *mut c_void;
    unsafe { fiber::init(context, increment, caller, stack, MEMORY_SIZE - fiber::size()) };

    if unsafe { COUNTER } == 0 {
        unsafe { fiber::switch(context) };
    }

    assert_eq!(unsafe { COUNTER }, 1);
    unsafe { dealloc(memory, layout) };
}
