use std::ffi::c_void;
use std::hint::black_box;
use std::ptr::NonNull;

extern "C" fn remember(arg: *mut c_void) -> ! {
    let caller = NonNull::new(arg as *mut fiber::Context).unwrap();
    let y = black_box(7);
    unsafe { fiber::switch(caller) };
    println!("{y}");
    assert_eq!(y, 7);
    std::process::exit(0);
}

fn main() {
    let mut record = Box::new(fiber::Context::new());
    let mut stack = vec![0u8; 1 << 16];
    let context = NonNull::from(&mut *record);

    let caller = fiber::current().as_ptr() as *mut c_void;
    unsafe {
        fiber::init(context, remember, caller, stack.as_mut_ptr(), stack.len());
        fiber::switch(context);
        fiber::switch(context);
    }

    unreachable!("fiber exits the process");
}
