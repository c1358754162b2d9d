use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::mpsc;
use std::thread;

/// A fiber that immediately switches back to the context that created it.
pub struct FiberPingPong {
    context: Box<fiber::Context>,
    creator: Box<NonNull<fiber::Context>>,
    stack: Vec<u8>,
}

impl FiberPingPong {
    pub fn new() -> Self {
        let mut ping_pong = FiberPingPong {
            context: Box::new(fiber::Context::new()),
            creator: Box::new(fiber::current()),
            stack: vec![0; 16 * 1024],
        };

        let context = NonNull::from(&mut *ping_pong.context);
        let arg = &mut *ping_pong.creator as *mut NonNull<fiber::Context> as *mut c_void;
        unsafe { fiber::init(context, bounce, arg, ping_pong.stack.as_mut_ptr(), ping_pong.stack.len()) };

        ping_pong
    }

    /// Switches into the fiber and back out again.
    pub fn round_trip(&mut self) {
        let context = NonNull::from(&mut *self.context);
        unsafe { fiber::switch(context) };
    }
}

impl Default for FiberPingPong {
    fn default() -> Self {
        FiberPingPong::new()
    }
}

extern "C" fn bounce(arg: *mut c_void) -> ! {
    let creator = arg as *const NonNull<fiber::Context>;
    loop {
        unsafe { fiber::switch(*creator) };
    }
}

/// The same exchange between two OS threads, for comparison.
pub struct ThreadPingPong {
    ping: mpsc::SyncSender<()>,
    pong: mpsc::Receiver<()>,
}

impl ThreadPingPong {
    pub fn new() -> Self {
        let (ping, pinged) = mpsc::sync_channel(0);
        let (ponged, pong) = mpsc::sync_channel(0);

        thread::spawn(move || {
            while pinged.recv().is_ok() {
                if ponged.send(()).is_err() {
                    break;
                }
            }
        });

        ThreadPingPong { ping, pong }
    }

    pub fn round_trip(&mut self) {
        self.ping.send(()).unwrap();
        self.pong.recv().unwrap();
    }
}

impl Default for ThreadPingPong {
    fn default() -> Self {
        ThreadPingPong::new()
    }
}
