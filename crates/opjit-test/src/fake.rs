//! Instrumented invokables written in Rust.
//!
//! The fake behaves like the counter from
//! [`COUNTER_INVOKABLE`](crate::sources::COUNTER_INVOKABLE): init writes 1.0
//! to slot 0 and every poll adds 1.0. Every call bumps a counter of the
//! calling thread, so parallel tests never see each other's calls.
//! Call [`reset`] at the start of a test.

use std::cell::Cell;
use std::ffi::c_void;

use opjit_core::{InvokableHeader, Status, NOTOK, OK};

pub const FAKE_FACTORY: &str = "fake_counter_factory";
pub const NULL_FACTORY: &str = "fake_null_factory";
pub const FAILING_INIT_FACTORY: &str = "fake_failing_init_factory";

/// Calls observed on the current thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub factory: usize,
    pub created: usize,
    pub init: usize,
    pub poll: usize,
    pub release: usize,
    pub destroy: usize,
}

impl Counters {
    /// Instances created and not yet destroyed.
    pub fn live(&self) -> usize {
        self.created - self.destroy
    }
}

thread_local! {
    static COUNTERS: Cell<Counters> = Cell::new(Counters::default());
}

fn bump(update: impl FnOnce(&mut Counters)) {
    COUNTERS.with(|cell| {
        let mut counters = cell.get();
        update(&mut counters);
        cell.set(counters);
    });
}

pub fn reset() {
    COUNTERS.with(|cell| cell.set(Counters::default()));
}

pub fn counters() -> Counters {
    COUNTERS.with(Cell::get)
}

#[repr(C)]
struct FakeCounter {
    header: InvokableHeader,
    value: f64,
}

unsafe fn counter<'a>(this: *mut InvokableHeader) -> &'a mut FakeCounter {
    &mut *this.cast::<FakeCounter>()
}

unsafe extern "C" fn counter_init(
    this: *mut InvokableHeader,
    _context: *mut c_void,
    outputs: *mut f64,
    _inputs: *const f64,
) -> Status {
    bump(|c| c.init += 1);
    let this = counter(this);
    this.value = 1.0;
    *outputs = this.value;
    OK
}

unsafe extern "C" fn failing_init(
    _this: *mut InvokableHeader,
    _context: *mut c_void,
    _outputs: *mut f64,
    _inputs: *const f64,
) -> Status {
    bump(|c| c.init += 1);
    NOTOK
}

unsafe extern "C" fn counter_poll(
    this: *mut InvokableHeader,
    _context: *mut c_void,
    outputs: *mut f64,
    _inputs: *const f64,
) -> Status {
    bump(|c| c.poll += 1);
    let this = counter(this);
    this.value += 1.0;
    *outputs = this.value;
    OK
}

unsafe extern "C" fn counter_release(_this: *mut InvokableHeader, _context: *mut c_void) -> Status {
    bump(|c| c.release += 1);
    OK
}

unsafe extern "C" fn counter_destroy(this: *mut InvokableHeader) {
    bump(|c| c.destroy += 1);
    drop(Box::from_raw(this.cast::<FakeCounter>()));
}

fn allocate(init: opjit_core::SlotFn) -> *mut InvokableHeader {
    bump(|c| c.created += 1);
    let instance = Box::new(FakeCounter {
        header: InvokableHeader {
            init,
            poll: counter_poll,
            release: counter_release,
            destroy: counter_destroy,
        },
        value: 0.0,
    });
    Box::into_raw(instance).cast()
}

pub unsafe extern "C" fn fake_factory() -> *mut InvokableHeader {
    bump(|c| c.factory += 1);
    allocate(counter_init)
}

/// A factory whose instances fail `init` with [`NOTOK`].
pub unsafe extern "C" fn failing_init_factory() -> *mut InvokableHeader {
    bump(|c| c.factory += 1);
    allocate(failing_init)
}

/// A factory that produces nothing.
pub unsafe extern "C" fn null_factory() -> *mut InvokableHeader {
    bump(|c| c.factory += 1);
    std::ptr::null_mut()
}
