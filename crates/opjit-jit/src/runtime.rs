//! Runtime helpers compiled code calls into.
//!
//! `new Name` in compiled code allocates through [`opjit_alloc`] and the
//! generated `destroy` frees through [`opjit_free`]. Both are registered with
//! the process symbol generator under their C names.

use std::alloc::{self, Layout};
use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};

use opjit_frontend::codegen::{ALLOC_SYMBOL, FREE_SYMBOL};

/// Alignment of every object handed out by [`opjit_alloc`].
const OBJECT_ALIGN: usize = 16;

static LIVE_OBJECTS: AtomicUsize = AtomicUsize::new(0);

fn layout_for(size: i64) -> Option<Layout> {
    let size = usize::try_from(size).ok().filter(|&s| s > 0)?;
    Layout::from_size_align(size, OBJECT_ALIGN).ok()
}

/// Allocates `size` zeroed bytes. Returns null for a non-positive size or
/// when the allocator fails.
pub extern "C" fn opjit_alloc(size: i64) -> *mut c_void {
    let Some(layout) = layout_for(size) else {
        return std::ptr::null_mut();
    };
    // SAFETY: `layout` has a non-zero size.
    let ptr = unsafe { alloc::alloc_zeroed(layout) };
    if !ptr.is_null() {
        LIVE_OBJECTS.fetch_add(1, Ordering::AcqRel);
    }
    ptr.cast()
}

/// Frees an object from [`opjit_alloc`]. `size` must be the allocation size.
///
/// # Safety
///
/// `ptr` must come from `opjit_alloc(size)` and not have been freed.
pub unsafe extern "C" fn opjit_free(ptr: *mut c_void, size: i64) {
    if ptr.is_null() {
        return;
    }
    if let Some(layout) = layout_for(size) {
        alloc::dealloc(ptr.cast(), layout);
        LIVE_OBJECTS.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Objects allocated by compiled code and not yet freed, process-wide.
pub fn live_objects() -> usize {
    LIVE_OBJECTS.load(Ordering::Acquire)
}

/// Name and address of every runtime helper.
pub fn helper_symbols() -> [(&'static str, usize); 2] {
    [
        (ALLOC_SYMBOL, opjit_alloc as *const () as usize),
        (FREE_SYMBOL, opjit_free as *const () as usize),
    ]
}
