//! Binary contract between the host side and JIT-compiled code.
//!
//! # Entry points
//!
//! `extern "C" fn(context: *mut c_void) -> i32`, called once after the
//! module is linked.
//!
//! # Invokables
//!
//! Every invokable instance starts with an [`InvokableHeader`]: four function
//! pointers laid out in `repr(C)` order. Object fields follow the header.
//! Factories have the shape `extern "C" fn() -> *mut InvokableHeader`.
//!
//! ```text
//! offset 0              init
//! offset 1 * ptr        poll
//! offset 2 * ptr        release
//! offset 3 * ptr        destroy
//! offset 4 * ptr ...    fields, 8 bytes each
//! ```

use std::ffi::c_void;
use std::fmt;

/// Maximum number of output slots an invokable can write.
pub const MAX_OUTPUT_SLOTS: usize = 40;

/// Maximum number of input slots passed to an invokable.
pub const MAX_INPUT_SLOTS: usize = 1024;

/// Number of pointer-sized words in an [`InvokableHeader`].
pub const HEADER_WORDS: usize = 4;

/// Size in bytes of each field slot following the header.
pub const FIELD_SLOT_BYTES: usize = 8;

/// Opaque handle to the host, passed through to compiled code untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct HostContext(*mut c_void);

impl HostContext {
    pub fn new(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    /// A context for hosts that have nothing to pass.
    pub fn null() -> Self {
        Self(std::ptr::null_mut())
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0
    }
}

// SAFETY: the core never dereferences the context; it is handed to compiled
// code on the thread the host calls from.
unsafe impl Send for HostContext {}
unsafe impl Sync for HostContext {}

/// `init` and `poll` capability: `(this, context, outputs, inputs) -> status`.
pub type SlotFn =
    unsafe extern "C" fn(*mut InvokableHeader, *mut c_void, *mut f64, *const f64) -> i32;

/// `release` capability: `(this, context) -> status`.
pub type ReleaseFn = unsafe extern "C" fn(*mut InvokableHeader, *mut c_void) -> i32;

/// Frees the instance. Called exactly once, after `release` or on drop.
pub type DestroyFn = unsafe extern "C" fn(*mut InvokableHeader);

/// Module entry point.
pub type EntryPointFn = unsafe extern "C" fn(*mut c_void) -> i32;

/// Invokable factory.
pub type FactoryFn = unsafe extern "C" fn() -> *mut InvokableHeader;

/// Function table at the start of every invokable instance.
#[repr(C)]
pub struct InvokableHeader {
    pub init: SlotFn,
    pub poll: SlotFn,
    pub release: ReleaseFn,
    pub destroy: DestroyFn,
}

/// Value types that can cross the ABI boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbiType {
    I32,
    I64,
    F64,
    Pointer,
}

impl fmt::Display for AbiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbiType::I32 => write!(f, "i32"),
            AbiType::I64 => write!(f, "i64"),
            AbiType::F64 => write!(f, "f64"),
            AbiType::Pointer => write!(f, "ptr"),
        }
    }
}

/// Signature recorded for a compiled symbol, when the producer knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolSignature {
    pub params: Vec<AbiType>,
    pub returns: Vec<AbiType>,
}

impl SymbolSignature {
    pub fn new(params: Vec<AbiType>, returns: Vec<AbiType>) -> Self {
        Self { params, returns }
    }

    /// `(context) -> int`
    pub fn entry_point() -> Self {
        Self::new(vec![AbiType::Pointer], vec![AbiType::I32])
    }

    /// `() -> invokable*`
    pub fn factory() -> Self {
        Self::new(Vec::new(), vec![AbiType::Pointer])
    }
}

impl fmt::Display for SymbolSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
        let returns: Vec<String> = self.returns.iter().map(ToString::to_string).collect();
        write!(f, "({}) -> ({})", params.join(", "), returns.join(", "))
    }
}
