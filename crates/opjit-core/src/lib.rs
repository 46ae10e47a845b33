//! opjit Core - shared types for the runtime compiler
//!
//! This crate provides the vocabulary every other opjit crate speaks:
//! - The error taxonomy and host status codes
//! - Thread modes for invokables
//! - The binary contract with compiled code (entry points, invokable header)
//! - The symbol resolution seam
//! - The shared verbose-diagnostics switch

pub mod abi;
pub mod diagnostics;
pub mod error;
pub mod resolver;
pub mod status;
pub mod thread;

pub use abi::{
    AbiType, DestroyFn, EntryPointFn, FactoryFn, HostContext, InvokableHeader, ReleaseFn, SlotFn,
    SymbolSignature, MAX_INPUT_SLOTS, MAX_OUTPUT_SLOTS,
};
pub use diagnostics::{DiagnosticsFlag, VERBOSE_TOKEN};
pub use error::{ErrorKind, OpjitError, Result};
pub use resolver::{ResolvedSymbol, SymbolResolver};
pub use status::{Status, COMPILE_FAILED, NOTOK, OK};
pub use thread::ThreadMode;
