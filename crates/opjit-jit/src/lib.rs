//! opjit JIT - native code for compiled modules
//!
//! This crate provides the execution side of the runtime compiler:
//! - The JIT environment (one session, one dylib, lazy materialization)
//! - Process symbol lookup and library loading
//! - Runtime helpers called by compiled invokables
//! - The entry-point invoker
//! - The invokable lifecycle manager

pub mod entry;
pub mod environment;
pub mod invokable;
pub mod runtime;
pub mod symbols;

pub use entry::invoke_entry_point;
pub use environment::{Dylib, JitEnvironment, Mangler};
pub use invokable::{HandleState, InvocationHandle, InvokableInstance};
pub use runtime::live_objects;
pub use symbols::ProcessSymbols;
