//! opjit - runtime C compilation for an audio host
//!
//! The host hands over source text at init time; opjit compiles it to
//! native code, links it into a process-wide JIT environment and calls it.
//! Compiled code can also define invokables: objects driven at init rate,
//! control rate and note-off through the `jit_invoke` opcode.
//!
//! # Example
//!
//! ```no_run
//! use opjit::prelude::*;
//!
//! let runtime = JitRuntime::new(JitConfig::default()).unwrap();
//! let status = runtime
//!     .compile_and_run(
//!         "entry",
//!         "int entry(Context* c) { return 42; }",
//!         "-O2",
//!         "",
//!         HostContext::null(),
//!     )
//!     .unwrap();
//! assert_eq!(status, 42);
//! runtime.shutdown();
//! ```

pub mod host;
pub mod module;
pub mod opcodes;
pub mod runtime;

pub use host::{CallRate, OpcodeRegistry, OpcodeSpec};
pub use module::{module_destroy, module_init};
pub use opcodes::{JitCompile, JitInvoke, COMPILE_OPCODE, INVOKE_OPCODE};
pub use runtime::JitRuntime;

pub use opjit_config::JitConfig;
pub use opjit_core::{
    ErrorKind, HostContext, OpjitError, Result, Status, SymbolResolver, ThreadMode,
    COMPILE_FAILED, NOTOK, OK,
};
pub use opjit_frontend::{CompileFailure, CompileRequest};
pub use opjit_jit::{invoke_entry_point, HandleState, InvocationHandle};

pub mod prelude {
    pub use super::{
        CompileRequest, HostContext, InvocationHandle, JitConfig, JitRuntime, OpjitError,
        SymbolResolver, ThreadMode,
    };
}
