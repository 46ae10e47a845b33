//! Source compiler for opjit.
//!
//! Turns source text received at runtime into an in-memory [`CompiledModule`]
//! of Cranelift IR. The pipeline mirrors a classic compiler driver:
//!
//! 1. the source is written to a temporary unit,
//! 2. the [`Driver`] plans jobs for the option tokens and that unit,
//! 3. the single `cc1` job is parsed into a [`CompilerInvocation`],
//! 4. a [`CompilerInstance`] runs [`EmitModuleAction`] over the unit.
//!
//! The accepted language is a small C dialect with `invokable` blocks.

pub mod ast;
pub mod codegen;
pub mod diagnostics;
pub mod driver;
pub mod invocation;
pub mod lexer;
pub mod module;
pub mod parser;
pub mod request;
pub mod source;

pub use diagnostics::{Diagnostic, DiagnosticsEngine, Severity};
pub use driver::{Compilation, Driver, DriverError, Job, JobKind, FRONTEND_TOOL};
pub use invocation::{CompilerInstance, CompilerInvocation, EmitModuleAction, FrontendAction};
pub use module::{
    host_isa, host_isa_with, CompiledModule, DeclLinkage, FunctionBody, FunctionDecl, TargetInfo,
    DECL_NAMESPACE,
};
pub use request::{tokenize_options, CompileRequest};
pub use source::{CompileFailure, SourceCompiler};
