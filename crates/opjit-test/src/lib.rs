//! Shared test fixtures for opjit crates.
//!
//! This crate provides fakes and fixtures that need no JIT:
//!
//! - [`fake`] - instrumented invokables with per-thread call counters
//! - [`resolver`] - a [`SymbolResolver`](opjit_core::SymbolResolver) over a fixed table
//! - [`sources`] - source texts used across the test suites
//! - [`compile_module`] - the frontend pipeline with throwaway temp files
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! opjit-test = { workspace = true }
//! ```

pub mod fake;
pub mod resolver;
pub mod sources;

use opjit_config::TempConfig;
use opjit_core::DiagnosticsFlag;
use opjit_frontend::{CompileFailure, CompileRequest, CompiledModule, SourceCompiler};

pub use resolver::FakeResolver;

/// Temp settings that write units to `dir` and delete them afterwards.
pub fn scratch_temp(dir: &std::path::Path) -> TempConfig {
    TempConfig {
        dir: Some(dir.to_path_buf()),
        keep_files: false,
        ..TempConfig::default()
    }
}

/// Compiles `source` for the host.
pub fn try_compile_module(source: &str) -> Result<CompiledModule, CompileFailure> {
    let dir = tempfile::tempdir().map_err(|e| {
        CompileFailure::from(opjit_core::OpjitError::Compile(format!(
            "cannot create scratch directory: {e}"
        )))
    })?;
    let verbose = DiagnosticsFlag::new();
    let compiler = SourceCompiler::new(scratch_temp(dir.path()), verbose.clone())?;
    let request = CompileRequest::new("entry", source, "", "", &verbose);
    compiler.compile(&request)
}

/// Compiles `source` for the host, panicking with the diagnostics on failure.
pub fn compile_module(source: &str) -> CompiledModule {
    match try_compile_module(source) {
        Ok(module) => module,
        Err(failure) => panic!("fixture failed to compile: {failure}"),
    }
}
