//! Source compiler: source text in, in-memory module out.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;

use opjit_config::TempConfig;
use opjit_core::{DiagnosticsFlag, OpjitError, Result};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::diagnostics::Diagnostic;
use crate::driver::Driver;
use crate::invocation::{CompilerInstance, CompilerInvocation, EmitModuleAction};
use crate::module::{CompiledModule, TargetInfo};
use crate::request::CompileRequest;

/// A failed compile: the error plus every diagnostic collected on the way.
#[derive(Debug)]
pub struct CompileFailure {
    pub error: OpjitError,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileFailure {
    fn new(error: OpjitError) -> Self {
        Self {
            error,
            diagnostics: Vec::new(),
        }
    }
}

impl fmt::Display for CompileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        for diagnostic in &self.diagnostics {
            write!(f, "\n{diagnostic}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<OpjitError> for CompileFailure {
    fn from(error: OpjitError) -> Self {
        Self::new(error)
    }
}

impl From<CompileFailure> for OpjitError {
    fn from(failure: CompileFailure) -> Self {
        failure.error
    }
}

/// Runs the driver and frontend over request source text.
#[derive(Debug, Clone)]
pub struct SourceCompiler {
    temp: TempConfig,
    target: TargetInfo,
    verbose: DiagnosticsFlag,
}

impl SourceCompiler {
    pub fn new(temp: TempConfig, verbose: DiagnosticsFlag) -> Result<Self> {
        Ok(Self {
            temp,
            target: TargetInfo::host()?,
            verbose,
        })
    }

    pub fn with_target(temp: TempConfig, target: TargetInfo, verbose: DiagnosticsFlag) -> Self {
        Self {
            temp,
            target,
            verbose,
        }
    }

    pub fn target(&self) -> &TargetInfo {
        &self.target
    }

    /// Compiles the request's source text to a module.
    ///
    /// Writes the text to a fresh temporary unit, plans exactly one
    /// frontend compile job for it and runs that job in memory.
    pub fn compile(
        &self,
        request: &CompileRequest,
    ) -> std::result::Result<CompiledModule, CompileFailure> {
        let (path, guard) = self.write_unit(request.source_text())?;
        let result = self.compile_unit(request, &path);
        if let Some(file) = guard {
            // Dropping the handle removes the unit.
            drop(file);
            debug!(event = "unit_removed", path = %path.display());
        }
        result
    }

    fn compile_unit(
        &self,
        request: &CompileRequest,
        path: &std::path::Path,
    ) -> std::result::Result<CompiledModule, CompileFailure> {
        let mut args: Vec<String> = request.option_tokens().to_vec();
        args.push(path.display().to_string());
        args.push("-fsyntax-only".to_string());

        let compilation = Driver::new()
            .build_compilation(&args)
            .map_err(OpjitError::from)?;
        if self.verbose.enabled() {
            info!(event = "jobs", "\n{}", compilation.print());
        }
        let job = compilation
            .single_compile_job()
            .map_err(OpjitError::from)?;

        let invocation = CompilerInvocation::from_args(&job.arguments)?;
        let mut instance = CompilerInstance::new(invocation);
        instance.create_diagnostics(self.verbose.clone());
        if !instance.has_diagnostics() {
            return Err(OpjitError::Compile("no diagnostics engine".to_string()).into());
        }
        if self.verbose.enabled() {
            info!(event = "target", triple = %self.target.triple);
        }

        let mut action = EmitModuleAction::new(self.target.clone());
        if let Err(error) = instance.execute(&mut action) {
            return Err(CompileFailure {
                error,
                diagnostics: instance.take_diagnostics(),
            });
        }

        match action.take_module() {
            Some(module) => {
                debug!(
                    event = "compile_end",
                    entry = request.entry_point(),
                    functions = module.functions.len()
                );
                Ok(module)
            }
            None => Err(CompileFailure {
                error: OpjitError::Compile("no module produced".to_string()),
                diagnostics: instance.take_diagnostics(),
            }),
        }
    }

    /// Writes `text` to a uniquely named unit in the configured directory.
    ///
    /// Returns the path and, unless units are kept, the handle whose drop
    /// deletes the file.
    fn write_unit(&self, text: &str) -> Result<(PathBuf, Option<NamedTempFile>)> {
        let dir = self.temp.resolve_dir();
        let io_error =
            |e: std::io::Error| OpjitError::Compile(format!("cannot write source unit: {e}"));

        let mut file = tempfile::Builder::new()
            .prefix(&self.temp.prefix)
            .suffix(&self.temp.suffix)
            .tempfile_in(&dir)
            .map_err(io_error)?;
        file.write_all(text.as_bytes()).map_err(io_error)?;
        file.flush().map_err(io_error)?;
        debug!(event = "unit_written", path = %file.path().display());

        if self.temp.keep_files {
            let (_, path) = file.keep().map_err(|e| io_error(e.error))?;
            Ok((path, None))
        } else {
            let path = file.path().to_path_buf();
            Ok((path, Some(file)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opjit_core::ErrorKind;

    fn compiler(dir: &std::path::Path, keep: bool) -> SourceCompiler {
        let temp = TempConfig {
            dir: Some(dir.to_path_buf()),
            keep_files: keep,
            ..TempConfig::default()
        };
        SourceCompiler::new(temp, DiagnosticsFlag::new()).unwrap()
    }

    fn request(source: &str, options: &str) -> CompileRequest {
        CompileRequest::new("entry", source, options, "", &DiagnosticsFlag::new())
    }

    fn unit_count(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_compiles_entry_point() {
        let dir = tempfile::tempdir().unwrap();
        let module = compiler(dir.path(), true)
            .compile(&request("int entry(Context* c) { return 42; }", "-O2"))
            .unwrap();
        assert!(module.declaration("entry").is_some());
        let name = module.source_path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("opjit_") && name.ends_with(".c"));
        assert_eq!(unit_count(dir.path()), 1);
    }

    #[test]
    fn test_units_removed_when_not_kept() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = compiler(dir.path(), false);
        compiler
            .compile(&request("int entry(Context* c) { return 1; }", ""))
            .unwrap();
        let _ = compiler.compile(&request("int entry(Context* c) { return }", ""));
        assert_eq!(unit_count(dir.path()), 0);
    }

    #[test]
    fn test_syntax_error_carries_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let failure = compiler(dir.path(), true)
            .compile(&request("int entry(Context* c) { return 1 }", ""))
            .unwrap_err();
        assert_eq!(failure.error.kind(), ErrorKind::Compile);
        assert_eq!(failure.diagnostics.len(), 1);
        assert!(failure.diagnostics[0]
            .to_string()
            .contains("error: expected ';' after return statement"));
    }

    #[test]
    fn test_preprocess_option_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let failure = compiler(dir.path(), true)
            .compile(&request("int entry(Context* c) { return 1; }", "-E"))
            .unwrap_err();
        assert_eq!(
            failure.error.to_string(),
            "Compile error: frontend invocation did not resolve to a single compile job"
        );
    }

    #[test]
    fn test_unknown_option_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let failure = compiler(dir.path(), true)
            .compile(&request("int entry(Context* c) { return 1; }", "--frobnicate"))
            .unwrap_err();
        assert_eq!(failure.error.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_no_functions_means_no_module() {
        let dir = tempfile::tempdir().unwrap();
        let failure = compiler(dir.path(), true)
            .compile(&request("struct Nothing;", ""))
            .unwrap_err();
        assert_eq!(failure.error.to_string(), "Compile error: no module produced");
    }
}
