//! Frontend invocation: parsed `cc1` arguments, the compiler instance and
//! the actions it runs.

use std::path::{Path, PathBuf};

use cranelift_codegen::settings;
use opjit_config::OptLevel;
use opjit_core::{DiagnosticsFlag, OpjitError, Result};
use tracing::debug;

use crate::codegen::{lower_unit, LoweredUnit};
use crate::diagnostics::{Diagnostic, DiagnosticsEngine};
use crate::module::{CompiledModule, TargetInfo};
use crate::parser::{Parser, SyntaxErrors};

/// Frontend arguments, parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilerInvocation {
    pub inputs: Vec<PathBuf>,
    pub defines: Vec<(String, String)>,
    pub opt_level: Option<OptLevel>,
    pub syntax_only: bool,
    pub preprocess_only: bool,
    pub verbose: bool,
}

impl CompilerInvocation {
    /// Parses a compile job's argument list.
    ///
    /// Language-standard, warning, feature and include flags are accepted
    /// and ignored. Any other unknown flag is a configuration error.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        let mut invocation = Self::default();
        for arg in args.iter().map(AsRef::as_ref) {
            match arg {
                "-v" => invocation.verbose = true,
                "-fsyntax-only" => invocation.syntax_only = true,
                "-E" => invocation.preprocess_only = true,
                "-c" => {}
                "-O0" => invocation.opt_level = Some(OptLevel::None),
                "-O" | "-O1" | "-O2" | "-O3" => invocation.opt_level = Some(OptLevel::Speed),
                "-Os" => invocation.opt_level = Some(OptLevel::SpeedAndSize),
                define if define.starts_with("-D") => {
                    invocation.defines.push(parse_define(&define[2..])?);
                }
                ignored
                    if ignored.starts_with("-std=")
                        || ignored.starts_with("-W")
                        || ignored.starts_with("-f")
                        || ignored.starts_with("-I") =>
                {
                    debug!(event = "option_ignored", option = ignored);
                }
                flag if flag.starts_with('-') => {
                    return Err(OpjitError::Config(format!(
                        "unknown argument: '{flag}'"
                    )))
                }
                input => invocation.inputs.push(PathBuf::from(input)),
            }
        }
        Ok(invocation)
    }
}

/// `NAME` or `NAME=VALUE`; a bare name defines `1`.
fn parse_define(text: &str) -> Result<(String, String)> {
    let (name, value) = match text.split_once('=') {
        Some((name, value)) => (name, value),
        None => (text, "1"),
    };
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(OpjitError::Config(format!(
            "macro name must be an identifier: '-D{text}'"
        )));
    }
    Ok((name.to_string(), value.to_string()))
}

/// Something the compiler instance can run over each input.
pub trait FrontendAction {
    fn name(&self) -> &'static str;

    fn execute(&mut self, instance: &mut CompilerInstance, input: &Path) -> Result<()>;
}

/// One configured run of the frontend.
#[derive(Debug)]
pub struct CompilerInstance {
    invocation: CompilerInvocation,
    diagnostics: Option<DiagnosticsEngine>,
}

impl CompilerInstance {
    pub fn new(invocation: CompilerInvocation) -> Self {
        Self {
            invocation,
            diagnostics: None,
        }
    }

    pub fn invocation(&self) -> &CompilerInvocation {
        &self.invocation
    }

    pub fn create_diagnostics(&mut self, verbose: DiagnosticsFlag) {
        self.diagnostics = Some(DiagnosticsEngine::new(verbose));
    }

    pub fn has_diagnostics(&self) -> bool {
        self.diagnostics.is_some()
    }

    pub fn diagnostics_mut(&mut self) -> Result<&mut DiagnosticsEngine> {
        self.diagnostics
            .as_mut()
            .ok_or_else(|| OpjitError::Compile("no diagnostics engine".to_string()))
    }

    /// Collected diagnostics, leaving the engine empty.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.diagnostics
            .as_mut()
            .map(DiagnosticsEngine::take)
            .unwrap_or_default()
    }

    /// Runs `action` over every input.
    pub fn execute(&mut self, action: &mut dyn FrontendAction) -> Result<()> {
        if !self.has_diagnostics() {
            return Err(OpjitError::Compile("no diagnostics engine".to_string()));
        }
        if self.invocation.inputs.is_empty() {
            return Err(OpjitError::Compile("no input files".to_string()));
        }
        let inputs = self.invocation.inputs.clone();
        for input in &inputs {
            debug!(event = "action_begin", action = action.name(), input = %input.display());
            action.execute(self, input)?;
        }
        Ok(())
    }
}

/// Reads, parses and lowers a unit to an in-memory module.
///
/// Succeeds without a module when the unit defines no functions.
#[derive(Debug)]
pub struct EmitModuleAction {
    target: TargetInfo,
    module: Option<CompiledModule>,
}

impl EmitModuleAction {
    pub fn new(target: TargetInfo) -> Self {
        Self {
            target,
            module: None,
        }
    }

    pub fn take_module(&mut self) -> Option<CompiledModule> {
        self.module.take()
    }
}

impl FrontendAction for EmitModuleAction {
    fn name(&self) -> &'static str {
        "emit-module"
    }

    fn execute(&mut self, instance: &mut CompilerInstance, input: &Path) -> Result<()> {
        let text = std::fs::read_to_string(input).map_err(|e| {
            OpjitError::Compile(format!("cannot read '{}': {e}", input.display()))
        })?;
        let defines = instance.invocation.defines.clone();
        let opt_level = instance.invocation.opt_level;
        let diagnostics = instance.diagnostics_mut()?;
        diagnostics.set_source(input, &text);
        diagnostics.note(format!("target {}", self.target.triple));

        let unit = match Parser::parse_with_defines(&text, &defines) {
            Ok(unit) => unit,
            Err(SyntaxErrors::Lex(errors)) => {
                for error in &errors {
                    diagnostics.error_at(error.span, error.error.to_string());
                }
                return Err(errors_generated(errors.len()));
            }
            Err(SyntaxErrors::Parse(errors)) => {
                for error in &errors {
                    diagnostics.error_at(error.span, error.to_string());
                }
                return Err(errors_generated(errors.len()));
            }
        };

        let lowered = match lower_unit(&unit, &self.target) {
            Ok(Some(lowered)) => lowered,
            Ok(None) => {
                diagnostics.note("unit defines no functions");
                return Ok(());
            }
            Err(error) => {
                diagnostics.error_at(error.span, error.message);
                return Err(errors_generated(1));
            }
        };

        verify(&lowered, diagnostics)?;
        diagnostics.note(format!("{} function(s) lowered", lowered.functions.len()));

        self.module = Some(CompiledModule {
            declarations: lowered.declarations,
            functions: lowered.functions,
            target: self.target.clone(),
            source_path: input.to_path_buf(),
            opt_level,
        });
        Ok(())
    }
}

fn errors_generated(count: usize) -> OpjitError {
    let plural = if count == 1 { "" } else { "s" };
    OpjitError::Compile(format!("{count} error{plural} generated"))
}

/// Runs the IR verifier over every lowered function.
fn verify(lowered: &LoweredUnit, diagnostics: &mut DiagnosticsEngine) -> Result<()> {
    let flags = settings::Flags::new(settings::builder());
    let mut failed = 0;
    for body in &lowered.functions {
        if let Err(errors) = cranelift_codegen::verify_function(&body.func, &flags) {
            let name = &lowered.declarations[body.decl].name;
            diagnostics.report(Diagnostic::error(format!(
                "generated code for '{name}' failed verification: {errors}"
            )));
            failed += 1;
        }
    }
    if failed > 0 {
        return Err(errors_generated(failed));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opjit_core::ErrorKind;

    #[test]
    fn test_parses_recognised_flags() {
        let invocation = CompilerInvocation::from_args(&[
            "-fsyntax-only",
            "-O2",
            "-DRATE=48000",
            "-DDEBUG",
            "-std=c99",
            "-Wall",
            "-I/usr/include",
            "/tmp/unit.c",
        ])
        .unwrap();
        assert!(invocation.syntax_only);
        assert_eq!(invocation.opt_level, Some(OptLevel::Speed));
        assert_eq!(
            invocation.defines,
            vec![
                ("RATE".to_string(), "48000".to_string()),
                ("DEBUG".to_string(), "1".to_string())
            ]
        );
        assert_eq!(invocation.inputs, vec![PathBuf::from("/tmp/unit.c")]);
    }

    #[test]
    fn test_unknown_flag_is_config_error() {
        let err = CompilerInvocation::from_args(&["-mavx512", "a.c"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_bad_macro_name() {
        let err = CompilerInvocation::from_args(&["-D1X=2", "a.c"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_last_opt_level_wins() {
        let invocation = CompilerInvocation::from_args(&["-O3", "-Os", "a.c"]).unwrap();
        assert_eq!(invocation.opt_level, Some(OptLevel::SpeedAndSize));
    }

    #[test]
    fn test_execute_without_diagnostics_engine() {
        let invocation = CompilerInvocation::from_args(&["a.c"]).unwrap();
        let mut instance = CompilerInstance::new(invocation);
        let mut action = EmitModuleAction::new(TargetInfo::host().unwrap());
        let err = instance.execute(&mut action).unwrap_err();
        assert_eq!(err.to_string(), "Compile error: no diagnostics engine");
    }

    #[test]
    fn test_emit_module_collects_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unit.c");
        std::fs::write(&path, "int entry(Context* c) {\n  return missing;\n}\n").unwrap();

        let invocation = CompilerInvocation::from_args(&[path.display().to_string()]).unwrap();
        let mut instance = CompilerInstance::new(invocation);
        instance.create_diagnostics(DiagnosticsFlag::new());
        let mut action = EmitModuleAction::new(TargetInfo::host().unwrap());

        let err = instance.execute(&mut action).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Compile);
        assert!(action.take_module().is_none());

        let diagnostics = instance.take_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0]
            .to_string()
            .ends_with(":2:10: error: use of undeclared identifier 'missing'"));
    }

    #[test]
    fn test_emit_module_produces_module() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unit.c");
        std::fs::write(&path, "int entry(Context* c) { return SCALE * 2; }").unwrap();

        let args = vec!["-DSCALE=21".to_string(), "-O1".to_string(), path.display().to_string()];
        let invocation = CompilerInvocation::from_args(&args).unwrap();
        let mut instance = CompilerInstance::new(invocation);
        instance.create_diagnostics(DiagnosticsFlag::new());
        let mut action = EmitModuleAction::new(TargetInfo::host().unwrap());

        instance.execute(&mut action).unwrap();
        let module = action.take_module().expect("module");
        assert_eq!(module.exports().collect::<Vec<_>>(), vec!["entry"]);
        assert_eq!(module.opt_level, Some(OptLevel::Speed));
        assert_eq!(module.source_path(), path.as_path());
    }
}
