//! Compiler driver: turns a command line into a list of jobs.
//!
//! The driver only plans. It decides which phases run for each input and
//! which arguments the `cc1` frontend receives; it never reads a file.

use std::fmt;
use std::path::PathBuf;

use opjit_core::OpjitError;
use thiserror::Error;

/// Name of the compile tool every compile job runs.
pub const FRONTEND_TOOL: &str = "cc1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("no input files")]
    NoInputFiles,

    #[error("argument to '{0}' is missing (expected 1 value)")]
    MissingArgument(String),

    #[error("frontend invocation did not resolve to a single compile job")]
    NotSingleCompileJob,
}

impl From<DriverError> for OpjitError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::NotSingleCompileJob => OpjitError::Compile(err.to_string()),
            other => OpjitError::Config(other.to_string()),
        }
    }
}

/// Pipeline phase a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Preprocess,
    Compile,
    Assemble,
    Link,
}

impl JobKind {
    pub fn tool(self) -> &'static str {
        match self {
            JobKind::Preprocess | JobKind::Compile => FRONTEND_TOOL,
            JobKind::Assemble => "as",
            JobKind::Link => "ld",
        }
    }
}

/// One planned tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub kind: JobKind,
    pub tool: &'static str,
    pub arguments: Vec<String>,
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, " \"{}\"", self.tool)?;
        for arg in &self.arguments {
            write!(f, " \"{arg}\"")?;
        }
        Ok(())
    }
}

/// The jobs planned for one command line.
#[derive(Debug, Clone, Default)]
pub struct Compilation {
    pub jobs: Vec<Job>,
}

impl Compilation {
    /// Job list in the form verbose mode prints it, one job per line.
    pub fn print(&self) -> String {
        self.jobs
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The only job, if it is a frontend compile job.
    pub fn single_compile_job(&self) -> Result<&Job, DriverError> {
        match self.jobs.as_slice() {
            [job] if job.kind == JobKind::Compile && job.tool == FRONTEND_TOOL => Ok(job),
            _ => Err(DriverError::NotSingleCompileJob),
        }
    }
}

/// Plans compilations.
#[derive(Debug, Clone, Default)]
pub struct Driver;

impl Driver {
    pub fn new() -> Self {
        Self
    }

    /// Plans the jobs for `args`.
    ///
    /// Flags the driver does not interpret are forwarded to the frontend,
    /// which decides whether it understands them.
    pub fn build_compilation<S: AsRef<str>>(&self, args: &[S]) -> Result<Compilation, DriverError> {
        let mut preprocess_only = false;
        let mut syntax_only = false;
        let mut compile_only = false;
        let mut inputs = Vec::new();
        let mut frontend_args = Vec::new();

        let mut args = args.iter().map(AsRef::as_ref);
        while let Some(arg) = args.next() {
            match arg {
                "-E" => preprocess_only = true,
                "-fsyntax-only" => syntax_only = true,
                "-c" => compile_only = true,
                "-D" => {
                    let value = args
                        .next()
                        .ok_or_else(|| DriverError::MissingArgument(arg.to_string()))?;
                    frontend_args.push(format!("-D{value}"));
                }
                flag if flag.starts_with('-') => frontend_args.push(flag.to_string()),
                input => inputs.push(PathBuf::from(input)),
            }
        }

        if inputs.is_empty() {
            return Err(DriverError::NoInputFiles);
        }

        let phases: &[JobKind] = if preprocess_only {
            &[JobKind::Preprocess]
        } else if syntax_only {
            &[JobKind::Compile]
        } else {
            &[JobKind::Compile, JobKind::Assemble]
        };

        let mut jobs = Vec::new();
        for input in &inputs {
            for &kind in phases {
                let mut arguments = Vec::new();
                match kind {
                    JobKind::Preprocess => arguments.push("-E".to_string()),
                    JobKind::Compile if syntax_only => arguments.push("-fsyntax-only".to_string()),
                    _ => {}
                }
                if kind.tool() == FRONTEND_TOOL {
                    arguments.extend(frontend_args.iter().cloned());
                }
                arguments.push(input.display().to_string());
                jobs.push(Job {
                    kind,
                    tool: kind.tool(),
                    arguments,
                });
            }
        }
        if !preprocess_only && !syntax_only && !compile_only {
            jobs.push(Job {
                kind: JobKind::Link,
                tool: JobKind::Link.tool(),
                arguments: inputs.iter().map(|p| p.display().to_string()).collect(),
            });
        }

        Ok(Compilation { jobs })
    }
}
