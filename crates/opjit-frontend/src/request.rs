//! The inputs of one compile call.

use std::path::PathBuf;

use opjit_core::{DiagnosticsFlag, VERBOSE_TOKEN};

/// Splits a host option string on spaces. Runs of spaces collapse and
/// there is no quoting.
pub fn tokenize_options(options: &str) -> Vec<String> {
    options
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Entry point, source text, options and libraries for one compile call.
///
/// Immutable once built.
#[derive(Debug, Clone)]
pub struct CompileRequest {
    entry_point: String,
    source_text: String,
    option_tokens: Vec<String>,
    link_libraries: Vec<PathBuf>,
}

impl CompileRequest {
    /// Builds a request and resets `verbose` from the options.
    ///
    /// The flag is switched off, then on again if the options contain `-v`;
    /// it keeps that value until the next request is built.
    pub fn new(
        entry_point: impl Into<String>,
        source_text: impl Into<String>,
        options: &str,
        libraries: &str,
        verbose: &DiagnosticsFlag,
    ) -> Self {
        let option_tokens = tokenize_options(options);
        verbose.reset_from_tokens(&option_tokens);
        Self {
            entry_point: entry_point.into(),
            source_text: source_text.into(),
            option_tokens,
            link_libraries: tokenize_options(libraries)
                .into_iter()
                .map(PathBuf::from)
                .collect(),
        }
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    pub fn option_tokens(&self) -> &[String] {
        &self.option_tokens
    }

    pub fn link_libraries(&self) -> &[PathBuf] {
        &self.link_libraries
    }

    pub fn is_verbose(&self) -> bool {
        self.option_tokens.iter().any(|t| t == VERBOSE_TOKEN)
    }
}
