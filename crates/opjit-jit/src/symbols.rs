//! Process symbol generator.
//!
//! Answers "where is `name`?" for imports of compiled code that no ingested
//! module defines: runtime helpers first, then libraries loaded with
//! [`ProcessSymbols::load`] in load order, then the running process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use libloading::Library;
use opjit_core::{OpjitError, Result};
use tracing::debug;

use crate::runtime;

/// Symbol source for everything outside the dylib.
pub struct ProcessSymbols {
    helpers: HashMap<&'static str, usize>,
    libraries: Vec<(PathBuf, Library)>,
    process: Library,
}

impl std::fmt::Debug for ProcessSymbols {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSymbols")
            .field("helpers", &self.helpers.keys().collect::<Vec<_>>())
            .field(
                "libraries",
                &self.libraries.iter().map(|(p, _)| p).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ProcessSymbols {
    /// Opens the running process and registers the runtime helpers.
    pub fn new() -> Result<Self> {
        Ok(Self {
            helpers: runtime::helper_symbols().into_iter().collect(),
            libraries: Vec::new(),
            process: open_process()?,
        })
    }

    /// Looks `name` up; `None` when nothing defines it.
    pub fn lookup(&self, name: &str) -> Option<usize> {
        if let Some(&address) = self.helpers.get(name) {
            return Some(address);
        }
        self.libraries
            .iter()
            .map(|(_, lib)| lib)
            .chain(std::iter::once(&self.process))
            .find_map(|lib| symbol_address(lib, name))
    }

    /// Loads `path` permanently with global visibility.
    ///
    /// Returns `false` when the path was already loaded.
    pub fn load(&mut self, path: &Path) -> Result<bool> {
        if self.is_loaded(path) {
            debug!(event = "library_already_loaded", path = %path.display());
            return Ok(false);
        }
        let library = open_global(path).map_err(|e| {
            OpjitError::Link(format!("cannot load library '{}': {e}", path.display()))
        })?;
        self.libraries.push((path.to_path_buf(), library));
        Ok(true)
    }

    pub fn is_loaded(&self, path: &Path) -> bool {
        self.libraries.iter().any(|(p, _)| p == path)
    }

    pub fn libraries(&self) -> impl Iterator<Item = &Path> {
        self.libraries.iter().map(|(p, _)| p.as_path())
    }
}

fn symbol_address(library: &Library, name: &str) -> Option<usize> {
    // SAFETY: the symbol is only read as an address, never called here.
    let symbol = unsafe { library.get::<*const u8>(name.as_bytes()) }.ok()?;
    let address = *symbol as usize;
    (address != 0).then_some(address)
}

#[cfg(unix)]
fn open_process() -> Result<Library> {
    Ok(libloading::os::unix::Library::this().into())
}

#[cfg(windows)]
fn open_process() -> Result<Library> {
    libloading::os::windows::Library::this()
        .map(Into::into)
        .map_err(|e| OpjitError::Link(format!("cannot open the running process: {e}")))
}

#[cfg(unix)]
fn open_global(path: &Path) -> std::result::Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_GLOBAL, RTLD_NOW};
    // SAFETY: loading runs the library's initialisers; the caller asked for it.
    unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_GLOBAL) }.map(Into::into)
}

#[cfg(windows)]
fn open_global(path: &Path) -> std::result::Result<Library, libloading::Error> {
    // SAFETY: loading runs the library's initialisers; the caller asked for it.
    unsafe { Library::new(path) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opjit_frontend::codegen::ALLOC_SYMBOL;

    #[test]
    fn test_helpers_resolve_first() {
        let symbols = ProcessSymbols::new().unwrap();
        assert_eq!(
            symbols.lookup(ALLOC_SYMBOL),
            Some(runtime::opjit_alloc as *const () as usize)
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_process_symbols_resolve() {
        let symbols = ProcessSymbols::new().unwrap();
        assert!(symbols.lookup("abs").is_some());
        assert!(symbols.lookup("opjit_surely_not_defined_anywhere").is_none());
    }

    #[test]
    fn test_missing_library_is_link_error() {
        let mut symbols = ProcessSymbols::new().unwrap();
        let err = symbols.load(Path::new("/nonexistent/libnothing.so")).unwrap_err();
        assert_eq!(err.kind(), opjit_core::ErrorKind::Link);
        assert_eq!(symbols.libraries().count(), 0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_loading_twice_is_noop() {
        let mut symbols = ProcessSymbols::new().unwrap();
        assert!(symbols.load(Path::new("libm.so.6")).unwrap());
        assert!(!symbols.load(Path::new("libm.so.6")).unwrap());
        assert_eq!(symbols.libraries().count(), 1);
        assert!(symbols.lookup("cbrt").is_some());
    }
}
