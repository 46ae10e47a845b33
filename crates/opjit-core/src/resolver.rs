//! Symbol resolution seam between the JIT environment and its consumers.

use crate::abi::SymbolSignature;
use crate::error::Result;

/// A symbol looked up in the JIT environment.
///
/// The address stays valid while the environment that produced it is alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSymbol {
    pub name: String,
    pub address: usize,
    pub signature: Option<SymbolSignature>,
}

impl ResolvedSymbol {
    pub fn new(name: impl Into<String>, address: usize) -> Self {
        Self {
            name: name.into(),
            address,
            signature: None,
        }
    }

    pub fn with_signature(mut self, signature: SymbolSignature) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Raw code pointer.
    pub fn as_ptr(&self) -> *const u8 {
        self.address as *const u8
    }
}

/// Something that can turn a symbol name into a code address.
///
/// Implemented by the JIT environment, by the host-facing runtime that owns
/// it, and by test fakes.
pub trait SymbolResolver {
    /// Resolves `name`, generating native code for its module on first use.
    fn resolve(&self, name: &str) -> Result<ResolvedSymbol>;
}

impl<R: SymbolResolver + ?Sized> SymbolResolver for &R {
    fn resolve(&self, name: &str) -> Result<ResolvedSymbol> {
        (**self).resolve(name)
    }
}
