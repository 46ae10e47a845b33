//! A symbol resolver over a fixed table.

use std::cell::Cell;
use std::collections::HashMap;

use opjit_core::{OpjitError, ResolvedSymbol, Result, SymbolResolver, SymbolSignature};

use crate::fake;

/// Resolves names registered up front and counts every lookup.
#[derive(Debug, Default)]
pub struct FakeResolver {
    symbols: HashMap<String, ResolvedSymbol>,
    lookups: Cell<usize>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_symbol(
        mut self,
        name: &str,
        address: usize,
        signature: Option<SymbolSignature>,
    ) -> Self {
        let mut symbol = ResolvedSymbol::new(name, address);
        symbol.signature = signature;
        self.symbols.insert(name.to_string(), symbol);
        self
    }

    /// Registers the factories from [`fake`].
    pub fn with_fake_invokables(self) -> Self {
        let factory = Some(SymbolSignature::factory());
        self.with_symbol(
            fake::FAKE_FACTORY,
            fake::fake_factory as *const () as usize,
            factory.clone(),
        )
        .with_symbol(
            fake::NULL_FACTORY,
            fake::null_factory as *const () as usize,
            factory.clone(),
        )
        .with_symbol(
            fake::FAILING_INIT_FACTORY,
            fake::failing_init_factory as *const () as usize,
            factory,
        )
    }

    /// Number of `resolve` calls so far.
    pub fn lookups(&self) -> usize {
        self.lookups.get()
    }
}

impl SymbolResolver for FakeResolver {
    fn resolve(&self, name: &str) -> Result<ResolvedSymbol> {
        self.lookups.set(self.lookups.get() + 1);
        self.symbols
            .get(name)
            .cloned()
            .ok_or_else(|| OpjitError::symbol_not_found(name))
    }
}
