//! The process-wide JIT execution environment.
//!
//! One environment owns one target description, one `JITModule` session and
//! one dylib: the table of every symbol the ingested modules define. Modules
//! are ingested as pending units and only turned into native code when one
//! of their symbols is looked up for the first time.
//!
//! # Units
//!
//! ```text
//! add_module ──► Pending ──resolve──► Materializing ──► Materialized
//!                                           │
//!                                           └─────────► Failed (permanent)
//! ```
//!
//! Materializing a unit first resolves its imports: symbols of earlier units
//! (materializing them on demand), then loaded libraries and the process.
//! Every import is checked before any code is defined, so a unit that cannot
//! link leaves the session untouched. The process symbol table is never
//! locked across code generation: the session's lookup hook locks it too.

use std::cell::RefCell;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use cranelift_codegen::control::ControlPlane;
use cranelift_codegen::ir::{Function, UserExternalName};
use cranelift_codegen::isa::{OwnedTargetIsa, TargetIsa};
use cranelift_codegen::{Context, FinalizedMachReloc};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{FuncId, Linkage, Module};
use opjit_config::{CodegenConfig, OptLevel};
use opjit_core::{
    DiagnosticsFlag, OpjitError, ResolvedSymbol, Result, SymbolResolver, SymbolSignature,
};
use opjit_frontend::{host_isa_with, CompiledModule, DeclLinkage, TargetInfo, DECL_NAMESPACE};
use tracing::{debug, info, warn};

use crate::runtime;
use crate::symbols::ProcessSymbols;

static NEXT_DYLIB: AtomicUsize = AtomicUsize::new(0);

/// Applies the target's global symbol prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mangler {
    global_prefix: Option<char>,
}

impl Mangler {
    pub fn for_triple(triple: &str) -> Self {
        let global_prefix = triple.contains("apple").then_some('_');
        Self { global_prefix }
    }

    pub fn mangle(&self, name: &str) -> String {
        match self.global_prefix {
            Some(prefix) => format!("{prefix}{name}"),
            None => name.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct SymbolEntry {
    unit: usize,
    decl: usize,
    signature: SymbolSignature,
}

/// Named symbol table of the environment. Append-only.
#[derive(Debug)]
pub struct Dylib {
    pub name: String,
    symbols: HashMap<String, SymbolEntry>,
}

impl Dylib {
    fn new(name: String) -> Self {
        Self {
            name,
            symbols: HashMap::new(),
        }
    }

    pub fn contains(&self, mangled: &str) -> bool {
        self.symbols.contains_key(mangled)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[derive(Debug)]
enum UnitState {
    Pending(Box<CompiledModule>),
    Materializing,
    /// Address of every exported declaration, by declaration index.
    Materialized(HashMap<usize, usize>),
    Failed(String),
}

#[derive(Debug)]
struct Unit {
    source: String,
    state: UnitState,
}

/// Everything resolution mutates.
struct Session {
    module: JITModule,
    /// Level the session's own ISA generates at.
    opt_level: OptLevel,
    verifier: bool,
    /// ISAs for units compiled with a different `-O` level.
    unit_isas: HashMap<OptLevel, OwnedTargetIsa>,
    mangler: Mangler,
    dylib: Dylib,
    units: Vec<Unit>,
}

/// The JIT execution environment.
pub struct JitEnvironment {
    target: TargetInfo,
    symbols: Arc<Mutex<ProcessSymbols>>,
    session: RefCell<Session>,
    verbose: DiagnosticsFlag,
}

// SAFETY: the session is only reached through `&mut self` or through
// `resolve`, and the owning runtime serializes both behind one mutex.
unsafe impl Send for JitEnvironment {}

impl std::fmt::Debug for JitEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JitEnvironment")
            .field("dylib", &self.dylib_name())
            .field("target", &self.target.triple)
            .finish()
    }
}

impl JitEnvironment {
    /// Detects the host, builds the session and names a fresh dylib.
    pub fn create(config: &CodegenConfig, verbose: DiagnosticsFlag) -> Result<Self> {
        let isa = host_isa_with(config.opt_level, config.verifier)?;
        let target = TargetInfo::from_isa(&isa);
        let symbols = Arc::new(Mutex::new(ProcessSymbols::new()?));

        let mut builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
        let lookup = Arc::clone(&symbols);
        builder.symbol_lookup_fn(Box::new(move |name| {
            let symbols = lookup.lock().ok()?;
            symbols.lookup(name).map(|address| address as *const u8)
        }));
        let module = JITModule::new(builder);

        let name = format!("<main-{}>", NEXT_DYLIB.fetch_add(1, Ordering::Relaxed));
        if verbose.enabled() {
            info!(event = "environment_created", dylib = %name, triple = %target.triple);
        }

        Ok(Self {
            session: RefCell::new(Session {
                module,
                opt_level: config.opt_level,
                verifier: config.verifier,
                unit_isas: HashMap::new(),
                mangler: Mangler::for_triple(&target.triple),
                dylib: Dylib::new(name),
                units: Vec::new(),
            }),
            target,
            symbols,
            verbose,
        })
    }

    pub fn target(&self) -> &TargetInfo {
        &self.target
    }

    pub fn dylib_name(&self) -> String {
        self.session.borrow().dylib.name.clone()
    }

    /// Number of symbols the ingested modules define.
    pub fn symbol_count(&self) -> usize {
        self.session.borrow().dylib.len()
    }

    /// Ingests `module` as a pending unit. No native code is generated.
    ///
    /// Fails without changing anything when the module defines a symbol the
    /// dylib already has.
    pub fn add_module(&mut self, module: CompiledModule) -> Result<()> {
        if module.target.triple != self.target.triple {
            return Err(OpjitError::Link(format!(
                "module was generated for '{}', environment targets '{}'",
                module.target.triple, self.target.triple
            )));
        }

        let session = self.session.get_mut();
        let exports: Vec<(usize, String)> = module
            .declarations
            .iter()
            .enumerate()
            .filter(|(_, d)| d.linkage == DeclLinkage::Export)
            .map(|(i, d)| (i, session.mangler.mangle(&d.name)))
            .collect();
        if let Some((_, name)) = exports.iter().find(|(_, n)| session.dylib.contains(n)) {
            return Err(OpjitError::Link(format!(
                "duplicate definition of symbol '{name}' in {}",
                session.dylib.name
            )));
        }

        let unit = session.units.len();
        for (decl, name) in exports {
            session.dylib.symbols.insert(
                name,
                SymbolEntry {
                    unit,
                    decl,
                    signature: module.declarations[decl].abi.clone(),
                },
            );
        }
        let source = module.source_path().display().to_string();
        debug!(event = "module_added", unit, source = %source, dylib = %session.dylib.name);
        session.units.push(Unit {
            source,
            state: UnitState::Pending(Box::new(module)),
        });
        Ok(())
    }

    /// Loads a dynamic library for later-compiled code. Idempotent per path.
    pub fn load_library(&mut self, path: &Path) -> Result<()> {
        let loaded = lock_symbols(&self.symbols)?.load(path)?;
        if loaded && self.verbose.enabled() {
            info!(event = "library_loaded", path = %path.display());
        }
        Ok(())
    }

    /// Ends the session.
    ///
    /// Code memory is released only when no object allocated by compiled code
    /// is still alive; otherwise it is leaked so those objects keep working.
    pub fn destroy(self) {
        let session = self.session.into_inner();
        let dylib = session.dylib.name;
        let live = runtime::live_objects();
        if live > 0 {
            warn!(
                event = "environment_leaked",
                dylib = %dylib,
                live_objects = live,
                "invokable instances are still alive; keeping their code"
            );
            drop(session.module);
        } else {
            // SAFETY: no instance refers to code from this session any more,
            // and resolved addresses are documented to die with it.
            unsafe { session.module.free_memory() };
        }
        if self.verbose.enabled() {
            info!(event = "environment_destroyed", dylib = %dylib);
        }
    }
}

impl SymbolResolver for JitEnvironment {
    /// Looks `name` up in the dylib, materializing its unit on first use.
    fn resolve(&self, name: &str) -> Result<ResolvedSymbol> {
        let mut session = self.session.borrow_mut();
        let mangled = session.mangler.mangle(name);
        let entry = session
            .dylib
            .symbols
            .get(&mangled)
            .cloned()
            .ok_or_else(|| OpjitError::symbol_not_found(name))?;

        session.materialize(entry.unit, &self.symbols)?;

        let address = match &session.units[entry.unit].state {
            UnitState::Materialized(addresses) => addresses.get(&entry.decl).copied(),
            _ => None,
        }
        .ok_or_else(|| OpjitError::symbol_not_found(name))?;

        debug!(event = "symbol_resolved", name, address = format_args!("{address:#x}"));
        Ok(ResolvedSymbol::new(name, address).with_signature(entry.signature))
    }
}

impl Session {
    fn materialize(&mut self, unit: usize, symbols: &Mutex<ProcessSymbols>) -> Result<()> {
        let state = std::mem::replace(&mut self.units[unit].state, UnitState::Materializing);
        let module = match state {
            UnitState::Pending(module) => module,
            UnitState::Materializing => {
                return Err(OpjitError::Link(format!(
                    "cyclic dependency while linking {}",
                    self.units[unit].source
                )))
            }
            done => {
                let result = match &done {
                    UnitState::Failed(message) => Err(OpjitError::Link(message.clone())),
                    _ => Ok(()),
                };
                self.units[unit].state = done;
                return result;
            }
        };

        match self.link_unit(unit, &module, symbols) {
            Ok(addresses) => {
                debug!(event = "unit_materialized", unit, functions = module.functions.len());
                self.units[unit].state = UnitState::Materialized(addresses);
                Ok(())
            }
            Err(err) => {
                let message = match err {
                    OpjitError::Link(message) => message,
                    other => other.to_string(),
                };
                warn!(event = "unit_failed", unit, "{message}");
                self.units[unit].state = UnitState::Failed(message.clone());
                Err(OpjitError::Link(message))
            }
        }
    }

    fn link_unit(
        &mut self,
        unit: usize,
        module: &CompiledModule,
        symbols: &Mutex<ProcessSymbols>,
    ) -> Result<HashMap<usize, usize>> {
        let source = module.source_path().display().to_string();

        for decl in module.imports().collect::<Vec<_>>() {
            let mangled = self.mangler.mangle(decl);
            if let Some(entry) = self.dylib.symbols.get(&mangled).cloned() {
                if entry.unit != unit {
                    self.materialize(entry.unit, symbols).map_err(|e| {
                        OpjitError::Link(format!("{source}: cannot link '{decl}': {e}"))
                    })?;
                }
            } else if lock_symbols(symbols)?.lookup(decl).is_none() {
                return Err(OpjitError::Link(format!(
                    "{source}: unresolved symbol '{decl}'"
                )));
            }
        }

        let link_error = |e: cranelift_module::ModuleError| OpjitError::Link(format!("{source}: {e}"));
        let mut ids: Vec<FuncId> = Vec::with_capacity(module.declarations.len());
        for decl in &module.declarations {
            let id = match decl.linkage {
                DeclLinkage::Export => {
                    self.module
                        .declare_function(&decl.name, Linkage::Export, &decl.signature)
                }
                DeclLinkage::Import => {
                    self.module
                        .declare_function(&decl.name, Linkage::Import, &decl.signature)
                }
                DeclLinkage::Local => self.module.declare_anonymous_function(&decl.signature),
            }
            .map_err(link_error)?;
            ids.push(id);
        }

        // Generate every function before defining any, so a failure cannot
        // leave half a unit defined.
        let level = module.opt_level.unwrap_or(self.opt_level);
        let mut generated = Vec::with_capacity(module.functions.len());
        for body in &module.functions {
            let mut func = body.func.clone();
            let names: Vec<_> = func
                .params
                .user_named_funcs()
                .iter()
                .map(|(name_ref, name)| (name_ref, name.clone()))
                .collect();
            for (name_ref, name) in names {
                if name.namespace == DECL_NAMESPACE {
                    let id = ids[name.index as usize];
                    func.params
                        .reset_user_func_name(name_ref, UserExternalName::new(0, id.as_u32()));
                }
            }
            let code = self.generate(level, func).map_err(|message| {
                OpjitError::Link(format!(
                    "{source}: code generation for '{}' failed: {message}",
                    module.declarations[body.decl].name
                ))
            })?;
            generated.push((ids[body.decl], code));
        }
        debug!(event = "unit_generated", unit, opt_level = level.as_setting());

        for (id, code) in &generated {
            self.module
                .define_function_bytes(*id, &code.func, code.alignment, &code.bytes, &code.relocs)
                .map_err(link_error)?;
        }
        self.module.finalize_definitions().map_err(link_error)?;

        Ok(module
            .declarations
            .iter()
            .enumerate()
            .filter(|(_, d)| d.linkage == DeclLinkage::Export)
            .map(|(i, _)| (i, self.module.get_finalized_function(ids[i]) as usize))
            .collect())
    }
}

/// Native code for one function, not yet placed in the session.
struct GeneratedCode {
    func: Function,
    alignment: u64,
    bytes: Vec<u8>,
    relocs: Vec<FinalizedMachReloc>,
}

impl Session {
    fn isa_for(&mut self, level: OptLevel) -> Result<&dyn TargetIsa> {
        if level == self.opt_level {
            return Ok(self.module.isa());
        }
        let isa = match self.unit_isas.entry(level) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(host_isa_with(level, self.verifier)?),
        };
        Ok(&**isa)
    }

    fn generate(
        &mut self,
        level: OptLevel,
        func: Function,
    ) -> std::result::Result<GeneratedCode, String> {
        let isa = self.isa_for(level).map_err(|e| e.to_string())?;
        let mut ctx = Context::for_function(func);
        let compiled = ctx
            .compile(isa, &mut ControlPlane::default())
            .map_err(|e| e.inner.to_string())?;
        let alignment = u64::from(compiled.buffer.alignment);
        let bytes = compiled.code_buffer().to_vec();
        let relocs = compiled.buffer.relocs().to_vec();
        Ok(GeneratedCode {
            func: ctx.func,
            alignment,
            bytes,
            relocs,
        })
    }
}

fn lock_symbols(symbols: &Mutex<ProcessSymbols>) -> Result<MutexGuard<'_, ProcessSymbols>> {
    symbols
        .lock()
        .map_err(|_| OpjitError::Link("process symbol table is poisoned".to_string()))
}

#[cfg(test)]
#[path = "environment_tests.rs"]
mod tests;
