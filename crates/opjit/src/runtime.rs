//! The host-facing runtime context.
//!
//! One [`JitRuntime`] lives for as long as the host keeps opjit loaded. It
//! owns the configuration, the verbose-diagnostics switch and the slot
//! holding the JIT environment:
//!
//! ```text
//! Uncreated ──compile──► Live ──destroy_environment──► Cleared
//!     │                   ▲ │                             │
//!     │                   │ └────────shutdown───────┐     │
//!     │                   └─────────compile─────────┼─────┘
//!     └──────────────────shutdown──────────────────►Shutdown
//! ```
//!
//! Every environment operation runs under one mutex. Compilation to IR
//! happens outside it; compiled code is always called outside it.
//!
//! `shutdown` is process-wide: once any runtime has shut down, no runtime in
//! the process creates an environment again and [`JitRuntime::new`] fails.
//! Dropping a runtime only destroys its own environment.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use opjit_config::JitConfig;
use opjit_core::{
    DiagnosticsFlag, HostContext, OpjitError, ResolvedSymbol, Result, SymbolResolver,
};
use opjit_frontend::{CompileFailure, CompileRequest, CompiledModule, SourceCompiler};
use opjit_jit::{invoke_entry_point, JitEnvironment};
use tracing::{debug, info};

/// Set by the first `shutdown` in the process; never cleared.
static CODEGEN_SHUT_DOWN: AtomicBool = AtomicBool::new(false);

fn codegen_shut_down() -> bool {
    CODEGEN_SHUT_DOWN.load(Ordering::Acquire)
}

enum EnvSlot {
    Uncreated,
    Live(JitEnvironment),
    Cleared,
    Shutdown,
}

impl EnvSlot {
    fn name(&self) -> &'static str {
        match self {
            EnvSlot::Uncreated => "uncreated",
            EnvSlot::Live(_) => "live",
            EnvSlot::Cleared => "cleared",
            EnvSlot::Shutdown => "shutdown",
        }
    }
}

/// Owner of the process-wide JIT environment.
pub struct JitRuntime {
    config: JitConfig,
    verbose: DiagnosticsFlag,
    env: Mutex<EnvSlot>,
}

impl std::fmt::Debug for JitRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock().map(|slot| slot.name()).unwrap_or("poisoned");
        f.debug_struct("JitRuntime")
            .field("config", &self.config)
            .field("environment", &state)
            .finish()
    }
}

impl JitRuntime {
    pub fn new(config: JitConfig) -> Result<Self> {
        if codegen_shut_down() {
            return Err(shut_down());
        }
        config
            .validate()
            .map_err(|e| OpjitError::Config(e.to_string()))?;
        Ok(Self {
            config,
            verbose: DiagnosticsFlag::new(),
            env: Mutex::new(EnvSlot::Uncreated),
        })
    }

    /// Builds a runtime from the file named by `OPJIT_CONFIG`, or defaults.
    pub fn from_env_or_default() -> Result<Self> {
        let config =
            JitConfig::from_env_or_default().map_err(|e| OpjitError::Config(e.to_string()))?;
        Self::new(config)
    }

    pub fn config(&self) -> &JitConfig {
        &self.config
    }

    /// The switch shared by every request, compiler and environment.
    pub fn diagnostics(&self) -> &DiagnosticsFlag {
        &self.verbose
    }

    /// Builds a request, resetting the diagnostics switch from `options`.
    pub fn request(
        &self,
        entry_point: &str,
        source_text: &str,
        options: &str,
        libraries: &str,
    ) -> CompileRequest {
        CompileRequest::new(entry_point, source_text, options, libraries, &self.verbose)
    }

    /// Compiles `request` and ingests the module, creating the environment
    /// if there is none. Libraries are loaded before the module is added.
    ///
    /// A failed compile leaves the environment as it was: one created for
    /// this call is destroyed again.
    pub fn compile_module(&self, request: &CompileRequest) -> std::result::Result<(), CompileFailure> {
        if codegen_shut_down() || matches!(*self.lock()?, EnvSlot::Shutdown) {
            return Err(shut_down().into());
        }

        let compiler = SourceCompiler::new(self.config.temp.clone(), self.verbose.clone())?;
        let module = compiler.compile(request)?;

        let mut slot = self.lock()?;
        let previous = match *slot {
            EnvSlot::Uncreated => Some(EnvSlot::Uncreated),
            EnvSlot::Cleared => Some(EnvSlot::Cleared),
            EnvSlot::Live(_) | EnvSlot::Shutdown => None,
        };
        let ingested = ingest(self.live_or_create(&mut slot)?, request, module);
        if let (Err(e), Some(previous)) = (&ingested, previous) {
            if let EnvSlot::Live(env) = std::mem::replace(&mut *slot, previous) {
                env.destroy();
            }
            debug!(event = "environment_discarded", error = %e);
        }
        Ok(ingested?)
    }

    /// Compiles the source, ingests it and calls its entry point once.
    pub fn compile_and_run(
        &self,
        entry_point: &str,
        source_text: &str,
        options: &str,
        libraries: &str,
        context: HostContext,
    ) -> std::result::Result<i32, CompileFailure> {
        let request = self.request(entry_point, source_text, options, libraries);
        self.compile_module(&request)?;
        let status = invoke_entry_point(self, request.entry_point(), context)?;
        if self.verbose.enabled() {
            info!(event = "entry_point_returned", entry_point, status);
        }
        Ok(status)
    }

    /// Loads a library into the live environment.
    pub fn load_library(&self, path: &std::path::Path) -> Result<()> {
        let mut slot = self.lock()?;
        live(&mut slot)?.load_library(path)
    }

    /// Destroys the environment. A later compile creates a fresh one.
    pub fn destroy_environment(&self) -> Result<()> {
        let mut slot = self.lock()?;
        match std::mem::replace(&mut *slot, EnvSlot::Cleared) {
            EnvSlot::Live(env) => env.destroy(),
            EnvSlot::Shutdown => {
                *slot = EnvSlot::Shutdown;
                return Err(shut_down());
            }
            EnvSlot::Uncreated | EnvSlot::Cleared => {}
        }
        debug!(event = "environment_cleared");
        Ok(())
    }

    /// Destroys the environment and marks code generation finished for the
    /// whole process: no runtime creates an environment afterwards.
    ///
    /// Idempotent, and safe when no environment was ever created.
    pub fn shutdown(&self) {
        CODEGEN_SHUT_DOWN.store(true, Ordering::Release);
        // A poisoned lock still holds a usable slot.
        let mut slot = self.env.lock().unwrap_or_else(|e| e.into_inner());
        if let EnvSlot::Live(env) = std::mem::replace(&mut *slot, EnvSlot::Shutdown) {
            env.destroy();
        }
        if self.verbose.enabled() {
            info!(event = "runtime_shutdown");
        }
    }

    pub fn has_environment(&self) -> bool {
        self.lock()
            .map(|slot| matches!(*slot, EnvSlot::Live(_)))
            .unwrap_or(false)
    }

    pub fn is_shut_down(&self) -> bool {
        codegen_shut_down()
            || self
                .lock()
                .map(|slot| matches!(*slot, EnvSlot::Shutdown))
                .unwrap_or(false)
    }

    fn lock(&self) -> Result<MutexGuard<'_, EnvSlot>> {
        self.env
            .lock()
            .map_err(|_| OpjitError::InvalidState("JIT runtime lock poisoned".to_string()))
    }

    fn live_or_create<'a>(&self, slot: &'a mut EnvSlot) -> Result<&'a mut JitEnvironment> {
        match slot {
            EnvSlot::Shutdown => return Err(shut_down()),
            EnvSlot::Uncreated | EnvSlot::Cleared if codegen_shut_down() => {
                *slot = EnvSlot::Shutdown;
                return Err(shut_down());
            }
            EnvSlot::Uncreated | EnvSlot::Cleared => {
                let env = JitEnvironment::create(&self.config.codegen, self.verbose.clone())
                    .map_err(|e| match e {
                        OpjitError::Link(_) => e,
                        other => OpjitError::Link(format!("cannot create JIT environment: {other}")),
                    })?;
                *slot = EnvSlot::Live(env);
            }
            EnvSlot::Live(_) => {}
        }
        live(slot)
    }
}

impl Drop for JitRuntime {
    fn drop(&mut self) {
        let slot = self.env.get_mut().unwrap_or_else(|e| e.into_inner());
        if let EnvSlot::Live(env) = std::mem::replace(slot, EnvSlot::Cleared) {
            env.destroy();
        }
    }
}

impl SymbolResolver for JitRuntime {
    fn resolve(&self, name: &str) -> Result<ResolvedSymbol> {
        let mut slot = self.lock()?;
        match &mut *slot {
            EnvSlot::Uncreated => Err(OpjitError::symbol_not_found(name)),
            other => live(other)?.resolve(name),
        }
    }
}

fn ingest(
    env: &mut JitEnvironment,
    request: &CompileRequest,
    module: CompiledModule,
) -> Result<()> {
    for library in request.link_libraries() {
        env.load_library(library)?;
    }
    env.add_module(module)
}

fn live(slot: &mut EnvSlot) -> Result<&mut JitEnvironment> {
    match slot {
        EnvSlot::Live(env) => Ok(env),
        EnvSlot::Uncreated => Err(OpjitError::InvalidState(
            "no JIT environment has been created".to_string(),
        )),
        EnvSlot::Cleared => Err(OpjitError::InvalidState(
            "the JIT environment was destroyed".to_string(),
        )),
        EnvSlot::Shutdown => Err(shut_down()),
    }
}

fn shut_down() -> OpjitError {
    OpjitError::InvalidState("the JIT runtime has been shut down".to_string())
}
