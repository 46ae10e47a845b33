//! In-memory code module produced by the frontend.
//!
//! A [`CompiledModule`] is Cranelift IR plus the declaration table that IR
//! refers to. Every external reference inside a function body is a user
//! name in namespace 0 whose index is a position in [`CompiledModule::declarations`];
//! the JIT environment rewrites those indices when it links the module.

use std::path::{Path, PathBuf};

use cranelift_codegen::ir::{Function, Signature, Type};
use cranelift_codegen::isa::{CallConv, OwnedTargetIsa};
use cranelift_codegen::settings::{self, Configurable};
use opjit_config::OptLevel;
use opjit_core::{OpjitError, Result, SymbolSignature};

/// Namespace used for every user external name emitted by the frontend.
pub const DECL_NAMESPACE: u32 = 0;

/// How a declared function is visible to the rest of the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclLinkage {
    /// Defined here, resolvable from outside.
    Export,
    /// Defined here, private to the module.
    Local,
    /// Defined elsewhere: an earlier module, a loaded library or the process.
    Import,
}

impl DeclLinkage {
    pub fn is_defined(self) -> bool {
        !matches!(self, DeclLinkage::Import)
    }
}

/// One entry of the module's declaration table.
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub linkage: DeclLinkage,
    pub signature: Signature,
    /// ABI-level view of the signature, recorded with resolved symbols.
    pub abi: SymbolSignature,
}

/// IR for one function defined by the module.
#[derive(Debug, Clone)]
pub struct FunctionBody {
    /// Index of this function's entry in the declaration table.
    pub decl: usize,
    pub func: Function,
}

/// Target the machine code is generated for.
#[derive(Debug, Clone)]
pub struct TargetInfo {
    pub triple: String,
    pub pointer_type: Type,
    pub call_conv: CallConv,
}

impl TargetInfo {
    /// Detects the host the process is running on.
    pub fn host() -> Result<Self> {
        let isa = host_isa(OptLevel::None)?;
        Ok(Self::from_isa(&isa))
    }

    pub fn from_isa(isa: &OwnedTargetIsa) -> Self {
        Self {
            triple: isa.triple().to_string(),
            pointer_type: isa.pointer_type(),
            call_conv: isa.default_call_conv(),
        }
    }

    pub fn pointer_bytes(&self) -> u32 {
        self.pointer_type.bytes()
    }
}

/// Builds the native ISA with the flags the JIT needs.
pub fn host_isa(opt_level: OptLevel) -> Result<OwnedTargetIsa> {
    host_isa_with(opt_level, true)
}

/// Builds the native ISA, choosing whether the IR verifier runs during codegen.
pub fn host_isa_with(opt_level: OptLevel, verifier: bool) -> Result<OwnedTargetIsa> {
    let mut flag_builder = settings::builder();
    let flags = [
        ("use_colocated_libcalls", "false"),
        ("is_pic", "false"),
        ("opt_level", opt_level.as_setting()),
        ("enable_verifier", if verifier { "true" } else { "false" }),
    ];
    for (name, value) in flags {
        flag_builder
            .set(name, value)
            .map_err(|e| OpjitError::Link(format!("cranelift setting {name}: {e}")))?;
    }
    let isa_builder = cranelift_native::builder()
        .map_err(|e| OpjitError::Link(format!("host machine is not supported: {e}")))?;
    isa_builder
        .finish(settings::Flags::new(flag_builder))
        .map_err(|e| OpjitError::Link(format!("cannot create target machine: {e}")))
}

/// Cranelift IR for every function a unit defines.
///
/// Not `Clone`: a module is moved into the JIT environment exactly once.
#[derive(Debug)]
pub struct CompiledModule {
    pub declarations: Vec<FunctionDecl>,
    pub functions: Vec<FunctionBody>,
    pub target: TargetInfo,
    pub source_path: PathBuf,
    /// Optimisation level requested with `-O`, if any.
    pub opt_level: Option<OptLevel>,
}

impl CompiledModule {
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Names of the symbols this module makes resolvable.
    pub fn exports(&self) -> impl Iterator<Item = &str> {
        self.declarations
            .iter()
            .filter(|d| d.linkage == DeclLinkage::Export)
            .map(|d| d.name.as_str())
    }

    /// Names this module expects to find elsewhere.
    pub fn imports(&self) -> impl Iterator<Item = &str> {
        self.declarations
            .iter()
            .filter(|d| d.linkage == DeclLinkage::Import)
            .map(|d| d.name.as_str())
    }

    pub fn declaration(&self, name: &str) -> Option<&FunctionDecl> {
        self.declarations.iter().find(|d| d.name == name)
    }
}
