//! Module-level declarations and invokable layouts.

use std::collections::HashMap;

use cranelift_codegen::ir::{AbiParam, Signature};
use opjit_core::abi::{FIELD_SLOT_BYTES, HEADER_WORDS};
use opjit_core::{AbiType, SymbolSignature};

use super::{CodegenResult, SemanticError};
use crate::ast::{CType, InvokableDef, MethodKind, Prototype};
use crate::lexer::Span;
use crate::module::{DeclLinkage, FunctionDecl, TargetInfo};

/// Runtime helper that allocates zeroed invokable storage.
pub const ALLOC_SYMBOL: &str = "opjit_alloc";

/// Runtime helper that frees invokable storage.
pub const FREE_SYMBOL: &str = "opjit_free";

/// C-level signature of a declared function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CSignature {
    pub ret: CType,
    pub params: Vec<CType>,
}

#[derive(Debug, Clone)]
pub struct FieldSlot {
    pub name: String,
    pub ty: CType,
    pub offset: i32,
}

/// Memory layout and function table of one invokable type.
#[derive(Debug, Clone)]
pub struct InvokableLayout {
    pub name: String,
    pub fields: Vec<FieldSlot>,
    pub size: i64,
    /// Declaration indices in header order: init, poll, release, destroy.
    pub table: [usize; HEADER_WORDS],
}

impl InvokableLayout {
    pub fn field(&self, name: &str) -> Option<&FieldSlot> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn method_decl(&self, kind: MethodKind) -> usize {
        match kind {
            MethodKind::Init => self.table[0],
            MethodKind::Poll => self.table[1],
            MethodKind::Release => self.table[2],
        }
    }

    pub fn destroy_decl(&self) -> usize {
        self.table[3]
    }
}

/// Everything function bodies can refer to.
pub struct ModuleScope<'t> {
    pub target: &'t TargetInfo,
    pub decls: Vec<FunctionDecl>,
    pub c_sigs: Vec<CSignature>,
    by_name: HashMap<String, usize>,
    pub invokables: HashMap<String, InvokableLayout>,
}

impl<'t> ModuleScope<'t> {
    pub fn new(target: &'t TargetInfo) -> Self {
        Self {
            target,
            decls: Vec::new(),
            c_sigs: Vec::new(),
            by_name: HashMap::new(),
            invokables: HashMap::new(),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Declares a named function, merging with an earlier declaration.
    pub fn declare(
        &mut self,
        proto: &Prototype,
        linkage: DeclLinkage,
    ) -> CodegenResult<usize> {
        let c_sig = self.check_prototype(proto)?;

        if let Some(index) = self.lookup(&proto.name) {
            if self.c_sigs[index] != c_sig {
                return Err(SemanticError::new(
                    format!("conflicting types for '{}'", proto.name),
                    proto.span,
                ));
            }
            let existing = self.decls[index].linkage;
            match (existing.is_defined(), linkage.is_defined()) {
                (true, true) => {
                    return Err(SemanticError::new(
                        format!("redefinition of '{}'", proto.name),
                        proto.span,
                    ))
                }
                (false, true) => self.decls[index].linkage = linkage,
                _ => {}
            }
            return Ok(index);
        }

        let index = self.push_decl(proto.name.clone(), linkage, c_sig);
        self.by_name.insert(proto.name.clone(), index);
        Ok(index)
    }

    /// Declares the runtime helpers invokables need, unless already declared.
    pub fn declare_runtime_helpers(&mut self) -> CodegenResult<()> {
        let void_ptr = CType::pointer_to(CType::Void);
        let helpers = [
            (ALLOC_SYMBOL, void_ptr.clone(), vec![CType::Long]),
            (FREE_SYMBOL, CType::Void, vec![void_ptr, CType::Long]),
        ];
        for (name, ret, params) in helpers {
            let proto = Prototype {
                name: name.to_string(),
                ret,
                params: params
                    .into_iter()
                    .map(|ty| crate::ast::Param {
                        name: None,
                        ty,
                        span: Span::default(),
                    })
                    .collect(),
                span: Span::default(),
            };
            self.declare(&proto, DeclLinkage::Import)?;
        }
        Ok(())
    }

    /// Lays out an invokable and declares its function table.
    pub fn declare_invokable(&mut self, def: &InvokableDef) -> CodegenResult<()> {
        if self.invokables.contains_key(&def.name) {
            return Err(SemanticError::new(
                format!("redefinition of invokable '{}'", def.name),
                def.span,
            ));
        }

        let header_bytes = (HEADER_WORDS as u32 * self.target.pointer_bytes()) as i32;
        let mut fields = Vec::with_capacity(def.fields.len());
        for (i, field) in def.fields.iter().enumerate() {
            if !field.ty.is_scalar() {
                return Err(SemanticError::new(
                    format!("field '{}' has incomplete type '{}'", field.name, field.ty),
                    field.span,
                ));
            }
            fields.push(FieldSlot {
                name: field.name.clone(),
                ty: field.ty.clone(),
                offset: header_bytes + (i * FIELD_SLOT_BYTES) as i32,
            });
        }

        for method in &def.methods {
            let expected = method_signature(method.kind);
            let actual = CSignature {
                ret: method.proto.ret.clone(),
                params: method.proto.params.iter().map(|p| p.ty.clone()).collect(),
            };
            if !method_signature_matches(&expected, &actual) {
                return Err(SemanticError::new(
                    format!(
                        "invokable method '{}' must be declared as {}",
                        method.kind.name(),
                        method_synopsis(method.kind)
                    ),
                    method.proto.span,
                ));
            }
        }

        let this = CType::pointer_to(CType::Struct(def.name.clone()));
        let mut table = [0usize; HEADER_WORDS];
        let kinds = [MethodKind::Init, MethodKind::Poll, MethodKind::Release];
        for (slot, kind) in kinds.into_iter().enumerate() {
            let mut sig = method_signature(kind);
            sig.params.insert(0, this.clone());
            table[slot] = self.push_decl(
                format!("{}::{}", def.name, kind.name()),
                DeclLinkage::Local,
                sig,
            );
        }
        table[3] = self.push_decl(
            format!("{}::destroy", def.name),
            DeclLinkage::Local,
            CSignature {
                ret: CType::Void,
                params: vec![this],
            },
        );

        let size = header_bytes as i64 + (fields.len() * FIELD_SLOT_BYTES) as i64;
        self.invokables.insert(
            def.name.clone(),
            InvokableLayout {
                name: def.name.clone(),
                fields,
                size,
                table,
            },
        );
        Ok(())
    }

    fn push_decl(&mut self, name: String, linkage: DeclLinkage, c_sig: CSignature) -> usize {
        let mut signature = Signature::new(self.target.call_conv);
        let mut params = Vec::with_capacity(c_sig.params.len());
        for ty in &c_sig.params {
            if let Some(cl) = cl_type(ty, self.target) {
                signature.params.push(AbiParam::new(cl));
                params.push(abi_type(ty));
            }
        }
        let mut returns = Vec::new();
        if let Some(cl) = cl_type(&c_sig.ret, self.target) {
            signature.returns.push(AbiParam::new(cl));
            returns.push(abi_type(&c_sig.ret));
        }

        self.decls.push(FunctionDecl {
            name,
            linkage,
            signature,
            abi: SymbolSignature::new(params, returns),
        });
        self.c_sigs.push(c_sig);
        self.decls.len() - 1
    }

    fn check_prototype(&self, proto: &Prototype) -> CodegenResult<CSignature> {
        if !(proto.ret.is_scalar() || proto.ret == CType::Void) {
            return Err(SemanticError::new(
                format!(
                    "function '{}' has incomplete result type '{}'",
                    proto.name, proto.ret
                ),
                proto.span,
            ));
        }
        for param in &proto.params {
            if !param.ty.is_scalar() {
                return Err(SemanticError::new(
                    format!("parameter has incomplete type '{}'", param.ty),
                    param.span,
                ));
            }
        }
        Ok(CSignature {
            ret: proto.ret.clone(),
            params: proto.params.iter().map(|p| p.ty.clone()).collect(),
        })
    }
}

/// Cranelift type of a value of C type `ty`; `None` for `void` and structs.
pub fn cl_type(ty: &CType, target: &TargetInfo) -> Option<cranelift_codegen::ir::Type> {
    use cranelift_codegen::ir::types;
    match ty {
        CType::Int => Some(types::I32),
        CType::Long => Some(types::I64),
        CType::Double => Some(types::F64),
        CType::Pointer(_) => Some(target.pointer_type),
        CType::Void | CType::Struct(_) => None,
    }
}

fn abi_type(ty: &CType) -> AbiType {
    match ty {
        CType::Int => AbiType::I32,
        CType::Long => AbiType::I64,
        CType::Double => AbiType::F64,
        _ => AbiType::Pointer,
    }
}

/// Signature of a method as written, without the implicit object pointer.
fn method_signature(kind: MethodKind) -> CSignature {
    let context = CType::pointer_to(CType::Struct(crate::ast::CONTEXT_TYPE.into()));
    let slots = CType::pointer_to(CType::Double);
    let params = match kind {
        MethodKind::Init | MethodKind::Poll => vec![context, slots.clone(), slots],
        MethodKind::Release => vec![context],
    };
    CSignature {
        ret: CType::Int,
        params,
    }
}

fn method_signature_matches(expected: &CSignature, actual: &CSignature) -> bool {
    // The context pointer may be spelled with any pointer type.
    actual.ret == expected.ret
        && actual.params.len() == expected.params.len()
        && actual
            .params
            .iter()
            .zip(&expected.params)
            .enumerate()
            .all(|(i, (a, e))| if i == 0 { a.is_pointer() } else { a == e })
}

fn method_synopsis(kind: MethodKind) -> &'static str {
    match kind {
        MethodKind::Init => "int init(Context*, double*, double*)",
        MethodKind::Poll => "int poll(Context*, double*, double*)",
        MethodKind::Release => "int release(Context*)",
    }
}
