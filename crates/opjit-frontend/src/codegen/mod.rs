//! Semantic checks and lowering of a translation unit to Cranelift IR.
//!
//! Lowering happens in two passes. The first walks every item and builds
//! the module's declaration table ([`ModuleScope`]); the second lowers each
//! function body against that table, so calls may refer to functions
//! defined later in the unit.

mod expr;
mod function;
mod scope;

#[cfg(test)]
mod tests;

use cranelift_codegen::ir::{Function, InstBuilder};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use thiserror::Error;

use crate::ast::{Block, CType, Item, MethodKind, TranslationUnit};
use crate::lexer::Span;
use crate::module::{DeclLinkage, FunctionBody, FunctionDecl, TargetInfo, DECL_NAMESPACE};
use function::{lower_function, FunctionSource};

pub use scope::{cl_type, CSignature, InvokableLayout, ALLOC_SYMBOL, FREE_SYMBOL};
use scope::ModuleScope;

/// A type or name error found while lowering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SemanticError {
    pub message: String,
    pub span: Span,
}

impl SemanticError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

pub type CodegenResult<T> = Result<T, SemanticError>;

/// Declarations and function bodies of a lowered unit.
#[derive(Debug)]
pub struct LoweredUnit {
    pub declarations: Vec<FunctionDecl>,
    pub functions: Vec<FunctionBody>,
}

/// Lowers `unit` for `target`.
///
/// Returns `Ok(None)` when the unit defines no functions.
pub fn lower_unit(
    unit: &TranslationUnit,
    target: &TargetInfo,
) -> CodegenResult<Option<LoweredUnit>> {
    let mut scope = ModuleScope::new(target);

    let has_invokables = unit.items.iter().any(|i| matches!(i, Item::Invokable(_)));
    if has_invokables {
        scope.declare_runtime_helpers()?;
    }

    let mut definitions = Vec::new();
    for item in &unit.items {
        match item {
            Item::Prototype(proto) => {
                scope.declare(proto, DeclLinkage::Import)?;
            }
            Item::Function(def) => {
                let linkage = if def.is_static {
                    DeclLinkage::Local
                } else {
                    DeclLinkage::Export
                };
                let index = scope.declare(&def.proto, linkage)?;
                definitions.push((index, def));
            }
            Item::Invokable(def) => scope.declare_invokable(def)?,
            Item::Struct(..) => {}
        }
    }

    let mut functions = Vec::new();
    for (index, def) in definitions {
        let source = FunctionSource {
            decl: index,
            params: def
                .proto
                .params
                .iter()
                .map(|p| (p.name.clone(), p.ty.clone()))
                .collect(),
            ret: def.proto.ret.clone(),
            body: &def.body,
            this: None,
        };
        functions.push(FunctionBody {
            decl: index,
            func: lower_function(&scope, source)?,
        });
    }

    let empty = Block::default();
    for item in &unit.items {
        let Item::Invokable(def) = item else {
            continue;
        };
        let layout = scope.invokables.get(&def.name).ok_or_else(|| {
            SemanticError::new(format!("invokable '{}' was not laid out", def.name), def.span)
        })?;

        for kind in [MethodKind::Init, MethodKind::Poll, MethodKind::Release] {
            let decl = layout.method_decl(kind);
            let method = def.methods.iter().find(|m| m.kind == kind);
            let (params, body) = match method {
                Some(method) => (
                    method
                        .proto
                        .params
                        .iter()
                        .map(|p| (p.name.clone(), p.ty.clone()))
                        .collect(),
                    &method.body,
                ),
                // Missing methods fall off the end and return 0.
                None => (
                    scope.c_sigs[decl].params[1..]
                        .iter()
                        .map(|ty| (None, ty.clone()))
                        .collect(),
                    &empty,
                ),
            };
            let source = FunctionSource {
                decl,
                params,
                ret: CType::Int,
                body,
                this: Some(layout),
            };
            functions.push(FunctionBody {
                decl,
                func: lower_function(&scope, source)?,
            });
        }

        functions.push(FunctionBody {
            decl: layout.destroy_decl(),
            func: lower_destroy(&scope, layout, def.span)?,
        });
    }

    if functions.is_empty() {
        return Ok(None);
    }

    Ok(Some(LoweredUnit {
        declarations: scope.decls,
        functions,
    }))
}

/// `destroy(this)`: hands the object back to `opjit_free`.
fn lower_destroy(
    scope: &ModuleScope<'_>,
    layout: &InvokableLayout,
    span: Span,
) -> CodegenResult<Function> {
    use cranelift_codegen::ir::{types, ExtFuncData, ExternalName, UserExternalName, UserFuncName};

    let free = scope
        .lookup(FREE_SYMBOL)
        .ok_or_else(|| SemanticError::new(format!("'{FREE_SYMBOL}' is not declared"), span))?;
    let decl = layout.destroy_decl();
    let mut func = Function::with_name_signature(
        UserFuncName::user(DECL_NAMESPACE, decl as u32),
        scope.decls[decl].signature.clone(),
    );
    let mut func_ctx = FunctionBuilderContext::new();
    let mut builder = FunctionBuilder::new(&mut func, &mut func_ctx);

    let signature = builder.import_signature(scope.decls[free].signature.clone());
    let name = builder
        .func
        .declare_imported_user_function(UserExternalName::new(DECL_NAMESPACE, free as u32));
    let free_ref = builder.import_function(ExtFuncData {
        name: ExternalName::user(name),
        signature,
        colocated: false,
    });

    let entry = builder.create_block();
    builder.append_block_params_for_function_params(entry);
    builder.switch_to_block(entry);
    let this = builder.block_params(entry)[0];
    let size = builder.ins().iconst(types::I64, layout.size);
    builder.ins().call(free_ref, &[this, size]);
    builder.ins().return_(&[]);
    builder.seal_all_blocks();
    builder.finalize();
    Ok(func)
}
