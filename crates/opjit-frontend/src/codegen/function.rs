//! Lowering of one function body to Cranelift IR.

use std::collections::HashMap;

use cranelift_codegen::ir::{
    types, Block as IrBlock, ExtFuncData, ExternalName, FuncRef, Function, InstBuilder,
    UserExternalName, UserFuncName, Value,
};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext, Variable};

use super::scope::{cl_type, InvokableLayout, ModuleScope};
use super::{CodegenResult, SemanticError};
use crate::ast::{Block, CType, Stmt};
use crate::lexer::Span;
use crate::module::DECL_NAMESPACE;

/// A value together with its C type.
#[derive(Debug, Clone)]
pub(super) struct Typed {
    pub value: Value,
    pub ty: CType,
}

#[derive(Debug, Clone)]
pub(super) struct Local {
    pub var: Variable,
    pub ty: CType,
}

#[derive(Debug, Clone, Copy)]
struct LoopTarget {
    continue_block: IrBlock,
    break_block: IrBlock,
}

/// What a function body is lowered from.
pub(super) struct FunctionSource<'a> {
    pub decl: usize,
    pub params: Vec<(Option<String>, CType)>,
    pub ret: CType,
    pub body: &'a Block,
    /// Set for invokable methods: the layout `this` points to.
    pub this: Option<&'a InvokableLayout>,
}

pub(super) fn lower_function(
    scope: &ModuleScope<'_>,
    source: FunctionSource<'_>,
) -> CodegenResult<Function> {
    let signature = scope.decls[source.decl].signature.clone();
    let mut func = Function::with_name_signature(
        UserFuncName::user(DECL_NAMESPACE, source.decl as u32),
        signature,
    );
    let mut func_ctx = FunctionBuilderContext::new();
    {
        let builder = FunctionBuilder::new(&mut func, &mut func_ctx);
        let mut lowering = FunctionLowering {
            scope,
            builder,
            scopes: vec![HashMap::new()],
            this: None,
            loops: Vec::new(),
            ret: source.ret.clone(),
            next_var: 0,
            func_refs: HashMap::new(),
            terminated: false,
        };
        lowering.lower(&source)?;
        lowering.builder.finalize();
    }
    Ok(func)
}

pub(super) struct FunctionLowering<'s, 't, 'b> {
    pub scope: &'s ModuleScope<'t>,
    pub builder: FunctionBuilder<'b>,
    scopes: Vec<HashMap<String, Local>>,
    pub this: Option<(Value, &'s InvokableLayout)>,
    loops: Vec<LoopTarget>,
    ret: CType,
    next_var: u32,
    func_refs: HashMap<usize, FuncRef>,
    /// The current block already ends in a terminator.
    terminated: bool,
}

impl<'s, 't, 'b> FunctionLowering<'s, 't, 'b> {
    fn lower(&mut self, source: &FunctionSource<'s>) -> CodegenResult<()> {
        let entry = self.builder.create_block();
        self.builder.append_block_params_for_function_params(entry);
        self.builder.switch_to_block(entry);
        let mut params = self.builder.block_params(entry).to_vec().into_iter();

        if let Some(layout) = source.this {
            let this = params.next().ok_or_else(|| {
                SemanticError::new("method without object parameter", Span::default())
            })?;
            self.this = Some((this, layout));
        }

        for (name, ty) in &source.params {
            let value = params
                .next()
                .ok_or_else(|| SemanticError::new("parameter count mismatch", Span::default()))?;
            if let Some(name) = name {
                let var = self.declare_local(name, ty.clone(), Span::default())?;
                self.builder.def_var(var, value);
            }
        }

        self.block(source.body)?;

        if !self.terminated {
            self.default_return();
        }
        self.builder.seal_all_blocks();
        Ok(())
    }

    /// Falling off the end returns zero (or nothing for `void`).
    fn default_return(&mut self) {
        match cl_type(&self.ret, self.scope.target) {
            Some(ty) => {
                let zero = self.zero(ty);
                self.builder.ins().return_(&[zero]);
            }
            None => {
                self.builder.ins().return_(&[]);
            }
        }
        self.terminated = true;
    }

    pub(super) fn zero(&mut self, ty: cranelift_codegen::ir::Type) -> Value {
        if ty == types::F64 {
            self.builder.ins().f64const(0.0)
        } else {
            self.builder.ins().iconst(ty, 0)
        }
    }

    // ==================== Locals ====================

    fn declare_local(&mut self, name: &str, ty: CType, span: Span) -> CodegenResult<Variable> {
        let cl = cl_type(&ty, self.scope.target).ok_or_else(|| {
            SemanticError::new(
                format!("variable '{name}' has incomplete type '{ty}'"),
                span,
            )
        })?;
        let scope = self
            .scopes
            .last_mut()
            .ok_or_else(|| SemanticError::new("no open scope", span))?;
        if scope.contains_key(name) {
            return Err(SemanticError::new(format!("redefinition of '{name}'"), span));
        }
        let var = Variable::from_u32(self.next_var);
        self.next_var += 1;
        self.builder.declare_var(var, cl);
        scope.insert(name.to_string(), Local { var, ty });
        Ok(var)
    }

    pub(super) fn local(&self, name: &str) -> Option<&Local> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    // ==================== Calls ====================

    /// Imports declaration `index` into the function, once.
    pub(super) fn func_ref(&mut self, index: usize) -> FuncRef {
        if let Some(func_ref) = self.func_refs.get(&index) {
            return *func_ref;
        }
        let signature = self
            .builder
            .import_signature(self.scope.decls[index].signature.clone());
        let name = self
            .builder
            .func
            .declare_imported_user_function(UserExternalName::new(DECL_NAMESPACE, index as u32));
        let func_ref = self.builder.import_function(ExtFuncData {
            name: ExternalName::user(name),
            signature,
            colocated: false,
        });
        self.func_refs.insert(index, func_ref);
        func_ref
    }

    // ==================== Statements ====================

    /// Code after a terminator goes into a fresh, unreachable block.
    fn reopen(&mut self) {
        if self.terminated {
            let block = self.builder.create_block();
            self.builder.switch_to_block(block);
            self.terminated = false;
        }
    }

    fn jump_to(&mut self, target: IrBlock) {
        if !self.terminated {
            self.builder.ins().jump(target, &[]);
            self.terminated = true;
        }
    }

    fn switch_to(&mut self, block: IrBlock) {
        self.builder.switch_to_block(block);
        self.terminated = false;
    }

    fn block(&mut self, block: &Block) -> CodegenResult<()> {
        self.scopes.push(HashMap::new());
        let result = block.stmts.iter().try_for_each(|stmt| self.statement(stmt));
        self.scopes.pop();
        result
    }

    fn statement(&mut self, stmt: &Stmt) -> CodegenResult<()> {
        self.reopen();
        match stmt {
            Stmt::Empty => Ok(()),
            Stmt::Block(block) => self.block(block),
            Stmt::Expr(expr) => self.expr_or_void(expr).map(|_| ()),
            Stmt::Decl {
                ty,
                name,
                init,
                span,
            } => {
                // The initializer cannot see the variable it initializes.
                let value = match init {
                    Some(init) => {
                        let typed = self.expr(init)?;
                        Some(self.coerce(typed, ty, init, "initializing")?)
                    }
                    None => None,
                };
                let var = self.declare_local(name, ty.clone(), *span)?;
                let value = match value {
                    Some(value) => value,
                    None => {
                        let cl = cl_type(ty, self.scope.target).unwrap_or(types::I64);
                        self.zero(cl)
                    }
                };
                self.builder.def_var(var, value);
                Ok(())
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = self.condition(cond)?;
                let then_block = self.builder.create_block();
                let merge_block = self.builder.create_block();
                let else_block = match else_branch {
                    Some(_) => self.builder.create_block(),
                    None => merge_block,
                };
                self.builder
                    .ins()
                    .brif(cond, then_block, &[], else_block, &[]);

                self.switch_to(then_block);
                self.statement(then_branch)?;
                self.jump_to(merge_block);

                if let Some(else_branch) = else_branch {
                    self.switch_to(else_block);
                    self.statement(else_branch)?;
                    self.jump_to(merge_block);
                }

                self.switch_to(merge_block);
                Ok(())
            }
            Stmt::While { cond, body } => {
                let header = self.builder.create_block();
                let body_block = self.builder.create_block();
                let exit = self.builder.create_block();
                self.jump_to(header);

                self.switch_to(header);
                let cond = self.condition(cond)?;
                self.builder.ins().brif(cond, body_block, &[], exit, &[]);

                self.switch_to(body_block);
                self.in_loop(header, exit, body)?;
                self.jump_to(header);

                self.switch_to(exit);
                Ok(())
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                self.scopes.push(HashMap::new());
                let result = self.for_loop(init.as_deref(), cond.as_ref(), step.as_ref(), body);
                self.scopes.pop();
                result
            }
            Stmt::Break(span) => {
                let target = self.loops.last().copied().ok_or_else(|| {
                    SemanticError::new("'break' statement not in loop statement", *span)
                })?;
                self.jump_to(target.break_block);
                Ok(())
            }
            Stmt::Continue(span) => {
                let target = self.loops.last().copied().ok_or_else(|| {
                    SemanticError::new("'continue' statement not in loop statement", *span)
                })?;
                self.jump_to(target.continue_block);
                Ok(())
            }
            Stmt::Return(value, span) => self.return_stmt(value.as_ref(), *span),
        }
    }

    fn for_loop(
        &mut self,
        init: Option<&Stmt>,
        cond: Option<&crate::ast::Expr>,
        step: Option<&crate::ast::Expr>,
        body: &Stmt,
    ) -> CodegenResult<()> {
        if let Some(init) = init {
            self.statement(init)?;
        }

        let header = self.builder.create_block();
        let body_block = self.builder.create_block();
        let step_block = self.builder.create_block();
        let exit = self.builder.create_block();
        self.jump_to(header);

        self.switch_to(header);
        match cond {
            Some(cond) => {
                let cond = self.condition(cond)?;
                self.builder.ins().brif(cond, body_block, &[], exit, &[]);
            }
            None => {
                self.builder.ins().jump(body_block, &[]);
            }
        }

        self.switch_to(body_block);
        self.in_loop(step_block, exit, body)?;
        self.jump_to(step_block);

        self.switch_to(step_block);
        if let Some(step) = step {
            self.expr_or_void(step)?;
        }
        self.jump_to(header);

        self.switch_to(exit);
        Ok(())
    }

    fn in_loop(
        &mut self,
        continue_block: IrBlock,
        break_block: IrBlock,
        body: &Stmt,
    ) -> CodegenResult<()> {
        self.loops.push(LoopTarget {
            continue_block,
            break_block,
        });
        let result = self.statement(body);
        self.loops.pop();
        result
    }

    fn return_stmt(&mut self, value: Option<&crate::ast::Expr>, span: Span) -> CodegenResult<()> {
        match (value, &self.ret) {
            (None, CType::Void) => {
                self.builder.ins().return_(&[]);
            }
            (Some(_), CType::Void) => {
                return Err(SemanticError::new(
                    "void function should not return a value",
                    span,
                ))
            }
            (None, _) => {
                return Err(SemanticError::new(
                    "non-void function should return a value",
                    span,
                ))
            }
            (Some(expr), ret) => {
                let ret = ret.clone();
                let typed = self.expr(expr)?;
                let value = self.coerce(typed, &ret, expr, "returning")?;
                self.builder.ins().return_(&[value]);
            }
        }
        self.terminated = true;
        Ok(())
    }
}
