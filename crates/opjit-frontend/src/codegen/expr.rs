//! Expression lowering with the usual arithmetic conversions.

use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::{types, InstBuilder, MemFlags, Value};

use super::function::{FunctionLowering, Typed};
use super::scope::{cl_type, ALLOC_SYMBOL};
use super::{CodegenResult, SemanticError};
use crate::ast::{AssignOp, BinaryOp, CType, Expr, ExprKind, UnaryOp};

/// Something that can be assigned to.
enum Place {
    Var(cranelift_frontend::Variable, CType),
    Memory {
        addr: Value,
        offset: i32,
        ty: CType,
        flags: MemFlags,
    },
}

impl Place {
    fn ty(&self) -> &CType {
        match self {
            Place::Var(_, ty) | Place::Memory { ty, .. } => ty,
        }
    }
}

fn slot_size(ty: &CType, pointer_bytes: u32) -> Option<i64> {
    match ty {
        CType::Int => Some(4),
        CType::Long | CType::Double => Some(8),
        CType::Pointer(_) => Some(i64::from(pointer_bytes)),
        CType::Void | CType::Struct(_) => None,
    }
}

/// Result type of the usual arithmetic conversions.
fn common_type(a: &CType, b: &CType) -> CType {
    if *a == CType::Double || *b == CType::Double {
        CType::Double
    } else if *a == CType::Long || *b == CType::Long {
        CType::Long
    } else {
        CType::Int
    }
}

impl FunctionLowering<'_, '_, '_> {
    /// Lowers an expression that must produce a value.
    pub(super) fn expr(&mut self, expr: &Expr) -> CodegenResult<Typed> {
        self.expr_or_void(expr)?.ok_or_else(|| {
            SemanticError::new("void value not ignored as it ought to be", expr.span)
        })
    }

    /// Lowers an expression, which may be a call to a `void` function.
    pub(super) fn expr_or_void(&mut self, expr: &Expr) -> CodegenResult<Option<Typed>> {
        let typed = match &expr.kind {
            ExprKind::IntLit { value, long } => {
                let ty = if *long { CType::Long } else { CType::Int };
                let cl = if *long { types::I64 } else { types::I32 };
                Typed {
                    value: self.builder.ins().iconst(cl, *value),
                    ty,
                }
            }
            ExprKind::FloatLit(value) => Typed {
                value: self.builder.ins().f64const(*value),
                ty: CType::Double,
            },
            ExprKind::Ident(_) | ExprKind::Index { .. } => {
                let place = self.place(expr)?;
                self.load(&place)
            }
            ExprKind::Call { callee, args } => return self.call(callee, args, expr),
            ExprKind::Unary { op, operand } => self.unary(*op, operand)?,
            ExprKind::Cast { ty, operand } => {
                if *ty == CType::Void {
                    self.expr_or_void(operand)?;
                    return Ok(None);
                }
                let typed = self.expr(operand)?;
                self.cast(typed, ty, expr)?
            }
            ExprKind::Binary { op, lhs, rhs } => match op {
                BinaryOp::And | BinaryOp::Or => self.short_circuit(*op, lhs, rhs)?,
                _ => {
                    let l = self.expr(lhs)?;
                    let r = self.expr(rhs)?;
                    self.binary(*op, l, r, lhs, rhs, expr)?
                }
            },
            ExprKind::Assign { op, target, value } => self.assign(*op, target, value)?,
            ExprKind::IncDec {
                target,
                increment,
                prefix,
            } => self.inc_dec(target, *increment, *prefix)?,
            ExprKind::New(name) => self.new_invokable(name, expr)?,
        };
        Ok(Some(typed))
    }

    // ==================== Places ====================

    fn place(&mut self, expr: &Expr) -> CodegenResult<Place> {
        match &expr.kind {
            ExprKind::Ident(name) => {
                if let Some(local) = self.local(name) {
                    return Ok(Place::Var(local.var, local.ty.clone()));
                }
                if let Some((this, layout)) = self.this {
                    if let Some(field) = layout.field(name) {
                        return Ok(Place::Memory {
                            addr: this,
                            offset: field.offset,
                            ty: field.ty.clone(),
                            flags: MemFlags::trusted(),
                        });
                    }
                }
                let message = if self.scope.lookup(name).is_some() {
                    format!("function '{name}' cannot be used as a value")
                } else {
                    format!("use of undeclared identifier '{name}'")
                };
                Err(SemanticError::new(message, expr.span))
            }
            ExprKind::Index { base, index } => {
                let base_value = self.expr(base)?;
                let elem = match base_value.ty.pointee() {
                    Some(elem) => elem.clone(),
                    None => {
                        return Err(SemanticError::new(
                            format!(
                                "subscripted value of type '{}' is not a pointer",
                                base_value.ty
                            ),
                            base.span,
                        ))
                    }
                };
                let size = slot_size(&elem, self.scope.target.pointer_bytes()).ok_or_else(|| {
                    SemanticError::new(
                        format!("subscript of pointer to incomplete type '{elem}'"),
                        base.span,
                    )
                })?;
                let index_value = self.expr(index)?;
                if !index_value.ty.is_integer() {
                    return Err(SemanticError::new("array subscript is not an integer", index.span));
                }
                let addr = self.offset_pointer(base_value.value, index_value, size, false);
                Ok(Place::Memory {
                    addr,
                    offset: 0,
                    ty: elem,
                    flags: MemFlags::new(),
                })
            }
            _ => Err(SemanticError::new("expression is not assignable", expr.span)),
        }
    }

    fn load(&mut self, place: &Place) -> Typed {
        match place {
            Place::Var(var, ty) => Typed {
                value: self.builder.use_var(*var),
                ty: ty.clone(),
            },
            Place::Memory {
                addr,
                offset,
                ty,
                flags,
            } => {
                let cl = cl_type(ty, self.scope.target).unwrap_or(types::I64);
                Typed {
                    value: self.builder.ins().load(cl, *flags, *addr, *offset),
                    ty: ty.clone(),
                }
            }
        }
    }

    fn store(&mut self, place: &Place, value: Value) {
        match place {
            Place::Var(var, _) => self.builder.def_var(*var, value),
            Place::Memory {
                addr,
                offset,
                flags,
                ..
            } => {
                self.builder.ins().store(*flags, value, *addr, *offset);
            }
        }
    }

    /// `base + index * size`, or minus when `negate` is set.
    fn offset_pointer(&mut self, base: Value, index: Typed, size: i64, negate: bool) -> Value {
        let ptr_ty = self.scope.target.pointer_type;
        let index = self.convert(index, &CType::Long);
        let index = if ptr_ty == types::I64 {
            index
        } else {
            self.builder.ins().ireduce(ptr_ty, index)
        };
        let scaled = self.builder.ins().imul_imm(index, size);
        if negate {
            self.builder.ins().isub(base, scaled)
        } else {
            self.builder.ins().iadd(base, scaled)
        }
    }

    // ==================== Conversions ====================

    /// Converts between scalar types without checking the conversion is allowed.
    fn convert(&mut self, typed: Typed, to: &CType) -> Value {
        let from_cl = cl_type(&typed.ty, self.scope.target).unwrap_or(types::I64);
        let to_cl = match cl_type(to, self.scope.target) {
            Some(cl) => cl,
            None => return typed.value,
        };
        if from_cl == to_cl {
            return typed.value;
        }
        let ins = self.builder.ins();
        match (from_cl, to_cl) {
            (types::F64, int) => ins.fcvt_to_sint_sat(int, typed.value),
            (_, types::F64) => ins.fcvt_from_sint(types::F64, typed.value),
            (from, to) if from.bits() < to.bits() => ins.sextend(to, typed.value),
            (_, to) => ins.ireduce(to, typed.value),
        }
    }

    /// Implicit conversion on assignment, argument passing and return.
    pub(super) fn coerce(
        &mut self,
        typed: Typed,
        to: &CType,
        source: &Expr,
        context: &str,
    ) -> CodegenResult<Value> {
        let allowed = match (&typed.ty, to) {
            (from, to) if from.is_arithmetic() && to.is_arithmetic() => true,
            (from, to) if from.is_pointer() && to.is_pointer() => true,
            (from, to) if from.is_integer() && to.is_pointer() => source.is_null_constant(),
            _ => false,
        };
        if !allowed {
            return Err(SemanticError::new(
                format!(
                    "incompatible type {context} '{}' from '{}'",
                    to, typed.ty
                ),
                source.span,
            ));
        }
        Ok(self.convert(typed, to))
    }

    fn cast(&mut self, typed: Typed, to: &CType, expr: &Expr) -> CodegenResult<Typed> {
        let allowed = match (&typed.ty, to) {
            (from, to) if from.is_arithmetic() && to.is_arithmetic() => true,
            (from, to) if from.is_pointer() && (to.is_pointer() || to.is_integer()) => true,
            (from, to) if from.is_integer() && to.is_pointer() => true,
            _ => false,
        };
        if !allowed {
            return Err(SemanticError::new(
                format!("cannot cast '{}' to '{}'", typed.ty, to),
                expr.span,
            ));
        }
        Ok(Typed {
            value: self.convert(typed, to),
            ty: to.clone(),
        })
    }

    /// Branch condition: nonzero for integers and pointers, `!= 0.0` for doubles.
    pub(super) fn condition(&mut self, expr: &Expr) -> CodegenResult<Value> {
        let typed = self.expr(expr)?;
        if typed.ty == CType::Double {
            let zero = self.builder.ins().f64const(0.0);
            Ok(self.builder.ins().fcmp(FloatCC::NotEqual, typed.value, zero))
        } else {
            Ok(typed.value)
        }
    }

    /// 0 or 1 as `int`.
    fn truth_value(&mut self, typed: Typed, negate: bool) -> Value {
        let flag = if typed.ty == CType::Double {
            let zero = self.builder.ins().f64const(0.0);
            let cc = if negate { FloatCC::Equal } else { FloatCC::NotEqual };
            self.builder.ins().fcmp(cc, typed.value, zero)
        } else {
            let cc = if negate { IntCC::Equal } else { IntCC::NotEqual };
            self.builder.ins().icmp_imm(cc, typed.value, 0)
        };
        self.builder.ins().uextend(types::I32, flag)
    }

    // ==================== Operators ====================

    fn unary(&mut self, op: UnaryOp, operand: &Expr) -> CodegenResult<Typed> {
        let typed = self.expr(operand)?;
        match op {
            UnaryOp::Not => Ok(Typed {
                value: self.truth_value(typed, true),
                ty: CType::Int,
            }),
            UnaryOp::Neg => {
                let value = match typed.ty {
                    CType::Double => self.builder.ins().fneg(typed.value),
                    CType::Int | CType::Long => self.builder.ins().ineg(typed.value),
                    _ => {
                        return Err(SemanticError::new(
                            format!("invalid argument type '{}' to unary expression", typed.ty),
                            operand.span,
                        ))
                    }
                };
                Ok(Typed {
                    value,
                    ty: typed.ty,
                })
            }
        }
    }

    fn short_circuit(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> CodegenResult<Typed> {
        let left = self.expr(lhs)?;
        let left = self.truth_value(left, false);

        let rhs_block = self.builder.create_block();
        let merge = self.builder.create_block();
        self.builder.append_block_param(merge, types::I32);

        if op == BinaryOp::And {
            self.builder
                .ins()
                .brif(left, rhs_block, &[], merge, &[left]);
        } else {
            self.builder
                .ins()
                .brif(left, merge, &[left], rhs_block, &[]);
        }

        self.builder.switch_to_block(rhs_block);
        let right = self.expr(rhs)?;
        let right = self.truth_value(right, false);
        self.builder.ins().jump(merge, &[right]);

        self.builder.switch_to_block(merge);
        Ok(Typed {
            value: self.builder.block_params(merge)[0],
            ty: CType::Int,
        })
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        l: Typed,
        r: Typed,
        lhs: &Expr,
        rhs: &Expr,
        expr: &Expr,
    ) -> CodegenResult<Typed> {
        let invalid = |l: &Typed, r: &Typed| {
            SemanticError::new(
                format!(
                    "invalid operands to binary expression ('{}' {op} '{}')",
                    l.ty, r.ty
                ),
                expr.span,
            )
        };

        if op.is_comparison() {
            let message = format!("comparison between '{}' and '{}'", l.ty, r.ty);
            return self
                .compare(op, l, r, lhs, rhs)
                .ok_or_else(|| SemanticError::new(message, expr.span));
        }

        // Pointer arithmetic: p + n, n + p, p - n, p - q
        match (op, l.ty.is_pointer(), r.ty.is_pointer()) {
            (BinaryOp::Add | BinaryOp::Sub, true, false) | (BinaryOp::Add, false, true) => {
                let (ptr, index) = if l.ty.is_pointer() { (l, r) } else { (r, l) };
                if !index.ty.is_integer() {
                    return Err(invalid(&ptr, &index));
                }
                let size = ptr
                    .ty
                    .pointee()
                    .and_then(|elem| slot_size(elem, self.scope.target.pointer_bytes()))
                    .ok_or_else(|| invalid(&ptr, &index))?;
                let value = self.offset_pointer(ptr.value, index, size, op == BinaryOp::Sub);
                return Ok(Typed { value, ty: ptr.ty });
            }
            (BinaryOp::Sub, true, true) => {
                let size = l
                    .ty
                    .pointee()
                    .and_then(|elem| slot_size(elem, self.scope.target.pointer_bytes()))
                    .ok_or_else(|| invalid(&l, &r))?;
                let bytes = self.builder.ins().isub(l.value, r.value);
                let bytes = self.convert(
                    Typed {
                        value: bytes,
                        ty: l.ty.clone(),
                    },
                    &CType::Long,
                );
                let value = self.builder.ins().sdiv_imm(bytes, size);
                return Ok(Typed {
                    value,
                    ty: CType::Long,
                });
            }
            _ => {}
        }

        if !l.ty.is_arithmetic() || !r.ty.is_arithmetic() {
            return Err(invalid(&l, &r));
        }
        if op == BinaryOp::Rem && (!l.ty.is_integer() || !r.ty.is_integer()) {
            return Err(invalid(&l, &r));
        }

        let ty = common_type(&l.ty, &r.ty);
        let a = self.convert(l, &ty);
        let b = self.convert(r, &ty);
        let ins = self.builder.ins();
        let value = if ty == CType::Double {
            match op {
                BinaryOp::Add => ins.fadd(a, b),
                BinaryOp::Sub => ins.fsub(a, b),
                BinaryOp::Mul => ins.fmul(a, b),
                _ => ins.fdiv(a, b),
            }
        } else {
            match op {
                BinaryOp::Add => ins.iadd(a, b),
                BinaryOp::Sub => ins.isub(a, b),
                BinaryOp::Mul => ins.imul(a, b),
                BinaryOp::Div => ins.sdiv(a, b),
                _ => ins.srem(a, b),
            }
        };
        Ok(Typed { value, ty })
    }

    /// `None` when the operands cannot be compared.
    fn compare(
        &mut self,
        op: BinaryOp,
        l: Typed,
        r: Typed,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Option<Typed> {
        let pointers = match (l.ty.is_pointer(), r.ty.is_pointer()) {
            (true, true) => true,
            (true, false) => rhs.is_null_constant(),
            (false, true) => lhs.is_null_constant(),
            (false, false) => false,
        };
        let flag = if pointers {
            let a = self.convert(l, &CType::pointer_to(CType::Void));
            let b = self.convert(r, &CType::pointer_to(CType::Void));
            let cc = match op {
                BinaryOp::Lt => IntCC::UnsignedLessThan,
                BinaryOp::Le => IntCC::UnsignedLessThanOrEqual,
                BinaryOp::Gt => IntCC::UnsignedGreaterThan,
                BinaryOp::Ge => IntCC::UnsignedGreaterThanOrEqual,
                BinaryOp::Eq => IntCC::Equal,
                _ => IntCC::NotEqual,
            };
            self.builder.ins().icmp(cc, a, b)
        } else if l.ty.is_arithmetic() && r.ty.is_arithmetic() {
            let ty = common_type(&l.ty, &r.ty);
            let a = self.convert(l, &ty);
            let b = self.convert(r, &ty);
            if ty == CType::Double {
                let cc = match op {
                    BinaryOp::Lt => FloatCC::LessThan,
                    BinaryOp::Le => FloatCC::LessThanOrEqual,
                    BinaryOp::Gt => FloatCC::GreaterThan,
                    BinaryOp::Ge => FloatCC::GreaterThanOrEqual,
                    BinaryOp::Eq => FloatCC::Equal,
                    _ => FloatCC::NotEqual,
                };
                self.builder.ins().fcmp(cc, a, b)
            } else {
                let cc = match op {
                    BinaryOp::Lt => IntCC::SignedLessThan,
                    BinaryOp::Le => IntCC::SignedLessThanOrEqual,
                    BinaryOp::Gt => IntCC::SignedGreaterThan,
                    BinaryOp::Ge => IntCC::SignedGreaterThanOrEqual,
                    BinaryOp::Eq => IntCC::Equal,
                    _ => IntCC::NotEqual,
                };
                self.builder.ins().icmp(cc, a, b)
            }
        } else {
            return None;
        };
        let value = self.builder.ins().uextend(types::I32, flag);
        Some(Typed {
            value,
            ty: CType::Int,
        })
    }

    fn assign(&mut self, op: AssignOp, target: &Expr, value: &Expr) -> CodegenResult<Typed> {
        let place = self.place(target)?;
        let ty = place.ty().clone();
        let new_value = match op {
            AssignOp::Assign => {
                let typed = self.expr(value)?;
                self.coerce(typed, &ty, value, "assigning to")?
            }
            AssignOp::Compound(op) => {
                let current = self.load(&place);
                let rhs = self.expr(value)?;
                let result = self.binary(op, current, rhs, target, value, value)?;
                self.coerce(result, &ty, value, "assigning to")?
            }
        };
        self.store(&place, new_value);
        Ok(Typed {
            value: new_value,
            ty,
        })
    }

    fn inc_dec(&mut self, target: &Expr, increment: bool, prefix: bool) -> CodegenResult<Typed> {
        let place = self.place(target)?;
        let old = self.load(&place);
        let ty = old.ty.clone();
        let new_value = match &ty {
            CType::Int | CType::Long => {
                let delta = if increment { 1 } else { -1 };
                self.builder.ins().iadd_imm(old.value, delta)
            }
            CType::Double => {
                let one = self.builder.ins().f64const(1.0);
                if increment {
                    self.builder.ins().fadd(old.value, one)
                } else {
                    self.builder.ins().fsub(old.value, one)
                }
            }
            CType::Pointer(elem) => {
                let size = slot_size(elem, self.scope.target.pointer_bytes()).ok_or_else(|| {
                    SemanticError::new(
                        format!("arithmetic on pointer to incomplete type '{elem}'"),
                        target.span,
                    )
                })?;
                let delta = if increment { size } else { -size };
                self.builder.ins().iadd_imm(old.value, delta)
            }
            _ => {
                return Err(SemanticError::new(
                    format!("cannot increment value of type '{ty}'"),
                    target.span,
                ))
            }
        };
        self.store(&place, new_value);
        let value = if prefix { new_value } else { old.value };
        Ok(Typed { value, ty })
    }

    // ==================== Calls ====================

    fn call(&mut self, callee: &str, args: &[Expr], expr: &Expr) -> CodegenResult<Option<Typed>> {
        let index = self.scope.lookup(callee).ok_or_else(|| {
            SemanticError::new(
                format!("call to undeclared function '{callee}'"),
                expr.span,
            )
        })?;
        let c_sig = self.scope.c_sigs[index].clone();
        if args.len() != c_sig.params.len() {
            let which = if args.len() < c_sig.params.len() {
                "few"
            } else {
                "many"
            };
            return Err(SemanticError::new(
                format!(
                    "too {which} arguments to function call, expected {}, have {}",
                    c_sig.params.len(),
                    args.len()
                ),
                expr.span,
            ));
        }

        let mut values = Vec::with_capacity(args.len());
        for (i, (arg, param)) in args.iter().zip(&c_sig.params).enumerate() {
            let typed = self.expr(arg)?;
            let context = format!("passing argument {} to '{callee}' as", i + 1);
            values.push(self.coerce(typed, param, arg, &context)?);
        }

        let func_ref = self.func_ref(index);
        let inst = self.builder.ins().call(func_ref, &values);
        if c_sig.ret == CType::Void {
            return Ok(None);
        }
        let value = self.builder.inst_results(inst)[0];
        Ok(Some(Typed {
            value,
            ty: c_sig.ret,
        }))
    }

    /// Allocates an invokable and fills its header.
    ///
    /// Evaluates to null when allocation fails.
    fn new_invokable(&mut self, name: &str, expr: &Expr) -> CodegenResult<Typed> {
        let scope = self.scope;
        let layout = scope.invokables.get(name).ok_or_else(|| {
            SemanticError::new(format!("unknown invokable '{name}'"), expr.span)
        })?;
        let alloc = scope.lookup(ALLOC_SYMBOL).ok_or_else(|| {
            SemanticError::new(format!("'{ALLOC_SYMBOL}' is not declared"), expr.span)
        })?;
        let ptr_ty = scope.target.pointer_type;
        let ptr_bytes = scope.target.pointer_bytes() as i32;

        let alloc_ref = self.func_ref(alloc);
        let size = self.builder.ins().iconst(types::I64, layout.size);
        let inst = self.builder.ins().call(alloc_ref, &[size]);
        let object = self.builder.inst_results(inst)[0];

        let fill = self.builder.create_block();
        let done = self.builder.create_block();
        self.builder.append_block_param(done, ptr_ty);
        self.builder.ins().brif(object, fill, &[], done, &[object]);

        self.builder.switch_to_block(fill);
        for (slot, decl) in layout.table.iter().enumerate() {
            let func_ref = self.func_ref(*decl);
            let addr = self.builder.ins().func_addr(ptr_ty, func_ref);
            self.builder
                .ins()
                .store(MemFlags::trusted(), addr, object, slot as i32 * ptr_bytes);
        }
        self.builder.ins().jump(done, &[object]);

        self.builder.switch_to_block(done);
        Ok(Typed {
            value: self.builder.block_params(done)[0],
            ty: CType::pointer_to(CType::Struct(name.to_string())),
        })
    }
}
