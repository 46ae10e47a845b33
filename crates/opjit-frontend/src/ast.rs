//! Syntax tree for the C dialect.

use std::fmt;

use crate::lexer::Span;

/// Name of the predeclared opaque host context type.
pub const CONTEXT_TYPE: &str = "Context";

/// Name of the predeclared opaque invokable type.
pub const INVOKABLE_TYPE: &str = "Invokable";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CType {
    Void,
    Int,
    Long,
    Double,
    /// Opaque struct, usable only behind a pointer.
    Struct(String),
    Pointer(Box<CType>),
}

impl CType {
    pub fn pointer_to(inner: CType) -> Self {
        CType::Pointer(Box::new(inner))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, CType::Int | CType::Long)
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(self, CType::Int | CType::Long | CType::Double)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, CType::Pointer(_))
    }

    /// True for types a value can have: arithmetic types and pointers.
    pub fn is_scalar(&self) -> bool {
        self.is_arithmetic() || self.is_pointer()
    }

    pub fn pointee(&self) -> Option<&CType> {
        match self {
            CType::Pointer(inner) => Some(inner),
            _ => None,
        }
    }
}

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CType::Void => write!(f, "void"),
            CType::Int => write!(f, "int"),
            CType::Long => write!(f, "long"),
            CType::Double => write!(f, "double"),
            CType::Struct(name) => write!(f, "struct {name}"),
            CType::Pointer(inner) => write!(f, "{inner}*"),
        }
    }
}

/// A parsed compilation unit.
#[derive(Debug, Clone, Default)]
pub struct TranslationUnit {
    pub items: Vec<Item>,
}

#[derive(Debug, Clone)]
pub enum Item {
    Prototype(Prototype),
    Function(FunctionDef),
    Struct(String, Span),
    Invokable(InvokableDef),
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: Option<String>,
    pub ty: CType,
    pub span: Span,
}

/// Function declarator: return type, name and parameters.
#[derive(Debug, Clone)]
pub struct Prototype {
    pub name: String,
    pub ret: CType,
    pub params: Vec<Param>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub proto: Prototype,
    pub is_static: bool,
    pub body: Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    Init,
    Poll,
    Release,
}

impl MethodKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "init" => Some(MethodKind::Init),
            "poll" => Some(MethodKind::Poll),
            "release" => Some(MethodKind::Release),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MethodKind::Init => "init",
            MethodKind::Poll => "poll",
            MethodKind::Release => "release",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub ty: CType,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Method {
    pub kind: MethodKind,
    pub proto: Prototype,
    pub body: Block,
}

/// `invokable Name { fields; methods };`
#[derive(Debug, Clone)]
pub struct InvokableDef {
    pub name: String,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<Method>,
    pub span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Decl {
        ty: CType,
        name: String,
        init: Option<Expr>,
        span: Span,
    },
    Expr(Expr),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    Break(Span),
    Continue(Span),
    Return(Option<Expr>, Span),
    Block(Block),
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        f.write_str(s)
    }
}

/// `=` or a compound assignment; compound forms carry their arithmetic op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Compound(BinaryOp),
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Integer constant zero, the only integer convertible to a pointer implicitly.
    pub fn is_null_constant(&self) -> bool {
        matches!(self.kind, ExprKind::IntLit { value: 0, .. })
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    IntLit { value: i64, long: bool },
    FloatLit(f64),
    Ident(String),
    Call { callee: String, args: Vec<Expr> },
    Index { base: Box<Expr>, index: Box<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Cast { ty: CType, operand: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Assign { op: AssignOp, target: Box<Expr>, value: Box<Expr> },
    IncDec { target: Box<Expr>, increment: bool, prefix: bool },
    New(String),
}
