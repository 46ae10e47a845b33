//! Parser for the C dialect
//!
//! A recursive-descent parser with a precedence-climbing expression core.
//! Errors inside one top-level item are recorded and parsing resumes at the
//! next item, so a unit reports every broken declaration at once.
//!
//! # Example
//!
//! ```
//! use opjit_frontend::parser::Parser;
//!
//! let unit = Parser::parse_source("int entry(Context* c) { return 42; }").unwrap();
//! assert_eq!(unit.items.len(), 1);
//! ```

mod error;

pub use error::{ParseError, ParseErrorKind};

use std::collections::HashSet;

use crate::ast::{
    AssignOp, BinaryOp, Block, CType, Expr, ExprKind, FieldDecl, FunctionDef, InvokableDef, Item,
    Method, MethodKind, Param, Prototype, Stmt, TranslationUnit, UnaryOp, CONTEXT_TYPE,
    INVOKABLE_TYPE,
};
use crate::lexer::{self, Token, TokenKind};

pub type ParseResult<T> = Result<T, ParseError>;

/// Deepest statement or expression nesting accepted. Code generation walks
/// the tree recursively, so this also bounds its stack use.
pub const MAX_NESTING_DEPTH: u32 = 256;

/// Failure to turn source text into a syntax tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SyntaxErrors {
    Lex(Vec<lexer::SpannedError>),
    Parse(Vec<ParseError>),
}

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    errors: Vec<ParseError>,
    /// Identifiers that name types: the predeclared opaque types, declared
    /// structs and invokables.
    type_names: HashSet<String>,
    depth: u32,
}

impl Parser {
    /// Creates a parser over an already lexed token stream ending in `Eof`.
    #[must_use]
    pub fn new(tokens: Vec<Token>) -> Self {
        let type_names = [CONTEXT_TYPE, INVOKABLE_TYPE]
            .into_iter()
            .map(String::from)
            .collect();
        Self {
            tokens,
            position: 0,
            errors: Vec::new(),
            type_names,
            depth: 0,
        }
    }

    /// Lexes and parses `source` with the given macro definitions.
    pub fn parse_with_defines(
        source: &str,
        defines: &[(String, String)],
    ) -> Result<TranslationUnit, SyntaxErrors> {
        let tokens = lexer::tokenize_with_defines(source, defines).map_err(SyntaxErrors::Lex)?;
        Parser::new(tokens)
            .translation_unit()
            .map_err(SyntaxErrors::Parse)
    }

    /// Lexes and parses `source`.
    pub fn parse_source(source: &str) -> Result<TranslationUnit, SyntaxErrors> {
        Self::parse_with_defines(source, &[])
    }

    /// Parses a whole unit, collecting one error per broken item.
    pub fn translation_unit(mut self) -> Result<TranslationUnit, Vec<ParseError>> {
        let mut items = Vec::new();
        while !self.check(TokenKind::Eof) {
            let item_start = self.position;
            match self.item() {
                Ok(Some(item)) => items.push(item),
                Ok(None) => {}
                Err(e) => {
                    self.errors.push(e);
                    self.position = item_start;
                    self.synchronize();
                }
            }
        }
        if self.errors.is_empty() {
            Ok(TranslationUnit { items })
        } else {
            Err(self.errors)
        }
    }

    // ==================== Token helpers ====================

    fn current(&self) -> &Token {
        // The stream always ends with Eof, and the parser never moves past it.
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn current_kind(&self) -> TokenKind {
        self.current().kind
    }

    fn peek_kind(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.position + offset)
            .map_or(TokenKind::Eof, |t| t.kind)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if token.kind != TokenKind::Eof {
            self.position += 1;
        }
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current_kind() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn descend(&mut self) -> ParseResult<()> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ParseError::new(
                ParseErrorKind::NestingTooDeep(MAX_NESTING_DEPTH),
                self.current().span,
            ));
        }
        self.depth += 1;
        Ok(())
    }

    /// Runs `parse` one nesting level deeper.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        self.descend()?;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn expect_after(
        &mut self,
        kind: TokenKind,
        expected: &'static str,
        context: &'static str,
    ) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(ParseError::new(
                ParseErrorKind::ExpectedAfter { expected, context },
                self.current().span,
            ))
        }
    }

    fn expect_ident(&mut self) -> ParseResult<Token> {
        self.expect(TokenKind::Ident, "identifier")
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        ParseError::new(
            ParseErrorKind::UnexpectedToken {
                found: self.current_kind(),
                expected,
            },
            self.current().span,
        )
    }

    /// Skips from the start of a broken item to just past its end.
    fn synchronize(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.current_kind() {
                TokenKind::Eof => return,
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        self.advance();
                        self.eat(TokenKind::Semicolon);
                        return;
                    }
                }
                TokenKind::Semicolon if depth == 0 => {
                    self.advance();
                    return;
                }
                _ => {}
            }
            self.advance();
        }
    }

    // ==================== Items ====================

    fn item(&mut self) -> ParseResult<Option<Item>> {
        match self.current_kind() {
            TokenKind::Semicolon => {
                self.advance();
                Ok(None)
            }
            TokenKind::Invokable => self.invokable_item().map(|def| Some(Item::Invokable(def))),
            TokenKind::Struct
                if self.peek_kind(1) == TokenKind::Ident
                    && self.peek_kind(2) == TokenKind::Semicolon =>
            {
                self.advance();
                let name = self.advance();
                self.advance();
                self.type_names.insert(name.lexeme.clone());
                Ok(Some(Item::Struct(name.lexeme, name.span)))
            }
            _ => self.function_item().map(Some),
        }
    }

    fn function_item(&mut self) -> ParseResult<Item> {
        let mut is_static = false;
        loop {
            if self.eat(TokenKind::Static).is_some() {
                is_static = true;
            } else if self.eat(TokenKind::Extern).is_some() {
                if let Some(lang) = self.eat(TokenKind::StringLit) {
                    if lang.lexeme != "\"C\"" && lang.lexeme != "\"C++\"" {
                        return Err(ParseError::new(
                            ParseErrorKind::UnknownLinkage(lang.lexeme),
                            lang.span,
                        ));
                    }
                }
            } else {
                break;
            }
        }

        let proto = self.prototype()?;
        if self.eat(TokenKind::Semicolon).is_some() {
            return Ok(Item::Prototype(proto));
        }
        if !self.check(TokenKind::LBrace) {
            return Err(self.unexpected("';' or function body"));
        }
        let body = self.block()?;
        Ok(Item::Function(FunctionDef {
            proto,
            is_static,
            body,
        }))
    }

    fn prototype(&mut self) -> ParseResult<Prototype> {
        let start = self.current().span;
        let ret = self.parse_type()?;
        let name = self.expect_ident()?;
        let params = self.param_list()?;
        Ok(Prototype {
            name: name.lexeme,
            ret,
            params,
            span: start.merge(name.span),
        })
    }

    fn param_list(&mut self) -> ParseResult<Vec<Param>> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if self.check(TokenKind::Void) && self.peek_kind(1) == TokenKind::RParen {
            self.advance();
        }
        if self.eat(TokenKind::RParen).is_some() {
            return Ok(params);
        }
        loop {
            let start = self.current().span;
            let ty = self.parse_type()?;
            let name = self.eat(TokenKind::Ident);
            let span = name.as_ref().map_or(start, |n| start.merge(n.span));
            params.push(Param {
                name: name.map(|n| n.lexeme),
                ty,
                span,
            });
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect_after(TokenKind::RParen, ")", "parameter list")?;
        Ok(params)
    }

    fn invokable_item(&mut self) -> ParseResult<InvokableDef> {
        let start = self.advance().span;
        let name = self.expect_ident()?;
        self.type_names.insert(name.lexeme.clone());
        self.expect(TokenKind::LBrace, "'{'")?;

        let mut fields = Vec::new();
        let mut methods: Vec<Method> = Vec::new();
        while !self.check(TokenKind::RBrace) {
            if self.check(TokenKind::Eof) {
                return Err(self.unexpected("'}'"));
            }
            let member_start = self.current().span;
            let ty = self.parse_type()?;
            let member = self.expect_ident()?;
            if self.check(TokenKind::LParen) {
                let kind = MethodKind::from_name(&member.lexeme).ok_or_else(|| {
                    ParseError::new(
                        ParseErrorKind::UnknownMethod(member.lexeme.clone()),
                        member.span,
                    )
                    .with_hint("invokables define init, poll and release")
                })?;
                if methods.iter().any(|m| m.kind == kind) {
                    return Err(ParseError::new(
                        ParseErrorKind::Redefinition(member.lexeme),
                        member.span,
                    ));
                }
                let params = self.param_list()?;
                let body = self.block()?;
                methods.push(Method {
                    kind,
                    proto: Prototype {
                        name: member.lexeme,
                        ret: ty,
                        params,
                        span: member_start.merge(member.span),
                    },
                    body,
                });
            } else {
                self.expect_after(TokenKind::Semicolon, ";", "field declaration")?;
                if fields.iter().any(|f: &FieldDecl| f.name == member.lexeme) {
                    return Err(ParseError::new(
                        ParseErrorKind::Redefinition(member.lexeme),
                        member.span,
                    ));
                }
                fields.push(FieldDecl {
                    name: member.lexeme,
                    ty,
                    span: member_start.merge(member.span),
                });
            }
        }
        let end = self.advance().span;
        self.eat(TokenKind::Semicolon);

        Ok(InvokableDef {
            name: name.lexeme,
            fields,
            methods,
            span: start.merge(end),
        })
    }

    // ==================== Types ====================

    fn starts_type(&self) -> bool {
        let token = self.current();
        token.kind.starts_type()
            || (token.kind == TokenKind::Ident && self.type_names.contains(&token.lexeme))
    }

    fn parse_type(&mut self) -> ParseResult<CType> {
        while self.eat(TokenKind::Const).is_some() {}

        let token = self.advance();
        let mut ty = match token.kind {
            TokenKind::Void => CType::Void,
            TokenKind::Int => CType::Int,
            TokenKind::Double => CType::Double,
            TokenKind::Long => {
                // long, long int, long long
                if self.eat(TokenKind::Long).is_none() {
                    self.eat(TokenKind::Int);
                }
                CType::Long
            }
            TokenKind::Struct => {
                let name = self.expect_ident()?;
                CType::Struct(name.lexeme)
            }
            TokenKind::Ident if self.type_names.contains(&token.lexeme) => {
                CType::Struct(token.lexeme)
            }
            found => {
                return Err(ParseError::new(
                    ParseErrorKind::ExpectedType(found),
                    token.span,
                ))
            }
        };

        loop {
            if self.eat(TokenKind::Star).is_some() {
                ty = CType::pointer_to(ty);
            } else if self.eat(TokenKind::Const).is_none() {
                break;
            }
        }
        Ok(ty)
    }

    // ==================== Statements ====================

    fn block(&mut self) -> ParseResult<Block> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.check(TokenKind::RBrace) {
            if self.check(TokenKind::Eof) {
                return Err(self.unexpected("'}'"));
            }
            stmts.push(self.statement()?);
        }
        self.advance();
        Ok(Block { stmts })
    }

    fn statement(&mut self) -> ParseResult<Stmt> {
        self.nested(Self::statement_inner)
    }

    fn statement_inner(&mut self) -> ParseResult<Stmt> {
        match self.current_kind() {
            TokenKind::LBrace => Ok(Stmt::Block(self.block()?)),
            TokenKind::Semicolon => {
                self.advance();
                Ok(Stmt::Empty)
            }
            TokenKind::If => self.if_stmt(),
            TokenKind::While => self.while_stmt(),
            TokenKind::For => self.for_stmt(),
            TokenKind::Break => {
                let span = self.advance().span;
                self.expect_after(TokenKind::Semicolon, ";", "'break'")?;
                Ok(Stmt::Break(span))
            }
            TokenKind::Continue => {
                let span = self.advance().span;
                self.expect_after(TokenKind::Semicolon, ";", "'continue'")?;
                Ok(Stmt::Continue(span))
            }
            TokenKind::Return => {
                let span = self.advance().span;
                let value = if self.check(TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.expect_after(TokenKind::Semicolon, ";", "return statement")?;
                Ok(Stmt::Return(value, span))
            }
            _ if self.starts_type() => {
                let decl = self.declaration()?;
                self.expect_after(TokenKind::Semicolon, ";", "declaration")?;
                Ok(decl)
            }
            _ => {
                let expr = self.expression()?;
                self.expect_after(TokenKind::Semicolon, ";", "expression")?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn declaration(&mut self) -> ParseResult<Stmt> {
        let start = self.current().span;
        let ty = self.parse_type()?;
        let name = self.expect_ident()?;
        let init = if self.eat(TokenKind::Assign).is_some() {
            Some(self.expression()?)
        } else {
            None
        };
        Ok(Stmt::Decl {
            ty,
            name: name.lexeme,
            init,
            span: start.merge(name.span),
        })
    }

    fn if_stmt(&mut self) -> ParseResult<Stmt> {
        self.advance();
        self.expect_after(TokenKind::LParen, "(", "'if'")?;
        let cond = self.expression()?;
        self.expect_after(TokenKind::RParen, ")", "condition")?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.eat(TokenKind::Else).is_some() {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn while_stmt(&mut self) -> ParseResult<Stmt> {
        self.advance();
        self.expect_after(TokenKind::LParen, "(", "'while'")?;
        let cond = self.expression()?;
        self.expect_after(TokenKind::RParen, ")", "condition")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::While { cond, body })
    }

    fn for_stmt(&mut self) -> ParseResult<Stmt> {
        self.advance();
        self.expect_after(TokenKind::LParen, "(", "'for'")?;

        let init = if self.eat(TokenKind::Semicolon).is_some() {
            None
        } else {
            let init = if self.starts_type() {
                self.declaration()?
            } else {
                Stmt::Expr(self.expression()?)
            };
            self.expect_after(TokenKind::Semicolon, ";", "for initializer")?;
            Some(Box::new(init))
        };

        let cond = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_after(TokenKind::Semicolon, ";", "for condition")?;

        let step = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_after(TokenKind::RParen, ")", "for clauses")?;

        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
        })
    }

    // ==================== Expressions ====================

    pub fn expression(&mut self) -> ParseResult<Expr> {
        self.nested(Self::assignment)
    }

    fn assignment(&mut self) -> ParseResult<Expr> {
        let target = self.parse_precedence(0)?;

        let op = match self.current_kind() {
            TokenKind::Assign => AssignOp::Assign,
            TokenKind::PlusAssign => AssignOp::Compound(BinaryOp::Add),
            TokenKind::MinusAssign => AssignOp::Compound(BinaryOp::Sub),
            TokenKind::StarAssign => AssignOp::Compound(BinaryOp::Mul),
            TokenKind::SlashAssign => AssignOp::Compound(BinaryOp::Div),
            _ => return Ok(target),
        };
        let op_span = self.advance().span;
        if !is_lvalue(&target) {
            return Err(ParseError::new(
                ParseErrorKind::InvalidAssignmentTarget,
                target.span.merge(op_span),
            ));
        }
        // Right associative: a = b = c
        let value = self.expression()?;
        let span = target.span.merge(value.span);
        Ok(Expr::new(
            ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            span,
        ))
    }

    fn parse_precedence(&mut self, min_prec: u8) -> ParseResult<Expr> {
        // Every folded operator deepens the left spine of the tree.
        let entry_depth = self.depth;
        let result = self.binary_chain(min_prec);
        self.depth = entry_depth;
        result
    }

    fn binary_chain(&mut self, min_prec: u8) -> ParseResult<Expr> {
        let mut left = self.prefix_expr()?;

        while let Some((op, prec)) = self.infix_op() {
            if prec < min_prec {
                break;
            }
            self.descend()?;
            self.advance();
            let right = self.parse_precedence(prec + 1)?;
            let span = left.span.merge(right.span);
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(left),
                    rhs: Box::new(right),
                },
                span,
            );
        }

        Ok(left)
    }

    fn infix_op(&self) -> Option<(BinaryOp, u8)> {
        let entry = match self.current_kind() {
            TokenKind::OrOr => (BinaryOp::Or, 1),
            TokenKind::AndAnd => (BinaryOp::And, 2),
            TokenKind::EqEq => (BinaryOp::Eq, 3),
            TokenKind::NotEq => (BinaryOp::Ne, 3),
            TokenKind::Lt => (BinaryOp::Lt, 4),
            TokenKind::Le => (BinaryOp::Le, 4),
            TokenKind::Gt => (BinaryOp::Gt, 4),
            TokenKind::Ge => (BinaryOp::Ge, 4),
            TokenKind::Plus => (BinaryOp::Add, 5),
            TokenKind::Minus => (BinaryOp::Sub, 5),
            TokenKind::Star => (BinaryOp::Mul, 6),
            TokenKind::Slash => (BinaryOp::Div, 6),
            TokenKind::Percent => (BinaryOp::Rem, 6),
            _ => return None,
        };
        Some(entry)
    }

    fn prefix_expr(&mut self) -> ParseResult<Expr> {
        self.nested(Self::unary)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        match self.current_kind() {
            TokenKind::Minus | TokenKind::Bang => {
                let op_token = self.advance();
                let op = if op_token.kind == TokenKind::Minus {
                    UnaryOp::Neg
                } else {
                    UnaryOp::Not
                };
                let operand = self.prefix_expr()?;
                let span = op_token.span.merge(operand.span);
                Ok(Expr::new(
                    ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    span,
                ))
            }
            TokenKind::Plus => {
                self.advance();
                self.prefix_expr()
            }
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let op_token = self.advance();
                let target = self.prefix_expr()?;
                if !is_lvalue(&target) {
                    return Err(ParseError::new(
                        ParseErrorKind::InvalidAssignmentTarget,
                        target.span,
                    ));
                }
                let span = op_token.span.merge(target.span);
                Ok(Expr::new(
                    ExprKind::IncDec {
                        target: Box::new(target),
                        increment: op_token.kind == TokenKind::PlusPlus,
                        prefix: true,
                    },
                    span,
                ))
            }
            TokenKind::LParen if self.is_cast() => {
                let start = self.advance().span;
                let ty = self.parse_type()?;
                self.expect_after(TokenKind::RParen, ")", "cast type")?;
                let operand = self.prefix_expr()?;
                let span = start.merge(operand.span);
                Ok(Expr::new(
                    ExprKind::Cast {
                        ty,
                        operand: Box::new(operand),
                    },
                    span,
                ))
            }
            _ => self.postfix_expr(),
        }
    }

    fn is_cast(&self) -> bool {
        let next = match self.tokens.get(self.position + 1) {
            Some(token) => token,
            None => return false,
        };
        next.kind.starts_type()
            || (next.kind == TokenKind::Ident && self.type_names.contains(&next.lexeme))
    }

    fn postfix_expr(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary_expr()?;

        loop {
            match self.current_kind() {
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.expression()?;
                    let end = self.expect_after(TokenKind::RBracket, "]", "subscript")?;
                    let span = expr.span.merge(end.span);
                    expr = Expr::new(
                        ExprKind::Index {
                            base: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    if !is_lvalue(&expr) {
                        return Err(ParseError::new(
                            ParseErrorKind::InvalidAssignmentTarget,
                            expr.span,
                        ));
                    }
                    let op_token = self.advance();
                    let span = expr.span.merge(op_token.span);
                    expr = Expr::new(
                        ExprKind::IncDec {
                            target: Box::new(expr),
                            increment: op_token.kind == TokenKind::PlusPlus,
                            prefix: false,
                        },
                        span,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary_expr(&mut self) -> ParseResult<Expr> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::IntLit => {
                self.advance();
                let (value, long) = parse_int_literal(&token.lexeme).ok_or_else(|| {
                    ParseError::new(ParseErrorKind::InvalidNumber(token.lexeme.clone()), token.span)
                })?;
                Ok(Expr::new(ExprKind::IntLit { value, long }, token.span))
            }
            TokenKind::FloatLit => {
                self.advance();
                let value: f64 = token.lexeme.parse().map_err(|_| {
                    ParseError::new(ParseErrorKind::InvalidNumber(token.lexeme.clone()), token.span)
                })?;
                Ok(Expr::new(ExprKind::FloatLit(value), token.span))
            }
            TokenKind::Ident => {
                self.advance();
                if self.eat(TokenKind::LParen).is_none() {
                    return Ok(Expr::new(ExprKind::Ident(token.lexeme), token.span));
                }
                let mut args = Vec::new();
                if !self.check(TokenKind::RParen) {
                    loop {
                        args.push(self.expression()?);
                        if self.eat(TokenKind::Comma).is_none() {
                            break;
                        }
                    }
                }
                let end = self.expect_after(TokenKind::RParen, ")", "arguments")?;
                Ok(Expr::new(
                    ExprKind::Call {
                        callee: token.lexeme,
                        args,
                    },
                    token.span.merge(end.span),
                ))
            }
            TokenKind::New => {
                self.advance();
                let name = self.expect_ident()?;
                Ok(Expr::new(
                    ExprKind::New(name.lexeme),
                    token.span.merge(name.span),
                ))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expression()?;
                self.expect_after(TokenKind::RParen, ")", "expression")?;
                Ok(inner)
            }
            found => Err(ParseError::new(
                ParseErrorKind::ExpectedExpression(found),
                token.span,
            )),
        }
    }
}

fn is_lvalue(expr: &Expr) -> bool {
    matches!(expr.kind, ExprKind::Ident(_) | ExprKind::Index { .. })
}

/// Parses a decimal, octal (leading `0`) or hex integer literal; literals
/// that do not fit `int` become `long`.
fn parse_int_literal(lexeme: &str) -> Option<(i64, bool)> {
    let (digits, suffixed) = match lexeme.strip_suffix(['l', 'L']) {
        Some(digits) => (digits, true),
        None => (lexeme, false),
    };
    let value = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok()?,
        None => match digits.strip_prefix('0') {
            Some(octal) if !octal.is_empty() => u64::from_str_radix(octal, 8).ok()?,
            _ => digits.parse::<u64>().ok()?,
        },
    };
    let value = i64::try_from(value).ok()?;
    Some((value, suffixed || value > i64::from(i32::MAX)))
}

#[cfg(test)]
mod tests;
