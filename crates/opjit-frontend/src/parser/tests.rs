//! Tests for the C-dialect parser.

use super::*;

fn parse(source: &str) -> TranslationUnit {
    Parser::parse_source(source).unwrap_or_else(|e| panic!("parse failed: {e:?}"))
}

fn parse_errors(source: &str) -> Vec<ParseError> {
    match Parser::parse_source(source) {
        Err(SyntaxErrors::Parse(errors)) => errors,
        other => panic!("expected parse errors, got {other:?}"),
    }
}

fn single_function(source: &str) -> FunctionDef {
    match parse(source).items.into_iter().next() {
        Some(Item::Function(def)) => def,
        other => panic!("expected function, got {other:?}"),
    }
}

fn return_expr(def: &FunctionDef) -> &Expr {
    match def.body.stmts.last() {
        Some(Stmt::Return(Some(expr), _)) => expr,
        other => panic!("expected return, got {other:?}"),
    }
}

#[test]
fn test_entry_point_definition() {
    let def = single_function("int entry(Context* c) { return 42; }");
    assert_eq!(def.proto.name, "entry");
    assert_eq!(def.proto.ret, CType::Int);
    assert_eq!(def.proto.params.len(), 1);
    assert_eq!(
        def.proto.params[0].ty,
        CType::pointer_to(CType::Struct("Context".into()))
    );
    assert!(!def.is_static);
    assert!(matches!(
        return_expr(&def).kind,
        ExprKind::IntLit { value: 42, long: false }
    ));
}

#[test]
fn test_linkage_specifiers() {
    let unit = parse(
        r#"
        extern "C" double scale(double x);
        static long helper(void) { return 1L; }
        extern int counter(int);
        "#,
    );
    assert_eq!(unit.items.len(), 3);
    assert!(matches!(&unit.items[0], Item::Prototype(p) if p.params.len() == 1));
    assert!(matches!(&unit.items[1], Item::Function(f) if f.is_static && f.proto.params.is_empty()));
    assert!(matches!(&unit.items[2], Item::Prototype(p) if p.params[0].name.is_none()));
}

#[test]
fn test_unknown_linkage_rejected() {
    let errors = parse_errors(r#"extern "Pascal" int f(void);"#);
    assert!(matches!(errors[0].kind, ParseErrorKind::UnknownLinkage(_)));
}

#[test]
fn test_precedence() {
    let def = single_function("int f(void) { return 1 + 2 * 3 < 4 && 5 || 6; }");
    let ExprKind::Binary { op, lhs, .. } = &return_expr(&def).kind else {
        panic!("expected binary");
    };
    assert_eq!(*op, BinaryOp::Or);
    let ExprKind::Binary { op, lhs, .. } = &lhs.kind else {
        panic!("expected binary");
    };
    assert_eq!(*op, BinaryOp::And);
    let ExprKind::Binary { op, lhs, .. } = &lhs.kind else {
        panic!("expected binary");
    };
    assert_eq!(*op, BinaryOp::Lt);
    let ExprKind::Binary { op, rhs, .. } = &lhs.kind else {
        panic!("expected binary");
    };
    assert_eq!(*op, BinaryOp::Add);
    assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
}

#[test]
fn test_subtraction_is_left_associative() {
    let def = single_function("int f(void) { return 10 - 3 - 2; }");
    let ExprKind::Binary { lhs, rhs, .. } = &return_expr(&def).kind else {
        panic!("expected binary");
    };
    assert!(matches!(lhs.kind, ExprKind::Binary { op: BinaryOp::Sub, .. }));
    assert!(matches!(rhs.kind, ExprKind::IntLit { value: 2, .. }));
}

#[test]
fn test_cast_and_index() {
    let def = single_function("double f(double* in) { return (double)(int) in[2]; }");
    let ExprKind::Cast { ty, operand } = &return_expr(&def).kind else {
        panic!("expected cast");
    };
    assert_eq!(*ty, CType::Double);
    let ExprKind::Cast { operand, .. } = &operand.kind else {
        panic!("expected nested cast");
    };
    assert!(matches!(operand.kind, ExprKind::Index { .. }));
}

#[test]
fn test_parenthesized_expression_is_not_cast() {
    let def = single_function("int f(int a) { return (a) * 2; }");
    assert!(matches!(
        return_expr(&def).kind,
        ExprKind::Binary { op: BinaryOp::Mul, .. }
    ));
}

#[test]
fn test_statements() {
    let def = single_function(
        r#"
        int f(int n) {
            long total = 0;
            for (int i = 0; i < n; i++) {
                if (i % 2 == 0) continue; else total += i;
                while (total > 100) { total -= 100; break; }
            }
            ;
            return (int) total;
        }
        "#,
    );
    assert_eq!(def.body.stmts.len(), 4);
    assert!(matches!(&def.body.stmts[0], Stmt::Decl { ty: CType::Long, .. }));
    let Stmt::For { init, cond, step, .. } = &def.body.stmts[1] else {
        panic!("expected for");
    };
    assert!(matches!(init.as_deref(), Some(Stmt::Decl { .. })));
    assert!(cond.is_some());
    assert!(matches!(
        step.as_ref().map(|s| &s.kind),
        Some(ExprKind::IncDec { increment: true, prefix: false, .. })
    ));
    assert!(matches!(def.body.stmts[2], Stmt::Empty));
}

#[test]
fn test_assignment_is_right_associative() {
    let def = single_function("int f(int a, int b) { a = b = 3; return a; }");
    let Stmt::Expr(expr) = &def.body.stmts[0] else {
        panic!("expected expression statement");
    };
    let ExprKind::Assign { op, value, .. } = &expr.kind else {
        panic!("expected assignment");
    };
    assert_eq!(*op, AssignOp::Assign);
    assert!(matches!(value.kind, ExprKind::Assign { .. }));
}

#[test]
fn test_invalid_assignment_target() {
    let errors = parse_errors("int f(int a) { 1 = a; return a; }");
    assert_eq!(errors[0].kind, ParseErrorKind::InvalidAssignmentTarget);
}

#[test]
fn test_invokable_block() {
    let unit = parse(
        r#"
        invokable Counter {
            double value;
            int calls;
            int init(Context* c, double* out, double* in) { value = 1.0; out[0] = value; return 0; }
            int poll(Context* c, double* out, double* in) { value += 1.0; out[0] = value; return 0; }
        };
        Invokable* make_counter() { return new Counter; }
        "#,
    );
    let Item::Invokable(def) = &unit.items[0] else {
        panic!("expected invokable");
    };
    assert_eq!(def.name, "Counter");
    assert_eq!(def.fields.len(), 2);
    assert_eq!(def.fields[1].ty, CType::Int);
    let kinds: Vec<MethodKind> = def.methods.iter().map(|m| m.kind).collect();
    assert_eq!(kinds, vec![MethodKind::Init, MethodKind::Poll]);

    let Item::Function(factory) = &unit.items[1] else {
        panic!("expected factory");
    };
    assert!(matches!(&return_expr(factory).kind, ExprKind::New(name) if name == "Counter"));
}

#[test]
fn test_invokable_name_is_a_type() {
    let unit = parse("invokable Gate { int open; }; Gate* make(void) { Gate* g = new Gate; return g; }");
    assert_eq!(unit.items.len(), 2);
}

#[test]
fn test_unknown_method_rejected() {
    let errors = parse_errors("invokable Bad { int tick(Context* c) { return 0; } };");
    assert_eq!(errors[0].kind, ParseErrorKind::UnknownMethod("tick".into()));
    assert!(errors[0].hint.is_some());
}

#[test]
fn test_duplicate_field_rejected() {
    let errors = parse_errors("invokable Dup { double x; double x; };");
    assert_eq!(errors[0].kind, ParseErrorKind::Redefinition("x".into()));
}

#[test]
fn test_opaque_struct_declaration() {
    let unit = parse("struct Buffer; Buffer* get(void); int f(struct Buffer* b) { return 0; }");
    assert!(matches!(&unit.items[0], Item::Struct(name, _) if name == "Buffer"));
    assert_eq!(unit.items.len(), 3);
}

#[test]
fn test_recovers_after_broken_item() {
    let errors = parse_errors(
        r#"
        int good(void) { return 1; }
        int broken(void) { return 1 + ; }
        int also_broken(void) { int x = ; return x; }
        int fine(void) { return 2; }
        "#,
    );
    assert_eq!(errors.len(), 2);
    assert!(matches!(errors[0].kind, ParseErrorKind::ExpectedExpression(TokenKind::Semicolon)));
}

#[test]
fn test_missing_semicolon_message() {
    let errors = parse_errors("int f(void) { return 1 }");
    assert_eq!(
        errors[0].to_string(),
        "expected ';' after return statement"
    );
}

#[test]
fn test_lex_errors_surface() {
    let result = Parser::parse_source("int f(void) { return 1 @ 2; }");
    assert!(matches!(result, Err(SyntaxErrors::Lex(errors)) if errors.len() == 1));
}

#[test]
fn test_integer_literal_widening() {
    assert_eq!(parse_int_literal("2147483647"), Some((2_147_483_647, false)));
    assert_eq!(parse_int_literal("2147483648"), Some((2_147_483_648, true)));
    assert_eq!(parse_int_literal("0x10L"), Some((16, true)));
    assert_eq!(parse_int_literal("99999999999999999999"), None);
}

#[test]
fn test_octal_literals() {
    assert_eq!(parse_int_literal("010"), Some((8, false)));
    assert_eq!(parse_int_literal("0777L"), Some((511, true)));
    assert_eq!(parse_int_literal("0"), Some((0, false)));
    assert_eq!(parse_int_literal("09"), None);

    let errors = parse_errors("int f(void) { return 018; }");
    assert_eq!(errors[0].kind, ParseErrorKind::InvalidNumber("018".into()));
}

fn nested_parens(depth: usize) -> String {
    format!(
        "int f(void) {{ return {}1{}; }}",
        "(".repeat(depth),
        ")".repeat(depth)
    )
}

#[test]
fn test_moderate_nesting_parses() {
    let def = single_function(&nested_parens(100));
    assert!(matches!(return_expr(&def).kind, ExprKind::IntLit { value: 1, .. }));

    let source = format!("int f(void) {{ {} return 1; {} }}", "{".repeat(100), "}".repeat(100));
    single_function(&source);
}

#[test]
fn test_excessive_nesting_is_an_error() {
    let errors = parse_errors(&nested_parens(300));
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].kind,
        ParseErrorKind::NestingTooDeep(MAX_NESTING_DEPTH)
    );

    let blocks = format!("int f(void) {{ {} {} }}", "{".repeat(300), "}".repeat(300));
    assert!(matches!(
        parse_errors(&blocks)[0].kind,
        ParseErrorKind::NestingTooDeep(_)
    ));

    let unary = format!("int f(void) {{ return {}1; }}", "- ".repeat(300));
    assert!(matches!(
        parse_errors(&unary)[0].kind,
        ParseErrorKind::NestingTooDeep(_)
    ));

    let chain = format!("int f(void) {{ return 1{}; }}", " + 1".repeat(300));
    assert!(matches!(
        parse_errors(&chain)[0].kind,
        ParseErrorKind::NestingTooDeep(_)
    ));
}

#[test]
fn test_nesting_error_does_not_poison_later_items() {
    let source = format!("{}\nint g(void) {{ return (((2))); }}", nested_parens(300));
    let errors = parse_errors(&source);
    assert_eq!(errors.len(), 1);
}

#[test]
fn test_defines_substitute_constants() {
    let defines = vec![("RATE".to_string(), "48000".to_string())];
    let unit = Parser::parse_with_defines("int rate(void) { return RATE; }", &defines).unwrap();
    let Item::Function(def) = &unit.items[0] else {
        panic!("expected function");
    };
    assert!(matches!(
        return_expr(def).kind,
        ExprKind::IntLit { value: 48000, .. }
    ));
}
