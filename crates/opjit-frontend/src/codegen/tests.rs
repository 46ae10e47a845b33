//! Tests for IR generation.

use cranelift_codegen::settings;

use super::*;
use crate::parser::Parser;

fn target() -> TargetInfo {
    TargetInfo::host().expect("host target")
}

fn lower(source: &str) -> CodegenResult<Option<LoweredUnit>> {
    let unit = Parser::parse_source(source).unwrap_or_else(|e| panic!("parse failed: {e:?}"));
    lower_unit(&unit, &target())
}

/// Lowers `source` and checks every function with the IR verifier.
fn lower_verified(source: &str) -> LoweredUnit {
    let lowered = lower(source)
        .unwrap_or_else(|e| panic!("lowering failed: {e}"))
        .expect("unit defines functions");
    let flags = settings::Flags::new(settings::builder());
    for body in &lowered.functions {
        if let Err(errors) = cranelift_codegen::verify_function(&body.func, &flags) {
            panic!(
                "{} failed verification:\n{errors}\n{}",
                lowered.declarations[body.decl].name,
                body.func.display()
            );
        }
    }
    lowered
}

fn lower_error(source: &str) -> SemanticError {
    match lower(source) {
        Err(error) => error,
        Ok(_) => panic!("expected a semantic error"),
    }
}

fn decl<'a>(unit: &'a LoweredUnit, name: &str) -> &'a FunctionDecl {
    unit.declarations
        .iter()
        .find(|d| d.name == name)
        .unwrap_or_else(|| panic!("no declaration named {name}"))
}

#[test]
fn test_entry_point_is_exported() {
    let unit = lower_verified("int entry(Context* c) { return 42; }");
    let entry = decl(&unit, "entry");
    assert_eq!(entry.linkage, DeclLinkage::Export);
    assert_eq!(entry.abi, opjit_core::SymbolSignature::entry_point());
    assert_eq!(unit.functions.len(), 1);
}

#[test]
fn test_static_function_is_local_and_prototype_is_import() {
    let unit = lower_verified(
        r#"
        extern "C" double sqrt(double);
        static double norm(double a, double b) { return sqrt(a * a + b * b); }
        int entry(Context* c) { return (int) norm(3.0, 4.0); }
        "#,
    );
    assert_eq!(decl(&unit, "sqrt").linkage, DeclLinkage::Import);
    assert_eq!(decl(&unit, "norm").linkage, DeclLinkage::Local);
    assert_eq!(decl(&unit, "entry").linkage, DeclLinkage::Export);
}

#[test]
fn test_prototype_then_definition_merges() {
    let unit = lower_verified(
        "int twice(int x); int entry(Context* c) { return twice(21); } int twice(int x) { return x * 2; }",
    );
    let matching: Vec<_> = unit
        .declarations
        .iter()
        .filter(|d| d.name == "twice")
        .collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].linkage, DeclLinkage::Export);
}

#[test]
fn test_unit_without_functions_produces_nothing() {
    let result = lower("struct Opaque; int helper(int);").expect("lowering succeeds");
    assert!(result.is_none());
}

#[test]
fn test_control_flow_verifies() {
    lower_verified(
        r#"
        int entry(Context* c) {
            long total = 0;
            for (int i = 0; i < 10; i++) {
                if (i % 2 == 0) continue;
                total += i;
                if (total > 20) break;
            }
            int n = 3;
            while (n) { n--; }
            double d = 2.5;
            if (!d || total >= 9 && n == 0) return 1;
            return (int) total;
        }
        "#,
    );
}

#[test]
fn test_code_after_return_verifies() {
    lower_verified("int f(void) { return 1; return 2; } int g(int a) { while (1) { return a; } }");
}

#[test]
fn test_pointer_arithmetic_verifies() {
    lower_verified(
        r#"
        double sum(double* p, int n) {
            double* end = p + n;
            double s = 0.0;
            while (p < end) { s += p[0]; p++; }
            return s + (double) (end - p);
        }
        "#,
    );
}

#[test]
fn test_invokable_declares_function_table() {
    let unit = lower_verified(
        r#"
        invokable Counter {
            double value;
            int init(Context* c, double* out, double* in) { value = 1.0; out[0] = value; return 0; }
            int poll(Context* c, double* out, double* in) { value += 1.0; out[0] = value; return 0; }
        };
        Invokable* make_counter() { return new Counter; }
        "#,
    );
    for name in ["Counter::init", "Counter::poll", "Counter::release", "Counter::destroy"] {
        assert_eq!(decl(&unit, name).linkage, DeclLinkage::Local);
    }
    assert_eq!(decl(&unit, ALLOC_SYMBOL).linkage, DeclLinkage::Import);
    assert_eq!(decl(&unit, FREE_SYMBOL).linkage, DeclLinkage::Import);
    assert_eq!(
        decl(&unit, "make_counter").abi,
        opjit_core::SymbolSignature::factory()
    );
    // factory + init + poll + default release + destroy
    assert_eq!(unit.functions.len(), 5);
}

#[test]
fn test_locals_shadow_fields() {
    lower_verified(
        r#"
        invokable Shadow {
            int x;
            int init(Context* c, double* out, double* in) { int x = 5; out[0] = x; return x; }
        };
        "#,
    );
}

#[test]
fn test_undeclared_identifier() {
    let error = lower_error("int f(void) { return missing; }");
    assert_eq!(error.message, "use of undeclared identifier 'missing'");
}

#[test]
fn test_call_to_undeclared_function() {
    let error = lower_error("int f(void) { return nowhere(1); }");
    assert_eq!(error.message, "call to undeclared function 'nowhere'");
}

#[test]
fn test_argument_count_checked() {
    let error = lower_error("int g(int a, int b); int f(void) { return g(1); }");
    assert!(error.message.starts_with("too few arguments"));
}

#[test]
fn test_conflicting_prototypes() {
    let error = lower_error("int g(int a); double g(int a); int f(void) { return 0; }");
    assert_eq!(error.message, "conflicting types for 'g'");
}

#[test]
fn test_redefinition() {
    let error = lower_error("int g(void) { return 1; } int g(void) { return 2; }");
    assert_eq!(error.message, "redefinition of 'g'");
}

#[test]
fn test_break_outside_loop() {
    let error = lower_error("int f(void) { break; return 0; }");
    assert!(error.message.contains("'break' statement not in loop"));
}

#[test]
fn test_void_value_rejected() {
    let error = lower_error("void nothing(void); int f(void) { int x = nothing(); return x; }");
    assert!(error.message.starts_with("void value"));
}

#[test]
fn test_integer_to_pointer_needs_cast() {
    let error = lower_error("int f(double* p) { p = 5; return 0; }");
    assert!(error.message.starts_with("incompatible type"));
    lower_verified("int f(double* p) { p = 0; p = (double*) 5L; return 0; }");
}

#[test]
fn test_bad_method_signature() {
    let error = lower_error(
        "invokable Bad { int poll(Context* c, double* out) { return 0; } }; int f(void) { return 0; }",
    );
    assert!(error.message.contains("must be declared as int poll"));
}

#[test]
fn test_error_span_points_at_expression() {
    let source = "int f(void) { return missing; }";
    let error = lower_error(source);
    let start = source.find("missing").unwrap() as u32;
    assert_eq!(error.span.start, start);
}
