//! End-to-end behaviour through the host opcodes.

mod common;

use common::{FakeRegistry, TestHost};
use opjit::{
    module_init, ErrorKind, HandleState, HostContext, JitCompile, JitInvoke,
    SymbolResolver, COMPILE_FAILED, NOTOK, OK,
};
use opjit_test::sources;

const COUNTER_SETUP: &str = "int counter_setup(Context* c) { return 0; }";

fn counter_source() -> String {
    format!("{}\n{COUNTER_SETUP}", sources::COUNTER_INVOKABLE)
}

#[test]
fn test_module_init_registers_opcodes() {
    let mut registry = FakeRegistry::default();
    assert_eq!(module_init(&mut registry), OK);
    let names: Vec<&str> = registry.opcodes.iter().map(|o| o.name).collect();
    assert_eq!(names, vec!["jit_compile", "jit_invoke"]);
    assert_eq!(registry.opcodes[1].inputs, "SkN");
    assert!(registry.opcodes[1].note_off);
}

#[test]
fn test_compile_returns_entry_point_value() {
    let host = TestHost::new();
    let compile = JitCompile::new("entry", sources::ENTRY_42, "-O2", "");
    let mut result = 0.0;
    assert_eq!(compile.init(&host.runtime, HostContext::null(), &mut result), OK);
    assert_eq!(result, 42.0);
    assert!(host.runtime.has_environment());
}

#[test]
fn test_compile_failure_reports_sentinel() {
    let host = TestHost::new();
    let compile = JitCompile::new("entry", sources::SYNTAX_ERROR, "", "");
    let mut result = 0.0;
    assert_eq!(compile.init(&host.runtime, HostContext::null(), &mut result), NOTOK);
    assert_eq!(result, f64::from(COMPILE_FAILED));
    assert!(!host.runtime.has_environment());
}

#[test]
fn test_missing_entry_point_reports_sentinel() {
    let host = TestHost::new();
    let compile = JitCompile::new("main", sources::ENTRY_42, "", "");
    let mut result = 0.0;
    assert_eq!(compile.init(&host.runtime, HostContext::null(), &mut result), NOTOK);
    assert_eq!(result, f64::from(COMPILE_FAILED));
}

#[test]
fn test_syntax_error_keeps_earlier_modules() {
    let host = TestHost::new();
    let mut result = 0.0;
    JitCompile::new("entry", sources::ENTRY_42, "", "").init(
        &host.runtime,
        HostContext::null(),
        &mut result,
    );
    let broken = JitCompile::new("other", sources::SYNTAX_ERROR, "", "");
    assert_eq!(broken.init(&host.runtime, HostContext::null(), &mut result), NOTOK);
    assert!(host.runtime.resolve("entry").is_ok());
}

#[test]
fn test_counter_invokable_both_mode() {
    let host = TestHost::new();
    let mut result = 0.0;
    let compile = JitCompile::new("counter_setup", counter_source(), "", "");
    assert_eq!(compile.init(&host.runtime, HostContext::null(), &mut result), OK);
    assert_eq!(result, 0.0);

    let mut invoke = JitInvoke::new(sources::COUNTER_FACTORY, 3.0);
    let mut outputs = [0.0; 40];
    assert_eq!(invoke.init(&host.runtime, HostContext::null(), &mut outputs, &[]), OK);
    assert_eq!(outputs[0], 1.0);
    for expected in [2.0, 3.0, 4.0] {
        assert_eq!(invoke.kontrol(HostContext::null(), &mut outputs, &[]), OK);
        assert_eq!(outputs[0], expected);
    }
    assert_eq!(invoke.noteoff(HostContext::null()), OK);
    assert!(invoke.handle().is_none());
}

#[test]
fn test_counter_invokable_poll_only_skips_init() {
    let host = TestHost::new();
    let mut result = 0.0;
    JitCompile::new("counter_setup", counter_source(), "", "").init(
        &host.runtime,
        HostContext::null(),
        &mut result,
    );

    let mut invoke = JitInvoke::new(sources::COUNTER_FACTORY, 2.0);
    let mut outputs = [0.0; 40];
    assert_eq!(invoke.init(&host.runtime, HostContext::null(), &mut outputs, &[]), OK);
    assert_eq!(outputs[0], 0.0);
    assert_eq!(invoke.handle().map(|h| h.state()), Some(HandleState::Initialized));
    invoke.kontrol(HostContext::null(), &mut outputs, &[]);
    // Fields start zeroed.
    assert_eq!(outputs[0], 1.0);
    assert_eq!(invoke.noteoff(HostContext::null()), OK);
}

#[test]
fn test_unknown_factory_creates_nothing() {
    let host = TestHost::new();
    let mut result = 0.0;
    JitCompile::new("entry", sources::ENTRY_42, "", "").init(
        &host.runtime,
        HostContext::null(),
        &mut result,
    );
    let mut invoke = JitInvoke::new("no_such_factory", 3.0);
    let mut outputs = [0.0; 40];
    assert_eq!(invoke.init(&host.runtime, HostContext::null(), &mut outputs, &[]), NOTOK);
    assert!(invoke.handle().is_none());
    assert_eq!(
        host.runtime.resolve("no_such_factory").unwrap_err().kind(),
        ErrorKind::Symbol
    );
}
