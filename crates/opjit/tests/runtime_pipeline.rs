//! Compile pipeline behaviour through `JitRuntime`.

mod common;

use common::TestHost;
use opjit::{invoke_entry_point, ErrorKind, HostContext, SymbolResolver};
use opjit_test::sources;

#[test]
fn test_compile_and_run() {
    let host = TestHost::new();
    let status = host
        .runtime
        .compile_and_run("entry", sources::ENTRY_42, "", "", HostContext::null())
        .unwrap();
    assert_eq!(status, 42);
}

#[test]
fn test_block_comments_in_source() {
    let host = TestHost::new();
    let status = host
        .runtime
        .compile_and_run(
            "entry",
            "/* hello */ int entry(Context* c) {\n    /* two\n lines */ return 42; /**/\n}",
            "",
            "",
            HostContext::null(),
        )
        .unwrap();
    assert_eq!(status, 42);
}

#[test]
fn test_unterminated_comment_is_compile_error() {
    let host = TestHost::new();
    let failure = host
        .runtime
        .compile_and_run(
            "entry",
            "int entry(Context* c) { return 42; } /* trailing",
            "",
            "",
            HostContext::null(),
        )
        .unwrap_err();
    assert_eq!(failure.error.kind(), ErrorKind::Compile);
    assert!(!host.runtime.has_environment());
}

#[test]
fn test_deep_nesting_is_compile_error() {
    let host = TestHost::new();
    let deep = format!(
        "int entry(Context* c) {{ return {}42{}; }}",
        "(".repeat(1000),
        ")".repeat(1000)
    );
    let failure = host
        .runtime
        .compile_and_run("entry", &deep, "", "", HostContext::null())
        .unwrap_err();
    assert_eq!(failure.error.kind(), ErrorKind::Compile);

    let nested = format!(
        "int entry(Context* c) {{ return {}42{} + (0x10 + 010 - 24); }}",
        "(".repeat(60),
        ")".repeat(60)
    );
    let status = host
        .runtime
        .compile_and_run("entry", &nested, "", "", HostContext::null())
        .unwrap();
    assert_eq!(status, 42);
}

#[test]
fn test_defines_reach_the_source() {
    let host = TestHost::new();
    let status = host
        .runtime
        .compile_and_run(
            "entry",
            "int entry(Context* c) { return ANSWER + OFFSET; }",
            "-D ANSWER=40 -DOFFSET=2",
            "",
            HostContext::null(),
        )
        .unwrap();
    assert_eq!(status, 42);
}

#[test]
fn test_optimisation_options_compile() {
    let host = TestHost::new();
    let source = "int sum(int n) { int s = 0; while (n > 0) { s += n; n--; } return s; }\n\
                  int entry(Context* c) { return sum(8) + 6; }";
    for (i, level) in ["-O0", "-O2", "-Os"].into_iter().enumerate() {
        let renamed = source.replace("sum", &format!("sum{i}")).replace("entry", &format!("entry{i}"));
        let status = host
            .runtime
            .compile_and_run(&format!("entry{i}"), &renamed, level, "", HostContext::null())
            .unwrap();
        assert_eq!(status, 42);
    }
}

#[test]
fn test_unknown_option_is_config_error() {
    let host = TestHost::new();
    let failure = host
        .runtime
        .compile_and_run("entry", sources::ENTRY_42, "--frobnicate", "", HostContext::null())
        .unwrap_err();
    assert_eq!(failure.error.kind(), ErrorKind::Config);
}

#[test]
fn test_preprocess_only_is_rejected() {
    let host = TestHost::new();
    let failure = host
        .runtime
        .compile_and_run("entry", sources::ENTRY_42, "-E", "", HostContext::null())
        .unwrap_err();
    assert_eq!(failure.error.kind(), ErrorKind::Compile);
}

#[test]
fn test_verbose_flag_follows_latest_request() {
    let host = TestHost::new();
    host.runtime.request("entry", sources::ENTRY_42, "-v -O1", "");
    assert!(host.runtime.diagnostics().enabled());
    host.runtime.request("entry", sources::ENTRY_42, "-O1", "");
    assert!(!host.runtime.diagnostics().enabled());
}

#[test]
fn test_units_are_removed_unless_kept() {
    let host = TestHost::new();
    host.runtime
        .compile_and_run("entry", sources::ENTRY_42, "", "", HostContext::null())
        .unwrap();
    assert_eq!(host.unit_count(), 0);

    let kept = TestHost::with_keep_files(true);
    kept.runtime
        .compile_and_run("entry", sources::ENTRY_42, "", "", HostContext::null())
        .unwrap();
    assert_eq!(kept.unit_count(), 1);
}

#[test]
fn test_recompiling_the_same_entry_point_is_a_link_error() {
    let host = TestHost::new();
    host.runtime
        .compile_and_run("entry", sources::ENTRY_42, "", "", HostContext::null())
        .unwrap();
    let failure = host
        .runtime
        .compile_and_run("entry", sources::ENTRY_42, "", "", HostContext::null())
        .unwrap_err();
    assert_eq!(failure.error.kind(), ErrorKind::Link);
}

#[test]
fn test_link_errors_surface_at_first_lookup() {
    let host = TestHost::new();
    let request = host
        .runtime
        .request("broken", sources::UNRESOLVED_IMPORT, "", "");
    host.runtime.compile_module(&request).unwrap();
    let err = invoke_entry_point(&host.runtime, "broken", HostContext::null()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Link);
}

#[test]
fn test_environment_recreated_after_destroy() {
    let host = TestHost::new();
    host.runtime
        .compile_and_run("entry", sources::ENTRY_42, "", "", HostContext::null())
        .unwrap();
    host.runtime.destroy_environment().unwrap();
    assert_eq!(
        host.runtime.resolve("entry").unwrap_err().kind(),
        ErrorKind::InvalidState
    );
    let status = host
        .runtime
        .compile_and_run("entry", sources::ENTRY_42, "", "", HostContext::null())
        .unwrap();
    assert_eq!(status, 42);
}

#[cfg(target_os = "linux")]
#[test]
fn test_libraries_are_loaded_before_linking() {
    let host = TestHost::new();
    let status = host
        .runtime
        .compile_and_run(
            "entry",
            "double sqrt(double x); int entry(Context* c) { return (int) sqrt(1764.0); }",
            "",
            "libm.so.6 libm.so.6",
            HostContext::null(),
        )
        .unwrap();
    assert_eq!(status, 42);
}
