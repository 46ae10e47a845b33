//! Source fixtures.

/// Entry point returning 42.
pub const ENTRY_42: &str = "int entry(Context* c) { return 42; }";

/// Counter invokable: init writes 1.0 to slot 0, every poll adds 1.0.
pub const COUNTER_INVOKABLE: &str = r#"
invokable Counter {
    double value;

    int init(Context* c, double* out, double* in) {
        value = 1.0;
        out[0] = value;
        return 0;
    }

    int poll(Context* c, double* out, double* in) {
        value += 1.0;
        out[0] = value;
        return 0;
    }
};

Invokable* make_counter(void) { return new Counter; }
"#;

/// Factory name defined by [`COUNTER_INVOKABLE`].
pub const COUNTER_FACTORY: &str = "make_counter";

/// Missing semicolon after the return statement.
pub const SYNTAX_ERROR: &str = "int entry(Context* c) { return 42 }";

/// Defines `broken`, which calls a function nothing defines.
pub const UNRESOLVED_IMPORT: &str = r#"
int opjit_no_such_function(int x);
int broken(Context* c) { return opjit_no_such_function(1); }
"#;
