//! Entry-point invoker.

use opjit_core::{EntryPointFn, HostContext, OpjitError, Result, SymbolResolver, SymbolSignature};
use tracing::debug;

/// Resolves `entry_point` and calls it once with `context`.
///
/// Returns the entry point's status verbatim. When the resolver knows the
/// symbol's signature it must be `(ptr) -> (i32)`.
pub fn invoke_entry_point<R: SymbolResolver + ?Sized>(
    resolver: &R,
    entry_point: &str,
    context: HostContext,
) -> Result<i32> {
    let symbol = resolver.resolve(entry_point)?;
    if let Some(signature) = &symbol.signature {
        let expected = SymbolSignature::entry_point();
        if *signature != expected {
            return Err(OpjitError::Symbol(format!(
                "\"{entry_point}\" has signature {signature}, an entry point needs {expected}"
            )));
        }
    }

    // SAFETY: the address comes from the resolver and, when known, the
    // signature was checked above.
    let function: EntryPointFn = unsafe { std::mem::transmute(symbol.as_ptr()) };
    debug!(event = "entry_call", entry_point, address = format_args!("{:#x}", symbol.address));
    let status = unsafe { function(context.as_ptr()) };
    debug!(event = "entry_returned", entry_point, status);
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opjit_core::ErrorKind;
    use opjit_test::FakeResolver;

    unsafe extern "C" fn answer(_: *mut std::ffi::c_void) -> i32 {
        42
    }

    unsafe extern "C" fn echo_context(context: *mut std::ffi::c_void) -> i32 {
        context as usize as i32
    }

    #[test]
    fn test_calls_entry_point_once() {
        let resolver = FakeResolver::new().with_symbol(
            "entry",
            answer as *const () as usize,
            Some(SymbolSignature::entry_point()),
        );
        assert_eq!(invoke_entry_point(&resolver, "entry", HostContext::null()).unwrap(), 42);
        assert_eq!(resolver.lookups(), 1);
    }

    #[test]
    fn test_context_is_passed_through() {
        let resolver =
            FakeResolver::new().with_symbol("echo", echo_context as *const () as usize, None);
        let context = HostContext::new(7usize as *mut std::ffi::c_void);
        assert_eq!(invoke_entry_point(&resolver, "echo", context).unwrap(), 7);
    }

    #[test]
    fn test_missing_entry_point() {
        let resolver = FakeResolver::new();
        let err = invoke_entry_point(&resolver, "entry", HostContext::null()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Symbol);
    }

    #[test]
    fn test_signature_mismatch_is_not_called() {
        let resolver = FakeResolver::new().with_symbol(
            "entry",
            answer as *const () as usize,
            Some(SymbolSignature::factory()),
        );
        let err = invoke_entry_point(&resolver, "entry", HostContext::null()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Symbol);
        assert!(err.to_string().contains("an entry point needs (ptr) -> (i32)"));
    }
}
