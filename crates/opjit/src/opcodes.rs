//! The two opcodes opjit adds to the host.
//!
//! `jit_compile` runs once at init time: it compiles source text, links it
//! and calls its entry point. `jit_invoke` drives one invokable instance
//! through the host's init, control-rate and note-off callbacks.
//!
//! Both turn every error into a host status and a `warn!` event; nothing
//! here panics or aborts the host.

use std::fmt::Display;

use opjit_core::{HostContext, Status, ThreadMode, COMPILE_FAILED, NOTOK, OK};
use opjit_jit::InvocationHandle;
use tracing::{debug, info, warn};

use crate::host::{CallRate, OpcodeSpec};
use crate::runtime::JitRuntime;

pub const COMPILE_OPCODE: OpcodeSpec = OpcodeSpec {
    name: "jit_compile",
    rate: CallRate::Init,
    outputs: "i",
    inputs: "SSSW",
    note_off: false,
};

pub const INVOKE_OPCODE: OpcodeSpec = OpcodeSpec {
    name: "jit_invoke",
    rate: CallRate::InitAndControl,
    outputs: "****************************************",
    inputs: "SkN",
    note_off: true,
};

/// Arguments of one `jit_compile` call.
#[derive(Debug, Clone, Default)]
pub struct JitCompile {
    pub entry_point: String,
    pub source: String,
    pub options: String,
    /// Space-delimited library paths.
    pub libraries: String,
}

impl JitCompile {
    pub fn new(
        entry_point: impl Into<String>,
        source: impl Into<String>,
        options: impl Into<String>,
        libraries: impl Into<String>,
    ) -> Self {
        Self {
            entry_point: entry_point.into(),
            source: source.into(),
            options: options.into(),
            libraries: libraries.into(),
        }
    }

    /// Init-time callback.
    ///
    /// `result` receives the entry point's return value, or
    /// [`COMPILE_FAILED`] when nothing could be called.
    pub fn init(&self, runtime: &JitRuntime, context: HostContext, result: &mut f64) -> Status {
        *result = f64::from(COMPILE_FAILED);
        match runtime.compile_and_run(
            &self.entry_point,
            &self.source,
            &self.options,
            &self.libraries,
            context,
        ) {
            Ok(status) => {
                *result = f64::from(status);
                OK
            }
            Err(failure) => {
                for diagnostic in &failure.diagnostics {
                    debug!(event = "compile_diagnostic", %diagnostic);
                }
                warn!(
                    event = "compile_failed",
                    entry_point = %self.entry_point,
                    error = %failure.error,
                    diagnostics = failure.diagnostics.len()
                );
                NOTOK
            }
        }
    }
}

/// State of one `jit_invoke` opcode instance.
#[derive(Debug)]
pub struct JitInvoke {
    pub factory: String,
    /// Thread mode as the host passes it.
    pub thread: f64,
    handle: Option<InvocationHandle>,
}

impl JitInvoke {
    pub fn new(factory: impl Into<String>, thread: f64) -> Self {
        Self {
            factory: factory.into(),
            thread,
            handle: None,
        }
    }

    pub fn handle(&self) -> Option<&InvocationHandle> {
        self.handle.as_ref()
    }

    /// Init-time callback: creates the instance and runs its `init`.
    pub fn init(
        &mut self,
        runtime: &JitRuntime,
        context: HostContext,
        outputs: &mut [f64],
        inputs: &[f64],
    ) -> Status {
        let mode = match ThreadMode::from_host_value(self.thread) {
            Ok(mode) => mode,
            Err(e) => return self.failed("init", e),
        };
        let mut handle = match InvocationHandle::create(runtime, &self.factory, mode as i32) {
            Ok(handle) => handle,
            Err(e) => return self.failed("init", e),
        };
        if runtime.diagnostics().enabled() {
            info!(event = "invokable_created", factory = %self.factory, mode = %mode);
        }
        let status = handle.init(context, outputs, inputs);
        self.handle = Some(handle);
        self.finish("init", status)
    }

    /// Control-rate callback.
    pub fn kontrol(&mut self, context: HostContext, outputs: &mut [f64], inputs: &[f64]) -> Status {
        let Some(handle) = self.handle.as_mut() else {
            return self.failed("kontrol", "no instance");
        };
        let status = handle.poll(context, outputs, inputs);
        self.finish("kontrol", status)
    }

    /// Note-off callback: releases and destroys the instance.
    pub fn noteoff(&mut self, context: HostContext) -> Status {
        let Some(mut handle) = self.handle.take() else {
            return self.failed("noteoff", "no instance");
        };
        let status = handle.release(context);
        self.finish("noteoff", status)
    }

    fn finish(&self, call: &str, status: opjit_core::Result<Status>) -> Status {
        match status {
            Ok(status) => {
                debug!(event = "invokable_call", call, factory = %self.factory, status);
                status
            }
            Err(e) => self.failed(call, e),
        }
    }

    fn failed(&self, call: &str, error: impl Display) -> Status {
        warn!(event = "invoke_failed", call, factory = %self.factory, error = %error);
        NOTOK
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opjit_core::MAX_OUTPUT_SLOTS;

    #[test]
    fn test_invoke_has_forty_outputs() {
        assert_eq!(INVOKE_OPCODE.output_count(), MAX_OUTPUT_SLOTS);
        assert_eq!(COMPILE_OPCODE.output_count(), 1);
    }

    #[test]
    fn test_opcode_rates() {
        let rates: Vec<i32> = [&COMPILE_OPCODE, &INVOKE_OPCODE]
            .iter()
            .map(|spec| spec.rate as i32)
            .collect();
        assert_eq!(rates, vec![1, 3]);
    }

    #[test]
    fn test_noteoff_without_instance() {
        let mut invoke = JitInvoke::new("make_counter", 3.0);
        assert_eq!(invoke.noteoff(HostContext::null()), NOTOK);
        let mut out = [0.0; 1];
        assert_eq!(invoke.kontrol(HostContext::null(), &mut out, &[]), NOTOK);
    }

    #[test]
    fn test_invalid_thread_never_resolves() {
        let runtime = JitRuntime::new(opjit_config::JitConfig::default()).unwrap();
        let mut invoke = JitInvoke::new("make_counter", 0.0);
        let mut out = [0.0; 1];
        assert_eq!(invoke.init(&runtime, HostContext::null(), &mut out, &[]), NOTOK);
        assert!(invoke.handle().is_none());
        assert!(!runtime.has_environment());
    }
}
