//! Module hooks called by the host when it loads and unloads opjit.

use opjit_core::Status;
use tracing::info;

use crate::host::OpcodeRegistry;
use crate::opcodes::{COMPILE_OPCODE, INVOKE_OPCODE};
use crate::runtime::JitRuntime;

/// Registers `jit_compile` and `jit_invoke`. Returns the summed statuses.
pub fn module_init<R: OpcodeRegistry + ?Sized>(registry: &mut R) -> Status {
    #[cfg(feature = "console")]
    opjit_console::init();

    info!(event = "module_init");
    let status: Status = [&COMPILE_OPCODE, &INVOKE_OPCODE]
        .into_iter()
        .map(|spec| registry.append_opcode(spec))
        .sum();
    info!(event = "opcodes_registered", status);
    status
}

/// Shuts the runtime down. Safe when nothing was ever compiled.
pub fn module_destroy(runtime: &JitRuntime) -> Status {
    info!(event = "module_destroy", environment = runtime.has_environment());
    runtime.shutdown();
    opjit_core::OK
}
