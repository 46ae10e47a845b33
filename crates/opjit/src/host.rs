//! What opjit needs from the host.
//!
//! Argument parsing, opcode dispatch and audio buffers stay on the host
//! side. opjit only describes its opcodes and asks the host to register
//! them.

use opjit_core::Status;

/// Call sites an opcode takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum CallRate {
    /// Once per note, at init time.
    Init = 1,
    /// At init time and on every control period.
    InitAndControl = 3,
}

/// Host-facing description of one opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpcodeSpec {
    pub name: &'static str,
    pub rate: CallRate,
    /// Output type string, one character per output.
    pub outputs: &'static str,
    /// Input type string, one character per input.
    pub inputs: &'static str,
    /// Whether the opcode wants a note-off callback.
    pub note_off: bool,
}

impl OpcodeSpec {
    pub fn output_count(&self) -> usize {
        self.outputs.chars().count()
    }
}

/// The host's opcode table.
pub trait OpcodeRegistry {
    /// Registers `spec`. Returns the host's status for the registration.
    fn append_opcode(&mut self, spec: &OpcodeSpec) -> Status;
}
